//! REST backend client.

pub mod http;

pub use http::HttpBackend;

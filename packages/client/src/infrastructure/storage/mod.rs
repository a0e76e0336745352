//! Key-value storage implementations.
//!
//! - `inmemory`: session-scoped storage (and tests)
//! - `file`: durable storage backed by a JSON file

pub mod file;
pub mod inmemory;

pub use file::JsonFileStorage;
pub use inmemory::InMemoryStorage;

//! Broker transport implementations.
//!
//! - `websocket`: STOMP frames carried as WebSocket text messages

pub mod websocket;

pub use websocket::WebSocketTransport;

//! Data Transfer Objects (DTOs) for the backend and the broker.
//!
//! DTOs are organized by protocol:
//! - `broker`: STOMP message bodies (snapshots and actions)
//! - `http`: REST request/response bodies
//!
//! `conversion` maps them to and from domain entities.

pub mod broker;
pub mod conversion;
pub mod http;

pub use conversion::{SnapshotError, parse_snapshot};

//! Domain-level error types.

use thiserror::Error;

/// Validation errors of value objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("room code must not be empty")]
    RoomCodeEmpty,

    #[error("room code must be at most {0} characters")]
    RoomCodeTooLong(usize),

    #[error("room code '{0}' contains unsupported characters")]
    RoomCodeInvalid(String),
}

/// Errors of the client-local key-value storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(String),

    #[error("storage content is corrupted: {0}")]
    Corrupted(String),
}

/// Errors of calls to the REST backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never produced a response (connect, timeout, ...).
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Errors of the broker transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to connect to broker: {0}")]
    Connect(String),
    #[error("broker link closed")]
    Closed,
}

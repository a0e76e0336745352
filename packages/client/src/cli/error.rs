//! Errors of the command line client.

use thiserror::Error;

use crate::{
    domain::ValueObjectError,
    usecase::{GuestAuthError, RoomError, StoreError},
};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid room code: {0}")]
    InvalidRoom(#[from] ValueObjectError),

    #[error("guest authentication failed: {0}")]
    Auth(#[from] GuestAuthError),

    #[error("failed to load local state: {0}")]
    Store(#[from] StoreError),

    #[error("failed to enter the room: {0}")]
    Room(#[from] RoomError),
}

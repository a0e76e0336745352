//! UseCase 層のエラー型

use thiserror::Error;

use crate::domain::{ApiError, PlaceId, StorageError};

/// Errors of the local state store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The remote favorite call failed; local state was rolled back.
    #[error("failed to sync favorite for place {place_id}: {source}")]
    FavoriteSyncFailed {
        place_id: PlaceId,
        #[source]
        source: ApiError,
    },

    /// The place is favorited but its server record id is unknown; nothing was sent.
    #[error("no favorite record id known for place {0}")]
    MissingFavoriteRecord(PlaceId),

    #[error("failed to hydrate from backend: {0}")]
    HydrationFailed(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors of the tombstone ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors of the realtime channel client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// No room channel has been initialized.
    #[error("realtime channel is not initialized")]
    NotInitialized,
}

/// Errors of guest authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuestAuthError {
    #[error("guest authentication request failed: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Another caller claimed the guest issuance and never finished.
    #[error("timed out after {waited_ms} ms waiting for a concurrent guest authentication")]
    Timeout { waited_ms: u64 },
}

/// Errors of room-level operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// The operation needs a user id (vote, favorite).
    #[error("please log in to use this feature")]
    NotAuthenticated,
}

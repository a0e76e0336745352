//! Interfaces the use cases depend on.
//!
//! The backend, the broker and the client-local storage are external collaborators;
//! the infrastructure layer provides the concrete implementations (dependency inversion),
//! and tests substitute fakes or mocks.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::{
    ApiError, CandidateRecord, FavoriteId, FavoriteRecord, GuestIdentity, Place, PlaceId,
    RoomCode, StorageError, TransportError, UserId,
};

/// Durable or session-scoped key-value storage.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Favorites endpoints of the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FavoriteApi: Send + Sync {
    /// `POST /api/favorites`; returns the server-assigned record id.
    async fn create_favorite(
        &self,
        user_id: UserId,
        place_id: PlaceId,
    ) -> Result<FavoriteId, ApiError>;

    /// `DELETE /api/favorites/{favoriteId}`
    async fn delete_favorite(&self, favorite_id: FavoriteId) -> Result<(), ApiError>;

    /// `GET /api/favorites/{userId}`
    async fn list_favorites(&self, user_id: UserId) -> Result<Vec<FavoriteRecord>, ApiError>;
}

/// Candidate history endpoint of the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandidateApi: Send + Sync {
    /// `GET /api/candidate/history/{roomCode}`
    async fn candidate_history(&self, room: &RoomCode) -> Result<Vec<CandidateRecord>, ApiError>;
}

/// Place detail endpoint of the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaceApi: Send + Sync {
    /// `GET /api/places/{id}`
    async fn place_detail(&self, place_id: PlaceId) -> Result<Place, ApiError>;
}

/// Guest authentication endpoint of the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /api/auth/guest`
    async fn issue_guest(&self) -> Result<GuestIdentity, ApiError>;
}

/// Room membership endpoint of the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomApi: Send + Sync {
    /// `POST /api/rooms/{id}`
    async fn join_room(&self, room: &RoomCode) -> Result<(), ApiError>;
}

/// A text frame on its way to the broker.
///
/// `written` fires once the frame is on the wire. It is dropped unfired when the link dies
/// before that.
#[derive(Debug)]
pub struct OutgoingFrame {
    pub text: String,
    pub written: oneshot::Sender<()>,
}

impl OutgoingFrame {
    pub fn new(text: String) -> (Self, oneshot::Receiver<()>) {
        let (written, ack) = oneshot::channel();
        (Self { text, written }, ack)
    }
}

/// An open text-frame link to the broker.
///
/// Sending fails once the link is gone; `incoming` yields `None` when the broker side
/// closes.
#[derive(Debug)]
pub struct TransportLink {
    pub outgoing: mpsc::UnboundedSender<OutgoingFrame>,
    pub incoming: mpsc::UnboundedReceiver<String>,
}

impl TransportLink {
    /// Hand a frame to the link without waiting for it to be written.
    pub fn post(&self, text: String) -> Result<(), TransportError> {
        let (frame, _ack) = OutgoingFrame::new(text);
        self.outgoing
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    /// Hand a frame to the link and wait until it has been written.
    pub async fn write(&self, text: String) -> Result<(), TransportError> {
        let (frame, ack) = OutgoingFrame::new(text);
        self.outgoing
            .send(frame)
            .map_err(|_| TransportError::Closed)?;
        ack.await.map_err(|_| TransportError::Closed)
    }
}

/// Opens links to the message broker.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn open(&self) -> Result<TransportLink, TransportError>;
}

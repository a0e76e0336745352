//! Domain layer: value objects, entities, errors and the interfaces the other layers
//! depend on.

pub mod entity;
pub mod error;
pub mod repository;
pub mod value_object;

pub use entity::{
    CandidateRecord, FavoriteRecord, GuestIdentity, MapMarker, OutboundAction, Place,
    PlaceCandidate,
};
pub use error::{ApiError, StorageError, TransportError, ValueObjectError};
pub use repository::{
    AuthApi, BrokerTransport, CandidateApi, FavoriteApi, KeyValueStorage, OutgoingFrame,
    PlaceApi, RoomApi, TransportLink,
};
pub use value_object::{
    ActionType, ConnectionState, Coordinates, FavoriteId, PlaceId, RoomCode, UserId,
};

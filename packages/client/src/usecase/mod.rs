//! UseCase layer: the client-side state machines of a room.
//!
//! - `local_state_store`: optimistic favorites, candidates and votes
//! - `realtime_channel`: broker connection, outbound queue and snapshots
//! - `tombstone_ledger`: per-room suppression of locally removed candidates
//! - `reconciler`: pure derivation of the candidates and markers to show
//! - `room_controller`: wiring of the above for one room
//! - `guest_auth`: guest identity issuance

pub mod error;
pub mod guest_auth;
pub mod local_state_store;
pub mod realtime_channel;
pub mod reconciler;
pub mod room_controller;
pub mod tombstone_ledger;

pub use error::{ChannelError, GuestAuthError, LedgerError, RoomError, StoreError};
pub use guest_auth::{GuestAuthSettings, GuestAuthenticator};
pub use local_state_store::{LocalStateStore, StoreState};
pub use realtime_channel::{ChannelSettings, RealtimeChannelClient, SnapshotCallback};
pub use room_controller::{Panel, RoomController, RoomEvent, RoomServices};
pub use tombstone_ledger::{TombstoneChange, TombstoneChangeKind, TombstoneLedger};

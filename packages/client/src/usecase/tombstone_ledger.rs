//! UseCase: Tombstone 管理
//!
//! ローカルで候補から外した場所が、削除を反映する前の古いスナップショットによって
//! 再表示されないよう、ルームごとに抑止対象の placeId を永続化します。
//!
//! Tombstone はこのクライアント内だけの助言的なマーカーです。他のクライアントの表示には
//! 影響しません。同じ場所を再び候補に追加した時にのみ解除されます
//! （スナップショットに含まれなくなっても自動では解除しません）。

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tokio::sync::{Mutex, broadcast};

use crate::domain::{KeyValueStorage, PlaceId, RoomCode};

use super::error::LedgerError;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Storage key of a room's tombstone set.
pub fn tombstone_key(room: &RoomCode) -> String {
    format!("tombstones:{}", room)
}

/// Kind of tombstone change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TombstoneChangeKind {
    Added,
    Removed,
}

/// Notification emitted when a room's tombstone set changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TombstoneChange {
    pub room: RoomCode,
    pub place_id: PlaceId,
    pub kind: TombstoneChangeKind,
}

/// Per-room persisted set of suppressed candidate ids.
pub struct TombstoneLedger {
    storage: Arc<dyn KeyValueStorage>,
    /// Write-through cache of the loaded rooms.
    rooms: Mutex<HashMap<RoomCode, HashSet<PlaceId>>>,
    changes: broadcast::Sender<TombstoneChange>,
}

impl TombstoneLedger {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            storage,
            rooms: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Observe tombstone changes.
    pub fn subscribe(&self) -> broadcast::Receiver<TombstoneChange> {
        self.changes.subscribe()
    }

    /// Current tombstones of the room.
    pub async fn tombstones(&self, room: &RoomCode) -> Result<HashSet<PlaceId>, LedgerError> {
        let mut rooms = self.rooms.lock().await;
        if let Some(set) = rooms.get(room) {
            return Ok(set.clone());
        }
        let set = self.load(room).await?;
        rooms.insert(room.clone(), set.clone());
        Ok(set)
    }

    pub async fn contains(&self, room: &RoomCode, place_id: PlaceId) -> Result<bool, LedgerError> {
        Ok(self.tombstones(room).await?.contains(&place_id))
    }

    /// Suppress `place_id` in `room` after a local removal.
    pub async fn add_tombstone(&self, room: &RoomCode, place_id: PlaceId) -> Result<(), LedgerError> {
        self.update(room, place_id, TombstoneChangeKind::Added).await
    }

    /// Lift the suppression after the same user re-adds `place_id`.
    pub async fn remove_tombstone(
        &self,
        room: &RoomCode,
        place_id: PlaceId,
    ) -> Result<(), LedgerError> {
        self.update(room, place_id, TombstoneChangeKind::Removed).await
    }

    async fn update(
        &self,
        room: &RoomCode,
        place_id: PlaceId,
        kind: TombstoneChangeKind,
    ) -> Result<(), LedgerError> {
        let mut rooms = self.rooms.lock().await;
        let mut set = match rooms.get(room) {
            Some(set) => set.clone(),
            None => self.load(room).await?,
        };
        let changed = match kind {
            TombstoneChangeKind::Added => set.insert(place_id),
            TombstoneChangeKind::Removed => set.remove(&place_id),
        };
        if changed {
            self.persist(room, &set).await?;
        }
        rooms.insert(room.clone(), set);
        drop(rooms);

        if changed {
            tracing::debug!("Tombstone {:?} for place {} in room {}", kind, place_id, room);
            // No receivers is fine.
            let _ = self.changes.send(TombstoneChange {
                room: room.clone(),
                place_id,
                kind,
            });
        }
        Ok(())
    }

    async fn load(&self, room: &RoomCode) -> Result<HashSet<PlaceId>, LedgerError> {
        let key = tombstone_key(room);
        let Some(raw) = self.storage.get(&key).await? else {
            return Ok(HashSet::new());
        };
        match serde_json::from_str::<Vec<PlaceId>>(&raw) {
            Ok(ids) => Ok(ids.into_iter().collect()),
            Err(e) => {
                tracing::warn!("Ignoring unreadable tombstones under '{}': {}", key, e);
                Ok(HashSet::new())
            }
        }
    }

    async fn persist(&self, room: &RoomCode, set: &HashSet<PlaceId>) -> Result<(), LedgerError> {
        let key = tombstone_key(room);
        if set.is_empty() {
            self.storage.remove(&key).await?;
            return Ok(());
        }
        let mut ids: Vec<PlaceId> = set.iter().copied().collect();
        ids.sort();
        let raw = serde_json::to_string(&ids)
            .map_err(|e| crate::domain::StorageError::Io(e.to_string()))?;
        self.storage.set(&key, raw).await?;
        Ok(())
    }
}

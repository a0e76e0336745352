//! UseCase: ローカル状態ストア
//!
//! お気に入り・候補・投票のクライアント側ミラーです。
//!
//! - お気に入りの切り替えは楽観的に反映し、バックエンドの結果で確定またはロールバックする
//! - 候補・投票の切り替えはローカルのみ（ブローカーへの送信は呼び出し側の責務）
//! - 変更のたびに `restaurant-store` キーへスナップショットを書き出す（ベストエフォート）
//!
//! ロックはバックエンド呼び出しをまたいで保持しません。

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::domain::{
    CandidateApi, FavoriteApi, FavoriteId, KeyValueStorage, PlaceCandidate, PlaceId, RoomCode,
    UserId,
};

use super::error::StoreError;

/// Storage key of the persisted store snapshot.
pub const STORE_KEY: &str = "restaurant-store";

/// In-memory state of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreState {
    pub favorites: HashSet<PlaceId>,
    /// placeId → server favorite record id.
    pub favorite_index: HashMap<PlaceId, FavoriteId>,
    pub candidates: HashSet<PlaceId>,
    /// Local additions not yet confirmed by a snapshot.
    pub pending_candidates: HashSet<PlaceId>,
    pub voted: HashSet<PlaceId>,
    pub vote_counts: HashMap<PlaceId, u32>,
}

/// Persisted form: sets become arrays.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedStore {
    #[serde(default)]
    favorites: Vec<PlaceId>,
    #[serde(default)]
    favorite_index: Vec<(PlaceId, FavoriteId)>,
    #[serde(default)]
    candidates: Vec<PlaceId>,
    #[serde(default)]
    pending_candidates: Vec<PlaceId>,
    #[serde(default)]
    voted_restaurants: Vec<PlaceId>,
    #[serde(default)]
    vote_counts: Vec<(PlaceId, u32)>,
}

impl From<&StoreState> for PersistedStore {
    fn from(state: &StoreState) -> Self {
        fn sorted<T: Ord + Copy>(items: impl Iterator<Item = T>) -> Vec<T> {
            let mut items: Vec<T> = items.collect();
            items.sort();
            items
        }
        Self {
            favorites: sorted(state.favorites.iter().copied()),
            favorite_index: sorted(state.favorite_index.iter().map(|(k, v)| (*k, *v))),
            candidates: sorted(state.candidates.iter().copied()),
            pending_candidates: sorted(state.pending_candidates.iter().copied()),
            voted_restaurants: sorted(state.voted.iter().copied()),
            vote_counts: sorted(state.vote_counts.iter().map(|(k, v)| (*k, *v))),
        }
    }
}

impl From<PersistedStore> for StoreState {
    fn from(persisted: PersistedStore) -> Self {
        Self {
            favorites: persisted.favorites.into_iter().collect(),
            favorite_index: persisted.favorite_index.into_iter().collect(),
            candidates: persisted.candidates.into_iter().collect(),
            pending_candidates: persisted.pending_candidates.into_iter().collect(),
            voted: persisted.voted_restaurants.into_iter().collect(),
            vote_counts: persisted.vote_counts.into_iter().collect(),
        }
    }
}

/// Backend call owed by one favorite toggle, with what undoing it locally means.
enum FavoriteCall {
    Create,
    Delete(FavoriteId),
}

impl FavoriteCall {
    /// Undo the optimistic change for `place_id` only; other places are left alone.
    fn roll_back(&self, state: &mut StoreState, place_id: PlaceId) {
        match self {
            Self::Create => {
                state.favorites.remove(&place_id);
                state.favorite_index.remove(&place_id);
            }
            Self::Delete(favorite_id) => {
                state.favorites.insert(place_id);
                state.favorite_index.insert(place_id, *favorite_id);
            }
        }
    }
}

/// Client-side optimistic store of favorites, candidates and votes.
pub struct LocalStateStore {
    state: Mutex<StoreState>,
    favorite_api: Arc<dyn FavoriteApi>,
    candidate_api: Arc<dyn CandidateApi>,
    storage: Arc<dyn KeyValueStorage>,
}

impl LocalStateStore {
    pub fn new(
        favorite_api: Arc<dyn FavoriteApi>,
        candidate_api: Arc<dyn CandidateApi>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            favorite_api,
            candidate_api,
            storage,
        }
    }

    /// Rehydrate from the persisted snapshot, if any.
    ///
    /// An unreadable snapshot is discarded; a failing storage is an error.
    pub async fn load(&self) -> Result<(), StoreError> {
        let Some(raw) = self.storage.get(STORE_KEY).await? else {
            return Ok(());
        };
        match serde_json::from_str::<PersistedStore>(&raw) {
            Ok(persisted) => {
                *self.state.lock().await = persisted.into();
                tracing::debug!("Restored local store from '{}'", STORE_KEY);
            }
            Err(e) => tracing::warn!("Discarding unreadable store snapshot: {}", e),
        }
        Ok(())
    }

    /// Copy of the whole state.
    pub async fn state(&self) -> StoreState {
        self.state.lock().await.clone()
    }

    pub async fn favorites(&self) -> HashSet<PlaceId> {
        self.state.lock().await.favorites.clone()
    }

    pub async fn favorite_index(&self) -> HashMap<PlaceId, FavoriteId> {
        self.state.lock().await.favorite_index.clone()
    }

    pub async fn candidates(&self) -> HashSet<PlaceId> {
        self.state.lock().await.candidates.clone()
    }

    pub async fn pending_candidates(&self) -> HashSet<PlaceId> {
        self.state.lock().await.pending_candidates.clone()
    }

    pub async fn is_favorited(&self, place_id: PlaceId) -> bool {
        self.state.lock().await.favorites.contains(&place_id)
    }

    pub async fn is_candidate(&self, place_id: PlaceId) -> bool {
        self.state.lock().await.candidates.contains(&place_id)
    }

    pub async fn is_voted(&self, place_id: PlaceId) -> bool {
        self.state.lock().await.voted.contains(&place_id)
    }

    pub async fn vote_count(&self, place_id: PlaceId) -> u32 {
        self.state
            .lock()
            .await
            .vote_counts
            .get(&place_id)
            .copied()
            .unwrap_or(0)
    }

    /// Toggle the favorite state of `place_id`, confirming with the backend.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - the place is now a favorite
    /// * `Ok(false)` - the place is no longer a favorite
    /// * `Err(StoreError::MissingFavoriteRecord)` - favorited without a known record id;
    ///   nothing was changed or sent
    /// * `Err(StoreError::FavoriteSyncFailed)` - the backend call failed; this place's
    ///   favorite and index entry are back to their pre-call values
    pub async fn toggle_favorite(
        &self,
        place_id: PlaceId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        let call = {
            let mut state = self.state.lock().await;
            if state.favorites.contains(&place_id) {
                let Some(favorite_id) = state.favorite_index.get(&place_id).copied() else {
                    return Err(StoreError::MissingFavoriteRecord(place_id));
                };
                state.favorites.remove(&place_id);
                state.favorite_index.remove(&place_id);
                FavoriteCall::Delete(favorite_id)
            } else {
                state.favorites.insert(place_id);
                FavoriteCall::Create
            }
        };

        let result = match &call {
            FavoriteCall::Create => self
                .favorite_api
                .create_favorite(user_id, place_id)
                .await
                .map(Some),
            FavoriteCall::Delete(favorite_id) => self
                .favorite_api
                .delete_favorite(*favorite_id)
                .await
                .map(|_| None),
        };

        let mut state = self.state.lock().await;
        match result {
            Ok(created) => {
                if let Some(favorite_id) = created {
                    state.favorite_index.insert(place_id, favorite_id);
                }
                let favorited = state.favorites.contains(&place_id);
                self.persist(&state).await;
                Ok(favorited)
            }
            Err(source) => {
                call.roll_back(&mut state, place_id);
                self.persist(&state).await;
                tracing::warn!(
                    "Rolled back favorite toggle for place {}: {}",
                    place_id,
                    source
                );
                Err(StoreError::FavoriteSyncFailed { place_id, source })
            }
        }
    }

    /// Flip candidate membership locally and return the new membership.
    pub async fn toggle_candidate(&self, place_id: PlaceId) -> bool {
        let mut state = self.state.lock().await;
        let now_candidate = if state.candidates.remove(&place_id) {
            state.pending_candidates.remove(&place_id);
            false
        } else {
            state.candidates.insert(place_id);
            state.pending_candidates.insert(place_id);
            true
        };
        self.persist(&state).await;
        now_candidate
    }

    /// Flip the vote of the current user; the count moves by one and never drops below 0.
    pub async fn toggle_vote(&self, place_id: PlaceId) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now_voted = !state.voted.remove(&place_id);
        let count = state.vote_counts.entry(place_id).or_insert(0);
        if now_voted {
            state.voted.insert(place_id);
            *count = count.saturating_add(1);
        } else {
            *count = count.saturating_sub(1);
        }
        self.persist(state).await;
        now_voted
    }

    /// Vote unless already voted.
    pub async fn vote_once(&self, place_id: PlaceId) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if !state.voted.insert(place_id) {
            return;
        }
        let count = state.vote_counts.entry(place_id).or_insert(0);
        *count = count.saturating_add(1);
        self.persist(state).await;
    }

    /// Replace favorites and index with the backend listing.
    pub async fn hydrate_favorites(&self, user_id: UserId) -> Result<(), StoreError> {
        let records = self.favorite_api.list_favorites(user_id).await?;
        let mut state = self.state.lock().await;
        state.favorites = records.iter().map(|r| r.place_id).collect();
        state.favorite_index = records
            .iter()
            .map(|r| (r.place_id, r.favorite_id))
            .collect();
        tracing::debug!("Hydrated {} favorites for user {}", records.len(), user_id);
        self.persist(&state).await;
        Ok(())
    }

    /// Replace candidates and votes with the room's candidate history.
    ///
    /// Returns the normalized candidates so callers can seed their view.
    pub async fn hydrate_candidates(
        &self,
        room: &RoomCode,
        current_user: Option<UserId>,
    ) -> Result<Vec<PlaceCandidate>, StoreError> {
        let records = self.candidate_api.candidate_history(room).await?;
        let candidates: Vec<PlaceCandidate> = records
            .into_iter()
            .map(|record| record.into_candidate(current_user))
            .collect();
        let mut state = self.state.lock().await;
        state.pending_candidates.clear();
        Self::replace_candidates(&mut state, &candidates);
        tracing::debug!(
            "Hydrated {} candidates for room {}",
            candidates.len(),
            room
        );
        self.persist(&state).await;
        Ok(candidates)
    }

    /// Adopt a snapshot (already stripped of tombstoned ids) as the candidate membership
    /// and vote state; unconfirmed local additions are kept.
    pub async fn apply_snapshot(&self, visible: &[PlaceCandidate]) {
        let mut state = self.state.lock().await;
        for candidate in visible {
            state.pending_candidates.remove(&candidate.id());
        }
        Self::replace_candidates(&mut state, visible);
        let pending: Vec<PlaceId> = state.pending_candidates.iter().copied().collect();
        state.candidates.extend(pending);
        self.persist(&state).await;
    }

    /// Clear everything (logout, room exit).
    pub async fn reset_state(&self) {
        let mut state = self.state.lock().await;
        *state = StoreState::default();
        if let Err(e) = self.storage.remove(STORE_KEY).await {
            tracing::warn!("Failed to clear persisted store: {}", e);
        }
    }

    fn replace_candidates(state: &mut StoreState, candidates: &[PlaceCandidate]) {
        state.candidates = candidates.iter().map(|c| c.id()).collect();
        state.voted = candidates
            .iter()
            .filter(|c| c.voted_by_current_user)
            .map(|c| c.id())
            .collect();
        state.vote_counts = candidates.iter().map(|c| (c.id(), c.vote_count)).collect();
    }

    async fn persist(&self, state: &StoreState) {
        let persisted = PersistedStore::from(state);
        let raw = match serde_json::to_string(&persisted) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Failed to serialize store snapshot: {}", e);
                return;
            }
        };
        if let Err(e) = self.storage.set(STORE_KEY, raw).await {
            tracing::warn!("Failed to persist store snapshot: {}", e);
        }
    }
}

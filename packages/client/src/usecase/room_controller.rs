//! UseCase: ルームの操作
//!
//! 1 つのルームについて、ローカル状態ストア・Tombstone・リアルタイムチャンネル・
//! バックエンド API を束ねます。
//!
//! - スナップショットを受け取るたびに Tombstone を適用してストアへ反映し、表示用の候補を再計算する
//! - 候補の追加・削除はストアへ楽観的に反映し、Tombstone を更新してからアクションを送信する
//! - スナップショットの反映と候補のトグルは同じロックで直列化する
//! - Tombstone の変化や投票の切り替えでも表示用の候補を再計算する
//! - 表示の変化は `RoomEvent` として購読者へ通知する

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tokio::{
    sync::{
        Mutex,
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::JoinHandle,
};

use crate::domain::{
    ActionType, MapMarker, OutboundAction, Place, PlaceApi, PlaceCandidate, PlaceId, RoomApi,
    RoomCode, UserId,
};

use super::{
    error::RoomError,
    local_state_store::LocalStateStore,
    realtime_channel::{RealtimeChannelClient, SnapshotCallback},
    reconciler::{apply_tombstones, merge_markers, overlay_votes, reconcile_candidates},
    tombstone_ledger::TombstoneLedger,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// UI panel a room event asks to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Candidates,
}

/// Notifications for whoever renders the room.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// The reconciled candidate list changed.
    CandidatesChanged(Vec<PlaceCandidate>),
    /// The user nominated a place; the candidate panel should open.
    PanelRequested(Panel),
}

/// Collaborators of a room controller.
#[derive(Clone)]
pub struct RoomServices {
    pub store: Arc<LocalStateStore>,
    pub ledger: Arc<TombstoneLedger>,
    pub channel: Arc<RealtimeChannelClient>,
    pub places: Arc<dyn PlaceApi>,
    pub rooms: Arc<dyn RoomApi>,
}

#[derive(Default)]
struct RoomView {
    /// Last snapshot as received, tombstones included.
    snapshot: Vec<PlaceCandidate>,
    /// Reconciled candidates.
    visible: Vec<PlaceCandidate>,
    search_results: Vec<Place>,
    /// Every place seen so far; optimistic candidates are rendered from it.
    catalog: HashMap<PlaceId, Place>,
}

impl RoomView {
    fn remember(&mut self, place: &Place) {
        self.catalog.insert(place.id, place.clone());
    }
}

/// State the snapshot task shares with the controller.
struct RoomShared {
    room: RoomCode,
    store: Arc<LocalStateStore>,
    ledger: Arc<TombstoneLedger>,
    /// Held while candidate membership and tombstones are changed together.
    membership: Mutex<()>,
    view: Mutex<RoomView>,
    events: broadcast::Sender<RoomEvent>,
}

impl RoomShared {
    async fn tombstones(&self) -> HashSet<PlaceId> {
        self.ledger
            .tombstones(&self.room)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Tombstones of room {} unavailable: {}", self.room, e);
                HashSet::new()
            })
    }

    /// Adopt a full snapshot from the broker or the history endpoint.
    async fn on_snapshot(&self, snapshot: Vec<PlaceCandidate>) {
        {
            let _membership = self.membership.lock().await;
            let tombstones = self.tombstones().await;
            let visible = apply_tombstones(&snapshot, &tombstones);
            self.store.apply_snapshot(&visible).await;
        }
        {
            let mut view = self.view.lock().await;
            for candidate in &snapshot {
                view.remember(&candidate.place);
            }
            view.snapshot = snapshot;
        }
        self.recompute().await;
    }

    /// Rebuild the visible candidates and notify subscribers.
    async fn recompute(&self) -> Vec<PlaceCandidate> {
        let tombstones = self.tombstones().await;
        let state = self.store.state().await;
        let mut pending: Vec<PlaceId> = state.pending_candidates.iter().copied().collect();
        pending.sort();

        let visible = {
            let mut view = self.view.lock().await;
            let optimistic: Vec<PlaceCandidate> = pending
                .iter()
                .filter_map(|id| view.catalog.get(id))
                .map(|place| PlaceCandidate {
                    place: place.clone(),
                    vote_count: 0,
                    voted_by_current_user: false,
                })
                .collect();
            let mut visible = reconcile_candidates(&view.snapshot, &tombstones, &optimistic);
            overlay_votes(&mut visible, &state.vote_counts, &state.voted);
            view.visible = visible.clone();
            visible
        };
        // No subscribers is fine.
        let _ = self
            .events
            .send(RoomEvent::CandidatesChanged(visible.clone()));
        visible
    }
}

/// Controller of one room for one user.
pub struct RoomController {
    shared: Arc<RoomShared>,
    user: Option<UserId>,
    channel: Arc<RealtimeChannelClient>,
    places: Arc<dyn PlaceApi>,
    rooms: Arc<dyn RoomApi>,
    /// Snapshot and tombstone listeners of the current visit.
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl RoomController {
    pub fn new(room: RoomCode, user: Option<UserId>, services: RoomServices) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(RoomShared {
                room,
                store: services.store,
                ledger: services.ledger,
                membership: Mutex::new(()),
                view: Mutex::new(RoomView::default()),
                events,
            }),
            user,
            channel: services.channel,
            places: services.places,
            rooms: services.rooms,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn room(&self) -> &RoomCode {
        &self.shared.room
    }

    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    /// Observe room events.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.shared.events.subscribe()
    }

    /// Hydrate from the backend, join the room and open its realtime channel.
    pub async fn enter(&self) -> Result<(), RoomError> {
        let room = &self.shared.room;
        let history = self
            .shared
            .store
            .hydrate_candidates(room, self.user)
            .await?;
        self.shared.on_snapshot(history).await;

        if let Some(user) = self.user
            && let Err(e) = self.shared.store.hydrate_favorites(user).await
        {
            tracing::warn!("Favorites of user {} not loaded: {}", user, e);
        }
        self.rooms.join_room(room).await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PlaceCandidate>>();
        let shared = self.shared.clone();
        let snapshots = tokio::spawn(async move {
            while let Some(snapshot) = rx.recv().await {
                shared.on_snapshot(snapshot).await;
            }
        });
        let tombstones = self.watch_tombstones();
        {
            let mut listeners = self.listeners.lock().await;
            for previous in listeners.drain(..) {
                previous.abort();
            }
            listeners.extend([snapshots, tombstones]);
        }
        let on_update: SnapshotCallback = Arc::new(move |snapshot| {
            let _ = tx.send(snapshot);
        });
        self.channel.init(room.clone(), on_update).await;
        tracing::info!("Entered room {}", room);
        Ok(())
    }

    /// Recompute whenever this room's tombstones change, whoever changed them.
    fn watch_tombstones(&self) -> JoinHandle<()> {
        let mut changes = self.shared.ledger.subscribe();
        let shared = self.shared.clone();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if change.room == shared.room => {
                        shared.recompute().await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Missed {} tombstone changes, recomputing", skipped);
                        shared.recompute().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Nominate or withdraw `place_id`; returns whether it is now a candidate.
    ///
    /// A withdrawal is tombstoned so that snapshots still carrying the place keep it
    /// hidden; nominating again lifts the tombstone.
    pub async fn toggle_candidate(&self, place_id: PlaceId) -> Result<bool, RoomError> {
        let room = &self.shared.room;
        let known = self.shared.view.lock().await.catalog.contains_key(&place_id);
        if !known && let Err(e) = self.enrich_place(place_id).await {
            tracing::warn!("No details for place {}: {}", place_id, e);
        }

        let now_candidate = {
            let _membership = self.shared.membership.lock().await;
            // A withdrawn place is tombstoned before it leaves the store.
            if self.shared.store.is_candidate(place_id).await {
                self.shared.ledger.add_tombstone(room, place_id).await?;
            }
            let now_candidate = self.shared.store.toggle_candidate(place_id).await;
            if now_candidate {
                self.shared.ledger.remove_tombstone(room, place_id).await?;
            }
            now_candidate
        };
        let action_type = if now_candidate {
            ActionType::AddPlace
        } else {
            ActionType::RemovePlace
        };
        self.channel
            .send_action(OutboundAction::new(place_id, action_type, None))
            .await?;
        if now_candidate {
            let _ = self
                .shared
                .events
                .send(RoomEvent::PanelRequested(Panel::Candidates));
        }
        self.shared.recompute().await;
        Ok(now_candidate)
    }

    /// Vote for `place_id` or take the vote back; returns whether it is now voted.
    pub async fn toggle_vote(&self, place_id: PlaceId) -> Result<bool, RoomError> {
        let user = self.user.ok_or(RoomError::NotAuthenticated)?;
        let now_voted = self.shared.store.toggle_vote(place_id).await;
        let action_type = if now_voted {
            ActionType::AddVote
        } else {
            ActionType::RemoveVote
        };
        self.channel
            .send_action(OutboundAction::new(place_id, action_type, Some(user)))
            .await?;
        self.shared.recompute().await;
        Ok(now_voted)
    }

    /// Favorite or unfavorite `place_id`; returns whether it is now a favorite.
    pub async fn toggle_favorite(&self, place_id: PlaceId) -> Result<bool, RoomError> {
        let user = self.user.ok_or(RoomError::NotAuthenticated)?;
        Ok(self.shared.store.toggle_favorite(place_id, user).await?)
    }

    /// Replace the search results shown next to the candidates.
    pub async fn show_search_results(&self, places: Vec<Place>) {
        let mut view = self.shared.view.lock().await;
        for place in &places {
            view.remember(place);
        }
        view.search_results = places;
    }

    /// Fetch full details of a place and remember them.
    pub async fn enrich_place(&self, place_id: PlaceId) -> Result<Place, RoomError> {
        let place = self.places.place_detail(place_id).await?;
        let mut view = self.shared.view.lock().await;
        view.remember(&place);
        if let Some(result) = view.search_results.iter_mut().find(|p| p.id == place_id) {
            *result = place.clone();
        }
        Ok(place)
    }

    /// Reconciled candidates.
    pub async fn candidates(&self) -> Vec<PlaceCandidate> {
        self.shared.view.lock().await.visible.clone()
    }

    /// Map markers for the search results and the candidates.
    pub async fn markers(&self) -> Vec<MapMarker> {
        let view = self.shared.view.lock().await;
        merge_markers(&view.search_results, &view.visible)
    }

    pub async fn is_favorited(&self, place_id: PlaceId) -> bool {
        self.shared.store.is_favorited(place_id).await
    }

    pub async fn is_voted(&self, place_id: PlaceId) -> bool {
        self.shared.store.is_voted(place_id).await
    }

    /// Leave the room: close the channel and clear local state. Tombstones are kept.
    pub async fn exit(&self) {
        self.channel.teardown().await;
        for task in self.listeners.lock().await.drain(..) {
            task.abort();
        }
        self.shared.store.reset_state().await;
        *self.shared.view.lock().await = RoomView::default();
        tracing::info!("Left room {}", self.shared.room);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::{
        domain::{
            ApiError, BrokerTransport, CandidateRecord, ConnectionState, Coordinates,
            KeyValueStorage, StorageError, TransportError, TransportLink,
            repository::{MockCandidateApi, MockFavoriteApi, MockPlaceApi, MockRoomApi},
        },
        infrastructure::storage::InMemoryStorage,
        usecase::{local_state_store::STORE_KEY, realtime_channel::ChannelSettings},
    };

    const ROOM: &str = "ROOM1";
    const USER: i64 = 7;

    struct OfflineTransport;

    #[async_trait]
    impl BrokerTransport for OfflineTransport {
        async fn open(&self) -> Result<TransportLink, TransportError> {
            Err(TransportError::Connect("offline".to_string()))
        }
    }

    /// Pauses the next write of the store snapshot until released.
    #[derive(Default)]
    struct GatedStorage {
        inner: InMemoryStorage,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl KeyValueStorage for GatedStorage {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
            if key == STORE_KEY && self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key).await
        }
    }

    fn place(id: i64, name: &str) -> Place {
        Place {
            id: PlaceId::new(id),
            name: name.to_string(),
            category: Some("korean".to_string()),
            address: None,
            coordinates: Coordinates::new(37.5, 127.0),
        }
    }

    fn record(id: i64, voters: &[i64]) -> CandidateRecord {
        CandidateRecord {
            place: place(id, &format!("place-{}", id)),
            voted_user_ids: voters.iter().copied().map(UserId::new).collect(),
            vote_count: voters.len() as u32,
        }
    }

    fn candidate(id: i64) -> PlaceCandidate {
        record(id, &[]).into_candidate(Some(UserId::new(USER)))
    }

    fn room() -> RoomCode {
        RoomCode::new(ROOM.to_string()).unwrap()
    }

    struct Fixture {
        controller: RoomController,
        ledger: Arc<TombstoneLedger>,
        store: Arc<LocalStateStore>,
        channel: Arc<RealtimeChannelClient>,
    }

    fn create_fixture(
        user: Option<UserId>,
        history: Vec<CandidateRecord>,
        places: MockPlaceApi,
    ) -> Fixture {
        create_fixture_with(user, history, places, Arc::new(InMemoryStorage::new()))
    }

    fn create_fixture_with(
        user: Option<UserId>,
        history: Vec<CandidateRecord>,
        places: MockPlaceApi,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Fixture {
        let mut favorite_api = MockFavoriteApi::new();
        favorite_api.expect_list_favorites().returning(|_| Ok(vec![]));
        let mut candidate_api = MockCandidateApi::new();
        candidate_api
            .expect_candidate_history()
            .returning(move |_| Ok(history.clone()));
        let mut rooms = MockRoomApi::new();
        rooms.expect_join_room().returning(|_| Ok(()));

        let store = Arc::new(LocalStateStore::new(
            Arc::new(favorite_api),
            Arc::new(candidate_api),
            storage.clone(),
        ));
        let ledger = Arc::new(TombstoneLedger::new(storage));
        let channel = Arc::new(RealtimeChannelClient::new(
            Arc::new(OfflineTransport),
            ChannelSettings {
                reconnect_delay: Duration::from_secs(60),
                ..ChannelSettings::default()
            },
        ));
        let controller = RoomController::new(
            room(),
            user,
            RoomServices {
                store: store.clone(),
                ledger: ledger.clone(),
                channel: channel.clone(),
                places: Arc::new(places),
                rooms: Arc::new(rooms),
            },
        );
        Fixture {
            controller,
            ledger,
            store,
            channel,
        }
    }

    fn ids(candidates: &[PlaceCandidate]) -> Vec<i64> {
        candidates.iter().map(|c| c.id().value()).collect()
    }

    #[tokio::test]
    async fn test_enter_applies_history_without_tombstoned_places() {
        // テスト項目: 入室時に履歴を取得し、Tombstone 済みの候補を除いて表示する
        // given (前提条件):
        let fixture = create_fixture(
            Some(UserId::new(USER)),
            vec![record(41, &[USER]), record(42, &[])],
            MockPlaceApi::new(),
        );
        fixture
            .ledger
            .add_tombstone(&room(), PlaceId::new(42))
            .await
            .unwrap();

        // when (操作):
        fixture.controller.enter().await.unwrap();

        // then (期待する結果):
        let candidates = fixture.controller.candidates().await;
        assert_eq!(ids(&candidates), vec![41]);
        assert!(candidates[0].voted_by_current_user);
        assert!(fixture.store.is_candidate(PlaceId::new(41)).await);
        assert!(!fixture.store.is_candidate(PlaceId::new(42)).await);
        assert_eq!(fixture.channel.room().await, Some(room()));
    }

    #[tokio::test]
    async fn test_removed_candidate_stays_hidden_until_readded() {
        // テスト項目: 削除した候補は、古いスナップショットに含まれていても再追加まで表示されない
        // given (前提条件):
        let fixture = create_fixture(
            Some(UserId::new(USER)),
            vec![record(42, &[]), record(43, &[])],
            MockPlaceApi::new(),
        );
        fixture.controller.enter().await.unwrap();
        let mut events = fixture.controller.subscribe();

        // when (操作): 削除後、42 を含んだままのスナップショットが届く
        let now_candidate = fixture
            .controller
            .toggle_candidate(PlaceId::new(42))
            .await
            .unwrap();
        fixture
            .controller
            .shared
            .on_snapshot(vec![candidate(42), candidate(43)])
            .await;

        // then (期待する結果):
        assert!(!now_candidate);
        assert_eq!(ids(&fixture.controller.candidates().await), vec![43]);
        assert!(
            fixture
                .ledger
                .contains(&room(), PlaceId::new(42))
                .await
                .unwrap()
        );
        assert_eq!(fixture.channel.pending_actions().await, 1);
        assert!(matches!(
            events.recv().await.unwrap(),
            RoomEvent::CandidatesChanged(_)
        ));

        // when (操作): 同じ場所を再び候補に追加する
        let now_candidate = fixture
            .controller
            .toggle_candidate(PlaceId::new(42))
            .await
            .unwrap();

        // then (期待する結果):
        assert!(now_candidate);
        assert!(
            !fixture
                .ledger
                .contains(&room(), PlaceId::new(42))
                .await
                .unwrap()
        );
        assert_eq!(ids(&fixture.controller.candidates().await), vec![42, 43]);
        assert_eq!(fixture.channel.pending_actions().await, 2);
    }

    #[tokio::test]
    async fn test_snapshot_during_withdrawal_does_not_restore_candidate() {
        // テスト項目: 候補の削除中に届いたスナップショットが、削除した場所をストアへ戻さない
        // given (前提条件): 42 の削除がストアの永続化で止まっている間にスナップショットが届く
        let storage = Arc::new(GatedStorage::default());
        let fixture = create_fixture_with(
            Some(UserId::new(USER)),
            vec![record(42, &[]), record(43, &[])],
            MockPlaceApi::new(),
            storage.clone(),
        );
        fixture.controller.enter().await.unwrap();
        storage.armed.store(true, Ordering::SeqCst);

        // when (操作):
        let (removed, _) = tokio::join!(
            fixture.controller.toggle_candidate(PlaceId::new(42)),
            async {
                storage.entered.notified().await;
                tokio::join!(
                    fixture
                        .controller
                        .shared
                        .on_snapshot(vec![candidate(42), candidate(43)]),
                    async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        storage.release.notify_one();
                    }
                );
            }
        );

        // then (期待する結果): ストアと Tombstone が重ならない
        assert_eq!(removed, Ok(false));
        assert!(!fixture.store.is_candidate(PlaceId::new(42)).await);
        assert!(
            fixture
                .ledger
                .contains(&room(), PlaceId::new(42))
                .await
                .unwrap()
        );
        assert_eq!(ids(&fixture.controller.candidates().await), vec![43]);

        // when (操作): 再び追加すると ADD として扱われる
        let readded = fixture
            .controller
            .toggle_candidate(PlaceId::new(42))
            .await
            .unwrap();

        // then (期待する結果):
        assert!(readded);
        assert!(fixture.store.is_candidate(PlaceId::new(42)).await);
        assert_eq!(fixture.channel.pending_actions().await, 2);
    }

    #[tokio::test]
    async fn test_external_tombstone_change_updates_candidates() {
        // テスト項目: トグル以外で Tombstone が変わっても、表示用の候補が再計算される
        // given (前提条件):
        let fixture = create_fixture(
            Some(UserId::new(USER)),
            vec![record(41, &[]), record(42, &[])],
            MockPlaceApi::new(),
        );
        fixture.controller.enter().await.unwrap();
        let mut events = fixture.controller.subscribe();

        // when (操作):
        fixture
            .ledger
            .add_tombstone(&room(), PlaceId::new(42))
            .await
            .unwrap();

        // then (期待する結果):
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            RoomEvent::CandidatesChanged(candidates) => assert_eq!(ids(&candidates), vec![41]),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(ids(&fixture.controller.candidates().await), vec![41]);
    }

    #[tokio::test]
    async fn test_nomination_is_shown_before_confirmation_and_opens_panel() {
        // テスト項目: 検索結果から追加した候補は、スナップショットで確定する前から表示される
        // given (前提条件):
        let fixture = create_fixture(Some(UserId::new(USER)), vec![], MockPlaceApi::new());
        fixture.controller.enter().await.unwrap();
        fixture
            .controller
            .show_search_results(vec![place(100, "Gukbap")])
            .await;
        let mut events = fixture.controller.subscribe();

        // when (操作):
        fixture
            .controller
            .toggle_candidate(PlaceId::new(100))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(
            events.recv().await.unwrap(),
            RoomEvent::PanelRequested(Panel::Candidates)
        );
        let candidates = fixture.controller.candidates().await;
        assert_eq!(ids(&candidates), vec![100]);
        assert_eq!(candidates[0].place.name, "Gukbap");
        let markers = fixture.controller.markers().await;
        assert_eq!(markers.len(), 1);
        assert!(markers[0].is_candidate);
    }

    #[tokio::test]
    async fn test_unknown_place_is_enriched_before_nomination() {
        // テスト項目: カタログにない場所を追加すると詳細を取得してから表示する
        // given (前提条件):
        let mut places = MockPlaceApi::new();
        places
            .expect_place_detail()
            .times(1)
            .returning(|id| Ok(place(id.value(), "Samgyeopsal")));
        let fixture = create_fixture(Some(UserId::new(USER)), vec![], places);
        fixture.controller.enter().await.unwrap();

        // when (操作):
        fixture
            .controller
            .toggle_candidate(PlaceId::new(200))
            .await
            .unwrap();

        // then (期待する結果):
        let candidates = fixture.controller.candidates().await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].place.name, "Samgyeopsal");
    }

    #[tokio::test]
    async fn test_vote_and_favorite_require_user() {
        // テスト項目: ユーザー ID がない場合、投票とお気に入りはエラーになり何も送信しない
        // given (前提条件):
        let fixture = create_fixture(None, vec![record(1, &[])], MockPlaceApi::new());
        fixture.controller.enter().await.unwrap();

        // when (操作):
        let vote = fixture.controller.toggle_vote(PlaceId::new(1)).await;
        let favorite = fixture.controller.toggle_favorite(PlaceId::new(1)).await;

        // then (期待する結果):
        assert_eq!(vote, Err(RoomError::NotAuthenticated));
        assert_eq!(favorite, Err(RoomError::NotAuthenticated));
        assert_eq!(fixture.channel.pending_actions().await, 0);
        assert!(!fixture.store.is_voted(PlaceId::new(1)).await);
    }

    #[tokio::test]
    async fn test_vote_toggle_queues_action() {
        // テスト項目: 投票の切り替えでストアが更新され、アクションがキューに積まれる
        // given (前提条件):
        let fixture = create_fixture(
            Some(UserId::new(USER)),
            vec![record(1, &[])],
            MockPlaceApi::new(),
        );
        fixture.controller.enter().await.unwrap();

        // when (操作):
        let voted = fixture.controller.toggle_vote(PlaceId::new(1)).await.unwrap();
        let unvoted = fixture.controller.toggle_vote(PlaceId::new(1)).await.unwrap();

        // then (期待する結果):
        assert!(voted);
        assert!(!unvoted);
        assert_eq!(fixture.store.vote_count(PlaceId::new(1)).await, 0);
        assert_eq!(fixture.channel.pending_actions().await, 2);
    }

    #[tokio::test]
    async fn test_vote_toggle_is_reflected_in_candidates() {
        // テスト項目: 投票の切り替えが、次のスナップショットを待たずに表示用の候補へ反映される
        // given (前提条件):
        let fixture = create_fixture(
            Some(UserId::new(USER)),
            vec![record(1, &[])],
            MockPlaceApi::new(),
        );
        fixture.controller.enter().await.unwrap();
        let mut events = fixture.controller.subscribe();

        // when (操作):
        fixture.controller.toggle_vote(PlaceId::new(1)).await.unwrap();

        // then (期待する結果):
        let candidates = fixture.controller.candidates().await;
        assert_eq!(candidates[0].vote_count, 1);
        assert!(candidates[0].voted_by_current_user);
        match events.recv().await.unwrap() {
            RoomEvent::CandidatesChanged(changed) => {
                assert_eq!(changed[0].vote_count, 1);
                assert!(changed[0].voted_by_current_user);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_enrich_failure_is_reported() {
        // テスト項目: 場所の詳細取得の失敗はエラーとして返る
        // given (前提条件):
        let mut places = MockPlaceApi::new();
        places.expect_place_detail().returning(|_| {
            Err(ApiError::Status {
                status: 404,
                body: "not found".to_string(),
            })
        });
        let fixture = create_fixture(Some(UserId::new(USER)), vec![], places);

        // when (操作):
        let result = fixture.controller.enrich_place(PlaceId::new(9)).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(RoomError::Api(ApiError::Status { status: 404, .. }))
        ));
    }

    #[tokio::test]
    async fn test_exit_resets_state_and_keeps_tombstones() {
        // テスト項目: 退室でチャンネルとストアが初期化され、Tombstone は残る
        // given (前提条件):
        let fixture = create_fixture(
            Some(UserId::new(USER)),
            vec![record(5, &[])],
            MockPlaceApi::new(),
        );
        fixture.controller.enter().await.unwrap();
        fixture
            .controller
            .toggle_candidate(PlaceId::new(5))
            .await
            .unwrap();

        // when (操作):
        fixture.controller.exit().await;

        // then (期待する結果):
        assert_eq!(fixture.channel.state(), ConnectionState::Idle);
        assert_eq!(fixture.channel.pending_actions().await, 0);
        assert!(fixture.controller.candidates().await.is_empty());
        assert!(fixture.store.candidates().await.is_empty());
        assert!(
            fixture
                .ledger
                .contains(&room(), PlaceId::new(5))
                .await
                .unwrap()
        );
    }
}

//! UseCase: ゲスト認証
//!
//! ルームに入る前に、ゲストとしてのアクセストークンとユーザー ID を用意します。
//!
//! - 保存済みのトークンがあれば再利用する
//! - なければセッションストレージの in-flight フラグ（ルーム単位）を取得した 1 つの呼び出しだけが
//!   `POST /api/auth/guest` を行い、他の呼び出しは発行完了をポーリングで待つ
//! - フラグは取得時刻を値に持ち、タイムアウトより古いものは放棄されたとみなす

use std::{sync::Arc, time::Duration};

use moyeo_shared::time::Clock;
use tokio::sync::Mutex;

use crate::domain::{AuthApi, GuestIdentity, KeyValueStorage, RoomCode, UserId};

use super::error::GuestAuthError;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_ID_KEY: &str = "userId";
pub const NICKNAME_KEY: &str = "nickname";
pub const ROOM_CODE_KEY: &str = "roomCode";

/// Session storage key of a room's in-flight flag.
pub fn inflight_key(room: &RoomCode) -> String {
    format!("guest-auth-inflight:{}", room)
}

#[derive(Debug, Clone)]
pub struct GuestAuthSettings {
    /// Interval between checks while another caller is issuing.
    pub poll_interval: Duration,
    /// Maximum wait for another caller; also the age at which a flag counts as stale.
    pub timeout: Duration,
}

impl Default for GuestAuthSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(2),
        }
    }
}

pub struct GuestAuthenticator {
    api: Arc<dyn AuthApi>,
    /// Durable storage for the identity and room binding.
    local: Arc<dyn KeyValueStorage>,
    /// Session storage for the in-flight flags.
    session: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    settings: GuestAuthSettings,
    /// Makes check-and-set of the in-flight flag atomic within the process.
    claim: Mutex<()>,
}

impl GuestAuthenticator {
    pub fn new(
        api: Arc<dyn AuthApi>,
        local: Arc<dyn KeyValueStorage>,
        session: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
        settings: GuestAuthSettings,
    ) -> Self {
        Self {
            api,
            local,
            session,
            clock,
            settings,
            claim: Mutex::new(()),
        }
    }

    /// Return a usable guest identity for `room`, issuing one when none is stored.
    ///
    /// # Errors
    ///
    /// * `GuestAuthError::Api` - the issuing request failed
    /// * `GuestAuthError::Timeout` - another caller holds the flag and never finished
    pub async fn ensure_guest(&self, room: &RoomCode) -> Result<GuestIdentity, GuestAuthError> {
        if let Some(identity) = self.stored_identity().await? {
            tracing::debug!("Reusing stored guest identity {}", identity.user_id);
            self.local
                .set(ROOM_CODE_KEY, room.as_str().to_string())
                .await?;
            return Ok(identity);
        }
        if self.try_claim(room, true).await? {
            return self.issue(room).await;
        }
        tracing::info!("Guest authentication for room {} in flight; waiting", room);
        self.wait_for_issuer(room).await
    }

    /// Identity stored by a previous authentication, if complete.
    pub async fn stored_identity(&self) -> Result<Option<GuestIdentity>, GuestAuthError> {
        let Some(access_token) = self.local.get(ACCESS_TOKEN_KEY).await? else {
            return Ok(None);
        };
        let user_id = self
            .local
            .get(USER_ID_KEY)
            .await?
            .and_then(|raw| raw.parse::<i64>().ok());
        let Some(user_id) = user_id else {
            tracing::warn!("Stored access token has no usable user id; ignoring it");
            return Ok(None);
        };
        Ok(Some(GuestIdentity {
            access_token,
            refresh_token: self.local.get(REFRESH_TOKEN_KEY).await?,
            user_id: UserId::new(user_id),
            nickname: self.local.get(NICKNAME_KEY).await?,
        }))
    }

    /// Set the in-flight flag unless another caller holds a live one.
    ///
    /// With `take_over_stale`, a flag older than the timeout is overwritten.
    async fn try_claim(&self, room: &RoomCode, take_over_stale: bool) -> Result<bool, GuestAuthError> {
        let _guard = self.claim.lock().await;
        let key = inflight_key(room);
        let now = self.clock.now_millis();
        let claimable = match self.session.get(&key).await? {
            None => true,
            Some(raw) => match raw.parse::<i64>() {
                Ok(claimed_at) => take_over_stale && now - claimed_at >= self.timeout_millis(),
                Err(_) => true,
            },
        };
        if claimable {
            self.session.set(&key, now.to_string()).await?;
        }
        Ok(claimable)
    }

    async fn issue(&self, room: &RoomCode) -> Result<GuestIdentity, GuestAuthError> {
        let result = self.api.issue_guest().await;
        if let Err(e) = self.session.remove(&inflight_key(room)).await {
            tracing::warn!("Failed to clear guest auth flag for room {}: {}", room, e);
        }
        let identity = result?;
        self.store(&identity, room).await?;
        tracing::info!("Issued guest identity {} for room {}", identity.user_id, room);
        Ok(identity)
    }

    async fn store(&self, identity: &GuestIdentity, room: &RoomCode) -> Result<(), GuestAuthError> {
        self.local
            .set(ACCESS_TOKEN_KEY, identity.access_token.clone())
            .await?;
        match &identity.refresh_token {
            Some(token) => self.local.set(REFRESH_TOKEN_KEY, token.clone()).await?,
            None => self.local.remove(REFRESH_TOKEN_KEY).await?,
        }
        match &identity.nickname {
            Some(nickname) => self.local.set(NICKNAME_KEY, nickname.clone()).await?,
            None => self.local.remove(NICKNAME_KEY).await?,
        }
        self.local
            .set(USER_ID_KEY, identity.user_id.value().to_string())
            .await?;
        self.local
            .set(ROOM_CODE_KEY, room.as_str().to_string())
            .await?;
        Ok(())
    }

    async fn wait_for_issuer(&self, room: &RoomCode) -> Result<GuestIdentity, GuestAuthError> {
        let started = tokio::time::Instant::now();
        loop {
            tokio::time::sleep(self.settings.poll_interval).await;
            if let Some(identity) = self.stored_identity().await? {
                self.local
                    .set(ROOM_CODE_KEY, room.as_str().to_string())
                    .await?;
                return Ok(identity);
            }
            // The issuer gave up without storing anything.
            if self.try_claim(room, false).await? {
                return self.issue(room).await;
            }
            let waited = started.elapsed();
            if waited >= self.settings.timeout {
                return Err(GuestAuthError::Timeout {
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }
    }

    fn timeout_millis(&self) -> i64 {
        i64::try_from(self.settings.timeout.as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use moyeo_shared::time::FixedClock;

    use super::*;
    use crate::{
        domain::{ApiError, repository::MockAuthApi},
        infrastructure::storage::InMemoryStorage,
    };

    const NOW: i64 = 1_700_000_000_000;

    fn room() -> RoomCode {
        RoomCode::new("ROOM1".to_string()).unwrap()
    }

    fn identity() -> GuestIdentity {
        GuestIdentity {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            user_id: UserId::new(7),
            nickname: Some("guest-7".to_string()),
        }
    }

    fn fast_settings() -> GuestAuthSettings {
        GuestAuthSettings {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(200),
        }
    }

    struct Fixture {
        local: Arc<InMemoryStorage>,
        session: Arc<InMemoryStorage>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                local: Arc::new(InMemoryStorage::new()),
                session: Arc::new(InMemoryStorage::new()),
            }
        }

        fn authenticator(&self, api: Arc<dyn AuthApi>) -> GuestAuthenticator {
            GuestAuthenticator::new(
                api,
                self.local.clone(),
                self.session.clone(),
                Arc::new(FixedClock::new(NOW)),
                fast_settings(),
            )
        }
    }

    /// Issues identities after a delay, counting the calls.
    struct SlowAuthApi {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl AuthApi for SlowAuthApi {
        async fn issue_guest(&self) -> Result<GuestIdentity, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(identity())
        }
    }

    #[tokio::test]
    async fn test_issues_and_stores_guest_identity() {
        // テスト項目: トークンがない場合にゲストを発行し、識別情報とルームを保存する
        // given (前提条件):
        let fixture = Fixture::new();
        let mut api = MockAuthApi::new();
        api.expect_issue_guest().times(1).returning(|| Ok(identity()));
        let auth = fixture.authenticator(Arc::new(api));

        // when (操作):
        let result = auth.ensure_guest(&room()).await;

        // then (期待する結果):
        assert_eq!(result, Ok(identity()));
        let local = &fixture.local;
        assert_eq!(local.get(ACCESS_TOKEN_KEY).await.unwrap().as_deref(), Some("access"));
        assert_eq!(local.get(REFRESH_TOKEN_KEY).await.unwrap().as_deref(), Some("refresh"));
        assert_eq!(local.get(USER_ID_KEY).await.unwrap().as_deref(), Some("7"));
        assert_eq!(local.get(NICKNAME_KEY).await.unwrap().as_deref(), Some("guest-7"));
        assert_eq!(local.get(ROOM_CODE_KEY).await.unwrap().as_deref(), Some("ROOM1"));
        assert_eq!(fixture.session.get(&inflight_key(&room())).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reuses_stored_identity() {
        // テスト項目: 保存済みのトークンがあれば API を呼ばずに再利用する
        // given (前提条件):
        let fixture = Fixture::new();
        fixture.local.set(ACCESS_TOKEN_KEY, "stored".to_string()).await.unwrap();
        fixture.local.set(USER_ID_KEY, "42".to_string()).await.unwrap();
        let mut api = MockAuthApi::new();
        api.expect_issue_guest().never();
        let auth = fixture.authenticator(Arc::new(api));

        // when (操作):
        let identity = auth.ensure_guest(&room()).await.unwrap();

        // then (期待する結果):
        assert_eq!(identity.access_token, "stored");
        assert_eq!(identity.user_id, UserId::new(42));
        assert_eq!(identity.refresh_token, None);
    }

    #[tokio::test]
    async fn test_concurrent_callers_issue_once() {
        // テスト項目: 同時に呼ばれてもゲスト発行は 1 回だけで、両者が同じ識別情報を得る
        // given (前提条件):
        let fixture = Fixture::new();
        let api = Arc::new(SlowAuthApi {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let auth = fixture.authenticator(api.clone());

        // when (操作):
        let room = room();
        let (first, second) = tokio::join!(auth.ensure_guest(&room), auth.ensure_guest(&room));

        // then (期待する結果):
        assert_eq!(first, Ok(identity()));
        assert_eq!(second, Ok(identity()));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_times_out_when_issuer_never_finishes() {
        // テスト項目: 他の呼び出しのフラグが残り続けると、タイムアウトエラーになる
        // given (前提条件): 取得したばかりのフラグ
        let fixture = Fixture::new();
        fixture
            .session
            .set(&inflight_key(&room()), NOW.to_string())
            .await
            .unwrap();
        let mut api = MockAuthApi::new();
        api.expect_issue_guest().never();
        let auth = fixture.authenticator(Arc::new(api));

        // when (操作):
        let result = auth.ensure_guest(&room()).await;

        // then (期待する結果):
        assert!(matches!(result, Err(GuestAuthError::Timeout { waited_ms }) if waited_ms >= 200));
    }

    #[tokio::test]
    async fn test_stale_flag_is_taken_over() {
        // テスト項目: タイムアウトより古いフラグは無視して発行する
        // given (前提条件):
        let fixture = Fixture::new();
        fixture
            .session
            .set(&inflight_key(&room()), (NOW - 5_000).to_string())
            .await
            .unwrap();
        let mut api = MockAuthApi::new();
        api.expect_issue_guest().times(1).returning(|| Ok(identity()));
        let auth = fixture.authenticator(Arc::new(api));

        // when (操作):
        let result = auth.ensure_guest(&room()).await;

        // then (期待する結果):
        assert_eq!(result, Ok(identity()));
    }

    #[tokio::test]
    async fn test_failed_issue_clears_flag() {
        // テスト項目: 発行に失敗した場合はエラーを返し、フラグを解除する
        // given (前提条件):
        let fixture = Fixture::new();
        let mut api = MockAuthApi::new();
        api.expect_issue_guest().times(1).returning(|| {
            Err(ApiError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        });
        let auth = fixture.authenticator(Arc::new(api));

        // when (操作):
        let result = auth.ensure_guest(&room()).await;

        // then (期待する結果):
        assert!(matches!(result, Err(GuestAuthError::Api(ApiError::Status { status: 503, .. }))));
        assert_eq!(fixture.session.get(&inflight_key(&room())).await.unwrap(), None);
        assert_eq!(fixture.local.get(ACCESS_TOKEN_KEY).await.unwrap(), None);
    }
}

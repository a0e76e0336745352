//! `reqwest` implementation of the backend API traits.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use crate::{
    domain::{
        ApiError, AuthApi, CandidateApi, CandidateRecord, FavoriteApi, FavoriteId,
        FavoriteRecord, GuestIdentity, Place, PlaceApi, PlaceId, RoomApi, RoomCode, UserId,
    },
    infrastructure::dto::{
        broker::{CandidateEntryDto, PlaceDto},
        http::{CreateFavoriteRequest, FavoriteResponse, GuestAuthResponse},
    },
};

/// HTTP client for the Moyeo backend.
///
/// Requests carry `Authorization: Bearer <token>` once a token has been set.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    access_token: RwLock<Option<String>>,
}

impl HttpBackend {
    /// # Arguments
    ///
    /// * `base_url` - Backend origin, e.g. `http://127.0.0.1:8080`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: RwLock::new(None),
        }
    }

    /// Use the given bearer token for subsequent requests.
    pub async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.access_token.read().await.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .authorized(builder)
            .await
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!("Backend returned {}: {}", status, body);
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        self.execute(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl FavoriteApi for HttpBackend {
    async fn create_favorite(
        &self,
        user_id: UserId,
        place_id: PlaceId,
    ) -> Result<FavoriteId, ApiError> {
        let request = CreateFavoriteRequest {
            user_id: user_id.value(),
            place_id: place_id.value(),
        };
        let created: FavoriteResponse = self
            .json(self.client.post(self.url("/api/favorites")).json(&request))
            .await?;
        tracing::debug!(
            "Created favorite {} for place {}",
            created.favorite_id,
            place_id
        );
        Ok(FavoriteId::new(created.favorite_id))
    }

    async fn delete_favorite(&self, favorite_id: FavoriteId) -> Result<(), ApiError> {
        let url = self.url(&format!("/api/favorites/{}", favorite_id));
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }

    async fn list_favorites(&self, user_id: UserId) -> Result<Vec<FavoriteRecord>, ApiError> {
        let url = self.url(&format!("/api/favorites/{}", user_id));
        let listed: Vec<FavoriteResponse> = self.json(self.client.get(url)).await?;
        Ok(listed
            .into_iter()
            .filter_map(|favorite| {
                let favorite_id = favorite.favorite_id;
                let record = favorite.into_record();
                if record.is_none() {
                    tracing::warn!("Favorite {} has no place id, skipping", favorite_id);
                }
                record
            })
            .collect())
    }
}

#[async_trait]
impl CandidateApi for HttpBackend {
    async fn candidate_history(&self, room: &RoomCode) -> Result<Vec<CandidateRecord>, ApiError> {
        let url = self.url(&format!("/api/candidate/history/{}", room));
        let entries: Vec<CandidateEntryDto> = self.json(self.client.get(url)).await?;
        Ok(entries.into_iter().map(CandidateRecord::from).collect())
    }
}

#[async_trait]
impl PlaceApi for HttpBackend {
    async fn place_detail(&self, place_id: PlaceId) -> Result<Place, ApiError> {
        let url = self.url(&format!("/api/places/{}", place_id));
        let place: PlaceDto = self.json(self.client.get(url)).await?;
        Ok(place.into())
    }
}

#[async_trait]
impl AuthApi for HttpBackend {
    async fn issue_guest(&self) -> Result<GuestIdentity, ApiError> {
        let issued: GuestAuthResponse = self
            .json(self.client.post(self.url("/api/auth/guest")))
            .await?;
        Ok(issued.into())
    }
}

#[async_trait]
impl RoomApi for HttpBackend {
    async fn join_room(&self, room: &RoomCode) -> Result<(), ApiError> {
        let url = self.url(&format!("/api/rooms/{}", room));
        self.execute(self.client.post(url)).await?;
        Ok(())
    }
}

//! REST request and response bodies.

use serde::{Deserialize, Serialize};

/// `POST /api/favorites`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFavoriteRequest {
    pub user_id: i64,
    pub place_id: i64,
}

/// Favorite record returned by create and list.
///
/// The list endpoint nests the place instead of sending a flat `placeId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteResponse {
    #[serde(alias = "id")]
    pub favorite_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<PlaceRefDto>,
}

impl FavoriteResponse {
    pub fn resolved_place_id(&self) -> Option<i64> {
        self.place_id.or(self.place.as_ref().map(|place| place.id))
    }
}

/// Minimal reference to a nested place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceRefDto {
    #[serde(alias = "placeId")]
    pub id: i64,
}

/// `POST /api/auth/guest`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestAuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user_id: i64,
    #[serde(default)]
    pub nickname: Option<String>,
}

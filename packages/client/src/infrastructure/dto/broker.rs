//! Broker message bodies.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::ActionType;

/// Place as embedded in snapshots and REST responses.
///
/// The backend has shipped coordinates both as numbers and as numeric strings, under
/// `latitude`/`longitude` or the map SDK's `y`/`x`; anything unusable becomes `NaN`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceDto {
    #[serde(alias = "placeId")]
    pub id: i64,
    #[serde(default, alias = "placeName")]
    pub name: String,
    #[serde(default, alias = "categoryName")]
    pub category: Option<String>,
    #[serde(default, alias = "roadAddressName", alias = "addressName")]
    pub address: Option<String>,
    #[serde(default = "nan", alias = "y", deserialize_with = "coordinate")]
    pub latitude: f64,
    #[serde(default = "nan", alias = "x", deserialize_with = "coordinate")]
    pub longitude: f64,
}

/// One entry of a candidate snapshot: `{place, votedUserIds, voteCount}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEntryDto {
    pub place: PlaceDto,
    #[serde(default)]
    pub voted_user_ids: Vec<i64>,
    #[serde(default)]
    pub vote_count: i64,
}

/// Body published to `/ws/candidate.{roomCode}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMessageDto {
    pub place_id: i64,
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

fn nan() -> f64 {
    f64::NAN
}

fn coordinate<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    })
}

//! Conversion logic between DTOs and domain entities.

use thiserror::Error;

use crate::domain::{
    CandidateRecord, Coordinates, FavoriteId, FavoriteRecord, GuestIdentity, OutboundAction,
    Place, PlaceId, UserId,
};

use super::{
    broker::{ActionMessageDto, CandidateEntryDto, PlaceDto},
    http::{FavoriteResponse, GuestAuthResponse},
};

/// Why a snapshot body was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("snapshot is not a JSON array")]
    NotAnArray,

    #[error("snapshot entry is malformed: {0}")]
    MalformedEntry(String),
}

/// Parse a candidate snapshot body.
///
/// The whole snapshot is rejected when any entry is malformed, so callers never apply a
/// partial snapshot.
pub fn parse_snapshot(body: &str) -> Result<Vec<CandidateRecord>, SnapshotError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| SnapshotError::InvalidJson(e.to_string()))?;
    if !value.is_array() {
        return Err(SnapshotError::NotAnArray);
    }
    let entries: Vec<CandidateEntryDto> =
        serde_json::from_value(value).map_err(|e| SnapshotError::MalformedEntry(e.to_string()))?;
    Ok(entries.into_iter().map(CandidateRecord::from).collect())
}

// ========================================
// DTO → Domain Entity
// ========================================

impl From<PlaceDto> for Place {
    fn from(dto: PlaceDto) -> Self {
        Self {
            id: PlaceId::new(dto.id),
            name: dto.name,
            category: dto.category,
            address: dto.address,
            coordinates: Coordinates::new(dto.latitude, dto.longitude),
        }
    }
}

impl From<CandidateEntryDto> for CandidateRecord {
    fn from(dto: CandidateEntryDto) -> Self {
        Self {
            place: dto.place.into(),
            voted_user_ids: dto.voted_user_ids.into_iter().map(UserId::new).collect(),
            vote_count: u32::try_from(dto.vote_count.max(0)).unwrap_or(u32::MAX),
        }
    }
}

impl From<GuestAuthResponse> for GuestIdentity {
    fn from(dto: GuestAuthResponse) -> Self {
        Self {
            access_token: dto.access_token,
            refresh_token: dto.refresh_token,
            user_id: UserId::new(dto.user_id),
            nickname: dto.nickname,
        }
    }
}

impl FavoriteResponse {
    /// Domain record, if the response identifies its place.
    pub fn into_record(self) -> Option<FavoriteRecord> {
        let place_id = self.resolved_place_id()?;
        Some(FavoriteRecord {
            favorite_id: FavoriteId::new(self.favorite_id),
            place_id: PlaceId::new(place_id),
        })
    }
}

// ========================================
// Domain Entity → DTO
// ========================================

impl From<OutboundAction> for ActionMessageDto {
    fn from(action: OutboundAction) -> Self {
        Self {
            place_id: action.place_id.value(),
            action_type: action.action_type,
            user_id: action.user_id.map(|user| user.value()),
        }
    }
}

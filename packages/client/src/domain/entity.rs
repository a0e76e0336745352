//! Domain entities.

use super::value_object::{ActionType, Coordinates, FavoriteId, PlaceId, UserId};

/// Descriptive attributes of a place, as sent by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub id: PlaceId,
    pub name: String,
    pub category: Option<String>,
    pub address: Option<String>,
    pub coordinates: Coordinates,
}

/// One entry of a candidate listing before it is resolved against the current user.
///
/// Produced both by broker snapshots and by the candidate history endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub place: Place,
    pub voted_user_ids: Vec<UserId>,
    pub vote_count: u32,
}

impl CandidateRecord {
    /// Normalize the record for the given user.
    pub fn into_candidate(self, current_user: Option<UserId>) -> PlaceCandidate {
        let voted_by_current_user =
            current_user.is_some_and(|user| self.voted_user_ids.contains(&user));
        PlaceCandidate {
            place: self.place,
            vote_count: self.vote_count,
            voted_by_current_user,
        }
    }
}

/// A place nominated for voting in a room.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceCandidate {
    pub place: Place,
    /// Authoritative count from the last snapshot.
    pub vote_count: u32,
    pub voted_by_current_user: bool,
}

impl PlaceCandidate {
    pub fn id(&self) -> PlaceId {
        self.place.id
    }
}

/// Favorite record as listed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FavoriteRecord {
    pub favorite_id: FavoriteId,
    pub place_id: PlaceId,
}

/// Identity issued to a guest user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestIdentity {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user_id: UserId,
    pub nickname: Option<String>,
}

/// Action published to the room broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundAction {
    pub place_id: PlaceId,
    pub action_type: ActionType,
    /// Only set for vote actions.
    pub user_id: Option<UserId>,
}

impl OutboundAction {
    /// Build an action; the user id is dropped for non-vote actions.
    pub fn new(place_id: PlaceId, action_type: ActionType, user_id: Option<UserId>) -> Self {
        Self {
            place_id,
            action_type,
            user_id: user_id.filter(|_| action_type.is_vote()),
        }
    }
}

/// Marker rendered on the map for a search result or a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    pub place_id: PlaceId,
    pub title: String,
    pub coordinates: Coordinates,
    pub is_candidate: bool,
    pub payload: Place,
}

impl MapMarker {
    pub fn for_search_result(place: &Place) -> Self {
        Self {
            place_id: place.id,
            title: place.name.clone(),
            coordinates: place.coordinates,
            is_candidate: false,
            payload: place.clone(),
        }
    }

    pub fn for_candidate(candidate: &PlaceCandidate) -> Self {
        Self {
            place_id: candidate.id(),
            title: candidate.place.name.clone(),
            coordinates: candidate.place.coordinates,
            is_candidate: true,
            payload: candidate.place.clone(),
        }
    }
}

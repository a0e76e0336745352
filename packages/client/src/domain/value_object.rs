//! Value objects of the room domain.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::ValueObjectError;

/// Maximum length of a room code.
const ROOM_CODE_MAX_LEN: usize = 64;

/// Stable external identifier of a place (restaurant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(i64);

impl PlaceId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a user (guest or logged in).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned identifier of a favorite record.
///
/// Removing a favorite needs this id, not the place id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FavoriteId(i64);

impl FavoriteId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for FavoriteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short code identifying a room.
///
/// The code becomes part of broker destinations and storage keys, so it is restricted to
/// ASCII alphanumerics, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        let value = value.trim().to_string();
        if value.is_empty() {
            return Err(ValueObjectError::RoomCodeEmpty);
        }
        if value.len() > ROOM_CODE_MAX_LEN {
            return Err(ValueObjectError::RoomCodeTooLong(ROOM_CODE_MAX_LEN));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValueObjectError::RoomCodeInvalid(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of action published to the room broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    AddPlace,
    RemovePlace,
    AddVote,
    RemoveVote,
}

impl ActionType {
    /// Vote actions carry the acting user's id.
    pub fn is_vote(&self) -> bool {
        matches!(self, ActionType::AddVote | ActionType::RemoveVote)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AddPlace => "ADD_PLACE",
            ActionType::RemovePlace => "REMOVE_PLACE",
            ActionType::AddVote => "ADD_VOTE",
            ActionType::RemoveVote => "REMOVE_VOTE",
        }
    }
}

/// Connection state of a room channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// Geographic coordinates of a place.
///
/// A missing or unparsable component is `NaN`, which marks the location as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn invalid() -> Self {
        Self::new(f64::NAN, f64::NAN)
    }

    /// Whether a map marker can be placed at these coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

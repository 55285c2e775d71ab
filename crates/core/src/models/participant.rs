//! Participant roles and the debater seat

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Room roles in privilege order (highest to lowest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ParticipantRole {
    /// Runs the session - mutes, warns, pauses, ends
    Moderator = 3,
    /// Holds a seat and speaks in turns
    Debater = 2,
    /// Listens, reacts, asks questions
    Audience = 1,
}

impl ParticipantRole {
    pub fn display_name(&self) -> &'static str {
        match self {
            ParticipantRole::Moderator => "Moderator",
            ParticipantRole::Debater => "Debater",
            ParticipantRole::Audience => "Audience",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Moderator => "moderator",
            ParticipantRole::Debater => "debater",
            ParticipantRole::Audience => "audience",
        }
    }

    pub fn parse(s: &str) -> Option<ParticipantRole> {
        match s {
            "moderator" => Some(ParticipantRole::Moderator),
            "debater" => Some(ParticipantRole::Debater),
            "audience" => Some(ParticipantRole::Audience),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A user seated in a room with a declared position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debater {
    pub user_id: Uuid,
    pub username: String,
    pub position: String,
    pub joined_at: DateTime<Utc>,
    pub turns_count: u32,
    /// Connected and participating (false after leaving or once the room ends)
    pub is_active: bool,
}

impl Debater {
    pub fn new(user_id: Uuid, username: String, position: String, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            username,
            position,
            joined_at,
            turns_count: 0,
            is_active: true,
        }
    }
}

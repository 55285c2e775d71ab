//! Room model - a single debate session and its lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Debater;
use crate::error::{Error, Result};

/// Lifecycle status of a room. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Scheduled,
    Live,
    Ended,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Scheduled => "scheduled",
            RoomStatus::Live => "live",
            RoomStatus::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Option<RoomStatus> {
        match s {
            "scheduled" => Some(RoomStatus::Scheduled),
            "live" => Some(RoomStatus::Live),
            "ended" => Some(RoomStatus::Ended),
            _ => None,
        }
    }

    /// Only `scheduled -> live -> ended` (and `scheduled -> ended` for
    /// cancelled rooms) are allowed.
    pub fn can_transition_to(&self, next: RoomStatus) -> bool {
        matches!(
            (self, next),
            (RoomStatus::Scheduled, RoomStatus::Live)
                | (RoomStatus::Scheduled, RoomStatus::Ended)
                | (RoomStatus::Live, RoomStatus::Ended)
        )
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DebateType {
    HumanVsHuman,
    HumanVsAi,
}

impl DebateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateType::HumanVsHuman => "human-vs-human",
            DebateType::HumanVsAi => "human-vs-ai",
        }
    }

    pub fn parse(s: &str) -> Option<DebateType> {
        match s {
            "human-vs-human" => Some(DebateType::HumanVsHuman),
            "human-vs-ai" => Some(DebateType::HumanVsAi),
            _ => None,
        }
    }

    /// Seats available to human debaters
    pub fn max_debaters(&self) -> u32 {
        match self {
            DebateType::HumanVsHuman => 2,
            DebateType::HumanVsAi => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DebateFormat {
    Spoken,
    SpokenText,
}

impl DebateFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateFormat::Spoken => "spoken",
            DebateFormat::SpokenText => "spoken-text",
        }
    }

    pub fn parse(s: &str) -> Option<DebateFormat> {
        match s {
            "spoken" => Some(DebateFormat::Spoken),
            "spoken-text" => Some(DebateFormat::SpokenText),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebateLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl DebateLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateLevel::Beginner => "beginner",
            DebateLevel::Intermediate => "intermediate",
            DebateLevel::Advanced => "advanced",
        }
    }

    pub fn parse(s: &str) -> Option<DebateLevel> {
        match s {
            "beginner" => Some(DebateLevel::Beginner),
            "intermediate" => Some(DebateLevel::Intermediate),
            "advanced" => Some(DebateLevel::Advanced),
            _ => None,
        }
    }
}

/// Default turn length in seconds
pub const DEFAULT_TURN_DURATION: u32 = 180;

/// Ruleset fixed at room creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRules {
    /// Seconds per turn
    pub turn_duration: u32,
    pub max_turns: Option<u32>,
    pub allow_audience_questions: bool,
    pub allow_transcription: bool,
    pub moderator_can_mute: bool,
}

impl Default for RoomRules {
    fn default() -> Self {
        Self {
            turn_duration: DEFAULT_TURN_DURATION,
            max_turns: None,
            allow_audience_questions: true,
            allow_transcription: true,
            moderator_can_mute: true,
        }
    }
}

/// A debate room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub theme: String,
    pub description: String,
    pub debate_type: DebateType,
    pub format: DebateFormat,
    pub level: DebateLevel,
    pub status: RoomStatus,
    pub creator_id: Uuid,
    pub moderator_id: Option<Uuid>,
    pub debaters: Vec<Debater>,
    pub audience_count: u32,
    pub max_debaters: u32,
    pub rules: RoomRules,
    pub tags: Vec<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(theme: String, creator_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            theme,
            description: String::new(),
            debate_type: DebateType::HumanVsHuman,
            format: DebateFormat::Spoken,
            level: DebateLevel::Beginner,
            status: RoomStatus::Scheduled,
            creator_id,
            moderator_id: None,
            debaters: Vec::new(),
            audience_count: 0,
            max_debaters: DebateType::HumanVsHuman.max_debaters(),
            rules: RoomRules::default(),
            tags: Vec::new(),
            scheduled_at: None,
            started_at: None,
            ended_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = description;
        self
    }

    pub fn with_type(mut self, debate_type: DebateType) -> Self {
        self.debate_type = debate_type;
        self.max_debaters = debate_type.max_debaters();
        self
    }

    pub fn with_moderator(mut self, moderator_id: Uuid) -> Self {
        self.moderator_id = Some(moderator_id);
        self
    }

    pub fn is_live(&self) -> bool {
        self.status == RoomStatus::Live
    }

    pub fn is_ended(&self) -> bool {
        self.status == RoomStatus::Ended
    }

    pub fn is_full(&self) -> bool {
        self.debaters.len() as u32 >= self.max_debaters
    }

    pub fn debater(&self, user_id: Uuid) -> Option<&Debater> {
        self.debaters.iter().find(|d| d.user_id == user_id)
    }

    pub fn debater_mut(&mut self, user_id: Uuid) -> Option<&mut Debater> {
        self.debaters.iter_mut().find(|d| d.user_id == user_id)
    }

    pub fn is_debater(&self, user_id: Uuid) -> bool {
        self.debater(user_id).is_some()
    }

    /// Move the room forward in its lifecycle, stamping start/end times
    pub fn transition(&mut self, next: RoomStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        match next {
            RoomStatus::Live => self.started_at = Some(now),
            RoomStatus::Ended => {
                self.ended_at = Some(now);
                for debater in &mut self.debaters {
                    debater.is_active = false;
                }
            }
            RoomStatus::Scheduled => {}
        }
        self.status = next;
        Ok(())
    }

    /// Seat a debater with a declared position
    pub fn add_debater(
        &mut self,
        user_id: Uuid,
        username: String,
        position: String,
        now: DateTime<Utc>,
    ) -> Result<&Debater> {
        if self.is_ended() {
            return Err(Error::InvalidOperation("Room has ended".into()));
        }
        if self.is_debater(user_id) {
            return Err(Error::InvalidOperation("Already a debater in this room".into()));
        }
        if self.moderator_id == Some(user_id) {
            return Err(Error::InvalidOperation(
                "The moderator cannot also debate".into(),
            ));
        }
        if self.is_full() {
            return Err(Error::InvalidOperation(format!(
                "Room is full ({} debaters)",
                self.max_debaters
            )));
        }
        let position = position.trim().to_string();
        if position.is_empty() {
            return Err(Error::InvalidOperation("A position is required".into()));
        }

        self.debaters.push(Debater::new(user_id, username, position, now));
        Ok(&self.debaters[self.debaters.len() - 1])
    }

    /// Time used to order "starting soon" listings
    pub fn start_key(&self) -> Option<DateTime<Utc>> {
        self.scheduled_at.or(self.started_at)
    }
}

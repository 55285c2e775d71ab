//! Audience interaction models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Agreement,
    Doubt,
    Disagreement,
}

impl ReactionKind {
    /// All kinds in display order
    pub const ALL: [ReactionKind; 3] = [
        ReactionKind::Agreement,
        ReactionKind::Doubt,
        ReactionKind::Disagreement,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ReactionKind::Agreement => "Agree",
            ReactionKind::Doubt => "Doubt",
            ReactionKind::Disagreement => "Disagree",
        }
    }
}

/// Aggregate for one reaction kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceReaction {
    pub kind: ReactionKind,
    pub count: u32,
    /// Share of all reactions; the shares of all kinds sum to at most 100
    pub percentage: u8,
}

/// A question submitted by an audience member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudienceQuestion {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub question: String,
    pub submitted_at: DateTime<Utc>,
    pub is_approved: bool,
    pub is_answered: bool,
}

impl AudienceQuestion {
    pub fn new(user_id: Uuid, username: String, question: String, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            username,
            question,
            submitted_at,
            is_approved: false,
            is_answered: false,
        }
    }

    /// Waiting for a moderator decision
    pub fn is_pending(&self) -> bool {
        !self.is_approved && !self.is_answered
    }
}

/// Audience rating of a debater, each axis 1-5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceVote {
    pub clarity: u8,
    pub consistency: u8,
    pub impact: u8,
}

impl AudienceVote {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn is_valid(&self) -> bool {
        [self.clarity, self.consistency, self.impact]
            .iter()
            .all(|v| (Self::MIN..=Self::MAX).contains(v))
    }
}

/// Averaged audience votes for one debater
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteSummary {
    pub debater_id: Uuid,
    pub voters: u32,
    pub clarity: f64,
    pub consistency: f64,
    pub impact: f64,
}

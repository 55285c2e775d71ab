//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub bio: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: username.clone(),
            username,
            email,
            bio: None,
            password_hash,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    pub fn with_display_name(mut self, display_name: String) -> Self {
        self.display_name = display_name;
        self
    }
}

/// Active login session, presented by clients as an opaque token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: Uuid, token: String, duration_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token,
            created_at: now,
            expires_at: now + chrono::Duration::hours(duration_hours),
        }
    }

    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// Title ladder per debate domain (lowest to highest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TitleLevel {
    Novice = 0,
    Apprentice = 1,
    Practitioner = 2,
    Expert = 3,
    Master = 4,
}

impl TitleLevel {
    pub fn display_name(&self) -> &'static str {
        match self {
            TitleLevel::Novice => "Novice",
            TitleLevel::Apprentice => "Apprentice",
            TitleLevel::Practitioner => "Practitioner",
            TitleLevel::Expert => "Expert",
            TitleLevel::Master => "Master",
        }
    }

    /// The level above this one, `None` at the top of the ladder
    pub fn next(&self) -> Option<TitleLevel> {
        match self {
            TitleLevel::Novice => Some(TitleLevel::Apprentice),
            TitleLevel::Apprentice => Some(TitleLevel::Practitioner),
            TitleLevel::Practitioner => Some(TitleLevel::Expert),
            TitleLevel::Expert => Some(TitleLevel::Master),
            TitleLevel::Master => None,
        }
    }

    pub fn from_index(index: u32) -> TitleLevel {
        match index {
            0 => TitleLevel::Novice,
            1 => TitleLevel::Apprentice,
            2 => TitleLevel::Practitioner,
            3 => TitleLevel::Expert,
            _ => TitleLevel::Master,
        }
    }
}

impl std::fmt::Display for TitleLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A title earned in one domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTitle {
    pub domain: String,
    pub level: TitleLevel,
    pub earned_at: DateTime<Utc>,
}

/// Aggregated debate statistics shown on a profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_debates: u32,
    pub seconds_debated: u64,
    pub topics_explored: u32,
    pub average_clarity: f64,
    pub average_coherence: f64,
    pub average_precision: f64,
    pub average_depth: f64,
}

impl UserStats {
    pub fn hours_debated(&self) -> f64 {
        self.seconds_debated as f64 / 3600.0
    }
}

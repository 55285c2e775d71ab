//! Storage repository traits
//!
//! These traits define the storage interface the server depends on,
//! allowing the SQLite backend to be swapped for a mock in tests.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    CriterionScores, DebateFeedback, JuryEvaluation, ModerationLogEntry, Room, Session, Turn,
    User, UserTitle,
};

/// User repository operations
pub trait UserRepository {
    /// Create a new user
    fn create_user(&self, user: &User) -> Result<()>;

    /// Find user by ID
    fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Find user by username
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Find user by e-mail
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Update user's display name and bio
    fn update_profile(&self, user_id: Uuid, display_name: &str, bio: Option<&str>) -> Result<()>;

    /// Update user's last login time
    fn update_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Create a session
    fn create_session(&self, session: &Session) -> Result<()>;

    /// Find a session that has not expired at `now`
    fn find_valid_session(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Session>>;

    /// Delete a session
    fn delete_session(&self, token: &str) -> Result<()>;

    /// Delete all sessions for a user
    fn delete_user_sessions(&self, user_id: Uuid) -> Result<()>;

    /// Clean up expired sessions
    fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Titles earned across domains
    fn list_titles(&self, user_id: Uuid) -> Result<Vec<UserTitle>>;
}

/// Room repository operations
pub trait RoomRepository {
    /// Insert or update a room
    fn save_room(&self, room: &Room) -> Result<()>;

    /// Find room by ID
    fn find_room_by_id(&self, id: Uuid) -> Result<Option<Room>>;

    /// List every room
    fn list_rooms(&self) -> Result<Vec<Room>>;

    /// Close rooms left live by an unclean shutdown
    fn end_stale_live_rooms(&self, at: DateTime<Utc>) -> Result<u64>;
}

/// Turn history operations
pub trait TurnRepository {
    /// Record a finished turn
    fn record_turn(&self, turn: &Turn) -> Result<()>;

    /// Turns of a room in speaking order
    fn list_turns_for_room(&self, room_id: Uuid) -> Result<Vec<Turn>>;
}

/// Moderation audit operations
pub trait ModerationRepository {
    /// Append an audit entry
    fn record_moderation(&self, entry: &ModerationLogEntry) -> Result<()>;

    /// Audit entries of a room
    fn list_moderation_for_room(&self, room_id: Uuid) -> Result<Vec<ModerationLogEntry>>;
}

/// Evaluation and feedback operations
pub trait EvaluationRepository {
    /// Store or replace an evaluation
    fn save_evaluation(&self, evaluation: &JuryEvaluation) -> Result<()>;

    /// Evaluations of a debater in a room
    fn list_evaluations(&self, room_id: Uuid, debater_id: Uuid) -> Result<Vec<JuryEvaluation>>;

    /// Mean scores of a debater, optionally leaving one room out
    fn average_scores(&self, debater_id: Uuid, excluding_room: Option<Uuid>) -> Result<Option<CriterionScores>>;

    /// Stored feedback of a debater for a room
    fn find_feedback(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<DebateFeedback>>;
}

/// Combined storage interface
///
/// Provides access to all repository operations.
/// Implementations may be backed by SQLite or mocks.
pub trait Storage:
    UserRepository + RoomRepository + TurnRepository + ModerationRepository + EvaluationRepository
{
}

// Blanket implementation: any type implementing all traits implements Storage
impl<T> Storage for T where
    T: UserRepository + RoomRepository + TurnRepository + ModerationRepository + EvaluationRepository
{
}

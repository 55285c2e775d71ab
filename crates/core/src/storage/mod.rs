//! SQLite storage layer for Tribuna

mod evaluations;
mod migrations;
mod moderation;
mod parse;
mod rooms;
mod traits;
mod turns;
mod users;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::evaluation;
use crate::models::{
    CriterionScores, DebateFeedback, HistoryEntry, JuryEvaluation, ModerationLogEntry, Room,
    Session, TitleLevel, Turn, User, UserStats, UserTitle,
};
use rusqlite::Connection;
use std::path::Path;
use tracing::{info, instrument};

pub use evaluations::EvaluationStore;
pub use moderation::ModerationStore;
pub use rooms::RoomStore;
pub use traits::{
    EvaluationRepository, ModerationRepository, RoomRepository, Storage, TurnRepository,
    UserRepository,
};
pub use turns::TurnStore;
pub use users::UserStore;

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    pub fn users(&self) -> UserStore<'_> {
        UserStore::new(&self.conn)
    }

    pub fn rooms(&self) -> RoomStore<'_> {
        RoomStore::new(&self.conn)
    }

    pub fn turns(&self) -> TurnStore<'_> {
        TurnStore::new(&self.conn)
    }

    pub fn moderation_log(&self) -> ModerationStore<'_> {
        ModerationStore::new(&self.conn)
    }

    pub fn evaluations(&self) -> EvaluationStore<'_> {
        EvaluationStore::new(&self.conn)
    }

    /// Validate and store a jury evaluation, then recompose the
    /// debater's feedback for the room.
    #[instrument(skip(self, room, evaluation), fields(room_id = %room.id, debater_id = %evaluation.debater_id))]
    pub fn submit_evaluation(
        &self,
        room: &Room,
        evaluation: &JuryEvaluation,
        now: DateTime<Utc>,
    ) -> Result<DebateFeedback> {
        evaluation::validate_evaluation(room, evaluation)?;
        let tx = self.conn.unchecked_transaction()?;
        self.evaluations().upsert(evaluation)?;
        let feedback = self.refresh_feedback(room, evaluation.debater_id, now)?;
        tx.commit()?;
        Ok(feedback)
    }

    /// Write a live session's room (when given), finished turns and new
    /// audit entries in one transaction.
    #[instrument(skip_all, fields(turns = turns.len(), entries = entries.len()))]
    pub fn persist_session(
        &self,
        turns: &[Turn],
        entries: &[ModerationLogEntry],
        room: Option<&Room>,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        if let Some(room) = room {
            self.rooms().write(room)?;
        }
        for turn in turns {
            self.turns().insert(turn)?;
        }
        for entry in entries {
            self.moderation_log().insert(entry)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Compose the debater's feedback from every stored evaluation of the
    /// room and move the domain's title points by the difference against
    /// any feedback composed before.
    fn refresh_feedback(&self, room: &Room, debater_id: Uuid, now: DateTime<Utc>) -> Result<DebateFeedback> {
        let evaluations = self.evaluations().list_for_debater(room.id, debater_id)?;
        let previous = self.evaluations().averages(debater_id, Some(room.id))?;
        let earlier = self.evaluations().find_feedback(room.id, debater_id)?;

        let domain = evaluation::domain_of(room);
        let already_counted = earlier.as_ref().map(|f| f.points_awarded).unwrap_or(0);
        let prior_points = self
            .users()
            .title_points(debater_id, domain)?
            .saturating_sub(already_counted);

        let mut feedback = evaluation::compose_feedback(
            room,
            debater_id,
            &evaluations,
            previous.as_ref(),
            prior_points,
            now,
        )?;
        if let Some(earlier) = earlier {
            feedback.id = earlier.id;
        }

        let total = prior_points + feedback.points_awarded;
        let level = feedback
            .title_progress
            .as_ref()
            .map(|p| p.current_title)
            .unwrap_or(TitleLevel::Novice);
        if self.users().find_by_id(debater_id)?.is_some() {
            self.users()
                .set_title_points(debater_id, domain, total, level, now)?;
        }
        self.evaluations().save_feedback(&feedback)?;

        info!(
            room_id = %room.id,
            %debater_id,
            overall = feedback.evaluation.overall,
            points = feedback.points_awarded,
            "Feedback composed"
        );
        Ok(feedback)
    }

    /// Stored feedback for a debater, `NotFound` until the jury has scored them
    pub fn feedback_for(&self, room_id: Uuid, user_id: Uuid) -> Result<DebateFeedback> {
        self.evaluations()
            .find_feedback(room_id, user_id)?
            .ok_or_else(|| Error::NotFound(format!("Feedback for room {}", room_id)))
    }

    /// Profile statistics aggregated from rooms, turns and evaluations
    #[instrument(skip(self))]
    pub fn user_stats(&self, user_id: Uuid) -> Result<UserStats> {
        let total_debates = self.rooms().list_debated_by(user_id)?.len() as u32;
        let seconds_debated = self.turns().seconds_spoken(user_id)?;
        let topics_explored = self.users().list_titles(user_id)?.len() as u32;
        let averages = self.evaluations().averages(user_id, None)?;

        let mut stats = UserStats {
            total_debates,
            seconds_debated,
            topics_explored,
            ..UserStats::default()
        };
        if let Some(avg) = averages {
            stats.average_clarity = avg.clarity;
            stats.average_coherence = avg.coherence;
            stats.average_precision = avg.precision;
            stats.average_depth = avg.depth;
        }
        Ok(stats)
    }

    /// Ended debates of a user, newest first
    #[instrument(skip(self))]
    pub fn history_for_user(&self, user_id: Uuid) -> Result<Vec<HistoryEntry>> {
        let rooms = self.rooms().list_debated_by(user_id)?;
        let mut history = Vec::with_capacity(rooms.len());

        for room in rooms {
            let feedback = self.evaluations().find_feedback(room.id, user_id)?;
            let (position, turns_count) = room
                .debater(user_id)
                .map(|d| (d.position.clone(), d.turns_count))
                .unwrap_or_default();
            history.push(HistoryEntry {
                room_id: room.id,
                theme: room.theme,
                position,
                tags: room.tags,
                ended_at: room.ended_at,
                turns_count,
                overall: feedback.as_ref().map(|f| f.evaluation.overall),
                points_awarded: feedback.map(|f| f.points_awarded),
            });
        }
        Ok(history)
    }
}

// Implement repository traits for Database
// This enables using Database through the trait interface

impl UserRepository for Database {
    fn create_user(&self, user: &User) -> Result<()> {
        self.users().create(user)
    }

    fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.users().find_by_id(id)
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.users().find_by_username(username)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.users().find_by_email(email)
    }

    fn update_profile(&self, user_id: Uuid, display_name: &str, bio: Option<&str>) -> Result<()> {
        self.users().update_profile(user_id, display_name, bio)
    }

    fn update_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.users().update_last_login(user_id, at)
    }

    fn create_session(&self, session: &Session) -> Result<()> {
        self.users().create_session(session)
    }

    fn find_valid_session(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Session>> {
        self.users().find_valid_session(token, now)
    }

    fn delete_session(&self, token: &str) -> Result<()> {
        self.users().delete_session(token)
    }

    fn delete_user_sessions(&self, user_id: Uuid) -> Result<()> {
        self.users().delete_user_sessions(user_id)
    }

    fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        self.users().cleanup_expired_sessions(now)
    }

    fn list_titles(&self, user_id: Uuid) -> Result<Vec<UserTitle>> {
        self.users().list_titles(user_id)
    }
}

impl RoomRepository for Database {
    fn save_room(&self, room: &Room) -> Result<()> {
        self.rooms().save(room)
    }

    fn find_room_by_id(&self, id: Uuid) -> Result<Option<Room>> {
        self.rooms().find_by_id(id)
    }

    fn list_rooms(&self) -> Result<Vec<Room>> {
        self.rooms().list_all()
    }

    fn end_stale_live_rooms(&self, at: DateTime<Utc>) -> Result<u64> {
        self.rooms().end_stale_live_rooms(at)
    }
}

impl TurnRepository for Database {
    fn record_turn(&self, turn: &Turn) -> Result<()> {
        self.turns().insert(turn)
    }

    fn list_turns_for_room(&self, room_id: Uuid) -> Result<Vec<Turn>> {
        self.turns().list_for_room(room_id)
    }
}

impl ModerationRepository for Database {
    fn record_moderation(&self, entry: &ModerationLogEntry) -> Result<()> {
        self.moderation_log().insert(entry)
    }

    fn list_moderation_for_room(&self, room_id: Uuid) -> Result<Vec<ModerationLogEntry>> {
        self.moderation_log().list_for_room(room_id)
    }
}

impl EvaluationRepository for Database {
    fn save_evaluation(&self, evaluation: &JuryEvaluation) -> Result<()> {
        self.evaluations().upsert(evaluation)
    }

    fn list_evaluations(&self, room_id: Uuid, debater_id: Uuid) -> Result<Vec<JuryEvaluation>> {
        self.evaluations().list_for_debater(room_id, debater_id)
    }

    fn average_scores(&self, debater_id: Uuid, excluding_room: Option<Uuid>) -> Result<Option<CriterionScores>> {
        self.evaluations().averages(debater_id, excluding_room)
    }

    fn find_feedback(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<DebateFeedback>> {
        self.evaluations().find_feedback(room_id, user_id)
    }
}

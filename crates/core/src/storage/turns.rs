//! Turn history storage

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_json, parse_uuid};
use crate::error::{Error, Result};
use crate::models::Turn;

fn turn_from_row(row: &Row<'_>) -> rusqlite::Result<Turn> {
    Ok(Turn {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        room_id: parse_uuid(&row.get::<_, String>(1)?)?,
        speaker_id: parse_uuid(&row.get::<_, String>(2)?)?,
        started_at: parse_datetime(&row.get::<_, String>(3)?)?,
        ended_at: Some(parse_datetime(&row.get::<_, String>(4)?)?),
        duration: row.get(5)?,
        transcription: row.get(6)?,
        highlights: parse_json(&row.get::<_, String>(7)?)?,
    })
}

pub struct TurnStore<'a> {
    conn: &'a Connection,
}

impl<'a> TurnStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Record a finished turn. Recording the same turn again is a no-op.
    #[instrument(skip(self, turn), fields(turn_id = %turn.id, room_id = %turn.room_id))]
    pub fn insert(&self, turn: &Turn) -> Result<()> {
        let ended_at = turn
            .ended_at
            .ok_or_else(|| Error::Turn("Only finished turns are stored".into()))?;

        self.conn.execute(
            "INSERT INTO turns (id, room_id, speaker_id, started_at, ended_at, duration, transcription, highlights)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO NOTHING",
            params![
                turn.id.to_string(),
                turn.room_id.to_string(),
                turn.speaker_id.to_string(),
                turn.started_at.to_rfc3339(),
                ended_at.to_rfc3339(),
                turn.duration,
                turn.transcription,
                serde_json::to_string(&turn.highlights)?,
            ],
        )?;
        Ok(())
    }

    /// Store a transcription and its highlights for a recorded turn
    #[instrument(skip(self, turn), fields(turn_id = %turn.id))]
    pub fn update_transcript(&self, turn: &Turn) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE turns SET transcription = ?1, highlights = ?2 WHERE id = ?3",
            params![
                turn.transcription,
                serde_json::to_string(&turn.highlights)?,
                turn.id.to_string(),
            ],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Turn {}", turn.id)));
        }
        Ok(())
    }

    /// Turns of a room in speaking order
    #[instrument(skip(self))]
    pub fn list_for_room(&self, room_id: Uuid) -> Result<Vec<Turn>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, room_id, speaker_id, started_at, ended_at, duration, transcription, highlights
             FROM turns WHERE room_id = ?1 ORDER BY started_at ASC",
        )?;
        let turns = stmt
            .query_map(params![room_id.to_string()], turn_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(turns)
    }

    /// Total seconds a user has spoken across all rooms
    pub fn seconds_spoken(&self, user_id: Uuid) -> Result<u64> {
        let seconds: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(duration), 0) FROM turns WHERE speaker_id = ?1",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(seconds.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HighlightKind, Room, User};
    use crate::storage::Database;
    use chrono::{Duration, Utc};

    fn stored_room(db: &Database) -> Room {
        let user = User::new("host".into(), "host@example.com".into(), "hash".into());
        db.users().create(&user).unwrap();
        let room = Room::new("Should cities ban private cars?".into(), user.id);
        db.rooms().save(&room).unwrap();
        room
    }

    #[test]
    fn test_only_finished_turns_are_stored() {
        let db = Database::open_in_memory().unwrap();
        let room = stored_room(&db);
        let open = Turn::start(room.id, Uuid::new_v4(), Utc::now());
        assert!(db.turns().insert(&open).is_err());
    }

    #[test]
    fn test_history_and_transcript() {
        let db = Database::open_in_memory().unwrap();
        let room = stored_room(&db);
        let speaker = Uuid::new_v4();
        let start = Utc::now();

        let mut first = Turn::start(room.id, speaker, start);
        first.close(start + Duration::seconds(90)).unwrap();
        db.turns().insert(&first).unwrap();

        let mut second = Turn::start(room.id, speaker, start + Duration::seconds(100));
        second.close(start + Duration::seconds(130)).unwrap();
        db.turns().insert(&second).unwrap();

        first
            .set_transcription("Cars shape cities more than parks do.".into())
            .unwrap();
        first.add_highlight(HighlightKind::Claim, 0, 17).unwrap();
        db.turns().update_transcript(&first).unwrap();

        let turns = db.turns().list_for_room(room.id).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].id, first.id);
        assert_eq!(turns[0].highlights.len(), 1);
        assert_eq!(turns[0].highlights[0].text, "Cars shape cities");
        assert_eq!(db.turns().seconds_spoken(speaker).unwrap(), 120);
    }
}

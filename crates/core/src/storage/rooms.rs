//! Room and debater storage

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_datetime_opt, parse_enum, parse_json, parse_uuid, parse_uuid_opt, OptionalExt};
use crate::error::Result;
use crate::models::{DebateFormat, DebateLevel, DebateType, Debater, Room, RoomStatus};

const ROOM_COLUMNS: &str = "id, theme, description, debate_type, format, level, status, creator_id, \
     moderator_id, audience_count, max_debaters, rules, tags, scheduled_at, started_at, ended_at, created_at";

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<Room> {
    Ok(Room {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        theme: row.get(1)?,
        description: row.get(2)?,
        debate_type: parse_enum(&row.get::<_, String>(3)?, DebateType::parse)?,
        format: parse_enum(&row.get::<_, String>(4)?, DebateFormat::parse)?,
        level: parse_enum(&row.get::<_, String>(5)?, DebateLevel::parse)?,
        status: parse_enum(&row.get::<_, String>(6)?, RoomStatus::parse)?,
        creator_id: parse_uuid(&row.get::<_, String>(7)?)?,
        moderator_id: parse_uuid_opt(row.get(8)?)?,
        debaters: Vec::new(),
        audience_count: row.get(9)?,
        max_debaters: row.get(10)?,
        rules: parse_json(&row.get::<_, String>(11)?)?,
        tags: parse_json(&row.get::<_, String>(12)?)?,
        scheduled_at: parse_datetime_opt(row.get(13)?)?,
        started_at: parse_datetime_opt(row.get(14)?)?,
        ended_at: parse_datetime_opt(row.get(15)?)?,
        created_at: parse_datetime(&row.get::<_, String>(16)?)?,
    })
}

pub struct RoomStore<'a> {
    conn: &'a Connection,
}

impl<'a> RoomStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or update a room together with its debater seats
    #[instrument(skip(self, room), fields(room_id = %room.id, status = room.status.as_str()))]
    pub fn save(&self, room: &Room) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.write(room)?;
        tx.commit()?;
        Ok(())
    }

    /// `save` without its own transaction, for callers that already hold one
    pub(crate) fn write(&self, room: &Room) -> Result<()> {
        self.conn.execute(
            "INSERT INTO rooms (id, theme, description, debate_type, format, level, status, creator_id,
                                moderator_id, audience_count, max_debaters, rules, tags,
                                scheduled_at, started_at, ended_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(id) DO UPDATE SET
                theme = excluded.theme,
                description = excluded.description,
                debate_type = excluded.debate_type,
                format = excluded.format,
                level = excluded.level,
                status = excluded.status,
                moderator_id = excluded.moderator_id,
                audience_count = excluded.audience_count,
                max_debaters = excluded.max_debaters,
                rules = excluded.rules,
                tags = excluded.tags,
                scheduled_at = excluded.scheduled_at,
                started_at = excluded.started_at,
                ended_at = excluded.ended_at",
            params![
                room.id.to_string(),
                room.theme,
                room.description,
                room.debate_type.as_str(),
                room.format.as_str(),
                room.level.as_str(),
                room.status.as_str(),
                room.creator_id.to_string(),
                room.moderator_id.map(|id| id.to_string()),
                room.audience_count,
                room.max_debaters,
                serde_json::to_string(&room.rules)?,
                serde_json::to_string(&room.tags)?,
                room.scheduled_at.map(|t| t.to_rfc3339()),
                room.started_at.map(|t| t.to_rfc3339()),
                room.ended_at.map(|t| t.to_rfc3339()),
                room.created_at.to_rfc3339(),
            ],
        )?;

        self.conn.execute(
            "DELETE FROM debaters WHERE room_id = ?1",
            params![room.id.to_string()],
        )?;
        for (seat, debater) in room.debaters.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO debaters (room_id, user_id, username, position, joined_at, turns_count, is_active, seat)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    room.id.to_string(),
                    debater.user_id.to_string(),
                    debater.username,
                    debater.position,
                    debater.joined_at.to_rfc3339(),
                    debater.turns_count,
                    debater.is_active,
                    seat as u32,
                ],
            )?;
        }
        Ok(())
    }

    fn load_debaters(&self, room_id: Uuid) -> Result<Vec<Debater>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, username, position, joined_at, turns_count, is_active
             FROM debaters WHERE room_id = ?1 ORDER BY seat",
        )?;
        let debaters = stmt
            .query_map(params![room_id.to_string()], |row| {
                Ok(Debater {
                    user_id: parse_uuid(&row.get::<_, String>(0)?)?,
                    username: row.get(1)?,
                    position: row.get(2)?,
                    joined_at: parse_datetime(&row.get::<_, String>(3)?)?,
                    turns_count: row.get(4)?,
                    is_active: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(debaters)
    }

    /// Find room by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Room>> {
        let sql = format!("SELECT {} FROM rooms WHERE id = ?1", ROOM_COLUMNS);
        let room = self
            .conn
            .query_row(&sql, params![id.to_string()], room_from_row)
            .optional()?;

        match room {
            Some(mut room) => {
                room.debaters = self.load_debaters(room.id)?;
                Ok(Some(room))
            }
            None => Ok(None),
        }
    }

    /// Every stored room, newest first
    #[instrument(skip(self))]
    pub fn list_all(&self) -> Result<Vec<Room>> {
        let sql = format!("SELECT {} FROM rooms ORDER BY created_at DESC", ROOM_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rooms = stmt
            .query_map([], room_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for room in &mut rooms {
            room.debaters = self.load_debaters(room.id)?;
        }
        Ok(rooms)
    }

    /// Ended rooms a user debated in, newest first
    #[instrument(skip(self))]
    pub fn list_debated_by(&self, user_id: Uuid) -> Result<Vec<Room>> {
        let sql = format!(
            "SELECT {} FROM rooms WHERE status = 'ended' AND id IN
                (SELECT room_id FROM debaters WHERE user_id = ?1)
             ORDER BY ended_at DESC",
            ROOM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rooms = stmt
            .query_map(params![user_id.to_string()], room_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for room in &mut rooms {
            room.debaters = self.load_debaters(room.id)?;
        }
        Ok(rooms)
    }

    /// Close rooms left live by an unclean shutdown
    #[instrument(skip(self))]
    pub fn end_stale_live_rooms(&self, at: chrono::DateTime<chrono::Utc>) -> Result<u64> {
        let count = self.conn.execute(
            "UPDATE rooms SET status = 'ended', ended_at = ?1 WHERE status = 'live'",
            params![at.to_rfc3339()],
        )?;
        self.conn.execute(
            "UPDATE debaters SET is_active = 0 WHERE room_id IN (SELECT id FROM rooms WHERE ended_at = ?1)",
            params![at.to_rfc3339()],
        )?;
        Ok(count as u64)
    }
}

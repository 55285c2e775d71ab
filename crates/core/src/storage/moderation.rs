//! Moderation audit log storage

use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_enum, parse_uuid, parse_uuid_opt};
use crate::error::Result;
use crate::models::{ModerationLogEntry, ModeratorAction};

pub struct ModerationStore<'a> {
    conn: &'a Connection,
}

impl<'a> ModerationStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append an audit entry, once
    #[instrument(skip(self, entry), fields(room_id = %entry.room_id, action = entry.action.as_str()))]
    pub fn insert(&self, entry: &ModerationLogEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO moderation_log (id, room_id, moderator_id, action, target_user_id, reason, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO NOTHING",
            params![
                entry.id.to_string(),
                entry.room_id.to_string(),
                entry.moderator_id.to_string(),
                entry.action.as_str(),
                entry.target_user_id.map(|id| id.to_string()),
                entry.reason,
                entry.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Audit entries of a room, oldest first
    #[instrument(skip(self))]
    pub fn list_for_room(&self, room_id: Uuid) -> Result<Vec<ModerationLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, room_id, moderator_id, action, target_user_id, reason, timestamp
             FROM moderation_log WHERE room_id = ?1 ORDER BY timestamp ASC, rowid ASC",
        )?;
        let entries = stmt
            .query_map(params![room_id.to_string()], |row| {
                Ok(ModerationLogEntry {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    room_id: parse_uuid(&row.get::<_, String>(1)?)?,
                    moderator_id: parse_uuid(&row.get::<_, String>(2)?)?,
                    action: parse_enum(&row.get::<_, String>(3)?, ModeratorAction::parse)?,
                    target_user_id: parse_uuid_opt(row.get(4)?)?,
                    reason: row.get(5)?,
                    timestamp: parse_datetime(&row.get::<_, String>(6)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{Room, User, WarningKind};
    use crate::moderation::{ModerationCommand, ModerationLog};
    use crate::storage::Database;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_log_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let host = User::new("host".into(), "host@example.com".into(), "hash".into());
        db.users().create(&host).unwrap();
        let room = Room::new("Should cities ban private cars?".into(), host.id);
        db.rooms().save(&room).unwrap();

        let mut log = ModerationLog::new(room.id);
        let debater = Uuid::new_v4();
        let now = Utc::now();
        let warn = log
            .record(
                host.id,
                &ModerationCommand::Warn {
                    debater_id: debater,
                    kind: WarningKind::Time,
                },
                now,
            )
            .clone();
        let pause = log.record(host.id, &ModerationCommand::Pause, now).clone();
        db.moderation_log().insert(&warn).unwrap();
        db.moderation_log().insert(&pause).unwrap();

        let stored = db.moderation_log().list_for_room(room.id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].action, warn.action);
        assert_eq!(stored[0].target_user_id, Some(debater));
        assert_eq!(stored[1].target_user_id, None);
    }
}

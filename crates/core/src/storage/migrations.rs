//! Database migration system
//!
//! Tracks schema versions and applies migrations in order.

use rusqlite::Connection;
use tracing::{info, instrument};

use crate::error::Result;

/// A database migration
pub struct Migration {
    /// Version number (must be sequential starting from 1)
    pub version: u32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to run for this migration
    pub sql: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Accounts",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE COLLATE NOCASE,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                display_name TEXT NOT NULL,
                bio TEXT,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_login TEXT
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                token TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 2,
        description: "Rooms and debaters",
        sql: r#"
            CREATE TABLE IF NOT EXISTS rooms (
                id TEXT PRIMARY KEY,
                theme TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                debate_type TEXT NOT NULL,
                format TEXT NOT NULL,
                level TEXT NOT NULL,
                status TEXT NOT NULL,
                creator_id TEXT NOT NULL,
                moderator_id TEXT,
                audience_count INTEGER NOT NULL DEFAULT 0,
                max_debaters INTEGER NOT NULL,
                rules TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                scheduled_at TEXT,
                started_at TEXT,
                ended_at TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (creator_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS debaters (
                room_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                username TEXT NOT NULL,
                position TEXT NOT NULL,
                joined_at TEXT NOT NULL,
                turns_count INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                seat INTEGER NOT NULL,
                PRIMARY KEY (room_id, user_id),
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_rooms_status ON rooms(status);
            CREATE INDEX IF NOT EXISTS idx_debaters_user ON debaters(user_id);
        "#,
    },
    Migration {
        version: 3,
        description: "Turn history",
        sql: r#"
            CREATE TABLE IF NOT EXISTS turns (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                speaker_id TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                duration INTEGER NOT NULL,
                transcription TEXT,
                highlights TEXT NOT NULL DEFAULT '[]',
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_turns_room ON turns(room_id);
            CREATE INDEX IF NOT EXISTS idx_turns_speaker ON turns(speaker_id);
        "#,
    },
    Migration {
        version: 4,
        description: "Moderation audit log",
        sql: r#"
            CREATE TABLE IF NOT EXISTS moderation_log (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                moderator_id TEXT NOT NULL,
                action TEXT NOT NULL,
                target_user_id TEXT,
                reason TEXT,
                timestamp TEXT NOT NULL,
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_moderation_room ON moderation_log(room_id);
        "#,
    },
    Migration {
        version: 5,
        description: "Jury evaluations and feedback",
        sql: r#"
            CREATE TABLE IF NOT EXISTS jury_evaluations (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                evaluator_id TEXT NOT NULL,
                debater_id TEXT NOT NULL,
                clarity REAL NOT NULL,
                coherence REAL NOT NULL,
                precision REAL NOT NULL,
                depth REAL NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                excerpts TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                UNIQUE(room_id, evaluator_id, debater_id),
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS feedback (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                summary TEXT NOT NULL,
                evaluation TEXT NOT NULL,
                overall REAL NOT NULL,
                points_awarded INTEGER NOT NULL,
                title_progress TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(room_id, user_id),
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_evaluations_debater ON jury_evaluations(debater_id);
            CREATE INDEX IF NOT EXISTS idx_feedback_user ON feedback(user_id);
        "#,
    },
    Migration {
        version: 6,
        description: "Title points per domain",
        sql: r#"
            CREATE TABLE IF NOT EXISTS user_titles (
                user_id TEXT NOT NULL,
                domain TEXT NOT NULL,
                points INTEGER NOT NULL DEFAULT 0,
                level INTEGER NOT NULL DEFAULT 0,
                earned_at TEXT NOT NULL,
                PRIMARY KEY (user_id, domain),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
    },
];

/// Initialize the migrations table
fn init_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version
fn get_current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .unwrap_or(None);
    Ok(version.unwrap_or(0))
}

/// Record that a migration was applied
fn record_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.description,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

/// Run all pending migrations
#[instrument(skip(conn))]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    init_migrations_table(conn)?;

    let current_version = get_current_version(conn)?;
    info!(current_version, "Checking for pending migrations");

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                description = migration.description,
                "Applying migration"
            );

            conn.execute_batch(migration.sql)?;
            record_migration(conn, migration)?;

            info!(version = migration.version, "Migration complete");
        }
    }

    let new_version = get_current_version(conn)?;
    if new_version > current_version {
        info!(
            from = current_version,
            to = new_version,
            "Database schema updated"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Get the latest migration version (test helper)
    fn latest_version() -> u32 {
        MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
    }

    #[test]
    fn test_migrations_run() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let version = get_current_version(&conn).unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run twice
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_current_version(&conn).unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn test_migrations_sequential() {
        // Verify migrations are numbered sequentially
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(
                migration.version as usize,
                i + 1,
                "Migration {} should have version {}",
                migration.description,
                i + 1
            );
        }
    }
}

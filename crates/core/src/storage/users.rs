//! User, login session and title storage

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_datetime_opt, parse_uuid, OptionalExt};
use crate::error::{Error, Result};
use crate::models::{Session, TitleLevel, User, UserTitle};

const USER_COLUMNS: &str =
    "id, username, email, display_name, bio, password_hash, created_at, last_login";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        username: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        bio: row.get(4)?,
        password_hash: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?)?,
        last_login: parse_datetime_opt(row.get::<_, Option<String>>(7)?)?,
    })
}

pub struct UserStore<'a> {
    conn: &'a Connection,
}

impl<'a> UserStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new user
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub fn create(&self, user: &User) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users (id, username, email, display_name, bio, password_hash, created_at, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id.to_string(),
                user.username,
                user.email,
                user.display_name,
                user.bio,
                user.password_hash,
                user.created_at.to_rfc3339(),
                user.last_login.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Find user by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        let user = self
            .conn
            .query_row(&sql, params![id.to_string()], user_from_row)
            .optional()?;
        Ok(user)
    }

    /// Find user by username (case-insensitive)
    #[instrument(skip(self))]
    pub fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS);
        let user = self
            .conn
            .query_row(&sql, params![username], user_from_row)
            .optional()?;
        Ok(user)
    }

    /// Find user by e-mail (case-insensitive)
    #[instrument(skip(self))]
    pub fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
        let user = self
            .conn
            .query_row(&sql, params![email], user_from_row)
            .optional()?;
        Ok(user)
    }

    /// Update last login time
    pub fn update_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), user_id.to_string()],
        )?;
        Ok(())
    }

    /// Store a new display name and bio
    #[instrument(skip(self, display_name, bio))]
    pub fn update_profile(&self, user_id: Uuid, display_name: &str, bio: Option<&str>) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE users SET display_name = ?1, bio = ?2 WHERE id = ?3",
            params![display_name, bio, user_id.to_string()],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("User {}", user_id)));
        }
        Ok(())
    }

    /// Create a session
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub fn create_session(&self, session: &Session) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (id, user_id, token, created_at, expires_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id.to_string(),
                session.user_id.to_string(),
                session.token,
                session.created_at.to_rfc3339(),
                session.expires_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Find a session by token that has not expired at `now`
    #[instrument(skip(self, token))]
    pub fn find_valid_session(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Session>> {
        let session = self
            .conn
            .query_row(
                "SELECT id, user_id, token, created_at, expires_at FROM sessions
                 WHERE token = ?1 AND expires_at > ?2",
                params![token, now.to_rfc3339()],
                |row| {
                    Ok(Session {
                        id: parse_uuid(&row.get::<_, String>(0)?)?,
                        user_id: parse_uuid(&row.get::<_, String>(1)?)?,
                        token: row.get(2)?,
                        created_at: parse_datetime(&row.get::<_, String>(3)?)?,
                        expires_at: parse_datetime(&row.get::<_, String>(4)?)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    /// Delete session by token
    pub fn delete_session(&self, token: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(())
    }

    /// Delete all sessions for user
    pub fn delete_user_sessions(&self, user_id: Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM sessions WHERE user_id = ?1",
            params![user_id.to_string()],
        )?;
        Ok(())
    }

    /// Clean up expired sessions
    pub fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let count = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at < ?1",
            params![now.to_rfc3339()],
        )?;
        Ok(count as u64)
    }

    /// Title points accumulated in a domain
    pub fn title_points(&self, user_id: Uuid, domain: &str) -> Result<u32> {
        let points = self
            .conn
            .query_row(
                "SELECT points FROM user_titles WHERE user_id = ?1 AND domain = ?2",
                params![user_id.to_string(), domain],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(points.unwrap_or(0))
    }

    /// Set the point total of a domain. `earned_at` moves only when the level changes.
    #[instrument(skip(self))]
    pub fn set_title_points(
        &self,
        user_id: Uuid,
        domain: &str,
        points: u32,
        level: TitleLevel,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO user_titles (user_id, domain, points, level, earned_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, domain) DO UPDATE SET
                points = excluded.points,
                earned_at = CASE WHEN level <> excluded.level THEN excluded.earned_at ELSE earned_at END,
                level = excluded.level",
            params![
                user_id.to_string(),
                domain,
                points,
                level as u8,
                at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Titles earned across domains, highest first
    pub fn list_titles(&self, user_id: Uuid) -> Result<Vec<UserTitle>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain, level, earned_at FROM user_titles
             WHERE user_id = ?1 ORDER BY level DESC, domain ASC",
        )?;
        let titles = stmt
            .query_map(params![user_id.to_string()], |row| {
                Ok(UserTitle {
                    domain: row.get(0)?,
                    level: TitleLevel::from_index(row.get::<_, u32>(1)?),
                    earned_at: parse_datetime(&row.get::<_, String>(2)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(titles)
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{Session, TitleLevel, User};
    use crate::storage::Database;
    use chrono::{Duration, Utc};

    fn user(name: &str) -> User {
        User::new(name.into(), format!("{}@example.com", name), "hash".into())
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        let ana = user("Ana");
        db.users().create(&ana).unwrap();

        assert!(db.users().find_by_username("ana").unwrap().is_some());
        assert!(db.users().find_by_email("ANA@example.com").unwrap().is_some());
        assert!(db.users().find_by_username("ben").unwrap().is_none());
        assert!(db.users().create(&user("ana")).is_err());
    }

    #[test]
    fn test_session_expiry() {
        let db = Database::open_in_memory().unwrap();
        let ana = user("ana");
        db.users().create(&ana).unwrap();

        let session = Session::new(ana.id, "token-1".into(), 1);
        db.users().create_session(&session).unwrap();

        let now = Utc::now();
        assert!(db.users().find_valid_session("token-1", now).unwrap().is_some());
        assert!(db
            .users()
            .find_valid_session("token-1", now + Duration::hours(2))
            .unwrap()
            .is_none());

        assert_eq!(
            db.users()
                .cleanup_expired_sessions(now + Duration::hours(2))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_title_points_upsert() {
        let db = Database::open_in_memory().unwrap();
        let ana = user("ana");
        db.users().create(&ana).unwrap();
        let now = Utc::now();

        db.users()
            .set_title_points(ana.id, "Ethics", 60, TitleLevel::Novice, now)
            .unwrap();
        db.users()
            .set_title_points(ana.id, "Ethics", 110, TitleLevel::Apprentice, now)
            .unwrap();

        assert_eq!(db.users().title_points(ana.id, "Ethics").unwrap(), 110);
        assert_eq!(db.users().title_points(ana.id, "Physics").unwrap(), 0);

        let titles = db.users().list_titles(ana.id).unwrap();
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].level, TitleLevel::Apprentice);
    }
}

//! Account registration, login and login sessions

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::models::{Session, User};
use crate::storage::UserRepository;
use crate::validation::FieldErrors;
use crate::{Error, Result};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_BIO_LEN: usize = 500;

/// Login sessions last one week unless configured otherwise
pub const DEFAULT_SESSION_HOURS: i64 = 24 * 7;

const TOKEN_BYTES: usize = 32;

/// Fields submitted by the registration form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Profile fields to change; `None` leaves a field as it is
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub display_name: Option<String>,
    /// An empty bio clears it
    #[serde(default)]
    pub bio: Option<String>,
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

/// Field-level checks, independent of what is already stored
pub fn validate_registration(form: &Registration) -> FieldErrors {
    let mut errors = FieldErrors::new();

    let username = form.username.trim();
    if username.chars().count() < MIN_USERNAME_LEN {
        errors.add(
            "username",
            format!("Username must be at least {} characters", MIN_USERNAME_LEN),
        );
    } else if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        errors.add(
            "username",
            "Username may only contain letters, digits and underscores",
        );
    }

    if !is_valid_email(form.email.trim()) {
        errors.add("email", "Enter a valid e-mail address");
    }

    if form.password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        );
    }
    if form.password != form.confirm_password {
        errors.add("confirm_password", "Passwords do not match");
    }

    errors
}

pub fn validate_profile(update: &ProfileUpdate) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if update
        .display_name
        .as_deref()
        .is_some_and(|name| name.trim().is_empty())
    {
        errors.add("display_name", "Display name cannot be empty");
    }
    if update
        .bio
        .as_deref()
        .is_some_and(|bio| bio.trim().chars().count() > MAX_BIO_LEN)
    {
        errors.add(
            "bio",
            format!("Bio must be at most {} characters", MAX_BIO_LEN),
        );
    }
    errors
}

/// Opaque session token: random bytes, URL-safe base64
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::Authentication(format!("Failed to hash password: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Account operations over any user repository
pub struct AuthService<'a, R: UserRepository> {
    repo: &'a R,
    session_hours: i64,
}

impl<'a, R: UserRepository> AuthService<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self {
            repo,
            session_hours: DEFAULT_SESSION_HOURS,
        }
    }

    pub fn with_session_hours(mut self, hours: i64) -> Self {
        self.session_hours = hours;
        self
    }

    fn open_session(&self, user: &User, now: DateTime<Utc>) -> Result<Session> {
        let session = Session {
            id: uuid::Uuid::new_v4(),
            user_id: user.id,
            token: generate_token(),
            created_at: now,
            expires_at: now + Duration::hours(self.session_hours),
        };
        self.repo.create_session(&session)?;
        self.repo.update_last_login(user.id, now)?;
        Ok(session)
    }

    /// Create an account and log it in
    #[instrument(skip(self, form), fields(username = %form.username))]
    pub fn register(&self, form: &Registration, now: DateTime<Utc>) -> Result<(User, Session)> {
        let mut errors = validate_registration(form);
        let username = form.username.trim();
        let email = form.email.trim();

        if !errors.contains("username") && self.repo.find_user_by_username(username)?.is_some() {
            errors.add("username", "Username is already taken");
        }
        if !errors.contains("email") && self.repo.find_user_by_email(email)?.is_some() {
            errors.add("email", "An account with this e-mail already exists");
        }
        errors.into_result()?;

        let mut user = User::new(
            username.to_string(),
            email.to_string(),
            hash_password(&form.password)?,
        );
        user.created_at = now;
        if let Some(display_name) = form
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            user.display_name = display_name.to_string();
        }
        self.repo.create_user(&user)?;

        let session = self.open_session(&user, now)?;
        info!(user_id = %user.id, "Account registered");
        Ok((user, session))
    }

    /// Log in by e-mail or username
    #[instrument(skip(self, password))]
    pub fn login(&self, identifier: &str, password: &str, now: DateTime<Utc>) -> Result<(User, Session)> {
        let identifier = identifier.trim();
        let user = if identifier.contains('@') {
            self.repo.find_user_by_email(identifier)?
        } else {
            self.repo.find_user_by_username(identifier)?
        };

        let user = match user {
            Some(user) if verify_password(password, &user.password_hash) => user,
            _ => {
                warn!("Rejected login attempt");
                return Err(Error::Authentication("Invalid credentials".to_string()));
            }
        };

        let session = self.open_session(&user, now)?;
        info!(user_id = %user.id, "Logged in");
        Ok((user, session))
    }

    /// Resolve a session token to its user
    pub fn resume(&self, token: &str, now: DateTime<Utc>) -> Result<User> {
        let session = self
            .repo
            .find_valid_session(token, now)?
            .ok_or_else(|| Error::Authentication("Session expired".to_string()))?;
        self.repo
            .find_user_by_id(session.user_id)?
            .ok_or_else(|| Error::Authentication("Account no longer exists".to_string()))
    }

    pub fn logout(&self, token: &str) -> Result<()> {
        self.repo.delete_session(token)
    }

    /// Change the display name and bio of an account
    #[instrument(skip(self, update))]
    pub fn update_profile(&self, user_id: uuid::Uuid, update: &ProfileUpdate) -> Result<User> {
        validate_profile(update).into_result()?;
        let mut user = self
            .repo
            .find_user_by_id(user_id)?
            .ok_or_else(|| Error::NotFound(format!("User {}", user_id)))?;

        if let Some(name) = &update.display_name {
            user.display_name = name.trim().to_string();
        }
        if let Some(bio) = &update.bio {
            let bio = bio.trim();
            user.bio = (!bio.is_empty()).then(|| bio.to_string());
        }
        self.repo
            .update_profile(user.id, &user.display_name, user.bio.as_deref())?;
        info!(user_id = %user.id, "Profile updated");
        Ok(user)
    }
}

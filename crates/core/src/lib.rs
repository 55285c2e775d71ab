//! Tribuna Core Library
//!
//! Debate room models, turn scheduling, moderation, audience aggregation,
//! evaluation and storage for the Tribuna platform.

pub mod audience;
pub mod auth;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod invariants;
pub mod models;
pub mod moderation;
pub mod permissions;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod validation;
pub mod wizard;

pub use audience::AudienceAggregator;
pub use auth::{AuthService, ProfileUpdate, Registration};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use models::*;
pub use moderation::{ModerationCommand, ModerationLog};
pub use permissions::*;
pub use registry::{RoomFilter, RoomRegistry, RoomSort};
pub use scheduler::{AssignOutcome, TickOutcome, TurnScheduler};
pub use session::{DebateSession, JoinRole, Member, SessionEvent, SessionSnapshot};
pub use storage::{
    Database, EvaluationRepository, ModerationRepository, RoomRepository, Storage,
    TurnRepository, UserRepository,
};
pub use validation::FieldErrors;
pub use wizard::{RoomDraft, RoomWizard, WizardStep};

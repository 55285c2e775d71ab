//! Data models for Tribuna

mod audience;
mod feedback;
mod moderation;
mod participant;
mod room;
mod turn;
mod user;

pub use audience::*;
pub use feedback::*;
pub use moderation::*;
pub use participant::*;
pub use room::*;
pub use turn::*;
pub use user::*;

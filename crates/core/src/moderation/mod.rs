//! Moderation commands and the audit log
//!
//! Commands are applied by [`crate::session::DebateSession::moderate`];
//! this module defines what a moderator can ask for and how each
//! successful command is recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ModerationLogEntry, ModeratorAction, WarningKind};
use crate::permissions::RoomAction;

/// A moderator request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ModerationCommand {
    MuteDebater { debater_id: Uuid },
    UnmuteDebater { debater_id: Uuid },
    Warn { debater_id: Uuid, kind: WarningKind },
    Pause,
    Resume,
    EndSession,
    /// Explicit pre-emption: end the current turn and give the floor away
    SwitchTurn { debater_id: Uuid },
    /// Give the floor to a debater when nobody holds it
    AssignTurn { debater_id: Uuid },
    EndTurn,
    ExtendTime { seconds: u32 },
    MuteAudience,
    UnmuteAudience,
    ApproveQuestion { question_id: Uuid },
    RejectQuestion { question_id: Uuid },
    AnswerQuestion { question_id: Uuid },
}

impl ModerationCommand {
    /// Permission required to issue this command
    pub fn required_action(&self) -> RoomAction {
        match self {
            ModerationCommand::MuteDebater { .. } | ModerationCommand::UnmuteDebater { .. } => {
                RoomAction::MuteDebater
            }
            ModerationCommand::Warn { .. } => RoomAction::SendWarning,
            ModerationCommand::Pause | ModerationCommand::Resume => RoomAction::PauseSession,
            ModerationCommand::EndSession => RoomAction::EndSession,
            ModerationCommand::SwitchTurn { .. } => RoomAction::SwitchTurn,
            ModerationCommand::AssignTurn { .. } => RoomAction::AssignTurn,
            ModerationCommand::EndTurn => RoomAction::EndTurn,
            ModerationCommand::ExtendTime { .. } => RoomAction::ExtendTime,
            ModerationCommand::MuteAudience | ModerationCommand::UnmuteAudience => {
                RoomAction::MuteAudience
            }
            ModerationCommand::ApproveQuestion { .. }
            | ModerationCommand::RejectQuestion { .. }
            | ModerationCommand::AnswerQuestion { .. } => RoomAction::ManageQuestions,
        }
    }

    /// Audit log action for this command
    pub fn action(&self) -> ModeratorAction {
        match self {
            ModerationCommand::MuteDebater { .. } => ModeratorAction::MuteDebater,
            ModerationCommand::UnmuteDebater { .. } => ModeratorAction::UnmuteDebater,
            ModerationCommand::Warn { kind, .. } => ModeratorAction::for_warning(*kind),
            ModerationCommand::Pause => ModeratorAction::PauseDebate,
            ModerationCommand::Resume => ModeratorAction::ResumeDebate,
            ModerationCommand::EndSession => ModeratorAction::EndDebate,
            ModerationCommand::SwitchTurn { .. } | ModerationCommand::AssignTurn { .. } => {
                ModeratorAction::SwitchTurn
            }
            ModerationCommand::EndTurn => ModeratorAction::EndTurn,
            ModerationCommand::ExtendTime { .. } => ModeratorAction::ExtendTime,
            ModerationCommand::MuteAudience => ModeratorAction::MuteAudience,
            ModerationCommand::UnmuteAudience => ModeratorAction::UnmuteAudience,
            ModerationCommand::ApproveQuestion { .. } => ModeratorAction::ApproveQuestion,
            ModerationCommand::RejectQuestion { .. } => ModeratorAction::RejectQuestion,
            ModerationCommand::AnswerQuestion { .. } => ModeratorAction::AnswerQuestion,
        }
    }

    /// User targeted by the command, if any
    pub fn target(&self) -> Option<Uuid> {
        match self {
            ModerationCommand::MuteDebater { debater_id }
            | ModerationCommand::UnmuteDebater { debater_id }
            | ModerationCommand::Warn { debater_id, .. }
            | ModerationCommand::SwitchTurn { debater_id }
            | ModerationCommand::AssignTurn { debater_id } => Some(*debater_id),
            _ => None,
        }
    }

    /// Reason text stored alongside the audit entry
    pub fn reason(&self) -> Option<String> {
        match self {
            ModerationCommand::Warn { kind, .. } => Some(kind.message().to_string()),
            ModerationCommand::ExtendTime { seconds } => Some(format!("+{}s", seconds)),
            ModerationCommand::ApproveQuestion { question_id }
            | ModerationCommand::RejectQuestion { question_id }
            | ModerationCommand::AnswerQuestion { question_id } => {
                Some(format!("question {}", question_id))
            }
            _ => None,
        }
    }
}

/// Append-only audit log of moderation actions for one room
#[derive(Debug, Clone)]
pub struct ModerationLog {
    room_id: Uuid,
    entries: Vec<ModerationLogEntry>,
}

impl ModerationLog {
    pub fn new(room_id: Uuid) -> Self {
        Self {
            room_id,
            entries: Vec::new(),
        }
    }

    /// Record a successful command
    pub fn record(
        &mut self,
        moderator_id: Uuid,
        command: &ModerationCommand,
        timestamp: DateTime<Utc>,
    ) -> &ModerationLogEntry {
        self.entries.push(ModerationLogEntry {
            id: Uuid::new_v4(),
            room_id: self.room_id,
            moderator_id,
            action: command.action(),
            target_user_id: command.target(),
            reason: command.reason(),
            timestamp,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[ModerationLogEntry] {
        &self.entries
    }

    /// Entries that targeted a given user
    pub fn for_target(&self, user_id: Uuid) -> Vec<&ModerationLogEntry> {
        self.entries
            .iter()
            .filter(|e| e.target_user_id == Some(user_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

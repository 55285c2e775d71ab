//! Moderation audit models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canned warnings a moderator can send to a debater
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningKind {
    Time,
    Topic,
    Respect,
    Evidence,
}

impl WarningKind {
    pub fn label(&self) -> &'static str {
        match self {
            WarningKind::Time => "Time running out",
            WarningKind::Topic => "Off topic",
            WarningKind::Respect => "Keep it respectful",
            WarningKind::Evidence => "Missing evidence",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            WarningKind::Time => "Your time is running out. Please wrap up.",
            WarningKind::Topic => "Please return to the main topic of the debate.",
            WarningKind::Respect => "Keep civility and respect towards the other debater.",
            WarningKind::Evidence => "Please present evidence for your claims.",
        }
    }
}

/// Kind of a logged moderation action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeratorAction {
    MuteDebater,
    UnmuteDebater,
    TimeWarning,
    TopicWarning,
    RespectWarning,
    EvidenceWarning,
    PauseDebate,
    ResumeDebate,
    EndDebate,
    SwitchTurn,
    EndTurn,
    ExtendTime,
    MuteAudience,
    UnmuteAudience,
    ApproveQuestion,
    RejectQuestion,
    AnswerQuestion,
}

impl ModeratorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeratorAction::MuteDebater => "mute-debater",
            ModeratorAction::UnmuteDebater => "unmute-debater",
            ModeratorAction::TimeWarning => "time-warning",
            ModeratorAction::TopicWarning => "topic-warning",
            ModeratorAction::RespectWarning => "respect-warning",
            ModeratorAction::EvidenceWarning => "evidence-warning",
            ModeratorAction::PauseDebate => "pause-debate",
            ModeratorAction::ResumeDebate => "resume-debate",
            ModeratorAction::EndDebate => "end-debate",
            ModeratorAction::SwitchTurn => "switch-turn",
            ModeratorAction::EndTurn => "end-turn",
            ModeratorAction::ExtendTime => "extend-time",
            ModeratorAction::MuteAudience => "mute-audience",
            ModeratorAction::UnmuteAudience => "unmute-audience",
            ModeratorAction::ApproveQuestion => "approve-question",
            ModeratorAction::RejectQuestion => "reject-question",
            ModeratorAction::AnswerQuestion => "answer-question",
        }
    }

    pub fn parse(s: &str) -> Option<ModeratorAction> {
        const ALL: [ModeratorAction; 17] = [
            ModeratorAction::MuteDebater,
            ModeratorAction::UnmuteDebater,
            ModeratorAction::TimeWarning,
            ModeratorAction::TopicWarning,
            ModeratorAction::RespectWarning,
            ModeratorAction::EvidenceWarning,
            ModeratorAction::PauseDebate,
            ModeratorAction::ResumeDebate,
            ModeratorAction::EndDebate,
            ModeratorAction::SwitchTurn,
            ModeratorAction::EndTurn,
            ModeratorAction::ExtendTime,
            ModeratorAction::MuteAudience,
            ModeratorAction::UnmuteAudience,
            ModeratorAction::ApproveQuestion,
            ModeratorAction::RejectQuestion,
            ModeratorAction::AnswerQuestion,
        ];
        ALL.into_iter().find(|a| a.as_str() == s)
    }

    pub fn for_warning(kind: WarningKind) -> ModeratorAction {
        match kind {
            WarningKind::Time => ModeratorAction::TimeWarning,
            WarningKind::Topic => ModeratorAction::TopicWarning,
            WarningKind::Respect => ModeratorAction::RespectWarning,
            WarningKind::Evidence => ModeratorAction::EvidenceWarning,
        }
    }
}

/// One audited moderation action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationLogEntry {
    pub id: Uuid,
    pub room_id: Uuid,
    pub moderator_id: Uuid,
    pub action: ModeratorAction,
    pub target_user_id: Option<Uuid>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

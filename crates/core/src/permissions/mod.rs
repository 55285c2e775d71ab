//! Permission system for room operations

use crate::models::ParticipantRole;

/// Actions that can be performed in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomAction {
    // Speaking
    RequestTurn,
    YieldTurn,

    // Audience
    React,
    SubmitQuestion,
    CastVote,

    // Turn control
    AssignTurn,
    SwitchTurn,
    EndTurn,
    ExtendTime,

    // Discipline
    MuteDebater,
    SendWarning,
    MuteAudience,
    ManageQuestions,

    // Session lifecycle
    PauseSession,
    EndSession,
}

/// Permission matrix for room roles
pub struct PermissionMatrix;

impl PermissionMatrix {
    /// Check if a role has permission to perform an action
    pub fn can_perform(role: ParticipantRole, action: RoomAction) -> bool {
        match action {
            // Only seated debaters speak
            RoomAction::RequestTurn => role == ParticipantRole::Debater,
            RoomAction::YieldTurn => role == ParticipantRole::Debater,

            // Debaters react too; moderators stay neutral
            RoomAction::React => role <= ParticipantRole::Debater,
            RoomAction::SubmitQuestion => role == ParticipantRole::Audience,
            RoomAction::CastVote => role == ParticipantRole::Audience,

            // Everything else is moderator-only
            RoomAction::AssignTurn
            | RoomAction::SwitchTurn
            | RoomAction::EndTurn
            | RoomAction::ExtendTime
            | RoomAction::MuteDebater
            | RoomAction::SendWarning
            | RoomAction::MuteAudience
            | RoomAction::ManageQuestions
            | RoomAction::PauseSession
            | RoomAction::EndSession => role == ParticipantRole::Moderator,
        }
    }

    /// Organizer privileges for the room creator when no moderator is assigned
    pub fn organizer_can_perform(action: RoomAction) -> bool {
        matches!(action, RoomAction::PauseSession | RoomAction::EndSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moderator_permissions() {
        let role = ParticipantRole::Moderator;
        assert!(PermissionMatrix::can_perform(role, RoomAction::MuteDebater));
        assert!(PermissionMatrix::can_perform(role, RoomAction::EndSession));
        assert!(PermissionMatrix::can_perform(role, RoomAction::SwitchTurn));
        assert!(!PermissionMatrix::can_perform(role, RoomAction::RequestTurn));
        assert!(!PermissionMatrix::can_perform(role, RoomAction::React));
    }

    #[test]
    fn test_debater_permissions() {
        let role = ParticipantRole::Debater;
        assert!(PermissionMatrix::can_perform(role, RoomAction::RequestTurn));
        assert!(PermissionMatrix::can_perform(role, RoomAction::React));
        assert!(!PermissionMatrix::can_perform(role, RoomAction::SubmitQuestion));
        assert!(!PermissionMatrix::can_perform(role, RoomAction::AssignTurn));
    }

    #[test]
    fn test_audience_permissions() {
        let role = ParticipantRole::Audience;
        assert!(PermissionMatrix::can_perform(role, RoomAction::SubmitQuestion));
        assert!(PermissionMatrix::can_perform(role, RoomAction::CastVote));
        assert!(!PermissionMatrix::can_perform(role, RoomAction::RequestTurn));
        assert!(!PermissionMatrix::can_perform(role, RoomAction::PauseSession));
    }

    #[test]
    fn test_organizer_is_limited() {
        assert!(PermissionMatrix::organizer_can_perform(RoomAction::EndSession));
        assert!(!PermissionMatrix::organizer_can_perform(RoomAction::MuteDebater));
    }
}

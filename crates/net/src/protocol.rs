//! Network protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire.
//! Replies to a client's requests arrive in request order; session
//! events for joined rooms may be interleaved between them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tribuna_core::{
    AudienceVote, DebateFeedback, FieldErrors, HistoryEntry, JoinRole, JuryEvaluation,
    ModerationCommand, ParticipantRole, ReactionKind, Registration, Room, RoomDraft, RoomFilter,
    RoomSort, SessionEvent, SessionSnapshot, User, UserStats, UserTitle,
};

/// Network protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    // Client requests
    Register { form: Registration },
    Login { identifier: String, password: String },
    /// Re-authenticate with a token from an earlier login
    Resume { token: String },
    Logout,
    /// Change the display name and bio; absent fields stay as they are
    UpdateProfile {
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        bio: Option<String>,
    },
    ListRooms {
        #[serde(default)]
        filter: RoomFilter,
        #[serde(default)]
        sort: RoomSort,
    },
    CreateRoom { draft: RoomDraft },
    SetModerator { room_id: Uuid, moderator_id: Uuid },
    /// Take a debater seat before the room starts
    ClaimSeat { room_id: Uuid, position: String },
    StartRoom { room_id: Uuid },
    JoinRoom { room_id: Uuid, role: JoinRole },
    LeaveRoom { room_id: Uuid },
    RequestTurn { room_id: Uuid },
    YieldTurn { room_id: Uuid },
    Moderate { room_id: Uuid, command: ModerationCommand },
    React { room_id: Uuid, kind: ReactionKind },
    SubmitQuestion { room_id: Uuid, text: String },
    CastVote { room_id: Uuid, debater_id: Uuid, vote: AudienceVote },
    /// The evaluator, ID and timestamp are assigned by the server
    SubmitEvaluation { evaluation: JuryEvaluation },
    GetFeedback { room_id: Uuid },
    GetHistory,
    Resync { room_id: Uuid },

    // Server replies
    Authenticated { user: User, token: String },
    AuthFailed {
        reason: String,
        #[serde(default)]
        errors: FieldErrors,
    },
    LoggedOut,
    ProfileUpdated { user: User },
    RoomList { rooms: Vec<Room> },
    RoomCreated { room: Room },
    RoomUpdated { room: Room },
    Joined {
        room_id: Uuid,
        role: ParticipantRole,
        snapshot: Box<SessionSnapshot>,
    },
    Left { room_id: Uuid },
    Snapshot { room_id: Uuid, snapshot: Box<SessionSnapshot> },
    TurnRequest { room_id: Uuid, pending: bool },
    QuestionSubmitted { room_id: Uuid, question_id: Uuid },
    EvaluationRecorded { room_id: Uuid, debater_id: Uuid },
    Feedback { feedback: DebateFeedback },
    History {
        entries: Vec<HistoryEntry>,
        stats: UserStats,
        titles: Vec<UserTitle>,
    },
    /// Generic acknowledgement of a command with no other reply
    Accepted,
    Rejected {
        reason: String,
        #[serde(default)]
        errors: FieldErrors,
    },

    /// Something happened in a joined room
    Event { room_id: Uuid, event: SessionEvent },

    /// Ping to keep connection alive
    Ping,

    /// Pong response to ping
    Pong,

    /// Server is shutting down
    ServerShutdown,
}

impl Message {
    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Rejection carrying a core error's message and field errors
    pub fn rejected(error: &tribuna_core::Error) -> Self {
        let errors = match error {
            tribuna_core::Error::Validation(errors) => errors.clone(),
            _ => FieldErrors::new(),
        };
        Message::Rejected {
            reason: error.to_string(),
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribuna_core::{Error, WarningKind};

    #[test]
    fn test_wire_shape() {
        let room_id = Uuid::new_v4();
        let msg = Message::Moderate {
            room_id,
            command: ModerationCommand::Warn {
                debater_id: Uuid::new_v4(),
                kind: WarningKind::Time,
            },
        };

        let value: serde_json::Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(value["type"], "Moderate");
        assert_eq!(value["command"]["command"], "warn");

        match Message::from_bytes(&msg.to_bytes().unwrap()).unwrap() {
            Message::Moderate { room_id: id, .. } => assert_eq!(id, room_id),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_list_rooms_defaults() {
        let msg = Message::from_bytes(br#"{"type":"ListRooms"}"#).unwrap();
        match msg {
            Message::ListRooms { filter, sort } => {
                assert_eq!(filter, RoomFilter::default());
                assert_eq!(sort, RoomSort::Recent);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_rejected_keeps_field_errors() {
        let mut errors = FieldErrors::new();
        errors.add("theme", "A theme is required");
        match Message::rejected(&Error::Validation(errors)) {
            Message::Rejected { errors, .. } => {
                assert_eq!(errors.get("theme"), Some("A theme is required"))
            }
            _ => panic!("Wrong message type"),
        }
    }
}

//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use uuid::Uuid;

use crate::models::{AudienceReaction, Room, RoomStatus, Turn};
use crate::scheduler::TurnScheduler;

/// Validate that a Room's state is internally consistent
pub fn assert_room_invariants(room: &Room) {
    debug_assert!(
        room.debaters.len() as u32 <= room.max_debaters,
        "Room {} has {} debaters, max is {}",
        room.id,
        room.debaters.len(),
        room.max_debaters
    );

    debug_assert!(
        !room.theme.trim().is_empty(),
        "Room {} has empty theme",
        room.id
    );

    // Lifecycle stamps follow the status
    match room.status {
        RoomStatus::Scheduled => debug_assert!(
            room.started_at.is_none() && room.ended_at.is_none(),
            "Scheduled room {} has start or end time",
            room.id
        ),
        RoomStatus::Live => debug_assert!(
            room.started_at.is_some() && room.ended_at.is_none(),
            "Live room {} has inconsistent timestamps",
            room.id
        ),
        RoomStatus::Ended => debug_assert!(
            room.ended_at.is_some(),
            "Ended room {} has no end time",
            room.id
        ),
    }

    if let Some(moderator) = room.moderator_id {
        debug_assert!(
            !room.is_debater(moderator),
            "Room {} moderator {} is also a debater",
            room.id,
            moderator
        );
    }
}

/// Validate a finished turn
pub fn assert_turn_invariants(turn: &Turn) {
    if let Some(ended_at) = turn.ended_at {
        debug_assert!(
            ended_at >= turn.started_at,
            "Turn {} ended before it started",
            turn.id
        );
        debug_assert!(
            (ended_at - turn.started_at).num_seconds() == turn.duration as i64,
            "Turn {} duration {} does not match its timestamps",
            turn.id,
            turn.duration
        );
    }
}

/// Validate that the scheduler never grants the floor to a stranger
pub fn assert_scheduler_invariants(scheduler: &TurnScheduler) {
    if let Some(active) = scheduler.active() {
        debug_assert!(
            scheduler.is_registered(active.turn.speaker_id),
            "Speaker {} is not a registered debater",
            active.turn.speaker_id
        );
        debug_assert!(
            active.remaining <= active.allotted,
            "Turn {} has {}s left of {}s",
            active.turn.id,
            active.remaining,
            active.allotted
        );
        debug_assert!(
            !scheduler.has_request(active.turn.speaker_id),
            "Speaker {} still has a pending request",
            active.turn.speaker_id
        );
    }
}

/// Validate reaction percentages
pub fn assert_reaction_invariants(reactions: &[AudienceReaction]) {
    let total: u32 = reactions.iter().map(|r| r.percentage as u32).sum();
    debug_assert!(total <= 100, "Reaction percentages sum to {}", total);
}

/// Validate that a user ID is not nil
pub fn assert_user_id_valid(user_id: Uuid, context: &str) {
    debug_assert!(
        user_id != Uuid::nil(),
        "Nil user_id in context: {}",
        context
    );
}

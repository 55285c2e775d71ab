//! Turn scheduling for a room
//!
//! The scheduler decides who holds the floor and owns the countdown for
//! the active turn. It is driven externally: the session owner calls
//! [`TurnScheduler::tick`] once per elapsed second.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{RoomRules, Turn, TurnEndReason};

/// Upper bound for a single extension
pub const MAX_EXTENSION_SECS: u32 = 300;

/// The turn currently holding the floor
#[derive(Debug, Clone)]
pub struct ActiveTurn {
    pub turn: Turn,
    /// Seconds left on the countdown
    pub remaining: u32,
    /// Seconds granted in total (initial duration plus extensions)
    pub allotted: u32,
    /// Epoch this turn was started under
    pub epoch: u64,
}

/// Scheduler state
#[derive(Debug, Clone)]
pub enum TurnState {
    /// Nobody has spoken yet
    Idle,
    /// One debater holds the floor
    Speaking(ActiveTurn),
    /// The last turn finished and nobody holds the floor
    TurnEnded { last: Turn, reason: TurnEndReason },
}

/// Outcome of one countdown step
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// No active turn
    Idle,
    /// Countdown is frozen (session paused)
    Frozen,
    /// Countdown moved on
    Running { speaker_id: Uuid, remaining: u32 },
    /// Countdown reached zero and the turn ended
    Expired(Turn),
}

/// Result of an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOutcome {
    /// A new turn started under this epoch
    Started { epoch: u64 },
    /// The debater already held the floor; nothing changed
    AlreadySpeaking { epoch: u64 },
}

/// Authoritative turn scheduler for one room
#[derive(Debug, Clone)]
pub struct TurnScheduler {
    room_id: Uuid,
    turn_duration: u32,
    max_turns: Option<u32>,
    debaters: Vec<Uuid>,
    state: TurnState,
    requests: VecDeque<Uuid>,
    /// Bumped whenever a turn starts or ends; stale expiries carry old epochs
    epoch: u64,
    turns_taken: u32,
    frozen: bool,
    closed: bool,
}

impl TurnScheduler {
    pub fn new(room_id: Uuid, rules: &RoomRules) -> Self {
        Self {
            room_id,
            turn_duration: rules.turn_duration,
            max_turns: rules.max_turns,
            debaters: Vec::new(),
            state: TurnState::Idle,
            requests: VecDeque::new(),
            epoch: 0,
            turns_taken: 0,
            frozen: false,
            closed: false,
        }
    }

    /// Make a debater eligible for turns
    pub fn register_debater(&mut self, debater_id: Uuid) {
        if !self.debaters.contains(&debater_id) {
            self.debaters.push(debater_id);
        }
    }

    pub fn is_registered(&self, debater_id: Uuid) -> bool {
        self.debaters.contains(&debater_id)
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    pub fn active(&self) -> Option<&ActiveTurn> {
        match &self.state {
            TurnState::Speaking(active) => Some(active),
            _ => None,
        }
    }

    pub fn active_speaker(&self) -> Option<Uuid> {
        self.active().map(|a| a.turn.speaker_id)
    }

    pub fn remaining(&self) -> Option<u32> {
        self.active().map(|a| a.remaining)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn turns_taken(&self) -> u32 {
        self.turns_taken
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Pending turn requests, oldest first
    pub fn pending_requests(&self) -> Vec<Uuid> {
        self.requests.iter().copied().collect()
    }

    pub fn has_request(&self, debater_id: Uuid) -> bool {
        self.requests.contains(&debater_id)
    }

    /// Oldest pending request
    pub fn next_requester(&self) -> Option<Uuid> {
        self.requests.front().copied()
    }

    /// Toggle a turn request. Returns whether a request is now pending.
    pub fn request_turn(&mut self, debater_id: Uuid) -> Result<bool> {
        self.ensure_open()?;
        if !self.is_registered(debater_id) {
            return Err(Error::NotFound(format!("Debater {} is not registered", debater_id)));
        }
        if self.active_speaker() == Some(debater_id) {
            return Err(Error::Turn("The active speaker cannot request a turn".into()));
        }

        if let Some(pos) = self.requests.iter().position(|id| *id == debater_id) {
            self.requests.remove(pos);
            Ok(false)
        } else {
            self.requests.push_back(debater_id);
            Ok(true)
        }
    }

    /// Give the floor to a debater. Fails while another turn is active;
    /// use [`TurnScheduler::preempt`] to take the floor away explicitly.
    pub fn assign_turn(&mut self, debater_id: Uuid, now: DateTime<Utc>) -> Result<AssignOutcome> {
        self.ensure_open()?;
        if !self.is_registered(debater_id) {
            return Err(Error::NotFound(format!("Debater {} is not registered", debater_id)));
        }

        if let Some(active) = self.active() {
            if active.turn.speaker_id == debater_id {
                return Ok(AssignOutcome::AlreadySpeaking { epoch: active.epoch });
            }
            return Err(Error::Turn("A turn is already active".into()));
        }

        self.ensure_turns_left(self.turns_taken)?;

        self.requests.retain(|id| *id != debater_id);
        self.epoch += 1;
        self.state = TurnState::Speaking(ActiveTurn {
            turn: Turn::start(self.room_id, debater_id, now),
            remaining: self.turn_duration,
            allotted: self.turn_duration,
            epoch: self.epoch,
        });

        Ok(AssignOutcome::Started { epoch: self.epoch })
    }

    /// End the current turn (if any) and hand the floor to `debater_id`
    pub fn preempt(&mut self, debater_id: Uuid, now: DateTime<Utc>) -> Result<(Option<Turn>, AssignOutcome)> {
        self.ensure_open()?;
        if !self.is_registered(debater_id) {
            return Err(Error::NotFound(format!("Debater {} is not registered", debater_id)));
        }
        if self.active_speaker() == Some(debater_id) {
            return Ok((None, AssignOutcome::AlreadySpeaking { epoch: self.epoch }));
        }

        // The turn being cut short counts towards the limit
        let finished = self.turns_taken + u32::from(self.active().is_some());
        self.ensure_turns_left(finished)?;

        let ended = match self.active() {
            Some(_) => Some(self.end_turn(now, TurnEndReason::Preempted)?),
            None => None,
        };
        let outcome = self.assign_turn(debater_id, now)?;
        Ok((ended, outcome))
    }

    fn ensure_turns_left(&self, finished: u32) -> Result<()> {
        match self.max_turns {
            Some(max) if finished >= max => {
                Err(Error::Turn(format!("Turn limit of {} reached", max)))
            }
            _ => Ok(()),
        }
    }

    /// The active speaker gives up the floor
    pub fn yield_turn(&mut self, debater_id: Uuid, now: DateTime<Utc>) -> Result<Turn> {
        if self.active_speaker() != Some(debater_id) {
            return Err(Error::Turn("Only the active speaker can yield".into()));
        }
        self.end_turn(now, TurnEndReason::Yielded)
    }

    /// Close the active turn immediately. Any expiry scheduled for the old
    /// epoch becomes stale.
    pub fn end_turn(&mut self, now: DateTime<Utc>, reason: TurnEndReason) -> Result<Turn> {
        let state = std::mem::replace(&mut self.state, TurnState::Idle);
        let mut active = match state {
            TurnState::Speaking(active) => active,
            other => {
                self.state = other;
                return Err(Error::Turn("No active turn".into()));
            }
        };

        active.turn.close(now)?;
        self.epoch += 1;
        self.turns_taken += 1;
        self.state = TurnState::TurnEnded {
            last: active.turn.clone(),
            reason,
        };
        Ok(active.turn)
    }

    /// Expire the turn started under `epoch`. Rejected when the epoch is stale.
    pub fn expire(&mut self, epoch: u64, now: DateTime<Utc>) -> Result<Turn> {
        match self.active() {
            Some(active) if active.epoch == epoch => self.end_turn(now, TurnEndReason::Expired),
            Some(_) | None => Err(Error::Turn(format!("Stale turn epoch {}", epoch))),
        }
    }

    /// Advance the countdown by one second
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if self.frozen && self.active().is_some() {
            return TickOutcome::Frozen;
        }

        let (speaker_id, remaining, epoch) = match &mut self.state {
            TurnState::Speaking(active) => {
                active.remaining = active.remaining.saturating_sub(1);
                (active.turn.speaker_id, active.remaining, active.epoch)
            }
            _ => return TickOutcome::Idle,
        };

        if remaining > 0 {
            return TickOutcome::Running {
                speaker_id,
                remaining,
            };
        }

        match self.expire(epoch, now) {
            Ok(turn) => TickOutcome::Expired(turn),
            Err(_) => TickOutcome::Idle,
        }
    }

    /// Add time to the active turn. Returns the new remaining time.
    pub fn extend(&mut self, seconds: u32) -> Result<u32> {
        if seconds == 0 || seconds > MAX_EXTENSION_SECS {
            return Err(Error::Turn(format!(
                "Extension must be between 1 and {} seconds",
                MAX_EXTENSION_SECS
            )));
        }
        match &mut self.state {
            TurnState::Speaking(active) => {
                active.remaining += seconds;
                active.allotted += seconds;
                Ok(active.remaining)
            }
            _ => Err(Error::Turn("No active turn".into())),
        }
    }

    /// Stop the countdown without ending the turn
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    /// Terminal: end any active turn and refuse further assignments
    pub fn close(&mut self, now: DateTime<Utc>) -> Option<Turn> {
        let ended = if self.active().is_some() {
            self.end_turn(now, TurnEndReason::SessionEnded).ok()
        } else {
            None
        };
        self.requests.clear();
        self.closed = true;
        ended
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Turn("Session has ended".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn setup(turn_duration: u32) -> (TurnScheduler, Uuid, Uuid) {
        let rules = RoomRules {
            turn_duration,
            ..RoomRules::default()
        };
        let mut scheduler = TurnScheduler::new(Uuid::new_v4(), &rules);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        scheduler.register_debater(a);
        scheduler.register_debater(b);
        (scheduler, a, b)
    }

    #[test]
    fn test_request_toggle() {
        let (mut scheduler, a, _) = setup(180);

        assert!(scheduler.request_turn(a).unwrap());
        assert!(scheduler.has_request(a));

        assert!(!scheduler.request_turn(a).unwrap());
        assert!(!scheduler.has_request(a));
        assert!(scheduler.pending_requests().is_empty());
    }

    #[test]
    fn test_request_requires_registration() {
        let (mut scheduler, _, _) = setup(180);
        assert!(matches!(
            scheduler.request_turn(Uuid::new_v4()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_active_speaker_cannot_request() {
        let (mut scheduler, a, _) = setup(180);
        scheduler.assign_turn(a, Utc::now()).unwrap();
        assert!(scheduler.request_turn(a).is_err());
    }

    #[test]
    fn test_requests_are_fifo() {
        let (mut scheduler, a, b) = setup(180);
        scheduler.request_turn(b).unwrap();
        scheduler.request_turn(a).unwrap();
        assert_eq!(scheduler.next_requester(), Some(b));
        assert_eq!(scheduler.pending_requests(), vec![b, a]);
    }

    #[test]
    fn test_assign_rejects_when_active() {
        let (mut scheduler, a, b) = setup(180);
        let now = Utc::now();
        scheduler.assign_turn(a, now).unwrap();

        let err = scheduler.assign_turn(b, now).unwrap_err();
        assert!(matches!(err, Error::Turn(_)));
        assert_eq!(scheduler.active_speaker(), Some(a));
    }

    #[test]
    fn test_assign_is_idempotent_for_current_speaker() {
        let (mut scheduler, a, _) = setup(180);
        let now = Utc::now();
        let first = scheduler.assign_turn(a, now).unwrap();
        scheduler.tick(now);

        let again = scheduler.assign_turn(a, now).unwrap();
        let AssignOutcome::Started { epoch } = first else {
            panic!("expected a started turn");
        };
        assert_eq!(again, AssignOutcome::AlreadySpeaking { epoch });
        assert_eq!(scheduler.remaining(), Some(179));
    }

    #[test]
    fn test_assign_clears_pending_request() {
        let (mut scheduler, a, _) = setup(180);
        scheduler.request_turn(a).unwrap();
        scheduler.assign_turn(a, Utc::now()).unwrap();
        assert!(!scheduler.has_request(a));
    }

    #[test]
    fn test_countdown_decrements_by_one_and_expires() {
        let (mut scheduler, a, _) = setup(3);
        let start = Utc::now();
        scheduler.assign_turn(a, start).unwrap();

        let mut seen = Vec::new();
        for second in 1..=2 {
            match scheduler.tick(start + Duration::seconds(second)) {
                TickOutcome::Running { remaining, .. } => seen.push(remaining),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(seen, vec![2, 1]);

        match scheduler.tick(start + Duration::seconds(3)) {
            TickOutcome::Expired(turn) => {
                assert_eq!(turn.speaker_id, a);
                assert_eq!(turn.duration, 3);
                assert!(turn.ended_at.unwrap() >= turn.started_at);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            scheduler.state(),
            TurnState::TurnEnded {
                reason: TurnEndReason::Expired,
                ..
            }
        ));
        assert!(matches!(scheduler.tick(start + Duration::seconds(4)), TickOutcome::Idle));
    }

    #[test]
    fn test_stale_expiry_rejected_after_early_end() {
        let (mut scheduler, a, b) = setup(180);
        let now = Utc::now();
        let AssignOutcome::Started { epoch } = scheduler.assign_turn(a, now).unwrap() else {
            panic!("expected a started turn");
        };

        scheduler.end_turn(now, TurnEndReason::EndedByModerator).unwrap();
        scheduler.assign_turn(b, now).unwrap();

        assert!(scheduler.expire(epoch, now).is_err());
        assert_eq!(scheduler.active_speaker(), Some(b));
    }

    #[test]
    fn test_freeze_stops_countdown() {
        let (mut scheduler, a, _) = setup(10);
        let now = Utc::now();
        scheduler.assign_turn(a, now).unwrap();

        scheduler.freeze();
        assert!(matches!(scheduler.tick(now), TickOutcome::Frozen));
        assert_eq!(scheduler.remaining(), Some(10));

        scheduler.unfreeze();
        scheduler.tick(now);
        assert_eq!(scheduler.remaining(), Some(9));
    }

    #[test]
    fn test_extend() {
        let (mut scheduler, a, _) = setup(30);
        assert!(scheduler.extend(30).is_err());

        scheduler.assign_turn(a, Utc::now()).unwrap();
        assert_eq!(scheduler.extend(30).unwrap(), 60);
        assert_eq!(scheduler.active().unwrap().allotted, 60);
        assert!(scheduler.extend(0).is_err());
        assert!(scheduler.extend(MAX_EXTENSION_SECS + 1).is_err());
    }

    #[test]
    fn test_preempt_ends_current_turn() {
        let (mut scheduler, a, b) = setup(180);
        let now = Utc::now();
        scheduler.assign_turn(a, now).unwrap();

        let (ended, outcome) = scheduler.preempt(b, now + Duration::seconds(20)).unwrap();
        let ended = ended.unwrap();
        assert_eq!(ended.speaker_id, a);
        assert_eq!(ended.duration, 20);
        assert!(matches!(outcome, AssignOutcome::Started { .. }));
        assert_eq!(scheduler.active_speaker(), Some(b));
    }

    #[test]
    fn test_yield_only_by_speaker() {
        let (mut scheduler, a, b) = setup(180);
        let now = Utc::now();
        scheduler.assign_turn(a, now).unwrap();
        assert!(scheduler.yield_turn(b, now).is_err());
        let turn = scheduler.yield_turn(a, now).unwrap();
        assert_eq!(turn.speaker_id, a);
    }

    #[test]
    fn test_turn_limit() {
        let rules = RoomRules {
            max_turns: Some(1),
            ..RoomRules::default()
        };
        let mut scheduler = TurnScheduler::new(Uuid::new_v4(), &rules);
        let a = Uuid::new_v4();
        scheduler.register_debater(a);
        let now = Utc::now();

        scheduler.assign_turn(a, now).unwrap();
        scheduler.yield_turn(a, now).unwrap();
        assert!(scheduler.assign_turn(a, now).is_err());
    }

    #[test]
    fn test_preempt_at_turn_limit_keeps_speaker() {
        let rules = RoomRules {
            max_turns: Some(1),
            ..RoomRules::default()
        };
        let mut scheduler = TurnScheduler::new(Uuid::new_v4(), &rules);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        scheduler.register_debater(a);
        scheduler.register_debater(b);
        let now = Utc::now();

        scheduler.assign_turn(a, now).unwrap();
        assert!(matches!(scheduler.preempt(b, now), Err(Error::Turn(_))));
        assert_eq!(scheduler.active_speaker(), Some(a));
        assert_eq!(scheduler.turns_taken(), 0);

        let ended = scheduler.yield_turn(a, now).unwrap();
        assert_eq!(ended.speaker_id, a);
    }

    #[test]
    fn test_close_is_terminal() {
        let (mut scheduler, a, b) = setup(180);
        let now = Utc::now();
        scheduler.assign_turn(a, now).unwrap();
        scheduler.request_turn(b).unwrap();

        let ended = scheduler.close(now).unwrap();
        assert_eq!(ended.speaker_id, a);
        assert!(scheduler.is_closed());
        assert!(scheduler.pending_requests().is_empty());
        assert!(scheduler.assign_turn(b, now).is_err());
        assert!(scheduler.request_turn(b).is_err());
    }
}

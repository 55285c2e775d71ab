//! Live debate session
//!
//! A `DebateSession` binds a live room to its turn scheduler, audience
//! aggregator, moderation state and turn history. It is the only writer
//! of that state: every operation validates, mutates and returns the
//! events that observers need to see. Failed operations leave the
//! session untouched.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audience::AudienceAggregator;
use crate::invariants;
use crate::models::{
    AudienceQuestion, AudienceReaction, AudienceVote, ModerationLogEntry, ParticipantRole,
    ReactionKind, Room, RoomStatus, Turn, TurnEndReason, VoteSummary, WarningKind,
};
use crate::moderation::{ModerationCommand, ModerationLog};
use crate::permissions::{PermissionMatrix, RoomAction};
use crate::scheduler::{AssignOutcome, TickOutcome, TurnScheduler};
use crate::{Error, Result};

/// How a user asks to enter a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "as", rename_all = "snake_case")]
pub enum JoinRole {
    Debater { position: String },
    Audience,
    Moderator,
}

/// A connected participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: Uuid,
    pub username: String,
    pub role: ParticipantRole,
}

/// Something observers of a session need to know about
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    ParticipantJoined { member: Member },
    ParticipantLeft { user_id: Uuid },
    TurnStarted { speaker_id: Uuid, remaining: u32, epoch: u64 },
    TurnTick { speaker_id: Uuid, remaining: u32 },
    TurnEnded { turn: Turn, reason: TurnEndReason },
    TimeExtended { speaker_id: Uuid, remaining: u32 },
    TurnRequests { pending: Vec<Uuid> },
    Warning { debater_id: Uuid, kind: WarningKind, message: String },
    DebaterMuted { debater_id: Uuid, muted: bool },
    AudienceMuted { muted: bool },
    Moderated { entry: ModerationLogEntry },
    AudienceUpdate { reactions: Vec<AudienceReaction>, audience_count: u32 },
    QuestionsUpdate { questions: Vec<AudienceQuestion> },
    PendingQuestions { questions: Vec<AudienceQuestion> },
    VotesUpdate { summaries: Vec<VoteSummary> },
    SessionPaused,
    SessionResumed,
    SessionEnded { ended_at: DateTime<Utc> },
}

impl SessionEvent {
    /// Events only the moderator (or organizer) receives
    pub fn is_staff_only(&self) -> bool {
        matches!(
            self,
            SessionEvent::TurnRequests { .. }
                | SessionEvent::Moderated { .. }
                | SessionEvent::PendingQuestions { .. }
        )
    }
}

/// Full view of a session, used on join and resync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub room: Room,
    pub your_role: Option<ParticipantRole>,
    pub speaker_id: Option<Uuid>,
    pub remaining: Option<u32>,
    pub epoch: u64,
    pub paused: bool,
    pub muted_debaters: Vec<Uuid>,
    pub audience_muted: bool,
    pub members: Vec<Member>,
    pub reactions: Vec<AudienceReaction>,
    pub questions: Vec<AudienceQuestion>,
    pub votes: Vec<VoteSummary>,
    pub turns: Vec<Turn>,
    /// Staff only; empty for everyone else
    pub pending_requests: Vec<Uuid>,
    /// Staff only; empty for everyone else
    pub pending_questions: Vec<AudienceQuestion>,
}

#[derive(Debug)]
pub struct DebateSession {
    room: Room,
    scheduler: TurnScheduler,
    audience: AudienceAggregator,
    log: ModerationLog,
    muted: BTreeSet<Uuid>,
    paused: bool,
    turns: Vec<Turn>,
    members: HashMap<Uuid, Member>,
}

impl DebateSession {
    /// Open a session for a live room
    pub fn open(room: Room) -> Result<Self> {
        if room.status != RoomStatus::Live {
            return Err(Error::InvalidOperation(format!(
                "Room {} is not live",
                room.id
            )));
        }

        let mut scheduler = TurnScheduler::new(room.id, &room.rules);
        for debater in &room.debaters {
            scheduler.register_debater(debater.user_id);
        }

        Ok(Self {
            audience: AudienceAggregator::new(room.rules.allow_audience_questions),
            log: ModerationLog::new(room.id),
            scheduler,
            room,
            muted: BTreeSet::new(),
            paused: false,
            turns: Vec::new(),
            members: HashMap::new(),
        })
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn room_id(&self) -> Uuid {
        self.room.id
    }

    pub fn scheduler(&self) -> &TurnScheduler {
        &self.scheduler
    }

    pub fn audience(&self) -> &AudienceAggregator {
        &self.audience
    }

    pub fn log(&self) -> &[ModerationLogEntry] {
        self.log.entries()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_ended(&self) -> bool {
        self.room.is_ended()
    }

    pub fn is_muted(&self, debater_id: Uuid) -> bool {
        self.muted.contains(&debater_id)
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn role_of(&self, user_id: Uuid) -> Option<ParticipantRole> {
        self.members.get(&user_id).map(|m| m.role)
    }

    /// Moderator, or the creator of a room without one
    pub fn is_staff(&self, user_id: Uuid) -> bool {
        match self.room.moderator_id {
            Some(moderator) => moderator == user_id,
            None => self.room.creator_id == user_id,
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.room.is_ended() {
            return Err(Error::InvalidOperation("The debate has ended".to_string()));
        }
        Ok(())
    }

    fn authorize(&self, user_id: Uuid, action: RoomAction) -> Result<ParticipantRole> {
        let role = self
            .role_of(user_id)
            .ok_or_else(|| Error::PermissionDenied("Join the room first".to_string()))?;

        let allowed = PermissionMatrix::can_perform(role, action)
            || (self.room.moderator_id.is_none()
                && self.room.creator_id == user_id
                && PermissionMatrix::organizer_can_perform(action));
        if !allowed {
            return Err(Error::PermissionDenied(format!(
                "{} cannot perform {:?}",
                role.display_name(),
                action
            )));
        }
        Ok(role)
    }

    fn audience_count(&self) -> u32 {
        self.members
            .values()
            .filter(|m| m.role == ParticipantRole::Audience)
            .count() as u32
    }

    fn audience_update(&self) -> SessionEvent {
        let reactions = self.audience.reactions();
        invariants::assert_reaction_invariants(&reactions);
        SessionEvent::AudienceUpdate {
            reactions,
            audience_count: self.room.audience_count,
        }
    }

    fn questions_events(&self) -> Vec<SessionEvent> {
        vec![
            SessionEvent::QuestionsUpdate {
                questions: self.audience.visible_questions(),
            },
            SessionEvent::PendingQuestions {
                questions: self.audience.pending_questions().into_iter().cloned().collect(),
            },
        ]
    }

    fn requests_event(&self) -> SessionEvent {
        SessionEvent::TurnRequests {
            pending: self.scheduler.pending_requests(),
        }
    }

    fn vote_summaries(&self) -> Vec<VoteSummary> {
        self.room
            .debaters
            .iter()
            .filter_map(|d| self.audience.vote_summary(d.user_id))
            .collect()
    }

    /// Enter the room. Returns the role granted.
    pub fn join(
        &mut self,
        user_id: Uuid,
        username: &str,
        requested: JoinRole,
        now: DateTime<Utc>,
    ) -> Result<(ParticipantRole, Vec<SessionEvent>)> {
        self.ensure_running()?;

        let role = if self.room.moderator_id == Some(user_id) {
            ParticipantRole::Moderator
        } else if self.room.is_debater(user_id) {
            ParticipantRole::Debater
        } else {
            match &requested {
                JoinRole::Moderator => {
                    return Err(Error::PermissionDenied(
                        "Only the assigned moderator can moderate this room".to_string(),
                    ));
                }
                JoinRole::Debater { position } => {
                    self.room
                        .add_debater(user_id, username.to_string(), position.clone(), now)?;
                    self.scheduler.register_debater(user_id);
                    ParticipantRole::Debater
                }
                JoinRole::Audience => ParticipantRole::Audience,
            }
        };

        if let Some(debater) = self.room.debater_mut(user_id) {
            debater.is_active = true;
        }

        let member = Member {
            user_id,
            username: username.to_string(),
            role,
        };
        self.members.insert(user_id, member.clone());
        self.room.audience_count = self.audience_count();
        invariants::assert_room_invariants(&self.room);

        tracing::debug!(room_id = %self.room.id, user_id = %user_id, role = role.as_str(), "Joined session");

        let mut events = vec![SessionEvent::ParticipantJoined { member }];
        if role == ParticipantRole::Audience {
            events.push(self.audience_update());
        }
        Ok((role, events))
    }

    /// Leave the room. A departing speaker gives up the floor.
    pub fn leave(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Vec<SessionEvent> {
        let Some(member) = self.members.remove(&user_id) else {
            return Vec::new();
        };

        let mut events = vec![SessionEvent::ParticipantLeft { user_id }];
        match member.role {
            ParticipantRole::Debater => {
                if let Some(debater) = self.room.debater_mut(user_id) {
                    debater.is_active = false;
                }
                if self.scheduler.has_request(user_id) && self.scheduler.request_turn(user_id).is_ok() {
                    events.push(self.requests_event());
                }
                if let Ok(turn) = self.scheduler.yield_turn(user_id, now) {
                    events.extend(self.finish_turn(turn, TurnEndReason::Yielded, now));
                }
            }
            ParticipantRole::Audience => {
                self.audience.forget(user_id);
                self.room.audience_count = self.audience_count();
                events.push(self.audience_update());
            }
            ParticipantRole::Moderator => {}
        }
        events
    }

    /// Record a finished turn and hand the floor to the oldest requester
    fn finish_turn(&mut self, turn: Turn, reason: TurnEndReason, now: DateTime<Utc>) -> Vec<SessionEvent> {
        invariants::assert_turn_invariants(&turn);
        if let Some(debater) = self.room.debater_mut(turn.speaker_id) {
            debater.turns_count += 1;
        }
        self.turns.push(turn.clone());

        let mut events = vec![SessionEvent::TurnEnded { turn, reason }];
        events.extend(self.advance_queue(now));
        events
    }

    fn advance_queue(&mut self, now: DateTime<Utc>) -> Vec<SessionEvent> {
        if self.scheduler.is_closed() || self.scheduler.active().is_some() {
            return Vec::new();
        }
        let Some(next) = self.scheduler.next_requester() else {
            return Vec::new();
        };

        match self.scheduler.assign_turn(next, now) {
            Ok(AssignOutcome::Started { epoch }) => vec![
                SessionEvent::TurnStarted {
                    speaker_id: next,
                    remaining: self.scheduler.remaining().unwrap_or(0),
                    epoch,
                },
                self.requests_event(),
            ],
            Ok(AssignOutcome::AlreadySpeaking { .. }) => Vec::new(),
            Err(e) => {
                tracing::debug!(room_id = %self.room.id, error = %e, "Queue not advanced");
                Vec::new()
            }
        }
    }

    /// Toggle the debater's turn request
    pub fn request_turn(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Result<(bool, Vec<SessionEvent>)> {
        self.ensure_running()?;
        self.authorize(user_id, RoomAction::RequestTurn)?;

        let pending = self.scheduler.request_turn(user_id)?;
        let mut events = vec![self.requests_event()];
        // Rooms without a moderator run on the queue alone
        if pending && self.room.moderator_id.is_none() {
            events.extend(self.advance_queue(now));
        }
        Ok((pending, events))
    }

    pub fn yield_turn(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Result<Vec<SessionEvent>> {
        self.ensure_running()?;
        self.authorize(user_id, RoomAction::YieldTurn)?;

        let turn = self.scheduler.yield_turn(user_id, now)?;
        Ok(self.finish_turn(turn, TurnEndReason::Yielded, now))
    }

    /// Advance the countdown by one second
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<SessionEvent> {
        invariants::assert_scheduler_invariants(&self.scheduler);
        match self.scheduler.tick(now) {
            TickOutcome::Running {
                speaker_id,
                remaining,
            } => vec![SessionEvent::TurnTick {
                speaker_id,
                remaining,
            }],
            TickOutcome::Expired(turn) => {
                tracing::debug!(room_id = %self.room.id, speaker = %turn.speaker_id, "Turn expired");
                self.finish_turn(turn, TurnEndReason::Expired, now)
            }
            TickOutcome::Idle | TickOutcome::Frozen => Vec::new(),
        }
    }

    /// Apply a moderator command. Successful commands are logged.
    pub fn moderate(
        &mut self,
        actor_id: Uuid,
        command: ModerationCommand,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionEvent>> {
        self.ensure_running()?;
        self.authorize(actor_id, command.required_action())?;

        let mut events = self.apply(&command, now)?;
        let entry = self.log.record(actor_id, &command, now).clone();
        tracing::info!(
            room_id = %self.room.id,
            moderator = %actor_id,
            action = entry.action.as_str(),
            "Moderation action"
        );
        events.push(SessionEvent::Moderated { entry });
        Ok(events)
    }

    fn require_debater(&self, debater_id: Uuid) -> Result<()> {
        if !self.room.is_debater(debater_id) {
            return Err(Error::NotFound(format!("Debater {}", debater_id)));
        }
        Ok(())
    }

    fn apply(&mut self, command: &ModerationCommand, now: DateTime<Utc>) -> Result<Vec<SessionEvent>> {
        match command {
            ModerationCommand::MuteDebater { debater_id } => {
                if !self.room.rules.moderator_can_mute {
                    return Err(Error::PermissionDenied(
                        "Muting is disabled in this room".to_string(),
                    ));
                }
                self.require_debater(*debater_id)?;
                if !self.muted.insert(*debater_id) {
                    return Err(Error::InvalidOperation("Debater is already muted".to_string()));
                }
                Ok(vec![SessionEvent::DebaterMuted {
                    debater_id: *debater_id,
                    muted: true,
                }])
            }
            ModerationCommand::UnmuteDebater { debater_id } => {
                self.require_debater(*debater_id)?;
                if !self.muted.remove(debater_id) {
                    return Err(Error::InvalidOperation("Debater is not muted".to_string()));
                }
                Ok(vec![SessionEvent::DebaterMuted {
                    debater_id: *debater_id,
                    muted: false,
                }])
            }
            ModerationCommand::Warn { debater_id, kind } => {
                self.require_debater(*debater_id)?;
                Ok(vec![SessionEvent::Warning {
                    debater_id: *debater_id,
                    kind: *kind,
                    message: kind.message().to_string(),
                }])
            }
            ModerationCommand::Pause => {
                if self.paused {
                    return Err(Error::InvalidOperation("Session is already paused".to_string()));
                }
                self.paused = true;
                self.scheduler.freeze();
                Ok(vec![SessionEvent::SessionPaused])
            }
            ModerationCommand::Resume => {
                if !self.paused {
                    return Err(Error::InvalidOperation("Session is not paused".to_string()));
                }
                self.paused = false;
                self.scheduler.unfreeze();
                Ok(vec![SessionEvent::SessionResumed])
            }
            ModerationCommand::EndSession => self.end(now),
            ModerationCommand::SwitchTurn { debater_id } => {
                let (ended, outcome) = self.scheduler.preempt(*debater_id, now)?;
                let mut events = Vec::new();
                if let Some(turn) = ended {
                    if let Some(debater) = self.room.debater_mut(turn.speaker_id) {
                        debater.turns_count += 1;
                    }
                    self.turns.push(turn.clone());
                    events.push(SessionEvent::TurnEnded {
                        turn,
                        reason: TurnEndReason::Preempted,
                    });
                }
                if let AssignOutcome::Started { epoch } = outcome {
                    events.push(SessionEvent::TurnStarted {
                        speaker_id: *debater_id,
                        remaining: self.scheduler.remaining().unwrap_or(0),
                        epoch,
                    });
                    events.push(self.requests_event());
                }
                Ok(events)
            }
            ModerationCommand::AssignTurn { debater_id } => {
                match self.scheduler.assign_turn(*debater_id, now)? {
                    AssignOutcome::Started { epoch } => Ok(vec![
                        SessionEvent::TurnStarted {
                            speaker_id: *debater_id,
                            remaining: self.scheduler.remaining().unwrap_or(0),
                            epoch,
                        },
                        self.requests_event(),
                    ]),
                    AssignOutcome::AlreadySpeaking { .. } => Ok(Vec::new()),
                }
            }
            ModerationCommand::EndTurn => {
                let turn = self.scheduler.end_turn(now, TurnEndReason::EndedByModerator)?;
                Ok(self.finish_turn(turn, TurnEndReason::EndedByModerator, now))
            }
            ModerationCommand::ExtendTime { seconds } => {
                let remaining = self.scheduler.extend(*seconds)?;
                let speaker_id = self
                    .scheduler
                    .active_speaker()
                    .ok_or_else(|| Error::Turn("No active turn".to_string()))?;
                Ok(vec![SessionEvent::TimeExtended {
                    speaker_id,
                    remaining,
                }])
            }
            ModerationCommand::MuteAudience | ModerationCommand::UnmuteAudience => {
                let muted = matches!(command, ModerationCommand::MuteAudience);
                if !self.audience.set_muted(muted) {
                    return Err(Error::InvalidOperation(format!(
                        "Audience is already {}",
                        if muted { "muted" } else { "unmuted" }
                    )));
                }
                Ok(vec![SessionEvent::AudienceMuted { muted }])
            }
            ModerationCommand::ApproveQuestion { question_id } => {
                self.audience.approve_question(*question_id)?;
                Ok(self.questions_events())
            }
            ModerationCommand::RejectQuestion { question_id } => {
                self.audience.reject_question(*question_id)?;
                Ok(self.questions_events())
            }
            ModerationCommand::AnswerQuestion { question_id } => {
                self.audience.mark_answered(*question_id)?;
                Ok(self.questions_events())
            }
        }
    }

    /// End the debate: close any active turn and stop the scheduler
    pub fn end(&mut self, now: DateTime<Utc>) -> Result<Vec<SessionEvent>> {
        self.room.transition(RoomStatus::Ended, now)?;

        let mut events = Vec::new();
        if let Some(turn) = self.scheduler.close(now) {
            if let Some(debater) = self.room.debater_mut(turn.speaker_id) {
                debater.turns_count += 1;
            }
            self.turns.push(turn.clone());
            events.push(SessionEvent::TurnEnded {
                turn,
                reason: TurnEndReason::SessionEnded,
            });
        }
        self.paused = false;
        events.push(SessionEvent::SessionEnded { ended_at: now });
        Ok(events)
    }

    pub fn react(&mut self, user_id: Uuid, kind: ReactionKind) -> Result<Vec<SessionEvent>> {
        self.ensure_running()?;
        self.authorize(user_id, RoomAction::React)?;

        if !self.audience.react(user_id, kind) {
            return Ok(Vec::new());
        }
        Ok(vec![self.audience_update()])
    }

    pub fn submit_question(
        &mut self,
        user_id: Uuid,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<(Uuid, Vec<SessionEvent>)> {
        self.ensure_running()?;
        self.authorize(user_id, RoomAction::SubmitQuestion)?;

        let username = self
            .members
            .get(&user_id)
            .map(|m| m.username.clone())
            .unwrap_or_default();
        let id = self.audience.submit_question(user_id, &username, text, now)?.id;
        Ok((
            id,
            vec![SessionEvent::PendingQuestions {
                questions: self.audience.pending_questions().into_iter().cloned().collect(),
            }],
        ))
    }

    pub fn cast_vote(&mut self, voter_id: Uuid, debater_id: Uuid, vote: AudienceVote) -> Result<Vec<SessionEvent>> {
        self.ensure_running()?;
        self.authorize(voter_id, RoomAction::CastVote)?;
        self.require_debater(debater_id)?;

        self.audience.cast_vote(voter_id, debater_id, vote)?;
        Ok(vec![SessionEvent::VotesUpdate {
            summaries: self.vote_summaries(),
        }])
    }

    /// Full state as seen by `viewer`
    pub fn snapshot(&self, viewer: Uuid) -> SessionSnapshot {
        let staff = self.is_staff(viewer);
        let mut members: Vec<Member> = self.members.values().cloned().collect();
        members.sort_by(|a, b| b.role.cmp(&a.role).then(a.username.cmp(&b.username)));

        SessionSnapshot {
            room: self.room.clone(),
            your_role: self.role_of(viewer),
            speaker_id: self.scheduler.active_speaker(),
            remaining: self.scheduler.remaining(),
            epoch: self.scheduler.epoch(),
            paused: self.paused,
            muted_debaters: self.muted.iter().copied().collect(),
            audience_muted: self.audience.is_muted(),
            members,
            reactions: self.audience.reactions(),
            questions: self.audience.visible_questions(),
            votes: self.vote_summaries(),
            turns: self.turns.clone(),
            pending_requests: if staff {
                self.scheduler.pending_requests()
            } else {
                Vec::new()
            },
            pending_questions: if staff {
                self.audience.pending_questions().into_iter().cloned().collect()
            } else {
                Vec::new()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    struct Fixture {
        session: DebateSession,
        moderator: Uuid,
        ana: Uuid,
        ben: Uuid,
        viewer: Uuid,
        now: DateTime<Utc>,
    }

    fn live_room(moderator: Option<Uuid>, turn_duration: u32) -> Room {
        let mut room = Room::new("Should cities ban private cars?".into(), Uuid::new_v4());
        room.moderator_id = moderator;
        room.rules.turn_duration = turn_duration;
        room.transition(RoomStatus::Live, Utc::now()).unwrap();
        room
    }

    fn fixture() -> Fixture {
        let moderator = Uuid::new_v4();
        let mut session = DebateSession::open(live_room(Some(moderator), 5)).unwrap();
        let now = Utc::now();
        let ana = Uuid::new_v4();
        let ben = Uuid::new_v4();
        let viewer = Uuid::new_v4();

        session.join(moderator, "mod", JoinRole::Audience, now).unwrap();
        session
            .join(ana, "ana", JoinRole::Debater { position: "For".into() }, now)
            .unwrap();
        session
            .join(ben, "ben", JoinRole::Debater { position: "Against".into() }, now)
            .unwrap();
        session.join(viewer, "viv", JoinRole::Audience, now).unwrap();

        Fixture {
            session,
            moderator,
            ana,
            ben,
            viewer,
            now,
        }
    }

    #[test]
    fn test_open_requires_live_room() {
        let room = Room::new("Should cities ban private cars?".into(), Uuid::new_v4());
        assert!(DebateSession::open(room).is_err());
    }

    #[test]
    fn test_join_roles() {
        let f = fixture();
        assert_eq!(f.session.role_of(f.moderator), Some(ParticipantRole::Moderator));
        assert_eq!(f.session.role_of(f.ana), Some(ParticipantRole::Debater));
        assert_eq!(f.session.role_of(f.viewer), Some(ParticipantRole::Audience));
        assert_eq!(f.session.room().audience_count, 1);
        assert!(f.session.scheduler().is_registered(f.ben));
    }

    #[test]
    fn test_third_debater_rejected() {
        let mut f = fixture();
        let extra = Uuid::new_v4();
        assert!(f
            .session
            .join(extra, "cy", JoinRole::Debater { position: "For".into() }, f.now)
            .is_err());
        assert_eq!(f.session.role_of(extra), None);
    }

    #[test]
    fn test_moderator_assigns_and_countdown_expires() {
        let mut f = fixture();
        let events = f
            .session
            .moderate(f.moderator, ModerationCommand::AssignTurn { debater_id: f.ana }, f.now)
            .unwrap();
        assert!(matches!(events[0], SessionEvent::TurnStarted { remaining: 5, .. }));

        let mut last = 5;
        for second in 1..5 {
            let events = f.session.tick(f.now + Duration::seconds(second));
            match &events[0] {
                SessionEvent::TurnTick { remaining, .. } => {
                    assert_eq!(*remaining, last - 1);
                    last = *remaining;
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        let events = f.session.tick(f.now + Duration::seconds(5));
        assert!(matches!(
            &events[0],
            SessionEvent::TurnEnded { reason: TurnEndReason::Expired, .. }
        ));
        assert_eq!(f.session.turns().len(), 1);
        assert_eq!(f.session.turns()[0].duration, 5);
        assert_eq!(f.session.room().debater(f.ana).unwrap().turns_count, 1);
        assert!(f.session.tick(f.now + Duration::seconds(6)).is_empty());
    }

    #[test]
    fn test_assign_is_idempotent() {
        let mut f = fixture();
        let assign = ModerationCommand::AssignTurn { debater_id: f.ana };
        f.session.moderate(f.moderator, assign.clone(), f.now).unwrap();
        f.session.tick(f.now + Duration::seconds(1));

        let events = f.session.moderate(f.moderator, assign, f.now).unwrap();
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::TurnStarted { .. })));
        assert_eq!(f.session.scheduler().remaining(), Some(4));

        // Another debater cannot be assigned while the floor is held
        assert!(f
            .session
            .moderate(f.moderator, ModerationCommand::AssignTurn { debater_id: f.ben }, f.now)
            .is_err());
    }

    #[test]
    fn test_switch_turn_preempts() {
        let mut f = fixture();
        f.session
            .moderate(f.moderator, ModerationCommand::AssignTurn { debater_id: f.ana }, f.now)
            .unwrap();
        let events = f
            .session
            .moderate(
                f.moderator,
                ModerationCommand::SwitchTurn { debater_id: f.ben },
                f.now + Duration::seconds(2),
            )
            .unwrap();

        assert!(matches!(
            &events[0],
            SessionEvent::TurnEnded { reason: TurnEndReason::Preempted, .. }
        ));
        assert_eq!(f.session.scheduler().active_speaker(), Some(f.ben));
    }

    #[test]
    fn test_switch_turn_at_limit_keeps_speaker() {
        let moderator = Uuid::new_v4();
        let mut room = live_room(Some(moderator), 5);
        room.rules.max_turns = Some(1);
        let mut session = DebateSession::open(room).unwrap();
        let now = Utc::now();
        let ana = Uuid::new_v4();
        let ben = Uuid::new_v4();
        session.join(moderator, "mod", JoinRole::Audience, now).unwrap();
        session
            .join(ana, "ana", JoinRole::Debater { position: "For".into() }, now)
            .unwrap();
        session
            .join(ben, "ben", JoinRole::Debater { position: "Against".into() }, now)
            .unwrap();
        session
            .moderate(moderator, ModerationCommand::AssignTurn { debater_id: ana }, now)
            .unwrap();
        let logged = session.log().len();

        assert!(session
            .moderate(
                moderator,
                ModerationCommand::SwitchTurn { debater_id: ben },
                now + Duration::seconds(2),
            )
            .is_err());
        assert_eq!(session.scheduler().active_speaker(), Some(ana));
        assert!(session.turns().is_empty());
        assert_eq!(session.log().len(), logged);

        // The held turn still finishes and is recorded
        session.yield_turn(ana, now + Duration::seconds(3)).unwrap();
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.turns()[0].speaker_id, ana);
    }

    #[test]
    fn test_queue_hands_floor_on_yield() {
        let mut f = fixture();
        f.session
            .moderate(f.moderator, ModerationCommand::AssignTurn { debater_id: f.ana }, f.now)
            .unwrap();

        let (pending, _) = f.session.request_turn(f.ben, f.now).unwrap();
        assert!(pending);
        // Moderated rooms do not auto-assign while someone speaks
        assert_eq!(f.session.scheduler().active_speaker(), Some(f.ana));

        let events = f.session.yield_turn(f.ana, f.now + Duration::seconds(3)).unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::TurnStarted { speaker_id, .. } if *speaker_id == f.ben)));
        assert!(f.session.scheduler().pending_requests().is_empty());
    }

    #[test]
    fn test_request_toggle() {
        let mut f = fixture();
        assert!(f.session.request_turn(f.ana, f.now).unwrap().0);
        assert!(!f.session.request_turn(f.ana, f.now).unwrap().0);
        assert!(f.session.scheduler().pending_requests().is_empty());
    }

    #[test]
    fn test_unmoderated_room_runs_on_queue() {
        let room = live_room(None, 60);
        let creator = room.creator_id;
        let mut session = DebateSession::open(room).unwrap();
        let now = Utc::now();
        let ana = Uuid::new_v4();
        session
            .join(ana, "ana", JoinRole::Debater { position: "For".into() }, now)
            .unwrap();
        session.join(creator, "host", JoinRole::Audience, now).unwrap();

        session.request_turn(ana, now).unwrap();
        assert_eq!(session.scheduler().active_speaker(), Some(ana));

        // Organizer may pause but not mute
        assert!(session.moderate(creator, ModerationCommand::Pause, now).is_ok());
        assert!(matches!(
            session.moderate(creator, ModerationCommand::MuteDebater { debater_id: ana }, now),
            Err(Error::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_pause_freezes_countdown() {
        let mut f = fixture();
        f.session
            .moderate(f.moderator, ModerationCommand::AssignTurn { debater_id: f.ana }, f.now)
            .unwrap();
        f.session.moderate(f.moderator, ModerationCommand::Pause, f.now).unwrap();

        for s in 1..10 {
            assert!(f.session.tick(f.now + Duration::seconds(s)).is_empty());
        }
        assert_eq!(f.session.scheduler().remaining(), Some(5));

        assert!(f.session.moderate(f.moderator, ModerationCommand::Pause, f.now).is_err());
        f.session.moderate(f.moderator, ModerationCommand::Resume, f.now).unwrap();
        f.session.tick(f.now + Duration::seconds(11));
        assert_eq!(f.session.scheduler().remaining(), Some(4));
    }

    #[test]
    fn test_failed_commands_are_not_logged() {
        let mut f = fixture();
        assert!(f
            .session
            .moderate(f.moderator, ModerationCommand::EndTurn, f.now)
            .is_err());
        assert!(f
            .session
            .moderate(f.ana, ModerationCommand::Pause, f.now)
            .is_err());
        assert!(f.session.log().is_empty());

        f.session
            .moderate(f.moderator, ModerationCommand::MuteDebater { debater_id: f.ben }, f.now)
            .unwrap();
        assert!(f.session.is_muted(f.ben));
        assert!(f
            .session
            .moderate(f.moderator, ModerationCommand::MuteDebater { debater_id: f.ben }, f.now)
            .is_err());
        assert_eq!(f.session.log().len(), 1);
    }

    #[test]
    fn test_mute_respects_rules() {
        let moderator = Uuid::new_v4();
        let mut room = live_room(Some(moderator), 60);
        room.rules.moderator_can_mute = false;
        let mut session = DebateSession::open(room).unwrap();
        let now = Utc::now();
        let ana = Uuid::new_v4();
        session.join(moderator, "mod", JoinRole::Moderator, now).unwrap();
        session
            .join(ana, "ana", JoinRole::Debater { position: "For".into() }, now)
            .unwrap();

        assert!(session
            .moderate(moderator, ModerationCommand::MuteDebater { debater_id: ana }, now)
            .is_err());
    }

    #[test]
    fn test_end_session_is_terminal() {
        let mut f = fixture();
        f.session
            .moderate(f.moderator, ModerationCommand::AssignTurn { debater_id: f.ana }, f.now)
            .unwrap();
        let events = f
            .session
            .moderate(f.moderator, ModerationCommand::EndSession, f.now + Duration::seconds(2))
            .unwrap();

        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::TurnEnded { reason: TurnEndReason::SessionEnded, .. }
        )));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::SessionEnded { .. })));
        assert!(f.session.is_ended());
        assert!(f.session.request_turn(f.ben, f.now).is_err());
        assert!(f
            .session
            .moderate(f.moderator, ModerationCommand::AssignTurn { debater_id: f.ben }, f.now)
            .is_err());
    }

    #[test]
    fn test_audience_flow() {
        let mut f = fixture();
        f.session.react(f.viewer, ReactionKind::Agreement).unwrap();
        f.session.react(f.ana, ReactionKind::Doubt).unwrap();
        assert!(f.session.react(f.moderator, ReactionKind::Doubt).is_err());

        let (question, events) = f.session.submit_question(f.viewer, "Sources?", f.now).unwrap();
        assert!(events[0].is_staff_only());
        assert!(f.session.snapshot(f.viewer).questions.is_empty());
        assert_eq!(f.session.snapshot(f.moderator).pending_questions.len(), 1);

        f.session
            .moderate(f.moderator, ModerationCommand::ApproveQuestion { question_id: question }, f.now)
            .unwrap();
        assert_eq!(f.session.snapshot(f.viewer).questions.len(), 1);

        f.session
            .cast_vote(f.viewer, f.ana, AudienceVote { clarity: 4, consistency: 5, impact: 3 })
            .unwrap();
        assert!(f
            .session
            .cast_vote(f.ana, f.ben, AudienceVote { clarity: 4, consistency: 5, impact: 3 })
            .is_err());
        assert_eq!(f.session.snapshot(f.viewer).votes.len(), 1);
    }

    #[test]
    fn test_speaker_leaving_ends_turn() {
        let mut f = fixture();
        f.session
            .moderate(f.moderator, ModerationCommand::AssignTurn { debater_id: f.ana }, f.now)
            .unwrap();
        let events = f.session.leave(f.ana, f.now + Duration::seconds(1));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::TurnEnded { .. })));
        assert!(f.session.room().is_debater(f.ana));
        assert!(!f.session.room().debater(f.ana).unwrap().is_active);
    }
}

//! Per-room session task
//!
//! Each live room is owned by one task holding its `DebateSession`.
//! Connections talk to it through a command channel and receive its
//! events through a broadcast channel; a one-second interval in the same
//! task drives the turn countdown. After every change the task writes
//! finished turns, audit entries and the room itself to storage.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use tribuna_core::{
    AudienceVote, DebateSession, JoinRole, ModerationCommand, ParticipantRole, ReactionKind,
    SessionEvent, SessionSnapshot,
};

use crate::error::{Error, Result};
use crate::server::Shared;

/// Countdown resolution
const TICK: Duration = Duration::from_secs(1);

/// Commands queued per session before senders wait
const COMMAND_BUFFER: usize = 64;

/// Events buffered per subscriber before it lags
const EVENT_BUFFER: usize = 256;

type Reply<T> = oneshot::Sender<tribuna_core::Result<T>>;

/// What a successful join hands back to the connection
pub(crate) struct JoinGrant {
    pub role: ParticipantRole,
    /// Receives moderator-only events
    pub staff: bool,
    pub snapshot: SessionSnapshot,
    /// Subscribed at the moment of the snapshot, so nothing is missed or repeated
    pub events: broadcast::Receiver<SessionEvent>,
}

pub(crate) enum SessionCommand {
    Join {
        user_id: Uuid,
        username: String,
        role: JoinRole,
        reply: Reply<JoinGrant>,
    },
    Leave {
        user_id: Uuid,
    },
    RequestTurn {
        user_id: Uuid,
        reply: Reply<bool>,
    },
    YieldTurn {
        user_id: Uuid,
        reply: Reply<()>,
    },
    Moderate {
        user_id: Uuid,
        command: ModerationCommand,
        reply: Reply<()>,
    },
    React {
        user_id: Uuid,
        kind: ReactionKind,
        reply: Reply<()>,
    },
    SubmitQuestion {
        user_id: Uuid,
        text: String,
        reply: Reply<Uuid>,
    },
    CastVote {
        user_id: Uuid,
        debater_id: Uuid,
        vote: AudienceVote,
        reply: Reply<()>,
    },
    Snapshot {
        user_id: Uuid,
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Cloneable handle to a running session task
#[derive(Clone)]
pub(crate) struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| Error::SessionClosed)?;
        let result = reply_rx.await.map_err(|_| Error::SessionClosed)?;
        Ok(result?)
    }

    pub async fn join(&self, user_id: Uuid, username: String, role: JoinRole) -> Result<JoinGrant> {
        self.call(|reply| SessionCommand::Join {
            user_id,
            username,
            role,
            reply,
        })
        .await
    }

    /// Fire and forget; a closed session has nobody left to tell
    pub async fn leave(&self, user_id: Uuid) {
        let _ = self.commands.send(SessionCommand::Leave { user_id }).await;
    }

    pub async fn request_turn(&self, user_id: Uuid) -> Result<bool> {
        self.call(|reply| SessionCommand::RequestTurn { user_id, reply })
            .await
    }

    pub async fn yield_turn(&self, user_id: Uuid) -> Result<()> {
        self.call(|reply| SessionCommand::YieldTurn { user_id, reply })
            .await
    }

    pub async fn moderate(&self, user_id: Uuid, command: ModerationCommand) -> Result<()> {
        self.call(|reply| SessionCommand::Moderate {
            user_id,
            command,
            reply,
        })
        .await
    }

    pub async fn react(&self, user_id: Uuid, kind: ReactionKind) -> Result<()> {
        self.call(|reply| SessionCommand::React {
            user_id,
            kind,
            reply,
        })
        .await
    }

    pub async fn submit_question(&self, user_id: Uuid, text: String) -> Result<Uuid> {
        self.call(|reply| SessionCommand::SubmitQuestion {
            user_id,
            text,
            reply,
        })
        .await
    }

    pub async fn cast_vote(&self, user_id: Uuid, debater_id: Uuid, vote: AudienceVote) -> Result<()> {
        self.call(|reply| SessionCommand::CastVote {
            user_id,
            debater_id,
            vote,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self, user_id: Uuid) -> Result<SessionSnapshot> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Snapshot { user_id, reply })
            .await
            .map_err(|_| Error::SessionClosed)?;
        reply_rx.await.map_err(|_| Error::SessionClosed)
    }
}

/// Spawn the task owning `session`
pub(crate) fn spawn_session(session: DebateSession, shared: Arc<Shared>) -> SessionHandle {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
    let shutdown_rx = shared.subscribe_shutdown();
    let task = tokio::spawn(run_session(
        session,
        commands_rx,
        events_tx,
        shared.clone(),
        shutdown_rx,
    ));
    shared.track_session(task);
    SessionHandle {
        commands: commands_tx,
    }
}

/// Send the outcome of one operation back and keep its events
fn respond<T>(
    reply: Reply<T>,
    result: tribuna_core::Result<(T, Vec<SessionEvent>)>,
) -> Vec<SessionEvent> {
    match result {
        Ok((value, events)) => {
            let _ = reply.send(Ok(value));
            events
        }
        Err(e) => {
            debug!(error = %e, "Session command rejected");
            let _ = reply.send(Err(e));
            Vec::new()
        }
    }
}

fn apply_command(
    session: &mut DebateSession,
    command: SessionCommand,
    events_tx: &broadcast::Sender<SessionEvent>,
) -> Vec<SessionEvent> {
    let now = Utc::now();
    match command {
        SessionCommand::Join {
            user_id,
            username,
            role,
            reply,
        } => {
            let result = session.join(user_id, &username, role, now).map(|(role, events)| {
                let grant = JoinGrant {
                    role,
                    staff: session.is_staff(user_id),
                    snapshot: session.snapshot(user_id),
                    events: events_tx.subscribe(),
                };
                (grant, events)
            });
            respond(reply, result)
        }
        SessionCommand::Leave { user_id } => session.leave(user_id, now),
        SessionCommand::RequestTurn { user_id, reply } => {
            respond(reply, session.request_turn(user_id, now))
        }
        SessionCommand::YieldTurn { user_id, reply } => {
            respond(reply, session.yield_turn(user_id, now).map(|e| ((), e)))
        }
        SessionCommand::Moderate {
            user_id,
            command,
            reply,
        } => respond(reply, session.moderate(user_id, command, now).map(|e| ((), e))),
        SessionCommand::React {
            user_id,
            kind,
            reply,
        } => respond(reply, session.react(user_id, kind).map(|e| ((), e))),
        SessionCommand::SubmitQuestion {
            user_id,
            text,
            reply,
        } => respond(reply, session.submit_question(user_id, &text, now)),
        SessionCommand::CastVote {
            user_id,
            debater_id,
            vote,
            reply,
        } => respond(
            reply,
            session.cast_vote(user_id, debater_id, vote).map(|e| ((), e)),
        ),
        SessionCommand::Snapshot { user_id, reply } => {
            let _ = reply.send(session.snapshot(user_id));
            Vec::new()
        }
    }
}

/// How much of the session has already been written to storage
#[derive(Default)]
struct Persisted {
    turns: usize,
    log: usize,
    /// A room change whose write failed
    room_pending: bool,
}

fn changes_room(event: &SessionEvent) -> bool {
    matches!(
        event,
        SessionEvent::ParticipantJoined { .. }
            | SessionEvent::ParticipantLeft { .. }
            | SessionEvent::TurnEnded { .. }
            | SessionEvent::SessionEnded { .. }
    )
}

/// Write new turns and audit entries, and the room when it changed
async fn persist(session: &DebateSession, room_changed: bool, persisted: &mut Persisted, shared: &Shared) {
    let write_room = room_changed || persisted.room_pending;
    let new_turns = &session.turns()[persisted.turns..];
    let new_entries = &session.log()[persisted.log..];

    if !new_turns.is_empty() || !new_entries.is_empty() || write_room {
        let room = write_room.then(|| session.room());
        let written = shared.with_db(|db| db.persist_session(new_turns, new_entries, room));
        match written {
            Ok(()) => {
                persisted.turns = session.turns().len();
                persisted.log = session.log().len();
                persisted.room_pending = false;
            }
            Err(e) => {
                persisted.room_pending = write_room;
                error!(room_id = %session.room_id(), error = %e, "Failed to persist session");
            }
        }
    }

    if room_changed {
        shared.registry.write().await.upsert(session.room().clone());
    }
}

#[instrument(skip_all, fields(room_id = %session.room_id()))]
async fn run_session(
    mut session: DebateSession,
    mut commands: mpsc::Receiver<SessionCommand>,
    events_tx: broadcast::Sender<SessionEvent>,
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let room_id = session.room_id();
    let mut ticker = interval_at(Instant::now() + TICK, TICK);
    let mut persisted = Persisted::default();
    info!("Session task started");

    loop {
        let events = tokio::select! {
            command = commands.recv() => match command {
                Some(command) => apply_command(&mut session, command, &events_tx),
                None => break,
            },
            _ = ticker.tick() => session.tick(Utc::now()),
            _ = shutdown_rx.recv() => {
                debug!("Session task shutting down");
                break;
            }
        };

        if events.is_empty() {
            continue;
        }

        let room_changed = events.iter().any(changes_room);
        persist(&session, room_changed, &mut persisted, &shared).await;

        for event in events {
            // No subscribers is fine
            let _ = events_tx.send(event);
        }

        if session.is_ended() {
            break;
        }
    }

    persist(&session, true, &mut persisted, &shared).await;
    shared.sessions.write().await.remove(&room_id);
    info!(turns = session.turns().len(), "Session task stopped");
}

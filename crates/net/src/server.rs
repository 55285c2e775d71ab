//! TCP server hosting debate rooms
//!
//! Every connection gets a reader loop and a writer task. Requests are
//! answered in the order they arrive; events from joined rooms are
//! forwarded onto the same writer by one task per joined room.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::io::WriteHalf;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tribuna_core::{
    AppConfig, AuthService, Database, DebateSession, FieldErrors, ProfileUpdate,
    RoomRegistry, RoomRepository, SessionEvent, User, UserRepository,
};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::Message;
use crate::session::{spawn_session, SessionHandle};

/// Outgoing messages queued per connection
const OUTBOX_SIZE: usize = 128;

/// How long a closing connection may take to flush its outbox
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// How long shutdown waits for session tasks to write their final state
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server tunables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_peers: usize,
    pub session_hours: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ServerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_peers: config.server.max_peers,
            session_hours: config.auth.session_hours,
        }
    }
}

/// State shared by connections and session tasks
pub(crate) struct Shared {
    db: Mutex<Database>,
    pub(crate) registry: RwLock<RoomRegistry>,
    pub(crate) sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    session_tasks: Mutex<Vec<JoinHandle<()>>>,
    peers: RwLock<HashMap<u64, mpsc::Sender<Message>>>,
    next_peer: AtomicU64,
    config: ServerConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl Shared {
    /// Run a storage operation under the database lock
    pub(crate) fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> tribuna_core::Result<T>,
    ) -> Result<T> {
        let db = self.db.lock().map_err(|_| Error::StoragePoisoned)?;
        Ok(f(&db)?)
    }

    pub(crate) fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub(crate) fn track_session(&self, task: JoinHandle<()>) {
        let mut tasks = self
            .session_tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    fn take_session_tasks(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = self
            .session_tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *tasks)
    }

    /// The running session of a live room, started on first use
    async fn session_for(self: &Arc<Self>, room_id: Uuid) -> Result<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(&room_id) {
            return Ok(handle.clone());
        }

        let room = self
            .registry
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| tribuna_core::Error::NotFound(format!("Room {}", room_id)))?;
        let session = DebateSession::open(room)?;
        let handle = spawn_session(session, self.clone());
        sessions.insert(room_id, handle.clone());
        Ok(handle)
    }
}

/// Debate server handle
pub struct Server {
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl Server {
    /// Bind, recover persisted rooms and start accepting connections
    pub async fn start(addr: impl ToSocketAddrs, db: Database, config: ServerConfig) -> Result<Self> {
        let now = Utc::now();
        let stale = db.end_stale_live_rooms(now)?;
        if stale > 0 {
            warn!(rooms = stale, "Ended rooms left live by a previous run");
        }
        let expired = db.cleanup_expired_sessions(now)?;
        debug!(sessions = expired, "Removed expired login sessions");
        let registry = RoomRegistry::from_rooms(db.list_rooms()?);

        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        let (shutdown_tx, _) = broadcast::channel(1);
        let shared = Arc::new(Shared {
            db: Mutex::new(db),
            registry: RwLock::new(registry),
            sessions: RwLock::new(HashMap::new()),
            session_tasks: Mutex::new(Vec::new()),
            peers: RwLock::new(HashMap::new()),
            next_peer: AtomicU64::new(1),
            config,
            shutdown_tx,
        });

        info!(addr = %bound_addr, rooms = shared.registry.read().await.len(), "Server started");

        let shutdown_rx = shared.subscribe_shutdown();
        tokio::spawn(accept_loop(listener, shared.clone(), shutdown_rx));

        Ok(Server {
            addr: bound_addr,
            shared,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of connected peers
    pub async fn peer_count(&self) -> usize {
        self.shared.peers.read().await.len()
    }

    /// Tell every peer we are going away, stop all tasks and wait for the
    /// live sessions to write their final state
    pub async fn shutdown(&self) {
        broadcast_to_peers(&self.shared, Message::ServerShutdown).await;
        let _ = self.shared.shutdown_tx.send(());
        info!("Server shutdown initiated");

        let tasks = self.shared.take_session_tasks();
        let count = tasks.len();
        let drained = tokio::time::timeout(SESSION_DRAIN_TIMEOUT, async {
            for task in tasks {
                if let Err(e) = task.await {
                    error!(error = %e, "Session task failed");
                }
            }
        })
        .await;
        match drained {
            Ok(()) => debug!(sessions = count, "Session tasks stopped"),
            Err(_) => warn!(sessions = count, "Timed out waiting for session tasks"),
        }
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        tokio::spawn(handle_connection(stream, addr, shared.clone()));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Per-connection state
struct Connection {
    peer_id: u64,
    tx: mpsc::Sender<Message>,
    user: Option<User>,
    token: Option<String>,
    /// Event forwarders of joined rooms
    rooms: HashMap<Uuid, JoinHandle<()>>,
}

impl Connection {
    fn user(&self) -> Result<&User> {
        self.user.as_ref().ok_or_else(|| {
            tribuna_core::Error::Authentication("Log in first".to_string()).into()
        })
    }

    async fn leave_room(&mut self, room_id: Uuid, shared: &Shared) {
        if let Some(forwarder) = self.rooms.remove(&room_id) {
            forwarder.abort();
        }
        if let Some(user) = &self.user {
            let handle = shared.sessions.read().await.get(&room_id).cloned();
            if let Some(handle) = handle {
                handle.leave(user.id).await;
            }
        }
    }

    async fn leave_all(&mut self, shared: &Shared) {
        let rooms: Vec<Uuid> = self.rooms.keys().copied().collect();
        for room_id in rooms {
            self.leave_room(room_id, shared).await;
        }
    }

    /// Switch the connection to a freshly authenticated account
    async fn authenticate(&mut self, user: User, token: String, shared: &Shared) -> Message {
        if self.user.as_ref().is_some_and(|u| u.id != user.id) {
            self.leave_all(shared).await;
        }
        info!(peer_id = self.peer_id, user_id = %user.id, "Peer authenticated");
        self.user = Some(user.clone());
        self.token = Some(token.clone());
        Message::Authenticated { user, token }
    }
}

/// Handle a single client connection
async fn handle_connection(stream: TcpStream, addr: SocketAddr, shared: Arc<Shared>) {
    let (mut reader, mut writer) = tokio::io::split(stream);

    let (tx, rx) = mpsc::channel(OUTBOX_SIZE);
    let peer_id = shared.next_peer.fetch_add(1, Ordering::Relaxed);
    {
        let mut peers = shared.peers.write().await;
        if peers.len() >= shared.config.max_peers {
            drop(peers);
            warn!(addr = %addr, "Refusing connection, server full");
            let _ = write_frame(
                &mut writer,
                &Message::Rejected {
                    reason: Error::ServerFull.to_string(),
                    errors: FieldErrors::new(),
                },
            )
            .await;
            return;
        }
        peers.insert(peer_id, tx.clone());
    }

    info!(addr = %addr, peer_id, "Peer connected");
    let writer_handle = tokio::spawn(writer_task(writer, rx));
    let mut shutdown_rx = shared.subscribe_shutdown();

    let mut conn = Connection {
        peer_id,
        tx,
        user: None,
        token: None,
        rooms: HashMap::new(),
    };

    loop {
        let msg = tokio::select! {
            result = read_frame(&mut reader) => match result {
                Ok(msg) => msg,
                Err(Error::ConnectionClosed) => {
                    debug!(peer_id, "Connection closed");
                    break;
                }
                Err(e) => {
                    warn!(peer_id, error = %e, "Read error");
                    break;
                }
            },
            _ = shutdown_rx.recv() => break,
        };

        if let Some(reply) = handle_request(&mut conn, msg, &shared).await {
            if conn.tx.send(reply).await.is_err() {
                break;
            }
        }
    }

    // Cleanup
    conn.leave_all(&shared).await;
    shared.peers.write().await.remove(&peer_id);
    drop(conn);
    let _ = tokio::time::timeout(FLUSH_TIMEOUT, writer_handle).await;

    info!(peer_id, "Peer disconnected");
}

/// Writer task - sends messages to the client
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}

/// Broadcast to every connected peer
async fn broadcast_to_peers(shared: &Shared, msg: Message) {
    let peers = shared.peers.read().await;
    for tx in peers.values() {
        let _ = tx.send(msg.clone()).await;
    }
}

fn rejection(error: Error) -> Message {
    match error {
        Error::Core(e) => Message::rejected(&e),
        other => Message::Rejected {
            reason: other.to_string(),
            errors: FieldErrors::new(),
        },
    }
}

fn auth_failure(error: Error) -> Message {
    match error {
        Error::Core(tribuna_core::Error::Validation(errors)) => Message::AuthFailed {
            reason: "Please correct the highlighted fields".to_string(),
            errors,
        },
        Error::Core(tribuna_core::Error::Authentication(reason)) => Message::AuthFailed {
            reason,
            errors: FieldErrors::new(),
        },
        other => rejection(other),
    }
}

/// Answer one request. `None` means the reply was already queued.
async fn handle_request(conn: &mut Connection, msg: Message, shared: &Arc<Shared>) -> Option<Message> {
    let is_auth = matches!(
        msg,
        Message::Register { .. } | Message::Login { .. } | Message::Resume { .. }
    );
    match dispatch(conn, msg, shared).await {
        Ok(reply) => reply,
        Err(e) if is_auth => Some(auth_failure(e)),
        Err(e) => {
            debug!(peer_id = conn.peer_id, error = %e, "Request rejected");
            Some(rejection(e))
        }
    }
}

async fn dispatch(conn: &mut Connection, msg: Message, shared: &Arc<Shared>) -> Result<Option<Message>> {
    let now = Utc::now();
    let session_hours = shared.config.session_hours;

    let reply = match msg {
        Message::Ping => Message::Pong,

        Message::Register { form } => {
            let (user, session) = shared.with_db(|db| {
                AuthService::new(db)
                    .with_session_hours(session_hours)
                    .register(&form, now)
            })?;
            conn.authenticate(user, session.token, shared).await
        }
        Message::Login {
            identifier,
            password,
        } => {
            let (user, session) = shared.with_db(|db| {
                AuthService::new(db)
                    .with_session_hours(session_hours)
                    .login(&identifier, &password, now)
            })?;
            conn.authenticate(user, session.token, shared).await
        }
        Message::Resume { token } => {
            let user = shared.with_db(|db| AuthService::new(db).resume(&token, now))?;
            conn.authenticate(user, token, shared).await
        }
        Message::Logout => {
            conn.leave_all(shared).await;
            if let Some(token) = conn.token.take() {
                shared.with_db(|db| AuthService::new(db).logout(&token))?;
            }
            conn.user = None;
            Message::LoggedOut
        }
        Message::UpdateProfile { display_name, bio } => {
            let user_id = conn.user()?.id;
            let update = ProfileUpdate { display_name, bio };
            let user = shared.with_db(|db| AuthService::new(db).update_profile(user_id, &update))?;
            conn.user = Some(user.clone());
            Message::ProfileUpdated { user }
        }

        Message::ListRooms { filter, sort } => {
            conn.user()?;
            let registry = shared.registry.read().await;
            let rooms = registry.list(&filter, sort).into_iter().cloned().collect();
            Message::RoomList { rooms }
        }
        Message::CreateRoom { draft } => {
            let user_id = conn.user()?.id;
            let room = shared
                .registry
                .write()
                .await
                .create_room(draft, user_id, now)?
                .clone();
            shared.with_db(|db| db.save_room(&room))?;
            Message::RoomCreated { room }
        }
        Message::SetModerator {
            room_id,
            moderator_id,
        } => {
            let user_id = conn.user()?.id;
            let room = {
                let mut registry = shared.registry.write().await;
                ensure_not_live(&registry, room_id, "Choose the moderator before the room starts")?;
                registry.set_moderator(room_id, user_id, moderator_id)?.clone()
            };
            shared.with_db(|db| db.save_room(&room))?;
            Message::RoomUpdated { room }
        }
        Message::ClaimSeat { room_id, position } => {
            let user = conn.user()?;
            let room = {
                let mut registry = shared.registry.write().await;
                ensure_not_live(&registry, room_id, "Join the live room as a debater instead")?;
                registry.join_as_debater(room_id, user.id, user.username.clone(), position, now)?;
                registry
                    .get(room_id)
                    .cloned()
                    .ok_or_else(|| tribuna_core::Error::NotFound(format!("Room {}", room_id)))?
            };
            shared.with_db(|db| db.save_room(&room))?;
            Message::RoomUpdated { room }
        }
        Message::StartRoom { room_id } => {
            let user_id = conn.user()?.id;
            let room = shared
                .registry
                .write()
                .await
                .start_room(room_id, user_id, now)?
                .clone();
            shared.with_db(|db| db.save_room(&room))?;
            shared.session_for(room_id).await?;
            Message::RoomUpdated { room }
        }

        Message::JoinRoom { room_id, role } => {
            let user = conn.user()?.clone();
            if conn.rooms.get(&room_id).is_some_and(|f| !f.is_finished()) {
                return Err(tribuna_core::Error::InvalidOperation(
                    "Already in this room".to_string(),
                )
                .into());
            }
            let handle = shared.session_for(room_id).await?;
            let grant = handle.join(user.id, user.username.clone(), role).await?;

            let joined = Message::Joined {
                room_id,
                role: grant.role,
                snapshot: Box::new(grant.snapshot),
            };
            conn.tx.send(joined).await.map_err(|_| Error::ConnectionClosed)?;

            let forwarder = tokio::spawn(forward_events(
                room_id,
                user.id,
                grant.staff,
                grant.events,
                handle,
                conn.tx.clone(),
            ));
            conn.rooms.insert(room_id, forwarder);
            return Ok(None);
        }
        Message::LeaveRoom { room_id } => {
            conn.user()?;
            conn.leave_room(room_id, shared).await;
            Message::Left { room_id }
        }
        Message::RequestTurn { room_id } => {
            let user_id = conn.user()?.id;
            let pending = shared.session_for(room_id).await?.request_turn(user_id).await?;
            Message::TurnRequest { room_id, pending }
        }
        Message::YieldTurn { room_id } => {
            let user_id = conn.user()?.id;
            shared.session_for(room_id).await?.yield_turn(user_id).await?;
            Message::Accepted
        }
        Message::Moderate { room_id, command } => {
            let user_id = conn.user()?.id;
            shared.session_for(room_id).await?.moderate(user_id, command).await?;
            Message::Accepted
        }
        Message::React { room_id, kind } => {
            let user_id = conn.user()?.id;
            shared.session_for(room_id).await?.react(user_id, kind).await?;
            Message::Accepted
        }
        Message::SubmitQuestion { room_id, text } => {
            let user_id = conn.user()?.id;
            let question_id = shared
                .session_for(room_id)
                .await?
                .submit_question(user_id, text)
                .await?;
            Message::QuestionSubmitted {
                room_id,
                question_id,
            }
        }
        Message::CastVote {
            room_id,
            debater_id,
            vote,
        } => {
            let user_id = conn.user()?.id;
            shared
                .session_for(room_id)
                .await?
                .cast_vote(user_id, debater_id, vote)
                .await?;
            Message::Accepted
        }
        Message::Resync { room_id } => {
            let user_id = conn.user()?.id;
            let snapshot = shared.session_for(room_id).await?.snapshot(user_id).await?;
            Message::Snapshot {
                room_id,
                snapshot: Box::new(snapshot),
            }
        }

        Message::SubmitEvaluation { mut evaluation } => {
            evaluation.id = Uuid::new_v4();
            evaluation.evaluator_id = conn.user()?.id;
            evaluation.created_at = now;

            let room = shared
                .registry
                .read()
                .await
                .get(evaluation.room_id)
                .cloned()
                .ok_or_else(|| {
                    tribuna_core::Error::NotFound(format!("Room {}", evaluation.room_id))
                })?;
            shared.with_db(|db| db.submit_evaluation(&room, &evaluation, now))?;
            Message::EvaluationRecorded {
                room_id: room.id,
                debater_id: evaluation.debater_id,
            }
        }
        Message::GetFeedback { room_id } => {
            let user_id = conn.user()?.id;
            let feedback = shared.with_db(|db| db.feedback_for(room_id, user_id))?;
            Message::Feedback { feedback }
        }
        Message::GetHistory => {
            let user_id = conn.user()?.id;
            let (entries, stats, titles) = shared.with_db(|db| {
                Ok((
                    db.history_for_user(user_id)?,
                    db.user_stats(user_id)?,
                    db.list_titles(user_id)?,
                ))
            })?;
            Message::History {
                entries,
                stats,
                titles,
            }
        }

        other => {
            debug!(peer_id = conn.peer_id, message = ?other, "Unexpected message from client");
            return Err(Error::Protocol("Unexpected message".into()));
        }
    };

    Ok(Some(reply))
}

/// Seats and moderators are fixed once a room is live
fn ensure_not_live(registry: &RoomRegistry, room_id: Uuid, reason: &str) -> Result<()> {
    match registry.get(room_id) {
        Some(room) if room.is_live() => {
            Err(tribuna_core::Error::InvalidOperation(reason.to_string()).into())
        }
        _ => Ok(()),
    }
}

/// Relay a room's events to one connection
async fn forward_events(
    room_id: Uuid,
    user_id: Uuid,
    staff: bool,
    mut events: broadcast::Receiver<SessionEvent>,
    handle: SessionHandle,
    tx: mpsc::Sender<Message>,
) {
    loop {
        let msg = match events.recv().await {
            Ok(event) if event.is_staff_only() && !staff => continue,
            Ok(event) => Message::Event { room_id, event },
            Err(RecvError::Lagged(skipped)) => {
                warn!(%room_id, %user_id, skipped, "Event subscriber lagged, resyncing");
                match handle.snapshot(user_id).await {
                    Ok(snapshot) => Message::Snapshot {
                        room_id,
                        snapshot: Box::new(snapshot),
                    },
                    Err(_) => break,
                }
            }
            Err(RecvError::Closed) => break,
        };
        if tx.send(msg).await.is_err() {
            break;
        }
    }
    debug!(%room_id, %user_id, "Event forwarder stopped");
}

//! TCP client for a Tribuna server

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tribuna_core::{SessionEvent, SessionSnapshot, User};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::Message;

/// Keep-alive period while the connection is idle
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Event received from the server
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Reply to one of our requests, in request order
    Reply(Message),
    /// Something happened in a joined room
    Room { room_id: Uuid, event: SessionEvent },
    /// Fresh room state after we fell behind or asked for it
    Snapshot {
        room_id: Uuid,
        snapshot: Box<SessionSnapshot>,
    },
    /// Server is shutting down
    ServerShutdown,
    /// Connection lost
    Disconnected,
}

/// Client handle for network operations
pub struct Client {
    state: Arc<RwLock<ClientState>>,
    event_rx: mpsc::Receiver<ServerEvent>,
    cmd_tx: mpsc::Sender<ClientCommand>,
    /// Events that arrived while waiting on a reply
    pending: VecDeque<ServerEvent>,
}

struct ClientState {
    connection: ConnectionState,
    user: Option<User>,
    token: Option<String>,
}

enum ClientCommand {
    Send(Message),
    Disconnect,
}

impl Client {
    /// Connect to a server
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        info!(addr = %addr, "Connecting to server");

        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = tokio::io::split(stream);

        let state = Arc::new(RwLock::new(ClientState {
            connection: ConnectionState::Connected,
            user: None,
            token: None,
        }));

        let (event_tx, event_rx) = mpsc::channel(256);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        tokio::spawn(connection_task(reader, writer, state.clone(), event_tx, cmd_rx));

        Ok(Client {
            state,
            event_rx,
            cmd_tx,
            pending: VecDeque::new(),
        })
    }

    /// Queue a request without waiting for its reply
    pub async fn send(&self, msg: Message) -> Result<()> {
        self.cmd_tx
            .send(ClientCommand::Send(msg))
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Send a request and wait for its reply. Room events that arrive
    /// meanwhile stay queued for `next_event`.
    pub async fn request(&mut self, msg: Message) -> Result<Message> {
        self.send(msg).await?;
        loop {
            match self.event_rx.recv().await {
                Some(ServerEvent::Reply(reply)) => return Ok(reply),
                Some(ServerEvent::Disconnected) | None => return Err(Error::ConnectionClosed),
                Some(other) => self.pending.push_back(other),
            }
        }
    }

    /// Get the next server event
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        match self.pending.pop_front() {
            Some(event) => Some(event),
            None => self.event_rx.recv().await,
        }
    }

    /// Disconnect from the server
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Disconnect).await;
    }

    /// Get current connection state
    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.connection
    }

    /// The account this connection is logged in as
    pub async fn user(&self) -> Option<User> {
        self.state.read().await.user.clone()
    }

    /// Token to resume the login on a later connection
    pub async fn token(&self) -> Option<String> {
        self.state.read().await.token.clone()
    }
}

/// Main connection task
async fn connection_task(
    mut reader: ReadHalf<TcpStream>,
    mut writer: WriteHalf<TcpStream>,
    state: Arc<RwLock<ClientState>>,
    event_tx: mpsc::Sender<ServerEvent>,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            // Incoming message from server
            result = read_frame(&mut reader) => {
                match result {
                    Ok(Message::ServerShutdown) => {
                        let _ = event_tx.send(ServerEvent::ServerShutdown).await;
                        break;
                    }
                    Ok(msg) => {
                        handle_server_message(msg, &state, &event_tx).await;
                    }
                    Err(Error::ConnectionClosed) => {
                        debug!("Server closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Read error");
                        break;
                    }
                }
            }

            // Outgoing command
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(msg)) => {
                        if let Err(e) = write_frame(&mut writer, &msg).await {
                            warn!(error = %e, "Write error");
                            break;
                        }
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        debug!("Disconnect requested");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if let Err(e) = write_frame(&mut writer, &Message::Ping).await {
                    warn!(error = %e, "Heartbeat failed");
                    break;
                }
            }
        }
    }

    // Cleanup
    {
        let mut s = state.write().await;
        s.connection = ConnectionState::Disconnected;
    }
    let _ = event_tx.send(ServerEvent::Disconnected).await;
    info!("Disconnected from server");
}

/// Handle a message from the server
async fn handle_server_message(
    msg: Message,
    state: &Arc<RwLock<ClientState>>,
    event_tx: &mpsc::Sender<ServerEvent>,
) {
    let event = match msg {
        Message::Event { room_id, event } => ServerEvent::Room { room_id, event },
        Message::Snapshot { room_id, snapshot } => ServerEvent::Snapshot { room_id, snapshot },
        // Heartbeat replies are not requests of the caller
        Message::Pong => {
            debug!("Received pong");
            return;
        }
        Message::Authenticated { user, token } => {
            {
                let mut s = state.write().await;
                s.user = Some(user.clone());
                s.token = Some(token.clone());
            }
            ServerEvent::Reply(Message::Authenticated { user, token })
        }
        Message::LoggedOut => {
            {
                let mut s = state.write().await;
                s.user = None;
                s.token = None;
            }
            ServerEvent::Reply(Message::LoggedOut)
        }
        Message::ProfileUpdated { user } => {
            state.write().await.user = Some(user.clone());
            ServerEvent::Reply(Message::ProfileUpdated { user })
        }
        other => ServerEvent::Reply(other),
    };
    let _ = event_tx.send(event).await;
}

//! Tribuna Network Library
//!
//! TCP transport for live debate rooms.
//!
//! # Architecture
//!
//! - **Server**: accepts connections, authenticates accounts and routes
//!   room commands to one session task per live room
//! - **Client**: connects to a server and separates replies from room events
//! - **Protocol**: length-prefixed JSON messages
//!
//! # Usage
//!
//! ```ignore
//! let server = Server::start("0.0.0.0:7340", db, ServerConfig::default()).await?;
//!
//! let mut client = Client::connect(server.addr()).await?;
//! client.request(Message::Login { identifier, password }).await?;
//! client.request(Message::JoinRoom { room_id, role: JoinRole::Audience }).await?;
//!
//! while let Some(event) = client.next_event().await {
//!     match event {
//!         ServerEvent::Room { event, .. } => { /* render */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod client;
pub mod error;
mod frame;
pub mod protocol;
pub mod server;
mod session;

pub use client::{Client, ConnectionState, ServerEvent};
pub use error::{Error, Result};
pub use protocol::Message;
pub use server::{Server, ServerConfig};

/// Default port for Tribuna servers
pub const DEFAULT_PORT: u16 = tribuna_core::config::DEFAULT_PORT;

//! Network error types

use std::io;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Server full")]
    ServerFull,

    #[error("Room session closed")]
    SessionClosed,

    #[error("Storage unavailable: lock poisoned")]
    StoragePoisoned,

    #[error(transparent)]
    Core(#[from] tribuna_core::Error),
}

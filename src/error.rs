//! Custom error types for Gamewarden.
//!
//! This module provides a centralized error handling system with specific error types
//! for different parts of the application.

use std::fmt;

/// Main error type for Gamewarden operations.
#[derive(Debug)]
pub enum GamewardenError {
    /// Configuration errors (missing env vars, invalid values). Fatal at startup.
    Config(String),
    /// RCON authentication rejected (bad password). Fatal to one session only.
    Auth(String),
    /// Transport could not be established (unreachable host, timeout).
    Connect(String),
    /// A command failed in flight after the reconnect retry was spent.
    Command(String),
    /// Ban-store I/O failure. Fatal to the invoking command only.
    Storage(String),
    /// Invoking user lacks the admin role.
    PermissionDenied(String),
    /// Administrative command issued outside the admin channel.
    WrongChannel(String),
    /// Command names a game that is not configured.
    UnknownGame(String),
}

impl fmt::Display for GamewardenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Auth(msg) => write!(f, "RCON authentication failed: {}", msg),
            Self::Connect(msg) => write!(f, "Connection error: {}", msg),
            Self::Command(msg) => write!(f, "Command error: {}", msg),
            Self::Storage(msg) => write!(f, "Ban store error: {}", msg),
            Self::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            Self::WrongChannel(msg) => write!(f, "Wrong channel: {}", msg),
            Self::UnknownGame(msg) => write!(f, "Unknown game: {}", msg),
        }
    }
}

impl std::error::Error for GamewardenError {}

/// Result type alias for Gamewarden operations.
pub type Result<T> = std::result::Result<T, GamewardenError>;

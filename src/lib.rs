//! Gamewarden library.
//!
//! This library provides the core functionality for the Gamewarden Discord bot:
//! RCON session management for multiple game servers, command routing with an
//! admin role/channel policy, persistent ban storage, and scheduled background
//! actions (auto-save, ban enforcement, player watch).

pub mod bans;
pub mod bot;
pub mod config;
pub mod error;
pub mod game;
pub mod rcon;
pub mod registry;
pub mod router;
pub mod scheduler;

pub use config::Config;
pub use error::{GamewardenError, Result};

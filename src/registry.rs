//! Static lookup from a game to its session and configuration.
//!
//! Built once at startup from the already-validated [`Config`]; all the
//! fail-fast checking happens there, so construction here cannot fail.

use crate::config::{Config, GameServerConfig};
use crate::game::Game;
use crate::rcon::RconSession;
use std::sync::Arc;

/// Maps each configured game to its RCON session and settings.
///
/// Iteration order is the stable game order (Mc, Pal, Asa), restricted to
/// whichever subset is configured. Generic over the session type so tests
/// can register doubles.
pub struct ServerRegistry<S> {
    entries: Vec<(GameServerConfig, Arc<S>)>,
}

impl ServerRegistry<RconSession> {
    /// Build the registry with a live [`RconSession`] per configured game.
    /// Sessions dial lazily on first use.
    pub fn from_config(config: &Config) -> Self {
        let entries = config
            .servers
            .iter()
            .map(|server| (server.clone(), Arc::new(RconSession::new(server))))
            .collect();
        Self { entries }
    }
}

impl<S> ServerRegistry<S> {
    /// Build a registry from explicit entries. Used by tests; entries are
    /// expected in stable game order.
    pub fn new(entries: Vec<(GameServerConfig, Arc<S>)>) -> Self {
        Self { entries }
    }

    pub fn session_for(&self, game: Game) -> Option<&Arc<S>> {
        self.entries
            .iter()
            .find(|(config, _)| config.game == game)
            .map(|(_, session)| session)
    }

    pub fn config_for(&self, game: Game) -> Option<&GameServerConfig> {
        self.entries
            .iter()
            .map(|(config, _)| config)
            .find(|config| config.game == game)
    }

    /// Configured games in stable order.
    pub fn games(&self) -> impl Iterator<Item = Game> + '_ {
        self.entries.iter().map(|(config, _)| config.game)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GameServerConfig, &Arc<S>)> {
        self.entries
            .iter()
            .map(|(config, session)| (config, session))
    }
}

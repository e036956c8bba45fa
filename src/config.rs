//! Configuration management for Gamewarden.
//!
//! This module handles loading and validating environment variables and application settings.
//! Every mandatory value is validated eagerly; a misconfigured enabled game aborts startup
//! instead of being silently defaulted.

use crate::error::{GamewardenError, Result};
use crate::game::{Game, ALL_GAMES};
use std::env;
use std::time::Duration;

/// Connection and routing settings for one enabled game server.
#[derive(Debug, Clone)]
pub struct GameServerConfig {
    /// Which game this server runs
    pub game: Game,
    /// RCON host
    pub host: String,
    /// RCON port
    pub port: u16,
    /// RCON password
    pub password: String,
    /// Discord channel receiving this game's status/log lines, if any
    pub log_channel_id: Option<u64>,
    /// Auto-save cadence; `None` disables auto-save for this game
    pub save_interval: Option<Duration>,
}

/// Role and channel policy every administrative command is checked against.
#[derive(Debug, Clone, Copy)]
pub struct AdminPolicy {
    /// Role required for administrative verbs
    pub admin_role_id: u64,
    /// The single channel administrative verbs are accepted in
    pub admin_channel_id: u64,
}

/// Configuration for the application, loaded once from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token
    pub discord_token: String,
    /// Chat command prefix (defaults to `!`)
    pub command_prefix: String,
    /// Admin role/channel policy
    pub policy: AdminPolicy,
    /// Path to the persistent ban-list file
    pub ban_store_path: String,
    /// Enabled game servers, in stable game order
    pub servers: Vec<GameServerConfig>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This will attempt to load a .env file if present using dotenv,
    /// then read required environment variables. A game is enabled by the
    /// presence of its `<GAME>_RCON_ADDR` variable (e.g. `PAL_RCON_ADDR`);
    /// an enabled game additionally requires `<GAME>_RCON_PASSWORD`.
    ///
    /// # Errors
    ///
    /// Returns an error if any required environment variable is missing or invalid,
    /// or if no game server is configured at all.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (ignore errors - it's optional)
        dotenv::dotenv().ok();

        let discord_token = env::var("DISCORD_TOKEN").map_err(|_| {
            GamewardenError::Config(
                "Missing DISCORD_TOKEN environment variable. Set it in your environment or create a .env file (never commit this file).".to_string(),
            )
        })?;

        let command_prefix = env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string());
        if command_prefix.is_empty() {
            return Err(GamewardenError::Config(
                "COMMAND_PREFIX must not be empty".to_string(),
            ));
        }

        let admin_role_id = Self::require_id("ADMIN_ROLE_ID")?;
        let admin_channel_id = Self::require_id("ADMIN_CHANNEL_ID")?;

        let ban_store_path =
            env::var("BAN_STORE_PATH").unwrap_or_else(|_| "data/bans.json".to_string());

        let mut servers = Vec::new();
        for game in ALL_GAMES {
            if let Some(server) = Self::load_game(game)? {
                servers.push(server);
            }
        }

        if servers.is_empty() {
            return Err(GamewardenError::Config(
                "No game server configured. Set at least one of MC_RCON_ADDR, PAL_RCON_ADDR, ASA_RCON_ADDR.".to_string(),
            ));
        }

        Ok(Self {
            discord_token,
            command_prefix,
            policy: AdminPolicy {
                admin_role_id,
                admin_channel_id,
            },
            ban_store_path,
            servers,
        })
    }

    /// Load one game's settings, or `None` when the game is not enabled.
    fn load_game(game: Game) -> Result<Option<GameServerConfig>> {
        let key = game.key().to_uppercase();

        let address = match env::var(format!("{}_RCON_ADDR", key)) {
            Ok(addr) => addr,
            Err(_) => return Ok(None),
        };
        let (host, port) = Self::parse_rcon_addr(&key, &address)?;

        let password = env::var(format!("{}_RCON_PASSWORD", key)).map_err(|_| {
            GamewardenError::Config(format!(
                "{}_RCON_ADDR is set but {}_RCON_PASSWORD is missing",
                key, key
            ))
        })?;
        if password.is_empty() {
            return Err(GamewardenError::Config(format!(
                "{}_RCON_PASSWORD must not be empty",
                key
            )));
        }

        let log_channel_id = match env::var(format!("{}_LOG_CHANNEL_ID", key)) {
            Ok(raw) => Some(raw.parse::<u64>().map_err(|_| {
                GamewardenError::Config(format!(
                    "Invalid {}_LOG_CHANNEL_ID: '{}' is not a channel id",
                    key, raw
                ))
            })?),
            Err(_) => None,
        };

        let save_interval = match env::var(format!("{}_SAVE_INTERVAL_SECS", key)) {
            Ok(raw) => {
                let secs = raw.parse::<u64>().map_err(|_| {
                    GamewardenError::Config(format!(
                        "Invalid {}_SAVE_INTERVAL_SECS: '{}' is not a number of seconds",
                        key, raw
                    ))
                })?;
                if secs == 0 {
                    return Err(GamewardenError::Config(format!(
                        "{}_SAVE_INTERVAL_SECS must be greater than zero (unset it to disable auto-save)",
                        key
                    )));
                }
                Some(Duration::from_secs(secs))
            }
            Err(_) => None,
        };

        Ok(Some(GameServerConfig {
            game,
            host,
            port,
            password,
            log_channel_id,
            save_interval,
        }))
    }

    /// Read a mandatory Discord snowflake id from the environment.
    fn require_id(name: &str) -> Result<u64> {
        let raw = env::var(name).map_err(|_| {
            GamewardenError::Config(format!("Missing {} environment variable", name))
        })?;
        raw.parse::<u64>().map_err(|_| {
            GamewardenError::Config(format!("Invalid {}: '{}' is not a Discord id", name, raw))
        })
    }

    /// Split and validate a `host:port` RCON address.
    fn parse_rcon_addr(key: &str, address: &str) -> Result<(String, u16)> {
        let (host, port_str) = address.rsplit_once(':').ok_or_else(|| {
            GamewardenError::Config(format!(
                "Invalid {}_RCON_ADDR format: '{}'. Expected 'host:port' format.",
                key, address
            ))
        })?;

        if host.is_empty() {
            return Err(GamewardenError::Config(format!(
                "Invalid {}_RCON_ADDR: missing host in '{}'",
                key, address
            )));
        }

        let port = port_str.parse::<u16>().map_err(|_| {
            GamewardenError::Config(format!(
                "Invalid port in {}_RCON_ADDR: '{}'",
                key, port_str
            ))
        })?;

        Ok((host.to_string(), port))
    }

    /// Look up the configuration for one game, if enabled.
    pub fn server_for(&self, game: Game) -> Option<&GameServerConfig> {
        self.servers.iter().find(|s| s.game == game)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rcon_addr() {
        assert_eq!(
            Config::parse_rcon_addr("MC", "localhost:25575").unwrap(),
            ("localhost".to_string(), 25575)
        );
        assert_eq!(
            Config::parse_rcon_addr("PAL", "127.0.0.1:8211").unwrap(),
            ("127.0.0.1".to_string(), 8211)
        );

        assert!(Config::parse_rcon_addr("MC", "localhost").is_err());
        assert!(Config::parse_rcon_addr("MC", "localhost:abc").is_err());
        assert!(Config::parse_rcon_addr("MC", "localhost:99999").is_err());
        assert!(Config::parse_rcon_addr("MC", ":25575").is_err());
    }

    #[test]
    fn test_load_game_disabled_without_addr() {
        // No ASA_RCON_ADDR in the test environment, so ASA stays disabled
        std::env::remove_var("ASA_RCON_ADDR");
        let result = Config::load_game(Game::Asa).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_load_game_requires_password() {
        std::env::set_var("MC_RCON_ADDR", "localhost:25575");
        std::env::remove_var("MC_RCON_PASSWORD");

        let result = Config::load_game(Game::Mc);
        assert!(result.is_err());

        std::env::remove_var("MC_RCON_ADDR");
    }

    #[test]
    fn test_load_game_rejects_zero_save_interval() {
        std::env::set_var("PAL_RCON_ADDR", "localhost:25575");
        std::env::set_var("PAL_RCON_PASSWORD", "hunter2");
        std::env::set_var("PAL_SAVE_INTERVAL_SECS", "0");

        let result = Config::load_game(Game::Pal);
        assert!(result.is_err());

        std::env::set_var("PAL_SAVE_INTERVAL_SECS", "900");
        let server = Config::load_game(Game::Pal).unwrap().unwrap();
        assert_eq!(server.save_interval, Some(Duration::from_secs(900)));
        assert_eq!(server.port, 25575);

        std::env::remove_var("PAL_RCON_ADDR");
        std::env::remove_var("PAL_RCON_PASSWORD");
        std::env::remove_var("PAL_SAVE_INTERVAL_SECS");
    }

    #[test]
    fn test_require_id() {
        std::env::set_var("TEST_GW_ROLE_ID", "123456789012345678");
        assert_eq!(Config::require_id("TEST_GW_ROLE_ID").unwrap(), 123456789012345678);

        std::env::set_var("TEST_GW_ROLE_ID", "not-a-number");
        assert!(Config::require_id("TEST_GW_ROLE_ID").is_err());

        std::env::remove_var("TEST_GW_ROLE_ID");
        assert!(Config::require_id("TEST_GW_ROLE_ID").is_err());
    }
}

//! Supported game servers and their RCON command dialects.
//!
//! Every game speaks the same Source RCON framing but with its own command
//! vocabulary. This module keeps the vocabulary in one place so the rest of
//! the crate only ever deals in [`Game`] values and plain command strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A game server kind the bot can administer.
///
/// The variant order is the stable iteration order used everywhere a
/// "all configured games" listing is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Game {
    /// Minecraft (Java Edition)
    Mc,
    /// Palworld
    Pal,
    /// ARK: Survival Ascended
    Asa,
}

/// All games the bot knows about, in stable order.
pub const ALL_GAMES: [Game; 3] = [Game::Mc, Game::Pal, Game::Asa];

impl Game {
    /// Short identifier used in env var names and command suffixes.
    pub fn key(&self) -> &'static str {
        match self {
            Game::Mc => "mc",
            Game::Pal => "pal",
            Game::Asa => "asa",
        }
    }

    /// Human-readable name for replies and log lines.
    pub fn display_name(&self) -> &'static str {
        match self {
            Game::Mc => "Minecraft",
            Game::Pal => "Palworld",
            Game::Asa => "ARK: ASA",
        }
    }

    /// Parse a command suffix or argument into a game.
    pub fn from_key(key: &str) -> Option<Game> {
        match key {
            "mc" => Some(Game::Mc),
            "pal" => Some(Game::Pal),
            "asa" => Some(Game::Asa),
            _ => None,
        }
    }

    /// RCON command that forces a world save.
    pub fn save_command(&self) -> &'static str {
        match self {
            Game::Mc => "save-all",
            Game::Pal => "Save",
            Game::Asa => "SaveWorld",
        }
    }

    /// RCON command that lists online players.
    pub fn players_command(&self) -> &'static str {
        match self {
            Game::Mc => "list",
            Game::Pal => "ShowPlayers",
            Game::Asa => "ListPlayers",
        }
    }

    /// RCON command broadcasting a message to everyone in-game.
    ///
    /// Palworld's `Broadcast` truncates at the first space, so spaces are
    /// replaced with underscores there.
    pub fn broadcast_command(&self, message: &str) -> String {
        match self {
            Game::Mc => format!("say {}", message),
            Game::Pal => format!("Broadcast {}", message.replace(' ', "_")),
            Game::Asa => format!("ServerChat {}", message),
        }
    }

    /// RCON command kicking one player.
    pub fn kick_command(&self, player: &str) -> String {
        match self {
            Game::Mc => format!("kick {}", player),
            Game::Pal | Game::Asa => format!("KickPlayer {}", player),
        }
    }

    /// RCON command for the server's own ban list, if the game has one the
    /// bot trusts. Palworld returns `None`: its native ban list does not
    /// survive restarts reliably, so the bot's own store is authoritative
    /// and a ban is enforced as kick-on-sight.
    pub fn native_ban_command(&self, player: &str) -> Option<String> {
        match self {
            Game::Mc => Some(format!("ban {}", player)),
            Game::Pal => None,
            Game::Asa => Some(format!("BanPlayer {}", player)),
        }
    }

    /// RCON command reversing a native ban. `None` for Palworld, same as
    /// [`Game::native_ban_command`].
    pub fn native_unban_command(&self, player: &str) -> Option<String> {
        match self {
            Game::Mc => Some(format!("pardon {}", player)),
            Game::Pal => None,
            Game::Asa => Some(format!("UnbanPlayer {}", player)),
        }
    }

    /// Whether bans for this game live in the bot's persistent store.
    pub fn uses_ban_store(&self) -> bool {
        matches!(self, Game::Pal)
    }

    /// RCON whitelist commands. Only Minecraft exposes a whitelist.
    pub fn whitelist_command(&self, player: &str, add: bool) -> Option<String> {
        match self {
            Game::Mc => Some(format!(
                "whitelist {} {}",
                if add { "add" } else { "remove" },
                player
            )),
            _ => None,
        }
    }

    /// RCON command for a graceful server exit.
    pub fn shutdown_command(&self) -> &'static str {
        match self {
            Game::Mc => "stop",
            Game::Pal | Game::Asa => "DoExit",
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One row of a Palworld `ShowPlayers` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerEntry {
    pub name: String,
    pub player_uid: String,
    pub steam_id: String,
}

/// Parse a Palworld `ShowPlayers` response.
///
/// The server answers with a CSV header line (`Name,PlayerUID,SteamID`)
/// followed by one line per player. Short or malformed lines are skipped.
pub fn parse_pal_players(response: &str) -> Vec<PlayerEntry> {
    let mut players = Vec::new();
    for line in response.lines().skip(1) {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() >= 3 && !parts[0].is_empty() && !parts[0].eq_ignore_ascii_case("name") {
            players.push(PlayerEntry {
                name: parts[0].to_string(),
                player_uid: parts[1].to_string(),
                steam_id: parts[2].to_string(),
            });
        }
    }
    players
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_roundtrip() {
        for game in ALL_GAMES {
            assert_eq!(Game::from_key(game.key()), Some(game));
        }
        assert_eq!(Game::from_key("quake"), None);
    }

    #[test]
    fn test_broadcast_dialects() {
        assert_eq!(
            Game::Mc.broadcast_command("restart soon"),
            "say restart soon"
        );
        // Palworld eats everything past the first space
        assert_eq!(
            Game::Pal.broadcast_command("restart soon"),
            "Broadcast restart_soon"
        );
        assert_eq!(
            Game::Asa.broadcast_command("restart soon"),
            "ServerChat restart soon"
        );
    }

    #[test]
    fn test_ban_dialects() {
        assert_eq!(
            Game::Mc.native_ban_command("Steve").as_deref(),
            Some("ban Steve")
        );
        assert_eq!(Game::Pal.native_ban_command("76561198000000000"), None);
        assert!(Game::Pal.uses_ban_store());
        assert!(!Game::Mc.uses_ban_store());
        assert_eq!(
            Game::Asa.native_unban_command("76561198000000000").as_deref(),
            Some("UnbanPlayer 76561198000000000")
        );
    }

    #[test]
    fn test_whitelist_only_minecraft() {
        assert_eq!(
            Game::Mc.whitelist_command("Steve", true).as_deref(),
            Some("whitelist add Steve")
        );
        assert_eq!(
            Game::Mc.whitelist_command("Steve", false).as_deref(),
            Some("whitelist remove Steve")
        );
        assert_eq!(Game::Pal.whitelist_command("Steve", true), None);
        assert_eq!(Game::Asa.whitelist_command("Steve", true), None);
    }

    #[test]
    fn test_parse_pal_players() {
        let response = "Name,PlayerUID,SteamID\nAlice,12345,76561198000000001\nBob,67890,76561198000000002";
        let players = parse_pal_players(response);
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].name, "Alice");
        assert_eq!(players[0].steam_id, "76561198000000001");
        assert_eq!(players[1].name, "Bob");
    }

    #[test]
    fn test_parse_pal_players_empty_and_malformed() {
        assert!(parse_pal_players("Name,PlayerUID,SteamID").is_empty());
        assert!(parse_pal_players("").is_empty());
        // Lines with too few columns are skipped
        let players = parse_pal_players("Name,PlayerUID,SteamID\nbroken line\nAlice,1,2");
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].name, "Alice");
    }
}

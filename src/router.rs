//! Command routing and policy enforcement.
//!
//! Every incoming chat command passes through [`CommandRouter::handle`]:
//! verb lookup in a closed table built at startup, the role/channel policy
//! check, then dispatch to the session or ban store. No other code path
//! talks to a session on behalf of a user.

use crate::bans::PersistentBanStore;
use crate::config::AdminPolicy;
use crate::error::{GamewardenError, Result};
use crate::game::{parse_pal_players, Game};
use crate::rcon::GameSession;
use crate::registry::ServerRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One incoming chat command, as seen by the router. Never persisted.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub user_id: u64,
    /// Display name used for ban attribution
    pub user_name: String,
    pub channel_id: u64,
    /// Whether the invoking member holds the configured admin role
    pub has_admin_role: bool,
    /// Message content with the command prefix already stripped
    pub content: String,
}

/// Closed set of operations the bot can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Help,
    Status,
    Players,
    Save,
    Broadcast,
    Raw,
    Kick,
    Ban,
    Unban,
    ListBans,
    WhitelistAdd,
    WhitelistRemove,
    Shutdown,
}

impl Verb {
    /// Informational verbs are allowed in any channel by anyone; everything
    /// mutating requires the admin role and the admin channel.
    fn is_administrative(&self) -> bool {
        !matches!(self, Verb::Help | Verb::Status | Verb::Players)
    }

    /// Verb stems that take a `_<game>` suffix, used both to build the
    /// table and to recognize a known verb aimed at an unconfigured game.
    const SUFFIXED: [(&'static str, Verb); 12] = [
        ("status", Verb::Status),
        ("players", Verb::Players),
        ("save", Verb::Save),
        ("broadcast", Verb::Broadcast),
        ("cmd", Verb::Raw),
        ("kick", Verb::Kick),
        ("ban", Verb::Ban),
        ("unban", Verb::Unban),
        ("list_bans", Verb::ListBans),
        ("whitelist_add", Verb::WhitelistAdd),
        ("whitelist_remove", Verb::WhitelistRemove),
        ("shutdown", Verb::Shutdown),
    ];
}

/// Routes policy-checked commands to sessions and the ban store.
pub struct CommandRouter<S> {
    registry: Arc<ServerRegistry<S>>,
    bans: Arc<PersistentBanStore>,
    policy: AdminPolicy,
    /// verb word -> (operation, target game; `None` targets all games)
    table: HashMap<String, (Verb, Option<Game>)>,
}

impl<S: GameSession> CommandRouter<S> {
    /// Build the router and its verb table for the configured game set.
    pub fn new(
        registry: Arc<ServerRegistry<S>>,
        bans: Arc<PersistentBanStore>,
        policy: AdminPolicy,
    ) -> Self {
        let mut table = HashMap::new();
        table.insert("help".to_string(), (Verb::Help, None));
        table.insert("status".to_string(), (Verb::Status, None));
        table.insert("players".to_string(), (Verb::Players, None));

        for game in registry.games() {
            for (stem, verb) in Verb::SUFFIXED {
                let available = match verb {
                    Verb::ListBans => game.uses_ban_store(),
                    Verb::WhitelistAdd | Verb::WhitelistRemove => {
                        game.whitelist_command("x", true).is_some()
                    }
                    _ => true,
                };
                if available {
                    table.insert(format!("{}_{}", stem, game.key()), (verb, Some(game)));
                }
            }
        }

        Self {
            registry,
            bans,
            policy,
            table,
        }
    }

    /// Handle one invocation. Returns `None` for unknown verbs (silently
    /// ignored, consistently); every known verb produces a reply.
    pub async fn handle(&self, invocation: &CommandInvocation) -> Option<String> {
        let mut parts = invocation.content.split_whitespace();
        let verb_word = parts.next()?.to_lowercase();
        let args: Vec<&str> = parts.collect();

        let Some(&(verb, game)) = self.table.get(&verb_word) else {
            // A known verb aimed at an unknown or unconfigured game still
            // deserves an answer; pure gibberish stays silent.
            return self.unknown_game_reply(&verb_word);
        };

        if verb.is_administrative() {
            if !invocation.has_admin_role {
                return Some(render(Err(GamewardenError::PermissionDenied(
                    "this command requires the admin role".to_string(),
                ))));
            }
            if invocation.channel_id != self.policy.admin_channel_id {
                return Some(render(Err(GamewardenError::WrongChannel(format!(
                    "use the admin channel <#{}>",
                    self.policy.admin_channel_id
                )))));
            }
        }

        Some(self.dispatch(verb, game, &args, invocation).await)
    }

    /// Reply for `<known verb>_<bad game>`; `None` when the word does not
    /// look like one of our verbs at all.
    fn unknown_game_reply(&self, verb_word: &str) -> Option<String> {
        let (stem, suffix) = verb_word.rsplit_once('_')?;
        Verb::SUFFIXED.iter().find(|(s, _)| *s == stem)?;
        match Game::from_key(suffix) {
            Some(game) => Some(format!(
                "❌ Unknown game: {} ({}) is not configured on this bot.",
                suffix,
                game.display_name()
            )),
            None => Some(format!(
                "❌ Unknown game: '{}'. Configured games: {}.",
                suffix,
                self.registry
                    .games()
                    .map(|g| g.key())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }

    async fn dispatch(
        &self,
        verb: Verb,
        game: Option<Game>,
        args: &[&str],
        invocation: &CommandInvocation,
    ) -> String {
        match verb {
            Verb::Help => self.help_text(),
            Verb::Status => self.status(game).await,
            Verb::Players => self.players(game).await,
            Verb::Save => match game {
                Some(game) => render(self.save(game).await),
                None => usage("save_<game>"),
            },
            Verb::Broadcast => match (game, args.is_empty()) {
                (Some(game), false) => render(self.broadcast(game, &args.join(" ")).await),
                _ => usage("broadcast_<game> <message>"),
            },
            Verb::Raw => match (game, args.is_empty()) {
                (Some(game), false) => render(self.raw(game, &args.join(" ")).await),
                _ => usage("cmd_<game> <command>"),
            },
            Verb::Kick => match (game, args.first()) {
                (Some(game), Some(player)) => render(self.kick(game, player).await),
                _ => usage("kick_<game> <player>"),
            },
            Verb::Ban => match (game, args.first()) {
                (Some(game), Some(player)) => {
                    self.ban(game, player, &invocation.user_name).await
                }
                _ => usage("ban_<game> <player>"),
            },
            Verb::Unban => match (game, args.first()) {
                (Some(game), Some(player)) => render(self.unban(game, player).await),
                _ => usage("unban_<game> <player>"),
            },
            Verb::ListBans => match game {
                Some(game) => self.list_bans(game).await,
                None => usage("list_bans_<game>"),
            },
            Verb::WhitelistAdd => match (game, args.first()) {
                (Some(game), Some(player)) => render(self.whitelist(game, player, true).await),
                _ => usage("whitelist_add_<game> <player>"),
            },
            Verb::WhitelistRemove => match (game, args.first()) {
                (Some(game), Some(player)) => render(self.whitelist(game, player, false).await),
                _ => usage("whitelist_remove_<game> <player>"),
            },
            Verb::Shutdown => match game {
                Some(game) => render(self.shutdown(game, args).await),
                None => usage("shutdown_<game> [delay_secs] [message]"),
            },
        }
    }

    fn session(&self, game: Game) -> Result<&Arc<S>> {
        self.registry.session_for(game).ok_or_else(|| {
            GamewardenError::UnknownGame(format!(
                "{} is not configured",
                game.display_name()
            ))
        })
    }

    async fn status(&self, target: Option<Game>) -> String {
        let mut lines = Vec::new();
        for game in self.registry.games() {
            if target.is_some_and(|t| t != game) {
                continue;
            }
            let line = match self.session(game) {
                Ok(session) => match session.execute(game.players_command()).await {
                    Ok(response) => {
                        format!("✅ **{}**: online\n{}", game, response.trim())
                    }
                    Err(e) => format!("❌ **{}**: offline ({})", game, e),
                },
                Err(e) => format!("❌ **{}**: {}", game, e),
            };
            lines.push(line);
        }
        lines.join("\n")
    }

    async fn players(&self, target: Option<Game>) -> String {
        let mut lines = Vec::new();
        for game in self.registry.games() {
            if target.is_some_and(|t| t != game) {
                continue;
            }
            let line = match self.session(game) {
                Ok(session) => match session.execute(game.players_command()).await {
                    Ok(response) if game == Game::Pal => {
                        let players = parse_pal_players(&response);
                        if players.is_empty() {
                            format!("**{}**: no players online.", game)
                        } else {
                            let mut out =
                                format!("**{}** ({} online, use the ID for kick/ban):", game, players.len());
                            for p in players {
                                out.push_str(&format!("\n• **{}** (ID: `{}`)", p.name, p.steam_id));
                            }
                            out
                        }
                    }
                    Ok(response) => format!("**{}**:\n{}", game, response.trim()),
                    Err(e) => format!("❌ **{}**: {}", game, e),
                },
                Err(e) => format!("❌ **{}**: {}", game, e),
            };
            lines.push(line);
        }
        lines.join("\n")
    }

    async fn save(&self, game: Game) -> Result<String> {
        let response = self.session(game)?.execute(game.save_command()).await?;
        Ok(format!(
            "✅ {} world save triggered. Server says: `{}`",
            game,
            non_empty(&response)
        ))
    }

    async fn broadcast(&self, game: Game, message: &str) -> Result<String> {
        self.session(game)?
            .execute(&game.broadcast_command(message))
            .await?;
        Ok(format!("✅ Broadcast sent to {}: `{}`", game, message))
    }

    async fn raw(&self, game: Game, command: &str) -> Result<String> {
        let response = self.session(game)?.execute(command).await?;
        Ok(format!("**{}** replied:\n`{}`", game, non_empty(&response)))
    }

    async fn kick(&self, game: Game, player: &str) -> Result<String> {
        let response = self
            .session(game)?
            .execute(&game.kick_command(player))
            .await?;
        Ok(format!(
            "✅ Kick sent for `{}` on {}. Server says: `{}`",
            player,
            game,
            non_empty(&response)
        ))
    }

    /// Ban a player. For ban-store games the store write is authoritative:
    /// it happens first, and a failed remote kick is reported but never
    /// rolls it back. Other games use the server's native ban command.
    async fn ban(&self, game: Game, player: &str, admin: &str) -> String {
        if game.uses_ban_store() {
            if let Err(e) = self.bans.add(game, player, admin).await {
                return format!("❌ {}", e);
            }
            match self.remote_kick(game, player).await {
                Ok(()) => format!(
                    "✅ `{}` banned on {} (recorded in the ban list and kicked).",
                    player, game
                ),
                Err(e) => {
                    log::warn!("[{}] ban recorded but kick failed: {}", game.key(), e);
                    format!(
                        "⚠️ `{}` is banned on {} (recorded in the ban list), but the kick failed: {}. They will be re-kicked if seen online.",
                        player, game, e
                    )
                }
            }
        } else {
            render(self.native_ban(game, player).await)
        }
    }

    async fn remote_kick(&self, game: Game, player: &str) -> Result<()> {
        self.session(game)?
            .execute(&game.kick_command(player))
            .await?;
        Ok(())
    }

    async fn native_ban(&self, game: Game, player: &str) -> Result<String> {
        // Table construction guarantees suffixed ban verbs only exist for
        // games with some ban mechanism, so the fallback is defensive only.
        let command = game
            .native_ban_command(player)
            .unwrap_or_else(|| game.kick_command(player));
        let response = self.session(game)?.execute(&command).await?;
        Ok(format!(
            "✅ Ban sent for `{}` on {}. Server says: `{}`",
            player,
            game,
            non_empty(&response)
        ))
    }

    async fn unban(&self, game: Game, player: &str) -> Result<String> {
        if game.uses_ban_store() {
            let removed = self.bans.remove(game, player).await?;
            if removed {
                Ok(format!("✅ `{}` unbanned on {}.", player, game))
            } else {
                Ok(format!("ℹ️ `{}` was not banned on {}.", player, game))
            }
        } else {
            let command = game
                .native_unban_command(player)
                .unwrap_or_else(|| format!("pardon {}", player));
            let response = self.session(game)?.execute(&command).await?;
            Ok(format!(
                "✅ Unban sent for `{}` on {}. Server says: `{}`",
                player,
                game,
                non_empty(&response)
            ))
        }
    }

    async fn list_bans(&self, game: Game) -> String {
        let bans = self.bans.list(game).await;
        if bans.is_empty() {
            return format!("No bans recorded for {}.", game);
        }
        let mut out = format!("**{} ban list** ({}):", game, bans.len());
        for ban in bans {
            out.push_str(&format!(
                "\n• `{}` — banned by {} at <t:{}>",
                ban.player_id, ban.banned_by, ban.banned_at
            ));
        }
        out
    }

    async fn whitelist(&self, game: Game, player: &str, add: bool) -> Result<String> {
        let command = game.whitelist_command(player, add).ok_or_else(|| {
            GamewardenError::Command(format!(
                "{} has no whitelist",
                game.display_name()
            ))
        })?;
        let response = self.session(game)?.execute(&command).await?;
        Ok(format!(
            "✅ Whitelist updated on {}. Server says: `{}`",
            game,
            non_empty(&response)
        ))
    }

    /// Broadcast a warning, wait out the delay, then send the graceful
    /// exit command.
    async fn shutdown(&self, game: Game, args: &[&str]) -> Result<String> {
        let (delay_secs, message) = match args.split_first() {
            Some((first, rest)) => match first.parse::<u64>() {
                Ok(secs) => (secs.min(600), rest.join(" ")),
                Err(_) => (10, args.join(" ")),
            },
            None => (10, String::new()),
        };
        let message = if message.is_empty() {
            "Server is shutting down for maintenance!".to_string()
        } else {
            message
        };

        let session = self.session(game)?;
        let warning = format!(
            "Server shutting down in {} seconds! Please disconnect. Reason: {}",
            delay_secs, message
        );
        if let Err(e) = session.execute(&game.broadcast_command(&warning)).await {
            log::warn!(
                "[{}] shutdown warning broadcast failed, proceeding: {}",
                game.key(),
                e
            );
        }

        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        session.execute(game.shutdown_command()).await?;
        Ok(format!(
            "✅ Shutdown command sent to {}. The server should now be exiting.",
            game
        ))
    }

    fn help_text(&self) -> String {
        let mut out = String::from(
            "**Gamewarden commands** (👑 = admin role + admin channel)\n\
             `status` / `players` — all configured games\n",
        );
        for game in self.registry.games() {
            let key = game.key();
            out.push_str(&format!(
                "\n**{}**: `status_{key}`, `players_{key}`, 👑 `save_{key}`, 👑 `broadcast_{key} <msg>`, 👑 `cmd_{key} <raw>`, 👑 `kick_{key} <id>`, 👑 `ban_{key} <id>`, 👑 `unban_{key} <id>`, 👑 `shutdown_{key} [delay] [msg]`",
                game
            ));
            if game.uses_ban_store() {
                out.push_str(&format!(", 👑 `list_bans_{key}`"));
            }
            if game.whitelist_command("x", true).is_some() {
                out.push_str(&format!(
                    ", 👑 `whitelist_add_{key} <name>`, 👑 `whitelist_remove_{key} <name>`"
                ));
            }
        }
        out
    }
}

fn render(result: Result<String>) -> String {
    match result {
        Ok(reply) => reply,
        Err(e) => format!("❌ {}", e),
    }
}

fn usage(pattern: &str) -> String {
    format!("Usage: `{}`", pattern)
}

fn non_empty(response: &str) -> &str {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        "(no response)"
    } else {
        trimmed
    }
}

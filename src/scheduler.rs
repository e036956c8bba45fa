//! Background timers: auto-save, ban enforcement, player join/leave watch.
//!
//! Each enabled action runs as its own tokio task on an independent
//! interval, so a slow or dead server never stalls another game's timers.
//! Ticks that target a session already busy with a user command simply
//! queue behind it on the session mutex. Missed ticks are skipped, never
//! made up, and a failed tick waits for its next scheduled fire instead of
//! retrying.

use crate::bans::PersistentBanStore;
use crate::game::{parse_pal_players, Game};
use crate::rcon::GameSession;
use crate::registry::ServerRegistry;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Duration, Instant, MissedTickBehavior};

/// Upper bound on one scheduler tick, covering the FIFO wait for a busy
/// session plus the command itself. The in-flight command keeps its own
/// transport deadline and is not aborted when the tick gives up on it.
const TICK_TIMEOUT: Duration = Duration::from_secs(30);
/// Cadence of the player watch (join/leave diff + banned-player kicks).
const WATCH_INTERVAL: Duration = Duration::from_secs(30);

/// Destination for scheduler status lines. The production implementation
/// posts to a Discord channel; tests collect the lines.
pub trait ChannelSink: Send + Sync + 'static {
    fn emit(&self, channel_id: u64, text: String) -> impl Future<Output = ()> + Send;
}

/// Spawns and owns the per-game background tasks.
pub struct Scheduler<S, K> {
    registry: Arc<ServerRegistry<S>>,
    bans: Arc<PersistentBanStore>,
    sink: Arc<K>,
}

impl<S: GameSession, K: ChannelSink> Scheduler<S, K> {
    pub fn new(
        registry: Arc<ServerRegistry<S>>,
        bans: Arc<PersistentBanStore>,
        sink: Arc<K>,
    ) -> Self {
        Self {
            registry,
            bans,
            sink,
        }
    }

    /// Spawn every configured background task and return their handles.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for (config, session) in self.registry.iter() {
            let game = config.game;
            let log_channel = config.log_channel_id;

            if let Some(period) = config.save_interval {
                log::info!(
                    "[{}] auto-save every {}s",
                    game.key(),
                    period.as_secs()
                );
                handles.push(tokio::spawn(auto_save_loop(
                    game,
                    session.clone(),
                    period,
                    log_channel,
                    self.sink.clone(),
                )));
            }

            // The watch needs a parseable player listing, which only the
            // Palworld dialect provides.
            if game == Game::Pal {
                handles.push(tokio::spawn(player_watch_loop(
                    game,
                    session.clone(),
                    self.bans.clone(),
                    log_channel,
                    self.sink.clone(),
                )));
            }
        }

        handles
    }
}

async fn auto_save_loop<S: GameSession, K: ChannelSink>(
    game: Game,
    session: Arc<S>,
    period: Duration,
    log_channel: Option<u64>,
    sink: Arc<K>,
) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick of a tokio interval fires immediately; consume it so
    // the first save lands one full period after startup.
    timer.tick().await;
    loop {
        timer.tick().await;
        run_save_tick(game, session.as_ref(), log_channel, sink.as_ref()).await;
    }
}

/// One auto-save attempt. The outcome is posted to the game's log channel
/// and the process log, success or not; the next attempt is the next tick.
async fn run_save_tick<S: GameSession, K: ChannelSink>(
    game: Game,
    session: &S,
    log_channel: Option<u64>,
    sink: &K,
) {
    let started = Instant::now();
    let outcome = timeout(TICK_TIMEOUT, session.execute(game.save_command())).await;
    let elapsed_ms = started.elapsed().as_millis();

    let line = match outcome {
        Ok(Ok(_)) => {
            log::info!("[{}] auto-save completed in {}ms", game.key(), elapsed_ms);
            format!("💾 {} auto-save completed in {}ms.", game, elapsed_ms)
        }
        Ok(Err(e)) => {
            log::warn!("[{}] auto-save failed: {}", game.key(), e);
            format!("⚠️ {} auto-save failed: {}", game, e)
        }
        Err(_) => {
            log::warn!(
                "[{}] auto-save tick timed out after {}s",
                game.key(),
                TICK_TIMEOUT.as_secs()
            );
            format!(
                "⚠️ {} auto-save timed out after {}s.",
                game,
                TICK_TIMEOUT.as_secs()
            )
        }
    };
    post(sink, log_channel, line).await;
}

async fn player_watch_loop<S: GameSession, K: ChannelSink>(
    game: Game,
    session: Arc<S>,
    bans: Arc<PersistentBanStore>,
    log_channel: Option<u64>,
    sink: Arc<K>,
) {
    let mut timer = interval(WATCH_INTERVAL);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut known: Option<HashSet<String>> = None;
    loop {
        timer.tick().await;
        known = run_watch_tick(
            game,
            session.as_ref(),
            bans.as_ref(),
            log_channel,
            sink.as_ref(),
            known,
        )
        .await;
    }
}

/// One player-watch pass: list players, kick anyone on the ban list
/// (the store, not the server, is authoritative), then post join/leave
/// lines against the previous snapshot. The first successful pass only
/// initializes the snapshot. A failed poll keeps the old snapshot so a
/// transient outage does not fake a mass leave/join.
async fn run_watch_tick<S: GameSession, K: ChannelSink>(
    game: Game,
    session: &S,
    bans: &PersistentBanStore,
    log_channel: Option<u64>,
    sink: &K,
    known: Option<HashSet<String>>,
) -> Option<HashSet<String>> {
    let response = match timeout(TICK_TIMEOUT, session.execute(game.players_command())).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            log::warn!("[{}] player watch skipped: {}", game.key(), e);
            return known;
        }
        Err(_) => {
            log::warn!("[{}] player watch timed out", game.key());
            return known;
        }
    };

    let players = parse_pal_players(&response);

    for player in &players {
        let banned = bans.contains(game, &player.steam_id).await
            || bans.contains(game, &player.name).await;
        if banned {
            match session.execute(&game.kick_command(&player.steam_id)).await {
                Ok(_) => {
                    log::info!(
                        "[{}] re-kicked banned player {} ({})",
                        game.key(),
                        player.name,
                        player.steam_id
                    );
                    post(
                        sink,
                        log_channel,
                        format!(
                            "⛔ Re-kicked banned player **{}** (`{}`).",
                            player.name, player.steam_id
                        ),
                    )
                    .await;
                }
                Err(e) => {
                    log::warn!(
                        "[{}] failed to kick banned player {}: {}",
                        game.key(),
                        player.steam_id,
                        e
                    );
                }
            }
        }
    }

    let current: HashSet<String> = players.into_iter().map(|p| p.name).collect();
    let Some(previous) = known else {
        log::info!(
            "[{}] player watch initialized with {} players",
            game.key(),
            current.len()
        );
        return Some(current);
    };

    for name in current.difference(&previous) {
        post(
            sink,
            log_channel,
            format!("🟢 **{}** joined the {} server.", name, game),
        )
        .await;
    }
    for name in previous.difference(&current) {
        post(
            sink,
            log_channel,
            format!("🔴 **{}** left the {} server.", name, game),
        )
        .await;
    }

    Some(current)
}

async fn post<K: ChannelSink>(sink: &K, channel: Option<u64>, text: String) {
    if let Some(channel_id) = channel {
        sink.emit(channel_id, text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GamewardenError, Result};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Session double fed a queue of scripted responses; `Err` entries
    /// become command failures. Records every command it receives.
    struct ScriptedSession {
        script: Mutex<VecDeque<std::result::Result<String, String>>>,
        commands: Mutex<Vec<String>>,
    }

    impl ScriptedSession {
        fn new(script: Vec<std::result::Result<String, String>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                commands: Mutex::new(Vec::new()),
            })
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    impl GameSession for ScriptedSession {
        fn execute(&self, command: &str) -> impl Future<Output = Result<String>> + Send {
            self.commands.lock().unwrap().push(command.to_string());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("ok".to_string()));
            async move { next.map_err(GamewardenError::Command) }
        }

        fn is_online(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        lines: Mutex<Vec<(u64, String)>>,
    }

    impl CollectingSink {
        fn lines(&self) -> Vec<(u64, String)> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl ChannelSink for CollectingSink {
        fn emit(&self, channel_id: u64, text: String) -> impl Future<Output = ()> + Send {
            self.lines.lock().unwrap().push((channel_id, text));
            async {}
        }
    }

    async fn open_bans(temp_dir: &TempDir) -> Arc<PersistentBanStore> {
        Arc::new(
            PersistentBanStore::open(temp_dir.path().join("bans.json"))
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_save_tick_posts_success_with_elapsed() {
        let session = ScriptedSession::new(vec![Ok("Saved!".to_string())]);
        let sink = CollectingSink::default();

        run_save_tick(Game::Pal, session.as_ref(), Some(7), &sink).await;

        assert_eq!(session.commands(), vec!["Save"]);
        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, 7);
        assert!(lines[0].1.contains("auto-save completed"));
        assert!(lines[0].1.contains("ms"));
    }

    #[tokio::test]
    async fn test_save_tick_posts_failure_without_retry() {
        let session = ScriptedSession::new(vec![Err("unreachable".to_string())]);
        let sink = CollectingSink::default();

        run_save_tick(Game::Mc, session.as_ref(), Some(7), &sink).await;

        // One attempt only; the failure is reported, not retried
        assert_eq!(session.commands(), vec!["save-all"]);
        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].1.contains("auto-save failed"));
    }

    #[tokio::test]
    async fn test_save_tick_without_log_channel_stays_quiet() {
        let session = ScriptedSession::new(vec![Ok(String::new())]);
        let sink = CollectingSink::default();

        run_save_tick(Game::Pal, session.as_ref(), None, &sink).await;
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_watch_tick_initializes_then_diffs() {
        let listing_ab = "Name,PlayerUID,SteamID\nAlice,1,111\nBob,2,222".to_string();
        let listing_bc = "Name,PlayerUID,SteamID\nBob,2,222\nCarol,3,333".to_string();
        let session = ScriptedSession::new(vec![Ok(listing_ab), Ok(listing_bc)]);
        let sink = CollectingSink::default();
        let temp_dir = TempDir::new().unwrap();
        let bans = open_bans(&temp_dir).await;

        let known =
            run_watch_tick(Game::Pal, session.as_ref(), &bans, Some(9), &sink, None).await;
        // First pass only initializes the snapshot
        assert!(sink.lines().is_empty());
        assert_eq!(known.as_ref().map(HashSet::len), Some(2));

        run_watch_tick(Game::Pal, session.as_ref(), &bans, Some(9), &sink, known).await;
        let texts: Vec<String> = sink.lines().into_iter().map(|(_, t)| t).collect();
        assert!(texts.iter().any(|t| t.contains("Carol") && t.contains("joined")));
        assert!(texts.iter().any(|t| t.contains("Alice") && t.contains("left")));
        assert!(!texts.iter().any(|t| t.contains("Bob")));
    }

    #[tokio::test]
    async fn test_watch_tick_rekicks_banned_players() {
        let listing = "Name,PlayerUID,SteamID\nGriefer,1,76561198000000000".to_string();
        let session = ScriptedSession::new(vec![Ok(listing), Ok("kicked".to_string())]);
        let sink = CollectingSink::default();
        let temp_dir = TempDir::new().unwrap();
        let bans = open_bans(&temp_dir).await;
        bans.add(Game::Pal, "76561198000000000", "ops").await.unwrap();

        run_watch_tick(Game::Pal, session.as_ref(), &bans, Some(9), &sink, None).await;

        let commands = session.commands();
        assert_eq!(commands[0], "ShowPlayers");
        assert!(commands.contains(&"KickPlayer 76561198000000000".to_string()));
        assert!(sink
            .lines()
            .iter()
            .any(|(_, t)| t.contains("Re-kicked banned player")));
    }

    #[tokio::test]
    async fn test_watch_tick_keeps_snapshot_on_poll_failure() {
        let session = ScriptedSession::new(vec![Err("down".to_string())]);
        let sink = CollectingSink::default();
        let temp_dir = TempDir::new().unwrap();
        let bans = open_bans(&temp_dir).await;

        let previous: HashSet<String> = ["Alice".to_string()].into_iter().collect();
        let known = run_watch_tick(
            Game::Pal,
            session.as_ref(),
            &bans,
            Some(9),
            &sink,
            Some(previous.clone()),
        )
        .await;

        // No fake mass-leave: the old snapshot survives the outage
        assert_eq!(known, Some(previous));
        assert!(sink.lines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_save_fires_once_per_interval_without_catchup() {
        let session = ScriptedSession::new(Vec::new());
        let sink = Arc::new(CollectingSink::default());
        let period = Duration::from_secs(60);

        let handle = tokio::spawn(auto_save_loop(
            Game::Pal,
            session.clone(),
            period,
            None,
            sink,
        ));
        // Let the loop swallow the immediate first tick and park
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(session.commands().len(), 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(session.commands().len(), 1);

        // A long stall yields a single fire, not a burst of catch-up saves
        tokio::time::advance(Duration::from_secs(200)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(session.commands().len(), 2);

        handle.abort();
    }
}

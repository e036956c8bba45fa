//! Persistent ban storage.
//!
//! For games whose native ban list cannot be trusted across restarts
//! (Palworld), the bot keeps its own durable record of banned players.
//! The store is a pretty-printed JSON file so an operator can read or
//! repair it by hand, and every write goes through a write-temp-then-rename
//! so a crash can never leave a half-written list behind.

use crate::error::{GamewardenError, Result};
use crate::game::Game;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// One banned player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    /// Game the ban applies to
    pub game: Game,
    /// Steam ID or player name, depending on the game
    pub player_id: String,
    /// Unix timestamp (seconds) of the most recent ban command
    pub banned_at: u64,
    /// Admin who issued the most recent ban command
    pub banned_by: String,
}

/// Durable set of [`BanRecord`]s, unique per (game, player id).
///
/// All mutation happens under a single writer lock; the in-memory list and
/// the on-disk file only change together.
pub struct PersistentBanStore {
    path: PathBuf,
    records: Mutex<Vec<BanRecord>>,
}

impl PersistentBanStore {
    /// Open the store at `path`, loading any existing records.
    ///
    /// A missing file is an empty store; the parent directory is created
    /// if needed. A file that exists but cannot be parsed is an error, so
    /// a corrupt list is never silently discarded.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    GamewardenError::Storage(format!(
                        "Failed to create ban store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let records = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                GamewardenError::Storage(format!(
                    "Ban store {} is not valid JSON: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(GamewardenError::Storage(format!(
                    "Failed to read ban store {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Record a ban. Re-banning an already banned player updates the
    /// timestamp and issuing admin instead of duplicating the record.
    /// The file is rewritten before the in-memory list changes, so a
    /// failed write leaves the store exactly as it was and a success
    /// reply to the admin always means the ban survived.
    pub async fn add(&self, game: Game, player_id: &str, admin: &str) -> Result<BanRecord> {
        let mut records = self.records.lock().await;

        let record = BanRecord {
            game,
            player_id: player_id.to_string(),
            banned_at: unix_now(),
            banned_by: admin.to_string(),
        };

        let mut updated = records.clone();
        match updated
            .iter_mut()
            .find(|r| r.game == game && r.player_id == player_id)
        {
            Some(existing) => *existing = record.clone(),
            None => updated.push(record.clone()),
        }

        persist(&self.path, &updated).await?;
        *records = updated;
        Ok(record)
    }

    /// Remove a ban. Removing an absent player is a no-op, not an error.
    /// Returns whether a record was actually removed. As with
    /// [`PersistentBanStore::add`], the removal is only committed to
    /// memory once the file rewrite succeeded.
    pub async fn remove(&self, game: Game, player_id: &str) -> Result<bool> {
        let mut records = self.records.lock().await;

        let mut updated = records.clone();
        let before = updated.len();
        updated.retain(|r| !(r.game == game && r.player_id == player_id));
        if updated.len() == before {
            return Ok(false);
        }

        persist(&self.path, &updated).await?;
        *records = updated;
        Ok(true)
    }

    /// All bans for one game, oldest first.
    pub async fn list(&self, game: Game) -> Vec<BanRecord> {
        let records = self.records.lock().await;
        let mut bans: Vec<BanRecord> = records.iter().filter(|r| r.game == game).cloned().collect();
        bans.sort_by_key(|r| r.banned_at);
        bans
    }

    pub async fn contains(&self, game: Game, player_id: &str) -> bool {
        let records = self.records.lock().await;
        records
            .iter()
            .any(|r| r.game == game && r.player_id == player_id)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Atomically rewrite the store file: write a sibling temp file, then
/// rename it over the real one. Readers never observe a partial write.
async fn persist(path: &Path, records: &[BanRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records)
        .map_err(|e| GamewardenError::Storage(format!("Failed to serialize ban list: {}", e)))?;

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| {
            GamewardenError::Storage(format!(
                "Failed to write ban store {}: {}",
                tmp_path.display(),
                e
            ))
        })?;
    tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
        GamewardenError::Storage(format!(
            "Failed to replace ban store {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_store() -> (TempDir, PersistentBanStore) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("bans.json");
        let store = PersistentBanStore::open(&path).await.expect("open store");
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_add_then_contains() {
        let (_temp_dir, store) = setup_store().await;

        store
            .add(Game::Pal, "76561198000000000", "admin#1")
            .await
            .unwrap();
        assert!(store.contains(Game::Pal, "76561198000000000").await);
        // Same id under a different game is a different ban
        assert!(!store.contains(Game::Mc, "76561198000000000").await);
    }

    #[tokio::test]
    async fn test_remove_then_contains_false() {
        let (_temp_dir, store) = setup_store().await;

        store.add(Game::Pal, "76561198000000000", "admin").await.unwrap();
        assert!(store.remove(Game::Pal, "76561198000000000").await.unwrap());
        assert!(!store.contains(Game::Pal, "76561198000000000").await);

        // Removing an absent player is a no-op, not an error
        assert!(!store.remove(Game::Pal, "76561198000000000").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let (_temp_dir, store) = setup_store().await;

        let first = store.add(Game::Pal, "7656119", "mod_a").await.unwrap();
        let second = store.add(Game::Pal, "7656119", "mod_b").await.unwrap();

        let bans = store.list(Game::Pal).await;
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].banned_by, "mod_b");
        assert!(second.banned_at >= first.banned_at);
    }

    #[tokio::test]
    async fn test_list_ordered_by_timestamp() {
        let (_temp_dir, store) = setup_store().await;

        // Seed records with explicit timestamps to avoid same-second ties
        {
            let mut records = store.records.lock().await;
            for (id, at) in [("late", 300u64), ("early", 100), ("mid", 200)] {
                records.push(BanRecord {
                    game: Game::Pal,
                    player_id: id.to_string(),
                    banned_at: at,
                    banned_by: "admin".to_string(),
                });
            }
        }

        let bans = store.list(Game::Pal).await;
        let ids: Vec<&str> = bans.iter().map(|r| r.player_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "mid", "late"]);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bans.json");

        {
            let store = PersistentBanStore::open(&path).await.unwrap();
            store.add(Game::Pal, "76561198000000000", "admin").await.unwrap();
        }

        let reopened = PersistentBanStore::open(&path).await.unwrap();
        assert!(reopened.contains(Game::Pal, "76561198000000000").await);
        let bans = reopened.list(Game::Pal).await;
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].banned_by, "admin");
    }

    #[tokio::test]
    async fn test_file_is_human_inspectable_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bans.json");

        let store = PersistentBanStore::open(&path).await.unwrap();
        store.add(Game::Pal, "76561198000000000", "admin").await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Vec<BanRecord> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(contents.contains("76561198000000000"));
        assert!(contents.contains("\"pal\""));
    }

    #[tokio::test]
    async fn test_failed_write_does_not_commit_the_ban() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bans.json");
        let store = PersistentBanStore::open(&path).await.unwrap();

        // A directory squatting on the store path makes the rename fail
        tokio::fs::create_dir(&path).await.unwrap();

        let result = store.add(Game::Pal, "76561198000000000", "admin").await;
        assert!(matches!(result, Err(GamewardenError::Storage(_))));

        // The failed ban must not linger in memory: the watch would kick
        // a player the admin was told is not banned
        assert!(!store.contains(Game::Pal, "76561198000000000").await);
        assert!(store.list(Game::Pal).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_does_not_commit_the_unban() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bans.json");
        let store = PersistentBanStore::open(&path).await.unwrap();
        store.add(Game::Pal, "7656119", "admin").await.unwrap();

        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::create_dir(&path).await.unwrap();

        assert!(store.remove(Game::Pal, "7656119").await.is_err());
        // The record stays until a rewrite actually lands on disk
        assert!(store.contains(Game::Pal, "7656119").await);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bans.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let result = PersistentBanStore::open(&path).await;
        assert!(matches!(result, Err(GamewardenError::Storage(_))));
    }
}

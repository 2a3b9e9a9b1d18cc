use anyhow::{anyhow, Result};
use chrono::Utc;
use log::warn;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::{DisplayItem, Mode};

/// Keys for the scalar preferences stored in the kv table.
pub mod keys {
    pub const CURRENT_MODE: &str = "current_mode";
    pub const AUTO_ENABLED: &str = "auto_advance_enabled";
    pub const AUTO_DELAY: &str = "auto_advance_delay";
}

/// Persisted store for visited-item sets (one per mode), cached item lists,
/// and scalar preferences. Reads tolerate malformed or missing data by
/// falling back to empty/default values; only writes surface errors.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new() -> Result<Self> {
        let app_data_dir = Self::get_app_data_dir()?;
        if !app_data_dir.exists() {
            std::fs::create_dir_all(&app_data_dir)?;
        }

        let db_path = app_data_dir.join("explorer.db");
        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// An in-memory store with the same schema, for tests and for running
    /// without a writable home directory.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS visited (
                mode TEXT NOT NULL,
                item_id TEXT NOT NULL,
                visited_at TEXT NOT NULL,
                PRIMARY KEY (mode, item_id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn get_app_data_dir() -> Result<PathBuf> {
        let home_dir =
            dirs_next::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        Ok(home_dir.join(".quote_explorer"))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Failed to lock database connection"))
    }

    /// Record a visited item. Idempotent: repeat marks of the same id keep
    /// the original timestamp. Flushed before this returns.
    pub fn mark_visited(&self, mode: Mode, item_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO visited (mode, item_id, visited_at) VALUES (?1, ?2, ?3)",
            params![mode.as_str(), item_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// The visited set for one mode. Never fails the caller: any read error
    /// is logged and yields an empty set.
    pub fn visited_ids(&self, mode: Mode) -> HashSet<String> {
        match self.query_visited_ids(mode) {
            Ok(ids) => ids,
            Err(e) => {
                warn!("could not read visited set for {}: {}", mode.as_str(), e);
                HashSet::new()
            }
        }
    }

    fn query_visited_ids(&self, mode: Mode) -> Result<HashSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT item_id FROM visited WHERE mode = ?1")?;
        let rows = stmt.query_map(params![mode.as_str()], |row| row.get::<_, String>(0))?;

        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    pub fn clear_visited(&self, mode: Mode) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM visited WHERE mode = ?1", params![mode.as_str()])?;
        Ok(())
    }

    /// Persist the last-loaded item list for a mode as a JSON blob.
    pub fn save_items(&self, mode: Mode, items: &[DisplayItem]) -> Result<()> {
        let json = serde_json::to_string(items)?;
        self.save_scalar(&Self::items_key(mode), &json)
    }

    /// The cached item list for a mode, or None when absent or malformed.
    pub fn load_items(&self, mode: Mode) -> Option<Vec<DisplayItem>> {
        let json = self.load_scalar(&Self::items_key(mode))?;
        match serde_json::from_str(&json) {
            Ok(items) => Some(items),
            Err(e) => {
                // Malformed persisted JSON is treated as absent.
                warn!("discarding malformed item cache for {}: {}", mode.as_str(), e);
                None
            }
        }
    }

    pub fn clear_items(&self, mode: Mode) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM kv WHERE key = ?1",
            params![Self::items_key(mode)],
        )?;
        Ok(())
    }

    fn items_key(mode: Mode) -> String {
        format!("items_{}", mode.as_str())
    }

    pub fn save_scalar(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// A stored scalar, or None when missing or unreadable.
    pub fn load_scalar(&self, key: &str) -> Option<String> {
        let conn = self.lock().ok()?;
        conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn visited_sets_are_partitioned_by_mode() {
        let db = store();
        db.mark_visited(Mode::ListAll, "a").unwrap();
        db.mark_visited(Mode::ListAll, "b").unwrap();
        db.mark_visited(Mode::Random, "c").unwrap();

        let list = db.visited_ids(Mode::ListAll);
        assert_eq!(list.len(), 2);
        assert!(list.contains("a") && list.contains("b"));

        let random = db.visited_ids(Mode::Random);
        assert_eq!(random.len(), 1);
        assert!(db.visited_ids(Mode::ArticleFeed).is_empty());
    }

    #[test]
    fn marking_visited_twice_keeps_one_row() {
        let db = store();
        db.mark_visited(Mode::DailyPick, "x").unwrap();
        db.mark_visited(Mode::DailyPick, "x").unwrap();
        assert_eq!(db.visited_ids(Mode::DailyPick).len(), 1);
    }

    #[test]
    fn clear_visited_only_touches_one_mode() {
        let db = store();
        db.mark_visited(Mode::ListAll, "a").unwrap();
        db.mark_visited(Mode::Random, "b").unwrap();
        db.clear_visited(Mode::ListAll).unwrap();

        assert!(db.visited_ids(Mode::ListAll).is_empty());
        assert_eq!(db.visited_ids(Mode::Random).len(), 1);
    }

    #[test]
    fn item_lists_round_trip() {
        let db = store();
        let items = vec![
            DisplayItem::quote("A", "someone"),
            DisplayItem::article("id1", "Title", "https://example.com/x"),
        ];
        db.save_items(Mode::ListAll, &items).unwrap();

        assert_eq!(db.load_items(Mode::ListAll).unwrap(), items);
        assert!(db.load_items(Mode::Random).is_none());

        db.clear_items(Mode::ListAll).unwrap();
        assert!(db.load_items(Mode::ListAll).is_none());
    }

    #[test]
    fn malformed_item_cache_reads_as_absent() {
        let db = store();
        db.save_scalar("items_quotes", "not json {{").unwrap();
        assert!(db.load_items(Mode::ListAll).is_none());
    }

    #[test]
    fn scalars_default_to_absent() {
        let db = store();
        assert_eq!(db.load_scalar(keys::CURRENT_MODE), None);
        db.save_scalar(keys::CURRENT_MODE, "today").unwrap();
        assert_eq!(db.load_scalar(keys::CURRENT_MODE).as_deref(), Some("today"));
        db.save_scalar(keys::CURRENT_MODE, "random").unwrap();
        assert_eq!(db.load_scalar(keys::CURRENT_MODE).as_deref(), Some("random"));
    }
}

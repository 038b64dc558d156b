use std::path::{Path, PathBuf};

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::Config;

/// Key holding the JSON-encoded question list inside the namespace.
pub const HISTORY_KEY: &str = "history";

/// Newest-first list of previously submitted questions.
pub type HistoryList = Vec<String>;

pub fn db_path() -> PathBuf {
    Config::get_config_dir().join("history.sqlite")
}

/// Persistent question history backed by a SQLite key-value namespace.
///
/// The store is single-process and synchronous. Writes overwrite the whole
/// list; the last writer wins.
pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(HistoryStore { conn })
    }

    /// Returns an empty list when nothing is stored or the stored value is unreadable.
    pub fn load(&self) -> HistoryList {
        let raw: Option<String> = match self
            .conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![HISTORY_KEY],
                |row| row.get(0),
            )
            .optional()
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("reading history failed: {}", e);
                return Vec::new();
            }
        };

        let Some(raw) = raw else {
            return Vec::new();
        };

        match serde_json::from_str::<HistoryList>(&raw) {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!("stored history is corrupt, ignoring it: {}", e);
                Vec::new()
            }
        }
    }

    pub fn save(&self, list: &[String]) -> anyhow::Result<()> {
        let encoded = serde_json::to_string(list)?;
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![HISTORY_KEY, encoded],
        )?;
        Ok(())
    }

    /// Empties the whole namespace, not only the history key.
    pub fn clear(&self) -> anyhow::Result<()> {
        self.conn.execute("DELETE FROM kv", [])?;
        Ok(())
    }

    #[cfg(test)]
    fn put_raw(&self, key: &str, value: &str) {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .unwrap();
    }

    #[cfg(test)]
    fn count(&self) -> i64 {
        self.conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))
            .unwrap()
    }
}

//! Preference stores: process-local map and SQLite file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use taskweave_core::collaborators::PreferenceStore;
use taskweave_core::{MemoryPrefs, OracleError};

/// Preferences held in memory for the life of the process.
#[derive(Default)]
pub struct InMemoryPreferenceStore {
    prefs: DashMap<String, MemoryPrefs>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.prefs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefs.is_empty()
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, user_id: &str) -> Result<MemoryPrefs, OracleError> {
        Ok(self
            .prefs
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| MemoryPrefs::defaults_for(user_id)))
    }

    async fn put(&self, prefs: MemoryPrefs) -> Result<MemoryPrefs, OracleError> {
        debug!(user_id = %prefs.user_id, "storing preferences");
        let _ = self.prefs.insert(prefs.user_id.clone(), prefs.clone());
        Ok(prefs)
    }
}

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS user_prefs (
    user_id    TEXT PRIMARY KEY,
    prefs      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);";

/// Preferences persisted as one JSON document per user.
///
/// rusqlite is synchronous; calls hold the connection mutex briefly and
/// never across an await.
pub struct SqlitePreferenceStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqlitePreferenceStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self, OracleError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OracleError::Storage(format!("create dir: {e}")))?;
        }
        let conn = Connection::open(path).map_err(storage)?;
        let store = Self::with_connection(conn, path.to_owned())?;
        info!(path = %path.display(), "preference database opened");
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, OracleError> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::with_connection(conn, PathBuf::from(":memory:"))
    }

    fn with_connection(conn: Connection, path: PathBuf) -> Result<Self, OracleError> {
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| OracleError::Storage(format!("schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn storage(e: rusqlite::Error) -> OracleError {
    OracleError::Storage(e.to_string())
}

#[async_trait]
impl PreferenceStore for SqlitePreferenceStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, user_id: &str) -> Result<MemoryPrefs, OracleError> {
        let stored: Option<String> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT prefs FROM user_prefs WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?
        };

        match stored {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| OracleError::Storage(format!("corrupt prefs for {user_id}: {e}"))),
            None => Ok(MemoryPrefs::defaults_for(user_id)),
        }
    }

    async fn put(&self, prefs: MemoryPrefs) -> Result<MemoryPrefs, OracleError> {
        let json = serde_json::to_string(&prefs)
            .map_err(|e| OracleError::Storage(format!("encode prefs: {e}")))?;
        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = self.conn.lock();
            let _ = conn
                .execute(
                    "INSERT INTO user_prefs (user_id, prefs, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(user_id) DO UPDATE SET prefs = excluded.prefs, updated_at = excluded.updated_at",
                    params![prefs.user_id, json, now],
                )
                .map_err(storage)?;
        }
        debug!(user_id = %prefs.user_id, "preferences persisted");
        Ok(prefs)
    }
}

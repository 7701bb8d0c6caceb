use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::data::{ModuleName, Store};
use super::namespace::{default_store, ensure_shape_with, DEFAULT_USERS};
use crate::error::Result;

/// Key the whole store is persisted under
pub const STORAGE_KEY: &str = "urbanAuditDB";

/// Stores above this size are reported as large
const HEALTHY_LIMIT_MB: f64 = 5.0;

/// The Library persists the audit store in a SQLite key/value table.
/// The entire store is one JSON blob under [`STORAGE_KEY`]; every save
/// overwrites it completely.
pub struct Library {
    conn: Connection,
    db_path: PathBuf,
    default_users: Vec<String>,
    saves: Cell<u64>,
}

impl Library {
    /// Open the library at its default location.
    ///
    /// The database file is created in the user's data directory:
    /// - Linux: ~/.local/share/urban-audit/urban_audit.db
    /// - macOS: ~/Library/Application Support/urban-audit/urban_audit.db
    /// - Windows: %APPDATA%\urban-audit\urban_audit.db
    pub fn new() -> Result<Self> {
        Self::open(&Self::default_path(), &default_user_list())
    }

    /// Open (or create) the library database at `db_path`
    pub fn open(db_path: &Path, default_users: &[String]) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        info!("📁 Database opened at: {}", db_path.display());

        Self::with_connection(conn, db_path.to_path_buf(), default_users)
    }

    /// A throwaway library, used by tests
    pub fn open_in_memory(default_users: &[String]) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, PathBuf::from(":memory:"), default_users)
    }

    fn with_connection(conn: Connection, db_path: PathBuf, default_users: &[String]) -> Result<Self> {
        let mut library = Library {
            conn,
            db_path,
            default_users: default_users.to_vec(),
            saves: Cell::new(0),
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Get the path where the database is stored by default
    pub fn default_path() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        path.push("urban-audit");
        path.push("urban_audit.db");
        path
    }

    /// Create the key/value table if it doesn't exist
    fn init_schema(&mut self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS local_storage (
                key             TEXT PRIMARY KEY,
                value           TEXT NOT NULL,
                updated_at      INTEGER NOT NULL
            )",
            [],
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Users a fresh or emptied store is seeded with
    pub fn default_users(&self) -> &[String] {
        &self.default_users
    }

    /// Load the store.
    ///
    /// A missing blob initializes and saves a default store. A blob that is
    /// not valid JSON (or not an object) is discarded and replaced the same
    /// way; it is never reported as an error. A readable blob is repaired
    /// with [`ensure_shape_with`].
    pub fn load(&self) -> Result<Store> {
        let mut store = match self.raw_blob()? {
            None => {
                info!("No stored data, initializing default users");
                return self.reset();
            }
            Some(json) => match Store::from_json(&json) {
                Ok(store) => store,
                Err(e) => {
                    warn!("⚠️  Discarding corrupt stored data: {}", e);
                    return self.reset();
                }
            },
        };

        ensure_shape_with(&mut store, &self.default_users);
        info!("✅ Loaded store with {} users", store.users.len());
        Ok(store)
    }

    fn reset(&self) -> Result<Store> {
        let store = default_store(&self.default_users);
        self.save(&store)?;
        Ok(store)
    }

    /// Serialize the full store and overwrite the persisted blob
    pub fn save(&self, store: &Store) -> Result<()> {
        let json = store.to_json()?;
        self.write_raw_blob(&json)?;

        self.saves.set(self.saves.get() + 1);
        debug!("💾 Saved store ({} bytes)", json.len());
        Ok(())
    }

    /// Number of saves performed through this handle
    pub fn save_count(&self) -> u64 {
        self.saves.get()
    }

    /// The persisted blob exactly as stored
    pub fn raw_blob(&self) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                [STORAGE_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Overwrite the blob with arbitrary text, bypassing serialization
    pub fn write_raw_blob(&self, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO local_storage (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![STORAGE_KEY, value, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Size and per-module breakdown of the persisted data for `user`
    pub fn storage_info(&self, store: &Store, user: &str) -> Result<StorageInfo> {
        let size_bytes = self.raw_blob()?.map(|blob| blob.len()).unwrap_or(0);
        let size_kb = size_bytes as f64 / 1024.0;
        let size_mb = size_kb / 1024.0;

        let record = store.record(user)?;
        Ok(StorageInfo {
            key: STORAGE_KEY.to_string(),
            user: user.to_string(),
            size_bytes,
            size_kb,
            size_mb,
            healthy: size_mb < HEALTHY_LIMIT_MB,
            total_items: record.total_items(),
            modules: record.counts(),
        })
    }

    /// Write the entire store (all users) as pretty JSON into `dir`.
    ///
    /// The file is named `urban-audit-<user>-<YYYY-MM-DD>.json` using today's
    /// UTC date. Returns the written path.
    pub fn export(&self, store: &Store, user: &str, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(export_file_name(user, Utc::now().date_naive()));

        let json = serde_json::to_string_pretty(store)?;
        fs::write(&path, json)?;

        info!("📥 Exported store to {}", path.display());
        Ok(path)
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}

/// Name of an export file for `user` on `date`.
/// Path separators in the user name become `_`, so the file stays in the export directory.
pub fn export_file_name(user: &str, date: NaiveDate) -> String {
    let user: String = user
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("urban-audit-{}-{}.json", user, date.format("%Y-%m-%d"))
}

fn default_user_list() -> Vec<String> {
    DEFAULT_USERS.iter().map(|name| name.to_string()).collect()
}

/// Storage report for one user
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StorageInfo {
    pub key: String,
    pub user: String,
    pub size_bytes: usize,
    pub size_kb: f64,
    pub size_mb: f64,
    /// False once the blob reaches 5 MB
    pub healthy: bool,
    pub total_items: usize,
    pub modules: Vec<(ModuleName, usize)>,
}

//! Persistent key-value store for Glean.
//!
//! Everything Glean persists lives in one flat namespace of JSON values:
//! the highlight collection under `"highlights"` and the API key under
//! `"gemini_key"`. The [`KvStore`] trait is that namespace; [`Storage`] backs
//! it with an embedded libSQL file and [`MemoryStore`] with a hash map.
//!
//! A single call is atomic, but there is no isolation across calls: a
//! read-modify-write spanning `get` and `set` can interleave with another
//! caller's.

mod memory;
mod migrations;

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use chrono::Utc;
use glean_shared::{GleanError, Result};
use libsql::{Connection, Database, params};
use serde_json::Value;

pub use memory::MemoryStore;

/// Key → value mapping passed to and returned from a [`KvStore`].
pub type StoreMap = HashMap<String, Value>;

/// Asynchronous key-value store shared by every Glean component.
pub trait KvStore: Send + Sync {
    /// Fetch the given keys. Absent keys are missing from the returned map.
    fn get(&self, keys: &[&str]) -> impl Future<Output = Result<StoreMap>> + Send;

    /// Write every entry of `items`, replacing existing values.
    fn set(&self, items: StoreMap) -> impl Future<Output = Result<()>> + Send;

    /// Delete the given keys. Absent keys are ignored.
    fn remove(&self, keys: &[&str]) -> impl Future<Output = Result<()>> + Send;
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| GleanError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| GleanError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| GleanError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        tracing::debug!(path = %path.display(), "storage opened");
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    GleanError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Raw JSON text stored under `key`.
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM kv WHERE key = ?1", params![key])
            .await
            .map_err(|e| GleanError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| GleanError::Storage(e.to_string()))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(GleanError::Storage(e.to_string())),
        }
    }
}

impl KvStore for Storage {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        let mut found = StoreMap::new();
        for key in keys {
            if let Some(raw) = self.get_raw(key).await? {
                let value: Value =
                    serde_json::from_str(&raw).map_err(|e| GleanError::serialization(*key, e))?;
                found.insert((*key).to_owned(), value);
            }
        }
        Ok(found)
    }

    async fn set(&self, items: StoreMap) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| GleanError::Storage(e.to_string()))?;

        for (key, value) in &items {
            let text =
                serde_json::to_string(value).map_err(|e| GleanError::serialization(key, e))?;
            tx.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                params![key.as_str(), text.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| GleanError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| GleanError::Storage(e.to_string()))?;
        tracing::trace!(keys = items.len(), "kv set committed");
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| GleanError::Storage(e.to_string()))?;

        for key in keys {
            tx.execute("DELETE FROM kv WHERE key = ?1", params![*key])
                .await
                .map_err(|e| GleanError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| GleanError::Storage(e.to_string()))?;
        Ok(())
    }
}

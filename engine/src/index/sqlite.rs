/// SQLite-backed metadata index
///
/// Stores descriptors as JSON text in a single key/value table and keeps the
/// pin-intent log in a second table of the same database. Uses WAL mode so
/// concurrent readers never block the writer.
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sdk::{ContentId, PluginDescriptor, RegistryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Row};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use super::{unix_now, MetadataIndex, PinIntent, PinIntentLog};

/// Metadata index and pin-intent log in one SQLite database
#[derive(Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

fn store_error(action: &str, err: sqlx::Error) -> RegistryError {
    RegistryError::Store(format!("Metadata index {} failed: {}", action, err))
}

impl SqliteIndex {
    /// Open (or create) the index database
    ///
    /// This will:
    /// 1. Create the database file and its directory if missing
    /// 2. Enable WAL mode
    /// 3. Run migrations to set up the schema
    pub async fn open(db_path: &Path) -> Result<Self> {
        info!("Opening metadata index at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RegistryError::io(parent, e))?;
        }

        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(|e| store_error("configuration", e))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| store_error("connect", e))?;

        debug!("Metadata index connection established");

        let index = Self { pool };
        index.run_migrations().await?;

        Ok(index)
    }

    /// Run database migrations
    ///
    /// Migrations are idempotent and can be run multiple times safely.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../../migrations/001_registry.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("migration 001_registry.sql", e))?;

        debug!("Metadata index migrations completed");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checkpoint the WAL and close every connection
    ///
    /// Should be called during shutdown.
    pub async fn close(self) -> Result<()> {
        info!("Closing metadata index");

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("WAL checkpoint", e))?;

        self.pool.close().await;
        Ok(())
    }
}

#[async_trait]
impl MetadataIndex for SqliteIndex {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn put(&self, key: &str, descriptor: &PluginDescriptor) -> Result<()> {
        let value = descriptor.to_json()?;
        let now = unix_now() as i64;

        sqlx::query(
            "INSERT INTO registry_entries (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("write", e))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<PluginDescriptor> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM registry_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| store_error("read", e))?;

        match value {
            Some(value) => PluginDescriptor::from_json(&value),
            None => Err(RegistryError::not_found(key)),
        }
    }

    fn scan_prefix<'a>(
        &'a self,
        prefix: &str,
        limit: usize,
    ) -> BoxStream<'a, Result<PluginDescriptor>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        sqlx::query(
            "SELECT value FROM registry_entries WHERE substr(key, 1, length(?)) = ? LIMIT ?",
        )
        .bind(prefix.to_string())
        .bind(prefix.to_string())
        .bind(limit)
        .fetch(&self.pool)
        .map(|row| {
            let row = row.map_err(|e| store_error("scan", e))?;
            let value: String = row
                .try_get("value")
                .map_err(|e| store_error("scan", e))?;
            PluginDescriptor::from_json(&value)
        })
        .boxed()
    }
}

#[async_trait]
impl PinIntentLog for SqliteIndex {
    async fn record(&self, content_id: &ContentId, registry_key: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO pin_intents (content_id, registry_key, recorded_at) VALUES (?, ?, ?) \
             ON CONFLICT(content_id, registry_key) DO UPDATE SET recorded_at = excluded.recorded_at",
        )
        .bind(content_id.as_str())
        .bind(registry_key)
        .bind(unix_now() as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("intent write", e))?;

        Ok(())
    }

    async fn clear(&self, content_id: &ContentId, registry_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM pin_intents WHERE content_id = ? AND registry_key = ?")
            .bind(content_id.as_str())
            .bind(registry_key)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("intent delete", e))?;

        Ok(())
    }

    async fn pending(&self) -> Result<Vec<PinIntent>> {
        let rows = sqlx::query("SELECT content_id, registry_key, recorded_at FROM pin_intents")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("intent read", e))?;

        Ok(rows
            .into_iter()
            .map(|r| PinIntent {
                content_id: ContentId::new(r.get::<String, _>("content_id")),
                registry_key: r.get("registry_key"),
                recorded_at: r.get::<i64, _>("recorded_at").max(0) as u64,
            })
            .collect())
    }
}

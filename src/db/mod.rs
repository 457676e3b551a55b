//! Database module for feedhook.
//!
//! This module provides SQLite database access through sqlx, with
//! versioned migrations tracked in a `schema_version` table.

mod schema;

pub use schema::MIGRATIONS;

use std::path::Path;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info};

use crate::{FeedhookError, Result};

/// Connection pool type used by repositories.
pub type DbPool = SqlitePool;

/// Database transaction type.
pub type DbTransaction = Transaction<'static, Sqlite>;

/// Seconds SQLite waits on a locked database before failing.
const BUSY_TIMEOUT_SECS: u64 = 5;

/// Database wrapper for managing the SQLite connection and migrations.
///
/// The pool holds a single connection: update runs are sequential and
/// every feed is processed inside one transaction on that connection.
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open an existing database file and apply pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FeedhookError::DatabaseConnection(format!(
                "database file '{}' does not exist",
                path.display()
            )));
        }
        info!("Opening database at {:?}", path);

        let db = Self::connect(Self::file_options(path).create_if_missing(false)).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Create a new database file with the full schema and a fresh database id.
    ///
    /// Parent directories are created when missing.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Creating database at {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Self::connect(Self::file_options(path).create_if_missing(true)).await?;
        db.migrate().await?;
        db.ensure_database_id().await?;
        Ok(db)
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory database");
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        let db = Self::connect(options).await?;
        db.migrate().await?;
        db.ensure_database_id().await?;
        Ok(db)
    }

    fn file_options(path: &Path) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(path)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // The connection must never be recycled, or an in-memory database is lost.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| FeedhookError::DatabaseConnection(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Check out the connection for direct use.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Begin a new transaction.
    pub async fn begin(&self) -> Result<DbTransaction> {
        Ok(self.pool.begin().await?)
    }

    /// Close the pool, waiting for the connection to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get the current schema version.
    pub async fn schema_version(&self) -> Result<i64> {
        if !self.table_exists("schema_version").await? {
            return Ok(0);
        }

        let version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        let current_version = self.schema_version().await?;

        if current_version as usize >= MIGRATIONS.len() {
            debug!("Database is up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating database from version {} to {}",
            current_version,
            MIGRATIONS.len()
        );

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version     INTEGER PRIMARY KEY,
                applied_at  TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        for (i, migration) in MIGRATIONS.iter().enumerate().skip(current_version as usize) {
            let version = (i + 1) as i64;
            info!("Applying migration v{}", version);

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(migration).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            debug!("Migration v{} applied successfully", version);
        }

        Ok(())
    }

    async fn ensure_database_id(&self) -> Result<()> {
        if self.database_id().await?.is_some() {
            return Ok(());
        }
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO database_id (id) VALUES (?)")
            .bind(&id)
            .execute(&self.pool)
            .await?;
        debug!("Assigned database id {}", id);
        Ok(())
    }

    /// Random identifier assigned when the database was created.
    pub async fn database_id(&self) -> Result<Option<String>> {
        let id: Option<String> = sqlx::query_scalar("SELECT id FROM database_id LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    /// Check if a table exists.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(table_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        assert_eq!(db.schema_version().await.unwrap() as usize, MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_tables_exist() {
        let db = Database::open_in_memory().await.unwrap();

        for table in ["schema_version", "database_id", "feed", "item", "last_update"] {
            assert!(db.table_exists(table).await.unwrap(), "missing {table}");
        }
        assert!(!db.table_exists("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_database_id_is_uuid() {
        let db = Database::open_in_memory().await.unwrap();
        let id = db.database_id().await.unwrap().unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(db.schema_version().await.unwrap() as usize, MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_create_then_open_file_database() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("feeds.db");

        let id = {
            let db = Database::create(&db_path).await.unwrap();
            let id = db.database_id().await.unwrap().unwrap();
            db.close().await;
            id
        };
        assert!(db_path.exists());

        let db = Database::open(&db_path).await.unwrap();
        assert_eq!(db.database_id().await.unwrap().unwrap(), id);
        assert_eq!(db.schema_version().await.unwrap() as usize, MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = Database::open(temp_dir.path().join("missing.db")).await;
        assert!(matches!(result, Err(FeedhookError::DatabaseConnection(_))));
    }

    #[tokio::test]
    async fn test_item_guid_is_unique() {
        let db = Database::open_in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        sqlx::query("INSERT INTO feed (key, title, url) VALUES ('a', 'A', 'https://a')")
            .execute(&mut *conn)
            .await
            .unwrap();

        let insert = "INSERT INTO item (feed, guid, published) VALUES ('a', 'g1', '2024-01-01 00:00:00')";
        sqlx::query(insert).execute(&mut *conn).await.unwrap();
        assert!(sqlx::query(insert).execute(&mut *conn).await.is_err());
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let db = Database::open_in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let result = sqlx::query(
            "INSERT INTO item (feed, guid, published) VALUES ('nope', 'g1', '2024-01-01 00:00:00')",
        )
        .execute(&mut *conn)
        .await;
        assert!(result.is_err());
    }
}

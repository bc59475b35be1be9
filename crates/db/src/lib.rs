// crates/db/src/lib.rs
//! Persistence gateway (C3, §4.3) over SQLite via `sqlx`.

mod migrations;
pub mod queries;

pub use queries::{ConversationMetadata, JobResultUpdate, UpsertedConversation};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("failed to determine cache directory")]
    NoCacheDir,

    #[error("failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),

    #[error("JSON (de)serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("row not found")]
    NotFound,

    #[error("stored timestamp is not valid RFC3339: {0}")]
    InvalidTimestamp(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Main database handle wrapping a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs migrations.
    pub async fn new(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30))
            .log_slow_statements(
                tracing::log::LevelFilter::Warn,
                std::time::Duration::from_secs(5),
            );

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            db_path: path.to_owned(),
        };
        db.run_migrations().await?;

        info!("database opened at {}", path.display());
        Ok(db)
    }

    /// Creates an in-memory database (for testing).
    ///
    /// Uses `shared_cache(true)` so all pool connections share the same
    /// in-memory database, since otherwise each pooled connection would see
    /// its own empty database.
    pub async fn new_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let db = Self {
            pool,
            db_path: PathBuf::new(),
        };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Opens the database at `~/.cache/powerpulse/powerpulse.db`.
    pub async fn open_default() -> DbResult<Self> {
        let path = default_db_path()?;
        Self::new(&path).await
    }

    /// Opens the database named by `database_url` (§6 `DATABASE_URL`).
    /// `:memory:` and `sqlite::memory:` open an in-memory database; a
    /// `sqlite://` or `sqlite:` prefix is stripped from anything else and
    /// the remainder is treated as a file path relative to the current
    /// directory.
    pub async fn open_configured(database_url: &str) -> DbResult<Self> {
        let trimmed = database_url.trim();
        if trimmed == ":memory:" || trimmed == "sqlite::memory:" {
            return Self::new_in_memory().await;
        }
        let path = trimmed
            .strip_prefix("sqlite://")
            .or_else(|| trimmed.strip_prefix("sqlite:"))
            .unwrap_or(trimmed);
        Self::new(Path::new(path)).await
    }

    /// Runs all inline migrations, tracked in `_migrations`.
    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;
        let current_version = row.0 as usize;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1;
            if version > current_version {
                match sqlx::query(migration).execute(&self.pool).await {
                    Ok(_) => {}
                    Err(e) if e.to_string().contains("duplicate column name") => {}
                    Err(e) => return Err(e.into()),
                }
                sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
                    .bind(version as i64)
                    .execute(&self.pool)
                    .await?;
            }
        }

        Ok(())
    }

    /// Returns a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the path to the database file (empty for in-memory databases).
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

/// Returns the default database path: `~/.cache/powerpulse/powerpulse.db`.
pub fn default_db_path() -> DbResult<PathBuf> {
    dirs::cache_dir()
        .map(|dir| dir.join("powerpulse").join("powerpulse.db"))
        .ok_or(DbError::NoCacheDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_schema_on_open() {
        let db = Database::new_in_memory()
            .await
            .expect("should create in-memory database");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(db.pool())
            .await
            .expect("conversations table should exist");
        assert_eq!(count.0, 0);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM daily_analyses")
            .fetch_one(db.pool())
            .await
            .expect("daily_analyses table should exist");
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = Database::new_in_memory()
            .await
            .expect("first open should succeed");

        db.run_migrations()
            .await
            .expect("second migration run should succeed");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM metrics")
            .fetch_one(db.pool())
            .await
            .expect("metrics table should still exist");
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn file_backed_database_persists_to_disk() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let db_path = tmp.path().join("test.db");

        let db = Database::new(&db_path)
            .await
            .expect("should create file-based database");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(db.pool())
            .await
            .expect("conversations table should exist");
        assert_eq!(count.0, 0);
        assert!(db_path.exists());
    }

    #[test]
    fn default_db_path_targets_powerpulse_cache_dir() {
        let path = default_db_path().expect("should resolve default path");
        assert!(path.to_string_lossy().contains("powerpulse"));
    }

    #[tokio::test]
    async fn open_configured_treats_memory_url_as_in_memory() {
        let db = Database::open_configured(":memory:")
            .await
            .expect("should open in-memory database");
        assert_eq!(db.db_path(), Path::new(""));
    }

    #[tokio::test]
    async fn open_configured_strips_sqlite_scheme_from_file_path() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let db_path = tmp.path().join("configured.db");
        let url = format!("sqlite://{}", db_path.display());

        let db = Database::open_configured(&url)
            .await
            .expect("should open file-based database");
        assert_eq!(db.db_path(), db_path.as_path());
        assert!(db_path.exists());
    }
}

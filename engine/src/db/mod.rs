/// SQLite persistence for assessment results
///
/// Sessions, transcript turns and dimension results live in one SQLite file
/// under the data directory. WAL mode lets concurrent sessions append while
/// history queries read.
use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub mod assessments;

pub use assessments::{AssessmentRepository, SessionSummary};

/// Schema migrations in application order: (version, name, SQL)
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "001_initial",
    include_str!("../../migrations/001_initial.sql"),
)];

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `db_path` and bring its schema up to
    /// date.
    ///
    /// SQLite replays a leftover WAL on open, so an unclean shutdown needs no
    /// extra handling here. Call [`close`](Self::close) on shutdown to
    /// checkpoint it.
    pub async fn new(db_path: &Path) -> Result<Self> {
        debug!(path = %db_path.display(), "Opening assessment database");

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open {}", db_path.display()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Schema version recorded in `PRAGMA user_version`
    pub async fn schema_version(&self) -> Result<i64> {
        sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .context("Failed to read schema version")
    }

    /// Apply every migration newer than the recorded schema version
    async fn migrate(&self) -> Result<()> {
        let current = self.schema_version().await?;

        for (version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
            info!(version, name, "Applying migration");

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(sql)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Migration {} failed", name))?;
            // PRAGMA does not take bound parameters
            sqlx::raw_sql(&format!("PRAGMA user_version = {}", version))
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checkpoint the WAL into the main database file
    pub async fn flush_wal(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to checkpoint WAL")?;
        Ok(())
    }

    /// Checkpoint the WAL and close every pooled connection
    pub async fn close(self) -> Result<()> {
        self.flush_wal().await?;
        self.pool.close().await;
        debug!("Assessment database closed");
        Ok(())
    }

    pub fn assessments(&self) -> AssessmentRepository {
        AssessmentRepository::new(self.pool.clone())
    }
}

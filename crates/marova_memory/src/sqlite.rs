use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use marova_core::{Snapshot, SnapshotStore};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::path::Path;

/// Single-row SQLite document store. The whole snapshot is one JSON column.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS organism_snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                snapshot_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create organism_snapshot table")?;
        Ok(())
    }

    /// Unix timestamp of the last write, if any.
    pub async fn updated_at(&self) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT updated_at FROM organism_snapshot WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query organism_snapshot")?;
        Ok(row.map(|r| r.get("updated_at")))
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn read(&self) -> Result<Option<Snapshot>> {
        let row = sqlx::query("SELECT snapshot_json FROM organism_snapshot WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query organism_snapshot")?;

        match row {
            Some(row) => {
                let json: String = row.get("snapshot_json");
                let snapshot: Snapshot =
                    serde_json::from_str(&json).context("Failed to deserialize organism snapshot")?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot).context("Failed to serialize organism snapshot")?;
        let now = Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO organism_snapshot (id, snapshot_json, updated_at) VALUES (1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET snapshot_json = excluded.snapshot_json, updated_at = excluded.updated_at",
        )
        .bind(&json)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to save organism snapshot")?;

        tracing::debug!(bytes = json.len(), "Organism snapshot saved");
        Ok(())
    }
}

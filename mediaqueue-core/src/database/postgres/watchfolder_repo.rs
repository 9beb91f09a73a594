//! `WatchfolderStore` over PostgreSQL (spec §4.10, §6).

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mediaqueue_model::{FileFilter, Watchfolder};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::labels::{load_entity_labels, replace_entity_labels};
use crate::database::ports::WatchfolderStore;
use crate::error::Result;

pub struct PgWatchfolderStore {
    pool: PgPool,
}

impl PgWatchfolderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct WatchfolderRow {
    uuid: Uuid,
    name: String,
    description: String,
    path: String,
    interval_seconds: i64,
    growth_checks: i32,
    filter: Json<FileFilter>,
    preset: Uuid,
    suspended: bool,
    last_run: Option<DateTime<Utc>>,
    last_check: Option<DateTime<Utc>>,
    error: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WatchfolderRow {
    fn into_watchfolder(self, labels: Vec<mediaqueue_model::Label>) -> Watchfolder {
        Watchfolder {
            uuid: self.uuid,
            name: self.name,
            description: self.description,
            path: self.path,
            interval_seconds: self.interval_seconds.max(0) as u64,
            growth_checks: self.growth_checks.max(0) as u32,
            filter: self.filter.0,
            preset: self.preset,
            labels,
            suspended: self.suspended,
            last_run: self.last_run,
            last_check: self.last_check,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: None,
        }
    }
}

#[async_trait]
impl WatchfolderStore for PgWatchfolderStore {
    async fn first_and_lock(
        &self,
        uuid: Uuid,
        interval: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Watchfolder>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<WatchfolderRow> = sqlx::query_as(
            "SELECT * FROM watchfolder WHERE uuid = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(uuid)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match row {
            Some(row) => row,
            None => {
                tx.commit().await?;
                return Ok(None);
            }
        };

        if let Some(last_run) = row.last_run {
            let next_allowed = last_run + ChronoDuration::seconds(interval.as_secs() as i64)
                - ChronoDuration::milliseconds(50);
            if now < next_allowed {
                tx.commit().await?;
                return Ok(None);
            }
        }

        sqlx::query("UPDATE watchfolder SET last_run = $2 WHERE uuid = $1")
            .bind(uuid)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let labels = load_entity_labels(&self.pool, "watchfolder_labels", "watchfolder_uuid", uuid).await?;
        Ok(Some(row.into_watchfolder(labels)))
    }

    async fn touch_last_check(&self, uuid: Uuid, now: DateTime<Utc>, error: &str) -> Result<()> {
        sqlx::query("UPDATE watchfolder SET last_check = $2, error = $3 WHERE uuid = $1")
            .bind(uuid)
            .bind(now)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn exists(&self, uuid: Uuid) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM watchfolder WHERE uuid = $1 AND deleted_at IS NULL)",
        )
        .bind(uuid)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_active(&self) -> Result<Vec<Watchfolder>> {
        let rows: Vec<WatchfolderRow> = sqlx::query_as(
            "SELECT * FROM watchfolder WHERE deleted_at IS NULL AND suspended = false",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut folders = Vec::with_capacity(rows.len());
        for row in rows {
            let labels =
                load_entity_labels(&self.pool, "watchfolder_labels", "watchfolder_uuid", row.uuid).await?;
            folders.push(row.into_watchfolder(labels));
        }
        Ok(folders)
    }
}

/// Replaces `watchfolder`'s label set; used by the admin-facing create/
/// update path (not the scanner loop itself).
pub async fn set_labels(pool: &PgPool, uuid: Uuid, labels: &[mediaqueue_model::Label]) -> Result<()> {
    replace_entity_labels(pool, "watchfolder_labels", "watchfolder_uuid", uuid, labels).await
}

//! `TaskStore` over PostgreSQL (spec §4.2, §4.3, §4.11, §6).

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediaqueue_model::{HookRecord, Label, PathPair, Task, TaskSource, TaskStatus};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::labels::{load_entity_labels, replace_entity_labels};
use crate::database::ports::TaskStore;
use crate::error::{CoreError, Result};

pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct TaskRow {
    uuid: Uuid,
    batch: Option<Uuid>,
    name: String,
    command: Json<PathPair>,
    input_file: Json<PathPair>,
    output_file: Json<PathPair>,
    metadata: Json<Value>,
    status: String,
    progress: f64,
    remaining: f64,
    priority: i32,
    source: String,
    webhooks: Json<Vec<mediaqueue_model::Webhook>>,
    pre_processing: Json<HookRecord>,
    post_processing: Json<HookRecord>,
    retries: i32,
    retried: i32,
    error: String,
    client_identifier: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_task(self, labels: Vec<Label>) -> Result<Task> {
        Ok(Task {
            uuid: self.uuid,
            batch: self.batch,
            name: self.name,
            command: self.command.0,
            input_file: self.input_file.0,
            output_file: self.output_file.0,
            metadata: self.metadata.0,
            status: TaskStatus::from_str(&self.status)
                .map_err(|_| CoreError::InvariantViolation(format!("bad status {}", self.status)))?,
            progress: self.progress,
            remaining: self.remaining,
            priority: self.priority.max(0) as u32,
            labels,
            source: TaskSource::from_str(&self.source)
                .map_err(|_| CoreError::InvariantViolation(format!("bad source {}", self.source)))?,
            webhooks: self.webhooks.0,
            pre_processing: self.pre_processing.0,
            post_processing: self.post_processing.0,
            retries: self.retries.max(0) as u32,
            retried: self.retried.max(0) as u32,
            error: self.error,
            client_identifier: self.client_identifier,
            started_at: self.started_at,
            finished_at: self.finished_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SQL `LIKE` pattern for a task label value, mirroring
/// `Label::as_like_pattern` exactly: escape `\`, `%`, `_`, then translate
/// the wildcard `*` into `%`.
const LABEL_LIKE_EXPR: &str = "replace(replace(replace(replace(l.value, '\\', '\\\\'), '%', '\\%'), '_', '\\_'), '*', '%')";

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn claim(&self, limit: i64, client_labels: &[Label]) -> Result<Vec<Task>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        let client_label_values: Vec<String> =
            client_labels.iter().map(|l| l.as_str().to_string()).collect();

        let sql = format!(
            "WITH candidate AS (
                SELECT t.uuid
                FROM tasks t
                WHERE t.status = 'QUEUED' AND t.deleted_at IS NULL
                  AND (
                    NOT EXISTS (SELECT 1 FROM task_labels tl WHERE tl.task_uuid = t.uuid)
                    OR EXISTS (
                        SELECT 1 FROM task_labels tl
                        JOIN labels l ON l.id = tl.label_id
                        CROSS JOIN unnest($2::text[]) AS c(value)
                        WHERE tl.task_uuid = t.uuid
                          AND c.value LIKE {LABEL_LIKE_EXPR} ESCAPE '\\'
                    )
                  )
                ORDER BY t.priority DESC, t.created_at ASC
                FOR UPDATE OF t SKIP LOCKED
                LIMIT $1
             )
             UPDATE tasks SET status = 'RUNNING', updated_at = now()
             FROM candidate
             WHERE tasks.uuid = candidate.uuid
             RETURNING tasks.*"
        );

        let rows: Vec<TaskRow> = sqlx::query_as(&sql)
            .bind(limit)
            .bind(&client_label_values)
            .fetch_all(&self.pool)
            .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let labels = load_entity_labels(&self.pool, "task_labels", "task_uuid", row.uuid).await?;
            tasks.push(row.into_task(labels)?);
        }
        Ok(tasks)
    }

    async fn insert(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "INSERT INTO tasks (
                uuid, batch, name, command, input_file, output_file, metadata,
                status, progress, remaining, priority, source, webhooks,
                pre_processing, post_processing, retries, retried, error,
                client_identifier, started_at, finished_at, created_at, updated_at
             ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $23
             )",
        )
        .bind(task.uuid)
        .bind(task.batch)
        .bind(&task.name)
        .bind(Json(&task.command))
        .bind(Json(&task.input_file))
        .bind(Json(&task.output_file))
        .bind(Json(&task.metadata))
        .bind(task.status.as_str())
        .bind(task.progress)
        .bind(task.remaining)
        .bind(task.priority as i32)
        .bind(task.source.as_str())
        .bind(Json(&task.webhooks))
        .bind(Json(&task.pre_processing))
        .bind(Json(&task.post_processing))
        .bind(task.retries as i32)
        .bind(task.retried as i32)
        .bind(&task.error)
        .bind(&task.client_identifier)
        .bind(task.started_at)
        .bind(task.finished_at)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;

        replace_entity_labels(&self.pool, "task_labels", "task_uuid", task.uuid, &task.labels).await?;
        Ok(())
    }

    async fn get(&self, uuid: Uuid) -> Result<Task> {
        let row: TaskRow = sqlx::query_as("SELECT * FROM tasks WHERE uuid = $1 AND deleted_at IS NULL")
            .bind(uuid)
            .fetch_one(&self.pool)
            .await?;
        let labels = load_entity_labels(&self.pool, "task_labels", "task_uuid", uuid).await?;
        row.into_task(labels)
    }

    async fn update(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET
                name = $2, command = $3, input_file = $4, output_file = $5,
                metadata = $6, status = $7, progress = $8, remaining = $9,
                priority = $10, source = $11, webhooks = $12,
                pre_processing = $13, post_processing = $14, retries = $15,
                retried = $16, error = $17, client_identifier = $18,
                started_at = $19, finished_at = $20, updated_at = now()
             WHERE uuid = $1",
        )
        .bind(task.uuid)
        .bind(&task.name)
        .bind(Json(&task.command))
        .bind(Json(&task.input_file))
        .bind(Json(&task.output_file))
        .bind(Json(&task.metadata))
        .bind(task.status.as_str())
        .bind(task.progress)
        .bind(task.remaining)
        .bind(task.priority as i32)
        .bind(task.source.as_str())
        .bind(Json(&task.webhooks))
        .bind(Json(&task.pre_processing))
        .bind(Json(&task.post_processing))
        .bind(task.retries as i32)
        .bind(task.retried as i32)
        .bind(&task.error)
        .bind(&task.client_identifier)
        .bind(task.started_at)
        .bind(task.finished_at)
        .execute(&self.pool)
        .await?;

        replace_entity_labels(&self.pool, "task_labels", "task_uuid", task.uuid, &task.labels).await?;
        Ok(())
    }

    async fn count_unfinished_in_batch(&self, batch: Uuid) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT count(*) FROM tasks
             WHERE batch = $1 AND deleted_at IS NULL
               AND status NOT IN ('DONE_SUCCESSFUL', 'DONE_ERROR', 'DONE_CANCELED')",
        )
        .bind(batch)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn fail_running_for_client(
        &self,
        client_identifier: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "UPDATE tasks SET status = 'DONE_ERROR', progress = 100, remaining = -1,
                error = $2, finished_at = $3, updated_at = $3
             WHERE status = 'RUNNING' AND client_identifier = $1 AND deleted_at IS NULL
             RETURNING *",
        )
        .bind(client_identifier)
        .bind(message)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let labels = load_entity_labels(&self.pool, "task_labels", "task_uuid", row.uuid).await?;
            tasks.push(row.into_task(labels)?);
        }
        Ok(tasks)
    }

    async fn fail_running_for_stale_clients(
        &self,
        stale_before: DateTime<Utc>,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "UPDATE tasks SET status = 'DONE_ERROR', progress = 100, remaining = -1,
                error = $2, finished_at = $3, updated_at = $3
             WHERE status = 'RUNNING' AND deleted_at IS NULL
               AND client_identifier IN (
                   SELECT identifier FROM client WHERE last_seen < $1
               )
             RETURNING *",
        )
        .bind(stale_before)
        .bind(message)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let labels = load_entity_labels(&self.pool, "task_labels", "task_uuid", row.uuid).await?;
            tasks.push(row.into_task(labels)?);
        }
        Ok(tasks)
    }
}

//! `WebhookStore` over PostgreSQL (spec §4.8, §6).

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediaqueue_model::{Webhook, WebhookEvent, WebhookExecution};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::ports::WebhookStore;
use crate::error::{CoreError, Result};

pub struct PgWebhookStore {
    pool: PgPool,
}

impl PgWebhookStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct WebhookRow {
    uuid: Uuid,
    event: String,
    url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WebhookRow {
    fn into_webhook(self) -> Result<Webhook> {
        Ok(Webhook {
            uuid: self.uuid,
            event: WebhookEvent::from_str(&self.event)
                .map_err(|_| CoreError::InvariantViolation(format!("bad event {}", self.event)))?,
            url: url::Url::parse(&self.url)
                .map_err(|e| CoreError::InvariantViolation(format!("bad url: {e}")))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl WebhookStore for PgWebhookStore {
    async fn subscriptions_for_event(&self, event: WebhookEvent) -> Result<Vec<Webhook>> {
        let rows: Vec<WebhookRow> = sqlx::query_as(
            "SELECT * FROM webhook WHERE event = $1 AND deleted_at IS NULL",
        )
        .bind(event.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(WebhookRow::into_webhook).collect()
    }

    async fn record_execution(&self, execution: &WebhookExecution) -> Result<()> {
        let request_headers: Value = serde_json::to_value(&execution.request_headers)
            .map_err(|e| CoreError::InvariantViolation(e.to_string()))?;
        let response_headers: Value = serde_json::to_value(&execution.response_headers)
            .map_err(|e| CoreError::InvariantViolation(e.to_string()))?;

        sqlx::query(
            "INSERT INTO \"webhookExecution\" (
                uuid, event, url, request_headers, request_body,
                response_status, response_headers, response_body, created_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(execution.uuid)
        .bind(execution.event.as_str())
        .bind(execution.url.as_str())
        .bind(Json(request_headers))
        .bind(Json(&execution.request_body))
        .bind(execution.response_status as i32)
        .bind(Json(response_headers))
        .bind(&execution.response_body)
        .bind(execution.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

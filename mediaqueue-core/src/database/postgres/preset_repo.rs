//! `PresetStore` over PostgreSQL (spec §3, §4.10, §6). Read-only from the
//! watchfolder scanner's point of view; full preset CRUD belongs to the
//! admin API surface and is out of scope here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediaqueue_model::{HookRecord, Label, PathPair, Preset, Webhook};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::labels::load_entity_labels;
use crate::database::ports::PresetStore;
use crate::error::Result;

pub struct PgPresetStore {
    pool: PgPool,
}

impl PgPresetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct PresetRow {
    uuid: Uuid,
    name: String,
    description: String,
    command: Json<PathPair>,
    output_file: Json<PathPair>,
    priority: i32,
    retries: i32,
    webhooks: Json<Vec<Webhook>>,
    pre_processing: Json<HookRecord>,
    post_processing: Json<HookRecord>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl PresetRow {
    fn into_preset(self, labels: Vec<Label>) -> Preset {
        Preset {
            uuid: self.uuid,
            name: self.name,
            description: self.description,
            command: self.command.0,
            output_file: self.output_file.0,
            priority: self.priority.max(0) as u32,
            retries: self.retries.max(0) as u32,
            labels,
            webhooks: self.webhooks.0,
            pre_processing: self.pre_processing.0,
            post_processing: self.post_processing.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }
}

#[async_trait]
impl PresetStore for PgPresetStore {
    async fn get(&self, uuid: Uuid) -> Result<Preset> {
        let row: PresetRow =
            sqlx::query_as("SELECT * FROM presets WHERE uuid = $1 AND deleted_at IS NULL")
                .bind(uuid)
                .fetch_one(&self.pool)
                .await?;
        let labels = load_entity_labels(&self.pool, "preset_labels", "preset_uuid", uuid).await?;
        Ok(row.into_preset(labels))
    }
}

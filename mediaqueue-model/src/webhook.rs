#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The closed set of event subjects a webhook subscription can name (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WebhookEvent {
    #[cfg_attr(feature = "serde", serde(rename = "batch.created"))]
    BatchCreated,
    #[cfg_attr(feature = "serde", serde(rename = "batch.finished"))]
    BatchFinished,
    #[cfg_attr(feature = "serde", serde(rename = "task.created"))]
    TaskCreated,
    #[cfg_attr(feature = "serde", serde(rename = "task.updated"))]
    TaskUpdated,
    #[cfg_attr(feature = "serde", serde(rename = "task.deleted"))]
    TaskDeleted,
    #[cfg_attr(feature = "serde", serde(rename = "preset.created"))]
    PresetCreated,
    #[cfg_attr(feature = "serde", serde(rename = "preset.updated"))]
    PresetUpdated,
    #[cfg_attr(feature = "serde", serde(rename = "preset.deleted"))]
    PresetDeleted,
    #[cfg_attr(feature = "serde", serde(rename = "webhook.created"))]
    WebhookCreated,
    #[cfg_attr(feature = "serde", serde(rename = "webhook.updated"))]
    WebhookUpdated,
    #[cfg_attr(feature = "serde", serde(rename = "webhook.deleted"))]
    WebhookDeleted,
    #[cfg_attr(feature = "serde", serde(rename = "watchfolder.created"))]
    WatchfolderCreated,
    #[cfg_attr(feature = "serde", serde(rename = "watchfolder.updated"))]
    WatchfolderUpdated,
    #[cfg_attr(feature = "serde", serde(rename = "watchfolder.deleted"))]
    WatchfolderDeleted,
}

impl WebhookEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BatchCreated => "batch.created",
            Self::BatchFinished => "batch.finished",
            Self::TaskCreated => "task.created",
            Self::TaskUpdated => "task.updated",
            Self::TaskDeleted => "task.deleted",
            Self::PresetCreated => "preset.created",
            Self::PresetUpdated => "preset.updated",
            Self::PresetDeleted => "preset.deleted",
            Self::WebhookCreated => "webhook.created",
            Self::WebhookUpdated => "webhook.updated",
            Self::WebhookDeleted => "webhook.deleted",
            Self::WatchfolderCreated => "watchfolder.created",
            Self::WatchfolderUpdated => "watchfolder.updated",
            Self::WatchfolderDeleted => "watchfolder.deleted",
        }
    }

    /// Inline webhooks attached directly to a task are filtered to the
    /// `task.*` family (§1.2 supplemented feature).
    pub fn is_task_family(self) -> bool {
        matches!(self, Self::TaskCreated | Self::TaskUpdated | Self::TaskDeleted)
    }
}

impl std::str::FromStr for WebhookEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch.created" => Ok(Self::BatchCreated),
            "batch.finished" => Ok(Self::BatchFinished),
            "task.created" => Ok(Self::TaskCreated),
            "task.updated" => Ok(Self::TaskUpdated),
            "task.deleted" => Ok(Self::TaskDeleted),
            "preset.created" => Ok(Self::PresetCreated),
            "preset.updated" => Ok(Self::PresetUpdated),
            "preset.deleted" => Ok(Self::PresetDeleted),
            "webhook.created" => Ok(Self::WebhookCreated),
            "webhook.updated" => Ok(Self::WebhookUpdated),
            "webhook.deleted" => Ok(Self::WebhookDeleted),
            "watchfolder.created" => Ok(Self::WatchfolderCreated),
            "watchfolder.updated" => Ok(Self::WatchfolderUpdated),
            "watchfolder.deleted" => Ok(Self::WatchfolderDeleted),
            other => Err(format!("unknown webhook event: {other}")),
        }
    }
}

/// A webhook subscription, standalone or inline on a task/preset (§3, §4.8).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Webhook {
    pub uuid: uuid::Uuid,
    pub event: WebhookEvent,
    pub url: url::Url,
    #[cfg(feature = "chrono")]
    pub created_at: DateTime<Utc>,
    #[cfg(feature = "chrono")]
    pub updated_at: DateTime<Utc>,
}

/// One row per delivery attempt that actually received a response (§3,
/// §4.8 step 4). Transport failures that exhaust the retry budget are
/// logged but never persisted here.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct WebhookExecution {
    pub uuid: uuid::Uuid,
    pub event: WebhookEvent,
    pub url: url::Url,
    pub request_headers: HashMap<String, String>,
    pub request_body: Value,
    pub response_status: u16,
    pub response_headers: HashMap<String, String>,
    pub response_body: String,
    #[cfg(feature = "chrono")]
    pub created_at: DateTime<Utc>,
}

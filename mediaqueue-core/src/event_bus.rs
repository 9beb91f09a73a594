//! In-process fan-out of domain events to the Webhook Engine and the
//! Broadcast Bus (spec §2, §9).
//!
//! Wiring the executor, webhook engine, and broadcast bus through this bus
//! rather than having them hold direct references to each other breaks the
//! cycle executor→webhooks→store→executor that the original implementation
//! has via its service-layer mutual references.

use mediaqueue_model::{Preset, Task, Watchfolder, Webhook, WebhookExecution};
use tokio::sync::broadcast;

/// One fanned-out domain occurrence. Each variant corresponds to a subject
/// in the closed set named by §4.8/§4.9/§6.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    BatchCreated { batch: uuid::Uuid },
    BatchFinished { batch: uuid::Uuid },
    TaskCreated(Box<Task>),
    TaskUpdated(Box<Task>),
    TaskDeleted { uuid: uuid::Uuid },
    PresetCreated(Box<Preset>),
    PresetUpdated(Box<Preset>),
    PresetDeleted { uuid: uuid::Uuid },
    WebhookCreated(Box<Webhook>),
    WebhookUpdated(Box<Webhook>),
    WebhookDeleted { uuid: uuid::Uuid },
    WatchfolderCreated(Box<Watchfolder>),
    WatchfolderUpdated(Box<Watchfolder>),
    WatchfolderDeleted { uuid: uuid::Uuid },
    WebhookExecutionCreated(Box<WebhookExecution>),
    SettingsUpdated,
    ClientUpdated { identifier: String, is_self: bool },
    LogCreated { level: String, message: String },
}

impl DomainEvent {
    /// The websocket/cluster subject name this event is broadcast under
    /// (§4.9). `log:created` is excluded from cluster fan-out per §4.9.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::BatchCreated { .. } => "batch:created",
            Self::BatchFinished { .. } => "batch:finished",
            Self::TaskCreated(_) => "task:created",
            Self::TaskUpdated(_) => "task:updated",
            Self::TaskDeleted { .. } => "task:deleted",
            Self::PresetCreated(_) => "preset:created",
            Self::PresetUpdated(_) => "preset:updated",
            Self::PresetDeleted { .. } => "preset:deleted",
            Self::WebhookCreated(_) => "webhook:created",
            Self::WebhookUpdated(_) => "webhook:updated",
            Self::WebhookDeleted { .. } => "webhook:deleted",
            Self::WatchfolderCreated(_) => "watchfolder:created",
            Self::WatchfolderUpdated(_) => "watchfolder:updated",
            Self::WatchfolderDeleted { .. } => "watchfolder:deleted",
            Self::WebhookExecutionCreated(_) => "webhookExecution:created",
            Self::SettingsUpdated => "settings:updated",
            Self::ClientUpdated { .. } => "client:updated",
            Self::LogCreated { .. } => "log:created",
        }
    }

    pub fn is_cluster_eligible(&self) -> bool {
        !matches!(self, Self::LogCreated { .. })
    }

    /// The JSON entity carried by this event, as it appears in the
    /// `payload` field of a websocket frame or cluster notify message
    /// (§4.9, §6).
    pub fn payload_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Self::BatchCreated { batch } | Self::BatchFinished { batch } => json!({ "uuid": batch }),
            Self::TaskCreated(t) | Self::TaskUpdated(t) => {
                serde_json::to_value(t.as_ref()).unwrap_or(serde_json::Value::Null)
            }
            Self::TaskDeleted { uuid }
            | Self::PresetDeleted { uuid }
            | Self::WebhookDeleted { uuid }
            | Self::WatchfolderDeleted { uuid } => json!({ "uuid": uuid }),
            Self::PresetCreated(p) | Self::PresetUpdated(p) => {
                serde_json::to_value(p.as_ref()).unwrap_or(serde_json::Value::Null)
            }
            Self::WebhookCreated(w) | Self::WebhookUpdated(w) => {
                serde_json::to_value(w.as_ref()).unwrap_or(serde_json::Value::Null)
            }
            Self::WatchfolderCreated(w) | Self::WatchfolderUpdated(w) => {
                serde_json::to_value(w.as_ref()).unwrap_or(serde_json::Value::Null)
            }
            Self::WebhookExecutionCreated(e) => {
                serde_json::to_value(e.as_ref()).unwrap_or(serde_json::Value::Null)
            }
            Self::SettingsUpdated => serde_json::Value::Null,
            Self::ClientUpdated { identifier, is_self } => {
                json!({ "identifier": identifier, "self": is_self })
            }
            Self::LogCreated { level, message } => json!({ "level": level, "message": message }),
        }
    }
}

const CHANNEL_CAPACITY: usize = 1024;

/// Thin wrapper over a `tokio::sync::broadcast` channel. Every subsystem
/// that needs to react to domain events (webhook engine, broadcast bus)
/// holds its own `subscribe()`d receiver; the executor and the various
/// service entry points hold the sender.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        // No receivers (e.g. in a unit test) is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

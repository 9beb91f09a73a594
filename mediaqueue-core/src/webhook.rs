//! Webhook Engine (spec §4.8): fires subscribed and inline ("direct")
//! webhook deliveries, each its own spawned task with a fixed retry
//! schedule, persisting a `WebhookExecution` row on the first response
//! received.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mediaqueue_model::{Webhook, WebhookEvent, WebhookExecution};
use serde_json::Value;
use uuid::Uuid;

use tokio_util::sync::CancellationToken;

use crate::database::WebhookStore;
use crate::error::CoreError;
use crate::event_bus::{DomainEvent, EventBus};

/// Fixed retry delays (§4.8 step 3): up to four attempts total.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(3),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

#[derive(Clone)]
pub struct WebhookEngine {
    http: reqwest::Client,
    store: Arc<dyn WebhookStore>,
    events: EventBus,
    user_agent: String,
    subscribed_deliveries: Arc<AtomicU64>,
    direct_deliveries: Arc<AtomicU64>,
}

impl WebhookEngine {
    pub fn new(store: Arc<dyn WebhookStore>, events: EventBus, app_name: &str, app_version: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            store,
            events,
            user_agent: format!("{app_name}/{app_version}"),
            subscribed_deliveries: Arc::new(AtomicU64::new(0)),
            direct_deliveries: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribes to the Event Bus and fires deliveries for every event
    /// in the §6 closed set, until `shutdown` fires. Wiring through the
    /// bus rather than having the executor/task service call `fire`
    /// directly is what breaks the executor→webhooks→store cycle (§9).
    pub async fn run(self, events: EventBus, shutdown: CancellationToken) {
        let mut receiver = events.subscribe();
        loop {
            tokio::select! {
                event = receiver.recv() => {
                    match event {
                        Ok(event) => self.handle(&event).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }

    async fn handle(&self, event: &DomainEvent) {
        let Some(webhook_event) = webhook_event_for(event) else {
            return;
        };
        let payload = event.payload_json();

        if let Err(e) = self.fire(webhook_event, payload.clone()).await {
            tracing::warn!(error = %e, "failed to query webhook subscriptions");
        }

        if webhook_event.is_task_family() {
            if let Some(task) = task_of(event) {
                self.fire_direct(&task.webhooks, webhook_event, payload);
            }
        }
    }

    pub fn subscribed_delivery_count(&self) -> u64 {
        self.subscribed_deliveries.load(Ordering::Relaxed)
    }

    pub fn direct_delivery_count(&self) -> u64 {
        self.direct_deliveries.load(Ordering::Relaxed)
    }

    /// Queries persisted subscriptions for an exact `event` match and
    /// schedules each delivery as its own spawned task (§4.8 `Fire`).
    pub async fn fire(&self, event: WebhookEvent, payload: Value) -> crate::error::Result<()> {
        let subs = self.store.subscriptions_for_event(event).await?;
        for sub in subs {
            let engine = self.clone();
            let payload = payload.clone();
            self.subscribed_deliveries.fetch_add(1, Ordering::Relaxed);
            tokio::spawn(async move {
                engine.deliver(&sub, payload).await;
            });
        }
        Ok(())
    }

    /// Delivers each inline subscription in `inline` whose event matches
    /// `event`, without persisting the subscription itself (§4.8
    /// `FireDirect`). Callers attaching a task's inline webhooks must
    /// pre-filter `inline` to the `task.*` family (§1.2) before calling.
    pub fn fire_direct(&self, inline: &[Webhook], event: WebhookEvent, payload: Value) {
        for sub in inline.iter().filter(|s| s.event == event) {
            let engine = self.clone();
            let sub = sub.clone();
            let payload = payload.clone();
            self.direct_deliveries.fetch_add(1, Ordering::Relaxed);
            tokio::spawn(async move {
                engine.deliver(&sub, payload).await;
            });
        }
    }

    async fn deliver(&self, sub: &Webhook, payload: Value) {
        let body = serde_json::json!({ "event": sub.event.as_str(), "data": payload });

        let mut attempt = 0usize;
        loop {
            let response = self
                .http
                .post(sub.url.as_str())
                .header("Content-Type", "application/json")
                .header("User-Agent", &self.user_agent)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    self.record_execution(sub, &body, resp).await;
                    return;
                }
                Err(e) if attempt < RETRY_DELAYS.len() => {
                    tracing::debug!(url = %sub.url, attempt, error = %e, "webhook delivery attempt failed, retrying");
                    tokio::time::sleep(RETRY_DELAYS[attempt]).await;
                    attempt += 1;
                }
                Err(e) => {
                    let err = CoreError::WebhookDeliveryFailed(e.to_string());
                    tracing::warn!(url = %sub.url, error = %err, "webhook delivery exhausted retries");
                    return;
                }
            }
        }
    }

    async fn record_execution(&self, sub: &Webhook, request_body: &Value, response: reqwest::Response) {
        let status = response.status().as_u16();
        let response_headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let response_body = response.text().await.unwrap_or_default();

        let execution = WebhookExecution {
            uuid: Uuid::new_v4(),
            event: sub.event,
            url: sub.url.clone(),
            request_headers: [
                ("Content-Type".to_string(), "application/json".to_string()),
                ("User-Agent".to_string(), self.user_agent.clone()),
            ]
            .into_iter()
            .collect(),
            request_body: request_body.clone(),
            response_status: status,
            response_headers,
            response_body,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.record_execution(&execution).await {
            tracing::warn!(error = %e, "failed to persist webhook execution");
            return;
        }
        self.events
            .publish(DomainEvent::WebhookExecutionCreated(Box::new(execution)));
    }
}

/// Maps a domain event onto the §6 closed webhook-subject set; events
/// outside it (`settings:updated`, `client:updated`, `log:created`,
/// `webhookExecution:created`) have no webhook subscription surface.
fn webhook_event_for(event: &DomainEvent) -> Option<WebhookEvent> {
    match event {
        DomainEvent::BatchCreated { .. } => Some(WebhookEvent::BatchCreated),
        DomainEvent::BatchFinished { .. } => Some(WebhookEvent::BatchFinished),
        DomainEvent::TaskCreated(_) => Some(WebhookEvent::TaskCreated),
        DomainEvent::TaskUpdated(_) => Some(WebhookEvent::TaskUpdated),
        DomainEvent::TaskDeleted { .. } => Some(WebhookEvent::TaskDeleted),
        DomainEvent::PresetCreated(_) => Some(WebhookEvent::PresetCreated),
        DomainEvent::PresetUpdated(_) => Some(WebhookEvent::PresetUpdated),
        DomainEvent::PresetDeleted { .. } => Some(WebhookEvent::PresetDeleted),
        DomainEvent::WebhookCreated(_) => Some(WebhookEvent::WebhookCreated),
        DomainEvent::WebhookUpdated(_) => Some(WebhookEvent::WebhookUpdated),
        DomainEvent::WebhookDeleted { .. } => Some(WebhookEvent::WebhookDeleted),
        DomainEvent::WatchfolderCreated(_) => Some(WebhookEvent::WatchfolderCreated),
        DomainEvent::WatchfolderUpdated(_) => Some(WebhookEvent::WatchfolderUpdated),
        DomainEvent::WatchfolderDeleted { .. } => Some(WebhookEvent::WatchfolderDeleted),
        DomainEvent::WebhookExecutionCreated(_)
        | DomainEvent::SettingsUpdated
        | DomainEvent::ClientUpdated { .. }
        | DomainEvent::LogCreated { .. } => None,
    }
}

/// The task carried by a `task:created`/`task:updated` event, whose
/// `webhooks` field is the source of direct/inline deliveries (§1.2).
/// `task:deleted` carries only a UUID, so it has none to offer.
fn task_of(event: &DomainEvent) -> Option<&mediaqueue_model::Task> {
    match event {
        DomainEvent::TaskCreated(task) | DomainEvent::TaskUpdated(task) => Some(task),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mediaqueue_model::{PathPair, Task, TaskSource, TaskStatus};

    fn sample_task() -> Task {
        let now = Utc::now();
        Task {
            uuid: Uuid::new_v4(),
            batch: None,
            name: "sample".to_string(),
            command: PathPair::new("ffmpeg".to_string()),
            input_file: PathPair::new("/in.mp4".to_string()),
            output_file: PathPair::new("/out.mp4".to_string()),
            metadata: Value::Null,
            status: TaskStatus::Queued,
            progress: 0.0,
            remaining: -1.0,
            priority: 0,
            labels: Vec::new(),
            source: TaskSource::Api,
            webhooks: Vec::new(),
            pre_processing: Default::default(),
            post_processing: Default::default(),
            retries: 0,
            retried: 0,
            error: String::new(),
            client_identifier: None,
            started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn webhook_event_for_covers_the_closed_set() {
        let uuid = Uuid::new_v4();
        let task = Box::new(sample_task());

        assert_eq!(
            webhook_event_for(&DomainEvent::BatchCreated { batch: uuid }),
            Some(WebhookEvent::BatchCreated)
        );
        assert_eq!(
            webhook_event_for(&DomainEvent::BatchFinished { batch: uuid }),
            Some(WebhookEvent::BatchFinished)
        );
        assert_eq!(
            webhook_event_for(&DomainEvent::TaskCreated(task.clone())),
            Some(WebhookEvent::TaskCreated)
        );
        assert_eq!(
            webhook_event_for(&DomainEvent::TaskUpdated(task)),
            Some(WebhookEvent::TaskUpdated)
        );
        assert_eq!(
            webhook_event_for(&DomainEvent::TaskDeleted { uuid }),
            Some(WebhookEvent::TaskDeleted)
        );
        assert_eq!(
            webhook_event_for(&DomainEvent::WebhookDeleted { uuid }),
            Some(WebhookEvent::WebhookDeleted)
        );
        assert_eq!(
            webhook_event_for(&DomainEvent::WatchfolderDeleted { uuid }),
            Some(WebhookEvent::WatchfolderDeleted)
        );
    }

    #[test]
    fn webhook_event_for_excludes_events_outside_the_subject_set() {
        assert_eq!(webhook_event_for(&DomainEvent::SettingsUpdated), None);
        assert_eq!(
            webhook_event_for(&DomainEvent::ClientUpdated {
                identifier: "c1".to_string(),
                is_self: false,
            }),
            None
        );
        assert_eq!(
            webhook_event_for(&DomainEvent::LogCreated {
                level: "info".to_string(),
                message: "hi".to_string(),
            }),
            None
        );
    }

    #[test]
    fn task_of_returns_the_task_for_created_and_updated_only() {
        let task = Box::new(sample_task());
        let uuid = task.uuid;

        assert!(task_of(&DomainEvent::TaskCreated(task.clone())).is_some());
        assert!(task_of(&DomainEvent::TaskUpdated(task)).is_some());
        assert!(task_of(&DomainEvent::TaskDeleted { uuid }).is_none());
        assert!(task_of(&DomainEvent::BatchCreated { batch: uuid }).is_none());
    }
}

//! Repository ports: the persistence-agnostic surface the scheduler,
//! executor, webhook engine, watchfolder scanner, and registrar program
//! against. `mediaqueue-core::database::postgres` is the only
//! implementation, but keeping these as traits lets every subsystem be
//! unit tested with a `mockall`-generated mock instead of a live
//! database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediaqueue_model::{
    Client, Label, Preset, Task, Watchfolder, Webhook, WebhookEvent, WebhookExecution,
};
use uuid::Uuid;

use crate::error::Result;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Atomically claims up to `limit` queued tasks eligible for
    /// `client_labels` (§4.2, §4.3) and returns them already
    /// transitioned to `RUNNING`.
    async fn claim(&self, limit: i64, client_labels: &[Label]) -> Result<Vec<Task>>;

    async fn insert(&self, task: &Task) -> Result<()>;

    async fn get(&self, uuid: Uuid) -> Result<Task>;

    /// The single mutation entry point named in §4.4: persists `task`
    /// as-is (callers are responsible for `clientIdentifier` rewriting).
    async fn update(&self, task: &Task) -> Result<()>;

    async fn count_unfinished_in_batch(&self, batch: Uuid) -> Result<i64>;

    /// §4.11 startup sweep: tasks `RUNNING` under `client_identifier`.
    async fn fail_running_for_client(
        &self,
        client_identifier: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>>;

    /// §4.11 cluster reaper: tasks `RUNNING` whose owning client's
    /// `lastSeen` is older than `stale_before`.
    async fn fail_running_for_stale_clients(
        &self,
        stale_before: DateTime<Utc>,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>>;
}

#[async_trait]
pub trait PresetStore: Send + Sync {
    async fn get(&self, uuid: Uuid) -> Result<Preset>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Upserts the heartbeat row, adopting an existing row's `cluster`
    /// UUID on first write (§4.11).
    async fn upsert_heartbeat(&self, client: &Client) -> Result<Client>;

    async fn stale_before(&self, threshold: DateTime<Utc>) -> Result<Vec<Client>>;
}

#[async_trait]
pub trait WatchfolderStore: Send + Sync {
    /// §4.10 step 1: locking fetch. `Ok(None)` means either the folder
    /// is gone or another node already advanced `lastRun` this
    /// interval (`locked=true`).
    async fn first_and_lock(
        &self,
        uuid: Uuid,
        interval: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Watchfolder>>;

    async fn touch_last_check(&self, uuid: Uuid, now: DateTime<Utc>, error: &str) -> Result<()>;

    async fn list_active(&self) -> Result<Vec<Watchfolder>>;

    /// Distinguishes "the folder was deleted" from `first_and_lock`'s
    /// overloaded `Ok(None)` (which also fires when another node has
    /// already advanced `lastRun` this interval), so the scanner loop
    /// knows when to terminate rather than just skip a tick (§4.10
    /// steps 1-2).
    async fn exists(&self, uuid: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn subscriptions_for_event(&self, event: WebhookEvent) -> Result<Vec<Webhook>>;

    async fn record_execution(&self, execution: &WebhookExecution) -> Result<()>;
}

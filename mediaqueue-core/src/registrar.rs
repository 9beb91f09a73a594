//! Client Registrar and stale-task reaper (spec §4.11): the per-process
//! heartbeat loop plus the startup and periodic sweeps that fail off
//! `RUNNING` tasks left behind by an unclean shutdown or an offline peer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mediaqueue_model::{Client, Label};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::database::{ClientStore, TaskStore};
use crate::error::Result;
use crate::event_bus::{DomainEvent, EventBus};
use crate::task_service::TaskService;

const STALE_THRESHOLD: chrono::Duration = chrono::Duration::seconds(60);
const DISCONNECT_CAUSE: &str = "client disconnected during execution";

pub struct ClientDescriptor {
    pub identifier: String,
    pub session: Uuid,
    /// Used only the very first time this identifier's row is written;
    /// every later heartbeat adopts whatever `cluster` value the row
    /// already carries (§4.11).
    pub cluster_seed: Uuid,
    pub os: String,
    pub arch: String,
    pub version: String,
    pub ffmpeg_path: String,
    pub max_concurrent_tasks: u32,
    pub labels: Vec<Label>,
}

pub struct Registrar {
    clients: Arc<dyn ClientStore>,
    tasks_store: Arc<dyn TaskStore>,
    tasks: TaskService,
    events: EventBus,
    descriptor: ClientDescriptor,
    /// Startup-configurable (spec §1.1 `registrar_tick_ms`); defaults to
    /// 15s per §4.11.
    heartbeat_period: Duration,
}

impl Registrar {
    pub fn new(
        clients: Arc<dyn ClientStore>,
        tasks_store: Arc<dyn TaskStore>,
        tasks: TaskService,
        events: EventBus,
        descriptor: ClientDescriptor,
        heartbeat_period: Duration,
    ) -> Self {
        Self {
            clients,
            tasks_store,
            tasks,
            events,
            descriptor,
            heartbeat_period,
        }
    }

    /// Startup sweep (§4.11): before the first heartbeat, atomically
    /// fail any task this identifier left `RUNNING` from a previous,
    /// uncleanly terminated process.
    pub async fn reap_own_stale_tasks(&self) -> Result<()> {
        let now = Utc::now();
        let orphaned = self
            .tasks_store
            .fail_running_for_client(&self.descriptor.identifier, DISCONNECT_CAUSE, now)
            .await?;
        for task in &orphaned {
            self.tasks.publish_terminal_update(task).await?;
        }
        if !orphaned.is_empty() {
            tracing::info!(count = orphaned.len(), "reaped own stale running tasks at startup");
        }
        Ok(())
    }

    /// Runs the 15s heartbeat loop until `shutdown` fires. Each tick
    /// upserts this client's row and broadcasts `client:updated`, then
    /// runs the cluster-wide stale-client reaper (§4.11 "added"
    /// paragraph — not restricted to locally owned tasks).
    pub async fn run(&self, shutdown: CancellationToken) {
        if let Err(e) = self.reap_own_stale_tasks().await {
            tracing::warn!(error = %e, "startup stale-task reap failed");
        }

        let mut ticker = tokio::time::interval(self.heartbeat_period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.heartbeat().await {
                        tracing::warn!(error = %e, "heartbeat failed");
                    }
                    if let Err(e) = self.reap_stale_cluster_tasks().await {
                        tracing::warn!(error = %e, "cluster stale-task reap failed");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }

    async fn heartbeat(&self) -> Result<()> {
        let client = Client {
            identifier: self.descriptor.identifier.clone(),
            session: self.descriptor.session,
            cluster: self.descriptor.cluster_seed,
            os: self.descriptor.os.clone(),
            arch: self.descriptor.arch.clone(),
            version: self.descriptor.version.clone(),
            ffmpeg_path: self.descriptor.ffmpeg_path.clone(),
            max_concurrent_tasks: self.descriptor.max_concurrent_tasks,
            last_seen: Utc::now(),
            labels: self.descriptor.labels.clone(),
        };
        self.clients.upsert_heartbeat(&client).await?;
        self.events.publish(DomainEvent::ClientUpdated {
            identifier: client.identifier,
            is_self: true,
        });
        Ok(())
    }

    /// Cluster reaper for offline peers (§4.11 "added" paragraph,
    /// resolving §9 open question 3): reaps any `RUNNING` task whose
    /// owning client's heartbeat is stale, regardless of which node's
    /// registrar performs the sweep.
    async fn reap_stale_cluster_tasks(&self) -> Result<()> {
        let now = Utc::now();
        let stale_before = now - STALE_THRESHOLD;
        let orphaned = self
            .tasks_store
            .fail_running_for_stale_clients(stale_before, DISCONNECT_CAUSE, now)
            .await?;
        for task in &orphaned {
            self.tasks.publish_terminal_update(task).await?;
        }
        if !orphaned.is_empty() {
            tracing::info!(count = orphaned.len(), "reaped stale-client running tasks");
        }
        Ok(())
    }
}

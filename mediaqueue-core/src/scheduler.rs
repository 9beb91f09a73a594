//! Scheduler (spec §4.2): a single long-lived 1s-tick loop per server
//! that claims eligible queued tasks up to the local concurrency budget
//! and spawns the Task Executor for each.

use std::sync::Arc;
use std::time::Duration;

use mediaqueue_model::Label;
use tokio_util::sync::CancellationToken;

use crate::cancellation::CancellationRegistry;
use crate::database::TaskStore;
use crate::executor::{self, ExecutorContext};
use crate::ffmpeg;
use crate::task_service::TaskService;

pub struct SchedulerConfig {
    pub max_concurrent_tasks: usize,
    pub client_labels: Vec<Label>,
    pub ffmpeg_binary_name: String,
    /// Startup-configurable (spec §1.1 `scheduler_tick_ms`); defaults to
    /// 1s per §4.2.
    pub tick_period: Duration,
}

pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    tasks: TaskService,
    cancellation: Arc<CancellationRegistry>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        tasks: TaskService,
        cancellation: Arc<CancellationRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            tasks,
            cancellation,
            config,
        }
    }

    /// Runs until `shutdown` fires. Blocks at startup until the
    /// configured ffmpeg binary is found on `PATH` (§4.6), since the
    /// scheduler is gated on that discovery succeeding.
    pub async fn run(self, shutdown: CancellationToken) {
        let ffmpeg_path = match ffmpeg::discover_binary(&self.config.ffmpeg_binary_name, &shutdown).await {
            Ok(path) => path,
            Err(_) => return, // shutdown fired before discovery succeeded
        };
        tracing::info!(ffmpeg_path = %ffmpeg_path, "ffmpeg binary located, scheduler starting");

        let mut ticker = tokio::time::interval(self.config.tick_period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(&ffmpeg_path).await {
                        tracing::warn!(error = %e, "scheduler tick failed");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }

    async fn tick(&self, ffmpeg_path: &str) -> crate::error::Result<()> {
        let free = self.config.max_concurrent_tasks.saturating_sub(self.cancellation.len());
        if free == 0 {
            return Ok(());
        }

        let claimed = self.store.claim(free as i64, &self.config.client_labels).await?;
        for task in claimed {
            let ctx = ExecutorContext {
                tasks: self.tasks.clone(),
                cancellation: self.cancellation.clone(),
                ffmpeg_path: ffmpeg_path.to_string(),
            };
            tokio::spawn(executor::execute(task, ctx));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MockTaskStore;
    use crate::event_bus::EventBus;
    use uuid::Uuid;

    #[tokio::test]
    async fn tick_skips_claim_once_local_capacity_is_full() {
        let cancellation = Arc::new(CancellationRegistry::new());
        cancellation.register(Uuid::new_v4());
        cancellation.register(Uuid::new_v4());

        let mut store = MockTaskStore::new();
        store.expect_claim().times(0);

        let events = EventBus::new();
        let tasks = TaskService::new(Arc::new(MockTaskStore::new()), events, "node-a");
        let scheduler = Scheduler::new(
            Arc::new(store),
            tasks,
            cancellation,
            SchedulerConfig {
                max_concurrent_tasks: 2,
                client_labels: Vec::new(),
                ffmpeg_binary_name: "ffmpeg".to_string(),
                tick_period: Duration::from_secs(1),
            },
        );

        scheduler.tick("ffmpeg").await.unwrap();
    }

    #[tokio::test]
    async fn tick_claims_up_to_the_remaining_capacity() {
        let cancellation = Arc::new(CancellationRegistry::new());
        cancellation.register(Uuid::new_v4());

        let mut store = MockTaskStore::new();
        store
            .expect_claim()
            .withf(|limit, _labels| *limit == 1)
            .times(1)
            .returning(|_, _| Ok(Vec::new()));

        let events = EventBus::new();
        let tasks = TaskService::new(Arc::new(MockTaskStore::new()), events, "node-a");
        let scheduler = Scheduler::new(
            Arc::new(store),
            tasks,
            cancellation,
            SchedulerConfig {
                max_concurrent_tasks: 2,
                client_labels: Vec::new(),
                ffmpeg_binary_name: "ffmpeg".to_string(),
                tick_period: Duration::from_secs(1),
            },
        );

        scheduler.tick("ffmpeg").await.unwrap();
    }
}

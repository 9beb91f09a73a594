//! The single task mutation entry point named in §4.4: every write to a
//! task's state — from the executor, the registrar's reaper sweeps, or
//! an admin-triggered cancel — goes through `TaskService::update` so the
//! `clientIdentifier` rewrite, the `task.updated` fan-out, and the
//! batch-completion accounting always happen together.

use std::sync::Arc;

use mediaqueue_model::{Task, TaskStatus};

use crate::database::TaskStore;
use crate::error::Result;
use crate::event_bus::{DomainEvent, EventBus};

#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    events: EventBus,
    self_identifier: String,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>, events: EventBus, self_identifier: impl Into<String>) -> Self {
        Self {
            store,
            events,
            self_identifier: self_identifier.into(),
        }
    }

    /// Persists `task`, rewriting `clientIdentifier` to this process's
    /// own identifier first (§4.4). Fires `task:updated`, and — if the
    /// task belongs to a batch and just reached a terminal status —
    /// counts the batch's remaining unfinished tasks and fires
    /// `batch:finished` once it hits zero.
    pub async fn update(&self, task: &mut Task) -> Result<()> {
        task.client_identifier = Some(self.self_identifier.clone());
        self.store.update(task).await?;
        self.events.publish(DomainEvent::TaskUpdated(Box::new(task.clone())));

        if let Some(batch) = task.batch {
            if task.status.is_terminal() {
                let remaining = self.store.count_unfinished_in_batch(batch).await?;
                if remaining == 0 {
                    self.events.publish(DomainEvent::BatchFinished { batch });
                }
            }
        }
        Ok(())
    }

    /// Inserts a newly submitted task and fires `task:created` (and
    /// `batch:created` the first time a batch UUID is seen by the
    /// caller — batch-creation bookkeeping itself lives in the
    /// submission path, not here, since only the caller knows whether
    /// this is the first task of the batch).
    pub async fn create(&self, task: &Task) -> Result<()> {
        self.store.insert(task).await?;
        self.events.publish(DomainEvent::TaskCreated(Box::new(task.clone())));
        Ok(())
    }

    pub fn self_identifier(&self) -> &str {
        &self.self_identifier
    }

    /// Fans out `task.updated` (and `batch.finished` accounting) for a
    /// task a bulk SQL statement already transitioned and persisted —
    /// the registrar's reaper sweeps (§4.11), which must *not* rewrite
    /// `clientIdentifier` to self the way `update` does, since the
    /// whole point of the record is which client the task was running
    /// on when it was orphaned.
    pub async fn publish_terminal_update(&self, task: &Task) -> Result<()> {
        self.events.publish(DomainEvent::TaskUpdated(Box::new(task.clone())));
        if let Some(batch) = task.batch {
            if task.status.is_terminal() {
                let remaining = self.store.count_unfinished_in_batch(batch).await?;
                if remaining == 0 {
                    self.events.publish(DomainEvent::BatchFinished { batch });
                }
            }
        }
        Ok(())
    }
}

/// `true` if transitioning from `current` to `next` is a no-op
/// (§7 `InvariantViolation`: a terminal state never transitions except
/// via an explicit restart, which re-creates the task's queued state
/// through a fresh submission rather than through this check).
pub fn is_noop_transition(current: TaskStatus, next: TaskStatus) -> bool {
    current.is_terminal() && current == next
}

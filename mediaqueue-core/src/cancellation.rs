//! Registry mapping a running task's UUID to its `CancellationToken`
//! (spec §5, §9's design note). The scheduler inserts an entry when it
//! claims a task and removes it once the executor's pipeline finishes;
//! an admin-triggered cancel looks the token up and fires it.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: DashMap<Uuid, CancellationToken>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh token for `task_uuid`, replacing any stale
    /// entry left behind by a previous run of the same task.
    pub fn register(&self, task_uuid: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.insert(task_uuid, token.clone());
        token
    }

    pub fn unregister(&self, task_uuid: &Uuid) {
        self.tokens.remove(task_uuid);
    }

    /// Returns `true` if a running task was found and cancelled.
    pub fn cancel(&self, task_uuid: &Uuid) -> bool {
        match self.tokens.get(task_uuid) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, task_uuid: &Uuid) -> bool {
        self.tokens.contains_key(task_uuid)
    }

    /// Count of tasks this node is currently executing — the
    /// scheduler's `liveLocalCount` (§4.2 step 2).
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_unknown_task_returns_false() {
        let registry = CancellationRegistry::new();
        assert!(!registry.cancel(&Uuid::new_v4()));
    }

    #[test]
    fn register_then_cancel_fires_token() {
        let registry = CancellationRegistry::new();
        let id = Uuid::new_v4();
        let token = registry.register(id);
        assert!(registry.cancel(&id));
        assert!(token.is_cancelled());
    }

    #[test]
    fn unregister_removes_entry() {
        let registry = CancellationRegistry::new();
        let id = Uuid::new_v4();
        registry.register(id);
        registry.unregister(&id);
        assert!(!registry.is_running(&id));
    }
}

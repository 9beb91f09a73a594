//! Persistence Adapter: repository ports and their PostgreSQL
//! implementation (spec §6).

pub mod ports;
pub mod postgres;

pub use ports::{ClientStore, PresetStore, TaskStore, WatchfolderStore, WebhookStore};
#[cfg(test)]
pub use ports::MockTaskStore;

//! Shared data model for the mediaqueue task server.
//!
//! Storage-agnostic types used by both `mediaqueue-core` (business logic,
//! persistence, subprocess orchestration) and `mediaqueue-server` (process
//! bootstrap). Kept dependency-light so it can be built without pulling in
//! `sqlx` or `chrono` when only the plain shapes are needed.

pub mod client;
pub mod label;
pub mod label_like;
pub mod path_pair;
pub mod preset;
pub mod settings;
pub mod task;
pub mod watchfolder;
pub mod webhook;

pub use client::Client;
pub use label::Label;
pub use path_pair::PathPair;
pub use preset::Preset;
pub use settings::Settings;
pub use task::{HookRecord, Task, TaskSource, TaskStatus};
pub use watchfolder::{FileFilter, Watchfolder};
pub use webhook::{Webhook, WebhookEvent, WebhookExecution};

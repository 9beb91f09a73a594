//! Core library for mediaqueue: task scheduling, ffmpeg execution,
//! webhook delivery, watchfolder polling, and cluster broadcast.
//!
//! `mediaqueue-server` owns process bootstrap (config load, DB
//! connection, HTTP/websocket surface); this crate owns every
//! long-lived loop described in spec §5 and the persistence ports they
//! run against.

pub mod broadcast;
pub mod cancellation;
pub mod config;
pub mod database;
pub mod error;
pub mod event_bus;
pub mod executor;
pub mod ffmpeg;
pub mod hooks;
pub mod placeholder;
pub mod registrar;
pub mod scheduler;
pub mod shellwords;
pub mod task_service;
pub mod watchfolder;
pub mod webhook;

pub use cancellation::CancellationRegistry;
pub use config::ConfigStore;
pub use error::{CoreError, Result};
pub use event_bus::{DomainEvent, EventBus};
pub use executor::ExecutorContext;
pub use registrar::{ClientDescriptor, Registrar};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use task_service::TaskService;
pub use watchfolder::WatchfolderScanner;
pub use webhook::WebhookEngine;

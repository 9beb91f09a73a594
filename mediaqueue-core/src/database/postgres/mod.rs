//! PostgreSQL implementation of every repository port (spec §6).

mod client_repo;
mod labels;
mod preset_repo;
mod task_repo;
mod watchfolder_repo;
mod webhook_repo;

pub use client_repo::PgClientStore;
pub use preset_repo::PgPresetStore;
pub use task_repo::PgTaskStore;
pub use watchfolder_repo::PgWatchfolderStore;
pub use webhook_repo::PgWebhookStore;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{CoreError, Result};

/// Connects to `database_url` and runs any pending migrations under
/// `./migrations` (the teacher's `sqlx::migrate!` idiom, see
/// `ferrex-core/src/database/postgres.rs::initialize_schema`).
pub async fn connect_and_migrate(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| CoreError::TransientStore(format!("connect failed: {e}")))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| CoreError::TransientStore(format!("migration failed: {e}")))?;

    Ok(pool)
}

/// Bundles one `Arc`-free handle to every Postgres repository so
/// `mediaqueue-server` can construct them once at startup and pass
/// `Arc<dyn Trait>` views into each long-lived loop.
pub struct PostgresStores {
    pub tasks: PgTaskStore,
    pub clients: PgClientStore,
    pub watchfolders: PgWatchfolderStore,
    pub webhooks: PgWebhookStore,
    pub presets: PgPresetStore,
}

impl PostgresStores {
    pub fn new(pool: PgPool) -> Self {
        Self {
            tasks: PgTaskStore::new(pool.clone()),
            clients: PgClientStore::new(pool.clone()),
            watchfolders: PgWatchfolderStore::new(pool.clone()),
            webhooks: PgWebhookStore::new(pool.clone()),
            presets: PgPresetStore::new(pool),
        }
    }
}

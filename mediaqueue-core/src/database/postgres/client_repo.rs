//! `ClientStore` over PostgreSQL (spec §4.11, §6).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediaqueue_model::Client;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::labels::{load_client_labels, replace_client_labels};
use crate::database::ports::ClientStore;
use crate::error::Result;

pub struct PgClientStore {
    pool: PgPool,
}

impl PgClientStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ClientRow {
    identifier: String,
    session: Uuid,
    cluster: Uuid,
    os: String,
    arch: String,
    version: String,
    ffmpeg_path: String,
    max_concurrent_tasks: i32,
    last_seen: DateTime<Utc>,
}

impl ClientRow {
    fn into_client(self, labels: Vec<mediaqueue_model::Label>) -> Client {
        Client {
            identifier: self.identifier,
            session: self.session,
            cluster: self.cluster,
            os: self.os,
            arch: self.arch,
            version: self.version,
            ffmpeg_path: self.ffmpeg_path,
            max_concurrent_tasks: self.max_concurrent_tasks.max(0) as u32,
            last_seen: self.last_seen,
            labels,
        }
    }
}

#[async_trait]
impl ClientStore for PgClientStore {
    async fn upsert_heartbeat(&self, client: &Client) -> Result<Client> {
        // Adopt the cluster UUID of any existing client row on first write
        // (§4.11): a newly joining node has no row of its own yet, so the
        // first-mover's cluster becomes authoritative for the whole table.
        // Only when the table is empty does the caller-provided one stick.
        let existing_cluster: Option<(Uuid,)> =
            sqlx::query_as("SELECT cluster FROM client ORDER BY identifier LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        let cluster = existing_cluster.map(|(c,)| c).unwrap_or(client.cluster);

        let row: ClientRow = sqlx::query_as(
            "INSERT INTO client (
                identifier, session, cluster, os, arch, version,
                ffmpeg_path, max_concurrent_tasks, last_seen
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (identifier) DO UPDATE SET
                session = EXCLUDED.session,
                os = EXCLUDED.os,
                arch = EXCLUDED.arch,
                version = EXCLUDED.version,
                ffmpeg_path = EXCLUDED.ffmpeg_path,
                max_concurrent_tasks = EXCLUDED.max_concurrent_tasks,
                last_seen = EXCLUDED.last_seen
             RETURNING *",
        )
        .bind(&client.identifier)
        .bind(client.session)
        .bind(cluster)
        .bind(&client.os)
        .bind(&client.arch)
        .bind(&client.version)
        .bind(&client.ffmpeg_path)
        .bind(client.max_concurrent_tasks as i32)
        .bind(client.last_seen)
        .fetch_one(&self.pool)
        .await?;

        replace_client_labels(&self.pool, &client.identifier, &client.labels).await?;
        let labels = load_client_labels(&self.pool, &row.identifier).await?;
        Ok(row.into_client(labels))
    }

    async fn stale_before(&self, threshold: DateTime<Utc>) -> Result<Vec<Client>> {
        let rows: Vec<ClientRow> =
            sqlx::query_as("SELECT * FROM client WHERE last_seen < $1")
                .bind(threshold)
                .fetch_all(&self.pool)
                .await?;
        let mut clients = Vec::with_capacity(rows.len());
        for row in rows {
            let labels = load_client_labels(&self.pool, &row.identifier).await?;
            clients.push(row.into_client(labels));
        }
        Ok(clients)
    }
}

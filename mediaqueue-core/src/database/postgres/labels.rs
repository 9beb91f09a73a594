//! Shared label join-table helpers used by every entity repository
//! (`tasks`, `presets`, `watchfolder`, and the `client` table itself).

use mediaqueue_model::Label;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

/// Inserts any labels not already present in the `labels` dictionary
/// table and returns their ids, in the same order as `values`.
pub async fn ensure_label_ids(pool: &PgPool, values: &[Label]) -> Result<Vec<i64>> {
    let mut ids = Vec::with_capacity(values.len());
    for label in values {
        let id: (i64,) = sqlx::query_as(
            "INSERT INTO labels (value) VALUES ($1)
             ON CONFLICT (value) DO UPDATE SET value = EXCLUDED.value
             RETURNING id",
        )
        .bind(label.as_str())
        .fetch_one(pool)
        .await?;
        ids.push(id.0);
    }
    Ok(ids)
}

/// Replaces the label set attached to `entity_uuid` in `join_table`
/// (one of `task_labels`/`preset_labels`/`watchfolder_labels`, each
/// shaped `(<entity>_uuid uuid, label_id bigint)`).
pub async fn replace_entity_labels(
    pool: &PgPool,
    join_table: &str,
    fk_column: &str,
    entity_uuid: Uuid,
    labels: &[Label],
) -> Result<()> {
    let delete_sql = format!("DELETE FROM {join_table} WHERE {fk_column} = $1");
    sqlx::query(&delete_sql)
        .bind(entity_uuid)
        .execute(pool)
        .await?;

    let ids = ensure_label_ids(pool, labels).await?;
    let insert_sql = format!("INSERT INTO {join_table} ({fk_column}, label_id) VALUES ($1, $2)");
    for id in ids {
        sqlx::query(&insert_sql)
            .bind(entity_uuid)
            .bind(id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Loads the label set attached to `entity_uuid` from `join_table`.
pub async fn load_entity_labels(
    pool: &PgPool,
    join_table: &str,
    fk_column: &str,
    entity_uuid: Uuid,
) -> Result<Vec<Label>> {
    let sql = format!(
        "SELECT l.value FROM labels l
         JOIN {join_table} j ON j.label_id = l.id
         WHERE j.{fk_column} = $1
         ORDER BY l.value"
    );
    let rows: Vec<(String,)> = sqlx::query_as(&sql)
        .bind(entity_uuid)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(v,)| Label::new(v)).collect())
}

/// Loads the label set attached to `client_identifier` (text key rather
/// than uuid — the one join table keyed by the client's natural key).
pub async fn load_client_labels(pool: &PgPool, client_identifier: &str) -> Result<Vec<Label>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT l.value FROM labels l
         JOIN client_labels j ON j.label_id = l.id
         WHERE j.client_identifier = $1
         ORDER BY l.value",
    )
    .bind(client_identifier)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(v,)| Label::new(v)).collect())
}

pub async fn replace_client_labels(
    pool: &PgPool,
    client_identifier: &str,
    labels: &[Label],
) -> Result<()> {
    sqlx::query("DELETE FROM client_labels WHERE client_identifier = $1")
        .bind(client_identifier)
        .execute(pool)
        .await?;
    let ids = ensure_label_ids(pool, labels).await?;
    for id in ids {
        sqlx::query("INSERT INTO client_labels (client_identifier, label_id) VALUES ($1, $2)")
            .bind(client_identifier)
            .bind(id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

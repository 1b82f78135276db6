use chrono::{DateTime, Utc};
use fakt_common::Secret;
use sqlx::{FromRow, SqliteConnection};

use crate::db_types::ApiCredential;

/// Raw table shape. Converted before leaving this module so the secret is wrapped immediately.
#[derive(FromRow)]
struct CredentialRow {
    id: i64,
    display_name: String,
    key_hash: String,
    secret: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl From<CredentialRow> for ApiCredential {
    fn from(row: CredentialRow) -> Self {
        ApiCredential {
            id: row.id,
            display_name: row.display_name,
            key_hash: row.key_hash,
            secret: Secret::new(row.secret),
            is_active: row.is_active,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
        }
    }
}

/// Fetches an active credential by the exact hash of its key token.
pub async fn fetch_active_by_key_hash(
    key_hash: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ApiCredential>, sqlx::Error> {
    let row: Option<CredentialRow> =
        sqlx::query_as("SELECT * FROM api_credentials WHERE key_hash = $1 AND is_active = 1")
            .bind(key_hash)
            .fetch_optional(conn)
            .await?;
    Ok(row.map(ApiCredential::from))
}

pub async fn touch_last_used(credential_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE api_credentials SET last_used_at = CURRENT_TIMESTAMP WHERE id = $1")
        .bind(credential_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert_credential(
    display_name: &str,
    key_hash: &str,
    secret: &str,
    conn: &mut SqliteConnection,
) -> Result<ApiCredential, sqlx::Error> {
    let row: CredentialRow = sqlx::query_as(
        "INSERT INTO api_credentials (display_name, key_hash, secret) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(display_name)
    .bind(key_hash)
    .bind(secret)
    .fetch_one(conn)
    .await?;
    Ok(row.into())
}

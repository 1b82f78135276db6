use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{NewOutgoingWebhook, OutgoingWebhook, WebhookEndpoint, WebhookStatus};

/// Active registered endpoints whose source matches (NULL source matches all) and whose event
/// subscription covers the event. Subscription filtering happens here since the event list is
/// stored as JSON.
pub async fn active_endpoints(
    source: Option<&str>,
    event: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<WebhookEndpoint>, sqlx::Error> {
    let rows: Vec<WebhookEndpoint> =
        sqlx::query_as("SELECT * FROM webhook_endpoints WHERE is_active = 1 AND (source IS NULL OR source = $1)")
            .bind(source)
            .fetch_all(conn)
            .await?;
    Ok(rows.into_iter().filter(|ep| ep.subscribes_to(event)).collect())
}

pub async fn callback_url_for_invoice(
    invoice_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<String>, sqlx::Error> {
    let url: Option<(Option<String>,)> =
        sqlx::query_as("SELECT callback_url FROM order_meta WHERE invoice_id = $1")
            .bind(invoice_id)
            .fetch_optional(conn)
            .await?;
    Ok(url.and_then(|(u,)| u))
}

pub async fn endpoint_secret(url: &str, conn: &mut SqliteConnection) -> Result<Option<String>, sqlx::Error> {
    let secret: Option<(Option<String>,)> =
        sqlx::query_as("SELECT secret FROM webhook_endpoints WHERE url = $1 AND is_active = 1 LIMIT 1")
            .bind(url)
            .fetch_optional(conn)
            .await?;
    Ok(secret.and_then(|(s,)| s))
}

pub async fn insert_pending(
    webhook: NewOutgoingWebhook,
    conn: &mut SqliteConnection,
) -> Result<OutgoingWebhook, sqlx::Error> {
    let row = sqlx::query_as(
        r#"
        INSERT INTO webhooks_outgoing (invoice_id, target_url, event, payload)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(webhook.invoice_id)
    .bind(webhook.target_url)
    .bind(webhook.event)
    .bind(webhook.payload)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn record_delivery_state(
    webhook_id: i64,
    status: WebhookStatus,
    attempts: i64,
    last_error: Option<&str>,
    sent_at: Option<DateTime<Utc>>,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    trace!("📮️ Webhook {webhook_id} transitioning to {status} after {attempts} attempt(s)");
    let result = sqlx::query(
        r#"
        UPDATE webhooks_outgoing
        SET status = $1, attempts = $2, last_error = $3, sent_at = COALESCE($4, sent_at),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $5
        "#,
    )
    .bind(status)
    .bind(attempts)
    .bind(last_error)
    .bind(sent_at)
    .bind(webhook_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Oldest failed deliveries first, capped.
pub async fn fetch_failed(limit: i64, conn: &mut SqliteConnection) -> Result<Vec<OutgoingWebhook>, sqlx::Error> {
    let rows = sqlx::query_as("SELECT * FROM webhooks_outgoing WHERE status = 'FAILED' ORDER BY updated_at ASC LIMIT $1")
        .bind(limit)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

pub async fn fetch_webhook(webhook_id: i64, conn: &mut SqliteConnection) -> Result<Option<OutgoingWebhook>, sqlx::Error> {
    let row =
        sqlx::query_as("SELECT * FROM webhooks_outgoing WHERE id = $1").bind(webhook_id).fetch_optional(conn).await?;
    Ok(row)
}

pub async fn insert_endpoint(
    url: &str,
    secret: Option<&str>,
    source: Option<&str>,
    events: &str,
    conn: &mut SqliteConnection,
) -> Result<WebhookEndpoint, sqlx::Error> {
    let row = sqlx::query_as(
        "INSERT INTO webhook_endpoints (url, secret, source, events) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(url)
    .bind(secret)
    .bind(source)
    .bind(events)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{NewOutgoingWebhook, OutgoingWebhook, WebhookEndpoint, WebhookStatus};

#[derive(Debug, Clone, Error)]
pub enum WebhookStoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Outgoing webhook {0} does not exist")]
    WebhookNotFound(i64),
}

impl From<sqlx::Error> for WebhookStoreError {
    fn from(e: sqlx::Error) -> Self {
        WebhookStoreError::DatabaseError(e.to_string())
    }
}

/// Storage contract for the outbound webhook dispatcher.
///
/// The dispatcher persists a `PENDING` row before any network I/O, so a crash mid-delivery
/// leaves an auditable record rather than a silent drop. Delivery state transitions go through
/// [`WebhookStore::record_delivery_state`].
#[allow(async_fn_in_trait)]
pub trait WebhookStore: Clone {
    /// Active registered endpoints matching the event's source and name. An endpoint with a NULL
    /// source matches every source.
    async fn active_endpoints(&self, source: Option<&str>, event: &str) -> Result<Vec<WebhookEndpoint>, WebhookStoreError>;

    /// The per-order callback URL captured at ingestion time, if any.
    async fn callback_url_for_invoice(&self, invoice_id: i64) -> Result<Option<String>, WebhookStoreError>;

    /// The signing secret for an active registered endpoint, looked up by URL. Deliveries to
    /// callback URLs have no secret and are sent with an empty signature.
    async fn endpoint_secret(&self, url: &str) -> Result<Option<String>, WebhookStoreError>;

    /// Persists a new delivery in `PENDING` state and returns the stored row.
    async fn insert_pending_webhook(&self, webhook: NewOutgoingWebhook) -> Result<OutgoingWebhook, WebhookStoreError>;

    /// Records the result of a delivery attempt: the new status, cumulative attempt count, the
    /// last transport error, and the delivery time for successful sends.
    async fn record_delivery_state(
        &self,
        webhook_id: i64,
        status: WebhookStatus,
        attempts: i64,
        last_error: Option<&str>,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), WebhookStoreError>;

    /// Oldest `FAILED` deliveries, capped at `limit`, for the retry sweep.
    async fn fetch_failed_webhooks(&self, limit: i64) -> Result<Vec<OutgoingWebhook>, WebhookStoreError>;

    async fn fetch_webhook(&self, webhook_id: i64) -> Result<OutgoingWebhook, WebhookStoreError>;

    /// Registers a partner endpoint. Used by operational tooling and tests.
    async fn insert_endpoint(
        &self,
        url: &str,
        secret: Option<&str>,
        source: Option<&str>,
        events: &[String],
    ) -> Result<WebhookEndpoint, WebhookStoreError>;
}

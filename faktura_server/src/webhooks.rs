//! Outbound webhook delivery.
//!
//! Every lifecycle event fans out to the matching targets: registered partner endpoints first,
//! the per-order callback URL as the fallback, or nothing at all. A `PENDING` row is persisted
//! before any network I/O, so delivery state is always auditable. Each delivery gets up to
//! [`MAX_DELIVERY_ATTEMPTS`] attempts with exponential backoff; exhausted deliveries park in
//! `FAILED` until the retry sweep picks them up.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use fakt_common::Money;
use faktura_engine::{
    db_types::{Invoice, NewOutgoingWebhook, OutgoingWebhook, WebhookStatus},
    events::{
        CreditNoteCreatedEvent,
        EventHooks,
        InvoiceCreatedEvent,
        InvoiceOverdueEvent,
        InvoicePaidEvent,
        InvoiceSentEvent,
        PaymentPartialEvent,
    },
    helpers::sign,
    sqlite::SqliteDatabase,
    traits::{WebhookStore, WebhookStoreError},
};
use log::*;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);
/// Sleep before retry `n` is `BACKOFF_BASE × 2^(n-2)`: 1 s before the second attempt, 2 s before
/// the third.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const RETRY_SWEEP_LIMIT: i64 = 50;

pub const EVENT_HEADER: &str = "X-Webhook-Event";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";
pub const ID_HEADER: &str = "X-Webhook-Id";
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// The HTTP client behind the dispatcher. Injected so tests can count attempts without a network.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// Posts the payload and returns the response status code. Transport-level failures
    /// (connect, timeout) surface as `Err`.
    async fn post(&self, url: &str, headers: &[(String, String)], body: &str) -> Result<u16, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post(&self, url: &str, headers: &[(String, String)], body: &str) -> Result<u16, TransportError> {
        let mut req = self.client.post(url).header("Content-Type", "application/json");
        for (name, value) in headers {
            req = req.header(name.as_str(), value);
        }
        let response = req.body(body.to_string()).send().await.map_err(|e| TransportError(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

pub struct WebhookDispatcher<B> {
    db: B,
    transport: Arc<dyn WebhookTransport>,
}

impl<B: Clone> Clone for WebhookDispatcher<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), transport: Arc::clone(&self.transport) }
    }
}

impl<B> WebhookDispatcher<B>
where B: WebhookStore
{
    pub fn new(db: B, transport: Arc<dyn WebhookTransport>) -> Self {
        Self { db, transport }
    }

    /// Delivers an event for an invoice to every matching target. Failures are recorded, never
    /// propagated: the triggering request has already returned.
    pub async fn dispatch(&self, event: &str, invoice: &Invoice, data: serde_json::Value) {
        let targets = match self.resolve_targets(event, invoice).await {
            Ok(t) => t,
            Err(e) => {
                error!("📮️ Could not resolve webhook targets for {event} on {}: {e}", invoice.invoice_number);
                return;
            },
        };
        if targets.is_empty() {
            trace!("📮️ No webhook target for {event} on {}. Skipping.", invoice.invoice_number);
            return;
        }
        let payload = event_payload(event, invoice, data);
        let body = payload.to_string();
        for (url, secret) in targets {
            let webhook = NewOutgoingWebhook {
                invoice_id: Some(invoice.id),
                target_url: url,
                event: event.to_string(),
                payload: body.clone(),
            };
            match self.db.insert_pending_webhook(webhook).await {
                Ok(row) => self.deliver(&row, secret.as_deref()).await,
                Err(e) => error!("📮️ Could not persist webhook for {event} on {}: {e}", invoice.invoice_number),
            }
        }
    }

    /// Registered endpoints win; the ingestion callback URL is the fallback.
    async fn resolve_targets(
        &self,
        event: &str,
        invoice: &Invoice,
    ) -> Result<Vec<(String, Option<String>)>, WebhookStoreError> {
        let endpoints = self.db.active_endpoints(invoice.source.as_deref(), event).await?;
        if !endpoints.is_empty() {
            return Ok(endpoints.into_iter().map(|ep| (ep.url, ep.secret)).collect());
        }
        let callback = self.db.callback_url_for_invoice(invoice.id).await?;
        Ok(callback.map(|url| (url, None)).into_iter().collect())
    }

    /// Runs the bounded retry loop for one persisted delivery. Attempt counts accumulate across
    /// sweeps, so a resurrected delivery keeps its history.
    async fn deliver(&self, webhook: &OutgoingWebhook, secret: Option<&str>) {
        let event_id = event_id_of(webhook);
        for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt - 2)).await;
            }
            let ts = Utc::now().timestamp();
            // Callback-URL targets have no shared secret; they get an empty signature.
            let signature = secret.map(|s| sign(s, ts, webhook.payload.as_bytes())).unwrap_or_default();
            let headers = [
                (EVENT_HEADER.to_string(), webhook.event.clone()),
                (TIMESTAMP_HEADER.to_string(), ts.to_string()),
                (ID_HEADER.to_string(), event_id.clone()),
                (SIGNATURE_HEADER.to_string(), signature),
            ];
            let outcome = self.transport.post(&webhook.target_url, &headers, &webhook.payload).await;
            let attempts = webhook.attempts + attempt as i64;
            let error = match outcome {
                Ok(status) if (200..300).contains(&status) => {
                    debug!("📮️ Webhook {} ({}) delivered on attempt {attempts}", webhook.id, webhook.event);
                    if let Err(e) = self
                        .db
                        .record_delivery_state(webhook.id, WebhookStatus::Sent, attempts, None, Some(Utc::now()))
                        .await
                    {
                        error!("📮️ Could not record delivery of webhook {}: {e}", webhook.id);
                    }
                    return;
                },
                Ok(status) => format!("HTTP {status}"),
                Err(e) => e.to_string(),
            };
            let status =
                if attempt == MAX_DELIVERY_ATTEMPTS { WebhookStatus::Failed } else { WebhookStatus::Retrying };
            warn!("📮️ Webhook {} ({}) attempt {attempts} failed: {error}", webhook.id, webhook.event);
            if let Err(e) =
                self.db.record_delivery_state(webhook.id, status, attempts, Some(&error), None).await
            {
                error!("📮️ Could not record state of webhook {}: {e}", webhook.id);
            }
        }
    }

    /// Re-runs the send path over parked `FAILED` deliveries, oldest first, capped per sweep.
    /// Returns the number of deliveries swept.
    pub async fn retry_failed(&self) -> Result<usize, WebhookStoreError> {
        let failed = self.db.fetch_failed_webhooks(RETRY_SWEEP_LIMIT).await?;
        let count = failed.len();
        info!("📮️ Retrying {count} failed webhook deliveries");
        for webhook in failed {
            let secret = self.db.endpoint_secret(&webhook.target_url).await?;
            self.deliver(&webhook, secret.as_deref()).await;
        }
        Ok(count)
    }
}

/// The wire payload: a fixed envelope plus an event-specific `data` object. The `eventId` stays
/// stable across retries so receivers can dedupe on it.
fn event_payload(event: &str, invoice: &Invoice, data: serde_json::Value) -> serde_json::Value {
    json!({
        "eventId": Uuid::new_v4().to_string(),
        "event": event,
        "timestamp": Utc::now().to_rfc3339(),
        "sourceOrderId": invoice.source_order_id,
        "invoiceId": invoice.id,
        "invoiceNumber": invoice.invoice_number,
        "data": data,
    })
}

fn event_id_of(webhook: &OutgoingWebhook) -> String {
    serde_json::from_str::<serde_json::Value>(&webhook.payload)
        .ok()
        .and_then(|v| v.get("eventId").and_then(|id| id.as_str()).map(str::to_string))
        .unwrap_or_else(|| webhook.id.to_string())
}

fn invoice_data(invoice: &Invoice) -> serde_json::Value {
    json!({
        "status": invoice.status,
        "kid": invoice.kid,
        "currency": invoice.currency,
        "totalAmount": invoice.total_amount.as_major(),
        "dueDate": invoice.due_date,
    })
}

fn payment_partial_data(invoice: &Invoice, amount: Money, remaining: Money) -> serde_json::Value {
    let mut data = invoice_data(invoice);
    data["amount"] = json!(amount.as_major());
    data["remainingAmount"] = json!(remaining.as_major());
    data
}

/// `creditAmount` is the credited magnitude, so the negative credit-note total is flipped.
fn credit_note_data(original: &Invoice, credit_note: &Invoice) -> serde_json::Value {
    let mut data = invoice_data(original);
    data["creditNoteNumber"] = json!(credit_note.invoice_number);
    data["creditAmount"] = json!((-credit_note.total_amount).as_major());
    data
}

/// Wires the dispatcher into the engine's event hooks. Each hook runs on the event-handler task,
/// so retry sleeps never block a request.
pub fn webhook_hooks(dispatcher: WebhookDispatcher<SqliteDatabase>) -> EventHooks {
    let mut hooks = EventHooks::default();
    let d = dispatcher.clone();
    hooks.on_invoice_created(move |ev: InvoiceCreatedEvent| {
        let d = d.clone();
        Box::pin(async move {
            d.dispatch(InvoiceCreatedEvent::EVENT_NAME, &ev.invoice, invoice_data(&ev.invoice)).await;
        })
    });
    let d = dispatcher.clone();
    hooks.on_invoice_sent(move |ev: InvoiceSentEvent| {
        let d = d.clone();
        Box::pin(async move {
            let mut data = invoice_data(&ev.invoice);
            data["pdfUrl"] = json!(ev.invoice.pdf_url);
            d.dispatch(InvoiceSentEvent::EVENT_NAME, &ev.invoice, data).await;
        })
    });
    let d = dispatcher.clone();
    hooks.on_invoice_paid(move |ev: InvoicePaidEvent| {
        let d = d.clone();
        Box::pin(async move {
            let mut data = invoice_data(&ev.invoice);
            data["paidTotal"] = json!(ev.paid_total.as_major());
            d.dispatch(InvoicePaidEvent::EVENT_NAME, &ev.invoice, data).await;
        })
    });
    let d = dispatcher.clone();
    hooks.on_payment_partial(move |ev: PaymentPartialEvent| {
        let d = d.clone();
        Box::pin(async move {
            let data = payment_partial_data(&ev.invoice, ev.amount, ev.remaining);
            d.dispatch(PaymentPartialEvent::EVENT_NAME, &ev.invoice, data).await;
        })
    });
    let d = dispatcher.clone();
    hooks.on_credit_note_created(move |ev: CreditNoteCreatedEvent| {
        let d = d.clone();
        Box::pin(async move {
            let data = credit_note_data(&ev.original, &ev.credit_note);
            d.dispatch(CreditNoteCreatedEvent::EVENT_NAME, &ev.original, data).await;
        })
    });
    let d = dispatcher;
    hooks.on_invoice_overdue(move |ev: InvoiceOverdueEvent| {
        let d = d.clone();
        Box::pin(async move {
            d.dispatch(InvoiceOverdueEvent::EVENT_NAME, &ev.invoice, invoice_data(&ev.invoice)).await;
        })
    });
    hooks
}

//! `SqliteDatabase` is the concrete SQLite backend for the invoicing engine.
//!
//! It implements every storage trait in the [`crate::traits`] module. Multi-step operations run
//! inside a single transaction by passing `&mut *tx` to the low-level functions in
//! [`super::db`].
use std::fmt::Debug;

use chrono::{Datelike, NaiveDate, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{audit, credentials, customers, db_url, invoices, new_pool, organizations, payments, webhooks};
use crate::{
    api::objects::{IncomingOrder, InvoiceDetails, InvoiceQueryFilter, OrderUpdate, PaymentOutcome},
    db_types::{
        ApiCredential,
        AuditAction,
        EmailStatus,
        Invoice,
        InvoiceNumber,
        InvoiceStatus,
        NewOutgoingWebhook,
        NewPayment,
        OutgoingWebhook,
        WebhookEndpoint,
        WebhookStatus,
    },
    helpers::{order_kid, weighted_kid},
    sqlite::db::invoices::{DraftChanges, InvoiceInsert},
    traits::{
        is_unique_violation,
        AuthenticationError,
        CredentialManagement,
        InvoicingDatabase,
        InvoicingError,
        WebhookStore,
        WebhookStoreError,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the configured database URL.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl InvoicingDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_incoming_order(&self, order: IncomingOrder) -> Result<Invoice, InvoicingError> {
        if order.lines.is_empty() {
            return Err(InvoicingError::InvalidOrder("An order must carry at least one line".to_string()));
        }
        let mut tx = self.pool.begin().await?;
        // Cheap duplicate pre-check. The unique index below is the real guard.
        if let Some(existing) =
            invoices::fetch_invoice_by_source(Some(&order.source), &order.source_order_id, &mut tx).await?
        {
            return Err(InvoicingError::DuplicateOrder { invoice_number: existing.invoice_number });
        }
        let customer = customers::upsert_customer(order.customer.clone(), &mut tx).await?;
        let organization = organizations::resolve_organization(order.organization_id, &mut tx).await?;
        let order_date = order.order_date.unwrap_or_else(|| Utc::now().date_naive());
        let due_date = order_date + chrono::Duration::days(order.effective_due_days());
        let (subtotal, vat_amount, total_amount) = invoices::line_totals(&order.lines);
        let year = order_date.year();
        let seq = invoices::next_invoice_seq(year, &mut tx).await?;
        let invoice_number = InvoiceNumber::new(year, seq);
        let kid = order_kid(customer.customer_number, &order.source_order_id);
        let insert = InvoiceInsert {
            invoice_number,
            kid,
            source: Some(order.source.clone()),
            source_order_id: Some(order.source_order_id.clone()),
            organization_id: organization.id,
            customer_id: customer.id,
            status: InvoiceStatus::Draft,
            currency: order.currency.clone().unwrap_or_else(|| fakt_common::DEFAULT_CURRENCY_CODE.to_string()),
            subtotal,
            vat_amount,
            total_amount,
            order_date,
            due_date,
            credits_invoice_id: None,
        };
        let invoice = match invoices::insert_invoice(insert, &mut tx).await {
            Ok(invoice) => invoice,
            Err(e) if is_unique_violation(&e) => {
                // A concurrent ingestion won the race. Surface the winner's invoice number.
                drop(tx);
                let mut conn = self.pool.acquire().await?;
                let existing =
                    invoices::fetch_invoice_by_source(Some(&order.source), &order.source_order_id, &mut conn).await?;
                return match existing {
                    Some(winner) => {
                        Err(InvoicingError::DuplicateOrder { invoice_number: winner.invoice_number })
                    },
                    None => Err(InvoicingError::DatabaseError(e.to_string())),
                };
            },
            Err(e) => return Err(e.into()),
        };
        invoices::insert_lines(invoice.id, &order.lines, &mut tx).await?;
        if !order.meta.is_empty() {
            let metadata = match &order.meta.metadata {
                Some(v) => Some(serde_json::to_string(v).map_err(|e| InvoicingError::InvalidOrder(e.to_string()))?),
                None => None,
            };
            invoices::upsert_meta(
                invoice.id,
                order.meta.callback_url.as_deref(),
                order.meta.preferred_payment_method.as_deref(),
                order.meta.internal_reference.as_deref(),
                metadata.as_deref(),
                &mut tx,
            )
            .await?;
        }
        if !order.attachments.is_empty() {
            invoices::insert_attachments(invoice.id, &order.attachments, &mut tx).await?;
        }
        let detail = format!("Order {}/{} ingested as {}", order.source, order.source_order_id, invoice.invoice_number);
        audit::insert_audit(Some(invoice.id), AuditAction::OrderReceived, Some(&detail), &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Invoice {} created for order {}/{}", invoice.invoice_number, order.source, order.source_order_id);
        Ok(invoice)
    }

    async fn fetch_invoice_by_source(
        &self,
        source: Option<&str>,
        source_order_id: &str,
    ) -> Result<Option<Invoice>, InvoicingError> {
        let mut conn = self.pool.acquire().await?;
        let invoice = invoices::fetch_invoice_by_source(source, source_order_id, &mut conn).await?;
        Ok(invoice)
    }

    async fn fetch_invoice(&self, number: &InvoiceNumber) -> Result<Option<Invoice>, InvoicingError> {
        let mut conn = self.pool.acquire().await?;
        let invoice = invoices::fetch_invoice_by_number(number, &mut conn).await?;
        Ok(invoice)
    }

    async fn fetch_invoice_details(&self, number: &InvoiceNumber) -> Result<Option<InvoiceDetails>, InvoicingError> {
        let mut conn = self.pool.acquire().await?;
        let Some(invoice) = invoices::fetch_invoice_by_number(number, &mut conn).await? else {
            return Ok(None);
        };
        let lines = invoices::fetch_lines(invoice.id, &mut conn).await?;
        let customer = customers::fetch_customer_by_id(invoice.customer_id, &mut conn)
            .await?
            .ok_or_else(|| InvoicingError::DatabaseError(format!("Customer {} missing for {number}", invoice.customer_id)))?;
        let organization = organizations::fetch_organization(invoice.organization_id, &mut conn)
            .await?
            .ok_or_else(|| {
                InvoicingError::DatabaseError(format!("Organization {} missing for {number}", invoice.organization_id))
            })?;
        let payments = payments::payments_for_invoice(invoice.id, &mut conn).await?;
        let meta = invoices::fetch_meta(invoice.id, &mut conn).await?;
        let attachments = invoices::fetch_attachments(invoice.id, &mut conn).await?;
        Ok(Some(InvoiceDetails { invoice, lines, customer, organization, payments, meta, attachments }))
    }

    async fn search_invoices(&self, query: InvoiceQueryFilter) -> Result<Vec<Invoice>, InvoicingError> {
        let mut conn = self.pool.acquire().await?;
        let invoices = invoices::search_invoices(query, &mut conn).await?;
        Ok(invoices)
    }

    async fn update_draft_order(&self, number: &InvoiceNumber, update: OrderUpdate) -> Result<Invoice, InvoicingError> {
        let mut tx = self.pool.begin().await?;
        let invoice = invoices::fetch_invoice_by_number(number, &mut tx)
            .await?
            .ok_or_else(|| InvoicingError::InvoiceNotFound(number.clone()))?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(InvoicingError::NotEditable(number.clone(), invoice.status));
        }
        if update.is_empty() {
            debug!("🗃️ No fields to update for {number}. Update request skipped.");
            return Ok(invoice);
        }
        let mut changes = DraftChanges::default();
        if let Some(new_customer) = update.customer {
            let customer = customers::upsert_customer(new_customer, &mut tx).await?;
            if customer.id != invoice.customer_id {
                changes.customer_id = Some(customer.id);
                // The KID encodes the customer number, so a customer change means a new KID.
                if let Some(source_order_id) = invoice.source_order_id.as_deref() {
                    changes.kid = Some(order_kid(customer.customer_number, source_order_id));
                }
            }
        }
        let order_date = update.order_date.unwrap_or(invoice.order_date);
        if update.order_date.is_some() {
            changes.order_date = Some(order_date);
        }
        if let Some(due_days) = update.due_days {
            changes.due_date = Some(order_date + chrono::Duration::days(due_days.clamp(0, 365)));
        } else if update.order_date.is_some() {
            // Keep the original payment window when only the order date moves.
            let span = invoice.due_date - invoice.order_date;
            changes.due_date = Some(order_date + span);
        }
        if let Some(currency) = update.currency {
            changes.currency = Some(currency);
        }
        if let Some(lines) = update.lines {
            if lines.is_empty() {
                return Err(InvoicingError::InvalidOrder("An order must carry at least one line".to_string()));
            }
            invoices::replace_lines(invoice.id, &lines, &mut tx).await?;
            changes.totals = Some(invoices::line_totals(&lines));
        }
        let updated = invoices::update_draft_fields(invoice.id, changes, &mut tx).await?;
        if !update.meta.is_empty() {
            let metadata = match &update.meta.metadata {
                Some(v) => Some(serde_json::to_string(v).map_err(|e| InvoicingError::InvalidOrder(e.to_string()))?),
                None => None,
            };
            invoices::upsert_meta(
                invoice.id,
                update.meta.callback_url.as_deref(),
                update.meta.preferred_payment_method.as_deref(),
                update.meta.internal_reference.as_deref(),
                metadata.as_deref(),
                &mut tx,
            )
            .await?;
        }
        audit::insert_audit(Some(invoice.id), AuditAction::OrderUpdated, None, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Draft {number} updated");
        Ok(updated)
    }

    async fn delete_draft(&self, number: &InvoiceNumber, reason: Option<&str>) -> Result<(), InvoicingError> {
        let mut tx = self.pool.begin().await?;
        let invoice = invoices::fetch_invoice_by_number(number, &mut tx)
            .await?
            .ok_or_else(|| InvoicingError::InvoiceNotFound(number.clone()))?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(InvoicingError::NotEditable(number.clone(), invoice.status));
        }
        invoices::delete_draft_rows(invoice.id, &mut tx).await?;
        let detail = match reason {
            Some(reason) => format!("Draft {number} deleted: {reason}"),
            None => format!("Draft {number} deleted"),
        };
        audit::insert_audit(None, AuditAction::OrderCancelled, Some(&detail), &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_credit_note(
        &self,
        number: &InvoiceNumber,
        reason: Option<&str>,
    ) -> Result<(Invoice, Invoice), InvoicingError> {
        let mut tx = self.pool.begin().await?;
        let original = invoices::fetch_invoice_by_number(number, &mut tx)
            .await?
            .ok_or_else(|| InvoicingError::InvoiceNotFound(number.clone()))?;
        if original.is_credit_note() {
            return Err(InvoicingError::CannotCreditCreditNote(number.clone()));
        }
        if original.credit_note_id.is_some() || original.status == InvoiceStatus::Credited {
            return Err(InvoicingError::AlreadyCredited(number.clone()));
        }
        if original.status == InvoiceStatus::Draft {
            return Err(InvoicingError::NotEditable(number.clone(), original.status));
        }
        let lines = invoices::fetch_lines(original.id, &mut tx).await?;
        let negated: Vec<_> = lines
            .iter()
            .map(|l| {
                crate::db_types::NewInvoiceLine {
                    description: l.description.clone(),
                    quantity: -l.quantity,
                    unit_price: l.unit_price,
                    vat_rate: l.vat_rate,
                }
            })
            .collect();
        let (subtotal, vat_amount, total_amount) = invoices::line_totals(&negated);
        let today = Utc::now().date_naive();
        let year = today.year();
        let seq = invoices::next_invoice_seq(year, &mut tx).await?;
        let note_number = InvoiceNumber::new(year, seq);
        let kid = weighted_kid(note_number.as_str());
        let insert = InvoiceInsert {
            invoice_number: note_number,
            kid,
            source: None,
            source_order_id: None,
            organization_id: original.organization_id,
            customer_id: original.customer_id,
            status: InvoiceStatus::Sent,
            currency: original.currency.clone(),
            subtotal,
            vat_amount,
            total_amount,
            order_date: today,
            due_date: today,
            credits_invoice_id: Some(original.id),
        };
        let note = invoices::insert_invoice(insert, &mut tx).await?;
        invoices::insert_lines(note.id, &negated, &mut tx).await?;
        let updated = invoices::link_credit_note(original.id, note.id, &mut tx).await?;
        let detail = match reason {
            Some(reason) => format!("Credit note {} issued against {number}: {reason}", note.invoice_number),
            None => format!("Credit note {} issued against {number}", note.invoice_number),
        };
        audit::insert_audit(Some(original.id), AuditAction::CreditNoteCreated, Some(&detail), &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Credit note {} issued against {number}", note.invoice_number);
        Ok((updated, note))
    }

    async fn mark_sent(&self, number: &InvoiceNumber, pdf_url: Option<&str>) -> Result<Invoice, InvoicingError> {
        let mut tx = self.pool.begin().await?;
        let invoice = invoices::fetch_invoice_by_number(number, &mut tx)
            .await?
            .ok_or_else(|| InvoicingError::InvoiceNotFound(number.clone()))?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(InvoicingError::AlreadySent(number.clone()));
        }
        let sent = invoices::mark_sent(invoice.id, pdf_url, &mut tx).await?;
        audit::insert_audit(Some(invoice.id), AuditAction::InvoiceSent, None, &mut tx).await?;
        tx.commit().await?;
        Ok(sent)
    }

    async fn register_payment(&self, payment: NewPayment) -> Result<PaymentOutcome, InvoicingError> {
        let mut tx = self.pool.begin().await?;
        let invoice = invoices::fetch_invoice_by_number(&payment.invoice_number, &mut tx)
            .await?
            .ok_or_else(|| InvoicingError::InvoiceNotFound(payment.invoice_number.clone()))?;
        let stored = payments::insert_payment(invoice.id, payment, &mut tx).await?;
        let paid_total = payments::completed_total(invoice.id, &mut tx).await?;
        let new_status =
            if paid_total >= invoice.total_amount { InvoiceStatus::Paid } else { InvoiceStatus::PartiallyPaid };
        let invoice = if invoice.status == new_status {
            invoice
        } else {
            invoices::update_status(invoice.id, new_status, &mut tx).await?
        };
        let detail = format!("Payment of {} registered. Paid total: {paid_total}", stored.amount);
        audit::insert_audit(Some(invoice.id), AuditAction::PaymentRegistered, Some(&detail), &mut tx).await?;
        tx.commit().await?;
        let remaining = invoice.total_amount - paid_total;
        let remaining = if remaining.value() < 0 { fakt_common::Money::from_minor(0) } else { remaining };
        debug!("🗃️ Payment registered against {}. {remaining} outstanding", invoice.invoice_number);
        Ok(PaymentOutcome { invoice, payment: stored, paid_total, remaining })
    }

    async fn refresh_overdue(&self, today: NaiveDate) -> Result<Vec<Invoice>, InvoicingError> {
        let mut conn = self.pool.acquire().await?;
        let flipped = invoices::refresh_overdue(today, &mut conn).await?;
        if !flipped.is_empty() {
            debug!("🗃️ {} invoice(s) flipped to OVERDUE", flipped.len());
        }
        Ok(flipped)
    }

    async fn record_email_outcome(
        &self,
        invoice_id: i64,
        recipient: &str,
        status: EmailStatus,
        error: Option<&str>,
    ) -> Result<(), InvoicingError> {
        let mut conn = self.pool.acquire().await?;
        audit::insert_email_log(invoice_id, recipient, status, error, &mut conn).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), InvoicingError> {
        self.pool.close().await;
        Ok(())
    }
}

impl CredentialManagement for SqliteDatabase {
    async fn fetch_credential_by_key_hash(&self, key_hash: &str) -> Result<Option<ApiCredential>, AuthenticationError> {
        let mut conn = self.pool.acquire().await.map_err(|e| AuthenticationError::DatabaseError(e.to_string()))?;
        let credential = credentials::fetch_active_by_key_hash(key_hash, &mut conn).await?;
        Ok(credential)
    }

    async fn touch_credential(&self, credential_id: i64) -> Result<(), AuthenticationError> {
        let mut conn = self.pool.acquire().await.map_err(|e| AuthenticationError::DatabaseError(e.to_string()))?;
        credentials::touch_last_used(credential_id, &mut conn).await?;
        Ok(())
    }

    async fn insert_credential(
        &self,
        display_name: &str,
        key_hash: &str,
        secret: &str,
    ) -> Result<ApiCredential, AuthenticationError> {
        let mut conn = self.pool.acquire().await.map_err(|e| AuthenticationError::DatabaseError(e.to_string()))?;
        let credential = credentials::insert_credential(display_name, key_hash, secret, &mut conn).await?;
        Ok(credential)
    }
}

impl WebhookStore for SqliteDatabase {
    async fn active_endpoints(
        &self,
        source: Option<&str>,
        event: &str,
    ) -> Result<Vec<WebhookEndpoint>, WebhookStoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| WebhookStoreError::DatabaseError(e.to_string()))?;
        let endpoints = webhooks::active_endpoints(source, event, &mut conn).await?;
        Ok(endpoints)
    }

    async fn callback_url_for_invoice(&self, invoice_id: i64) -> Result<Option<String>, WebhookStoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| WebhookStoreError::DatabaseError(e.to_string()))?;
        let url = webhooks::callback_url_for_invoice(invoice_id, &mut conn).await?;
        Ok(url)
    }

    async fn endpoint_secret(&self, url: &str) -> Result<Option<String>, WebhookStoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| WebhookStoreError::DatabaseError(e.to_string()))?;
        let secret = webhooks::endpoint_secret(url, &mut conn).await?;
        Ok(secret)
    }

    async fn insert_pending_webhook(&self, webhook: NewOutgoingWebhook) -> Result<OutgoingWebhook, WebhookStoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| WebhookStoreError::DatabaseError(e.to_string()))?;
        let row = webhooks::insert_pending(webhook, &mut conn).await?;
        Ok(row)
    }

    async fn record_delivery_state(
        &self,
        webhook_id: i64,
        status: WebhookStatus,
        attempts: i64,
        last_error: Option<&str>,
        sent_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<(), WebhookStoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| WebhookStoreError::DatabaseError(e.to_string()))?;
        let affected = webhooks::record_delivery_state(webhook_id, status, attempts, last_error, sent_at, &mut conn).await?;
        if affected == 0 {
            return Err(WebhookStoreError::WebhookNotFound(webhook_id));
        }
        Ok(())
    }

    async fn fetch_failed_webhooks(&self, limit: i64) -> Result<Vec<OutgoingWebhook>, WebhookStoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| WebhookStoreError::DatabaseError(e.to_string()))?;
        let rows = webhooks::fetch_failed(limit, &mut conn).await?;
        Ok(rows)
    }

    async fn fetch_webhook(&self, webhook_id: i64) -> Result<OutgoingWebhook, WebhookStoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| WebhookStoreError::DatabaseError(e.to_string()))?;
        webhooks::fetch_webhook(webhook_id, &mut conn).await?.ok_or(WebhookStoreError::WebhookNotFound(webhook_id))
    }

    async fn insert_endpoint(
        &self,
        url: &str,
        secret: Option<&str>,
        source: Option<&str>,
        events: &[String],
    ) -> Result<WebhookEndpoint, WebhookStoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| WebhookStoreError::DatabaseError(e.to_string()))?;
        let events = serde_json::to_string(events).map_err(|e| WebhookStoreError::DatabaseError(e.to_string()))?;
        let endpoint = webhooks::insert_endpoint(url, secret, source, &events, &mut conn).await?;
        Ok(endpoint)
    }
}

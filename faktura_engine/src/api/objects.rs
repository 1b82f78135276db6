//! Request and response objects for the engine APIs.
use chrono::NaiveDate;
use fakt_common::Money;
use serde::Serialize;

use crate::db_types::{
    Attachment,
    Customer,
    Invoice,
    InvoiceLine,
    InvoiceNumber,
    InvoiceStatus,
    NewAttachment,
    NewCustomer,
    NewInvoiceLine,
    OrderMeta,
    Organization,
    Payment,
};

pub const DEFAULT_DUE_DAYS: i64 = 14;
pub const MAX_DUE_DAYS: i64 = 365;
pub const MAX_SEARCH_LIMIT: i64 = 100;

//--------------------------------------   IncomingOrder    ----------------------------------------------------------
/// A validated order, ready for ingestion. DTO validation and money conversion have already
/// happened by the time one of these is constructed.
#[derive(Debug, Clone)]
pub struct IncomingOrder {
    pub source: String,
    pub source_order_id: String,
    pub customer: NewCustomer,
    /// Explicit organization. When `None`, the default organization is used.
    pub organization_id: Option<i64>,
    /// Defaults to today when absent.
    pub order_date: Option<NaiveDate>,
    pub due_days: Option<i64>,
    pub currency: Option<String>,
    pub lines: Vec<NewInvoiceLine>,
    pub auto_send: bool,
    pub meta: OrderMetaFields,
    pub attachments: Vec<NewAttachment>,
}

impl IncomingOrder {
    /// Due days clamped to the allowed range. Out-of-range values are clamped rather than
    /// rejected.
    pub fn effective_due_days(&self) -> i64 {
        self.due_days.unwrap_or(DEFAULT_DUE_DAYS).clamp(0, MAX_DUE_DAYS)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderMetaFields {
    pub callback_url: Option<String>,
    pub preferred_payment_method: Option<String>,
    pub internal_reference: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl OrderMetaFields {
    pub fn is_empty(&self) -> bool {
        self.callback_url.is_none()
            && self.preferred_payment_method.is_none()
            && self.internal_reference.is_none()
            && self.metadata.is_none()
    }
}

//--------------------------------------    OrderUpdate     ----------------------------------------------------------
/// A partial update for a draft invoice. Absent fields keep their stored values; when `lines` is
/// present, all lines and totals are recomputed from scratch.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub customer: Option<NewCustomer>,
    pub lines: Option<Vec<NewInvoiceLine>>,
    pub order_date: Option<NaiveDate>,
    pub due_days: Option<i64>,
    pub currency: Option<String>,
    pub meta: OrderMetaFields,
}

impl OrderUpdate {
    pub fn is_empty(&self) -> bool {
        self.customer.is_none()
            && self.lines.is_none()
            && self.order_date.is_none()
            && self.due_days.is_none()
            && self.currency.is_none()
            && self.meta.is_empty()
    }
}

//-------------------------------------- InvoiceQueryFilter ----------------------------------------------------------
/// Search criteria for listing invoices. Results are capped at [`MAX_SEARCH_LIMIT`] rows.
#[derive(Debug, Clone, Default)]
pub struct InvoiceQueryFilter {
    pub source: Option<String>,
    pub status: Option<Vec<InvoiceStatus>>,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub limit: Option<i64>,
}

impl InvoiceQueryFilter {
    pub fn with_source<S: Into<String>>(mut self, source: S) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_status(mut self, status: InvoiceStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn since(mut self, date: NaiveDate) -> Self {
        self.since = Some(date);
        self
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.until = Some(date);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true)
            && self.since.is_none()
            && self.until.is_none()
    }

    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(MAX_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT)
    }
}

//--------------------------------------   InvoiceDetails   ----------------------------------------------------------
/// An invoice with everything hanging off it. This is the shape rendered to PDF, mailed, and
/// returned by the details endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetails {
    pub invoice: Invoice,
    pub lines: Vec<InvoiceLine>,
    pub customer: Customer,
    pub organization: Organization,
    pub payments: Vec<Payment>,
    pub meta: Option<OrderMeta>,
    pub attachments: Vec<Attachment>,
}

impl InvoiceDetails {
    /// Sum of completed payments.
    pub fn paid_total(&self) -> Money {
        self.payments
            .iter()
            .filter(|p| p.status == crate::db_types::PaymentStatus::Completed)
            .map(|p| p.amount)
            .sum()
    }

    pub fn remaining(&self) -> Money {
        self.invoice.total_amount - self.paid_total()
    }
}

//--------------------------------------   PaymentOutcome   ----------------------------------------------------------
/// The result of registering a payment: the stored payment, the invoice in its new status, and
/// the recomputed totals.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub invoice: Invoice,
    pub payment: Payment,
    pub paid_total: Money,
    pub remaining: Money,
}

impl PaymentOutcome {
    pub fn is_fully_paid(&self) -> bool {
        self.invoice.status == InvoiceStatus::Paid
    }
}

//--------------------------------------   CancelOutcome    ----------------------------------------------------------
/// What happened to a cancelled order. Drafts are deleted outright; sent invoices are reversed
/// with a credit note.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Deleted { invoice_number: InvoiceNumber },
    Credited { invoice: Invoice, credit_note: Invoice },
}

//! Database types for the invoicing engine.
//!
//! These are the records stored by the backend, plus the `New*` structs used to insert them.
//! Monetary fields use the fixed-point types from `fakt_common`, so the
//! `total_amount = subtotal + vat_amount` invariant holds exactly at rest.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use fakt_common::{Money, Quantity, Secret, VatRate};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------   InvoiceNumber    ----------------------------------------------------------
/// A human-facing invoice number in `YYYY-NNNNNN` format, unique across all years.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct InvoiceNumber(pub String);

impl InvoiceNumber {
    pub fn new(year: i32, seq: i64) -> Self {
        Self(format!("{year}-{seq:06}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InvoiceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InvoiceNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl FromStr for InvoiceNumber {
    type Err = ConversionError;

    // YYYY-NNNNNN
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = s.as_bytes();
        let valid = b.len() == 11 &&
            b[4] == b'-' &&
            b[..4].iter().all(u8::is_ascii_digit) &&
            b[5..].iter().all(u8::is_ascii_digit);
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(ConversionError(format!("{s} is not a valid invoice number")))
        }
    }
}

//--------------------------------------        Kid         ----------------------------------------------------------
/// A Norwegian KID payment reference. Always numeric, with a trailing check digit.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Kid(pub String);

impl Kid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Kid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Kid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

//--------------------------------------   InvoiceStatus    ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Created but not yet delivered to the customer. The only editable state.
    Draft,
    /// Delivered. Awaiting payment.
    Sent,
    /// Some payments received, but less than the total.
    PartiallyPaid,
    /// Paid in full.
    Paid,
    /// Past the due date without full payment.
    Overdue,
    /// Reversed by a credit note.
    Credited,
    /// Reserved for explicit cancellation of non-draft invoices.
    Cancelled,
}

impl Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::PartiallyPaid => "PARTIALLY_PAID",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Credited => "CREDITED",
            InvoiceStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

impl FromStr for InvoiceStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "SENT" => Ok(Self::Sent),
            "PARTIALLY_PAID" => Ok(Self::PartiallyPaid),
            "PAID" => Ok(Self::Paid),
            "OVERDUE" => Ok(Self::Overdue),
            "CREDITED" => Ok(Self::Credited),
            "CANCELLED" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid invoice status: {s}"))),
        }
    }
}

//--------------------------------------   PaymentStatus    ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Settled. Only completed payments count towards the paid total.
    Completed,
    /// Reported by the provider but not settled yet.
    Pending,
    /// Rejected or reversed by the provider.
    Failed,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Completed => write!(f, "COMPLETED"),
            PaymentStatus::Pending => write!(f, "PENDING"),
            PaymentStatus::Failed => write!(f, "FAILED"),
        }
    }
}

//--------------------------------------   WebhookStatus    ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookStatus {
    /// Persisted, no delivery attempt made yet.
    Pending,
    /// At least one attempt failed and another is scheduled.
    Retrying,
    /// Delivered (2xx response). Terminal.
    Sent,
    /// All attempts exhausted. Terminal until an explicit retry sweep.
    Failed,
}

impl Display for WebhookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WebhookStatus::Pending => "PENDING",
            WebhookStatus::Retrying => "RETRYING",
            WebhookStatus::Sent => "SENT",
            WebhookStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------    EmailStatus     ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailStatus {
    Sent,
    Failed,
}

impl Display for EmailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailStatus::Sent => write!(f, "SENT"),
            EmailStatus::Failed => write!(f, "FAILED"),
        }
    }
}

//--------------------------------------    AuditAction     ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    OrderReceived,
    OrderUpdated,
    OrderCancelled,
    InvoiceSent,
    PaymentRegistered,
    CreditNoteCreated,
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::OrderReceived => "ORDER_RECEIVED",
            AuditAction::OrderUpdated => "ORDER_UPDATED",
            AuditAction::OrderCancelled => "ORDER_CANCELLED",
            AuditAction::InvoiceSent => "INVOICE_SENT",
            AuditAction::PaymentRegistered => "PAYMENT_REGISTERED",
            AuditAction::CreditNoteCreated => "CREDIT_NOTE_CREATED",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------      Invoice       ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: InvoiceNumber,
    pub kid: Kid,
    pub source: Option<String>,
    pub source_order_id: Option<String>,
    pub organization_id: i64,
    pub customer_id: i64,
    pub status: InvoiceStatus,
    pub currency: String,
    pub subtotal: Money,
    pub vat_amount: Money,
    pub total_amount: Money,
    pub order_date: NaiveDate,
    pub due_date: NaiveDate,
    pub credit_note_id: Option<i64>,
    pub credits_invoice_id: Option<i64>,
    pub pdf_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn is_credit_note(&self) -> bool {
        self.credits_invoice_id.is_some()
    }
}

//--------------------------------------    InvoiceLine     ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: i64,
    pub invoice_id: i64,
    pub description: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub vat_rate: VatRate,
    /// `quantity × unit_price`, rounded to the nearest øre at insert time.
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoiceLine {
    pub description: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub vat_rate: VatRate,
}

impl NewInvoiceLine {
    pub fn net_amount(&self) -> Money {
        self.quantity.times(self.unit_price)
    }

    pub fn vat_amount(&self) -> Money {
        self.net_amount().vat(self.vat_rate)
    }

    /// The mirror image of this line, used when building credit notes.
    pub fn negated(&self) -> Self {
        Self {
            description: self.description.clone(),
            quantity: -self.quantity,
            unit_price: self.unit_price,
            vat_rate: self.vat_rate,
        }
    }
}

//--------------------------------------      Customer      ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub customer_number: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: String,
    pub org_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Customer details as they arrive with an order. Deduplication is by email: if a customer with
/// this email exists, present fields overwrite, absent fields keep their stored values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub org_number: Option<String>,
}

//--------------------------------------    Organization    ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub org_number: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      Payment       ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub invoice_id: i64,
    pub amount: Money,
    pub status: PaymentStatus,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub invoice_number: InvoiceNumber,
    pub amount: Money,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
}

impl NewPayment {
    pub fn new(invoice_number: InvoiceNumber, amount: Money) -> Self {
        Self { invoice_number, amount, method: None, reference: None, paid_at: Utc::now() }
    }
}

//--------------------------------------   ApiCredential    ----------------------------------------------------------
/// An API credential for a partner system. The public key token is stored as a SHA-256 hash;
/// the HMAC secret stays wrapped in [`Secret`] so it never appears in logs.
#[derive(Debug, Clone)]
pub struct ApiCredential {
    pub id: i64,
    pub display_name: String,
    pub key_hash: String,
    pub secret: Secret<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

//--------------------------------------  WebhookEndpoint   ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct WebhookEndpoint {
    pub id: i64,
    pub url: String,
    pub secret: Option<String>,
    /// `None` matches any source.
    pub source: Option<String>,
    /// JSON array of event names. Empty means "all events".
    pub events: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    /// Whether this endpoint subscribes to the given event name.
    pub fn subscribes_to(&self, event: &str) -> bool {
        match serde_json::from_str::<Vec<String>>(&self.events) {
            Ok(events) => events.is_empty() || events.iter().any(|e| e == event),
            Err(_) => false,
        }
    }
}

//--------------------------------------  OutgoingWebhook   ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct OutgoingWebhook {
    pub id: i64,
    pub invoice_id: Option<i64>,
    pub target_url: String,
    pub event: String,
    pub payload: String,
    pub status: WebhookStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOutgoingWebhook {
    pub invoice_id: Option<i64>,
    pub target_url: String,
    pub event: String,
    pub payload: String,
}

//--------------------------------------     OrderMeta      ----------------------------------------------------------
/// Ingestion extras attached to an invoice: where to call back, how the customer prefers to pay,
/// and the caller's own reference fields.
#[derive(Debug, Clone, Default, FromRow, Serialize, Deserialize)]
pub struct OrderMeta {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub invoice_id: i64,
    pub callback_url: Option<String>,
    pub preferred_payment_method: Option<String>,
    pub internal_reference: Option<String>,
    pub metadata: Option<String>,
}

//--------------------------------------     Attachment     ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub invoice_id: i64,
    pub file_name: String,
    pub file_url: String,
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAttachment {
    pub file_name: String,
    pub file_url: String,
    pub mime_type: Option<String>,
}

//--------------------------------------     AuditEvent     ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct AuditEvent {
    pub id: i64,
    pub invoice_id: Option<i64>,
    pub action: AuditAction,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      EmailLog      ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct EmailLog {
    pub id: i64,
    pub invoice_id: i64,
    pub recipient: String,
    pub status: EmailStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn invoice_number_format() {
        assert_eq!(InvoiceNumber::new(2025, 1).as_str(), "2025-000001");
        assert_eq!(InvoiceNumber::new(2025, 123_456).as_str(), "2025-123456");
    }

    #[test]
    fn status_round_trip() {
        for s in [
            InvoiceStatus::Draft,
            InvoiceStatus::Sent,
            InvoiceStatus::PartiallyPaid,
            InvoiceStatus::Paid,
            InvoiceStatus::Overdue,
            InvoiceStatus::Credited,
            InvoiceStatus::Cancelled,
        ] {
            assert_eq!(s.to_string().parse::<InvoiceStatus>().ok(), Some(s));
        }
        assert!("partially_paid".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn endpoint_subscription_matching() {
        let mut ep = WebhookEndpoint {
            id: 1,
            url: "https://example.test/hook".into(),
            secret: None,
            source: None,
            events: r#"["invoice.paid"]"#.into(),
            is_active: true,
            created_at: Utc::now(),
        };
        assert!(ep.subscribes_to("invoice.paid"));
        assert!(!ep.subscribes_to("invoice.created"));
        ep.events = "[]".into();
        assert!(ep.subscribes_to("invoice.created"));
        ep.events = "not json".into();
        assert!(!ep.subscribes_to("invoice.created"));
    }
}

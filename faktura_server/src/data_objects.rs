//! Wire DTOs for the partner-facing API.
//!
//! JSON numbers for money and quantities are converted to fixed-point exactly once, here at the
//! boundary. Everything past this module works in integer minor units.
use std::fmt::Display;

use chrono::NaiveDate;
use fakt_common::{Money, Quantity, VatRate};
use faktura_engine::{
    api::objects::{CancelOutcome, IncomingOrder, InvoiceDetails, OrderMetaFields, OrderUpdate, PaymentOutcome},
    db_types::{Invoice, InvoiceStatus, NewAttachment, NewCustomer, NewInvoiceLine, NewPayment},
};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;

pub const MAX_ORDER_LINES: usize = 100;
/// Norwegian standard MVA, applied when a line omits its rate.
pub const DEFAULT_VAT_FRACTION: f64 = 0.25;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

//--------------------------------------   Incoming order   ----------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveOrderDto {
    pub source: String,
    pub source_order_id: String,
    pub customer: CustomerDto,
    pub organization_id: Option<i64>,
    pub order_date: Option<NaiveDate>,
    pub due_days: Option<i64>,
    pub currency: Option<String>,
    pub lines: Vec<OrderLineDto>,
    #[serde(default)]
    pub auto_send: bool,
    pub callback_url: Option<String>,
    pub preferred_payment_method: Option<String>,
    pub internal_reference: Option<String>,
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub attachments: Vec<AttachmentDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDto {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub org_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineDto {
    pub description: String,
    pub quantity: f64,
    /// Unit price in major currency units (kroner).
    pub unit_price: f64,
    /// VAT as a fraction in [0, 1]. Defaults to 25% MVA.
    pub vat_rate: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDto {
    pub file_name: String,
    pub file_url: String,
    pub mime_type: Option<String>,
}

fn invalid<S: Display>(msg: S) -> ServerError {
    ServerError::InvalidRequestBody(msg.to_string())
}

impl CustomerDto {
    fn into_new_customer(self) -> Result<NewCustomer, ServerError> {
        if self.name.trim().is_empty() {
            return Err(invalid("customer.name must not be empty"));
        }
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err(invalid("customer.email is not a valid email address"));
        }
        Ok(NewCustomer {
            name: self.name,
            email: self.email,
            phone: self.phone,
            address: self.address,
            postal_code: self.postal_code,
            city: self.city,
            country: self.country,
            org_number: self.org_number,
        })
    }
}

impl OrderLineDto {
    fn into_new_line(self, index: usize) -> Result<NewInvoiceLine, ServerError> {
        if self.description.trim().is_empty() {
            return Err(invalid(format!("lines[{index}].description must not be empty")));
        }
        let quantity = Quantity::from_f64(self.quantity).map_err(|e| invalid(format!("lines[{index}]: {e}")))?;
        if quantity.millis() <= 0 {
            return Err(invalid(format!("lines[{index}].quantity must be positive")));
        }
        let unit_price = Money::from_major_f64(self.unit_price).map_err(|e| invalid(format!("lines[{index}]: {e}")))?;
        if unit_price.value() < 0 {
            return Err(invalid(format!("lines[{index}].unitPrice must not be negative")));
        }
        let vat_rate = VatRate::from_fraction_f64(self.vat_rate.unwrap_or(DEFAULT_VAT_FRACTION))
            .map_err(|e| invalid(format!("lines[{index}]: {e}")))?;
        Ok(NewInvoiceLine { description: self.description, quantity, unit_price, vat_rate })
    }
}

fn convert_lines(lines: Vec<OrderLineDto>) -> Result<Vec<NewInvoiceLine>, ServerError> {
    if lines.is_empty() {
        return Err(invalid("an order must carry at least one line"));
    }
    if lines.len() > MAX_ORDER_LINES {
        return Err(invalid(format!("an order may carry at most {MAX_ORDER_LINES} lines")));
    }
    lines.into_iter().enumerate().map(|(i, l)| l.into_new_line(i)).collect()
}

impl TryFrom<ReceiveOrderDto> for IncomingOrder {
    type Error = ServerError;

    fn try_from(dto: ReceiveOrderDto) -> Result<Self, Self::Error> {
        if dto.source.trim().is_empty() {
            return Err(invalid("source must not be empty"));
        }
        if dto.source_order_id.trim().is_empty() {
            return Err(invalid("sourceOrderId must not be empty"));
        }
        let lines = convert_lines(dto.lines)?;
        let customer = dto.customer.into_new_customer()?;
        let attachments = dto
            .attachments
            .into_iter()
            .map(|a| NewAttachment { file_name: a.file_name, file_url: a.file_url, mime_type: a.mime_type })
            .collect();
        Ok(IncomingOrder {
            source: dto.source,
            source_order_id: dto.source_order_id,
            customer,
            organization_id: dto.organization_id,
            order_date: dto.order_date,
            due_days: dto.due_days,
            currency: dto.currency,
            lines,
            auto_send: dto.auto_send,
            meta: OrderMetaFields {
                callback_url: dto.callback_url,
                preferred_payment_method: dto.preferred_payment_method,
                internal_reference: dto.internal_reference,
                metadata: dto.metadata,
            },
            attachments,
        })
    }
}

//--------------------------------------    Order update    ----------------------------------------------------------
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderDto {
    pub customer: Option<CustomerDto>,
    pub lines: Option<Vec<OrderLineDto>>,
    pub order_date: Option<NaiveDate>,
    pub due_days: Option<i64>,
    pub currency: Option<String>,
    pub callback_url: Option<String>,
    pub preferred_payment_method: Option<String>,
    pub internal_reference: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl TryFrom<UpdateOrderDto> for OrderUpdate {
    type Error = ServerError;

    fn try_from(dto: UpdateOrderDto) -> Result<Self, Self::Error> {
        let customer = dto.customer.map(CustomerDto::into_new_customer).transpose()?;
        let lines = dto.lines.map(convert_lines).transpose()?;
        Ok(OrderUpdate {
            customer,
            lines,
            order_date: dto.order_date,
            due_days: dto.due_days,
            currency: dto.currency,
            meta: OrderMetaFields {
                callback_url: dto.callback_url,
                preferred_payment_method: dto.preferred_payment_method,
                internal_reference: dto.internal_reference,
                metadata: dto.metadata,
            },
        })
    }
}

//--------------------------------------      Payments      ----------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPaymentDto {
    pub invoice_number: String,
    /// Amount in major currency units.
    pub amount: f64,
    pub method: Option<String>,
    pub provider_ref: Option<String>,
}

impl RegisterPaymentDto {
    pub fn into_new_payment(self) -> Result<NewPayment, ServerError> {
        let number = self
            .invoice_number
            .parse()
            .map_err(|e| invalid(format!("invoiceNumber: {e}")))?;
        let amount = Money::from_major_f64(self.amount).map_err(|e| invalid(format!("amount: {e}")))?;
        if amount.value() <= 0 {
            return Err(invalid("amount must be positive"));
        }
        let mut payment = NewPayment::new(number, amount);
        payment.method = self.method;
        payment.reference = self.provider_ref;
        Ok(payment)
    }
}

//--------------------------------------      Responses     ----------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceiveResponseDto {
    pub invoice_number: String,
    pub kid: String,
    pub status: InvoiceStatus,
    pub currency: String,
    pub subtotal: f64,
    pub vat_amount: f64,
    pub total_amount: f64,
    pub order_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl From<&Invoice> for OrderReceiveResponseDto {
    fn from(invoice: &Invoice) -> Self {
        Self {
            invoice_number: invoice.invoice_number.to_string(),
            kid: invoice.kid.to_string(),
            status: invoice.status,
            currency: invoice.currency.clone(),
            subtotal: invoice.subtotal.as_major(),
            vat_amount: invoice.vat_amount.as_major(),
            total_amount: invoice.total_amount.as_major(),
            order_date: invoice.order_date,
            due_date: invoice.due_date,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponseDto {
    pub source: Option<String>,
    pub source_order_id: Option<String>,
    pub invoice_number: String,
    pub status: InvoiceStatus,
    pub total_amount: f64,
    pub due_date: NaiveDate,
}

impl From<&Invoice> for OrderStatusResponseDto {
    fn from(invoice: &Invoice) -> Self {
        Self {
            source: invoice.source.clone(),
            source_order_id: invoice.source_order_id.clone(),
            invoice_number: invoice.invoice_number.to_string(),
            status: invoice.status,
            total_amount: invoice.total_amount.as_major(),
            due_date: invoice.due_date,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListResponseDto {
    pub orders: Vec<OrderStatusResponseDto>,
    pub count: usize,
}

impl From<Vec<Invoice>> for OrderListResponseDto {
    fn from(invoices: Vec<Invoice>) -> Self {
        let orders: Vec<OrderStatusResponseDto> = invoices.iter().map(OrderStatusResponseDto::from).collect();
        let count = orders.len();
        Self { orders, count }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetailDto {
    #[serde(flatten)]
    pub summary: OrderReceiveResponseDto,
    pub customer_number: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub organization: String,
    pub lines: Vec<InvoiceLineDto>,
    pub paid_total: f64,
    pub remaining: f64,
    pub pdf_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLineDto {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub vat_rate: f64,
    pub amount: f64,
}

impl From<&InvoiceDetails> for InvoiceDetailDto {
    fn from(details: &InvoiceDetails) -> Self {
        let lines = details
            .lines
            .iter()
            .map(|l| InvoiceLineDto {
                description: l.description.clone(),
                quantity: l.quantity.as_f64(),
                unit_price: l.unit_price.as_major(),
                vat_rate: l.vat_rate.as_fraction(),
                amount: l.amount.as_major(),
            })
            .collect();
        Self {
            summary: OrderReceiveResponseDto::from(&details.invoice),
            customer_number: details.customer.customer_number,
            customer_name: details.customer.name.clone(),
            customer_email: details.customer.email.clone(),
            organization: details.organization.name.clone(),
            lines,
            paid_total: details.paid_total().as_major(),
            remaining: details.remaining().as_major(),
            pdf_url: details.invoice.pdf_url.clone(),
        }
    }
}

/// Optional cancellation body. An empty request body means no reason given.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderDto {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponseDto {
    pub outcome: String,
    pub invoice_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_note_number: Option<String>,
}

impl From<&CancelOutcome> for CancelResponseDto {
    fn from(outcome: &CancelOutcome) -> Self {
        match outcome {
            CancelOutcome::Deleted { invoice_number } => Self {
                outcome: "DELETED".to_string(),
                invoice_number: invoice_number.to_string(),
                credit_note_number: None,
            },
            CancelOutcome::Credited { invoice, credit_note } => Self {
                outcome: "CREDITED".to_string(),
                invoice_number: invoice.invoice_number.to_string(),
                credit_note_number: Some(credit_note.invoice_number.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponseDto {
    pub invoice_number: String,
    pub status: InvoiceStatus,
    pub paid_total: f64,
    pub remaining: f64,
}

impl From<&PaymentOutcome> for PaymentResponseDto {
    fn from(outcome: &PaymentOutcome) -> Self {
        Self {
            invoice_number: outcome.invoice.invoice_number.to_string(),
            status: outcome.invoice.status,
            paid_total: outcome.paid_total.as_major(),
            remaining: outcome.remaining.as_major(),
        }
    }
}

//--------------------------------------    List queries    ----------------------------------------------------------
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListQuery {
    pub source: Option<String>,
    pub status: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
}

/// Optional `?source=` disambiguator for per-order lookups. Without it the oldest match wins.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceQuery {
    pub source: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_order_json() -> serde_json::Value {
        serde_json::json!({
            "source": "webshop",
            "sourceOrderId": "ORD-1",
            "customer": { "name": "Kari Nordmann", "email": "kari@example.no" },
            "lines": [ { "description": "Consulting", "quantity": 2.0, "unitPrice": 500.0 } ]
        })
    }

    #[test]
    fn a_minimal_order_converts() {
        let dto: ReceiveOrderDto = serde_json::from_value(sample_order_json()).unwrap();
        let order = IncomingOrder::try_from(dto).unwrap();
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.lines[0].quantity, Quantity::from_millis(2_000));
        assert_eq!(order.lines[0].unit_price, Money::from_minor(50_000));
        // Default MVA applies
        assert_eq!(order.lines[0].vat_rate, VatRate::from_basis_points(2_500));
        assert!(!order.auto_send);
    }

    #[test]
    fn invalid_lines_are_rejected_with_field_detail() {
        let mut json = sample_order_json();
        json["lines"][0]["quantity"] = serde_json::json!(0.0);
        let dto: ReceiveOrderDto = serde_json::from_value(json).unwrap();
        let err = IncomingOrder::try_from(dto).unwrap_err();
        assert!(err.to_string().contains("lines[0].quantity"));

        let mut json = sample_order_json();
        json["lines"][0]["vatRate"] = serde_json::json!(1.5);
        let dto: ReceiveOrderDto = serde_json::from_value(json).unwrap();
        assert!(IncomingOrder::try_from(dto).is_err());

        let mut json = sample_order_json();
        json["lines"][0]["unitPrice"] = serde_json::json!(-10.0);
        let dto: ReceiveOrderDto = serde_json::from_value(json).unwrap();
        assert!(IncomingOrder::try_from(dto).is_err());
    }

    #[test]
    fn empty_source_or_customer_is_rejected() {
        let mut json = sample_order_json();
        json["sourceOrderId"] = serde_json::json!("  ");
        let dto: ReceiveOrderDto = serde_json::from_value(json).unwrap();
        assert!(IncomingOrder::try_from(dto).is_err());

        let mut json = sample_order_json();
        json["customer"]["email"] = serde_json::json!("not-an-email");
        let dto: ReceiveOrderDto = serde_json::from_value(json).unwrap();
        assert!(IncomingOrder::try_from(dto).is_err());
    }

    #[test]
    fn payment_dto_converts_to_minor_units() {
        let dto = RegisterPaymentDto {
            invoice_number: "2025-000001".to_string(),
            amount: 1250.0,
            method: Some("vipps".to_string()),
            provider_ref: Some("vipps-tx-1".to_string()),
        };
        let payment = dto.into_new_payment().unwrap();
        assert_eq!(payment.amount, Money::from_minor(125_000));
        assert_eq!(payment.method.as_deref(), Some("vipps"));

        let negative = RegisterPaymentDto {
            invoice_number: "2025-000001".to_string(),
            amount: -1.0,
            method: None,
            provider_ref: None,
        };
        assert!(negative.into_new_payment().is_err());
    }
}

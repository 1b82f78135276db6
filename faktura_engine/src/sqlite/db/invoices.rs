use chrono::NaiveDate;
use fakt_common::Money;
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    api::objects::InvoiceQueryFilter,
    db_types::{Invoice, InvoiceLine, InvoiceNumber, InvoiceStatus, Kid, NewAttachment, NewInvoiceLine},
    traits::InvoicingError,
};

/// The column values for a new invoice row. Totals have already been computed from the lines.
#[derive(Debug, Clone)]
pub struct InvoiceInsert {
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
    pub credits_invoice_id: Option<i64>,
}

/// Sums a set of lines into `(subtotal, vat_amount, total_amount)`. VAT is computed per line and
/// then summed, so mixed-rate invoices stay exact.
pub fn line_totals(lines: &[NewInvoiceLine]) -> (Money, Money, Money) {
    let subtotal: Money = lines.iter().map(NewInvoiceLine::net_amount).sum();
    let vat: Money = lines.iter().map(NewInvoiceLine::vat_amount).sum();
    (subtotal, vat, subtotal + vat)
}

/// Claims the next sequence number for the given year. The upsert is a single statement, so
/// concurrent transactions each get a distinct number.
pub async fn next_invoice_seq(year: i32, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let (seq,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO invoice_counters (year, next_seq) VALUES ($1, 1)
        ON CONFLICT (year) DO UPDATE SET next_seq = next_seq + 1
        RETURNING next_seq
        "#,
    )
    .bind(year)
    .fetch_one(conn)
    .await?;
    Ok(seq)
}

/// Inserts the invoice row. Returns the raw sqlx error so callers can map unique-constraint
/// violations on the idempotency index.
pub async fn insert_invoice(insert: InvoiceInsert, conn: &mut SqliteConnection) -> Result<Invoice, sqlx::Error> {
    let invoice = sqlx::query_as(
        r#"
        INSERT INTO invoices (
            invoice_number, kid, source, source_order_id, organization_id, customer_id, status,
            currency, subtotal, vat_amount, total_amount, order_date, due_date, credits_invoice_id
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING *
        "#,
    )
    .bind(insert.invoice_number)
    .bind(insert.kid)
    .bind(insert.source)
    .bind(insert.source_order_id)
    .bind(insert.organization_id)
    .bind(insert.customer_id)
    .bind(insert.status)
    .bind(insert.currency)
    .bind(insert.subtotal)
    .bind(insert.vat_amount)
    .bind(insert.total_amount)
    .bind(insert.order_date)
    .bind(insert.due_date)
    .bind(insert.credits_invoice_id)
    .fetch_one(conn)
    .await?;
    Ok(invoice)
}

pub async fn insert_lines(
    invoice_id: i64,
    lines: &[NewInvoiceLine],
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    for line in lines {
        sqlx::query(
            r#"
            INSERT INTO invoice_lines (invoice_id, description, quantity, unit_price, vat_rate, amount)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(invoice_id)
        .bind(&line.description)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.vat_rate)
        .bind(line.net_amount())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn replace_lines(
    invoice_id: i64,
    lines: &[NewInvoiceLine],
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM invoice_lines WHERE invoice_id = $1").bind(invoice_id).execute(&mut *conn).await?;
    insert_lines(invoice_id, lines, conn).await
}

pub async fn fetch_invoice_by_number(
    number: &InvoiceNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Invoice>, sqlx::Error> {
    let invoice = sqlx::query_as("SELECT * FROM invoices WHERE invoice_number = $1")
        .bind(number.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(invoice)
}

/// A `None` source matches any source. Results are deterministic: the oldest match wins when a
/// partner order id collides across sources.
pub async fn fetch_invoice_by_source(
    source: Option<&str>,
    source_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Invoice>, sqlx::Error> {
    let invoice = sqlx::query_as(
        "SELECT * FROM invoices WHERE source_order_id = $1 AND ($2 IS NULL OR source = $2) ORDER BY id LIMIT 1",
    )
    .bind(source_order_id)
    .bind(source)
    .fetch_optional(conn)
    .await?;
    Ok(invoice)
}

pub async fn fetch_lines(invoice_id: i64, conn: &mut SqliteConnection) -> Result<Vec<InvoiceLine>, sqlx::Error> {
    let lines = sqlx::query_as("SELECT * FROM invoice_lines WHERE invoice_id = $1 ORDER BY id")
        .bind(invoice_id)
        .fetch_all(conn)
        .await?;
    Ok(lines)
}

/// Fetches invoices matching the filter, newest first. The limit is always applied.
pub async fn search_invoices(
    query: InvoiceQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Invoice>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM invoices ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(source) = &query.source {
        where_clause.push("source = ");
        where_clause.push_bind_unseparated(source.clone());
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let statuses =
            query.status.as_ref().map(|s| s.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",")).unwrap_or_default();
        where_clause.push(format!("status IN ({statuses})"));
    }
    if let Some(since) = query.since {
        where_clause.push("order_date >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("order_date <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    builder.push_bind(query.effective_limit());
    trace!("🗃️ Executing invoice search: {}", builder.sql());
    let invoices = builder.build_query_as::<Invoice>().fetch_all(conn).await?;
    Ok(invoices)
}

pub async fn update_status(
    id: i64,
    status: InvoiceStatus,
    conn: &mut SqliteConnection,
) -> Result<Invoice, InvoicingError> {
    let result: Option<Invoice> =
        sqlx::query_as("UPDATE invoices SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status)
            .bind(id)
            .fetch_optional(conn)
            .await?;
    result.ok_or_else(|| InvoicingError::DatabaseError(format!("Invoice with internal id {id} disappeared")))
}

pub async fn mark_sent(
    id: i64,
    pdf_url: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Invoice, InvoicingError> {
    let result: Option<Invoice> = sqlx::query_as(
        r#"
        UPDATE invoices SET status = $1, pdf_url = COALESCE($2, pdf_url), updated_at = CURRENT_TIMESTAMP
        WHERE id = $3 RETURNING *
        "#,
    )
    .bind(InvoiceStatus::Sent)
    .bind(pdf_url)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    result.ok_or_else(|| InvoicingError::DatabaseError(format!("Invoice with internal id {id} disappeared")))
}

/// Field changes for a draft update. Only present fields are written.
#[derive(Debug, Clone, Default)]
pub struct DraftChanges {
    pub customer_id: Option<i64>,
    pub kid: Option<Kid>,
    pub currency: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub totals: Option<(Money, Money, Money)>,
}

impl DraftChanges {
    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none()
            && self.kid.is_none()
            && self.currency.is_none()
            && self.order_date.is_none()
            && self.due_date.is_none()
            && self.totals.is_none()
    }
}

pub async fn update_draft_fields(
    id: i64,
    changes: DraftChanges,
    conn: &mut SqliteConnection,
) -> Result<Invoice, InvoicingError> {
    if changes.is_empty() {
        let invoice: Option<Invoice> =
            sqlx::query_as("SELECT * FROM invoices WHERE id = $1").bind(id).fetch_optional(conn).await?;
        return invoice.ok_or_else(|| InvoicingError::DatabaseError(format!("Invoice with internal id {id} disappeared")));
    }
    let mut builder = QueryBuilder::new("UPDATE invoices SET updated_at = CURRENT_TIMESTAMP, ");
    let mut set_clause = builder.separated(", ");
    if let Some(customer_id) = changes.customer_id {
        set_clause.push("customer_id = ");
        set_clause.push_bind_unseparated(customer_id);
    }
    if let Some(kid) = changes.kid {
        set_clause.push("kid = ");
        set_clause.push_bind_unseparated(kid);
    }
    if let Some(currency) = changes.currency {
        set_clause.push("currency = ");
        set_clause.push_bind_unseparated(currency);
    }
    if let Some(order_date) = changes.order_date {
        set_clause.push("order_date = ");
        set_clause.push_bind_unseparated(order_date);
    }
    if let Some(due_date) = changes.due_date {
        set_clause.push("due_date = ");
        set_clause.push_bind_unseparated(due_date);
    }
    if let Some((subtotal, vat, total)) = changes.totals {
        set_clause.push("subtotal = ");
        set_clause.push_bind_unseparated(subtotal);
        set_clause.push("vat_amount = ");
        set_clause.push_bind_unseparated(vat);
        set_clause.push("total_amount = ");
        set_clause.push_bind_unseparated(total);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");
    trace!("🗃️ Executing draft update: {}", builder.sql());
    let invoice = builder.build_query_as::<Invoice>().fetch_one(conn).await?;
    Ok(invoice)
}

/// Removes a draft and its dependent rows. Audit entries keep a NULL invoice reference.
pub async fn delete_draft_rows(id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM invoice_lines WHERE invoice_id = $1").bind(id).execute(&mut *conn).await?;
    sqlx::query("DELETE FROM order_meta WHERE invoice_id = $1").bind(id).execute(&mut *conn).await?;
    sqlx::query("DELETE FROM attachments WHERE invoice_id = $1").bind(id).execute(&mut *conn).await?;
    sqlx::query("UPDATE audit_events SET invoice_id = NULL WHERE invoice_id = $1").bind(id).execute(&mut *conn).await?;
    sqlx::query("DELETE FROM invoices WHERE id = $1").bind(id).execute(&mut *conn).await?;
    debug!("🗃️ Draft invoice with internal id {id} deleted");
    Ok(())
}

/// Marks the original invoice as credited and links the note.
pub async fn link_credit_note(
    original_id: i64,
    note_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Invoice, InvoicingError> {
    let result: Option<Invoice> = sqlx::query_as(
        r#"
        UPDATE invoices SET status = $1, credit_note_id = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $3 RETURNING *
        "#,
    )
    .bind(InvoiceStatus::Credited)
    .bind(note_id)
    .bind(original_id)
    .fetch_optional(conn)
    .await?;
    result.ok_or_else(|| InvoicingError::DatabaseError(format!("Invoice with internal id {original_id} disappeared")))
}

/// Flips every sent or partially paid invoice past its due date to `Overdue` and returns them.
pub async fn refresh_overdue(today: NaiveDate, conn: &mut SqliteConnection) -> Result<Vec<Invoice>, sqlx::Error> {
    let flipped: Vec<Invoice> = sqlx::query_as(
        r#"
        UPDATE invoices SET status = $1, updated_at = CURRENT_TIMESTAMP
        WHERE status IN ('SENT', 'PARTIALLY_PAID') AND due_date < $2
        RETURNING *
        "#,
    )
    .bind(InvoiceStatus::Overdue)
    .bind(today)
    .fetch_all(conn)
    .await?;
    Ok(flipped)
}

//--------------------------------------  meta & attachments  --------------------------------------------------------

pub async fn upsert_meta(
    invoice_id: i64,
    callback_url: Option<&str>,
    preferred_payment_method: Option<&str>,
    internal_reference: Option<&str>,
    metadata: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO order_meta (invoice_id, callback_url, preferred_payment_method, internal_reference, metadata)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (invoice_id) DO UPDATE SET
            callback_url = COALESCE(excluded.callback_url, callback_url),
            preferred_payment_method = COALESCE(excluded.preferred_payment_method, preferred_payment_method),
            internal_reference = COALESCE(excluded.internal_reference, internal_reference),
            metadata = COALESCE(excluded.metadata, metadata)
        "#,
    )
    .bind(invoice_id)
    .bind(callback_url)
    .bind(preferred_payment_method)
    .bind(internal_reference)
    .bind(metadata)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_meta(
    invoice_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<crate::db_types::OrderMeta>, sqlx::Error> {
    let meta = sqlx::query_as("SELECT * FROM order_meta WHERE invoice_id = $1")
        .bind(invoice_id)
        .fetch_optional(conn)
        .await?;
    Ok(meta)
}

pub async fn insert_attachments(
    invoice_id: i64,
    attachments: &[NewAttachment],
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    for att in attachments {
        sqlx::query("INSERT INTO attachments (invoice_id, file_name, file_url, mime_type) VALUES ($1, $2, $3, $4)")
            .bind(invoice_id)
            .bind(&att.file_name)
            .bind(&att.file_url)
            .bind(&att.mime_type)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn fetch_attachments(
    invoice_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<crate::db_types::Attachment>, sqlx::Error> {
    let attachments = sqlx::query_as("SELECT * FROM attachments WHERE invoice_id = $1 ORDER BY id")
        .bind(invoice_id)
        .fetch_all(conn)
        .await?;
    Ok(attachments)
}

#[cfg(test)]
mod test {
    use fakt_common::{Quantity, VatRate};

    use super::*;

    #[test]
    fn totals_sum_per_line() {
        let lines = vec![
            NewInvoiceLine {
                description: "Consulting".into(),
                quantity: Quantity::from_millis(2_500),
                unit_price: Money::from_minor(100_000),
                vat_rate: VatRate::from_basis_points(2500),
            },
            NewInvoiceLine {
                description: "Books".into(),
                quantity: Quantity::from_millis(1_000),
                unit_price: Money::from_minor(29_900),
                vat_rate: VatRate::from_basis_points(0),
            },
        ];
        let (subtotal, vat, total) = line_totals(&lines);
        assert_eq!(subtotal.value(), 250_000 + 29_900);
        assert_eq!(vat.value(), 62_500);
        assert_eq!(total, subtotal + vat);
    }

    #[test]
    fn negated_lines_negate_totals() {
        let lines = vec![NewInvoiceLine {
            description: "Consulting".into(),
            quantity: Quantity::from_millis(3_333),
            unit_price: Money::from_minor(99_990),
            vat_rate: VatRate::from_basis_points(2500),
        }];
        let negated: Vec<_> = lines.iter().map(NewInvoiceLine::negated).collect();
        let (s1, v1, t1) = line_totals(&lines);
        let (s2, v2, t2) = line_totals(&negated);
        assert_eq!(s2, -s1);
        assert_eq!(v2, -v1);
        assert_eq!(t2, -t1);
    }
}

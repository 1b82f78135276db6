use fakt_common::Money;
use sqlx::SqliteConnection;

use crate::db_types::{NewPayment, Payment, PaymentStatus};

/// Inserts a completed payment row. Payments are append-only; corrections go in as new rows.
pub async fn insert_payment(
    invoice_id: i64,
    payment: NewPayment,
    conn: &mut SqliteConnection,
) -> Result<Payment, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
        INSERT INTO payments (invoice_id, amount, status, method, reference, paid_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(invoice_id)
    .bind(payment.amount)
    .bind(PaymentStatus::Completed)
    .bind(payment.method)
    .bind(payment.reference)
    .bind(payment.paid_at)
    .fetch_one(conn)
    .await?;
    Ok(payment)
}

/// The paid total for an invoice: the sum over completed payments, always recomputed rather
/// than cached.
pub async fn completed_total(invoice_id: i64, conn: &mut SqliteConnection) -> Result<Money, sqlx::Error> {
    let (total,): (i64,) =
        sqlx::query_as("SELECT COALESCE(SUM(amount), 0) FROM payments WHERE invoice_id = $1 AND status = 'COMPLETED'")
            .bind(invoice_id)
            .fetch_one(conn)
            .await?;
    Ok(Money::from_minor(total))
}

pub async fn payments_for_invoice(invoice_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Payment>, sqlx::Error> {
    let payments = sqlx::query_as("SELECT * FROM payments WHERE invoice_id = $1 ORDER BY paid_at, id")
        .bind(invoice_id)
        .fetch_all(conn)
        .await?;
    Ok(payments)
}

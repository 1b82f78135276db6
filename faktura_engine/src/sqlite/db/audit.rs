use sqlx::SqliteConnection;

use crate::db_types::{AuditAction, AuditEvent, EmailLog, EmailStatus};

/// Appends an audit record. Audit rows are never updated or deleted.
pub async fn insert_audit(
    invoice_id: Option<i64>,
    action: AuditAction,
    detail: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO audit_events (invoice_id, action, detail) VALUES ($1, $2, $3)")
        .bind(invoice_id)
        .bind(action)
        .bind(detail)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn audit_for_invoice(invoice_id: i64, conn: &mut SqliteConnection) -> Result<Vec<AuditEvent>, sqlx::Error> {
    let events = sqlx::query_as("SELECT * FROM audit_events WHERE invoice_id = $1 ORDER BY id")
        .bind(invoice_id)
        .fetch_all(conn)
        .await?;
    Ok(events)
}

pub async fn insert_email_log(
    invoice_id: i64,
    recipient: &str,
    status: EmailStatus,
    error: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO email_logs (invoice_id, recipient, status, error) VALUES ($1, $2, $3, $4)")
        .bind(invoice_id)
        .bind(recipient)
        .bind(status)
        .bind(error)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn email_logs_for_invoice(invoice_id: i64, conn: &mut SqliteConnection) -> Result<Vec<EmailLog>, sqlx::Error> {
    let logs = sqlx::query_as("SELECT * FROM email_logs WHERE invoice_id = $1 ORDER BY id")
        .bind(invoice_id)
        .fetch_all(conn)
        .await?;
    Ok(logs)
}

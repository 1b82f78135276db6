use sqlx::SqliteConnection;

use crate::{db_types::Organization, traits::InvoicingError};

pub async fn fetch_organization(id: i64, conn: &mut SqliteConnection) -> Result<Option<Organization>, sqlx::Error> {
    let org = sqlx::query_as("SELECT * FROM organizations WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(org)
}

pub async fn default_organization(conn: &mut SqliteConnection) -> Result<Option<Organization>, sqlx::Error> {
    let org = sqlx::query_as("SELECT * FROM organizations WHERE is_default = 1 ORDER BY id LIMIT 1")
        .fetch_optional(conn)
        .await?;
    Ok(org)
}

/// Resolves the issuing organization for an order: the explicit id if given, otherwise the
/// default organization.
pub async fn resolve_organization(
    explicit_id: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<Organization, InvoicingError> {
    match explicit_id {
        Some(id) => fetch_organization(id, conn).await?.ok_or(InvoicingError::OrganizationNotFound(id)),
        None => default_organization(conn).await?.ok_or(InvoicingError::NoOrganization),
    }
}

pub async fn insert_organization(
    name: &str,
    org_number: Option<&str>,
    is_default: bool,
    conn: &mut SqliteConnection,
) -> Result<Organization, sqlx::Error> {
    let org = sqlx::query_as(
        "INSERT INTO organizations (name, org_number, is_default) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(name)
    .bind(org_number)
    .bind(is_default)
    .fetch_one(conn)
    .await?;
    Ok(org)
}

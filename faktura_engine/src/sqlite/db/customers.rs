use log::debug;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{Customer, NewCustomer},
    traits::InvoicingError,
};

/// Customer numbers start here. The first customer gets 10001.
const CUSTOMER_NUMBER_FLOOR: i64 = 10_000;

pub async fn fetch_customer_by_email(
    email: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Customer>, sqlx::Error> {
    let customer =
        sqlx::query_as("SELECT * FROM customers WHERE email = $1").bind(email).fetch_optional(conn).await?;
    Ok(customer)
}

pub async fn fetch_customer_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Customer>, sqlx::Error> {
    let customer = sqlx::query_as("SELECT * FROM customers WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(customer)
}

/// The next free customer number. Callers must hold this inside the same transaction as the
/// insert, so two concurrent ingestions cannot claim the same number.
async fn next_customer_number(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let (n,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(customer_number), $1) + 1 FROM customers")
        .bind(CUSTOMER_NUMBER_FLOOR)
        .fetch_one(conn)
        .await?;
    Ok(n)
}

/// Finds the customer by email, or creates one with the next sequential customer number.
///
/// On a match, fields present in the incoming record overwrite the stored values; absent fields
/// keep what is already there. Customer numbers are never changed or reused.
pub async fn upsert_customer(
    customer: NewCustomer,
    conn: &mut SqliteConnection,
) -> Result<Customer, InvoicingError> {
    match fetch_customer_by_email(&customer.email, conn).await? {
        Some(existing) => merge_update(existing, customer, conn).await,
        None => {
            let number = next_customer_number(conn).await?;
            let created: Customer = sqlx::query_as(
                r#"
                INSERT INTO customers (customer_number, name, email, phone, address, postal_code, city, country, org_number)
                VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, 'NO'), $9)
                RETURNING *
                "#,
            )
            .bind(number)
            .bind(customer.name)
            .bind(customer.email)
            .bind(customer.phone)
            .bind(customer.address)
            .bind(customer.postal_code)
            .bind(customer.city)
            .bind(customer.country)
            .bind(customer.org_number)
            .fetch_one(conn)
            .await?;
            debug!("🗃️ Customer [{}] created with number {}", created.email, created.customer_number);
            Ok(created)
        },
    }
}

async fn merge_update(
    existing: Customer,
    incoming: NewCustomer,
    conn: &mut SqliteConnection,
) -> Result<Customer, InvoicingError> {
    let mut builder = QueryBuilder::new("UPDATE customers SET updated_at = CURRENT_TIMESTAMP, ");
    let mut set_clause = builder.separated(", ");
    set_clause.push("name = ");
    set_clause.push_bind_unseparated(incoming.name);
    if let Some(phone) = incoming.phone {
        set_clause.push("phone = ");
        set_clause.push_bind_unseparated(phone);
    }
    if let Some(address) = incoming.address {
        set_clause.push("address = ");
        set_clause.push_bind_unseparated(address);
    }
    if let Some(postal_code) = incoming.postal_code {
        set_clause.push("postal_code = ");
        set_clause.push_bind_unseparated(postal_code);
    }
    if let Some(city) = incoming.city {
        set_clause.push("city = ");
        set_clause.push_bind_unseparated(city);
    }
    if let Some(country) = incoming.country {
        set_clause.push("country = ");
        set_clause.push_bind_unseparated(country);
    }
    if let Some(org_number) = incoming.org_number {
        set_clause.push("org_number = ");
        set_clause.push_bind_unseparated(org_number);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(existing.id);
    builder.push(" RETURNING *");
    let updated = builder.build_query_as::<Customer>().fetch_one(conn).await?;
    debug!("🗃️ Customer [{}] merged with incoming order details", updated.email);
    Ok(updated)
}

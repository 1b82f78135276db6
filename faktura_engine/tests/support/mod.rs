//! Shared helpers for the engine integration tests. Each test gets a fresh in-memory database
//! with the migrations applied and a default organization seeded.
use fakt_common::{Money, Quantity, VatRate};
use faktura_engine::{
    api::objects::{IncomingOrder, OrderMetaFields},
    db_types::{NewCustomer, NewInvoiceLine},
    sqlite::db::organizations,
    SqliteDatabase,
};

pub async fn new_test_db() -> SqliteDatabase {
    let _ = env_logger::try_init();
    let db = SqliteDatabase::new_with_url("sqlite::memory:", 1).await.expect("Error creating database");
    sqlx::migrate!("./migrations").run(db.pool()).await.expect("Error running migrations");
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    organizations::insert_organization("Fjellstad Regnskap AS", Some("987654321"), true, &mut conn)
        .await
        .expect("Error seeding default organization");
    db
}

pub fn sample_customer(email: &str) -> NewCustomer {
    NewCustomer {
        name: "Kari Nordmann".to_string(),
        email: email.to_string(),
        phone: Some("+47 99 88 77 66".to_string()),
        address: Some("Storgata 1".to_string()),
        postal_code: Some("0155".to_string()),
        city: Some("Oslo".to_string()),
        country: None,
        org_number: None,
    }
}

/// An order with one line: 2 × 500.00 NOK at 25% VAT. Net 1000.00, VAT 250.00, total 1250.00.
pub fn sample_order(source_order_id: &str, email: &str) -> IncomingOrder {
    IncomingOrder {
        source: "webshop".to_string(),
        source_order_id: source_order_id.to_string(),
        customer: sample_customer(email),
        organization_id: None,
        order_date: None,
        due_days: None,
        currency: None,
        lines: vec![NewInvoiceLine {
            description: "Consulting hours".to_string(),
            quantity: Quantity::from_millis(2_000),
            unit_price: Money::from_minor(50_000),
            vat_rate: VatRate::from_basis_points(2_500),
        }],
        auto_send: false,
        meta: OrderMetaFields::default(),
        attachments: vec![],
    }
}

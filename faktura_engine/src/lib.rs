//! Faktura Engine
//!
//! The domain engine behind the faktura invoicing gateway. It turns incoming partner orders into
//! invoices with Norwegian KID payment references, tracks the invoice lifecycle through payment,
//! and records the outbound webhook deliveries that notify partners of lifecycle changes.
//!
//! The crate is split along the same seams as the database:
//! 1. Storage ([`mod@sqlite`]): the SQLite backend. Access goes through the trait contracts in
//!    [`mod@traits`]; the record types live in [`mod@db_types`] and are public.
//! 2. The engine API ([`mod@api`]): [`OrderFlowApi`], [`InvoiceApi`], [`PaymentApi`] and
//!    [`CredentialApi`], each generic over the storage traits so backends and test doubles plug
//!    in freely.
//!
//! Lifecycle changes emit events through a small async hook system ([`mod@events`]); the server
//! crate subscribes the webhook dispatcher to these hooks.
pub mod api;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use api::{CredentialApi, InvoiceApi, OrderFlowApi, PaymentApi};
pub use traits::{
    AuthenticationError,
    CredentialManagement,
    InvoicingDatabase,
    InvoicingError,
    WebhookStore,
    WebhookStoreError,
};

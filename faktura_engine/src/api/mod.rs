//! The public engine APIs, generic over the storage traits.
pub mod credential_api;
pub mod invoice_api;
pub mod objects;
pub mod order_flow_api;
pub mod payment_api;

pub use credential_api::{CredentialApi, MAX_TIMESTAMP_SKEW_SECONDS};
pub use invoice_api::InvoiceApi;
pub use order_flow_api::OrderFlowApi;
pub use payment_api::PaymentApi;

mod money;
mod secret;

pub use money::{Money, MoneyConversionError, Quantity, VatRate, DEFAULT_CURRENCY_CODE};
pub use secret::Secret;

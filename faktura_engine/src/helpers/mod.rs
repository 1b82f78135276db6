mod kid;
mod request_signature;

pub use kid::{luhn_check_digit, order_kid, validate_kid, weighted_check_digit, weighted_kid, KidScheme};
pub use request_signature::{key_hash, sign, verify};

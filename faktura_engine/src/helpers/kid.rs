//! KID payment reference generation.
//!
//! Norwegian banks match incoming payments to invoices by the KID number on the payment slip, so
//! every invoice gets one at creation time. Two schemes are in use:
//!
//! * [`KidScheme::Luhn`] is canonical for ingested orders: a 5-digit zero-padded customer number,
//!   a 10-digit fragment derived deterministically from the source order id, and a MOD10 (Luhn)
//!   check digit. The same customer and order always produce the same KID.
//! * [`KidScheme::Mod10Weighted`] covers invoices with no customer-scoped order id (credit notes
//!   and manually raised invoices): the digits of the invoice number with a weighted MOD10 check
//!   digit.
use blake2::{Blake2b512, Digest};

use crate::db_types::Kid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KidScheme {
    Luhn,
    Mod10Weighted,
}

/// Weight cycle for the weighted scheme, applied right-to-left.
const WEIGHTS: [u32; 10] = [2, 3, 4, 5, 6, 7, 2, 3, 4, 5];

const FRAGMENT_MODULUS: u64 = 10_000_000_000;

/// Generates the canonical KID for an ingested order.
pub fn order_kid(customer_number: i64, source_order_id: &str) -> Kid {
    let payload = format!("{:05}{}", customer_number % 100_000, order_fragment(source_order_id));
    let check = luhn_check_digit(&payload);
    Kid(format!("{payload}{check}"))
}

/// Generates a weighted-scheme KID from an invoice number. Non-digit characters are ignored.
pub fn weighted_kid(invoice_number: &str) -> Kid {
    let payload: String = invoice_number.chars().filter(char::is_ascii_digit).collect();
    let check = weighted_check_digit(&payload);
    Kid(format!("{payload}{check}"))
}

/// Checks that the given KID is numeric and carries a valid check digit under the given scheme.
pub fn validate_kid(kid: &Kid, scheme: KidScheme) -> bool {
    let s = kid.as_str();
    if s.len() < 2 || !s.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let (payload, check) = s.split_at(s.len() - 1);
    let expected = match scheme {
        KidScheme::Luhn => luhn_check_digit(payload),
        KidScheme::Mod10Weighted => weighted_check_digit(payload),
    };
    check == expected.to_string()
}

/// The 10-digit deterministic fragment for a source order id.
fn order_fragment(source_order_id: &str) -> String {
    let digest = Blake2b512::digest(source_order_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let n = u64::from_be_bytes(bytes) % FRAGMENT_MODULUS;
    format!("{n:010}")
}

/// MOD10 (Luhn) check digit. Every second digit from the right is doubled, and 9 is subtracted
/// from products above 9.
pub fn luhn_check_digit(payload: &str) -> u8 {
    let sum: u32 = payload
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

/// Weighted MOD10 check digit using the [`WEIGHTS`] cycle, right-to-left.
pub fn weighted_check_digit(payload: &str) -> u8 {
    let sum: u32 = payload
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| d * WEIGHTS[i % WEIGHTS.len()])
        .sum();
    ((10 - sum % 10) % 10) as u8
}

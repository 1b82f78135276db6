use std::fmt;

/// Holds an API credential's HMAC signing key in memory without letting it leak through
/// `Debug` output or log lines. The raw value only comes out through an explicit
/// [`reveal`](Secret::reveal) call at the signing or verification site.
#[derive(Clone)]
pub struct Secret<T> {
    value: T,
}

impl<T> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    /// Hands back the wrapped signing key. Call this where the HMAC is computed, nowhere else.
    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn debug_output_masks_the_key() {
        let secret = Secret::new("whsec_0123456789abcdef".to_string());
        let printed = format!("{secret:?}");
        assert_eq!(printed, "****");
        assert_eq!(secret.reveal(), "whsec_0123456789abcdef");
    }
}

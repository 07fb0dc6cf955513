use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A short code encoded as base58 string.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortCodeBase58(String);

impl ShortCodeBase58 {
    /// Creates a new `ShortCodeBase58` by encoding the given bytes as base58
    /// (Bitcoin alphabet).
    pub fn new<T: AsRef<[u8]>>(bytes: T) -> Self {
        Self(bs58::encode(bytes).into_string())
    }

    /// Derives a short code from an original URL.
    ///
    /// The URL bytes are read as a big-endian integer truncated to its low
    /// 64 bits, that number is written in base58, and the first `length`
    /// characters are kept. Zero is written as `"1"`. The transform is
    /// deterministic and not collision resistant.
    ///
    /// # Examples
    ///
    /// ```
    /// use shortlink_core::ShortCodeBase58;
    ///
    /// let code = ShortCodeBase58::digest("https://www.youtube.com/watch?v=09nmlZjxRFs", 5);
    /// assert_eq!(code.as_str(), "KJYUS");
    /// ```
    pub fn digest(original_url: &str, length: usize) -> Self {
        let bytes = original_url.as_bytes();
        let tail = &bytes[bytes.len().saturating_sub(8)..];
        let mut word = [0u8; 8];
        word[8 - tail.len()..].copy_from_slice(tail);
        let number = u64::from_be_bytes(word);

        // Leading zero bytes would each become a '1'; only the value counts.
        let be = number.to_be_bytes();
        let significant = &be[be.iter().take_while(|b| **b == 0).count()..];
        let encoded = if significant.is_empty() {
            Self("1".to_string())
        } else {
            Self::new(significant)
        };
        Self(encoded.0.chars().take(length).collect())
    }

    /// Returns the short code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ShortCodeBase58 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ShortCodeBase58").field(&self.0).finish()
    }
}

impl Display for ShortCodeBase58 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = ShortCodeBase58::digest("https://practicum.yandex.ru", 5);
        let b = ShortCodeBase58::digest("https://practicum.yandex.ru", 5);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "HJCtC");
    }

    #[test]
    fn digest_matches_known_codes() {
        assert_eq!(
            ShortCodeBase58::digest("https://www.youtube.com/watch?v=09nmlZjxRFs", 5).as_str(),
            "KJYUS"
        );
        assert_eq!(
            ShortCodeBase58::digest("https://example.com/a", 5).as_str(),
            "K8a38"
        );
    }

    #[test]
    fn digest_uses_low_64_bits() {
        // Only the trailing eight bytes take part in the digest.
        let long = ShortCodeBase58::digest("https://www.youtube.com/watch?v=09nmlZjxRFs", 26);
        assert_eq!(long.as_str(), "KJYUSQQgf2z");

        let same_tail = ShortCodeBase58::digest("mlZjxRFs", 26);
        assert_eq!(long, same_tail);
    }

    #[test]
    fn digest_of_short_inputs_is_not_padded() {
        assert_eq!(ShortCodeBase58::digest("a", 5).as_str(), "2g");
        assert_eq!(ShortCodeBase58::digest("", 5).as_str(), "1");
    }

    #[test]
    fn new_encodes_raw_bytes() {
        assert_eq!(ShortCodeBase58::new([97u8]).as_str(), "2g");
        assert_eq!(ShortCodeBase58::new([0u8, 97]).as_str(), "12g");
    }
}

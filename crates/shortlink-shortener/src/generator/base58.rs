use crate::generator::Generator;
use shortlink_core::{ShortCode, ShortCodeBase58};

/// Default length of generated codes.
pub const DEFAULT_LENGTH: usize = 5;

/// Deterministic hash-to-base58 generator.
///
/// See [`ShortCodeBase58::digest`] for the transform. Distinct URLs can
/// share a code; a longer `length` only makes that less likely.
#[derive(Debug, Clone, Copy)]
pub struct Base58Generator {
    length: usize,
}

impl Base58Generator {
    /// Creates a generator producing codes of at most `length` characters.
    /// A zero length is raised to one.
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for Base58Generator {
    fn default() -> Self {
        Self::new(DEFAULT_LENGTH)
    }
}

impl Generator for Base58Generator {
    fn generate(&self, original_url: &str) -> ShortCode {
        ShortCode::generated(ShortCodeBase58::digest(original_url, self.length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_known_codes() {
        let generator = Base58Generator::default();

        assert_eq!(
            generator
                .generate("https://www.youtube.com/watch?v=09nmlZjxRFs")
                .as_str(),
            "KJYUS"
        );
        assert_eq!(generator.generate("https://example.com/a").as_str(), "K8a38");
        assert_eq!(
            generator.generate("https://practicum.yandex.ru").as_str(),
            "HJCtC"
        );
    }

    #[test]
    fn same_url_same_code() {
        let generator = Base58Generator::new(8);
        assert_eq!(
            generator.generate("https://example.com/a"),
            generator.generate("https://example.com/a")
        );
    }

    #[test]
    fn short_digests_are_not_padded() {
        let generator = Base58Generator::new(5);
        assert_eq!(generator.generate("a").as_str(), "2g");
    }

    #[test]
    fn zero_length_is_raised() {
        assert_eq!(Base58Generator::new(0).length(), 1);
    }

    #[test]
    fn generator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Base58Generator>();
    }
}

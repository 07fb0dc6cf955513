pub mod base58;

pub use base58::Base58Generator;

use shortlink_core::ShortCode;

/// Trait for generating short codes.
///
/// Implementations are pure generators that don't interact with storage.
/// The same URL may map to the same code every time; uniqueness across
/// different URLs is not promised.
pub trait Generator: Send + Sync + 'static {
    /// Derives a short code for `original_url`.
    fn generate(&self, original_url: &str) -> ShortCode;
}

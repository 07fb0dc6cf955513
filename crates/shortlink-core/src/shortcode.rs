use crate::base58::ShortCodeBase58;
use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The lookup key of a stored record.
///
/// Codes are 1-64 characters long and contain only alphanumeric
/// characters, hyphens, or underscores.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortCode(String);

const MIN_LENGTH: usize = 1;
const MAX_LENGTH: usize = 64;

impl ShortCode {
    /// Creates a `ShortCode` from a base58 digest produced by a generator.
    pub fn generated(code: impl Into<ShortCodeBase58>) -> Self {
        Self(code.into().as_str().to_owned())
    }

    /// Creates a new `ShortCode` after validating the input.
    pub fn new(code: impl Into<String>) -> Result<Self, StorageError> {
        let code = code.into();
        Self::validate(&code)?;
        Ok(Self(code))
    }

    /// Creates a `ShortCode` without validation.
    ///
    /// Use this only for codes read back from a backend or produced by a
    /// trusted generator.
    pub fn new_unchecked(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Generates the full shortened URL based on the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }

    /// Returns the short code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this code ends with the given path fragment.
    pub fn ends_with(&self, fragment: &str) -> bool {
        self.0.ends_with(fragment)
    }

    fn validate(code: &str) -> Result<(), StorageError> {
        if code.len() < MIN_LENGTH || code.len() > MAX_LENGTH {
            return Err(StorageError::InvalidData(format!(
                "short code length must be between {} and {}, got {}",
                MIN_LENGTH,
                MAX_LENGTH,
                code.len()
            )));
        }

        if !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(StorageError::InvalidData(format!(
                "short code must contain only alphanumeric characters, hyphens, or underscores: '{}'",
                code
            )));
        }

        Ok(())
    }
}

impl Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ShortCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

//! In-memory secret values with redacted rendering.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for resolved values that prevents accidental logging
//! - [`redacted_preview`] - The audit trail's masked preview of a value
//!
//! The inner value is only accessible via [`expose()`](Secret::expose).
//! Debug and Display implementations show `[REDACTED]` instead of the value,
//! and the backing memory is zeroed on drop.

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// A resolved value that prevents accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Byte length of the secret value.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the secret is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Redacted preview of a value for audit entries.
///
/// Values of four characters or fewer are shown whole; longer values show
/// the first four characters followed by a masked tail.
pub fn redacted_preview(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        value.to_string()
    } else {
        let head: String = chars[..4].iter().collect();
        format!("{}{}", head, "*".repeat(chars.len() - 4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_redacted() {
        let secret = Secret::new("super-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_secret_display_redacted() {
        let secret = Secret::new("super-secret");
        let display = format!("{}", secret);
        assert!(!display.contains("super-secret"));
        assert!(display.contains("REDACTED"));
    }

    #[test]
    fn test_secret_expose() {
        let secret = Secret::new("abc123");
        assert_eq!(secret.expose(), "abc123");
        assert_eq!(secret.len(), 6);
    }

    #[test]
    fn test_redacted_preview_short_values_shown_whole() {
        assert_eq!(redacted_preview("ab"), "ab");
        assert_eq!(redacted_preview("abcd"), "abcd");
        assert_eq!(redacted_preview(""), "");
    }

    #[test]
    fn test_redacted_preview_long_values_masked() {
        assert_eq!(redacted_preview("abcdef"), "abcd**");
        assert_eq!(redacted_preview("topsecret"), "tops*****");
    }
}

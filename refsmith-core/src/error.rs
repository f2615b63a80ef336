//! Error types for placeholder resolution.
//!
//! This module provides:
//! - [`ErrorKind`] - The classified failure kinds surfaced per reference
//! - [`ProviderError`] - Error returned by a provider's resolve call
//! - [`RefsmithError`] - Top-level error type for the crate
//!
//! Providers never panic across the queue boundary: every failure is a
//! returned [`ProviderError`], recorded against the one reference that
//! triggered it. A run degrades per item and never fails atomically.

use thiserror::Error;

/// Classified failure kind for a single reference.
///
/// The `Display` rendering is the stable snake_case wire name reported to
/// hosts and counted in the audit trail's error histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The identifier did not match the provider's expected shape.
    InvalidIdentifier,

    /// No registered provider claimed the reference's namespace.
    NoProviderAvailable,

    /// The key exists in no configured source.
    NotFound,

    /// The provider's backend rejected the credentials or session.
    AuthFailure,

    /// The provider's I/O call exceeded its timeout.
    NetworkTimeout,

    /// The secret store has no value at the requested path/field.
    SecretNotFound,

    /// Required provider configuration is missing or unreadable.
    ConfigMissing,

    /// The reference sits deeper than the configured maximum chain depth.
    MaxDepthExceeded,

    /// The reference participates in a resolution cycle.
    ///
    /// Carries the full ancestor chain, oldest first.
    CircularReference { chain: Vec<String> },

    /// The whole run exceeded its timeout before this reference was attempted.
    ResolutionTimeout,

    /// The placeholder text itself is malformed for its source.
    InvalidVariableFormat,

    /// Uncategorized provider failure, carrying the provider's own message.
    Other(String),
}

impl ErrorKind {
    /// The stable snake_case name for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::InvalidIdentifier => "invalid_identifier",
            Self::NoProviderAvailable => "no_provider_available",
            Self::NotFound => "not_found",
            Self::AuthFailure => "auth_failure",
            Self::NetworkTimeout => "network_timeout",
            Self::SecretNotFound => "secret_not_found",
            Self::ConfigMissing => "config_missing",
            Self::MaxDepthExceeded => "max_depth_exceeded",
            Self::CircularReference { .. } => "circular_reference",
            Self::ResolutionTimeout => "resolution_timeout",
            Self::InvalidVariableFormat => "invalid_variable_format",
            Self::Other(_) => "provider_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CircularReference { chain } => write!(
                f,
                "circular_reference (chain of {}: {})",
                chain.len(),
                chain.join(" -> ")
            ),
            Self::Other(message) => write!(f, "provider_error: {}", message),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Error returned by a provider when resolving an identifier.
#[derive(Debug, Error, Clone)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    /// The classified failure kind.
    pub kind: ErrorKind,

    /// Human-readable detail, safe to log (never contains secret values).
    pub message: String,
}

impl ProviderError {
    /// Create a provider error with a classified kind and detail message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for an uncategorized failure.
    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ErrorKind::Other(message.clone()),
            message,
        }
    }

    /// Shorthand for a missing-key failure.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for a missing/invalid-configuration failure.
    pub fn config_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigMissing, message)
    }
}

/// Top-level error type for the refsmith core library.
#[derive(Debug, Error)]
pub enum RefsmithError {
    /// A provider failed during registration or lifecycle calls.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Registration was rejected by the registry.
    #[error("registration error: {message}")]
    Registration { message: String },

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Generic internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_wire_names() {
        assert_eq!(ErrorKind::InvalidIdentifier.as_str(), "invalid_identifier");
        assert_eq!(ErrorKind::SecretNotFound.as_str(), "secret_not_found");
        assert_eq!(ErrorKind::ResolutionTimeout.as_str(), "resolution_timeout");
        assert_eq!(
            ErrorKind::CircularReference { chain: vec![] }.as_str(),
            "circular_reference"
        );
    }

    #[test]
    fn test_circular_reference_display_includes_chain() {
        let kind = ErrorKind::CircularReference {
            chain: vec!["{{refs:A}}".to_string(), "{{refs:B}}".to_string()],
        };
        let rendered = kind.to_string();
        assert!(rendered.contains("chain of 2"));
        assert!(rendered.contains("{{refs:A}} -> {{refs:B}}"));
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::new(ErrorKind::AuthFailure, "vault token expired");
        assert_eq!(err.to_string(), "auth_failure: vault token expired");
    }
}

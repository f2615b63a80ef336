//! Placeholder reference parsing and classification.
//!
//! This module provides:
//! - [`Reference`] - A classified `{{...}}` placeholder
//! - [`extract_references`] - Find all placeholder spans in a text block
//! - [`classify`] - Decide whether an inner text is provider-addressed or traditional
//!
//! Parsing is pure and deterministic: no I/O, no caching. The raw placeholder
//! text (braces included) is the substitution key used by the resolution queue,
//! so it is carried on every reference.

use std::fmt;

/// A classified placeholder reference found in input text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// A provider-addressed reference such as `{{vault:secret/app#key}}`
    /// or `{{oauth:my_service}}`.
    Provider {
        /// The provider namespace (text before the first `:`).
        namespace: String,
        /// The path portion (text after `:`, before `#` if any).
        path: String,
        /// The field portion (text after `#`), when present.
        field: Option<String>,
        /// The exact `{{...}}` text as it appeared in the input.
        raw: String,
    },

    /// A traditional key-value reference such as `{{USER}}`, looked up
    /// against the host-supplied sources during the compile phase.
    Traditional {
        /// The variable name (inner text, trimmed).
        name: String,
        /// The exact `{{...}}` text as it appeared in the input.
        raw: String,
    },
}

impl Reference {
    /// The exact placeholder text, braces included.
    pub fn raw(&self) -> &str {
        match self {
            Self::Provider { raw, .. } | Self::Traditional { raw, .. } => raw,
        }
    }

    /// The inner text between the braces, untrimmed.
    pub fn inner(&self) -> &str {
        let raw = self.raw();
        &raw[2..raw.len() - 2]
    }

    /// The provider namespace, if this is a provider reference.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Provider { namespace, .. } => Some(namespace),
            Self::Traditional { .. } => None,
        }
    }

    /// The identifier handed to a provider: everything after the
    /// namespace's first `:` (e.g. `secret/app#key`, `my_service`).
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::Provider { namespace, .. } => {
                self.inner().get(namespace.len() + 1..)
            }
            Self::Traditional { .. } => None,
        }
    }

    /// Whether this reference is provider-addressed.
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw())
    }
}

/// Extract all `{{...}}` spans from a text block.
///
/// Spans are non-nested: the first `}}` closes the open span. An
/// unterminated `{{` is ignored. Returned slices include the braces.
pub fn extract_raw(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut rest = text;
    let mut offset = 0;

    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let start = offset + open;
                let end = offset + open + 2 + close + 2;
                spans.push(&text[start..end]);
                let consumed = open + 2 + close + 2;
                offset += consumed;
                rest = &rest[consumed..];
            }
            None => break,
        }
    }

    spans
}

/// Extract and classify every placeholder in a text block.
pub fn extract_references(text: &str) -> Vec<Reference> {
    extract_raw(text).into_iter().map(classify).collect()
}

/// Classify a raw `{{...}}` span as provider-addressed or traditional.
///
/// A reference is a provider reference only when the inner text:
/// - contains no whitespace,
/// - contains a `:` with a non-empty namespace before it and a non-empty
///   remainder after it, and
/// - if a `#` is present: exactly one `#`, strictly after the first `:`,
///   with non-empty path and field around it.
///
/// Everything else is traditional. `{{a#b#c}}`, `{{plain:with space#x}}`
/// and `{{novaultcolon}}` are all traditional; `{{vault:secret/api#token}}`
/// and `{{oauth:svc}}` are provider references.
pub fn classify(raw: &str) -> Reference {
    debug_assert!(raw.starts_with("{{") && raw.ends_with("}}"));
    let inner = &raw[2..raw.len() - 2];

    let traditional = || Reference::Traditional {
        name: inner.trim().to_string(),
        raw: raw.to_string(),
    };

    if inner.chars().any(char::is_whitespace) {
        return traditional();
    }

    let Some(colon) = inner.find(':') else {
        return traditional();
    };

    let namespace = &inner[..colon];
    let remainder = &inner[colon + 1..];
    if namespace.is_empty() || remainder.is_empty() {
        return traditional();
    }

    let hash_count = inner.matches('#').count();
    match hash_count {
        0 => Reference::Provider {
            namespace: namespace.to_string(),
            path: remainder.to_string(),
            field: None,
            raw: raw.to_string(),
        },
        1 => {
            let hash = inner.find('#').unwrap_or(0);
            if hash < colon {
                return traditional();
            }
            let path = &inner[colon + 1..hash];
            let field = &inner[hash + 1..];
            if path.is_empty() || field.is_empty() {
                return traditional();
            }
            Reference::Provider {
                namespace: namespace.to_string(),
                path: path.to_string(),
                field: Some(field.to_string()),
                raw: raw.to_string(),
            }
        }
        _ => traditional(),
    }
}

/// Whether a text block contains anything that could be a placeholder.
pub fn has_references(text: &str) -> bool {
    !extract_raw(text).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_parts(raw: &str) -> (String, String, Option<String>) {
        match classify(raw) {
            Reference::Provider {
                namespace,
                path,
                field,
                ..
            } => (namespace, path, field),
            other => panic!("expected provider reference, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_simple() {
        let spans = extract_raw("Bearer {{oauth:svc}} and {{USER}}");
        assert_eq!(spans, vec!["{{oauth:svc}}", "{{USER}}"]);
    }

    #[test]
    fn test_extract_adjacent() {
        let spans = extract_raw("{{a}}{{b}}{{c}}");
        assert_eq!(spans.len(), 3);
    }

    #[test]
    fn test_extract_unterminated() {
        assert!(extract_raw("{{oops").is_empty());
        let spans = extract_raw("{{ok}} then {{oops");
        assert_eq!(spans, vec!["{{ok}}"]);
    }

    #[test]
    fn test_extract_first_close_wins() {
        // Non-nested grammar: the first }} closes the span.
        let spans = extract_raw("{{outer {{inner}} }}");
        assert_eq!(spans, vec!["{{outer {{inner}}"]);
    }

    #[test]
    fn test_classify_vault_reference() {
        let (ns, path, field) = provider_parts("{{vault:secret/api#token}}");
        assert_eq!(ns, "vault");
        assert_eq!(path, "secret/api");
        assert_eq!(field.as_deref(), Some("token"));
    }

    #[test]
    fn test_classify_oauth_reference_without_field() {
        let (ns, path, field) = provider_parts("{{oauth:my_service}}");
        assert_eq!(ns, "oauth");
        assert_eq!(path, "my_service");
        assert_eq!(field, None);
    }

    #[test]
    fn test_classify_whitespace_is_traditional() {
        let reference = classify("{{plain:with space#x}}");
        assert!(!reference.is_provider());
    }

    #[test]
    fn test_classify_double_hash_is_traditional() {
        let reference = classify("{{a#b#c}}");
        assert!(!reference.is_provider());
        assert_eq!(
            reference,
            Reference::Traditional {
                name: "a#b#c".to_string(),
                raw: "{{a#b#c}}".to_string(),
            }
        );
    }

    #[test]
    fn test_classify_no_colon_is_traditional() {
        let reference = classify("{{novaultcolon}}");
        assert!(!reference.is_provider());
    }

    #[test]
    fn test_classify_hash_before_colon_is_traditional() {
        assert!(!classify("{{a#b:c}}").is_provider());
    }

    #[test]
    fn test_classify_empty_parts_are_traditional() {
        assert!(!classify("{{:path}}").is_provider());
        assert!(!classify("{{ns:}}").is_provider());
        assert!(!classify("{{vault:#field}}").is_provider());
        assert!(!classify("{{vault:path#}}").is_provider());
    }

    #[test]
    fn test_traditional_name_is_trimmed() {
        let reference = classify("{{ USER }}");
        assert_eq!(
            reference,
            Reference::Traditional {
                name: "USER".to_string(),
                raw: "{{ USER }}".to_string(),
            }
        );
    }

    #[test]
    fn test_identifier_extraction() {
        let reference = classify("{{vault:secret/app#key}}");
        assert_eq!(reference.identifier(), Some("secret/app#key"));

        let reference = classify("{{oauth:svc}}");
        assert_eq!(reference.identifier(), Some("svc"));

        let reference = classify("{{USER}}");
        assert_eq!(reference.identifier(), None);
    }

    #[test]
    fn test_raw_round_trip() {
        let input = "X-Key: {{vault:secret/app#key}}";
        let refs = extract_references(input);
        assert_eq!(refs.len(), 1);
        assert!(input.contains(refs[0].raw()));
    }

    #[test]
    fn test_has_references() {
        assert!(has_references("{{a}}"));
        assert!(!has_references("plain text"));
        assert!(!has_references("{{unclosed"));
    }
}

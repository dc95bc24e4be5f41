//! GDPR redaction of sensitive configuration values.
//!
//! A field is sensitive when its name contains one of the policy's markers
//! (case-insensitive). Sensitive values are replaced by [`REDACTED_PLACEHOLDER`];
//! nested JSON objects are walked and their sensitive keys replaced too.
//! Redaction is deterministic and idempotent, so running it again over already
//! redacted data is a no-op and audit hashes stay reproducible.

use crate::types::{ConfigDiff, ConfigValue};
use serde_json::Value;

pub const REDACTED_PLACEHOLDER: &str = "***REDACTED***";

const DEFAULT_SENSITIVE_MARKERS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "private_key",
    "access_key",
    "credential",
    "client_secret",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionPolicy {
    markers: Vec<String>,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            markers: DEFAULT_SENSITIVE_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }
}

impl RedactionPolicy {
    /// Default markers plus caller-supplied ones.
    pub fn with_extra_fields<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = Self::default();
        for field in extra {
            let marker = field.as_ref().trim().to_ascii_lowercase();
            if !marker.is_empty() && !policy.markers.contains(&marker) {
                policy.markers.push(marker);
            }
        }
        policy
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        let lowered = name.to_ascii_lowercase();
        self.markers.iter().any(|marker| lowered.contains(marker))
    }

    pub fn redact_values(&self, values: &[ConfigValue]) -> Vec<ConfigValue> {
        values
            .iter()
            .map(|entry| ConfigValue {
                name: entry.name.clone(),
                value: self.redact_field(&entry.name, &entry.value),
                origin: entry.origin.clone(),
            })
            .collect()
    }

    pub fn redact_changes(&self, changes: &[ConfigDiff]) -> Vec<ConfigDiff> {
        changes
            .iter()
            .map(|change| match change {
                ConfigDiff::Added { name, new_value } => ConfigDiff::Added {
                    name: name.clone(),
                    new_value: self.redact_field(name, new_value),
                },
                ConfigDiff::Modified {
                    name,
                    old_value,
                    new_value,
                } => ConfigDiff::Modified {
                    name: name.clone(),
                    old_value: self.redact_field(name, old_value),
                    new_value: self.redact_field(name, new_value),
                },
                ConfigDiff::Removed { name, old_value } => ConfigDiff::Removed {
                    name: name.clone(),
                    old_value: self.redact_field(name, old_value),
                },
            })
            .collect()
    }

    fn redact_field(&self, name: &str, value: &Value) -> Value {
        if self.is_sensitive(name) {
            return Value::String(REDACTED_PLACEHOLDER.to_string());
        }
        self.redact_nested(value)
    }

    fn redact_nested(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, inner)| (key.clone(), self.redact_field(key, inner)))
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.redact_nested(item)).collect())
            }
            other => other.clone(),
        }
    }
}

pub fn is_redacted(value: &Value) -> bool {
    value.as_str() == Some(REDACTED_PLACEHOLDER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensitive_names() {
        let policy = RedactionPolicy::default();
        assert!(policy.is_sensitive("api_key"));
        assert!(policy.is_sensitive("PAYMENT_API_KEY"));
        assert!(policy.is_sensitive("smtp.password"));
        assert!(!policy.is_sensitive("currency"));
    }

    #[test]
    fn test_redact_changes_replaces_both_sides() {
        let policy = RedactionPolicy::default();
        let changes = vec![ConfigDiff::Modified {
            name: "api_key".to_string(),
            old_value: json!("old-secret"),
            new_value: json!("new-secret"),
        }];

        let redacted = policy.redact_changes(&changes);
        assert_eq!(
            redacted,
            vec![ConfigDiff::Modified {
                name: "api_key".to_string(),
                old_value: json!(REDACTED_PLACEHOLDER),
                new_value: json!(REDACTED_PLACEHOLDER),
            }]
        );
        assert_eq!(policy.redact_changes(&redacted), redacted);
    }

    #[test]
    fn test_redact_nested_objects() {
        let policy = RedactionPolicy::default();
        let values = vec![ConfigValue::new(
            "payment",
            json!({"merchant": "acme", "client_secret": "s3cr3t", "hooks": [{"token": "t"}]}),
        )];

        let redacted = policy.redact_values(&values);
        assert_eq!(
            redacted[0].value,
            json!({
                "merchant": "acme",
                "client_secret": REDACTED_PLACEHOLDER,
                "hooks": [{"token": REDACTED_PLACEHOLDER}]
            })
        );
    }

    #[test]
    fn test_extra_fields() {
        let policy = RedactionPolicy::with_extra_fields(["License_Number", " "]);
        assert!(policy.is_sensitive("driver.license_number"));
        assert!(policy.is_sensitive("password"));
    }
}

//! Credential-shaped key stripping.
//!
//! # Responsibilities
//! - Recursively drop map keys that look like credentials
//! - Report every removed key as a dotted path
//! - Track repeat offenders and raise a security alert past a threshold
//!
//! # Design Decisions
//! - Keys are normalized (ASCII lowercase, non-alphanumerics removed) before
//!   matching, so `X-Api-Key`, `api_key` and `apiKey` all collapse to `xapikey`/`apikey`
//! - Scalars are never inspected; only keys are
//! - Stripping is idempotent: a sanitized value sanitizes to itself

use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::observability::metrics;

/// Normalized key names that are never allowed across the execution boundary.
const CREDENTIAL_KEYS: &[&str] = &[
    "authorization",
    "token",
    "apikey",
    "xapikey",
    "secret",
    "clientsecret",
    "accesstoken",
    "refreshtoken",
    "idtoken",
    "sessiontoken",
    "bearertoken",
    "password",
    "passwd",
    "privatekey",
    "cookie",
    "setcookie",
];

/// Outcome of sanitizing a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub value: Value,
    pub removed_keys: Vec<String>,
}

impl Sanitized {
    pub fn is_clean(&self) -> bool {
        self.removed_keys.is_empty()
    }
}

/// Lowercase and drop every non-alphanumeric character.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Whether `key` names credential material.
pub fn is_credential_key(key: &str) -> bool {
    let normalized = normalize_key(key);
    CREDENTIAL_KEYS.contains(&normalized.as_str())
}

/// Strip credential-shaped keys from `value` at every depth.
pub fn sanitize(value: &Value) -> Sanitized {
    let mut removed_keys = Vec::new();
    let value = walk(value, "", &mut removed_keys);
    Sanitized {
        value,
        removed_keys,
    }
}

/// Convenience for map-shaped parameter sets.
pub fn sanitize_map(map: &Map<String, Value>) -> (Map<String, Value>, Vec<String>) {
    let mut removed = Vec::new();
    let clean = walk_map(map, "", &mut removed);
    (clean, removed)
}

fn walk(value: &Value, path: &str, removed: &mut Vec<String>) -> Value {
    match value {
        Value::Object(map) => Value::Object(walk_map(map, path, removed)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| walk(item, &format!("{path}[{i}]"), removed))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn walk_map(map: &Map<String, Value>, path: &str, removed: &mut Vec<String>) -> Map<String, Value> {
    let mut out = Map::with_capacity(map.len());
    for (key, child) in map {
        let child_path = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };
        if is_credential_key(key) {
            removed.push(child_path);
            continue;
        }
        out.insert(key.clone(), walk(child, &child_path, removed));
    }
    out
}

/// Per-user strip counter that turns repeated attempts into an alert signal.
#[derive(Debug)]
pub struct SanitizationMonitor {
    counts: DashMap<String, u32>,
    alert_threshold: u32,
}

impl SanitizationMonitor {
    pub fn new(alert_threshold: u32) -> Self {
        Self {
            counts: DashMap::new(),
            alert_threshold,
        }
    }

    /// Record a sanitization outcome for `user_id`.
    ///
    /// Returns true when this event pushed the user over the alert threshold.
    pub fn record(&self, user_id: &str, removed_keys: &[String]) -> bool {
        if removed_keys.is_empty() {
            return false;
        }
        metrics::record_sanitized_keys(removed_keys.len());

        let count = {
            let mut entry = self.counts.entry(user_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        tracing::debug!(user_id = %user_id, removed = ?removed_keys, count, "Stripped credential-shaped keys");

        if count > self.alert_threshold {
            tracing::warn!(
                target: "flowgate::security_alert",
                user_id = %user_id,
                attempts = count,
                threshold = self.alert_threshold,
                removed = ?removed_keys,
                "Repeated credential-shaped parameters; possible probing"
            );
            metrics::record_security_alert("sanitization");
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn attempts(&self, user_id: &str) -> u32 {
        self.counts.get(user_id).map(|c| *c).unwrap_or(0)
    }

    /// Users currently above the alert threshold.
    pub fn flagged_users(&self) -> usize {
        self.counts
            .iter()
            .filter(|r| *r.value() > self.alert_threshold)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalization_catches_variants() {
        for key in ["Authorization", "api_key", "apiKey", "X-API-Key", "refresh-token", "Access_Token", "PASSWORD"] {
            assert!(is_credential_key(key), "{key} should be stripped");
        }
        for key in ["author", "tokens", "url", "secretary", "name"] {
            assert!(!is_credential_key(key), "{key} should be kept");
        }
    }

    #[test]
    fn test_strips_nested_and_array_embedded_keys() {
        let input = json!({
            "url": "https://api.example.com",
            "headers": { "Authorization": "Bearer abc", "Accept": "json" },
            "items": [ { "token": "t", "id": 1 }, { "id": 2, "nested": { "password": "p" } } ],
            "apiKey": "k"
        });

        let out = sanitize(&input);
        assert_eq!(
            out.value,
            json!({
                "url": "https://api.example.com",
                "headers": { "Accept": "json" },
                "items": [ { "id": 1 }, { "id": 2, "nested": {} } ]
            })
        );
        let mut removed = out.removed_keys.clone();
        removed.sort();
        assert_eq!(
            removed,
            vec!["apiKey", "headers.Authorization", "items[0].token", "items[1].nested.password"]
        );
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let input = json!({ "a": { "secret": 1, "b": [ { "cookie": "c" } ] } });
        let once = sanitize(&input);
        let twice = sanitize(&once.value);
        assert!(twice.is_clean());
        assert_eq!(once.value, twice.value);
    }

    #[test]
    fn test_scalars_pass_through() {
        for value in [json!(null), json!(3.5), json!("token"), json!(true), json!(["password"])] {
            let out = sanitize(&value);
            assert_eq!(out.value, value);
            assert!(out.is_clean());
        }
    }

    #[test]
    fn test_monitor_alerts_past_threshold() {
        let monitor = SanitizationMonitor::new(2);
        let removed = vec!["token".to_string()];

        assert!(!monitor.record("u1", &removed));
        assert!(!monitor.record("u1", &removed));
        assert!(monitor.record("u1", &removed));
        assert!(!monitor.record("u1", &[]));
        assert_eq!(monitor.attempts("u1"), 3);
        assert_eq!(monitor.attempts("u2"), 0);
        assert_eq!(monitor.flagged_users(), 1);
    }
}

//! # Field Correlation
//!
//! Some recorded responses echo an identifier that the client chose, such as a
//! task id or a request token. Replaying the recorded bytes verbatim would hand
//! the live client someone else's identifier, so the correlator pulls a value
//! out of the live request and writes it into the recorded response before it
//! is sent.
//!
//! Correlation is opt-in per method. A method without a [`CorrelationRule`] is
//! always replayed byte for byte.
//!
//! ## Field paths
//!
//! Paths are dot-separated segments, for example `action.task.taskId`. A segment
//! made only of digits indexes into an array when the value at that point is an
//! array; otherwise every segment names an object key.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::CorrelationError;

/// A parsed, non-empty field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Value at this path, if every segment resolves.
    pub fn lookup<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| step(current, segment))
    }
}

fn step<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn step_mut<'v>(value: &'v mut Value, segment: &str) -> Result<&'v mut Value, String> {
    match value {
        Value::Object(map) => map
            .get_mut(segment)
            .ok_or_else(|| format!("field '{}' is absent", segment)),
        Value::Array(items) => {
            let index = segment
                .parse::<usize>()
                .map_err(|_| format!("expected an index into array, found '{}'", segment))?;
            let len = items.len();
            items
                .get_mut(index)
                .ok_or_else(|| format!("index {} out of bounds (len {})", index, len))
        }
        other => Err(format!(
            "expected a message or list at '{}', found {}",
            segment,
            kind(other)
        )),
    }
}

fn first_string(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Array(items) => items.iter().find_map(first_string),
        Value::Object(map) => map.values().find_map(first_string),
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "message",
    }
}

impl FromStr for FieldPath {
    type Err = CorrelationError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CorrelationError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        if path.trim().is_empty() {
            return Err(invalid("path is empty"));
        }
        let segments: Vec<String> = path.split('.').map(|s| s.trim().to_string()).collect();
        if segments.iter().any(String::is_empty) {
            return Err(invalid("path contains an empty segment"));
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl Serialize for FieldPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// How to obtain the correlation value from a decoded client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractRule {
    /// Scalar found at a field path.
    Path(FieldPath),
    /// First string value in the message, depth first with object keys in
    /// sorted order. In a protobuf text rendering only string values are
    /// quoted, so this is the first quoted token of that rendering. Kept for
    /// dumps whose requests carry exactly one string field.
    FirstQuotedToken,
}

impl fmt::Display for ExtractRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractRule::Path(path) => write!(f, "path:{}", path),
            ExtractRule::FirstQuotedToken => write!(f, "first_quoted_token"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationRule {
    pub extract: ExtractRule,
    pub inject_into: FieldPath,
}

impl CorrelationRule {
    pub fn new(extract: ExtractRule, inject_into: FieldPath) -> Self {
        Self {
            extract,
            inject_into,
        }
    }

    /// Rule copying the scalar at `from` in the request to `into` in responses.
    pub fn path_to_path(from: &str, into: &str) -> Result<Self, CorrelationError> {
        Ok(Self::new(ExtractRule::Path(from.parse()?), into.parse()?))
    }
}

/// Method name to correlation rule.
#[derive(Debug, Clone, Default)]
pub struct FieldCorrelator {
    rules: HashMap<String, CorrelationRule>,
}

impl FieldCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, method: impl Into<String>, rule: CorrelationRule) -> Self {
        self.insert(method, rule);
        self
    }

    pub fn insert(&mut self, method: impl Into<String>, rule: CorrelationRule) {
        self.rules.insert(method.into(), rule);
    }

    pub fn rule_for(&self, method: &str) -> Option<&CorrelationRule> {
        self.rules.get(method)
    }

    pub fn has_rule(&self, method: &str) -> bool {
        self.rules.contains_key(method)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Pull the correlation value out of a decoded client message.
    pub fn extract(&self, method: &str, decoded: &Value) -> Result<Value, CorrelationError> {
        let rule = self.require_rule(method, |reason| CorrelationError::Extraction {
            method: method.to_string(),
            reason,
        })?;
        let fail = |reason: String| CorrelationError::Extraction {
            method: method.to_string(),
            reason,
        };

        let value = match &rule.extract {
            ExtractRule::Path(path) => {
                let found = path
                    .lookup(decoded)
                    .ok_or_else(|| fail(format!("no value at '{}'", path)))?;
                match found {
                    Value::String(_) | Value::Number(_) | Value::Bool(_) => found.clone(),
                    other => {
                        return Err(fail(format!(
                            "value at '{}' is a {}, expected a scalar",
                            path,
                            kind(other)
                        )))
                    }
                }
            }
            ExtractRule::FirstQuotedToken => {
                let token = first_string(decoded)
                    .ok_or_else(|| fail("message contains no quoted token".to_string()))?;
                Value::String(token.to_string())
            }
        };

        debug!("Extracted correlation value {} for {}", value, method);
        Ok(value)
    }

    /// Copy of `template` with the configured field overwritten by `value`.
    ///
    /// The target field must already exist in the template; no field is
    /// created and nothing else is touched.
    pub fn inject(
        &self,
        method: &str,
        template: &Value,
        value: &Value,
    ) -> Result<Value, CorrelationError> {
        let rule = self.require_rule(method, |reason| CorrelationError::Injection {
            method: method.to_string(),
            path: String::new(),
            reason,
        })?;
        let path = &rule.inject_into;

        let mut rewritten = template.clone();
        let mut target = &mut rewritten;
        for segment in path.segments() {
            target = step_mut(target, segment).map_err(|reason| CorrelationError::Injection {
                method: method.to_string(),
                path: path.to_string(),
                reason,
            })?;
        }
        *target = value.clone();

        debug!("Injected correlation value into {} of {}", path, method);
        Ok(rewritten)
    }

    fn require_rule(
        &self,
        method: &str,
        err: impl FnOnce(String) -> CorrelationError,
    ) -> Result<&CorrelationRule, CorrelationError> {
        self.rules
            .get(method)
            .ok_or_else(|| err("no correlation rule configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const METHOD: &str = "/s12.tasks.v1.ActionsService/GetAction";

    fn correlator() -> FieldCorrelator {
        FieldCorrelator::new().with_rule(
            METHOD,
            CorrelationRule::path_to_path("actionId", "action.task.taskId").unwrap(),
        )
    }

    #[test]
    fn test_field_path_parsing() {
        let path: FieldPath = "action.task.taskId".parse().unwrap();
        assert_eq!(path.segments(), &["action", "task", "taskId"]);
        assert_eq!(path.to_string(), "action.task.taskId");

        assert!("".parse::<FieldPath>().is_err());
        assert!("a..b".parse::<FieldPath>().is_err());
        assert!("a.".parse::<FieldPath>().is_err());
    }

    #[test]
    fn test_lookup_through_arrays() {
        let path: FieldPath = "items.1.name".parse().unwrap();
        let value = json!({"items": [{"name": "a"}, {"name": "b"}]});
        assert_eq!(path.lookup(&value), Some(&json!("b")));
        let missing: FieldPath = "items.5.name".parse().unwrap();
        assert_eq!(missing.lookup(&value), None);
    }

    #[test]
    fn test_extract_and_inject_round() {
        let correlator = correlator();
        let request = json!({"actionId": "abc123"});
        let value = correlator.extract(METHOD, &request).unwrap();
        assert_eq!(value, json!("abc123"));

        let template = json!({
            "action": {"task": {"taskId": "recorded-id", "name": "build"}, "state": "DONE"},
            "etag": "x"
        });
        let rewritten = correlator.inject(METHOD, &template, &value).unwrap();
        assert_eq!(
            rewritten,
            json!({
                "action": {"task": {"taskId": "abc123", "name": "build"}, "state": "DONE"},
                "etag": "x"
            })
        );
        // template untouched
        assert_eq!(template["action"]["task"]["taskId"], json!("recorded-id"));
    }

    #[test]
    fn test_extract_rejects_missing_and_non_scalar() {
        let correlator = correlator();
        let err = correlator.extract(METHOD, &json!({"other": 1})).unwrap_err();
        assert!(matches!(err, CorrelationError::Extraction { .. }));

        let err = correlator
            .extract(METHOD, &json!({"actionId": {"nested": true}}))
            .unwrap_err();
        assert!(err.to_string().contains("expected a scalar"));
    }

    #[test]
    fn test_inject_wrong_shape_is_recoverable_error() {
        let correlator = correlator();
        let template = json!({"action": "not-a-message"});
        let err = correlator
            .inject(METHOD, &template, &json!("abc123"))
            .unwrap_err();
        match err {
            CorrelationError::Injection { path, reason, .. } => {
                assert_eq!(path, "action.task.taskId");
                assert!(reason.contains("found string"), "reason: {}", reason);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_inject_does_not_create_missing_fields() {
        let correlator = correlator();
        let template = json!({"action": {"task": {}}});
        let err = correlator
            .inject(METHOD, &template, &json!("abc123"))
            .unwrap_err();
        assert!(err.to_string().contains("'taskId' is absent"));
    }

    #[test]
    fn test_first_quoted_token_heuristic() {
        let correlator = FieldCorrelator::new().with_rule(
            METHOD,
            CorrelationRule::new(
                ExtractRule::FirstQuotedToken,
                "action.task.taskId".parse().unwrap(),
            ),
        );
        let value = correlator
            .extract(METHOD, &json!({"action_id": "abc123"}))
            .unwrap();
        assert_eq!(value, json!("abc123"));

        // numbers are not quoted; nested strings are found
        let value = correlator
            .extract(METHOD, &json!({"count": 3, "inner": {"id": "deep"}}))
            .unwrap();
        assert_eq!(value, json!("deep"));

        let err = correlator
            .extract(METHOD, &json!({"count": 42, "ok": true}))
            .unwrap_err();
        assert!(err.to_string().contains("no quoted token"));
    }

    #[test]
    fn test_methods_without_rule() {
        let correlator = correlator();
        assert!(correlator.has_rule(METHOD));
        assert!(!correlator.has_rule("/other/Method"));
        assert!(correlator.extract("/other/Method", &json!({})).is_err());
        assert_eq!(correlator.len(), 1);
    }
}

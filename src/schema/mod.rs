//! Runtime validation of JSON payloads against JSON-Schema-like descriptions.
//!
//! A schema description is compiled once by [`to_validator`] and then applied
//! with [`Validator::parse`], which coerces string-encoded scalars, strips
//! undeclared object keys and reports every violated constraint with its
//! field path.
//!
//! # Example
//!
//! ```
//! use intelligence_pipeline::schema::{to_validator, ValidationResult};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "type": "object",
//!     "properties": {
//!         "name": {"type": "string", "minLength": 3},
//!         "price": {"type": "number"}
//!     },
//!     "required": ["price"]
//! });
//!
//! let validator = to_validator(Some(&schema));
//! match validator.parse(&json!({"name": "ab"})) {
//!     ValidationResult::Invalid(issues) => assert_eq!(issues.len(), 2),
//!     ValidationResult::Valid(_) => unreachable!(),
//! }
//! ```

mod compile;
mod format;
mod validate;

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use compile::SchemaNode;
pub use format::Format;

/// One violated constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Field path from the payload root. Array indices are stringified.
    pub path: Vec<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path.join("."), self.message)
        }
    }
}

/// Join issues into a single `; `-separated line.
pub fn describe_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Outcome of [`Validator::parse`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    /// Coerced and stripped payload.
    Valid(Value),
    /// Every issue found, in document order. Never empty.
    Invalid(Vec<ValidationIssue>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }

    pub fn into_result(self) -> Result<Value, Vec<ValidationIssue>> {
        match self {
            ValidationResult::Valid(v) => Ok(v),
            ValidationResult::Invalid(issues) => Err(issues),
        }
    }
}

const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(5);

/// A compiled schema.
#[derive(Debug, Clone)]
pub struct Validator {
    root: Option<SchemaNode>,
    slow_threshold: Duration,
}

impl Default for Validator {
    fn default() -> Self {
        Self::accept_all()
    }
}

impl Validator {
    /// A validator that passes every payload through unchanged.
    pub fn accept_all() -> Self {
        Self {
            root: None,
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
        }
    }

    /// Whether this validator accepts anything.
    pub fn is_open(&self) -> bool {
        self.root.is_none()
    }

    /// Log a warning when one `parse` call takes longer than `threshold`.
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    pub fn parse(&self, payload: &Value) -> ValidationResult {
        let Some(ref root) = self.root else {
            return ValidationResult::Valid(payload.clone());
        };

        let started = Instant::now();
        let mut walker = validate::Walker::new();
        let data = walker.check(root, payload);
        let elapsed = started.elapsed();

        if elapsed > self.slow_threshold {
            tracing::warn!(
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                threshold_ms = self.slow_threshold.as_millis() as u64,
                issues = walker.issues.len(),
                "slow schema validation"
            );
        }

        if walker.issues.is_empty() {
            ValidationResult::Valid(data)
        } else {
            ValidationResult::Invalid(walker.issues)
        }
    }
}

/// Compile a schema description. `None`, a non-object or `{}` yields an
/// open validator.
pub fn to_validator(schema: Option<&Value>) -> Validator {
    match schema {
        Some(s) if !compile::is_empty_schema(s) => Validator {
            root: Some(compile::compile(s)),
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
        },
        _ => Validator::accept_all(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issues(schema: Value, payload: Value) -> Vec<ValidationIssue> {
        match to_validator(Some(&schema)).parse(&payload) {
            ValidationResult::Invalid(issues) => issues,
            ValidationResult::Valid(v) => panic!("expected issues, got {v}"),
        }
    }

    fn valid(schema: Value, payload: Value) -> Value {
        match to_validator(Some(&schema)).parse(&payload) {
            ValidationResult::Valid(v) => v,
            ValidationResult::Invalid(issues) => panic!("unexpected issues: {issues:?}"),
        }
    }

    fn paths(issues: &[ValidationIssue]) -> Vec<Vec<&str>> {
        issues
            .iter()
            .map(|i| i.path.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_reports_every_issue() {
        let schema = json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "minLength": 3},
                "price": {"type": "number"}
            },
            "required": ["price"]
        });
        let found = issues(schema, json!({"name": "ab"}));
        assert_eq!(paths(&found), vec![vec!["name"], vec!["price"]]);
        assert_eq!(found[0].message, "String must contain at least 3 character(s)");
        assert!(found[1].message.contains("Required"));
    }

    #[test]
    fn test_nested_paths() {
        let schema = json!({
            "type": "object",
            "properties": {
                "attributes": {
                    "type": "object",
                    "properties": {
                        "pricing": {
                            "type": "object",
                            "properties": {"amount": {"type": "number", "minimum": 0}},
                            "required": ["amount"]
                        }
                    }
                },
                "tags": {"type": "array", "items": {"type": "string", "maxLength": 4}}
            }
        });
        let found = issues(
            schema,
            json!({"attributes": {"pricing": {"amount": -1}}, "tags": ["ok", "too long"]}),
        );
        assert_eq!(
            paths(&found),
            vec![vec!["attributes", "pricing", "amount"], vec!["tags", "1"]]
        );
        assert_eq!(found[0].message, "Number must be greater than or equal to 0");
    }

    #[test]
    fn test_strips_unknown_keys_idempotently() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}, "b": {"type": "string"}}
        });
        let once = valid(schema.clone(), json!({"a": 1, "b": "x", "extra": true}));
        assert_eq!(once, json!({"a": 1, "b": "x"}));
        let twice = valid(schema, once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_validation_is_deterministic() {
        let schema = json!({
            "type": "object",
            "properties": {"x": {"type": "integer"}, "y": {"enum": ["a", "b"]}},
            "required": ["x", "y", "z"]
        });
        let validator = to_validator(Some(&schema));
        let payload = json!({"x": 1.5, "y": "c"});
        assert_eq!(validator.parse(&payload), validator.parse(&payload));
    }

    #[test]
    fn test_coerces_string_scalars() {
        let schema = json!({
            "type": "object",
            "properties": {
                "count": {"type": "integer"},
                "ratio": {"type": "number"},
                "active": {"type": "boolean"}
            }
        });
        let out = valid(
            schema.clone(),
            json!({"count": "42", "ratio": "0.5", "active": "true"}),
        );
        assert_eq!(out, json!({"count": 42, "ratio": 0.5, "active": true}));

        let found = issues(schema, json!({"count": "forty-two"}));
        assert_eq!(found[0].message, "Expected integer, received string");
    }

    #[test]
    fn test_integer_rejects_fraction() {
        let found = issues(json!({"type": "integer"}), json!(2.5));
        assert_eq!(found[0].message, "Expected integer, received float");
        assert!(found[0].path.is_empty());
    }

    #[test]
    fn test_exclusive_bounds() {
        let schema = json!({"type": "number", "exclusiveMinimum": 0, "exclusiveMaximum": 10});
        assert_eq!(issues(schema.clone(), json!(0))[0].message, "Number must be greater than 0");
        assert_eq!(issues(schema.clone(), json!(10))[0].message, "Number must be less than 10");
        valid(schema, json!(5));
    }

    #[test]
    fn test_formats() {
        let schema = json!({
            "type": "object",
            "properties": {
                "email": {"type": "string", "format": "email"},
                "site": {"type": "string", "format": "url"},
                "id": {"type": "string", "format": "uuid"}
            }
        });
        valid(
            schema.clone(),
            json!({
                "email": "a@example.com",
                "site": "https://example.com",
                "id": "123e4567-e89b-12d3-a456-426614174000"
            }),
        );
        let found = issues(schema, json!({"email": "nope", "site": "nope", "id": "nope"}));
        let messages: Vec<&str> = found.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(messages, vec!["Invalid email", "Invalid uuid", "Invalid url"]);
    }

    #[test]
    fn test_const_and_enum() {
        let found = issues(json!({"const": "v1"}), json!("v2"));
        assert_eq!(found[0].message, "Invalid literal value, expected \"v1\"");

        let found = issues(json!({"type": "string", "enum": ["a", "b"]}), json!("c"));
        assert_eq!(
            found[0].message,
            "Invalid enum value. Expected \"a\" | \"b\", received \"c\""
        );
    }

    #[test]
    fn test_type_mismatch_skips_enum_check() {
        let found = issues(json!({"type": "string", "enum": ["a"]}), json!(5));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "Expected string, received number");

        let found = issues(json!({"type": "integer", "const": 2}), json!("x"));
        assert_eq!(found.len(), 1);
        assert!(!found[0].message.contains("literal"));
    }

    #[test]
    fn test_slow_threshold_does_not_change_result() {
        let schema = json!({
            "type": "object",
            "properties": {"n": {"type": "integer"}},
            "required": ["n"]
        });
        let validator = to_validator(Some(&schema)).with_slow_threshold(Duration::ZERO);

        assert_eq!(
            validator.parse(&json!({"n": "7", "x": 1})),
            ValidationResult::Valid(json!({"n": 7}))
        );
        match validator.parse(&json!({})) {
            ValidationResult::Invalid(found) => assert_eq!(found.len(), 1),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_fill_missing_properties() {
        let schema = json!({
            "type": "object",
            "properties": {"lang": {"type": "string", "default": "en"}},
            "required": ["lang"]
        });
        assert_eq!(valid(schema, json!({})), json!({"lang": "en"}));
    }

    #[test]
    fn test_union_and_nullable() {
        let schema = json!({"type": ["integer", "string"]});
        valid(schema.clone(), json!(3));
        valid(schema.clone(), json!("three"));
        let found = issues(schema, json!(true));
        assert_eq!(found[0].message, "Expected integer | string, received boolean");

        valid(json!({"type": "string", "nullable": true}), json!(null));
    }

    #[test]
    fn test_array_bounds() {
        let schema = json!({"type": "array", "items": {"type": "integer"}, "minItems": 2});
        let found = issues(schema.clone(), json!([1]));
        assert_eq!(found[0].message, "Array must contain at least 2 element(s)");
        assert_eq!(valid(schema, json!(["1", 2])), json!([1, 2]));
    }

    #[test]
    fn test_open_schema_accepts_anything() {
        assert!(to_validator(None).is_open());
        assert!(to_validator(Some(&json!({}))).is_open());
        let payload = json!({"anything": [1, "two", null]});
        assert_eq!(
            to_validator(None).parse(&payload),
            ValidationResult::Valid(payload.clone())
        );
    }

    #[test]
    fn test_invalid_pattern_is_ignored() {
        valid(json!({"type": "string", "pattern": "(oops"}), json!("whatever"));
        let found = issues(json!({"type": "string", "pattern": "^[a-z]+$"}), json!("ABC"));
        assert_eq!(found[0].message, "String does not match pattern ^[a-z]+$");
    }

    #[test]
    fn test_issue_display() {
        let issue = ValidationIssue::new(vec!["a".into(), "0".into()], "Required");
        assert_eq!(issue.to_string(), "a.0: Required");
        assert_eq!(
            describe_issues(&[issue, ValidationIssue::new(vec![], "bad")]),
            "a.0: Required; bad"
        );
    }
}

//! Walks a payload against a compiled [`SchemaNode`], coercing and stripping
//! as it goes and collecting every violated constraint.

use serde_json::{Map, Number, Value};

use super::compile::{Kind, SchemaNode};
use super::ValidationIssue;

/// Validation state for one `parse` call.
pub(crate) struct Walker {
    path: Vec<String>,
    pub issues: Vec<ValidationIssue>,
}

impl Walker {
    pub fn new() -> Self {
        Self {
            path: Vec::new(),
            issues: Vec::new(),
        }
    }

    fn issue(&mut self, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            path: self.path.clone(),
            message: message.into(),
        });
    }

    fn nested<R>(&mut self, segment: String, f: impl FnOnce(&mut Self) -> R) -> R {
        self.path.push(segment);
        let out = f(self);
        self.path.pop();
        out
    }

    /// Validate `value` against `node`, returning the coerced/stripped value.
    /// The returned value is meaningful only if no issues were recorded.
    pub fn check(&mut self, node: &SchemaNode, value: &Value) -> Value {
        let before = self.issues.len();
        let out = match node.kinds.as_slice() {
            [] => self.check_untyped(node, value),
            [kind] => self.check_kind(*kind, node, value),
            kinds => self.check_union(kinds, node, value),
        };
        // const/enum only report on values that already have the right shape.
        let failed_here = self.issues[before..].iter().any(|i| i.path == self.path);
        if !failed_here {
            self.check_literals(node, &out);
        }
        out
    }

    /// No declared type: object keywords still apply to objects.
    fn check_untyped(&mut self, node: &SchemaNode, value: &Value) -> Value {
        match value {
            Value::Object(_) if node.properties.is_some() => {
                self.check_kind(Kind::Object, node, value)
            }
            Value::Array(_) if node.items.is_some() => self.check_kind(Kind::Array, node, value),
            other => other.clone(),
        }
    }

    fn check_union(&mut self, kinds: &[Kind], node: &SchemaNode, value: &Value) -> Value {
        if let Some(kind) = kinds.iter().find(|k| k.matches(value)) {
            return self.check_kind(*kind, node, value);
        }

        // Nothing matches natively; take the first kind that coerces cleanly.
        for kind in kinds {
            let mut scratch = Walker {
                path: self.path.clone(),
                issues: Vec::new(),
            };
            let out = scratch.check_kind(*kind, node, value);
            if scratch.issues.is_empty() {
                return out;
            }
        }

        let expected: Vec<&str> = kinds.iter().map(Kind::name).collect();
        self.issue(format!(
            "Expected {}, received {}",
            expected.join(" | "),
            received(value)
        ));
        value.clone()
    }

    fn check_kind(&mut self, kind: Kind, node: &SchemaNode, value: &Value) -> Value {
        match kind {
            Kind::String => self.check_string(node, value),
            Kind::Number => self.check_number(node, value, false),
            Kind::Integer => self.check_number(node, value, true),
            Kind::Boolean => self.check_boolean(value),
            Kind::Null => {
                if !value.is_null() {
                    self.type_mismatch("null", value);
                }
                value.clone()
            }
            Kind::Array => self.check_array(node, value),
            Kind::Object => self.check_object(node, value),
        }
    }

    fn type_mismatch(&mut self, expected: &str, value: &Value) {
        self.issue(format!("Expected {}, received {}", expected, received(value)));
    }

    fn check_string(&mut self, node: &SchemaNode, value: &Value) -> Value {
        let Some(s) = value.as_str() else {
            self.type_mismatch("string", value);
            return value.clone();
        };
        let rules = &node.string;
        let len = s.chars().count();

        if let Some(min) = rules.min_length {
            if len < min {
                self.issue(format!("String must contain at least {} character(s)", min));
            }
        }
        if let Some(max) = rules.max_length {
            if len > max {
                self.issue(format!("String must contain at most {} character(s)", max));
            }
        }
        if let Some(ref re) = rules.pattern {
            if !re.is_match(s) {
                self.issue(format!("String does not match pattern {}", re.as_str()));
            }
        }
        if let Some(format) = rules.format {
            if !format.check(s) {
                self.issue(format!("Invalid {}", format.name()));
            }
        }
        value.clone()
    }

    fn check_number(&mut self, node: &SchemaNode, value: &Value, integer: bool) -> Value {
        let expected = if integer { "integer" } else { "number" };
        let n = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        };
        let Some(n) = n else {
            self.type_mismatch(expected, value);
            return value.clone();
        };

        if integer && n.fract() != 0.0 {
            self.issue("Expected integer, received float");
            return value.clone();
        }

        let rules = &node.number;
        if let Some(min) = rules.minimum {
            if n < min {
                self.issue(format!("Number must be greater than or equal to {}", min));
            }
        }
        if let Some(min) = rules.exclusive_minimum {
            if n <= min {
                self.issue(format!("Number must be greater than {}", min));
            }
        }
        if let Some(max) = rules.maximum {
            if n > max {
                self.issue(format!("Number must be less than or equal to {}", max));
            }
        }
        if let Some(max) = rules.exclusive_maximum {
            if n >= max {
                self.issue(format!("Number must be less than {}", max));
            }
        }

        match value {
            Value::Number(_) => value.clone(),
            _ if integer && n.abs() < i64::MAX as f64 => Value::from(n as i64),
            _ => Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
        }
    }

    fn check_boolean(&mut self, value: &Value) -> Value {
        match value {
            Value::Bool(_) => value.clone(),
            Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Value::Bool(true),
            Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Value::Bool(false),
            _ => {
                self.type_mismatch("boolean", value);
                value.clone()
            }
        }
    }

    fn check_array(&mut self, node: &SchemaNode, value: &Value) -> Value {
        let Some(items) = value.as_array() else {
            self.type_mismatch("array", value);
            return value.clone();
        };

        if let Some(min) = node.min_items {
            if items.len() < min {
                self.issue(format!("Array must contain at least {} element(s)", min));
            }
        }
        if let Some(max) = node.max_items {
            if items.len() > max {
                self.issue(format!("Array must contain at most {} element(s)", max));
            }
        }

        let Some(ref item_schema) = node.items else {
            return value.clone();
        };
        let out = items
            .iter()
            .enumerate()
            .map(|(i, item)| self.nested(i.to_string(), |w| w.check(item_schema, item)))
            .collect();
        Value::Array(out)
    }

    fn check_object(&mut self, node: &SchemaNode, value: &Value) -> Value {
        let Some(obj) = value.as_object() else {
            self.type_mismatch("object", value);
            return value.clone();
        };
        let Some(ref properties) = node.properties else {
            self.check_required(node, obj);
            return value.clone();
        };

        let mut out = Map::new();
        for (key, sub) in properties {
            match obj.get(key) {
                Some(v) => {
                    let checked = self.nested(key.clone(), |w| w.check(sub, v));
                    out.insert(key.clone(), checked);
                }
                None => {
                    if let Some(ref default) = sub.default {
                        out.insert(key.clone(), default.clone());
                    } else if node.required.contains(key) {
                        self.nested(key.clone(), |w| w.issue("Required"));
                    }
                }
            }
        }

        // Required keys without a property schema pass through untouched.
        for key in &node.required {
            if properties.iter().any(|(k, _)| k == key) {
                continue;
            }
            match obj.get(key) {
                Some(v) => {
                    out.insert(key.clone(), v.clone());
                }
                None => self.nested(key.clone(), |w| w.issue("Required")),
            }
        }

        Value::Object(out)
    }

    fn check_required(&mut self, node: &SchemaNode, obj: &Map<String, Value>) {
        for key in &node.required {
            if !obj.contains_key(key) {
                self.nested(key.clone(), |w| w.issue("Required"));
            }
        }
    }

    fn check_literals(&mut self, node: &SchemaNode, value: &Value) {
        if let Some(ref constant) = node.constant {
            if !same_json(constant, value) {
                self.issue(format!("Invalid literal value, expected {}", constant));
            }
        }
        if let Some(ref options) = node.enumeration {
            if !options.iter().any(|o| same_json(o, value)) {
                let expected: Vec<String> = options.iter().map(Value::to_string).collect();
                self.issue(format!(
                    "Invalid enum value. Expected {}, received {}",
                    expected.join(" | "),
                    value
                ));
            }
        }
    }
}

/// JSON equality that treats `1` and `1.0` as the same number.
fn same_json(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn received(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

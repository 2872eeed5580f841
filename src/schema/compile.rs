//! Compiles a JSON-Schema-like description into a [`SchemaNode`] tree.
//!
//! Compilation never fails. Keywords that cannot be honoured (unknown types,
//! unknown formats, patterns that are not valid regexes) are dropped with a
//! warning so a sloppy schema widens what is accepted instead of blocking
//! every request.

use regex::Regex;
use serde_json::{Map, Value};

use super::format::Format;

/// Primitive kinds a node may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl Kind {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" => Kind::String,
            "number" => Kind::Number,
            "integer" => Kind::Integer,
            "boolean" => Kind::Boolean,
            "array" => Kind::Array,
            "object" => Kind::Object,
            "null" => Kind::Null,
            _ => return None,
        })
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Number => "number",
            Kind::Integer => "integer",
            Kind::Boolean => "boolean",
            Kind::Array => "array",
            Kind::Object => "object",
            Kind::Null => "null",
        }
    }

    /// Whether `value` already has this kind, without coercion.
    pub(crate) fn matches(&self, value: &Value) -> bool {
        match self {
            Kind::String => value.is_string(),
            Kind::Number => value.is_number(),
            Kind::Integer => value.as_f64().is_some_and(|n| n.fract() == 0.0),
            Kind::Boolean => value.is_boolean(),
            Kind::Array => value.is_array(),
            Kind::Object => value.is_object(),
            Kind::Null => value.is_null(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StringRules {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,
    pub format: Option<Format>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct NumberRules {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
}

/// One compiled schema node. An empty `kinds` list accepts any kind.
#[derive(Debug, Clone, Default)]
pub(crate) struct SchemaNode {
    pub kinds: Vec<Kind>,
    pub constant: Option<Value>,
    pub enumeration: Option<Vec<Value>>,
    pub default: Option<Value>,
    pub string: StringRules,
    pub number: NumberRules,
    pub items: Option<Box<SchemaNode>>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    /// Declared properties. `None` keeps every key.
    pub properties: Option<Vec<(String, SchemaNode)>>,
    pub required: Vec<String>,
}

/// Whether a description is absent in substance (not an object, or `{}`).
pub(crate) fn is_empty_schema(schema: &Value) -> bool {
    schema.as_object().map_or(true, |m| m.is_empty())
}

pub(crate) fn compile(schema: &Value) -> SchemaNode {
    let Some(obj) = schema.as_object() else {
        return SchemaNode::default();
    };

    let mut node = SchemaNode {
        kinds: compile_kinds(obj),
        constant: obj.get("const").cloned(),
        enumeration: obj.get("enum").and_then(Value::as_array).cloned(),
        default: obj.get("default").cloned(),
        ..SchemaNode::default()
    };

    if obj.get("nullable").and_then(Value::as_bool) == Some(true)
        && !node.kinds.is_empty()
        && !node.kinds.contains(&Kind::Null)
    {
        node.kinds.push(Kind::Null);
    }

    node.string = StringRules {
        min_length: usize_keyword(obj, "minLength"),
        max_length: usize_keyword(obj, "maxLength"),
        pattern: obj.get("pattern").and_then(Value::as_str).and_then(compile_pattern),
        format: obj.get("format").and_then(Value::as_str).and_then(|name| {
            let format = Format::from_name(name);
            if format.is_none() {
                tracing::debug!(format = name, "unknown string format not enforced");
            }
            format
        }),
    };

    node.number = compile_number_rules(obj);

    node.items = obj
        .get("items")
        .filter(|items| items.is_object())
        .map(|items| Box::new(compile(items)));
    node.min_items = usize_keyword(obj, "minItems");
    node.max_items = usize_keyword(obj, "maxItems");

    node.properties = obj.get("properties").and_then(Value::as_object).map(|props| {
        props
            .iter()
            .map(|(key, sub)| (key.clone(), compile(sub)))
            .collect()
    });
    node.required = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    node
}

fn compile_kinds(obj: &Map<String, Value>) -> Vec<Kind> {
    let names: Vec<&str> = match obj.get("type") {
        Some(Value::String(name)) => vec![name.as_str()],
        Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };

    let mut kinds: Vec<Kind> = names
        .into_iter()
        .filter_map(|name| {
            let kind = Kind::from_name(name);
            if kind.is_none() {
                tracing::warn!(schema_type = name, "unknown schema type ignored");
            }
            kind
        })
        .collect();

    if kinds.is_empty() {
        if obj.contains_key("properties") || obj.contains_key("required") {
            kinds.push(Kind::Object);
        } else if obj.contains_key("items") {
            kinds.push(Kind::Array);
        }
    }
    kinds
}

fn compile_number_rules(obj: &Map<String, Value>) -> NumberRules {
    let minimum = obj.get("minimum").and_then(Value::as_f64);
    let maximum = obj.get("maximum").and_then(Value::as_f64);
    let mut rules = NumberRules {
        minimum,
        maximum,
        ..NumberRules::default()
    };

    // Draft-4 style booleans turn the inclusive bound exclusive.
    match obj.get("exclusiveMinimum") {
        Some(Value::Bool(true)) => rules.exclusive_minimum = rules.minimum.take(),
        Some(v) => rules.exclusive_minimum = v.as_f64(),
        None => {}
    }
    match obj.get("exclusiveMaximum") {
        Some(Value::Bool(true)) => rules.exclusive_maximum = rules.maximum.take(),
        Some(v) => rules.exclusive_maximum = v.as_f64(),
        None => {}
    }
    rules
}

fn compile_pattern(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "invalid schema pattern ignored");
            None
        }
    }
}

fn usize_keyword(obj: &Map<String, Value>, key: &str) -> Option<usize> {
    obj.get(key).and_then(Value::as_u64).map(|n| n as usize)
}

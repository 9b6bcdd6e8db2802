//! JSON helpers shared by the adapters and the sync engine.
//!
//! Paths use dot notation. A segment suffixed with `[]` fans out over an array
//! and a numeric segment indexes into one.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::models::DataType;

/// Hard recursion cap for walking source documents.
pub const MAX_JSON_DEPTH: usize = 10;

/// Leaf names whose numeric values are gathered across every element of an
/// enclosing array when a GraphQL row is flattened.
pub const VALUE_KEYS: &[&str] = &["price", "value", "amount"];

static ISO_DATE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("valid date regex"));

/// Classify a JSON value by shape.
pub fn infer_data_type(value: &Value) -> DataType {
    match value {
        Value::Bool(_) => DataType::Boolean,
        Value::Number(_) => DataType::Number,
        Value::String(s) if ISO_DATE_PREFIX.is_match(s) => DataType::Date,
        Value::String(_) | Value::Null => DataType::String,
        Value::Array(_) => DataType::Array,
        Value::Object(_) => DataType::Object,
    }
}

pub fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Display name for a path: its last segment without array markers.
pub fn field_name(path: &str) -> String {
    path.rsplit('.')
        .next()
        .unwrap_or(path)
        .trim_end_matches("[]")
        .to_string()
}

/// Depth-first search, in document order, for the first non-empty array.
pub fn find_first_array(value: &Value, depth: usize) -> Option<&Vec<Value>> {
    if depth >= MAX_JSON_DEPTH {
        return None;
    }
    match value {
        Value::Array(items) if !items.is_empty() => Some(items),
        Value::Object(map) => map
            .values()
            .find_map(|child| find_first_array(child, depth + 1)),
        _ => None,
    }
}

/// Flatten an object into dotted keys.
///
/// Arrays of objects are flattened through their first element under a
/// `key[]` prefix; arrays of primitives are kept whole. Leaves named in
/// [`VALUE_KEYS`] below an array are replaced by every numeric leaf at that
/// relative path across all of the array's elements.
pub fn flatten_object(map: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(map, "", 0, &mut out);
    out
}

fn flatten_into(map: &Map<String, Value>, prefix: &str, depth: usize, out: &mut Map<String, Value>) {
    for (key, value) in map {
        let path = join_path(prefix, key);
        match value {
            Value::Object(child) if depth + 1 < MAX_JSON_DEPTH => {
                flatten_into(child, &path, depth + 1, out);
            }
            Value::Array(items) if depth + 1 < MAX_JSON_DEPTH => match items.first() {
                Some(Value::Object(first)) => {
                    let array_prefix = format!("{path}[]");
                    flatten_into(first, &array_prefix, depth + 1, out);
                    gather_value_leaves(items, &array_prefix, out);
                }
                _ => {
                    out.insert(path, value.clone());
                }
            },
            _ => {
                out.insert(path, value.clone());
            }
        }
    }
}

fn gather_value_leaves(items: &[Value], array_prefix: &str, out: &mut Map<String, Value>) {
    let member_prefix = format!("{array_prefix}.");
    let value_paths: Vec<String> = out
        .keys()
        .filter(|key| key.starts_with(&member_prefix))
        .filter(|key| VALUE_KEYS.contains(&field_name(key).as_str()))
        .cloned()
        .collect();

    for path in value_paths {
        let relative = &path[member_prefix.len()..];
        let mut numbers = Vec::new();
        for item in items {
            for leaf in resolve_nested(item, relative) {
                collect_numbers(&leaf, &mut numbers, 0);
            }
        }
        if !numbers.is_empty() {
            out.insert(path, Value::Array(numbers));
        }
    }
}

fn collect_numbers(value: &Value, numbers: &mut Vec<Value>, depth: usize) {
    if depth >= MAX_JSON_DEPTH {
        return;
    }
    match value {
        Value::Number(n) => numbers.push(Value::Number(n.clone())),
        Value::String(s) => {
            if let Some(n) = s.trim().parse::<f64>().ok().and_then(Number::from_f64) {
                numbers.push(Value::Number(n));
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_numbers(item, numbers, depth + 1);
            }
        }
        _ => {}
    }
}

/// Walk `path` from `value`, collecting every non-null leaf reached.
pub fn resolve_nested(value: &Value, path: &str) -> Vec<Value> {
    let segments: Vec<&str> = if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    };
    let mut out = Vec::new();
    walk_segments(value, &segments, &mut out, 0);
    out
}

fn walk_segments(value: &Value, segments: &[&str], out: &mut Vec<Value>, depth: usize) {
    let Some((head, rest)) = segments.split_first() else {
        if !value.is_null() {
            out.push(value.clone());
        }
        return;
    };
    if depth >= MAX_JSON_DEPTH {
        return;
    }

    let (key, fan_out) = match head.strip_suffix("[]") {
        Some(key) => (key, true),
        None => (*head, false),
    };

    let next = if key.is_empty() {
        Some(value)
    } else {
        match value {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    };
    let Some(next) = next else {
        return;
    };

    match next {
        Value::Array(items) if fan_out => {
            for item in items {
                walk_segments(item, rest, out, depth + 1);
            }
        }
        _ => walk_segments(next, rest, out, depth + 1),
    }
}

/// Extract every value a field path addresses within one row.
///
/// Tries an exact flattened-key match, then nested traversal, then both again
/// on the part of the path after its first `[]` segment so that paths rooted
/// at the response document match rows taken from inside an array.
pub fn extract_path(row: &Value, path: &str) -> Vec<Value> {
    let found = lookup(row, path);
    if !found.is_empty() {
        return found;
    }

    match path.split_once("[]") {
        Some((_, remainder)) => lookup(row, remainder.strip_prefix('.').unwrap_or(remainder)),
        None => Vec::new(),
    }
}

fn lookup(row: &Value, path: &str) -> Vec<Value> {
    if let Some(value) = row.as_object().and_then(|map| map.get(path)) {
        return if value.is_null() {
            Vec::new()
        } else {
            vec![value.clone()]
        };
    }
    resolve_nested(row, path)
}

/// One value is stored as itself, several as an array, none not at all.
pub fn collapse(mut values: Vec<Value>) -> Option<Value> {
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(Value::Array(values)),
    }
}

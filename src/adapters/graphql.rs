//! GraphQL adapter
//!
//! Posts the configured query and walks the nested response to find rows and
//! fields.

use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::http::HttpSource;
use super::json::{
    MAX_JSON_DEPTH, VALUE_KEYS, field_name, find_first_array, flatten_object, infer_data_type,
    join_path,
};
use super::trait_::{Adapter, ConnectionTestResult, FetchResult, FieldSchema, IntegrationConfig};
use crate::models::DataType;

#[derive(Debug, Deserialize)]
struct GraphqlEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    #[serde(default)]
    message: String,
}

/// Decoded response: `data` plus any reported error messages.
#[derive(Debug)]
struct GraphqlResponse {
    data: Value,
    errors: Vec<String>,
}

pub struct GraphqlAdapter {
    http: HttpSource,
}

impl GraphqlAdapter {
    pub fn new(http: HttpSource) -> Self {
        Self { http }
    }

    async fn execute(&self, config: &IntegrationConfig) -> Result<GraphqlResponse, String> {
        let body = request_body(config)?;
        let raw = self
            .http
            .send_json(config, Some(Method::POST), Some(&body))
            .await
            .map_err(|e| e.to_string())?;

        let envelope: GraphqlEnvelope = serde_json::from_value(raw)
            .map_err(|e| format!("unexpected GraphQL response shape: {e}"))?;
        let errors: Vec<String> = envelope.errors.into_iter().map(|e| e.message).collect();

        match envelope.data {
            Some(data) if !data.is_null() => Ok(GraphqlResponse { data, errors }),
            _ if !errors.is_empty() => Err(format!("GraphQL errors: {}", errors.join("; "))),
            _ => Err("GraphQL response contained no data".to_string()),
        }
    }

    /// Rows from the first non-empty array in `data`, or `data` itself
    /// flattened into a single row.
    pub fn normalize_data(data: &Value, limit: usize) -> (Vec<Value>, usize) {
        if let Some(items) = find_first_array(data, 0) {
            let rows = items.iter().take(limit).map(flatten_row).collect();
            return (rows, items.len());
        }
        match data {
            Value::Null => (Vec::new(), 0),
            other => {
                let mut rows = vec![flatten_row(other)];
                rows.truncate(limit);
                (rows, 1)
            }
        }
    }

    /// Fields reachable in `data`, deduplicated by path.
    pub fn discover_from_data(data: &Value) -> Vec<FieldSchema> {
        let mut fields = Vec::new();
        let mut seen = HashSet::new();
        if let Value::Object(map) = data {
            discover_walk(map, "", 0, &mut fields, &mut seen);
        }
        fields
    }
}

fn request_body(config: &IntegrationConfig) -> Result<Value, String> {
    if config.url.as_deref().is_none_or(|u| u.trim().is_empty()) {
        return Err("GraphQL integration requires a url".to_string());
    }
    let query = config
        .query
        .as_deref()
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| "GraphQL integration requires a query".to_string())?;

    let mut body = Map::new();
    body.insert("query".to_string(), json!(query));
    if let Some(variables) = &config.variables {
        body.insert("variables".to_string(), variables.clone());
    }
    if let Some(operation_name) = &config.operation_name {
        body.insert("operationName".to_string(), json!(operation_name));
    }
    Ok(Value::Object(body))
}

fn flatten_row(row: &Value) -> Value {
    match row {
        Value::Object(map) => Value::Object(flatten_object(map)),
        other => other.clone(),
    }
}

fn discover_walk(
    map: &Map<String, Value>,
    prefix: &str,
    depth: usize,
    fields: &mut Vec<FieldSchema>,
    seen: &mut HashSet<String>,
) {
    if depth >= MAX_JSON_DEPTH {
        return;
    }
    for (key, value) in map {
        let path = join_path(prefix, key);
        match value {
            Value::Object(child) => discover_walk(child, &path, depth + 1, fields, seen),
            Value::Array(items) => match items.first() {
                Some(Value::Object(first)) => {
                    discover_walk(first, &format!("{path}[]"), depth + 1, fields, seen)
                }
                Some(_) => push_field(fields, seen, format!("{path}[]"), DataType::Array, value),
                None => push_field(fields, seen, path, DataType::Array, value),
            },
            leaf => {
                let data_type = if prefix.contains("[]") && VALUE_KEYS.contains(&key.as_str()) {
                    DataType::Array
                } else {
                    infer_data_type(leaf)
                };
                push_field(fields, seen, path, data_type, leaf);
            }
        }
    }
}

fn push_field(
    fields: &mut Vec<FieldSchema>,
    seen: &mut HashSet<String>,
    path: String,
    data_type: DataType,
    sample: &Value,
) {
    if !seen.insert(path.clone()) {
        return;
    }
    fields.push(FieldSchema {
        name: field_name(&path),
        data_type,
        sample: (!sample.is_null()).then(|| sample.clone()),
        path,
    });
}

#[async_trait]
impl Adapter for GraphqlAdapter {
    async fn test_connection(&self, config: &IntegrationConfig) -> ConnectionTestResult {
        let started = Instant::now();
        let outcome = self.execute(config).await;
        let elapsed = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(response) if response.errors.is_empty() => {
                ConnectionTestResult::ok("GraphQL endpoint reachable", elapsed)
            }
            Ok(response) => ConnectionTestResult::failed(
                "GraphQL endpoint returned errors",
                response.errors.join("; "),
                elapsed,
            ),
            Err(e) => ConnectionTestResult::failed("Connection failed", e, elapsed),
        }
    }

    async fn fetch_data(
        &self,
        config: &IntegrationConfig,
        _field_paths: Option<&[String]>,
        limit: usize,
    ) -> FetchResult {
        match self.execute(config).await {
            Ok(response) => {
                if !response.errors.is_empty() {
                    warn!(
                        error_count = response.errors.len(),
                        "GraphQL returned partial data with errors"
                    );
                }
                let (rows, total) = Self::normalize_data(&response.data, limit);
                debug!(rows = rows.len(), total, "GraphQL response normalized");
                FetchResult::rows(rows, total)
            }
            Err(e) => FetchResult::failed(e),
        }
    }

    async fn discover_fields(&self, config: &IntegrationConfig) -> Vec<FieldSchema> {
        match self.execute(config).await {
            Ok(response) => Self::discover_from_data(&response.data),
            Err(e) => {
                debug!(error = %e, "GraphQL discovery request failed");
                Vec::new()
            }
        }
    }
}

//! REST adapter
//!
//! Issues a single configured HTTP request and treats the decoded JSON as a
//! row set.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::http::HttpSource;
use super::json::{field_name, infer_data_type, join_path};
use super::trait_::{Adapter, ConnectionTestResult, FetchResult, FieldSchema, IntegrationConfig};

/// Object keys that conventionally hold the row array, checked in order.
pub const ROW_ARRAY_KEYS: &[&str] = &["data", "items", "results", "records", "rows", "entries"];

const DISCOVERY_SAMPLE_ROWS: usize = 5;
const MAX_DISCOVERY_SEGMENTS: usize = 3;

pub struct RestAdapter {
    http: HttpSource,
}

impl RestAdapter {
    pub fn new(http: HttpSource) -> Self {
        Self { http }
    }

    /// Turn a decoded response into rows, returning the rows and the row
    /// count before truncation.
    pub fn normalize_data(response: Value, limit: usize) -> (Vec<Value>, usize) {
        match response {
            Value::Null => (Vec::new(), 0),
            Value::Array(items) => truncate(items, limit),
            Value::Object(mut map) => {
                let key = ROW_ARRAY_KEYS
                    .iter()
                    .find(|key| matches!(map.get(**key), Some(Value::Array(_))));
                match key.and_then(|key| map.remove(*key)) {
                    Some(Value::Array(items)) => truncate(items, limit),
                    _ => truncate(vec![Value::Object(map)], limit),
                }
            }
            scalar => truncate(vec![scalar], limit),
        }
    }
}

fn truncate(mut items: Vec<Value>, limit: usize) -> (Vec<Value>, usize) {
    let total = items.len();
    items.truncate(limit);
    (items, total)
}

fn collect_fields(map: &Map<String, Value>, prefix: &str, segments: usize, out: &mut Vec<FieldSchema>) {
    for (key, value) in map {
        let path = join_path(prefix, key);
        match value {
            Value::Object(child) if !child.is_empty() && segments + 1 < MAX_DISCOVERY_SEGMENTS => {
                collect_fields(child, &path, segments + 1, out);
            }
            _ => out.push(FieldSchema {
                name: field_name(&path),
                data_type: infer_data_type(value),
                sample: Some(value.clone()),
                path,
            }),
        }
    }
}

#[async_trait]
impl Adapter for RestAdapter {
    async fn test_connection(&self, config: &IntegrationConfig) -> ConnectionTestResult {
        let started = Instant::now();
        let outcome = self.http.send_json(config, None, config.body.as_ref()).await;
        let elapsed = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(_) => ConnectionTestResult::ok("Connection successful", elapsed),
            Err(e) => ConnectionTestResult::failed("Connection failed", e.to_string(), elapsed),
        }
    }

    async fn fetch_data(
        &self,
        config: &IntegrationConfig,
        _field_paths: Option<&[String]>,
        limit: usize,
    ) -> FetchResult {
        match self.http.send_json(config, None, config.body.as_ref()).await {
            Ok(response) => {
                let (rows, total) = Self::normalize_data(response, limit);
                debug!(rows = rows.len(), total, "REST response normalized");
                FetchResult::rows(rows, total)
            }
            Err(e) => FetchResult::failed(e.to_string()),
        }
    }

    async fn discover_fields(&self, config: &IntegrationConfig) -> Vec<FieldSchema> {
        let result = self.fetch_data(config, None, DISCOVERY_SAMPLE_ROWS).await;
        let mut fields = Vec::new();
        if let Some(Value::Object(first)) = result.data.first() {
            collect_fields(first, "", 0, &mut fields);
        }
        fields
    }
}

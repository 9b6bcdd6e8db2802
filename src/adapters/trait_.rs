//! Adapter trait definition
//!
//! Defines the capability interface every data-source type implements, along
//! with the decrypted configuration and the result values adapters return.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::DataType;

/// Default row cap for a single fetch.
pub const DEFAULT_FETCH_LIMIT: usize = 100;

/// Authentication mode applied to outbound requests.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthConfig {
    #[default]
    None,
    ApiKey {
        key: String,
        /// Header carrying the key; `X-API-Key` when unset
        #[serde(rename = "headerName", default, skip_serializing_if = "Option::is_none")]
        header_name: Option<String>,
    },
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
}

impl AuthConfig {
    pub fn mode(&self) -> &'static str {
        match self {
            AuthConfig::None => "none",
            AuthConfig::ApiKey { .. } => "apiKey",
            AuthConfig::Bearer { .. } => "bearer",
            AuthConfig::Basic { .. } => "basic",
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::None => f.write_str("None"),
            AuthConfig::ApiKey { header_name, .. } => f
                .debug_struct("ApiKey")
                .field("key", &"[REDACTED]")
                .field("header_name", header_name)
                .finish(),
            AuthConfig::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"[REDACTED]")
                .finish(),
            AuthConfig::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// A manually declared field for `MANUAL` integrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualField {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_manual_type")]
    pub data_type: DataType,
}

fn default_manual_type() -> DataType {
    DataType::Number
}

/// Decrypted adapter configuration.
///
/// Held only for the duration of one adapter call; `Debug` hides header values
/// and credentials.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ManualField>,
}

impl fmt::Debug for IntegrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&String> = self.headers.keys().collect();
        f.debug_struct("IntegrationConfig")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &header_names)
            .field("auth", &self.auth)
            .field("has_body", &self.body.is_some())
            .field("has_query", &self.query.is_some())
            .field("operation_name", &self.operation_name)
            .field("fields", &self.fields.len())
            .finish()
    }
}

/// Outcome of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionTestResult {
    pub fn ok(message: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            success: true,
            message: message.into(),
            response_time_ms,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            success: false,
            message: message.into(),
            response_time_ms,
            error: Some(error.into()),
        }
    }
}

/// Rows returned by a fetch. Each row is a JSON object, or a bare value when
/// the source returned an array of primitives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    pub success: bool,
    pub data: Vec<Value>,
    /// Row count before truncation to the requested limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl FetchResult {
    pub fn rows(data: Vec<Value>, total_rows: usize) -> Self {
        Self {
            success: true,
            data,
            total_rows: Some(total_rows),
            error: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            total_rows: None,
            error: Some(error.into()),
            fetched_at: Utc::now(),
        }
    }
}

/// A field discovered in a source's data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSchema {
    pub name: String,
    pub path: String,
    pub data_type: DataType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<Value>,
}

/// Capability interface for one data-source type.
///
/// Implementations never fail: network, parse, and configuration problems are
/// reported through the returned values.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Probe the source with the given configuration.
    async fn test_connection(&self, config: &IntegrationConfig) -> ConnectionTestResult;

    /// Fetch and normalize up to `limit` rows. `field_paths` is a hint.
    async fn fetch_data(
        &self,
        config: &IntegrationConfig,
        field_paths: Option<&[String]>,
        limit: usize,
    ) -> FetchResult;

    /// Inspect a sample of the source's data and describe its fields.
    async fn discover_fields(&self, config: &IntegrationConfig) -> Vec<FieldSchema>;
}

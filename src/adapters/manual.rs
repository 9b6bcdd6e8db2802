//! Manual adapter
//!
//! Manual integrations receive values through data entry, so there is nothing
//! to reach or fetch.

use async_trait::async_trait;
use chrono::Utc;

use super::trait_::{Adapter, ConnectionTestResult, FetchResult, FieldSchema, IntegrationConfig};

#[derive(Debug, Default)]
pub struct ManualAdapter;

#[async_trait]
impl Adapter for ManualAdapter {
    async fn test_connection(&self, _config: &IntegrationConfig) -> ConnectionTestResult {
        ConnectionTestResult::ok("Manual integration requires no connection", 0)
    }

    async fn fetch_data(
        &self,
        _config: &IntegrationConfig,
        _field_paths: Option<&[String]>,
        _limit: usize,
    ) -> FetchResult {
        FetchResult {
            success: true,
            data: Vec::new(),
            total_rows: Some(0),
            error: None,
            fetched_at: Utc::now(),
        }
    }

    async fn discover_fields(&self, config: &IntegrationConfig) -> Vec<FieldSchema> {
        config
            .fields
            .iter()
            .map(|field| FieldSchema {
                name: field.name.clone(),
                path: field.path.clone().unwrap_or_else(|| field.name.clone()),
                data_type: field.data_type,
                sample: None,
            })
            .collect()
    }
}

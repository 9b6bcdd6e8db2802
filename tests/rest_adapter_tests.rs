use std::collections::BTreeMap;

use kpi_sync::adapters::{Adapter, AuthConfig, HttpSource, IntegrationConfig, RestAdapter};
use kpi_sync::config::HttpConfig;
use kpi_sync::models::DataType;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path},
};

fn adapter() -> RestAdapter {
    RestAdapter::new(HttpSource::new(&HttpConfig::default()).expect("http client builds"))
}

fn config_for(server: &MockServer, route: &str) -> IntegrationConfig {
    IntegrationConfig {
        url: Some(format!("{}{route}", server.uri())),
        ..IntegrationConfig::default()
    }
}

#[tokio::test]
async fn fetch_sends_bearer_token_and_unwraps_data_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"revenue": 10}, {"revenue": 12}, {"revenue": 15}],
            "meta": {"page": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server, "/metrics");
    config.auth = AuthConfig::Bearer {
        token: "secret-token".to_string(),
    };

    let result = adapter().fetch_data(&config, None, 2).await;
    assert!(result.success, "fetch failed: {:?}", result.error);
    assert_eq!(result.data, vec![json!({"revenue": 10}), json!({"revenue": 12})]);
    assert_eq!(result.total_rows, Some(3));
}

#[tokio::test]
async fn api_key_header_defaults_and_custom_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stats"))
        .and(header("x-api-key", "k-123"))
        .and(header("x-tenant", "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"count": 4}])))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server, "/stats");
    config.auth = AuthConfig::ApiKey {
        key: "k-123".to_string(),
        header_name: None,
    };
    config.headers = BTreeMap::from([("X-Tenant".to_string(), "acme".to_string())]);

    let result = adapter().fetch_data(&config, None, 100).await;
    assert!(result.success, "fetch failed: {:?}", result.error);
    assert_eq!(result.data, vec![json!({"count": 4})]);
}

#[tokio::test]
async fn post_body_is_sent_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/report"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"range": "7d"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 99})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server, "/report");
    config.method = Some("POST".to_string());
    config.body = Some(json!({"range": "7d"}));

    let result = adapter().fetch_data(&config, None, 100).await;
    assert!(result.success, "fetch failed: {:?}", result.error);
    assert_eq!(result.data, vec![json!({"total": 99})]);
    assert_eq!(result.total_rows, Some(1));
}

#[tokio::test]
async fn non_success_status_is_reported_with_excerpt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let result = adapter()
        .fetch_data(&config_for(&server, "/broken"), None, 100)
        .await;
    assert!(!result.success);
    assert!(result.data.is_empty());
    let error = result.error.expect("error message");
    assert!(error.starts_with("HTTP 500"), "unexpected error: {error}");
    assert!(error.contains("upstream exploded"));
}

#[tokio::test]
async fn discovery_flattens_first_row() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": 7,
                    "placed_at": "2024-03-01T09:30:00Z",
                    "totals": {"gross": 120.5, "paid": true}
                }
            ]
        })))
        .mount(&server)
        .await;

    let fields = adapter()
        .discover_fields(&config_for(&server, "/orders"))
        .await;
    let summary: Vec<(&str, DataType)> = fields
        .iter()
        .map(|f| (f.path.as_str(), f.data_type))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("id", DataType::Number),
            ("placed_at", DataType::Date),
            ("totals.gross", DataType::Number),
            ("totals.paid", DataType::Boolean),
        ]
    );
    assert_eq!(fields[2].name, "gross");
    assert_eq!(fields[2].sample, Some(json!(120.5)));
}

#[tokio::test]
async fn connection_test_reports_success_and_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "up"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/denied"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let adapter = adapter();
    let ok = adapter.test_connection(&config_for(&server, "/ok")).await;
    assert!(ok.success);
    assert_eq!(ok.message, "Connection successful");
    assert!(ok.error.is_none());

    let denied = adapter
        .test_connection(&config_for(&server, "/denied"))
        .await;
    assert!(!denied.success);
    assert_eq!(denied.message, "Connection failed");
    assert!(denied.error.unwrap().starts_with("HTTP 401"));
}

#[tokio::test]
async fn missing_url_fails_without_request() {
    let result = adapter()
        .fetch_data(&IntegrationConfig::default(), None, 100)
        .await;
    assert!(!result.success);
    assert!(result.error.is_some());
}

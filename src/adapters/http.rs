//! Outbound HTTP for the REST and GraphQL adapters.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::trait_::{AuthConfig, IntegrationConfig};
use crate::config::HttpConfig;

pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";
const ERROR_BODY_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("integration configuration has no url")]
    MissingUrl,
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),
    #[error("invalid header '{0}'")]
    InvalidHeader(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {excerpt}")]
    Status { status: u16, excerpt: String },
    #[error("response is not valid JSON: {0}")]
    Decode(String),
}

/// Shared HTTP client with the configured timeout and User-Agent.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpSource {
    pub fn new(config: &HttpConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Send one request described by `config` and decode the JSON response.
    ///
    /// `method` overrides the configured method; `body` is attached only for
    /// non-GET requests.
    pub async fn send_json(
        &self,
        config: &IntegrationConfig,
        method: Option<Method>,
        body: Option<&Value>,
    ) -> Result<Value, HttpError> {
        let url = parse_url(config)?;
        let method = match method {
            Some(method) => method,
            None => parse_method(config.method.as_deref())?,
        };
        let mut headers = build_headers(config, &self.user_agent)?;

        let url_host = url.host_str().map(str::to_string);
        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = body.filter(|_| method != Method::GET) {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            let bytes = serde_json::to_vec(body).map_err(|e| HttpError::Decode(e.to_string()))?;
            request = request.body(bytes);
        }

        debug!(
            method = %method,
            host = url_host.as_deref().unwrap_or(""),
            auth = config.auth.mode(),
            "Sending source request"
        );
        let response = request.headers(headers).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                excerpt: text.chars().take(ERROR_BODY_EXCERPT_CHARS).collect(),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| HttpError::Decode(e.to_string()))
    }
}

fn parse_url(config: &IntegrationConfig) -> Result<Url, HttpError> {
    let raw = config
        .url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or(HttpError::MissingUrl)?;
    Url::parse(raw).map_err(|e| HttpError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_method(raw: Option<&str>) -> Result<Method, HttpError> {
    match raw.map(str::trim).filter(|m| !m.is_empty()) {
        None => Ok(Method::GET),
        Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
            .map_err(|_| HttpError::InvalidMethod(m.to_string())),
    }
}

/// Default User-Agent, then configured headers, then the auth header.
pub fn build_headers(config: &IntegrationConfig, user_agent: &str) -> Result<HeaderMap, HttpError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, header_value(USER_AGENT.as_str(), user_agent)?);

    for (name, value) in &config.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| HttpError::InvalidHeader(name.clone()))?;
        headers.insert(header_name, header_value(name, value)?);
    }

    match &config.auth {
        AuthConfig::None => {}
        AuthConfig::ApiKey { key, header_name } => {
            let name = header_name
                .as_deref()
                .filter(|h| !h.trim().is_empty())
                .unwrap_or(DEFAULT_API_KEY_HEADER);
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| HttpError::InvalidHeader(name.to_string()))?;
            let mut value = header_value(name, key)?;
            value.set_sensitive(true);
            headers.insert(header_name, value);
        }
        AuthConfig::Bearer { token } => {
            let mut value = header_value("Authorization", &format!("Bearer {token}"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        AuthConfig::Basic { username, password } => {
            let encoded = STANDARD.encode(format!("{username}:{password}"));
            let mut value = header_value("Authorization", &format!("Basic {encoded}"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
    }

    Ok(headers)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, HttpError> {
    HeaderValue::from_str(value).map_err(|_| HttpError::InvalidHeader(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_auth(auth: AuthConfig) -> IntegrationConfig {
        IntegrationConfig {
            url: Some("https://api.example.com/v1/orders".to_string()),
            auth,
            ..IntegrationConfig::default()
        }
    }

    #[test]
    fn api_key_uses_default_header() {
        let config = config_with_auth(AuthConfig::ApiKey {
            key: "abc".to_string(),
            header_name: None,
        });
        let headers = build_headers(&config, "kpi-sync/test").unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "abc");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "kpi-sync/test");
    }

    #[test]
    fn api_key_honours_custom_header() {
        let config = config_with_auth(AuthConfig::ApiKey {
            key: "abc".to_string(),
            header_name: Some("X-Token".to_string()),
        });
        let headers = build_headers(&config, "ua").unwrap();
        assert_eq!(headers.get("x-token").unwrap(), "abc");
        assert!(headers.get("x-api-key").is_none());
    }

    #[test]
    fn basic_auth_is_base64_encoded() {
        let config = config_with_auth(AuthConfig::Basic {
            username: "user".to_string(),
            password: "pass".to_string(),
        });
        let headers = build_headers(&config, "ua").unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn configured_headers_override_user_agent() {
        let mut config = config_with_auth(AuthConfig::Bearer {
            token: "t".to_string(),
        });
        config
            .headers
            .insert("User-Agent".to_string(), "custom".to_string());
        let headers = build_headers(&config, "ua").unwrap();
        assert_eq!(headers.get(USER_AGENT).unwrap(), "custom");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer t");
    }

    #[test]
    fn method_defaults_to_get_and_rejects_garbage() {
        assert_eq!(parse_method(None).unwrap(), Method::GET);
        assert_eq!(parse_method(Some("post")).unwrap(), Method::POST);
        assert!(parse_method(Some("GE T")).is_err());
    }

    #[test]
    fn missing_or_invalid_url_is_rejected() {
        let mut config = IntegrationConfig::default();
        assert!(matches!(parse_url(&config), Err(HttpError::MissingUrl)));
        config.url = Some("not a url".to_string());
        assert!(matches!(parse_url(&config), Err(HttpError::InvalidUrl { .. })));
    }

    #[test]
    fn status_error_formats_with_excerpt() {
        let err = HttpError::Status {
            status: 503,
            excerpt: "down".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503: down");
    }
}

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::duration_ms;

/// Body of an outbound request.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    /// Sent verbatim.
    Text(String),
    /// Serialized, sent as `application/json`.
    Json(Value),
    /// Sent as `application/octet-stream`.
    Bytes(Vec<u8>),
}

/// Description of one outbound request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestConfig {
    /// Case-insensitive; unknown or missing methods mean GET.
    pub method: Option<String>,
    pub url: String,
    pub params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub data: Option<RequestBody>,
    pub max_redirects: Option<u32>,
    pub timeout: Option<Duration>,
}

impl RequestConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.data = Some(RequestBody::Json(body));
        self
    }

    pub fn with_text(mut self, body: impl Into<String>) -> Self {
        self.data = Some(RequestBody::Text(body.into()));
        self
    }

    pub fn with_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.data = Some(RequestBody::Bytes(body.into()));
        self
    }

    pub fn with_max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = Some(max);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Read a loosely-typed config object.
    ///
    /// Recognized keys: `method`, `url`, `params`, `headers`, `data`,
    /// `maxRedirects` and `timeout` (milliseconds). Values of the wrong type
    /// are ignored; non-string param and header values are stringified.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let mut config = Self::default();

        if let Some(method) = obj.get("method").and_then(Value::as_str) {
            config.method = Some(method.to_string());
        }
        if let Some(url) = obj.get("url").and_then(Value::as_str) {
            config.url = url.to_string();
        }
        if let Some(params) = obj.get("params").and_then(Value::as_object) {
            config.params = params
                .iter()
                .map(|(k, v)| (k.clone(), value_to_string(v)))
                .collect();
        }
        if let Some(headers) = obj.get("headers").and_then(Value::as_object) {
            config.headers = headers
                .iter()
                .map(|(k, v)| (k.clone(), value_to_string(v)))
                .collect();
        }
        config.data = match obj.get("data") {
            Some(Value::String(s)) => Some(RequestBody::Text(s.clone())),
            Some(v @ (Value::Object(_) | Value::Array(_))) => Some(RequestBody::Json(v.clone())),
            _ => None,
        };
        if let Some(max) = obj
            .get("maxRedirects")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
        {
            config.max_redirects = Some(max);
        }
        if let Some(ms) = obj.get("timeout").and_then(Value::as_u64) {
            config.timeout = Some(Duration::from_millis(ms));
        }

        Some(config)
    }

    pub fn resolved_method(&self) -> Method {
        match self
            .method
            .as_deref()
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("post") => Method::POST,
            Some("put") => Method::PUT,
            Some("patch") => Method::PATCH,
            Some("head") => Method::HEAD,
            Some("options") => Method::OPTIONS,
            Some("delete") => Method::DELETE,
            _ => Method::GET,
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub data: String,
    pub headers: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestErrorKind {
    InvalidUrl,
    Timeout,
    Connect,
    Http,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestError {
    pub kind: RequestErrorKind,
    pub message: String,
}

impl RequestError {
    pub fn new(kind: RequestErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RequestError {}

/// Outbound request primitive.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, config: &RequestConfig) -> Result<Response, RequestError>;
}

/// `reqwest`-backed transport.
///
/// Certificate verification is off: the agent commonly reports to management
/// consoles running on self-signed certificates.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: build_client(None),
        }
    }

    fn client_for(&self, config: &RequestConfig) -> reqwest::Client {
        match config.max_redirects {
            Some(max) => build_client(Some(max)),
            None => self.client.clone(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn build_client(max_redirects: Option<u32>) -> reqwest::Client {
    let redirect = match max_redirects {
        Some(0) => reqwest::redirect::Policy::none(),
        Some(max) => reqwest::redirect::Policy::limited(max as usize),
        None => reqwest::redirect::Policy::default(),
    };

    match reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .redirect(redirect)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "failed to build reqwest client; falling back to default client");
            reqwest::Client::new()
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, config: &RequestConfig) -> Result<Response, RequestError> {
        let url = Url::parse(&config.url)
            .map_err(|e| RequestError::new(RequestErrorKind::InvalidUrl, e.to_string()))?;
        let method = config.resolved_method();
        let redacted_url = redact_url(&url);

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RequestError::new(RequestErrorKind::Other, e.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| RequestError::new(RequestErrorKind::Other, e.to_string()))?;
            headers.insert(name, value);
        }

        let body = match &config.data {
            None => None,
            Some(RequestBody::Text(text)) => Some(text.clone().into_bytes()),
            Some(RequestBody::Json(json)) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                Some(serde_json::to_vec(json).map_err(|e| {
                    RequestError::new(RequestErrorKind::Other, format!("serialize json: {e}"))
                })?)
            }
            Some(RequestBody::Bytes(bytes)) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static("application/octet-stream"),
                    );
                }
                Some(bytes.clone())
            }
        };

        let mut req = self
            .client_for(config)
            .request(method.clone(), url)
            .headers(headers);
        if !config.params.is_empty() {
            req = req.query(&config.params);
        }
        if let Some(timeout) = config.timeout {
            req = req.timeout(timeout);
        }
        if let Some(bytes) = body {
            req = req.body(bytes);
        }

        let start = Instant::now();
        tracing::debug!(method = %method, url = %redacted_url, "outbound request");

        let resp = req.send().await.map_err(|e| {
            tracing::warn!(
                method = %method,
                url = %redacted_url,
                duration_ms = duration_ms(start.elapsed()),
                error = %e,
                "outbound request failed"
            );
            let kind = if e.is_timeout() {
                RequestErrorKind::Timeout
            } else if e.is_connect() {
                RequestErrorKind::Connect
            } else {
                RequestErrorKind::Http
            };
            RequestError::new(kind, format!("request failed: {e}"))
        })?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let data = resp.text().await.map_err(|e| {
            RequestError::new(RequestErrorKind::Http, format!("read response: {e}"))
        })?;

        tracing::debug!(
            method = %method,
            url = %redacted_url,
            status,
            duration_ms = duration_ms(start.elapsed()),
            "outbound response"
        );

        Ok(Response {
            status,
            data,
            headers,
        })
    }
}

fn redact_url(url: &Url) -> String {
    let mut out = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        out.push_str(&format!(":{}", port));
    }
    out.push_str(url.path());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_is_case_insensitive_with_get_fallback() {
        assert_eq!(
            RequestConfig::new("http://x").with_method("POST").resolved_method(),
            Method::POST
        );
        assert_eq!(
            RequestConfig::new("http://x").with_method("delete").resolved_method(),
            Method::DELETE
        );
        assert_eq!(
            RequestConfig::new("http://x").with_method("brew").resolved_method(),
            Method::GET
        );
        assert_eq!(RequestConfig::new("http://x").resolved_method(), Method::GET);
    }

    #[test]
    fn from_value_reads_known_keys() {
        let config = RequestConfig::from_value(&json!({
            "method": "post",
            "url": "https://console.example/api/heartbeat",
            "params": { "id": 7 },
            "headers": { "x-token": "abc" },
            "data": { "alive": true },
            "maxRedirects": 0,
            "timeout": 1500,
        }))
        .unwrap();

        assert_eq!(config.resolved_method(), Method::POST);
        assert_eq!(config.url, "https://console.example/api/heartbeat");
        assert_eq!(config.params.get("id").map(String::as_str), Some("7"));
        assert_eq!(config.headers.get("x-token").map(String::as_str), Some("abc"));
        assert_eq!(config.data, Some(RequestBody::Json(json!({ "alive": true }))));
        assert_eq!(config.max_redirects, Some(0));
        assert_eq!(config.timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn from_value_rejects_non_objects_and_ignores_bad_types() {
        assert!(RequestConfig::from_value(&json!("http://x")).is_none());

        let config = RequestConfig::from_value(&json!({
            "url": "http://x",
            "timeout": "soon",
            "data": 5,
        }))
        .unwrap();
        assert!(config.timeout.is_none());
        assert!(config.data.is_none());
    }

    #[test]
    fn redacts_query_and_credentials() {
        let url = Url::parse("https://user:pw@host.example:8443/path?secret=1").unwrap();
        assert_eq!(redact_url(&url), "https://host.example:8443/path");
    }

    #[tokio::test]
    async fn invalid_url_is_reported() {
        let err = HttpTransport::new()
            .send(&RequestConfig::new("not a url"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RequestErrorKind::InvalidUrl);
    }
}

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, StatusCode};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::confirm::{ConsoleTransport, TransportError};

const ERROR_BODY_LIMIT: usize = 300;

#[derive(Error, Debug)]
pub enum CraftyError {
    #[error("Crafty API request failed ({status}) on {endpoint}: {body}")]
    Api {
        status: StatusCode,
        endpoint: String,
        body: String,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerStatus {
    Running,
    Stopped,
    Unknown,
    Other(String),
}

impl ServerStatus {
    fn parse(raw: Option<&Value>) -> Self {
        let Some(raw) = raw else {
            return Self::Unknown;
        };

        let normalized = match raw.as_str() {
            Some(s) => s.to_lowercase(),
            None => raw.to_string().to_lowercase(),
        };

        match normalized.as_str() {
            "running" | "online" | "started" | "up" | "active" => Self::Running,
            "stopped" | "offline" | "down" | "inactive" => Self::Stopped,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Running => "🟢",
            Self::Stopped => "🔴",
            _ => "⚪",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Unknown => write!(f, "unknown"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A Crafty server descriptor, normalized from the several payload shapes
/// different Crafty versions return. Built fresh on every fetch, never cached.
#[derive(Clone, Debug)]
pub struct RemoteServer {
    pub id: String,
    pub name: String,
    pub status: ServerStatus,
    pub port: Option<u16>,
}

/// Options forwarded to the Crafty logs endpoint. The confirmation workflow
/// always wants the plain decoded form, i.e. all false.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogOptions {
    pub file: bool,
    pub colors: bool,
    pub raw: bool,
    pub html: bool,
}

#[derive(Debug)]
pub struct CraftyClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl CraftyClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn ensure_ok(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<reqwest::Response, CraftyError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > ERROR_BODY_LIMIT {
            let mut end = ERROR_BODY_LIMIT;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }

        Err(CraftyError::Api {
            status,
            endpoint: endpoint.to_string(),
            body,
        })
    }

    pub async fn list_servers(&self) -> Result<Vec<RemoteServer>, CraftyError> {
        let endpoint = "/api/v2/servers";
        let response = self
            .http
            .get(format!("{}{}", self.base_url, endpoint))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let response = Self::ensure_ok(response, endpoint).await?;

        let payload: Value = response.json().await?;
        let servers: Vec<RemoteServer> = extract_server_list(&payload)
            .iter()
            .map(normalize_server)
            .collect();
        debug!("listed {} servers", servers.len());
        Ok(servers)
    }

    pub async fn server_stats(&self, server_id: &str) -> Result<Map<String, Value>, CraftyError> {
        let endpoint = format!("/api/v2/servers/{}/stats", server_id);
        let response = self
            .http
            .get(format!("{}{}", self.base_url, endpoint))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let response = Self::ensure_ok(response, &endpoint).await?;

        let payload: Value = response.json().await?;
        Ok(normalize_stats(&payload))
    }

    /// Sends one line to the server's console stdin. The response body is
    /// returned as an opaque acknowledgement; command semantics are only
    /// observable through the log stream.
    pub async fn send_console_command(
        &self,
        server_id: &str,
        command: &str,
    ) -> Result<String, CraftyError> {
        let endpoint = format!("/api/v2/servers/{}/stdin", server_id);
        debug!("sending console command to {}: {:?}", server_id, command);
        let response = self
            .http
            .post(format!("{}{}", self.base_url, endpoint))
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "text/plain")
            .body(command.trim().to_string())
            .send()
            .await?;
        let response = Self::ensure_ok(response, &endpoint).await?;

        Ok(response.text().await?)
    }

    pub async fn server_logs(
        &self,
        server_id: &str,
        options: LogOptions,
    ) -> Result<Vec<String>, CraftyError> {
        let endpoint = format!("/api/v2/servers/{}/logs", server_id);
        let response = self
            .http
            .get(format!("{}{}", self.base_url, endpoint))
            .bearer_auth(&self.token)
            .query(&[
                ("file", options.file),
                ("colors", options.colors),
                ("raw", options.raw),
                ("html", options.html),
            ])
            .send()
            .await?;
        let response = Self::ensure_ok(response, &endpoint).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await?;
        Ok(parse_log_payload(&content_type, &body))
    }
}

#[async_trait]
impl ConsoleTransport for CraftyClient {
    async fn send_line(&self, server_id: &str, command: &str) -> Result<(), TransportError> {
        self.send_console_command(server_id, command).await?;
        Ok(())
    }

    async fn recent_logs(
        &self,
        server_id: &str,
        options: LogOptions,
    ) -> Result<Vec<String>, TransportError> {
        Ok(self.server_logs(server_id, options).await?)
    }
}

/// Shapes the servers endpoint is known to return, tried in order: a bare
/// array, `{data: [...]}`, `{servers: [...]}`, `{data: {servers: [...]}}`.
/// Anything else normalizes to an empty list.
fn extract_server_list(payload: &Value) -> Vec<Value> {
    for path in ["", "/data", "/servers", "/data/servers"] {
        if let Some(list) = payload.pointer(path).and_then(Value::as_array) {
            return list.clone();
        }
    }
    Vec::new()
}

fn first_value<'a>(server: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| server.pointer(path))
        .find(|value| !value.is_null())
}

fn value_to_string(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

fn value_to_port(value: &Value) -> Option<u16> {
    if let Some(n) = value.as_u64() {
        return u16::try_from(n).ok();
    }
    value.as_str().and_then(|s| s.trim().parse().ok())
}

fn normalize_server(server: &Value) -> RemoteServer {
    let id = first_value(server, &["/server_id", "/id", "/uuid"])
        .map(value_to_string)
        .unwrap_or_else(|| "unknown-id".to_string());
    let name = first_value(server, &["/server_name", "/name", "/display_name"])
        .map(value_to_string)
        .unwrap_or_else(|| "Unnamed Server".to_string());
    let status = ServerStatus::parse(first_value(
        server,
        &["/status", "/server_status", "/stats/status", "/state"],
    ));
    let port = first_value(
        server,
        &[
            "/server_port",
            "/port",
            "/ports/primary",
            "/server_properties/server_port",
            "/execution_stats/port",
        ],
    )
    .and_then(value_to_port);

    RemoteServer {
        id,
        name,
        status,
        port,
    }
}

/// Merges the `data` section with the top-level fields; top-level wins.
fn normalize_stats(payload: &Value) -> Map<String, Value> {
    let mut merged = payload
        .pointer("/data")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if let Some(top) = payload.as_object() {
        for (key, value) in top {
            merged.insert(key.clone(), value.clone());
        }
    }

    merged
}

/// The logs endpoint answers either with JSON (a bare array or one nested
/// under `data`) or with newline-delimited plain text.
fn parse_log_payload(content_type: &str, body: &str) -> Vec<String> {
    if content_type.contains("application/json") {
        let payload: Value = serde_json::from_str(body).unwrap_or(Value::Null);
        for path in ["", "/data"] {
            if let Some(lines) = payload.pointer(path).and_then(Value::as_array) {
                return lines.iter().map(value_to_string).collect();
            }
        }
        return Vec::new();
    }

    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

//! Remote functions client.
//!
//! Invokes named serverless functions on the hosted backend with a JSON body
//! and returns the decoded JSON reply.

use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Default timeout for function invocations (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const FUNCTIONS_PATH: &str = "/functions/v1";

/// Something that can invoke a named remote function.
pub trait FunctionInvoker {
    fn invoke(&self, name: &str, payload: Value) -> impl Future<Output = Result<Value>> + Send;
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Canonical base URL for the functions host: scheme added when missing
/// (plain http only for loopback hosts), no trailing slash, no
/// `/functions/v1` suffix.
pub fn normalize_functions_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }

    let has_scheme = url.starts_with("http://") || url.starts_with("https://");
    let is_loopback = ["localhost", "127.0.0.1"].iter().any(|h| url.starts_with(h));
    let with_scheme = match (has_scheme, is_loopback) {
        (true, _) => url.to_string(),
        (false, true) => format!("http://{url}"),
        (false, false) => format!("https://{url}"),
    };

    let base = with_scheme.trim_end_matches('/');
    base.strip_suffix(FUNCTIONS_PATH)
        .unwrap_or(base)
        .trim_end_matches('/')
        .to_string()
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn friendly_error(url: &str, err: &reqwest::Error) -> Error {
    Error::Http(if err.is_connect() {
        format!("Cannot reach functions host at {url}")
    } else if err.is_timeout() {
        format!("Functions host at {url} did not answer in time")
    } else if err.is_builder() {
        format!("Malformed functions URL: {url}")
    } else {
        format!("Request to functions host {url} failed: {err}")
    })
}

fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "API key is invalid or expired".to_string(),
        403 => "Not authorized to invoke function".to_string(),
        404 => "Function not found".to_string(),
        429 => "Too many requests".to_string(),
        s if s >= 500 => "Functions host server error".to_string(),
        _ => "Unexpected response from functions host".to_string(),
    }
}

/// Pull `error`/`message` out of a JSON error body, else fall back to the
/// status text.
fn status_error(status: StatusCode, body_text: &str) -> Error {
    let message = serde_json::from_str::<Value>(body_text)
        .ok()
        .and_then(|json| {
            json.get("error")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| status_message(status));
    Error::Status {
        status: status.as_u16(),
        message,
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FunctionsClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl FunctionsClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let base_url = normalize_functions_url(base_url);
        if base_url.is_empty() {
            return Err(Error::Config("functions URL is not configured".into()));
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            base_url,
            api_key: api_key.trim().to_string(),
            client,
        })
    }

    pub fn function_url(&self, name: &str) -> String {
        format!("{}{FUNCTIONS_PATH}/{}", self.base_url, name.trim_matches('/'))
    }
}

impl FunctionInvoker for FunctionsClient {
    async fn invoke(&self, name: &str, payload: Value) -> Result<Value> {
        let url = self.function_url(name);
        let start = Instant::now();

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;

        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            debug!(function = %name, status = status.as_u16(), body = %body_text, "Function call rejected");
            return Err(status_error(status, &body_text));
        }

        info!(function = %name, latency_ms = latency_ms, "Function invoked");

        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body_text)?)
    }
}

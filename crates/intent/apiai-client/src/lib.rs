//! # api.ai client
//!
//! [`IntentResolver`] implementation for the api.ai v1 `/query` endpoint.
//! Provides token masking for safe logging and maps every failure to
//! [`DflowError::Resolution`].

use async_trait::async_trait;
use dflow_core::{DflowError, Intent, IntentResolver, Result, UNRECOGNIZED_ACTION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing;

pub const DEFAULT_BASE_URL: &str = "https://api.api.ai/v1";
pub const DEFAULT_LANG: &str = "ja";
/// Protocol version date required by the v1 API.
const PROTOCOL_VERSION: &str = "20150910";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Masks an API key/token for safe logging: shows first 7 chars + "***" + last 4 chars.
/// If length <= 11, returns "***" to avoid leaking any part of the key.
pub fn mask_token(token: &str) -> String {
    let len = token.len();
    if len <= 11 || !token.is_ascii() {
        "***".to_string()
    } else {
        format!("{}***{}", &token[..7], &token[len - 4..])
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DflowError::Configuration(format!("Failed to build api.ai HTTP client: {}", e)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    session_id: &'a str,
    lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    result: Option<QueryResult>,
    #[serde(default)]
    status: Option<QueryStatus>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    action: String,
    #[serde(default)]
    parameters: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryStatus {
    code: u16,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error_details: Option<String>,
}

/// api.ai intent client. Cheap to clone; shares one HTTP connection pool.
#[derive(Clone)]
pub struct ApiAiClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
    lang: String,
}

impl ApiAiClient {
    /// Builds a client for the public api.ai endpoint and the default language.
    pub fn new(access_token: String) -> Result<Self> {
        Self::with_base_url(access_token, DEFAULT_BASE_URL.to_string())
    }

    /// Builds a client with a custom base URL (e.g. a proxy or a mock server in tests).
    pub fn with_base_url(access_token: String, base_url: String) -> Result<Self> {
        Ok(Self {
            http: http_client(REQUEST_TIMEOUT)?,
            access_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            lang: DEFAULT_LANG.to_string(),
        })
    }

    /// Replaces the per-query timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = http_client(timeout)?;
        Ok(self)
    }

    /// Sets the query language (`ja`, `en`, ...).
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    fn into_intent(response: QueryResponse) -> Result<Intent> {
        if let Some(status) = &response.status {
            if status.code >= 300 {
                return Err(DflowError::Resolution(format!(
                    "api.ai status {} ({}): {}",
                    status.code,
                    status.error_type.as_deref().unwrap_or("unknown"),
                    status.error_details.as_deref().unwrap_or("")
                )));
            }
        }
        let result = response
            .result
            .ok_or_else(|| DflowError::Resolution("api.ai response has no result".to_string()))?;
        let action = if result.action.trim().is_empty() {
            UNRECOGNIZED_ACTION.to_string()
        } else {
            result.action
        };
        Ok(Intent {
            action,
            parameters: result.parameters,
        })
    }
}

#[async_trait]
impl IntentResolver for ApiAiClient {
    async fn identify(&self, session_id: &str, text: &str) -> Result<Intent> {
        let url = format!("{}/query", self.base_url);
        tracing::info!(
            session_id = %session_id,
            text_len = text.len(),
            lang = %self.lang,
            access_token = %mask_token(&self.access_token),
            "api.ai query request"
        );

        let response = self
            .http
            .post(&url)
            .query(&[("v", PROTOCOL_VERSION)])
            .bearer_auth(&self.access_token)
            .json(&QueryRequest {
                query: text,
                session_id,
                lang: &self.lang,
            })
            .send()
            .await
            .map_err(|e| DflowError::Resolution(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "api.ai query rejected");
            return Err(DflowError::Resolution(format!("HTTP {}: {}", status, body)));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| DflowError::Resolution(format!("invalid api.ai response: {}", e)))?;
        let intent = Self::into_intent(body)?;
        tracing::info!(
            session_id = %session_id,
            action = %intent.action,
            parameter_count = intent.parameters.len(),
            "Intent identified"
        );
        Ok(intent)
    }
}

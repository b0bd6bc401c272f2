//! Remote fallback backend speaking a JSON generate API.
//!
//! The remote endpoint is the terminal candidate of every fallback
//! chain: zero resident memory cost, always admitted, tried last. The
//! wire shape is a minimal prompt-in/text-out contract; the result
//! content itself is owned by the analysis service, not this engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::AnalysisBackend;
use crate::{MuninnError, Result};

/// Connection settings for the remote analysis service.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Service base URL, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Bearer token; sent only when present.
    pub api_key: Option<String>,
}

#[derive(Serialize)]
struct CloudRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct CloudResponse {
    text: String,
}

/// Handle onto the remote analysis service for one model id.
pub struct CloudBackend {
    model: String,
    config: CloudConfig,
    http: reqwest::Client,
}

impl CloudBackend {
    pub fn new(model: impl Into<String>, config: CloudConfig, http: reqwest::Client) -> Self {
        Self {
            model: model.into(),
            config,
            http,
        }
    }
}

#[async_trait]
impl AnalysisBackend for CloudBackend {
    fn id(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/generate", self.config.base_url);
        let body = CloudRequest {
            model: &self.model,
            prompt,
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MuninnError::BackendUnavailable(format!("{}: {e}", self.model)))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(MuninnError::BackendUnavailable(format!(
                "{}: HTTP {status}",
                self.model
            )));
        }
        if !status.is_success() {
            return Err(MuninnError::Backend {
                backend: self.model.clone(),
                message: format!("HTTP {status}"),
            });
        }

        let parsed: CloudResponse =
            response.json().await.map_err(|e| MuninnError::Backend {
                backend: self.model.clone(),
                message: format!("malformed response: {e}"),
            })?;
        Ok(parsed.text)
    }
}

//! Local model backend speaking the Ollama HTTP API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::AnalysisBackend;
use crate::{MuninnError, Result};

/// Default address of the local model server.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// A warm handle onto one locally served model.
///
/// Construction does not touch the network; [`OllamaBackend::warm_up`]
/// pages the model into memory and is what the loader awaits before
/// handing the backend to the cache.
pub struct OllamaBackend {
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(model: impl Into<String>, base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
            http,
        }
    }

    /// Load the model weights into server memory.
    ///
    /// An empty-prompt generate call makes the server resident without
    /// producing output; the first real invocation then runs warm.
    pub async fn warm_up(&self) -> Result<()> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt: "",
            stream: false,
        };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MuninnError::BackendUnavailable(format!("{}: {e}", self.model)))?;
        if !response.status().is_success() {
            return Err(MuninnError::Backend {
                backend: self.model.clone(),
                message: format!("warm-up returned HTTP {}", response.status()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AnalysisBackend for OllamaBackend {
    fn id(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MuninnError::BackendUnavailable(format!("{}: {e}", self.model)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MuninnError::Backend {
                backend: self.model.clone(),
                message: format!("HTTP {status}"),
            });
        }

        let parsed: GenerateResponse =
            response.json().await.map_err(|e| MuninnError::Backend {
                backend: self.model.clone(),
                message: format!("malformed response: {e}"),
            })?;
        Ok(parsed.response)
    }
}

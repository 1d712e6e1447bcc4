//! Ollama text generation client

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::{Error, Result};

/// Timeout for the startup reachability check
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for a local Ollama server
#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    host: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaClient {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Model used for generation
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a completion for `prompt`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Llm`] on a non-success status or an empty completion,
    /// and a transport error if the request fails
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.host);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: self.temperature.map(|temperature| GenerateOptions { temperature }),
        };

        tracing::debug!(url = %url, model = %self.model, "sending generate request");

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::warn!(model = %self.model, "ollama returned 404, check the model name");
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("ollama error {status}: {body}")));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("malformed ollama response: {e}")))?;

        let text = body.response.trim();
        if text.is_empty() {
            return Err(Error::Llm("empty completion".to_string()));
        }

        Ok(text.to_string())
    }

    /// Check that the server answers `GET /api/tags`
    pub async fn check_service(&self) -> bool {
        let url = format!("{}/api/tags", self.host);
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "ollama reachability check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = GenerateRequest {
            model: "gemma3",
            prompt: "hi",
            stream: false,
            options: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"model": "gemma3", "prompt": "hi", "stream": false}));

        let request = GenerateRequest {
            options: Some(GenerateOptions { temperature: 0.5 }),
            ..request
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["options"]["temperature"], 0.5);
    }

    #[test]
    fn test_host_trailing_slash_trimmed() {
        let config = LlmConfig {
            host: "http://127.0.0.1:11434/".to_string(),
            ..LlmConfig::default()
        };
        let client = OllamaClient::from_config(&config).unwrap();
        assert_eq!(client.host, "http://127.0.0.1:11434");
        assert_eq!(client.model(), "gemma3");
    }
}

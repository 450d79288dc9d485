use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nodeflow_core::config::ModelConfig;
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::TextGenerator;
use nodeflow_core::types::GenerationRequest;

const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Native Ollama client using `/api/generate` without streaming.
pub struct OllamaGenerator {
    http: Client,
}

impl OllamaGenerator {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OllamaGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

fn build_request(config: &ModelConfig, request: GenerationRequest) -> GenerateRequest {
    GenerateRequest {
        model: config.model_id.clone(),
        prompt: request.prompt,
        system: request.system,
        stream: false,
        options: GenerateOptions {
            temperature: config.temperature,
            num_predict: config.max_tokens,
        },
    }
}

impl TextGenerator for OllamaGenerator {
    fn generate(
        &self,
        config: &ModelConfig,
        request: GenerationRequest,
    ) -> BoxFuture<'_, Result<String>> {
        let config = config.clone();

        Box::pin(async move {
            let base_url = config
                .base_url
                .as_deref()
                .unwrap_or(OLLAMA_BASE_URL)
                .trim_end_matches('/');
            let url = format!("{}/api/generate", base_url);
            let body = build_request(&config, request);

            debug!(url = %url, model = %config.model_id, "Sending generation request");
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| NodeflowError::Generation(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(NodeflowError::Generation(format!("HTTP {}: {}", status, body)));
            }

            let parsed: GenerateResponse = response
                .json()
                .await
                .map_err(|e| NodeflowError::Generation(e.to_string()))?;
            Ok(parsed.response)
        })
    }
}

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nodeflow_core::config::ModelConfig;
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::TextGenerator;
use nodeflow_core::types::GenerationRequest;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible client. Works with OpenAI, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiGenerator {
    http: Client,
}

impl OpenAiGenerator {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn build_request(config: &ModelConfig, request: GenerationRequest) -> ChatRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system {
        messages.push(OaiMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(OaiMessage {
        role: "user",
        content: request.prompt,
    });

    ChatRequest {
        model: config.model_id.clone(),
        messages,
        max_tokens: config.max_tokens,
        temperature: if config.temperature > 0.0 {
            Some(config.temperature)
        } else {
            None
        },
        stream: false,
    }
}

fn parse_response(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| NodeflowError::Generation(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| NodeflowError::Generation("response had no content".into()))
}

impl TextGenerator for OpenAiGenerator {
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
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/');
            let url = format!("{}/chat/completions", base_url);
            let body = build_request(&config, request);

            debug!(url = %url, model = %config.model_id, "Sending generation request");
            let mut req = self.http.post(&url).json(&body);

            if let Some(api_key) = &config.api_key {
                req = req.bearer_auth(api_key);
            }

            let response = req
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

            let text = response
                .text()
                .await
                .map_err(|e| NodeflowError::Generation(e.to_string()))?;
            parse_response(&text)
        })
    }
}

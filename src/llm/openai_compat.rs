// OpenAI-compatible chat completions adapter
// Serves three providers that speak the same wire format:
// 1. OpenAI:   https://api.openai.com/v1/chat/completions, Bearer auth
// 2. DeepSeek: self-hosted or hosted endpoint from DEEPSEEK_API_URL, Bearer auth (optional)
// 3. Azure:    {endpoint}/openai/deployments/{deployment}/chat/completions?api-version=..,
//              `api-key` header

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LLMConfig;
use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, LLMProvider, LLMRequest, LLMResponse, TokenUsage};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, PartialEq)]
enum Endpoint {
    /// Bearer-authenticated base URL (OpenAI, DeepSeek)
    Bearer { base: String },
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

pub struct OpenAICompatAdapter {
    client: Client,
    api_key: String,
    endpoint: Endpoint,
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

// Response types
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl OpenAICompatAdapter {
    /// Adapter against an OpenAI-style base URL with Bearer auth.
    /// An empty `api_key` sends no Authorization header.
    pub fn new(api_key: &str, api_base: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            endpoint: Endpoint::Bearer {
                base: api_base.unwrap_or(OPENAI_API_BASE).trim_end_matches('/').to_string(),
            },
        }
    }

    pub fn azure(api_key: &str, endpoint: &str, deployment: &str, api_version: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            endpoint: Endpoint::Azure {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                deployment: deployment.to_string(),
                api_version: api_version.to_string(),
            },
        }
    }

    pub fn from_config(config: &LLMConfig) -> Self {
        match config.provider {
            LLMProvider::Azure => Self::azure(
                &config.api_key,
                config.api_base.as_deref().unwrap_or_default(),
                config.azure_deployment.as_deref().unwrap_or(&config.model),
                &config.azure_api_version,
            ),
            _ => Self::new(&config.api_key, config.api_base.as_deref()),
        }
    }

    fn url(&self) -> String {
        match &self.endpoint {
            // DEEPSEEK_API_URL is commonly the full completions URL already
            Endpoint::Bearer { base } if base.ends_with("/chat/completions") => base.clone(),
            Endpoint::Bearer { base } => format!("{}/chat/completions", base),
            Endpoint::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint, deployment, api_version
            ),
        }
    }

    fn build_messages(request: &LLMRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_instruction {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        }));
        messages
    }
}

/// Drop a leading `<think>...</think>` block emitted by reasoning models.
fn strip_reasoning(content: &str) -> String {
    let trimmed = content.trim_start();
    if let Some(rest) = trimmed.strip_prefix("<think>") {
        if let Some(end) = rest.find("</think>") {
            return rest[end + "</think>".len()..].trim().to_string();
        }
    }
    content.trim().to_string()
}

#[async_trait]
impl LLMAdapter for OpenAICompatAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let body = ChatRequest {
            model: request.model.clone(),
            messages: Self::build_messages(request),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };

        let mut builder = self
            .client
            .post(self.url())
            .header("Content-Type", "application/json")
            .json(&body);

        builder = match &self.endpoint {
            Endpoint::Azure { .. } => builder.header("api-key", &self.api_key),
            Endpoint::Bearer { .. } if !self.api_key.is_empty() => {
                builder.header("Authorization", format!("Bearer {}", self.api_key))
            }
            Endpoint::Bearer { .. } => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::LLMApi(format!("Chat completion request failed: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                return Err(AppError::LLMApi(format!(
                    "API error ({}): {} (code: {:?})",
                    status, error_response.error.message, error_response.error.code
                )));
            }

            return Err(AppError::LLMApi(format!("API error ({}): {}", status, error_text)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMApi(format!("Failed to parse chat completion: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLMApi("Provider returned no choices".to_string()))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content: strip_reasoning(&choice.message.content.unwrap_or_default()),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }
}

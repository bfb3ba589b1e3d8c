// Google Gemini adapter (generateContent REST API)
// Endpoint: https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent?key=..

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiAdapter {
    client: Client,
    api_key: String,
    base: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GeminiAdapter {
    pub fn new(api_key: &str, api_base: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base: api_base.unwrap_or(GEMINI_API_BASE).trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, model: &str) -> String {
        // Accept LiteLLM-style names such as "gemini/gemini-1.5-pro-latest"
        let model = model.strip_prefix("gemini/").unwrap_or(model);
        format!("{}/v1beta/models/{}:generateContent", self.base, model)
    }

    fn build_request(request: &LLMRequest) -> GenerateRequest {
        let mut system_parts: Vec<Part> = request
            .system_instruction
            .iter()
            .map(|s| Part { text: s.clone() })
            .collect();

        let mut contents = Vec::new();
        for message in &request.messages {
            match message.role.as_str() {
                "system" => system_parts.push(Part {
                    text: message.content.clone(),
                }),
                role => contents.push(Content {
                    role: Some(if role == "assistant" { "model" } else { "user" }.to_string()),
                    parts: vec![Part {
                        text: message.content.clone(),
                    }],
                }),
            }
        }

        GenerateRequest {
            contents,
            system_instruction: if system_parts.is_empty() {
                None
            } else {
                Some(Content {
                    role: None,
                    parts: system_parts,
                })
            },
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LLMAdapter for GeminiAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let response = self
            .client
            .post(self.url(&request.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::build_request(request))
            .send()
            .await
            .map_err(|e| AppError::LLMApi(format!("Gemini request failed: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                return Err(AppError::LLMApi(format!(
                    "Gemini API error ({}): {} (status: {:?})",
                    status, error_response.error.message, error_response.error.status
                )));
            }

            return Err(AppError::LLMApi(format!("Gemini API error ({}): {}", status, error_text)));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMApi(format!("Failed to parse Gemini response: {}", e)))?;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLMApi("Gemini returned no candidates".to_string()))?;

        let content = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join(""))
            .unwrap_or_default();

        let usage = parsed
            .usage_metadata
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content: content.trim().to_string(),
            finish_reason: candidate.finish_reason.unwrap_or_else(|| "STOP".to_string()),
            usage,
        })
    }
}

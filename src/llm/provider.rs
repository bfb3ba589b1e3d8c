use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{LLMConfig, PipelineConfig};
use crate::types::{AppError, AppResult, LLMMessage, LLMProvider, LLMRequest, LLMResponse};
use crate::utils::with_retry;

/// System instruction sent with every call
pub const SYSTEM_INSTRUCTION: &str = "请用中文回答所有问题，保持专业性和准确性。";

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Handle to the selected language model. Cheap to clone; carries the
/// model name, sampling settings and the per-call timeout/retry policy.
#[derive(Clone)]
pub struct LLM {
    adapter: Arc<dyn LLMAdapter>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
}

impl LLM {
    pub fn new(config: &LLMConfig, pipeline: &PipelineConfig) -> Self {
        let adapter: Arc<dyn LLMAdapter> = match config.provider {
            LLMProvider::OpenAI | LLMProvider::DeepSeek | LLMProvider::Azure => {
                Arc::new(crate::llm::openai_compat::OpenAICompatAdapter::from_config(config))
            }
            LLMProvider::Gemini => Arc::new(crate::llm::gemini::GeminiAdapter::new(
                &config.api_key,
                config.api_base.as_deref(),
            )),
        };

        Self::from_adapter(adapter, &config.model)
            .with_sampling(Some(config.temperature), Some(config.max_tokens))
            .with_policy(
                Duration::from_secs(pipeline.call_timeout_secs),
                pipeline.max_retries,
                Duration::from_millis(pipeline.retry_base_delay_ms),
            )
    }

    pub fn from_adapter(adapter: Arc<dyn LLMAdapter>, model: impl Into<String>) -> Self {
        Self {
            adapter,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            timeout: Duration::from_secs(120),
            max_attempts: 1,
            retry_delay: Duration::from_millis(500),
        }
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_policy(mut self, timeout: Duration, max_attempts: u32, retry_delay: Duration) -> Self {
        self.timeout = timeout;
        self.max_attempts = max_attempts;
        self.retry_delay = retry_delay;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.adapter.create_chat_completion(request).await
    }

    /// Single-prompt call. Every attempt is bounded by the configured
    /// timeout; an elapsed timeout is reported as `AppError::Timeout`.
    pub async fn call(&self, prompt: &str) -> AppResult<String> {
        let request = LLMRequest {
            model: self.model.clone(),
            messages: vec![LLMMessage::user(prompt)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system_instruction: Some(SYSTEM_INSTRUCTION.to_string()),
        };

        let response = with_retry(
            || async {
                match tokio::time::timeout(self.timeout, self.adapter.create_chat_completion(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(AppError::Timeout {
                        stage: "language model call".to_string(),
                        secs: self.timeout.as_secs(),
                    }),
                }
            },
            self.max_attempts,
            self.retry_delay,
        )
        .await?;

        debug!(
            model = %self.model,
            finish_reason = %response.finish_reason,
            total_tokens = response.usage.total_tokens,
            "LLM call completed"
        );

        Ok(response.content)
    }
}

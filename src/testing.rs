// Scripted fakes for the two external boundaries (language model, query agent)

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, LLMConfig, PipelineConfig, ServerConfig};
use crate::dataset::DataTable;
use crate::llm::{LLMAdapter, LLM};
use crate::query::{QueryAgent, QueryMode, QueryOutcome};
use crate::types::{AppError, AppResult, LLMProvider, LLMRequest, LLMResponse, TokenUsage};

/// Answers each prompt with the response of the first rule whose marker the
/// prompt contains. Unmatched prompts fail like an unreachable provider.
#[derive(Default)]
pub(crate) struct ScriptedLLM {
    rules: Vec<(String, Result<String, String>)>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLLM {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(mut self, marker: &str, response: &str) -> Self {
        self.rules.push((marker.to_string(), Ok(response.to_string())));
        self
    }

    pub(crate) fn fail_on(mut self, marker: &str, message: &str) -> Self {
        self.rules.push((marker.to_string(), Err(message.to_string())));
        self
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of prompts sent that contain `marker`
    pub(crate) fn count(&self, marker: &str) -> usize {
        self.prompts().iter().filter(|p| p.contains(marker)).count()
    }

    pub(crate) fn llm(self: &Arc<Self>) -> LLM {
        self.llm_as("scripted-model")
    }

    pub(crate) fn llm_as(self: &Arc<Self>, model: &str) -> LLM {
        LLM::from_adapter(self.clone(), model)
    }
}

#[async_trait]
impl LLMAdapter for ScriptedLLM {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let prompt = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt.clone());

        let rule = self.rules.iter().find(|(marker, _)| prompt.contains(marker.as_str()));
        match rule {
            Some((_, Ok(content))) => Ok(LLMResponse {
                content: content.clone(),
                finish_reason: "stop".to_string(),
                usage: TokenUsage::default(),
            }),
            Some((_, Err(message))) => Err(AppError::LLMApi(message.clone())),
            None => Err(AppError::LLMApi("no scripted response".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedQuery {
    pub instruction: String,
    pub mode: QueryMode,
    pub rows_in: usize,
}

/// Answers by instruction substring and mode; records every call.
#[derive(Default)]
pub(crate) struct ScriptedQueryAgent {
    rules: Vec<(String, Option<QueryMode>, Result<QueryOutcome, String>)>,
    calls: Mutex<Vec<RecordedQuery>>,
    delay: Option<Duration>,
}

impl ScriptedQueryAgent {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(mut self, needle: &str, mode: QueryMode, outcome: QueryOutcome) -> Self {
        self.rules.push((needle.to_string(), Some(mode), Ok(outcome)));
        self
    }

    pub(crate) fn fail_on(mut self, needle: &str, message: &str) -> Self {
        self.rules.push((needle.to_string(), None, Err(message.to_string())));
        self
    }

    /// Sleep before answering, to exercise timeouts
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> Vec<RecordedQuery> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryAgent for ScriptedQueryAgent {
    async fn query(&self, data: &DataTable, instruction: &str, mode: QueryMode) -> AppResult<QueryOutcome> {
        self.calls.lock().unwrap().push(RecordedQuery {
            instruction: instruction.to_string(),
            mode,
            rows_in: data.row_count(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let rule = self.rules.iter().find(|(needle, rule_mode, _)| {
            instruction.contains(needle.as_str()) && rule_mode.map_or(true, |m| m == mode)
        });
        match rule {
            Some((_, _, Ok(outcome))) => Ok(outcome.clone()),
            Some((_, _, Err(message))) => Err(AppError::QueryAgent(message.clone())),
            None => Ok(QueryOutcome::Unsupported {
                reason: "no scripted outcome".to_string(),
            }),
        }
    }
}

/// Daily revenue with sub-components, as used in the scenario tests
pub(crate) fn revenue_table() -> DataTable {
    DataTable::new(
        vec![
            "日期".into(),
            "总收入".into(),
            "Web充值收入".into(),
            "App充值收入".into(),
            "充值人数".into(),
            "DAU".into(),
        ],
        vec![
            vec!["2025-03-01".into(), "800".into(), "300".into(), "500".into(), "20".into(), "1000".into()],
            vec!["2025-04-01".into(), "950".into(), "350".into(), "600".into(), "24".into(), "1100".into()],
            vec!["2025-05-01".into(), "1200".into(), "500".into(), "700".into(), "30".into(), "1300".into()],
            vec!["2025-06-01".into(), "900".into(), "200".into(), "700".into(), "21".into(), "1250".into()],
        ],
    )
    .unwrap()
}

/// Configuration with a dummy model, for router tests
pub(crate) fn test_config() -> Config {
    Config {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
        },
        llm: LLMConfig {
            provider: LLMProvider::DeepSeek,
            model: "scripted-model".to_string(),
            api_key: String::new(),
            api_base: Some("http://127.0.0.1:9".to_string()),
            azure_deployment: None,
            azure_api_version: "2024-02-01".to_string(),
            temperature: 0.0,
            max_tokens: 4000,
        },
        pipeline: PipelineConfig::default(),
    }
}

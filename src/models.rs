use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::{AnalysisDepth, IntentSet};
use crate::config::{Config, LLMConfig};
use crate::dataset::DatasetProfile;
use crate::pipeline::{Pipeline, ResponseArtifact};
use crate::session::{LogEntry, SessionRegistry};
use crate::types::{AppError, AppResult, LLMProvider};

/// Builds the pipeline of a session from its model choice
pub type PipelineFactory = Arc<dyn Fn(&LLMConfig) -> Pipeline + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Pipeline on the configured model, shared by sessions that keep it
    pub pipeline: Arc<Pipeline>,
    pipeline_factory: PipelineFactory,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let pipeline_config = config.pipeline.clone();
        let factory: PipelineFactory =
            Arc::new(move |llm: &LLMConfig| Pipeline::from_config(llm, pipeline_config.clone()));
        Self::with_pipeline_factory(config, factory)
    }

    pub fn with_pipeline_factory(config: Config, pipeline_factory: PipelineFactory) -> Self {
        let pipeline = Arc::new(pipeline_factory(&config.llm));
        Self {
            config,
            pipeline,
            pipeline_factory,
            sessions: SessionRegistry::default(),
        }
    }

    /// Pipeline for a new session. Without overrides the shared one is reused.
    pub fn session_pipeline(&self, provider: Option<LLMProvider>, model: Option<&str>) -> AppResult<Arc<Pipeline>> {
        if provider.is_none() && model.is_none() {
            return Ok(self.pipeline.clone());
        }
        let llm = self
            .config
            .llm
            .with_overrides(provider, model)
            .map_err(|e| AppError::InvalidRequest(format!("{:#}", e)))?;
        Ok(Arc::new((self.pipeline_factory)(&llm)))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub filename: Option<String>,
    /// CSV text including the header row
    pub csv: String,
    /// Provider for this session; defaults to the configured one
    #[serde(default)]
    pub provider: Option<LLMProvider>,
    #[serde(default)]
    pub model: Option<String>,
    /// Ask the model for a description of every column
    #[serde(default = "default_describe_columns")]
    pub describe_columns: bool,
}

fn default_describe_columns() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub model: String,
    pub profile: DatasetProfile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub turn_id: Uuid,
    pub model: String,
    pub intents: IntentSet,
    pub depth: Option<AnalysisDepth>,
    pub artifacts: Vec<ResponseArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExploreRequest {
    pub variable: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagesResponse {
    pub session_id: Uuid,
    pub messages: Vec<LogEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

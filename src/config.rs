use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::LLMProvider;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

/// The selected model and its credentials. Passed explicitly into every
/// pipeline; two sessions may run with different values side by side.
#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub model: String,
    pub api_key: String,
    /// Base URL for OpenAI-compatible providers; Azure endpoint for `azure`
    pub api_base: Option<String>,
    pub azure_deployment: Option<String>,
    pub azure_api_version: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Rows of the extracted table shown to the guidance generator
    pub guidance_sample_rows: usize,
    /// Upper bound of rows serialized into the report prompt
    pub report_max_rows: usize,
    /// Per language-model call attempt
    pub call_timeout_secs: u64,
    /// Per query-agent call (planning, execution and chart rendering)
    pub query_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub charts_dir: PathBuf,
    /// Run the direct plot/table/text branches concurrently
    pub concurrent_branches: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            guidance_sample_rows: 5,
            report_max_rows: 500,
            call_timeout_secs: 120,
            query_timeout_secs: 300,
            max_retries: 1,
            retry_base_delay_ms: 500,
            charts_dir: PathBuf::from("exports/charts"),
            concurrent_branches: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = PipelineConfig::default();

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8501".to_string())
                    .parse()
                    .context("PORT must be a port number")?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            llm: LLMConfig::from_env()?,
            pipeline: PipelineConfig {
                guidance_sample_rows: env::var("GUIDANCE_SAMPLE_ROWS")
                    .unwrap_or_else(|_| defaults.guidance_sample_rows.to_string())
                    .parse()?,
                report_max_rows: env::var("REPORT_MAX_ROWS")
                    .unwrap_or_else(|_| defaults.report_max_rows.to_string())
                    .parse()?,
                call_timeout_secs: env::var("CALL_TIMEOUT_SECS")
                    .unwrap_or_else(|_| defaults.call_timeout_secs.to_string())
                    .parse()?,
                query_timeout_secs: env::var("QUERY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| defaults.query_timeout_secs.to_string())
                    .parse()?,
                max_retries: env::var("LLM_MAX_RETRIES")
                    .unwrap_or_else(|_| defaults.max_retries.to_string())
                    .parse()?,
                retry_base_delay_ms: env::var("LLM_RETRY_DELAY_MS")
                    .unwrap_or_else(|_| defaults.retry_base_delay_ms.to_string())
                    .parse()?,
                charts_dir: env::var("CHARTS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.charts_dir),
                concurrent_branches: env::var("CONCURRENT_BRANCHES")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()?,
            },
        })
    }
}

impl LLMConfig {
    pub fn from_env() -> Result<Self> {
        let provider: LLMProvider = env::var("LLM_PROVIDER")
            .unwrap_or_else(|_| "gemini".to_string())
            .parse()?;
        let mut config = Self::for_provider(provider)?;
        if let Ok(model) = env::var("LLM_MODEL") {
            config.model = model;
        }
        Ok(config)
    }

    /// Credentials of `provider` from the environment, with its default model
    pub fn for_provider(provider: LLMProvider) -> Result<Self> {
        let (api_key, api_base) = match provider {
            LLMProvider::OpenAI => (
                env::var("OPENAI_API_KEY").ok(),
                env::var("OPENAI_API_BASE").ok(),
            ),
            LLMProvider::DeepSeek => (
                env::var("DEEPSEEK_API_KEY").ok(),
                env::var("DEEPSEEK_API_URL").ok(),
            ),
            LLMProvider::Azure => (
                env::var("AZURE_OPENAI_KEY").ok(),
                env::var("AZURE_OPENAI_ENDPOINT").ok(),
            ),
            LLMProvider::Gemini => (
                env::var("GEMINI_API_KEY")
                    .or_else(|_| env::var("GOOGLE_API_KEY"))
                    .ok(),
                env::var("GEMINI_API_BASE").ok(),
            ),
        };

        // Self-hosted DeepSeek deployments usually run without auth
        let api_key = match provider {
            LLMProvider::DeepSeek => api_key.unwrap_or_default(),
            _ => api_key
                .filter(|k| !k.trim().is_empty())
                .with_context(|| format!("No API key configured for LLM provider '{}'", provider))?,
        };

        if matches!(provider, LLMProvider::DeepSeek | LLMProvider::Azure) && api_base.is_none() {
            anyhow::bail!("LLM provider '{}' requires an API base URL", provider);
        }

        Ok(Self {
            provider,
            model: provider.default_model().to_string(),
            api_key,
            api_base,
            azure_deployment: env::var("AZURE_OPENAI_DEPLOYMENT").ok(),
            azure_api_version: env::var("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|_| "2024-02-01".to_string()),
            temperature: env::var("LLM_TEMPERATURE")
                .unwrap_or_else(|_| "0".to_string())
                .parse()?,
            max_tokens: env::var("LLM_MAX_TOKENS")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()?,
        })
    }

    /// A copy for one session with another provider and/or model. Switching
    /// provider loads that provider's credentials from the environment.
    pub fn with_overrides(&self, provider: Option<LLMProvider>, model: Option<&str>) -> Result<Self> {
        let mut config = match provider {
            Some(provider) if provider != self.provider => Self::for_provider(provider)
                .with_context(|| format!("LLM provider '{}' is not configured", provider))?,
            _ => self.clone(),
        };
        if let Some(model) = model {
            let model = model.trim();
            if model.is_empty() {
                anyhow::bail!("model must not be empty");
            }
            config.model = model.to_string();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deepseek() -> LLMConfig {
        LLMConfig {
            provider: LLMProvider::DeepSeek,
            model: "deepseek-chat".to_string(),
            api_key: String::new(),
            api_base: Some("http://127.0.0.1:9".to_string()),
            azure_deployment: None,
            azure_api_version: "2024-02-01".to_string(),
            temperature: 0.0,
            max_tokens: 4000,
        }
    }

    #[test]
    fn test_model_override_keeps_credentials() {
        let base = deepseek();
        let session = base
            .with_overrides(Some(LLMProvider::DeepSeek), Some(" deepseek-reasoner "))
            .unwrap();
        assert_eq!(session.model, "deepseek-reasoner");
        assert_eq!(session.api_base, base.api_base);
        // The shared config is untouched
        assert_eq!(base.model, "deepseek-chat");
    }

    #[test]
    fn test_no_override_is_identity() {
        let session = deepseek().with_overrides(None, None).unwrap();
        assert_eq!(session.model, "deepseek-chat");
        assert_eq!(session.provider, LLMProvider::DeepSeek);
    }

    #[test]
    fn test_blank_model_override_is_rejected() {
        assert!(deepseek().with_overrides(None, Some("  ")).is_err());
    }
}

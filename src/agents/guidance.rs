//! Guidance Generator
//!
//! Produces the short analysis plan handed to the report generator. Only a
//! head sample of the extracted table is shown to the model.

use tracing::info;

use super::prompts;
use crate::dataset::DataTable;
use crate::llm::LLM;
use crate::types::{AppError, AppResult};

pub struct GuidanceGenerator;

impl GuidanceGenerator {
    pub async fn generate(llm: &LLM, question: &str, table: &DataTable, sample_rows: usize) -> AppResult<String> {
        let sample = table.head(sample_rows);
        let prompt = prompts::guidance_prompt(question, sample.row_count(), &sample.to_csv()?);

        let guidance = llm.call(&prompt).await?;
        let guidance = guidance.trim();
        if guidance.is_empty() {
            return Err(AppError::LLMApi("guidance generator returned an empty answer".to_string()));
        }

        info!(guidance_len = guidance.len(), sample_rows = sample.row_count(), "Guidance generated");
        Ok(guidance.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::prompts::GUIDANCE_TAG;
    use crate::testing::{revenue_table, ScriptedLLM};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_prompt_only_sees_sample_rows() {
        let llm = Arc::new(ScriptedLLM::new().on(GUIDANCE_TAG, "1. 对比两天的总收入\n2. 拆分 Web 与 App 充值收入"));

        let guidance = GuidanceGenerator::generate(&llm.llm(), "为什么6月1日收入低", &revenue_table(), 2)
            .await
            .unwrap();
        assert!(guidance.starts_with("1. 对比"));

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("前2行"));
        assert!(prompt.contains("2025-04-01"));
        assert!(!prompt.contains("2025-05-01"));
    }

    #[tokio::test]
    async fn test_blank_guidance_is_error() {
        let llm = Arc::new(ScriptedLLM::new().on(GUIDANCE_TAG, "  \n "));
        let result = GuidanceGenerator::generate(&llm.llm(), "q", &revenue_table(), 5).await;
        assert!(result.is_err());
    }
}

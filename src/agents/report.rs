//! Report Generator
//!
//! The full extracted table goes into the prompt, capped at a configured
//! row count. Section structure is requested, not enforced.

use tracing::{info, warn};

use super::prompts;
use crate::dataset::DataTable;
use crate::llm::LLM;
use crate::types::AppResult;
use crate::utils::normalize_markdown;

pub struct ReportGenerator;

impl ReportGenerator {
    pub async fn generate(
        llm: &LLM,
        question: &str,
        guidance: &str,
        table: &DataTable,
        max_rows: usize,
    ) -> AppResult<String> {
        if table.row_count() > max_rows {
            warn!(rows = table.row_count(), max_rows, "Extracted table truncated for the report prompt");
        }
        let data = table.head(max_rows);
        let prompt = prompts::report_prompt(question, guidance, data.row_count(), &data.to_csv()?);

        let report = normalize_markdown(&llm.call(&prompt).await?);
        info!(report_len = report.len(), rows = data.row_count(), "Report generated");
        Ok(report)
    }
}

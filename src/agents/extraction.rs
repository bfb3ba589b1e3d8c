//! Extraction Stage
//!
//! Runs the broadened instruction through the query agent in broad-extraction
//! mode and classifies what came back.

use tracing::{info, warn};

use crate::dataset::DataTable;
use crate::query::{QueryAgent, QueryMode, QueryOutcome};
use crate::types::AppResult;

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// At least one matching row
    Rows(DataTable),
    /// The filter matched nothing
    Empty,
    /// The agent answered with something other than a table
    TypeMismatch { received: &'static str, detail: String },
}

pub struct Extractor;

impl Extractor {
    pub async fn extract(agent: &dyn QueryAgent, data: &DataTable, instruction: &str) -> AppResult<ExtractionOutcome> {
        let outcome = agent.query(data, instruction, QueryMode::BroadExtraction).await?;

        Ok(match outcome {
            QueryOutcome::Table { table } if table.is_empty() => {
                warn!(instruction = %instruction, "Extraction matched no rows");
                ExtractionOutcome::Empty
            }
            QueryOutcome::Table { table } => {
                info!(
                    rows = table.row_count(),
                    columns = table.column_count(),
                    "Extraction completed"
                );
                ExtractionOutcome::Rows(table)
            }
            other => {
                let received = other.kind();
                let detail = match other {
                    QueryOutcome::Unsupported { reason } => reason,
                    QueryOutcome::Chart { path } => format!("chart at {}", path),
                    QueryOutcome::Text { text } => text,
                    QueryOutcome::Table { .. } => String::new(),
                };
                warn!(received, "Extraction returned a non-tabular result");
                ExtractionOutcome::TypeMismatch { received, detail }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{revenue_table, ScriptedQueryAgent};

    #[tokio::test]
    async fn test_rows_are_returned() {
        let data = revenue_table();
        let agent = ScriptedQueryAgent::new().on(
            "提取",
            QueryMode::BroadExtraction,
            QueryOutcome::Table { table: data.head(2) },
        );

        let outcome = Extractor::extract(&agent, &data, "提取全部数据").await.unwrap();
        assert_eq!(outcome, ExtractionOutcome::Rows(data.head(2)));
        assert_eq!(agent.calls()[0].mode, QueryMode::BroadExtraction);
        assert_eq!(agent.calls()[0].rows_in, 4);
    }

    #[tokio::test]
    async fn test_zero_rows_is_empty() {
        let data = revenue_table();
        let agent = ScriptedQueryAgent::new().on(
            "提取",
            QueryMode::BroadExtraction,
            QueryOutcome::Table {
                table: DataTable::empty(data.columns().to_vec()),
            },
        );

        let outcome = Extractor::extract(&agent, &data, "提取2030年的数据").await.unwrap();
        assert_eq!(outcome, ExtractionOutcome::Empty);
    }

    #[tokio::test]
    async fn test_non_table_is_mismatch() {
        let agent = ScriptedQueryAgent::new().on(
            "提取",
            QueryMode::BroadExtraction,
            QueryOutcome::Unsupported {
                reason: "no such column".to_string(),
            },
        );

        let outcome = Extractor::extract(&agent, &revenue_table(), "提取利润").await.unwrap();
        assert_eq!(
            outcome,
            ExtractionOutcome::TypeMismatch {
                received: "unsupported",
                detail: "no such column".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_agent_error_propagates() {
        let agent = ScriptedQueryAgent::new().fail_on("提取", "plan rejected");
        assert!(Extractor::extract(&agent, &revenue_table(), "提取").await.is_err());
    }
}

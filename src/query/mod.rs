//! Query Agent Adapter
//!
//! The boundary to the natural-language data-query capability. Callers hand
//! over a table and an instruction and get back one closed variant:
//!
//! ```text
//! QueryOutcome::Table | Chart { path } | Text | Unsupported { reason }
//! ```
//!
//! `LlmQueryAgent` is the implementation used in production: the model plans,
//! [`plan::QueryPlan`] executes.

pub mod agent;
pub mod chart;
pub mod plan;

pub use agent::LlmQueryAgent;
pub use plan::QueryPlan;

use async_trait::async_trait;
use serde::Serialize;

use crate::dataset::DataTable;
use crate::types::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Keep every column of the matched rows; only entity/date filtering
    BroadExtraction,
    /// Single-shot plot/table/text answer
    Direct,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    Table { table: DataTable },
    Chart { path: String },
    Text { text: String },
    Unsupported { reason: String },
}

impl QueryOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryOutcome::Table { .. } => "table",
            QueryOutcome::Chart { .. } => "chart",
            QueryOutcome::Text { .. } => "text",
            QueryOutcome::Unsupported { .. } => "unsupported",
        }
    }
}

#[async_trait]
pub trait QueryAgent: Send + Sync {
    /// Answer `instruction` against `data`. The data is never modified.
    async fn query(&self, data: &DataTable, instruction: &str, mode: QueryMode) -> AppResult<QueryOutcome>;
}

//! LLM-planned query agent
//!
//! Asks the model for a JSON [`QueryPlan`] describing how to answer an
//! instruction against the table schema, then executes the plan locally.
//! Text answers take one more model call that phrases the computed rows.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::chart::render_chart;
use super::plan::{PlanKind, QueryPlan};
use super::{QueryAgent, QueryMode, QueryOutcome};
use crate::dataset::{detect_date_column, DataTable};
use crate::llm::LLM;
use crate::types::{AppError, AppResult};
use crate::utils::normalize_markdown;

/// Marker heading of the planning prompt
pub const QUERY_PLAN_TAG: &str = "【查询计划】";
/// Marker heading of the answer-phrasing prompt
pub const QUERY_ANSWER_TAG: &str = "【结果解读】";

const SAMPLE_ROWS: usize = 5;
const DEFAULT_ANSWER_MAX_ROWS: usize = 200;

pub struct LlmQueryAgent {
    llm: LLM,
    charts_dir: PathBuf,
    answer_max_rows: usize,
}

impl LlmQueryAgent {
    pub fn new(llm: LLM, charts_dir: impl Into<PathBuf>) -> Self {
        Self {
            llm,
            charts_dir: charts_dir.into(),
            answer_max_rows: DEFAULT_ANSWER_MAX_ROWS,
        }
    }

    /// Rows of a computed result shown to the model when phrasing a text answer
    pub fn with_answer_max_rows(mut self, rows: usize) -> Self {
        self.answer_max_rows = rows;
        self
    }

    fn create_plan_prompt(data: &DataTable, instruction: &str, mode: QueryMode) -> AppResult<String> {
        let date_column = detect_date_column(data)
            .map(|idx| data.columns()[idx].clone())
            .unwrap_or_else(|| "无".to_string());

        let mode_rules = match mode {
            QueryMode::BroadExtraction => {
                "本次为【数据提取】：kind 必须为 \"table\"；只根据问题中的日期、实体做 filters 筛选；\
                 不要设置 columns、group_by、aggregations，保留匹配行的全部字段。"
            }
            QueryMode::Direct => {
                "需要绘图时 kind 为 \"chart\" 并填写 chart；需要表格结果时 kind 为 \"table\"；\
                 需要一句话回答时 kind 为 \"text\"；无法用该数据回答时 kind 为 \"unsupported\" 并在 reason 中说明原因。"
            }
        };

        Ok(format!(
            r#"{tag}
你是一个数据查询规划助手。请根据数据结构，把用户的指令转换为一个 JSON 查询计划，只输出 JSON，不要输出代码或解释。

数据列：{columns}
日期列：{date_column}
数据样例（前{sample_rows}行）：
{sample}
JSON 字段说明：
- kind: "table" | "chart" | "text" | "unsupported"
- filters: [{{"column": 列名, "op": "eq|ne|gt|gte|lt|lte|contains|in|between", "value": 值}}]，in/between 的 value 为数组，日期使用 YYYY-MM-DD
- group_by: [列名 或 {{"column": 日期列, "bucket": "day|month|year"}}]
- aggregations: [{{"column": 列名或"*", "func": "sum|mean|min|max|count", "alias": 结果列名}}]
- columns: [需要保留的列名]
- sort: [{{"column": 列名, "descending": true|false}}]
- limit: 行数上限
- chart: {{"type": "line|bar", "x": 横轴列, "y": [纵轴列], "title": 标题}}
- reason: 无法回答时的原因

{mode_rules}

指令：{instruction}"#,
            tag = QUERY_PLAN_TAG,
            columns = data.columns().join(", "),
            date_column = date_column,
            sample_rows = SAMPLE_ROWS,
            sample = data.head(SAMPLE_ROWS).to_csv()?,
            mode_rules = mode_rules,
            instruction = instruction,
        ))
    }

    fn create_answer_prompt(&self, instruction: &str, result: &DataTable) -> AppResult<String> {
        Ok(format!(
            "{tag}\n根据下面的查询结果，用简洁的中文直接回答问题，给出具体数值，不要编造结果中没有的数据。\n\n问题：{instruction}\n\n查询结果（共{rows}行）：\n{csv}",
            tag = QUERY_ANSWER_TAG,
            instruction = instruction,
            rows = result.row_count(),
            csv = result.head(self.answer_max_rows).to_csv()?,
        ))
    }

    async fn render(&self, result: DataTable, plan: &QueryPlan) -> AppResult<QueryOutcome> {
        let spec = plan
            .chart
            .clone()
            .ok_or_else(|| AppError::QueryAgent("chart plan without chart spec".to_string()))?;
        let dir = self.charts_dir.clone();

        // plotters draws synchronously
        let path = tokio::task::spawn_blocking(move || render_chart(&result, &spec, &dir))
            .await
            .map_err(|e| AppError::Internal(format!("chart task failed: {}", e)))??;

        Ok(QueryOutcome::Chart {
            path: path.to_string_lossy().into_owned(),
        })
    }
}

#[async_trait]
impl QueryAgent for LlmQueryAgent {
    async fn query(&self, data: &DataTable, instruction: &str, mode: QueryMode) -> AppResult<QueryOutcome> {
        let prompt = Self::create_plan_prompt(data, instruction, mode)?;
        let raw = self.llm.call(&prompt).await?;
        debug!(raw_plan = %raw, "Query plan received");

        let plan = QueryPlan::parse(&raw)?;
        info!(kind = ?plan.kind, mode = ?mode, filters = plan.filters.len(), "Executing query plan");

        if let PlanKind::Unsupported = plan.kind {
            return Ok(QueryOutcome::Unsupported {
                reason: plan
                    .reason
                    .unwrap_or_else(|| "该问题无法基于当前数据回答".to_string()),
            });
        }

        // Extraction must come back as the matched rows with every column
        if mode == QueryMode::BroadExtraction {
            if plan.kind != PlanKind::Table {
                warn!(kind = ?plan.kind, "Extraction plan was not a table plan, coercing");
            }
            let extraction = QueryPlan {
                kind: PlanKind::Table,
                filters: plan.filters,
                group_by: Vec::new(),
                aggregations: Vec::new(),
                columns: Vec::new(),
                sort: plan.sort,
                limit: None,
                chart: None,
                reason: None,
            };
            return Ok(QueryOutcome::Table {
                table: extraction.execute(data)?,
            });
        }

        let result = plan.execute(data)?;
        match plan.kind {
            PlanKind::Chart => self.render(result, &plan).await,
            PlanKind::Text => {
                let prompt = self.create_answer_prompt(instruction, &result)?;
                let answer = self.llm.call(&prompt).await?;
                Ok(QueryOutcome::Text {
                    text: normalize_markdown(&answer),
                })
            }
            PlanKind::Table | PlanKind::Unsupported => Ok(QueryOutcome::Table { table: result }),
        }
    }
}

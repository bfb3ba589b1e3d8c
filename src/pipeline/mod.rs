//! Pipeline Router / Orchestrator
//!
//! One question in, an ordered list of [`ResponseArtifact`]s out:
//!
//! ```text
//! Idle ─→ IntentDetected ─┬─ narrative + deep_analysis ─→ DeepAnalysis ──────┐
//!                         └─ otherwise ─────────────────→ DirectProcessing ──┴─→ Responding ─→ Idle
//! ```
//!
//! `run_turn` never fails. Classifier failures fall back silently, data-path
//! outcomes become warning/error artifacts, and any failed upstream call ends
//! the turn with one error artifact after whatever was already produced.

pub mod artifact;

pub use artifact::{ArtifactPayload, NoticeLevel, ResponseArtifact};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::agents::prompts;
use crate::agents::{
    AnalysisDepth, ColumnDescriber, DepthClassifier, ExtractionOutcome, Extractor, GuidanceGenerator, Intent, IntentClassifier,
    IntentSet, QuerySimplifier, ReportGenerator,
};
use crate::config::{LLMConfig, PipelineConfig};
use crate::dataset::{detect_date_column, parse_number, ColumnDescription, DataTable};
use crate::llm::LLM;
use crate::query::{LlmQueryAgent, QueryAgent, QueryMode, QueryOutcome};
use crate::types::{AppError, AppResult};

const NO_MATCHING_DATA: &str = "没有找到与问题匹配的数据，请检查问题中的日期、指标名称是否与数据一致。";
const EXTRACTION_NOT_TABLE: &str = "数据提取没有返回表格结果，无法继续分析。";
const UPSTREAM_FAILURE: &str = "分析过程中出现错误，请稍后重试或换一种问法。";
const UNSUPPORTED_ANSWER: &str = "无法基于当前数据完成该请求";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IntentClassification,
    DepthClassification,
    ExtractionSimplifier,
    Extraction,
    Guidance,
    Report,
    PlotInstruction,
    PlotQuery,
    TableInstruction,
    TableQuery,
    TextQuery,
    VariableChart,
    VariableTrend,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::IntentClassification => "intent_classification",
            Stage::DepthClassification => "depth_classification",
            Stage::ExtractionSimplifier => "extraction_simplifier",
            Stage::Extraction => "extraction",
            Stage::Guidance => "guidance",
            Stage::Report => "report",
            Stage::PlotInstruction => "plot_instruction",
            Stage::PlotQuery => "plot_query",
            Stage::TableInstruction => "table_instruction",
            Stage::TableQuery => "table_query",
            Stage::TextQuery => "text_query",
            Stage::VariableChart => "variable_chart",
            Stage::VariableTrend => "variable_trend",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    DeepAnalysis,
    DirectProcessing,
    VariableExploration,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub intents: IntentSet,
    /// Only classified when narrative is requested
    pub depth: Option<AnalysisDepth>,
    pub route: Route,
    /// Stages of the reported branches, in artifact order
    pub stages: Vec<Stage>,
    pub artifacts: Vec<ResponseArtifact>,
}

struct StageFailure {
    stage: Stage,
    error: AppError,
}

/// What one branch produced before it finished or failed
struct BranchOutput {
    /// Intent an error artifact of this branch answers
    source: Intent,
    stages: Vec<Stage>,
    artifacts: Vec<ResponseArtifact>,
    failure: Option<StageFailure>,
}

impl BranchOutput {
    fn new(source: Intent) -> Self {
        Self {
            source,
            stages: Vec::new(),
            artifacts: Vec::new(),
            failure: None,
        }
    }

    async fn step<T>(&mut self, stage: Stage, fut: impl Future<Output = AppResult<T>>) -> Result<T, StageFailure> {
        self.stages.push(stage);
        fut.await.map_err(|error| StageFailure { stage, error })
    }

    fn finish(mut self, result: Result<(), StageFailure>) -> Self {
        if let Err(failure) = result {
            self.failure = Some(failure);
        }
        self
    }
}

fn outcome_artifact(source: Intent, outcome: QueryOutcome) -> ResponseArtifact {
    match outcome {
        QueryOutcome::Table { table } => ResponseArtifact::table(source, table),
        QueryOutcome::Chart { path } => ResponseArtifact::image(source, path),
        QueryOutcome::Text { text } => ResponseArtifact::text(source, text),
        QueryOutcome::Unsupported { reason } => {
            ResponseArtifact::text(source, format!("{}：{}", UNSUPPORTED_ANSWER, reason))
        }
    }
}

/// Concatenate branch results in order. Branches after a failed one are not
/// reported; the failed one ends with an error artifact.
fn merge_branches(branches: Vec<BranchOutput>, stages: &mut Vec<Stage>) -> Vec<ResponseArtifact> {
    let mut artifacts = Vec::new();
    for branch in branches {
        stages.extend(branch.stages);
        artifacts.extend(branch.artifacts);
        if let Some(failure) = branch.failure {
            error!(
                stage = failure.stage.as_str(),
                error = %failure.error,
                "Pipeline stage failed"
            );
            artifacts.push(ResponseArtifact::error(
                branch.source,
                UPSTREAM_FAILURE,
                Some(format!("{}: {}", failure.stage.as_str(), failure.error)),
            ));
            break;
        }
    }
    artifacts
}

pub struct Pipeline {
    llm: LLM,
    agent: Arc<dyn QueryAgent>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(llm: LLM, agent: Arc<dyn QueryAgent>, config: PipelineConfig) -> Self {
        Self { llm, agent, config }
    }

    /// Pipeline bound to the given model, answering through [`LlmQueryAgent`]
    pub fn from_config(llm_config: &LLMConfig, config: PipelineConfig) -> Self {
        let llm = LLM::new(llm_config, &config);
        let agent = LlmQueryAgent::new(llm.clone(), config.charts_dir.clone());
        Self::new(llm, Arc::new(agent), config)
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// The core entry point: ordered artifacts for one question
    pub async fn handle_question(&self, data: &DataTable, question: &str) -> Vec<ResponseArtifact> {
        self.run_turn(data, question).await.artifacts
    }

    /// Run one question through classification, routing and the selected
    /// branch. `data` is only read.
    pub async fn run_turn(&self, data: &DataTable, question: &str) -> TurnReport {
        info!(
            question_len = question.chars().count(),
            rows = data.row_count(),
            model = %self.llm.model(),
            "Turn started"
        );

        let mut stages = vec![Stage::IntentClassification];
        let intents = IntentClassifier::classify(&self.llm, question).await;

        let depth = if intents.contains(&Intent::Narrative) {
            stages.push(Stage::DepthClassification);
            Some(DepthClassifier::classify(&self.llm, question).await)
        } else {
            None
        };

        let (route, branches) = if depth == Some(AnalysisDepth::DeepAnalysis) {
            info!(intents = ?intents, "Routing to deep analysis");
            (Route::DeepAnalysis, vec![self.deep_analysis(data, question, &intents).await])
        } else {
            info!(intents = ?intents, "Routing to direct processing");
            (Route::DirectProcessing, self.direct_processing(data, question, &intents).await)
        };

        let artifacts = merge_branches(branches, &mut stages);

        info!(route = ?route, artifacts = artifacts.len(), "Turn completed");
        TurnReport {
            intents,
            depth,
            route,
            stages,
            artifacts,
        }
    }

    /// Explore one numeric column: its chart over the date column, then a
    /// trend narrative, both answered by the query agent. Errors only when
    /// `variable` is not a numeric column of `data`; agent failures end the
    /// report with an error artifact like a question turn does.
    pub async fn explore_variable(&self, data: &DataTable, variable: &str) -> AppResult<TurnReport> {
        let variable = variable.trim();
        let idx = data
            .column_index(variable)
            .ok_or_else(|| AppError::InvalidRequest(format!("unknown column '{}'", variable)))?;
        if !data.column_values(idx).any(|cell| parse_number(cell).is_some()) {
            return Err(AppError::InvalidRequest(format!("column '{}' has no numeric values", variable)));
        }
        let date_column = detect_date_column(data)
            .filter(|date_idx| *date_idx != idx)
            .map(|date_idx| data.columns()[date_idx].as_str());

        info!(variable = variable, date_column = ?date_column, "Variable exploration started");

        let mut out = BranchOutput::new(Intent::Plot);
        let result = self.run_exploration(data, variable, date_column, &mut out).await;
        let mut stages = Vec::new();
        let artifacts = merge_branches(vec![out.finish(result)], &mut stages);

        info!(variable = variable, artifacts = artifacts.len(), "Variable exploration completed");
        Ok(TurnReport {
            intents: IntentSet::from([Intent::Plot, Intent::Narrative]),
            depth: None,
            route: Route::VariableExploration,
            stages,
            artifacts,
        })
    }

    async fn run_exploration(
        &self,
        data: &DataTable,
        variable: &str,
        date_column: Option<&str>,
        out: &mut BranchOutput,
    ) -> Result<(), StageFailure> {
        let chart_instruction = prompts::variable_chart_instruction(variable, date_column);
        let chart = out
            .step(
                Stage::VariableChart,
                self.bounded(self.agent.query(data, &chart_instruction, QueryMode::Direct)),
            )
            .await?;
        out.artifacts.push(outcome_artifact(Intent::Plot, chart));

        out.source = Intent::Narrative;
        let trend_instruction = prompts::variable_trend_instruction(variable);
        let trend = out
            .step(
                Stage::VariableTrend,
                self.bounded(self.agent.query(data, &trend_instruction, QueryMode::Direct)),
            )
            .await?;
        out.artifacts.push(outcome_artifact(Intent::Narrative, trend));
        Ok(())
    }

    /// Model-written notes for the dataset profile
    pub async fn describe_columns(&self, data: &DataTable) -> AppResult<Vec<ColumnDescription>> {
        ColumnDescriber::describe(&self.llm, data).await
    }

    /// Bound a query-agent call by the configured timeout
    async fn bounded<T>(&self, fut: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        let secs = self.config.query_timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout {
                stage: "query agent call".to_string(),
                secs,
            }),
        }
    }

    async fn deep_analysis(&self, data: &DataTable, question: &str, intents: &IntentSet) -> BranchOutput {
        let mut out = BranchOutput::new(Intent::Narrative);
        let result = self.run_deep_analysis(data, question, intents, &mut out).await;
        out.finish(result)
    }

    async fn run_deep_analysis(
        &self,
        data: &DataTable,
        question: &str,
        intents: &IntentSet,
        out: &mut BranchOutput,
    ) -> Result<(), StageFailure> {
        let instruction = out
            .step(
                Stage::ExtractionSimplifier,
                QuerySimplifier::extraction_instruction(&self.llm, question),
            )
            .await?;

        let extracted = out
            .step(
                Stage::Extraction,
                self.bounded(Extractor::extract(self.agent.as_ref(), data, &instruction)),
            )
            .await?;

        let table = match extracted {
            ExtractionOutcome::Rows(table) => table,
            ExtractionOutcome::Empty => {
                out.artifacts.push(ResponseArtifact::warning(Intent::Narrative, NO_MATCHING_DATA));
                return Ok(());
            }
            ExtractionOutcome::TypeMismatch { received, detail } => {
                out.artifacts.push(ResponseArtifact::error(
                    Intent::Narrative,
                    EXTRACTION_NOT_TABLE,
                    Some(format!("extraction returned {}: {}", received, detail)),
                ));
                return Ok(());
            }
        };
        out.artifacts.push(ResponseArtifact::table(Intent::Narrative, table.clone()));

        let guidance = match out
            .step(
                Stage::Guidance,
                GuidanceGenerator::generate(&self.llm, question, &table, self.config.guidance_sample_rows),
            )
            .await
        {
            Ok(guidance) => guidance,
            Err(failure) => {
                warn!(error = %failure.error, "Guidance failed, reporting from the question alone");
                question.to_string()
            }
        };

        let report = out
            .step(
                Stage::Report,
                ReportGenerator::generate(&self.llm, question, &guidance, &table, self.config.report_max_rows),
            )
            .await?;
        out.artifacts.push(ResponseArtifact::text(Intent::Narrative, report));

        if intents.contains(&Intent::Plot) {
            // Chart from the rows already extracted
            out.source = Intent::Plot;
            self.run_direct(Intent::Plot, &table, question, out).await?;
        }
        Ok(())
    }

    /// Independent plot, table and text branches, reported in that order
    async fn direct_processing(&self, data: &DataTable, question: &str, intents: &IntentSet) -> Vec<BranchOutput> {
        let branch = move |intent: Intent| async move {
            if intents.contains(&intent) {
                Some(self.direct_branch(intent, data, question).await)
            } else {
                None
            }
        };

        let (plot, table, text) = if self.config.concurrent_branches {
            futures::join!(
                branch(Intent::Plot),
                branch(Intent::Table),
                branch(Intent::Narrative)
            )
        } else {
            (
                branch(Intent::Plot).await,
                branch(Intent::Table).await,
                branch(Intent::Narrative).await,
            )
        };

        [plot, table, text].into_iter().flatten().collect()
    }

    async fn direct_branch(&self, intent: Intent, data: &DataTable, question: &str) -> BranchOutput {
        let mut out = BranchOutput::new(intent);
        let result = self.run_direct(intent, data, question, &mut out).await;
        out.finish(result)
    }

    async fn run_direct(
        &self,
        intent: Intent,
        data: &DataTable,
        question: &str,
        out: &mut BranchOutput,
    ) -> Result<(), StageFailure> {
        let (instruction, query_stage) = match intent {
            Intent::Plot => (
                out.step(Stage::PlotInstruction, QuerySimplifier::plot_instruction(&self.llm, question))
                    .await?,
                Stage::PlotQuery,
            ),
            Intent::Table => (
                out.step(Stage::TableInstruction, QuerySimplifier::table_instruction(&self.llm, question))
                    .await?,
                Stage::TableQuery,
            ),
            Intent::Narrative => (question.to_string(), Stage::TextQuery),
        };

        // The intent was classified, so an empty extractor answer still gets a query
        let instruction = if instruction.is_empty() {
            question.to_string()
        } else {
            instruction
        };

        let outcome = out
            .step(
                query_stage,
                self.bounded(self.agent.query(data, &instruction, QueryMode::Direct)),
            )
            .await?;
        info!(intent = %intent, outcome = outcome.kind(), "Direct query answered");

        out.artifacts.push(outcome_artifact(intent, outcome));
        Ok(())
    }
}

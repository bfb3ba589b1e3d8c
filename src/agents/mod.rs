//! Pipeline Stages
//!
//! The language-model-backed stages that the orchestrator sequences:
//!
//! - **Intent Classifier**: which modalities (plot, table, narrative) are wanted
//! - **Depth Classifier**: direct lookup or multi-step analysis
//! - **Query Simplifier**: extraction, plot and table sub-instructions
//! - **Extractor**: broadened data retrieval through the query agent
//! - **Guidance Generator**: short analysis plan from a table sample
//! - **Report Generator**: final Markdown report from the full table
//! - **Column Describer**: one-line notes per column for the dataset profile
//!
//! ## Deep analysis flow
//!
//! ```text
//! Question
//!    │
//!    ▼
//! ┌──────────────┐
//! │  Simplifier  │  → broadened extraction instruction
//! └──────────────┘
//!    │
//!    ▼
//! ┌──────────────┐
//! │  Extractor   │  → matched rows, every column
//! └──────────────┘
//!    │
//!    ▼
//! ┌──────────────┐
//! │   Guidance   │  → analysis plan (head sample only)
//! └──────────────┘
//!    │
//!    ▼
//! ┌──────────────┐
//! │    Report    │  → Markdown report
//! └──────────────┘
//! ```

pub mod columns;
pub mod depth;
pub mod extraction;
pub mod guidance;
pub mod intent;
pub mod prompts;
pub mod report;
pub mod simplifier;

pub use columns::{parse_column_descriptions, ColumnDescriber};
pub use depth::{AnalysisDepth, DepthClassifier};
pub use extraction::{ExtractionOutcome, Extractor};
pub use guidance::GuidanceGenerator;
pub use intent::{parse_intent_tokens, Intent, IntentClassifier, IntentSet};
pub use report::ReportGenerator;
pub use simplifier::QuerySimplifier;

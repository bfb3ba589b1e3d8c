//! Analysis-Depth Classifier

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::prompts;
use crate::llm::LLM;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    SimpleLookup,
    DeepAnalysis,
}

impl AnalysisDepth {
    /// Exact label match after trimming, lowercasing and unquoting
    pub fn parse(raw: &str) -> Option<Self> {
        let label = crate::utils::strip_code_fence(raw)
            .trim_matches(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '`' || c == '.' || c == '。')
            .to_lowercase();
        match label.as_str() {
            "simple_lookup" => Some(AnalysisDepth::SimpleLookup),
            "deep_analysis" => Some(AnalysisDepth::DeepAnalysis),
            _ => None,
        }
    }
}

pub struct DepthClassifier;

impl DepthClassifier {
    /// Anything but a clean `simple_lookup` answer is a deep analysis.
    pub async fn classify(llm: &LLM, question: &str) -> AnalysisDepth {
        let raw = match llm.call(&prompts::depth_prompt(question)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Depth classification failed, defaulting to deep analysis");
                return AnalysisDepth::DeepAnalysis;
            }
        };
        debug!(raw = %raw, "Depth classifier output");

        let depth = AnalysisDepth::parse(&raw).unwrap_or_else(|| {
            warn!(raw = %raw, "Unrecognized depth label, defaulting to deep analysis");
            AnalysisDepth::DeepAnalysis
        });
        info!(depth = ?depth, "Depth classified");
        depth
    }
}

//! Intent Classifier
//!
//! Decides which output modalities a question asks for. The model's answer is
//! parsed by [`parse_intent_tokens`], which accepts, in order of preference:
//!
//! 1. a JSON object of boolean flags: `{"plot": true, "table": false}`
//! 2. a JSON array of tokens: `["plot", "string"]`
//! 3. a comma/whitespace separated token list: `plot, dataframe`
//! 4. a keyword scan of free text: `这个问题需要一个折线图`
//!
//! Anything that yields nothing, and every failed call, becomes `{narrative}`.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::prompts;
use crate::llm::LLM;

/// Requested output modality. The declaration order is the canonical
/// artifact order: plot, then table, then narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Plot,
    Table,
    Narrative,
}

impl Intent {
    pub const ALL: [Intent; 3] = [Intent::Plot, Intent::Table, Intent::Narrative];

    /// Map one answer token to an intent. Accepts the labels of the query
    /// agent's output types (`dataframe`, `string`) as well.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c == '。')
            .to_lowercase();
        match token.as_str() {
            "plot" | "chart" | "graph" | "image" | "图" | "图表" | "绘图" => Some(Intent::Plot),
            "table" | "dataframe" | "df" | "表" | "表格" => Some(Intent::Table),
            "narrative" | "string" | "text" | "文字" | "文本" => Some(Intent::Narrative),
            _ => None,
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Intent::Plot => &["plot", "chart", "图表", "折线图", "柱状图", "条形图", "饼图", "散点图", "绘图", "画图"],
            Intent::Table => &["table", "dataframe", "表格"],
            Intent::Narrative => &["narrative", "string", "text", "文字"],
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Plot => write!(f, "plot"),
            Intent::Table => write!(f, "table"),
            Intent::Narrative => write!(f, "narrative"),
        }
    }
}

/// Non-empty after classification; iterates in canonical order.
pub type IntentSet = BTreeSet<Intent>;

/// Parse a classifier answer into intents. Unrecognized tokens are dropped;
/// the result may be empty.
pub fn parse_intent_tokens(raw: &str) -> IntentSet {
    let text = crate::utils::strip_code_fence(raw);

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        match value {
            serde_json::Value::Object(flags) => {
                return flags
                    .iter()
                    .filter(|(_, v)| is_truthy(v))
                    .filter_map(|(k, _)| Intent::from_token(k))
                    .collect();
            }
            serde_json::Value::Array(items) => {
                return items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(Intent::from_token)
                    .collect();
            }
            serde_json::Value::String(s) => return parse_token_list(&s),
            _ => {}
        }
    }

    let listed = parse_token_list(text);
    if !listed.is_empty() {
        return listed;
    }

    let lowered = text.to_lowercase();
    Intent::ALL
        .into_iter()
        .filter(|intent| intent.keywords().iter().any(|k| lowered.contains(k)))
        .collect()
}

fn parse_token_list(text: &str) -> IntentSet {
    text.split(|c: char| c == ',' || c == '，' || c == '、' || c == ';' || c.is_whitespace())
        .filter_map(Intent::from_token)
        .collect()
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        serde_json::Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

pub struct IntentClassifier;

impl IntentClassifier {
    /// Never fails: any error or empty parse falls back to `{narrative}`.
    pub async fn classify(llm: &LLM, question: &str) -> IntentSet {
        let raw = match llm.call(&prompts::intent_prompt(question)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Intent classification failed, falling back to narrative");
                return IntentSet::from([Intent::Narrative]);
            }
        };
        debug!(raw = %raw, "Intent classifier output");

        let mut intents = parse_intent_tokens(&raw);
        if intents.is_empty() {
            warn!(raw = %raw, "No intent recognized, falling back to narrative");
            intents.insert(Intent::Narrative);
        }

        info!(intents = ?intents, "Intents classified");
        intents
    }
}

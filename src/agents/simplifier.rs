//! Query Simplifier / Request Decomposer
//!
//! Three single-call rewrites of the question, one per target:
//! - extraction: every column for the entities named, widened explicitly
//! - plot: only the charting part, empty when there is none
//! - table: only the tabular part, empty when the question is plot-only

use tracing::{debug, info};

use super::prompts::{self, EXTRACTION_WIDENING, NO_INSTRUCTION};
use crate::llm::LLM;
use crate::types::AppResult;

/// First non-empty line of the answer, without fences, quotes or an
/// `输出：` prefix copied from the prompt examples.
fn clean_instruction(raw: &str) -> String {
    let body = crate::utils::strip_code_fence(raw);
    let line = body.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
    let line = line
        .strip_prefix("输出：")
        .or_else(|| line.strip_prefix("输出:"))
        .unwrap_or(line);
    line.trim()
        .trim_matches(|c: char| c == '"' || c == '“' || c == '”' || c == '`')
        .trim()
        .to_string()
}

fn is_no_instruction(instruction: &str) -> bool {
    let lowered = instruction.trim_end_matches(|c: char| c == '.' || c == '。').to_lowercase();
    lowered.is_empty() || lowered == NO_INSTRUCTION.to_lowercase() || lowered == "无"
}

/// Add the column-widening clause unless it is already there
pub fn widen_extraction(instruction: &str) -> String {
    let instruction = instruction.trim();
    if instruction.ends_with(EXTRACTION_WIDENING) {
        instruction.to_string()
    } else {
        format!("{}{}", instruction, EXTRACTION_WIDENING)
    }
}

pub struct QuerySimplifier;

impl QuerySimplifier {
    /// Broadened data-extraction instruction. An empty rewrite falls back to
    /// the question itself; the widening clause is always present.
    pub async fn extraction_instruction(llm: &LLM, question: &str) -> AppResult<String> {
        let raw = llm.call(&prompts::extraction_prompt(question)).await?;
        let rewritten = clean_instruction(&raw);
        debug!(raw = %raw, "Extraction simplifier output");

        let base = if rewritten.is_empty() { question } else { rewritten.as_str() };
        let instruction = widen_extraction(base);
        info!(instruction = %instruction, "Extraction instruction ready");
        Ok(instruction)
    }

    /// Charting part of the question; `""` when there is none
    pub async fn plot_instruction(llm: &LLM, question: &str) -> AppResult<String> {
        let raw = llm.call(&prompts::plot_instruction_prompt(question)).await?;
        let instruction = clean_instruction(&raw);
        debug!(raw = %raw, "Plot instruction extractor output");
        Ok(if is_no_instruction(&instruction) { String::new() } else { instruction })
    }

    /// Tabular part of the question; `""` when the question is plot-only
    pub async fn table_instruction(llm: &LLM, question: &str) -> AppResult<String> {
        let raw = llm.call(&prompts::table_instruction_prompt(question)).await?;
        let instruction = clean_instruction(&raw);
        debug!(raw = %raw, "Table instruction extractor output");
        Ok(if is_no_instruction(&instruction) { String::new() } else { instruction })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::prompts::{EXTRACTION_TAG, PLOT_INSTRUCTION_TAG, TABLE_INSTRUCTION_TAG};
    use crate::testing::ScriptedLLM;
    use std::sync::Arc;

    #[test]
    fn test_clean_instruction() {
        assert_eq!(clean_instruction("  输出：画出折线图\n"), "画出折线图");
        assert_eq!(clean_instruction("```\n\"画出折线图\"\n```"), "画出折线图");
        assert_eq!(clean_instruction("\n\n第一行\n第二行"), "第一行");
        assert_eq!(clean_instruction(""), "");
    }

    #[test]
    fn test_no_instruction_markers() {
        assert!(is_no_instruction(""));
        assert!(is_no_instruction("NONE"));
        assert!(is_no_instruction("none"));
        assert!(is_no_instruction("无"));
        assert!(!is_no_instruction("画出折线图"));
    }

    #[test]
    fn test_widening_is_idempotent() {
        let once = widen_extraction("提取日期为2025-06-01的全部数据");
        assert!(once.ends_with(EXTRACTION_WIDENING));
        assert_eq!(widen_extraction(&once), once);
    }

    #[tokio::test]
    async fn test_extraction_instruction_is_widened() {
        let llm = Arc::new(ScriptedLLM::new().on(EXTRACTION_TAG, "输出：提取日期为2025-06-01和2025-05-01的全部数据"));
        let instruction = QuerySimplifier::extraction_instruction(&llm.llm(), "分析下为什么6月1日收入比5月1日低")
            .await
            .unwrap();
        assert_eq!(
            instruction,
            format!("提取日期为2025-06-01和2025-05-01的全部数据{}", EXTRACTION_WIDENING)
        );
    }

    #[tokio::test]
    async fn test_empty_extraction_rewrite_uses_question() {
        let llm = Arc::new(ScriptedLLM::new().on(EXTRACTION_TAG, "   "));
        let instruction = QuerySimplifier::extraction_instruction(&llm.llm(), "为什么6月收入低")
            .await
            .unwrap();
        assert_eq!(instruction, format!("为什么6月收入低{}", EXTRACTION_WIDENING));
    }

    #[tokio::test]
    async fn test_plot_instruction_empty_without_chart_request() {
        let llm = Arc::new(ScriptedLLM::new().on(PLOT_INSTRUCTION_TAG, "NONE"));
        let instruction = QuerySimplifier::plot_instruction(&llm.llm(), "哪天总收入最高").await.unwrap();
        assert_eq!(instruction, "");
    }

    #[tokio::test]
    async fn test_plot_instruction_is_deterministic_and_stable() {
        let llm = Arc::new(ScriptedLLM::new().on(PLOT_INSTRUCTION_TAG, "画出2025年3月到6月每个月月均总收入的折线图"));
        let question = "计算下3到6月每个月的月均总收入，并画出折线图";

        let first = QuerySimplifier::plot_instruction(&llm.llm(), question).await.unwrap();
        let second = QuerySimplifier::plot_instruction(&llm.llm(), question).await.unwrap();
        assert_eq!(first, second);

        // Feeding the instruction back yields the same instruction
        let again = QuerySimplifier::plot_instruction(&llm.llm(), &first).await.unwrap();
        assert_eq!(again, first);
    }

    #[tokio::test]
    async fn test_table_instruction_empty_for_plot_only() {
        let llm = Arc::new(ScriptedLLM::new().on(TABLE_INSTRUCTION_TAG, "无"));
        let instruction = QuerySimplifier::table_instruction(&llm.llm(), "请画出3月到6月月均总收入的折线图")
            .await
            .unwrap();
        assert!(instruction.is_empty());
    }

    #[tokio::test]
    async fn test_extractor_failure_propagates() {
        let llm = Arc::new(ScriptedLLM::new().fail_on(TABLE_INSTRUCTION_TAG, "503"));
        assert!(QuerySimplifier::table_instruction(&llm.llm(), "q").await.is_err());
    }
}

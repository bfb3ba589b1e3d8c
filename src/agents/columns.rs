//! Column Describer
//!
//! Asks the model for a one-line description of every column, shown with the
//! dataset profile. Answers naming unknown columns are ignored.

use tracing::info;

use super::prompts;
use crate::dataset::{ColumnDescription, DataTable};
use crate::llm::LLM;
use crate::types::{AppError, AppResult};

const SAMPLE_ROWS: usize = 5;

pub struct ColumnDescriber;

impl ColumnDescriber {
    pub async fn describe(llm: &LLM, table: &DataTable) -> AppResult<Vec<ColumnDescription>> {
        let prompt = prompts::column_description_prompt(table.columns(), &table.head(SAMPLE_ROWS).to_csv()?);
        let raw = llm.call(&prompt).await?;

        let descriptions = parse_column_descriptions(&raw, table.columns());
        if descriptions.is_empty() {
            return Err(AppError::LLMApi("column describer returned no usable description".to_string()));
        }
        info!(described = descriptions.len(), columns = table.column_count(), "Columns described");
        Ok(descriptions)
    }
}

/// Accepts a JSON array of `{column, description}` objects, or one
/// `列名: 说明` pair per line (Markdown table rows too). Result follows
/// `columns` order, one entry per known column at most.
pub fn parse_column_descriptions(raw: &str, columns: &[String]) -> Vec<ColumnDescription> {
    let text = crate::utils::strip_code_fence(raw);

    let pairs: Vec<(String, String)> = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let column = item.get("column")?.as_str()?;
                let description = item.get("description")?.as_str()?;
                Some((column.to_string(), description.to_string()))
            })
            .collect(),
        Ok(serde_json::Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|d| (k.clone(), d.to_string())))
            .collect(),
        _ => text.lines().filter_map(split_line).collect(),
    };

    columns
        .iter()
        .filter_map(|column| {
            pairs
                .iter()
                .find(|(name, description)| name.trim() == column && !description.trim().is_empty())
                .map(|(_, description)| ColumnDescription {
                    column: column.clone(),
                    description: description.trim().to_string(),
                })
        })
        .collect()
}

fn split_line(line: &str) -> Option<(String, String)> {
    let line = line.trim().trim_start_matches(['-', '*']).trim();
    if line.starts_with('|') {
        let cells: Vec<&str> = line.trim_matches('|').split('|').map(str::trim).collect();
        return match cells.as_slice() {
            [name, description, ..] => Some((name.to_string(), description.to_string())),
            _ => None,
        };
    }
    let (name, description) = line.split_once(['：', ':'])?;
    Some((name.trim().to_string(), description.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::prompts::COLUMN_DESCRIPTION_TAG;
    use crate::testing::{revenue_table, ScriptedLLM};
    use std::sync::Arc;

    fn columns() -> Vec<String> {
        vec!["日期".to_string(), "总收入".to_string(), "DAU".to_string()]
    }

    #[test]
    fn test_parse_json_array_in_column_order() {
        let raw = r#"```json
[{"column": "总收入", "description": "当日总收入"}, {"column": "日期", "description": "统计日期"},
 {"column": "利润", "description": "不存在的列"}]
```"#;
        let parsed = parse_column_descriptions(raw, &columns());
        assert_eq!(
            parsed,
            vec![
                ColumnDescription {
                    column: "日期".to_string(),
                    description: "统计日期".to_string()
                },
                ColumnDescription {
                    column: "总收入".to_string(),
                    description: "当日总收入".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_parse_lines_and_markdown_rows() {
        let raw = "| 列名 | 描述 |\n|---|---|\n| 日期 | 统计日期 |\n- DAU：日活跃用户数";
        let parsed = parse_column_descriptions(raw, &columns());
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].description, "统计日期");
        assert_eq!(parsed[1].column, "DAU");
        assert_eq!(parsed[1].description, "日活跃用户数");
    }

    #[tokio::test]
    async fn test_describe_uses_header_and_sample() {
        let llm = Arc::new(ScriptedLLM::new().on(
            COLUMN_DESCRIPTION_TAG,
            r#"[{"column": "DAU", "description": "日活跃用户数"}]"#,
        ));
        let described = ColumnDescriber::describe(&llm.llm(), &revenue_table()).await.unwrap();
        assert_eq!(described.len(), 1);
        assert!(llm.prompts()[0].contains("Web充值收入"));
    }

    #[tokio::test]
    async fn test_unusable_answer_is_error() {
        let llm = Arc::new(ScriptedLLM::new().on(COLUMN_DESCRIPTION_TAG, "我无法回答"));
        assert!(ColumnDescriber::describe(&llm.llm(), &revenue_table()).await.is_err());
    }
}

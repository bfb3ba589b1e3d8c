//! Dataset Loader
//!
//! Turns uploaded CSV text into a cleaned [`DataTable`]:
//! - column names normalized to letters, digits (any script) and `_`
//! - the date column detected and its cells rewritten as `YYYY-MM-DD`
//!
//! Encoding detection is not done here; input must be UTF-8.

pub mod profile;
pub mod table;

pub use profile::{ColumnDescription, DatasetProfile, DescriptiveStat};
pub use table::{format_number, parse_number, DataTable};

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use csv::ReaderBuilder;
use tracing::{debug, info};

use crate::types::{AppError, AppResult};

/// Canonical name given to the detected date column
pub const DATE_COLUMN: &str = "日期";

const DATE_COLUMN_NAMES: [&str; 8] = ["日期", "date", "time", "datetime", "时间", "日", "年月日", "行为时间"];

/// Load and clean a CSV file from disk
pub fn load_csv_path(path: &Path) -> anyhow::Result<DataTable> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    let table = load_csv_str(&text).with_context(|| format!("Failed to parse dataset {}", path.display()))?;
    info!(
        path = %path.display(),
        rows = table.row_count(),
        columns = table.column_count(),
        "Dataset loaded"
    );
    Ok(table)
}

/// Parse CSV text (header row required) and clean it
pub fn load_csv_str(text: &str) -> AppResult<DataTable> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let raw_headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    if raw_headers.is_empty() || raw_headers.iter().all(|h| h.trim().is_empty()) {
        return Err(AppError::Dataset("CSV has no header row".to_string()));
    }

    let width = raw_headers.len();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let mut row: Vec<String> = record.iter().take(width).map(|c| c.trim().to_string()).collect();
        row.resize(width, String::new());
        rows.push(row);
    }

    let mut table = DataTable::new(normalize_column_names(&raw_headers), rows)?;
    normalize_date_column(&mut table);
    Ok(table)
}

/// Trim, turn spaces into `_`, drop anything that is not alphanumeric or
/// `_`. Empty results become `column_{n}`; repeats get `_2`, `_3`, ...
pub fn normalize_column_names(raw: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    raw.iter()
        .enumerate()
        .map(|(idx, name)| {
            let cleaned: String = name
                .trim()
                .replace(' ', "_")
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            let base = if cleaned.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                cleaned
            };

            let mut candidate = base.clone();
            let mut suffix = 2;
            while seen.contains(&candidate) {
                candidate = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            seen.insert(candidate.clone());
            candidate
        })
        .collect()
}

/// Parse a date cell. Accepts `2025-06-01`, `2025/6/1`, `2025.06.01` and
/// `20250601`, optionally followed by a time part.
pub fn parse_date(cell: &str) -> Option<NaiveDate> {
    let date_part = cell.trim().split([' ', 'T']).next()?;
    if date_part.is_empty() {
        return None;
    }

    if date_part.len() == 8 && date_part.chars().all(|c| c.is_ascii_digit()) {
        let year: i32 = date_part[0..4].parse().ok()?;
        let month: u32 = date_part[4..6].parse().ok()?;
        let day: u32 = date_part[6..8].parse().ok()?;
        if !(1900..=2100).contains(&year) {
            return None;
        }
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Find the date column: by well-known name first, then by content
pub fn detect_date_column(table: &DataTable) -> Option<usize> {
    for name in DATE_COLUMN_NAMES {
        if let Some(idx) = table
            .columns()
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
        {
            return Some(idx);
        }
    }

    (0..table.column_count()).find(|&idx| {
        let mut values = table.column_values(idx).filter(|v| !v.is_empty()).peekable();
        values.peek().is_some() && values.all(|v| parse_date(v).is_some())
    })
}

fn normalize_date_column(table: &mut DataTable) {
    let Some(idx) = detect_date_column(table) else {
        debug!("No date column detected");
        return;
    };

    table.map_column(idx, |cell| parse_date(cell).map(|d| d.format("%Y-%m-%d").to_string()));

    if table.column_index(DATE_COLUMN).is_none() {
        debug!(from = %table.columns()[idx], "Renaming date column");
        table.rename_column(idx, DATE_COLUMN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_normalize_column_names() {
        let raw = vec![
            " 总收入(元) ".to_string(),
            "Web 充值 收入".to_string(),
            "???".to_string(),
            "总收入元".to_string(),
        ];
        assert_eq!(
            normalize_column_names(&raw),
            vec!["总收入元", "Web_充值_收入", "column_3", "总收入元_2"]
        );
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 6, 1);
        assert_eq!(parse_date("2025-06-01"), expected);
        assert_eq!(parse_date("2025/6/1"), expected);
        assert_eq!(parse_date("20250601"), expected);
        assert_eq!(parse_date("2025-06-01 08:30:00"), expected);
        assert_eq!(parse_date("12345678"), None);
        assert_eq!(parse_date("收入"), None);
    }

    #[test]
    fn test_load_detects_and_renames_date_column() {
        let csv = "\u{feff}行为时间,总收入,充值人数\n20250501,1200,30\n2025/6/1,900,21\n";
        let table = load_csv_str(csv).unwrap();

        assert_eq!(table.columns()[0], DATE_COLUMN);
        assert_eq!(table.rows()[0][0], "2025-05-01");
        assert_eq!(table.rows()[1][0], "2025-06-01");
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_load_detects_date_column_by_content() {
        let csv = "day_key,revenue\n2025-05-01,10\n2025-05-02,12\n";
        let table = load_csv_str(csv).unwrap();
        assert_eq!(table.columns(), &[DATE_COLUMN.to_string(), "revenue".to_string()]);
    }

    #[test]
    fn test_load_pads_ragged_rows_and_skips_blank_lines() {
        let csv = "a,b,c\n1,2\n,,\n4,5,6,7\n";
        let table = load_csv_str(csv).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows()[0], vec!["1", "2", ""]);
        assert_eq!(table.rows()[1], vec!["4", "5", "6"]);
    }

    #[test]
    fn test_load_csv_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "日期,总收入").unwrap();
        writeln!(file, "2025-06-01,900").unwrap();

        let table = load_csv_path(file.path()).unwrap();
        assert_eq!(table.row_count(), 1);
        assert!(load_csv_path(Path::new("/nonexistent/data.csv")).is_err());
    }
}

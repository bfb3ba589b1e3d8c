//! In-memory table: ordered columns, ordered rows of text cells.
//!
//! Cells keep their source text; numeric and date interpretation happens at
//! the point of use (`parse_number`, `dataset::parse_date`).

use serde::{Deserialize, Serialize};

use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl DataTable {
    /// Build a table; every row must have exactly one cell per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> AppResult<Self> {
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(AppError::Dataset(format!(
                "row {} has {} cells, expected {}",
                idx + 1,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// A table with no rows is empty regardless of its columns
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().filter_map(move |r| r.get(idx).map(String::as_str))
    }

    pub fn head(&self, n: usize) -> DataTable {
        DataTable {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    pub(crate) fn rename_column(&mut self, idx: usize, name: impl Into<String>) {
        if let Some(col) = self.columns.get_mut(idx) {
            *col = name.into();
        }
    }

    pub(crate) fn map_column<F>(&mut self, idx: usize, mut f: F)
    where
        F: FnMut(&str) -> Option<String>,
    {
        for row in &mut self.rows {
            if let Some(cell) = row.get_mut(idx) {
                if let Some(updated) = f(cell) {
                    *cell = updated;
                }
            }
        }
    }

    /// Project onto `names`, in that order
    pub fn select(&self, names: &[String]) -> AppResult<DataTable> {
        let indices = names
            .iter()
            .map(|n| {
                self.column_index(n)
                    .ok_or_else(|| AppError::QueryAgent(format!("unknown column '{}'", n)))
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(DataTable {
            columns: names.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|r| indices.iter().map(|&i| r[i].clone()).collect())
                .collect(),
        })
    }

    /// Serialize as CSV with a header row
    pub fn to_csv(&self) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        let data = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV buffer flush failed: {}", e)))?;
        String::from_utf8(data).map_err(|e| AppError::Internal(format!("CSV output is not UTF-8: {}", e)))
    }
}

/// Parse a cell as a number, tolerating thousands separators.
pub fn parse_number(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Render a computed number: integers without a fraction, otherwise at most
/// four decimals with trailing zeros removed.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let s = format!("{:.4}", value);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

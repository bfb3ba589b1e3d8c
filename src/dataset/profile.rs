// Dataset profile shown after upload: sample rows, per-column statistics,
// missing and duplicate counts, and optionally model-written column notes.

use std::collections::HashSet;

use serde::Serialize;

use super::table::{parse_number, DataTable};

const SAMPLE_ROWS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct DescriptiveStat {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetProfile {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    pub date_column: Option<String>,
    pub sample: DataTable,
    pub descriptive_stats: Vec<DescriptiveStat>,
    pub missing_values: usize,
    pub duplicate_rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_descriptions: Option<Vec<ColumnDescription>>,
}

/// One row of the column-description table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescription {
    pub column: String,
    pub description: String,
}

impl DatasetProfile {
    pub fn build(table: &DataTable) -> Self {
        let date_column = super::detect_date_column(table);

        let missing_values = table
            .rows()
            .iter()
            .flat_map(|r| r.iter())
            .filter(|c| c.trim().is_empty())
            .count();

        let mut seen: HashSet<&[String]> = HashSet::new();
        let duplicate_rows = table
            .rows()
            .iter()
            .filter(|r| !seen.insert(r.as_slice()))
            .count();

        let descriptive_stats = (0..table.column_count())
            .filter(|idx| Some(*idx) != date_column)
            .filter_map(|idx| numeric_column(table, idx).map(|values| (idx, values)))
            .map(|(idx, values)| describe(&table.columns()[idx], values))
            .collect();

        Self {
            row_count: table.row_count(),
            column_count: table.column_count(),
            columns: table.columns().to_vec(),
            date_column: date_column.map(|idx| table.columns()[idx].clone()),
            sample: table.head(SAMPLE_ROWS),
            descriptive_stats,
            missing_values,
            duplicate_rows,
            column_descriptions: None,
        }
    }

    pub fn with_column_descriptions(mut self, descriptions: Vec<ColumnDescription>) -> Self {
        self.column_descriptions = Some(descriptions);
        self
    }
}

/// Values of a column whose non-empty cells are all numeric
fn numeric_column(table: &DataTable, idx: usize) -> Option<Vec<f64>> {
    let mut values = Vec::new();
    for cell in table.column_values(idx).filter(|c| !c.trim().is_empty()) {
        values.push(parse_number(cell)?);
    }
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

fn describe(column: &str, mut col: Vec<f64>) -> DescriptiveStat {
    col.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let count = col.len();
    let mean = col.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 0 {
        (col[count / 2 - 1] + col[count / 2]) / 2.0
    } else {
        col[count / 2]
    };
    DescriptiveStat {
        column: column.to_string(),
        count,
        mean,
        std_dev: std_dev(&col, mean),
        min: col[0],
        median,
        max: col[count - 1],
    }
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DataTable {
        DataTable::new(
            vec!["日期".into(), "渠道".into(), "总收入".into()],
            vec![
                vec!["2025-05-01".into(), "web".into(), "100".into()],
                vec!["2025-05-02".into(), "app".into(), "300".into()],
                vec!["2025-05-03".into(), "".into(), "200".into()],
                vec!["2025-05-02".into(), "app".into(), "300".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_profile_counts() {
        let profile = DatasetProfile::build(&table());
        assert_eq!(profile.row_count, 4);
        assert_eq!(profile.date_column.as_deref(), Some("日期"));
        assert_eq!(profile.missing_values, 1);
        assert_eq!(profile.duplicate_rows, 1);
        assert_eq!(profile.sample.row_count(), 4);
        assert!(profile.column_descriptions.is_none());
    }

    #[test]
    fn test_descriptions_serialized_only_when_present() {
        let profile = DatasetProfile::build(&table());
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("column_descriptions").is_none());

        let json = serde_json::to_value(profile.with_column_descriptions(vec![ColumnDescription {
            column: "渠道".to_string(),
            description: "充值渠道".to_string(),
        }]))
        .unwrap();
        assert_eq!(json["column_descriptions"][0]["column"], "渠道");
    }

    #[test]
    fn test_profile_stats_only_numeric_columns() {
        let profile = DatasetProfile::build(&table());
        assert_eq!(profile.descriptive_stats.len(), 1);

        let stat = &profile.descriptive_stats[0];
        assert_eq!(stat.column, "总收入");
        assert_eq!(stat.count, 4);
        assert_eq!(stat.mean, 225.0);
        assert_eq!(stat.median, 250.0);
        assert_eq!(stat.min, 100.0);
        assert_eq!(stat.max, 300.0);
        assert!((stat.std_dev - 95.7427).abs() < 1e-3);
    }
}

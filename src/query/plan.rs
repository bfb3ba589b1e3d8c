//! Query plans
//!
//! The language model never writes code: it answers with a JSON plan that is
//! validated and executed here against a [`DataTable`].
//!
//! Execution order: filters → grouping/aggregation (or column projection) →
//! sort → limit.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dataset::{format_number, parse_date, parse_number, DataTable};
use crate::types::{AppError, AppResult};
use crate::utils::strip_code_fence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    Table,
    Chart,
    Text,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub kind: PlanKind,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub group_by: Vec<GroupKey>,
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub sort: Vec<SortKey>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub chart: Option<ChartSpec>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    In,
    Between,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateBucket {
    Day,
    Month,
    Year,
}

/// Grouping column; models may write either `"渠道"` or
/// `{"column": "日期", "bucket": "month"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "GroupKeyRepr")]
pub struct GroupKey {
    pub column: String,
    pub bucket: Option<DateBucket>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GroupKeyRepr {
    Name(String),
    Keyed {
        column: String,
        #[serde(default)]
        bucket: Option<DateBucket>,
    },
}

impl From<GroupKeyRepr> for GroupKey {
    fn from(repr: GroupKeyRepr) -> Self {
        match repr {
            GroupKeyRepr::Name(column) => GroupKey { column, bucket: None },
            GroupKeyRepr::Keyed { column, bucket } => GroupKey { column, bucket },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    Sum,
    #[serde(alias = "avg", alias = "average")]
    Mean,
    Min,
    Max,
    Count,
}

impl AggFunc {
    fn name(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Count => "count",
        }
    }
}

/// `column: "*"` applies the function to every numeric non-group column
/// (or counts rows, for `count`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub column: String,
    pub func: AggFunc,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub x: String,
    pub y: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl QueryPlan {
    /// Parse the model's answer, tolerating a surrounding code fence
    pub fn parse(raw: &str) -> AppResult<Self> {
        let body = strip_code_fence(raw);
        let json = match (body.find('{'), body.rfind('}')) {
            (Some(start), Some(end)) if end > start => &body[start..=end],
            _ => body,
        };
        serde_json::from_str(json).map_err(|e| AppError::QueryAgent(format!("invalid query plan: {}", e)))
    }

    /// Run filters, grouping, projection, sort and limit against `table`
    pub fn execute(&self, table: &DataTable) -> AppResult<DataTable> {
        let filtered = apply_filters(table, &self.filters)?;

        let shaped = if !self.group_by.is_empty() || !self.aggregations.is_empty() {
            aggregate(&filtered, &self.group_by, &self.aggregations)?
        } else if !self.columns.is_empty() {
            filtered.select(&self.columns)?
        } else {
            filtered
        };

        let sorted = apply_sort(shaped, &self.sort)?;
        Ok(match self.limit {
            Some(n) => sorted.head(n),
            None => sorted,
        })
    }
}

fn column_index(table: &DataTable, name: &str) -> AppResult<usize> {
    table
        .column_index(name)
        .ok_or_else(|| AppError::QueryAgent(format!("unknown column '{}'", name)))
}

/// A cell as ordered by filters and sorts
#[derive(Debug, Clone, Copy, PartialEq)]
enum CellValue<'a> {
    Number(f64),
    Date(NaiveDate),
    Text(&'a str),
    Blank,
}

impl<'a> CellValue<'a> {
    fn parse(cell: &'a str) -> Self {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            CellValue::Blank
        } else if let Some(date) = parse_date(trimmed) {
            CellValue::Date(date)
        } else if let Some(number) = parse_number(trimmed) {
            CellValue::Number(number)
        } else {
            CellValue::Text(trimmed)
        }
    }

    fn rank(&self) -> u8 {
        match self {
            CellValue::Number(_) => 0,
            CellValue::Date(_) => 1,
            CellValue::Text(_) => 2,
            CellValue::Blank => 3,
        }
    }

    /// Order inside one kind; `None` across kinds
    fn compare_same_kind(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (CellValue::Number(x), CellValue::Number(y)) => Some(x.total_cmp(y)),
            (CellValue::Date(x), CellValue::Date(y)) => Some(x.cmp(y)),
            (CellValue::Text(x), CellValue::Text(y)) => Some(x.cmp(y)),
            (CellValue::Blank, CellValue::Blank) => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Kinds in the order numbers, dates, text, blanks; `descending` only
    /// flips the order inside a kind, so text and blanks always come last.
    fn sort_cmp(&self, other: &Self, descending: bool) -> Ordering {
        match self.compare_same_kind(other) {
            Some(ord) if descending => ord.reverse(),
            Some(ord) => ord,
            None => self.rank().cmp(&other.rank()),
        }
    }
}

/// Total order over cells: numbers numerically, then dates chronologically,
/// then text, then blanks.
pub fn compare_cells(a: &str, b: &str) -> Ordering {
    CellValue::parse(a).sort_cmp(&CellValue::parse(b), false)
}

/// Filter comparison; cells of a different kind than the target never compare
fn compare_for_filter(cell: &str, target: &str) -> Option<Ordering> {
    CellValue::parse(cell).compare_same_kind(&CellValue::parse(target))
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_list(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items.iter().map(value_text).collect(),
        other => vec![value_text(other)],
    }
}

fn matches(cell: &str, filter: &Filter) -> AppResult<bool> {
    let target = value_text(&filter.value);
    Ok(match filter.op {
        FilterOp::Eq => compare_for_filter(cell, &target) == Some(Ordering::Equal),
        FilterOp::Ne => compare_for_filter(cell, &target) != Some(Ordering::Equal),
        FilterOp::Gt => compare_for_filter(cell, &target) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(
            compare_for_filter(cell, &target),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Lt => compare_for_filter(cell, &target) == Some(Ordering::Less),
        FilterOp::Lte => matches!(compare_for_filter(cell, &target), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::Contains => cell.contains(target.as_str()),
        FilterOp::In => value_list(&filter.value)
            .iter()
            .any(|v| compare_for_filter(cell, v) == Some(Ordering::Equal)),
        FilterOp::Between => {
            let bounds = value_list(&filter.value);
            let [low, high] = bounds.as_slice() else {
                return Err(AppError::QueryAgent(format!(
                    "'between' on '{}' needs exactly two bounds",
                    filter.column
                )));
            };
            matches!(compare_for_filter(cell, low), Some(Ordering::Greater | Ordering::Equal))
                && matches!(compare_for_filter(cell, high), Some(Ordering::Less | Ordering::Equal))
        }
    })
}

fn apply_filters(table: &DataTable, filters: &[Filter]) -> AppResult<DataTable> {
    let indexed = filters
        .iter()
        .map(|f| column_index(table, &f.column).map(|idx| (idx, f)))
        .collect::<AppResult<Vec<_>>>()?;

    let mut rows = Vec::new();
    for row in table.rows() {
        let mut keep = true;
        for (idx, filter) in &indexed {
            if !matches(&row[*idx], filter)? {
                keep = false;
                break;
            }
        }
        if keep {
            rows.push(row.clone());
        }
    }
    DataTable::new(table.columns().to_vec(), rows)
}

fn bucket_value(cell: &str, bucket: Option<DateBucket>) -> String {
    let Some(bucket) = bucket else {
        return cell.to_string();
    };
    match parse_date(cell) {
        Some(date) => match bucket {
            DateBucket::Day => date.format("%Y-%m-%d").to_string(),
            DateBucket::Month => date.format("%Y-%m").to_string(),
            DateBucket::Year => date.format("%Y").to_string(),
        },
        None => cell.to_string(),
    }
}

struct ResolvedAgg {
    index: Option<usize>,
    func: AggFunc,
    alias: String,
}

fn resolve_aggregations(
    table: &DataTable,
    group_indices: &[usize],
    aggregations: &[Aggregation],
) -> AppResult<Vec<ResolvedAgg>> {
    let mut resolved = Vec::new();
    for agg in aggregations {
        if agg.column == "*" {
            if agg.func == AggFunc::Count {
                resolved.push(ResolvedAgg {
                    index: None,
                    func: AggFunc::Count,
                    alias: agg.alias.clone().unwrap_or_else(|| "count".to_string()),
                });
                continue;
            }
            for (idx, name) in table.columns().iter().enumerate() {
                if group_indices.contains(&idx) || !is_numeric_column(table, idx) {
                    continue;
                }
                resolved.push(ResolvedAgg {
                    index: Some(idx),
                    func: agg.func,
                    alias: name.clone(),
                });
            }
        } else {
            let idx = column_index(table, &agg.column)?;
            resolved.push(ResolvedAgg {
                index: Some(idx),
                func: agg.func,
                alias: agg
                    .alias
                    .clone()
                    .unwrap_or_else(|| format!("{}_{}", agg.column, agg.func.name())),
            });
        }
    }
    Ok(resolved)
}

fn is_numeric_column(table: &DataTable, idx: usize) -> bool {
    let mut values = table.column_values(idx).filter(|v| !v.trim().is_empty()).peekable();
    values.peek().is_some() && values.all(|v| parse_number(v).is_some())
}

fn reduce(func: AggFunc, cells: &[&str]) -> String {
    if func == AggFunc::Count {
        return cells.iter().filter(|c| !c.trim().is_empty()).count().to_string();
    }
    let values: Vec<f64> = cells.iter().filter_map(|c| parse_number(c)).collect();
    if values.is_empty() {
        return String::new();
    }
    let result = match func {
        AggFunc::Sum => values.iter().sum(),
        AggFunc::Mean => values.iter().sum::<f64>() / values.len() as f64,
        AggFunc::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
        AggFunc::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        AggFunc::Count => unreachable!("count handled above"),
    };
    format_number(result)
}

fn aggregate(table: &DataTable, group_by: &[GroupKey], aggregations: &[Aggregation]) -> AppResult<DataTable> {
    let group_indices = group_by
        .iter()
        .map(|g| column_index(table, &g.column))
        .collect::<AppResult<Vec<_>>>()?;
    let aggs = resolve_aggregations(table, &group_indices, aggregations)?;

    // Groups keep first-appearance order
    let mut order: Vec<Vec<String>> = Vec::new();
    let mut members: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
    for (row_idx, row) in table.rows().iter().enumerate() {
        let key: Vec<String> = group_by
            .iter()
            .zip(&group_indices)
            .map(|(g, &idx)| bucket_value(&row[idx], g.bucket))
            .collect();
        members
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(row_idx);
    }

    let mut columns: Vec<String> = group_by.iter().map(|g| g.column.clone()).collect();
    columns.extend(aggs.iter().map(|a| a.alias.clone()));

    // Aggregating without groups over zero rows still yields one row
    if group_by.is_empty() && order.is_empty() {
        order.push(Vec::new());
        members.insert(Vec::new(), Vec::new());
    }

    let mut rows = Vec::with_capacity(order.len());
    for key in order {
        let row_ids = &members[&key];
        let mut row = key.clone();
        for agg in &aggs {
            let value = match agg.index {
                Some(idx) => {
                    let cells: Vec<&str> = row_ids.iter().map(|&r| table.rows()[r][idx].as_str()).collect();
                    reduce(agg.func, &cells)
                }
                None => row_ids.len().to_string(),
            };
            row.push(value);
        }
        rows.push(row);
    }

    DataTable::new(columns, rows)
}

fn apply_sort(table: DataTable, sort: &[SortKey]) -> AppResult<DataTable> {
    if sort.is_empty() {
        return Ok(table);
    }
    let keys = sort
        .iter()
        .map(|k| column_index(&table, &k.column).map(|idx| (idx, k.descending)))
        .collect::<AppResult<Vec<_>>>()?;

    let mut rows = table.rows().to_vec();
    rows.sort_by(|a, b| {
        for (idx, descending) in &keys {
            let ord = CellValue::parse(&a[*idx]).sort_cmp(&CellValue::parse(&b[*idx]), *descending);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    DataTable::new(table.columns().to_vec(), rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn revenue() -> DataTable {
        DataTable::new(
            vec!["日期".into(), "渠道".into(), "总收入".into(), "充值人数".into()],
            vec![
                vec!["2025-03-01".into(), "web".into(), "100".into(), "10".into()],
                vec!["2025-03-15".into(), "app".into(), "300".into(), "12".into()],
                vec!["2025-05-01".into(), "web".into(), "1200".into(), "30".into()],
                vec!["2025-06-01".into(), "web".into(), "900".into(), "21".into()],
                vec!["2025-06-02".into(), "app".into(), "".into(), "5".into()],
            ],
        )
        .unwrap()
    }

    fn plan(value: serde_json::Value) -> QueryPlan {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_tolerates_fences_and_prose() {
        let raw = "好的，计划如下：\n```json\n{\"kind\": \"table\", \"filters\": []}\n```";
        let parsed = QueryPlan::parse(raw).unwrap();
        assert_eq!(parsed.kind, PlanKind::Table);

        assert!(QueryPlan::parse("not json at all").is_err());
    }

    #[test]
    fn test_filter_dates_across_formats() {
        let p = plan(json!({
            "kind": "table",
            "filters": [{"column": "日期", "op": "in", "value": ["20250501", "2025/6/1"]}]
        }));
        let result = p.execute(&revenue()).unwrap();
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.column_count(), 4);
    }

    #[test]
    fn test_between_and_numeric_filters() {
        let p = plan(json!({
            "kind": "table",
            "filters": [
                {"column": "日期", "op": "between", "value": ["2025-03-01", "2025-05-31"]},
                {"column": "总收入", "op": "gte", "value": 300}
            ],
            "columns": ["日期", "总收入"]
        }));
        let result = p.execute(&revenue()).unwrap();
        assert_eq!(result.columns(), &["日期".to_string(), "总收入".to_string()]);
        assert_eq!(
            result.rows(),
            &[
                vec!["2025-03-15".to_string(), "300".to_string()],
                vec!["2025-05-01".to_string(), "1200".to_string()],
            ]
        );
    }

    #[test]
    fn test_between_requires_two_bounds() {
        let p = plan(json!({
            "kind": "table",
            "filters": [{"column": "日期", "op": "between", "value": ["2025-03-01"]}]
        }));
        assert!(p.execute(&revenue()).is_err());
    }

    #[test]
    fn test_monthly_mean_with_bucket() {
        let p = plan(json!({
            "kind": "chart",
            "group_by": [{"column": "日期", "bucket": "month"}],
            "aggregations": [{"column": "总收入", "func": "avg", "alias": "月均总收入"}],
            "sort": [{"column": "日期"}]
        }));
        let result = p.execute(&revenue()).unwrap();
        assert_eq!(result.columns(), &["日期".to_string(), "月均总收入".to_string()]);
        assert_eq!(
            result.rows(),
            &[
                vec!["2025-03".to_string(), "200".to_string()],
                vec!["2025-05".to_string(), "1200".to_string()],
                vec!["2025-06".to_string(), "900".to_string()],
            ]
        );
    }

    #[test]
    fn test_star_aggregation_expands_numeric_columns() {
        let p = plan(json!({
            "kind": "table",
            "group_by": ["渠道"],
            "aggregations": [{"column": "*", "func": "sum"}, {"column": "*", "func": "count"}]
        }));
        let result = p.execute(&revenue()).unwrap();
        assert_eq!(
            result.columns(),
            &["渠道".to_string(), "总收入".to_string(), "充值人数".to_string(), "count".to_string()]
        );
        assert_eq!(result.rows()[0], vec!["web", "2200", "61", "3"]);
        assert_eq!(result.rows()[1], vec!["app", "300", "17", "2"]);
    }

    #[test]
    fn test_sort_desc_and_limit_finds_top_day() {
        let p = plan(json!({
            "kind": "text",
            "columns": ["日期", "总收入"],
            "sort": [{"column": "总收入", "descending": true}],
            "limit": 1
        }));
        let result = p.execute(&revenue()).unwrap();
        assert_eq!(result.rows(), &[vec!["2025-05-01".to_string(), "1200".to_string()]]);
    }

    #[test]
    fn test_aggregate_without_groups_on_empty_input() {
        let p = plan(json!({
            "kind": "table",
            "filters": [{"column": "渠道", "op": "eq", "value": "none"}],
            "aggregations": [{"column": "总收入", "func": "sum"}]
        }));
        let result = p.execute(&revenue()).unwrap();
        assert_eq!(result.rows(), &[vec![String::new()]]);
        assert_eq!(result.columns(), &["总收入_sum".to_string()]);
    }

    #[test]
    fn test_unknown_column_is_error() {
        let p = plan(json!({
            "kind": "table",
            "filters": [{"column": "利润", "op": "gt", "value": 0}]
        }));
        let err = p.execute(&revenue()).unwrap_err();
        assert!(err.to_string().contains("利润"));
    }

    #[test]
    fn test_compare_cells() {
        assert_eq!(compare_cells("9", "10"), Ordering::Less);
        assert_eq!(compare_cells("2025-06-01", "20250601"), Ordering::Equal);
        assert_eq!(compare_cells("app", "web"), Ordering::Less);
        // Mixed kinds rank instead of falling back to text
        assert_eq!(compare_cells("10", "9"), Ordering::Greater);
        assert_eq!(compare_cells("9", "5万"), Ordering::Less);
        assert_eq!(compare_cells("5万", "10"), Ordering::Greater);
        assert_eq!(compare_cells("", "5万"), Ordering::Greater);
    }

    #[test]
    fn test_sort_mixed_column_is_total_order() {
        let junk = ["900", "5万", "-", "", "10", "2025-06-01", "9", "1,200", "n/a", "-3.5"];
        let rows: Vec<Vec<String>> = (0..96)
            .map(|i| vec![junk[(i * 7 + i / 3) % junk.len()].to_string(), i.to_string()])
            .collect();
        let table = DataTable::new(vec!["总收入".into(), "序号".into()], rows).unwrap();

        for descending in [false, true] {
            let p = plan(json!({
                "kind": "table",
                "sort": [{"column": "总收入", "descending": descending}]
            }));
            let sorted = p.execute(&table).unwrap();
            assert_eq!(sorted.row_count(), 96);

            let cells: Vec<&str> = sorted.rows().iter().map(|r| r[0].as_str()).collect();
            let first_text = cells
                .iter()
                .position(|c| CellValue::parse(c).rank() >= 2)
                .unwrap();
            // Numbers and dates first, in the requested direction; text and blanks last
            assert!(cells[first_text..].iter().all(|c| CellValue::parse(c).rank() >= 2));
            assert_eq!(*cells.last().unwrap(), "");
            let numbers: Vec<f64> = cells
                .iter()
                .filter_map(|c| match CellValue::parse(c) {
                    CellValue::Number(n) => Some(n),
                    _ => None,
                })
                .collect();
            let mut expected = numbers.clone();
            expected.sort_by(|a, b| if descending { b.total_cmp(a) } else { a.total_cmp(b) });
            assert_eq!(numbers, expected);
        }
    }

    #[test]
    fn test_numeric_filter_skips_non_numeric_cells() {
        let p = plan(json!({
            "kind": "table",
            "filters": [{"column": "总收入", "op": "gte", "value": 0}]
        }));
        // The 2025-06-02 row has a blank revenue cell
        assert_eq!(p.execute(&revenue()).unwrap().row_count(), 4);
    }
}

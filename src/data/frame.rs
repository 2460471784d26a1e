//! The `DataFrame` type: CSV loading, aggregation, descriptive statistics.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use thiserror::Error;

use super::{cell_display, cell_number};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("Failed to parse file: {0}")]
    Parse(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),

    #[error("Unsupported aggregation function: {0}")]
    UnsupportedAggregation(String),

    #[error("Unsupported plot type: {0}")]
    UnsupportedPlotType(String),

    #[error("{0}")]
    InvalidPlot(String),
}

/// A small in-memory table. Cells are JSON values: numbers, strings,
/// booleans, or null for missing entries.
#[derive(Debug, Clone, Default)]
pub struct DataFrame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl DataFrame {
    /// Build a frame from columns and rows. Rows shorter than the header are
    /// padded with nulls; longer rows are truncated.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Parse CSV bytes into a frame, inferring numeric and boolean cells.
    pub fn from_csv(bytes: &[u8], filename: &str) -> Result<Self, DataError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| DataError::Parse(format!("{} is not valid UTF-8", filename)))?;

        let mut records = parse_csv(text);
        if records.is_empty() {
            return Err(DataError::Parse(format!("{} contains no rows", filename)));
        }

        let header = records.remove(0);
        if header.iter().all(|h| h.trim().is_empty()) {
            return Err(DataError::Parse(format!("{} has an empty header", filename)));
        }

        let columns: Vec<String> = header.into_iter().map(|h| h.trim().to_string()).collect();
        let rows = records
            .into_iter()
            .filter(|fields| !fields.iter().all(|f| f.trim().is_empty()))
            .map(|fields| fields.iter().map(|f| infer_cell(f)).collect())
            .collect();

        Ok(Self::new(columns, rows))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column.
    pub fn column_values(&self, name: &str) -> Result<Vec<Value>, DataError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| DataError::UnknownColumn(name.to_string()))?;
        Ok(self.rows.iter().map(|r| r[idx].clone()).collect())
    }

    /// First `limit` rows as JSON records, with nulls rendered as empty
    /// strings (the shape the frontend expects for table previews).
    pub fn records(&self, limit: usize) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(name, cell)| {
                        let cell = if cell.is_null() {
                            Value::String(String::new())
                        } else {
                            cell.clone()
                        };
                        (name.clone(), cell)
                    })
                    .collect()
            })
            .collect()
    }

    /// A frame containing the first `n` rows.
    pub fn head(&self, n: usize) -> DataFrame {
        DataFrame {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// A frame restricted to the named columns, in the given order.
    pub fn select(&self, names: &[String]) -> Result<DataFrame, DataError> {
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            indices.push(
                self.column_index(name)
                    .ok_or_else(|| DataError::UnknownColumn(name.clone()))?,
            );
        }
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(DataFrame {
            columns: names.to_vec(),
            rows,
        })
    }

    /// Rows sorted by one column: numeric ascending where possible,
    /// otherwise lexicographic. Stable, so equal keys keep input order.
    pub fn sort_by(&self, column: &str, descending: bool) -> Result<DataFrame, DataError> {
        let idx = self
            .column_index(column)
            .ok_or_else(|| DataError::UnknownColumn(column.to_string()))?;
        let mut rows = self.rows.clone();
        if descending {
            rows.sort_by(|a, b| compare_cells(&b[idx], &a[idx]));
        } else {
            rows.sort_by(|a, b| compare_cells(&a[idx], &b[idx]));
        }
        Ok(DataFrame {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Keep only rows matching the predicate string (see [`query`]).
    ///
    /// [`query`]: super::query
    pub fn filter(&self, predicate: &str) -> Result<DataFrame, DataError> {
        let mask = super::query::evaluate(self, predicate)?;
        let rows = self
            .rows
            .iter()
            .zip(mask)
            .filter_map(|(row, keep)| keep.then(|| row.clone()))
            .collect();
        Ok(DataFrame {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Group by one column and aggregate another.
    ///
    /// Output is one row per distinct group value, ordered by group key, with
    /// columns `[group_column, value_column]`. `count` counts non-null cells;
    /// the numeric functions skip non-numeric cells. `std` is the sample
    /// standard deviation and is null for groups of fewer than two values.
    pub fn aggregate(
        &self,
        group_column: &str,
        value_column: &str,
        agg_func: &str,
    ) -> Result<DataFrame, DataError> {
        let group_idx = self
            .column_index(group_column)
            .ok_or_else(|| DataError::UnknownColumn(group_column.to_string()))?;
        let value_idx = self
            .column_index(value_column)
            .ok_or_else(|| DataError::UnknownColumn(value_column.to_string()))?;

        if !matches!(
            agg_func,
            "mean" | "sum" | "count" | "min" | "max" | "median" | "std"
        ) {
            return Err(DataError::UnsupportedAggregation(agg_func.to_string()));
        }

        // BTreeMap keys give the deterministic group ordering.
        let mut groups: BTreeMap<String, (Value, Vec<f64>, usize)> = BTreeMap::new();
        for row in &self.rows {
            let key = cell_display(&row[group_idx]);
            let entry = groups
                .entry(key)
                .or_insert_with(|| (row[group_idx].clone(), Vec::new(), 0));
            if !row[value_idx].is_null() {
                entry.2 += 1;
            }
            if let Some(n) = cell_number(&row[value_idx]) {
                entry.1.push(n);
            }
        }

        let rows = groups
            .into_values()
            .map(|(label, values, non_null)| {
                let aggregated = match agg_func {
                    "count" => json!(non_null),
                    _ => aggregate_values(&values, agg_func),
                };
                vec![label, aggregated]
            })
            .collect();

        Ok(DataFrame {
            columns: vec![group_column.to_string(), value_column.to_string()],
            rows,
        })
    }

    /// Per-column summary statistics: count/mean/std/min/max for numeric
    /// columns, count/unique for the rest.
    pub fn describe(&self) -> Map<String, Value> {
        let mut stats = Map::new();
        for (idx, name) in self.columns.iter().enumerate() {
            let cells: Vec<&Value> = self.rows.iter().map(|r| &r[idx]).collect();
            let numbers: Vec<f64> = cells.iter().filter_map(|c| cell_number(c)).collect();
            let non_null = cells.iter().filter(|c| !c.is_null()).count();

            let entry = if !numbers.is_empty() {
                json!({
                    "count": non_null,
                    "mean": round4(mean(&numbers)),
                    "std": std_dev(&numbers).map(round4),
                    "min": numbers.iter().cloned().fold(f64::INFINITY, f64::min),
                    "max": numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                })
            } else {
                let mut seen: Vec<String> = cells
                    .iter()
                    .filter(|c| !c.is_null())
                    .map(|c| cell_display(c))
                    .collect();
                seen.sort();
                seen.dedup();
                json!({
                    "count": non_null,
                    "unique": seen.len(),
                })
            };
            stats.insert(name.clone(), entry);
        }
        stats
    }
}

fn aggregate_values(values: &[f64], agg_func: &str) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    match agg_func {
        "mean" => json!(round4(mean(values))),
        "sum" => json!(round4(values.iter().sum::<f64>())),
        "min" => json!(values.iter().cloned().fold(f64::INFINITY, f64::min)),
        "max" => json!(values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
        "median" => json!(round4(median(values))),
        "std" => std_dev(values).map(|s| json!(round4(s))).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample standard deviation; `None` for fewer than two values.
fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

pub(crate) fn compare_cells(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (cell_number(a), cell_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => cell_display(a).cmp(&cell_display(b)),
    }
}

fn infer_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        if n.is_finite() {
            if let Some(number) = serde_json::Number::from_f64(n) {
                return Value::Number(number);
            }
        }
    }
    match trimmed {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        _ => Value::String(trimmed.to_string()),
    }
}

/// Minimal CSV reader: comma-separated, double quotes with `""` escapes.
fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            '\r' if !in_quotes => {}
            '\n' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut fields));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push(fields);
    }
    records
}

//! Row predicate evaluation for `filter_data`.
//!
//! Supports flat boolean expressions over column comparisons, e.g.
//! `age > 30 and gene_A < 0.5` or `status == 'treated' or dose >= 10`.
//! `and` binds tighter than `or`; parentheses are not supported.

use serde_json::Value;

use super::frame::{compare_cells, DataFrame};
use super::DataError;

/// Evaluate a predicate string against every row, returning a keep-mask.
pub fn evaluate(frame: &DataFrame, predicate: &str) -> Result<Vec<bool>, DataError> {
    let trimmed = predicate.trim();
    if trimmed.is_empty() {
        return Err(DataError::InvalidFilter("empty expression".to_string()));
    }

    let groups: Vec<Vec<Condition>> = split_keyword(trimmed, "or")
        .into_iter()
        .map(|group| {
            split_keyword(group, "and")
                .into_iter()
                .map(|clause| Condition::parse(clause, frame))
                .collect()
        })
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .collect();

    Ok(frame
        .rows()
        .iter()
        .map(|row| {
            groups
                .iter()
                .any(|conds| conds.iter().all(|c| c.matches(row)))
        })
        .collect())
}

/// One `column <op> literal` comparison, resolved to a column index.
struct Condition {
    column: usize,
    op: Op,
    literal: Value,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Condition {
    fn parse(clause: &str, frame: &DataFrame) -> Result<Self, DataError> {
        let clause = clause.trim();
        // Two-character operators must be matched before their one-character
        // prefixes.
        let ops = [
            ("==", Op::Eq),
            ("!=", Op::Ne),
            ("<=", Op::Le),
            (">=", Op::Ge),
            ("<", Op::Lt),
            (">", Op::Gt),
            ("=", Op::Eq),
        ];
        for (symbol, op) in ops {
            if let Some(pos) = clause.find(symbol) {
                let column_name = clause[..pos].trim();
                let literal_text = clause[pos + symbol.len()..].trim();
                if column_name.is_empty() || literal_text.is_empty() {
                    return Err(DataError::InvalidFilter(format!(
                        "incomplete comparison: {}",
                        clause
                    )));
                }
                let column = frame
                    .column_index(column_name)
                    .ok_or_else(|| DataError::UnknownColumn(column_name.to_string()))?;
                return Ok(Self {
                    column,
                    op,
                    literal: parse_literal(literal_text),
                });
            }
        }
        Err(DataError::InvalidFilter(format!(
            "no comparison operator in: {}",
            clause
        )))
    }

    fn matches(&self, row: &[Value]) -> bool {
        let cell = &row[self.column];
        if cell.is_null() {
            return false;
        }
        let ordering = compare_cells(cell, &self.literal);
        match self.op {
            Op::Eq => ordering == std::cmp::Ordering::Equal,
            Op::Ne => ordering != std::cmp::Ordering::Equal,
            Op::Lt => ordering == std::cmp::Ordering::Less,
            Op::Le => ordering != std::cmp::Ordering::Greater,
            Op::Gt => ordering == std::cmp::Ordering::Greater,
            Op::Ge => ordering != std::cmp::Ordering::Less,
        }
    }
}

fn parse_literal(text: &str) -> Value {
    let unquoted = text
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| text.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
    if let Some(s) = unquoted {
        return Value::String(s.to_string());
    }
    if let Ok(n) = text.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(n) {
            return Value::Number(number);
        }
    }
    match text {
        "true" | "True" => Value::Bool(true),
        "false" | "False" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

/// Split on a lowercase keyword appearing as its own word, outside quotes.
fn split_keyword<'a>(text: &'a str, keyword: &str) -> Vec<&'a str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    let mut quote: Option<u8> = None;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
                i += 1;
            }
            None => {
                if b == b'\'' || b == b'"' {
                    quote = Some(b);
                    i += 1;
                } else if text[i..].starts_with(keyword)
                    && boundary_before(bytes, i)
                    && boundary_after(bytes, i + keyword.len())
                {
                    parts.push(&text[start..i]);
                    i += keyword.len();
                    start = i;
                } else {
                    i += 1;
                }
            }
        }
    }
    parts.push(&text[start..]);
    parts
}

fn boundary_before(bytes: &[u8], i: usize) -> bool {
    i == 0 || bytes[i - 1].is_ascii_whitespace()
}

fn boundary_after(bytes: &[u8], i: usize) -> bool {
    i >= bytes.len() || bytes[i].is_ascii_whitespace()
}

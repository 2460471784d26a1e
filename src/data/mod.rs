//! In-memory tabular engine.
//!
//! A deliberately small dataframe: named columns over rows of JSON cells.
//! It backs the data tools (filter, aggregate, describe, plot) and the
//! sandbox's table copy. Heavier analytics belong in sandboxed code, not
//! here.

mod frame;
pub mod plot;
pub mod query;

pub use frame::{DataFrame, DataError};
pub use plot::ChartSpec;

/// Extract a cell as a float, if it is numeric.
pub(crate) fn cell_number(value: &serde_json::Value) -> Option<f64> {
    value.as_f64()
}

/// Render a cell the way it should appear in group keys and chart labels.
pub(crate) fn cell_display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

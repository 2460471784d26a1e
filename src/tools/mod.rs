//! Tool registry and dispatcher for the agent loop.
//!
//! The registry is a closed enum: every tool the model may call is a
//! variant, resolved by name. Dispatch is infallible by contract. Whatever
//! goes wrong inside a tool (missing dataset, bad arguments, engine errors,
//! sandbox faults) is reported through the `error` field of the envelope,
//! so the model always receives a well-formed tool result.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::data::ChartSpec;
use crate::kb::SearchHit;
use crate::sandbox;
use crate::store::Session;

/// Every tool exposed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    FilterData,
    AggregateData,
    DescribeData,
    GeneratePlot,
    SearchDocuments,
    ExecuteCode,
}

impl ToolKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "filter_data" => Some(Self::FilterData),
            "aggregate_data" => Some(Self::AggregateData),
            "describe_data" => Some(Self::DescribeData),
            "generate_plot" => Some(Self::GeneratePlot),
            "search_documents" => Some(Self::SearchDocuments),
            "execute_code" => Some(Self::ExecuteCode),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FilterData => "filter_data",
            Self::AggregateData => "aggregate_data",
            Self::DescribeData => "describe_data",
            Self::GeneratePlot => "generate_plot",
            Self::SearchDocuments => "search_documents",
            Self::ExecuteCode => "execute_code",
        }
    }

    pub const ALL: [ToolKind; 6] = [
        Self::FilterData,
        Self::AggregateData,
        Self::DescribeData,
        Self::GeneratePlot,
        Self::SearchDocuments,
        Self::ExecuteCode,
    ];
}

/// Function-calling schemas for the first model call.
pub fn schemas() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": "filter_data",
                "description": "Filter the currently loaded dataset with a condition string. Example: 'age > 30 and treatment == \"drug_a\"'",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "conditions": {
                            "type": "string",
                            "description": "Condition string for selecting rows",
                        }
                    },
                    "required": ["conditions"],
                },
            },
        }),
        json!({
            "type": "function",
            "function": {
                "name": "aggregate_data",
                "description": "Group the dataset by a column and compute an aggregation (mean, sum, count, min, max, median, std) on another column.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "group_column": {
                            "type": "string",
                            "description": "Column to group by",
                        },
                        "value_column": {
                            "type": "string",
                            "description": "Column to aggregate",
                        },
                        "agg_func": {
                            "type": "string",
                            "enum": ["mean", "sum", "count", "min", "max", "median", "std"],
                            "description": "Aggregation function",
                        },
                    },
                    "required": ["group_column", "value_column", "agg_func"],
                },
            },
        }),
        json!({
            "type": "function",
            "function": {
                "name": "describe_data",
                "description": "Get summary statistics (count, mean, std, min, max, unique) for every column of the active dataset.",
                "parameters": {
                    "type": "object",
                    "properties": {},
                },
            },
        }),
        json!({
            "type": "function",
            "function": {
                "name": "generate_plot",
                "description": "Create a chart from the active dataset. Supported types: bar, pie, scatter, line, histogram, box.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "plot_type": {
                            "type": "string",
                            "enum": ["bar", "pie", "scatter", "line", "histogram", "box"],
                            "description": "Type of chart to generate",
                        },
                        "x_column": {
                            "type": "string",
                            "description": "Column for the x axis (or labels for a pie chart)",
                        },
                        "y_column": {
                            "type": "string",
                            "description": "Column for the y axis (or values for a pie chart). Not needed for histogram.",
                        },
                        "title": {
                            "type": "string",
                            "description": "Chart title",
                        },
                    },
                    "required": ["plot_type", "x_column"],
                },
            },
        }),
        json!({
            "type": "function",
            "function": {
                "name": "search_documents",
                "description": "Search the indexed documents for passages related to a query.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Search query",
                        },
                        "top_k": {
                            "type": "integer",
                            "description": "Number of results to return (default 5)",
                        },
                    },
                    "required": ["query"],
                },
            },
        }),
        json!({
            "type": "function",
            "function": {
                "name": "execute_code",
                "description": "Run a short analysis script against the active dataset. The table is bound to `df`; use `tab` for statistics helpers and `chart` for chart builders. Bind the value to return to `result` and any chart to `fig`.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "code": {
                            "type": "string",
                            "description": "Script to execute. Assign to `result` and/or `fig`.",
                        }
                    },
                    "required": ["code"],
                },
            },
        }),
    ]
}

/// Uniform tool result. Serialized verbatim as the tool message content;
/// unset fields are omitted.
#[derive(Debug, Default, Serialize)]
pub struct Envelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Map<String, Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SearchHit>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn error(message: impl Into<String>) -> Self {
        Self { error: Some(message.into()), ..Default::default() }
    }

    /// Content for the tool message. Serialization of this shape cannot
    /// fail, but the fallback keeps the contract airtight.
    pub fn to_content(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"unserializable tool result"}"#.to_string())
    }
}

const NO_DATASET: &str = "No dataset loaded.";

/// Run one tool call against the session. Never returns an error: all
/// failure modes land in the envelope.
pub async fn dispatch(
    name: &str,
    args: &Value,
    session: &Session,
    sandbox_timeout_secs: u64,
) -> Envelope {
    let kind = match ToolKind::from_name(name) {
        Some(kind) => kind,
        None => return Envelope::error(format!("Unknown tool: {}", name)),
    };
    tracing::debug!(tool = name, "dispatching tool call");

    match kind {
        ToolKind::FilterData => filter_data(args, session),
        ToolKind::AggregateData => aggregate_data(args, session),
        ToolKind::DescribeData => describe_data(session),
        ToolKind::GeneratePlot => generate_plot(args, session),
        ToolKind::SearchDocuments => search_documents(args, session),
        ToolKind::ExecuteCode => execute_code(args, session, sandbox_timeout_secs).await,
    }
}

fn str_arg(args: &Value, key: &str) -> Result<String, Envelope> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Envelope::error(format!("Missing required argument: {}", key)))
}

fn filter_data(args: &Value, session: &Session) -> Envelope {
    let frame = match session.active_frame() {
        Some(frame) => frame,
        None => return Envelope::error(NO_DATASET),
    };
    let conditions = match str_arg(args, "conditions") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match frame.filter(&conditions) {
        Ok(filtered) => Envelope {
            // Preview capped at 50 rows; row_count is the full filtered size.
            data: Some(filtered.records(50)),
            columns: Some(filtered.columns().to_vec()),
            row_count: Some(filtered.row_count()),
            ..Default::default()
        },
        Err(e) => Envelope::error(e.to_string()),
    }
}

fn aggregate_data(args: &Value, session: &Session) -> Envelope {
    let frame = match session.active_frame() {
        Some(frame) => frame,
        None => return Envelope::error(NO_DATASET),
    };
    let group = match str_arg(args, "group_column") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let value = match str_arg(args, "value_column") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let agg = args
        .get("agg_func")
        .and_then(Value::as_str)
        .unwrap_or("mean");
    match frame.aggregate(&group, &value, agg) {
        Ok(result) => {
            let rows = result.row_count();
            Envelope {
                data: Some(result.records(rows)),
                columns: Some(result.columns().to_vec()),
                row_count: Some(rows),
                ..Default::default()
            }
        }
        Err(e) => Envelope::error(e.to_string()),
    }
}

fn describe_data(session: &Session) -> Envelope {
    match session.active_frame() {
        Some(frame) => Envelope {
            statistics: Some(frame.describe()),
            ..Default::default()
        },
        None => Envelope::error(NO_DATASET),
    }
}

fn generate_plot(args: &Value, session: &Session) -> Envelope {
    let frame = match session.active_frame() {
        Some(frame) => frame,
        None => return Envelope::error(NO_DATASET),
    };
    let plot_type = match str_arg(args, "plot_type") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let x_column = match str_arg(args, "x_column") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let y_column = args.get("y_column").and_then(Value::as_str);
    let title = args.get("title").and_then(Value::as_str);
    match crate::data::plot::generate(frame, &plot_type, &x_column, y_column, title) {
        Ok(chart) => Envelope { chart: Some(chart), ..Default::default() },
        Err(e) => Envelope::error(e.to_string()),
    }
}

fn search_documents(args: &Value, session: &Session) -> Envelope {
    let query = match str_arg(args, "query") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let top_k = args
        .get("top_k")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(5);
    Envelope {
        results: Some(session.kb.search(&query, top_k)),
        ..Default::default()
    }
}

async fn execute_code(args: &Value, session: &Session, timeout_secs: u64) -> Envelope {
    let frame = match session.active_frame() {
        Some(frame) => frame,
        None => return Envelope::error(NO_DATASET),
    };
    let code = match str_arg(args, "code") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let output = sandbox::execute(&code, frame, timeout_secs).await;
    let mut envelope = Envelope {
        chart: output.chart,
        error: output.error,
        ..Default::default()
    };

    // Table-shaped results are promoted into the outer table fields so the
    // caller folds them the same way as filter/aggregate output.
    match output.result {
        Some(Value::Object(object)) if object.contains_key("data") => {
            if let Some(Value::Array(rows)) = object.get("data") {
                let records: Vec<Map<String, Value>> = rows
                    .iter()
                    .filter_map(|row| row.as_object().cloned())
                    .collect();
                envelope.data = Some(records);
            }
            if let Some(Value::Array(columns)) = object.get("columns") {
                envelope.columns = Some(
                    columns
                        .iter()
                        .filter_map(|c| c.as_str().map(str::to_string))
                        .collect(),
                );
            }
            envelope.row_count = object
                .get("row_count")
                .and_then(Value::as_u64)
                .map(|n| n as usize);
        }
        Some(other) => envelope.result = Some(other),
        None => {}
    }
    envelope
}

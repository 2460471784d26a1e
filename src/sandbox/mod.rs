//! Sandboxed execution of analysis scripts.
//!
//! Scripts run against a private copy of the active table, so no script can
//! mutate shared state. Each invocation carries its own wall-clock deadline:
//! the interpreter checks it per statement and loop iteration, and a tokio
//! timeout backstops the blocking task in case a single operation stalls.

mod interp;
mod script;

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::data::{ChartSpec, DataFrame};

use interp::{value_to_json, Interpreter, Value as ScriptValue};

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("code execution timed out ({0}s limit)")]
    Timeout(u64),
}

/// What a script run produced. At most one of `result`/`error` is set;
/// `chart` rides along whenever the script bound `fig`.
#[derive(Debug, Default, Serialize)]
pub struct SandboxOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SandboxOutput {
    fn failure(message: String) -> Self {
        Self { result: None, chart: None, error: Some(message) }
    }
}

/// Parse and run `code` against a copy of `frame`, returning whatever the
/// script bound to `result` and `fig`. Never returns Err: every failure
/// mode, parse errors and runtime faults and timeouts alike, lands in the
/// `error` field of the output.
pub async fn execute(code: &str, frame: &DataFrame, timeout_secs: u64) -> SandboxOutput {
    let stmts = match script::parse(code) {
        Ok(stmts) => stmts,
        Err(message) => return SandboxOutput::failure(format!("syntax error: {}", message)),
    };

    let frame = frame.clone();
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);

    let task = tokio::task::spawn_blocking(move || {
        let mut interp = Interpreter::new(frame, deadline);
        match interp.run(&stmts) {
            Ok(()) => {
                let result = interp.binding("result").map(value_to_json);
                let chart = match interp.binding("fig") {
                    Some(ScriptValue::Chart(spec)) => Some(spec.clone()),
                    _ => None,
                };
                SandboxOutput { result, chart, error: None }
            }
            Err(fault) if fault.timed_out => {
                SandboxOutput::failure(SandboxError::Timeout(timeout_secs).to_string())
            }
            Err(fault) => SandboxOutput::failure(fault.message),
        }
    });

    // Grace period past the deadline so the interpreter's own check fires
    // first and the task exits cleanly.
    let backstop = Duration::from_secs(timeout_secs) + Duration::from_secs(2);
    match tokio::time::timeout(backstop, task).await {
        Ok(Ok(output)) => output,
        Ok(Err(join_err)) => {
            tracing::error!("sandbox task panicked: {}", join_err);
            SandboxOutput::failure("internal execution failure".to_string())
        }
        Err(_) => SandboxOutput::failure(SandboxError::Timeout(timeout_secs).to_string()),
    }
}

//! Tree-walking interpreter for sandbox scripts.
//!
//! The execution namespace is closed: scripts see the injected `df` table
//! copy, the `tab` and `chart` library handles, and a fixed set of builtin
//! functions. The interpreter checks its wall-clock deadline on every
//! statement and loop iteration, so runaway scripts stop shortly after the
//! deadline passes.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use serde_json::json;

use crate::data::{plot, ChartSpec, DataFrame};

use super::script::{BinOp, Expr, Stmt};

/// Largest list `range(...)` / `sorted(range(...))` will materialize.
const MAX_RANGE_MATERIALIZE: i64 = 1_000_000;

/// Deepest expression recursion evaluated. The parser already bounds what
/// it accepts; this bounds anything that reaches `eval` regardless.
const MAX_EVAL_DEPTH: usize = 512;

/// Runtime values.
#[derive(Debug, Clone)]
pub enum Value {
    Num(f64),
    Str(String),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Frame(DataFrame),
    Chart(ChartSpec),
    /// Lazy integer range, so `for i in range(10_000_000)` never allocates.
    Range(i64, i64),
    /// The `tab` / `chart` library handles.
    Handle(Handle),
    Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    Tab,
    Chart,
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Frame(_) => "frame",
            Value::Chart(_) => "chart",
            Value::Range(_, _) => "range",
            Value::Handle(_) => "library",
            Value::Unit => "unit",
        }
    }
}

/// A fault raised during evaluation. `timed_out` distinguishes deadline
/// expiry from ordinary script errors.
#[derive(Debug)]
pub struct RuntimeFault {
    pub message: String,
    pub timed_out: bool,
}

impl RuntimeFault {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), timed_out: false }
    }

    fn timeout() -> Self {
        Self { message: "deadline exceeded".to_string(), timed_out: true }
    }
}

type EvalResult = Result<Value, RuntimeFault>;

pub struct Interpreter {
    vars: HashMap<String, Value>,
    deadline: Instant,
    depth: usize,
}

impl Interpreter {
    /// A fresh namespace holding the table copy and the library handles.
    pub fn new(frame: DataFrame, deadline: Instant) -> Self {
        let mut vars = HashMap::new();
        vars.insert("df".to_string(), Value::Frame(frame));
        vars.insert("tab".to_string(), Value::Handle(Handle::Tab));
        vars.insert("chart".to_string(), Value::Handle(Handle::Chart));
        Self { vars, deadline, depth: 0 }
    }

    /// Run all statements; on success the namespace keeps the final
    /// bindings (`result`, `fig`, ...) for inspection.
    pub fn run(&mut self, stmts: &[Stmt]) -> Result<(), RuntimeFault> {
        for stmt in stmts {
            self.execute(stmt)?;
        }
        Ok(())
    }

    /// Look up an output binding after a run.
    pub fn binding(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    fn check_deadline(&self) -> Result<(), RuntimeFault> {
        if Instant::now() >= self.deadline {
            Err(RuntimeFault::timeout())
        } else {
            Ok(())
        }
    }

    fn execute(&mut self, stmt: &Stmt) -> Result<(), RuntimeFault> {
        self.check_deadline()?;
        match stmt {
            Stmt::Assign { name, expr } => {
                let value = self.eval(expr)?;
                self.vars.insert(name.clone(), value);
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
            Stmt::For { var, iterable, body } => {
                let iterable = self.eval(iterable)?;
                match iterable {
                    Value::List(items) => {
                        for item in items {
                            self.check_deadline()?;
                            self.vars.insert(var.clone(), item);
                            self.run(body)?;
                        }
                    }
                    Value::Range(start, end) => {
                        for i in start..end {
                            self.check_deadline()?;
                            self.vars.insert(var.clone(), Value::Num(i as f64));
                            self.run(body)?;
                        }
                    }
                    other => {
                        return Err(RuntimeFault::new(format!(
                            "cannot iterate over {}",
                            other.type_name()
                        )))
                    }
                }
            }
            Stmt::If { cond, then_body, else_body } => {
                if truthy(&self.eval(cond)?)? {
                    self.run(then_body)?;
                } else {
                    self.run(else_body)?;
                }
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> EvalResult {
        if self.depth >= MAX_EVAL_DEPTH {
            return Err(RuntimeFault::new("expression nesting too deep"));
        }
        self.depth += 1;
        let result = self.eval_inner(expr);
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::List(values))
            }
            Expr::Ident(name) => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeFault::new(format!("undefined variable: {}", name))),
            Expr::Neg(inner) => match self.eval(inner)? {
                Value::Num(n) => Ok(Value::Num(-n)),
                other => Err(RuntimeFault::new(format!("cannot negate {}", other.type_name()))),
            },
            Expr::Not(inner) => {
                let value = self.eval(inner)?;
                Ok(Value::Bool(!truthy(&value)?))
            }
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                index_value(&target, &index)
            }
            Expr::Call { name, args } => {
                let args = self.eval_args(args)?;
                self.call_builtin(name, args)
            }
            Expr::Method { target, name, args } => {
                let target = self.eval(target)?;
                let args = self.eval_args(args)?;
                self.call_method(target, name, args)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, RuntimeFault> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        Ok(values)
    }

    fn eval_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> EvalResult {
        // Short-circuit logic before evaluating the right side.
        if op == BinOp::And {
            let left = self.eval(lhs)?;
            if !truthy(&left)? {
                return Ok(Value::Bool(false));
            }
            let right = self.eval(rhs)?;
            return Ok(Value::Bool(truthy(&right)?));
        }
        if op == BinOp::Or {
            let left = self.eval(lhs)?;
            if truthy(&left)? {
                return Ok(Value::Bool(true));
            }
            let right = self.eval(rhs)?;
            return Ok(Value::Bool(truthy(&right)?));
        }

        let left = self.eval(lhs)?;
        let right = self.eval(rhs)?;

        match op {
            BinOp::Add => match (&left, &right) {
                (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a + b)),
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
                (Value::List(a), Value::List(b)) => {
                    let mut joined = a.clone();
                    joined.extend(b.iter().cloned());
                    Ok(Value::List(joined))
                }
                _ => Err(type_error("+", &left, &right)),
            },
            BinOp::Sub => numeric_op(&left, &right, "-", |a, b| a - b),
            BinOp::Mul => numeric_op(&left, &right, "*", |a, b| a * b),
            BinOp::Div => match (&left, &right) {
                (Value::Num(_), Value::Num(b)) if *b == 0.0 => {
                    Err(RuntimeFault::new("division by zero"))
                }
                (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a / b)),
                _ => Err(type_error("/", &left, &right)),
            },
            BinOp::Rem => match (&left, &right) {
                (Value::Num(_), Value::Num(b)) if *b == 0.0 => {
                    Err(RuntimeFault::new("division by zero"))
                }
                (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a % b)),
                _ => Err(type_error("%", &left, &right)),
            },
            BinOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
            BinOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = match (&left, &right) {
                    (Value::Num(a), Value::Num(b)) => a.partial_cmp(b),
                    (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                    _ => None,
                }
                .ok_or_else(|| type_error("comparison", &left, &right))?;
                let result = match op {
                    BinOp::Lt => ordering == std::cmp::Ordering::Less,
                    BinOp::Le => ordering != std::cmp::Ordering::Greater,
                    BinOp::Gt => ordering == std::cmp::Ordering::Greater,
                    _ => ordering != std::cmp::Ordering::Less,
                };
                Ok(Value::Bool(result))
            }
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    // ── Builtins ─────────────────────────────────────────────────

    fn call_builtin(&mut self, name: &str, args: Vec<Value>) -> EvalResult {
        match name {
            "len" => {
                let [value] = expect_args::<1>(name, args)?;
                let n = match &value {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) => items.len(),
                    Value::Map(map) => map.len(),
                    Value::Frame(frame) => frame.row_count(),
                    Value::Range(start, end) => end.saturating_sub(*start).max(0) as usize,
                    other => {
                        return Err(RuntimeFault::new(format!(
                            "len() does not apply to {}",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::Num(n as f64))
            }
            "range" => match args.len() {
                1 => Ok(Value::Range(0, as_int(&args[0], "range()")?)),
                2 => Ok(Value::Range(
                    as_int(&args[0], "range()")?,
                    as_int(&args[1], "range()")?,
                )),
                n => Err(RuntimeFault::new(format!(
                    "range() takes 1 or 2 arguments, got {}",
                    n
                ))),
            },
            "sorted" => {
                let [value] = expect_args::<1>(name, args)?;
                let mut items = into_list(value)?;
                items.sort_by(compare_for_sort);
                Ok(Value::List(items))
            }
            "abs" => {
                let [value] = expect_args::<1>(name, args)?;
                match value {
                    Value::Num(n) => Ok(Value::Num(n.abs())),
                    other => Err(RuntimeFault::new(format!(
                        "abs() does not apply to {}",
                        other.type_name()
                    ))),
                }
            }
            "round" => match args.len() {
                1 => match &args[0] {
                    Value::Num(n) => Ok(Value::Num(n.round())),
                    other => Err(RuntimeFault::new(format!(
                        "round() does not apply to {}",
                        other.type_name()
                    ))),
                },
                2 => {
                    let digits = as_int(&args[1], "round()")?;
                    match &args[0] {
                        Value::Num(n) => {
                            let factor = 10f64.powi(digits as i32);
                            Ok(Value::Num((n * factor).round() / factor))
                        }
                        other => Err(RuntimeFault::new(format!(
                            "round() does not apply to {}",
                            other.type_name()
                        ))),
                    }
                }
                n => Err(RuntimeFault::new(format!(
                    "round() takes 1 or 2 arguments, got {}",
                    n
                ))),
            },
            "min" | "max" | "sum" => self.reduce_builtin(name, args),
            "str" => {
                let [value] = expect_args::<1>(name, args)?;
                Ok(Value::Str(display(&value)))
            }
            "print" => {
                let rendered: Vec<String> = args.iter().map(display).collect();
                tracing::debug!(target: "lab_copilot::sandbox", "print: {}", rendered.join(" "));
                Ok(Value::Unit)
            }
            other => Err(RuntimeFault::new(format!("unknown function: {}", other))),
        }
    }

    fn reduce_builtin(&mut self, name: &str, args: Vec<Value>) -> EvalResult {
        let numbers = match <[Value; 1]>::try_from(args) {
            Ok([only]) => numeric_items(into_list(only)?)?,
            Err(args) => numeric_items(args)?,
        };
        if numbers.is_empty() {
            return Err(RuntimeFault::new(format!("{}() of empty sequence", name)));
        }
        let result = match name {
            "min" => numbers.iter().cloned().fold(f64::INFINITY, f64::min),
            "max" => numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            _ => numbers.iter().sum(),
        };
        Ok(Value::Num(result))
    }

    // ── Methods ──────────────────────────────────────────────────

    fn call_method(&mut self, target: Value, name: &str, args: Vec<Value>) -> EvalResult {
        match target {
            Value::Frame(frame) => self.frame_method(frame, name, args),
            Value::Handle(Handle::Tab) => self.tab_method(name, args),
            Value::Handle(Handle::Chart) => self.chart_method(name, args),
            Value::Map(map) => match name {
                "get" => {
                    let [key] = expect_args::<1>(name, args)?;
                    let key = as_str(&key, "get()")?;
                    Ok(map.get(&key).cloned().unwrap_or(Value::Unit))
                }
                "keys" => Ok(Value::List(map.keys().cloned().map(Value::Str).collect())),
                other => Err(RuntimeFault::new(format!("map has no method {}", other))),
            },
            other => Err(RuntimeFault::new(format!(
                "{} has no method {}",
                other.type_name(),
                name
            ))),
        }
    }

    fn frame_method(&mut self, frame: DataFrame, name: &str, args: Vec<Value>) -> EvalResult {
        match name {
            "filter" => {
                let [predicate] = expect_args::<1>(name, args)?;
                let predicate = as_str(&predicate, "filter()")?;
                frame
                    .filter(&predicate)
                    .map(Value::Frame)
                    .map_err(|e| RuntimeFault::new(e.to_string()))
            }
            "aggregate" => {
                let [group, value, func] = expect_args::<3>(name, args)?;
                frame
                    .aggregate(
                        &as_str(&group, "aggregate()")?,
                        &as_str(&value, "aggregate()")?,
                        &as_str(&func, "aggregate()")?,
                    )
                    .map(Value::Frame)
                    .map_err(|e| RuntimeFault::new(e.to_string()))
            }
            "describe" => {
                expect_args::<0>(name, args)?;
                Ok(json_to_value(&serde_json::Value::Object(frame.describe())))
            }
            "head" => {
                let [n] = expect_args::<1>(name, args)?;
                let n = as_int(&n, "head()")?.max(0) as usize;
                Ok(Value::Frame(frame.head(n)))
            }
            "sort" => {
                let (column, descending) = match args.len() {
                    1 => (as_str(&args[0], "sort()")?, false),
                    2 => (
                        as_str(&args[0], "sort()")?,
                        matches!(args[1], Value::Bool(true)),
                    ),
                    n => {
                        return Err(RuntimeFault::new(format!(
                            "sort() takes 1 or 2 arguments, got {}",
                            n
                        )))
                    }
                };
                frame
                    .sort_by(&column, descending)
                    .map(Value::Frame)
                    .map_err(|e| RuntimeFault::new(e.to_string()))
            }
            "select" => {
                let [columns] = expect_args::<1>(name, args)?;
                let names = string_items(into_list(columns)?, "select()")?;
                frame
                    .select(&names)
                    .map(Value::Frame)
                    .map_err(|e| RuntimeFault::new(e.to_string()))
            }
            "column" => {
                let [column] = expect_args::<1>(name, args)?;
                let values = frame
                    .column_values(&as_str(&column, "column()")?)
                    .map_err(|e| RuntimeFault::new(e.to_string()))?;
                Ok(Value::List(values.iter().map(json_to_value).collect()))
            }
            "columns" => {
                expect_args::<0>(name, args)?;
                Ok(Value::List(
                    frame.columns().iter().cloned().map(Value::Str).collect(),
                ))
            }
            "row_count" => {
                expect_args::<0>(name, args)?;
                Ok(Value::Num(frame.row_count() as f64))
            }
            other => Err(RuntimeFault::new(format!("frame has no method {}", other))),
        }
    }

    fn tab_method(&mut self, name: &str, args: Vec<Value>) -> EvalResult {
        match name {
            "mean" | "median" | "std" | "sum" | "min" | "max" => {
                let [values] = expect_args::<1>(name, args)?;
                let numbers = numeric_items(into_list(values)?)?;
                if numbers.is_empty() {
                    return Err(RuntimeFault::new(format!("tab.{}() of empty sequence", name)));
                }
                let result = match name {
                    "mean" => numbers.iter().sum::<f64>() / numbers.len() as f64,
                    "median" => {
                        let mut sorted = numbers.clone();
                        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                        let mid = sorted.len() / 2;
                        if sorted.len() % 2 == 0 {
                            (sorted[mid - 1] + sorted[mid]) / 2.0
                        } else {
                            sorted[mid]
                        }
                    }
                    "std" => {
                        if numbers.len() < 2 {
                            return Err(RuntimeFault::new(
                                "tab.std() needs at least two values",
                            ));
                        }
                        let m = numbers.iter().sum::<f64>() / numbers.len() as f64;
                        (numbers.iter().map(|v| (v - m) * (v - m)).sum::<f64>()
                            / (numbers.len() - 1) as f64)
                            .sqrt()
                    }
                    "sum" => numbers.iter().sum(),
                    "min" => numbers.iter().cloned().fold(f64::INFINITY, f64::min),
                    _ => numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                };
                Ok(Value::Num(result))
            }
            "unique" => {
                let [values] = expect_args::<1>(name, args)?;
                let items = into_list(values)?;
                let mut unique: Vec<Value> = Vec::new();
                for item in items {
                    if !unique.iter().any(|u| values_equal(u, &item)) {
                        unique.push(item);
                    }
                }
                Ok(Value::List(unique))
            }
            "frame" => {
                let [columns, rows] = expect_args::<2>(name, args)?;
                let columns = string_items(into_list(columns)?, "tab.frame()")?;
                let mut out_rows = Vec::new();
                for row in into_list(rows)? {
                    let cells = into_list(row)?;
                    out_rows.push(cells.iter().map(value_to_json).collect());
                }
                Ok(Value::Frame(DataFrame::new(columns, out_rows)))
            }
            other => Err(RuntimeFault::new(format!("tab has no method {}", other))),
        }
    }

    fn chart_method(&mut self, name: &str, args: Vec<Value>) -> EvalResult {
        let plot_type = name;
        let build = |frame: &DataFrame,
                     x: &str,
                     y: Option<&str>,
                     title: Option<&str>|
         -> EvalResult {
            plot::generate(frame, plot_type, x, y, title)
                .map(Value::Chart)
                .map_err(|e| RuntimeFault::new(e.to_string()))
        };

        match name {
            "bar" | "pie" | "scatter" | "line" => {
                if args.len() < 3 || args.len() > 4 {
                    return Err(RuntimeFault::new(format!(
                        "chart.{}() takes (frame, x, y[, title])",
                        name
                    )));
                }
                let frame = as_frame(&args[0], name)?;
                let x = as_str(&args[1], name)?;
                let y = as_str(&args[2], name)?;
                let title = match args.get(3) {
                    Some(v) => Some(as_str(v, name)?),
                    None => None,
                };
                build(&frame, &x, Some(&y), title.as_deref())
            }
            "histogram" | "box" => {
                if args.len() < 2 || args.len() > 3 {
                    return Err(RuntimeFault::new(format!(
                        "chart.{}() takes (frame, column[, title])",
                        name
                    )));
                }
                let frame = as_frame(&args[0], name)?;
                let x = as_str(&args[1], name)?;
                let title = match args.get(2) {
                    Some(v) => Some(as_str(v, name)?),
                    None => None,
                };
                build(&frame, &x, None, title.as_deref())
            }
            other => Err(RuntimeFault::new(format!("chart has no method {}", other))),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn expect_args<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], RuntimeFault> {
    let count = args.len();
    args.try_into().map_err(|_| {
        RuntimeFault::new(format!("{}() takes {} argument(s), got {}", name, N, count))
    })
}

fn truthy(value: &Value) -> Result<bool, RuntimeFault> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Num(n) => Ok(*n != 0.0),
        Value::Str(s) => Ok(!s.is_empty()),
        Value::List(items) => Ok(!items.is_empty()),
        Value::Map(map) => Ok(!map.is_empty()),
        other => Err(RuntimeFault::new(format!(
            "{} has no truth value",
            other.type_name()
        ))),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Num(x), Value::Num(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Unit, Value::Unit) => true,
        _ => false,
    }
}

fn compare_for_sort(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a, b) {
        (Value::Num(x), Value::Num(y)) => x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => std::cmp::Ordering::Equal,
    }
}

fn numeric_op(
    left: &Value,
    right: &Value,
    symbol: &str,
    f: impl Fn(f64, f64) -> f64,
) -> EvalResult {
    match (left, right) {
        (Value::Num(a), Value::Num(b)) => Ok(Value::Num(f(*a, *b))),
        _ => Err(type_error(symbol, left, right)),
    }
}

fn type_error(op: &str, left: &Value, right: &Value) -> RuntimeFault {
    RuntimeFault::new(format!(
        "unsupported operand types for {}: {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn index_value(target: &Value, index: &Value) -> EvalResult {
    match (target, index) {
        (Value::List(items), Value::Num(n)) => {
            let idx = *n as i64;
            let idx = if idx < 0 { items.len() as i64 + idx } else { idx };
            if idx < 0 {
                return Err(RuntimeFault::new(format!("list index out of range: {}", n)));
            }
            items
                .get(idx as usize)
                .cloned()
                .ok_or_else(|| RuntimeFault::new(format!("list index out of range: {}", n)))
        }
        (Value::Map(map), Value::Str(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| RuntimeFault::new(format!("key not found: {}", key))),
        (Value::Frame(frame), Value::Str(column)) => {
            let values = frame
                .column_values(column)
                .map_err(|e| RuntimeFault::new(e.to_string()))?;
            Ok(Value::List(values.iter().map(json_to_value).collect()))
        }
        _ => Err(RuntimeFault::new(format!(
            "cannot index {} with {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

fn as_int(value: &Value, context: &str) -> Result<i64, RuntimeFault> {
    match value {
        Value::Num(n) if n.fract() == 0.0 => Ok(*n as i64),
        other => Err(RuntimeFault::new(format!(
            "{} expects an integer, got {}",
            context,
            other.type_name()
        ))),
    }
}

fn as_str(value: &Value, context: &str) -> Result<String, RuntimeFault> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        other => Err(RuntimeFault::new(format!(
            "{} expects a string, got {}",
            context,
            other.type_name()
        ))),
    }
}

fn as_frame(value: &Value, context: &str) -> Result<DataFrame, RuntimeFault> {
    match value {
        Value::Frame(frame) => Ok(frame.clone()),
        other => Err(RuntimeFault::new(format!(
            "chart.{}() expects a frame, got {}",
            context,
            other.type_name()
        ))),
    }
}

fn into_list(value: Value) -> Result<Vec<Value>, RuntimeFault> {
    match value {
        Value::List(items) => Ok(items),
        Value::Range(start, end) => {
            let span = end.checked_sub(start).filter(|s| *s <= MAX_RANGE_MATERIALIZE);
            if span.is_none() {
                return Err(RuntimeFault::new(format!(
                    "range {}..{} is too large to materialize",
                    start, end
                )));
            }
            Ok((start..end).map(|i| Value::Num(i as f64)).collect())
        }
        other => Err(RuntimeFault::new(format!(
            "expected a list, got {}",
            other.type_name()
        ))),
    }
}

fn numeric_items(items: Vec<Value>) -> Result<Vec<f64>, RuntimeFault> {
    items
        .iter()
        .map(|v| match v {
            Value::Num(n) => Ok(*n),
            other => Err(RuntimeFault::new(format!(
                "expected numbers, got {}",
                other.type_name()
            ))),
        })
        .collect()
}

fn string_items(items: Vec<Value>, context: &str) -> Result<Vec<String>, RuntimeFault> {
    items.iter().map(|v| as_str(v, context)).collect()
}

fn display(value: &Value) -> String {
    match value {
        Value::Num(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Value::Str(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(display).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Map(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, display(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Value::Frame(frame) => format!(
            "frame({} rows x {} columns)",
            frame.row_count(),
            frame.columns().len()
        ),
        Value::Chart(spec) => format!("chart({})", spec.plot_type),
        Value::Range(start, end) => format!("range({}, {})", start, end),
        Value::Handle(_) => "library".to_string(),
        Value::Unit => "()".to_string(),
    }
}

/// Convert an interpreter value to JSON for the sandbox output.
/// Frames are handled separately by the executor, which caps previews.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Num(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                json!(*n as i64)
            } else {
                json!(n)
            }
        }
        Value::Str(s) => json!(s),
        Value::Bool(b) => json!(b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => {
            let object: serde_json::Map<String, serde_json::Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect();
            serde_json::Value::Object(object)
        }
        Value::Frame(frame) => json!({
            "data": frame.records(100),
            "columns": frame.columns(),
            "row_count": frame.row_count(),
        }),
        Value::Chart(spec) => serde_json::to_value(spec).unwrap_or(serde_json::Value::Null),
        Value::Range(start, end) => json!({"start": start, "end": end}),
        Value::Handle(_) | Value::Unit => serde_json::Value::Null,
    }
}

fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Unit,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::script::parse;
    use std::time::Duration;

    fn frame() -> DataFrame {
        DataFrame::from_csv(
            b"gene,expression\nTP53,1.5\nBRCA1,2.5\nTP53,3.5\n",
            "genes.csv",
        )
        .expect("csv")
    }

    fn run(source: &str) -> Interpreter {
        let stmts = parse(source).expect("parse");
        let mut interp = Interpreter::new(frame(), Instant::now() + Duration::from_secs(5));
        interp.run(&stmts).expect("run");
        interp
    }

    #[test]
    fn arithmetic_and_assignment() {
        let interp = run("result = (2 + 3) * 4 - 1");
        match interp.binding("result") {
            Some(Value::Num(n)) => assert_eq!(*n, 19.0),
            other => panic!("unexpected binding: {:?}", other),
        }
    }

    #[test]
    fn for_loop_accumulates() {
        let interp = run("total = 0\nfor i in range(5) { total = total + i }\nresult = total");
        match interp.binding("result") {
            Some(Value::Num(n)) => assert_eq!(*n, 10.0),
            other => panic!("unexpected binding: {:?}", other),
        }
    }

    #[test]
    fn frame_filter_and_row_count() {
        let interp = run("result = df.filter('expression > 2').row_count()");
        match interp.binding("result") {
            Some(Value::Num(n)) => assert_eq!(*n, 2.0),
            other => panic!("unexpected binding: {:?}", other),
        }
    }

    #[test]
    fn frame_aggregate_in_script() {
        let interp = run("result = df.aggregate('gene', 'expression', 'mean')");
        match interp.binding("result") {
            Some(Value::Frame(f)) => assert_eq!(f.row_count(), 2),
            other => panic!("unexpected binding: {:?}", other),
        }
    }

    #[test]
    fn tab_mean_over_column() {
        let interp = run("result = tab.mean(df['expression'])");
        match interp.binding("result") {
            Some(Value::Num(n)) => assert_eq!(*n, 2.5),
            other => panic!("unexpected binding: {:?}", other),
        }
    }

    #[test]
    fn chart_builder_binds_fig() {
        let interp = run("fig = chart.bar(df, 'gene', 'expression', 'Expression')");
        match interp.binding("fig") {
            Some(Value::Chart(spec)) => {
                assert_eq!(spec.plot_type, "bar");
                assert_eq!(spec.title.as_deref(), Some("Expression"));
            }
            other => panic!("unexpected binding: {:?}", other),
        }
    }

    #[test]
    fn deadline_stops_busy_loop() {
        let stmts = parse("x = 0\nfor i in range(100000000) { x = x + 1 }").expect("parse");
        let mut interp = Interpreter::new(frame(), Instant::now() + Duration::from_millis(50));
        let fault = interp.run(&stmts).expect_err("should time out");
        assert!(fault.timed_out);
    }

    #[test]
    fn undefined_variable_is_a_fault() {
        let stmts = parse("result = nope + 1").expect("parse");
        let mut interp = Interpreter::new(frame(), Instant::now() + Duration::from_secs(5));
        let fault = interp.run(&stmts).expect_err("should fail");
        assert!(!fault.timed_out);
        assert!(fault.message.contains("nope"));
    }

    #[test]
    fn division_by_zero_is_a_fault() {
        let stmts = parse("x = 1 / 0").expect("parse");
        let mut interp = Interpreter::new(frame(), Instant::now() + Duration::from_secs(5));
        assert!(interp.run(&stmts).is_err());
    }

    #[test]
    fn no_file_or_import_capability() {
        for source in ["open('x')", "import os", "__builtins__"] {
            let stmts = match parse(source) {
                Ok(stmts) => stmts,
                // `import os` parses as two identifiers and is a syntax error.
                Err(_) => continue,
            };
            let mut interp = Interpreter::new(frame(), Instant::now() + Duration::from_secs(5));
            assert!(interp.run(&stmts).is_err(), "{} should not execute", source);
        }
    }

    #[test]
    fn huge_range_cannot_be_materialized() {
        let stmts = parse("x = sorted(range(100000000))").expect("parse");
        let mut interp = Interpreter::new(frame(), Instant::now() + Duration::from_secs(5));
        let fault = interp.run(&stmts).expect_err("should fail");
        assert!(fault.message.contains("too large"));
    }

    #[test]
    fn extreme_range_bounds_do_not_wrap() {
        // Span wider than i64: len saturates, materialization faults.
        let source = "result = len(range(-9000000000000000000, 9000000000000000000))";
        let interp = run(source);
        match interp.binding("result") {
            Some(Value::Num(n)) => assert!(*n > 0.0),
            other => panic!("unexpected binding: {:?}", other),
        }

        let stmts =
            parse("x = sorted(range(-9000000000000000000, 9000000000000000000))").expect("parse");
        let mut interp = Interpreter::new(frame(), Instant::now() + Duration::from_secs(5));
        let fault = interp.run(&stmts).expect_err("should fail");
        assert!(fault.message.contains("too large"), "{}", fault.message);
    }

    #[test]
    fn evaluator_bounds_expression_depth() {
        // Deeper than MAX_EVAL_DEPTH, built directly so no parser limit
        // applies: the evaluator must fault, not overflow the stack.
        let mut expr = Expr::Num(1.0);
        for _ in 0..2_000 {
            expr = Expr::Neg(Box::new(expr));
        }
        let stmts = vec![Stmt::Assign { name: "result".to_string(), expr }];
        let mut interp = Interpreter::new(frame(), Instant::now() + Duration::from_secs(5));
        let fault = interp.run(&stmts).expect_err("should fault");
        assert!(fault.message.contains("too deep"), "{}", fault.message);
    }

    #[test]
    fn if_else_branches() {
        let interp = run("if len(df) > 2 { result = 'big' } else { result = 'small' }");
        match interp.binding("result") {
            Some(Value::Str(s)) => assert_eq!(s, "big"),
            other => panic!("unexpected binding: {:?}", other),
        }
    }

    #[test]
    fn sorted_and_unique() {
        let interp = run("result = sorted(tab.unique(df['gene']))");
        match interp.binding("result") {
            Some(Value::List(items)) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(&items[0], Value::Str(s) if s == "BRCA1"));
            }
            other => panic!("unexpected binding: {:?}", other),
        }
    }
}

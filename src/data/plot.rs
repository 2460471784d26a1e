//! Chart generation: turns a frame + plot request into a serializable
//! [`ChartSpec`] the frontend can render.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::frame::{DataError, DataFrame};

pub const PLOT_TYPES: &[&str] = &["bar", "pie", "scatter", "line", "histogram", "box"];

/// Wire format for a chart: one or more traces plus presentation metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartSpec {
    pub plot_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub traces: Vec<Trace>,
}

/// A single series. `x` carries categories/labels, `y` carries values;
/// histogram traces use `x` only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub x: Vec<Value>,
    pub y: Vec<Value>,
}

/// Build a chart from the frame.
///
/// `y_column` is optional only for `histogram` and `box`; every other type
/// needs both axes.
pub fn generate(
    frame: &DataFrame,
    plot_type: &str,
    x_column: &str,
    y_column: Option<&str>,
    title: Option<&str>,
) -> Result<ChartSpec, DataError> {
    if !PLOT_TYPES.contains(&plot_type) {
        return Err(DataError::UnsupportedPlotType(plot_type.to_string()));
    }

    let x = frame.column_values(x_column)?;
    let y = match y_column {
        Some(name) => Some(frame.column_values(name)?),
        None => None,
    };

    let trace = match plot_type {
        "histogram" => Trace {
            name: Some(x_column.to_string()),
            x,
            y: Vec::new(),
        },
        "box" => {
            // Box plots accept a bare value column in x when no y is given.
            let (values, name) = match y {
                Some(values) => (values, y_column.unwrap_or(x_column)),
                None => (x, x_column),
            };
            Trace {
                name: Some(name.to_string()),
                x: Vec::new(),
                y: values,
            }
        }
        _ => {
            let y = y.ok_or_else(|| {
                DataError::InvalidPlot(format!("y_column is required for {} plots", plot_type))
            })?;
            Trace {
                name: y_column.map(|s| s.to_string()),
                x,
                y,
            }
        }
    };

    Ok(ChartSpec {
        plot_type: plot_type.to_string(),
        title: title.map(|s| s.to_string()),
        traces: vec![trace],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> DataFrame {
        DataFrame::from_csv(b"gene,expression\nTP53,1.5\nBRCA1,2.5\n", "s.csv").expect("csv")
    }

    #[test]
    fn bar_chart_carries_both_axes() {
        let spec = generate(&sample(), "bar", "gene", Some("expression"), Some("Expr"))
            .expect("generate");
        assert_eq!(spec.plot_type, "bar");
        assert_eq!(spec.title.as_deref(), Some("Expr"));
        assert_eq!(spec.traces[0].x, vec![json!("TP53"), json!("BRCA1")]);
        assert_eq!(spec.traces[0].y, vec![json!(1.5), json!(2.5)]);
    }

    #[test]
    fn histogram_needs_only_x() {
        let spec = generate(&sample(), "histogram", "expression", None, None).expect("generate");
        assert_eq!(spec.traces[0].x.len(), 2);
        assert!(spec.traces[0].y.is_empty());
    }

    #[test]
    fn scatter_without_y_is_rejected() {
        assert!(matches!(
            generate(&sample(), "scatter", "gene", None, None),
            Err(DataError::InvalidPlot(_))
        ));
    }

    #[test]
    fn unknown_plot_type_is_rejected() {
        assert!(matches!(
            generate(&sample(), "area", "gene", None, None),
            Err(DataError::UnsupportedPlotType(_))
        ));
    }

    #[test]
    fn unknown_column_is_rejected() {
        assert!(matches!(
            generate(&sample(), "bar", "missing", Some("expression"), None),
            Err(DataError::UnknownColumn(_))
        ));
    }
}

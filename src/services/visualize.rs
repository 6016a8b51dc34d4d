//! Plotly trace and layout builders.
//!
//! Everything here is reshaping of raw column values; the only arithmetic is
//! bin sizing, kernel density curves and per-group confidence intervals.

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use crate::error::AppError;
use crate::services::columns::{
    column, is_integer_dtype, numeric_non_missing, numeric_values, paired_values, split_by_group, text_values,
};
use crate::services::stats::{self, finite, t_critical};
use crate::services::summary::value_counts;

const DENSITY_POINTS: usize = 200;
const MIN_BINS: usize = 10;
const MAX_BINS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    Histogram,
    Boxplot,
    Violin,
    Density,
    MeanCi,
    Barplot,
    Scatter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarMode {
    Group,
    Stack,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlotVariables {
    pub numeric: Option<String>,
    pub categorical: Option<String>,
    pub stack_var: Option<String>,
    pub x_var: Option<String>,
    pub y_var: Option<String>,
    pub color_var: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VisualizeRequest {
    pub plot_type: PlotKind,
    #[serde(default)]
    pub variables: PlotVariables,
    pub bar_mode: Option<BarMode>,
}

#[derive(Debug, Serialize)]
pub struct Plot {
    pub data: Vec<Value>,
    pub layout: Value,
}

#[derive(Debug, Serialize)]
pub struct VisualizeResponse {
    pub file_id: String,
    pub plot_type: PlotKind,
    pub plotly_data: Vec<Value>,
    pub plotly_layout: Value,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, AppError> {
    non_empty(value).ok_or_else(|| AppError::InvalidInput(format!("Missing required variable: {}", name)))
}

fn legend() -> Value {
    json!({
        "xanchor": "center",
        "x": 0.5,
        "yanchor": "bottom",
        "y": 1,
        "bgcolor": "rgba(200, 200, 200, 0.8)",
        "bordercolor": "rgba(100, 100, 100, 0.6)",
        "borderwidth": 1,
        "orientation": "h"
    })
}

fn top_legend() -> Value {
    json!({"x": 0.5, "y": 1, "xanchor": "center", "yanchor": "top"})
}

/// Numeric values as a single series or split by a grouping column.
fn series_or_groups(df: &DataFrame, numeric: &str, group: Option<&str>) -> Result<Vec<(String, Vec<f64>)>, AppError> {
    match group {
        Some(group) => split_by_group(df, numeric, group),
        None => Ok(vec![(numeric.to_string(), numeric_non_missing(column(df, numeric)?)?)]),
    }
}

pub fn build(df: &DataFrame, request: &VisualizeRequest) -> Result<Plot, AppError> {
    let vars = &request.variables;
    match request.plot_type {
        PlotKind::Histogram => histogram(df, required(&vars.numeric, "numeric")?, non_empty(&vars.categorical)),
        PlotKind::Boxplot => raw_distribution(df, required(&vars.numeric, "numeric")?, non_empty(&vars.categorical), false),
        PlotKind::Violin => raw_distribution(df, required(&vars.numeric, "numeric")?, non_empty(&vars.categorical), true),
        PlotKind::Density => density(df, required(&vars.numeric, "numeric")?, non_empty(&vars.categorical)),
        PlotKind::MeanCi => mean_ci(df, required(&vars.numeric, "numeric")?, non_empty(&vars.categorical)),
        PlotKind::Barplot => barplot(
            df,
            required(&vars.categorical, "categorical")?,
            non_empty(&vars.stack_var),
            request.bar_mode,
        ),
        PlotKind::Scatter => scatter(
            df,
            required(&vars.x_var, "x_var")?,
            required(&vars.y_var, "y_var")?,
            non_empty(&vars.color_var),
        ),
    }
}

/// Shared bin width for all histogram traces: Freedman-Diaconis, Sturges when
/// the IQR collapses, then clamped to a sane number of bins.
pub fn bin_width(values: &[f64], integer: bool) -> f64 {
    let sorted = stats::sorted(values);
    let (lo, hi) = match (sorted.first(), sorted.last()) {
        (Some(lo), Some(hi)) => (*lo, *hi),
        _ => return 1.0,
    };
    let range = hi - lo;
    if range == 0.0 {
        return 1.0;
    }

    let iqr = stats::quantile_sorted(&sorted, 0.75) - stats::quantile_sorted(&sorted, 0.25);
    let mut width = if iqr > 0.0 {
        2.0 * iqr / (sorted.len() as f64).cbrt()
    } else {
        let sturges = ((sorted.len() as f64).log2() as usize + 1).clamp(MIN_BINS, 50);
        range / sturges as f64
    };
    if integer && width < 1.0 {
        width = 1.0;
    }

    let bins = (range / width) as usize + 1;
    let clamped = bins.clamp(MIN_BINS, MAX_BINS);
    if clamped != bins {
        width = range / clamped as f64;
    }
    width
}

fn histogram(df: &DataFrame, numeric: &str, group: Option<&str>) -> Result<Plot, AppError> {
    let series = column(df, numeric)?;
    let all = numeric_non_missing(series)?;
    if all.is_empty() {
        return Ok(Plot { data: Vec::new(), layout: json!({}) });
    }
    let xbins = json!({
        "start": stats::min(&all),
        "end": stats::max(&all),
        "size": bin_width(&all, is_integer_dtype(series)),
    });

    let data = series_or_groups(df, numeric, group)?
        .into_iter()
        .map(|(name, values)| {
            let mut trace = json!({"x": values, "type": "histogram", "name": name, "xbins": xbins.clone()});
            if group.is_some() {
                trace["opacity"] = json!(0.7);
            }
            trace
        })
        .collect();

    let mut layout = json!({
        "title": format!("Histogram of {}", numeric),
        "xaxis": {"title": numeric},
        "yaxis": {"title": "Count"},
        "barmode": if group.is_some() { "overlay" } else { "stack" },
        "bargap": 0.1
    });
    if group.is_some() {
        layout["legend"] = legend();
    }
    Ok(Plot { data, layout })
}

fn raw_distribution(df: &DataFrame, numeric: &str, group: Option<&str>, violin: bool) -> Result<Plot, AppError> {
    let data = series_or_groups(df, numeric, group)?
        .into_iter()
        .map(|(name, values)| {
            if violin {
                json!({
                    "y": values,
                    "type": "violin",
                    "name": name,
                    "box": {"visible": true},
                    "meanline": {"visible": true}
                })
            } else {
                json!({"y": values, "type": "box", "name": name})
            }
        })
        .collect();

    let title = if violin { "Violin Plot" } else { "Box Plot" };
    let mut layout = json!({
        "title": format!("{} of {}", title, numeric),
        "yaxis": {"title": numeric}
    });
    if group.is_some() {
        layout["legend"] = legend();
    }
    Ok(Plot { data, layout })
}

/// Gaussian KDE with Scott's bandwidth evaluated on an even grid over the
/// observed range. `None` when the bandwidth would be zero.
pub fn kde_curve(values: &[f64], points: usize) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = values.len();
    if n < 2 || points < 2 {
        return None;
    }
    let bandwidth = stats::std_dev(values) * (n as f64).powf(-0.2);
    if bandwidth.is_nan() || bandwidth <= 0.0 {
        return None;
    }
    let (lo, hi) = (stats::min(values), stats::max(values));
    let step = (hi - lo) / (points - 1) as f64;
    let norm = 1.0 / (n as f64 * bandwidth * (2.0 * std::f64::consts::PI).sqrt());

    let xs: Vec<f64> = (0..points)
        .map(|i| if i + 1 == points { hi } else { lo + step * i as f64 })
        .collect();
    let ys = xs
        .iter()
        .map(|x| {
            norm * values
                .iter()
                .map(|v| {
                    let z = (x - v) / bandwidth;
                    (-0.5 * z * z).exp()
                })
                .sum::<f64>()
        })
        .collect();
    Some((xs, ys))
}

fn density(df: &DataFrame, numeric: &str, group: Option<&str>) -> Result<Plot, AppError> {
    let data = series_or_groups(df, numeric, group)?
        .into_iter()
        .filter_map(|(name, values)| {
            let (xs, ys) = kde_curve(&values, DENSITY_POINTS)?;
            let mut trace = json!({
                "x": xs,
                "y": ys,
                "type": "scatter",
                "mode": "lines",
                "name": name,
                "fill": "tozeroy"
            });
            if group.is_some() {
                trace["opacity"] = json!(0.6);
            }
            Some(trace)
        })
        .collect();

    let mut layout = json!({
        "title": format!("Density Plot of {}", numeric),
        "xaxis": {"title": numeric},
        "yaxis": {"title": "Density"}
    });
    if group.is_some() {
        layout["legend"] = legend();
    }
    Ok(Plot { data, layout })
}

fn mean_ci(df: &DataFrame, numeric: &str, group: Option<&str>) -> Result<Plot, AppError> {
    let mut labels = Vec::new();
    let mut means = Vec::new();
    let mut errors = Vec::new();
    for (name, values) in series_or_groups(df, numeric, group)? {
        if values.len() < 2 {
            continue;
        }
        let n = values.len() as f64;
        let sem = stats::std_dev(&values) / n.sqrt();
        let t = t_critical(n - 1.0, 0.95)?;
        labels.push(name);
        means.push(finite(stats::mean(&values)));
        errors.push(finite(t * sem));
    }

    let trace = json!({
        "x": labels,
        "y": means,
        "error_y": {"type": "data", "array": errors, "visible": true},
        "type": "scatter",
        "mode": "markers",
        "marker": {"size": 10},
        "name": numeric
    });
    let mut layout = json!({
        "title": format!("Mean ± 95% CI: {}", numeric),
        "yaxis": {"title": numeric}
    });
    if group.is_some() {
        layout["legend"] = legend();
    }
    Ok(Plot { data: vec![trace], layout })
}

fn bar_trace(name: &str, values: &[Option<String>]) -> Value {
    let (x, y): (Vec<String>, Vec<usize>) = value_counts(values).into_iter().unzip();
    json!({"x": x, "y": y, "type": "bar", "name": name})
}

fn barplot(df: &DataFrame, categorical: &str, stack: Option<&str>, mode: Option<BarMode>) -> Result<Plot, AppError> {
    let values = text_values(column(df, categorical)?)?;
    let data = match stack {
        Some(stack) => {
            let stack_labels = text_values(column(df, stack)?)?;
            let mut groups: Vec<(String, Vec<Option<String>>)> = Vec::new();
            for (label, value) in stack_labels.into_iter().zip(values) {
                let Some(label) = label else { continue };
                match groups.iter_mut().find(|(g, _)| *g == label) {
                    Some((_, members)) => members.push(value),
                    None => groups.push((label, vec![value])),
                }
            }
            groups.iter().map(|(name, members)| bar_trace(name, members)).collect()
        }
        None => vec![bar_trace(categorical, &values)],
    };

    let mode = mode.unwrap_or(if stack.is_some() { BarMode::Group } else { BarMode::Stack });
    let mut layout = json!({
        "title": format!("Bar Plot of {}", categorical),
        "xaxis": {"title": categorical},
        "yaxis": {"title": "Count"},
        "barmode": mode
    });
    if stack.is_some() {
        layout["legend"] = top_legend();
    }
    Ok(Plot { data, layout })
}

fn scatter(df: &DataFrame, x_var: &str, y_var: &str, color: Option<&str>) -> Result<Plot, AppError> {
    let data = match color {
        Some(color) => {
            let labels = text_values(column(df, color)?)?;
            let xs = numeric_values(column(df, x_var)?)?;
            let ys = numeric_values(column(df, y_var)?)?;
            let mut groups: Vec<(String, Vec<f64>, Vec<f64>)> = Vec::new();
            let mut seen: Vec<String> = Vec::new();
            for ((label, x), y) in labels.into_iter().zip(xs).zip(ys) {
                let Some(label) = label else { continue };
                let slot = match seen.iter().position(|s| *s == label) {
                    Some(i) => i,
                    None => {
                        seen.push(label.clone());
                        groups.push((label, Vec::new(), Vec::new()));
                        groups.len() - 1
                    }
                };
                if let (Some(x), Some(y)) = (x, y) {
                    groups[slot].1.push(x);
                    groups[slot].2.push(y);
                }
            }
            groups
                .into_iter()
                .map(|(name, x, y)| json!({"x": x, "y": y, "mode": "markers", "type": "scatter", "name": name}))
                .collect()
        }
        None => {
            let (x, y) = paired_values(df, x_var, y_var)?;
            vec![json!({
                "x": x,
                "y": y,
                "mode": "markers",
                "type": "scatter",
                "name": format!("{} vs {}", x_var, y_var)
            })]
        }
    };

    let mut layout = json!({
        "title": format!("{} vs {}", y_var, x_var),
        "xaxis": {"title": x_var},
        "yaxis": {"title": y_var}
    });
    if color.is_some() {
        layout["legend"] = top_legend();
    }
    Ok(Plot { data, layout })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use polars::prelude::*;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Series::new("value", vec![Some(1.0), Some(2.0), Some(2.5), None, Some(4.0), Some(7.5)]),
            Series::new("other", vec![Some(2.0), None, Some(5.0), Some(1.0), Some(8.0), Some(3.0)]),
            Series::new("team", vec!["red", "blue", "red", "blue", "red", "blue"]),
            Series::new("size", vec!["s", "m", "s", "l", "s", "m"]),
        ])
        .unwrap()
    }

    fn request(plot_type: PlotKind, variables: PlotVariables) -> VisualizeRequest {
        VisualizeRequest { plot_type, variables, bar_mode: None }
    }

    fn numeric(group: Option<&str>) -> PlotVariables {
        PlotVariables {
            numeric: Some("value".to_string()),
            categorical: group.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn plot_kind_wire_names() {
        let kind: PlotKind = serde_json::from_str("\"mean_ci\"").unwrap();
        assert_eq!(kind, PlotKind::MeanCi);
        assert!(serde_json::from_str::<PlotKind>("\"pie\"").is_err());
    }

    #[test]
    fn bin_width_respects_bin_limits() {
        let wide: Vec<f64> = (0..1000).map(|i| (i * i) as f64).collect();
        let width = bin_width(&wide, false);
        let bins = (999.0 * 999.0 / width).round() as usize;
        assert!(bins <= MAX_BINS);

        let narrow = vec![0.0, 1.0, 2.0, 3.0];
        assert!((bin_width(&narrow, false) - 0.3).abs() < 1e-12);
        assert_eq!(bin_width(&[5.0, 5.0, 5.0], false), 1.0);
    }

    #[test]
    fn grouped_histogram_shares_bins() {
        let plot = build(&frame(), &request(PlotKind::Histogram, numeric(Some("team")))).unwrap();
        assert_eq!(plot.data.len(), 2);
        assert_eq!(plot.data[0]["xbins"], plot.data[1]["xbins"]);
        assert_eq!(plot.data[0]["name"], "red");
        assert_eq!(plot.layout["barmode"], "overlay");
        assert_eq!(plot.data[0]["xbins"]["start"], 1.0);
    }

    #[test]
    fn density_has_fixed_grid() {
        let plot = build(&frame(), &request(PlotKind::Density, numeric(None))).unwrap();
        assert_eq!(plot.data[0]["x"].as_array().unwrap().len(), DENSITY_POINTS);
        assert_eq!(plot.data[0]["x"][0], 1.0);
        assert_eq!(plot.data[0]["x"][DENSITY_POINTS - 1], 7.5);
        assert!(kde_curve(&[3.0, 3.0, 3.0], DENSITY_POINTS).is_none());
    }

    #[test]
    fn mean_ci_uses_t_interval() {
        let plot = build(&frame(), &request(PlotKind::MeanCi, numeric(Some("team")))).unwrap();
        let trace = &plot.data[0];
        assert_eq!(trace["x"], json!(["red", "blue"]));
        // red: 1, 2.5, 4 -> sd 1.5, sem 0.866, t(2) = 4.303
        let err = trace["error_y"]["array"][0].as_f64().unwrap();
        assert!((err - 4.302652729749464 * 1.5 / 3f64.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn barplot_orders_by_count_and_honours_mode() {
        let vars = PlotVariables { categorical: Some("size".to_string()), ..Default::default() };
        let plot = build(&frame(), &request(PlotKind::Barplot, vars.clone())).unwrap();
        assert_eq!(plot.data[0]["x"], json!(["s", "m", "l"]));
        assert_eq!(plot.data[0]["y"], json!([3, 2, 1]));
        assert_eq!(plot.layout["barmode"], "stack");

        let stacked = PlotVariables { stack_var: Some("team".to_string()), ..vars };
        let mut req = request(PlotKind::Barplot, stacked);
        req.bar_mode = Some(BarMode::Stack);
        let plot = build(&frame(), &req).unwrap();
        assert_eq!(plot.data.len(), 2);
        assert_eq!(plot.layout["barmode"], "stack");
    }

    #[test]
    fn scatter_drops_incomplete_pairs() {
        let vars = PlotVariables {
            x_var: Some("value".to_string()),
            y_var: Some("other".to_string()),
            ..Default::default()
        };
        let plot = build(&frame(), &request(PlotKind::Scatter, vars)).unwrap();
        assert_eq!(plot.data[0]["x"], json!([1.0, 2.5, 4.0, 7.5]));
        assert_eq!(plot.data[0]["y"], json!([2.0, 5.0, 8.0, 3.0]));
        assert_eq!(plot.layout["title"], "other vs value");
    }

    #[test]
    fn missing_and_unknown_variables() {
        let err = build(&frame(), &request(PlotKind::Boxplot, PlotVariables::default())).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let vars = PlotVariables { numeric: Some("ghost".to_string()), ..Default::default() };
        let err = build(&frame(), &request(PlotKind::Violin, vars)).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}

//! Value access over stored polars columns.
//!
//! Every statistic in the service works on plain vectors of `Option<f64>` or
//! `Option<String>`; this module is the only place that knows how polars
//! dtypes map onto those two views.

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use crate::error::AppError;

pub fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series, AppError> {
    df.column(name)
        .map_err(|_| AppError::NotFound(format!("Variable '{}' not found", name)))
}

/// Numeric storage in the pandas sense, booleans included.
pub fn is_numeric_dtype(series: &Series) -> bool {
    series.dtype().is_numeric() || matches!(series.dtype(), DataType::Boolean)
}

pub fn is_integer_dtype(series: &Series) -> bool {
    series.dtype().is_integer()
}

/// Best-effort numeric parse of a single cell. Non-finite results count as
/// unparseable.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// String rendering of every cell, `None` for missing.
pub fn text_values(series: &Series) -> Result<Vec<Option<String>>, AppError> {
    let values = match series.dtype() {
        DataType::String => series
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect(),
        DataType::Boolean => series
            .bool()?
            .into_iter()
            .map(|v| v.map(|b| if b { "True".to_string() } else { "False".to_string() }))
            .collect(),
        dt if dt.is_integer() => {
            let cast = series.cast(&DataType::Int64)?;
            let values = cast.i64()?.into_iter().map(|v| v.map(|i| i.to_string())).collect();
            values
        }
        dt if dt.is_float() => {
            let cast = series.cast(&DataType::Float64)?;
            let values = cast
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()).map(format_number))
                .collect();
            values
        }
        _ => {
            let cast = series.cast(&DataType::String)?;
            let values = cast.str()?.into_iter().map(|v| v.map(str::to_string)).collect();
            values
        }
    };
    Ok(values)
}

/// Numeric coercion of every cell. Missing and unparseable cells are `None`.
pub fn numeric_values(series: &Series) -> Result<Vec<Option<f64>>, AppError> {
    let values = match series.dtype() {
        DataType::Boolean => series
            .bool()?
            .into_iter()
            .map(|v| v.map(|b| if b { 1.0 } else { 0.0 }))
            .collect(),
        dt if dt.is_numeric() => {
            let cast = series.cast(&DataType::Float64)?;
            let values = cast
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()))
                .collect();
            values
        }
        _ => text_values(series)?
            .into_iter()
            .map(|v| v.as_deref().and_then(parse_number))
            .collect(),
    };
    Ok(values)
}

/// Non-missing numeric values of a column, in row order.
pub fn numeric_non_missing(series: &Series) -> Result<Vec<f64>, AppError> {
    Ok(numeric_values(series)?.into_iter().flatten().collect())
}

pub fn missing_count(series: &Series) -> usize {
    series.null_count()
        + match series.dtype() {
            dt if dt.is_float() => series
                .cast(&DataType::Float64)
                .ok()
                .and_then(|s| s.f64().ok().map(|ca| ca.into_iter().filter(|v| matches!(v, Some(x) if !x.is_finite())).count()))
                .unwrap_or(0),
            _ => 0,
        }
}

pub fn missing_percent(missing: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(missing as f64 / total as f64 * 100.0, 2)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Distinct non-missing values in order of first appearance.
pub fn distinct_in_order(values: &[Option<String>]) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .iter()
        .flatten()
        .filter(|v| seen.insert(v.as_str()))
        .cloned()
        .collect()
}

/// Sort category labels numerically when every label parses, else lexically.
pub fn sort_labels(labels: &mut [String]) {
    if labels.iter().all(|l| parse_number(l).is_some()) {
        labels.sort_by(|a, b| {
            let (x, y) = (parse_number(a).unwrap_or(0.0), parse_number(b).unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal)
        });
    } else {
        labels.sort();
    }
}

/// Seeded random subset of at most `size` values, kept in their original order.
pub fn sample_in_order<T: Clone>(values: &[T], size: usize, seed: u64) -> Vec<T> {
    if values.len() <= size {
        return values.to_vec();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = sample(&mut rng, values.len(), size).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| values[i].clone()).collect()
}

/// Numeric values split by the distinct labels of a grouping column, labels
/// in order of first appearance.
pub fn split_by_group(df: &DataFrame, numeric: &str, categorical: &str) -> Result<Vec<(String, Vec<f64>)>, AppError> {
    let values = numeric_values(column(df, numeric)?)?;
    let labels = text_values(column(df, categorical)?)?;

    let mut groups: Vec<(String, Vec<f64>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (label, value) in labels.into_iter().zip(values) {
        let Some(label) = label else { continue };
        let slot = match index.get(&label) {
            Some(&i) => i,
            None => {
                index.insert(label.clone(), groups.len());
                groups.push((label, Vec::new()));
                groups.len() - 1
            }
        };
        if let Some(v) = value {
            groups[slot].1.push(v);
        }
    }
    Ok(groups)
}

/// Rows where both columns hold a number.
pub fn paired_values(df: &DataFrame, var1: &str, var2: &str) -> Result<(Vec<f64>, Vec<f64>), AppError> {
    let a = numeric_values(column(df, var1)?)?;
    let b = numeric_values(column(df, var2)?)?;
    Ok(a.into_iter().zip(b).filter_map(|(x, y)| Some((x?, y?))).unzip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_number_accepts_finite_only() {
        assert_eq!(parse_number(" 3.5 "), Some(3.5));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn numeric_values_coerce_strings() {
        let s = Series::new("v", vec![Some("1"), Some("x"), None, Some("2.5")]);
        let values = numeric_values(&s).unwrap();
        assert_eq!(values, vec![Some(1.0), None, None, Some(2.5)]);
    }

    #[test]
    fn text_values_render_floats_like_pandas() {
        let s = Series::new("v", vec![Some(3.0), Some(2.5), None]);
        let values = text_values(&s).unwrap();
        assert_eq!(values, vec![Some("3.0".to_string()), Some("2.5".to_string()), None]);

        let ints = Series::new("i", vec![Some(7i64), None]);
        assert_eq!(text_values(&ints).unwrap(), vec![Some("7".to_string()), None]);
    }

    #[test]
    fn distinct_keeps_first_appearance() {
        let values = vec![Some("b".to_string()), None, Some("a".to_string()), Some("b".to_string())];
        assert_eq!(distinct_in_order(&values), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn labels_sort_numerically_when_possible() {
        let mut labels = vec!["10".to_string(), "9".to_string(), "2".to_string()];
        sort_labels(&mut labels);
        assert_eq!(labels, vec!["2", "9", "10"]);

        let mut words = vec!["b".to_string(), "a".to_string()];
        sort_labels(&mut words);
        assert_eq!(words, vec!["a", "b"]);
    }

    #[test]
    fn seeded_sample_is_stable_and_ordered() {
        let values: Vec<usize> = (0..50).collect();
        let a = sample_in_order(&values, 10, 42);
        let b = sample_in_order(&values, 10, 42);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sample_in_order(&values[..3], 10, 42), vec![0, 1, 2]);
    }

    #[test]
    fn missing_counts_nulls_and_nan() {
        let s = Series::new("v", vec![Some(1.0), None, Some(f64::NAN)]);
        assert_eq!(missing_count(&s), 2);
        assert_eq!(missing_percent(1, 3), 33.33);
    }
}

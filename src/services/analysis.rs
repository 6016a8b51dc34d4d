use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use indexmap::IndexMap;
use crate::error::AppError;
use crate::services::columns::{is_numeric_dtype, numeric_non_missing, numeric_values};
use crate::services::stats::{self, correlation::pearson_r, finite, normality};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    #[default]
    Descriptive,
    Correlation,
    Distribution,
}

#[derive(Debug, Serialize)]
pub struct DescriptiveStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    #[serde(rename = "25%")]
    pub p25: Option<f64>,
    #[serde(rename = "50%")]
    pub p50: Option<f64>,
    #[serde(rename = "75%")]
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct CorrelationMatrix {
    pub correlation_matrix: IndexMap<String, IndexMap<String, f64>>,
    pub columns: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DistributionStats {
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    pub shapiro_p_value: Option<f64>,
    pub is_normal: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AnalysisResults {
    Descriptive(IndexMap<String, DescriptiveStats>),
    Correlation(CorrelationMatrix),
    Distribution(IndexMap<String, DistributionStats>),
}

/// Requested columns that exist and have numeric storage, in request order.
pub fn numeric_columns(df: &DataFrame, requested: &[String]) -> Result<Vec<String>, AppError> {
    if requested.is_empty() {
        return Err(AppError::InvalidInput("No columns specified".to_string()));
    }
    let columns: Vec<String> = requested
        .iter()
        .filter(|name| df.column(name).map(is_numeric_dtype).unwrap_or(false))
        .cloned()
        .collect();
    if columns.is_empty() {
        return Err(AppError::InvalidInput("No valid numeric columns found".to_string()));
    }
    Ok(columns)
}

pub fn run(df: &DataFrame, analysis_type: AnalysisType, columns: &[String], seed: u64) -> Result<AnalysisResults, AppError> {
    Ok(match analysis_type {
        AnalysisType::Descriptive => AnalysisResults::Descriptive(descriptive(df, columns)?),
        AnalysisType::Correlation => AnalysisResults::Correlation(correlation_matrix(df, columns)?),
        AnalysisType::Distribution => AnalysisResults::Distribution(distribution(df, columns, seed)?),
    })
}

pub fn descriptive(df: &DataFrame, columns: &[String]) -> Result<IndexMap<String, DescriptiveStats>, AppError> {
    let rows = columns
        .par_iter()
        .map(|name| -> Result<Option<(String, DescriptiveStats)>, AppError> {
            let xs = numeric_non_missing(df.column(name)?)?;
            if xs.is_empty() {
                return Ok(None);
            }
            let ordered = stats::sorted(&xs);
            Ok(Some((
                name.clone(),
                DescriptiveStats {
                    count: xs.len(),
                    mean: finite(stats::mean(&xs)),
                    std: finite(stats::std_dev(&xs)),
                    min: ordered.first().copied(),
                    p25: finite(stats::quantile_sorted(&ordered, 0.25)),
                    p50: finite(stats::quantile_sorted(&ordered, 0.5)),
                    p75: finite(stats::quantile_sorted(&ordered, 0.75)),
                    max: ordered.last().copied(),
                },
            )))
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    Ok(rows.into_iter().flatten().collect())
}

/// Pairwise-complete Pearson matrix. Undefined entries, including the
/// diagonal of a constant column, are reported as 0.
pub fn correlation_matrix(df: &DataFrame, columns: &[String]) -> Result<CorrelationMatrix, AppError> {
    let values: Vec<Vec<Option<f64>>> = columns
        .iter()
        .map(|name| numeric_values(df.column(name)?))
        .collect::<Result<_, AppError>>()?;

    let mut matrix: IndexMap<String, IndexMap<String, f64>> = IndexMap::new();
    for (i, a) in columns.iter().enumerate() {
        let row = matrix.entry(a.clone()).or_default();
        for (j, b) in columns.iter().enumerate() {
            let (x, y): (Vec<f64>, Vec<f64>) = values[i]
                .iter()
                .zip(&values[j])
                .filter_map(|(p, q)| Some(((*p)?, (*q)?)))
                .unzip();
            row.insert(b.clone(), pearson_r(&x, &y).unwrap_or(0.0));
        }
    }

    Ok(CorrelationMatrix { correlation_matrix: matrix, columns: columns.to_vec() })
}

pub fn distribution(df: &DataFrame, columns: &[String], seed: u64) -> Result<IndexMap<String, DistributionStats>, AppError> {
    let rows = columns
        .par_iter()
        .map(|name| -> Result<Option<(String, DistributionStats)>, AppError> {
            let xs = numeric_non_missing(df.column(name)?)?;
            if xs.len() < 3 {
                return Ok(None);
            }
            match normality::shapiro_wilk_sampled(&xs, seed) {
                Ok(shapiro) => Ok(Some((
                    name.clone(),
                    DistributionStats {
                        skewness: stats::skewness(&xs),
                        kurtosis: stats::excess_kurtosis(&xs),
                        shapiro_p_value: finite(shapiro.p_value),
                        is_normal: shapiro.p_value > 0.05,
                    },
                ))),
                Err(e) => {
                    tracing::warn!("Could not analyze distribution for {}: {}", name, e);
                    Ok(None)
                }
            }
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    Ok(rows.into_iter().flatten().collect())
}

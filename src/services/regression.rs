use indexmap::IndexMap;
use nalgebra::DVector;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use crate::error::AppError;
use crate::models::AssumptionCheck;
use crate::services::columns::{column, distinct_in_order, numeric_values, sort_labels, text_values};
use crate::services::stats::{self, finite, linear_model, normality, StatsError};

/// VIF at or above this flags multicollinearity.
const VIF_LIMIT: f64 = 5.0;
const INTERCEPT: &str = "const";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegressionKind {
    Linear,
    Logistic,
}

impl RegressionKind {
    fn wrap(&self, err: StatsError) -> AppError {
        let message = self.prefixed(&err.to_string());
        if err.is_input_problem() {
            AppError::InvalidInput(message)
        } else {
            AppError::Computation(message)
        }
    }

    fn prefixed(&self, message: &str) -> String {
        match self {
            RegressionKind::Linear => format!("Error in linear regression: {}", message),
            RegressionKind::Logistic => format!("Error in logistic regression: {}", message),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegressionVariables {
    pub dependent: Option<String>,
    #[serde(default)]
    pub independent: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegressionRequest {
    pub file_id: String,
    #[serde(default)]
    pub variables: RegressionVariables,
}

impl RegressionVariables {
    pub fn validate(&self) -> Result<(&str, &[String]), AppError> {
        let dependent = self
            .dependent
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| AppError::InvalidInput("Missing required variable: dependent".to_string()))?;
        if self.independent.is_empty() {
            return Err(AppError::InvalidInput(
                "Missing required variables: independent (at least one)".to_string(),
            ));
        }
        Ok((dependent, &self.independent))
    }
}

/// Complete-case data ready for fitting.
#[derive(Debug)]
pub struct Prepared {
    pub y: Vec<f64>,
    pub names: Vec<String>,
    pub columns: Vec<Vec<f64>>,
}

impl Prepared {
    pub fn n(&self) -> usize {
        self.y.len()
    }
}

/// Numeric coding of one independent variable: the column itself when every
/// non-missing value parses, otherwise treatment-coded dummies with the first
/// sorted level as reference.
fn encode_predictor(df: &DataFrame, name: &str) -> Result<Vec<(String, Vec<Option<f64>>)>, AppError> {
    let series = column(df, name)?;
    let numbers = numeric_values(series)?;
    let texts = text_values(series)?;
    let present = texts.iter().filter(|t| t.is_some()).count();
    let parsed = numbers.iter().filter(|v| v.is_some()).count();

    if present > 0 && parsed == present {
        return Ok(vec![(name.to_string(), numbers)]);
    }

    let mut levels = distinct_in_order(&texts);
    sort_labels(&mut levels);
    Ok(levels
        .iter()
        .skip(1)
        .map(|level| {
            let dummy = texts
                .iter()
                .map(|t| t.as_ref().map(|v| if v == level { 1.0 } else { 0.0 }))
                .collect();
            (format!("{}_{}", name, level), dummy)
        })
        .collect())
}

/// Listwise deletion over the outcome and every encoded predictor column.
pub fn prepare(
    df: &DataFrame,
    y: Vec<Option<f64>>,
    independent: &[String],
) -> Result<Prepared, AppError> {
    let mut encoded: Vec<(String, Vec<Option<f64>>)> = Vec::new();
    for name in independent {
        encoded.extend(encode_predictor(df, name)?);
    }

    let keep: Vec<usize> = (0..y.len())
        .filter(|&i| y[i].is_some() && encoded.iter().all(|(_, col)| col[i].is_some()))
        .collect();
    let n = keep.len();
    if n == 0 {
        return Err(AppError::InvalidInput("No valid data after removing missing values".to_string()));
    }
    if n < encoded.len() + 2 {
        return Err(AppError::InvalidInput(format!(
            "Not enough samples ({}) for {} predictors",
            n,
            encoded.len()
        )));
    }

    let pick = |col: &[Option<f64>]| -> Vec<f64> { keep.iter().filter_map(|&i| col[i]).collect() };
    Ok(Prepared {
        y: pick(&y),
        names: encoded.iter().map(|(name, _)| name.clone()).collect(),
        columns: encoded.iter().map(|(_, col)| pick(col)).collect(),
    })
}

#[derive(Debug, Serialize)]
pub struct Multicollinearity {
    pub method: &'static str,
    pub passed: bool,
    pub details: IndexMap<String, Option<f64>>,
}

fn multicollinearity(x: &nalgebra::DMatrix<f64>, names: &[String]) -> Multicollinearity {
    let vifs = linear_model::variance_inflation(x);
    let passed = vifs.iter().all(|v| matches!(v, Some(vif) if *vif < VIF_LIMIT));
    Multicollinearity {
        method: "VIF",
        passed,
        details: names.iter().cloned().zip(vifs).collect(),
    }
}

#[derive(Debug, Serialize)]
pub struct LinearModelFit {
    pub r_squared: Option<f64>,
    pub adjusted_r_squared: Option<f64>,
    pub f_statistic: Option<f64>,
    pub f_pvalue: Option<f64>,
    pub n_samples: usize,
    pub n_predictors: usize,
}

#[derive(Debug, Serialize)]
pub struct LinearCoefficient {
    pub variable: String,
    pub coefficient: Option<f64>,
    pub std_error: Option<f64>,
    pub t_statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ResidualSummary {
    pub residual_std_error: Option<f64>,
    pub degrees_of_freedom: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct LinearAssumptions {
    pub multicollinearity: Multicollinearity,
    pub normality: AssumptionCheck,
    pub homoscedasticity: AssumptionCheck,
}

#[derive(Debug, Serialize)]
pub struct LinearReport {
    pub regression_type: &'static str,
    pub dependent_variable: String,
    pub independent_variables: Vec<String>,
    pub model_fit: LinearModelFit,
    pub coefficients: Vec<LinearCoefficient>,
    pub residuals: ResidualSummary,
    pub assumptions: LinearAssumptions,
    pub interpretation: String,
}

#[derive(Debug, Serialize)]
pub struct LogisticModelFit {
    pub mcfadden_r_squared: Option<f64>,
    pub log_likelihood: Option<f64>,
    pub null_log_likelihood: Option<f64>,
    pub aic: Option<f64>,
    pub bic: Option<f64>,
    pub chi_square: Option<f64>,
    pub chi_square_pvalue: Option<f64>,
    pub n_samples: usize,
}

#[derive(Debug, Serialize)]
pub struct LogisticCoefficient {
    pub variable: String,
    pub coefficient: Option<f64>,
    pub std_error: Option<f64>,
    pub z_statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
    pub odds_ratio: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: Option<f64>,
    pub sensitivity: Option<f64>,
    pub specificity: Option<f64>,
    pub auc: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct LogisticAssumptions {
    pub multicollinearity: Multicollinearity,
}

#[derive(Debug, Serialize)]
pub struct LogisticReport {
    pub regression_type: &'static str,
    pub dependent_variable: String,
    pub independent_variables: Vec<String>,
    pub model_fit: LogisticModelFit,
    pub coefficients: Vec<LogisticCoefficient>,
    pub classification_metrics: ClassificationMetrics,
    pub assumptions: LogisticAssumptions,
    pub interpretation: String,
}

fn term_names(prepared: &Prepared) -> impl Iterator<Item = String> + '_ {
    std::iter::once(INTERCEPT.to_string()).chain(prepared.names.iter().cloned())
}

pub fn linear(df: &DataFrame, variables: &RegressionVariables, seed: u64) -> Result<LinearReport, AppError> {
    let kind = RegressionKind::Linear;
    let (dependent, independent) = variables.validate()?;
    let y = numeric_values(column(df, dependent)?)?;
    let prepared = prepare(df, y, independent).map_err(|e| prefix_input(kind, e))?;

    let n = prepared.n();
    let x = linear_model::design_matrix(&prepared.columns, n);
    let y = DVector::from_column_slice(&prepared.y);
    let fit = linear_model::ols(&x, &y).map_err(|e| kind.wrap(e))?;

    let coefficients: Vec<LinearCoefficient> = term_names(&prepared)
        .zip(&fit.coefficients)
        .map(|(variable, row)| LinearCoefficient {
            variable,
            coefficient: finite(row.estimate),
            std_error: finite(row.std_error),
            t_statistic: finite(row.statistic),
            p_value: finite(row.p_value),
            ci_lower: finite(row.ci_lower),
            ci_upper: finite(row.ci_upper),
        })
        .collect();

    let shapiro = normality::shapiro_wilk_sampled(&fit.residuals, seed)
        .ok()
        .and_then(|r| finite(r.p_value));
    let breusch_pagan = linear_model::breusch_pagan(&x, &fit.residuals)
        .ok()
        .and_then(|(_, p)| finite(p));

    let all_significant = fit.coefficients.iter().skip(1).all(|c| c.p_value < 0.05);
    let interpretation = format!(
        "Model explains {:.1}% of variance. {}",
        finite(fit.r_squared * 100.0).unwrap_or(0.0),
        if all_significant { "All predictors significant at p<0.05." } else { "Some predictors not significant." }
    );

    tracing::info!(
        "Linear regression of {} on {} term(s): n={}, R²={:.4}",
        dependent,
        prepared.names.len(),
        n,
        fit.r_squared
    );

    Ok(LinearReport {
        regression_type: "linear",
        dependent_variable: dependent.to_string(),
        independent_variables: independent.to_vec(),
        model_fit: LinearModelFit {
            r_squared: finite(fit.r_squared),
            adjusted_r_squared: finite(fit.adj_r_squared),
            f_statistic: finite(fit.f_statistic),
            f_pvalue: finite(fit.f_p_value),
            n_samples: n,
            n_predictors: independent.len(),
        },
        coefficients,
        residuals: ResidualSummary {
            residual_std_error: finite(fit.residual_std_error),
            degrees_of_freedom: fit.df_resid as usize,
            min: finite(stats::min(&fit.residuals)),
            max: finite(stats::max(&fit.residuals)),
            mean: finite(stats::mean(&fit.residuals)),
        },
        assumptions: LinearAssumptions {
            multicollinearity: multicollinearity(&x, &prepared.names),
            normality: AssumptionCheck::at_05("Shapiro-Wilk (residuals)", shapiro),
            homoscedasticity: AssumptionCheck::at_05("Breusch-Pagan", breusch_pagan),
        },
        interpretation,
    })
}

/// 0/1 coding of a two-class outcome, classes in sorted order.
fn encode_binary(df: &DataFrame, dependent: &str) -> Result<Vec<Option<f64>>, AppError> {
    let texts = text_values(column(df, dependent)?)?;
    let mut classes = distinct_in_order(&texts);
    if classes.len() != 2 {
        return Err(AppError::InvalidInput(format!(
            "Logistic regression requires binary outcome, found {} classes",
            classes.len()
        )));
    }
    sort_labels(&mut classes);
    let positive = &classes[1];
    Ok(texts
        .iter()
        .map(|t| t.as_ref().map(|v| if v == positive { 1.0 } else { 0.0 }))
        .collect())
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn predictive_power(auc: f64) -> &'static str {
    if auc > 0.7 {
        "good"
    } else if auc > 0.6 {
        "moderate"
    } else {
        "poor"
    }
}

pub fn logistic(df: &DataFrame, variables: &RegressionVariables) -> Result<LogisticReport, AppError> {
    let kind = RegressionKind::Logistic;
    let (dependent, independent) = variables.validate()?;
    let y = encode_binary(df, dependent).map_err(|e| prefix_input(kind, e))?;
    let prepared = prepare(df, y, independent).map_err(|e| prefix_input(kind, e))?;

    let n = prepared.n();
    let x = linear_model::design_matrix(&prepared.columns, n);
    let y = DVector::from_column_slice(&prepared.y);
    let fit = linear_model::logit(&x, &y).map_err(|e| kind.wrap(e))?;

    let coefficients: Vec<LogisticCoefficient> = term_names(&prepared)
        .zip(&fit.coefficients)
        .map(|(variable, row)| LogisticCoefficient {
            variable,
            coefficient: finite(row.estimate),
            std_error: finite(row.std_error),
            z_statistic: finite(row.statistic),
            p_value: finite(row.p_value),
            ci_lower: finite(row.ci_lower),
            ci_upper: finite(row.ci_upper),
            odds_ratio: finite(row.estimate.exp()),
        })
        .collect();

    let (mut tp, mut tn, mut fp, mut fn_) = (0usize, 0usize, 0usize, 0usize);
    for (&actual, &prob) in prepared.y.iter().zip(&fit.probabilities) {
        match (actual == 1.0, prob > 0.5) {
            (true, true) => tp += 1,
            (false, false) => tn += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
        }
    }
    let accuracy = ratio(tp + tn, n);
    let auc = linear_model::roc_auc(&prepared.y, &fit.probabilities).unwrap_or(0.5);

    tracing::info!(
        "Logistic regression of {} on {} term(s): n={}, {} iterations, AUC={:.3}",
        dependent,
        prepared.names.len(),
        n,
        fit.iterations,
        auc
    );

    Ok(LogisticReport {
        regression_type: "logistic",
        dependent_variable: dependent.to_string(),
        independent_variables: independent.to_vec(),
        model_fit: LogisticModelFit {
            mcfadden_r_squared: finite(fit.pseudo_r_squared),
            log_likelihood: finite(fit.log_likelihood),
            null_log_likelihood: finite(fit.null_log_likelihood),
            aic: finite(fit.aic),
            bic: finite(fit.bic),
            chi_square: finite(fit.lr_statistic),
            chi_square_pvalue: finite(fit.lr_p_value),
            n_samples: n,
        },
        coefficients,
        classification_metrics: ClassificationMetrics {
            accuracy: finite(accuracy),
            sensitivity: finite(ratio(tp, tp + fn_)),
            specificity: finite(ratio(tn, tn + fp)),
            auc: finite(auc),
        },
        assumptions: LogisticAssumptions {
            multicollinearity: multicollinearity(&x, &prepared.names),
        },
        interpretation: format!(
            "Model shows {} predictive power (AUC={:.3}). Accuracy: {:.1}%.",
            predictive_power(auc),
            auc,
            accuracy * 100.0
        ),
    })
}

/// Prefix data-preparation failures while keeping their status.
fn prefix_input(kind: RegressionKind, err: AppError) -> AppError {
    match err {
        AppError::InvalidInput(message) => AppError::InvalidInput(kind.prefixed(&message)),
        other => other,
    }
}

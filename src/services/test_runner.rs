use indexmap::IndexMap;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::error::AppError;
use crate::models::AssumptionCheck;
use crate::services::columns::{column, distinct_in_order, paired_values, sort_labels, split_by_group, text_values};
use crate::services::stats::{self, correlation, finite, hypothesis, normality, StatsError};

const Z_95: f64 = 1.96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    TTest,
    PairedTTest,
    Anova,
    MannWhitney,
    WilcoxonSignedRank,
    KruskalWallis,
    ChiSquare,
    Pearson,
    Spearman,
    Kendall,
}

impl TestKind {
    /// Name used in error messages.
    fn label(&self) -> &'static str {
        match self {
            TestKind::TTest => "t-test",
            TestKind::PairedTTest => "paired t-test",
            TestKind::Anova => "ANOVA",
            TestKind::MannWhitney => "Mann-Whitney U test",
            TestKind::WilcoxonSignedRank => "Wilcoxon Signed-Rank test",
            TestKind::KruskalWallis => "Kruskal-Wallis test",
            TestKind::ChiSquare => "Chi-Square test",
            TestKind::Pearson => "Pearson correlation",
            TestKind::Spearman => "Spearman correlation",
            TestKind::Kendall => "Kendall correlation",
        }
    }

    fn needs_group_variables(&self) -> bool {
        matches!(
            self,
            TestKind::TTest | TestKind::Anova | TestKind::MannWhitney | TestKind::KruskalWallis
        )
    }

    fn wrap(&self, err: StatsError) -> AppError {
        let message = format!("Error in {}: {}", self.label(), err);
        if err.is_input_problem() {
            AppError::InvalidInput(message)
        } else {
            AppError::Computation(message)
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestVariables {
    pub numeric: Option<String>,
    pub categorical: Option<String>,
    pub var1: Option<String>,
    pub var2: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestRequest {
    pub file_id: String,
    #[serde(default)]
    pub variables: TestVariables,
}

fn required<'a>(value: &'a Option<String>) -> Option<&'a str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl TestVariables {
    /// `(numeric, categorical)` for group tests, `(var1, var2)` otherwise.
    pub fn pair_for(&self, kind: TestKind) -> Result<(&str, &str), AppError> {
        if kind.needs_group_variables() {
            match (required(&self.numeric), required(&self.categorical)) {
                (Some(n), Some(c)) => Ok((n, c)),
                _ => Err(AppError::InvalidInput(
                    "Missing required variables: numeric and categorical".to_string(),
                )),
            }
        } else {
            match (required(&self.var1), required(&self.var2)) {
                (Some(a), Some(b)) => Ok((a, b)),
                _ => Err(AppError::InvalidInput("Missing required variables: var1 and var2".to_string())),
            }
        }
    }
}

/// Per-group (or per-variable) descriptive block. Fields a test does not
/// report are omitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupStats {
    pub n: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_mean_lower: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_mean_upper: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_rank: Option<f64>,
}

impl GroupStats {
    fn with_mean_ci(values: &[f64]) -> Self {
        let n = values.len();
        let mean = stats::mean(values);
        let std = stats::std_dev(values);
        let half_width = Z_95 * std / (n as f64).sqrt();
        Self {
            n,
            mean: finite(mean),
            std: finite(std),
            ci_mean_lower: finite(mean - half_width),
            ci_mean_upper: finite(mean + half_width),
            ..Default::default()
        }
    }

    fn with_median(values: &[f64]) -> Self {
        Self {
            n: values.len(),
            median: finite(stats::median(values)),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TestStatistics {
    MeanComparison {
        t_statistic: Option<f64>,
        p_value: Option<f64>,
        df: usize,
        mean_diff: Option<f64>,
        ci_lower: Option<f64>,
        ci_upper: Option<f64>,
    },
    Anova {
        f_statistic: Option<f64>,
        p_value: Option<f64>,
        df_between: usize,
        df_within: usize,
        ss_between: Option<f64>,
        ss_within: Option<f64>,
        ms_between: Option<f64>,
        ms_within: Option<f64>,
    },
    MannWhitney {
        u_statistic: Option<f64>,
        p_value: Option<f64>,
        effect_size_r: Option<f64>,
    },
    Wilcoxon {
        w_statistic: Option<f64>,
        p_value: Option<f64>,
        effect_size_r: Option<f64>,
    },
    Kruskal {
        h_statistic: Option<f64>,
        p_value: Option<f64>,
        df: usize,
    },
    ChiSquare {
        chi_square: Option<f64>,
        p_value: Option<f64>,
        df: usize,
    },
    Correlation {
        correlation: Option<f64>,
        p_value: Option<f64>,
        ci_lower: Option<f64>,
        ci_upper: Option<f64>,
        n: usize,
    },
    Kendall {
        tau: Option<f64>,
        p_value: Option<f64>,
        n: usize,
    },
}

#[derive(Debug, Serialize)]
pub struct ContingencyTable {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    pub observed: Vec<Vec<u64>>,
    pub expected: Vec<Vec<Option<f64>>>,
    pub chi_square_contributions: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Serialize)]
pub struct TestReport {
    pub test_name: &'static str,
    pub test_type: &'static str,
    pub statistics: TestStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<IndexMap<String, GroupStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairs: Option<IndexMap<String, GroupStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contingency_table: Option<ContingencyTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assumptions: Option<IndexMap<String, AssumptionCheck>>,
    pub interpretation: String,
}

fn difference_interpretation(p: f64) -> String {
    if p < 0.05 {
        "Significant difference detected (p < 0.05)".to_string()
    } else {
        "No significant difference (p ≥ 0.05)".to_string()
    }
}

fn group_difference_interpretation(p: f64) -> String {
    if p < 0.05 {
        "Significant difference between groups detected (p < 0.05)".to_string()
    } else {
        "No significant difference between groups (p ≥ 0.05)".to_string()
    }
}

fn association_interpretation(p: f64) -> String {
    if p < 0.05 {
        "Significant association between variables detected (p < 0.05)".to_string()
    } else {
        "No significant association between variables (p ≥ 0.05)".to_string()
    }
}

pub fn correlation_interpretation(coefficient: f64, p: f64) -> String {
    if p < 0.001 && coefficient > 0.5 {
        "Strong positive correlation detected (p < 0.001)".to_string()
    } else if p < 0.001 && coefficient < -0.5 {
        "Strong negative correlation detected (p < 0.001)".to_string()
    } else if p < 0.05 {
        "Moderate correlation detected (p < 0.05)".to_string()
    } else {
        "No significant correlation (p ≥ 0.05)".to_string()
    }
}

fn effect_size(p: f64, n: usize, kind: TestKind) -> Result<Option<f64>, AppError> {
    if p > 0.0 && p < 1.0 {
        Ok(finite(hypothesis::effect_size_r(p, n).map_err(|e| kind.wrap(e))?))
    } else {
        Ok(Some(0.0))
    }
}

fn shapiro_p(values: &[f64]) -> Option<f64> {
    normality::shapiro_wilk(values).ok().and_then(|r| finite(r.p_value))
}

pub fn run_test(df: &DataFrame, kind: TestKind, variables: &TestVariables) -> Result<TestReport, AppError> {
    let (first, second) = variables.pair_for(kind)?;
    tracing::debug!("Running {} on {} / {}", kind.label(), first, second);
    match kind {
        TestKind::TTest => ttest(df, first, second),
        TestKind::PairedTTest => paired_ttest(df, first, second),
        TestKind::Anova => anova(df, first, second),
        TestKind::MannWhitney => mann_whitney(df, first, second),
        TestKind::WilcoxonSignedRank => wilcoxon(df, first, second),
        TestKind::KruskalWallis => kruskal(df, first, second),
        TestKind::ChiSquare => chi_square(df, first, second),
        TestKind::Pearson => correlate(df, CorrelationMethod::Pearson, first, second),
        TestKind::Spearman => correlate(df, CorrelationMethod::Spearman, first, second),
        TestKind::Kendall => correlate(df, CorrelationMethod::Kendall, first, second),
    }
}

fn exactly_two(groups: Vec<(String, Vec<f64>)>, kind: TestKind) -> Result<[(String, Vec<f64>); 2], AppError> {
    let found = groups.len();
    <[(String, Vec<f64>); 2]>::try_from(groups).map_err(|_| {
        AppError::InvalidInput(format!(
            "Error in {}: {} requires exactly 2 groups, found {}",
            kind.label(),
            kind.label(),
            found
        ))
    })
}

fn at_least_two(groups: Vec<(String, Vec<f64>)>, kind: TestKind) -> Result<Vec<(String, Vec<f64>)>, AppError> {
    if groups.len() < 2 {
        return Err(AppError::InvalidInput(format!(
            "Error in {}: {} requires at least 2 groups, found {}",
            kind.label(),
            kind.label(),
            groups.len()
        )));
    }
    // Groups whose numeric values are all missing take no part.
    Ok(groups.into_iter().filter(|(_, v)| !v.is_empty()).collect())
}

fn ttest(df: &DataFrame, numeric: &str, categorical: &str) -> Result<TestReport, AppError> {
    let kind = TestKind::TTest;
    let [(label1, g1), (label2, g2)] = exactly_two(split_by_group(df, numeric, categorical)?, kind)?;
    let outcome = hypothesis::independent_t_test(&g1, &g2).map_err(|e| kind.wrap(e))?;

    let stats1 = GroupStats::with_mean_ci(&g1);
    let stats2 = GroupStats::with_mean_ci(&g2);
    let mean_diff = stats::mean(&g1) - stats::mean(&g2);
    let pooled_sd = ((stats::variance(&g1) + stats::variance(&g2)) / 2.0).sqrt();
    let se_diff = pooled_sd * (1.0 / g1.len() as f64 + 1.0 / g2.len() as f64).sqrt();

    let normality = [shapiro_p(&g1), shapiro_p(&g2)]
        .into_iter()
        .flatten()
        .reduce(f64::min);
    let levene = hypothesis::levene(&[g1.clone(), g2.clone()])
        .ok()
        .and_then(|r| finite(r.p_value));

    Ok(TestReport {
        test_name: "t-Test (Independent)",
        test_type: "ttest",
        statistics: TestStatistics::MeanComparison {
            t_statistic: finite(outcome.statistic),
            p_value: finite(outcome.p_value),
            df: outcome.df as usize,
            mean_diff: finite(mean_diff),
            ci_lower: finite(mean_diff - Z_95 * se_diff),
            ci_upper: finite(mean_diff + Z_95 * se_diff),
        },
        groups: Some(IndexMap::from([(label1, stats1), (label2, stats2)])),
        pairs: None,
        contingency_table: None,
        assumptions: Some(IndexMap::from([
            ("normality".to_string(), AssumptionCheck::at_05("Shapiro-Wilk", normality)),
            ("homogeneity".to_string(), AssumptionCheck::at_05("Levene", levene)),
        ])),
        interpretation: difference_interpretation(outcome.p_value),
    })
}

fn paired_ttest(df: &DataFrame, var1: &str, var2: &str) -> Result<TestReport, AppError> {
    let kind = TestKind::PairedTTest;
    let (a, b) = paired_values(df, var1, var2)?;
    let outcome = hypothesis::paired_t_test(&a, &b).map_err(|e| kind.wrap(e))?;

    let diffs: Vec<f64> = a.iter().zip(&b).map(|(x, y)| x - y).collect();
    let mean_diff = stats::mean(&diffs);
    let se_diff = stats::std_dev(&diffs) / (diffs.len() as f64).sqrt();

    Ok(TestReport {
        test_name: "Paired t-Test",
        test_type: "paired_ttest",
        statistics: TestStatistics::MeanComparison {
            t_statistic: finite(outcome.statistic),
            p_value: finite(outcome.p_value),
            df: outcome.df as usize,
            mean_diff: finite(mean_diff),
            ci_lower: finite(mean_diff - Z_95 * se_diff),
            ci_upper: finite(mean_diff + Z_95 * se_diff),
        },
        groups: None,
        pairs: Some(IndexMap::from([
            (var1.to_string(), GroupStats::with_mean_ci(&a)),
            (var2.to_string(), GroupStats::with_mean_ci(&b)),
        ])),
        contingency_table: None,
        assumptions: Some(IndexMap::from([(
            "normality_of_differences".to_string(),
            AssumptionCheck::at_05("Shapiro-Wilk", shapiro_p(&diffs)),
        )])),
        interpretation: difference_interpretation(outcome.p_value),
    })
}

fn anova(df: &DataFrame, numeric: &str, categorical: &str) -> Result<TestReport, AppError> {
    let kind = TestKind::Anova;
    let groups = at_least_two(split_by_group(df, numeric, categorical)?, kind)?;
    let data: Vec<Vec<f64>> = groups.iter().map(|(_, v)| v.clone()).collect();
    let outcome = hypothesis::one_way_anova(&data).map_err(|e| kind.wrap(e))?;
    let levene = hypothesis::levene(&data).ok().and_then(|r| finite(r.p_value));

    Ok(TestReport {
        test_name: "ANOVA (One-way)",
        test_type: "anova",
        statistics: TestStatistics::Anova {
            f_statistic: finite(outcome.f_statistic),
            p_value: finite(outcome.p_value),
            df_between: outcome.df_between as usize,
            df_within: outcome.df_within as usize,
            ss_between: finite(outcome.ss_between),
            ss_within: finite(outcome.ss_within),
            ms_between: finite(outcome.ms_between),
            ms_within: finite(outcome.ms_within),
        },
        groups: Some(groups.iter().map(|(label, v)| (label.clone(), GroupStats::with_mean_ci(v))).collect()),
        pairs: None,
        contingency_table: None,
        assumptions: Some(IndexMap::from([(
            "homogeneity".to_string(),
            AssumptionCheck::at_05("Levene", levene),
        )])),
        interpretation: group_difference_interpretation(outcome.p_value),
    })
}

fn mann_whitney(df: &DataFrame, numeric: &str, categorical: &str) -> Result<TestReport, AppError> {
    let kind = TestKind::MannWhitney;
    let [(label1, g1), (label2, g2)] = exactly_two(split_by_group(df, numeric, categorical)?, kind)?;
    let outcome = hypothesis::mann_whitney(&g1, &g2).map_err(|e| kind.wrap(e))?;

    Ok(TestReport {
        test_name: "Wilcoxon Rank Sum (Mann-Whitney U)",
        test_type: "mann_whitney",
        statistics: TestStatistics::MannWhitney {
            u_statistic: finite(outcome.statistic),
            p_value: finite(outcome.p_value),
            effect_size_r: effect_size(outcome.p_value, g1.len() + g2.len(), kind)?,
        },
        groups: Some(IndexMap::from([
            (label1, GroupStats::with_median(&g1)),
            (label2, GroupStats::with_median(&g2)),
        ])),
        pairs: None,
        contingency_table: None,
        assumptions: None,
        interpretation: difference_interpretation(outcome.p_value),
    })
}

fn wilcoxon(df: &DataFrame, var1: &str, var2: &str) -> Result<TestReport, AppError> {
    let kind = TestKind::WilcoxonSignedRank;
    let (a, b) = paired_values(df, var1, var2)?;
    let outcome = hypothesis::wilcoxon_signed_rank(&a, &b).map_err(|e| kind.wrap(e))?;

    Ok(TestReport {
        test_name: "Wilcoxon Signed-Rank Test",
        test_type: "wilcoxon_signed_rank",
        statistics: TestStatistics::Wilcoxon {
            w_statistic: finite(outcome.statistic),
            p_value: finite(outcome.p_value),
            effect_size_r: effect_size(outcome.p_value, a.len(), kind)?,
        },
        groups: None,
        pairs: Some(IndexMap::from([
            (var1.to_string(), GroupStats::with_median(&a)),
            (var2.to_string(), GroupStats::with_median(&b)),
        ])),
        contingency_table: None,
        assumptions: None,
        interpretation: difference_interpretation(outcome.p_value),
    })
}

fn kruskal(df: &DataFrame, numeric: &str, categorical: &str) -> Result<TestReport, AppError> {
    let kind = TestKind::KruskalWallis;
    let groups = at_least_two(split_by_group(df, numeric, categorical)?, kind)?;
    let data: Vec<Vec<f64>> = groups.iter().map(|(_, v)| v.clone()).collect();
    let outcome = hypothesis::kruskal_wallis(&data).map_err(|e| kind.wrap(e))?;

    let group_stats = groups
        .iter()
        .zip(&outcome.mean_ranks)
        .map(|((label, values), rank)| {
            let mut s = GroupStats::with_median(values);
            s.mean_rank = finite(*rank);
            (label.clone(), s)
        })
        .collect();

    Ok(TestReport {
        test_name: "Kruskal-Wallis Test",
        test_type: "kruskal_wallis",
        statistics: TestStatistics::Kruskal {
            h_statistic: finite(outcome.h_statistic),
            p_value: finite(outcome.p_value),
            df: outcome.df as usize,
        },
        groups: Some(group_stats),
        pairs: None,
        contingency_table: None,
        assumptions: None,
        interpretation: group_difference_interpretation(outcome.p_value),
    })
}

fn chi_square(df: &DataFrame, var1: &str, var2: &str) -> Result<TestReport, AppError> {
    let kind = TestKind::ChiSquare;
    let a = text_values(column(df, var1)?)?;
    let b = text_values(column(df, var2)?)?;
    let pairs: Vec<(String, String)> = a.into_iter().zip(b).filter_map(|(x, y)| Some((x?, y?))).collect();

    let mut rows = distinct_in_order(&pairs.iter().map(|(r, _)| Some(r.clone())).collect::<Vec<_>>());
    sort_labels(&mut rows);
    let mut columns = distinct_in_order(&pairs.iter().map(|(_, c)| Some(c.clone())).collect::<Vec<_>>());
    sort_labels(&mut columns);

    let row_index: HashMap<&str, usize> = rows.iter().enumerate().map(|(i, r)| (r.as_str(), i)).collect();
    let col_index: HashMap<&str, usize> = columns.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();
    let mut observed = vec![vec![0u64; columns.len()]; rows.len()];
    for (r, c) in &pairs {
        observed[row_index[r.as_str()]][col_index[c.as_str()]] += 1;
    }

    let counts: Vec<Vec<f64>> = observed.iter().map(|row| row.iter().map(|&v| v as f64).collect()).collect();
    let outcome = hypothesis::chi_square_independence(&counts).map_err(|e| kind.wrap(e))?;
    let finite_grid = |grid: &[Vec<f64>]| -> Vec<Vec<Option<f64>>> {
        grid.iter().map(|row| row.iter().map(|v| finite(*v)).collect()).collect()
    };

    Ok(TestReport {
        test_name: "Chi-Square Test",
        test_type: "chi_square",
        statistics: TestStatistics::ChiSquare {
            chi_square: finite(outcome.chi2),
            p_value: finite(outcome.p_value),
            df: outcome.df as usize,
        },
        groups: None,
        pairs: None,
        contingency_table: Some(ContingencyTable {
            rows,
            columns,
            observed,
            expected: finite_grid(&outcome.expected),
            chi_square_contributions: finite_grid(&outcome.contributions),
        }),
        assumptions: None,
        interpretation: association_interpretation(outcome.p_value),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CorrelationMethod {
    Pearson,
    Spearman,
    Kendall,
}

impl CorrelationMethod {
    fn kind(self) -> TestKind {
        match self {
            CorrelationMethod::Pearson => TestKind::Pearson,
            CorrelationMethod::Spearman => TestKind::Spearman,
            CorrelationMethod::Kendall => TestKind::Kendall,
        }
    }
}

fn correlate(df: &DataFrame, method: CorrelationMethod, var1: &str, var2: &str) -> Result<TestReport, AppError> {
    let (a, b) = paired_values(df, var1, var2)?;
    let (test_name, test_type, outcome) = match method {
        CorrelationMethod::Pearson => ("Pearson Correlation", "pearson_correlation", correlation::pearson(&a, &b)),
        CorrelationMethod::Spearman => ("Spearman Correlation", "spearman_correlation", correlation::spearman(&a, &b)),
        CorrelationMethod::Kendall => ("Kendall Correlation (Tau)", "kendall_correlation", correlation::kendall_tau_b(&a, &b)),
    };
    let outcome = outcome.map_err(|e| method.kind().wrap(e))?;

    let statistics = if method == CorrelationMethod::Kendall {
        TestStatistics::Kendall {
            tau: finite(outcome.coefficient),
            p_value: finite(outcome.p_value),
            n: outcome.n,
        }
    } else {
        TestStatistics::Correlation {
            correlation: finite(outcome.coefficient),
            p_value: finite(outcome.p_value),
            ci_lower: outcome.ci_lower,
            ci_upper: outcome.ci_upper,
            n: outcome.n,
        }
    };

    Ok(TestReport {
        test_name,
        test_type,
        statistics,
        groups: None,
        pairs: None,
        contingency_table: None,
        assumptions: None,
        interpretation: correlation_interpretation(outcome.coefficient, outcome.p_value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Series::new("score", vec![5.1, 4.9, 5.0, 5.2, 4.8, 5.0, 5.1, 4.9, 5.2, 4.8]),
            Series::new("group", vec!["a", "b", "a", "b", "a", "b", "a", "b", "a", "b"]),
            Series::new("three", vec!["x", "y", "z", "x", "y", "z", "x", "y", "z", "x"]),
            Series::new("x", (1..=10).map(f64::from).collect::<Vec<_>>()),
            Series::new("y", (1..=10).map(|v| 2.0 * v as f64).collect::<Vec<_>>()),
        ])
        .unwrap()
    }

    fn group_vars(numeric: &str, categorical: &str) -> TestVariables {
        TestVariables {
            numeric: Some(numeric.to_string()),
            categorical: Some(categorical.to_string()),
            ..Default::default()
        }
    }

    fn pair_vars(a: &str, b: &str) -> TestVariables {
        TestVariables {
            var1: Some(a.to_string()),
            var2: Some(b.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn ttest_on_matching_groups_is_not_significant() {
        let report = run_test(&frame(), TestKind::TTest, &group_vars("score", "group")).unwrap();
        assert_eq!(report.test_type, "ttest");
        assert!(report.interpretation.starts_with("No significant difference"));
        let groups = report.groups.unwrap();
        assert_eq!(groups.get_index(0).unwrap().0, "a");
        assert_eq!(groups.get("b").unwrap().n, 5);
        match report.statistics {
            TestStatistics::MeanComparison { p_value, df, .. } => {
                assert!(p_value.unwrap() > 0.05);
                assert_eq!(df, 8);
            }
            other => panic!("unexpected statistics {:?}", other),
        }
    }

    #[test]
    fn ttest_rejects_three_groups() {
        let err = run_test(&frame(), TestKind::TTest, &group_vars("score", "three")).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(err.message().contains("exactly 2 groups, found 3"));
    }

    #[test]
    fn missing_variables_are_client_errors() {
        let err = run_test(&frame(), TestKind::Anova, &pair_vars("x", "y")).unwrap_err();
        assert_eq!(err.message(), "Missing required variables: numeric and categorical");
        let err = run_test(&frame(), TestKind::Pearson, &TestVariables::default()).unwrap_err();
        assert_eq!(err.message(), "Missing required variables: var1 and var2");
    }

    #[test]
    fn unknown_variable_is_not_found() {
        let err = run_test(&frame(), TestKind::Pearson, &pair_vars("x", "nope")).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn pearson_on_linear_data_is_strong() {
        let report = run_test(&frame(), TestKind::Pearson, &pair_vars("x", "y")).unwrap();
        assert_eq!(report.interpretation, "Strong positive correlation detected (p < 0.001)");
        let json = serde_json::to_value(&report).unwrap();
        assert!((json["statistics"]["correlation"].as_f64().unwrap() - 1.0).abs() < 1e-9);
        assert!(json.get("groups").is_none());
    }

    #[test]
    fn each_correlation_kind_runs_its_own_method() {
        let vars = pair_vars("x", "y");
        let cases = [
            (TestKind::Pearson, "pearson_correlation", "Pearson Correlation"),
            (TestKind::Spearman, "spearman_correlation", "Spearman Correlation"),
            (TestKind::Kendall, "kendall_correlation", "Kendall Correlation (Tau)"),
        ];
        for (kind, test_type, test_name) in cases {
            let report = run_test(&frame(), kind, &vars).unwrap();
            assert_eq!(report.test_type, test_type);
            assert_eq!(report.test_name, test_name);
        }
    }

    #[test]
    fn anova_reports_groups_and_levene() {
        let report = run_test(&frame(), TestKind::Anova, &group_vars("x", "three")).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["statistics"]["df_between"], 2);
        assert_eq!(json["assumptions"]["homogeneity"]["method"], "Levene");
        assert_eq!(json["groups"]["x"]["n"], 4);
    }

    #[test]
    fn kruskal_reports_mean_ranks() {
        let report = run_test(&frame(), TestKind::KruskalWallis, &group_vars("x", "group")).unwrap();
        let groups = report.groups.unwrap();
        // x = 1..10 alternating a/b: a gets ranks 1,3,5,7,9
        assert_eq!(groups.get("a").unwrap().mean_rank, Some(5.0));
        assert_eq!(groups.get("b").unwrap().mean_rank, Some(6.0));
    }

    #[test]
    fn chi_square_builds_sorted_table() {
        let report = run_test(&frame(), TestKind::ChiSquare, &pair_vars("three", "group")).unwrap();
        let table = report.contingency_table.unwrap();
        assert_eq!(table.rows, vec!["x", "y", "z"]);
        assert_eq!(table.columns, vec!["a", "b"]);
        let total: u64 = table.observed.iter().flatten().sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn wilcoxon_and_mann_whitney_envelopes() {
        let report = run_test(&frame(), TestKind::WilcoxonSignedRank, &pair_vars("x", "y")).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["pairs"]["x"]["n"], 10);
        assert_eq!(json["statistics"]["w_statistic"], 0.0);

        let report = run_test(&frame(), TestKind::MannWhitney, &group_vars("score", "group")).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["groups"]["a"]["median"].is_number());
        assert!(json["groups"]["a"].get("mean").is_none());
    }

    #[test]
    fn correlation_wording_thresholds() {
        assert_eq!(correlation_interpretation(-0.9, 0.0001), "Strong negative correlation detected (p < 0.001)");
        assert_eq!(correlation_interpretation(0.3, 0.0001), "Moderate correlation detected (p < 0.05)");
        assert_eq!(correlation_interpretation(0.9, 0.2), "No significant correlation (p ≥ 0.05)");
    }
}

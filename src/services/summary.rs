//! Per-type summaries of a single column.
//!
//! Each summary guards its own empty and unparseable cases and reports the
//! affected statistics as `null` rather than failing.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use polars::prelude::Series;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use crate::error::AppError;
use crate::models::{DateRounding, VariableType};
use crate::services::columns::{missing_count, missing_percent, numeric_values, round_to, sample_in_order, text_values};
use crate::services::stats::{self, finite, normality};

pub const DEFAULT_TEXT_SAMPLE_SIZE: usize = 10;
pub const DEFAULT_TEXT_SEED: u64 = 42;

#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub date_rounding: DateRounding,
    pub text_seed: u64,
    pub text_sample_size: usize,
    /// Seed for the Shapiro-Wilk subsample of very large columns.
    pub shapiro_seed: u64,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            date_rounding: DateRounding::Day,
            text_seed: DEFAULT_TEXT_SEED,
            text_sample_size: DEFAULT_TEXT_SAMPLE_SIZE,
            shapiro_seed: DEFAULT_TEXT_SEED,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VariableSummary {
    Numeric(NumericSummary),
    Categorical(CategoricalSummary),
    Date(DateSummary),
    Text(TextSummary),
}

#[derive(Debug, Default, Serialize)]
pub struct NumericSummary {
    pub mean: Option<f64>,
    pub sd: Option<f64>,
    pub median: Option<f64>,
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub missing_count: usize,
    pub missing_percent: f64,
    pub kurtosis: Option<f64>,
    pub skewness: Option<f64>,
    pub shapiro_stat: Option<f64>,
    pub shapiro_p: Option<f64>,
    pub jb_stat: Option<f64>,
    pub jb_p: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct FrequencyEntry {
    pub name: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct CategoricalSummary {
    pub unique_count: usize,
    pub missing_count: usize,
    pub missing_percent: f64,
    pub frequency_table: Vec<FrequencyEntry>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PeriodCount {
    pub period: String,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DateSummary {
    pub min_date: Option<String>,
    pub max_date: Option<String>,
    pub missing_count: usize,
    pub missing_percent: f64,
    pub rounding: DateRounding,
    pub frequency_table: Vec<PeriodCount>,
    pub unparsed_count: usize,
}

#[derive(Debug, Serialize)]
pub struct TextSummary {
    pub missing_count: usize,
    pub missing_percent: f64,
    pub unique_count: usize,
    pub total_values: usize,
    pub sample_values: Vec<String>,
}

pub fn summarize(series: &Series, var_type: VariableType, options: &SummaryOptions) -> Result<VariableSummary, AppError> {
    Ok(match var_type {
        VariableType::Numeric => VariableSummary::Numeric(numeric_summary(series, options.shapiro_seed)?),
        VariableType::Categorical => VariableSummary::Categorical(categorical_summary(series)?),
        VariableType::Date => VariableSummary::Date(date_summary(series, options.date_rounding)?),
        VariableType::Text => VariableSummary::Text(text_summary(series, options.text_sample_size, options.text_seed)?),
    })
}

pub fn numeric_summary(series: &Series, shapiro_seed: u64) -> Result<NumericSummary, AppError> {
    let total = series.len();
    let missing = missing_count(series);
    let xs: Vec<f64> = numeric_values(series)?.into_iter().flatten().collect();

    if xs.is_empty() {
        return Ok(NumericSummary {
            missing_count: missing,
            missing_percent: if missing == total { 100.0 } else { missing_percent(missing, total) },
            ..Default::default()
        });
    }

    let ordered = stats::sorted(&xs);
    let shapiro = normality::shapiro_wilk_sampled(&xs, shapiro_seed)
        .map_err(|e| tracing::debug!("Shapiro-Wilk skipped for {}: {}", series.name(), e))
        .ok();
    let jarque_bera = normality::jarque_bera(&xs)
        .map_err(|e| tracing::debug!("Jarque-Bera skipped for {}: {}", series.name(), e))
        .ok();

    Ok(NumericSummary {
        mean: finite(stats::mean(&xs)),
        sd: finite(stats::std_dev(&xs)),
        median: finite(stats::quantile_sorted(&ordered, 0.5)),
        q1: finite(stats::quantile_sorted(&ordered, 0.25)),
        q3: finite(stats::quantile_sorted(&ordered, 0.75)),
        min: ordered.first().copied(),
        max: ordered.last().copied(),
        missing_count: missing,
        missing_percent: missing_percent(missing, total),
        kurtosis: stats::excess_kurtosis(&xs),
        skewness: stats::skewness(&xs),
        shapiro_stat: shapiro.and_then(|r| finite(r.statistic)),
        shapiro_p: shapiro.and_then(|r| finite(r.p_value)),
        jb_stat: jarque_bera.and_then(|r| finite(r.statistic)),
        jb_p: jarque_bera.and_then(|r| finite(r.p_value)),
    })
}

/// Value counts by descending frequency; equal counts keep first appearance.
pub fn value_counts(values: &[Option<String>]) -> Vec<(String, usize)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in values.iter().flatten() {
        match index.get(value.as_str()) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(value.as_str(), counts.len());
                counts.push((value.clone(), 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

pub fn categorical_summary(series: &Series) -> Result<CategoricalSummary, AppError> {
    let values = text_values(series)?;
    let total = values.len();
    let missing = missing_count(series);
    let counts = value_counts(&values);
    let non_missing: usize = counts.iter().map(|(_, c)| c).sum();

    let frequency_table = counts
        .iter()
        .map(|(name, count)| FrequencyEntry {
            name: name.clone(),
            count: *count,
            percentage: if non_missing > 0 {
                round_to(*count as f64 / non_missing as f64 * 100.0, 2)
            } else {
                0.0
            },
        })
        .collect();

    Ok(CategoricalSummary {
        unique_count: counts.len(),
        missing_count: missing,
        missing_percent: missing_percent(missing, total),
        frequency_table,
    })
}

const DATETIME_FORMATS: [&str; 4] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
// Month-first layouts win over day-first ones when both are valid.
const DATE_FORMATS: [&str; 16] = [
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%y", "%m-%d-%y", "%m/%d/%Y", "%m-%d-%Y", "%d/%m/%Y", "%d-%m-%Y", "%d/%m/%y",
    "%d-%m-%y", "%d.%m.%Y", "%b %d, %Y", "%b %d %Y", "%B %d, %Y", "%d %b %Y", "%d %B %Y",
];
// chrono's %Y also accepts one or two digits; such reads fall through to the %y layouts.
const MIN_YEAR: i32 = 1000;

/// Best-effort date parse across the common textual layouts.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.len() == 8 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let (y, m, d) = (trimmed[..4].parse().ok()?, trimmed[4..6].parse().ok()?, trimmed[6..].parse().ok()?);
        return NaiveDate::from_ymd_opt(y, m, d);
    }
    let plausible = |date: &NaiveDate| date.year() >= MIN_YEAR;
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(trimmed, f).ok().map(|dt| dt.date()).filter(plausible))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(trimmed, f).ok().filter(plausible))
        })
}

pub fn floor_date(date: NaiveDate, rounding: DateRounding) -> NaiveDate {
    match rounding {
        DateRounding::Year => date.with_ordinal(1).unwrap_or(date),
        DateRounding::Month => date.with_day(1).unwrap_or(date),
        DateRounding::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
        DateRounding::Day => date,
    }
}

pub fn period_label(date: NaiveDate, rounding: DateRounding) -> String {
    match rounding {
        DateRounding::Year => date.format("%Y").to_string(),
        DateRounding::Month => date.format("%Y-%m").to_string(),
        DateRounding::Week | DateRounding::Day => date.format("%Y-%m-%d").to_string(),
    }
}

pub fn date_summary(series: &Series, rounding: DateRounding) -> Result<DateSummary, AppError> {
    let values = text_values(series)?;
    let total = values.len();
    let missing = missing_count(series);

    let raw: Vec<&str> = values.iter().flatten().map(String::as_str).collect();
    let dates: Vec<NaiveDate> = raw.iter().filter_map(|v| parse_date(v)).collect();

    let mut periods: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for date in &dates {
        *periods.entry(floor_date(*date, rounding)).or_insert(0) += 1;
    }

    Ok(DateSummary {
        min_date: dates.iter().min().map(|d| d.to_string()),
        max_date: dates.iter().max().map(|d| d.to_string()),
        missing_count: missing,
        missing_percent: missing_percent(missing, total),
        rounding,
        frequency_table: periods
            .into_iter()
            .map(|(date, count)| PeriodCount { period: period_label(date, rounding), count })
            .collect(),
        unparsed_count: raw.len() - dates.len(),
    })
}

pub fn text_summary(series: &Series, sample_size: usize, seed: u64) -> Result<TextSummary, AppError> {
    let values = text_values(series)?;
    let total = values.len();
    let missing = missing_count(series);
    let non_missing: Vec<String> = values.iter().flatten().cloned().collect();

    Ok(TextSummary {
        missing_count: missing,
        missing_percent: missing_percent(missing, total),
        unique_count: value_counts(&values).len(),
        total_values: non_missing.len(),
        sample_values: sample_in_order(&non_missing, sample_size, seed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn numeric_summary_of_one_to_five() {
        let s = Series::new("x", vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let summary = numeric_summary(&s, 42).unwrap();
        assert_eq!(summary.mean, Some(3.0));
        assert_eq!(summary.median, Some(3.0));
        assert_eq!(summary.min, Some(1.0));
        assert_eq!(summary.max, Some(5.0));
        assert_eq!(summary.q1, Some(2.0));
        assert_eq!(summary.missing_count, 0);
        assert!(summary.shapiro_p.is_some());
        assert!(summary.jb_p.is_some());
    }

    #[test]
    fn numeric_summary_nulls_what_it_cannot_compute() {
        let s = Series::new("x", vec![Some(2.0), None]);
        let summary = numeric_summary(&s, 42).unwrap();
        assert_eq!(summary.mean, Some(2.0));
        assert_eq!(summary.sd, None);
        assert_eq!(summary.shapiro_stat, None);
        assert_eq!(summary.missing_percent, 50.0);
    }

    #[test]
    fn unparseable_column_reports_actual_missingness() {
        let s = Series::new("x", vec![Some("a"), Some("b"), None]);
        let summary = numeric_summary(&s, 42).unwrap();
        assert_eq!(summary.mean, None);
        assert_eq!(summary.missing_count, 1);
        assert_eq!(summary.missing_percent, 33.33);

        let empty = Series::new("x", vec![None::<f64>, None]);
        let summary = numeric_summary(&empty, 42).unwrap();
        assert_eq!(summary.missing_count, 2);
        assert_eq!(summary.missing_percent, 100.0);
    }

    #[test]
    fn large_columns_run_shapiro_on_a_subsample() {
        let xs: Vec<f64> = (0..6000).map(|i| ((i * 7919) % 6000) as f64 / 10.0).collect();
        assert!(normality::shapiro_wilk(&xs).is_err());

        let s = Series::new("x", xs.clone());
        let summary = numeric_summary(&s, 42).unwrap();
        let expected = normality::shapiro_wilk_sampled(&xs, 42).unwrap();
        assert_eq!(summary.shapiro_stat, finite(expected.statistic));
        assert_eq!(summary.shapiro_p, finite(expected.p_value));
        assert!(summary.shapiro_stat.is_some());
        assert_eq!(numeric_summary(&s, 42).unwrap().shapiro_stat, summary.shapiro_stat);
    }

    #[test]
    fn categorical_frequencies_descend() {
        let s = Series::new("c", vec![Some("b"), Some("a"), Some("a"), None, Some("c"), Some("b"), Some("a")]);
        let summary = categorical_summary(&s).unwrap();
        assert_eq!(summary.unique_count, 3);
        assert_eq!(summary.missing_count, 1);
        let names: Vec<&str> = summary.frequency_table.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(summary.frequency_table[0].percentage, 50.0);
    }

    #[test]
    fn date_summary_rounds_to_month() {
        let s = Series::new(
            "d",
            vec![Some("2024-01-15"), Some("2024-01-31"), Some("2024-03-01"), Some("garbage"), None],
        );
        let summary = date_summary(&s, DateRounding::Month).unwrap();
        assert_eq!(summary.min_date.as_deref(), Some("2024-01-15"));
        assert_eq!(summary.max_date.as_deref(), Some("2024-03-01"));
        assert_eq!(summary.unparsed_count, 1);
        assert_eq!(
            summary.frequency_table,
            vec![
                PeriodCount { period: "2024-01".to_string(), count: 2 },
                PeriodCount { period: "2024-03".to_string(), count: 1 },
            ]
        );
    }

    #[test]
    fn week_rounding_floors_to_monday() {
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 21).unwrap();
        assert_eq!(floor_date(sunday, DateRounding::Week), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(parse_date("Jan 5, 2024"), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(parse_date("2024-01-05 13:45:00"), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(parse_date("20240105"), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn two_digit_years_are_not_read_as_year_one() {
        assert_eq!(parse_date("01/05/24"), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(parse_date("1-5-24"), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(parse_date("12/25/24"), NaiveDate::from_ymd_opt(2024, 12, 25));
        assert_eq!(parse_date("2024/01/05"), NaiveDate::from_ymd_opt(2024, 1, 5));
    }

    #[test]
    fn day_first_dates_parse_when_month_first_cannot() {
        assert_eq!(parse_date("25/12/2024"), NaiveDate::from_ymd_opt(2024, 12, 25));
        assert_eq!(parse_date("13-01-2024"), NaiveDate::from_ymd_opt(2024, 1, 13));
        assert_eq!(parse_date("31/01/24"), NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(parse_date("01/02/2024"), NaiveDate::from_ymd_opt(2024, 1, 2));

        let s = Series::new("d", vec!["25/12/2024", "13/01/2024", "01/02/2024"]);
        let summary = date_summary(&s, DateRounding::Day).unwrap();
        assert_eq!(summary.unparsed_count, 0);
        assert_eq!(summary.min_date.as_deref(), Some("2024-01-02"));
        assert_eq!(summary.max_date.as_deref(), Some("2024-12-25"));
    }

    #[test]
    fn text_summary_samples_deterministically() {
        let values: Vec<String> = (0..40).map(|i| format!("note {}", i)).collect();
        let s = Series::new("t", values);
        let a = text_summary(&s, 10, 7).unwrap();
        let b = text_summary(&s, 10, 7).unwrap();
        assert_eq!(a.sample_values, b.sample_values);
        assert_eq!(a.sample_values.len(), 10);
        assert_eq!(a.total_values, 40);
        assert_eq!(a.unique_count, 40);
    }

    #[test]
    fn summary_carries_type_tag() {
        let s = Series::new("x", vec![1.0, 2.0, 3.0]);
        let json = serde_json::to_value(summarize(&s, VariableType::Numeric, &SummaryOptions::default()).unwrap()).unwrap();
        assert_eq!(json["type"], "numeric");
        assert_eq!(json["mean"], 2.0);
    }
}

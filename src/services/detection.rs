use once_cell::sync::Lazy;
use polars::prelude::*;
use rayon::prelude::*;
use regex::Regex;
use smallvec::SmallVec;
use crate::config::DetectionConfig;
use crate::error::AppError;
use crate::models::{VariableInfo, VariableType, SAMPLE_VALUES};
use crate::services::columns::{
    distinct_in_order, is_numeric_dtype, missing_count, missing_percent, parse_number, sample_in_order, text_values,
};

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^\d{4}[-/]\d{1,2}[-/]\d{1,2}",  // YYYY-MM-DD, YYYY/MM/DD
        r"^\d{1,2}[-/]\d{1,2}[-/]\d{4}",  // DD-MM-YYYY, MM/DD/YYYY
        r"^\d{1,2}[-/]\d{1,2}[-/]\d{2}",  // DD-MM-YY
        r"^\d{8}$",                        // YYYYMMDD
        r"^\w{3}\s+\d{1,2},?\s+\d{4}",    // Mon DD, YYYY
        r"^\d{1,2}\s+\w{3}\s+\d{4}",      // DD Mon YYYY
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

pub fn looks_like_date(value: &str) -> bool {
    let trimmed = value.trim();
    DATE_PATTERNS.iter().any(|re| re.is_match(trimmed))
}

/// Classifies columns as date, categorical, numeric or text, in that order.
pub struct TypeDetector<'a> {
    config: &'a DetectionConfig,
}

impl<'a> TypeDetector<'a> {
    pub fn new(config: &'a DetectionConfig) -> Self {
        Self { config }
    }

    pub fn analyze_frame(&self, df: &DataFrame) -> Result<Vec<VariableInfo>, AppError> {
        let start = std::time::Instant::now();
        let total_rows = df.height();

        let variables = df
            .get_columns()
            .par_iter()
            .map(|series| self.analyze_column(series, total_rows))
            .collect::<Result<Vec<_>, AppError>>()?;

        tracing::debug!("Detected types for {} columns in {:?}", variables.len(), start.elapsed());
        Ok(variables)
    }

    pub fn analyze_column(&self, series: &Series, total_rows: usize) -> Result<VariableInfo, AppError> {
        let values = text_values(series)?;
        let non_missing: Vec<&str> = values.iter().flatten().map(String::as_str).collect();
        let distinct = distinct_in_order(&values).len();
        let missing = missing_count(series);

        let mut sample_values = SmallVec::<[String; SAMPLE_VALUES]>::new();
        if non_missing.is_empty() {
            sample_values.push("(all missing)".to_string());
        } else {
            sample_values.extend(non_missing.iter().take(SAMPLE_VALUES).map(|v| v.to_string()));
        }

        Ok(VariableInfo {
            name: series.name().to_string(),
            detected_type: self.detect(series, &non_missing, distinct, total_rows),
            missingness: missing,
            missingness_percent: missing_percent(missing, total_rows),
            unique_count: distinct,
            sample_values,
            total_count: total_rows,
        })
    }

    pub fn detect(&self, series: &Series, non_missing: &[&str], distinct: usize, total_rows: usize) -> VariableType {
        if self.is_date(series, non_missing) {
            VariableType::Date
        } else if self.is_categorical(distinct, total_rows) {
            VariableType::Categorical
        } else if self.is_numeric(series, non_missing) {
            VariableType::Numeric
        } else {
            VariableType::Text
        }
    }

    fn sample<'v>(&self, non_missing: &[&'v str]) -> Vec<&'v str> {
        sample_in_order(non_missing, self.config.sample_size, self.config.seed)
    }

    fn is_date(&self, series: &Series, non_missing: &[&str]) -> bool {
        if non_missing.is_empty() || is_numeric_dtype(series) {
            return false;
        }
        let sample = self.sample(non_missing);
        let matches = sample.iter().filter(|v| looks_like_date(v)).count();
        matches as f64 / sample.len() as f64 > self.config.date_match_ratio
    }

    fn is_categorical(&self, distinct: usize, total_rows: usize) -> bool {
        let threshold = (total_rows as f64 * self.config.category_row_fraction).min(self.config.max_categories as f64);
        (distinct as f64) < threshold
    }

    fn is_numeric(&self, series: &Series, non_missing: &[&str]) -> bool {
        if non_missing.is_empty() {
            return false;
        }
        if is_numeric_dtype(series) {
            return true;
        }
        let sample = self.sample(non_missing);
        let parsed = sample.iter().filter(|v| parse_number(v).is_some()).count();
        parsed as f64 / sample.len() as f64 > self.config.numeric_parse_ratio
    }
}

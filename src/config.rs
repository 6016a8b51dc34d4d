use serde::Deserialize;
use anyhow::Result;
use dotenvy::dotenv;
use std::path::PathBuf;
use std::str::FromStr;

fn default_max_file_size() -> usize {
    // 50 MB in bytes
    50 * 1024 * 1024
}

/// Thresholds used by the variable type detector.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Non-missing values sampled for the date and numeric checks.
    pub sample_size: usize,
    /// Share of sampled values that must match a date pattern.
    pub date_match_ratio: f64,
    /// Share of sampled values that must parse as numbers.
    pub numeric_parse_ratio: f64,
    /// Upper bound on distinct values for a categorical column.
    pub max_categories: usize,
    /// Distinct values must also stay below this fraction of the row count.
    pub category_row_fraction: f64,
    pub seed: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sample_size: 100,
            date_match_ratio: 0.8,
            numeric_parse_ratio: 0.9,
            max_categories: 20,
            category_row_fraction: 0.5,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub sample_data_dir: PathBuf,
    pub max_file_size: usize,
    /// Seed for every internal subsample (detection, Shapiro-Wilk).
    pub random_seed: u64,
    pub detection: DetectionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            allowed_origins: vec!["http://localhost:5173".to_string()],
            sample_data_dir: PathBuf::from("sample_data"),
            max_file_size: default_max_file_size(),
            random_seed: 42,
            detection: DetectionConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        let defaults = Config::default();
        let random_seed = env_or("RANDOM_SEED", defaults.random_seed)?;

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.allowed_origins);

        let detection = DetectionConfig {
            sample_size: env_or("DETECT_SAMPLE_SIZE", defaults.detection.sample_size)?,
            date_match_ratio: env_or("DETECT_DATE_RATIO", defaults.detection.date_match_ratio)?,
            numeric_parse_ratio: env_or("DETECT_NUMERIC_RATIO", defaults.detection.numeric_parse_ratio)?,
            max_categories: env_or("DETECT_MAX_CATEGORIES", defaults.detection.max_categories)?,
            category_row_fraction: env_or("DETECT_CATEGORY_FRACTION", defaults.detection.category_row_fraction)?,
            seed: random_seed,
        };

        Ok(Config {
            host: env_or("HOST", defaults.host)?,
            port: env_or("PORT", defaults.port)?,
            allowed_origins,
            sample_data_dir: env_or("SAMPLE_DATA_DIR", defaults.sample_data_dir)?,
            max_file_size: env_or("MAX_FILE_SIZE", defaults.max_file_size)?,
            random_seed,
            detection,
        })
    }
}

pub fn load_config() -> Result<Config> {
    Config::from_env()
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse {}={:?}: {}", key, raw, e)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_detection_constants() {
        let config = Config::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.detection.sample_size, 100);
        assert_eq!(config.detection.max_categories, 20);
        assert!((config.detection.date_match_ratio - 0.8).abs() < 1e-12);
        assert!((config.detection.numeric_parse_ratio - 0.9).abs() < 1e-12);
    }

    #[test]
    fn env_or_falls_back_and_rejects_garbage() {
        std::env::set_var("STATS_TEST_ENV_OR_PORT", "8123");
        let port: u16 = env_or("STATS_TEST_ENV_OR_PORT", 1).unwrap();
        assert_eq!(port, 8123);

        let missing: u16 = env_or("STATS_TEST_ENV_OR_UNSET", 7).unwrap();
        assert_eq!(missing, 7);

        std::env::set_var("STATS_TEST_ENV_OR_BAD", "not-a-number");
        let bad: Result<u16> = env_or("STATS_TEST_ENV_OR_BAD", 7);
        assert!(bad.is_err());
    }
}

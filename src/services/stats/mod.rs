//! Statistical primitives shared by the summary, test, regression and chart
//! code. Everything here works on plain `f64` slices that have already been
//! stripped of missing values.

pub mod correlation;
pub mod hypothesis;
pub mod linear_model;
pub mod normality;

use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("{0}")]
    InsufficientData(String),
    #[error("{0}")]
    Degenerate(String),
    #[error("Singular matrix: {0}")]
    Singular(String),
    #[error("Failed to converge: {0}")]
    NoConvergence(String),
    #[error("Distribution error: {0}")]
    Distribution(String),
}

impl StatsError {
    /// Whether the caller could fix this by sending different data.
    pub fn is_input_problem(&self) -> bool {
        matches!(self, StatsError::InsufficientData(_) | StatsError::Degenerate(_))
    }
}

impl From<statrs::StatsError> for StatsError {
    fn from(err: statrs::StatsError) -> Self {
        StatsError::Distribution(err.to_string())
    }
}

pub type StatsResult<T> = Result<T, StatsError>;

/// Drops NaN and infinities so they serialise as `null`.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

pub fn require(n: usize, min: usize, what: &str) -> StatsResult<()> {
    if n < min {
        return Err(StatsError::InsufficientData(format!(
            "{} requires at least {} observations, got {}",
            what, min, n
        )));
    }
    Ok(())
}

pub fn sum(xs: &[f64]) -> f64 {
    xs.iter().sum()
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    sum(xs) / xs.len() as f64
}

/// Sample variance (N-1).
pub fn variance(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1) as f64
}

pub fn std_dev(xs: &[f64]) -> f64 {
    variance(xs).sqrt()
}

pub fn sorted(xs: &[f64]) -> Vec<f64> {
    let mut v = xs.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    v
}

/// Linear-interpolation quantile over already sorted data.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn quantile(xs: &[f64], q: f64) -> f64 {
    quantile_sorted(&sorted(xs), q)
}

pub fn median(xs: &[f64]) -> f64 {
    quantile(xs, 0.5)
}

pub fn min(xs: &[f64]) -> f64 {
    xs.iter().copied().fold(f64::INFINITY, f64::min)
}

pub fn max(xs: &[f64]) -> f64 {
    xs.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn central_moments(xs: &[f64]) -> (f64, f64, f64) {
    let n = xs.len() as f64;
    let m = mean(xs);
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for x in xs {
        let d = x - m;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m2 / n, m3 / n, m4 / n)
}

/// Moment skewness g1.
pub fn skewness(xs: &[f64]) -> Option<f64> {
    if xs.len() < 3 {
        return None;
    }
    let (m2, m3, _) = central_moments(xs);
    if m2 <= 0.0 {
        return None;
    }
    finite(m3 / m2.powf(1.5))
}

/// Excess kurtosis g2.
pub fn excess_kurtosis(xs: &[f64]) -> Option<f64> {
    if xs.len() < 4 {
        return None;
    }
    let (m2, _, m4) = central_moments(xs);
    if m2 <= 0.0 {
        return None;
    }
    finite(m4 / (m2 * m2) - 3.0)
}

/// Average ranks (1-based) in input order, ties sharing the mean rank.
pub fn average_ranks(xs: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| xs[a].partial_cmp(&xs[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && xs[order[j + 1]] == xs[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

/// Sizes of every tie group (runs of equal values) with more than one member.
pub fn tie_sizes(xs: &[f64]) -> Vec<usize> {
    let s = sorted(xs);
    let mut sizes = Vec::new();
    let mut i = 0;
    while i < s.len() {
        let mut j = i;
        while j + 1 < s.len() && s[j + 1] == s[i] {
            j += 1;
        }
        if j > i {
            sizes.push(j - i + 1);
        }
        i = j + 1;
    }
    sizes
}

pub fn standard_normal() -> StatsResult<Normal> {
    Ok(Normal::new(0.0, 1.0)?)
}

pub fn normal_two_sided_p(z: f64) -> StatsResult<f64> {
    let normal = standard_normal()?;
    Ok((2.0 * (1.0 - normal.cdf(z.abs()))).clamp(0.0, 1.0))
}

pub fn t_two_sided_p(t: f64, df: f64) -> StatsResult<f64> {
    if t.is_infinite() {
        return Ok(0.0);
    }
    let dist = StudentsT::new(0.0, 1.0, df)?;
    Ok((2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0))
}

/// Two-sided critical value of Student's t at the given confidence level.
pub fn t_critical(df: f64, confidence: f64) -> StatsResult<f64> {
    let dist = StudentsT::new(0.0, 1.0, df)?;
    Ok(dist.inverse_cdf(1.0 - (1.0 - confidence) / 2.0))
}

pub fn chi2_sf(x: f64, df: f64) -> StatsResult<f64> {
    if x.is_infinite() {
        return Ok(0.0);
    }
    let dist = ChiSquared::new(df)?;
    Ok((1.0 - dist.cdf(x.max(0.0))).clamp(0.0, 1.0))
}

pub fn f_sf(f: f64, df1: f64, df2: f64) -> StatsResult<f64> {
    if f.is_infinite() {
        return Ok(0.0);
    }
    let dist = FisherSnedecor::new(df1, df2)?;
    Ok((1.0 - dist.cdf(f.max(0.0))).clamp(0.0, 1.0))
}

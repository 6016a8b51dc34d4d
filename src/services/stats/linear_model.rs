//! Least-squares and logit fitting on dense design matrices.
//!
//! Design matrices passed in here always carry the intercept as column 0.

use nalgebra::{DMatrix, DVector};
use super::{average_ranks, chi2_sf, f_sf, normal_two_sided_p, standard_normal, t_critical, t_two_sided_p, StatsError, StatsResult};
use statrs::distribution::ContinuousCDF;

pub const LOGIT_MAX_ITER: usize = 35;
pub const LOGIT_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Clone)]
pub struct CoefficientRow {
    pub estimate: f64,
    pub std_error: f64,
    pub statistic: f64,
    pub p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: Vec<CoefficientRow>,
    pub residuals: Vec<f64>,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
    pub df_resid: f64,
    pub residual_std_error: f64,
    pub n: usize,
}

#[derive(Debug, Clone)]
pub struct LogitFit {
    pub coefficients: Vec<CoefficientRow>,
    pub probabilities: Vec<f64>,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub pseudo_r_squared: f64,
    pub aic: f64,
    pub bic: f64,
    pub lr_statistic: f64,
    pub lr_p_value: f64,
    pub iterations: usize,
    pub n: usize,
}

/// Build a design matrix with a leading intercept column from predictor columns.
pub fn design_matrix(columns: &[Vec<f64>], n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, columns.len() + 1, |i, j| if j == 0 { 1.0 } else { columns[j - 1][i] })
}

fn invert(m: DMatrix<f64>, what: &str) -> StatsResult<DMatrix<f64>> {
    m.try_inverse()
        .ok_or_else(|| StatsError::Singular(format!("{} could not be inverted", what)))
}

/// Ordinary least squares with t-based inference.
pub fn ols(x: &DMatrix<f64>, y: &DVector<f64>) -> StatsResult<OlsFit> {
    let (n, k) = x.shape();
    if n <= k {
        return Err(StatsError::InsufficientData(format!(
            "Regression requires more observations ({}) than parameters ({})",
            n, k
        )));
    }
    let xt = x.transpose();
    let xtx_inv = invert(&xt * x, "X'X")?;
    let beta = &xtx_inv * (&xt * y);
    let fitted = x * &beta;
    let residuals = y - &fitted;

    let ssr = residuals.dot(&residuals);
    let y_mean = y.mean();
    let sst: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
    if sst == 0.0 {
        return Err(StatsError::Degenerate("Dependent variable is constant".to_string()));
    }

    let df_resid = (n - k) as f64;
    let df_model = (k - 1) as f64;
    let r_squared = 1.0 - ssr / sst;
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df_resid;
    let sigma2 = ssr / df_resid;

    let (f_statistic, f_p_value) = if df_model > 0.0 {
        let f = ((sst - ssr) / df_model) / sigma2;
        (f, f_sf(f, df_model, df_resid)?)
    } else {
        (f64::NAN, f64::NAN)
    };

    let t_crit = t_critical(df_resid, 0.95)?;
    let coefficients = (0..k)
        .map(|j| {
            let estimate = beta[j];
            let std_error = (sigma2 * xtx_inv[(j, j)]).sqrt();
            let statistic = estimate / std_error;
            Ok(CoefficientRow {
                estimate,
                std_error,
                statistic,
                p_value: t_two_sided_p(statistic, df_resid)?,
                ci_lower: estimate - t_crit * std_error,
                ci_upper: estimate + t_crit * std_error,
            })
        })
        .collect::<StatsResult<Vec<_>>>()?;

    Ok(OlsFit {
        coefficients,
        residuals: residuals.iter().copied().collect(),
        r_squared,
        adj_r_squared,
        f_statistic,
        f_p_value,
        df_resid,
        residual_std_error: sigma2.sqrt(),
        n,
    })
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn bernoulli_log_likelihood(y: &DVector<f64>, p: &[f64]) -> f64 {
    y.iter()
        .zip(p)
        .map(|(&yi, &pi)| {
            let pi = pi.clamp(1e-15, 1.0 - 1e-15);
            yi * pi.ln() + (1.0 - yi) * (1.0 - pi).ln()
        })
        .sum()
}

/// X' W X with W = diag(p (1 - p)), without materialising W.
fn information(x: &DMatrix<f64>, xt: &DMatrix<f64>, p: &DVector<f64>) -> DMatrix<f64> {
    let weighted = DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| x[(i, j)] * p[i] * (1.0 - p[i]));
    xt * weighted
}

/// Maximum-likelihood logit fit by Newton-Raphson. `y` must be 0/1.
pub fn logit(x: &DMatrix<f64>, y: &DVector<f64>) -> StatsResult<LogitFit> {
    let (n, k) = x.shape();
    if n <= k {
        return Err(StatsError::InsufficientData(format!(
            "Regression requires more observations ({}) than parameters ({})",
            n, k
        )));
    }
    let y_mean = y.mean();
    if y_mean <= 0.0 || y_mean >= 1.0 {
        return Err(StatsError::Degenerate("Dependent variable must contain both classes".to_string()));
    }

    let xt = x.transpose();
    let mut beta = DVector::<f64>::zeros(k);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < LOGIT_MAX_ITER {
        iterations += 1;
        let p: DVector<f64> = (x * &beta).map(sigmoid);
        let gradient = &xt * (y - &p);
        let step = invert(information(x, &xt, &p), "Hessian")? * gradient;
        beta += &step;

        if beta.iter().any(|b| !b.is_finite()) {
            return Err(StatsError::NoConvergence("logit coefficients diverged".to_string()));
        }
        if step.amax() < LOGIT_TOLERANCE {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(StatsError::NoConvergence(format!(
            "logit did not converge in {} iterations",
            LOGIT_MAX_ITER
        )));
    }

    let p: DVector<f64> = (x * &beta).map(sigmoid);
    let covariance = invert(information(x, &xt, &p), "Hessian")?;
    let probabilities: Vec<f64> = p.iter().copied().collect();

    let log_likelihood = bernoulli_log_likelihood(y, &probabilities);
    let nf = n as f64;
    let null_log_likelihood = nf * (y_mean * y_mean.ln() + (1.0 - y_mean) * (1.0 - y_mean).ln());
    let lr_statistic = 2.0 * (log_likelihood - null_log_likelihood);
    let df_model = (k - 1) as f64;
    let lr_p_value = if df_model > 0.0 { chi2_sf(lr_statistic, df_model)? } else { f64::NAN };
    let kf = k as f64;

    let z_crit = standard_normal()?.inverse_cdf(0.975);
    let coefficients = (0..k)
        .map(|j| {
            let estimate = beta[j];
            let std_error = covariance[(j, j)].sqrt();
            let statistic = estimate / std_error;
            Ok(CoefficientRow {
                estimate,
                std_error,
                statistic,
                p_value: normal_two_sided_p(statistic)?,
                ci_lower: estimate - z_crit * std_error,
                ci_upper: estimate + z_crit * std_error,
            })
        })
        .collect::<StatsResult<Vec<_>>>()?;

    Ok(LogitFit {
        coefficients,
        probabilities,
        log_likelihood,
        null_log_likelihood,
        pseudo_r_squared: 1.0 - log_likelihood / null_log_likelihood,
        aic: -2.0 * log_likelihood + 2.0 * kf,
        bic: -2.0 * log_likelihood + kf * nf.ln(),
        lr_statistic,
        lr_p_value,
        iterations,
        n,
    })
}

/// Variance inflation factor of every non-intercept column, each regressed on
/// the remaining columns plus intercept.
pub fn variance_inflation(x: &DMatrix<f64>) -> Vec<Option<f64>> {
    let k = x.ncols();
    if k <= 2 {
        return vec![Some(1.0); k.saturating_sub(1)];
    }
    (1..k)
        .map(|j| {
            let target = x.column(j).into_owned();
            let others: Vec<usize> = (0..k).filter(|&c| c != j).collect();
            let rest = x.select_columns(&others);
            match ols(&rest, &target) {
                Ok(fit) if fit.r_squared < 1.0 => super::finite(1.0 / (1.0 - fit.r_squared)),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!("VIF for column {} unavailable: {}", j, e);
                    None
                }
            }
        })
        .collect()
}

/// Koenker's studentised Breusch-Pagan test: n * R^2 of squared residuals
/// regressed on the design, chi-square with (columns - 1) df.
pub fn breusch_pagan(x: &DMatrix<f64>, residuals: &[f64]) -> StatsResult<(f64, f64)> {
    let squared = DVector::from_iterator(residuals.len(), residuals.iter().map(|e| e * e));
    let aux = ols(x, &squared)?;
    let lm = aux.n as f64 * aux.r_squared;
    let df = (x.ncols() - 1) as f64;
    Ok((lm, chi2_sf(lm, df)?))
}

/// Area under the ROC curve via the rank-sum identity.
pub fn roc_auc(y: &[f64], scores: &[f64]) -> Option<f64> {
    let positives = y.iter().filter(|v| **v == 1.0).count();
    let negatives = y.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }
    let ranks = average_ranks(scores);
    let rank_sum: f64 = y.iter().zip(&ranks).filter(|(v, _)| **v == 1.0).map(|(_, r)| r).sum();
    let (p, q) = (positives as f64, negatives as f64);
    Some((rank_sum - p * (p + 1.0) / 2.0) / (p * q))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ols_recovers_exact_line_plus_noise() {
        let xs: Vec<f64> = (0..20).map(f64::from).collect();
        let noise = [0.3, -0.2, 0.1, -0.4, 0.2, 0.0, -0.1, 0.3, -0.3, 0.1, 0.2, -0.2, 0.4, -0.1, 0.0, 0.1, -0.3, 0.2, -0.2, 0.1];
        let y = DVector::from_iterator(20, xs.iter().zip(noise).map(|(x, e)| 1.0 + 2.0 * x + e));
        let x = design_matrix(&[xs.clone()], 20);
        let fit = ols(&x, &y).unwrap();
        assert_eq!(fit.coefficients.len(), 2);
        assert!((fit.coefficients[1].estimate - 2.0).abs() < 0.05);
        assert!(fit.r_squared > 0.99 && fit.r_squared <= 1.0);
        assert!(fit.f_p_value < 1e-10);
        assert_eq!(fit.df_resid, 18.0);
    }

    #[test]
    fn vif_flags_near_collinear_columns() {
        let a: Vec<f64> = (0..10).map(f64::from).collect();
        let b: Vec<f64> = a.iter().enumerate().map(|(i, v)| 2.0 * v + if i % 2 == 0 { 0.1 } else { -0.1 }).collect();
        let x = design_matrix(&[a, b], 10);
        let vif = variance_inflation(&x);
        assert_eq!(vif.len(), 2);
        assert!(vif.iter().all(|v| v.unwrap() > 1000.0));
    }

    #[test]
    fn logit_on_overlapping_classes() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let ys = [0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0];
        let x = design_matrix(&[xs.to_vec()], 10);
        let y = DVector::from_column_slice(&ys);
        let fit = logit(&x, &y).unwrap();
        assert!(fit.coefficients[1].estimate > 0.0);
        assert!(fit.pseudo_r_squared > 0.0 && fit.pseudo_r_squared < 1.0);
        assert!((fit.null_log_likelihood - 10.0 * 0.5f64.ln()).abs() < 1e-12);
        assert!(fit.log_likelihood > fit.null_log_likelihood);
        assert!((fit.aic - (-2.0 * fit.log_likelihood + 4.0)).abs() < 1e-12);
    }

    #[test]
    fn logit_perfect_separation_fails() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let ys = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let x = design_matrix(&[xs.to_vec()], 6);
        let y = DVector::from_column_slice(&ys);
        assert!(logit(&x, &y).is_err());
    }

    #[test]
    fn vif_single_predictor_is_one() {
        let x = design_matrix(&[vec![1.0, 2.0, 4.0, 3.0]], 4);
        assert_eq!(variance_inflation(&x), vec![Some(1.0)]);
    }

    #[test]
    fn auc_of_perfect_ranking() {
        assert_eq!(roc_auc(&[0.0, 0.0, 1.0, 1.0], &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&[0.0, 1.0], &[0.5, 0.5]), Some(0.5));
        assert_eq!(roc_auc(&[1.0, 1.0], &[0.5, 0.5]), None);
    }
}

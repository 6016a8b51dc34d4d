use super::{average_ranks, mean, normal_two_sided_p, require, t_two_sided_p, StatsError, StatsResult};

const Z_95: f64 = 1.959963984540054;

#[derive(Debug, Clone, Copy)]
pub struct CorrelationOutcome {
    pub coefficient: f64,
    pub p_value: f64,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
    pub n: usize,
}

/// Pearson r alone, `None` when either side has zero variance.
pub fn pearson_r(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let (mx, my) = (mean(x), mean(y));
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// 95% confidence interval for r through the Fisher z transform.
pub fn fisher_ci(r: f64, n: usize) -> (Option<f64>, Option<f64>) {
    if n <= 3 {
        return (None, None);
    }
    let z = r.atanh();
    let se = 1.0 / ((n - 3) as f64).sqrt();
    let lower = (z - Z_95 * se).tanh();
    let upper = (z + Z_95 * se).tanh();
    (lower.is_finite().then_some(lower), upper.is_finite().then_some(upper))
}

fn r_p_value(r: f64, n: usize) -> StatsResult<f64> {
    let df = (n - 2) as f64;
    let denom = 1.0 - r * r;
    if denom <= 0.0 {
        return Ok(0.0);
    }
    t_two_sided_p(r * (df / denom).sqrt(), df)
}

pub fn pearson(x: &[f64], y: &[f64]) -> StatsResult<CorrelationOutcome> {
    require(x.len(), 3, "Correlation")?;
    let r = pearson_r(x, y)
        .ok_or_else(|| StatsError::Degenerate("Correlation is undefined for constant input".to_string()))?;
    let (ci_lower, ci_upper) = fisher_ci(r, x.len());
    Ok(CorrelationOutcome { coefficient: r, p_value: r_p_value(r, x.len())?, ci_lower, ci_upper, n: x.len() })
}

/// Spearman rho: Pearson on average ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> StatsResult<CorrelationOutcome> {
    pearson(&average_ranks(x), &average_ranks(y))
}

/// Kendall tau-b with the tie-aware normal approximation for p.
pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> StatsResult<CorrelationOutcome> {
    let n = x.len();
    require(n, 3, "Correlation")?;
    if y.len() != n {
        return Err(StatsError::InsufficientData("Correlation inputs must have equal length".to_string()));
    }

    let (mut concordant, mut discordant) = (0.0f64, 0.0f64);
    let (mut tied_x, mut tied_y) = (0.0f64, 0.0f64);
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            if dx == 0.0 && dy == 0.0 {
                continue;
            } else if dx == 0.0 {
                tied_x += 1.0;
            } else if dy == 0.0 {
                tied_y += 1.0;
            } else if (dx > 0.0) == (dy > 0.0) {
                concordant += 1.0;
            } else {
                discordant += 1.0;
            }
        }
    }

    let denom = ((concordant + discordant + tied_x) * (concordant + discordant + tied_y)).sqrt();
    if denom == 0.0 {
        return Err(StatsError::Degenerate("Correlation is undefined for constant input".to_string()));
    }
    let tau = ((concordant - discordant) / denom).clamp(-1.0, 1.0);

    let nf = n as f64;
    let xt = super::tie_sizes(x);
    let yt = super::tie_sizes(y);
    let v0 = nf * (nf - 1.0) * (2.0 * nf + 5.0);
    let vt = term(&xt, |t| t * (t - 1.0) * (2.0 * t + 5.0));
    let vu = term(&yt, |t| t * (t - 1.0) * (2.0 * t + 5.0));
    let x1 = term(&xt, |t| t * (t - 1.0));
    let y1 = term(&yt, |t| t * (t - 1.0));
    let x2 = term(&xt, |t| t * (t - 1.0) * (t - 2.0));
    let y2 = term(&yt, |t| t * (t - 1.0) * (t - 2.0));
    let var_s = (v0 - vt - vu) / 18.0
        + x1 * y1 / (2.0 * nf * (nf - 1.0))
        + x2 * y2 / (9.0 * nf * (nf - 1.0) * (nf - 2.0));

    let p_value = if var_s > 0.0 {
        normal_two_sided_p((concordant - discordant) / var_s.sqrt())?
    } else {
        1.0
    };

    Ok(CorrelationOutcome { coefficient: tau, p_value, ci_lower: None, ci_upper: None, n })
}

fn term(ties: &[usize], f: impl Fn(f64) -> f64) -> f64 {
    ties.iter().map(|&t| f(t as f64)).sum()
}

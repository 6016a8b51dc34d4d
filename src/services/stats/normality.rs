use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use statrs::distribution::ContinuousCDF;
use super::{chi2_sf, excess_kurtosis, require, skewness, sorted, standard_normal, StatsError, StatsResult};

/// Largest sample the Royston approximation is valid for.
pub const SHAPIRO_MAX_N: usize = 5000;

#[derive(Debug, Clone, Copy)]
pub struct NormalityResult {
    pub statistic: f64,
    pub p_value: f64,
}

// Royston (1992, 1995) polynomial coefficients.
const C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.07119, 4.434685, -2.706056];
const C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
const C3: [f64; 4] = [0.544, -0.39978, 0.025054, -6.714e-4];
const C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
const C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
const C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
const G: [f64; 2] = [-2.273, 0.459];

fn poly(c: &[f64], x: f64) -> f64 {
    c.iter().rev().fold(0.0, |acc, &ci| acc * x + ci)
}

/// Shapiro-Wilk W with Royston's p-value approximation, for 3..=5000 values.
pub fn shapiro_wilk(data: &[f64]) -> StatsResult<NormalityResult> {
    let n = data.len();
    require(n, 3, "Shapiro-Wilk")?;
    if n > SHAPIRO_MAX_N {
        return Err(StatsError::InsufficientData(format!(
            "Shapiro-Wilk accepts at most {} observations, got {}",
            SHAPIRO_MAX_N, n
        )));
    }

    let x = sorted(data);
    if x[n - 1] - x[0] < 1e-300 {
        return Err(StatsError::Degenerate("Shapiro-Wilk is undefined for constant data".to_string()));
    }

    let mean = x.iter().sum::<f64>() / n as f64;
    let ss: f64 = x.iter().map(|v| (v - mean).powi(2)).sum();

    if n == 3 {
        let a = std::f64::consts::FRAC_1_SQRT_2;
        let w = ((a * (x[2] - x[0])).powi(2) / ss).clamp(0.75, 1.0);
        let p = 1.0 - (6.0 / std::f64::consts::PI) * w.sqrt().acos();
        return Ok(NormalityResult { statistic: w, p_value: p.clamp(0.0, 1.0) });
    }

    let a = coefficients(n)?;
    let half = n / 2;
    let numerator: f64 = (0..half).map(|i| a[i] * (x[n - 1 - i] - x[i])).sum();
    let w = (numerator * numerator / ss).min(1.0);

    Ok(NormalityResult { statistic: w, p_value: royston_p(w, n)?.clamp(0.0, 1.0) })
}

fn coefficients(n: usize) -> StatsResult<Vec<f64>> {
    let normal = standard_normal()?;
    let half = n / 2;

    // Blom scores, lower half (negative).
    let m: Vec<f64> = (0..half)
        .map(|i| normal.inverse_cdf((i as f64 + 1.0 - 0.375) / (n as f64 + 0.25)))
        .collect();
    let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
    let ssumm2 = summ2.sqrt();
    let rsn = 1.0 / (n as f64).sqrt();

    let a1 = poly(&C1, rsn) - m[0] / ssumm2;
    let mut a = vec![0.0; half];

    let (corrected, fac_sq, one_minus) = if n <= 5 {
        (1, summ2 - 2.0 * m[0] * m[0], 1.0 - 2.0 * a1 * a1)
    } else {
        let a2 = -m[1] / ssumm2 + poly(&C2, rsn);
        a[1] = a2;
        (
            2,
            summ2 - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1],
            1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2,
        )
    };
    if fac_sq <= 0.0 || one_minus <= 0.0 {
        return Err(StatsError::Degenerate("Shapiro-Wilk coefficients are undefined".to_string()));
    }
    let fac = (fac_sq / one_minus).sqrt();
    a[0] = a1;
    for i in corrected..half {
        a[i] = -m[i] / fac;
    }
    Ok(a)
}

fn royston_p(w: f64, n: usize) -> StatsResult<f64> {
    let normal = standard_normal()?;
    let nf = n as f64;
    let w1 = 1.0 - w;
    if w1 <= 0.0 {
        return Ok(1.0);
    }
    let y = w1.ln();

    let z = if n <= 11 {
        let gamma = poly(&G, nf);
        if y >= gamma {
            return Ok(0.0);
        }
        let y2 = -(gamma - y).ln();
        (y2 - poly(&C3, nf)) / poly(&C4, nf).exp()
    } else {
        let ln_n = nf.ln();
        (y - poly(&C5, ln_n)) / poly(&C6, ln_n).exp()
    };
    Ok(1.0 - normal.cdf(z))
}

/// Shapiro-Wilk on at most 5000 values; larger inputs are tested on a seeded
/// subsample of exactly 5000.
pub fn shapiro_wilk_sampled(data: &[f64], seed: u64) -> StatsResult<NormalityResult> {
    if data.len() <= SHAPIRO_MAX_N {
        return shapiro_wilk(data);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let subsample: Vec<f64> = sample(&mut rng, data.len(), SHAPIRO_MAX_N)
        .into_iter()
        .map(|i| data[i])
        .collect();
    shapiro_wilk(&subsample)
}

/// Jarque-Bera test on moment skewness and excess kurtosis, chi-square(2).
pub fn jarque_bera(data: &[f64]) -> StatsResult<NormalityResult> {
    let n = data.len();
    require(n, 4, "Jarque-Bera")?;
    let (s, k) = match (skewness(data), excess_kurtosis(data)) {
        (Some(s), Some(k)) => (s, k),
        _ => return Err(StatsError::Degenerate("Jarque-Bera is undefined for constant data".to_string())),
    };
    let jb = n as f64 / 6.0 * (s * s + k * k / 4.0);
    Ok(NormalityResult { statistic: jb, p_value: chi2_sf(jb, 2.0)? })
}

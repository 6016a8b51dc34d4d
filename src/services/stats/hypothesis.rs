use super::{
    average_ranks, chi2_sf, f_sf, mean, median, normal_two_sided_p, require, standard_normal,
    t_two_sided_p, tie_sizes, variance, StatsError, StatsResult,
};
use statrs::distribution::ContinuousCDF;

/// Largest group size for which Mann-Whitney uses the exact distribution.
const MANN_WHITNEY_EXACT_MAX: usize = 8;
/// Largest number of non-zero differences for the exact signed-rank test.
const WILCOXON_EXACT_MAX: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct TestOutcome {
    pub statistic: f64,
    pub df: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone)]
pub struct AnovaOutcome {
    pub f_statistic: f64,
    pub p_value: f64,
    pub ss_between: f64,
    pub ss_within: f64,
    pub df_between: f64,
    pub df_within: f64,
    pub ms_between: f64,
    pub ms_within: f64,
}

#[derive(Debug, Clone)]
pub struct KruskalOutcome {
    pub h_statistic: f64,
    pub df: f64,
    pub p_value: f64,
    pub mean_ranks: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ChiSquareOutcome {
    pub chi2: f64,
    pub df: f64,
    pub p_value: f64,
    pub expected: Vec<Vec<f64>>,
    pub contributions: Vec<Vec<f64>>,
}

/// Independent two-sample Student t-test with pooled variance.
pub fn independent_t_test(a: &[f64], b: &[f64]) -> StatsResult<TestOutcome> {
    require(a.len(), 2, "t-test group")?;
    require(b.len(), 2, "t-test group")?;
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let df = n1 + n2 - 2.0;
    let pooled = ((n1 - 1.0) * variance(a) + (n2 - 1.0) * variance(b)) / df;
    let se = (pooled * (1.0 / n1 + 1.0 / n2)).sqrt();
    if se == 0.0 {
        return Err(StatsError::Degenerate("t-test is undefined when both groups have zero variance".to_string()));
    }
    let t = (mean(a) - mean(b)) / se;
    Ok(TestOutcome { statistic: t, df, p_value: t_two_sided_p(t, df)? })
}

/// Paired t-test on already aligned pairs.
pub fn paired_t_test(x: &[f64], y: &[f64]) -> StatsResult<TestOutcome> {
    if x.len() != y.len() {
        return Err(StatsError::InsufficientData("Paired samples must have equal length".to_string()));
    }
    require(x.len(), 2, "Paired t-test")?;
    let diffs: Vec<f64> = x.iter().zip(y).map(|(a, b)| a - b).collect();
    let n = diffs.len() as f64;
    let se = (variance(&diffs) / n).sqrt();
    if se == 0.0 {
        return Err(StatsError::Degenerate("Paired t-test is undefined when all differences are equal".to_string()));
    }
    let t = mean(&diffs) / se;
    let df = n - 1.0;
    Ok(TestOutcome { statistic: t, df, p_value: t_two_sided_p(t, df)? })
}

pub fn one_way_anova(groups: &[Vec<f64>]) -> StatsResult<AnovaOutcome> {
    if groups.len() < 2 {
        return Err(StatsError::InsufficientData("ANOVA requires at least 2 groups".to_string()));
    }
    if groups.iter().any(|g| g.is_empty()) {
        return Err(StatsError::InsufficientData("ANOVA groups must not be empty".to_string()));
    }
    let k = groups.len() as f64;
    let all: Vec<f64> = groups.iter().flatten().copied().collect();
    let n = all.len() as f64;
    if n <= k {
        return Err(StatsError::InsufficientData(
            "ANOVA requires more observations than groups".to_string(),
        ));
    }
    let grand_mean = mean(&all);

    let ss_between: f64 = groups
        .iter()
        .map(|g| g.len() as f64 * (mean(g) - grand_mean).powi(2))
        .sum();
    let ss_within: f64 = groups
        .iter()
        .map(|g| {
            let m = mean(g);
            g.iter().map(|x| (x - m).powi(2)).sum::<f64>()
        })
        .sum();

    let df_between = k - 1.0;
    let df_within = n - k;
    let ms_between = ss_between / df_between;
    let ms_within = ss_within / df_within;
    if ms_within == 0.0 && ms_between == 0.0 {
        return Err(StatsError::Degenerate("ANOVA is undefined for constant data".to_string()));
    }
    let f_statistic = ms_between / ms_within;

    Ok(AnovaOutcome {
        f_statistic,
        p_value: f_sf(f_statistic, df_between, df_within)?,
        ss_between,
        ss_within,
        df_between,
        df_within,
        ms_between,
        ms_within,
    })
}

/// Levene's test centred on group medians (Brown-Forsythe).
pub fn levene(groups: &[Vec<f64>]) -> StatsResult<TestOutcome> {
    let deviations: Vec<Vec<f64>> = groups
        .iter()
        .map(|g| {
            let m = median(g);
            g.iter().map(|x| (x - m).abs()).collect()
        })
        .collect();
    let anova = one_way_anova(&deviations)?;
    Ok(TestOutcome {
        statistic: anova.f_statistic,
        df: anova.df_between,
        p_value: anova.p_value,
    })
}

/// Mann-Whitney U for the first sample. Exact two-sided p for small samples
/// without ties, otherwise the tie- and continuity-corrected normal
/// approximation.
pub fn mann_whitney(a: &[f64], b: &[f64]) -> StatsResult<TestOutcome> {
    require(a.len(), 1, "Mann-Whitney group")?;
    require(b.len(), 1, "Mann-Whitney group")?;
    let (n1, n2) = (a.len(), b.len());
    let combined: Vec<f64> = a.iter().chain(b).copied().collect();
    let ranks = average_ranks(&combined);
    let r1: f64 = ranks[..n1].iter().sum();
    let u1 = r1 - (n1 * (n1 + 1)) as f64 / 2.0;
    let u2 = (n1 * n2) as f64 - u1;
    let u_big = u1.max(u2);

    let ties = tie_sizes(&combined);
    let p_value = if n1 <= MANN_WHITNEY_EXACT_MAX && n2 <= MANN_WHITNEY_EXACT_MAX && ties.is_empty() {
        (2.0 * exact_u_upper_tail(n1, n2, u_big.round() as usize)).min(1.0)
    } else {
        let n = (n1 + n2) as f64;
        let tie_term: f64 = ties.iter().map(|&t| (t * t * t - t) as f64).sum::<f64>() / (n * (n - 1.0));
        let sigma = ((n1 * n2) as f64 / 12.0 * ((n + 1.0) - tie_term)).sqrt();
        if sigma == 0.0 {
            1.0
        } else {
            let z = (u_big - (n1 * n2) as f64 / 2.0 - 0.5) / sigma;
            normal_two_sided_p(z)?
        }
    };

    Ok(TestOutcome { statistic: u1, df: f64::NAN, p_value })
}

/// P(U >= u) under H0 for sample sizes n1, n2 with no ties.
fn exact_u_upper_tail(n1: usize, n2: usize, u: usize) -> f64 {
    let max_u = n1 * n2;
    // counts[i][j][k]: arrangements of i first-sample and j second-sample
    // values with U = k.
    let mut counts = vec![vec![vec![0.0f64; max_u + 1]; n2 + 1]; n1 + 1];
    for i in 0..=n1 {
        for j in 0..=n2 {
            if i == 0 || j == 0 {
                counts[i][j][0] = 1.0;
                continue;
            }
            for k in 0..=i * j {
                let mut c = counts[i][j - 1][k];
                if k >= j {
                    c += counts[i - 1][j][k - j];
                }
                counts[i][j][k] = c;
            }
        }
    }
    let dist = &counts[n1][n2];
    let total: f64 = dist.iter().sum();
    dist[u.min(max_u)..].iter().sum::<f64>() / total
}

/// Wilcoxon signed-rank on paired differences. Zero differences are dropped;
/// the statistic is min(T+, T-).
pub fn wilcoxon_signed_rank(x: &[f64], y: &[f64]) -> StatsResult<TestOutcome> {
    if x.len() != y.len() {
        return Err(StatsError::InsufficientData("Paired samples must have equal length".to_string()));
    }
    let diffs: Vec<f64> = x.iter().zip(y).map(|(a, b)| a - b).filter(|d| *d != 0.0).collect();
    require(diffs.len(), 1, "Wilcoxon signed-rank (non-zero differences)")?;

    let abs: Vec<f64> = diffs.iter().map(|d| d.abs()).collect();
    let ranks = average_ranks(&abs);
    let t_plus: f64 = diffs.iter().zip(&ranks).filter(|(d, _)| **d > 0.0).map(|(_, r)| r).sum();
    let n = diffs.len();
    let total = (n * (n + 1)) as f64 / 2.0;
    let t_minus = total - t_plus;
    let w = t_plus.min(t_minus);

    let ties = tie_sizes(&abs);
    let p_value = if n <= WILCOXON_EXACT_MAX && ties.is_empty() {
        (2.0 * exact_signed_rank_lower_tail(n, w.round() as usize)).min(1.0)
    } else {
        let nf = n as f64;
        let mean_w = nf * (nf + 1.0) / 4.0;
        let tie_term: f64 = ties.iter().map(|&t| (t * t * t - t) as f64).sum::<f64>() / 48.0;
        let var_w = nf * (nf + 1.0) * (2.0 * nf + 1.0) / 24.0 - tie_term;
        if var_w <= 0.0 {
            1.0
        } else {
            normal_two_sided_p((w - mean_w) / var_w.sqrt())?
        }
    };

    Ok(TestOutcome { statistic: w, df: f64::NAN, p_value })
}

/// P(T <= t) for the signed-rank statistic of n untied differences.
fn exact_signed_rank_lower_tail(n: usize, t: usize) -> f64 {
    let max_t = n * (n + 1) / 2;
    let mut counts = vec![0.0f64; max_t + 1];
    counts[0] = 1.0;
    for rank in 1..=n {
        for s in (rank..=max_t).rev() {
            counts[s] += counts[s - rank];
        }
    }
    let total: f64 = counts.iter().sum();
    counts[..=t.min(max_t)].iter().sum::<f64>() / total
}

pub fn kruskal_wallis(groups: &[Vec<f64>]) -> StatsResult<KruskalOutcome> {
    if groups.len() < 2 {
        return Err(StatsError::InsufficientData("Kruskal-Wallis requires at least 2 groups".to_string()));
    }
    if groups.iter().any(|g| g.is_empty()) {
        return Err(StatsError::InsufficientData("Kruskal-Wallis groups must not be empty".to_string()));
    }
    let combined: Vec<f64> = groups.iter().flatten().copied().collect();
    let n = combined.len() as f64;
    let ranks = average_ranks(&combined);

    let mut mean_ranks = Vec::with_capacity(groups.len());
    let mut offset = 0;
    let mut h = 0.0;
    for g in groups {
        let rank_sum: f64 = ranks[offset..offset + g.len()].iter().sum();
        offset += g.len();
        h += rank_sum * rank_sum / g.len() as f64;
        mean_ranks.push(rank_sum / g.len() as f64);
    }
    h = 12.0 / (n * (n + 1.0)) * h - 3.0 * (n + 1.0);

    let tie_sum: f64 = tie_sizes(&combined).iter().map(|&t| (t * t * t - t) as f64).sum();
    let correction = 1.0 - tie_sum / (n * n * n - n);
    if correction <= 0.0 {
        return Err(StatsError::Degenerate("Kruskal-Wallis is undefined when all values are equal".to_string()));
    }
    h /= correction;
    let df = groups.len() as f64 - 1.0;

    Ok(KruskalOutcome { h_statistic: h, df, p_value: chi2_sf(h, df)?, mean_ranks })
}

/// Chi-square test of independence on an r x c table of counts. Yates'
/// correction applies when df = 1; contributions are always uncorrected.
pub fn chi_square_independence(observed: &[Vec<f64>]) -> StatsResult<ChiSquareOutcome> {
    let rows = observed.len();
    let cols = observed.first().map_or(0, Vec::len);
    if rows < 2 || cols < 2 {
        return Err(StatsError::InsufficientData(
            "Chi-square test requires at least 2 categories in each variable".to_string(),
        ));
    }
    let row_totals: Vec<f64> = observed.iter().map(|r| r.iter().sum()).collect();
    let col_totals: Vec<f64> = (0..cols).map(|j| observed.iter().map(|r| r[j]).sum()).collect();
    let total: f64 = row_totals.iter().sum();

    let expected: Vec<Vec<f64>> = row_totals
        .iter()
        .map(|rt| col_totals.iter().map(|ct| rt * ct / total).collect())
        .collect();
    if expected.iter().flatten().any(|e| *e <= 0.0) {
        return Err(StatsError::Degenerate("Chi-square expected frequencies must be positive".to_string()));
    }

    let df = ((rows - 1) * (cols - 1)) as f64;
    let yates = df == 1.0;
    let mut chi2 = 0.0;
    let mut contributions = vec![vec![0.0; cols]; rows];
    for i in 0..rows {
        for j in 0..cols {
            let (o, e) = (observed[i][j], expected[i][j]);
            let diff = (o - e).abs();
            contributions[i][j] = diff * diff / e;
            let adjusted = if yates { diff - diff.min(0.5) } else { diff };
            chi2 += adjusted * adjusted / e;
        }
    }

    Ok(ChiSquareOutcome { chi2, df, p_value: chi2_sf(chi2, df)?, expected, contributions })
}

/// Effect size r = z / sqrt(N) with z recovered from a two-sided p-value.
pub fn effect_size_r(p_value: f64, n: usize) -> StatsResult<f64> {
    if n == 0 {
        return Ok(f64::NAN);
    }
    let z = standard_normal()?.inverse_cdf(1.0 - p_value / 2.0);
    Ok(z / (n as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_test_identical_groups() {
        let a = [5.1, 4.9, 5.0, 5.2, 4.8];
        let r = independent_t_test(&a, &a).unwrap();
        assert_eq!(r.statistic, 0.0);
        assert!(r.p_value > 0.99);
        assert_eq!(r.df, 8.0);
    }

    #[test]
    fn t_test_separated_groups() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [11.0, 12.0, 13.0, 14.0, 15.0];
        let r = independent_t_test(&a, &b).unwrap();
        assert!(r.statistic < 0.0);
        assert!(r.p_value < 0.001);
        assert!(independent_t_test(&[1.0, 1.0], &[1.0, 1.0]).is_err());
    }

    #[test]
    fn paired_t_matches_hand_calculation() {
        // diffs = 1, 2, 3 -> mean 2, sd 1, t = 2 / (1 / sqrt 3)
        let r = paired_t_test(&[2.0, 4.0, 6.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!((r.statistic - 2.0 * 3f64.sqrt()).abs() < 1e-12);
        assert_eq!(r.df, 2.0);
    }

    #[test]
    fn anova_sums_of_squares() {
        let groups = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0], vec![7.0, 8.0, 9.0]];
        let r = one_way_anova(&groups).unwrap();
        assert!((r.ss_between - 54.0).abs() < 1e-9);
        assert!((r.ss_within - 6.0).abs() < 1e-9);
        assert!((r.f_statistic - 27.0).abs() < 1e-9);
        assert!(r.p_value < 0.01);
    }

    #[test]
    fn levene_equal_spread() {
        let groups = vec![vec![1.0, 2.0, 3.0, 4.0], vec![11.0, 12.0, 13.0, 14.0]];
        let r = levene(&groups).unwrap();
        assert!(r.statistic.abs() < 1e-12);
        assert!(r.p_value > 0.99);
    }

    #[test]
    fn mann_whitney_exact_small_samples() {
        let r = mann_whitney(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).unwrap();
        assert_eq!(r.statistic, 0.0);
        // Only one of C(6,3) = 20 arrangements is this extreme in each tail.
        assert!((r.p_value - 0.1).abs() < 1e-12);
    }

    #[test]
    fn mann_whitney_normal_approximation_with_ties() {
        let a: Vec<f64> = (0..20).map(|i| (i % 5) as f64).collect();
        let b: Vec<f64> = (0..20).map(|i| (i % 5) as f64 + 3.0).collect();
        let r = mann_whitney(&a, &b).unwrap();
        assert!(r.p_value < 0.001);
    }

    #[test]
    fn wilcoxon_exact_and_zero_dropping() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [2.0, 4.0, 6.0, 8.0, 10.0, 6.0];
        let r = wilcoxon_signed_rank(&x, &y).unwrap();
        // Five non-zero differences, all negative.
        assert_eq!(r.statistic, 0.0);
        assert!((r.p_value - 2.0 / 32.0).abs() < 1e-12);
        assert!(wilcoxon_signed_rank(&[1.0], &[1.0]).is_err());
    }

    #[test]
    fn kruskal_wallis_mean_ranks() {
        let groups = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let r = kruskal_wallis(&groups).unwrap();
        assert_eq!(r.mean_ranks, vec![2.0, 5.0]);
        assert!((r.h_statistic - 27.0 / 7.0).abs() < 1e-9);
        assert_eq!(r.df, 1.0);
    }

    #[test]
    fn chi_square_with_yates() {
        let table = vec![vec![10.0, 20.0], vec![20.0, 10.0]];
        let r = chi_square_independence(&table).unwrap();
        assert_eq!(r.df, 1.0);
        assert_eq!(r.expected[0][0], 15.0);
        // Uncorrected contributions sum to 6.667, Yates gives 5.4.
        let raw: f64 = r.contributions.iter().flatten().sum();
        assert!((raw - 20.0 / 3.0).abs() < 1e-9);
        assert!((r.chi2 - 5.4).abs() < 1e-9);
        assert!(chi_square_independence(&[vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn effect_size_from_p() {
        let r = effect_size_r(0.05, 100).unwrap();
        assert!((r - 0.196).abs() < 1e-3);
    }
}

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal, StudentsT};

/// Coefficient binomial en flottant, exact pour les tailles de pool usuelles.
pub fn binomial(n: u64, k: u64) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Probabilité qu'un ticket aléatoire partage exactement `j` numéros avec le tirage.
pub fn hypergeometric_pmf(pool: u8, k: usize, j: usize) -> f64 {
    let (p, k, j) = (pool as u64, k as u64, j as u64);
    if j > k || k > p {
        return 0.0;
    }
    binomial(k, j) * binomial(p - k, k - j) / binomial(p, k)
}

/// Loi du meilleur score parmi `tickets` tickets aléatoires indépendants : `dist[j] = P(best = j)`.
pub fn best_match_distribution(pool: u8, k: usize, tickets: usize) -> Vec<f64> {
    let pmf: Vec<f64> = (0..=k).map(|j| hypergeometric_pmf(pool, k, j)).collect();
    // P(X < j) pour un ticket, puis P(best < j) = P(X < j)^m.
    let below = |j: usize| pmf[..j].iter().sum::<f64>();
    (0..=k)
        .map(|j| {
            let lt_next = if j == k { 1.0 } else { below(j + 1) };
            lt_next.powf(tickets as f64) - below(j).powf(tickets as f64)
        })
        .collect()
}

pub fn expected_best_match(pool: u8, k: usize, tickets: usize) -> f64 {
    best_match_distribution(pool, k, tickets)
        .iter()
        .enumerate()
        .map(|(j, p)| j as f64 * p)
        .sum()
}

/// Probabilité qu'au moins un des `tickets` tickets aléatoires atteigne `threshold` numéros.
pub fn baseline_hit_rate(pool: u8, k: usize, tickets: usize, threshold: usize) -> f64 {
    best_match_distribution(pool, k, tickets)
        .iter()
        .skip(threshold)
        .sum()
}

/// Moyenne et variance d'échantillon (dénominateur `n - 1`).
pub fn mean_variance(xs: &[f64]) -> (f64, f64) {
    let n = xs.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = xs.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, var)
}

// ════════════════════════════════════════════════════════════════
// Tests statistiques
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelchTest {
    pub mean_a: f64,
    pub mean_b: f64,
    pub t: f64,
    pub df: f64,
    /// Bilatérale.
    pub p_value: f64,
}

/// Test t de Welch sur deux échantillons. `None` si un échantillon a moins de 2 valeurs.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Option<WelchTest> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let (mean_a, var_a) = mean_variance(a);
    let (mean_b, var_b) = mean_variance(b);
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let se2 = var_a / na + var_b / nb;
    if se2 <= 0.0 {
        // Deux séquences constantes : seule l'égalité des moyennes compte.
        let p_value = if (mean_a - mean_b).abs() < f64::EPSILON { 1.0 } else { 0.0 };
        return Some(WelchTest {
            mean_a,
            mean_b,
            t: if p_value == 1.0 { 0.0 } else { f64::INFINITY.copysign(mean_a - mean_b) },
            df: na + nb - 2.0,
            p_value,
        });
    }
    let t = (mean_a - mean_b) / se2.sqrt();
    let df = se2.powi(2)
        / ((var_a / na).powi(2) / (na - 1.0) + (var_b / nb).powi(2) / (nb - 1.0));
    let p_value = StudentsT::new(0.0, 1.0, df)
        .map(|dist| 2.0 * dist.sf(t.abs()))
        .unwrap_or(f64::NAN);
    Some(WelchTest {
        mean_a,
        mean_b,
        t,
        df,
        p_value: p_value.clamp(0.0, 1.0),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChiSquareTest {
    pub statistic: f64,
    pub df: f64,
    pub p_value: f64,
}

/// Adéquation de `captured` succès sur `trials` à une probabilité `expected` (2 classes, 1 ddl).
pub fn capture_goodness_of_fit(captured: usize, trials: usize, expected: f64) -> Option<ChiSquareTest> {
    if trials == 0 || !(0.0..=1.0).contains(&expected) {
        return None;
    }
    let n = trials as f64;
    let observed = [captured as f64, (trials - captured) as f64];
    let expected_counts = [expected * n, (1.0 - expected) * n];
    let mut statistic = 0.0;
    for (o, e) in observed.iter().zip(expected_counts) {
        if e > 0.0 {
            statistic += (o - e).powi(2) / e;
        } else if *o > 0.0 {
            statistic = f64::INFINITY;
        }
    }
    Some(ChiSquareTest {
        statistic,
        df: 1.0,
        p_value: chi_square_sf(statistic, 1.0),
    })
}

/// Somme de statistiques indépendantes ; les degrés de liberté s'additionnent.
pub fn combine_chi_square(tests: &[ChiSquareTest]) -> Option<ChiSquareTest> {
    if tests.is_empty() {
        return None;
    }
    let statistic: f64 = tests.iter().map(|t| t.statistic).sum();
    let df: f64 = tests.iter().map(|t| t.df).sum();
    Some(ChiSquareTest {
        statistic,
        df,
        p_value: chi_square_sf(statistic, df),
    })
}

fn chi_square_sf(statistic: f64, df: f64) -> f64 {
    if statistic.is_infinite() {
        return 0.0;
    }
    ChiSquared::new(df)
        .map(|dist| dist.sf(statistic))
        .unwrap_or(f64::NAN)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZTest {
    pub observed_mean: f64,
    pub expected_mean: f64,
    pub z: f64,
    /// Bilatérale.
    pub p_value: f64,
}

/// Test z d'une moyenne contre une loi de référence de moyenne et variance connues.
pub fn one_sample_z_test(sample: &[f64], expected_mean: f64, expected_variance: f64) -> Option<ZTest> {
    if sample.is_empty() || expected_variance <= 0.0 {
        return None;
    }
    let (observed_mean, _) = mean_variance(sample);
    let z = (observed_mean - expected_mean) / (expected_variance / sample.len() as f64).sqrt();
    let p_value = Normal::new(0.0, 1.0)
        .map(|dist| 2.0 * dist.sf(z.abs()))
        .unwrap_or(f64::NAN);
    Some(ZTest {
        observed_mean,
        expected_mean,
        z,
        p_value,
    })
}

/// Moyenne et variance d'une loi discrète sur `0..dist.len()`.
pub fn distribution_moments(dist: &[f64]) -> (f64, f64) {
    let mean: f64 = dist.iter().enumerate().map(|(j, p)| j as f64 * p).sum();
    let second: f64 = dist.iter().enumerate().map(|(j, p)| (j * j) as f64 * p).sum();
    (mean, (second - mean * mean).max(0.0))
}

// ════════════════════════════════════════════════════════════════
// Capture par position
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureStats {
    /// Fraction des jours où la valeur réelle tombe dans la plage, par position.
    pub per_position: Vec<f64>,
    /// Fraction des jours où toutes les positions sont capturées.
    pub all_captured_rate: f64,
    /// Produit des cibles moyennes par position.
    pub expected_all_captured: f64,
    pub days: usize,
}

/// `flags[d][i]` : la position `i + 1` du jour `d` est capturée. `targets[d][i]` : la cible de ce jour.
pub fn capture_statistics(flags: &[Vec<bool>], targets: &[Vec<f64>]) -> CaptureStats {
    let days = flags.len();
    let k = flags.first().map_or(0, Vec::len);
    if days == 0 || k == 0 {
        return CaptureStats {
            per_position: vec![0.0; k],
            all_captured_rate: 0.0,
            expected_all_captured: 0.0,
            days,
        };
    }
    let per_position = (0..k)
        .map(|i| flags.iter().filter(|f| f.get(i).copied().unwrap_or(false)).count() as f64 / days as f64)
        .collect();
    let all = flags.iter().filter(|f| f.iter().all(|&b| b)).count();
    let mean_targets: Vec<f64> = (0..k)
        .map(|i| targets.iter().map(|t| t.get(i).copied().unwrap_or(0.0)).sum::<f64>() / targets.len().max(1) as f64)
        .collect();
    CaptureStats {
        per_position,
        all_captured_rate: all as f64 / days as f64,
        expected_all_captured: mean_targets.iter().product(),
        days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngExt, SeedableRng};

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(5, 2), 10.0);
        assert!((binomial(39, 5) - 575_757.0).abs() < 1e-6);
        assert_eq!(binomial(3, 4), 0.0);
    }

    #[test]
    fn test_hypergeometric_sums_to_one() {
        let total: f64 = (0..=5).map(|j| hypergeometric_pmf(39, 5, j)).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((hypergeometric_pmf(39, 5, 5) - 1.0 / 575_757.0).abs() < 1e-15);
    }

    #[test]
    fn test_best_match_distribution() {
        let one = best_match_distribution(39, 5, 1);
        for j in 0..=5 {
            assert!((one[j] - hypergeometric_pmf(39, 5, j)).abs() < 1e-12);
        }
        let twenty = best_match_distribution(39, 5, 20);
        assert!((twenty.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(expected_best_match(39, 5, 20) > expected_best_match(39, 5, 1));
        let p3 = hypergeometric_pmf(39, 5, 3) + hypergeometric_pmf(39, 5, 4) + hypergeometric_pmf(39, 5, 5);
        let expected = 1.0 - (1.0 - p3).powi(20);
        assert!((baseline_hit_rate(39, 5, 20, 3) - expected).abs() < 1e-12);
        assert!((baseline_hit_rate(39, 5, 20, 0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_best_match_distribution_huge_ticket_count() {
        let tickets = i32::MAX as usize + 10;
        let dist = best_match_distribution(39, 5, tickets);
        assert!(dist.iter().all(|p| (0.0..=1.0).contains(p)), "{dist:?}");
        assert!((dist.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(dist[0], 0.0);
        assert!(dist[5] > 0.99);
    }

    #[test]
    fn test_mean_variance() {
        let (m, v) = mean_variance(&[1.0, 2.0, 3.0, 4.0]);
        assert!((m - 2.5).abs() < 1e-12);
        assert!((v - 5.0 / 3.0).abs() < 1e-12);
        assert_eq!(mean_variance(&[]), (0.0, 0.0));
        assert_eq!(mean_variance(&[7.0]), (7.0, 0.0));
    }

    #[test]
    fn test_welch_identical_samples() {
        let a = [1.0, 2.0, 3.0, 2.0, 1.0];
        let test = welch_t_test(&a, &a).unwrap();
        assert!(test.t.abs() < 1e-12);
        assert!((test.p_value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_welch_detects_shift() {
        let a: Vec<f64> = (0..50).map(|i| (i % 3) as f64).collect();
        let b: Vec<f64> = a.iter().map(|x| x + 2.0).collect();
        let test = welch_t_test(&a, &b).unwrap();
        assert!(test.t < 0.0);
        assert!(test.p_value < 1e-6);
        assert!(welch_t_test(&[1.0], &b).is_none());
    }

    #[test]
    fn test_welch_constant_samples() {
        let test = welch_t_test(&[2.0, 2.0], &[2.0, 2.0, 2.0]).unwrap();
        assert_eq!(test.p_value, 1.0);
        let test = welch_t_test(&[2.0, 2.0], &[3.0, 3.0]).unwrap();
        assert_eq!(test.p_value, 0.0);
    }

    #[test]
    fn test_goodness_of_fit() {
        let exact = capture_goodness_of_fit(85, 100, 0.85).unwrap();
        assert!(exact.statistic.abs() < 1e-12);
        assert!((exact.p_value - 1.0).abs() < 1e-9);

        let off = capture_goodness_of_fit(50, 100, 0.85).unwrap();
        assert!(off.p_value < 1e-6);

        let full = capture_goodness_of_fit(100, 100, 1.0).unwrap();
        assert_eq!(full.statistic, 0.0);
        assert!(capture_goodness_of_fit(10, 0, 0.5).is_none());
    }

    #[test]
    fn test_combine_chi_square() {
        let a = ChiSquareTest { statistic: 1.0, df: 1.0, p_value: 0.3 };
        let b = ChiSquareTest { statistic: 2.0, df: 1.0, p_value: 0.15 };
        let combined = combine_chi_square(&[a, b]).unwrap();
        assert_eq!(combined.statistic, 3.0);
        assert_eq!(combined.df, 2.0);
        assert!((combined.p_value - (-1.5f64).exp()).abs() < 1e-9);
        assert!(combine_chi_square(&[]).is_none());
    }

    #[test]
    fn test_z_test() {
        let dist = best_match_distribution(39, 5, 20);
        let (mean, var) = distribution_moments(&dist);
        let sample = vec![mean; 30];
        let z = one_sample_z_test(&sample, mean, var).unwrap();
        assert!(z.z.abs() < 1e-9);
        assert!((z.p_value - 1.0).abs() < 1e-9);
        let high = vec![mean + 1.0; 100];
        assert!(one_sample_z_test(&high, mean, var).unwrap().p_value < 1e-6);
    }

    #[test]
    fn test_compound_capture_rate() {
        // Position i : capturée avec probabilité 0.85, indépendamment des autres.
        let mut rng = StdRng::seed_from_u64(2024);
        let days = 20_000;
        let flags: Vec<Vec<bool>> = (0..days)
            .map(|_| (0..5).map(|_| rng.random::<f64>() < 0.85).collect())
            .collect();
        let targets = vec![vec![0.85; 5]; days];
        let stats = capture_statistics(&flags, &targets);
        assert!((stats.expected_all_captured - 0.85f64.powi(5)).abs() < 1e-12);
        assert!((stats.all_captured_rate - 0.85f64.powi(5)).abs() < 0.02, "{}", stats.all_captured_rate);
        for rate in &stats.per_position {
            assert!((rate - 0.85).abs() < 0.02);
        }
    }
}

use fantasy5_history::Window;
use fantasy5_history::error::{Error, Result, invalid_config};
use serde::{Deserialize, Serialize};

use crate::adjacency::AdjacencyModel;

/// Poids accordé à un tirage selon son âge (0 = le plus récent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum RecencyWeighting {
    /// `decay^age`.
    Exponential { decay: f64 },
    /// `(lookback - age) / lookback`.
    Linear,
    Uniform,
    /// `weights[age]`, 0 au-delà de la liste.
    Custom { weights: Vec<f64> },
}

impl Default for RecencyWeighting {
    fn default() -> Self {
        RecencyWeighting::Exponential { decay: 0.5 }
    }
}

impl RecencyWeighting {
    pub fn weight(&self, age: usize, lookback: usize) -> f64 {
        match self {
            RecencyWeighting::Exponential { decay } => decay.powi(age as i32),
            RecencyWeighting::Linear => {
                if age >= lookback {
                    0.0
                } else {
                    (lookback - age) as f64 / lookback as f64
                }
            }
            RecencyWeighting::Uniform => 1.0,
            RecencyWeighting::Custom { weights } => weights.get(age).copied().unwrap_or(0.0),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            RecencyWeighting::Exponential { decay } => {
                if !(decay.is_finite() && *decay > 0.0 && *decay <= 1.0) {
                    return invalid_config(format!("décroissance {decay} hors de ]0, 1]"));
                }
            }
            RecencyWeighting::Custom { weights } => {
                if weights.is_empty() {
                    return invalid_config("pondération personnalisée vide");
                }
                if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                    return invalid_config("poids de récence négatif ou non fini");
                }
            }
            RecencyWeighting::Linear | RecencyWeighting::Uniform => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactConfig {
    /// Nombre de tirages récents pris en compte.
    pub lookback: usize,
    pub weighting: RecencyWeighting,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            lookback: 1,
            weighting: RecencyWeighting::default(),
        }
    }
}

impl ContactConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lookback == 0 {
            return invalid_config("lookback doit être >= 1");
        }
        self.weighting.validate()
    }
}

/// Score de contact pour chaque numéro du pool, y compris les zéros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactScore {
    /// Indexé par `n - 1`.
    pub scores: Vec<f64>,
}

impl ContactScore {
    pub fn uniform(pool_size: u8) -> Self {
        Self {
            scores: vec![0.0; pool_size as usize],
        }
    }

    pub fn pool_size(&self) -> u8 {
        self.scores.len() as u8
    }

    pub fn get(&self, n: u8) -> f64 {
        (n as usize)
            .checked_sub(1)
            .and_then(|i| self.scores.get(i).copied())
            .unwrap_or(0.0)
    }

    /// Numéros par score décroissant, le plus petit numéro d'abord à égalité.
    pub fn ranked(&self) -> Vec<(u8, f64)> {
        let mut out: Vec<(u8, f64)> = self
            .scores
            .iter()
            .enumerate()
            .map(|(i, &s)| (i as u8 + 1, s))
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        out
    }

    /// Scores ramenés dans `[0, 1]` par division par le maximum.
    pub fn normalized(&self) -> Vec<f64> {
        let max = self.scores.iter().copied().fold(0.0, f64::max);
        if max <= 0.0 {
            return vec![0.0; self.scores.len()];
        }
        self.scores.iter().map(|s| s / max).collect()
    }

    pub fn in_contact(&self) -> Vec<u8> {
        self.scores
            .iter()
            .enumerate()
            .filter(|(_, s)| **s > 0.0)
            .map(|(i, _)| i as u8 + 1)
            .collect()
    }

    pub fn total(&self) -> f64 {
        self.scores.iter().sum()
    }

    /// Somme des scores des numéros d'une combinaison.
    pub fn ticket_score(&self, numbers: &[u8]) -> f64 {
        numbers.iter().map(|&n| self.get(n)).sum()
    }
}

pub struct ContactScorer {
    config: ContactConfig,
}

impl ContactScorer {
    pub fn new(config: ContactConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ContactConfig {
        &self.config
    }

    /// Pour chaque tirage récent `d` d'âge `a` et chaque numéro tiré `m`, chaque voisin `n`
    /// de `m` reçoit `weight(a) × correction_factor(n)`.
    pub fn score(&self, recent: Window<'_>, model: &dyn AdjacencyModel) -> Result<ContactScore> {
        if recent.is_empty() {
            return Err(Error::EmptyWindow(
                "aucun tirage récent pour le score de contact".to_string(),
            ));
        }
        let pool = model.pool_size();
        if pool != recent.game().pool_size {
            return invalid_config(format!(
                "modèle d'adjacence sur {pool} numéros pour un jeu à {}",
                recent.game().pool_size
            ));
        }
        let mut scores = vec![0.0; pool as usize];
        let lookback = self.config.lookback;
        for (age, draw) in recent.latest(lookback).enumerate() {
            let w = self.config.weighting.weight(age, lookback);
            if w == 0.0 {
                continue;
            }
            for &m in &draw.numbers {
                for &n in model.neighbors(m) {
                    scores[(n - 1) as usize] += w * model.correction_factor(n);
                }
            }
        }
        Ok(ContactScore { scores })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjacency::AdjacencyConfig;
    use fantasy5_history::models::make_test_draws;
    use fantasy5_history::{DrawHistory, GameConfig};

    fn history(n: usize) -> DrawHistory {
        DrawHistory::from_draws(GameConfig::FANTASY5, make_test_draws(n)).unwrap()
    }

    #[test]
    fn test_score_is_total_over_pool() {
        let h = history(10);
        let model = AdjacencyConfig::default().build(39).unwrap();
        let scorer = ContactScorer::new(ContactConfig::default()).unwrap();
        let score = scorer.score(h.as_window(), model.as_ref()).unwrap();
        assert_eq!(score.scores.len(), 39);
        assert!(score.scores.iter().all(|s| *s >= 0.0));
    }

    #[test]
    fn test_single_draw_proximity_counts() {
        let h = history(1);
        // Dernier tirage : [1, 8, 14, 20, 25]
        let model = AdjacencyConfig::Proximity { width: 1, wrap: true }.build(39).unwrap();
        let scorer = ContactScorer::new(ContactConfig::default()).unwrap();
        let score = scorer.score(h.as_window(), model.as_ref()).unwrap();
        assert_eq!(score.get(2), 1.0);
        assert_eq!(score.get(39), 1.0);
        assert_eq!(score.get(7), 1.0);
        assert_eq!(score.get(1), 0.0);
        assert_eq!(score.get(30), 0.0);
        // 2 touche 1 ; 19 et 21 touchent 20.
        assert_eq!(score.in_contact(), vec![2, 7, 9, 13, 15, 19, 21, 24, 26, 39]);
        assert!((score.total() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_shared_neighbor_accumulates() {
        let game = GameConfig::FANTASY5;
        let d = fantasy5_history::Draw::new(
            chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            vec![10, 12, 20, 30, 35],
            &game,
        )
        .unwrap();
        let h = DrawHistory::from_draws(game, vec![d]).unwrap();
        let model = AdjacencyConfig::Proximity { width: 1, wrap: false }.build(39).unwrap();
        let scorer = ContactScorer::new(ContactConfig::default()).unwrap();
        let score = scorer.score(h.as_window(), model.as_ref()).unwrap();
        assert_eq!(score.get(11), 2.0);
        assert_eq!(score.ranked()[0], (11, 2.0));
    }

    #[test]
    fn test_recency_weights() {
        let exp = RecencyWeighting::Exponential { decay: 0.5 };
        assert_eq!(exp.weight(0, 3), 1.0);
        assert_eq!(exp.weight(2, 3), 0.25);
        assert_eq!(RecencyWeighting::Linear.weight(0, 4), 1.0);
        assert_eq!(RecencyWeighting::Linear.weight(3, 4), 0.25);
        assert_eq!(RecencyWeighting::Uniform.weight(7, 4), 1.0);
        let custom = RecencyWeighting::Custom { weights: vec![3.0, 1.0] };
        assert_eq!(custom.weight(1, 5), 1.0);
        assert_eq!(custom.weight(2, 5), 0.0);
    }

    #[test]
    fn test_lookback_weighting_favors_recent() {
        let h = history(3);
        let model = AdjacencyConfig::Toroidal { rows: None }.build(39).unwrap();
        let one = ContactScorer::new(ContactConfig { lookback: 1, ..Default::default() }).unwrap();
        let three = ContactScorer::new(ContactConfig { lookback: 3, ..Default::default() }).unwrap();
        let s1 = one.score(h.as_window(), model.as_ref()).unwrap();
        let s3 = three.score(h.as_window(), model.as_ref()).unwrap();
        // Poids 1 + 0.5 + 0.25 sur 5 numéros x 8 voisins.
        assert!((s1.total() - 40.0).abs() < 1e-9);
        assert!((s3.total() - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_corrected_grid_applies_factor() {
        let h = history(1);
        let model = AdjacencyConfig::CorrectedGrid { rows: 6 }.build(39).unwrap();
        let scorer = ContactScorer::new(ContactConfig::default()).unwrap();
        let score = scorer.score(h.as_window(), model.as_ref()).unwrap();
        // 2 (5 voisins) touche 1 et 8 : deux contacts à 8/5.
        assert!((score.get(2) - 2.0 * 8.0 / 5.0).abs() < 1e-9);
        // 8 est intérieur, facteur 1 ; il touche 1 et 14.
        assert!((score.get(8) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_idempotent() {
        let h = history(20);
        let model = AdjacencyConfig::default().build(39).unwrap();
        let scorer = ContactScorer::new(ContactConfig { lookback: 5, ..Default::default() }).unwrap();
        let a = scorer.score(h.as_window(), model.as_ref()).unwrap();
        let b = scorer.score(h.as_window(), model.as_ref()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_window_and_invalid_config() {
        let h = history(5);
        let model = AdjacencyConfig::default().build(39).unwrap();
        let scorer = ContactScorer::new(ContactConfig::default()).unwrap();
        let empty = h.before(chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        assert!(matches!(scorer.score(empty, model.as_ref()), Err(Error::EmptyWindow(_))));

        assert!(ContactScorer::new(ContactConfig { lookback: 0, ..Default::default() }).is_err());
        let bad = ContactConfig {
            lookback: 2,
            weighting: RecencyWeighting::Exponential { decay: 1.5 },
        };
        assert!(ContactScorer::new(bad).is_err());
        let negative = ContactConfig {
            lookback: 2,
            weighting: RecencyWeighting::Custom { weights: vec![1.0, -0.1] },
        };
        assert!(ContactScorer::new(negative).is_err());
    }

    #[test]
    fn test_normalized_and_zero_scores() {
        let score = ContactScore { scores: vec![0.0, 2.0, 4.0] };
        assert_eq!(score.normalized(), vec![0.0, 0.5, 1.0]);
        assert_eq!(ContactScore::uniform(3).normalized(), vec![0.0; 3]);
        assert_eq!(score.ticket_score(&[2, 3]), 6.0);
    }
}

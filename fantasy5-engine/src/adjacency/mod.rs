pub mod grid;
pub mod proximity;
pub mod toroidal;

use fantasy5_history::error::{Result, invalid_config};
use serde::{Deserialize, Serialize};

pub use grid::{GridAdjacency, GridLayout, PositionClass};
pub use proximity::ProximityAdjacency;
pub use toroidal::ToroidalAdjacency;

/// Variance en dessous de laquelle un modèle est considéré sans biais.
pub const BIAS_EPSILON: f64 = 1e-9;

/// Relation de voisinage entre numéros du pool, avec son facteur de correction.
///
/// `neighbors(n)` est trié, sans `n` lui-même, et vide pour un numéro hors du pool.
pub trait AdjacencyModel: Send + Sync {
    fn name(&self) -> &str;
    fn pool_size(&self) -> u8;
    fn neighbors(&self, n: u8) -> &[u8];
    fn correction_factor(&self, n: u8) -> f64;

    /// Cellules vides `(ligne, colonne)` de la disposition, pour les modèles en grille.
    fn gap_cells(&self) -> Vec<(usize, usize)> {
        Vec::new()
    }

    fn effective_contact(&self, n: u8) -> f64 {
        self.neighbors(n).len() as f64 * self.correction_factor(n)
    }

    fn is_neighbor(&self, a: u8, b: u8) -> bool {
        self.neighbors(a).binary_search(&b).is_ok()
    }

    /// Numéros tirés et tous leurs voisins, triés et sans doublon.
    fn in_contact(&self, drawn: &[u8]) -> Vec<u8> {
        let pool = self.pool_size();
        let mut mask = vec![false; pool as usize + 1];
        for &m in drawn {
            if m >= 1 && m <= pool {
                mask[m as usize] = true;
                for &n in self.neighbors(m) {
                    mask[n as usize] = true;
                }
            }
        }
        (1..=pool).filter(|&n| mask[n as usize]).collect()
    }

    fn bias_report(&self) -> BiasReport {
        BiasReport::compute(self)
    }
}

// ════════════════════════════════════════════════════════════════
// Quantification du biais
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasReport {
    pub model: String,
    /// Nombre brut de voisins, indexé par `n - 1`.
    pub neighbor_counts: Vec<usize>,
    /// `|neighbors(n)| × correction_factor(n)`, indexé par `n - 1`.
    pub effective_contacts: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Variance de population des contacts effectifs.
    pub variance: f64,
    /// `max / min`, absent si un numéro n'a aucun contact effectif.
    pub max_min_ratio: Option<f64>,
    pub range: f64,
    /// Plus grand écart relatif à la moyenne, `|x - mean| / mean`.
    pub max_relative_deviation: f64,
    pub gap_count: usize,
    pub gap_cells: Vec<(usize, usize)>,
    pub bias_free: bool,
}

impl BiasReport {
    pub fn compute<M: AdjacencyModel + ?Sized>(model: &M) -> Self {
        let pool = model.pool_size();
        let neighbor_counts: Vec<usize> = (1..=pool).map(|n| model.neighbors(n).len()).collect();
        let effective_contacts: Vec<f64> = (1..=pool).map(|n| model.effective_contact(n)).collect();

        let len = effective_contacts.len().max(1) as f64;
        let min = effective_contacts.iter().copied().fold(f64::INFINITY, f64::min);
        let max = effective_contacts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = effective_contacts.iter().sum::<f64>() / len;
        let variance = effective_contacts
            .iter()
            .map(|x| (x - mean).powi(2))
            .sum::<f64>()
            / len;
        let max_relative_deviation = if mean > 0.0 {
            effective_contacts
                .iter()
                .map(|x| (x - mean).abs() / mean)
                .fold(0.0, f64::max)
        } else {
            0.0
        };
        let gap_cells = model.gap_cells();

        Self {
            model: model.name().to_string(),
            neighbor_counts,
            effective_contacts,
            min,
            max,
            mean,
            variance,
            max_min_ratio: (min > 0.0).then(|| max / min),
            range: max - min,
            max_relative_deviation,
            gap_count: gap_cells.len(),
            gap_cells,
            bias_free: variance <= BIAS_EPSILON,
        }
    }

    /// Vrai si chaque contact effectif reste à `tolerance` (relatif) de la moyenne.
    pub fn within_tolerance(&self, tolerance: f64) -> bool {
        self.max_relative_deviation <= tolerance
    }
}

// ════════════════════════════════════════════════════════════════
// Sélection par configuration
// ════════════════════════════════════════════════════════════════

/// Choix du modèle d'adjacence et de ses paramètres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdjacencyConfig {
    /// Grille remplie colonne par colonne, sans correction.
    Grid { rows: usize },
    /// Même grille, facteur `max / voisins(n)`.
    CorrectedGrid { rows: usize },
    Proximity { width: u8, wrap: bool },
    /// Tore `rows × (P / rows)` ; `rows` absent : factorisation la plus carrée.
    Toroidal { rows: Option<usize> },
    /// Disposition fournie ligne par ligne, `None` pour une cellule vide.
    CustomGrid {
        rows: Vec<Vec<Option<u8>>>,
        corrected: bool,
    },
}

impl Default for AdjacencyConfig {
    fn default() -> Self {
        AdjacencyConfig::Proximity {
            width: 3,
            wrap: true,
        }
    }
}

impl AdjacencyConfig {
    pub fn build(&self, pool_size: u8) -> Result<Box<dyn AdjacencyModel>> {
        let model: Box<dyn AdjacencyModel> = match self {
            AdjacencyConfig::Grid { rows } => {
                Box::new(GridAdjacency::new(GridLayout::column_major(pool_size, *rows)?, false))
            }
            AdjacencyConfig::CorrectedGrid { rows } => {
                Box::new(GridAdjacency::new(GridLayout::column_major(pool_size, *rows)?, true))
            }
            AdjacencyConfig::Proximity { width, wrap } => {
                Box::new(ProximityAdjacency::new(pool_size, *width, *wrap)?)
            }
            AdjacencyConfig::Toroidal { rows } => Box::new(ToroidalAdjacency::new(pool_size, *rows)?),
            AdjacencyConfig::CustomGrid { rows, corrected } => {
                if rows.is_empty() {
                    return invalid_config("grille personnalisée vide");
                }
                Box::new(GridAdjacency::new(
                    GridLayout::from_rows(pool_size, rows)?,
                    *corrected,
                ))
            }
        };
        Ok(model)
    }

    pub fn validate(&self, pool_size: u8) -> Result<()> {
        self.build(pool_size).map(|_| ())
    }

    /// Libellé court, ex. `proximity(w=3, wrap)`.
    pub fn label(&self) -> String {
        match self {
            AdjacencyConfig::Grid { rows } => format!("grid({rows} lignes)"),
            AdjacencyConfig::CorrectedGrid { rows } => format!("corrected-grid({rows} lignes)"),
            AdjacencyConfig::Proximity { width, wrap: true } => format!("proximity(w={width}, wrap)"),
            AdjacencyConfig::Proximity { width, wrap: false } => format!("proximity(w={width})"),
            AdjacencyConfig::Toroidal { rows: Some(r) } => format!("toroidal({r} lignes)"),
            AdjacencyConfig::Toroidal { rows: None } => "toroidal(auto)".to_string(),
            AdjacencyConfig::CustomGrid { corrected, .. } => {
                if *corrected {
                    "custom-grid(corrigée)".to_string()
                } else {
                    "custom-grid".to_string()
                }
            }
        }
    }

    /// Les variantes comparées par défaut dans le rapport de biais.
    pub fn standard_variants() -> Vec<AdjacencyConfig> {
        vec![
            AdjacencyConfig::Grid { rows: 6 },
            AdjacencyConfig::CorrectedGrid { rows: 6 },
            AdjacencyConfig::Proximity { width: 3, wrap: false },
            AdjacencyConfig::Proximity { width: 3, wrap: true },
            AdjacencyConfig::Toroidal { rows: None },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: u8 = 39;

    #[test]
    fn test_uncorrected_grid_reference_variance() {
        let model = AdjacencyConfig::Grid { rows: 6 }.build(P).unwrap();
        let report = model.bias_report();
        assert!((report.variance - 1600.0 / 507.0).abs() < 1e-9, "{}", report.variance);
        assert!((report.mean - 240.0 / 39.0).abs() < 1e-9);
        assert_eq!(report.min, 3.0);
        assert_eq!(report.max, 8.0);
        assert!((report.max_min_ratio.unwrap() - 8.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.gap_count, 3);
        assert!(!report.bias_free);
    }

    #[test]
    fn test_corrected_variants_bias_free() {
        for config in [
            AdjacencyConfig::CorrectedGrid { rows: 6 },
            AdjacencyConfig::Proximity { width: 3, wrap: true },
            AdjacencyConfig::Proximity { width: 3, wrap: false },
            AdjacencyConfig::Toroidal { rows: None },
        ] {
            let report = config.build(P).unwrap().bias_report();
            assert!(report.bias_free, "{}: variance {}", config.label(), report.variance);
            assert!(report.within_tolerance(0.05));
        }
    }

    #[test]
    fn test_neighbors_symmetric_for_all_variants() {
        for config in AdjacencyConfig::standard_variants() {
            let model = config.build(P).unwrap();
            for a in 1..=P {
                for &b in model.neighbors(a) {
                    assert_ne!(a, b);
                    assert!(model.is_neighbor(b, a), "{}: {a} ~ {b}", model.name());
                }
            }
        }
    }

    #[test]
    fn test_out_of_pool_has_no_neighbors() {
        let model = AdjacencyConfig::default().build(P).unwrap();
        assert!(model.neighbors(0).is_empty());
        assert!(model.neighbors(40).is_empty());
    }

    #[test]
    fn test_in_contact_includes_drawn_and_neighbors() {
        let model = AdjacencyConfig::Proximity { width: 1, wrap: true }.build(P).unwrap();
        assert_eq!(model.in_contact(&[1, 20]), vec![1, 2, 19, 20, 21, 39]);
        assert!(model.in_contact(&[]).is_empty());
    }

    #[test]
    fn test_config_serde_tagged() {
        let config = AdjacencyConfig::Proximity { width: 3, wrap: true };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"kind\":\"proximity\""), "{json}");
        let back: AdjacencyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(AdjacencyConfig::Grid { rows: 0 }.validate(P).is_err());
        assert!(AdjacencyConfig::Proximity { width: 0, wrap: true }.validate(P).is_err());
        assert!(AdjacencyConfig::Proximity { width: 20, wrap: true }.validate(P).is_err());
        assert!(AdjacencyConfig::Toroidal { rows: None }.validate(37).is_err());
        assert!(AdjacencyConfig::CustomGrid { rows: vec![], corrected: false }.validate(P).is_err());
    }
}

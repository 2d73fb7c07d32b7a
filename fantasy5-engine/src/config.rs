use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use fantasy5_history::GameConfig;
use fantasy5_history::error::{Result, invalid_config};

use crate::adjacency::AdjacencyConfig;
use crate::contact::ContactConfig;
use crate::generator::GeneratorConfig;

/// Configuration complète d'une exécution du pipeline plages → contact → tickets.
/// Valeur immuable passée à chaque composant, jamais d'état global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Nombre de tirages récents utilisés pour les plages ; `None` = tout l'historique antérieur.
    pub range_window: Option<usize>,
    pub capture_target: f64,
    /// Bornes fixes par position, prioritaires sur `capture_target`.
    pub fixed_bounds: Option<Vec<(u8, u8)>>,
    pub adjacency: AdjacencyConfig,
    pub contact: ContactConfig,
    pub generator: GeneratorConfig,
    /// Seuils de correspondance suivis par le backtest.
    pub thresholds: Vec<usize>,
    /// Jours ignorés tant que l'historique antérieur est plus court.
    pub min_history: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            range_window: None,
            capture_target: 0.85,
            fixed_bounds: None,
            adjacency: AdjacencyConfig::default(),
            contact: ContactConfig::default(),
            generator: GeneratorConfig::default(),
            thresholds: vec![2, 3, 4, 5],
            min_history: 30,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self, game: &GameConfig) -> Result<()> {
        game.validate()?;
        if self.range_window == Some(0) {
            return invalid_config("range_window doit être >= 1");
        }
        if !self.capture_target.is_finite() || self.capture_target <= 0.0 || self.capture_target > 1.0 {
            return invalid_config(format!("capture_target {} hors de ]0, 1]", self.capture_target));
        }
        if let Some(bounds) = &self.fixed_bounds {
            if bounds.len() != game.draw_size {
                return invalid_config(format!(
                    "{} bornes fixes pour {} positions",
                    bounds.len(),
                    game.draw_size
                ));
            }
            for (i, &(lo, hi)) in bounds.iter().enumerate() {
                if lo > hi || !game.contains(lo) || !game.contains(hi) {
                    return invalid_config(format!("bornes fixes invalides en position {} : [{lo}, {hi}]", i + 1));
                }
            }
        }
        self.adjacency.validate(game.pool_size)?;
        self.contact.validate()?;
        self.generator.validate(game)?;
        if let Some(&t) = self.thresholds.iter().find(|&&t| t == 0 || t > game.draw_size) {
            return invalid_config(format!("seuil {t} hors de 1..={}", game.draw_size));
        }
        if self.min_history == 0 {
            return invalid_config("min_history doit être >= 1");
        }
        Ok(())
    }

    /// Résumé d'une ligne pour les tableaux et les journaux.
    pub fn label(&self) -> String {
        let ranges = match &self.fixed_bounds {
            Some(_) => "bornes fixes".to_string(),
            None => format!("{:.0}%", self.capture_target * 100.0),
        };
        let filters = if self.generator.filters.is_some() { "+filtres" } else { "" };
        format!(
            "{} | {} | {} x{}{}",
            ranges,
            self.adjacency.label(),
            self.generator.strategy,
            self.generator.ticket_count,
            filters
        )
    }
}

pub fn save_config(config: &PipelineConfig, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json).with_context(|| format!("Impossible d'écrire {}", path.display()))?;
    Ok(())
}

pub fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {}", path.display()))?;
    let config: PipelineConfig = serde_json::from_str(&json)
        .with_context(|| format!("Configuration JSON invalide : {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterConfig;
    use crate::generator::Strategy;

    #[test]
    fn test_default_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate(&GameConfig::FANTASY5).is_ok());
        assert!((config.capture_target - 0.85).abs() < 1e-12);
        assert_eq!(config.thresholds, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let game = GameConfig::FANTASY5;
        let cases = [
            PipelineConfig { capture_target: 0.0, ..Default::default() },
            PipelineConfig { capture_target: 1.1, ..Default::default() },
            PipelineConfig { range_window: Some(0), ..Default::default() },
            PipelineConfig { thresholds: vec![6], ..Default::default() },
            PipelineConfig { min_history: 0, ..Default::default() },
            PipelineConfig { fixed_bounds: Some(vec![(5, 1); 5]), ..Default::default() },
            PipelineConfig { fixed_bounds: Some(vec![(1, 10); 4]), ..Default::default() },
            PipelineConfig {
                adjacency: AdjacencyConfig::Proximity { width: 0, wrap: true },
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(config.validate(&game).is_err(), "{config:?}");
        }
        let k_ge_p = GameConfig { pool_size: 5, draw_size: 5 };
        assert!(PipelineConfig::default().validate(&k_ge_p).is_err());
    }

    #[test]
    fn test_label() {
        let config = PipelineConfig {
            generator: GeneratorConfig {
                strategy: Strategy::ContactFirst,
                filters: Some(FilterConfig::default()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.label(), "85% | proximity(w=3, wrap) | contact-first x20+filtres");
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("fantasy5-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pipeline.json");
        let config = PipelineConfig {
            adjacency: AdjacencyConfig::CorrectedGrid { rows: 6 },
            fixed_bounds: Some(vec![(1, 12), (5, 22), (12, 29), (19, 35), (27, 39)]),
            ..Default::default()
        };
        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"capture_target": 0.8}"#).unwrap();
        assert!((config.capture_target - 0.8).abs() < 1e-12);
        assert_eq!(config.min_history, 30);
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = load_config(Path::new("/nonexistent/fantasy5.json")).unwrap_err();
        assert!(err.to_string().contains("Impossible de lire"));
    }
}

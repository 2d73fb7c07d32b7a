use fantasy5_history::error::{Error, Result, invalid_config};
use fantasy5_history::{FrequencyTable, GameConfig, Window};
use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
// Plages par position
// ════════════════════════════════════════════════════════════════

/// Intervalle `[lower, upper]` retenu pour une position triée.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRange {
    pub position: usize,
    pub lower: u8,
    pub upper: u8,
    pub target: f64,
    /// Fraction des tirages de la fenêtre dont la valeur tombe dans l'intervalle.
    pub achieved: f64,
    pub captured: usize,
    pub window_size: usize,
}

impl PositionRange {
    pub fn contains(&self, n: u8) -> bool {
        n >= self.lower && n <= self.upper
    }

    pub fn width(&self) -> usize {
        (self.upper - self.lower) as usize + 1
    }
}

/// Une plage par position, utilisée comme contrainte active par le générateur.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSet {
    pub ranges: Vec<PositionRange>,
}

impl RangeSet {
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Plage de la position `position` (1-based).
    pub fn get(&self, position: usize) -> Option<&PositionRange> {
        position.checked_sub(1).and_then(|i| self.ranges.get(i))
    }

    /// Vrai si `n` est dans la plage de la position donnée.
    pub fn compliant(&self, position: usize, n: u8) -> bool {
        self.get(position).is_some_and(|r| r.contains(n))
    }

    pub fn contains_ticket(&self, numbers: &[u8]) -> bool {
        numbers.len() == self.ranges.len()
            && numbers.iter().zip(&self.ranges).all(|(&n, r)| r.contains(n))
    }

    /// Positions (1-based) dont la valeur sort de la plage.
    pub fn violations(&self, numbers: &[u8]) -> Vec<usize> {
        self.ranges
            .iter()
            .zip(numbers)
            .filter(|(r, n)| !r.contains(**n))
            .map(|(r, _)| r.position)
            .collect()
    }

    /// Produit des cibles : probabilité de capture conjointe si les positions étaient indépendantes.
    pub fn expected_joint_capture(&self) -> f64 {
        self.ranges.iter().map(|r| r.target).product()
    }

    /// Produit des captures observées.
    pub fn achieved_joint_capture(&self) -> f64 {
        self.ranges.iter().map(|r| r.achieved).product()
    }
}

/// Meilleure capture possible pour une largeur donnée.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureTradeoff {
    pub width: usize,
    pub lower: u8,
    pub upper: u8,
    pub captured: usize,
    pub fraction: f64,
}

// ════════════════════════════════════════════════════════════════
// Optimiseur
// ════════════════════════════════════════════════════════════════

/// Recherche, par position, de l'intervalle contigu le plus étroit atteignant une cible de capture.
/// Les tables de fréquence sont calculées une seule fois à la construction.
#[derive(Debug, Clone)]
pub struct RangeOptimizer {
    game: GameConfig,
    tables: Vec<FrequencyTable>,
    window_size: usize,
}

impl RangeOptimizer {
    pub fn new(window: Window<'_>) -> Result<Self> {
        if window.is_empty() {
            return Err(Error::EmptyWindow(
                "l'optimiseur de plages requiert au moins un tirage".to_string(),
            ));
        }
        let game = *window.game();
        let tables = (1..=game.draw_size)
            .map(|p| window.frequency(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            game,
            tables,
            window_size: window.len(),
        })
    }

    pub fn game(&self) -> &GameConfig {
        &self.game
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn frequency(&self, position: usize) -> Result<&FrequencyTable> {
        self.game.check_position(position)?;
        Ok(&self.tables[position - 1])
    }

    pub fn optimal_range(&self, position: usize, target: f64) -> Result<PositionRange> {
        if !target.is_finite() || target <= 0.0 {
            return invalid_config(format!("cible de capture {target} hors de ]0, 1]"));
        }
        if target > 1.0 {
            return Err(Error::InfeasibleRange { position, target });
        }
        let table = self.frequency(position)?;
        let n = table.total;
        let required = required_count(target, n);
        let prefix = table.prefix_sums();
        let pool = self.game.pool_size as usize;

        // (largeur, lo, hi, capturés)
        let mut best: Option<(usize, usize, usize, usize)> = None;
        let mut hi = 1;
        for lo in 1..=pool {
            hi = hi.max(lo);
            while hi <= pool && prefix[hi] - prefix[lo - 1] < required {
                hi += 1;
            }
            if hi > pool {
                // La somme ne fait que décroître quand lo avance.
                break;
            }
            let width = hi - lo + 1;
            if best.is_none_or(|(w, ..)| width < w) {
                best = Some((width, lo, hi, prefix[hi] - prefix[lo - 1]));
            }
        }

        let (_, lo, hi, captured) = best.ok_or(Error::InfeasibleRange { position, target })?;
        Ok(PositionRange {
            position,
            lower: lo as u8,
            upper: hi as u8,
            target,
            achieved: captured as f64 / n as f64,
            captured,
            window_size: n,
        })
    }

    pub fn optimal_ranges(&self, target: f64) -> Result<RangeSet> {
        let ranges = (1..=self.game.draw_size)
            .map(|p| self.optimal_range(p, target))
            .collect::<Result<Vec<_>>>()?;
        Ok(RangeSet { ranges })
    }

    /// Un `RangeSet` par cible, dans l'ordre des cibles (ex. 0.80 / 0.85 / 0.90).
    pub fn range_table(&self, targets: &[f64]) -> Result<Vec<RangeSet>> {
        targets.iter().map(|&t| self.optimal_ranges(t)).collect()
    }

    /// Évalue des bornes fixées par l'appelant sur la fenêtre. La cible enregistrée est la capture observée.
    pub fn evaluate_bounds(&self, bounds: &[(u8, u8)]) -> Result<RangeSet> {
        if bounds.len() != self.game.draw_size {
            return invalid_config(format!(
                "{} bornes fournies pour {} positions",
                bounds.len(),
                self.game.draw_size
            ));
        }
        let mut ranges = Vec::with_capacity(bounds.len());
        for (i, &(lower, upper)) in bounds.iter().enumerate() {
            let position = i + 1;
            if lower > upper {
                return invalid_config(format!(
                    "position {position} : borne basse {lower} > borne haute {upper}"
                ));
            }
            if !self.game.contains(lower) || !self.game.contains(upper) {
                return invalid_config(format!(
                    "position {position} : bornes [{lower}, {upper}] hors du pool 1-{}",
                    self.game.pool_size
                ));
            }
            let table = &self.tables[i];
            let captured: usize = (lower..=upper).map(|n| table.count(n)).sum();
            let achieved = captured as f64 / table.total as f64;
            ranges.push(PositionRange {
                position,
                lower,
                upper,
                target: achieved,
                achieved,
                captured,
                window_size: table.total,
            });
        }
        Ok(RangeSet { ranges })
    }

    /// Pour chaque largeur 1..=P, l'intervalle qui capture le plus (plus petit `lo` à égalité).
    pub fn capture_tradeoffs(&self, position: usize) -> Result<Vec<CaptureTradeoff>> {
        let table = self.frequency(position)?;
        let prefix = table.prefix_sums();
        let pool = self.game.pool_size as usize;
        let total = table.total as f64;

        let mut out = Vec::with_capacity(pool);
        for width in 1..=pool {
            let mut best = (1, 0);
            for lo in 1..=(pool - width + 1) {
                let captured = prefix[lo + width - 1] - prefix[lo - 1];
                if captured > best.1 {
                    best = (lo, captured);
                }
            }
            let (lo, captured) = best;
            out.push(CaptureTradeoff {
                width,
                lower: lo as u8,
                upper: (lo + width - 1) as u8,
                captured,
                fraction: captured as f64 / total,
            });
        }
        Ok(out)
    }
}

/// Plus petit `c` tel que `c / n >= target`, évalué avec la même division que `achieved`.
fn required_count(target: f64, n: usize) -> usize {
    let ratio = |c: usize| c as f64 / n as f64;
    let mut c = ((target * n as f64).ceil().max(1.0) as usize).min(n);
    while c < n && ratio(c) < target {
        c += 1;
    }
    while c > 1 && ratio(c - 1) >= target {
        c -= 1;
    }
    c
}

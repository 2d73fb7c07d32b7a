use fantasy5_history::error::{Result, invalid_config};

use super::AdjacencyModel;
use super::grid::lookup;

/// Voisinage sur la droite numérique : `|n - m| <= width`, modulo `P` avec `wrap`.
///
/// Avec `wrap`, chaque numéro a exactement `2 × width` voisins et aucun biais n'existe.
/// Sans `wrap`, les numéros des extrémités sont compensés par `2 × width / voisins(n)`.
pub struct ProximityAdjacency {
    name: String,
    pool_size: u8,
    width: u8,
    wrap: bool,
    neighbors: Vec<Vec<u8>>,
}

impl ProximityAdjacency {
    pub fn new(pool_size: u8, width: u8, wrap: bool) -> Result<Self> {
        if width == 0 {
            return invalid_config("la largeur de proximité doit être >= 1");
        }
        if 2 * width as usize >= pool_size as usize {
            return invalid_config(format!(
                "largeur {width} trop grande pour un pool de {pool_size} (2w doit rester < P)"
            ));
        }
        let p = pool_size as i32;
        let w = width as i32;
        let neighbors = (1..=p)
            .map(|n| {
                let mut list: Vec<u8> = (-w..=w)
                    .filter(|&d| d != 0)
                    .filter_map(|d| {
                        let m = n + d;
                        if wrap {
                            Some(((m - 1).rem_euclid(p) + 1) as u8)
                        } else if (1..=p).contains(&m) {
                            Some(m as u8)
                        } else {
                            None
                        }
                    })
                    .collect();
                list.sort_unstable();
                list
            })
            .collect();
        let suffix = if wrap { ", wrap" } else { "" };
        Ok(Self {
            name: format!("proximité w={width}{suffix}"),
            pool_size,
            width,
            wrap,
            neighbors,
        })
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn wraps(&self) -> bool {
        self.wrap
    }
}

impl AdjacencyModel for ProximityAdjacency {
    fn name(&self) -> &str {
        &self.name
    }

    fn pool_size(&self) -> u8 {
        self.pool_size
    }

    fn neighbors(&self, n: u8) -> &[u8] {
        lookup(&self.neighbors, n)
    }

    fn correction_factor(&self, n: u8) -> f64 {
        let count = self.neighbors(n).len();
        if self.wrap || count == 0 {
            1.0
        } else {
            2.0 * self.width as f64 / count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_neighbors_of_one() {
        let model = ProximityAdjacency::new(39, 3, true).unwrap();
        assert_eq!(model.neighbors(1), &[2, 3, 4, 37, 38, 39]);
        assert_eq!(model.neighbors(39), &[1, 2, 3, 36, 37, 38]);
        assert!((1..=39).all(|n| model.neighbors(n).len() == 6));
        assert!((1..=39).all(|n| model.correction_factor(n) == 1.0));
    }

    #[test]
    fn test_no_wrap_edges_compensated() {
        let model = ProximityAdjacency::new(39, 3, false).unwrap();
        assert_eq!(model.neighbors(1), &[2, 3, 4]);
        assert_eq!(model.neighbors(2), &[1, 3, 4, 5]);
        assert!((model.correction_factor(1) - 2.0).abs() < 1e-12);
        assert!((model.correction_factor(2) - 1.5).abs() < 1e-12);
        assert!((model.correction_factor(20) - 1.0).abs() < 1e-12);
        assert!((1..=39).all(|n| (model.effective_contact(n) - 6.0).abs() < 1e-12));
    }

    #[test]
    fn test_width_bounds() {
        assert!(ProximityAdjacency::new(39, 0, true).is_err());
        assert!(ProximityAdjacency::new(39, 20, false).is_err());
        assert!(ProximityAdjacency::new(39, 19, true).is_ok());
    }
}

use fantasy5_history::error::{Error, Result, invalid_config};

use super::AdjacencyModel;
use super::grid::{GridLayout, lookup};

/// Grille sans cellule vide (`rows × cols = P`) refermée sur les deux axes : 8 voisins pour tous.
pub struct ToroidalAdjacency {
    name: String,
    layout: GridLayout,
    neighbors: Vec<Vec<u8>>,
}

impl ToroidalAdjacency {
    pub fn new(pool_size: u8, rows: Option<usize>) -> Result<Self> {
        let rows = match rows {
            Some(r) => {
                let pool = pool_size as usize;
                if r < 3 || pool % r != 0 || pool / r < 3 {
                    return invalid_config(format!(
                        "{r} lignes ne factorisent pas {pool_size} en un tore d'au moins 3x3"
                    ));
                }
                r
            }
            None => Self::squarest_rows(pool_size).ok_or_else(|| {
                Error::InvalidConfiguration(format!(
                    "aucune factorisation de {pool_size} en rows x cols avec rows, cols >= 3"
                ))
            })?,
        };
        let layout = GridLayout::column_major(pool_size, rows)?;
        let neighbors = layout.neighbor_lists(true);
        Ok(Self {
            name: format!("tore {}x{}", layout.rows(), layout.cols()),
            layout,
            neighbors,
        })
    }

    /// Plus grand diviseur `rows <= sqrt(P)` avec `rows >= 3`.
    pub fn squarest_rows(pool_size: u8) -> Option<usize> {
        let pool = pool_size as usize;
        (3..=pool)
            .take_while(|r| r * r <= pool)
            .filter(|r| pool % r == 0)
            .last()
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }
}

impl AdjacencyModel for ToroidalAdjacency {
    fn name(&self) -> &str {
        &self.name
    }

    fn pool_size(&self) -> u8 {
        self.layout.pool_size()
    }

    fn neighbors(&self, n: u8) -> &[u8] {
        lookup(&self.neighbors, n)
    }

    fn correction_factor(&self, _n: u8) -> f64 {
        1.0
    }
}

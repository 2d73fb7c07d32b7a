use std::fmt;

use fantasy5_history::error::{Result, invalid_config};
use serde::{Deserialize, Serialize};

use super::AdjacencyModel;

/// Disposition rectangulaire des numéros du pool ; `None` marque une cellule vide.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    rows: usize,
    cols: usize,
    cells: Vec<Option<u8>>,
    /// `(ligne, colonne)` de chaque numéro, indexé par `n - 1`.
    coords: Vec<(usize, usize)>,
}

impl GridLayout {
    /// Remplissage colonne par colonne (1..=rows dans la première colonne) ; les cellules
    /// vides se trouvent en bas de la dernière colonne.
    pub fn column_major(pool_size: u8, rows: usize) -> Result<Self> {
        if rows == 0 {
            return invalid_config("une grille doit avoir au moins une ligne");
        }
        let pool = pool_size as usize;
        let cols = pool.div_ceil(rows);
        let mut cells = vec![None; rows * cols];
        let mut coords = Vec::with_capacity(pool);
        for i in 0..pool {
            let (r, c) = (i % rows, i / rows);
            cells[r * cols + c] = Some(i as u8 + 1);
            coords.push((r, c));
        }
        Ok(Self {
            rows,
            cols,
            cells,
            coords,
        })
    }

    /// Disposition explicite. Les lignes courtes sont complétées par des cellules vides ;
    /// chaque numéro du pool doit apparaître exactement une fois.
    pub fn from_rows(pool_size: u8, layout: &[Vec<Option<u8>>]) -> Result<Self> {
        let rows = layout.len();
        let cols = layout.iter().map(Vec::len).max().unwrap_or(0);
        if rows == 0 || cols == 0 {
            return invalid_config("grille personnalisée vide");
        }
        let pool = pool_size as usize;
        let mut cells = vec![None; rows * cols];
        let mut coords: Vec<Option<(usize, usize)>> = vec![None; pool];
        let mut duplicated = Vec::new();
        let mut outside = Vec::new();

        for (r, row) in layout.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let Some(n) = *cell else { continue };
                if n == 0 || n > pool_size {
                    outside.push(n);
                    continue;
                }
                let slot = &mut coords[(n - 1) as usize];
                if slot.is_some() {
                    duplicated.push(n);
                    continue;
                }
                *slot = Some((r, c));
                cells[r * cols + c] = Some(n);
            }
        }

        let missing: Vec<u8> = (1..=pool_size)
            .filter(|&n| coords[(n - 1) as usize].is_none())
            .collect();
        if !missing.is_empty() || !duplicated.is_empty() || !outside.is_empty() {
            return invalid_config(format!(
                "grille personnalisée incohérente : manquants {missing:?}, doublons {duplicated:?}, hors pool {outside:?}"
            ));
        }
        Ok(Self {
            rows,
            cols,
            cells,
            coords: coords.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn pool_size(&self) -> u8 {
        self.coords.len() as u8
    }

    pub fn at(&self, row: usize, col: usize) -> Option<u8> {
        if row < self.rows && col < self.cols {
            self.cells[row * self.cols + col]
        } else {
            None
        }
    }

    pub fn coords(&self, n: u8) -> Option<(usize, usize)> {
        (n as usize).checked_sub(1).and_then(|i| self.coords.get(i).copied())
    }

    pub fn gap_cells(&self) -> Vec<(usize, usize)> {
        (0..self.rows)
            .flat_map(|r| (0..self.cols).map(move |c| (r, c)))
            .filter(|&(r, c)| self.cells[r * self.cols + c].is_none())
            .collect()
    }

    /// Listes de voisins (8 directions), triées, indexées par `n - 1`.
    /// Avec `wrap`, les bords se rejoignent sur les deux axes.
    pub fn neighbor_lists(&self, wrap: bool) -> Vec<Vec<u8>> {
        let (rows, cols) = (self.rows as isize, self.cols as isize);
        self.coords
            .iter()
            .enumerate()
            .map(|(i, &(r, c))| {
                let n = i as u8 + 1;
                let mut out = Vec::with_capacity(8);
                for dr in -1..=1isize {
                    for dc in -1..=1isize {
                        if dr == 0 && dc == 0 {
                            continue;
                        }
                        let (mut nr, mut nc) = (r as isize + dr, c as isize + dc);
                        if wrap {
                            nr = nr.rem_euclid(rows);
                            nc = nc.rem_euclid(cols);
                        } else if nr < 0 || nc < 0 || nr >= rows || nc >= cols {
                            continue;
                        }
                        if let Some(m) = self.at(nr as usize, nc as usize)
                            && m != n
                        {
                            out.push(m);
                        }
                    }
                }
                out.sort_unstable();
                out.dedup();
                out
            })
            .collect()
    }
}

impl fmt::Display for GridLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.rows {
            for c in 0..self.cols {
                match self.at(r, c) {
                    Some(n) => write!(f, "{n:>3}")?,
                    None => write!(f, "  .")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Classe géométrique d'une cellule selon son nombre de voisins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionClass {
    Corner,
    Edge,
    ReducedEdge,
    Interior,
}

impl PositionClass {
    pub fn from_count(count: usize) -> Self {
        match count {
            0..=4 => PositionClass::Corner,
            5 => PositionClass::Edge,
            6 | 7 => PositionClass::ReducedEdge,
            _ => PositionClass::Interior,
        }
    }
}

impl fmt::Display for PositionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionClass::Corner => write!(f, "coin"),
            PositionClass::Edge => write!(f, "bord"),
            PositionClass::ReducedEdge => write!(f, "bord réduit"),
            PositionClass::Interior => write!(f, "intérieur"),
        }
    }
}

/// Adjacence 8 directions sur une grille, avec ou sans correction du biais de position.
pub struct GridAdjacency {
    name: String,
    layout: GridLayout,
    neighbors: Vec<Vec<u8>>,
    factors: Vec<f64>,
}

impl GridAdjacency {
    /// Avec `corrected`, le facteur de `n` vaut `max_voisins / voisins(n)` pour que tous
    /// les contacts effectifs soient égaux ; un numéro isolé garde le facteur 1.
    pub fn new(layout: GridLayout, corrected: bool) -> Self {
        let neighbors = layout.neighbor_lists(false);
        let target = neighbors.iter().map(Vec::len).max().unwrap_or(0) as f64;
        let factors = neighbors
            .iter()
            .map(|list| {
                if corrected && !list.is_empty() {
                    target / list.len() as f64
                } else {
                    1.0
                }
            })
            .collect();
        let kind = if corrected { "grille corrigée" } else { "grille" };
        Self {
            name: format!("{kind} {}x{}", layout.rows(), layout.cols()),
            layout,
            neighbors,
            factors,
        }
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn position_class(&self, n: u8) -> Option<PositionClass> {
        self.layout
            .coords(n)
            .map(|_| PositionClass::from_count(self.neighbors(n).len()))
    }
}

impl AdjacencyModel for GridAdjacency {
    fn name(&self) -> &str {
        &self.name
    }

    fn pool_size(&self) -> u8 {
        self.layout.pool_size()
    }

    fn neighbors(&self, n: u8) -> &[u8] {
        lookup(&self.neighbors, n)
    }

    fn correction_factor(&self, n: u8) -> f64 {
        (n as usize)
            .checked_sub(1)
            .and_then(|i| self.factors.get(i).copied())
            .unwrap_or(1.0)
    }

    fn gap_cells(&self) -> Vec<(usize, usize)> {
        self.layout.gap_cells()
    }
}

/// Liste de voisins de `n` dans une table indexée par `n - 1`, vide hors du pool.
pub(crate) fn lookup(table: &[Vec<u8>], n: u8) -> &[u8] {
    (n as usize)
        .checked_sub(1)
        .and_then(|i| table.get(i))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vla() -> GridAdjacency {
        GridAdjacency::new(GridLayout::column_major(39, 6).unwrap(), false)
    }

    #[test]
    fn test_column_major_layout() {
        let layout = GridLayout::column_major(39, 6).unwrap();
        assert_eq!((layout.rows(), layout.cols()), (6, 7));
        assert_eq!(layout.at(0, 0), Some(1));
        assert_eq!(layout.at(5, 0), Some(6));
        assert_eq!(layout.at(0, 1), Some(7));
        assert_eq!(layout.at(2, 6), Some(39));
        assert_eq!(layout.gap_cells(), vec![(3, 6), (4, 6), (5, 6)]);
    }

    #[test]
    fn test_reference_neighbor_counts() {
        let grid = vla();
        for (n, expected) in [(1, 3), (6, 3), (36, 3), (37, 3), (39, 4), (2, 5), (8, 8), (33, 7), (34, 6)] {
            assert_eq!(grid.neighbors(n).len(), expected, "numéro {n}");
        }
        assert_eq!(grid.neighbors(1), &[2, 7, 8]);
        let total: usize = (1..=39).map(|n| grid.neighbors(n).len()).sum();
        assert_eq!(total, 240);
    }

    #[test]
    fn test_position_classes() {
        let grid = vla();
        assert_eq!(grid.position_class(1), Some(PositionClass::Corner));
        assert_eq!(grid.position_class(39), Some(PositionClass::Corner));
        assert_eq!(grid.position_class(2), Some(PositionClass::Edge));
        assert_eq!(grid.position_class(33), Some(PositionClass::ReducedEdge));
        assert_eq!(grid.position_class(8), Some(PositionClass::Interior));
        assert_eq!(grid.position_class(40), None);
    }

    #[test]
    fn test_corrected_factors() {
        let grid = GridAdjacency::new(GridLayout::column_major(39, 6).unwrap(), true);
        assert!((grid.correction_factor(1) - 8.0 / 3.0).abs() < 1e-12);
        assert!((grid.correction_factor(8) - 1.0).abs() < 1e-12);
        for n in 1..=39 {
            assert!((grid.effective_contact(n) - 8.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_from_rows_valid() {
        let rows = vec![
            vec![Some(1), Some(2), Some(3)],
            vec![Some(4), Some(5), None],
        ];
        let layout = GridLayout::from_rows(5, &rows).unwrap();
        assert_eq!(layout.gap_cells(), vec![(1, 2)]);
        let grid = GridAdjacency::new(layout, false);
        assert_eq!(grid.neighbors(5), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_from_rows_reports_missing_and_duplicates() {
        let rows = vec![vec![Some(1), Some(2), Some(2)], vec![Some(4), Some(9)]];
        let err = GridLayout::from_rows(5, &rows).unwrap_err().to_string();
        assert!(err.contains("[3, 5]"), "{err}");
        assert!(err.contains("doublons [2]"), "{err}");
        assert!(err.contains("hors pool [9]"), "{err}");
    }

    #[test]
    fn test_display_marks_gaps() {
        let layout = GridLayout::column_major(5, 2).unwrap();
        let text = layout.to_string();
        assert_eq!(text, "  1  3  5\n  2  4  .\n");
    }
}

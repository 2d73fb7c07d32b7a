use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, invalid_config};

/// Paramètres d'un jeu : taille du pool `P` et nombre de boules tirées `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameConfig {
    pub pool_size: u8,
    pub draw_size: usize,
}

impl GameConfig {
    /// California Fantasy 5 : 5 numéros parmi 39.
    pub const FANTASY5: GameConfig = GameConfig {
        pool_size: 39,
        draw_size: 5,
    };

    pub fn new(pool_size: u8, draw_size: usize) -> Result<Self> {
        let game = Self { pool_size, draw_size };
        game.validate()?;
        Ok(game)
    }

    pub fn validate(&self) -> Result<()> {
        if self.draw_size == 0 {
            return invalid_config("draw_size doit être >= 1");
        }
        if self.draw_size >= self.pool_size as usize {
            return invalid_config(format!(
                "draw_size ({}) doit être < pool_size ({})",
                self.draw_size, self.pool_size
            ));
        }
        Ok(())
    }

    /// Dernier numéro "bas" : 1..=split est bas, le reste est haut.
    pub fn low_high_split(&self) -> u8 {
        self.pool_size / 2
    }

    pub fn contains(&self, n: u8) -> bool {
        n >= 1 && n <= self.pool_size
    }

    /// Itère sur tous les numéros du pool, 1..=P.
    pub fn numbers(&self) -> std::ops::RangeInclusive<u8> {
        1..=self.pool_size
    }

    pub fn check_position(&self, position: usize) -> Result<()> {
        if position == 0 || position > self.draw_size {
            return invalid_config(format!(
                "position {} hors de 1..={}",
                position, self.draw_size
            ));
        }
        Ok(())
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self::FANTASY5
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    pub date: NaiveDate,
    pub numbers: Vec<u8>,
}

impl Draw {
    pub fn new(date: NaiveDate, numbers: Vec<u8>, game: &GameConfig) -> Result<Self> {
        validate_numbers(&numbers, game)?;
        Ok(Self { date, numbers })
    }

    /// Valeur à la position triée `position` (1-based).
    pub fn at(&self, position: usize) -> Option<u8> {
        position.checked_sub(1).and_then(|i| self.numbers.get(i).copied())
    }

    pub fn contains(&self, n: u8) -> bool {
        self.numbers.binary_search(&n).is_ok()
    }
}

/// Vérifie qu'une combinaison est strictement croissante, dans le pool et de taille `k`.
pub fn validate_numbers(numbers: &[u8], game: &GameConfig) -> Result<()> {
    if numbers.len() != game.draw_size {
        return Err(Error::InvalidDraw(format!(
            "{} numéros au lieu de {}",
            numbers.len(),
            game.draw_size
        )));
    }
    for &n in numbers {
        if !game.contains(n) {
            return Err(Error::InvalidDraw(format!(
                "numéro {} hors limites (1-{})",
                n, game.pool_size
            )));
        }
    }
    for w in numbers.windows(2) {
        if w[0] >= w[1] {
            return Err(Error::InvalidDraw(format!(
                "numéros non strictement croissants : {} puis {}",
                w[0], w[1]
            )));
        }
    }
    Ok(())
}

/// Historique synthétique pour les tests : un tirage par jour à partir du 2024-01-01.
/// La position 1 parcourt 1..=13 de manière cyclique, les autres suivent par pas de 7.
pub fn make_test_draws(n: usize) -> Vec<Draw> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
    (0..n)
        .map(|i| {
            let first = (i % 13) as u8 + 1;
            let shift = ((i / 13) % 3) as u8;
            Draw {
                date: start + chrono::Days::new(i as u64),
                numbers: vec![
                    first,
                    first + 7 + shift,
                    first + 13 + shift,
                    first + 19 + shift,
                    first + 24 + shift,
                ],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_game_config_rejects_k_ge_p() {
        assert!(GameConfig::new(5, 5).is_err());
        assert!(GameConfig::new(5, 6).is_err());
        assert!(GameConfig::new(39, 0).is_err());
        assert!(GameConfig::new(39, 5).is_ok());
    }

    #[test]
    fn test_low_high_split() {
        assert_eq!(GameConfig::FANTASY5.low_high_split(), 19);
    }

    #[test]
    fn test_draw_new_ok() {
        let d = Draw::new(date(2024, 1, 1), vec![1, 7, 13, 25, 39], &GameConfig::FANTASY5).unwrap();
        assert_eq!(d.at(1), Some(1));
        assert_eq!(d.at(5), Some(39));
        assert_eq!(d.at(0), None);
        assert_eq!(d.at(6), None);
        assert!(d.contains(25));
        assert!(!d.contains(26));
    }

    #[test]
    fn test_draw_out_of_range() {
        let game = GameConfig::FANTASY5;
        assert!(Draw::new(date(2024, 1, 1), vec![0, 2, 3, 4, 5], &game).is_err());
        assert!(Draw::new(date(2024, 1, 1), vec![1, 2, 3, 4, 40], &game).is_err());
    }

    #[test]
    fn test_draw_duplicates_and_order() {
        let game = GameConfig::FANTASY5;
        assert!(Draw::new(date(2024, 1, 1), vec![1, 1, 3, 4, 5], &game).is_err());
        assert!(Draw::new(date(2024, 1, 1), vec![5, 4, 3, 2, 1], &game).is_err());
    }

    #[test]
    fn test_draw_wrong_size() {
        let game = GameConfig::FANTASY5;
        assert!(Draw::new(date(2024, 1, 1), vec![1, 2, 3, 4], &game).is_err());
    }

    #[test]
    fn test_make_test_draws_valid() {
        let game = GameConfig::FANTASY5;
        let draws = make_test_draws(100);
        assert_eq!(draws.len(), 100);
        for d in &draws {
            assert!(validate_numbers(&d.numbers, &game).is_ok(), "{:?}", d.numbers);
        }
        assert!(draws.windows(2).all(|w| w[0].date < w[1].date));
    }
}

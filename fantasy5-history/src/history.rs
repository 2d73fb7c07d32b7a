use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, invalid_config};
use crate::models::{Draw, GameConfig, validate_numbers};

/// Historique des tirages, trié par date croissante. Seule l'insertion en fin est permise.
#[derive(Debug, Clone)]
pub struct DrawHistory {
    game: GameConfig,
    draws: Vec<Draw>,
}

/// Sélection d'une fenêtre de l'historique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowSpec {
    All,
    /// Les `n` derniers tirages.
    Trailing(usize),
    /// Tirages datés dans `[start, end]`, bornes incluses.
    DateRange { start: NaiveDate, end: NaiveDate },
}

impl DrawHistory {
    pub fn new(game: GameConfig) -> Result<Self> {
        game.validate()?;
        Ok(Self {
            game,
            draws: Vec::new(),
        })
    }

    /// Construit un historique à partir de tirages dans un ordre quelconque.
    pub fn from_draws(game: GameConfig, mut draws: Vec<Draw>) -> Result<Self> {
        let mut history = Self::new(game)?;
        draws.sort_by_key(|d| d.date);
        history.draws.reserve(draws.len());
        for draw in draws {
            history.append(draw)?;
        }
        Ok(history)
    }

    pub fn append(&mut self, draw: Draw) -> Result<()> {
        validate_numbers(&draw.numbers, &self.game)?;
        if let Some(last) = self.draws.last()
            && draw.date <= last.date
        {
            return Err(Error::InvalidDraw(format!(
                "tirage du {} non postérieur au dernier tirage ({})",
                draw.date, last.date
            )));
        }
        self.draws.push(draw);
        Ok(())
    }

    pub fn game(&self) -> &GameConfig {
        &self.game
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }

    /// Vue sur l'historique complet, éventuellement vide.
    pub fn as_window(&self) -> Window<'_> {
        Window {
            game: self.game,
            draws: &self.draws,
        }
    }

    pub fn window(&self, spec: WindowSpec) -> Result<Window<'_>> {
        self.as_window().window(spec)
    }

    /// Tirages strictement antérieurs à `date`. Peut être vide.
    pub fn before(&self, date: NaiveDate) -> Window<'_> {
        self.as_window().before(date)
    }

    pub fn draw_on(&self, date: NaiveDate) -> Option<&Draw> {
        self.as_window().draw_on(date)
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.as_window().date_range()
    }

    /// Les `n` tirages les plus récents, du plus récent au plus ancien.
    pub fn latest(&self, n: usize) -> Vec<&Draw> {
        self.draws.iter().rev().take(n).collect()
    }

    /// Numéros (à plat) des `n` tirages précédant `date`, du plus récent au plus ancien.
    pub fn recent_numbers(&self, date: NaiveDate, n: usize) -> Vec<u8> {
        self.before(date)
            .draws()
            .iter()
            .rev()
            .take(n)
            .flat_map(|d| d.numbers.iter().copied())
            .collect()
    }
}

/// Vue empruntée, ordonnée chronologiquement, sur une tranche de l'historique.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    game: GameConfig,
    draws: &'a [Draw],
}

impl<'a> Window<'a> {
    pub fn game(&self) -> &GameConfig {
        &self.game
    }

    pub fn draws(&self) -> &'a [Draw] {
        self.draws
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    pub fn window(&self, spec: WindowSpec) -> Result<Window<'a>> {
        let draws = match spec {
            WindowSpec::All => self.draws,
            WindowSpec::Trailing(0) => {
                return invalid_config("une fenêtre glissante doit contenir au moins 1 tirage");
            }
            WindowSpec::Trailing(n) => {
                let start = self.draws.len().saturating_sub(n);
                &self.draws[start..]
            }
            WindowSpec::DateRange { start, end } => {
                if start > end {
                    return invalid_config(format!("intervalle de dates inversé : {start} > {end}"));
                }
                let lo = self.draws.partition_point(|d| d.date < start);
                let hi = self.draws.partition_point(|d| d.date <= end);
                &self.draws[lo..hi]
            }
        };
        if draws.is_empty() {
            return Err(Error::EmptyWindow(format!("{spec:?}")));
        }
        Ok(Window {
            game: self.game,
            draws,
        })
    }

    pub fn before(&self, date: NaiveDate) -> Window<'a> {
        let end = self.draws.partition_point(|d| d.date < date);
        Window {
            game: self.game,
            draws: &self.draws[..end],
        }
    }

    pub fn draw_on(&self, date: NaiveDate) -> Option<&'a Draw> {
        self.draws
            .binary_search_by_key(&date, |d| d.date)
            .ok()
            .map(|i| &self.draws[i])
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.draws.first(), self.draws.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date)),
            _ => None,
        }
    }

    pub fn last(&self) -> Option<&'a Draw> {
        self.draws.last()
    }

    /// Les `n` tirages les plus récents de la fenêtre, du plus récent au plus ancien.
    pub fn latest(&self, n: usize) -> impl Iterator<Item = &'a Draw> + use<'a> {
        self.draws.iter().rev().take(n)
    }

    /// Occurrences de chaque numéro à la position triée `position` (1-based).
    pub fn frequency(&self, position: usize) -> Result<FrequencyTable> {
        self.game.check_position(position)?;
        if self.draws.is_empty() {
            return Err(Error::EmptyWindow(format!(
                "aucun tirage pour la fréquence de la position {position}"
            )));
        }
        let mut counts = vec![0usize; self.game.pool_size as usize];
        for draw in self.draws {
            if let Some(n) = draw.at(position) {
                counts[(n - 1) as usize] += 1;
            }
        }
        Ok(FrequencyTable {
            position,
            counts,
            total: self.draws.len(),
        })
    }
}

/// Comptage par numéro pour une position ; `counts[n - 1]` est le nombre d'occurrences de `n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyTable {
    pub position: usize,
    pub counts: Vec<usize>,
    pub total: usize,
}

impl FrequencyTable {
    pub fn count(&self, n: u8) -> usize {
        (n as usize)
            .checked_sub(1)
            .and_then(|i| self.counts.get(i).copied())
            .unwrap_or(0)
    }

    pub fn min_observed(&self) -> Option<u8> {
        self.counts.iter().position(|&c| c > 0).map(|i| i as u8 + 1)
    }

    pub fn max_observed(&self) -> Option<u8> {
        self.counts.iter().rposition(|&c| c > 0).map(|i| i as u8 + 1)
    }

    /// `prefix[i]` = somme des occurrences de 1..=i, `prefix[0] = 0`.
    pub fn prefix_sums(&self) -> Vec<usize> {
        let mut prefix = Vec::with_capacity(self.counts.len() + 1);
        prefix.push(0);
        let mut acc = 0;
        for &c in &self.counts {
            acc += c;
            prefix.push(acc);
        }
        prefix
    }
}

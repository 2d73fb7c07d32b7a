use std::collections::HashSet;
use std::fmt;

use rand::distr::weighted::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use serde::{Deserialize, Serialize};

use fantasy5_history::GameConfig;
use fantasy5_history::error::{Error, Result, invalid_config};

use crate::contact::ContactScore;
use crate::filters::{FilterConfig, FilterSet};
use crate::range::RangeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Tirage uniforme indépendant par position, rejet des combinaisons non croissantes.
    PositionFirst,
    /// Combinaisons des meilleurs scores de contact, puis complément pondéré.
    ContactFirst,
    /// Pondération `α·score + (1-α)·conformité + plancher`.
    Balanced,
    /// Tirage séquentiel uniforme dans les plages.
    UniformRandom,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::PositionFirst => write!(f, "position-first"),
            Strategy::ContactFirst => write!(f, "contact-first"),
            Strategy::Balanced => write!(f, "balanced"),
            Strategy::UniformRandom => write!(f, "uniform-random"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub strategy: Strategy,
    pub ticket_count: usize,
    pub seed: u64,
    /// Budget de tentatives = `ticket_count × oversample`.
    pub oversample: usize,
    /// `α` de la stratégie `balanced`.
    pub contact_weight: f64,
    pub score_floor: f64,
    /// Taille de la liste de tête énumérée par `contact-first`.
    pub top_candidates: usize,
    /// Étape de filtrage optionnelle.
    pub filters: Option<FilterConfig>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Balanced,
            ticket_count: 20,
            seed: 42,
            oversample: 200,
            contact_weight: 0.7,
            score_floor: 0.1,
            top_candidates: 20,
            filters: None,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self, game: &GameConfig) -> Result<()> {
        if self.ticket_count == 0 {
            return invalid_config("ticket_count doit être >= 1");
        }
        if self.oversample == 0 {
            return invalid_config("oversample doit être >= 1");
        }
        if !(0.0..=1.0).contains(&self.contact_weight) {
            return invalid_config(format!("contact_weight {} hors de [0, 1]", self.contact_weight));
        }
        if !self.score_floor.is_finite() || self.score_floor < 0.0 {
            return invalid_config(format!("score_floor {} négatif ou non fini", self.score_floor));
        }
        if self.top_candidates < game.draw_size || self.top_candidates > game.pool_size as usize {
            return invalid_config(format!(
                "top_candidates {} hors de {}..={}",
                self.top_candidates, game.draw_size, game.pool_size
            ));
        }
        if let Some(filters) = &self.filters {
            filters.validate()?;
        }
        Ok(())
    }

    pub fn attempt_budget(&self) -> usize {
        self.ticket_count.saturating_mul(self.oversample)
    }
}

// ════════════════════════════════════════════════════════════════
// Tickets
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket {
    pub numbers: Vec<u8>,
}

impl Ticket {
    /// Nombre de numéros communs avec un tirage trié.
    pub fn matches(&self, draw: &[u8]) -> usize {
        self.numbers.iter().filter(|n| draw.contains(n)).count()
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.numbers.iter().map(|n| format!("{n:02}")).collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTicket {
    pub ticket: Ticket,
    /// Somme des scores de contact des numéros.
    pub contact_score: f64,
    /// Fraction des positions dans leur plage.
    pub position_score: f64,
    pub combined_score: f64,
}

/// Première règle enfreinte par un ticket candidat.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Length { expected: usize, actual: usize },
    NotIncreasing,
    OutOfPool(u8),
    OutOfRange { position: usize, value: u8 },
    Filter(&'static str),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Length { expected, actual } => {
                write!(f, "{actual} numéros au lieu de {expected}")
            }
            Violation::NotIncreasing => write!(f, "numéros non strictement croissants"),
            Violation::OutOfPool(n) => write!(f, "numéro {n} hors du pool"),
            Violation::OutOfRange { position, value } => {
                write!(f, "position {position} : {value} hors plage")
            }
            Violation::Filter(name) => write!(f, "rejeté par le filtre {name}"),
        }
    }
}

/// Entrées d'une génération : plages actives, scores de contact, tirage précédent.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub game: GameConfig,
    pub ranges: &'a RangeSet,
    pub scores: &'a ContactScore,
    pub last_draw: Option<&'a [u8]>,
}

// ════════════════════════════════════════════════════════════════
// Générateur
// ════════════════════════════════════════════════════════════════

pub struct TicketGenerator {
    config: GeneratorConfig,
    filters: FilterSet,
}

impl TicketGenerator {
    pub fn new(config: GeneratorConfig, game: &GameConfig) -> Result<Self> {
        config.validate(game)?;
        let filters = match &config.filters {
            Some(f) => FilterSet::from_config(f, game)?,
            None => FilterSet::default(),
        };
        Ok(Self { config, filters })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    /// Contrôle a posteriori appliqué à chaque ticket émis.
    pub fn validate_ticket(
        &self,
        numbers: &[u8],
        ctx: &GenerationContext<'_>,
    ) -> std::result::Result<(), Violation> {
        let k = ctx.game.draw_size;
        if numbers.len() != k {
            return Err(Violation::Length {
                expected: k,
                actual: numbers.len(),
            });
        }
        if let Some(&n) = numbers.iter().find(|&&n| !ctx.game.contains(n)) {
            return Err(Violation::OutOfPool(n));
        }
        if numbers.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Violation::NotIncreasing);
        }
        if let Some(&position) = ctx.ranges.violations(numbers).first() {
            return Err(Violation::OutOfRange {
                position,
                value: numbers[position - 1],
            });
        }
        if let Some(filter) = self.filters.first_rejection(numbers, ctx.last_draw) {
            return Err(Violation::Filter(filter.name()));
        }
        Ok(())
    }

    /// Produit `ticket_count` tickets distincts, tous validés, ou `InsufficientCandidates`.
    pub fn generate(&self, ctx: &GenerationContext<'_>) -> Result<Vec<Ticket>> {
        self.check_context(ctx)?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut acc = Accumulator::new(self.config.ticket_count);

        if self.config.strategy == Strategy::ContactFirst {
            self.enumerate_top_combinations(ctx, &mut acc);
        }

        let budget = self.config.attempt_budget();
        let mut attempts = 0;
        while !acc.is_full() && attempts < budget {
            attempts += 1;
            let candidate = match self.config.strategy {
                Strategy::PositionFirst => self.sample_position_first(ctx, &mut rng),
                Strategy::ContactFirst | Strategy::Balanced => self.sample_balanced(ctx, &mut rng),
                Strategy::UniformRandom => self.sample_sequential_uniform(ctx, &mut rng),
            };
            if let Some(numbers) = candidate
                && self.validate_ticket(&numbers, ctx).is_ok()
            {
                acc.push(numbers);
            }
        }

        log::debug!(
            "{} : {} tickets après {} tentatives (budget {})",
            self.config.strategy,
            acc.tickets.len(),
            attempts,
            budget
        );

        if !acc.is_full() {
            return Err(Error::InsufficientCandidates {
                produced: acc.tickets.len(),
                requested: self.config.ticket_count,
            });
        }
        Ok(acc.tickets)
    }

    /// Classe les tickets par `contact × position`, décroissant.
    pub fn score_tickets(&self, tickets: &[Ticket], ctx: &GenerationContext<'_>) -> Vec<ScoredTicket> {
        let k = ctx.game.draw_size.max(1) as f64;
        let mut scored: Vec<ScoredTicket> = tickets
            .iter()
            .map(|t| {
                let contact_score = ctx.scores.ticket_score(&t.numbers);
                let in_range = t
                    .numbers
                    .iter()
                    .enumerate()
                    .filter(|&(i, &n)| ctx.ranges.compliant(i + 1, n))
                    .count();
                let position_score = in_range as f64 / k;
                ScoredTicket {
                    ticket: t.clone(),
                    contact_score,
                    position_score,
                    combined_score: contact_score * position_score,
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.combined_score
                .total_cmp(&a.combined_score)
                .then_with(|| a.ticket.numbers.cmp(&b.ticket.numbers))
        });
        scored
    }

    fn check_context(&self, ctx: &GenerationContext<'_>) -> Result<()> {
        if ctx.ranges.len() != ctx.game.draw_size {
            return invalid_config(format!(
                "{} plages pour {} positions",
                ctx.ranges.len(),
                ctx.game.draw_size
            ));
        }
        if ctx.scores.pool_size() != ctx.game.pool_size {
            return invalid_config(format!(
                "scores de contact sur {} numéros pour un pool de {}",
                ctx.scores.pool_size(),
                ctx.game.pool_size
            ));
        }
        Ok(())
    }

    /// Énumère dans l'ordre des rangs les combinaisons des `top_candidates` meilleurs numéros
    /// en contact qui appartiennent à au moins une plage.
    fn enumerate_top_combinations(&self, ctx: &GenerationContext<'_>, acc: &mut Accumulator) {
        let k = ctx.game.draw_size;
        let top: Vec<u8> = ctx
            .scores
            .ranked()
            .into_iter()
            .filter(|&(n, s)| s > 0.0 && ctx.ranges.ranges.iter().any(|r| r.contains(n)))
            .map(|(n, _)| n)
            .take(self.config.top_candidates)
            .collect();
        if top.len() < k {
            return;
        }

        let mut idx: Vec<usize> = (0..k).collect();
        loop {
            if acc.is_full() {
                return;
            }
            let mut numbers: Vec<u8> = idx.iter().map(|&i| top[i]).collect();
            numbers.sort_unstable();
            if self.validate_ticket(&numbers, ctx).is_ok() {
                acc.push(numbers);
            }
            if !next_combination(&mut idx, top.len()) {
                return;
            }
        }
    }

    fn sample_position_first(&self, ctx: &GenerationContext<'_>, rng: &mut StdRng) -> Option<Vec<u8>> {
        let numbers: Vec<u8> = ctx
            .ranges
            .ranges
            .iter()
            .map(|r| rng.random_range(r.lower..=r.upper))
            .collect();
        numbers.windows(2).all(|w| w[0] < w[1]).then_some(numbers)
    }

    fn sample_sequential_uniform(&self, ctx: &GenerationContext<'_>, rng: &mut StdRng) -> Option<Vec<u8>> {
        let mut numbers = Vec::with_capacity(ctx.game.draw_size);
        let mut prev = 0u8;
        for r in &ctx.ranges.ranges {
            let lo = r.lower.max(prev.checked_add(1)?);
            if lo > r.upper {
                return None;
            }
            prev = rng.random_range(lo..=r.upper);
            numbers.push(prev);
        }
        Some(numbers)
    }

    /// Tirage séquentiel pondéré. Seuls les numéros conformes (dans la plage) sont candidats,
    /// la plage restant une contrainte dure ; le terme `(1-α)` joue le rôle de socle uniforme.
    fn sample_balanced(&self, ctx: &GenerationContext<'_>, rng: &mut StdRng) -> Option<Vec<u8>> {
        let alpha = self.config.contact_weight;
        let normalized = ctx.scores.normalized();
        let mut numbers = Vec::with_capacity(ctx.game.draw_size);
        let mut prev = 0u8;
        for r in &ctx.ranges.ranges {
            let lo = r.lower.max(prev.checked_add(1)?);
            if lo > r.upper {
                return None;
            }
            let candidates: Vec<u8> = (lo..=r.upper).collect();
            let weights: Vec<f64> = candidates
                .iter()
                .map(|&n| alpha * normalized[(n - 1) as usize] + (1.0 - alpha) + self.config.score_floor)
                .collect();
            prev = match WeightedIndex::new(&weights) {
                Ok(dist) => candidates[dist.sample(rng)],
                Err(_) => candidates[rng.random_range(0..candidates.len())],
            };
            numbers.push(prev);
        }
        Some(numbers)
    }
}

/// Tickets distincts dans l'ordre de production.
struct Accumulator {
    wanted: usize,
    seen: HashSet<Vec<u8>>,
    tickets: Vec<Ticket>,
}

impl Accumulator {
    fn new(wanted: usize) -> Self {
        Self {
            wanted,
            seen: HashSet::new(),
            tickets: Vec::with_capacity(wanted),
        }
    }

    fn is_full(&self) -> bool {
        self.tickets.len() >= self.wanted
    }

    fn push(&mut self, numbers: Vec<u8>) {
        if !self.is_full() && self.seen.insert(numbers.clone()) {
            self.tickets.push(Ticket { numbers });
        }
    }
}

/// Combinaison suivante (ordre lexicographique) d'indices croissants dans `0..n`.
fn next_combination(idx: &mut [usize], n: usize) -> bool {
    let k = idx.len();
    let mut i = k;
    while i > 0 {
        i -= 1;
        if idx[i] < n - k + i {
            idx[i] += 1;
            for j in i + 1..k {
                idx[j] = idx[j - 1] + 1;
            }
            return true;
        }
    }
    false
}

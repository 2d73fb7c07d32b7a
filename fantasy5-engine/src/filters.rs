use std::collections::HashSet;
use std::fmt;

use fantasy5_history::error::{Result, invalid_config};
use fantasy5_history::{GameConfig, Window};
use serde::{Deserialize, Serialize};

/// Intervalle fermé `[min, max]` sur une statistique entière.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: u32,
    pub max: u32,
}

impl Bounds {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u32) -> bool {
        value >= self.min && value <= self.max
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Bornes de composition d'un ticket. Chaque champ à `None` désactive le filtre correspondant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub odd_count: Option<Bounds>,
    /// Numéros `<= P / 2`.
    pub low_count: Option<Bounds>,
    pub sum: Option<Bounds>,
    /// Nombre minimal de dizaines distinctes (`n / 10`).
    pub decade_spread_min: Option<u32>,
    pub max_consecutive_run: Option<u32>,
    pub prime_count: Option<Bounds>,
    /// Différences deux à deux distinctes moins `k - 1`.
    pub ac_value: Option<Bounds>,
    /// `max - min`.
    pub span: Option<Bounds>,
    /// Numéros communs avec le tirage précédent.
    pub max_last_draw_overlap: Option<u32>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            odd_count: Some(Bounds::new(2, 3)),
            low_count: Some(Bounds::new(2, 3)),
            sum: Some(Bounds::new(50, 140)),
            decade_spread_min: Some(3),
            max_consecutive_run: Some(2),
            prime_count: Some(Bounds::new(1, 3)),
            ac_value: Some(Bounds::new(4, 6)),
            span: Some(Bounds::new(20, 38)),
            max_last_draw_overlap: Some(2),
        }
    }
}

impl FilterConfig {
    pub fn none() -> Self {
        Self {
            odd_count: None,
            low_count: None,
            sum: None,
            decade_spread_min: None,
            max_consecutive_run: None,
            prime_count: None,
            ac_value: None,
            span: None,
            max_last_draw_overlap: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let named = [
            ("odd_count", self.odd_count),
            ("low_count", self.low_count),
            ("sum", self.sum),
            ("prime_count", self.prime_count),
            ("ac_value", self.ac_value),
            ("span", self.span),
        ];
        for (name, bounds) in named {
            if let Some(b) = bounds
                && b.min > b.max
            {
                return invalid_config(format!("filtre {name} : min {} > max {}", b.min, b.max));
            }
        }
        if self.max_consecutive_run == Some(0) {
            return invalid_config("filtre max_consecutive_run : une suite a toujours au moins 1 numéro");
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::none()
    }
}

// ════════════════════════════════════════════════════════════════
// Métriques de composition
// ════════════════════════════════════════════════════════════════

pub fn odd_count(ticket: &[u8]) -> u32 {
    ticket.iter().filter(|&&n| n % 2 == 1).count() as u32
}

pub fn low_count(ticket: &[u8], split: u8) -> u32 {
    ticket.iter().filter(|&&n| n <= split).count() as u32
}

pub fn number_sum(ticket: &[u8]) -> u32 {
    ticket.iter().map(|&n| n as u32).sum()
}

pub fn decade_count(ticket: &[u8]) -> u32 {
    ticket.iter().map(|&n| n / 10).collect::<HashSet<_>>().len() as u32
}

/// Longueur de la plus longue suite de numéros consécutifs (1 si aucune).
pub fn max_consecutive_run(ticket: &[u8]) -> u32 {
    if ticket.is_empty() {
        return 0;
    }
    let mut best = 1;
    let mut current = 1;
    for w in ticket.windows(2) {
        if w[1] == w[0] + 1 {
            current += 1;
            best = best.max(current);
        } else {
            current = 1;
        }
    }
    best
}

pub fn is_prime(n: u8) -> bool {
    if n < 2 {
        return false;
    }
    (2..n).take_while(|d| d * d <= n).all(|d| n % d != 0)
}

pub fn prime_count(ticket: &[u8]) -> u32 {
    ticket.iter().filter(|&&n| is_prime(n)).count() as u32
}

pub fn ac_value(ticket: &[u8]) -> u32 {
    if ticket.len() < 2 {
        return 0;
    }
    let mut diffs = HashSet::new();
    for (i, &a) in ticket.iter().enumerate() {
        for &b in &ticket[i + 1..] {
            diffs.insert(a.abs_diff(b));
        }
    }
    (diffs.len() as u32).saturating_sub(ticket.len() as u32 - 1)
}

pub fn span(ticket: &[u8]) -> u32 {
    match (ticket.iter().min(), ticket.iter().max()) {
        (Some(&lo), Some(&hi)) => (hi - lo) as u32,
        _ => 0,
    }
}

pub fn last_draw_overlap(ticket: &[u8], last_draw: &[u8]) -> u32 {
    ticket.iter().filter(|n| last_draw.contains(n)).count() as u32
}

/// Toutes les métriques d'un ticket, pour l'affichage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMetrics {
    pub odd: u32,
    pub even: u32,
    pub low: u32,
    pub high: u32,
    pub sum: u32,
    pub decades: u32,
    pub max_run: u32,
    pub primes: u32,
    pub ac: u32,
    pub span: u32,
    pub last_overlap: Option<u32>,
}

impl TicketMetrics {
    pub fn compute(ticket: &[u8], game: &GameConfig, last_draw: Option<&[u8]>) -> Self {
        let k = ticket.len() as u32;
        let odd = odd_count(ticket);
        let low = low_count(ticket, game.low_high_split());
        Self {
            odd,
            even: k - odd,
            low,
            high: k - low,
            sum: number_sum(ticket),
            decades: decade_count(ticket),
            max_run: max_consecutive_run(ticket),
            primes: prime_count(ticket),
            ac: ac_value(ticket),
            span: span(ticket),
            last_overlap: last_draw.map(|d| last_draw_overlap(ticket, d)),
        }
    }
}

// ════════════════════════════════════════════════════════════════
// Filtres
// ════════════════════════════════════════════════════════════════

/// Prédicat pur sur un ticket trié.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    OddCount(Bounds),
    LowCount { bounds: Bounds, split: u8 },
    Sum(Bounds),
    DecadeSpread { min: u32 },
    ConsecutiveRun { max: u32 },
    PrimeCount(Bounds),
    AcValue(Bounds),
    Span(Bounds),
    LastDrawOverlap { max: u32 },
}

impl Filter {
    pub fn name(&self) -> &'static str {
        match self {
            Filter::OddCount(_) => "odd_count",
            Filter::LowCount { .. } => "low_count",
            Filter::Sum(_) => "sum",
            Filter::DecadeSpread { .. } => "decade_spread",
            Filter::ConsecutiveRun { .. } => "consecutive_run",
            Filter::PrimeCount(_) => "prime_count",
            Filter::AcValue(_) => "ac_value",
            Filter::Span(_) => "span",
            Filter::LastDrawOverlap { .. } => "last_draw_overlap",
        }
    }

    /// Sans tirage précédent, le filtre de recouvrement est toujours satisfait.
    pub fn passes(&self, ticket: &[u8], last_draw: Option<&[u8]>) -> bool {
        match self {
            Filter::OddCount(b) => b.contains(odd_count(ticket)),
            Filter::LowCount { bounds, split } => bounds.contains(low_count(ticket, *split)),
            Filter::Sum(b) => b.contains(number_sum(ticket)),
            Filter::DecadeSpread { min } => decade_count(ticket) >= *min,
            Filter::ConsecutiveRun { max } => max_consecutive_run(ticket) <= *max,
            Filter::PrimeCount(b) => b.contains(prime_count(ticket)),
            Filter::AcValue(b) => b.contains(ac_value(ticket)),
            Filter::Span(b) => b.contains(span(ticket)),
            Filter::LastDrawOverlap { max } => {
                last_draw.is_none_or(|d| last_draw_overlap(ticket, d) <= *max)
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::OddCount(b) => write!(f, "impairs {b}"),
            Filter::LowCount { bounds, split } => write!(f, "bas (<= {split}) {bounds}"),
            Filter::Sum(b) => write!(f, "somme {b}"),
            Filter::DecadeSpread { min } => write!(f, "dizaines >= {min}"),
            Filter::ConsecutiveRun { max } => write!(f, "consécutifs <= {max}"),
            Filter::PrimeCount(b) => write!(f, "premiers {b}"),
            Filter::AcValue(b) => write!(f, "AC {b}"),
            Filter::Span(b) => write!(f, "écart {b}"),
            Filter::LastDrawOverlap { max } => write!(f, "communs avec le dernier tirage <= {max}"),
        }
    }
}

/// Rejets par filtre, au premier filtre qui échoue, dans l'ordre de la configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStats {
    pub input: usize,
    pub output: usize,
    pub rejected: Vec<(String, usize)>,
}

/// Taux de passage d'un filtre sur l'historique réel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCapture {
    pub name: String,
    pub passed: usize,
    pub total: usize,
    pub rate: f64,
}

/// Conjonction des filtres actifs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn from_config(config: &FilterConfig, game: &GameConfig) -> Result<Self> {
        config.validate()?;
        let mut filters = Vec::new();
        if let Some(b) = config.odd_count {
            filters.push(Filter::OddCount(b));
        }
        if let Some(b) = config.low_count {
            filters.push(Filter::LowCount {
                bounds: b,
                split: game.low_high_split(),
            });
        }
        if let Some(b) = config.sum {
            filters.push(Filter::Sum(b));
        }
        if let Some(min) = config.decade_spread_min {
            filters.push(Filter::DecadeSpread { min });
        }
        if let Some(max) = config.max_consecutive_run {
            filters.push(Filter::ConsecutiveRun { max });
        }
        if let Some(b) = config.prime_count {
            filters.push(Filter::PrimeCount(b));
        }
        if let Some(b) = config.ac_value {
            filters.push(Filter::AcValue(b));
        }
        if let Some(b) = config.span {
            filters.push(Filter::Span(b));
        }
        if let Some(max) = config.max_last_draw_overlap {
            filters.push(Filter::LastDrawOverlap { max });
        }
        Ok(Self { filters })
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn passes(&self, ticket: &[u8], last_draw: Option<&[u8]>) -> bool {
        self.first_rejection(ticket, last_draw).is_none()
    }

    pub fn first_rejection(&self, ticket: &[u8], last_draw: Option<&[u8]>) -> Option<&Filter> {
        self.filters.iter().find(|f| !f.passes(ticket, last_draw))
    }

    pub fn apply_with_stats(
        &self,
        tickets: &[Vec<u8>],
        last_draw: Option<&[u8]>,
    ) -> (Vec<Vec<u8>>, FilterStats) {
        let mut rejected = vec![0usize; self.filters.len()];
        let mut kept = Vec::new();
        for ticket in tickets {
            match self.filters.iter().position(|f| !f.passes(ticket, last_draw)) {
                Some(i) => rejected[i] += 1,
                None => kept.push(ticket.clone()),
            }
        }
        let stats = FilterStats {
            input: tickets.len(),
            output: kept.len(),
            rejected: self
                .filters
                .iter()
                .zip(rejected)
                .map(|(f, c)| (f.name().to_string(), c))
                .collect(),
        };
        (kept, stats)
    }

    /// Fraction des tirages réels de la fenêtre qui passent chaque filtre, chaque tirage étant
    /// comparé à celui qui le précède. La dernière ligne (`all`) compte les tirages qui passent tout.
    pub fn capture_rates(&self, window: Window<'_>) -> Vec<FilterCapture> {
        let draws = window.draws();
        let total = draws.len();
        let mut passed = vec![0usize; self.filters.len()];
        let mut all = 0;
        for (i, draw) in draws.iter().enumerate() {
            let last = i.checked_sub(1).map(|j| draws[j].numbers.as_slice());
            let mut ok = true;
            for (slot, filter) in passed.iter_mut().zip(&self.filters) {
                if filter.passes(&draw.numbers, last) {
                    *slot += 1;
                } else {
                    ok = false;
                }
            }
            if ok {
                all += 1;
            }
        }
        let rate = |n: usize| if total == 0 { 0.0 } else { n as f64 / total as f64 };
        self.filters
            .iter()
            .zip(passed)
            .map(|(f, n)| FilterCapture {
                name: f.name().to_string(),
                passed: n,
                total,
                rate: rate(n),
            })
            .chain(std::iter::once(FilterCapture {
                name: "all".to_string(),
                passed: all,
                total,
                rate: rate(all),
            }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fantasy5_history::DrawHistory;
    use fantasy5_history::models::make_test_draws;

    fn defaults() -> FilterSet {
        FilterSet::from_config(&FilterConfig::default(), &GameConfig::FANTASY5).unwrap()
    }

    #[test]
    fn test_metrics() {
        let t = [3, 4, 5, 17, 38];
        assert_eq!(odd_count(&t), 3);
        assert_eq!(low_count(&t, 19), 4);
        assert_eq!(number_sum(&t), 67);
        assert_eq!(decade_count(&t), 3);
        assert_eq!(max_consecutive_run(&t), 3);
        assert_eq!(prime_count(&t), 3);
        assert_eq!(span(&t), 35);
        assert_eq!(last_draw_overlap(&t, &[4, 17, 20, 30, 39]), 2);
        assert_eq!(max_consecutive_run(&[1, 10, 20, 30, 39]), 1);
    }

    #[test]
    fn test_ac_value() {
        // Progression arithmétique : différences {5, 10, 15, 20}, AC = 0.
        assert_eq!(ac_value(&[5, 10, 15, 20, 25]), 0);
        // Différences toutes distinctes : 10 - 4 = 6.
        assert_eq!(ac_value(&[1, 2, 4, 8, 16]), 6);
    }

    #[test]
    fn test_primes() {
        let primes: Vec<u8> = (1..=39).filter(|&n| is_prime(n)).collect();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37]);
    }

    #[test]
    fn test_default_filters_accept_typical_ticket() {
        let set = defaults();
        let ticket = [3, 11, 20, 26, 38];
        assert!(set.passes(&ticket, None), "{:?}", set.first_rejection(&ticket, None));
        // AC = 2 : rejeté malgré une composition équilibrée.
        assert_eq!(set.first_rejection(&[5, 12, 20, 28, 35], None).map(Filter::name), Some("ac_value"));
    }

    #[test]
    fn test_first_rejection_names_filter() {
        let set = defaults();
        // Quatre impairs.
        let rejected = set.first_rejection(&[1, 3, 5, 7, 10], None).unwrap();
        assert_eq!(rejected.name(), "odd_count");
    }

    #[test]
    fn test_last_draw_overlap_needs_previous() {
        let set = defaults();
        let ticket = [3, 11, 20, 26, 38];
        assert!(set.passes(&ticket, Some(&[3, 11, 21, 29, 36])));
        assert!(!set.passes(&ticket, Some(&[3, 11, 20, 29, 36])));
    }

    #[test]
    fn test_none_disables_everything() {
        let set = FilterSet::from_config(&FilterConfig::none(), &GameConfig::FANTASY5).unwrap();
        assert!(set.is_empty());
        assert!(set.passes(&[1, 2, 3, 4, 5], Some(&[1, 2, 3, 4, 5])));
        assert!(FilterConfig::none().is_empty());
        assert!(!FilterConfig::default().is_empty());
    }

    #[test]
    fn test_individual_toggle() {
        let config = FilterConfig {
            sum: Some(Bounds::new(100, 120)),
            ..FilterConfig::none()
        };
        let set = FilterSet::from_config(&config, &GameConfig::FANTASY5).unwrap();
        assert_eq!(set.filters().len(), 1);
        assert!(set.passes(&[10, 20, 25, 30, 35], None));
        assert!(!set.passes(&[1, 2, 3, 4, 5], None));
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let config = FilterConfig {
            sum: Some(Bounds::new(140, 50)),
            ..FilterConfig::default()
        };
        assert!(FilterSet::from_config(&config, &GameConfig::FANTASY5).is_err());
        let zero_run = FilterConfig {
            max_consecutive_run: Some(0),
            ..FilterConfig::none()
        };
        assert!(zero_run.validate().is_err());
    }

    #[test]
    fn test_apply_with_stats() {
        let set = defaults();
        let tickets = vec![
            vec![3, 11, 20, 26, 38],
            vec![1, 3, 5, 7, 10],
            vec![2, 4, 6, 8, 11],
            vec![6, 13, 21, 26, 37],
        ];
        let (kept, stats) = set.apply_with_stats(&tickets, None);
        assert_eq!(stats.input, 4);
        assert_eq!(stats.output, kept.len());
        let rejected: usize = stats.rejected.iter().map(|(_, c)| c).sum();
        assert_eq!(stats.input, stats.output + rejected);
        assert!(kept.contains(&vec![3, 11, 20, 26, 38]));
        assert_eq!(stats.rejected[0], ("odd_count".to_string(), 2));
    }

    #[test]
    fn test_capture_rates_on_history() {
        let h = DrawHistory::from_draws(GameConfig::FANTASY5, make_test_draws(50)).unwrap();
        let rates = defaults().capture_rates(h.as_window());
        assert_eq!(rates.len(), 10);
        assert_eq!(rates.last().unwrap().name, "all");
        for r in &rates {
            assert_eq!(r.total, 50);
            assert!(r.rate >= 0.0 && r.rate <= 1.0);
        }
        let all = rates.last().unwrap().passed;
        assert!(rates.iter().all(|r| r.passed >= all));
    }

    #[test]
    fn test_ticket_metrics() {
        let m = TicketMetrics::compute(&[5, 12, 20, 28, 35], &GameConfig::FANTASY5, None);
        assert_eq!((m.odd, m.even), (2, 3));
        assert_eq!((m.low, m.high), (2, 3));
        assert_eq!(m.sum, 100);
        assert_eq!(m.span, 30);
        assert_eq!(m.last_overlap, None);
    }
}

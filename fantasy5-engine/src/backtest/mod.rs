pub mod stats;

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use fantasy5_history::error::{Error, Result, invalid_config};
use fantasy5_history::models::validate_numbers;
use fantasy5_history::{Draw, DrawHistory, GameConfig, Window, WindowSpec};

use crate::adjacency::{AdjacencyModel, BiasReport};
use crate::config::PipelineConfig;
use crate::contact::{ContactScore, ContactScorer};
use crate::generator::{GenerationContext, ScoredTicket, Ticket, TicketGenerator};
use crate::range::{RangeOptimizer, RangeSet};

use self::stats::{
    CaptureStats, ChiSquareTest, WelchTest, ZTest, best_match_distribution, capture_goodness_of_fit,
    capture_statistics, combine_chi_square, distribution_moments, mean_variance, one_sample_z_test,
};

// ════════════════════════════════════════════════════════════════
// Résultats
// ════════════════════════════════════════════════════════════════

/// Sortie d'une exécution du pipeline pour une date cible.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub date: NaiveDate,
    pub history_size: usize,
    pub seed: u64,
    pub ranges: RangeSet,
    pub scores: ContactScore,
    /// Classés par `contact × position`.
    pub tickets: Vec<ScoredTicket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayScore {
    pub best_match: usize,
    /// Correspondances de chaque ticket, dans l'ordre des tickets.
    pub matches: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayResult {
    pub date: NaiveDate,
    pub actual: Vec<u8>,
    pub best_match: usize,
    pub matches: Vec<usize>,
    /// La valeur réelle de chaque position tombe-t-elle dans sa plage.
    pub captured: Vec<bool>,
    pub targets: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    MissingActualDraw,
    /// Aucun ticket enregistré pour cette date.
    NoPredictions,
    InsufficientHistory { available: usize, required: usize },
    Failed(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingActualDraw => write!(f, "aucun tirage réel"),
            SkipReason::NoPredictions => write!(f, "aucun ticket"),
            SkipReason::InsufficientHistory { available, required } => {
                write!(f, "historique insuffisant ({available}/{required})")
            }
            SkipReason::Failed(msg) => write!(f, "échec : {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedDay {
    pub date: NaiveDate,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRate {
    pub threshold: usize,
    pub hits: usize,
    pub rate: f64,
    /// Même taux pour des tickets tirés au hasard.
    pub baseline_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub tickets_per_day: usize,
    pub expected_best_match: f64,
    pub distribution: Vec<f64>,
    pub z_test: Option<ZTest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub label: String,
    pub days_requested: usize,
    pub days_tested: usize,
    pub days: Vec<DayResult>,
    pub skipped: Vec<SkippedDay>,
    /// `distribution[j]` = nombre de jours dont le meilleur ticket a `j` numéros.
    pub distribution: Vec<usize>,
    pub mean_best_match: f64,
    pub variance_best_match: f64,
    pub hit_rates: Vec<ThresholdRate>,
    pub capture: CaptureStats,
    pub goodness_of_fit: Vec<Option<ChiSquareTest>>,
    pub combined_fit: Option<ChiSquareTest>,
    pub bias: BiasReport,
    pub baseline: BaselineComparison,
}

impl BacktestResult {
    pub fn best_matches(&self) -> Vec<f64> {
        self.days.iter().map(|d| d.best_match as f64).collect()
    }

    pub fn hit_rate(&self, threshold: usize) -> Option<f64> {
        self.hit_rates.iter().find(|h| h.threshold == threshold).map(|h| h.rate)
    }
}

/// Test de Welch entre les meilleurs scores quotidiens de deux configurations.
pub fn compare(a: &BacktestResult, b: &BacktestResult) -> Option<WelchTest> {
    stats::welch_t_test(&a.best_matches(), &b.best_matches())
}

/// Meilleure correspondance d'un ensemble de tickets avec le tirage réel.
pub fn score_day(tickets: &[Ticket], actual: &Draw) -> DayScore {
    let matches: Vec<usize> = tickets.iter().map(|t| t.matches(&actual.numbers)).collect();
    DayScore {
        best_match: matches.iter().copied().max().unwrap_or(0),
        matches,
    }
}

/// Résultat d'un jour : correspondances des tickets et capture de chaque position par `ranges`.
fn day_result(actual: &Draw, tickets: &[Ticket], ranges: &RangeSet) -> DayResult {
    let score = score_day(tickets, actual);
    DayResult {
        date: actual.date,
        actual: actual.numbers.clone(),
        best_match: score.best_match,
        matches: score.matches,
        captured: ranges
            .ranges
            .iter()
            .zip(&actual.numbers)
            .map(|(r, &n)| r.contains(n))
            .collect(),
        targets: ranges.ranges.iter().map(|r| r.target).collect(),
    }
}

fn calendar_days(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
    if start > end {
        return invalid_config(format!("intervalle de backtest inversé : {start} > {end}"));
    }
    Ok(start.iter_days().take_while(|d| *d <= end).collect())
}

pub fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> "),
    );
    pb
}

// ════════════════════════════════════════════════════════════════
// Backtester
// ════════════════════════════════════════════════════════════════

struct PipelineRun {
    ranges: RangeSet,
    scores: ContactScore,
    tickets: Vec<Ticket>,
    generator: TicketGenerator,
}

/// Rejoue le pipeline jour par jour sur l'historique strictement antérieur à chaque date.
pub struct Backtester<'h> {
    history: &'h DrawHistory,
    config: PipelineConfig,
    model: Box<dyn AdjacencyModel>,
    scorer: ContactScorer,
}

impl<'h> Backtester<'h> {
    pub fn new(history: &'h DrawHistory, config: PipelineConfig) -> Result<Self> {
        config.validate(history.game())?;
        let model = config.adjacency.build(history.game().pool_size)?;
        let scorer = ContactScorer::new(config.contact.clone())?;
        Ok(Self {
            history,
            config,
            model,
            scorer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model(&self) -> &dyn AdjacencyModel {
        self.model.as_ref()
    }

    fn game(&self) -> &GameConfig {
        self.history.game()
    }

    /// Graine du jour : ne dépend que de la graine configurée et de la date.
    pub fn day_seed(&self, date: NaiveDate) -> u64 {
        self.config.generator.seed ^ date.num_days_from_ce() as u64
    }

    /// Exécution unique du pipeline pour `date` à partir de tout l'historique antérieur.
    pub fn predict(&self, date: NaiveDate) -> Result<Prediction> {
        let prior = self.history.before(date);
        let seed = self.day_seed(date);
        let PipelineRun {
            ranges,
            scores,
            tickets,
            generator,
        } = self.run_pipeline(prior, seed)?;
        let ctx = GenerationContext {
            game: *self.game(),
            ranges: &ranges,
            scores: &scores,
            last_draw: prior.last().map(|d| d.numbers.as_slice()),
        };
        let tickets = generator.score_tickets(&tickets, &ctx);
        Ok(Prediction {
            date,
            history_size: prior.len(),
            seed,
            ranges,
            scores,
            tickets,
        })
    }

    /// Teste une date. `MissingActualDraw` si aucun tirage n'est enregistré ce jour-là.
    pub fn run_day(&self, date: NaiveDate) -> Result<DayResult> {
        let actual = self.actual_draw(date)?;
        let prior = self.history.before(date);
        let PipelineRun { ranges, tickets, .. } = self.run_pipeline(prior, self.day_seed(date))?;
        Ok(day_result(actual, &tickets, &ranges))
    }

    /// Évalue des tickets fournis par l'appelant contre le tirage réel de `date`.
    /// Les plages servant à la capture sont calculées sur l'historique antérieur, comme pour `run_day`.
    pub fn score_tickets(&self, date: NaiveDate, tickets: &[Ticket]) -> Result<DayResult> {
        let actual = self.actual_draw(date)?;
        for ticket in tickets {
            validate_numbers(&ticket.numbers, self.game())?;
        }
        let ranges = self.compute_ranges(self.history.before(date))?;
        Ok(day_result(actual, tickets, &ranges))
    }

    /// Teste chaque date en parallèle ; les jours ignorés sont conservés avec leur raison.
    pub fn run(&self, dates: &[NaiveDate], progress: bool) -> BacktestResult {
        let (days, skipped) = self.replay(dates, progress, self.config.min_history, |date| self.run_day(date));
        let result = self.aggregate(
            self.config.label(),
            self.config.generator.ticket_count,
            dates.len(),
            days,
            skipped,
        );
        self.log_summary(&result);
        result
    }

    /// Chaque jour calendaire de `[start, end]`.
    pub fn run_range(&self, start: NaiveDate, end: NaiveDate, progress: bool) -> Result<BacktestResult> {
        Ok(self.run(&calendar_days(start, end)?, progress))
    }

    /// Évalue des tickets enregistrés date par date. Une date sans tickets est ignorée
    /// avec `SkipReason::NoPredictions`.
    pub fn score_predictions(
        &self,
        predictions: &BTreeMap<NaiveDate, Vec<Ticket>>,
        dates: &[NaiveDate],
        progress: bool,
    ) -> BacktestResult {
        // des tickets importés n'ont besoin que d'un tirage antérieur pour les plages
        let (days, skipped) = self.replay(dates, progress, 1, |date| match predictions.get(&date) {
            Some(tickets) if !tickets.is_empty() => self.score_tickets(date, tickets).map(Some),
            _ => Ok(None),
        });
        let tested: Vec<usize> = days.iter().map(|d| d.matches.len()).collect();
        let tickets_per_day = if tested.is_empty() {
            self.config.generator.ticket_count
        } else {
            (tested.iter().sum::<usize>() as f64 / tested.len() as f64).round().max(1.0) as usize
        };
        let result = self.aggregate(
            "tickets importés".to_string(),
            tickets_per_day,
            dates.len(),
            days,
            skipped,
        );
        self.log_summary(&result);
        result
    }

    /// Variante calendaire de `score_predictions`.
    pub fn score_predictions_range(
        &self,
        predictions: &BTreeMap<NaiveDate, Vec<Ticket>>,
        start: NaiveDate,
        end: NaiveDate,
        progress: bool,
    ) -> Result<BacktestResult> {
        Ok(self.score_predictions(predictions, &calendar_days(start, end)?, progress))
    }

    /// Les `n` dernières dates de tirage de l'historique.
    pub fn recent_dates(&self, n: usize) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.history.latest(n).iter().map(|d| d.date).collect();
        dates.reverse();
        dates
    }

    fn actual_draw(&self, date: NaiveDate) -> Result<&'h Draw> {
        self.history
            .draw_on(date)
            .ok_or(Error::MissingActualDraw(date))
    }

    /// Tirage réel absent ou historique antérieur trop court : le jour n'est pas testé.
    fn precheck(&self, date: NaiveDate, min_history: usize) -> Option<SkipReason> {
        if self.history.draw_on(date).is_none() {
            log::warn!("{date} ignoré : aucun tirage réel enregistré");
            return Some(SkipReason::MissingActualDraw);
        }
        let available = self.history.before(date).len();
        if available < min_history {
            log::debug!("{date} ignoré : {available} tirages antérieurs");
            return Some(SkipReason::InsufficientHistory {
                available,
                required: min_history,
            });
        }
        None
    }

    /// Exécute `day` sur chaque date retenue par `precheck`, en parallèle et dans l'ordre des dates.
    /// `Ok(None)` signale une date sans tickets à évaluer.
    fn replay<F, D>(
        &self,
        dates: &[NaiveDate],
        progress: bool,
        min_history: usize,
        day: F,
    ) -> (Vec<DayResult>, Vec<SkippedDay>)
    where
        F: Fn(NaiveDate) -> Result<D> + Sync,
        D: Into<Option<DayResult>>,
    {
        let pb = progress.then(|| progress_bar(dates.len() as u64));

        let outcomes: Vec<std::result::Result<DayResult, SkippedDay>> = dates
            .par_iter()
            .map(|&date| {
                let outcome = match self.precheck(date, min_history) {
                    Some(reason) => Err(SkippedDay { date, reason }),
                    None => match day(date) {
                        Ok(result) => result.into().ok_or_else(|| {
                            log::warn!("{date} ignoré : aucun ticket enregistré");
                            SkippedDay {
                                date,
                                reason: SkipReason::NoPredictions,
                            }
                        }),
                        Err(e) => Err(self.skip(date, e)),
                    },
                };
                if let Some(pb) = &pb {
                    pb.inc(1);
                }
                outcome
            })
            .collect();

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        let mut days = Vec::new();
        let mut skipped = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(day) => days.push(day),
                Err(skip) => skipped.push(skip),
            }
        }
        (days, skipped)
    }

    fn skip(&self, date: NaiveDate, err: Error) -> SkippedDay {
        let reason = match err {
            Error::MissingActualDraw(_) => {
                log::warn!("{date} ignoré : aucun tirage réel enregistré");
                SkipReason::MissingActualDraw
            }
            other => {
                log::warn!("{date} ignoré : {other}");
                SkipReason::Failed(other.to_string())
            }
        };
        SkippedDay { date, reason }
    }

    fn log_summary(&self, result: &BacktestResult) {
        log::info!(
            "backtest {} : {} jours testés, {} ignorés, moyenne {:.3} (hasard {:.3})",
            result.label,
            result.days_tested,
            result.skipped.len(),
            result.mean_best_match,
            result.baseline.expected_best_match
        );
    }

    fn compute_ranges(&self, prior: Window<'_>) -> Result<RangeSet> {
        let range_window = match self.config.range_window {
            Some(n) if !prior.is_empty() => prior.window(WindowSpec::Trailing(n))?,
            _ => prior,
        };
        let optimizer = RangeOptimizer::new(range_window)?;
        match &self.config.fixed_bounds {
            Some(bounds) => optimizer.evaluate_bounds(bounds),
            None => optimizer.optimal_ranges(self.config.capture_target),
        }
    }

    fn run_pipeline(&self, prior: Window<'_>, seed: u64) -> Result<PipelineRun> {
        let ranges = self.compute_ranges(prior)?;
        let scores = self.scorer.score(prior, self.model.as_ref())?;

        let mut generator_config = self.config.generator.clone();
        generator_config.seed = seed;
        let generator = TicketGenerator::new(generator_config, self.game())?;
        let ctx = GenerationContext {
            game: *self.game(),
            ranges: &ranges,
            scores: &scores,
            last_draw: prior.last().map(|d| d.numbers.as_slice()),
        };
        let tickets = generator.generate(&ctx)?;
        Ok(PipelineRun {
            ranges,
            scores,
            tickets,
            generator,
        })
    }

    fn aggregate(
        &self,
        label: String,
        tickets: usize,
        days_requested: usize,
        days: Vec<DayResult>,
        skipped: Vec<SkippedDay>,
    ) -> BacktestResult {
        let game = self.game();
        let k = game.draw_size;

        let mut distribution = vec![0usize; k + 1];
        for d in &days {
            distribution[d.best_match.min(k)] += 1;
        }
        let best: Vec<f64> = days.iter().map(|d| d.best_match as f64).collect();
        let (mean_best_match, variance_best_match) = mean_variance(&best);

        let random = best_match_distribution(game.pool_size, k, tickets);
        let (expected_best_match, random_variance) = distribution_moments(&random);

        let tested = days.len();
        let hit_rates = self
            .config
            .thresholds
            .iter()
            .map(|&threshold| {
                let hits = days.iter().filter(|d| d.best_match >= threshold).count();
                ThresholdRate {
                    threshold,
                    hits,
                    rate: if tested == 0 { 0.0 } else { hits as f64 / tested as f64 },
                    baseline_rate: random.iter().skip(threshold).sum(),
                }
            })
            .collect();

        let flags: Vec<Vec<bool>> = days.iter().map(|d| d.captured.clone()).collect();
        let targets: Vec<Vec<f64>> = days.iter().map(|d| d.targets.clone()).collect();
        let capture = capture_statistics(&flags, &targets);

        let goodness_of_fit: Vec<Option<ChiSquareTest>> = (0..k)
            .map(|i| {
                let captured = flags.iter().filter(|f| f[i]).count();
                let expected = targets.iter().map(|t| t[i]).sum::<f64>() / tested.max(1) as f64;
                capture_goodness_of_fit(captured, tested, expected)
            })
            .collect();
        let valid_fits: Vec<ChiSquareTest> = goodness_of_fit.iter().flatten().cloned().collect();
        let combined_fit = combine_chi_square(&valid_fits);

        BacktestResult {
            label,
            days_requested,
            days_tested: tested,
            days,
            skipped,
            distribution,
            mean_best_match,
            variance_best_match,
            hit_rates,
            capture,
            goodness_of_fit,
            combined_fit,
            bias: self.model.bias_report(),
            baseline: BaselineComparison {
                tickets_per_day: tickets,
                expected_best_match,
                distribution: random,
                z_test: one_sample_z_test(&best, expected_best_match, random_variance),
            },
        }
    }
}

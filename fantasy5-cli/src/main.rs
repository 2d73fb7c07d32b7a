mod display;
mod import;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::display::{
    display_backtest, display_bias_reports, display_comparison, display_day_result,
    display_filter_captures, display_import_summary, display_prediction, display_ranges,
    display_tradeoffs,
};
use fantasy5_engine::adjacency::{AdjacencyConfig, GridLayout};
use fantasy5_engine::backtest::{self, BacktestResult, Backtester};
use fantasy5_engine::config::{PipelineConfig, load_config, save_config};
use fantasy5_engine::filters::{FilterConfig, FilterSet};
use fantasy5_engine::generator::{Strategy, Ticket};
use fantasy5_engine::range::RangeOptimizer;
use fantasy5_history::{DrawHistory, GameConfig, Window, WindowSpec};

#[derive(Parser)]
#[command(name = "fantasy5", about = "Analyse de plages et de contact pour le Fantasy 5")]
struct Cli {
    /// Fichier CSV des tirages (date,N1..Nk)
    #[arg(short, long, global = true, default_value = "assets/fantasy5.csv")]
    file: PathBuf,

    /// Taille du pool de numéros
    #[arg(long, global = true, default_value = "39")]
    pool: u8,

    /// Nombre de numéros par tirage
    #[arg(long, global = true, default_value = "5")]
    draw_size: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plages optimales par position pour une ou plusieurs cibles de capture
    Ranges {
        /// Cibles de capture, séparées par des virgules
        #[arg(short, long, value_delimiter = ',', default_value = "0.80,0.85,0.90")]
        targets: Vec<f64>,

        /// Nombre de tirages récents analysés (tout l'historique par défaut)
        #[arg(short, long)]
        window: Option<usize>,

        /// Afficher la courbe largeur / capture pour cette position
        #[arg(long)]
        tradeoffs: Option<usize>,
    },

    /// Comparer le biais de contact des modèles d'adjacence
    Bias {
        /// Configuration dont le modèle d'adjacence est ajouté à la comparaison
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Afficher la grille colonne par colonne avec ce nombre de lignes
        #[arg(long)]
        grid_rows: Option<usize>,
    },

    /// Taux de passage des filtres sur les tirages historiques
    Filters {
        /// Configuration fournissant les seuils (seuils par défaut sinon)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Nombre de tirages récents analysés
        #[arg(short, long)]
        window: Option<usize>,
    },

    /// Générer les tickets pour une date
    Predict {
        /// Date cible (M/D/YYYY ou YYYY-MM-DD), lendemain du dernier tirage par défaut
        #[arg(short, long)]
        date: Option<String>,

        /// Configuration du pipeline (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stratégie de génération
        #[arg(short, long)]
        strategy: Option<Strategy>,

        /// Nombre de tickets
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Seed pour la reproductibilité
        #[arg(long)]
        seed: Option<u64>,

        /// Activer les filtres avec les seuils par défaut
        #[arg(long)]
        filters: bool,

        /// Écrire les tickets en CSV (date,N1..Nk,contact,position,combined)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Confronter des tickets enregistrés aux tirages réels
    Score {
        /// Fichiers de tickets (date,N1..Nk), séparés par des virgules
        #[arg(short, long, value_delimiter = ',', required = true)]
        predictions: Vec<PathBuf>,

        /// Date unique à évaluer
        #[arg(short, long, conflicts_with_all = ["start", "end"])]
        date: Option<String>,

        /// Première date évaluée
        #[arg(long)]
        start: Option<String>,

        /// Dernière date évaluée
        #[arg(long)]
        end: Option<String>,

        /// Configuration fournissant les cibles de capture des plages
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Écrire le résultat complet en JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Masquer la barre de progression
        #[arg(long)]
        quiet: bool,
    },

    /// Rejouer le pipeline sur l'historique
    Backtest {
        /// Première date testée
        #[arg(long)]
        start: Option<String>,

        /// Dernière date testée
        #[arg(long)]
        end: Option<String>,

        /// Nombre de derniers tirages testés, sans --start/--end
        #[arg(short, long, default_value = "100")]
        last: usize,

        /// Configuration du pipeline (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seconde configuration comparée sur les mêmes dates
        #[arg(long)]
        compare: Option<PathBuf>,

        /// Écrire le résultat complet en JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Masquer la barre de progression
        #[arg(long)]
        quiet: bool,
    },

    /// Écrire une configuration par défaut
    InitConfig {
        /// Fichier de sortie
        #[arg(short, long, default_value = "fantasy5.json")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let game = GameConfig::new(cli.pool, cli.draw_size)?;

    match cli.command {
        Command::Ranges {
            targets,
            window,
            tradeoffs,
        } => cmd_ranges(&load_history(&cli.file, game)?, &targets, window, tradeoffs),
        Command::Bias { config, grid_rows } => cmd_bias(game, config.as_deref(), grid_rows),
        Command::Filters { config, window } => {
            cmd_filters(&load_history(&cli.file, game)?, config.as_deref(), window)
        }
        Command::Predict {
            date,
            config,
            strategy,
            count,
            seed,
            filters,
            output,
        } => {
            let mut pipeline = load_pipeline(config.as_deref())?;
            if let Some(strategy) = strategy {
                pipeline.generator.strategy = strategy;
            }
            if let Some(count) = count {
                pipeline.generator.ticket_count = count;
            }
            if let Some(seed) = seed {
                pipeline.generator.seed = seed;
            }
            if filters && pipeline.generator.filters.is_none() {
                pipeline.generator.filters = Some(FilterConfig::default());
            }
            cmd_predict(
                &load_history(&cli.file, game)?,
                pipeline,
                date.as_deref(),
                output.as_deref(),
            )
        }
        Command::Score {
            predictions,
            date,
            start,
            end,
            config,
            output,
            quiet,
        } => {
            let history = load_history(&cli.file, game)?;
            let selection = match (date, start, end) {
                (Some(d), None, None) => ScoreDates::Day(import::parse_date(&d)?),
                (None, Some(s), Some(e)) => {
                    ScoreDates::Range(import::parse_date(&s)?, import::parse_date(&e)?)
                }
                (None, None, None) => ScoreDates::All,
                _ => bail!("--start et --end vont ensemble"),
            };
            cmd_score(
                &history,
                &predictions,
                selection,
                config.as_deref(),
                output.as_deref(),
                !quiet,
            )
        }
        Command::Backtest {
            start,
            end,
            last,
            config,
            compare,
            output,
            quiet,
        } => {
            let history = load_history(&cli.file, game)?;
            let dates: Vec<chrono::NaiveDate> = match (start, end) {
                (Some(s), Some(e)) => {
                    let (s, e) = (import::parse_date(&s)?, import::parse_date(&e)?);
                    if s > e {
                        bail!("--start {s} postérieur à --end {e}");
                    }
                    s.iter_days().take_while(|d| *d <= e).collect()
                }
                (None, None) => history.latest(last).iter().rev().map(|d| d.date).collect(),
                _ => bail!("--start et --end vont ensemble"),
            };
            cmd_backtest(
                &history,
                &dates,
                config.as_deref(),
                compare.as_deref(),
                output.as_deref(),
                !quiet,
            )
        }
        Command::InitConfig { output } => cmd_init_config(&output),
    }
}

fn load_history(file: &Path, game: GameConfig) -> Result<DrawHistory> {
    let (history, result) = import::import_csv(file, game)?;
    if result.errors > 0 || result.duplicates > 0 {
        display_import_summary(&result);
    }
    if let Some((first, last)) = history.date_range() {
        log::info!("{} tirages chargés, du {first} au {last}", history.len());
    }
    if history.is_empty() {
        bail!("Aucun tirage valide dans {}", file.display());
    }
    Ok(history)
}

fn load_pipeline(config: Option<&Path>) -> Result<PipelineConfig> {
    match config {
        Some(path) => load_config(path),
        None => Ok(PipelineConfig::default()),
    }
}

fn select_window(history: &DrawHistory, window: Option<usize>) -> Result<Window<'_>> {
    let spec = window.map_or(WindowSpec::All, WindowSpec::Trailing);
    Ok(history.window(spec)?)
}

fn cmd_ranges(
    history: &DrawHistory,
    targets: &[f64],
    window: Option<usize>,
    tradeoffs: Option<usize>,
) -> Result<()> {
    let optimizer = RangeOptimizer::new(select_window(history, window)?)?;
    let sets = optimizer.range_table(targets)?;
    display_ranges(&sets);
    if let Some(position) = tradeoffs {
        display_tradeoffs(position, &optimizer.capture_tradeoffs(position)?);
    }
    Ok(())
}

fn cmd_bias(game: GameConfig, config: Option<&Path>, grid_rows: Option<usize>) -> Result<()> {
    let mut variants = AdjacencyConfig::standard_variants();
    if let Some(path) = config {
        let pipeline = load_config(path)?;
        if !variants.contains(&pipeline.adjacency) {
            variants.push(pipeline.adjacency);
        }
    }

    let mut reports = Vec::with_capacity(variants.len());
    for variant in &variants {
        match variant.build(game.pool_size) {
            Ok(model) => reports.push(model.bias_report()),
            Err(e) => log::warn!("{} ignoré : {e}", variant.label()),
        }
    }
    display_bias_reports(&reports);

    if let Some(rows) = grid_rows {
        let layout = GridLayout::column_major(game.pool_size, rows)?;
        println!("\nGrille {}x{} :\n{layout}", layout.rows(), layout.cols());
    }
    Ok(())
}

fn cmd_filters(history: &DrawHistory, config: Option<&Path>, window: Option<usize>) -> Result<()> {
    let filter_config = load_pipeline(config)?
        .generator
        .filters
        .unwrap_or_default();
    let set = FilterSet::from_config(&filter_config, history.game())?;
    if set.is_empty() {
        println!("Aucun filtre actif.");
        return Ok(());
    }
    let window = select_window(history, window)?;
    display_filter_captures(&set.capture_rates(window), window.len());
    Ok(())
}

fn cmd_predict(
    history: &DrawHistory,
    pipeline: PipelineConfig,
    date: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let date = match date {
        Some(raw) => import::parse_date(raw)?,
        None => {
            let (_, last) = history.date_range().context("Historique vide")?;
            last.succ_opt().context("Date hors limites")?
        }
    };
    let backtester = Backtester::new(history, pipeline)?;
    log::info!("Configuration : {}", backtester.config().label());
    let prediction = backtester
        .predict(date)
        .with_context(|| format!("Impossible de générer les tickets du {date}"))?;
    display_prediction(&prediction, 10);

    if let Some(path) = output {
        import::export_predictions(path, prediction.date, &prediction.tickets, history.game())?;
        println!("{} tickets écrits dans {}", prediction.tickets.len(), path.display());
    }
    Ok(())
}

/// Dates évaluées par `score`.
enum ScoreDates {
    Day(NaiveDate),
    Range(NaiveDate, NaiveDate),
    /// Toutes les dates présentes dans les fichiers de tickets.
    All,
}

fn load_predictions(paths: &[PathBuf], game: &GameConfig) -> Result<BTreeMap<NaiveDate, Vec<Ticket>>> {
    let mut predictions = BTreeMap::new();
    for path in paths {
        let result = import::import_predictions(path, game, &mut predictions)?;
        if result.errors > 0 || result.duplicates > 0 {
            display_import_summary(&result);
        }
        log::info!("{} tickets lus dans {}", result.loaded, path.display());
    }
    if predictions.is_empty() {
        bail!("Aucun ticket valide dans les fichiers fournis");
    }
    Ok(predictions)
}

fn write_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Impossible d'écrire {}", path.display()))?;
    println!("Résultat écrit dans {}", path.display());
    Ok(())
}

fn cmd_score(
    history: &DrawHistory,
    paths: &[PathBuf],
    selection: ScoreDates,
    config: Option<&Path>,
    output: Option<&Path>,
    progress: bool,
) -> Result<()> {
    let predictions = load_predictions(paths, history.game())?;
    let backtester = Backtester::new(history, load_pipeline(config)?)?;

    let result = match selection {
        ScoreDates::Day(date) => {
            let tickets = predictions
                .get(&date)
                .with_context(|| format!("Aucun ticket pour le {date}"))?;
            let day = backtester
                .score_tickets(date, tickets)
                .with_context(|| format!("Impossible d'évaluer les tickets du {date}"))?;
            display_day_result(&day, tickets);
            if let Some(path) = output {
                write_json(&day, path)?;
            }
            return Ok(());
        }
        ScoreDates::Range(start, end) => {
            backtester.score_predictions_range(&predictions, start, end, progress)?
        }
        ScoreDates::All => {
            let dates: Vec<NaiveDate> = predictions.keys().copied().collect();
            backtester.score_predictions(&predictions, &dates, progress)
        }
    };

    display_backtest(&result);
    if let Some(path) = output {
        write_json(&result, path)?;
    }
    Ok(())
}

fn run_backtest(
    history: &DrawHistory,
    pipeline: PipelineConfig,
    dates: &[chrono::NaiveDate],
    progress: bool,
) -> Result<BacktestResult> {
    let backtester = Backtester::new(history, pipeline)?;
    println!("Backtest de {} sur {} dates...", backtester.config().label(), dates.len());
    Ok(backtester.run(dates, progress))
}

fn cmd_backtest(
    history: &DrawHistory,
    dates: &[chrono::NaiveDate],
    config: Option<&Path>,
    compare: Option<&Path>,
    output: Option<&Path>,
    progress: bool,
) -> Result<()> {
    let result = run_backtest(history, load_pipeline(config)?, dates, progress)?;
    display_backtest(&result);

    if let Some(path) = output {
        write_json(&result, path)?;
    }

    if let Some(path) = compare {
        let other = run_backtest(history, load_config(path)?, dates, progress)?;
        display_backtest(&other);
        match backtest::compare(&result, &other) {
            Some(test) => display_comparison(&result.label, &other.label, &test),
            None => println!("\nComparaison impossible : pas assez de jours testés."),
        }
    }
    Ok(())
}

fn cmd_init_config(output: &Path) -> Result<()> {
    if output.exists() {
        bail!("{} existe déjà", output.display());
    }
    save_config(&PipelineConfig::default(), output)?;
    println!("Configuration par défaut écrite dans {}", output.display());
    Ok(())
}

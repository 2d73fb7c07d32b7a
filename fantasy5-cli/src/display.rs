use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};

use crate::import::ImportResult;
use fantasy5_engine::adjacency::BiasReport;
use fantasy5_engine::backtest::stats::WelchTest;
use fantasy5_engine::backtest::{BacktestResult, DayResult, Prediction};
use fantasy5_engine::filters::FilterCapture;
use fantasy5_engine::generator::Ticket;
use fantasy5_engine::range::{CaptureTradeoff, RangeSet};

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn pct(x: f64) -> String {
    format!("{:.1}%", x * 100.0)
}

fn p_value_cell(p: f64) -> Cell {
    let cell = Cell::new(format!("{:.4}", p));
    if p < 0.05 { cell.fg(Color::Red) } else { cell }
}

pub fn display_import_summary(result: &ImportResult) {
    println!("Import terminé :");
    println!("  Lignes lues       : {}", result.total_records);
    println!("  Tirages chargés   : {}", result.loaded);
    if result.duplicates > 0 {
        println!("  Doublons ignorés  : {}", result.duplicates);
    }
    if result.errors > 0 {
        println!("  Erreurs           : {}", result.errors);
    }
}

/// Une colonne par cible de capture, une ligne par position.
pub fn display_ranges(sets: &[RangeSet]) {
    let Some(first) = sets.first() else {
        println!("Aucune plage à afficher.");
        return;
    };

    let headers: Vec<String> = std::iter::once("Position".to_string())
        .chain(sets.iter().map(|s| {
            let target = s.ranges.first().map_or(0.0, |r| r.target);
            format!("Cible {}", pct(target))
        }))
        .collect();
    let mut table = new_table(headers.iter().map(String::as_str).collect());

    for position in 1..=first.len() {
        let mut row = vec![Cell::new(format!("N{position}"))];
        for set in sets {
            let cell = match set.get(position) {
                Some(r) => format!(
                    "[{:2}, {:2}]  largeur {:2}  capture {}",
                    r.lower,
                    r.upper,
                    r.width(),
                    pct(r.achieved)
                ),
                None => "—".to_string(),
            };
            row.push(Cell::new(cell));
        }
        table.add_row(row);
    }

    let mut joint = vec![Cell::new("Conjointe")];
    for set in sets {
        joint.push(Cell::new(format!(
            "attendue {}  observée {}",
            pct(set.expected_joint_capture()),
            pct(set.achieved_joint_capture())
        )));
    }
    table.add_row(joint);

    println!(
        "\n── Plages optimales ({} tirages) ──",
        first.ranges.first().map_or(0, |r| r.window_size)
    );
    println!("{table}");
}

pub fn display_tradeoffs(position: usize, tradeoffs: &[CaptureTradeoff]) {
    println!("\n── Compromis largeur / capture, position N{position} ──");
    let mut table = new_table(vec!["Largeur", "Plage", "Capturés", "Capture"]);
    for t in tradeoffs {
        table.add_row(vec![
            t.width.to_string(),
            format!("[{:2}, {:2}]", t.lower, t.upper),
            t.captured.to_string(),
            pct(t.fraction),
        ]);
    }
    println!("{table}");
}

pub fn display_bias_reports(reports: &[BiasReport]) {
    println!("\n── Biais de contact par modèle d'adjacence ──");
    let mut table = new_table(vec![
        "Modèle",
        "Min",
        "Max",
        "Moyenne",
        "Variance",
        "Max/Min",
        "Écart rel. max",
        "Trous",
        "Verdict",
    ]);
    for r in reports {
        let ratio = r
            .max_min_ratio
            .map_or_else(|| "∞".to_string(), |x| format!("{:.3}", x));
        let verdict = if r.bias_free {
            Cell::new("sans biais").fg(Color::Green)
        } else {
            Cell::new("biaisé").fg(Color::Yellow)
        };
        table.add_row(vec![
            Cell::new(&r.model),
            Cell::new(format!("{:.2}", r.min)),
            Cell::new(format!("{:.2}", r.max)),
            Cell::new(format!("{:.3}", r.mean)),
            Cell::new(format!("{:.4}", r.variance)),
            Cell::new(ratio),
            Cell::new(pct(r.max_relative_deviation)),
            Cell::new(r.gap_count.to_string()),
            verdict,
        ]);
    }
    println!("{table}");
}

pub fn display_filter_captures(captures: &[FilterCapture], draws: usize) {
    println!("\n── Taux de passage des filtres sur {draws} tirages réels ──");
    let mut table = new_table(vec!["Filtre", "Passent", "Total", "Taux"]);
    for c in captures {
        table.add_row(vec![
            c.name.clone(),
            c.passed.to_string(),
            c.total.to_string(),
            pct(c.rate),
        ]);
    }
    println!("{table}");
}

pub fn display_prediction(prediction: &Prediction, top_contacts: usize) {
    println!(
        "\nPrédiction du {} ({} tirages antérieurs, graine {})",
        prediction.date, prediction.history_size, prediction.seed
    );

    let contacts: Vec<String> = prediction
        .scores
        .ranked()
        .into_iter()
        .take(top_contacts)
        .map(|(n, s)| format!("{n}:{s:.2}"))
        .collect();
    println!("Meilleurs scores de contact : {}", contacts.join("  "));

    let mut table = new_table(vec!["#", "Ticket", "Contact", "Position", "Combiné"]);
    for (i, t) in prediction.tickets.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            t.ticket.to_string(),
            format!("{:.3}", t.contact_score),
            format!("{:.3}", t.position_score),
            format!("{:.3}", t.combined_score),
        ]);
    }
    println!("{table}");
}

pub fn display_backtest(result: &BacktestResult) {
    println!("\n══ Backtest : {} ══", result.label);
    println!(
        "Jours demandés {}, testés {}, ignorés {}",
        result.days_requested,
        result.days_tested,
        result.skipped.len()
    );
    if result.days_tested == 0 {
        println!("Aucun jour testable.");
        return;
    }

    println!("\n── Distribution du meilleur score ──");
    let mut table = new_table(vec!["Correspondances", "Jours", "Observé", "Hasard"]);
    for (m, &count) in result.distribution.iter().enumerate() {
        let baseline = result.baseline.distribution.get(m).copied().unwrap_or(0.0);
        table.add_row(vec![
            m.to_string(),
            count.to_string(),
            pct(count as f64 / result.days_tested as f64),
            pct(baseline),
        ]);
    }
    println!("{table}");
    println!(
        "Moyenne {:.3} (variance {:.3}), hasard {:.3} pour {} tickets/jour",
        result.mean_best_match,
        result.variance_best_match,
        result.baseline.expected_best_match,
        result.baseline.tickets_per_day
    );
    if let Some(z) = &result.baseline.z_test {
        println!("Test z contre le hasard : z = {:.3}, p = {:.4}", z.z, z.p_value);
    }

    println!("\n── Taux de réussite ──");
    let mut table = new_table(vec!["Seuil", "Jours", "Taux", "Hasard"]);
    for h in &result.hit_rates {
        table.add_row(vec![
            format!(">= {}", h.threshold),
            h.hits.to_string(),
            pct(h.rate),
            pct(h.baseline_rate),
        ]);
    }
    println!("{table}");

    println!("\n── Capture des plages ──");
    let mut table = new_table(vec!["Position", "Capture", "Chi²", "p"]);
    for (i, rate) in result.capture.per_position.iter().enumerate() {
        let (stat, p) = match result.goodness_of_fit.get(i).and_then(Option::as_ref) {
            Some(t) => (Cell::new(format!("{:.3}", t.statistic)), p_value_cell(t.p_value)),
            None => (Cell::new("—"), Cell::new("—")),
        };
        table.add_row(vec![Cell::new(format!("N{}", i + 1)), Cell::new(pct(*rate)), stat, p]);
    }
    let (stat, p) = match &result.combined_fit {
        Some(t) => (Cell::new(format!("{:.3}", t.statistic)), p_value_cell(t.p_value)),
        None => (Cell::new("—"), Cell::new("—")),
    };
    table.add_row(vec![Cell::new("Combiné"), Cell::new(""), stat, p]);
    println!("{table}");
    println!(
        "Toutes positions capturées : {} (attendu {})",
        pct(result.capture.all_captured_rate),
        pct(result.capture.expected_all_captured)
    );
    println!(
        "Biais du modèle {} : variance {:.4}{}",
        result.bias.model,
        result.bias.variance,
        if result.bias.bias_free { " (sans biais)" } else { "" }
    );

    if !result.skipped.is_empty() {
        let shown: Vec<String> = result
            .skipped
            .iter()
            .take(5)
            .map(|s| format!("{} ({})", s.date, s.reason))
            .collect();
        println!("Jours ignorés : {}{}", shown.join(", "), if result.skipped.len() > 5 { ", ..." } else { "" });
    }
}

/// Tickets d'une seule date face au tirage réel.
pub fn display_day_result(day: &DayResult, tickets: &[Ticket]) {
    let actual: Vec<String> = day.actual.iter().map(|n| format!("{n:02}")).collect();
    println!("\nTirage du {} : {}", day.date, actual.join(" "));

    let mut table = new_table(vec!["#", "Ticket", "Correspondances"]);
    for (i, (ticket, &m)) in tickets.iter().zip(&day.matches).enumerate() {
        let cell = Cell::new(m.to_string());
        let cell = if m == day.best_match && m > 0 { cell.fg(Color::Green) } else { cell };
        table.add_row(vec![Cell::new(i + 1), Cell::new(ticket), cell]);
    }
    println!("{table}");

    let captured: Vec<String> = day
        .captured
        .iter()
        .enumerate()
        .map(|(i, &c)| format!("N{}:{}", i + 1, if c { "oui" } else { "non" }))
        .collect();
    println!("Meilleur score : {}", day.best_match);
    println!("Positions dans leur plage : {}", captured.join("  "));
}

pub fn display_comparison(label_a: &str, label_b: &str, test: &WelchTest) {
    println!("\n── Comparaison (Welch) ──");
    let mut table = new_table(vec!["Configuration", "Moyenne"]);
    table.add_row(vec![label_a.to_string(), format!("{:.3}", test.mean_a)]);
    table.add_row(vec![label_b.to_string(), format!("{:.3}", test.mean_b)]);
    println!("{table}");
    println!("t = {:.3}, ddl = {:.1}, p = {:.4}", test.t, test.df, test.p_value);
    if test.p_value < 0.05 {
        println!("Différence significative au seuil de 5%.");
    } else {
        println!("Pas de différence significative au seuil de 5%.");
    }
}

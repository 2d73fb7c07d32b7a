use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;

use fantasy5_engine::generator::{ScoredTicket, Ticket};
use fantasy5_history::models::validate_numbers;
use fantasy5_history::{Draw, DrawHistory, GameConfig};

pub struct ImportResult {
    pub total_records: u32,
    pub loaded: u32,
    pub duplicates: u32,
    pub errors: u32,
}

/// Accepte `M/D/YYYY` (export officiel) ou `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .with_context(|| format!("Format de date invalide: '{}'", raw))
}

fn parse_numbers(record: &csv::StringRecord, game: &GameConfig) -> Result<Vec<u8>> {
    if record.len() < game.draw_size + 1 {
        bail!("{} champs au lieu de {}", record.len(), game.draw_size + 1);
    }
    let mut numbers = Vec::with_capacity(game.draw_size);
    for idx in 1..=game.draw_size {
        let s = record[idx].trim();
        let n = s
            .parse::<u8>()
            .with_context(|| format!("Impossible de parser '{}' (index {})", s, idx))?;
        numbers.push(n);
    }
    // les exports listent parfois l'ordre de sortie des boules
    numbers.sort_unstable();
    Ok(numbers)
}

fn parse_record(record: &csv::StringRecord, game: &GameConfig) -> Result<Draw> {
    let numbers = parse_numbers(record, game)?;
    let date = parse_date(&record[0])?;
    Ok(Draw::new(date, numbers, game)?)
}

/// Charge un CSV `date,N_1..N_k` avec en-tête. Les lignes invalides sont comptées puis ignorées,
/// un doublon de date garde la première occurrence.
pub fn import_csv(path: &Path, game: GameConfig) -> Result<(DrawHistory, ImportResult)> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;

    let mut result = ImportResult {
        total_records: 0,
        loaded: 0,
        duplicates: 0,
        errors: 0,
    };
    let mut by_date: BTreeMap<NaiveDate, Draw> = BTreeMap::new();

    for record_result in reader.records() {
        result.total_records += 1;
        let parsed = record_result
            .context("Erreur de lecture CSV")
            .and_then(|record| parse_record(&record, &game));
        match parsed {
            Ok(draw) => {
                if by_date.contains_key(&draw.date) {
                    log::warn!("Tirage du {} en double, ligne {} ignorée", draw.date, result.total_records);
                    result.duplicates += 1;
                } else {
                    by_date.insert(draw.date, draw);
                    result.loaded += 1;
                }
            }
            Err(e) => {
                log::warn!("Erreur parsing ligne {}: {:#}", result.total_records, e);
                result.errors += 1;
            }
        }
    }

    let history = DrawHistory::from_draws(game, by_date.into_values().collect())
        .context("Historique incohérent")?;
    Ok((history, result))
}

// ════════════════════════════════════════════════════════════════
// Fichiers de tickets
// ════════════════════════════════════════════════════════════════

/// Écrit les tickets d'une date au format `date,N_1..N_k,contact,position,combined`.
pub fn export_predictions(
    path: &Path,
    date: NaiveDate,
    tickets: &[ScoredTicket],
    game: &GameConfig,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Impossible de créer {:?}", path))?;

    let mut header = vec!["date".to_string()];
    header.extend((1..=game.draw_size).map(|i| format!("N{i}")));
    header.extend(["contact", "position", "combined"].map(String::from));
    writer.write_record(&header)?;

    let day = date.format("%Y-%m-%d").to_string();
    for t in tickets {
        let mut row = vec![day.clone()];
        row.extend(t.ticket.numbers.iter().map(|n| n.to_string()));
        row.push(format!("{:.6}", t.contact_score));
        row.push(format!("{:.6}", t.position_score));
        row.push(format!("{:.6}", t.combined_score));
        writer.write_record(&row)?;
    }
    writer.flush().context("Erreur d'écriture CSV")?;
    Ok(())
}

/// Relit un fichier de tickets, regroupés par date. Les colonnes au-delà des numéros sont
/// ignorées ; un ticket répété pour la même date n'est gardé qu'une fois.
pub fn import_predictions(
    path: &Path,
    game: &GameConfig,
    into: &mut BTreeMap<NaiveDate, Vec<Ticket>>,
) -> Result<ImportResult> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;

    let mut result = ImportResult {
        total_records: 0,
        loaded: 0,
        duplicates: 0,
        errors: 0,
    };

    for record_result in reader.records() {
        result.total_records += 1;
        let parsed = record_result
            .context("Erreur de lecture CSV")
            .and_then(|record| {
                let numbers = parse_numbers(&record, game)?;
                validate_numbers(&numbers, game)?;
                Ok((parse_date(&record[0])?, Ticket { numbers }))
            });
        match parsed {
            Ok((date, ticket)) => {
                let day = into.entry(date).or_default();
                if day.contains(&ticket) {
                    result.duplicates += 1;
                } else {
                    day.push(ticket);
                    result.loaded += 1;
                }
            }
            Err(e) => {
                log::warn!("{:?} ligne {} ignorée : {:#}", path, result.total_records, e);
                result.errors += 1;
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_csv(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("fantasy5-import-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("03/15/2024").unwrap(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(parse_date(" 2024-03-15 ").unwrap(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert!(parse_date("15.03.2024").is_err());
    }

    #[test]
    fn test_import_counts_errors_and_duplicates() {
        let path = write_csv(
            "mixed.csv",
            "Date,N1,N2,N3,N4,N5\n\
             01/02/2024,5,12,20,28,35\n\
             01/01/2024,36,1,19,7,24\n\
             01/03/2024,5,12,20,28,40\n\
             01/03/2024,1,2,3\n\
             2024-01-02,1,2,3,4,5\n\
             2024-01-04,2,9,17,25,33\n",
        );
        let (history, result) = import_csv(&path, GameConfig::FANTASY5).unwrap();
        assert_eq!(result.total_records, 6);
        assert_eq!(result.loaded, 3);
        assert_eq!(result.duplicates, 1);
        assert_eq!(result.errors, 2);
        assert_eq!(history.len(), 3);
        // trié par date, numéros remis dans l'ordre croissant
        assert_eq!(history.draws()[0].numbers, vec![1, 7, 19, 24, 36]);
        assert_eq!(history.draws()[1].numbers, vec![5, 12, 20, 28, 35]);
    }

    #[test]
    fn test_import_missing_file() {
        let err = import_csv(Path::new("/nonexistent/draws.csv"), GameConfig::FANTASY5)
            .err()
            .unwrap();
        assert!(err.to_string().contains("Impossible d'ouvrir"));
    }

    #[test]
    fn test_export_then_import_predictions() {
        let game = GameConfig::FANTASY5;
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let scored = |numbers: Vec<u8>| ScoredTicket {
            ticket: Ticket { numbers },
            contact_score: 2.5,
            position_score: 0.8,
            combined_score: 2.0,
        };
        let tickets = vec![scored(vec![1, 8, 15, 22, 30]), scored(vec![3, 11, 19, 27, 36])];
        let path = write_csv("predictions.csv", "");
        export_predictions(&path, date, &tickets, &game).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("date,N1,N2,N3,N4,N5,contact,position,combined"));
        assert!(content.contains("2024-05-10,1,8,15,22,30,2.500000"));

        let mut map = BTreeMap::new();
        let result = import_predictions(&path, &game, &mut map).unwrap();
        assert_eq!(result.loaded, 2);
        assert_eq!(result.errors, 0);
        assert_eq!(map.len(), 1);
        assert_eq!(map[&date][1].numbers, vec![3, 11, 19, 27, 36]);
    }

    #[test]
    fn test_import_predictions_groups_and_rejects() {
        let game = GameConfig::FANTASY5;
        let path = write_csv(
            "tickets.csv",
            "date,N1,N2,N3,N4,N5\n\
             2024-01-02,35,28,20,12,5\n\
             01/02/2024,5,12,20,28,35\n\
             2024-01-02,1,2,3,4,5\n\
             2024-01-03,1,2,3,4,40\n\
             2024-01-03,1,1,3,4,5\n\
             2024-01-03,6,7,8,9,10\n",
        );
        let mut map = BTreeMap::new();
        let result = import_predictions(&path, &game, &mut map).unwrap();
        assert_eq!(result.total_records, 6);
        assert_eq!(result.loaded, 3);
        assert_eq!(result.duplicates, 1);
        assert_eq!(result.errors, 2);

        let jan2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(map[&jan2].len(), 2);
        assert_eq!(map[&jan2][0].numbers, vec![5, 12, 20, 28, 35]);
        assert_eq!(map.len(), 2);
    }
}

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use tracing::{debug, warn};

use elan_db::db::insert_draw;
use elan_db::models::{validate_draw, DrawRecord, GameShape};
use elan_db::rusqlite::Connection;

/// Libellé de la première colonne → id de jeu. L'ordre compte : la
/// première correspondance l'emporte.
const GAME_NAMES: &[(&str, &str)] = &[
    ("大樂透", "lotto649"),
    ("威力彩", "power638"),
    ("今彩539", "daily539"),
    ("3星彩", "digit3"),
    ("三星彩", "digit3"),
    ("4星彩", "digit4"),
    ("四星彩", "digit4"),
    // Tirages spéciaux du 大樂透 exportés sous le nom de l'événement
    ("春節", "lotto649"),
    ("端午", "lotto649"),
    ("中秋", "lotto649"),
    ("加開", "lotto649"),
];

/// Les numéros commencent à cette colonne (après les montants de vente).
const FIRST_NUMBER_COLUMN: usize = 6;

pub fn game_id_for(label: &str) -> Option<&'static str> {
    GAME_NAMES
        .iter()
        .find(|(name, _)| label.contains(name))
        .map(|(_, id)| *id)
}

/// `113/01/02` (année du calendrier Minguo) ou `2024/01/02` → `2024-01-02`.
pub fn parse_date(raw: &str) -> Result<String> {
    let parts: Vec<&str> = raw.trim().split(['/', '-']).collect();
    if parts.len() != 3 {
        bail!("Format de date invalide : '{}'", raw);
    }
    let mut year: i32 = parts[0]
        .parse()
        .with_context(|| format!("Année invalide : '{}'", raw))?;
    if year < 1911 {
        year += 1911;
    }
    let month: u32 = parts[1]
        .parse()
        .with_context(|| format!("Mois invalide : '{}'", raw))?;
    let day: u32 = parts[2]
        .parse()
        .with_context(|| format!("Jour invalide : '{}'", raw))?;
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .with_context(|| format!("Date inexistante : '{}'", raw))?;
    Ok(date.format("%Y-%m-%d").to_string())
}

fn field(record: &csv::StringRecord, idx: usize) -> Result<&str> {
    record
        .get(idx)
        .map(str::trim)
        .with_context(|| format!("Champ manquant à l'index {}", idx))
}

/// `Ok(None)` pour une ligne d'un jeu non pris en charge.
pub fn parse_record(record: &csv::StringRecord) -> Result<Option<DrawRecord>> {
    let Some(game) = game_id_for(field(record, 0)?) else {
        return Ok(None);
    };
    let shape = GameShape::by_id(game).with_context(|| format!("Jeu inconnu : {game}"))?;

    let period = field(record, 1)?.to_string();
    let date = parse_date(field(record, 2)?)?;

    let values: Vec<u8> = record
        .iter()
        .skip(FIRST_NUMBER_COLUMN)
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .map(|s| {
            s.parse::<u8>()
                .with_context(|| format!("Numéro invalide : '{}'", s))
        })
        .collect::<Result<_>>()?;

    if values.len() < shape.count {
        bail!(
            "Tirage {} : {} numéros attendus, {} trouvés",
            period,
            shape.count,
            values.len()
        );
    }
    let numbers = values[..shape.count].to_vec();
    let secondary = if shape.secondary_max.is_some() || shape.has_special {
        values.get(shape.count).copied()
    } else {
        None
    };

    let draw = DrawRecord {
        game: shape.id.clone(),
        period,
        date,
        numbers,
        secondary,
    };
    validate_draw(&shape, &draw)?;
    Ok(Some(draw))
}

#[derive(Debug, Default)]
pub struct ImportResult {
    pub total_records: u32,
    pub inserted: u32,
    pub skipped: u32,
    pub unsupported: u32,
    pub errors: u32,
}

pub fn import_csv(conn: &Connection, path: &Path) -> Result<ImportResult> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;

    let tx = conn
        .unchecked_transaction()
        .context("Impossible de démarrer la transaction")?;

    let mut result = ImportResult::default();

    for record_result in reader.records() {
        result.total_records += 1;
        let line = result.total_records;
        let record = match record_result {
            Ok(record) => record,
            Err(e) => {
                warn!(line, "erreur de lecture : {e}");
                result.errors += 1;
                continue;
            }
        };
        match parse_record(&record) {
            Ok(Some(draw)) => match insert_draw(&tx, &draw) {
                Ok(true) => result.inserted += 1,
                Ok(false) => result.skipped += 1,
                Err(e) => {
                    warn!(line, period = %draw.period, "erreur d'insertion : {e:#}");
                    result.errors += 1;
                }
            },
            Ok(None) => {
                debug!(line, "jeu non pris en charge, ligne ignorée");
                result.unsupported += 1;
            }
            Err(e) => {
                warn!(line, "ligne invalide : {e:#}");
                result.errors += 1;
            }
        }
    }

    tx.commit().context("Échec du commit")?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use elan_db::db::{count_draws, fetch_last_draws, migrate};

    fn record(fields: &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(fields.to_vec())
    }

    #[test]
    fn test_parse_date_minguo_and_gregorian() {
        assert_eq!(parse_date("113/01/02").unwrap(), "2024-01-02");
        assert_eq!(parse_date("2023/12/31").unwrap(), "2023-12-31");
        assert_eq!(parse_date(" 112/3/7 ").unwrap(), "2023-03-07");
        assert!(parse_date("113/02/30").is_err());
        assert!(parse_date("hier").is_err());
    }

    #[test]
    fn test_game_id_for_labels() {
        assert_eq!(game_id_for("大樂透"), Some("lotto649"));
        assert_eq!(game_id_for("春節加碼大樂透"), Some("lotto649"));
        assert_eq!(game_id_for("中秋加碼"), Some("lotto649"));
        assert_eq!(game_id_for("威力彩"), Some("power638"));
        assert_eq!(game_id_for("三星彩"), Some("digit3"));
        assert_eq!(game_id_for("賓果賓果"), None);
    }

    #[test]
    fn test_parse_power_record_with_second_zone() {
        let r = record(&[
            "威力彩", "113000001", "113/01/04", "2024/01/04", "1000", "2000", "05", "12", "19", "24", "30", "38", "7",
        ]);
        let draw = parse_record(&r).unwrap().unwrap();
        assert_eq!(draw.game, "power638");
        assert_eq!(draw.date, "2024-01-04");
        assert_eq!(draw.numbers, vec![5, 12, 19, 24, 30, 38]);
        assert_eq!(draw.secondary, Some(7));
    }

    #[test]
    fn test_parse_digit_record_keeps_order() {
        let r = record(&["3星彩", "113000010", "113/01/12", "", "", "", "7", "0", "7"]);
        let draw = parse_record(&r).unwrap().unwrap();
        assert_eq!(draw.game, "digit3");
        assert_eq!(draw.numbers, vec![7, 0, 7]);
        assert_eq!(draw.secondary, None);
    }

    #[test]
    fn test_parse_record_rejects_bad_draws() {
        // Numéro hors limites pour 今彩539
        let r = record(&["今彩539", "113000002", "113/01/05", "", "", "", "1", "2", "3", "4", "40"]);
        assert!(parse_record(&r).is_err());
        // Pas assez de numéros
        let r = record(&["今彩539", "113000003", "113/01/06", "", "", "", "1", "2"]);
        assert!(parse_record(&r).is_err());
    }

    #[test]
    fn test_unsupported_game_is_skipped() {
        let r = record(&["雙贏彩", "113000001", "113/01/04", "", "", "", "1", "2"]);
        assert!(parse_record(&r).unwrap().is_none());
    }

    #[test]
    fn test_import_csv_end_to_end() {
        let path = std::env::temp_dir().join(format!("elan-import-{}.csv", std::process::id()));
        let csv = "\
遊戲名稱,期別,開獎日期,銷售總額,銷售注數,總獎金,獎號1,獎號2,獎號3,獎號4,獎號5,獎號6,特別號
大樂透,113000001,113/01/02,0,0,0,3,11,17,25,38,41,9
大樂透,113000002,113/01/05,0,0,0,1,2,3,4,5,6,49
大樂透,113000002,113/01/05,0,0,0,1,2,3,4,5,6,49
賓果賓果,113000001,113/01/02,0,0,0,1,2,3
今彩539,113000001,113/01/02,0,0,0,1,1,3,4,5
";
        std::fs::write(&path, csv).unwrap();

        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let result = import_csv(&conn, &path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(result.total_records, 5);
        assert_eq!(result.inserted, 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.unsupported, 1);
        assert_eq!(result.errors, 1);

        assert_eq!(count_draws(&conn, "lotto649").unwrap(), 2);
        let last = fetch_last_draws(&conn, "lotto649", 1).unwrap();
        assert_eq!(last[0].period, "113000002");
        assert_eq!(last[0].secondary, Some(49));
    }
}

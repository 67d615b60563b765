use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

use crate::models::DrawRecord;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS draws (
    game       TEXT NOT NULL,
    period     TEXT NOT NULL,
    date       TEXT NOT NULL,
    numbers    TEXT NOT NULL,
    secondary  INTEGER,
    PRIMARY KEY (game, period)
);
CREATE INDEX IF NOT EXISTS idx_draws_game_date ON draws (game, date DESC);
";

pub fn db_path() -> std::path::PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push("elan.db");
    path
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Impossible de créer le répertoire {:?}", parent))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Impossible d'ouvrir la base {:?}", path))?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA).context("Échec de la migration")?;
    Ok(())
}

fn encode_numbers(numbers: &[u8]) -> String {
    numbers
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_numbers(raw: &str) -> rusqlite::Result<Vec<u8>> {
    raw.split_whitespace()
        .map(|s| {
            s.parse::<u8>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
            })
        })
        .collect()
}

pub fn insert_draw(conn: &Connection, draw: &DrawRecord) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO draws (game, period, date, numbers, secondary)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                draw.game,
                draw.period,
                draw.date,
                encode_numbers(&draw.numbers),
                draw.secondary,
            ],
        )
        .context("Échec de l'insertion")?;
    Ok(changed > 0)
}

/// Derniers tirages d'un jeu, du plus récent au plus ancien.
pub fn fetch_last_draws(conn: &Connection, game: &str, limit: u32) -> Result<Vec<DrawRecord>> {
    let mut stmt = conn.prepare(
        "SELECT game, period, date, numbers, secondary
         FROM draws WHERE game = ?1 ORDER BY date DESC, period DESC LIMIT ?2",
    )?;
    let draws = stmt
        .query_map(rusqlite::params![game, limit], |row| {
            let raw: String = row.get(3)?;
            Ok(DrawRecord {
                game: row.get(0)?,
                period: row.get(1)?,
                date: row.get(2)?,
                numbers: decode_numbers(&raw)?,
                secondary: row.get::<_, Option<u8>>(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(draws)
}

pub fn count_draws(conn: &Connection, game: &str) -> Result<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM draws WHERE game = ?1",
        [game],
        |row| row.get(0),
    )?;
    Ok(count)
}

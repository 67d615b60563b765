use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use crate::import::ImportResult;
use elan_db::models::{DrawRecord, GameShape};
use elan_engine::scoring::ShapeScores;
use elan_engine::selection::{Recommendation, SelectionResult};

fn join_numbers(values: &[u8], sep: &str) -> String {
    values
        .iter()
        .map(|n| format!("{:2}", n))
        .collect::<Vec<_>>()
        .join(sep)
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn display_draws(draws: &[DrawRecord], shape: &GameShape) {
    if draws.is_empty() {
        println!("Aucun tirage à afficher.");
        return;
    }

    let second_label = if shape.secondary_max.is_some() {
        "2e zone"
    } else {
        "Spécial"
    };
    let mut table = new_table(vec!["Date", "Période", "Numéros", second_label]);

    for draw in draws {
        let numbers = if shape.is_digit() {
            join_numbers(&draw.numbers, " | ")
        } else {
            let mut sorted = draw.numbers.clone();
            sorted.sort_unstable();
            join_numbers(&sorted, " - ")
        };
        let second = draw
            .secondary
            .map(|s| format!("{:2}", s))
            .unwrap_or_else(|| "—".to_string());
        table.add_row(vec![&draw.date, &draw.period, &numbers, &second]);
    }

    println!("{table}");
}

pub fn display_import_summary(result: &ImportResult) {
    println!("Import terminé :");
    println!("  Total lignes lues : {}", result.total_records);
    println!("  Insérés           : {}", result.inserted);
    println!("  Doublons ignorés  : {}", result.skipped);
    if result.unsupported > 0 {
        println!("  Jeux non gérés    : {}", result.unsupported);
    }
    if result.errors > 0 {
        println!("  Erreurs           : {}", result.errors);
    }
}

fn trend_color(trend: f64) -> Color {
    if trend >= 80.0 {
        Color::Green
    } else if trend <= 30.0 {
        Color::Red
    } else {
        Color::White
    }
}

pub fn display_scores(scores: &ShapeScores, window: u32) {
    println!("\n📈 Tendances sur les {} derniers tirages ({})\n", window, scores.shape.id);

    for slice_scores in scores.slices.values() {
        println!(
            "── {} (rétrécissement {:.3}, {} tirages) ──",
            slice_scores.slice, slice_scores.shrinkage, slice_scores.draws_used
        );
        let mut table = new_table(vec!["Numéro", "Tendance", "Momentum"]);

        let mut rows: Vec<(u8, f64, f64)> = slice_scores
            .trend
            .iter()
            .map(|(&n, &t)| (n, t, slice_scores.momentum.get(&n).copied().unwrap_or(0.0)))
            .collect();
        rows.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        for (n, trend, momentum) in rows {
            table.add_row(vec![
                Cell::new(format!("{:2}", n)),
                Cell::new(format!("{:.0}", trend)).fg(trend_color(trend)),
                Cell::new(format!("{:+.4}", momentum)),
            ]);
        }
        println!("{table}");
    }
}

pub fn display_results(results: &[SelectionResult]) {
    let mut table = new_table(vec!["#", "Numéros", "2e zone", "État", "Justification"]);

    for (i, r) in results.iter().enumerate() {
        let index = r.metadata.set_index.unwrap_or(i) + 1;
        let numbers = join_numbers(&r.main_values(), " - ");
        let second = r
            .secondary_value()
            .map(|s| format!("{:2}", s))
            .unwrap_or_else(|| "—".to_string());
        let state = match r.metadata.degradation_reason {
            Some(reason) => Cell::new(format!("dégradé ({reason})")).fg(Color::Yellow),
            None => Cell::new("ok").fg(Color::Green),
        };
        table.add_row(vec![
            Cell::new(index),
            Cell::new(numbers),
            Cell::new(second),
            state,
            Cell::new(&r.rationale),
        ]);
    }
    println!("{table}");

    for r in results {
        for w in &r.metadata.warnings {
            println!("⚠ {w}");
        }
    }
}

pub fn display_provenance(result: &SelectionResult) {
    let mut table = new_table(vec!["Valeur", "Origine"]);
    for picked in &result.numbers {
        table.add_row(vec![format!("{:2}", picked.value), picked.tag.to_string()]);
    }
    println!("{table}");
}

pub fn display_recommendation(recommendation: &Recommendation) {
    match recommendation {
        Recommendation::Empty { code, message } => {
            println!("Aucune recommandation ({code}) : {message}");
        }
        Recommendation::Single(result) => {
            println!("\n🎯 Recommandation ({})\n", result.metadata.strategy);
            display_results(std::slice::from_ref(result));
            display_provenance(result);
        }
        Recommendation::Batch(results) => {
            let strategy = results
                .first()
                .map(|r| r.metadata.strategy.to_string())
                .unwrap_or_default();
            println!("\n🎲 Paquet de {} grilles ({strategy})\n", results.len());
            display_results(results);
        }
    }
}

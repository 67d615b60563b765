mod display;
mod import;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::display::{display_draws, display_import_summary, display_recommendation, display_results, display_scores};
use elan_db::db::{count_draws, db_path, fetch_last_draws, migrate, open_db};
use elan_db::models::GameShape;
use elan_db::rusqlite::Connection;
use elan_engine::{CombinationSpec, Engine, EngineConfig, ExclusionSpec, Recommendation, Request, Strategy};

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum Mode {
    /// Rejeu déterministe des meilleures tendances
    #[default]
    Strict,
    /// Tirage pondéré par le momentum
    Random,
    /// Paquet autour de la meilleure grille
    PackLocked,
    /// Paquet diversifié (produit cartésien classé)
    PackDiverse,
}

impl From<Mode> for Strategy {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Strict => Strategy::Replay,
            Mode::Random => Strategy::Weighted,
            Mode::PackLocked => Strategy::PackLocked,
            Mode::PackDiverse => Strategy::PackDiverse,
        }
    }
}

#[derive(Parser)]
#[command(name = "elan", about = "Tendances et sélection de grilles pour les loteries taïwanaises")]
struct Cli {
    /// Journalisation détaillée (équivaut à RUST_LOG=debug pour elan)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Importer les tirages depuis l'export CSV officiel
    Import {
        /// Chemin vers le fichier CSV
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Afficher le chemin de la base de données
    DbPath,

    /// Lister les derniers tirages d'un jeu
    List {
        /// Jeu (lotto649, power638, daily539, digit3, digit4)
        #[arg(short, long, default_value = "lotto649")]
        game: String,

        /// Nombre de tirages à afficher
        #[arg(short, long, default_value = "10")]
        last: u32,
    },

    /// Afficher les scores de tendance par tranche
    Scores {
        #[arg(short, long, default_value = "lotto649")]
        game: String,

        /// Fenêtre d'analyse (nombre de tirages)
        #[arg(short, long, default_value = "300")]
        window: u32,
    },

    /// Recommander une ou plusieurs grilles
    Recommend {
        #[arg(short, long, default_value = "lotto649")]
        game: String,

        #[arg(short, long, default_value = "strict")]
        mode: Mode,

        /// Index de la grille dans la série (modes strict et random)
        #[arg(short, long, default_value = "0")]
        index: usize,

        /// Nombre de grilles de la série, à partir de l'index 0 (modes strict et random)
        #[arg(short, long)]
        tickets: Option<usize>,

        /// Taille du paquet (modes pack-*)
        #[arg(short, long, default_value = "5")]
        count: usize,

        /// Seed pour la reproductibilité
        #[arg(long)]
        seed: Option<u64>,

        /// Numéros exclus (ex: 1,2,3)
        #[arg(short, long, value_delimiter = ',')]
        exclude: Vec<u8>,

        /// Combinaison exclue (ex: 1-2-3-4-5-6), répétable
        #[arg(long = "exclude-combo")]
        exclude_combo: Vec<String>,

        /// Fichier JSON des grilles déjà jouées ([[1,2,3,4,5,6], ...])
        #[arg(long)]
        history: Option<PathBuf>,

        /// Fichier JSON de configuration du moteur
        #[arg(long)]
        config: Option<PathBuf>,

        /// Sortie JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("warn,elan_engine=debug,elan_db=debug,elan_cli=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let path = db_path();
    let conn = open_db(&path)?;
    migrate(&conn)?;

    match cli.command {
        Command::Import { file } => cmd_import(&conn, &file),
        Command::DbPath => {
            println!("{}", path.display());
            Ok(())
        }
        Command::List { game, last } => cmd_list(&conn, &game, last),
        Command::Scores { game, window } => cmd_scores(&conn, &game, window),
        Command::Recommend {
            game,
            mode,
            index,
            tickets,
            count,
            seed,
            exclude,
            exclude_combo,
            history,
            config,
            json,
        } => {
            let request = Request {
                shape: parse_game(&game)?,
                strategy: mode.into(),
                set_index: index,
                target_count: count,
                exclusions: ExclusionSpec {
                    numbers: exclude,
                    combinations: exclude_combo.into_iter().map(CombinationSpec::Signature).collect(),
                },
                history: match &history {
                    Some(p) => load_history(p)?,
                    None => Vec::new(),
                },
                seed,
            };
            cmd_recommend(&conn, &request, tickets, config.as_deref(), json)
        }
    }
}

fn parse_game(id: &str) -> Result<GameShape> {
    match GameShape::by_id(id) {
        Some(shape) => Ok(shape),
        None => {
            let known: Vec<String> = GameShape::catalogue().into_iter().map(|s| s.id).collect();
            bail!("Jeu inconnu : '{}' (jeux disponibles : {})", id, known.join(", "))
        }
    }
}

fn load_history(path: &Path) -> Result<Vec<Vec<u8>>> {
    let json = std::fs::read_to_string(path).with_context(|| format!("Impossible de lire {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Historique JSON invalide : {}", path.display()))
}

fn empty_db_hint(game: &str) {
    println!("Aucun tirage pour {game}. Lancez d'abord : elan import --file <export.csv>");
}

fn cmd_import(conn: &Connection, file: &Path) -> Result<()> {
    let result = import::import_csv(conn, file)?;
    display_import_summary(&result);
    Ok(())
}

fn cmd_list(conn: &Connection, game: &str, last: u32) -> Result<()> {
    let shape = parse_game(game)?;
    if count_draws(conn, &shape.id)? == 0 {
        empty_db_hint(&shape.id);
        return Ok(());
    }
    let draws = fetch_last_draws(conn, &shape.id, last)?;
    display_draws(&draws, &shape);
    Ok(())
}

fn cmd_scores(conn: &Connection, game: &str, window: u32) -> Result<()> {
    let shape = parse_game(game)?;
    let n = count_draws(conn, &shape.id)?;
    if n == 0 {
        empty_db_hint(&shape.id);
        return Ok(());
    }
    let effective_window = window.min(n);
    let draws = fetch_last_draws(conn, &shape.id, effective_window)?;
    let scores = Engine::default().scores(&draws, &shape)?;
    display_scores(&scores, effective_window);
    Ok(())
}

fn cmd_recommend(
    conn: &Connection,
    request: &Request,
    tickets: Option<usize>,
    config: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = match config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let limit = u32::try_from(config.scoring.max_history).unwrap_or(u32::MAX);
    let engine = Engine::new(config)?;

    let draws = fetch_last_draws(conn, &request.shape.id, limit)?;
    debug!(game = %request.shape.id, draws = draws.len(), "tirages chargés");

    match tickets {
        Some(len) if request.strategy.is_single() => {
            let series = engine.recommend_series(&draws, request, len)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&series)?);
            } else if series.is_empty() {
                println!("Aucune recommandation : historique insuffisant pour {}.", request.shape.id);
            } else {
                display_results(&series);
            }
        }
        _ => {
            let recommendation = engine.recommend(&draws, request)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&recommendation)?);
            } else {
                display_recommendation(&recommendation);
            }
            if let Recommendation::Empty { .. } = recommendation {
                empty_db_hint(&request.shape.id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_recommend() {
        let cli = Cli::try_parse_from([
            "elan",
            "recommend",
            "--game",
            "power638",
            "--mode",
            "pack-diverse",
            "--exclude",
            "1,2,3",
            "--exclude-combo",
            "1-2-3-4-5-6",
            "--exclude-combo",
            "7-8-9-10-11-12",
            "--seed",
            "7",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Recommend {
                game,
                mode,
                exclude,
                exclude_combo,
                seed,
                ..
            } => {
                assert_eq!(game, "power638");
                assert_eq!(Strategy::from(mode), Strategy::PackDiverse);
                assert_eq!(exclude, vec![1, 2, 3]);
                assert_eq!(exclude_combo.len(), 2);
                assert_eq!(seed, Some(7));
            }
            _ => panic!("commande recommend attendue"),
        }
    }

    #[test]
    fn test_parse_game() {
        assert_eq!(parse_game("digit4").unwrap().count, 4);
        let err = parse_game("keno").unwrap_err().to_string();
        assert!(err.contains("lotto649"));
    }

    #[test]
    fn test_load_history() {
        let path = std::env::temp_dir().join(format!("elan-history-{}.json", std::process::id()));
        std::fs::write(&path, "[[1,2,3,4,5,6],[7,8,9,10,11,12]]").unwrap();
        let history = load_history(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1][0], 7);
    }
}

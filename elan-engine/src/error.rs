use elan_db::models::Slice;
use thiserror::Error;

/// Erreurs fatales : aucune grille ne peut être produite honnêtement.
///
/// Les dépassements de budget de tentatives ne passent jamais par ici ; ils
/// sont signalés par `Metadata::degraded` sur un résultat valide.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error(
        "Candidats insuffisants ({slice}) : {needed} requis, {available} disponibles après exclusions. \
         Réduisez la liste d'exclusions."
    )]
    InsufficientCandidates {
        slice: Slice,
        needed: usize,
        available: usize,
    },

    #[error(
        "Aucun historique pour la {slice} du jeu {game}. \
         Vérifiez l'import des tirages ou réduisez les exclusions."
    )]
    MissingHistory { game: String, slice: Slice },

    #[error("Le jeu {game} n'a pas de {slice}")]
    UnsupportedSlice { game: String, slice: Slice },

    #[error("Configuration invalide : {0}")]
    InvalidConfig(String),

    #[error("Stratégie {strategy} incompatible avec une série de grilles")]
    SeriesNotSupported { strategy: String },
}

pub type EngineResult<T> = Result<T, EngineError>;

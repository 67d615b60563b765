use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use elan_db::models::{DrawRecord, GameShape};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::pool::{ExclusionSet, ExclusionSpec};
use crate::rng::SelectionRng;
use crate::scoring::{order_newest_first, score_shape, ShapeScores};
use crate::selection::packager::{pack_diverse, pack_locked};
use crate::selection::replay::{replay, replay_series};
use crate::selection::stochastic::{sample, sample_series};
use crate::selection::{Recommendation, SelectionContext, SelectionResult, Strategy};

/// Une demande de recommandation. Les champs absents prennent leur valeur
/// par défaut à la désérialisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    pub shape: GameShape,
    pub strategy: Strategy,
    pub set_index: usize,
    /// Taille des paquets (stratégies `pack_*`).
    pub target_count: usize,
    pub exclusions: ExclusionSpec,
    /// Grilles déjà jouées, la plus ancienne d'abord.
    pub history: Vec<Vec<u8>>,
    /// `None` : graine tirée de l'entropie du système.
    pub seed: Option<u64>,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            shape: GameShape::lotto649(),
            strategy: Strategy::Replay,
            set_index: 0,
            target_count: 5,
            exclusions: ExclusionSpec::default(),
            history: Vec::new(),
            seed: None,
        }
    }
}

impl Request {
    pub fn new(shape: GameShape, strategy: Strategy) -> Self {
        Self {
            shape,
            strategy,
            ..Self::default()
        }
    }
}

/// Point d'entrée du moteur. Ne contient que la configuration, immuable :
/// un même `Engine` peut servir plusieurs threads.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Tables de scores par tranche, pour l'affichage.
    pub fn scores(&self, draws: &[DrawRecord], shape: &GameShape) -> EngineResult<ShapeScores> {
        validate_shape(shape)?;
        let ordered = order_newest_first(draws);
        score_shape(&ordered, shape, &self.config.scoring)
    }

    pub fn recommend(&self, draws: &[DrawRecord], request: &Request) -> EngineResult<Recommendation> {
        validate_shape(&request.shape)?;
        let ordered = order_newest_first(draws);
        if let Some(message) = self.insufficient_data(ordered.len(), &request.shape) {
            info!(game = %request.shape.id, draws = ordered.len(), "historique insuffisant");
            return Ok(Recommendation::insufficient_data(message));
        }

        let scores = score_shape(&ordered, &request.shape, &self.config.scoring)?;
        let exclusions = self.exclusions(request);
        let ctx = SelectionContext {
            shape: &request.shape,
            scores: &scores,
            exclusions: &exclusions,
            history: &request.history,
            config: &self.config,
        };
        let mut rng = SelectionRng::new(request.seed);

        let recommendation = match request.strategy {
            Strategy::Replay => Recommendation::Single(replay(&ctx, request.set_index)?),
            Strategy::Weighted => Recommendation::Single(sample(&ctx, request.set_index, &mut rng)?),
            Strategy::PackLocked => Recommendation::Batch(pack_locked(&ctx, request.target_count)?),
            Strategy::PackDiverse => {
                Recommendation::Batch(pack_diverse(&ctx, request.target_count, &mut rng)?)
            }
        };

        let results = recommendation.results();
        info!(
            game = %request.shape.id,
            strategy = %request.strategy,
            tickets = results.len(),
            degraded = results.iter().filter(|r| r.metadata.degraded).count(),
            "recommandation produite"
        );
        Ok(recommendation)
    }

    /// Les `len` premières grilles d'une stratégie à grille unique ;
    /// l'élément `i` est identique à `recommend` avec `set_index = i`.
    /// Un historique insuffisant donne une série vide.
    pub fn recommend_series(
        &self,
        draws: &[DrawRecord],
        request: &Request,
        len: usize,
    ) -> EngineResult<Vec<SelectionResult>> {
        if !request.strategy.is_single() {
            return Err(EngineError::SeriesNotSupported {
                strategy: request.strategy.to_string(),
            });
        }
        validate_shape(&request.shape)?;
        let ordered = order_newest_first(draws);
        if self.insufficient_data(ordered.len(), &request.shape).is_some() {
            info!(game = %request.shape.id, draws = ordered.len(), "historique insuffisant, série vide");
            return Ok(Vec::new());
        }

        let scores = score_shape(&ordered, &request.shape, &self.config.scoring)?;
        let exclusions = self.exclusions(request);
        let ctx = SelectionContext {
            shape: &request.shape,
            scores: &scores,
            exclusions: &exclusions,
            history: &request.history,
            config: &self.config,
        };

        let series = match request.strategy {
            Strategy::Weighted => sample_series(&ctx, len, &mut SelectionRng::new(request.seed))?,
            _ => replay_series(&ctx, len)?,
        };
        info!(game = %request.shape.id, strategy = %request.strategy, len, "série produite");
        Ok(series)
    }

    fn insufficient_data(&self, available: usize, shape: &GameShape) -> Option<String> {
        let required = self.config.scoring.min_draws_for(shape);
        if available == 0 || available < required {
            Some(format!(
                "{available} tirage(s) disponible(s) pour {}, {required} requis",
                shape.id
            ))
        } else {
            None
        }
    }

    fn exclusions(&self, request: &Request) -> ExclusionSet {
        let set = ExclusionSet::from_spec(&request.exclusions, request.shape.is_digit());
        debug!(
            numbers = set.numbers().len(),
            combinations = set.combination_count(),
            "exclusions normalisées"
        );
        set
    }
}

fn validate_shape(shape: &GameShape) -> EngineResult<()> {
    if shape.count == 0 || shape.min > shape.max {
        return Err(EngineError::InvalidConfig(format!(
            "jeu {} mal défini ({}-{}, {} numéros)",
            shape.id, shape.min, shape.max, shape.count
        )));
    }
    if shape.secondary_max == Some(0) {
        return Err(EngineError::InvalidConfig(format!(
            "deuxième zone vide pour {}",
            shape.id
        )));
    }
    Ok(())
}

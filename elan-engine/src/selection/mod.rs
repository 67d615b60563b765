pub mod packager;
pub mod replay;
pub mod stochastic;

use std::fmt;

use serde::{Deserialize, Serialize};

use elan_db::models::GameShape;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::pool::ExclusionSet;
use crate::scoring::ShapeScores;

/// Stratégie de sélection demandée.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Mode strict : rejeu déterministe.
    #[default]
    Replay,
    /// Mode aléatoire : tirage pondéré par les scores.
    Weighted,
    PackLocked,
    PackDiverse,
}

impl Strategy {
    /// Les stratégies à grille unique, adressables par index.
    pub fn is_single(&self) -> bool {
        matches!(self, Strategy::Replay | Strategy::Weighted)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Replay => write!(f, "strict"),
            Strategy::Weighted => write!(f, "aléatoire"),
            Strategy::PackLocked => write!(f, "pack verrouillé"),
            Strategy::PackDiverse => write!(f, "pack diversifié"),
        }
    }
}

/// Origine d'un numéro choisi, avec son score de tendance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProvenanceTag {
    Trend { score: u8 },
    Sampled { score: u8 },
    Secondary { score: u8 },
    Position { position: usize, score: u8 },
    Locked { score: u8 },
    Sweep { score: u8 },
    SafeMode,
}

impl ProvenanceTag {
    pub fn is_secondary(&self) -> bool {
        matches!(self, ProvenanceTag::Secondary { .. })
    }
}

impl fmt::Display for ProvenanceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvenanceTag::Trend { score } => write!(f, "tendance {score}"),
            ProvenanceTag::Sampled { score } => write!(f, "tirage pondéré (tendance {score})"),
            ProvenanceTag::Secondary { score } => write!(f, "deuxième zone (tendance {score})"),
            ProvenanceTag::Position { position, score } => {
                write!(f, "position {} (tendance {score})", position + 1)
            }
            ProvenanceTag::Locked { score } => write!(f, "verrouillé (tendance {score})"),
            ProvenanceTag::Sweep { score } => write!(f, "balayage (tendance {score})"),
            ProvenanceTag::SafeMode => write!(f, "mode sûr"),
        }
    }
}

/// Score de tendance arrondi pour l'affichage.
pub fn trend_u8(score: f64) -> u8 {
    score.round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickedNumber {
    pub value: u8,
    pub tag: ProvenanceTag,
}

/// Raison machine d'une dégradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationReason {
    ExcludeLimit,
    OverlapLimit,
    DedupLimit,
    RandomRetryLimit,
    InsufficientCombinations,
    CartesianSafeMode,
}

impl fmt::Display for DegradationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DegradationReason::ExcludeLimit => "exclude_limit",
            DegradationReason::OverlapLimit => "overlap_limit",
            DegradationReason::DedupLimit => "dedup_limit",
            DegradationReason::RandomRetryLimit => "random_retry_limit",
            DegradationReason::InsufficientCombinations => "insufficient_combinations",
            DegradationReason::CartesianSafeMode => "cartesian_safe_mode",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub strategy: Strategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_index: Option<usize>,
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation_reason: Option<DegradationReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<usize>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Metadata {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            set_index: None,
            degraded: false,
            degradation_reason: None,
            attempts: None,
            warnings: Vec::new(),
        }
    }

    pub fn degrade(&mut self, reason: DegradationReason) {
        self.degraded = true;
        self.degradation_reason = Some(reason);
    }
}

/// Une grille produite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub numbers: Vec<PickedNumber>,
    pub rationale: String,
    pub metadata: Metadata,
}

impl SelectionResult {
    pub fn values(&self) -> Vec<u8> {
        self.numbers.iter().map(|p| p.value).collect()
    }

    /// Zone principale (ou positions), sans la deuxième zone.
    pub fn main_values(&self) -> Vec<u8> {
        self.numbers
            .iter()
            .filter(|p| !p.tag.is_secondary())
            .map(|p| p.value)
            .collect()
    }

    pub fn secondary_value(&self) -> Option<u8> {
        self.numbers.iter().find(|p| p.tag.is_secondary()).map(|p| p.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Recommendation {
    Single(SelectionResult),
    Batch(Vec<SelectionResult>),
    /// Historique trop court : rien n'est recommandé.
    Empty { code: String, message: String },
}

impl Recommendation {
    pub fn insufficient_data(message: impl Into<String>) -> Self {
        Recommendation::Empty {
            code: "insufficient_data".to_string(),
            message: message.into(),
        }
    }

    pub fn results(&self) -> &[SelectionResult] {
        match self {
            Recommendation::Single(r) => std::slice::from_ref(r),
            Recommendation::Batch(rs) => rs,
            Recommendation::Empty { .. } => &[],
        }
    }
}

/// Tout ce dont une stratégie a besoin, emprunté pour la durée d'un appel.
pub struct SelectionContext<'a> {
    pub shape: &'a GameShape,
    pub scores: &'a ShapeScores,
    pub exclusions: &'a ExclusionSet,
    /// Grilles déjà jouées (zone principale ou positions), la plus ancienne d'abord.
    pub history: &'a [Vec<u8>],
    pub config: &'a EngineConfig,
}

/// Nombre de valeurs communes à deux combinaisons.
pub fn shared_count(a: &[u8], b: &[u8]) -> usize {
    a.iter().filter(|n| b.contains(n)).count()
}

/// Nombre de positions où deux grilles numériques portent le même chiffre.
pub fn positional_matches(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).filter(|(x, y)| x == y).count()
}

/// Longueur de la série à générer pour atteindre la grille `set_index`.
pub(crate) fn series_len(set_index: usize) -> EngineResult<usize> {
    set_index
        .checked_add(1)
        .ok_or_else(|| EngineError::InvalidConfig(format!("index de grille hors limites : {set_index}")))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::scoring::fixtures::make_draws;
    use crate::scoring::score_shape;

    /// Données possédées derrière un `SelectionContext` de test.
    pub struct Scenario {
        pub shape: GameShape,
        pub scores: ShapeScores,
        pub exclusions: ExclusionSet,
        pub history: Vec<Vec<u8>>,
        pub config: EngineConfig,
    }

    impl Scenario {
        pub fn new(shape: GameShape) -> Self {
            let config = EngineConfig::default();
            let draws = make_draws(&shape, 80);
            let scores = score_shape(&draws, &shape, &config.scoring).unwrap();
            Self {
                shape,
                scores,
                exclusions: ExclusionSet::empty(),
                history: Vec::new(),
                config,
            }
        }

        pub fn exclude<C: AsRef<[u8]>>(mut self, numbers: &[u8], combinations: &[C]) -> Self {
            self.exclusions = ExclusionSet::new(
                numbers.iter().copied(),
                combinations.iter().map(|c| c.as_ref().to_vec()),
                self.shape.is_digit(),
            );
            self
        }

        pub fn ctx(&self) -> SelectionContext<'_> {
            SelectionContext {
                shape: &self.shape,
                scores: &self.scores,
                exclusions: &self.exclusions,
                history: &self.history,
                config: &self.config,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(values: &[(u8, ProvenanceTag)]) -> SelectionResult {
        SelectionResult {
            numbers: values
                .iter()
                .map(|(v, t)| PickedNumber { value: *v, tag: t.clone() })
                .collect(),
            rationale: String::new(),
            metadata: Metadata::new(Strategy::Replay),
        }
    }

    #[test]
    fn test_main_and_secondary_values() {
        let r = result(&[
            (3, ProvenanceTag::Trend { score: 98 }),
            (17, ProvenanceTag::Trend { score: 80 }),
            (5, ProvenanceTag::Secondary { score: 90 }),
        ]);
        assert_eq!(r.values(), vec![3, 17, 5]);
        assert_eq!(r.main_values(), vec![3, 17]);
        assert_eq!(r.secondary_value(), Some(5));
    }

    #[test]
    fn test_overlap_helpers() {
        assert_eq!(shared_count(&[1, 2, 3, 4], &[4, 3, 9, 10]), 2);
        assert_eq!(positional_matches(&[1, 2, 3], &[3, 2, 1]), 1);
    }

    #[test]
    fn test_result_serialization_shape() {
        let mut r = result(&[(7, ProvenanceTag::Position { position: 0, score: 64 })]);
        r.metadata.set_index = Some(2);
        r.metadata.degrade(DegradationReason::OverlapLimit);
        let json = serde_json::to_value(&r).unwrap();

        assert_eq!(json["numbers"][0]["value"], 7);
        assert_eq!(json["numbers"][0]["tag"]["kind"], "position");
        assert_eq!(json["metadata"]["strategy"], "replay");
        assert_eq!(json["metadata"]["set_index"], 2);
        assert_eq!(json["metadata"]["degradation_reason"], "overlap_limit");
        assert!(json["metadata"].get("attempts").is_none());
    }

    #[test]
    fn test_empty_recommendation() {
        let rec = Recommendation::insufficient_data("trop peu de tirages");
        assert!(rec.results().is_empty());
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["kind"], "empty");
        assert_eq!(json["data"]["code"], "insufficient_data");
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(ProvenanceTag::Position { position: 1, score: 75 }.to_string(), "position 2 (tendance 75)");
        assert_eq!(DegradationReason::CartesianSafeMode.to_string(), "cartesian_safe_mode");
        assert_eq!(trend_u8(97.6), 98);
    }
}

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use elan_db::models::Slice;

use crate::error::{EngineError, EngineResult};
use crate::scoring::ScoreTable;

/// Signature canonique d'une grille : triée pour les combinaisons,
/// dans l'ordre des positions pour les jeux numériques.
pub fn signature(values: &[u8], ordered: bool) -> String {
    let mut v = values.to_vec();
    if !ordered {
        v.sort_unstable();
    }
    v.iter().map(|n| n.to_string()).collect::<Vec<_>>().join("-")
}

/// Combinaison exclue telle que fournie par l'appelant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CombinationSpec {
    Values(Vec<u8>),
    Signature(String),
}

impl CombinationSpec {
    fn values(&self) -> Option<Vec<u8>> {
        match self {
            CombinationSpec::Values(v) => Some(v.clone()),
            CombinationSpec::Signature(s) => s
                .split(|c: char| c == '-' || c == ',' || c.is_whitespace())
                .filter(|p| !p.is_empty())
                .map(|p| p.parse::<u8>().ok())
                .collect(),
        }
    }
}

/// Exclusions telles que reçues (listes ou ensembles, doublons permis).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionSpec {
    pub numbers: Vec<u8>,
    pub combinations: Vec<CombinationSpec>,
}

impl ExclusionSpec {
    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty() && self.combinations.is_empty()
    }
}

/// Exclusions normalisées, en lecture seule pendant la sélection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    numbers: BTreeSet<u8>,
    combinations: HashSet<String>,
    ordered: bool,
}

impl ExclusionSet {
    pub fn new<N, C, V>(numbers: N, combinations: C, ordered: bool) -> Self
    where
        N: IntoIterator<Item = u8>,
        C: IntoIterator<Item = V>,
        V: AsRef<[u8]>,
    {
        Self {
            numbers: numbers.into_iter().collect(),
            combinations: combinations
                .into_iter()
                .map(|c| signature(c.as_ref(), ordered))
                .collect(),
            ordered,
        }
    }

    /// Les signatures illisibles sont ignorées (journalisées).
    pub fn from_spec(spec: &ExclusionSpec, ordered: bool) -> Self {
        let combinations: Vec<Vec<u8>> = spec
            .combinations
            .iter()
            .filter_map(|c| {
                let values = c.values();
                if values.is_none() {
                    debug!(?c, "combinaison exclue illisible, ignorée");
                }
                values
            })
            .collect();
        Self::new(spec.numbers.iter().copied(), combinations, ordered)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains_number(&self, n: u8) -> bool {
        self.numbers.contains(&n)
    }

    pub fn contains_combination(&self, values: &[u8]) -> bool {
        !self.combinations.is_empty() && self.combinations.contains(&signature(values, self.ordered))
    }

    pub fn numbers(&self) -> &BTreeSet<u8> {
        &self.numbers
    }

    pub fn combination_count(&self) -> usize {
        self.combinations.len()
    }
}

/// Numéros éligibles triés par score décroissant, ex-aequo par numéro croissant.
pub fn ranked_eligible(scores: &ScoreTable, exclusions: &ExclusionSet) -> Vec<u8> {
    let mut eligible: Vec<(u8, f64)> = scores
        .iter()
        .filter(|(n, _)| !exclusions.contains_number(**n))
        .map(|(&n, &s)| (n, s))
        .collect();
    eligible.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    eligible.into_iter().map(|(n, _)| n).collect()
}

/// Les `k` meilleurs numéros éligibles ; erreur s'il en reste moins de `k`.
pub fn top_k(scores: &ScoreTable, k: usize, exclusions: &ExclusionSet, slice: Slice) -> EngineResult<Vec<u8>> {
    let mut ranked = ranked_eligible(scores, exclusions);
    if ranked.len() < k {
        return Err(EngineError::InsufficientCandidates {
            slice,
            needed: k,
            available: ranked.len(),
        });
    }
    ranked.truncate(k);
    Ok(ranked)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePool {
    pub numbers: Vec<u8>,
    pub warning: Option<String>,
}

/// Jusqu'à `k + buffer` numéros éligibles. Un bassin trop petit n'est pas
/// une erreur : tout ce qui reste est renvoyé, avec un avertissement.
pub fn top_k_with_buffer(
    scores: &ScoreTable,
    k: usize,
    exclusions: &ExclusionSet,
    buffer: usize,
) -> CandidatePool {
    let wanted = k + buffer;
    let mut ranked = ranked_eligible(scores, exclusions);
    let warning = if ranked.len() < wanted {
        Some(format!(
            "bassin réduit : {} candidats disponibles sur {} demandés",
            ranked.len(),
            wanted
        ))
    } else {
        ranked.truncate(wanted);
        None
    };
    CandidatePool { numbers: ranked, warning }
}

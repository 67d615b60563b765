use std::collections::HashSet;

use tracing::{debug, warn};

use elan_db::models::Slice;

use super::{
    series_len, trend_u8, DegradationReason, Metadata, PickedNumber, ProvenanceTag, SelectionContext, SelectionResult,
    Strategy,
};
use crate::error::{EngineError, EngineResult};
use crate::pool::{ranked_eligible, signature, top_k_with_buffer, ExclusionSet};
use crate::rng::SelectionRng;
use crate::scoring::normalize::mean_std;
use crate::scoring::{ScoreTable, SliceScores};

/// Candidats d'une roulette et leurs poids `exp(z - max z)`.
struct Wheel<'a> {
    values: Vec<u8>,
    weights: Vec<f64>,
    scores: &'a SliceScores,
}

impl<'a> Wheel<'a> {
    fn new(values: Vec<u8>, scores: &'a SliceScores, std_floor: f64) -> Self {
        let weights = softmax_weights(&values, &scores.momentum, std_floor);
        Self {
            values,
            weights,
            scores,
        }
    }

    /// `k` valeurs distinctes, roulette itérative sans remise.
    fn draw(&self, k: usize, rng: &mut SelectionRng) -> Vec<u8> {
        let mut values = self.values.clone();
        let mut weights = self.weights.clone();
        let mut picked = Vec::with_capacity(k);
        while picked.len() < k && !values.is_empty() {
            let idx = rng.weighted_index(&weights);
            picked.push(values.remove(idx));
            weights.remove(idx);
        }
        picked
    }

    fn draw_one(&self, rng: &mut SelectionRng) -> u8 {
        self.values[rng.weighted_index(&self.weights)]
    }
}

/// Poids `exp(z - max z)` des scores bruts (momentum rétréci).
pub fn softmax_weights(values: &[u8], momentum: &ScoreTable, std_floor: f64) -> Vec<f64> {
    let raw: Vec<f64> = values
        .iter()
        .map(|n| momentum.get(n).copied().unwrap_or(0.0))
        .collect();
    let (mean, std) = mean_std(&raw);
    let std = std.max(std_floor);
    let z: Vec<f64> = raw.iter().map(|v| (v - mean) / std).collect();
    let max_z = z.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    z.iter().map(|z| (z - max_z).exp()).collect()
}

fn degradation(exclude_hits: usize, dup_hits: usize) -> DegradationReason {
    match (exclude_hits > 0, dup_hits > 0) {
        (true, false) => DegradationReason::ExcludeLimit,
        (false, true) => DegradationReason::DedupLimit,
        _ => DegradationReason::RandomRetryLimit,
    }
}

/// La grille aléatoire d'index `set_index`. Les grilles `0..set_index` sont
/// générées avec le même générateur puis écartées.
pub fn sample(ctx: &SelectionContext, set_index: usize, rng: &mut SelectionRng) -> EngineResult<SelectionResult> {
    let mut series = sample_series(ctx, series_len(set_index)?, rng)?;
    series
        .pop()
        .ok_or_else(|| EngineError::InvalidConfig("série aléatoire vide".to_string()))
}

pub fn sample_series(ctx: &SelectionContext, len: usize, rng: &mut SelectionRng) -> EngineResult<Vec<SelectionResult>> {
    let params = &ctx.config.sampler;
    let ordered = ctx.shape.is_digit();

    // Une roulette par dimension : zone principale, ou une par position
    let mut wheels: Vec<(Wheel, usize)> = Vec::new();
    let mut warnings = Vec::new();
    if ordered {
        for (pos, scores) in ctx.scores.positions()?.into_iter().enumerate() {
            let values = ranked_eligible(&scores.momentum, ctx.exclusions);
            if values.is_empty() {
                return Err(EngineError::InsufficientCandidates {
                    slice: Slice::Digit(pos),
                    needed: 1,
                    available: 0,
                });
            }
            wheels.push((Wheel::new(values, scores, params.std_floor), 1));
        }
    } else {
        let main = ctx.scores.main()?;
        let count = ctx.shape.count;
        let pool = top_k_with_buffer(&main.momentum, count, ctx.exclusions, params.buffer);
        if pool.numbers.len() < count {
            return Err(EngineError::InsufficientCandidates {
                slice: Slice::Main,
                needed: count,
                available: pool.numbers.len(),
            });
        }
        debug!(pool = pool.numbers.len(), "bassin du tirage pondéré");
        warnings.extend(pool.warning);
        wheels.push((Wheel::new(pool.numbers, main, params.std_floor), count));
    }
    let secondary = ctx.scores.secondary().map(|scores| {
        let values = ranked_eligible(&scores.momentum, &ExclusionSet::empty());
        Wheel::new(values, scores, params.std_floor)
    });

    let mut seen: HashSet<String> = ctx.history.iter().map(|t| signature(t, ordered)).collect();
    let mut results = Vec::new();

    for set_index in 0..len {
        let (mut exclude_hits, mut dup_hits) = (0usize, 0usize);
        let mut accepted = None;
        let mut last = Vec::new();
        let mut attempts = 0;

        for attempt in 1..=params.max_attempts {
            attempts = attempt;
            let mut candidate: Vec<u8> = wheels
                .iter()
                .flat_map(|(wheel, k)| wheel.draw(*k, rng))
                .collect();
            if !ordered {
                candidate.sort_unstable();
            }
            last = candidate.clone();

            if ctx.exclusions.contains_combination(&candidate) {
                exclude_hits += 1;
                debug!(attempt, ?candidate, "tirage exclu, nouvel essai");
                continue;
            }
            if seen.contains(&signature(&candidate, ordered)) {
                dup_hits += 1;
                debug!(attempt, ?candidate, "doublon, nouvel essai");
                continue;
            }
            accepted = Some(candidate);
            break;
        }

        let mut metadata = Metadata::new(Strategy::Weighted);
        metadata.set_index = Some(set_index);
        metadata.attempts = Some(attempts);
        metadata.warnings = warnings.clone();
        let values = match accepted {
            Some(v) => v,
            None => {
                let reason = degradation(exclude_hits, dup_hits);
                warn!(?last, exclude_hits, dup_hits, %reason, "tirage pondéré dégradé");
                metadata.degrade(reason);
                last
            }
        };
        seen.insert(signature(&values, ordered));

        let mut numbers: Vec<PickedNumber> = if ordered {
            values
                .iter()
                .enumerate()
                .map(|(pos, &d)| PickedNumber {
                    value: d,
                    tag: ProvenanceTag::Position {
                        position: pos,
                        score: trend_u8(wheels[pos].0.scores.trend_of(d)),
                    },
                })
                .collect()
        } else {
            let main = &wheels[0].0;
            values
                .iter()
                .map(|&n| PickedNumber {
                    value: n,
                    tag: ProvenanceTag::Sampled {
                        score: trend_u8(main.scores.trend_of(n)),
                    },
                })
                .collect()
        };
        if let Some(wheel) = &secondary {
            let s = wheel.draw_one(rng);
            numbers.push(PickedNumber {
                value: s,
                tag: ProvenanceTag::Secondary {
                    score: trend_u8(wheel.scores.trend_of(s)),
                },
            });
        }

        let origin = match rng.seed() {
            Some(seed) => format!("graine {seed}"),
            None => "graine système".to_string(),
        };
        let mut rationale = format!(
            "Tirage pondéré, grille {} : roulette sur les scores de momentum ({origin})",
            set_index + 1
        );
        if let Some(reason) = metadata.degradation_reason {
            rationale.push_str(&format!(" [dégradé : {reason}]"));
        }
        results.push(SelectionResult {
            numbers,
            rationale,
            metadata,
        });
    }
    Ok(results)
}

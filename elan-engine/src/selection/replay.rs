//! Mode strict : la grille `i` est reconstruite en rejouant les étapes
//! `0..=i` depuis zéro, si bien qu'elle ne dépend que des entrées.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use elan_db::models::Slice;

use super::{
    positional_matches, series_len, shared_count, trend_u8, DegradationReason, Metadata, PickedNumber, ProvenanceTag,
    SelectionContext, SelectionResult, Strategy,
};
use crate::error::{EngineError, EngineResult};
use crate::pool::{ranked_eligible, top_k_with_buffer, ExclusionSet};
use crate::scoring::ScoreTable;

/// Résultat brut d'une étape de rejeu.
struct StepOutcome {
    values: Vec<u8>,
    attempts: usize,
    reason: Option<DegradationReason>,
    warning: Option<String>,
}

/// La grille d'index `set_index`.
pub fn replay(ctx: &SelectionContext, set_index: usize) -> EngineResult<SelectionResult> {
    let mut series = replay_series(ctx, series_len(set_index)?)?;
    series.pop().ok_or_else(|| EngineError::InvalidConfig("série de rejeu vide".to_string()))
}

/// Les `len` premières grilles ; l'élément `i` est identique à `replay(ctx, i)`.
pub fn replay_series(ctx: &SelectionContext, len: usize) -> EngineResult<Vec<SelectionResult>> {
    if ctx.shape.is_digit() {
        digit_series(ctx, len)
    } else {
        combination_series(ctx, len)
    }
}

fn overlap_limit(table: &[usize], step: usize) -> usize {
    table
        .get(step)
        .or_else(|| table.last())
        .copied()
        .unwrap_or(0)
}

fn penalize(scores: &mut ScoreTable, numbers: impl IntoIterator<Item = u8>, factor: f64) {
    for n in numbers {
        if let Some(s) = scores.get_mut(&n) {
            *s *= factor;
        }
    }
}

fn degradation(exclude_hits: usize, overlap_hits: usize) -> DegradationReason {
    if exclude_hits >= overlap_hits {
        DegradationReason::ExcludeLimit
    } else {
        DegradationReason::OverlapLimit
    }
}

fn combination_series(ctx: &SelectionContext, len: usize) -> EngineResult<Vec<SelectionResult>> {
    let params = &ctx.config.replay;
    let main = ctx.scores.main()?;

    // Pré-pénalité : chaque apparition dans l'historique externe compte
    let mut base = main.trend.clone();
    let mut freq: BTreeMap<u8, i32> = BTreeMap::new();
    for ticket in ctx.history {
        for &n in ticket {
            *freq.entry(n).or_default() += 1;
        }
    }
    for (n, f) in freq {
        penalize(&mut base, [n], params.next_set_penalty.powi(f));
    }

    let secondary = secondary_rotation(ctx, params.secondary_rotation)?;
    let table = ctx.config.overlap_table(ctx.shape);
    let mut running: Vec<Vec<u8>> = ctx.history.to_vec();
    let offset = ctx.history.len();
    let mut results = Vec::new();

    for step in 0..len {
        let limit = overlap_limit(&table, offset.saturating_add(step));
        let outcome = combination_step(ctx, &base, &running, limit)?;
        penalize(&mut base, outcome.values.iter().copied(), params.next_set_penalty);
        running.push(outcome.values.clone());

        let mut numbers: Vec<PickedNumber> = outcome
            .values
            .iter()
            .map(|&n| PickedNumber {
                value: n,
                tag: ProvenanceTag::Trend {
                    score: trend_u8(main.trend_of(n)),
                },
            })
            .collect();
        if let Some((values, scores)) = &secondary {
            let s = values[step % values.len()];
            numbers.push(PickedNumber {
                value: s,
                tag: ProvenanceTag::Secondary {
                    score: trend_u8(scores.trend_of(s)),
                },
            });
        }

        let rationale = format!(
            "Rejeu strict, grille {} : les {} numéros les plus en tendance après pénalités (recouvrement ≤ {})",
            step + 1,
            ctx.shape.count,
            limit
        );
        results.push(finish(numbers, rationale, step, outcome));
    }
    Ok(results)
}

/// Valeurs de deuxième zone parcourues par rotation avec l'index de grille.
fn secondary_rotation<'a>(
    ctx: &'a SelectionContext,
    rotation: usize,
) -> EngineResult<Option<(Vec<u8>, &'a crate::scoring::SliceScores)>> {
    let Some(scores) = ctx.scores.secondary() else {
        return Ok(None);
    };
    let mut ranked = ranked_eligible(&scores.trend, &ExclusionSet::empty());
    if ranked.is_empty() {
        return Err(EngineError::InsufficientCandidates {
            slice: Slice::Secondary,
            needed: 1,
            available: 0,
        });
    }
    ranked.truncate(rotation.max(1));
    Ok(Some((ranked, scores)))
}

fn combination_step(
    ctx: &SelectionContext,
    base: &ScoreTable,
    running: &[Vec<u8>],
    limit: usize,
) -> EngineResult<StepOutcome> {
    let params = &ctx.config.replay;
    let count = ctx.shape.count;
    let mut working = base.clone();
    let (mut exclude_hits, mut overlap_hits) = (0usize, 0usize);
    let mut warning = None;
    let mut last = Vec::new();

    for attempt in 1..=params.max_attempts {
        let pool = top_k_with_buffer(&working, count, ctx.exclusions, params.buffer);
        if pool.numbers.len() < count {
            return Err(EngineError::InsufficientCandidates {
                slice: Slice::Main,
                needed: count,
                available: pool.numbers.len(),
            });
        }
        if warning.is_none() {
            warning = pool.warning;
        }

        let mut candidate = pool.numbers[..count].to_vec();
        candidate.sort_unstable();
        last = candidate.clone();

        if ctx.exclusions.contains_combination(&candidate) {
            exclude_hits += 1;
            debug!(attempt, ?candidate, "combinaison exclue, pénalité");
            penalize(&mut working, candidate.iter().copied(), params.exclusion_penalty);
            continue;
        }

        let overlapping: BTreeSet<u8> = running
            .iter()
            .filter(|prior| shared_count(&candidate, prior) > limit)
            .flat_map(|prior| candidate.iter().filter(|n| prior.contains(n)).copied().collect::<Vec<_>>())
            .collect();
        if !overlapping.is_empty() {
            overlap_hits += 1;
            debug!(attempt, ?candidate, ?overlapping, limit, "recouvrement excessif, pénalité");
            penalize(&mut working, overlapping, params.overlap_penalty);
            continue;
        }

        return Ok(StepOutcome {
            values: candidate,
            attempts: attempt,
            reason: None,
            warning,
        });
    }

    let reason = degradation(exclude_hits, overlap_hits);
    warn!(?last, exclude_hits, overlap_hits, %reason, "budget de tentatives épuisé, grille dégradée");
    Ok(StepOutcome {
        values: last,
        attempts: params.max_attempts,
        reason: Some(reason),
        warning,
    })
}

fn digit_series(ctx: &SelectionContext, len: usize) -> EngineResult<Vec<SelectionResult>> {
    let params = &ctx.config.replay;
    let positions = ctx.scores.positions()?;

    let mut base: Vec<ScoreTable> = positions.iter().map(|p| p.trend.clone()).collect();
    let mut freq: BTreeMap<(usize, u8), i32> = BTreeMap::new();
    for ticket in ctx.history {
        for (pos, &d) in ticket.iter().enumerate().take(base.len()) {
            *freq.entry((pos, d)).or_default() += 1;
        }
    }
    for ((pos, d), f) in freq {
        penalize(&mut base[pos], [d], params.next_set_penalty.powi(f));
    }

    let table = ctx.config.overlap_table(ctx.shape);
    let mut running: Vec<Vec<u8>> = ctx.history.to_vec();
    let offset = ctx.history.len();
    let mut results = Vec::new();

    for step in 0..len {
        let limit = overlap_limit(&table, offset.saturating_add(step));
        let outcome = digit_step(ctx, &base, &running, limit)?;
        for (pos, &d) in outcome.values.iter().enumerate() {
            penalize(&mut base[pos], [d], params.next_set_penalty);
        }
        running.push(outcome.values.clone());

        let numbers = outcome
            .values
            .iter()
            .enumerate()
            .map(|(pos, &d)| PickedNumber {
                value: d,
                tag: ProvenanceTag::Position {
                    position: pos,
                    score: trend_u8(positions[pos].trend_of(d)),
                },
            })
            .collect();
        let rationale = format!(
            "Rejeu strict, grille {} : meilleur chiffre de chaque position (au plus {} positions communes)",
            step + 1,
            limit
        );
        results.push(finish(numbers, rationale, step, outcome));
    }
    Ok(results)
}

fn digit_step(
    ctx: &SelectionContext,
    base: &[ScoreTable],
    running: &[Vec<u8>],
    limit: usize,
) -> EngineResult<StepOutcome> {
    let params = &ctx.config.replay;
    let mut working = base.to_vec();
    let (mut exclude_hits, mut overlap_hits) = (0usize, 0usize);
    let mut last = Vec::new();

    for attempt in 1..=params.max_attempts {
        let candidate = working
            .iter()
            .enumerate()
            .map(|(pos, table)| {
                ranked_eligible(table, ctx.exclusions)
                    .first()
                    .copied()
                    .ok_or(EngineError::InsufficientCandidates {
                        slice: Slice::Digit(pos),
                        needed: 1,
                        available: 0,
                    })
            })
            .collect::<EngineResult<Vec<u8>>>()?;
        last = candidate.clone();

        if ctx.exclusions.contains_combination(&candidate) {
            exclude_hits += 1;
            debug!(attempt, ?candidate, "grille exclue, pénalité");
            for (pos, &d) in candidate.iter().enumerate() {
                penalize(&mut working[pos], [d], params.exclusion_penalty);
            }
            continue;
        }

        let mut overlapping: BTreeSet<usize> = BTreeSet::new();
        for prior in running {
            if positional_matches(&candidate, prior) > limit {
                overlapping.extend((0..candidate.len()).filter(|&p| prior.get(p) == Some(&candidate[p])));
            }
        }
        if !overlapping.is_empty() {
            overlap_hits += 1;
            debug!(attempt, ?candidate, ?overlapping, limit, "trop de positions communes, pénalité");
            for pos in overlapping {
                penalize(&mut working[pos], [candidate[pos]], params.overlap_penalty);
            }
            continue;
        }

        return Ok(StepOutcome {
            values: candidate,
            attempts: attempt,
            reason: None,
            warning: None,
        });
    }

    let reason = degradation(exclude_hits, overlap_hits);
    warn!(?last, exclude_hits, overlap_hits, %reason, "budget de tentatives épuisé, grille dégradée");
    Ok(StepOutcome {
        values: last,
        attempts: params.max_attempts,
        reason: Some(reason),
        warning: None,
    })
}

fn finish(numbers: Vec<PickedNumber>, mut rationale: String, step: usize, outcome: StepOutcome) -> SelectionResult {
    let mut metadata = Metadata::new(Strategy::Replay);
    metadata.set_index = Some(step);
    metadata.attempts = Some(outcome.attempts);
    metadata.warnings.extend(outcome.warning);
    if let Some(reason) = outcome.reason {
        metadata.degrade(reason);
        rationale.push_str(&format!(" [dégradé : {reason}]"));
    }
    SelectionResult {
        numbers,
        rationale,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::fixtures::Scenario;
    use elan_db::models::GameShape;

    const NONE: &[Vec<u8>] = &[];

    #[test]
    fn test_replay_is_deterministic() {
        let sc = Scenario::new(GameShape::lotto649());
        let a = replay(&sc.ctx(), 3).unwrap();
        let b = replay(&sc.ctx(), 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.metadata.set_index, Some(3));
    }

    #[test]
    fn test_direct_index_matches_series() {
        let sc = Scenario::new(GameShape::daily539());
        let series = replay_series(&sc.ctx(), 4).unwrap();
        for (i, expected) in series.iter().enumerate() {
            assert_eq!(&replay(&sc.ctx(), i).unwrap(), expected, "grille {i}");
        }
    }

    #[test]
    fn test_first_set_is_top_trend() {
        let sc = Scenario::new(GameShape::lotto649());
        let first = replay(&sc.ctx(), 0).unwrap();
        let mut expected = ranked_eligible(&sc.scores.main().unwrap().trend, &ExclusionSet::empty());
        expected.truncate(6);
        expected.sort_unstable();
        assert_eq!(first.values(), expected);
        assert_eq!(first.metadata.attempts, Some(1));
        assert!(!first.metadata.degraded);
    }

    #[test]
    fn test_overlap_bound_holds() {
        let sc = Scenario::new(GameShape::lotto649());
        let table = sc.config.overlap_table(&sc.shape);
        let series = replay_series(&sc.ctx(), 8).unwrap();
        for (i, set) in series.iter().enumerate() {
            let values = set.main_values();
            let mut unique = values.clone();
            unique.dedup();
            assert_eq!(unique.len(), 6, "doublon dans {values:?}");
            if set.metadata.degraded {
                continue;
            }
            for prior in &series[..i] {
                assert!(shared_count(&values, &prior.main_values()) <= overlap_limit(&table, i));
            }
        }
    }

    #[test]
    fn test_exclusions_respected() {
        let plain = Scenario::new(GameShape::lotto649());
        let best = replay(&plain.ctx(), 0).unwrap().values();

        let sc = Scenario::new(GameShape::lotto649()).exclude(&[best[0]], &[best.clone()]);
        let series = replay_series(&sc.ctx(), 3).unwrap();
        for set in &series {
            assert!(!set.values().contains(&best[0]));
            assert_ne!(set.values(), best);
        }
    }

    #[test]
    fn test_excluded_combination_forces_retry() {
        let plain = Scenario::new(GameShape::daily539());
        let best = replay(&plain.ctx(), 0).unwrap().values();

        let sc = Scenario::new(GameShape::daily539()).exclude(&[], &[best.clone()]);
        let first = replay(&sc.ctx(), 0).unwrap();
        assert_ne!(first.values(), best);
        assert!(first.metadata.attempts.unwrap() >= 2);
        assert!(!first.metadata.degraded);
    }

    #[test]
    fn test_exhausted_budget_degrades_with_exclude_limit() {
        let plain = Scenario::new(GameShape::daily539());
        let best = replay(&plain.ctx(), 0).unwrap().values();

        let mut sc = Scenario::new(GameShape::daily539()).exclude(&[], &[best.clone()]);
        sc.config.replay.max_attempts = 1;
        let first = replay(&sc.ctx(), 0).unwrap();
        assert!(first.metadata.degraded);
        assert_eq!(first.metadata.degradation_reason, Some(DegradationReason::ExcludeLimit));
        assert_eq!(first.values(), best);
    }

    #[test]
    fn test_insufficient_candidates() {
        let excluded: Vec<u8> = (6..=49).collect();
        let sc = Scenario::new(GameShape::lotto649()).exclude(&excluded, NONE);
        let err = replay(&sc.ctx(), 0).unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientCandidates {
                slice: Slice::Main,
                needed: 6,
                available: 5
            }
        );
    }

    #[test]
    fn test_history_is_penalized_and_offsets_overlap() {
        let plain = Scenario::new(GameShape::lotto649());
        let best = replay(&plain.ctx(), 0).unwrap().values();

        let mut sc = Scenario::new(GameShape::lotto649());
        sc.history = vec![best.clone()];
        let first = replay(&sc.ctx(), 0).unwrap();
        assert!(!first.metadata.degraded);
        // Avec une grille d'historique, l'étape 0 utilise la limite de l'étape 1
        assert!(shared_count(&first.values(), &best) <= 1);
    }

    #[test]
    fn test_secondary_rotates_with_index() {
        let sc = Scenario::new(GameShape::power638());
        let ranked = ranked_eligible(&sc.scores.secondary().unwrap().trend, &ExclusionSet::empty());
        let series = replay_series(&sc.ctx(), 6).unwrap();
        assert_eq!(series[0].secondary_value(), Some(ranked[0]));
        assert_eq!(series[1].secondary_value(), Some(ranked[1]));
        assert_eq!(series[5].secondary_value(), Some(ranked[0]));
        assert_eq!(series[0].main_values().len(), 6);
    }

    #[test]
    fn test_digit_replay_positions() {
        let sc = Scenario::new(GameShape::digit3());
        let table = sc.config.overlap_table(&sc.shape);
        let series = replay_series(&sc.ctx(), 4).unwrap();
        for (i, set) in series.iter().enumerate() {
            assert_eq!(set.values().len(), 3);
            assert!(set.values().iter().all(|&d| d <= 9));
            assert!(matches!(set.numbers[0].tag, ProvenanceTag::Position { position: 0, .. }));
            if !set.metadata.degraded {
                for prior in &series[..i] {
                    assert!(positional_matches(&set.values(), &prior.values()) <= overlap_limit(&table, i));
                }
            }
        }
    }

    #[test]
    fn test_digit_exclusion_is_positional() {
        let plain = Scenario::new(GameShape::digit4());
        let best = replay(&plain.ctx(), 0).unwrap().values();

        let sc = Scenario::new(GameShape::digit4()).exclude(&[], &[best.clone()]);
        let first = replay(&sc.ctx(), 0).unwrap();
        assert_ne!(first.values(), best);
    }

    #[test]
    fn test_digit_number_exclusions_skip_best_digits() {
        let plain = Scenario::new(GameShape::digit3());
        let best = replay(&plain.ctx(), 0).unwrap().values();

        let sc = Scenario::new(GameShape::digit3()).exclude(&best, NONE);
        let series = replay_series(&sc.ctx(), 4).unwrap();
        for set in &series {
            assert!(set.values().iter().all(|d| !best.contains(d)), "{:?}", set.values());
        }
    }

    #[test]
    fn test_digit_position_without_candidates() {
        let every_digit: Vec<u8> = (0..=9).collect();
        let sc = Scenario::new(GameShape::digit4()).exclude(&every_digit, NONE);
        let err = replay(&sc.ctx(), 0).unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientCandidates {
                slice: Slice::Digit(0),
                needed: 1,
                available: 0
            }
        );
    }

    #[test]
    fn test_index_overflow_is_rejected() {
        let sc = Scenario::new(GameShape::lotto649());
        assert!(matches!(replay(&sc.ctx(), usize::MAX), Err(EngineError::InvalidConfig(_))));
    }
}

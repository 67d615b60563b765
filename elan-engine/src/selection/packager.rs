//! Paquets de grilles : verrouillé (une dimension varie autour de la
//! meilleure grille) ou diversifié (produit cartésien classé puis filtré).

use std::collections::HashSet;

use tracing::{debug, warn};

use elan_db::models::Slice;

use super::replay::replay;
use super::{
    trend_u8, DegradationReason, Metadata, PickedNumber, ProvenanceTag, SelectionContext, SelectionResult,
    Strategy,
};
use crate::error::{EngineError, EngineResult};
use crate::pool::{ranked_eligible, signature, ExclusionSet};
use crate::rng::SelectionRng;
use crate::scoring::SliceScores;

/// Taille du produit cartésien, `None` en cas de dépassement.
pub fn cartesian_size<T>(dims: &[Vec<T>]) -> Option<usize> {
    if dims.is_empty() {
        return Some(0);
    }
    dims.iter().try_fold(1usize, |acc, d| acc.checked_mul(d.len()))
}

/// Permutations distinctes, valeurs prises dans leur ordre de première
/// apparition : `[1, 1, 2]` donne 3 grilles, la première étant l'entrée.
pub fn unique_permutations(values: &[u8]) -> Vec<Vec<u8>> {
    let mut distinct: Vec<(u8, usize)> = Vec::new();
    for &v in values {
        match distinct.iter_mut().find(|(d, _)| *d == v) {
            Some((_, c)) => *c += 1,
            None => distinct.push((v, 1)),
        }
    }

    fn dfs(distinct: &mut [(u8, usize)], path: &mut Vec<u8>, len: usize, out: &mut Vec<Vec<u8>>) {
        if path.len() == len {
            out.push(path.clone());
            return;
        }
        for i in 0..distinct.len() {
            if distinct[i].1 == 0 {
                continue;
            }
            distinct[i].1 -= 1;
            path.push(distinct[i].0);
            dfs(distinct, path, len, out);
            path.pop();
            distinct[i].1 += 1;
        }
    }

    let mut out = Vec::new();
    dfs(&mut distinct, &mut Vec::with_capacity(values.len()), values.len(), &mut out);
    out
}

/// Nombre de positions différentes entre deux grilles.
pub fn positional_diff(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).filter(|(x, y)| x != y).count()
}

fn metadata(strategy: Strategy, index: usize) -> Metadata {
    let mut m = Metadata::new(strategy);
    m.set_index = Some(index);
    m
}

/// Marque tout le paquet comme dégradé.
fn flag_batch(batch: &mut [SelectionResult], reason: DegradationReason, warning: &str) {
    for r in batch.iter_mut() {
        r.metadata.degrade(reason);
        r.metadata.warnings.push(warning.to_string());
    }
}

pub fn pack_locked(ctx: &SelectionContext, target: usize) -> EngineResult<Vec<SelectionResult>> {
    let best = replay(ctx, 0)?;
    let mut tickets: Vec<Vec<PickedNumber>> = Vec::new();

    if ctx.shape.is_digit() {
        let positions = ctx.scores.positions()?;
        for perm in unique_permutations(&best.values()) {
            if tickets.len() >= target {
                break;
            }
            let has_excluded_digit = perm.iter().any(|&d| ctx.exclusions.contains_number(d));
            if has_excluded_digit || ctx.exclusions.contains_combination(&perm) {
                continue;
            }
            tickets.push(
                perm.iter()
                    .enumerate()
                    .map(|(pos, &d)| PickedNumber {
                        value: d,
                        tag: ProvenanceTag::Position {
                            position: pos,
                            score: trend_u8(positions[pos].trend_of(d)),
                        },
                    })
                    .collect(),
            );
        }
    } else if let Some(secondary) = ctx.scores.secondary() {
        let main = ctx.scores.main()?;
        let locked = best.main_values();
        if !ctx.exclusions.contains_combination(&locked) {
            for s in ranked_eligible(&secondary.trend, &ExclusionSet::empty())
                .into_iter()
                .take(target)
            {
                let mut ticket = locked_numbers(&locked, main);
                ticket.push(PickedNumber {
                    value: s,
                    tag: ProvenanceTag::Secondary {
                        score: trend_u8(secondary.trend_of(s)),
                    },
                });
                tickets.push(ticket);
            }
        }
    } else {
        let main = ctx.scores.main()?;
        let count = ctx.shape.count;
        let mut by_trend = best.main_values();
        by_trend.sort_by(|a, b| main.trend_of(*b).total_cmp(&main.trend_of(*a)).then(a.cmp(b)));
        let locked: Vec<u8> = by_trend.into_iter().take(count.saturating_sub(1)).collect();

        for s in ranked_eligible(&main.trend, ctx.exclusions) {
            if tickets.len() >= target {
                break;
            }
            if locked.contains(&s) {
                continue;
            }
            let mut values = locked.clone();
            values.push(s);
            if ctx.exclusions.contains_combination(&values) {
                continue;
            }
            let mut ticket = locked_numbers(&locked, main);
            ticket.push(PickedNumber {
                value: s,
                tag: ProvenanceTag::Sweep {
                    score: trend_u8(main.trend_of(s)),
                },
            });
            ticket.sort_by_key(|p| p.value);
            tickets.push(ticket);
        }
    }

    if tickets.is_empty() && target > 0 {
        return Ok(vec![excluded_best(best)]);
    }

    let total = tickets.len();
    let mut batch: Vec<SelectionResult> = tickets
        .into_iter()
        .enumerate()
        .map(|(i, numbers)| SelectionResult {
            numbers,
            rationale: format!("Pack verrouillé {}/{} : meilleure grille, une seule dimension varie", i + 1, total),
            metadata: metadata(Strategy::PackLocked, i),
        })
        .collect();

    if total < target {
        warn!(total, target, "pack verrouillé incomplet");
        flag_batch(
            &mut batch,
            DegradationReason::InsufficientCombinations,
            &format!("{total} grilles distinctes sur {target} demandées"),
        );
    }
    Ok(batch)
}

/// Aucune variante admissible : la meilleure grille est elle-même exclue.
/// Elle est rendue seule, avec la raison de dégradation du rejeu.
fn excluded_best(best: SelectionResult) -> SelectionResult {
    let reason = best
        .metadata
        .degradation_reason
        .unwrap_or(DegradationReason::ExcludeLimit);
    warn!(values = ?best.values(), %reason, "pack verrouillé vide, meilleure grille rendue dégradée");
    let mut m = metadata(Strategy::PackLocked, 0);
    m.attempts = best.metadata.attempts;
    m.warnings = best.metadata.warnings;
    m.warnings.push("aucune variante admissible autour de la meilleure grille".to_string());
    m.degrade(reason);
    SelectionResult {
        numbers: best.numbers,
        rationale: format!("Pack verrouillé 1/1 : meilleure grille exclue [dégradé : {reason}]"),
        metadata: m,
    }
}

fn locked_numbers(values: &[u8], main: &SliceScores) -> Vec<PickedNumber> {
    values
        .iter()
        .map(|&n| PickedNumber {
            value: n,
            tag: ProvenanceTag::Locked {
                score: trend_u8(main.trend_of(n)),
            },
        })
        .collect()
}

/// Une dimension du produit cartésien.
struct Dimension<'a> {
    values: Vec<u8>,
    scores: &'a SliceScores,
    slice: Slice,
}

impl Dimension<'_> {
    fn tag(&self, value: u8) -> ProvenanceTag {
        let score = trend_u8(self.scores.trend_of(value));
        match self.slice {
            Slice::Main => ProvenanceTag::Trend { score },
            Slice::Secondary => ProvenanceTag::Secondary { score },
            Slice::Digit(position) => ProvenanceTag::Position { position, score },
        }
    }
}

/// Découpe `pool` (trié) en `count` bandes contiguës, les premières
/// absorbant le reste.
fn split_bands(pool: &[u8], count: usize) -> Vec<Vec<u8>> {
    let base = pool.len() / count;
    let extra = pool.len() % count;
    let mut bands = Vec::with_capacity(count);
    let mut start = 0;
    for i in 0..count {
        let len = base + usize::from(i < extra);
        bands.push(pool[start..start + len].to_vec());
        start += len;
    }
    bands
}

fn dimensions<'a>(ctx: &'a SelectionContext) -> EngineResult<Vec<Dimension<'a>>> {
    let params = &ctx.config.packager;
    let mut dims = Vec::new();

    if ctx.shape.is_digit() {
        for (pos, scores) in ctx.scores.positions()?.into_iter().enumerate() {
            let mut values = ranked_eligible(&scores.trend, ctx.exclusions);
            if values.is_empty() {
                return Err(EngineError::InsufficientCandidates {
                    slice: Slice::Digit(pos),
                    needed: 1,
                    available: 0,
                });
            }
            values.truncate(params.digit_top_n);
            dims.push(Dimension {
                values,
                scores,
                slice: Slice::Digit(pos),
            });
        }
        return Ok(dims);
    }

    let main = ctx.scores.main()?;
    let count = ctx.shape.count;
    let mut pool = ranked_eligible(&main.trend, ctx.exclusions);
    if pool.len() < count {
        return Err(EngineError::InsufficientCandidates {
            slice: Slice::Main,
            needed: count,
            available: pool.len(),
        });
    }
    pool.truncate(count * params.band_width);
    pool.sort_unstable();
    for values in split_bands(&pool, count) {
        dims.push(Dimension {
            values,
            scores: main,
            slice: Slice::Main,
        });
    }
    if let Some(secondary) = ctx.scores.secondary() {
        let mut values = ranked_eligible(&secondary.trend, &ExclusionSet::empty());
        values.truncate(params.secondary_top_n.max(1));
        dims.push(Dimension {
            values,
            scores: secondary,
            slice: Slice::Secondary,
        });
    }
    Ok(dims)
}

/// Partie soumise aux exclusions de combinaisons (sans la deuxième zone).
fn main_part<'v>(values: &'v [u8], dims: &[Dimension]) -> &'v [u8] {
    let main_len = dims.iter().filter(|d| d.slice != Slice::Secondary).count();
    &values[..main_len.min(values.len())]
}

pub fn pack_diverse(ctx: &SelectionContext, target: usize, rng: &mut SelectionRng) -> EngineResult<Vec<SelectionResult>> {
    let dims = dimensions(ctx)?;
    let lists: Vec<Vec<u8>> = dims.iter().map(|d| d.values.clone()).collect();
    let size = cartesian_size(&lists);
    let cap = ctx.config.packager.cartesian_cap;
    debug!(?size, cap, "taille du produit cartésien");

    match size {
        Some(n) if n <= cap => Ok(ranked_diverse(ctx, &dims, target)),
        _ => Ok(safe_mode(ctx, &dims, target, rng)),
    }
}

fn ranked_diverse(ctx: &SelectionContext, dims: &[Dimension], target: usize) -> Vec<SelectionResult> {
    // Énumération complète, classée par Σ ln(score + 1)
    let mut combos: Vec<(f64, Vec<u8>)> = Vec::new();
    let mut idx = vec![0usize; dims.len()];
    if dims.iter().all(|d| !d.values.is_empty()) {
        'outer: loop {
            let values: Vec<u8> = dims.iter().zip(&idx).map(|(d, &i)| d.values[i]).collect();
            if !ctx.exclusions.contains_combination(main_part(&values, dims)) {
                let score: f64 = dims
                    .iter()
                    .zip(&values)
                    .map(|(d, &v)| (d.scores.trend_of(v) + 1.0).ln())
                    .sum();
                combos.push((score, values));
            }
            for k in (0..dims.len()).rev() {
                idx[k] += 1;
                if idx[k] < dims[k].values.len() {
                    continue 'outer;
                }
                idx[k] = 0;
            }
            break;
        }
    }
    combos.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let mut selected: Vec<Vec<u8>> = Vec::new();
    let mut taken: HashSet<String> = HashSet::new();
    for min_diff in [2usize, 1, 0] {
        for (_, values) in &combos {
            if selected.len() >= target {
                break;
            }
            if taken.contains(&signature(values, true)) {
                continue;
            }
            if selected.iter().all(|s| positional_diff(s, values) >= min_diff) {
                taken.insert(signature(values, true));
                selected.push(values.clone());
            }
        }
    }
    debug!(candidates = combos.len(), selected = selected.len(), "pack diversifié classé");

    let total = selected.len();
    let mut batch: Vec<SelectionResult> = selected
        .into_iter()
        .enumerate()
        .map(|(i, values)| SelectionResult {
            numbers: values
                .iter()
                .zip(dims)
                .map(|(&v, d)| PickedNumber { value: v, tag: d.tag(v) })
                .collect(),
            rationale: format!(
                "Pack diversifié {}/{} : {} combinaisons classées par Σ ln(score + 1)",
                i + 1,
                total,
                combos.len()
            ),
            metadata: metadata(Strategy::PackDiverse, i),
        })
        .collect();

    if total < target {
        warn!(total, target, "pack diversifié incomplet");
        flag_batch(
            &mut batch,
            DegradationReason::InsufficientCombinations,
            &format!("{total} combinaisons disponibles sur {target} demandées"),
        );
    }
    batch
}

/// Produit trop grand : tirages uniformes d'une valeur par dimension.
fn safe_mode(ctx: &SelectionContext, dims: &[Dimension], target: usize, rng: &mut SelectionRng) -> Vec<SelectionResult> {
    let max_attempts = target * ctx.config.packager.safe_mode_retry_factor;
    warn!(target, max_attempts, "produit cartésien trop grand, mode sûr");

    let mut selected: Vec<Vec<u8>> = Vec::new();
    let mut taken: HashSet<String> = HashSet::new();
    let mut attempts = 0;
    if dims.iter().all(|d| !d.values.is_empty()) {
        while selected.len() < target && attempts < max_attempts {
            attempts += 1;
            let values: Vec<u8> = dims.iter().map(|d| d.values[rng.below(d.values.len())]).collect();
            if ctx.exclusions.contains_combination(main_part(&values, dims)) {
                continue;
            }
            if taken.insert(signature(&values, true)) {
                selected.push(values);
            }
        }
    }

    let total = selected.len();
    selected
        .into_iter()
        .enumerate()
        .map(|(i, values)| {
            let mut m = metadata(Strategy::PackDiverse, i);
            m.attempts = Some(attempts);
            m.degrade(DegradationReason::CartesianSafeMode);
            if total < target {
                m.warnings.push(format!("{total} grilles obtenues sur {target} demandées"));
            }
            SelectionResult {
                numbers: values
                    .iter()
                    .zip(dims)
                    .map(|(&v, d)| PickedNumber {
                        value: v,
                        tag: match d.slice {
                            Slice::Secondary => d.tag(v),
                            _ => ProvenanceTag::SafeMode,
                        },
                    })
                    .collect(),
                rationale: format!("Pack diversifié {}/{} : mode sûr, une valeur tirée par dimension", i + 1, total),
                metadata: m,
            }
        })
        .collect()
}

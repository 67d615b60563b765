pub mod decay;
pub mod momentum;
pub mod normalize;

use std::borrow::Cow;
use std::collections::BTreeMap;

use tracing::{debug, warn};

use elan_db::models::{DrawRecord, GameShape, Slice};

use crate::config::ScoringParams;
use crate::error::{EngineError, EngineResult};
use decay::{aggregate_exposure, half_life_weights};
use momentum::{kish_shrinkage, log_lift};
use normalize::{percentile_rank_transform, NormalizeParams};

/// Numéro → score, itéré par numéro croissant.
pub type ScoreTable = BTreeMap<u8, f64>;

/// Scores d'une tranche : momentum rétréci et score de tendance 10–98.
#[derive(Debug, Clone)]
pub struct SliceScores {
    pub slice: Slice,
    pub momentum: ScoreTable,
    pub trend: ScoreTable,
    pub shrinkage: f64,
    pub draws_used: usize,
}

impl SliceScores {
    pub fn trend_of(&self, n: u8) -> f64 {
        self.trend.get(&n).copied().unwrap_or(0.0)
    }
}

/// Tri défensif du plus récent au plus ancien ; évite la copie si déjà trié.
pub fn order_newest_first(draws: &[DrawRecord]) -> Cow<'_, [DrawRecord]> {
    let sorted = draws
        .windows(2)
        .all(|w| w[0].recency_key() >= w[1].recency_key());
    if sorted {
        return Cow::Borrowed(draws);
    }
    warn!(count = draws.len(), "tirages non triés, réordonnancement du plus récent au plus ancien");
    let mut owned = draws.to_vec();
    owned.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
    Cow::Owned(owned)
}

/// Pipeline complet pour une tranche : poids → expositions → log-lift →
/// rétrécissement de Kish → rang percentile.
///
/// `draws` doit être trié du plus récent au plus ancien.
pub fn score_slice(
    draws: &[DrawRecord],
    shape: &GameShape,
    slice: Slice,
    params: &ScoringParams,
) -> EngineResult<SliceScores> {
    let (min, max) = shape.slice_bounds(slice).ok_or_else(|| EngineError::UnsupportedSlice {
        game: shape.id.clone(),
        slice,
    })?;

    let window = &draws[..draws.len().min(params.max_history)];
    let per_draw: Vec<&[u8]> = window
        .iter()
        .map(|d| slice.numbers_from(d, shape))
        .collect();

    if per_draw.iter().all(|nums| nums.is_empty()) {
        return Err(EngineError::MissingHistory {
            game: shape.id.clone(),
            slice,
        });
    }

    let w_short = half_life_weights(per_draw.len(), params.half_life_short);
    let w_long = half_life_weights(per_draw.len(), params.half_life_long);

    let short = aggregate_exposure(&per_draw, &w_short, min, max);
    let long = aggregate_exposure(&per_draw, &w_long, min, max);

    let shrinkage = kish_shrinkage(&w_short, params.prior_strength);
    let momentum: ScoreTable = log_lift(&short, &long, min, max, params.epsilon_for(slice))
        .into_iter()
        .map(|(n, m)| (n, m * shrinkage))
        .collect();

    let trend = percentile_rank_transform(
        &momentum,
        &NormalizeParams {
            clamp_min: params.clamp_min,
            clamp_max: params.clamp_max,
            low_variance_threshold: params.low_variance_threshold,
            stretch_factor: params.stretch_factor,
        },
    );

    debug!(
        game = %shape.id,
        %slice,
        draws = per_draw.len(),
        shrinkage,
        "scores de tendance calculés"
    );

    Ok(SliceScores {
        slice,
        momentum,
        trend,
        shrinkage,
        draws_used: per_draw.len(),
    })
}

/// Scores de toutes les tranches d'un jeu.
#[derive(Debug, Clone)]
pub struct ShapeScores {
    pub shape: GameShape,
    pub slices: BTreeMap<Slice, SliceScores>,
}

impl ShapeScores {
    pub fn slice(&self, slice: Slice) -> EngineResult<&SliceScores> {
        self.slices.get(&slice).ok_or_else(|| EngineError::UnsupportedSlice {
            game: self.shape.id.clone(),
            slice,
        })
    }

    pub fn main(&self) -> EngineResult<&SliceScores> {
        self.slice(Slice::Main)
    }

    pub fn secondary(&self) -> Option<&SliceScores> {
        self.slices.get(&Slice::Secondary)
    }

    /// Tables de tendance par position (jeux numériques), dans l'ordre.
    pub fn positions(&self) -> EngineResult<Vec<&SliceScores>> {
        (0..self.shape.count).map(|p| self.slice(Slice::Digit(p))).collect()
    }
}

pub fn score_shape(draws: &[DrawRecord], shape: &GameShape, params: &ScoringParams) -> EngineResult<ShapeScores> {
    let slices = shape
        .slices()
        .into_iter()
        .map(|slice| score_slice(draws, shape, slice, params).map(|s| (slice, s)))
        .collect::<EngineResult<BTreeMap<_, _>>>()?;
    Ok(ShapeScores {
        shape: shape.clone(),
        slices,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use elan_db::models::{DrawRecord, GameShape};

    /// Tirages synthétiques déterministes, `[0]` = le plus récent.
    pub fn make_draws(shape: &GameShape, n: usize) -> Vec<DrawRecord> {
        let range = shape.range_size();
        (0..n)
            .map(|i| {
                let numbers: Vec<u8> = if shape.is_digit() {
                    (0..shape.count)
                        .map(|p| ((i * (p + 3) + p * 7) % 10) as u8)
                        .collect()
                } else {
                    let mut nums = Vec::with_capacity(shape.count);
                    let mut k = 0;
                    while nums.len() < shape.count {
                        let n = shape.min + ((i * 7 + k * 11 + i * i) % range) as u8;
                        if !nums.contains(&n) {
                            nums.push(n);
                        }
                        k += 1;
                    }
                    nums
                };
                let secondary = shape.secondary_max.map(|m| 1 + ((i * 3) % m as usize) as u8);
                DrawRecord {
                    game: shape.id.clone(),
                    period: format!("{:05}", 10_000 - i),
                    date: format!("20{:02}-{:02}-{:02}", 24 - (i / 336) % 20, 12 - (i / 28) % 12, 28 - i % 28),
                    numbers,
                    secondary,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::make_draws;
    use super::*;

    #[test]
    fn test_score_slice_covers_range() {
        let shape = GameShape::lotto649();
        let draws = make_draws(&shape, 60);
        let scores = score_slice(&draws, &shape, Slice::Main, &ScoringParams::default()).unwrap();
        assert_eq!(scores.trend.len(), 49);
        assert_eq!(scores.momentum.len(), 49);
        assert!(scores.shrinkage > 0.0 && scores.shrinkage < 1.0);
        assert!(scores.trend.values().all(|&t| (10.0..=98.0).contains(&t)));
    }

    #[test]
    fn test_score_slice_secondary_and_digits() {
        let power = GameShape::power638();
        let draws = make_draws(&power, 40);
        let sec = score_slice(&draws, &power, Slice::Secondary, &ScoringParams::default()).unwrap();
        assert_eq!(sec.trend.len(), 8);

        let digit = GameShape::digit3();
        let draws = make_draws(&digit, 40);
        let pos = score_slice(&draws, &digit, Slice::Digit(2), &ScoringParams::default()).unwrap();
        assert_eq!(pos.trend.keys().copied().collect::<Vec<_>>(), (0..=9).collect::<Vec<u8>>());
    }

    #[test]
    fn test_missing_history_is_reported() {
        let shape = GameShape::digit4();
        let mut draws = make_draws(&shape, 10);
        for d in &mut draws {
            d.numbers.truncate(3);
        }
        let err = score_slice(&draws, &shape, Slice::Digit(3), &ScoringParams::default()).unwrap_err();
        assert_eq!(
            err,
            EngineError::MissingHistory {
                game: "digit4".to_string(),
                slice: Slice::Digit(3)
            }
        );
        assert!(err.to_string().contains("position 4"));
    }

    #[test]
    fn test_unsupported_slice() {
        let shape = GameShape::daily539();
        let draws = make_draws(&shape, 10);
        let err = score_slice(&draws, &shape, Slice::Secondary, &ScoringParams::default()).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedSlice { .. }));
    }

    #[test]
    fn test_order_newest_first() {
        let shape = GameShape::daily539();
        let draws = make_draws(&shape, 5);
        assert!(matches!(order_newest_first(&draws), Cow::Borrowed(_)));

        let mut shuffled = draws.clone();
        shuffled.reverse();
        let ordered = order_newest_first(&shuffled);
        assert!(matches!(ordered, Cow::Owned(_)));
        assert_eq!(ordered.as_ref(), draws.as_slice());
    }

    #[test]
    fn test_reordering_does_not_change_scores() {
        let shape = GameShape::daily539();
        let draws = make_draws(&shape, 30);
        let mut reversed = draws.clone();
        reversed.reverse();
        let params = ScoringParams::default();

        let a = score_slice(&draws, &shape, Slice::Main, &params).unwrap();
        let b = score_slice(&order_newest_first(&reversed), &shape, Slice::Main, &params).unwrap();
        assert_eq!(a.trend, b.trend);
    }

    #[test]
    fn test_score_shape_builds_every_slice() {
        let shape = GameShape::power638();
        let scores = score_shape(&make_draws(&shape, 30), &shape, &ScoringParams::default()).unwrap();
        assert_eq!(scores.slices.len(), 2);
        assert!(scores.secondary().is_some());
        assert!(scores.positions().is_err());

        let digit = GameShape::digit4();
        let scores = score_shape(&make_draws(&digit, 30), &digit, &ScoringParams::default()).unwrap();
        assert_eq!(scores.positions().unwrap().len(), 4);
        assert!(scores.main().is_err());
    }

    #[test]
    fn test_max_history_bounds_window() {
        let shape = GameShape::daily539();
        let draws = make_draws(&shape, 50);
        let params = ScoringParams {
            max_history: 20,
            ..ScoringParams::default()
        };
        let scores = score_slice(&draws, &shape, Slice::Main, &params).unwrap();
        assert_eq!(scores.draws_used, 20);
    }
}

use super::ScoreTable;

#[derive(Debug, Clone, Copy)]
pub struct NormalizeParams {
    pub clamp_min: f64,
    pub clamp_max: f64,
    pub low_variance_threshold: f64,
    pub stretch_factor: f64,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            clamp_min: 10.0,
            clamp_max: 98.0,
            low_variance_threshold: 0.15,
            stretch_factor: 1.8,
        }
    }
}

/// Moyenne et écart-type (population).
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Rang percentile → score de tendance dans `[clamp_min, clamp_max]`.
///
/// Les ex-aequo sont départagés par numéro croissant, si bien que deux appels
/// sur la même table donnent toujours le même classement.
pub fn percentile_rank_transform(scores: &ScoreTable, params: &NormalizeParams) -> ScoreTable {
    if scores.is_empty() {
        return ScoreTable::new();
    }

    let values: Vec<f64> = scores.values().copied().collect();
    let (mean, std) = mean_std(&values);

    // (numéro, valeur étirée, valeur brute)
    let mut ranked: Vec<(u8, f64, f64)> = scores
        .iter()
        .map(|(&n, &v)| {
            let stretched = if std < params.low_variance_threshold {
                mean + params.stretch_factor * (v - mean)
            } else {
                v
            };
            (n, stretched, v)
        })
        .collect();
    ranked.sort_by(|a, b| {
        a.1.total_cmp(&b.1)
            .then(a.2.total_cmp(&b.2))
            .then(a.0.cmp(&b.0))
    });

    let span = params.clamp_max - params.clamp_min;
    let last = ranked.len() - 1;

    ranked
        .iter()
        .enumerate()
        .map(|(rank, &(n, _, _))| {
            let score = if last == 0 {
                params.clamp_min + (span / 2.0).round()
            } else {
                params.clamp_min + ((rank as f64 / last as f64) * span).round()
            };
            (n, score)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table(values: &[(u8, f64)]) -> ScoreTable {
        values.iter().copied().collect()
    }

    #[test]
    fn test_extremes_map_to_clamps() {
        let t = table(&[(1, -0.4), (2, 0.1), (3, 0.9), (4, 0.0)]);
        let out = percentile_rank_transform(&t, &NormalizeParams::default());
        assert_eq!(out[&3], 98.0);
        assert_eq!(out[&1], 10.0);
        assert!(out[&4] < out[&2]);
    }

    #[test]
    fn test_ties_broken_by_number() {
        let t = table(&[(5, 0.3), (2, 0.3), (9, 0.3)]);
        let out = percentile_rank_transform(&t, &NormalizeParams::default());
        assert_eq!(out[&2], 10.0);
        assert_eq!(out[&5], 54.0);
        assert_eq!(out[&9], 98.0);
    }

    #[test]
    fn test_single_entry_gets_midpoint() {
        let out = percentile_rank_transform(&table(&[(7, 1.0)]), &NormalizeParams::default());
        assert_eq!(out[&7], 54.0);
    }

    #[test]
    fn test_empty_table() {
        assert!(percentile_rank_transform(&ScoreTable::new(), &NormalizeParams::default()).is_empty());
    }

    #[test]
    fn test_low_variance_keeps_order() {
        // Écarts minuscules : l'étirement ne doit rien inverser
        let t = table(&[(1, 0.001), (2, 0.002), (3, 0.0015)]);
        let out = percentile_rank_transform(&t, &NormalizeParams::default());
        assert!(out[&1] < out[&3] && out[&3] < out[&2]);
    }

    #[test]
    fn test_mean_std() {
        let (m, s) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((m - 5.0).abs() < 1e-12);
        assert!((s - 2.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn normalized_scores_bounded_and_monotonic(
            values in proptest::collection::btree_map(0u8..60, -3.0f64..3.0, 1..40)
        ) {
            let params = NormalizeParams::default();
            let out = percentile_rank_transform(&values, &params);
            prop_assert_eq!(out.len(), values.len());

            for &s in out.values() {
                prop_assert!(s >= params.clamp_min && s <= params.clamp_max);
            }
            for (a, va) in &values {
                for (b, vb) in &values {
                    if va < vb {
                        prop_assert!(out[a] <= out[b]);
                    }
                }
            }
            if values.len() > 1 {
                let argmax = values
                    .iter()
                    .max_by(|x, y| x.1.total_cmp(y.1).then(x.0.cmp(y.0)))
                    .map(|(n, _)| *n)
                    .unwrap();
                let argmin = values
                    .iter()
                    .min_by(|x, y| x.1.total_cmp(y.1).then(x.0.cmp(y.0)))
                    .map(|(n, _)| *n)
                    .unwrap();
                prop_assert_eq!(out[&argmax], params.clamp_max);
                prop_assert_eq!(out[&argmin], params.clamp_min);
            }
        }
    }
}

use std::collections::BTreeMap;

/// Poids à demi-vie : `w[i] = 0.5^(i/h)`, `w[0]` = tirage le plus récent.
pub fn half_life_weights(n: usize, half_life: f64) -> Vec<f64> {
    (0..n).map(|i| 0.5f64.powf(i as f64 / half_life)).collect()
}

/// Expositions pondérées d'une tranche.
#[derive(Debug, Clone, PartialEq)]
pub struct Exposure {
    /// Nombre d'apparitions pondéré par numéro (`C[n]`).
    pub counts: BTreeMap<u8, f64>,
    /// Cases exposées pondérées (`E`).
    pub total: f64,
}

/// `numbers_per_draw[i]` doit déjà être la tranche voulue du tirage i
/// (zone principale, deuxième zone ou position).
pub fn aggregate_exposure<S: AsRef<[u8]>>(
    numbers_per_draw: &[S],
    weights: &[f64],
    min: u8,
    max: u8,
) -> Exposure {
    let mut counts: BTreeMap<u8, f64> = (min..=max).map(|n| (n, 0.0)).collect();
    let mut total = 0.0f64;

    for (i, nums) in numbers_per_draw.iter().enumerate() {
        // Au-delà du vecteur de poids, le tirage ne compte pas
        let w = weights.get(i).copied().unwrap_or(0.0);
        let nums = nums.as_ref();
        total += w * nums.len() as f64;
        for n in nums {
            if let Some(c) = counts.get_mut(n) {
                *c += w;
            }
        }
    }

    Exposure { counts, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_half_life_example() {
        let w = half_life_weights(3, 8.0);
        assert!((w[0] - 1.0).abs() < 1e-12);
        assert!((w[1] - 0.917).abs() < 1e-3, "w[1] = {}", w[1]);
        assert!((w[2] - 0.841).abs() < 1e-3, "w[2] = {}", w[2]);
    }

    #[test]
    fn test_half_life_halves_at_h() {
        let w = half_life_weights(11, 10.0);
        assert!((w[10] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_weights() {
        assert!(half_life_weights(0, 8.0).is_empty());
    }

    #[test]
    fn test_aggregate_counts_and_exposure() {
        let draws: Vec<Vec<u8>> = vec![vec![1, 2, 3], vec![3, 4, 5]];
        let weights = vec![1.0, 0.5];
        let exp = aggregate_exposure(&draws, &weights, 1, 6);

        assert!((exp.total - 4.5).abs() < 1e-12);
        assert!((exp.counts[&3] - 1.5).abs() < 1e-12);
        assert!((exp.counts[&1] - 1.0).abs() < 1e-12);
        assert!((exp.counts[&5] - 0.5).abs() < 1e-12);
        // Jamais observé
        assert_eq!(exp.counts[&6], 0.0);
        assert_eq!(exp.counts.len(), 6);
    }

    #[test]
    fn test_aggregate_ignores_out_of_range_and_missing_weights() {
        let draws: Vec<Vec<u8>> = vec![vec![1, 60], vec![2], vec![3]];
        let weights = vec![1.0, 1.0];
        let exp = aggregate_exposure(&draws, &weights, 1, 10);

        // 60 compte dans l'exposition mais pas dans les comptes
        assert!((exp.total - 3.0).abs() < 1e-12);
        assert!(!exp.counts.contains_key(&60));
        // Le troisième tirage n'a pas de poids
        assert_eq!(exp.counts[&3], 0.0);
    }

    proptest! {
        #[test]
        fn weights_strictly_decreasing_in_unit_interval(n in 1usize..400, h in 0.5f64..64.0) {
            let w = half_life_weights(n, h);
            prop_assert_eq!(w.len(), n);
            prop_assert!((w[0] - 1.0).abs() < 1e-15);
            for pair in w.windows(2) {
                prop_assert!(pair[1] < pair[0]);
            }
            for &x in &w {
                prop_assert!(x > 0.0 && x <= 1.0);
            }
        }
    }
}

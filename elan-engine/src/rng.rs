//! Générateur pseudo-aléatoire propre à une invocation.
//!
//! Aucune fonction du moteur ne lit de source aléatoire globale : le
//! générateur est construit une fois par appel et passé par `&mut`.

use rand::distr::weighted::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// En dessous, la roulette est considérée comme vide.
const WEIGHT_UNDERFLOW: f64 = 1e-12;

pub struct SelectionRng {
    seed: Option<u64>,
    inner: StdRng,
}

impl SelectionRng {
    /// `None` tire une graine de l'entropie du système.
    pub fn new(seed: Option<u64>) -> Self {
        let inner = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self { seed, inner }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Index uniforme dans [0, n). `n` doit être > 0.
    pub fn below(&mut self, n: usize) -> usize {
        self.inner.random_range(0..n)
    }

    /// Index tiré proportionnellement aux poids ; uniforme si le total
    /// s'effondre. `weights` ne doit pas être vide.
    pub fn weighted_index(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().sum();
        if total > WEIGHT_UNDERFLOW {
            if let Ok(dist) = WeightedIndex::new(weights) {
                return dist.sample(&mut self.inner);
            }
        }
        self.below(weights.len())
    }
}

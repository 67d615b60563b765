use super::decay::Exposure;
use super::ScoreTable;

/// Log-lift court terme / long terme avec lissage additif :
/// `ln(p_short / p_long)`, `p = (C[n] + ε) / (E + ε·R)`.
pub fn log_lift(short: &Exposure, long: &Exposure, min: u8, max: u8, epsilon: f64) -> ScoreTable {
    let range = (max as usize).saturating_sub(min as usize) + 1;
    let smoothing = epsilon * range as f64;

    (min..=max)
        .map(|n| {
            let c_short = short.counts.get(&n).copied().unwrap_or(0.0);
            let c_long = long.counts.get(&n).copied().unwrap_or(0.0);
            let p_short = (c_short + epsilon) / (short.total + smoothing);
            let p_long = (c_long + epsilon) / (long.total + smoothing);
            (n, (p_short / p_long).ln())
        })
        .collect()
}

/// Taille d'échantillon effective de Kish : `(Σw)² / Σw²`.
pub fn kish_effective_size(weights: &[f64]) -> f64 {
    let sum: f64 = weights.iter().sum();
    let sum_sq: f64 = weights.iter().map(|w| w * w).sum();
    if sum_sq == 0.0 {
        return 0.0;
    }
    sum * sum / sum_sq
}

/// Facteur de rétrécissement `Neff / (Neff + k)`, 0 sans données.
pub fn kish_shrinkage(weights: &[f64], prior_strength: f64) -> f64 {
    let neff = kish_effective_size(weights);
    if neff == 0.0 {
        return 0.0;
    }
    neff / (neff + prior_strength)
}

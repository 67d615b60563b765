use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use elan_db::models::{GameShape, ShapeKind, Slice};

use crate::error::{EngineError, EngineResult};

/// Paramètres du pipeline de score (décroissance, lissage, normalisation).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    pub half_life_short: f64,
    pub half_life_long: f64,
    /// Force du prior pour le rétrécissement de Kish.
    pub prior_strength: f64,
    pub epsilon_main: f64,
    /// Lissage des tranches à une seule case (deuxième zone, positions).
    pub epsilon_single: f64,
    pub max_history: usize,
    pub clamp_min: f64,
    pub clamp_max: f64,
    pub low_variance_threshold: f64,
    pub stretch_factor: f64,
    pub min_draws_combination: usize,
    pub min_draws_digit: usize,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            half_life_short: 8.0,
            half_life_long: 40.0,
            prior_strength: 8.0,
            epsilon_main: 1.0,
            epsilon_single: 2.0,
            max_history: 300,
            clamp_min: 10.0,
            clamp_max: 98.0,
            low_variance_threshold: 0.15,
            stretch_factor: 1.8,
            min_draws_combination: 10,
            min_draws_digit: 5,
        }
    }
}

impl ScoringParams {
    pub fn epsilon_for(&self, slice: Slice) -> f64 {
        match slice {
            Slice::Main => self.epsilon_main,
            Slice::Secondary | Slice::Digit(_) => self.epsilon_single,
        }
    }

    pub fn min_draws_for(&self, shape: &GameShape) -> usize {
        match shape.kind {
            ShapeKind::Combination => self.min_draws_combination,
            ShapeKind::Digit => self.min_draws_digit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayParams {
    pub buffer: usize,
    pub max_attempts: usize,
    pub exclusion_penalty: f64,
    pub overlap_penalty: f64,
    pub next_set_penalty: f64,
    /// Nombre de valeurs de deuxième zone parcourues par rotation.
    pub secondary_rotation: usize,
}

impl Default for ReplayParams {
    fn default() -> Self {
        Self {
            buffer: 6,
            max_attempts: 30,
            exclusion_penalty: 0.9,
            overlap_penalty: 0.1,
            next_set_penalty: 0.6,
            secondary_rotation: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerParams {
    pub buffer: usize,
    pub max_attempts: usize,
    pub std_floor: f64,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            buffer: 12,
            max_attempts: 20,
            std_floor: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagerParams {
    pub cartesian_cap: usize,
    pub digit_top_n: usize,
    pub band_width: usize,
    pub secondary_top_n: usize,
    pub safe_mode_retry_factor: usize,
}

impl Default for PackagerParams {
    fn default() -> Self {
        Self {
            cartesian_cap: 5000,
            digit_top_n: 6,
            band_width: 3,
            secondary_top_n: 4,
            safe_mode_retry_factor: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringParams,
    pub replay: ReplayParams,
    pub sampler: SamplerParams,
    pub packager: PackagerParams,
    /// Tables de recouvrement maximal par étape, indexées par id de jeu.
    pub overlap_limits: BTreeMap<String, Vec<usize>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let overlap_limits = BTreeMap::from([
            ("lotto649".to_string(), vec![0, 1, 1, 2, 2, 2, 3, 3]),
            ("power638".to_string(), vec![0, 1, 1, 2, 2, 2, 3, 3]),
            ("daily539".to_string(), vec![0, 1, 1, 1, 2, 2, 2, 3]),
            ("digit3".to_string(), vec![0, 1, 1, 2]),
            ("digit4".to_string(), vec![0, 2, 2, 3]),
        ]);
        Self {
            scoring: ScoringParams::default(),
            replay: ReplayParams::default(),
            sampler: SamplerParams::default(),
            packager: PackagerParams::default(),
            overlap_limits,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Impossible de lire {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&json)
            .with_context(|| format!("Configuration JSON invalide : {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Impossible d'écrire {}", path.display()))?;
        Ok(())
    }

    /// Table de recouvrement d'un jeu ; repli dérivé de `count` pour les jeux inconnus.
    pub fn overlap_table(&self, shape: &GameShape) -> Vec<usize> {
        if let Some(table) = self.overlap_limits.get(&shape.id) {
            if !table.is_empty() {
                return table.clone();
            }
        }
        match shape.kind {
            ShapeKind::Combination => vec![0, 1, 1, 2, 2, 2, shape.count / 2],
            ShapeKind::Digit => {
                let loose = shape.count.saturating_sub(1);
                let tight = shape.count.saturating_sub(2);
                vec![0, tight, tight, loose]
            }
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        let s = &self.scoring;
        if !(s.half_life_short > 0.0) || !(s.half_life_long > 0.0) {
            return Err(EngineError::InvalidConfig(
                "les demi-vies doivent être strictement positives".to_string(),
            ));
        }
        if s.prior_strength < 0.0 || s.epsilon_main <= 0.0 || s.epsilon_single <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "lissage et prior doivent être positifs".to_string(),
            ));
        }
        if s.clamp_min >= s.clamp_max {
            return Err(EngineError::InvalidConfig(format!(
                "clamp_min ({}) doit être inférieur à clamp_max ({})",
                s.clamp_min, s.clamp_max
            )));
        }
        if s.max_history == 0 {
            return Err(EngineError::InvalidConfig("max_history doit être > 0".to_string()));
        }
        let r = &self.replay;
        for (name, factor) in [
            ("exclusion_penalty", r.exclusion_penalty),
            ("overlap_penalty", r.overlap_penalty),
            ("next_set_penalty", r.next_set_penalty),
        ] {
            if !(factor > 0.0 && factor <= 1.0) {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} doit être dans ]0, 1] (reçu {factor})"
                )));
            }
        }
        if r.max_attempts == 0 || self.sampler.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "le nombre maximal de tentatives doit être > 0".to_string(),
            ));
        }
        if self.packager.band_width == 0 || self.packager.digit_top_n == 0 {
            return Err(EngineError::InvalidConfig(
                "les largeurs de bande du packager doivent être > 0".to_string(),
            ));
        }
        if let Some((id, _)) = self.overlap_limits.iter().find(|(_, t)| t.is_empty()) {
            return Err(EngineError::InvalidConfig(format!(
                "table de recouvrement vide pour {id}"
            )));
        }
        Ok(())
    }
}

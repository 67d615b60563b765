//! Moteur de sélection : scores de momentum à décroissance exponentielle,
//! puis choix de grilles sous contraintes (exclusions, recouvrement,
//! diversité).

pub mod config;
pub mod engine;
pub mod error;
pub mod pool;
pub mod rng;
pub mod scoring;
pub mod selection;

pub use config::EngineConfig;
pub use engine::{Engine, Request};
pub use error::{EngineError, EngineResult};
pub use pool::{CombinationSpec, ExclusionSet, ExclusionSpec};
pub use scoring::{ShapeScores, SliceScores};
pub use selection::{DegradationReason, Recommendation, SelectionResult, Strategy};

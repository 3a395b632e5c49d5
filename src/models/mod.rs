//! Tier-3 anomaly scoring models and the hot-swappable manager around them.

pub mod decision_tree;
pub mod heuristic;
pub mod manager;

use std::collections::HashMap;

use crate::analysis::features::FeatureVector;

#[derive(Debug, Clone, Default)]
pub struct ModelScore {
    /// Normalized `0..=100` anomaly score.
    pub score: f64,
    /// Named per-feature contributions, for `ml_feature_contribution` on
    /// the resulting alert.
    pub explanation: HashMap<String, f64>,
}

/// An opaque tier-3 classifier. Implementations must be cheap to call
/// (scored per request) and safe to hold behind an `arc_swap::ArcSwap` so
/// the active model can be hot-swapped by [`manager::ModelManager`].
pub trait AnomalyModel: Send + Sync {
    fn score_with_explanation(&self, features: &FeatureVector) -> ModelScore;
    fn is_ready(&self) -> bool;
    fn name(&self) -> &str;
}

//! Default tier-3 model: a fixed-weight linear combination of the feature
//! vector. Always ready; used before any trained model has been loaded and
//! as the fallback if a retrain-and-swap attempt fails.

use std::collections::HashMap;

use crate::analysis::features::{FeatureIndex, FeatureVector, FEATURE_COUNT};
use crate::models::{AnomalyModel, ModelScore};

const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "request_time_z",
    "bytes_z",
    "error_rate_z",
    "request_volume_z",
    "path_request_time_z",
    "path_bytes_z",
    "html_asset_ratio",
    "post_to_get_ratio",
    "ua_changes_in_session",
    "is_new_path",
    "is_known_bad_ua",
    "is_headless_ua",
];

const WEIGHTS: [f64; FEATURE_COUNT] = [
    0.15, 0.1, 0.15, 0.1, 0.1, 0.05, 0.05, 0.05, 0.15, 0.05, 0.8, 0.6,
];

pub struct HeuristicModel;

impl AnomalyModel for HeuristicModel {
    fn score_with_explanation(&self, features: &FeatureVector) -> ModelScore {
        let mut explanation = HashMap::with_capacity(FEATURE_COUNT);
        let mut weighted_sum = 0.0;
        for i in 0..FEATURE_COUNT {
            let contribution = features.values[i] * WEIGHTS[i];
            weighted_sum += contribution;
            explanation.insert(FEATURE_NAMES[i].to_string(), contribution);
        }
        // weighted_sum ranges roughly over [-2.4, 2.4]; map to 0..100.
        let score = ((weighted_sum + 2.4) / 4.8 * 100.0).clamp(0.0, 100.0);
        ModelScore { score, explanation }
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_features_score_near_midpoint() {
        let model = HeuristicModel;
        let score = model.score_with_explanation(&FeatureVector::zeroed());
        assert!((score.score - 50.0).abs() < 1.0);
    }

    #[test]
    fn known_bad_ua_raises_score() {
        let model = HeuristicModel;
        let mut features = FeatureVector::zeroed();
        features.set(FeatureIndex::IsKnownBadUa, 1.0);
        let score = model.score_with_explanation(&features);
        assert!(score.score > 50.0);
    }
}

//! Fixed-position feature vector handed to the tier-3 model.
//!
//! Position in the vector is part of the model's contract: a retrained or
//! swapped-in model must agree on this ordering.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum FeatureIndex {
    RequestTimeZScore = 0,
    BytesZScore = 1,
    ErrorRateZScore = 2,
    RequestVolumeZScore = 3,
    PathRequestTimeZScore = 4,
    PathBytesZScore = 5,
    HtmlAssetRatio = 6,
    PostToGetRatio = 7,
    UaChangesInSession = 8,
    IsNewPath = 9,
    IsKnownBadUa = 10,
    IsHeadlessUa = 11,
}

pub const FEATURE_COUNT: usize = 12;

/// Normalize an unbounded z-score-like value into `(-1, 1)` via `tanh`,
/// keeping the feature vector's magnitude stable across metric kinds with
/// wildly different scales.
pub fn normalize(value: f64) -> f64 {
    value.tanh()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn zeroed() -> Self {
        Self {
            values: [0.0; FEATURE_COUNT],
        }
    }

    pub fn set(&mut self, index: FeatureIndex, value: f64) {
        self.values[index as usize] = value;
    }

    pub fn get(&self, index: FeatureIndex) -> f64 {
        self.values[index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_bounds_large_values() {
        assert!(normalize(1000.0) < 1.0);
        assert!(normalize(-1000.0) > -1.0);
    }

    #[test]
    fn set_and_get_round_trip() {
        let mut fv = FeatureVector::zeroed();
        fv.set(FeatureIndex::BytesZScore, 0.42);
        assert_eq!(fv.get(FeatureIndex::BytesZScore), 0.42);
    }
}

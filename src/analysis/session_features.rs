//! Derives the fixed feature vector for a single analyzed request, given the
//! z-scores and classifications already computed by the analysis pipeline.

use crate::analysis::features::{normalize, FeatureIndex, FeatureVector};

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionFeatureInputs {
    pub request_time_z: f64,
    pub bytes_z: f64,
    pub error_rate_z: f64,
    pub request_volume_z: f64,
    pub path_request_time_z: f64,
    pub path_bytes_z: f64,
    pub html_asset_ratio: f64,
    pub post_to_get_ratio: f64,
    pub ua_changes_in_session: usize,
    pub is_new_path: bool,
    pub is_known_bad_ua: bool,
    pub is_headless_ua: bool,
}

pub struct SessionFeatureExtractor;

impl SessionFeatureExtractor {
    pub fn extract(inputs: &SessionFeatureInputs) -> FeatureVector {
        let mut fv = FeatureVector::zeroed();
        fv.set(FeatureIndex::RequestTimeZScore, normalize(inputs.request_time_z));
        fv.set(FeatureIndex::BytesZScore, normalize(inputs.bytes_z));
        fv.set(FeatureIndex::ErrorRateZScore, normalize(inputs.error_rate_z));
        fv.set(FeatureIndex::RequestVolumeZScore, normalize(inputs.request_volume_z));
        fv.set(FeatureIndex::PathRequestTimeZScore, normalize(inputs.path_request_time_z));
        fv.set(FeatureIndex::PathBytesZScore, normalize(inputs.path_bytes_z));
        fv.set(FeatureIndex::HtmlAssetRatio, normalize(inputs.html_asset_ratio));
        fv.set(FeatureIndex::PostToGetRatio, normalize(inputs.post_to_get_ratio));
        fv.set(
            FeatureIndex::UaChangesInSession,
            normalize(inputs.ua_changes_in_session as f64),
        );
        fv.set(FeatureIndex::IsNewPath, if inputs.is_new_path { 1.0 } else { 0.0 });
        fv.set(
            FeatureIndex::IsKnownBadUa,
            if inputs.is_known_bad_ua { 1.0 } else { 0.0 },
        );
        fv.set(
            FeatureIndex::IsHeadlessUa,
            if inputs.is_headless_ua { 1.0 } else { 0.0 },
        );
        fv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_features_are_not_squashed() {
        let inputs = SessionFeatureInputs {
            is_new_path: true,
            is_known_bad_ua: true,
            ..Default::default()
        };
        let fv = SessionFeatureExtractor::extract(&inputs);
        assert_eq!(fv.get(FeatureIndex::IsNewPath), 1.0);
        assert_eq!(fv.get(FeatureIndex::IsKnownBadUa), 1.0);
    }
}

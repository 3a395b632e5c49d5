//! Base scores and scaling helpers shared by every detection tier.

/// Flat scores for tier-1 heuristic findings, save for the ramp-based rules
/// (requests/IP, failed-logins/IP) which use [`score_from_threshold`].
pub struct BaseScores;

impl BaseScores {
    pub const MISSING_UA: f64 = 5.0;
    pub const OUTDATED_BROWSER: f64 = 10.0;
    pub const KNOWN_BAD_UA: f64 = 75.0;
    pub const HEADLESS_BROWSER: f64 = 40.0;
    pub const UA_CYCLING: f64 = 85.0;
    pub const SUSPICIOUS_PATH_STRING: f64 = 95.0;
    pub const SENSITIVE_PATH_ON_NEW_IP: f64 = 80.0;
}

/// Default base score for a tier-2 z-score rule once it crosses its
/// threshold, before the linear `(|z| - threshold) * 5.0` add-on.
pub const DEFAULT_ZSCORE_BASE: f64 = 65.0;

/// Linear ramp between `(threshold, base)` and `(danger, max)`. Below
/// `threshold`, scores `0.0`. At or beyond `danger`, scores `max`.
pub fn score_from_threshold(value: f64, threshold: f64, danger: f64, base: f64, max: f64) -> f64 {
    if value <= threshold {
        return 0.0;
    }
    if danger <= threshold {
        return max;
    }
    if value >= danger {
        return max;
    }
    let fraction = (value - threshold) / (danger - threshold);
    base + fraction * (max - base)
}

/// `0.0` below `z_threshold`; else `min(base + (|z| - z_threshold) * 5.0, 99.0)`.
pub fn score_from_z_score(z: f64, z_threshold: f64, base: f64) -> f64 {
    let abs_z = z.abs();
    if abs_z < z_threshold {
        return 0.0;
    }
    (base + (abs_z - z_threshold) * 5.0).min(99.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_scaling_zero_below_threshold() {
        assert_eq!(score_from_threshold(5.0, 10.0, 20.0, 50.0, 98.0), 0.0);
    }

    #[test]
    fn threshold_scaling_interpolates_between_base_and_max() {
        let midpoint = score_from_threshold(15.0, 10.0, 20.0, 50.0, 98.0);
        assert!((midpoint - 74.0).abs() < 1e-9);
    }

    #[test]
    fn threshold_scaling_caps_at_max_past_danger() {
        assert_eq!(score_from_threshold(100.0, 10.0, 20.0, 50.0, 98.0), 98.0);
    }

    #[test]
    fn zscore_scaling_zero_below_threshold() {
        assert_eq!(score_from_z_score(1.0, 3.0, 65.0), 0.0);
    }

    #[test]
    fn zscore_scaling_caps_at_99() {
        assert_eq!(score_from_z_score(20.0, 3.0, 65.0), 99.0);
    }

    #[test]
    fn zscore_scaling_adds_five_per_sigma_over_threshold() {
        let score = score_from_z_score(5.0, 3.0, 65.0);
        assert!((score - 75.0).abs() < 1e-9);
    }
}

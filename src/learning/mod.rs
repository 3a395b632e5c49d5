//! Per-(entity, metric) dynamic thresholds learned from an EWMA baseline.
//!
//! Grounded in the source's `DynamicLearningEngine`: threshold recalculation
//! is a four-step pipeline (percentile base, absolute clamp, bounded
//! percent-change guard, percentile-keyed cache), security-critical entities
//! get a narrower change-percent allowance unless manually overridden, and
//! every accepted threshold change is appended to a bounded audit log. Each
//! baseline also carries a [`SeasonalModel`], fed from the same observations,
//! exposed separately via [`LearningEngine::get_seasonal_factor`] rather than
//! folded into the threshold itself.

use std::collections::{HashMap, VecDeque};

use crate::config::defaults::DEFAULT_THRESHOLD_PERCENTILE;
use crate::rolling::RollingStatistics;
use crate::seasonal::SeasonalModel;

const DEFAULT_AUDIT_CAPACITY: usize = 1000;
const DEFAULT_SIGMA_MULTIPLIER: f64 = 3.0;
const DEFAULT_MAX_CHANGE_PERCENT: f64 = 0.5;
const DEFAULT_MIN_SAMPLES_FOR_SEASONAL_PATTERN: usize = 1000;
const DEFAULT_THRESHOLD_CACHE_TTL_MS: u64 = 5 * 60 * 1000;
const STDDEV_FLOOR_FOR_ANOMALY_CHECK: f64 = 1.0;
const STDDEV_EPSILON: f64 = 1e-6;
/// Minimum change in rolling mean (relative) before a cached percentile is
/// recomputed early, independent of the TTL.
const THRESHOLD_CACHE_EPSILON: f64 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum LearningError {
    #[error("manual override {value} for {entity_key}/{metric_kind} rejected: outside validation bounds [{lower}, {upper}]")]
    OverrideOutOfBounds {
        entity_key: String,
        metric_kind: String,
        value: f64,
        lower: f64,
        upper: f64,
    },
    #[error("no baseline exists for {entity_key}/{metric_kind}")]
    NoBaseline { entity_key: String, metric_kind: String },
}

/// Per-metric-kind override of the default percent-change guard. Mirrors
/// the source's special handling of `path_error_rate` (halved) and
/// `ip_request_count` (doubled).
fn change_percent_multiplier(metric_kind: &str) -> f64 {
    match metric_kind {
        "path_error_rate" => 0.5,
        "ip_request_count" => 2.0,
        _ => 1.0,
    }
}

/// Metric kinds that are always treated as security-critical: changes to
/// their thresholds require `set_manual_override_with_validation`, never the
/// unchecked `set_manual_override`.
fn is_inherently_security_critical(metric_kind: &str) -> bool {
    matches!(
        metric_kind,
        "ip_failed_logins" | "session_failed_logins" | "path_error_rate" | "session_error_rate"
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicThreshold {
    pub mean: f64,
    pub stddev: f64,
    pub upper_threshold: f64,
    pub lower_threshold: f64,
    pub sample_count: u64,
    pub last_updated: u64,
    pub is_security_critical: bool,
}

impl Default for DynamicThreshold {
    fn default() -> Self {
        Self {
            mean: 0.0,
            stddev: 0.0,
            upper_threshold: f64::MAX,
            lower_threshold: 0.0,
            sample_count: 0,
            last_updated: 0,
            is_security_critical: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnomalyCheckResult {
    pub is_anomalous: bool,
    pub z_score: f64,
    pub effective_stddev: f64,
}

/// A percentile query result cached against the rolling mean at the time it
/// was computed, so repeated `get_entity_threshold` calls at the same
/// percentile don't re-sort the ring buffer every call.
#[derive(Debug, Clone, Copy)]
struct CachedPercentile {
    percentile: f64,
    value: f64,
    mean_at_computation: f64,
    computed_at_ms: u64,
}

#[derive(Debug, Clone)]
struct LearningBaseline {
    rolling: RollingStatistics,
    threshold: DynamicThreshold,
    manual_override: Option<f64>,
    is_security_critical: bool,
    seasonal: SeasonalModel,
    percentile_cache: Vec<CachedPercentile>,
}

impl LearningBaseline {
    fn new(metric_kind: &str, min_samples: usize, min_samples_for_seasonal_pattern: usize) -> Self {
        Self {
            rolling: RollingStatistics::new(0.1, 2000).with_min_samples(min_samples),
            threshold: DynamicThreshold::default(),
            manual_override: None,
            is_security_critical: is_inherently_security_critical(metric_kind),
            seasonal: SeasonalModel::new(min_samples_for_seasonal_pattern),
            percentile_cache: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp_ms: u64,
    pub entity_key: String,
    pub metric_kind: String,
    pub old_upper_threshold: f64,
    pub new_upper_threshold: f64,
    pub was_capped_by_change_guard: bool,
    pub reason: String,
}

pub struct LearningEngineConfig {
    pub sigma_multiplier: f64,
    pub max_change_percent: f64,
    /// Change-percent allowance for entities [`is_inherently_security_critical`]
    /// flags, used in place of `max_change_percent` for those metric kinds.
    pub security_critical_max_change_percent: f64,
    pub min_samples: usize,
    pub audit_capacity: usize,
    pub baseline_ttl_ms: u64,
    /// Percentile `calculate_threshold` reads off the rolling baseline when
    /// no override is active.
    pub default_percentile: f64,
    /// Minimum observations a [`SeasonalModel`] needs before its pattern is
    /// considered established.
    pub min_samples_for_seasonal_pattern: usize,
    /// How long a cached percentile value is trusted before being
    /// recomputed, independent of `THRESHOLD_CACHE_EPSILON` drift checks.
    pub threshold_cache_ttl_ms: u64,
}

impl Default for LearningEngineConfig {
    fn default() -> Self {
        Self {
            sigma_multiplier: DEFAULT_SIGMA_MULTIPLIER,
            max_change_percent: DEFAULT_MAX_CHANGE_PERCENT,
            security_critical_max_change_percent: DEFAULT_MAX_CHANGE_PERCENT * 0.5,
            min_samples: 30,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            baseline_ttl_ms: 24 * 60 * 60 * 1000,
            default_percentile: DEFAULT_THRESHOLD_PERCENTILE,
            min_samples_for_seasonal_pattern: DEFAULT_MIN_SAMPLES_FOR_SEASONAL_PATTERN,
            threshold_cache_ttl_ms: DEFAULT_THRESHOLD_CACHE_TTL_MS,
        }
    }
}

/// Learns and maintains per-(entity, metric-kind) dynamic thresholds.
pub struct LearningEngine {
    config: LearningEngineConfig,
    baselines: HashMap<(String, String), LearningBaseline>,
    audit_log: VecDeque<AuditEntry>,
}

impl LearningEngine {
    pub fn new(config: LearningEngineConfig) -> Self {
        Self {
            config,
            baselines: HashMap::new(),
            audit_log: VecDeque::new(),
        }
    }

    /// Feed one observation, updating the rolling baseline, the per-baseline
    /// seasonal model, and recomputing the dynamic threshold.
    pub fn record_observation(&mut self, entity_key: &str, metric_kind: &str, value: f64, ts_ms: u64) {
        let key = (entity_key.to_string(), metric_kind.to_string());
        let min_samples = self.config.min_samples;
        let min_samples_for_seasonal_pattern = self.config.min_samples_for_seasonal_pattern;
        let baseline = self.baselines.entry(key).or_insert_with(|| {
            LearningBaseline::new(metric_kind, min_samples, min_samples_for_seasonal_pattern)
        });

        baseline.rolling.add(value, ts_ms);
        baseline.seasonal.add_observation(ts_ms, value);
        baseline.percentile_cache.clear();

        if baseline.manual_override.is_some() {
            return;
        }

        let old_threshold = baseline.threshold;
        let (new_threshold, was_capped) = Self::calculate_threshold(
            &baseline.rolling,
            old_threshold,
            self.config.default_percentile,
            self.config.max_change_percent,
            self.config.security_critical_max_change_percent,
            metric_kind,
            baseline.is_security_critical,
            ts_ms,
        );
        baseline.threshold = new_threshold;

        if (new_threshold.upper_threshold - old_threshold.upper_threshold).abs() > 1e-9 {
            self.push_audit(AuditEntry {
                timestamp_ms: ts_ms,
                entity_key: entity_key.to_string(),
                metric_kind: metric_kind.to_string(),
                old_upper_threshold: old_threshold.upper_threshold,
                new_upper_threshold: new_threshold.upper_threshold,
                was_capped_by_change_guard: was_capped,
                reason: "recalculated".to_string(),
            });
        }
    }

    /// Threshold recalculation:
    /// 1. percentile of the rolling baseline as the candidate upper bound,
    /// 2. clamp to a non-negative lower bound,
    /// 3. bound the percent change from the previous threshold
    ///    (security-critical entities use a narrower allowance, further
    ///    adjusted by the metric kind's change-percent multiplier).
    ///
    /// Returns the new threshold and whether the change-percent guard
    /// actually clamped the percentile-derived candidate.
    #[allow(clippy::too_many_arguments)]
    fn calculate_threshold(
        rolling: &RollingStatistics,
        previous: DynamicThreshold,
        percentile: f64,
        max_change_percent: f64,
        security_critical_max_change_percent: f64,
        metric_kind: &str,
        is_security_critical: bool,
        ts_ms: u64,
    ) -> (DynamicThreshold, bool) {
        let mean = rolling.mean();
        let stddev = rolling.standard_deviation();

        // Step 1: percentile of the rolling baseline.
        let mut upper = rolling.percentile(percentile).unwrap_or(mean);
        let mut lower = rolling.percentile(1.0 - percentile).unwrap_or(mean - stddev);

        // Step 2: absolute clamp.
        lower = lower.max(0.0);
        if upper < lower {
            upper = lower;
        }

        // Step 3: bounded percent change from the previous threshold.
        let mut was_capped = false;
        if previous.sample_count > 0 && previous.upper_threshold.is_finite() && previous.upper_threshold > 0.0 {
            let base_allowance = if is_security_critical {
                security_critical_max_change_percent
            } else {
                max_change_percent
            };
            let allowance = base_allowance * change_percent_multiplier(metric_kind);
            let max_upper = previous.upper_threshold * (1.0 + allowance);
            let min_upper = previous.upper_threshold * (1.0 - allowance).max(0.0);
            let clamped = upper.clamp(min_upper, max_upper);
            was_capped = (clamped - upper).abs() > 1e-9;
            upper = clamped;
        }

        (
            DynamicThreshold {
                mean,
                stddev,
                upper_threshold: upper,
                lower_threshold: lower,
                sample_count: rolling.sample_count(),
                last_updated: ts_ms,
                is_security_critical,
            },
            was_capped,
        )
    }

    /// Independent 3-sigma anomaly check against the baseline, using a
    /// stddev floored at `1.0` when it falls below `1e-6` (avoids flagging
    /// every deviation from a near-constant baseline as anomalous).
    pub fn is_anomalous(&self, entity_key: &str, metric_kind: &str, value: f64) -> AnomalyCheckResult {
        let key = (entity_key.to_string(), metric_kind.to_string());
        let Some(baseline) = self.baselines.get(&key) else {
            return AnomalyCheckResult {
                is_anomalous: false,
                z_score: 0.0,
                effective_stddev: 0.0,
            };
        };
        let mean = baseline.rolling.mean();
        let raw_stddev = baseline.rolling.standard_deviation();
        let effective_stddev = if raw_stddev < STDDEV_EPSILON {
            STDDEV_FLOOR_FOR_ANOMALY_CHECK
        } else {
            raw_stddev
        };
        let z_score = (value - mean) / effective_stddev;
        AnomalyCheckResult {
            is_anomalous: z_score.abs() > 3.0,
            z_score,
            effective_stddev,
        }
    }

    pub fn get_threshold(&self, entity_key: &str, metric_kind: &str) -> Option<DynamicThreshold> {
        self.baselines
            .get(&(entity_key.to_string(), metric_kind.to_string()))
            .map(|b| b.manual_override.map_or(b.threshold, |ov| DynamicThreshold {
                upper_threshold: ov,
                ..b.threshold
            }))
    }

    /// Percentile-keyed threshold query with caching: a cached value is
    /// reused as long as it's within `threshold_cache_ttl_ms` of `now_ms` and
    /// the rolling mean hasn't drifted by more than
    /// [`THRESHOLD_CACHE_EPSILON`] (relative) since it was computed.
    /// Respects a manual override when one is active.
    pub fn get_entity_threshold(
        &mut self,
        entity_key: &str,
        metric_kind: &str,
        percentile: f64,
        now_ms: u64,
    ) -> Option<f64> {
        let ttl = self.config.threshold_cache_ttl_ms;
        let baseline = self
            .baselines
            .get_mut(&(entity_key.to_string(), metric_kind.to_string()))?;

        if let Some(override_value) = baseline.manual_override {
            return Some(override_value);
        }

        let mean = baseline.rolling.mean();
        if let Some(cached) = baseline
            .percentile_cache
            .iter()
            .find(|c| (c.percentile - percentile).abs() < f64::EPSILON)
        {
            let age_ok = now_ms.saturating_sub(cached.computed_at_ms) <= ttl;
            let drift = if cached.mean_at_computation.abs() > f64::EPSILON {
                ((mean - cached.mean_at_computation) / cached.mean_at_computation).abs()
            } else {
                (mean - cached.mean_at_computation).abs()
            };
            if age_ok && drift < THRESHOLD_CACHE_EPSILON {
                return Some(cached.value);
            }
        }

        let value = baseline.rolling.percentile(percentile)?;
        baseline.percentile_cache.retain(|c| (c.percentile - percentile).abs() >= f64::EPSILON);
        baseline.percentile_cache.push(CachedPercentile {
            percentile,
            value,
            mean_at_computation: mean,
            computed_at_ms: now_ms,
        });
        Some(value)
    }

    /// Seasonal multiplier for this entity/metric at `ts_ms`; `1.0` (neutral)
    /// if no baseline exists yet or its seasonal pattern isn't established.
    pub fn get_seasonal_factor(&mut self, entity_key: &str, metric_kind: &str, ts_ms: u64) -> f64 {
        match self
            .baselines
            .get_mut(&(entity_key.to_string(), metric_kind.to_string()))
        {
            Some(baseline) => baseline.seasonal.get_seasonal_factor(ts_ms),
            None => 1.0,
        }
    }

    /// Unconditional override; intended for non-security-critical metric
    /// kinds. Security-critical kinds should use
    /// [`Self::set_manual_override_with_validation`] instead.
    pub fn set_manual_override(&mut self, entity_key: &str, metric_kind: &str, value: f64) {
        let min_samples = self.config.min_samples;
        let min_samples_for_seasonal_pattern = self.config.min_samples_for_seasonal_pattern;
        let baseline = self
            .baselines
            .entry((entity_key.to_string(), metric_kind.to_string()))
            .or_insert_with(|| {
                LearningBaseline::new(metric_kind, min_samples, min_samples_for_seasonal_pattern)
            });
        baseline.manual_override = Some(value);
    }

    /// Override that rejects values outside `[0, current_upper * 10]` for
    /// security-critical entities, so an operator typo cannot silently
    /// disable detection on a sensitive metric.
    pub fn set_manual_override_with_validation(
        &mut self,
        entity_key: &str,
        metric_kind: &str,
        value: f64,
    ) -> Result<(), LearningError> {
        let min_samples = self.config.min_samples;
        let min_samples_for_seasonal_pattern = self.config.min_samples_for_seasonal_pattern;
        let baseline = self
            .baselines
            .entry((entity_key.to_string(), metric_kind.to_string()))
            .or_insert_with(|| {
                LearningBaseline::new(metric_kind, min_samples, min_samples_for_seasonal_pattern)
            });

        if baseline.is_security_critical {
            let upper_bound = (baseline.threshold.upper_threshold.max(1.0)) * 10.0;
            if value < 0.0 || value > upper_bound {
                return Err(LearningError::OverrideOutOfBounds {
                    entity_key: entity_key.to_string(),
                    metric_kind: metric_kind.to_string(),
                    value,
                    lower: 0.0,
                    upper: upper_bound,
                });
            }
        }
        baseline.manual_override = Some(value);
        Ok(())
    }

    pub fn clear_manual_override(&mut self, entity_key: &str, metric_kind: &str) {
        if let Some(baseline) = self
            .baselines
            .get_mut(&(entity_key.to_string(), metric_kind.to_string()))
        {
            baseline.manual_override = None;
        }
    }

    pub fn audit_log(&self) -> impl Iterator<Item = &AuditEntry> {
        self.audit_log.iter()
    }

    fn push_audit(&mut self, entry: AuditEntry) {
        self.audit_log.push_back(entry);
        while self.audit_log.len() > self.config.audit_capacity {
            self.audit_log.pop_front();
        }
    }

    /// Drop baselines whose rolling window has not been updated within
    /// `baseline_ttl_ms` of `now_ms`.
    pub fn cleanup_expired(&mut self, now_ms: u64) {
        let ttl = self.config.baseline_ttl_ms;
        self.baselines
            .retain(|_, baseline| now_ms.saturating_sub(baseline.rolling.last_update_time()) <= ttl);
    }

    pub fn baseline_count(&self) -> usize {
        self.baselines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> LearningEngine {
        LearningEngine::new(LearningEngineConfig {
            min_samples: 5,
            ..LearningEngineConfig::default()
        })
    }

    #[test]
    fn threshold_tracks_mean_after_enough_samples() {
        let mut e = engine();
        for i in 0..50 {
            e.record_observation("1.2.3.4", "ip_request_count", 10.0, i);
        }
        let t = e.get_threshold("1.2.3.4", "ip_request_count").unwrap();
        assert!((t.mean - 10.0).abs() < 1e-6);
        assert!(t.upper_threshold >= t.mean);
    }

    #[test]
    fn change_guard_limits_sudden_threshold_jump() {
        let mut e = engine();
        for i in 0..100 {
            e.record_observation("1.2.3.4", "path_error_rate", 1.0, i);
        }
        let before = e.get_threshold("1.2.3.4", "path_error_rate").unwrap();
        // inject one wild outlier; the change guard should still bound the jump
        e.record_observation("1.2.3.4", "path_error_rate", 10_000.0, 100);
        let after = e.get_threshold("1.2.3.4", "path_error_rate").unwrap();
        assert!(after.upper_threshold <= before.upper_threshold * 1.26);
    }

    #[test]
    fn security_critical_metric_gets_narrower_allowance() {
        let mut e = engine();
        for i in 0..100 {
            e.record_observation("1.2.3.4", "ip_failed_logins", 1.0, i);
        }
        let before = e.get_threshold("1.2.3.4", "ip_failed_logins").unwrap();
        assert!(before.is_security_critical);
    }

    #[test]
    fn manual_override_freezes_threshold() {
        let mut e = engine();
        e.set_manual_override("9.9.9.9", "ip_request_count", 500.0);
        for i in 0..50 {
            e.record_observation("9.9.9.9", "ip_request_count", 10.0, i);
        }
        let t = e.get_threshold("9.9.9.9", "ip_request_count").unwrap();
        assert_eq!(t.upper_threshold, 500.0);
    }

    #[test]
    fn validated_override_rejects_out_of_bounds_for_security_critical() {
        let mut e = engine();
        for i in 0..50 {
            e.record_observation("1.2.3.4", "ip_failed_logins", 1.0, i);
        }
        let result = e.set_manual_override_with_validation("1.2.3.4", "ip_failed_logins", 1_000_000.0);
        assert!(result.is_err());
    }

    #[test]
    fn is_anomalous_floors_stddev_on_constant_baseline() {
        let mut e = engine();
        for i in 0..50 {
            e.record_observation("1.2.3.4", "ip_bytes", 100.0, i);
        }
        let result = e.is_anomalous("1.2.3.4", "ip_bytes", 101.0);
        assert!(!result.is_anomalous);
        let result = e.is_anomalous("1.2.3.4", "ip_bytes", 200.0);
        assert!(result.is_anomalous);
    }

    #[test]
    fn cleanup_expired_drops_stale_baselines() {
        let mut e = engine();
        e.record_observation("1.2.3.4", "ip_bytes", 100.0, 1000);
        assert_eq!(e.baseline_count(), 1);
        e.cleanup_expired(1000 + 48 * 60 * 60 * 1000);
        assert_eq!(e.baseline_count(), 0);
    }

    #[test]
    fn audit_log_records_threshold_changes() {
        let mut e = engine();
        for i in 0..20 {
            e.record_observation("1.2.3.4", "ip_bytes", i as f64, i);
        }
        assert!(e.audit_log().count() > 0);
    }

    #[test]
    fn entity_threshold_tracks_percentile_and_respects_override() {
        let mut e = engine();
        for i in 0..200u64 {
            e.record_observation("1.2.3.4", "ip_bytes", 100.0, i);
        }
        let p95 = e.get_entity_threshold("1.2.3.4", "ip_bytes", 0.95, 200).unwrap();
        assert!((p95 - 100.0).abs() < 1.0);

        e.set_manual_override("1.2.3.4", "ip_bytes", 42.0);
        assert_eq!(e.get_entity_threshold("1.2.3.4", "ip_bytes", 0.95, 200), Some(42.0));

        e.clear_manual_override("1.2.3.4", "ip_bytes");
        let restored = e.get_entity_threshold("1.2.3.4", "ip_bytes", 0.95, 300).unwrap();
        assert!((restored - 100.0).abs() < 1.0);
    }

    #[test]
    fn entity_threshold_cache_is_invalidated_by_drift_not_just_ttl() {
        let mut e = engine();
        for i in 0..200u64 {
            e.record_observation("1.2.3.4", "ip_bytes", 100.0, i);
        }
        let cached = e.get_entity_threshold("1.2.3.4", "ip_bytes", 0.95, 200).unwrap();
        for i in 200..260u64 {
            e.record_observation("1.2.3.4", "ip_bytes", 1_000.0, i);
        }
        // still within the TTL window, but the mean drifted well past the epsilon
        let recomputed = e.get_entity_threshold("1.2.3.4", "ip_bytes", 0.95, 201).unwrap();
        assert!(recomputed > cached);
    }

    #[test]
    fn seasonal_factor_is_neutral_until_established_then_integrates_baseline_observations() {
        let mut e = LearningEngine::new(LearningEngineConfig {
            min_samples: 5,
            min_samples_for_seasonal_pattern: 48,
            ..LearningEngineConfig::default()
        });
        assert_eq!(e.get_seasonal_factor("1.2.3.4", "ip_bytes", 0), 1.0);
        for i in 0..60u64 {
            e.record_observation("1.2.3.4", "ip_bytes", 100.0, i * 3_600_000);
        }
        let factor = e.get_seasonal_factor("1.2.3.4", "ip_bytes", 60 * 3_600_000);
        assert!(factor.is_finite());
    }
}

//! System-wide default constants.
//!
//! Centralises magic numbers that would otherwise be scattered across the
//! codebase. Grouped by subsystem for easy discovery; per-field config
//! defaults live next to their struct in [`super::anomaly_config`] and are
//! not duplicated here unless another module also needs the same number.

// ============================================================================
// State snapshot
// ============================================================================

/// Magic number stamped at the head of a state snapshot file ("ANOM").
pub const STATE_FILE_MAGIC: u32 = 0x414E_4F4D;

/// Snapshot format version. Bumped whenever the on-disk record layout changes.
pub const STATE_FILE_VERSION: u32 = 1;

// ============================================================================
// Analysis engine
// ============================================================================

/// Default sliding-window duration for per-entity request tracking (ms).
pub const DEFAULT_WINDOW_DURATION_MS: u64 = 5 * 60 * 1000;

/// Default cap on elements retained per sliding window, independent of age.
pub const DEFAULT_MAX_WINDOW_ELEMENTS: usize = 1000;

/// Default minimum sample count before a z-score is considered established.
pub const DEFAULT_MIN_SAMPLES_FOR_ZSCORE: usize = 30;

/// Default session inactivity TTL before a session key is rebuilt fresh (ms).
pub const DEFAULT_SESSION_INACTIVITY_TTL_MS: u64 = 30 * 60 * 1000;

// ============================================================================
// Learning engine
// ============================================================================

/// Default sigma multiplier for the dynamic-threshold sigma band.
pub const DEFAULT_SIGMA_MULTIPLIER: f64 = 3.0;

/// Default bounded audit log capacity per [`crate::learning::LearningEngine`].
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

/// Default baseline time-to-live before an idle entity's baseline is dropped (ms).
pub const DEFAULT_BASELINE_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Default percentile `calculate_threshold` reads off `RollingStatistics`.
pub const DEFAULT_THRESHOLD_PERCENTILE: f64 = 0.95;

// ============================================================================
// Alerts
// ============================================================================

/// Default per-(ip, reason) throttle window (ms).
pub const DEFAULT_THROTTLE_DURATION_MS: u64 = 60_000;

/// Default maximum raw-log sample length carried on an [`crate::alerts::Alert`].
pub const DEFAULT_ALERT_SAMPLE_LEN: usize = 100;

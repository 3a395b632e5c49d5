//! Alert types and the sink trait that emits them.

pub mod file;
pub mod stdout;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertTier {
    Tier1Heuristic,
    Tier2Statistical,
    Tier3Ml,
    Tier4Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum AlertAction {
    NoAction = 0,
    Log = 1,
    Challenge = 2,
    RateLimit = 3,
    Block = 4,
}

impl AlertAction {
    /// Maps a normalized `0..=100` score into an action. Thresholds:
    /// `< 20` no action, `< 40` log, `< 60` challenge, `< 80` rate-limit,
    /// else block.
    pub fn from_score(score: f64) -> Self {
        if score < 20.0 {
            AlertAction::NoAction
        } else if score < 40.0 {
            AlertAction::Log
        } else if score < 60.0 {
            AlertAction::Challenge
        } else if score < 80.0 {
            AlertAction::RateLimit
        } else {
            AlertAction::Block
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub event_timestamp_ms: u64,
    pub source_ip: String,
    pub alert_reason: String,
    pub detection_tier: AlertTier,
    pub action: AlertAction,
    pub normalized_score: f64,
    pub offending_key_identifier: String,
    pub associated_log_line: Option<String>,
    pub raw_log_trigger_sample: Option<String>,
    pub ml_feature_contribution: Option<HashMap<String, f64>>,
    pub event_context: Option<String>,
}

/// Formats a truncated log-line sample the same way the human-readable
/// sink does, so both sinks agree on what "sample" means.
pub fn truncate_sample(raw: &str, max_len: usize) -> String {
    if raw.chars().count() <= max_len {
        raw.to_string()
    } else {
        let truncated: String = raw.chars().take(max_len).collect();
        format!("{truncated}...")
    }
}

pub trait AlertManager: Send + Sync {
    /// Record `alert`, subject to the sink's own throttling policy.
    /// Returns `true` if the alert was actually emitted (not suppressed).
    fn record_alert(&mut self, alert: Alert) -> bool;

    /// Flush any buffered output (e.g. a file sink's writer).
    fn flush(&mut self) -> std::io::Result<()>;
}

/// `(source_ip, alert_reason)` throttle key, matching the source's
/// `"IP:RuleReason"` convention.
pub fn throttle_key(source_ip: &str, alert_reason: &str) -> String {
    format!("{source_ip}:{alert_reason}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_thresholds_partition_the_score_range() {
        assert_eq!(AlertAction::from_score(0.0), AlertAction::NoAction);
        assert_eq!(AlertAction::from_score(25.0), AlertAction::Log);
        assert_eq!(AlertAction::from_score(45.0), AlertAction::Challenge);
        assert_eq!(AlertAction::from_score(65.0), AlertAction::RateLimit);
        assert_eq!(AlertAction::from_score(95.0), AlertAction::Block);
    }

    #[test]
    fn sample_truncation_adds_ellipsis_marker() {
        let long = "a".repeat(150);
        let truncated = truncate_sample(&long, 100);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 103);
    }

    #[test]
    fn sample_under_limit_is_unchanged() {
        assert_eq!(truncate_sample("short", 100), "short");
    }
}

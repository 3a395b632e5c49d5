//! Human-readable stdout alert sink with per-`(ip, reason)` throttling.

use std::collections::HashMap;

use crate::alerts::{throttle_key, Alert, AlertManager};

const SAMPLE_TRUNCATE_LEN: usize = 100;

pub struct StdoutAlertManager {
    throttle_window_ms: u64,
    max_alerts_per_window: usize,
    throttle_state: HashMap<String, (u64, usize)>,
}

impl StdoutAlertManager {
    pub fn new(throttle_window_ms: u64, max_alerts_per_window: usize) -> Self {
        Self {
            throttle_window_ms,
            max_alerts_per_window,
            throttle_state: HashMap::new(),
        }
    }

    /// True if this alert should be suppressed: same `(ip, reason)` seen
    /// within the throttle window, and the window's alert budget is spent.
    fn should_throttle(&mut self, alert: &Alert) -> bool {
        let key = throttle_key(&alert.source_ip, &alert.alert_reason);
        let entry = self.throttle_state.entry(key).or_insert((0, 0));
        let (last_ts, count) = *entry;

        if alert.event_timestamp_ms.saturating_sub(last_ts) > self.throttle_window_ms {
            *entry = (alert.event_timestamp_ms, 1);
            return false;
        }

        if count >= self.max_alerts_per_window {
            return true;
        }

        entry.1 += 1;
        false
    }

    fn format_human_readable(alert: &Alert) -> String {
        let mut out = String::new();
        out.push_str(&format!("Timestamp: {}\n", alert.event_timestamp_ms));
        out.push_str(&format!("Tier: {:?}\n", alert.detection_tier));
        out.push_str(&format!("Source IP: {}\n", alert.source_ip));
        out.push_str(&format!("Reason: {}\n", alert.alert_reason));
        if !alert.offending_key_identifier.is_empty() {
            out.push_str(&format!("Key ID: {}\n", alert.offending_key_identifier));
        }
        out.push_str(&format!("Score: {:.2}\n", alert.normalized_score));
        out.push_str(&format!("Action: {:?}\n", alert.action));
        if let Some(log_line) = &alert.associated_log_line {
            out.push_str(&format!("Log Line: {log_line}\n"));
        }
        if let Some(sample) = &alert.raw_log_trigger_sample {
            out.push_str(&format!(
                "Sample: {}\n",
                crate::alerts::truncate_sample(sample, SAMPLE_TRUNCATE_LEN)
            ));
        }
        out.push_str("----------------------------------------\n");
        out
    }
}

impl AlertManager for StdoutAlertManager {
    fn record_alert(&mut self, alert: Alert) -> bool {
        if self.should_throttle(&alert) {
            return false;
        }
        print!("{}", Self::format_human_readable(&alert));
        true
    }

    fn flush(&mut self) -> std::io::Result<()> {
        use std::io::Write;
        std::io::stdout().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertAction, AlertTier};

    fn alert(ts: u64, ip: &str, reason: &str) -> Alert {
        Alert {
            event_timestamp_ms: ts,
            source_ip: ip.to_string(),
            alert_reason: reason.to_string(),
            detection_tier: AlertTier::Tier1Heuristic,
            action: AlertAction::Log,
            normalized_score: 50.0,
            offending_key_identifier: String::new(),
            associated_log_line: None,
            raw_log_trigger_sample: None,
            ml_feature_contribution: None,
            event_context: None,
        }
    }

    #[test]
    fn first_alert_is_never_throttled() {
        let mut mgr = StdoutAlertManager::new(60_000, 1);
        assert!(mgr.record_alert(alert(1000, "1.2.3.4", "r")));
    }

    #[test]
    fn repeat_alert_within_window_beyond_budget_is_throttled() {
        let mut mgr = StdoutAlertManager::new(60_000, 1);
        assert!(mgr.record_alert(alert(1000, "1.2.3.4", "r")));
        assert!(!mgr.record_alert(alert(1500, "1.2.3.4", "r")));
    }

    #[test]
    fn alert_after_window_resets_throttle() {
        let mut mgr = StdoutAlertManager::new(1000, 1);
        assert!(mgr.record_alert(alert(1000, "1.2.3.4", "r")));
        assert!(mgr.record_alert(alert(3000, "1.2.3.4", "r")));
    }

    #[test]
    fn distinct_reasons_do_not_share_a_throttle_bucket() {
        let mut mgr = StdoutAlertManager::new(60_000, 1);
        assert!(mgr.record_alert(alert(1000, "1.2.3.4", "reason-a")));
        assert!(mgr.record_alert(alert(1000, "1.2.3.4", "reason-b")));
    }
}

//! The stateless tiered scorer: reads an [`AnalyzedEvent`], runs the four
//! detection tiers in order, combines their findings into a single score,
//! and assembles an [`Alert`] for the highest-priority tier that fired.
//!
//! Grounded in the source's `RuleEngine::evaluate_event`: tiers run
//! heuristic -> statistical -> ml -> dynamic-threshold, each may
//! short-circuit once the running score has already saturated, and the
//! allowlist check precedes all four.

pub mod scoring;

use aho_corasick::AhoCorasick;

use crate::alerts::{Alert, AlertAction, AlertTier};
use crate::allowlist::Allowlist;
use crate::analysis::analyzed_event::AnalyzedEvent;
use crate::analysis::log_entry::RequestType;
use crate::config::{AnomalyConfig, Tier1Config};
use crate::learning::LearningEngine;
use crate::models::manager::ModelManager;
use crate::rules::scoring::{score_from_threshold, score_from_z_score, BaseScores};

const SCORE_CAP: f64 = 100.0;

/// One tier's finding: enough to build an [`Alert`] if it turns out to be
/// the highest-priority tier that fired.
#[derive(Debug, Clone)]
struct Finding {
    tier: AlertTier,
    reason: String,
    score: f64,
    key_id: String,
}

pub struct RuleEngine<'a> {
    config: &'a AnomalyConfig,
    allowlist: &'a Allowlist,
    model_manager: &'a ModelManager,
    learning: &'a LearningEngine,
    suspicious_path_matcher: AhoCorasick,
    suspicious_ua_matcher: AhoCorasick,
}

impl<'a> RuleEngine<'a> {
    pub fn new(
        config: &'a AnomalyConfig,
        allowlist: &'a Allowlist,
        model_manager: &'a ModelManager,
        learning: &'a LearningEngine,
    ) -> Self {
        let suspicious_path_matcher = build_matcher(&config.tier1.suspicious_path_substrings);
        let suspicious_ua_matcher = build_matcher(&config.tier1.suspicious_ua_substrings);
        Self {
            config,
            allowlist,
            model_manager,
            learning,
            suspicious_path_matcher,
            suspicious_ua_matcher,
        }
    }

    /// Evaluates one event end to end. Returns `None` when the IP is
    /// allowlisted, no tier fires, or the assembled alert is throttled away
    /// (throttling itself is left to the caller's [`crate::alerts::AlertManager`],
    /// per spec §4.7 — this only decides *whether* to hand an alert off).
    pub fn evaluate(&self, event: &AnalyzedEvent) -> Option<Alert> {
        if self.allowlist.contains(&event.source_ip) {
            return None;
        }

        let mut findings: Vec<Finding> = Vec::new();
        let mut aggregate = 0.0_f64;

        if self.config.tier1.enabled {
            self.run_tier1(event, &mut findings, &mut aggregate);
        }
        if aggregate < SCORE_CAP && self.config.tier2.enabled {
            self.run_tier2(event, &mut findings, &mut aggregate);
        }
        if aggregate < SCORE_CAP && self.config.tier3.enabled {
            self.run_tier3(event, &mut findings, &mut aggregate);
        }
        if aggregate < SCORE_CAP && self.config.tier4.enabled {
            self.run_tier4(event, &mut findings, &mut aggregate);
        }

        let best = findings
            .into_iter()
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))?;

        if best.score < self.config.alerts.alert_threshold {
            return None;
        }

        Some(Alert {
            event_timestamp_ms: event.timestamp_ms,
            source_ip: event.source_ip.clone(),
            alert_reason: best.reason,
            detection_tier: best.tier,
            action: AlertAction::from_score(best.score),
            normalized_score: best.score.min(SCORE_CAP),
            offending_key_identifier: best.key_id,
            associated_log_line: Some(event.line_number.to_string()),
            raw_log_trigger_sample: Some(crate::alerts::truncate_sample(&event.raw_line, 256)),
            ml_feature_contribution: None,
            event_context: None,
        })
    }

    // ------------------------------------------------------------------
    // Tier 1 — heuristics
    // ------------------------------------------------------------------

    fn run_tier1(&self, event: &AnalyzedEvent, findings: &mut Vec<Finding>, aggregate: &mut f64) {
        let t1 = &self.config.tier1;

        self.push(
            findings,
            aggregate,
            AlertTier::Tier1Heuristic,
            "requests_per_ip_exceeded",
            &event.source_ip,
            score_from_threshold(
                event.ip_requests_in_window as f64,
                t1.max_requests_per_ip_in_window as f64,
                t1.max_requests_per_ip_dangerous as f64,
                t1.score_requests_per_ip_base,
                t1.score_requests_per_ip_max,
            ),
        );

        self.push(
            findings,
            aggregate,
            AlertTier::Tier1Heuristic,
            "failed_logins_per_ip_exceeded",
            &event.source_ip,
            score_from_threshold(
                event.ip_failed_logins_in_window as f64,
                t1.max_failed_logins_per_ip as f64,
                t1.max_failed_logins_per_ip_dangerous as f64,
                t1.score_failed_logins_per_ip_base,
                t1.score_failed_logins_per_ip_max,
            ),
        );

        if self.suspicious_path_matcher.is_match(&event.path) {
            self.push(
                findings,
                aggregate,
                AlertTier::Tier1Heuristic,
                "suspicious_path_pattern",
                &event.path,
                BaseScores::SUSPICIOUS_PATH_STRING,
            );
        }

        if t1.check_user_agent_anomalies {
            self.run_tier1_ua_checks(event, t1, findings, aggregate);
        }

        if event.ip_html_count >= t1.min_html_requests_for_ratio_check
            && event.html_asset_ratio < t1.min_assets_per_html_ratio
        {
            self.push(
                findings,
                aggregate,
                AlertTier::Tier1Heuristic,
                "asset_to_html_ratio_below_minimum",
                &event.source_ip,
                BaseScores::SUSPICIOUS_PATH_STRING.min(50.0),
            );
        }

        if event.is_new_path_for_ip
            && !event.is_new_ip
            && t1.sensitive_path_substrings.iter().any(|s| event.path.contains(s.as_str()))
        {
            self.push(
                findings,
                aggregate,
                AlertTier::Tier1Heuristic,
                "sensitive_path_first_access",
                &event.path,
                t1.score_sensitive_path_on_new_ip,
            );
        }

        if t1.session_tracking_enabled {
            self.run_tier1_session_checks(event, t1, findings, aggregate);
        }
    }

    fn run_tier1_ua_checks(
        &self,
        event: &AnalyzedEvent,
        t1: &Tier1Config,
        findings: &mut Vec<Finding>,
        aggregate: &mut f64,
    ) {
        let ua = &event.ua_analysis;
        if ua.is_missing {
            self.push(
                findings,
                aggregate,
                AlertTier::Tier1Heuristic,
                "missing_user_agent",
                &event.source_ip,
                t1.score_missing_ua,
            );
            return;
        }
        if ua.is_headless {
            self.push(
                findings,
                aggregate,
                AlertTier::Tier1Heuristic,
                "headless_browser_detected",
                &event.source_ip,
                t1.score_headless_browser,
            );
        }
        if ua.is_known_bad {
            self.push(
                findings,
                aggregate,
                AlertTier::Tier1Heuristic,
                "known_bad_user_agent",
                &event.source_ip,
                t1.score_known_bad_ua,
            );
        }
        if ua.is_outdated_browser {
            self.push(
                findings,
                aggregate,
                AlertTier::Tier1Heuristic,
                "outdated_browser",
                &event.source_ip,
                t1.score_outdated_browser,
            );
        }
        if event.is_ua_cycling {
            self.push(
                findings,
                aggregate,
                AlertTier::Tier1Heuristic,
                "user_agent_cycling",
                &event.source_ip,
                t1.score_ua_cycling,
            );
        }
        if let Some(ua) = &event.user_agent {
            if self.suspicious_ua_matcher.is_match(ua) {
                self.push(
                    findings,
                    aggregate,
                    AlertTier::Tier1Heuristic,
                    "suspicious_ua_pattern",
                    &event.source_ip,
                    BaseScores::KNOWN_BAD_UA,
                );
            }
        }
    }

    fn run_tier1_session_checks(
        &self,
        event: &AnalyzedEvent,
        t1: &Tier1Config,
        findings: &mut Vec<Finding>,
        aggregate: &mut f64,
    ) {
        self.push(
            findings,
            aggregate,
            AlertTier::Tier1Heuristic,
            "failed_logins_per_session_exceeded",
            &event.session_key,
            score_from_threshold(
                event.session_failed_login_count as f64,
                t1.max_failed_logins_per_session as f64,
                t1.max_failed_logins_per_session_dangerous as f64,
                t1.score_session_failed_logins_base,
                t1.score_session_failed_logins_max,
            ),
        );
        self.push(
            findings,
            aggregate,
            AlertTier::Tier1Heuristic,
            "requests_per_session_exceeded",
            &event.session_key,
            score_from_threshold(
                event.session_requests_in_window as f64,
                t1.max_requests_per_session_in_window as f64,
                t1.max_requests_per_session_dangerous as f64,
                t1.score_session_requests_base,
                t1.score_session_requests_max,
            ),
        );
        if event.ua_changes_in_session > t1.max_ua_changes_per_session {
            self.push(
                findings,
                aggregate,
                AlertTier::Tier1Heuristic,
                "excessive_ua_changes_in_session",
                &event.session_key,
                t1.score_session_ua_changes,
            );
        }
    }

    // ------------------------------------------------------------------
    // Tier 2 — statistical z-scores
    // ------------------------------------------------------------------

    fn run_tier2(&self, event: &AnalyzedEvent, findings: &mut Vec<Finding>, aggregate: &mut f64) {
        let t2 = &self.config.tier2;
        let zt = t2.z_score_threshold;
        let base = t2.score_base;

        let zscores: [(&str, crate::analysis::analyzed_event::ZScore); 8] = [
            ("ip_request_time_zscore", event.request_time_z),
            ("ip_bytes_zscore", event.bytes_z),
            ("ip_error_rate_zscore", event.error_rate_z),
            ("ip_request_volume_zscore", event.request_volume_z),
            ("path_request_time_zscore", event.path_request_time_z),
            ("path_bytes_zscore", event.path_bytes_z),
            ("path_error_rate_zscore", event.path_error_rate_z),
            ("path_request_volume_zscore", event.path_request_volume_z),
        ];

        for (name, z) in zscores {
            if !z.established {
                continue;
            }
            let score = score_from_z_score(z.value, zt, base);
            if score > 0.0 {
                self.push(findings, aggregate, AlertTier::Tier2Statistical, name, &event.source_ip, score);
            }
        }
    }

    // ------------------------------------------------------------------
    // Tier 3 — ML model
    // ------------------------------------------------------------------

    fn run_tier3(&self, event: &AnalyzedEvent, findings: &mut Vec<Finding>, aggregate: &mut f64) {
        let Some(features) = &event.features else {
            return;
        };
        let model = self.model_manager.get_active_model();
        let result = model.score_with_explanation(features);
        if result.score >= self.config.tier3.anomaly_score_threshold {
            findings.push(Finding {
                tier: AlertTier::Tier3Ml,
                reason: format!("ml_anomaly_score({})", model.name()),
                score: result.score.min(SCORE_CAP),
                key_id: event.source_ip.clone(),
            });
            *aggregate = aggregate.max(result.score).min(SCORE_CAP);
        }
    }

    // ------------------------------------------------------------------
    // Tier 4 — dynamic thresholds
    // ------------------------------------------------------------------

    fn run_tier4(&self, event: &AnalyzedEvent, findings: &mut Vec<Finding>, aggregate: &mut f64) {
        let sigma = self.config.tier4.sigma_multiplier;

        let checks: [(&str, &str, f64); 3] = [
            ("ip", "ip_request_time", event.request_time_s),
            ("ip", "ip_bytes_sent", event.bytes_sent as f64),
            ("path", "path_error_rate", if event.status_code >= 400 { 1.0 } else { 0.0 }),
        ];

        for (entity_kind, metric_kind, value) in checks {
            let entity_key = match entity_kind {
                "ip" => event.source_ip.as_str(),
                _ => event.path.as_str(),
            };
            let result = self.learning.is_anomalous(entity_key, metric_kind, value);
            if !result.is_anomalous {
                continue;
            }
            let proportional = ((result.z_score.abs() - sigma).max(0.0) * 10.0 + 50.0).min(98.0);
            self.push(
                findings,
                aggregate,
                AlertTier::Tier4Dynamic,
                &format!("dynamic_threshold_{metric_kind}"),
                entity_key,
                proportional,
            );
        }
    }

    fn push(
        &self,
        findings: &mut Vec<Finding>,
        aggregate: &mut f64,
        tier: AlertTier,
        reason: &str,
        key_id: &str,
        score: f64,
    ) {
        if score <= 0.0 {
            return;
        }
        findings.push(Finding {
            tier,
            reason: reason.to_string(),
            score,
            key_id: key_id.to_string(),
        });
        *aggregate = (*aggregate + score).min(SCORE_CAP);
    }
}

fn build_matcher(patterns: &[String]) -> AhoCorasick {
    if patterns.is_empty() {
        return AhoCorasick::new(["\u{0}__no_match_placeholder__\u{0}"]).expect("placeholder pattern always builds");
    }
    AhoCorasick::new(patterns).expect("configured substring patterns always build a valid automaton")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzed_event::ZScore;
    use crate::analysis::ua::UaAnalysis;

    fn base_event() -> AnalyzedEvent {
        AnalyzedEvent {
            timestamp_ms: 1000,
            source_ip: "10.0.0.1".to_string(),
            path: "/".to_string(),
            session_key: "10.0.0.1|ua".to_string(),
            request_type: RequestType::Html,
            is_new_ip: false,
            is_new_path_for_ip: false,
            is_new_session: false,
            request_time_z: ZScore::unestablished(),
            bytes_z: ZScore::unestablished(),
            error_rate_z: ZScore::unestablished(),
            request_volume_z: ZScore::unestablished(),
            path_request_time_z: ZScore::unestablished(),
            path_bytes_z: ZScore::unestablished(),
            path_error_rate_z: ZScore::unestablished(),
            path_request_volume_z: ZScore::unestablished(),
            html_asset_ratio: 1.0,
            ip_html_count: 1,
            post_to_get_ratio: 0.0,
            ua_changes_in_session: 0,
            ua_analysis: UaAnalysis::default(),
            ip_requests_in_window: 1,
            ip_failed_logins_in_window: 0,
            is_ua_cycling: false,
            is_ua_changed_for_ip: false,
            session_request_count: 1,
            session_failed_login_count: 0,
            session_requests_in_window: 1,
            user_agent: Some("Mozilla/5.0 Chrome/120.0.0.0".to_string()),
            status_code: 200,
            request_time_s: 0.01,
            bytes_sent: 512,
            line_number: 1,
            raw_line: "GET / HTTP/1.1".to_string(),
            features: None,
        }
    }

    #[test]
    fn requests_per_ip_over_threshold_fires_tier1() {
        let mut config = AnomalyConfig::default();
        config.tier1.max_requests_per_ip_in_window = 5;
        config.tier1.max_requests_per_ip_dangerous = 50;
        config.tier2.enabled = false;
        config.tier3.enabled = false;
        config.tier4.enabled = false;
        config.alerts.alert_threshold = 1.0;

        let allowlist = Allowlist::empty();
        let models = ModelManager::new(std::time::Duration::from_secs(3600));
        let learning = LearningEngine::new(Default::default());
        let engine = RuleEngine::new(&config, &allowlist, &models, &learning);

        let mut event = base_event();
        event.ip_requests_in_window = 6;

        let alert = engine.evaluate(&event).expect("expected an alert");
        assert_eq!(alert.detection_tier, AlertTier::Tier1Heuristic);
        assert_eq!(alert.source_ip, "10.0.0.1");
        assert!(alert.alert_reason.contains("requests_per_ip"));
        assert!(alert.normalized_score > 0.0);
    }

    #[test]
    fn allowlisted_ip_never_fires() {
        let mut config = AnomalyConfig::default();
        config.tier1.max_requests_per_ip_in_window = 1;
        config.alerts.alert_threshold = 0.0;

        let allowlist = Allowlist::parse("10.0.0.0/24\n").unwrap();
        let models = ModelManager::new(std::time::Duration::from_secs(3600));
        let learning = LearningEngine::new(Default::default());
        let engine = RuleEngine::new(&config, &allowlist, &models, &learning);

        let mut event = base_event();
        event.ip_requests_in_window = 1000;

        assert!(engine.evaluate(&event).is_none());
    }

    #[test]
    fn suspicious_path_pattern_fires() {
        let mut config = AnomalyConfig::default();
        config.tier1.suspicious_path_substrings = vec!["/wp-admin".to_string()];
        config.tier2.enabled = false;
        config.tier3.enabled = false;
        config.tier4.enabled = false;
        config.alerts.alert_threshold = 1.0;

        let allowlist = Allowlist::empty();
        let models = ModelManager::new(std::time::Duration::from_secs(3600));
        let learning = LearningEngine::new(Default::default());
        let engine = RuleEngine::new(&config, &allowlist, &models, &learning);

        let mut event = base_event();
        event.path = "/wp-admin/setup.php".to_string();

        let alert = engine.evaluate(&event).expect("expected an alert");
        assert_eq!(alert.alert_reason, "suspicious_path_pattern");
    }

    #[test]
    fn tier2_zscore_over_threshold_fires() {
        let mut config = AnomalyConfig::default();
        config.tier1.enabled = false;
        config.tier2.z_score_threshold = 3.0;
        config.tier3.enabled = false;
        config.tier4.enabled = false;
        config.alerts.alert_threshold = 1.0;

        let allowlist = Allowlist::empty();
        let models = ModelManager::new(std::time::Duration::from_secs(3600));
        let learning = LearningEngine::new(Default::default());
        let engine = RuleEngine::new(&config, &allowlist, &models, &learning);

        let mut event = base_event();
        event.bytes_z = ZScore {
            value: 5.0,
            established: true,
        };

        let alert = engine.evaluate(&event).expect("expected an alert");
        assert_eq!(alert.detection_tier, AlertTier::Tier2Statistical);
    }

    #[test]
    fn below_alert_threshold_emits_nothing() {
        let mut config = AnomalyConfig::default();
        config.tier1.enabled = false;
        config.tier2.enabled = false;
        config.tier3.enabled = false;
        config.tier4.enabled = false;
        config.alerts.alert_threshold = 1.0;

        let allowlist = Allowlist::empty();
        let models = ModelManager::new(std::time::Duration::from_secs(3600));
        let learning = LearningEngine::new(Default::default());
        let engine = RuleEngine::new(&config, &allowlist, &models, &learning);

        assert!(engine.evaluate(&base_event()).is_none());
    }
}

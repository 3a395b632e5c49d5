//! End-to-end scenarios driving the public engine/allowlist/learning APIs
//! the way the binary wires them together, one per documented behavior.

use std::time::Duration;

use anomaly_engine::analysis::log_entry::LogEntry;
use anomaly_engine::config::AnomalyConfig;
use anomaly_engine::learning::LearningEngine;
use anomaly_engine::models::manager::ModelManager;
use anomaly_engine::{AlertTier, Allowlist, AnalysisEngine, AnalysisEngineConfig, RuleEngine};

fn entry(ip: &str, ts: u64, path: &str, status: u16) -> LogEntry {
    LogEntry {
        timestamp_ms: ts,
        source_ip: ip.to_string(),
        method: "GET".to_string(),
        path: path.to_string(),
        protocol: "HTTP/1.1".to_string(),
        status_code: status,
        bytes_sent: 512,
        request_time_s: 0.01,
        user_agent: Some("curl/8.0".to_string()),
        referer: None,
        host: None,
        country: None,
        raw_line: String::new(),
        line_number: 0,
        successfully_parsed: true,
    }
}

/// Requests-per-IP threshold: six requests from one IP inside a 60s
/// window with `max_requests_per_ip_in_window=5` fires exactly once, on
/// the event that crosses the threshold.
#[test]
fn s1_requests_per_ip_threshold_fires_once() {
    let mut config = AnomalyConfig::default();
    config.tier1.max_requests_per_ip_in_window = 5;
    config.tier1.sliding_window_duration_seconds = 60;
    config.tier1.session_tracking_enabled = false;
    config.tier2.enabled = false;
    config.tier3.enabled = false;
    config.tier4.enabled = false;
    config.alerts.alert_threshold = 1.0;

    let allowlist = Allowlist::empty();
    let models = ModelManager::new(Duration::from_secs(3600));
    let learning = LearningEngine::new(Default::default());
    let rule_engine = RuleEngine::new(&config, &allowlist, &models, &learning);

    let mut engine_config = AnalysisEngineConfig::default();
    engine_config.session_tracking_enabled = false;
    let mut engine = AnalysisEngine::new(engine_config);

    let mut alerts = Vec::new();
    for ts in [1000u64, 1100, 1200, 1300, 1400, 1500] {
        let event = engine.process_and_analyze(&entry("10.0.0.1", ts, "/", 200));
        if let Some(alert) = rule_engine.evaluate(&event) {
            alerts.push(alert);
        }
    }

    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.source_ip, "10.0.0.1");
    assert_eq!(alert.detection_tier, AlertTier::Tier1Heuristic);
    assert_eq!(alert.alert_reason, "requests_per_ip_exceeded");
    assert!(alert.normalized_score > 0.0);
}

/// Failed-login detection: three 401s from one IP with
/// `max_failed_logins_per_ip=2` fires once the third event crosses it.
#[test]
fn s2_failed_login_detection_fires_on_third_event() {
    let mut config = AnomalyConfig::default();
    config.tier1.max_requests_per_ip_in_window = 1000;
    config.tier1.max_failed_logins_per_ip = 2;
    config.tier1.sliding_window_duration_seconds = 60;
    config.tier1.session_tracking_enabled = false;
    config.tier2.enabled = false;
    config.tier3.enabled = false;
    config.tier4.enabled = false;
    config.alerts.alert_threshold = 1.0;

    let allowlist = Allowlist::empty();
    let models = ModelManager::new(Duration::from_secs(3600));
    let learning = LearningEngine::new(Default::default());
    let rule_engine = RuleEngine::new(&config, &allowlist, &models, &learning);

    let mut engine_config = AnalysisEngineConfig::default();
    engine_config.session_tracking_enabled = false;
    let mut engine = AnalysisEngine::new(engine_config);

    let base_ts = 1_000_000u64;
    let mut alerts = Vec::new();
    for offset in [0u64, 10, 20] {
        let event = engine.process_and_analyze(&entry("10.0.0.2", base_ts + offset, "/login", 401));
        if let Some(alert) = rule_engine.evaluate(&event) {
            alerts.push(alert);
        }
    }

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].detection_tier, AlertTier::Tier1Heuristic);
    assert_eq!(alerts[0].alert_reason, "failed_logins_per_ip_exceeded");
}

/// Session TTL expiry: a 4s gap against a 1s inactivity TTL rebuilds the
/// session from scratch instead of continuing the prior one.
#[test]
fn s3_session_ttl_expiry_rebuilds_session() {
    let mut engine_config = AnalysisEngineConfig::default();
    engine_config.session_tracking_enabled = true;
    engine_config.session_inactivity_ttl_ms = 1_000;
    let mut engine = AnalysisEngine::new(engine_config);

    let first = engine.process_and_analyze(&entry("10.0.0.3", 1_000, "/", 200));
    assert_eq!(first.session_request_count, 1);

    let second = engine.process_and_analyze(&entry("10.0.0.3", 5_000, "/", 200));
    assert_eq!(second.session_request_count, 1);
}

/// Allowlist short-circuit: an allowlisted IP never fires, no matter how
/// many requests it sends.
#[test]
fn s4_allowlisted_ip_never_alerts() {
    let mut config = AnomalyConfig::default();
    config.tier1.max_requests_per_ip_in_window = 5;
    config.tier1.sliding_window_duration_seconds = 60;
    config.tier1.session_tracking_enabled = false;
    config.tier2.enabled = false;
    config.tier3.enabled = false;
    config.tier4.enabled = false;
    config.alerts.alert_threshold = 1.0;

    let allowlist = Allowlist::parse("10.0.0.0/24").expect("valid allowlist");
    let models = ModelManager::new(Duration::from_secs(3600));
    let learning = LearningEngine::new(Default::default());
    let rule_engine = RuleEngine::new(&config, &allowlist, &models, &learning);

    let mut engine_config = AnalysisEngineConfig::default();
    engine_config.session_tracking_enabled = false;
    let mut engine = AnalysisEngine::new(engine_config);

    let mut alerts = 0usize;
    for i in 0..1000u64 {
        let event = engine.process_and_analyze(&entry("10.0.0.9", 1_000 + i, "/", 200));
        if rule_engine.evaluate(&event).is_some() {
            alerts += 1;
        }
    }

    assert_eq!(alerts, 0);
}

/// Snapshot round-trip: state for 3 IPs survives a save/load cycle into a
/// freshly constructed engine.
#[test]
fn s5_snapshot_round_trip_preserves_ip_state_count() {
    let mut engine = AnalysisEngine::new(AnalysisEngineConfig::default());

    let ips = ["10.0.1.1", "10.0.1.2", "10.0.1.3"];
    for i in 0..100u64 {
        let ip = ips[(i % 3) as usize];
        engine.process_and_analyze(&entry(ip, 1_000 + i * 10, "/", 200));
    }

    let mut buf = Vec::new();
    engine.save_state(&mut buf).expect("save_state");

    let mut reloaded = AnalysisEngine::new(AnalysisEngineConfig::default());
    reloaded.load_state(&mut buf.as_slice()).expect("load_state");

    assert_eq!(reloaded.get_internal_state_metrics().tracked_ips, 3);

    for ip in ips {
        let before = engine.get_top_n_by_metric(10);
        let after = reloaded.get_top_n_by_metric(10);
        let before_count = before.iter().find(|(k, _)| k == ip).map(|(_, c)| *c);
        let after_count = after.iter().find(|(k, _)| k == ip).map(|(_, c)| *c);
        assert_eq!(before_count, after_count, "mismatched window count for {ip}");
    }
}

/// Dynamic threshold with manual override: a constant stream settles the
/// threshold near its value, a manual override replaces it outright, and
/// clearing the override reveals the last learned threshold again.
#[test]
fn s6_dynamic_threshold_manual_override_round_trip() {
    let mut learning = LearningEngine::new(Default::default());

    for i in 0..200u64 {
        learning.record_observation("A", "ip_value", 100.0, 1_000 + i * 10);
    }
    let last_ts = 1_000 + 199 * 10;
    let learned = learning
        .get_entity_threshold("A", "ip_value", 0.95, last_ts)
        .expect("threshold established");
    assert!((learned - 100.0).abs() / 100.0 < 0.01);

    learning.set_manual_override("A", "ip_value", 42.0);
    let overridden = learning
        .get_entity_threshold("A", "ip_value", 0.95, last_ts)
        .expect("threshold present");
    assert_eq!(overridden, 42.0);

    learning.clear_manual_override("A", "ip_value");
    let restored = learning
        .get_entity_threshold("A", "ip_value", 0.95, last_ts)
        .expect("threshold present");
    assert!((restored - 100.0).abs() / 100.0 < 0.01);
}

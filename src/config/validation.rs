//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " — did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `AnomalyConfig`.
///
/// Maintained manually to match the struct hierarchy in `anomaly_config.rs`.
/// Any new field added there must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [general]
        "general",
        "general.log_input_path",
        "general.allowlist_path",
        "general.state_file_path",
        "general.state_file_magic",
        "general.state_pruning_enabled",
        "general.state_ttl_seconds",
        "general.alerts_to_stdout",
        // [tier1]
        "tier1",
        "tier1.enabled",
        "tier1.sliding_window_duration_seconds",
        "tier1.max_requests_per_ip_in_window",
        "tier1.max_requests_per_ip_dangerous",
        "tier1.max_failed_logins_per_ip",
        "tier1.max_failed_logins_per_ip_dangerous",
        "tier1.failed_login_status_codes",
        "tier1.check_user_agent_anomalies",
        "tier1.headless_browser_substrings",
        "tier1.suspicious_ua_substrings",
        "tier1.min_chrome_version",
        "tier1.min_firefox_version",
        "tier1.max_unique_uas_per_ip_in_window",
        "tier1.max_unique_paths_stored_per_ip",
        "tier1.html_exact_paths",
        "tier1.asset_path_prefixes",
        "tier1.html_path_suffixes",
        "tier1.asset_path_suffixes",
        "tier1.min_assets_per_html_ratio",
        "tier1.min_html_requests_for_ratio_check",
        "tier1.session_tracking_enabled",
        "tier1.session_key_components",
        "tier1.session_inactivity_ttl_seconds",
        "tier1.max_failed_logins_per_session",
        "tier1.max_failed_logins_per_session_dangerous",
        "tier1.max_requests_per_session_in_window",
        "tier1.max_requests_per_session_dangerous",
        "tier1.max_ua_changes_per_session",
        "tier1.suspicious_path_substrings",
        "tier1.sensitive_path_substrings",
        "tier1.score_missing_ua",
        "tier1.score_outdated_browser",
        "tier1.score_known_bad_ua",
        "tier1.score_headless_browser",
        "tier1.score_ua_cycling",
        "tier1.score_suspicious_path_string",
        "tier1.score_sensitive_path_on_new_ip",
        "tier1.score_requests_per_ip_base",
        "tier1.score_requests_per_ip_max",
        "tier1.score_failed_logins_per_ip_base",
        "tier1.score_failed_logins_per_ip_max",
        "tier1.score_session_requests_base",
        "tier1.score_session_requests_max",
        "tier1.score_session_failed_logins_base",
        "tier1.score_session_failed_logins_max",
        "tier1.score_session_ua_changes",
        // [tier2]
        "tier2",
        "tier2.enabled",
        "tier2.min_samples_for_z_score",
        "tier2.z_score_threshold",
        "tier2.historical_deviation_factor",
        "tier2.score_base",
        // [tier3]
        "tier3",
        "tier3.enabled",
        "tier3.model_path",
        "tier3.model_metadata_path",
        "tier3.anomaly_score_threshold",
        "tier3.automated_retraining_enabled",
        "tier3.training_script_path",
        "tier3.retraining_interval_seconds",
        // [tier4]
        "tier4",
        "tier4.enabled",
        "tier4.min_samples_for_seasonal_pattern",
        "tier4.seasonal_detection_sensitivity",
        "tier4.threshold_cache_ttl_seconds",
        "tier4.security_critical_max_change_percent",
        "tier4.auto_mark_login_paths_critical",
        "tier4.auto_mark_admin_paths_critical",
        "tier4.auto_mark_high_failed_login_ips_critical",
        "tier4.failed_login_threshold_for_critical",
        "tier4.max_audit_entries_per_entity",
        "tier4.sigma_multiplier",
        "tier4.max_change_percent",
        "tier4.threshold_percentile",
        // [alerts]
        "alerts",
        "alerts.alert_threshold",
        "alerts.throttle_duration_ms",
        "alerts.alert_throttle_max_intervening_alerts",
        "alerts.action_threshold_log",
        "alerts.action_threshold_challenge",
        "alerts.action_threshold_rate_limit",
        "alerts.action_threshold_block",
        // [monitoring]
        "monitoring",
        "monitoring.enable_deep_timing",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.len();
    let b_len = b.len();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1)
                .min(curr[j] + 1)
                .min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist <= 3 {
            if let Some((_, best_dist)) = best {
                if dist < best_dist {
                    best = Some((k, dist));
                }
            } else {
                best = Some((k, dist));
            }
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys — it only warns. Existing configs
/// always continue to work.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    let found = walk_toml_keys(&value, "");
    let mut warnings = Vec::new();

    for key in &found {
        if !known.contains(key.as_str()) {
            let suggestion = suggest_correction(key, &known);
            let message = format!("Unknown config key '{key}'");
            warnings.push(ValidationWarning {
                field: key.clone(),
                message,
                suggestion,
            });
        }
    }

    warnings
}

// ============================================================================
// Physical Range Validation
// ============================================================================

/// Validate cross-field invariants on a parsed `AnomalyConfig`.
///
/// Returns `(errors, warnings)` — errors are values that would panic or
/// divide by zero downstream and must prevent startup; warnings are
/// suspicious but not fatal, per §7's "configuration value out of range"
/// taxonomy entry.
pub fn validate_physical_ranges(
    config: &super::AnomalyConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let t1 = &config.tier1;
    if t1.max_requests_per_ip_dangerous <= t1.max_requests_per_ip_in_window {
        warnings.push(ValidationWarning {
            field: "tier1.max_requests_per_ip_dangerous".to_string(),
            message: format!(
                "max_requests_per_ip_dangerous ({}) should exceed max_requests_per_ip_in_window ({})",
                t1.max_requests_per_ip_dangerous, t1.max_requests_per_ip_in_window
            ),
            suggestion: None,
        });
    }
    if t1.max_failed_logins_per_ip_dangerous <= t1.max_failed_logins_per_ip {
        warnings.push(ValidationWarning {
            field: "tier1.max_failed_logins_per_ip_dangerous".to_string(),
            message: format!(
                "max_failed_logins_per_ip_dangerous ({}) should exceed max_failed_logins_per_ip ({})",
                t1.max_failed_logins_per_ip_dangerous, t1.max_failed_logins_per_ip
            ),
            suggestion: None,
        });
    }
    if !(0.0..=1.0).contains(&t1.min_assets_per_html_ratio) {
        errors.push(format!(
            "tier1.min_assets_per_html_ratio = {:.2} must be within [0, 1]",
            t1.min_assets_per_html_ratio
        ));
    }

    let t2 = &config.tier2;
    if t2.z_score_threshold <= 0.0 {
        errors.push(format!(
            "tier2.z_score_threshold = {:.2} must be > 0 (used as a comparison bound)",
            t2.z_score_threshold
        ));
    }
    if t2.historical_deviation_factor <= 0.0 {
        errors.push(format!(
            "tier2.historical_deviation_factor = {:.2} must be > 0 (multiplies z_score_threshold)",
            t2.historical_deviation_factor
        ));
    }

    let t3 = &config.tier3;
    if !(0.0..=100.0).contains(&t3.anomaly_score_threshold) {
        warnings.push(ValidationWarning {
            field: "tier3.anomaly_score_threshold".to_string(),
            message: format!(
                "anomaly_score_threshold = {:.1} is outside the typical [0, 100] score range",
                t3.anomaly_score_threshold
            ),
            suggestion: None,
        });
    }

    let t4 = &config.tier4;
    if t4.sigma_multiplier <= 0.0 {
        errors.push(format!(
            "tier4.sigma_multiplier = {:.2} must be > 0 (used as a multiplier on stddev)",
            t4.sigma_multiplier
        ));
    }
    if t4.max_change_percent <= 0.0 {
        errors.push(format!(
            "tier4.max_change_percent = {:.2} must be > 0 (used as a divisor/guard band)",
            t4.max_change_percent
        ));
    }
    if t4.security_critical_max_change_percent <= 0.0 {
        errors.push(format!(
            "tier4.security_critical_max_change_percent = {:.2} must be > 0",
            t4.security_critical_max_change_percent
        ));
    }
    if t4.security_critical_max_change_percent > t4.max_change_percent {
        warnings.push(ValidationWarning {
            field: "tier4.security_critical_max_change_percent".to_string(),
            message: format!(
                "security_critical_max_change_percent ({:.2}) exceeds max_change_percent ({:.2}); critical entities would be allowed to drift faster than ordinary ones",
                t4.security_critical_max_change_percent, t4.max_change_percent
            ),
            suggestion: None,
        });
    }
    if t4.seasonal_detection_sensitivity <= 0.0 {
        errors.push(format!(
            "tier4.seasonal_detection_sensitivity = {:.2} must be > 0 (divides the sigma multiplier)",
            t4.seasonal_detection_sensitivity
        ));
    }
    if !(0.0..=1.0).contains(&t4.threshold_percentile) {
        errors.push(format!(
            "tier4.threshold_percentile = {:.3} must be in [0, 1]",
            t4.threshold_percentile
        ));
    }

    let alerts = &config.alerts;
    if !(alerts.action_threshold_log
        <= alerts.action_threshold_challenge
        && alerts.action_threshold_challenge <= alerts.action_threshold_rate_limit
        && alerts.action_threshold_rate_limit <= alerts.action_threshold_block)
    {
        errors.push(
            "alerts action thresholds must be non-decreasing: log <= challenge <= rate_limit <= block"
                .to_string(),
        );
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("efficency", "efficiency"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_flat() {
        let toml: toml::Value = r#"
            a = 1
            b = "hello"
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"a".to_string()));
        assert!(keys.contains(&"b".to_string()));
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [tier1]
            max_requests_per_ip_in_window = 10
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"tier1".to_string()));
        assert!(keys.contains(&"tier1.max_requests_per_ip_in_window".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[tier1]
max_requets_per_ip_in_window = 10
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].field.contains("max_requets_per_ip_in_window"));
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("tier1.max_requests_per_ip_in_window")
        );
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[general]
log_input_path = "/var/log/access.log"

[tier1]
max_requests_per_ip_in_window = 100

[alerts]
alert_threshold = 40.0
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(
            warnings.is_empty(),
            "Expected 0 warnings, got: {:?}",
            warnings
        );
    }

    #[test]
    fn test_unknown_section_produces_warning() {
        let toml_str = r#"
[tier1.typo_section]
some_field = 42
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(
            !warnings.is_empty(),
            "Expected warnings for unknown section"
        );
        assert!(warnings.iter().any(|w| w.field.contains("typo_section")));
    }

    #[test]
    fn test_suggest_correction_finds_close_match() {
        let known = known_config_keys();
        let suggestion = suggest_correction("tier1.max_requets_per_ip_in_window", &known);
        assert_eq!(
            suggestion.as_deref(),
            Some("tier1.max_requests_per_ip_in_window")
        );
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        let suggestion = suggest_correction("completely_unrelated_garbage_key_xyz", &known);
        assert!(suggestion.is_none());
    }

    #[test]
    fn test_known_keys_covers_all_sections() {
        let known = known_config_keys();
        assert!(known.contains("general"));
        assert!(known.contains("tier1"));
        assert!(known.contains("tier2"));
        assert!(known.contains("tier3"));
        assert!(known.contains("tier4"));
        assert!(known.contains("alerts"));
        assert!(known.contains("monitoring"));
        assert!(known.contains("tier1.max_requests_per_ip_in_window"));
        assert!(known.contains("tier4.security_critical_max_change_percent"));
        assert!(known.contains("alerts.throttle_duration_ms"));
    }

    #[test]
    fn test_physical_range_defaults_clean() {
        let config = crate::config::AnomalyConfig::default();
        let (errors, warnings) = validate_physical_ranges(&config);
        assert!(errors.is_empty(), "Defaults should produce no errors: {:?}", errors);
        assert!(warnings.is_empty(), "Defaults should produce no warnings: {:?}", warnings);
    }

    #[test]
    fn test_physical_range_zscore_threshold_zero() {
        let mut config = crate::config::AnomalyConfig::default();
        config.tier2.z_score_threshold = 0.0;
        let (errors, _) = validate_physical_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("z_score_threshold")));
    }

    #[test]
    fn test_physical_range_sigma_multiplier_zero() {
        let mut config = crate::config::AnomalyConfig::default();
        config.tier4.sigma_multiplier = 0.0;
        let (errors, _) = validate_physical_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("sigma_multiplier")));
    }

    #[test]
    fn test_physical_range_dangerous_below_threshold_warns() {
        let mut config = crate::config::AnomalyConfig::default();
        config.tier1.max_requests_per_ip_dangerous = 1;
        config.tier1.max_requests_per_ip_in_window = 1000;
        let (_, warnings) = validate_physical_ranges(&config);
        assert!(warnings.iter().any(|w| w.field.contains("max_requests_per_ip_dangerous")));
    }

    #[test]
    fn test_physical_range_action_thresholds_out_of_order() {
        let mut config = crate::config::AnomalyConfig::default();
        config.alerts.action_threshold_block = 10.0;
        config.alerts.action_threshold_log = 50.0;
        let (errors, _) = validate_physical_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("non-decreasing")));
    }
}

//! Anomaly-detection configuration.
//!
//! Provides per-deployment configuration loaded from TOML files, replacing
//! hardcoded detection thresholds with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `ANOMALY_CONFIG` environment variable (path to TOML file)
//! 2. `anomaly_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(AnomalyConfig::load());
//!
//! // Anywhere in the codebase:
//! let threshold = config::get().tier1.max_requests_per_ip_in_window;
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::alerts::AlertAction;
use crate::config::validation::{self, ValidationWarning};

// ============================================================================
// Provenance
// ============================================================================

/// Tracks which dotted config keys were explicitly set by the user, as
/// opposed to left at their compiled-in default.
#[derive(Debug, Clone, Default)]
pub struct ConfigProvenance {
    explicit_keys: HashSet<String>,
}

impl ConfigProvenance {
    pub fn is_user_set(&self, dotted_key: &str) -> bool {
        self.explicit_keys.contains(dotted_key)
    }

    pub fn explicit_keys(&self) -> impl Iterator<Item = &str> {
        self.explicit_keys.iter().map(|s| s.as_str())
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] toml::ser::Error),
    #[error("configuration validation failed:\n{}", .0.join("\n"))]
    Validation(Vec<String>),
}

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnomalyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub tier1: Tier1Config,
    #[serde(default)]
    pub tier2: Tier2Config,
    #[serde(default)]
    pub tier3: Tier3Config,
    #[serde(default)]
    pub tier4: Tier4Config,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            tier1: Tier1Config::default(),
            tier2: Tier2Config::default(),
            tier3: Tier3Config::default(),
            tier4: Tier4Config::default(),
            alerts: AlertsConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl AnomalyConfig {
    /// `$ANOMALY_CONFIG` env path -> `./anomaly_config.toml` -> built-in defaults.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("ANOMALY_CONFIG") {
            match Self::load_from_file(&path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(error = %e, path, "failed to load $ANOMALY_CONFIG, falling back");
                }
            }
        }

        let local = PathBuf::from("anomaly_config.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(error = %e, path = %local.display(), "failed to load local config, falling back to defaults");
                }
            }
        }

        Self::default()
    }

    pub fn load_with_provenance() -> (Self, ConfigProvenance) {
        if let Ok(path) = std::env::var("ANOMALY_CONFIG") {
            match Self::load_from_file_with_provenance(&path) {
                Ok(result) => return result,
                Err(e) => {
                    tracing::warn!(error = %e, path, "failed to load $ANOMALY_CONFIG, falling back");
                }
            }
        }
        let local = PathBuf::from("anomaly_config.toml");
        if local.exists() {
            match Self::load_from_file_with_provenance(&local) {
                Ok(result) => return result,
                Err(e) => {
                    tracing::warn!(error = %e, path = %local.display(), "failed to load local config, falling back to defaults");
                }
            }
        }
        (Self::default(), ConfigProvenance::default())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_from_file_with_provenance(path).map(|(config, _)| config)
    }

    pub fn load_from_file_with_provenance(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigProvenance), ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        for warning in validation::validate_unknown_keys(&raw) {
            tracing::warn!(field = %warning.field, "{}", warning);
        }

        let toml_value: toml::Value = raw
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::Parse(path.to_path_buf(), e))?;
        let explicit_keys: HashSet<String> = validation::walk_toml_keys(&toml_value, "").into_iter().collect();

        let config: Self = toml::from_str(&raw).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;

        Ok((config, ConfigProvenance { explicit_keys }))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))
    }

    /// Cross-field invariants per §6.2: rejects-and-logs individual bad keys
    /// rather than failing the whole load where §7 names a WARN-level
    /// "configuration value out of range" outcome; hard errors are reserved
    /// for values that would otherwise panic or divide by zero downstream.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = validation::validate_physical_ranges(self);
        for warning in &warnings {
            tracing::warn!(field = %warning.field, "{}", warning);
        }
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }
        Ok(())
    }

    /// Projects the subset of tier1/tier2/tier3 fields the analysis engine
    /// needs for its own window sizing, independent of the scoring
    /// thresholds [`crate::rules::RuleEngine`] reads directly off `self`.
    pub fn analysis_engine_config(&self) -> crate::analysis::AnalysisEngineConfig {
        crate::analysis::AnalysisEngineConfig {
            request_window_ms: self.tier1.sliding_window_duration_seconds * 1000,
            max_window_elements: super::defaults::DEFAULT_MAX_WINDOW_ELEMENTS,
            min_samples_for_zscore: self.tier2.min_samples_for_z_score,
            tier3_enabled: self.tier3.enabled,
            ml_data_collection_enabled: self.tier3.enabled,
            session_window_ms: self.tier1.sliding_window_duration_seconds * 1000,
            session_tracking_enabled: self.tier1.session_tracking_enabled,
            session_inactivity_ttl_ms: self.tier1.session_inactivity_ttl_seconds * 1000,
            min_chrome_version: self.tier1.min_chrome_version,
            min_firefox_version: self.tier1.min_firefox_version,
        }
    }

    /// Projects the tier4 fields into a [`crate::learning::LearningEngineConfig`].
    pub fn learning_engine_config(&self) -> crate::learning::LearningEngineConfig {
        crate::learning::LearningEngineConfig {
            sigma_multiplier: self.tier4.sigma_multiplier,
            max_change_percent: self.tier4.max_change_percent,
            security_critical_max_change_percent: self.tier4.security_critical_max_change_percent,
            min_samples: self.tier2.min_samples_for_z_score,
            audit_capacity: self.tier4.max_audit_entries_per_entity,
            baseline_ttl_ms: self.tier4.threshold_cache_ttl_seconds * 1000,
            default_percentile: self.tier4.threshold_percentile,
            min_samples_for_seasonal_pattern: self.tier4.min_samples_for_seasonal_pattern,
            threshold_cache_ttl_ms: self.tier4.threshold_cache_ttl_seconds * 1000,
        }
    }
}

// ============================================================================
// General
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    #[serde(default = "default_log_input_path")]
    pub log_input_path: String,
    #[serde(default)]
    pub allowlist_path: Option<String>,
    #[serde(default = "default_state_file_path")]
    pub state_file_path: String,
    #[serde(default = "default_state_file_magic")]
    pub state_file_magic: u32,
    #[serde(default = "default_true")]
    pub state_pruning_enabled: bool,
    #[serde(default = "default_state_ttl_seconds")]
    pub state_ttl_seconds: u64,
    #[serde(default = "default_true")]
    pub alerts_to_stdout: bool,
}

fn default_log_input_path() -> String {
    "access.log".to_string()
}
fn default_state_file_path() -> String {
    "state.bin".to_string()
}
fn default_state_file_magic() -> u32 {
    super::defaults::STATE_FILE_MAGIC
}
fn default_state_ttl_seconds() -> u64 {
    86_400
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_input_path: default_log_input_path(),
            allowlist_path: None,
            state_file_path: default_state_file_path(),
            state_file_magic: default_state_file_magic(),
            state_pruning_enabled: true,
            state_ttl_seconds: default_state_ttl_seconds(),
            alerts_to_stdout: true,
        }
    }
}

// ============================================================================
// Tier 1 — heuristics
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tier1Config {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_sliding_window_duration_seconds")]
    pub sliding_window_duration_seconds: u64,

    #[serde(default = "default_max_requests_per_ip_in_window")]
    pub max_requests_per_ip_in_window: u64,
    #[serde(default = "default_max_requests_per_ip_dangerous")]
    pub max_requests_per_ip_dangerous: u64,
    #[serde(default = "default_max_failed_logins_per_ip")]
    pub max_failed_logins_per_ip: u64,
    #[serde(default = "default_max_failed_logins_per_ip_dangerous")]
    pub max_failed_logins_per_ip_dangerous: u64,
    #[serde(default = "default_failed_login_status_codes")]
    pub failed_login_status_codes: Vec<u16>,

    #[serde(default = "default_true")]
    pub check_user_agent_anomalies: bool,
    #[serde(default = "default_headless_browser_substrings")]
    pub headless_browser_substrings: Vec<String>,
    #[serde(default = "default_suspicious_ua_substrings")]
    pub suspicious_ua_substrings: Vec<String>,
    #[serde(default = "default_min_chrome_version")]
    pub min_chrome_version: u32,
    #[serde(default = "default_min_firefox_version")]
    pub min_firefox_version: u32,
    #[serde(default = "default_max_unique_uas_per_ip_in_window")]
    pub max_unique_uas_per_ip_in_window: usize,
    #[serde(default = "default_max_unique_paths_stored_per_ip")]
    pub max_unique_paths_stored_per_ip: usize,

    #[serde(default = "default_html_exact_paths")]
    pub html_exact_paths: Vec<String>,
    #[serde(default = "default_asset_path_prefixes")]
    pub asset_path_prefixes: Vec<String>,
    #[serde(default = "default_html_path_suffixes")]
    pub html_path_suffixes: Vec<String>,
    #[serde(default = "default_asset_path_suffixes")]
    pub asset_path_suffixes: Vec<String>,
    #[serde(default = "default_min_assets_per_html_ratio")]
    pub min_assets_per_html_ratio: f64,
    #[serde(default = "default_min_html_requests_for_ratio_check")]
    pub min_html_requests_for_ratio_check: u64,

    #[serde(default = "default_true")]
    pub session_tracking_enabled: bool,
    #[serde(default = "default_session_key_components")]
    pub session_key_components: Vec<String>,
    #[serde(default = "default_session_inactivity_ttl_seconds")]
    pub session_inactivity_ttl_seconds: u64,
    #[serde(default = "default_max_failed_logins_per_session")]
    pub max_failed_logins_per_session: u64,
    #[serde(default = "default_max_failed_logins_per_session_dangerous")]
    pub max_failed_logins_per_session_dangerous: u64,
    #[serde(default = "default_max_requests_per_session_in_window")]
    pub max_requests_per_session_in_window: u64,
    #[serde(default = "default_max_requests_per_session_dangerous")]
    pub max_requests_per_session_dangerous: u64,
    #[serde(default = "default_max_ua_changes_per_session")]
    pub max_ua_changes_per_session: usize,

    #[serde(default = "default_suspicious_path_substrings")]
    pub suspicious_path_substrings: Vec<String>,
    #[serde(default = "default_sensitive_path_substrings")]
    pub sensitive_path_substrings: Vec<String>,

    #[serde(default = "default_score_missing_ua")]
    pub score_missing_ua: f64,
    #[serde(default = "default_score_outdated_browser")]
    pub score_outdated_browser: f64,
    #[serde(default = "default_score_known_bad_ua")]
    pub score_known_bad_ua: f64,
    #[serde(default = "default_score_headless_browser")]
    pub score_headless_browser: f64,
    #[serde(default = "default_score_ua_cycling")]
    pub score_ua_cycling: f64,
    #[serde(default = "default_score_suspicious_path_string")]
    pub score_suspicious_path_string: f64,
    #[serde(default = "default_score_sensitive_path_on_new_ip")]
    pub score_sensitive_path_on_new_ip: f64,
    #[serde(default = "default_score_requests_per_ip_base")]
    pub score_requests_per_ip_base: f64,
    #[serde(default = "default_score_requests_per_ip_max")]
    pub score_requests_per_ip_max: f64,
    #[serde(default = "default_score_failed_logins_per_ip_base")]
    pub score_failed_logins_per_ip_base: f64,
    #[serde(default = "default_score_failed_logins_per_ip_max")]
    pub score_failed_logins_per_ip_max: f64,
    #[serde(default = "default_score_session_requests_base")]
    pub score_session_requests_base: f64,
    #[serde(default = "default_score_session_requests_max")]
    pub score_session_requests_max: f64,
    #[serde(default = "default_score_session_failed_logins_base")]
    pub score_session_failed_logins_base: f64,
    #[serde(default = "default_score_session_failed_logins_max")]
    pub score_session_failed_logins_max: f64,
    #[serde(default = "default_score_session_ua_changes")]
    pub score_session_ua_changes: f64,
}

fn default_sliding_window_duration_seconds() -> u64 {
    300
}
fn default_max_requests_per_ip_in_window() -> u64 {
    1000
}
fn default_max_requests_per_ip_dangerous() -> u64 {
    5000
}
fn default_max_failed_logins_per_ip() -> u64 {
    10
}
fn default_max_failed_logins_per_ip_dangerous() -> u64 {
    50
}
fn default_failed_login_status_codes() -> Vec<u16> {
    vec![401, 403]
}
fn default_headless_browser_substrings() -> Vec<String> {
    ["headlesschrome", "phantomjs", "puppeteer", "playwright", "selenium"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_suspicious_ua_substrings() -> Vec<String> {
    ["sqlmap", "nmap", "nikto", "masscan", "zgrab"].iter().map(|s| s.to_string()).collect()
}
fn default_min_chrome_version() -> u32 {
    90
}
fn default_min_firefox_version() -> u32 {
    90
}
fn default_max_unique_uas_per_ip_in_window() -> usize {
    4
}
fn default_max_unique_paths_stored_per_ip() -> usize {
    500
}
fn default_html_exact_paths() -> Vec<String> {
    ["/", "/index.html", "/index.htm"].iter().map(|s| s.to_string()).collect()
}
fn default_asset_path_prefixes() -> Vec<String> {
    ["/static/", "/assets/", "/images/", "/css/", "/js/"].iter().map(|s| s.to_string()).collect()
}
fn default_html_path_suffixes() -> Vec<String> {
    [".html", ".htm"].iter().map(|s| s.to_string()).collect()
}
fn default_asset_path_suffixes() -> Vec<String> {
    [".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf", ".map"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_min_assets_per_html_ratio() -> f64 {
    0.5
}
fn default_min_html_requests_for_ratio_check() -> u64 {
    10
}
fn default_session_key_components() -> Vec<String> {
    vec!["ip".to_string(), "ua".to_string()]
}
fn default_session_inactivity_ttl_seconds() -> u64 {
    1800
}
fn default_max_failed_logins_per_session() -> u64 {
    5
}
fn default_max_failed_logins_per_session_dangerous() -> u64 {
    25
}
fn default_max_requests_per_session_in_window() -> u64 {
    500
}
fn default_max_requests_per_session_dangerous() -> u64 {
    2500
}
fn default_max_ua_changes_per_session() -> usize {
    4
}
fn default_suspicious_path_substrings() -> Vec<String> {
    [".env", "wp-admin", "/.git", "phpmyadmin", "eval(", "../../", "/etc/passwd", "UNION SELECT", "<script"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_sensitive_path_substrings() -> Vec<String> {
    ["/admin", "/login", "/wp-login", "/.env", "/config"].iter().map(|s| s.to_string()).collect()
}
fn default_score_missing_ua() -> f64 {
    5.0
}
fn default_score_outdated_browser() -> f64 {
    10.0
}
fn default_score_known_bad_ua() -> f64 {
    75.0
}
fn default_score_headless_browser() -> f64 {
    40.0
}
fn default_score_ua_cycling() -> f64 {
    85.0
}
fn default_score_suspicious_path_string() -> f64 {
    95.0
}
fn default_score_sensitive_path_on_new_ip() -> f64 {
    80.0
}
fn default_score_requests_per_ip_base() -> f64 {
    50.0
}
fn default_score_requests_per_ip_max() -> f64 {
    95.0
}
fn default_score_failed_logins_per_ip_base() -> f64 {
    60.0
}
fn default_score_failed_logins_per_ip_max() -> f64 {
    98.0
}
fn default_score_session_requests_base() -> f64 {
    45.0
}
fn default_score_session_requests_max() -> f64 {
    90.0
}
fn default_score_session_failed_logins_base() -> f64 {
    55.0
}
fn default_score_session_failed_logins_max() -> f64 {
    95.0
}
fn default_score_session_ua_changes() -> f64 {
    70.0
}

impl Default for Tier1Config {
    fn default() -> Self {
        Self {
            enabled: true,
            sliding_window_duration_seconds: default_sliding_window_duration_seconds(),
            max_requests_per_ip_in_window: default_max_requests_per_ip_in_window(),
            max_requests_per_ip_dangerous: default_max_requests_per_ip_dangerous(),
            max_failed_logins_per_ip: default_max_failed_logins_per_ip(),
            max_failed_logins_per_ip_dangerous: default_max_failed_logins_per_ip_dangerous(),
            failed_login_status_codes: default_failed_login_status_codes(),
            check_user_agent_anomalies: true,
            headless_browser_substrings: default_headless_browser_substrings(),
            suspicious_ua_substrings: default_suspicious_ua_substrings(),
            min_chrome_version: default_min_chrome_version(),
            min_firefox_version: default_min_firefox_version(),
            max_unique_uas_per_ip_in_window: default_max_unique_uas_per_ip_in_window(),
            max_unique_paths_stored_per_ip: default_max_unique_paths_stored_per_ip(),
            html_exact_paths: default_html_exact_paths(),
            asset_path_prefixes: default_asset_path_prefixes(),
            html_path_suffixes: default_html_path_suffixes(),
            asset_path_suffixes: default_asset_path_suffixes(),
            min_assets_per_html_ratio: default_min_assets_per_html_ratio(),
            min_html_requests_for_ratio_check: default_min_html_requests_for_ratio_check(),
            session_tracking_enabled: true,
            session_key_components: default_session_key_components(),
            session_inactivity_ttl_seconds: default_session_inactivity_ttl_seconds(),
            max_failed_logins_per_session: default_max_failed_logins_per_session(),
            max_failed_logins_per_session_dangerous: default_max_failed_logins_per_session_dangerous(),
            max_requests_per_session_in_window: default_max_requests_per_session_in_window(),
            max_requests_per_session_dangerous: default_max_requests_per_session_dangerous(),
            max_ua_changes_per_session: default_max_ua_changes_per_session(),
            suspicious_path_substrings: default_suspicious_path_substrings(),
            sensitive_path_substrings: default_sensitive_path_substrings(),
            score_missing_ua: default_score_missing_ua(),
            score_outdated_browser: default_score_outdated_browser(),
            score_known_bad_ua: default_score_known_bad_ua(),
            score_headless_browser: default_score_headless_browser(),
            score_ua_cycling: default_score_ua_cycling(),
            score_suspicious_path_string: default_score_suspicious_path_string(),
            score_sensitive_path_on_new_ip: default_score_sensitive_path_on_new_ip(),
            score_requests_per_ip_base: default_score_requests_per_ip_base(),
            score_requests_per_ip_max: default_score_requests_per_ip_max(),
            score_failed_logins_per_ip_base: default_score_failed_logins_per_ip_base(),
            score_failed_logins_per_ip_max: default_score_failed_logins_per_ip_max(),
            score_session_requests_base: default_score_session_requests_base(),
            score_session_requests_max: default_score_session_requests_max(),
            score_session_failed_logins_base: default_score_session_failed_logins_base(),
            score_session_failed_logins_max: default_score_session_failed_logins_max(),
            score_session_ua_changes: default_score_session_ua_changes(),
        }
    }
}

// ============================================================================
// Tier 2 — statistical
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tier2Config {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_samples_for_z_score")]
    pub min_samples_for_z_score: usize,
    #[serde(default = "default_z_score_threshold")]
    pub z_score_threshold: f64,
    /// Multiplier on `z_score_threshold` applied before comparison; `1.0`
    /// leaves the configured threshold unchanged.
    #[serde(default = "default_historical_deviation_factor")]
    pub historical_deviation_factor: f64,
    #[serde(default = "default_tier2_score_base")]
    pub score_base: f64,
}

fn default_min_samples_for_z_score() -> usize {
    30
}
fn default_z_score_threshold() -> f64 {
    3.0
}
fn default_historical_deviation_factor() -> f64 {
    1.0
}
fn default_tier2_score_base() -> f64 {
    crate::rules::scoring::DEFAULT_ZSCORE_BASE
}

impl Default for Tier2Config {
    fn default() -> Self {
        Self {
            enabled: true,
            min_samples_for_z_score: default_min_samples_for_z_score(),
            z_score_threshold: default_z_score_threshold(),
            historical_deviation_factor: default_historical_deviation_factor(),
            score_base: default_tier2_score_base(),
        }
    }
}

// ============================================================================
// Tier 3 — ML
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tier3Config {
    #[serde(default = "default_false")]
    pub enabled: bool,
    #[serde(default = "default_model_path")]
    pub model_path: String,
    #[serde(default)]
    pub model_metadata_path: Option<String>,
    #[serde(default = "default_anomaly_score_threshold")]
    pub anomaly_score_threshold: f64,
    #[serde(default = "default_false")]
    pub automated_retraining_enabled: bool,
    #[serde(default)]
    pub training_script_path: Option<String>,
    #[serde(default = "default_retraining_interval_seconds")]
    pub retraining_interval_seconds: u64,
}

fn default_model_path() -> String {
    "model.json".to_string()
}
fn default_anomaly_score_threshold() -> f64 {
    70.0
}
fn default_retraining_interval_seconds() -> u64 {
    3600
}

impl Default for Tier3Config {
    fn default() -> Self {
        Self {
            enabled: false,
            model_path: default_model_path(),
            model_metadata_path: None,
            anomaly_score_threshold: default_anomaly_score_threshold(),
            automated_retraining_enabled: false,
            training_script_path: None,
            retraining_interval_seconds: default_retraining_interval_seconds(),
        }
    }
}

// ============================================================================
// Tier 4 — dynamic / learned thresholds
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tier4Config {
    #[serde(default = "default_false")]
    pub enabled: bool,
    #[serde(default = "default_min_samples_for_seasonal_pattern")]
    pub min_samples_for_seasonal_pattern: usize,
    /// Divides the sigma multiplier before the seasonal-adjusted band is
    /// computed; `>1.0` makes the band narrower (more sensitive).
    #[serde(default = "default_seasonal_detection_sensitivity")]
    pub seasonal_detection_sensitivity: f64,
    #[serde(default = "default_threshold_cache_ttl_seconds")]
    pub threshold_cache_ttl_seconds: u64,
    #[serde(default = "default_security_critical_max_change_percent")]
    pub security_critical_max_change_percent: f64,
    #[serde(default = "default_true")]
    pub auto_mark_login_paths_critical: bool,
    #[serde(default = "default_true")]
    pub auto_mark_admin_paths_critical: bool,
    #[serde(default = "default_true")]
    pub auto_mark_high_failed_login_ips_critical: bool,
    #[serde(default = "default_failed_login_threshold_for_critical")]
    pub failed_login_threshold_for_critical: u64,
    #[serde(default = "default_max_audit_entries_per_entity")]
    pub max_audit_entries_per_entity: usize,
    #[serde(default = "default_sigma_multiplier")]
    pub sigma_multiplier: f64,
    #[serde(default = "default_max_change_percent")]
    pub max_change_percent: f64,
    /// Percentile of the rolling baseline the dynamic threshold tracks.
    #[serde(default = "default_threshold_percentile")]
    pub threshold_percentile: f64,
}

fn default_min_samples_for_seasonal_pattern() -> usize {
    1000
}
fn default_seasonal_detection_sensitivity() -> f64 {
    1.0
}
fn default_threshold_cache_ttl_seconds() -> u64 {
    super::defaults::DEFAULT_BASELINE_TTL_MS / 1000
}
fn default_security_critical_max_change_percent() -> f64 {
    0.25
}
fn default_failed_login_threshold_for_critical() -> u64 {
    5
}
fn default_max_audit_entries_per_entity() -> usize {
    100
}
fn default_sigma_multiplier() -> f64 {
    super::defaults::DEFAULT_SIGMA_MULTIPLIER
}
fn default_max_change_percent() -> f64 {
    0.5
}
fn default_threshold_percentile() -> f64 {
    super::defaults::DEFAULT_THRESHOLD_PERCENTILE
}

impl Default for Tier4Config {
    fn default() -> Self {
        Self {
            enabled: false,
            min_samples_for_seasonal_pattern: default_min_samples_for_seasonal_pattern(),
            seasonal_detection_sensitivity: default_seasonal_detection_sensitivity(),
            threshold_cache_ttl_seconds: default_threshold_cache_ttl_seconds(),
            security_critical_max_change_percent: default_security_critical_max_change_percent(),
            auto_mark_login_paths_critical: true,
            auto_mark_admin_paths_critical: true,
            auto_mark_high_failed_login_ips_critical: true,
            failed_login_threshold_for_critical: default_failed_login_threshold_for_critical(),
            max_audit_entries_per_entity: default_max_audit_entries_per_entity(),
            sigma_multiplier: default_sigma_multiplier(),
            max_change_percent: default_max_change_percent(),
            threshold_percentile: default_threshold_percentile(),
        }
    }
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertsConfig {
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    #[serde(default = "default_throttle_duration_ms")]
    pub throttle_duration_ms: u64,
    #[serde(default = "default_alert_throttle_max_intervening_alerts")]
    pub alert_throttle_max_intervening_alerts: u64,
    #[serde(default = "default_action_threshold_log")]
    pub action_threshold_log: f64,
    #[serde(default = "default_action_threshold_challenge")]
    pub action_threshold_challenge: f64,
    #[serde(default = "default_action_threshold_rate_limit")]
    pub action_threshold_rate_limit: f64,
    #[serde(default = "default_action_threshold_block")]
    pub action_threshold_block: f64,
}

fn default_alert_threshold() -> f64 {
    50.0
}
fn default_throttle_duration_ms() -> u64 {
    super::defaults::DEFAULT_THROTTLE_DURATION_MS
}
fn default_alert_throttle_max_intervening_alerts() -> u64 {
    0
}
fn default_action_threshold_log() -> f64 {
    20.0
}
fn default_action_threshold_challenge() -> f64 {
    40.0
}
fn default_action_threshold_rate_limit() -> f64 {
    60.0
}
fn default_action_threshold_block() -> f64 {
    80.0
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            alert_threshold: default_alert_threshold(),
            throttle_duration_ms: default_throttle_duration_ms(),
            alert_throttle_max_intervening_alerts: default_alert_throttle_max_intervening_alerts(),
            action_threshold_log: default_action_threshold_log(),
            action_threshold_challenge: default_action_threshold_challenge(),
            action_threshold_rate_limit: default_action_threshold_rate_limit(),
            action_threshold_block: default_action_threshold_block(),
        }
    }
}

impl AlertsConfig {
    /// Configurable replacement for [`AlertAction::from_score`]'s fixed
    /// 20/40/60/80 bands.
    pub fn action_for_score(&self, score: f64) -> AlertAction {
        if score < self.action_threshold_log {
            AlertAction::NoAction
        } else if score < self.action_threshold_challenge {
            AlertAction::Log
        } else if score < self.action_threshold_rate_limit {
            AlertAction::Challenge
        } else if score < self.action_threshold_block {
            AlertAction::RateLimit
        } else {
            AlertAction::Block
        }
    }
}

// ============================================================================
// Monitoring
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub enable_deep_timing: bool,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = AnomalyConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_produces_defaults() {
        let config: AnomalyConfig = toml::from_str("").unwrap();
        assert_eq!(config, AnomalyConfig::default());
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let toml_str = r#"
[tier1]
max_requests_per_ip_in_window = 10
"#;
        let config: AnomalyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.tier1.max_requests_per_ip_in_window, 10);
        assert_eq!(config.tier1.max_failed_logins_per_ip, Tier1Config::default().max_failed_logins_per_ip);
        assert_eq!(config.tier2, Tier2Config::default());
    }

    #[test]
    fn roundtrip_toml_preserves_values() {
        let mut config = AnomalyConfig::default();
        config.tier1.max_requests_per_ip_in_window = 42;
        let serialized = config.to_toml().unwrap();
        let reloaded: AnomalyConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn validation_rejects_zero_max_change_percent_window() {
        let mut config = AnomalyConfig::default();
        config.tier4.max_change_percent = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_negative_throttle_duration_via_range_check() {
        let mut config = AnomalyConfig::default();
        config.alerts.throttle_duration_ms = 0;
        // zero is a legal (if unusual) "never throttle" setting, must not error
        assert!(config.validate().is_ok());
    }

    #[test]
    fn action_for_score_respects_configured_bands() {
        let alerts = AlertsConfig::default();
        assert_eq!(alerts.action_for_score(0.0), AlertAction::NoAction);
        assert_eq!(alerts.action_for_score(90.0), AlertAction::Block);
    }

    #[test]
    fn provenance_tracks_explicit_keys_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anomaly_config.toml");
        std::fs::write(&path, "[tier1]\nmax_requests_per_ip_in_window = 7\n").unwrap();
        let (config, provenance) = AnomalyConfig::load_from_file_with_provenance(&path).unwrap();
        assert_eq!(config.tier1.max_requests_per_ip_in_window, 7);
        assert!(provenance.is_user_set("tier1.max_requests_per_ip_in_window"));
        assert!(!provenance.is_user_set("tier2.z_score_threshold"));
    }

    #[test]
    fn unknown_key_warns_but_does_not_fail_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anomaly_config.toml");
        std::fs::write(&path, "[tier1]\nmax_requets_per_ip_in_window = 7\n").unwrap();
        let result = AnomalyConfig::load_from_file(&path);
        assert!(result.is_ok());
    }
}

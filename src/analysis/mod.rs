//! Stateful per-request analysis: maintains per-IP/per-path/per-session
//! rolling state and turns each parsed log line into an [`AnalyzedEvent`]
//! carrying z-scores, classifications, and (optionally) a feature vector.

pub mod analyzed_event;
pub mod features;
pub mod log_entry;
pub mod per_ip_state;
pub mod per_path_state;
pub mod per_session_state;
pub mod session_features;
pub mod ua;

use std::collections::HashMap;
use std::io::{self, Read, Write};

use thiserror::Error;

use crate::analysis::analyzed_event::{AnalyzedEvent, ZScore};
use crate::analysis::log_entry::{get_request_type, LogEntry};
use crate::analysis::per_ip_state::PerIpState;
use crate::analysis::per_path_state::PerPathState;
use crate::analysis::per_session_state::{build_session_key, PerSessionState};
use crate::analysis::session_features::{SessionFeatureExtractor, SessionFeatureInputs};
use crate::analysis::ua::analyze_user_agent_with_versions;
use crate::rolling::RollingStatistics;

const STATE_FILE_MAGIC: u32 = 0x414E_4F4D; // "ANOM"
const STATE_FILE_VERSION: u32 = 1;

const REQUEST_TIME_STDDEV_EPSILON: f64 = 1e-6;
const BYTES_STDDEV_EPSILON: f64 = 1.0;
const ERROR_RATE_STDDEV_EPSILON: f64 = 0.01;
const REQUEST_VOLUME_STDDEV_EPSILON: f64 = 0.5;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("state file io error: {0}")]
    Io(#[from] io::Error),
    #[error("state file magic mismatch: expected {expected:#x}, found {found:#x}")]
    MagicMismatch { expected: u32, found: u32 },
    #[error("state file version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

#[derive(Debug, Clone)]
pub struct AnalysisEngineConfig {
    pub request_window_ms: u64,
    pub max_window_elements: usize,
    pub min_samples_for_zscore: usize,
    pub tier3_enabled: bool,
    pub ml_data_collection_enabled: bool,
    pub session_window_ms: u64,
    pub session_tracking_enabled: bool,
    /// Sessions idle longer than this are torn down and replaced with a
    /// fresh one on the next event for the same key (spec S3).
    pub session_inactivity_ttl_ms: u64,
    pub min_chrome_version: u32,
    pub min_firefox_version: u32,
}

impl Default for AnalysisEngineConfig {
    fn default() -> Self {
        Self {
            request_window_ms: 5 * 60 * 1000,
            max_window_elements: 1000,
            min_samples_for_zscore: 30,
            tier3_enabled: false,
            ml_data_collection_enabled: false,
            session_window_ms: 30 * 60 * 1000,
            session_tracking_enabled: true,
            session_inactivity_ttl_ms: 30 * 60 * 1000,
            min_chrome_version: 90,
            min_firefox_version: 90,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EngineStateMetrics {
    pub tracked_ips: usize,
    pub tracked_paths: usize,
    pub tracked_sessions: usize,
    pub max_timestamp_seen: u64,
}

pub struct AnalysisEngine {
    config: AnalysisEngineConfig,
    ip_states: HashMap<String, PerIpState>,
    path_states: HashMap<String, PerPathState>,
    session_states: HashMap<String, PerSessionState>,
    max_timestamp_seen: u64,
}

impl AnalysisEngine {
    pub fn new(config: AnalysisEngineConfig) -> Self {
        Self {
            config,
            ip_states: HashMap::new(),
            path_states: HashMap::new(),
            session_states: HashMap::new(),
            max_timestamp_seen: 0,
        }
    }

    fn get_or_create_ip_state(&mut self, ip: &str, now_ms: u64) -> &mut PerIpState {
        let window_ms = self.config.request_window_ms;
        let max_elements = self.config.max_window_elements;
        self.ip_states
            .entry(ip.to_string())
            .or_insert_with(|| PerIpState::new(now_ms, window_ms, max_elements))
    }

    fn get_or_create_path_state(&mut self, path: &str, now_ms: u64) -> &mut PerPathState {
        self.path_states
            .entry(path.to_string())
            .or_insert_with(|| PerPathState::new(now_ms))
    }

    fn get_or_create_session_state(&mut self, key: &str, now_ms: u64) -> &mut PerSessionState {
        let window_ms = self.config.session_window_ms;
        let max_elements = self.config.max_window_elements;
        self.session_states
            .entry(key.to_string())
            .or_insert_with(|| PerSessionState::new(now_ms, window_ms, max_elements))
    }

    fn zscore(stats: &RollingStatistics, value: f64, epsilon: f64, min_samples: usize) -> ZScore {
        if stats.sample_count() < min_samples as u64 {
            return ZScore::unestablished();
        }
        let stddev = stats.standard_deviation();
        if stddev <= epsilon {
            return ZScore::unestablished();
        }
        ZScore {
            value: (value - stats.mean()) / stddev,
            established: true,
        }
    }

    /// Runs the full per-event pipeline: timestamp bookkeeping, state
    /// lookup/creation, window updates, classification, session tracking,
    /// z-score computation, UA analysis, and (optionally) feature
    /// extraction. Malformed entries (`successfully_parsed == false`) are
    /// still processed — timing/volume signal from a malformed line is
    /// still meaningful even without a usable path or status code.
    pub fn process_and_analyze(&mut self, entry: &LogEntry) -> AnalyzedEvent {
        let now_ms = entry.timestamp_ms;
        // Step 1/2: late events are still counted; they simply cannot move
        // the high-water mark backwards.
        self.max_timestamp_seen = self.max_timestamp_seen.max(now_ms);

        let min_samples = self.config.min_samples_for_zscore;

        // Step 3/4: state lookup plus first-seen / new-path tracking.
        let is_new_ip = !self.ip_states.contains_key(&entry.source_ip);
        let is_new_path_for_ip;
        {
            let ip_state = self.get_or_create_ip_state(&entry.source_ip, now_ms);
            ip_state.last_seen_ms = now_ms;
            is_new_path_for_ip = ip_state.note_path(&entry.path);

            // Step 5: request window append + prune.
            ip_state.request_times.add(now_ms, now_ms);

            // Step 6: failed-login window.
            if entry.is_failed_login() {
                ip_state.failed_logins.add(now_ms, now_ms);
            }

            // Step 7: HTML/asset classification + ratio.
            match get_request_type(&entry.path) {
                log_entry::RequestType::Html => ip_state.html_count += 1,
                log_entry::RequestType::Asset => ip_state.asset_count += 1,
                log_entry::RequestType::Other => {}
            }
            match entry.method.as_str() {
                "GET" => ip_state.get_count += 1,
                "POST" => ip_state.post_count += 1,
                _ => {}
            }
        }
        let request_type = get_request_type(&entry.path);
        let html_asset_ratio = self.ip_states[&entry.source_ip].html_asset_ratio();
        let ip_html_count = self.ip_states[&entry.source_ip].html_count;
        let post_to_get_ratio = self.ip_states[&entry.source_ip].post_to_get_ratio();

        // Step 8: session tracking. A session is rebuilt from scratch (not
        // merely reused) whenever the gap since its last event exceeds the
        // inactivity TTL, even though the key itself is unchanged.
        let session_key = build_session_key(&[
            Some(entry.source_ip.clone()),
            entry.user_agent.clone(),
        ]);
        let mut is_new_session = !self.session_states.contains_key(&session_key);
        if self.config.session_tracking_enabled {
            if let Some(existing) = self.session_states.get(&session_key) {
                let ttl = self.config.session_inactivity_ttl_ms;
                if ttl != 0 && now_ms.saturating_sub(existing.last_seen_ms) > ttl {
                    let window_ms = self.config.session_window_ms;
                    let max_elements = self.config.max_window_elements;
                    self.session_states
                        .insert(session_key.clone(), PerSessionState::new(now_ms, window_ms, max_elements));
                    is_new_session = true;
                }
            }
            let session = self.get_or_create_session_state(&session_key, now_ms);
            session.last_seen_ms = now_ms;
            session.request_count += 1;
            if entry.is_error() {
                session.error_count += 1;
            }
            if entry.is_failed_login() {
                session.failed_login_count += 1;
            }
            session.unique_paths.insert(entry.path.clone());
            session.request_times.add(now_ms, now_ms);
        }
        {
            let ip_state = self.ip_states.get_mut(&entry.source_ip).expect("ip state just created");
            ip_state.note_session_key(&session_key);
        }
        let (session_request_count, session_failed_login_count, session_requests_in_window) = self
            .session_states
            .get(&session_key)
            .map(|s| (s.request_count, s.failed_login_count, s.request_times.count()))
            .unwrap_or((0, 0, 0));

        // Step 9: historical trackers.
        let ip_window_count;
        {
            let ip_state = self.ip_states.get_mut(&entry.source_ip).expect("ip state just created");
            ip_state.request_time_stats.add(entry.request_time_s, now_ms);
            ip_state.bytes_stats.add(entry.bytes_sent as f64, now_ms);
            ip_state
                .error_rate_stats
                .add(if entry.is_error() { 1.0 } else { 0.0 }, now_ms);
            ip_window_count = ip_state.request_times.count() as f64;
            ip_state.request_volume_stats.add(ip_window_count, now_ms);
        }
        let path_window_count;
        {
            let path_state = self.get_or_create_path_state(&entry.path, now_ms);
            path_state.last_seen_ms = now_ms;
            path_state.request_count += 1;
            if entry.is_error() {
                path_state.error_count += 1;
            }
            path_state.ips_seen.insert(entry.source_ip.clone());
            path_state.request_time_stats.add(entry.request_time_s, now_ms);
            path_state.bytes_stats.add(entry.bytes_sent as f64, now_ms);
            path_state
                .error_rate_stats
                .add(if entry.is_error() { 1.0 } else { 0.0 }, now_ms);
            path_window_count = path_state.request_count as f64;
            path_state.request_volume_stats.add(path_window_count, now_ms);
        }

        // Step 10: z-scores, one pair per tracked metric kind.
        let ip_state = &self.ip_states[&entry.source_ip];
        let path_state = &self.path_states[&entry.path];
        let request_time_z =
            Self::zscore(&ip_state.request_time_stats, entry.request_time_s, REQUEST_TIME_STDDEV_EPSILON, min_samples);
        let bytes_z = Self::zscore(&ip_state.bytes_stats, entry.bytes_sent as f64, BYTES_STDDEV_EPSILON, min_samples);
        let error_rate_z = Self::zscore(
            &ip_state.error_rate_stats,
            if entry.is_error() { 1.0 } else { 0.0 },
            ERROR_RATE_STDDEV_EPSILON,
            min_samples,
        );
        let request_volume_z = Self::zscore(
            &ip_state.request_volume_stats,
            ip_window_count,
            REQUEST_VOLUME_STDDEV_EPSILON,
            min_samples,
        );
        let path_request_time_z = Self::zscore(
            &path_state.request_time_stats,
            entry.request_time_s,
            REQUEST_TIME_STDDEV_EPSILON,
            min_samples,
        );
        let path_bytes_z = Self::zscore(&path_state.bytes_stats, entry.bytes_sent as f64, BYTES_STDDEV_EPSILON, min_samples);
        let path_error_rate_z = Self::zscore(
            &path_state.error_rate_stats,
            if entry.is_error() { 1.0 } else { 0.0 },
            ERROR_RATE_STDDEV_EPSILON,
            min_samples,
        );
        let path_request_volume_z = Self::zscore(
            &path_state.request_volume_stats,
            path_window_count,
            REQUEST_VOLUME_STDDEV_EPSILON,
            min_samples,
        );

        // Step 11: UA analysis. `last_known_user_agent` is always updated,
        // independent of whether this UA is new.
        let ua_analysis = analyze_user_agent_with_versions(
            entry.user_agent.as_deref(),
            self.config.min_chrome_version,
            self.config.min_firefox_version,
        );
        let ua_changes_in_session;
        let is_ua_cycling;
        let is_ua_changed_for_ip;
        {
            let ip_state = self.ip_states.get_mut(&entry.source_ip).expect("ip state just created");
            is_ua_changed_for_ip = match (&entry.user_agent, &ip_state.last_known_user_agent) {
                (Some(new_ua), Some(old_ua)) => new_ua != old_ua,
                (Some(_), None) => false,
                (None, _) => false,
            };
            ip_state.user_agent_window.prune(now_ms);
            if let Some(ua) = &entry.user_agent {
                if !ip_state.user_agent_window.contains_value(ua) {
                    ip_state.user_agent_window.add(now_ms, ua.clone());
                }
                ip_state.last_known_user_agent = Some(ua.clone());
            }
            ua_changes_in_session = ip_state.ua_changes_in_session();
            is_ua_cycling = ip_state.is_ua_cycling();
        }
        let (ip_requests_in_window, ip_failed_logins_in_window) = {
            let ip_state = &self.ip_states[&entry.source_ip];
            (ip_state.request_times.count(), ip_state.failed_logins.count())
        };

        // Step 12: feature extraction, gated by tier3/ml-data-collection and
        // by having at least two requests in the session (a lone request has
        // no session-derived signal to speak of).
        let features = if (self.config.tier3_enabled || self.config.ml_data_collection_enabled)
            && session_request_count >= 2
        {
            let inputs = SessionFeatureInputs {
                request_time_z: request_time_z.value,
                bytes_z: bytes_z.value,
                error_rate_z: error_rate_z.value,
                request_volume_z: request_volume_z.value,
                path_request_time_z: path_request_time_z.value,
                path_bytes_z: path_bytes_z.value,
                html_asset_ratio,
                post_to_get_ratio,
                ua_changes_in_session,
                is_new_path: is_new_path_for_ip,
                is_known_bad_ua: ua_analysis.is_known_bad,
                is_headless_ua: ua_analysis.is_headless,
            };
            Some(SessionFeatureExtractor::extract(&inputs))
        } else {
            None
        };

        AnalyzedEvent {
            timestamp_ms: now_ms,
            source_ip: entry.source_ip.clone(),
            path: entry.path.clone(),
            session_key,
            request_type,
            is_new_ip,
            is_new_path_for_ip,
            is_new_session,
            request_time_z,
            bytes_z,
            error_rate_z,
            request_volume_z,
            path_request_time_z,
            path_bytes_z,
            path_error_rate_z,
            path_request_volume_z,
            html_asset_ratio,
            ip_html_count,
            post_to_get_ratio,
            ua_changes_in_session,
            ua_analysis,
            ip_requests_in_window,
            ip_failed_logins_in_window,
            is_ua_cycling,
            is_ua_changed_for_ip,
            session_request_count,
            session_failed_login_count,
            session_requests_in_window,
            user_agent: entry.user_agent.clone(),
            status_code: entry.status_code,
            request_time_s: entry.request_time_s,
            bytes_sent: entry.bytes_sent,
            line_number: entry.line_number,
            raw_line: entry.raw_line.clone(),
            features,
        }
    }

    /// Drops IP/path/session state untouched for longer than `ttl_ms`.
    /// `ttl_ms == 0` disables pruning entirely.
    pub fn run_pruning(&mut self, now_ms: u64, ttl_ms: u64) {
        if ttl_ms == 0 {
            return;
        }
        self.ip_states
            .retain(|_, s| now_ms.saturating_sub(s.last_seen_ms) <= ttl_ms);
        self.path_states
            .retain(|_, s| now_ms.saturating_sub(s.last_seen_ms) <= ttl_ms);
        self.session_states
            .retain(|_, s| now_ms.saturating_sub(s.last_seen_ms) <= ttl_ms);
        for ip_state in self.ip_states.values_mut() {
            ip_state.prune(now_ms);
        }
    }

    pub fn reset_in_memory_state(&mut self) {
        self.ip_states.clear();
        self.path_states.clear();
        self.session_states.clear();
        self.max_timestamp_seen = 0;
    }

    /// Propagates a new window duration/size to every tracked IP's windows.
    pub fn reconfigure(&mut self, request_window_ms: u64, max_window_elements: usize) {
        self.config.request_window_ms = request_window_ms;
        self.config.max_window_elements = max_window_elements;
        for ip_state in self.ip_states.values_mut() {
            ip_state.reconfigure(request_window_ms, max_window_elements);
        }
    }

    pub fn get_internal_state_metrics(&self) -> EngineStateMetrics {
        EngineStateMetrics {
            tracked_ips: self.ip_states.len(),
            tracked_paths: self.path_states.len(),
            tracked_sessions: self.session_states.len(),
            max_timestamp_seen: self.max_timestamp_seen,
        }
    }

    /// Top `n` IPs by request count within their current window, descending.
    pub fn get_top_n_by_metric(&self, n: usize) -> Vec<(String, usize)> {
        let mut entries: Vec<(String, usize)> = self
            .ip_states
            .iter()
            .map(|(ip, state)| (ip.clone(), state.request_times.count()))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(n);
        entries
    }

    /// Writes `magic:u32 | version:u32 | ip_count:u64 | (key,state)* |
    /// path_count:u64 | (key,state)* | session_count:u64 | (key,state)*`.
    /// Callers are expected to write to a temp file and rename into place.
    pub fn save_state(&self, out: &mut impl Write) -> Result<(), AnalysisError> {
        out.write_all(&STATE_FILE_MAGIC.to_le_bytes())?;
        out.write_all(&STATE_FILE_VERSION.to_le_bytes())?;

        out.write_all(&(self.ip_states.len() as u64).to_le_bytes())?;
        for (ip, state) in &self.ip_states {
            per_ip_state::write_string(out, ip)?;
            state.save(out)?;
        }

        out.write_all(&(self.path_states.len() as u64).to_le_bytes())?;
        for (path, state) in &self.path_states {
            per_ip_state::write_string(out, path)?;
            state.save(out)?;
        }

        out.write_all(&(self.session_states.len() as u64).to_le_bytes())?;
        for (key, state) in &self.session_states {
            per_ip_state::write_string(out, key)?;
            state.save(out)?;
        }
        Ok(())
    }

    pub fn load_state(&mut self, input: &mut impl Read) -> Result<(), AnalysisError> {
        let mut magic_buf = [0u8; 4];
        input.read_exact(&mut magic_buf)?;
        let magic = u32::from_le_bytes(magic_buf);
        if magic != STATE_FILE_MAGIC {
            return Err(AnalysisError::MagicMismatch {
                expected: STATE_FILE_MAGIC,
                found: magic,
            });
        }
        let mut version_buf = [0u8; 4];
        input.read_exact(&mut version_buf)?;
        let version = u32::from_le_bytes(version_buf);
        if version != STATE_FILE_VERSION {
            return Err(AnalysisError::VersionMismatch {
                expected: STATE_FILE_VERSION,
                found: version,
            });
        }

        let ip_count = per_ip_state::read_u64(input)? as usize;
        let mut ip_states = HashMap::with_capacity(ip_count);
        for _ in 0..ip_count {
            let key = per_ip_state::read_string(input)?;
            let mut state = PerIpState::new(0, self.config.request_window_ms, self.config.max_window_elements);
            state.load(input)?;
            ip_states.insert(key, state);
        }

        let path_count = per_ip_state::read_u64(input)? as usize;
        let mut path_states = HashMap::with_capacity(path_count);
        for _ in 0..path_count {
            let key = per_ip_state::read_string(input)?;
            let mut state = PerPathState::new(0);
            state.load(input)?;
            path_states.insert(key, state);
        }

        let session_count = per_ip_state::read_u64(input)? as usize;
        let mut session_states = HashMap::with_capacity(session_count);
        for _ in 0..session_count {
            let key = per_ip_state::read_string(input)?;
            let mut state = PerSessionState::new(0, self.config.session_window_ms, self.config.max_window_elements);
            state.load(input)?;
            session_states.insert(key, state);
        }

        self.ip_states = ip_states;
        self.path_states = path_states;
        self.session_states = session_states;
        Ok(())
    }
}

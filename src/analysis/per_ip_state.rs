//! Per-source-IP rolling state.

use std::collections::HashSet;
use std::io::{self, Read, Write};

use crate::rolling::RollingStatistics;
use crate::window::SlidingWindow;

const MAX_TRACKED_PATHS: usize = 500;
const MAX_TRACKED_SESSION_KEYS: usize = 100;
const UA_CYCLING_WINDOW_MS: u64 = 10 * 60 * 1000;
const UA_CYCLING_DISTINCT_THRESHOLD: usize = 4;

#[derive(Debug, Clone)]
pub struct PerIpState {
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub request_times: SlidingWindow<u64>,
    pub failed_logins: SlidingWindow<u64>,
    pub user_agent_window: SlidingWindow<String>,
    pub last_known_user_agent: Option<String>,
    pub known_paths: HashSet<String>,
    pub known_session_keys: HashSet<String>,
    pub html_count: u64,
    pub asset_count: u64,
    pub get_count: u64,
    pub post_count: u64,
    pub request_time_stats: RollingStatistics,
    pub bytes_stats: RollingStatistics,
    pub error_rate_stats: RollingStatistics,
    pub request_volume_stats: RollingStatistics,
}

impl PerIpState {
    pub fn new(now_ms: u64, request_window_ms: u64, max_window_elements: usize) -> Self {
        Self {
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            request_times: SlidingWindow::new(request_window_ms, max_window_elements),
            failed_logins: SlidingWindow::new(request_window_ms, max_window_elements),
            user_agent_window: SlidingWindow::new(UA_CYCLING_WINDOW_MS, max_window_elements),
            last_known_user_agent: None,
            known_paths: HashSet::new(),
            known_session_keys: HashSet::new(),
            html_count: 0,
            asset_count: 0,
            get_count: 0,
            post_count: 0,
            request_time_stats: RollingStatistics::new(0.1, 500),
            bytes_stats: RollingStatistics::new(0.1, 500),
            error_rate_stats: RollingStatistics::new(0.1, 500),
            request_volume_stats: RollingStatistics::new(0.1, 500),
        }
    }

    /// True if this is the first time this path has been seen from this IP.
    /// Tracking is capped at [`MAX_TRACKED_PATHS`]; once full, new paths are
    /// still reported as new but are not added to the set.
    pub fn note_path(&mut self, path: &str) -> bool {
        if self.known_paths.contains(path) {
            return false;
        }
        if self.known_paths.len() < MAX_TRACKED_PATHS {
            self.known_paths.insert(path.to_string());
        }
        true
    }

    pub fn note_session_key(&mut self, key: &str) -> bool {
        if self.known_session_keys.contains(key) {
            return false;
        }
        if self.known_session_keys.len() < MAX_TRACKED_SESSION_KEYS {
            self.known_session_keys.insert(key.to_string());
        }
        true
    }

    pub fn post_to_get_ratio(&self) -> f64 {
        if self.get_count == 0 {
            0.0
        } else {
            self.post_count as f64 / self.get_count as f64
        }
    }

    pub fn html_asset_ratio(&self) -> f64 {
        if self.asset_count == 0 {
            self.html_count as f64
        } else {
            self.html_count as f64 / self.asset_count as f64
        }
    }

    /// Number of distinct user agents seen within the UA-cycling window.
    pub fn ua_changes_in_session(&self) -> usize {
        let mut distinct = HashSet::new();
        for (_, ua) in self.user_agent_window.iter() {
            distinct.insert(ua.as_str());
        }
        distinct.len()
    }

    pub fn is_ua_cycling(&self) -> bool {
        self.ua_changes_in_session() >= UA_CYCLING_DISTINCT_THRESHOLD
    }

    pub fn reconfigure(&mut self, request_window_ms: u64, max_window_elements: usize) {
        self.request_times.reconfigure(request_window_ms, max_window_elements);
        self.failed_logins.reconfigure(request_window_ms, max_window_elements);
        self.user_agent_window.reconfigure(UA_CYCLING_WINDOW_MS, max_window_elements);
    }

    pub fn prune(&mut self, now_ms: u64) {
        self.request_times.prune(now_ms);
        self.failed_logins.prune(now_ms);
        self.user_agent_window.prune(now_ms);
    }

    pub fn save(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(&self.first_seen_ms.to_le_bytes())?;
        out.write_all(&self.last_seen_ms.to_le_bytes())?;
        self.request_times.save(out)?;
        self.failed_logins.save(out)?;
        self.user_agent_window.save(out)?;
        write_string(out, self.last_known_user_agent.as_deref().unwrap_or(""))?;
        write_string_set(out, &self.known_paths)?;
        write_string_set(out, &self.known_session_keys)?;
        out.write_all(&self.html_count.to_le_bytes())?;
        out.write_all(&self.asset_count.to_le_bytes())?;
        out.write_all(&self.get_count.to_le_bytes())?;
        out.write_all(&self.post_count.to_le_bytes())?;
        self.request_time_stats.save(out)?;
        self.bytes_stats.save(out)?;
        self.error_rate_stats.save(out)?;
        self.request_volume_stats.save(out)?;
        Ok(())
    }

    pub fn load(&mut self, input: &mut impl Read) -> io::Result<()> {
        self.first_seen_ms = read_u64(input)?;
        self.last_seen_ms = read_u64(input)?;
        self.request_times.load(input)?;
        self.failed_logins.load(input)?;
        self.user_agent_window.load(input)?;
        let ua = read_string(input)?;
        self.last_known_user_agent = if ua.is_empty() { None } else { Some(ua) };
        self.known_paths = read_string_set(input)?;
        self.known_session_keys = read_string_set(input)?;
        self.html_count = read_u64(input)?;
        self.asset_count = read_u64(input)?;
        self.get_count = read_u64(input)?;
        self.post_count = read_u64(input)?;
        self.request_time_stats.load(input)?;
        self.bytes_stats.load(input)?;
        self.error_rate_stats.load(input)?;
        self.request_volume_stats.load(input)?;
        Ok(())
    }
}

pub(crate) fn read_u64(input: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn write_string(out: &mut impl Write, s: &str) -> io::Result<()> {
    out.write_all(&(s.len() as u64).to_le_bytes())?;
    out.write_all(s.as_bytes())
}

pub(crate) fn read_string(input: &mut impl Read) -> io::Result<String> {
    let len = read_u64(input)? as usize;
    let mut bytes = vec![0u8; len];
    input.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub(crate) fn write_string_set(out: &mut impl Write, set: &HashSet<String>) -> io::Result<()> {
    out.write_all(&(set.len() as u64).to_le_bytes())?;
    for item in set {
        write_string(out, item)?;
    }
    Ok(())
}

pub(crate) fn read_string_set(input: &mut impl Read) -> io::Result<HashSet<String>> {
    let len = read_u64(input)? as usize;
    let mut set = HashSet::with_capacity(len);
    for _ in 0..len {
        set.insert(read_string(input)?);
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_path_reports_new_then_known() {
        let mut s = PerIpState::new(0, 60_000, 1000);
        assert!(s.note_path("/a"));
        assert!(!s.note_path("/a"));
    }

    #[test]
    fn post_to_get_ratio_zero_when_no_gets() {
        let s = PerIpState::new(0, 60_000, 1000);
        assert_eq!(s.post_to_get_ratio(), 0.0);
    }

    #[test]
    fn ua_cycling_detects_many_distinct_agents() {
        let mut s = PerIpState::new(0, 60_000, 1000);
        for i in 0..5 {
            s.user_agent_window.add(i, format!("agent-{i}"));
        }
        assert!(s.is_ua_cycling());
    }

    #[test]
    fn save_load_round_trip() {
        let mut s = PerIpState::new(10, 60_000, 1000);
        s.note_path("/x");
        s.note_session_key("k1");
        s.last_known_user_agent = Some("curl/8.0".to_string());
        s.html_count = 3;
        s.asset_count = 1;

        let mut buf = Vec::new();
        s.save(&mut buf).unwrap();

        let mut loaded = PerIpState::new(0, 60_000, 1000);
        loaded.load(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.first_seen_ms, 10);
        assert_eq!(loaded.known_paths, s.known_paths);
        assert_eq!(loaded.last_known_user_agent, s.last_known_user_agent);
        assert_eq!(loaded.html_count, 3);
    }
}

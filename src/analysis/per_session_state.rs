//! Per-session rolling state, keyed by the configured session-key components.

use std::collections::HashSet;
use std::io::{self, Read, Write};

use crate::analysis::per_ip_state::{read_string_set, read_u64, write_string_set};
use crate::window::SlidingWindow;

#[derive(Debug, Clone)]
pub struct PerSessionState {
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub request_count: u64,
    pub error_count: u64,
    pub failed_login_count: u64,
    pub unique_paths: HashSet<String>,
    pub request_times: SlidingWindow<u64>,
}

impl PerSessionState {
    pub fn new(now_ms: u64, window_ms: u64, max_elements: usize) -> Self {
        Self {
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            request_count: 0,
            error_count: 0,
            failed_login_count: 0,
            unique_paths: HashSet::new(),
            request_times: SlidingWindow::new(window_ms, max_elements),
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.request_count as f64
        }
    }

    /// Requests per second over the lifetime of the session so far.
    pub fn request_frequency(&self, now_ms: u64) -> f64 {
        let elapsed_secs = now_ms.saturating_sub(self.first_seen_ms) as f64 / 1000.0;
        if elapsed_secs < 1.0 {
            self.request_count as f64
        } else {
            self.request_count as f64 / elapsed_secs
        }
    }

    pub fn save(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(&self.first_seen_ms.to_le_bytes())?;
        out.write_all(&self.last_seen_ms.to_le_bytes())?;
        out.write_all(&self.request_count.to_le_bytes())?;
        out.write_all(&self.error_count.to_le_bytes())?;
        out.write_all(&self.failed_login_count.to_le_bytes())?;
        write_string_set(out, &self.unique_paths)?;
        self.request_times.save(out)?;
        Ok(())
    }

    pub fn load(&mut self, input: &mut impl Read) -> io::Result<()> {
        self.first_seen_ms = read_u64(input)?;
        self.last_seen_ms = read_u64(input)?;
        self.request_count = read_u64(input)?;
        self.error_count = read_u64(input)?;
        self.failed_login_count = read_u64(input)?;
        self.unique_paths = read_string_set(input)?;
        self.request_times.load(input)?;
        Ok(())
    }
}

/// Joins the configured session-key components with `|`. Components that
/// cannot be resolved from the request are logged and skipped rather than
/// failing the whole key.
pub fn build_session_key(components: &[Option<String>]) -> String {
    components
        .iter()
        .filter_map(|c| c.as_deref())
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_skips_missing_components() {
        let key = build_session_key(&[Some("1.2.3.4".to_string()), None, Some("curl/8.0".to_string())]);
        assert_eq!(key, "1.2.3.4|curl/8.0");
    }

    #[test]
    fn request_frequency_uses_elapsed_time() {
        let mut s = PerSessionState::new(0, 60_000, 100);
        s.request_count = 10;
        s.last_seen_ms = 10_000;
        assert!((s.request_frequency(10_000) - 1.0).abs() < 1e-9);
    }
}

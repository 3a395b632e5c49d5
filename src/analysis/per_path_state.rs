//! Per-request-path rolling state.

use std::io::{self, Read, Write};

use crate::analysis::per_ip_state::{read_string_set, read_u64, write_string_set};
use crate::rolling::RollingStatistics;

#[derive(Debug, Clone)]
pub struct PerPathState {
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub request_count: u64,
    pub error_count: u64,
    pub ips_seen: std::collections::HashSet<String>,
    pub request_time_stats: RollingStatistics,
    pub bytes_stats: RollingStatistics,
    pub error_rate_stats: RollingStatistics,
    pub request_volume_stats: RollingStatistics,
}

impl PerPathState {
    pub fn new(now_ms: u64) -> Self {
        Self {
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            request_count: 0,
            error_count: 0,
            ips_seen: std::collections::HashSet::new(),
            request_time_stats: RollingStatistics::new(0.1, 500),
            bytes_stats: RollingStatistics::new(0.1, 500),
            error_rate_stats: RollingStatistics::new(0.1, 500),
            request_volume_stats: RollingStatistics::new(0.1, 500),
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.request_count as f64
        }
    }

    pub fn save(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(&self.first_seen_ms.to_le_bytes())?;
        out.write_all(&self.last_seen_ms.to_le_bytes())?;
        out.write_all(&self.request_count.to_le_bytes())?;
        out.write_all(&self.error_count.to_le_bytes())?;
        write_string_set(out, &self.ips_seen)?;
        self.request_time_stats.save(out)?;
        self.bytes_stats.save(out)?;
        self.error_rate_stats.save(out)?;
        self.request_volume_stats.save(out)?;
        Ok(())
    }

    pub fn load(&mut self, input: &mut impl Read) -> io::Result<()> {
        self.first_seen_ms = read_u64(input)?;
        self.last_seen_ms = read_u64(input)?;
        self.request_count = read_u64(input)?;
        self.error_count = read_u64(input)?;
        self.ips_seen = read_string_set(input)?;
        self.request_time_stats.load(input)?;
        self.bytes_stats.load(input)?;
        self.error_rate_stats.load(input)?;
        self.request_volume_stats.load(input)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_rate_zero_before_any_requests() {
        let s = PerPathState::new(0);
        assert_eq!(s.error_rate(), 0.0);
    }

    #[test]
    fn save_load_round_trip() {
        let mut s = PerPathState::new(5);
        s.request_count = 10;
        s.error_count = 2;
        s.ips_seen.insert("1.2.3.4".to_string());

        let mut buf = Vec::new();
        s.save(&mut buf).unwrap();

        let mut loaded = PerPathState::new(0);
        loaded.load(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.request_count, 10);
        assert_eq!(loaded.error_count, 2);
        assert_eq!(loaded.ips_seen, s.ips_seen);
    }
}

//! Parses Combined Log Format access-log lines into [`LogEntry`] records.
//!
//! This sits outside the detection core proper: the analysis engine only
//! ever consumes a `LogEntry`, however it was produced. A conforming
//! deployment could swap this for a JSON-lines parser or a tailer that reads
//! from a message queue without touching anything downstream.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::analysis::log_entry::LogEntry;

/// Combined Log Format, with an optional trailing `request_time` field in
/// seconds (as many reverse proxies append via `$request_time`/`%D`).
///
/// `10.0.0.1 - - [10/Oct/2023:13:55:36 +0000] "GET /index.html HTTP/1.1" 200 2326 "-" "Mozilla/5.0" 0.004`
fn line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^(?P<ip>\S+)\s+\S+\s+\S+\s+\[(?P<time>[^\]]+)\]\s+"(?P<request>[^"]*)"\s+(?P<status>\d{3})\s+(?P<bytes>\S+)\s+"(?P<referer>[^"]*)"\s+"(?P<ua>[^"]*)"(?:\s+(?P<reqtime>[0-9.]+))?\s*$"#,
        )
        .expect("static log line regex is valid")
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("line does not match combined log format")]
    Malformed,
    #[error("unparseable timestamp: {0}")]
    BadTimestamp(String),
}

/// Parses one access-log line. On any failure, returns a best-effort
/// [`LogEntry`] with `successfully_parsed: false` and no timestamp rather
/// than an `Err` — per spec, a record without a parsed timestamp is still
/// handed to the engine, which counts it without mutating state.
pub fn parse_line(raw_line: &str, line_number: u64) -> LogEntry {
    match try_parse_line(raw_line, line_number) {
        Ok(entry) => entry,
        Err(_) => unparsed_entry(raw_line, line_number),
    }
}

fn unparsed_entry(raw_line: &str, line_number: u64) -> LogEntry {
    LogEntry {
        timestamp_ms: 0,
        source_ip: String::new(),
        method: String::new(),
        path: String::new(),
        protocol: String::new(),
        status_code: 0,
        bytes_sent: 0,
        request_time_s: 0.0,
        user_agent: None,
        referer: None,
        host: None,
        country: None,
        raw_line: truncate_sample(raw_line),
        line_number,
        successfully_parsed: false,
    }
}

fn try_parse_line(raw_line: &str, line_number: u64) -> Result<LogEntry, ParseError> {
    let caps = line_regex().captures(raw_line).ok_or(ParseError::Malformed)?;

    let timestamp_ms = parse_apache_time(&caps["time"])?;

    let request = &caps["request"];
    let mut parts = request.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();
    let protocol = parts.next().unwrap_or("HTTP/1.1").to_string();

    let status_code: u16 = caps["status"].parse().map_err(|_| ParseError::Malformed)?;
    let bytes_sent: u64 = caps["bytes"].parse().unwrap_or(0);
    let request_time_s: f64 = caps
        .name("reqtime")
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0);

    let referer = non_dash(&caps["referer"]);
    let user_agent = non_dash(&caps["ua"]);

    Ok(LogEntry {
        timestamp_ms,
        source_ip: caps["ip"].to_string(),
        method,
        path,
        protocol,
        status_code,
        bytes_sent,
        request_time_s,
        user_agent,
        referer,
        host: None,
        country: None,
        raw_line: truncate_sample(raw_line),
        line_number,
        successfully_parsed: true,
    })
}

fn non_dash(field: &str) -> Option<String> {
    if field.is_empty() || field == "-" {
        None
    } else {
        Some(field.to_string())
    }
}

/// Spec caps the retained raw-line sample at 256 bytes (§6.4 `Alert.raw_log_sample`).
const RAW_LINE_SAMPLE_CAP: usize = 256;

fn truncate_sample(raw_line: &str) -> String {
    if raw_line.len() <= RAW_LINE_SAMPLE_CAP {
        raw_line.to_string()
    } else {
        let mut end = RAW_LINE_SAMPLE_CAP;
        while !raw_line.is_char_boundary(end) {
            end -= 1;
        }
        raw_line[..end].to_string()
    }
}

fn parse_apache_time(raw: &str) -> Result<u64, ParseError> {
    let dt = DateTime::parse_from_str(raw, "%d/%b/%Y:%H:%M:%S %z")
        .map_err(|_| ParseError::BadTimestamp(raw.to_string()))?;
    let utc: DateTime<Utc> = dt.into();
    Ok(utc.timestamp_millis().max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_combined_log_line() {
        let line = r#"10.0.0.1 - - [10/Oct/2023:13:55:36 +0000] "GET /index.html HTTP/1.1" 200 2326 "-" "Mozilla/5.0" 0.004"#;
        let entry = parse_line(line, 1);
        assert!(entry.successfully_parsed);
        assert_eq!(entry.source_ip, "10.0.0.1");
        assert_eq!(entry.method, "GET");
        assert_eq!(entry.path, "/index.html");
        assert_eq!(entry.status_code, 200);
        assert_eq!(entry.bytes_sent, 2326);
        assert_eq!(entry.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert!(entry.referer.is_none());
        assert!((entry.request_time_s - 0.004).abs() < 1e-9);
        assert!(entry.timestamp_ms > 0);
    }

    #[test]
    fn parses_without_the_optional_request_time_field() {
        let line = r#"10.0.0.1 - - [10/Oct/2023:13:55:36 +0000] "GET / HTTP/1.1" 200 512 "-" "curl/8.0""#;
        let entry = parse_line(line, 1);
        assert!(entry.successfully_parsed);
        assert_eq!(entry.request_time_s, 0.0);
    }

    #[test]
    fn malformed_line_yields_unparsed_entry_not_a_panic() {
        let entry = parse_line("this is not a log line", 7);
        assert!(!entry.successfully_parsed);
        assert_eq!(entry.timestamp_ms, 0);
        assert_eq!(entry.line_number, 7);
    }

    #[test]
    fn bad_timestamp_yields_unparsed_entry() {
        let line = r#"10.0.0.1 - - [not-a-date] "GET / HTTP/1.1" 200 512 "-" "-""#;
        let entry = parse_line(line, 3);
        assert!(!entry.successfully_parsed);
    }

    #[test]
    fn raw_line_sample_is_truncated_to_256_bytes() {
        let long_path = "/".to_string() + &"a".repeat(500);
        let line = format!(r#"10.0.0.1 - - [10/Oct/2023:13:55:36 +0000] "GET {long_path} HTTP/1.1" 200 10 "-" "-""#);
        let entry = parse_line(&line, 1);
        assert!(entry.raw_line.len() <= RAW_LINE_SAMPLE_CAP);
    }
}

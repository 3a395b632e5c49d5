//! Parsed access-log record and path classification.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestType {
    Html,
    Asset,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub source_ip: String,
    pub method: String,
    pub path: String,
    pub protocol: String,
    pub status_code: u16,
    pub bytes_sent: u64,
    pub request_time_s: f64,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub host: Option<String>,
    pub country: Option<String>,
    pub raw_line: String,
    pub line_number: u64,
    pub successfully_parsed: bool,
}

impl LogEntry {
    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }

    pub fn is_failed_login(&self) -> bool {
        self.status_code == 401 || self.status_code == 403
    }
}

const ASSET_PREFIXES: &[&str] = &["/static/", "/assets/", "/images/", "/css/", "/js/"];
const ASSET_SUFFIXES: &[&str] = &[
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf", ".map",
];
const HTML_EXACT_PATHS: &[&str] = &["/", "/index.html", "/index.htm"];

/// Classify a request path: exact HTML match, then asset prefix, then
/// asset-suffix-after-stripping-query-or-fragment, else `Other`.
pub fn get_request_type(path: &str) -> RequestType {
    if HTML_EXACT_PATHS.contains(&path) {
        return RequestType::Html;
    }
    if ASSET_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return RequestType::Asset;
    }
    let stripped = path.split(['?', '#']).next().unwrap_or(path);
    if ASSET_SUFFIXES.iter().any(|suf| stripped.ends_with(suf)) {
        return RequestType::Asset;
    }
    if stripped.ends_with(".html") || stripped.ends_with(".htm") {
        return RequestType::Html;
    }
    RequestType::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_is_html() {
        assert_eq!(get_request_type("/"), RequestType::Html);
    }

    #[test]
    fn static_prefix_is_asset() {
        assert_eq!(get_request_type("/static/app.js"), RequestType::Asset);
    }

    #[test]
    fn suffix_after_query_string_is_asset() {
        assert_eq!(get_request_type("/bundle.js?v=3"), RequestType::Asset);
    }

    #[test]
    fn unmatched_path_is_other() {
        assert_eq!(get_request_type("/api/v1/users"), RequestType::Other);
    }
}

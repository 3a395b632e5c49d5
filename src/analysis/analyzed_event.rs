//! Output of one pass through [`crate::analysis::AnalysisEngine::process_and_analyze`].

use crate::analysis::features::FeatureVector;
use crate::analysis::log_entry::RequestType;
use crate::analysis::ua::UaAnalysis;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScore {
    pub value: f64,
    pub established: bool,
}

impl ZScore {
    pub fn unestablished() -> Self {
        Self {
            value: 0.0,
            established: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzedEvent {
    pub timestamp_ms: u64,
    pub source_ip: String,
    pub path: String,
    pub session_key: String,
    pub request_type: RequestType,

    pub is_new_ip: bool,
    pub is_new_path_for_ip: bool,
    pub is_new_session: bool,

    pub request_time_z: ZScore,
    pub bytes_z: ZScore,
    pub error_rate_z: ZScore,
    pub request_volume_z: ZScore,
    pub path_request_time_z: ZScore,
    pub path_bytes_z: ZScore,
    pub path_error_rate_z: ZScore,
    pub path_request_volume_z: ZScore,

    pub html_asset_ratio: f64,
    pub ip_html_count: u64,
    pub post_to_get_ratio: f64,
    pub ua_changes_in_session: usize,
    pub ua_analysis: UaAnalysis,

    /// Requests from this IP currently inside the request window (post-prune).
    pub ip_requests_in_window: usize,
    /// Failed-login attempts from this IP currently inside the window.
    pub ip_failed_logins_in_window: usize,
    pub is_ua_cycling: bool,
    pub is_ua_changed_for_ip: bool,

    /// Requests recorded so far in this event's session (including this one).
    pub session_request_count: u64,
    pub session_failed_login_count: u64,
    /// Requests from this session currently inside its request window.
    pub session_requests_in_window: usize,
    pub user_agent: Option<String>,
    pub status_code: u16,
    pub request_time_s: f64,
    pub bytes_sent: u64,
    pub line_number: u64,
    pub raw_line: String,

    pub features: Option<FeatureVector>,
}

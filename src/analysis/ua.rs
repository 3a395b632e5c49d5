//! User-agent heuristics: missing/headless/known-bad detection, outdated
//! browser-version checks, and desktop/mobile token inconsistency.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UaAnalysis {
    pub is_missing: bool,
    pub is_headless: bool,
    pub is_known_bad: bool,
    pub is_outdated_browser: bool,
    pub is_desktop_mobile_inconsistent: bool,
}

const HEADLESS_MARKERS: &[&str] = &["headlesschrome", "phantomjs", "puppeteer", "playwright", "selenium"];
const KNOWN_BAD_MARKERS: &[&str] = &["sqlmap", "nmap", "nikto", "masscan", "zgrab"];
const DESKTOP_MARKERS: &[&str] = &["windows nt", "macintosh", "x11; linux x86_64"];
const MOBILE_MARKERS: &[&str] = &["mobile", "android", "iphone", "ipad"];

const MIN_CHROME_MAJOR: u32 = 90;
const MIN_FIREFOX_MAJOR: u32 = 90;

pub fn analyze_user_agent(user_agent: Option<&str>) -> UaAnalysis {
    analyze_user_agent_with_versions(user_agent, MIN_CHROME_MAJOR, MIN_FIREFOX_MAJOR)
}

/// As [`analyze_user_agent`], but with the minimum-acceptable Chrome/Firefox
/// major version driven by `tier1.min_chrome_version`/`min_firefox_version`
/// rather than the hardcoded defaults.
pub fn analyze_user_agent_with_versions(
    user_agent: Option<&str>,
    min_chrome_major: u32,
    min_firefox_major: u32,
) -> UaAnalysis {
    let Some(ua) = user_agent else {
        return UaAnalysis {
            is_missing: true,
            ..Default::default()
        };
    };
    if ua.trim().is_empty() {
        return UaAnalysis {
            is_missing: true,
            ..Default::default()
        };
    }

    let lower = ua.to_lowercase();
    let mut result = UaAnalysis::default();

    if HEADLESS_MARKERS.iter().any(|m| lower.contains(m)) {
        result.is_headless = true;
    }
    if KNOWN_BAD_MARKERS.iter().any(|m| lower.contains(m)) {
        result.is_known_bad = true;
    }
    if let Some(major) = extract_browser_major_version(&lower, "chrome/") {
        result.is_outdated_browser = major < min_chrome_major;
    } else if let Some(major) = extract_browser_major_version(&lower, "firefox/") {
        result.is_outdated_browser = major < min_firefox_major;
    }

    let has_desktop = DESKTOP_MARKERS.iter().any(|m| lower.contains(m));
    let has_mobile = MOBILE_MARKERS.iter().any(|m| lower.contains(m));
    result.is_desktop_mobile_inconsistent = has_desktop && has_mobile;

    result
}

fn extract_browser_major_version(lower_ua: &str, marker: &str) -> Option<u32> {
    let idx = lower_ua.find(marker)?;
    let rest = &lower_ua[idx + marker.len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

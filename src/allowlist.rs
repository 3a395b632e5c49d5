//! CIDR-based allowlist, reloadable from a text file without blocking the
//! ingestion path.
//!
//! Grounded in the source's threat-intel refresh idiom (§5): a new set is
//! built off-thread and swapped in under `arc_swap::ArcSwap`, the same
//! mechanism [`crate::models::manager::ModelManager`] uses for its active
//! model.

use std::path::{Path, PathBuf};

use ipnet::IpNet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllowlistError {
    #[error("failed to read allowlist file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid CIDR entry on line {line}: {text}")]
    InvalidEntry { line: usize, text: String },
}

/// A set of CIDR networks. Empty by default — an empty allowlist matches
/// nothing, which is the safe default (no IP is silently exempted).
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    networks: Vec<IpNet>,
}

impl Allowlist {
    pub fn empty() -> Self {
        Self { networks: Vec::new() }
    }

    pub fn from_networks(networks: Vec<IpNet>) -> Self {
        Self { networks }
    }

    /// Parses one CIDR (or bare IP, treated as a /32 or /128) per
    /// non-empty, non-`#`-comment line. A malformed line is rejected with
    /// the offending line number rather than silently skipped.
    pub fn parse(contents: &str) -> Result<Self, AllowlistError> {
        let mut networks = Vec::new();
        for (idx, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let net = if line.contains('/') {
                line.parse::<IpNet>()
            } else {
                line.parse::<std::net::IpAddr>().map(IpNet::from)
            };
            match net {
                Ok(net) => networks.push(net),
                Err(_) => {
                    return Err(AllowlistError::InvalidEntry {
                        line: idx + 1,
                        text: line.to_string(),
                    })
                }
            }
        }
        Ok(Self { networks })
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, AllowlistError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| AllowlistError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&contents)
    }

    pub fn contains(&self, ip: &str) -> bool {
        let Ok(addr) = ip.parse::<std::net::IpAddr>() else {
            return false;
        };
        self.networks.iter().any(|net| net.contains(&addr))
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allowlist_matches_nothing() {
        let list = Allowlist::empty();
        assert!(!list.contains("10.0.0.5"));
    }

    #[test]
    fn cidr_range_matches_contained_address() {
        let list = Allowlist::parse("10.0.0.0/24\n").unwrap();
        assert!(list.contains("10.0.0.5"));
        assert!(!list.contains("10.0.1.5"));
    }

    #[test]
    fn bare_ip_is_treated_as_a_single_host() {
        let list = Allowlist::parse("192.168.1.1\n").unwrap();
        assert!(list.contains("192.168.1.1"));
        assert!(!list.contains("192.168.1.2"));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let list = Allowlist::parse("# comment\n\n10.0.0.0/8\n").unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn malformed_entry_reports_its_line_number() {
        let result = Allowlist::parse("10.0.0.0/24\nnot-an-ip\n");
        match result {
            Err(AllowlistError::InvalidEntry { line, .. }) => assert_eq!(line, 2),
            _ => panic!("expected InvalidEntry"),
        }
    }

    #[test]
    fn unparseable_query_ip_is_not_contained() {
        let list = Allowlist::parse("10.0.0.0/8\n").unwrap();
        assert!(!list.contains("not-an-ip"));
    }
}

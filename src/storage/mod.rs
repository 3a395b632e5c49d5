//! Filesystem-adjacent concerns that sit outside the detection core itself:
//! the single-instance process lock and the snapshot temp-then-rename
//! writer/reader.

pub mod lockfile;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::analysis::{AnalysisEngine, AnalysisError};

/// Writes the engine's snapshot to `path.tmp` then renames into place
/// (spec §3.3/§6.3). On any failure the temp file is removed rather than
/// left behind half-written.
pub fn save_snapshot(engine: &AnalysisEngine, path: &Path) -> Result<(), AnalysisError> {
    let tmp_path = path.with_extension("tmp");
    let result = (|| -> Result<(), AnalysisError> {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        engine.save_state(&mut writer)?;
        use std::io::Write;
        writer.flush()?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            fs::rename(&tmp_path, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

/// Loads a snapshot into a fresh engine. A magic/version mismatch or any
/// I/O error leaves the caller's existing engine untouched — the caller is
/// expected to only swap state in on `Ok`.
pub fn load_snapshot(engine: &mut AnalysisEngine, path: &Path) -> Result<(), AnalysisError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    engine.load_state(&mut reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisEngineConfig;
    use crate::analysis::log_entry::LogEntry;

    fn entry(ip: &str, ts: u64) -> LogEntry {
        LogEntry {
            timestamp_ms: ts,
            source_ip: ip.to_string(),
            method: "GET".to_string(),
            path: "/".to_string(),
            protocol: "HTTP/1.1".to_string(),
            status_code: 200,
            bytes_sent: 512,
            request_time_s: 0.01,
            user_agent: Some("curl/8.0".to_string()),
            referer: None,
            host: None,
            country: None,
            raw_line: String::new(),
            line_number: 0,
            successfully_parsed: true,
        }
    }

    #[test]
    fn save_then_load_round_trips_through_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.bin");

        let mut engine = AnalysisEngine::new(AnalysisEngineConfig::default());
        engine.process_and_analyze(&entry("1.2.3.4", 1000));
        engine.process_and_analyze(&entry("5.6.7.8", 2000));

        save_snapshot(&engine, &path).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let mut loaded = AnalysisEngine::new(AnalysisEngineConfig::default());
        load_snapshot(&mut loaded, &path).unwrap();
        assert_eq!(loaded.get_internal_state_metrics().tracked_ips, 2);
    }

    #[test]
    fn load_of_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = AnalysisEngine::new(AnalysisEngineConfig::default());
        let result = load_snapshot(&mut engine, &dir.path().join("nope.bin"));
        assert!(result.is_err());
    }
}

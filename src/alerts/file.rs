//! JSON-lines file alert sink. No throttling of its own — intended to run
//! alongside [`crate::alerts::stdout::StdoutAlertManager`] as a durable,
//! unfiltered record of every alert that made it past that sink's throttle.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::alerts::{Alert, AlertManager};

pub struct FileAlertManager {
    writer: BufWriter<File>,
}

impl FileAlertManager {
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl AlertManager for FileAlertManager {
    fn record_alert(&mut self, alert: Alert) -> bool {
        match serde_json::to_string(&alert) {
            Ok(line) => {
                let _ = writeln!(self.writer, "{line}");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize alert for file sink");
                false
            }
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertAction, AlertTier};

    #[test]
    fn writes_one_json_line_per_alert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let mut mgr = FileAlertManager::new(&path).unwrap();

        let alert = Alert {
            event_timestamp_ms: 1000,
            source_ip: "1.2.3.4".to_string(),
            alert_reason: "test".to_string(),
            detection_tier: AlertTier::Tier2Statistical,
            action: AlertAction::Log,
            normalized_score: 42.0,
            offending_key_identifier: String::new(),
            associated_log_line: None,
            raw_log_trigger_sample: None,
            ml_feature_contribution: None,
            event_context: None,
        };
        assert!(mgr.record_alert(alert));
        mgr.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("\"source_ip\":\"1.2.3.4\""));
    }
}

//! Anomaly Engine
//!
//! Real-time anomaly detection over HTTP access logs: reads parsed access
//! log lines, runs them through the four-tier scoring pipeline, and emits
//! throttled alerts, while periodically pruning stale state and writing a
//! crash-safe snapshot to disk.
//!
//! # Usage
//!
//! ```bash
//! # Tail an access log file
//! anomaly-engine --log /var/log/nginx/access.log
//!
//! # Read access log lines from stdin
//! tail -f /var/log/nginx/access.log | anomaly-engine --stdin
//! ```
//!
//! # Environment Variables
//!
//! - `ANOMALY_CONFIG`: path to a TOML config file, read before `--config`
//!   defaults and the built-in defaults.
//! - `RUST_LOG`: logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use anomaly_engine::alerts::file::FileAlertManager;
use anomaly_engine::alerts::stdout::StdoutAlertManager;
use anomaly_engine::config;
use anomaly_engine::learning::LearningEngine;
use anomaly_engine::models::manager::ModelManager;
use anomaly_engine::storage;
use anomaly_engine::{Allowlist, AlertManager, AnalysisEngine, AnomalyConfig, LogEntry, RuleEngine};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "anomaly-engine")]
#[command(about = "Real-time anomaly detection over HTTP access logs")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML configuration file. Overrides `$ANOMALY_CONFIG` and
    /// the default search path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Read access-log lines from stdin instead of `general.log_input_path`.
    #[arg(long)]
    stdin: bool,

    /// Override `general.log_input_path`.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,

    /// Also append every emitted alert as a JSON line to this file.
    #[arg(long, value_name = "PATH")]
    alert_log: Option<PathBuf>,

    /// Discard any existing state snapshot instead of resuming from it.
    #[arg(long)]
    fresh_state: bool,
}

/// Fans an alert out to every configured sink, returning whether any sink
/// actually emitted it (as opposed to every sink throttling it away).
struct CompositeAlertManager {
    sinks: Vec<Box<dyn AlertManager>>,
}

impl AlertManager for CompositeAlertManager {
    fn record_alert(&mut self, alert: anomaly_engine::Alert) -> bool {
        let mut emitted = false;
        for sink in &mut self.sinks {
            if sink.record_alert(alert.clone()) {
                emitted = true;
            }
        }
        emitted
    }

    fn flush(&mut self) -> std::io::Result<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

/// How often the driver runs the pruning sweep and writes a snapshot,
/// independent of how fast lines are arriving.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let cfg = match &args.config {
        Some(path) => AnomalyConfig::load_from_file(path)
            .with_context(|| format!("failed to load config file: {}", path.display()))?,
        None => AnomalyConfig::load(),
    };
    config::init(cfg);
    let cfg = config::get();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Anomaly Engine");
    info!("  Real-time HTTP access-log anomaly detection");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let state_file_path = PathBuf::from(&cfg.general.state_file_path);
    let data_dir = state_file_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));

    info!("acquiring process lock in {:?}", data_dir);
    let _process_lock =
        storage::lockfile::ProcessLock::acquire(data_dir).context("failed to acquire process lock")?;

    let allowlist = match &cfg.general.allowlist_path {
        Some(path) => Allowlist::load_from_file(path)
            .with_context(|| format!("failed to load allowlist file: {path}"))?,
        None => Allowlist::empty(),
    };
    info!(entries = allowlist.len(), "allowlist loaded");

    let model_manager = Arc::new(ModelManager::new(Duration::from_secs(cfg.tier3.retraining_interval_seconds)));
    let retrain_task = if cfg.tier3.enabled && cfg.tier3.automated_retraining_enabled {
        let candidate_path = cfg
            .tier3
            .training_script_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(&cfg.tier3.model_path));
        let shutdown = CancellationToken::new();
        info!(path = ?candidate_path, "spawning background tier-3 retraining task");
        Some((Arc::clone(&model_manager).spawn_background_retrain(candidate_path, shutdown.clone()), shutdown))
    } else {
        None
    };

    let mut learning = LearningEngine::new(cfg.learning_engine_config());

    let mut engine = AnalysisEngine::new(cfg.analysis_engine_config());
    if !args.fresh_state && state_file_path.exists() {
        match storage::load_snapshot(&mut engine, &state_file_path) {
            Ok(()) => info!(path = ?state_file_path, "resumed from state snapshot"),
            Err(e) => warn!(error = %e, path = ?state_file_path, "failed to load state snapshot, starting fresh"),
        }
    }

    let mut sinks: Vec<Box<dyn AlertManager>> = Vec::new();
    if cfg.general.alerts_to_stdout {
        sinks.push(Box::new(StdoutAlertManager::new(
            cfg.alerts.throttle_duration_ms,
            (cfg.alerts.alert_throttle_max_intervening_alerts + 1) as usize,
        )));
    }
    if let Some(path) = &args.alert_log {
        sinks.push(Box::new(
            FileAlertManager::new(path).with_context(|| format!("failed to open alert log: {}", path.display()))?,
        ));
    }
    let mut alert_sink = CompositeAlertManager { sinks };

    let cancel_token = CancellationToken::new();
    let shutdown_signal = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        shutdown_signal.cancel();
    });

    let log_path = args.log.as_ref().map(PathBuf::from).unwrap_or_else(|| PathBuf::from(&cfg.general.log_input_path));
    let mut reader: Box<dyn tokio::io::AsyncBufRead + Unpin + Send> = if args.stdin {
        info!("reading access log lines from stdin");
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        info!(path = ?log_path, "reading access log lines from file");
        let file = tokio::fs::File::open(&log_path)
            .await
            .with_context(|| format!("failed to open log file: {}", log_path.display()))?;
        Box::new(BufReader::new(file))
    };

    let mut line_number: u64 = 0;
    let mut line_buf = String::with_capacity(512);
    let mut maintenance = tokio::time::interval(MAINTENANCE_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("shutting down after {} lines", line_number);
                break;
            }
            _ = maintenance.tick() => {
                run_maintenance(&mut engine, &mut learning, cfg, &state_file_path);
            }
            result = reader.read_line(&mut line_buf) => {
                match result {
                    Ok(0) => {
                        info!("end of log input reached after {} lines", line_number);
                        break;
                    }
                    Ok(_) => {
                        line_number += 1;
                        let raw = line_buf.trim_end_matches(['\n', '\r']).to_string();
                        line_buf.clear();
                        if raw.is_empty() {
                            continue;
                        }
                        process_line(&raw, line_number, &mut engine, &mut learning, &model_manager, &allowlist, cfg, &mut alert_sink);
                    }
                    Err(e) => {
                        error!(error = %e, "error reading log input");
                        break;
                    }
                }
            }
        }
    }

    run_maintenance(&mut engine, &mut learning, cfg, &state_file_path);
    if let Err(e) = alert_sink.flush() {
        warn!(error = %e, "failed to flush alert sinks on shutdown");
    }
    if let Some((handle, shutdown)) = retrain_task {
        shutdown.cancel();
        let _ = handle.await;
    }

    info!("anomaly engine shutdown complete");
    Ok(())
}

fn process_line(
    raw_line: &str,
    line_number: u64,
    engine: &mut AnalysisEngine,
    learning: &mut LearningEngine,
    model_manager: &ModelManager,
    allowlist: &Allowlist,
    cfg: &AnomalyConfig,
    alert_sink: &mut CompositeAlertManager,
) {
    let entry: LogEntry = anomaly_engine::log_parser::parse_line(raw_line, line_number);
    if !entry.successfully_parsed {
        warn!(line_number, "failed to parse log line");
        return;
    }

    let event = engine.process_and_analyze(&entry);

    learning.record_observation(&event.source_ip, "ip_request_time", event.request_time_s, event.timestamp_ms);
    learning.record_observation(&event.source_ip, "ip_bytes_sent", event.bytes_sent as f64, event.timestamp_ms);
    learning.record_observation(
        &event.path,
        "path_error_rate",
        if event.status_code >= 400 { 1.0 } else { 0.0 },
        event.timestamp_ms,
    );

    let rule_engine = RuleEngine::new(cfg, allowlist, model_manager, learning);
    if let Some(alert) = rule_engine.evaluate(&event) {
        if alert_sink.record_alert(alert.clone()) {
            info!(
                ip = %alert.source_ip,
                reason = %alert.alert_reason,
                tier = ?alert.detection_tier,
                score = alert.normalized_score,
                action = ?alert.action,
                "anomaly alert emitted"
            );
        }
    }
}

fn run_maintenance(engine: &mut AnalysisEngine, learning: &mut LearningEngine, cfg: &AnomalyConfig, state_file_path: &PathBuf) {
    let now_ms = engine.get_internal_state_metrics().max_timestamp_seen;
    if cfg.general.state_pruning_enabled {
        let ttl_ms = cfg.general.state_ttl_seconds * 1000;
        engine.run_pruning(now_ms, ttl_ms);
        learning.cleanup_expired(now_ms);
    }

    match storage::save_snapshot(engine, state_file_path) {
        Ok(()) => info!(path = ?state_file_path, "wrote state snapshot"),
        Err(e) => error!(error = %e, path = ?state_file_path, "failed to write state snapshot"),
    }
}

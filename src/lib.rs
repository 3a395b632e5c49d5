//! Real-time anomaly detection over HTTP access logs: a four-tier scoring
//! pipeline (heuristic, statistical, ML, dynamic-threshold) feeding a
//! throttled alert sink, with CIDR allowlisting and crash-safe snapshots.

pub mod alerts;
pub mod allowlist;
pub mod analysis;
pub mod config;
pub mod learning;
pub mod log_parser;
pub mod metrics;
pub mod models;
pub mod rolling;
pub mod rules;
pub mod seasonal;
pub mod stats;
pub mod storage;
pub mod window;

pub use alerts::{Alert, AlertAction, AlertManager, AlertTier};
pub use allowlist::Allowlist;
pub use analysis::analyzed_event::AnalyzedEvent;
pub use analysis::log_entry::LogEntry;
pub use analysis::{AnalysisEngine, AnalysisEngineConfig, AnalysisError};
pub use config::AnomalyConfig;
pub use learning::LearningEngine;
pub use models::manager::ModelManager;
pub use rules::RuleEngine;

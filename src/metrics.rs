//! Observation-only metrics sink (spec §6.5). The core calls this at fixed
//! points — records processed, alerts emitted, rule hits, per-tier
//! evaluation latency, engine state sizes — and is indifferent to where
//! those numbers end up.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;

/// A label set attached to one metric observation. Kept as an owned vec of
/// pairs rather than a `HashMap` — label sets are small (1-3 entries) and
/// insertion order matters for stable text exposition.
pub type Labels<'a> = &'a [(&'a str, &'a str)];

pub trait Metrics: Send + Sync {
    fn counter(&self, name: &str, labels: Labels, delta: u64);
    fn gauge(&self, name: &str, labels: Labels, value: f64);
    fn observe(&self, name: &str, labels: Labels, value: f64);
}

/// Discards everything. The default when monitoring is not configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl Metrics for NullMetrics {
    fn counter(&self, _name: &str, _labels: Labels, _delta: u64) {}
    fn gauge(&self, _name: &str, _labels: Labels, _value: f64) {}
    fn observe(&self, _name: &str, _labels: Labels, _value: f64) {}
}

fn label_key(name: &str, labels: Labels) -> String {
    let mut key = name.to_string();
    for (k, v) in labels {
        let _ = write!(key, "|{k}={v}");
    }
    key
}

fn format_labels(labels: Labels) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let mut out = String::from("{");
    for (i, (k, v)) in labels.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{k}=\"{v}\"");
    }
    out.push('}');
    out
}

#[derive(Debug, Default)]
struct Histogram {
    count: u64,
    sum: f64,
}

/// In-process accumulator exposed as Prometheus text format on demand. No
/// HTTP server here — wiring a scrape endpoint is the binary's job; this
/// type only owns the numbers.
#[derive(Default)]
pub struct PrometheusMetrics {
    counters: Mutex<HashMap<String, (String, Labels<'static>, u64)>>,
    gauges: Mutex<HashMap<String, f64>>,
    histograms: Mutex<HashMap<String, Histogram>>,
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders all accumulated metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, (labels_str, value)) in self.counter_snapshot() {
            let _ = writeln!(out, "{name}{labels_str} {value}");
        }
        for (key, value) in self.gauges.lock().expect("gauges mutex poisoned").iter() {
            let _ = writeln!(out, "{key} {value}");
        }
        for (key, hist) in self.histograms.lock().expect("histograms mutex poisoned").iter() {
            let _ = writeln!(out, "{key}_count {}", hist.count);
            let _ = writeln!(out, "{key}_sum {}", hist.sum);
        }
        out
    }

    fn counter_snapshot(&self) -> Vec<(String, (String, f64))> {
        self.counters
            .lock()
            .expect("counters mutex poisoned")
            .iter()
            .map(|(key, (name, _, value))| (name.clone(), (key.clone(), *value as f64)))
            .collect()
    }
}

impl Metrics for PrometheusMetrics {
    fn counter(&self, name: &str, labels: Labels, delta: u64) {
        let key = label_key(name, labels);
        let labels_str = format_labels(labels);
        let mut counters = self.counters.lock().expect("counters mutex poisoned");
        let entry = counters.entry(key).or_insert_with(|| (String::new(), &[], 0));
        entry.0 = format!("{name}{labels_str}");
        entry.2 += delta;
    }

    fn gauge(&self, name: &str, labels: Labels, value: f64) {
        let key = format!("{name}{}", format_labels(labels));
        self.gauges.lock().expect("gauges mutex poisoned").insert(key, value);
    }

    fn observe(&self, name: &str, labels: Labels, value: f64) {
        let key = format!("{name}{}", format_labels(labels));
        let mut histograms = self.histograms.lock().expect("histograms mutex poisoned");
        let hist = histograms.entry(key).or_default();
        hist.count += 1;
        hist.sum += value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_metrics_never_panics() {
        let m = NullMetrics;
        m.counter("logs_processed", &[], 1);
        m.gauge("tracked_ips", &[], 5.0);
        m.observe("tier1_latency_ms", &[("tier", "1")], 0.5);
    }

    #[test]
    fn prometheus_counter_accumulates_across_calls() {
        let m = PrometheusMetrics::new();
        m.counter("alerts_emitted", &[("tier", "1")], 1);
        m.counter("alerts_emitted", &[("tier", "1")], 2);
        let rendered = m.render();
        assert!(rendered.contains("alerts_emitted{tier=\"1\"} 3"));
    }

    #[test]
    fn prometheus_gauge_reflects_latest_value() {
        let m = PrometheusMetrics::new();
        m.gauge("tracked_ips", &[], 10.0);
        m.gauge("tracked_ips", &[], 7.0);
        assert!(m.render().contains("tracked_ips 7"));
    }

    #[test]
    fn prometheus_histogram_tracks_count_and_sum() {
        let m = PrometheusMetrics::new();
        m.observe("tier1_latency_ms", &[], 1.0);
        m.observe("tier1_latency_ms", &[], 3.0);
        let rendered = m.render();
        assert!(rendered.contains("tier1_latency_ms_count 2"));
        assert!(rendered.contains("tier1_latency_ms_sum 4"));
    }
}

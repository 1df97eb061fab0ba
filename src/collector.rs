//! Metric collector that stores gauge values between polls and renders them
//! in Prometheus exposition format.
//!
//! The collector is the only state shared between the poll loop (single
//! writer) and the HTTP scrape handlers (many readers). Each set operation is
//! atomic per series; readers may observe values from different ticks across
//! different series. Series are never deleted: a site or circuit absent from
//! later polls keeps its last value for the process lifetime.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use parking_lot::RwLock;

/// Gauge tracking per-circuit health ordinals.
pub const CIRCUIT_STATUS: &str = "circuit_status";
/// Gauge tracking per-site health ordinals.
pub const SITE_STATUS: &str = "site_status";
/// Scalar gauge for the latency the vendor reports for its own backend.
pub const RESPONSE_TIME: &str = "response_time";
/// Scalar gauge for the HTTP status the vendor reports for its own backend.
pub const HTTP_STATUS: &str = "http_status";
/// Info-style series recording last-seen site metadata. Stored and rendered
/// as the gauge `site_information_info` with constant value 1; the 0.0.4 text
/// format has no `info` type.
pub const SITE_INFORMATION: &str = "site_information";

/// Prefix for the exporter's self-metrics.
const SELF_PREFIX: &str = "sitewatch";

/// A unique identifier for a metric time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    /// The metric name.
    pub name: String,
    /// Sorted label key-value pairs.
    pub labels: Vec<(String, String)>,
}

impl SeriesKey {
    /// Create a new series key with labels sorted for consistent identity.
    pub fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        labels.sort_by(|a, b| a.0.cmp(&b.0));

        Self {
            name: name.to_string(),
            labels,
        }
    }

    /// Format labels for Prometheus exposition format.
    pub fn format_labels(&self) -> String {
        if self.labels.is_empty() {
            return String::new();
        }

        let parts: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
            .collect();

        format!("{{{}}}", parts.join(","))
    }
}

/// Poll-loop statistics.
#[derive(Debug, Clone, Default)]
pub struct CollectorStats {
    /// Total poll ticks attempted.
    pub polls_total: u64,
    /// Ticks that completed without error.
    pub polls_succeeded: u64,
    /// Ticks aborted by transport, HTTP, decode, or schema failures.
    pub polls_failed: u64,
}

/// Thread-safe metric collector. Every stored series is a gauge.
pub struct MetricCollector {
    /// Stored values indexed by series key.
    metrics: RwLock<HashMap<SeriesKey, f64>>,
    /// Statistics.
    stats: RwLock<CollectorStats>,
}

/// Create a shareable collector handle.
pub type SharedCollector = Arc<MetricCollector>;

impl MetricCollector {
    /// Create a new, empty collector.
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
            stats: RwLock::new(CollectorStats::default()),
        }
    }

    /// Set a labeled gauge to a value, creating the series if needed.
    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = SeriesKey::new(name, labels);
        self.metrics.write().insert(key, value);
    }

    /// Set an unlabeled scalar gauge.
    pub fn set_scalar(&self, name: &str, value: f64) {
        self.set_gauge(name, &[], value);
    }

    /// Record an info-style series: a gauge named `{name}_info` with constant
    /// value 1 and the data in the labels.
    pub fn set_info(&self, name: &str, labels: &[(&str, &str)]) {
        self.set_gauge(&format!("{}_info", name), labels, 1.0);
    }

    /// Fetch the current value of a series, if set.
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let key = SeriesKey::new(name, labels);
        self.metrics.read().get(&key).copied()
    }

    /// Record the outcome of one poll tick.
    pub fn record_poll(&self, success: bool) {
        let mut stats = self.stats.write();
        stats.polls_total += 1;
        if success {
            stats.polls_succeeded += 1;
        } else {
            stats.polls_failed += 1;
        }
    }

    /// Get the current number of stored series.
    pub fn series_count(&self) -> usize {
        self.metrics.read().len()
    }

    /// Get collector statistics.
    pub fn stats(&self) -> CollectorStats {
        self.stats.read().clone()
    }

    /// Render metrics in Prometheus exposition format.
    ///
    /// Always produces a valid payload: before the first successful poll only
    /// the exporter's self-metrics are present.
    pub fn render(&self) -> String {
        let metrics = self.metrics.read();
        let mut output = Vec::with_capacity(metrics.len() * 100);

        // Group series by name for TYPE comments
        let mut by_name: HashMap<&str, Vec<(&SeriesKey, f64)>> = HashMap::new();
        for (key, value) in metrics.iter() {
            by_name.entry(&key.name).or_default().push((key, *value));
        }

        // Sort by metric name for consistent output
        let mut names: Vec<_> = by_name.keys().copied().collect();
        names.sort();

        for name in names {
            let mut series = by_name.remove(name).unwrap_or_default();
            if series.is_empty() {
                continue;
            }
            series.sort_by(|a, b| a.0.labels.cmp(&b.0.labels));

            writeln!(output, "# TYPE {} gauge", name).ok();

            for (key, value) in series {
                writeln!(
                    output,
                    "{}{} {}",
                    key.name,
                    key.format_labels(),
                    format_value(value)
                )
                .ok();
            }
        }

        // Exporter self-metrics
        let stats = self.stats.read();
        writeln!(output, "# TYPE {}_exporter_series_total gauge", SELF_PREFIX).ok();
        writeln!(
            output,
            "{}_exporter_series_total {}",
            SELF_PREFIX,
            metrics.len()
        )
        .ok();
        writeln!(output, "# TYPE {}_exporter_polls_total counter", SELF_PREFIX).ok();
        writeln!(
            output,
            "{}_exporter_polls_total {}",
            SELF_PREFIX, stats.polls_total
        )
        .ok();
        writeln!(
            output,
            "# TYPE {}_exporter_polls_failed_total counter",
            SELF_PREFIX
        )
        .ok();
        writeln!(
            output,
            "{}_exporter_polls_failed_total {}",
            SELF_PREFIX, stats.polls_failed
        )
        .ok();

        String::from_utf8(output).unwrap_or_default()
    }
}

impl Default for MetricCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

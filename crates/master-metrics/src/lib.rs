//! Metrics declarations for the master gateway.
//!
//! Every metric the link and memory crates emit is declared here as a
//! structured [`Metric`] constant, so names stay consistent and a recorder can
//! be given descriptions and units at startup.
//!
//! # Example
//!
//! ```rust,ignore
//! use master_metrics::{metric_defs, describe_metrics, MetricLabels};
//!
//! describe_metrics();
//!
//! let labels = MetricLabels::new("core").with_command("MR");
//! metrics::counter!(metric_defs::LINK_REQUESTS.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use master_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const FRAMES: Metric = Metric::counter("master.link.frames")
///     .with_description("Frames seen on the wire")
///     .with_unit(Unit::Count)
///     .with_labels(&["family"]);
///
/// assert_eq!(FRAMES.name, "master.link.frames");
/// assert_eq!(FRAMES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "master.link.requests").
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// Unit of measurement, if any.
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a counter metric.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Creates a gauge metric.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Creates a histogram metric.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => describe_counter!(self.name, unit, self.description),
            (MetricKind::Counter, None) => describe_counter!(self.name, self.description),
            (MetricKind::Gauge, Some(unit)) => describe_gauge!(self.name, unit, self.description),
            (MetricKind::Gauge, None) => describe_gauge!(self.name, self.description),
            (MetricKind::Histogram, Some(unit)) => describe_histogram!(self.name, unit, self.description),
            (MetricKind::Histogram, None) => describe_histogram!(self.name, self.description),
        }
    }
}

/// Labels attached to link and memory metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLabels {
    /// Hardware family ("classic" or "core").
    pub family: String,
    /// Instruction code, for link metrics.
    pub command: Option<String>,
    /// Memory bank, for memory metrics.
    pub bank: Option<String>,
}

impl MetricLabels {
    /// Labels for the given family.
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            command: None,
            bank: None,
        }
    }

    /// Adds the instruction code label.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Adds the memory bank label.
    pub fn with_bank(mut self, bank: impl Into<String>) -> Self {
        self.bank = Some(bank.into());
        self
    }

    /// Converts to the label list accepted by the `metrics` macros.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = vec![("family", self.family.clone())];
        if let Some(command) = &self.command {
            labels.push(("command", command.clone()));
        }
        if let Some(bank) = &self.bank {
            labels.push(("bank", bank.clone()));
        }
        labels
    }
}

/// All metric definitions.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels of per-command link metrics.
    pub const LINK_LABELS: &[&str] = &["family", "command"];

    /// Labels of per-bank memory metrics.
    pub const MEMORY_LABELS: &[&str] = &["family", "bank"];

    // ========================================================================
    // Link
    // ========================================================================

    /// Requests issued to the master.
    pub const LINK_REQUESTS: Metric = Metric::counter("master.link.requests")
        .with_description("Requests issued to the master")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    /// Attempts repeated after a timeout or corrupt reply.
    pub const LINK_RETRIES: Metric = Metric::counter("master.link.retries")
        .with_description("Request attempts repeated after a timeout or corrupt reply")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    /// Attempts that saw no reply before the deadline.
    pub const LINK_TIMEOUTS: Metric = Metric::counter("master.link.timeouts")
        .with_description("Attempts without a reply before the deadline")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    /// Frames rejected by the codec.
    pub const LINK_CHECKSUM_FAILURES: Metric = Metric::counter("master.link.checksum_failures")
        .with_description("Corrupt frames rejected by the codec")
        .with_unit(Unit::Count)
        .with_labels(&["family"]);

    /// Requests that failed after all attempts.
    pub const LINK_FAILURES: Metric = Metric::counter("master.link.failures")
        .with_description("Requests that failed after all attempts")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    /// Bytes written to the channel.
    pub const LINK_BYTES_WRITTEN: Metric = Metric::counter("master.link.bytes_written")
        .with_description("Bytes written to the channel")
        .with_unit(Unit::Bytes)
        .with_labels(&["family"]);

    /// Bytes read from the channel.
    pub const LINK_BYTES_READ: Metric = Metric::counter("master.link.bytes_read")
        .with_description("Bytes read from the channel")
        .with_unit(Unit::Bytes)
        .with_labels(&["family"]);

    /// Unsolicited event frames forwarded to subscribers.
    pub const LINK_EVENTS: Metric = Metric::counter("master.link.events")
        .with_description("Unsolicited event frames received")
        .with_unit(Unit::Count)
        .with_labels(&["family"]);

    /// Time from first transmission to the matching reply.
    pub const LINK_REQUEST_DURATION: Metric = Metric::histogram("master.link.request_duration_ms")
        .with_description("Time from first transmission to the matching reply")
        .with_unit(Unit::Milliseconds)
        .with_labels(LINK_LABELS);

    // ========================================================================
    // Memory
    // ========================================================================

    /// Pages read from the device.
    pub const MEMORY_PAGE_READS: Metric = Metric::counter("master.memory.page_reads")
        .with_description("Pages read from the device")
        .with_unit(Unit::Count)
        .with_labels(MEMORY_LABELS);

    /// Write spans sent to the device.
    pub const MEMORY_PAGE_WRITES: Metric = Metric::counter("master.memory.page_writes")
        .with_description("Write spans sent to the device")
        .with_unit(Unit::Count)
        .with_labels(MEMORY_LABELS);

    /// Page lookups answered from the cache.
    pub const MEMORY_CACHE_HITS: Metric = Metric::counter("master.memory.cache_hits")
        .with_description("Page lookups answered from the cache")
        .with_unit(Unit::Count)
        .with_labels(MEMORY_LABELS);

    /// Pages dropped from the cache.
    pub const MEMORY_INVALIDATIONS: Metric = Metric::counter("master.memory.invalidations")
        .with_description("Pages dropped from the cache")
        .with_unit(Unit::Count)
        .with_labels(&["family"]);

    /// Saves that failed part way.
    pub const MEMORY_SAVE_FAILURES: Metric = Metric::counter("master.memory.save_failures")
        .with_description("Saves that failed before all spans were written")
        .with_unit(Unit::Count)
        .with_labels(&["family"]);

    /// Pages currently cached.
    pub const MEMORY_CACHED_PAGES: Metric = Metric::gauge("master.memory.cached_pages")
        .with_description("Pages currently held in the cache")
        .with_unit(Unit::Count)
        .with_labels(&["family"]);

    /// Every defined metric.
    pub const ALL: &[&Metric] = &[
        &LINK_REQUESTS,
        &LINK_RETRIES,
        &LINK_TIMEOUTS,
        &LINK_CHECKSUM_FAILURES,
        &LINK_FAILURES,
        &LINK_BYTES_WRITTEN,
        &LINK_BYTES_READ,
        &LINK_EVENTS,
        &LINK_REQUEST_DURATION,
        &MEMORY_PAGE_READS,
        &MEMORY_PAGE_WRITES,
        &MEMORY_CACHE_HITS,
        &MEMORY_INVALIDATIONS,
        &MEMORY_SAVE_FAILURES,
        &MEMORY_CACHED_PAGES,
    ];
}

/// Registers descriptions of every metric with the installed recorder.
///
/// Call this once at startup, after the recorder is installed.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

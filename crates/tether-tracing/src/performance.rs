//! Timing helpers for boundary crossings and kernel calls
//!
//! ## Example
//!
//! ```rust
//! use tether_tracing::performance::{record_transfer, PerformanceSpan, Transfer};
//!
//! let span = PerformanceSpan::new("copy_out", Some(100));
//! // ... work ...
//! drop(span); // logged only if it took at least 100μs
//!
//! record_transfer(8 * 1024, Transfer::EngineToHost, 40);
//! ```

use std::fmt;
use std::time::Instant;
use tracing::span::EnteredSpan;
use tracing::{Level, Span};

/// RAII timer that logs its duration when dropped
///
/// The span is entered for the timer's whole lifetime, so events emitted
/// while it is alive carry its fields. With a threshold, spans shorter than
/// `threshold_us` stay silent.
pub struct PerformanceSpan {
    name: String,
    threshold_us: Option<u64>,
    start_time: Instant,
    span: EnteredSpan,
}

impl PerformanceSpan {
    /// Start a debug-level span
    pub fn new(name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        Self::with_level(Level::DEBUG, name, threshold_us)
    }

    /// Start a span at an explicit level
    pub fn with_level(level: Level, name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        let name = name.into();
        let span = match level {
            Level::TRACE => tracing::trace_span!("perf", name = %name),
            Level::DEBUG => tracing::debug_span!("perf", name = %name),
            Level::INFO => tracing::info_span!("perf", name = %name),
            Level::WARN => tracing::warn_span!("perf", name = %name),
            Level::ERROR => tracing::error_span!("perf", name = %name),
        };
        Self::in_span(span, name, threshold_us)
    }

    /// Time the region covered by `span`, which stays entered until drop
    pub fn in_span(span: Span, name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        Self {
            name: name.into(),
            threshold_us,
            start_time: Instant::now(),
            span: span.entered(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying span
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Microseconds since the span started
    pub fn elapsed_us(&self) -> u64 {
        self.start_time.elapsed().as_micros() as u64
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        // still inside the span; it exits when `span` drops after this
        let elapsed_us = self.elapsed_us();
        if self.threshold_us.map_or(true, |threshold| elapsed_us >= threshold) {
            tracing::debug!(
                duration_us = elapsed_us,
                duration_ms = elapsed_us as f64 / 1000.0,
                "performance_span_complete"
            );
        }
    }
}

/// Direction of a copy across the engine boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    HostToEngine,
    EngineToHost,
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transfer::HostToEngine => write!(f, "host_to_engine"),
            Transfer::EngineToHost => write!(f, "engine_to_host"),
        }
    }
}

fn per_second(amount: f64, duration_us: u64) -> f64 {
    if duration_us == 0 {
        0.0
    } else {
        amount / duration_us as f64 * 1_000_000.0
    }
}

/// Record a copy across the engine boundary with its bandwidth
pub fn record_transfer(bytes: usize, direction: Transfer, duration_us: u64) {
    let bandwidth_mbps = per_second(bytes as f64, duration_us) / (1024.0 * 1024.0);
    tracing::debug!(
        event = "transfer",
        bytes,
        direction = %direction,
        duration_us,
        bandwidth_mbps,
        "boundary_transfer"
    );
}

/// Record elements processed by a kernel call
pub fn record_throughput(operation: &str, elements: usize, duration_us: u64) {
    let elements_per_sec = per_second(elements as f64, duration_us);
    tracing::debug!(
        event = "throughput",
        operation,
        elements,
        duration_us,
        melems_per_sec = elements_per_sec / 1_000_000.0,
        "operation_throughput"
    );
}

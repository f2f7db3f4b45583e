//! Prometheus metrics for chatbot-service.
//!
//! Connection, worker pool, generation and normalizer metrics. Recording
//! helpers are no-ops until [`init_metrics`] has run, so tests can drive the
//! dispatcher without a registry.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// All collectors, registered together so they are published as one unit.
struct Metrics {
    registry: Registry,
    connections_total: IntCounterVec,
    connection_duration_seconds: Histogram,
    workers_busy: IntGauge,
    connections_queued: IntGauge,
    generation_duration_seconds: Histogram,
    generation_errors_total: IntCounterVec,
    normalizer_fallbacks_total: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize all metrics. Repeated or concurrent calls keep the first set.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let connections_total = IntCounterVec::new(
        Opts::new(
            "chatbot_connections_total",
            "Total connections handled, by outcome",
        ),
        &["outcome"],
    )?;

    let connection_duration = Histogram::with_opts(
        HistogramOpts::new(
            "chatbot_connection_duration_seconds",
            "Time from worker pickup to connection close",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )?;

    let workers_busy = IntGauge::with_opts(Opts::new(
        "chatbot_workers_busy",
        "Workers currently processing a connection",
    ))?;

    let connections_queued = IntGauge::with_opts(Opts::new(
        "chatbot_connections_queued",
        "Accepted connections waiting for a free worker",
    ))?;

    let generation_duration = Histogram::with_opts(
        HistogramOpts::new(
            "chatbot_generation_duration_seconds",
            "Text generation latency in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )?;

    let generation_errors = IntCounterVec::new(
        Opts::new(
            "chatbot_generation_errors_total",
            "Total text generation failures",
        ),
        &["error_type"],
    )?;

    let normalizer_fallbacks = IntCounterVec::new(
        Opts::new(
            "chatbot_normalizer_fallbacks_total",
            "Answers replaced by a fallback message",
        ),
        &["reason"],
    )?;

    registry.register(Box::new(connections_total.clone()))?;
    registry.register(Box::new(connection_duration.clone()))?;
    registry.register(Box::new(workers_busy.clone()))?;
    registry.register(Box::new(connections_queued.clone()))?;
    registry.register(Box::new(generation_duration.clone()))?;
    registry.register(Box::new(generation_errors.clone()))?;
    registry.register(Box::new(normalizer_fallbacks.clone()))?;

    let metrics = Metrics {
        registry,
        connections_total,
        connection_duration_seconds: connection_duration,
        workers_busy,
        connections_queued,
        generation_duration_seconds: generation_duration,
        generation_errors_total: generation_errors,
        normalizer_fallbacks_total: normalizer_fallbacks,
    };

    // A concurrent caller may have won; its set is the one everybody uses.
    if METRICS.set(metrics).is_ok() {
        tracing::info!("Prometheus metrics initialized");
    }
    Ok(())
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match METRICS.get() {
        Some(m) => &m.registry,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

// Helper functions for recording metrics

/// Record a closed connection.
pub fn record_connection(outcome: &str, duration_secs: f64) {
    if let Some(m) = METRICS.get() {
        m.connections_total.with_label_values(&[outcome]).inc();
        m.connection_duration_seconds.observe(duration_secs);
    }
}

/// A worker picked up a connection.
pub fn worker_acquired() {
    if let Some(m) = METRICS.get() {
        m.workers_busy.inc();
    }
}

/// A worker finished with its connection.
pub fn worker_released() {
    if let Some(m) = METRICS.get() {
        m.workers_busy.dec();
    }
}

/// An accepted connection started waiting for a worker.
pub fn connection_queued() {
    if let Some(m) = METRICS.get() {
        m.connections_queued.inc();
    }
}

/// A connection stopped waiting, served or not.
pub fn connection_dequeued() {
    if let Some(m) = METRICS.get() {
        m.connections_queued.dec();
    }
}

/// Record generation latency.
pub fn record_generation(duration_secs: f64) {
    if let Some(m) = METRICS.get() {
        m.generation_duration_seconds.observe(duration_secs);
    }
}

/// Record a generation error.
pub fn record_generation_error(error_type: &str) {
    if let Some(m) = METRICS.get() {
        m.generation_errors_total.with_label_values(&[error_type]).inc();
    }
}

/// Record a normalizer fallback.
pub fn record_fallback(reason: &str) {
    if let Some(m) = METRICS.get() {
        m.normalizer_fallbacks_total.with_label_values(&[reason]).inc();
    }
}

/// Current value of a gauge or counter sample in the exported text, if present.
#[cfg(test)]
pub(crate) fn sample_value(name: &str) -> Option<f64> {
    get_metrics().lines().find_map(|line| {
        let (metric, value) = line.split_once(' ')?;
        if metric == name {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_exposed_after_init() {
        init_metrics().unwrap();
        init_metrics().unwrap();

        record_connection("answered", 0.2);
        record_fallback("repetition");

        let text = get_metrics();
        assert!(text.contains("chatbot_connections_total"));
        assert!(text.contains("chatbot_normalizer_fallbacks_total"));
    }

    #[test]
    fn test_concurrent_init_records_into_exported_registry() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| init_metrics().unwrap()))
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        record_generation_error("concurrent_init_check");

        let text = get_metrics();
        assert!(text.contains(r#"error_type="concurrent_init_check""#));
    }
}

//! Prometheus metrics for castwave workers, gateway and scheduler
//!
//! This module tracks:
//! - Job queue: jobs by family/outcome, handler duration
//! - AI gateway: calls by provider/operation/outcome, fallback hops
//! - Curation: items processed per step, trigger runs
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec,
    TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Job queue metrics
struct QueueMetrics {
    jobs: CounterVec,
    job_duration: HistogramVec,
}

/// Gateway and curation metrics
struct PipelineMetrics {
    gateway_calls: CounterVec,
    gateway_fallbacks: CounterVec,
    curation_items: CounterVec,
    trigger_runs: CounterVec,
}

static QUEUE_METRICS: OnceLock<QueueMetrics> = OnceLock::new();

static PIPELINE_METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = castwave::metrics::init_metrics() {
///     tracing::warn!("Metrics initialization failed: {e}");
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    let _ = METRICS_INIT_ATTEMPTED.set(true);

    let queue = QueueMetrics {
        jobs: register_counter_vec!(
            "castwave_jobs_total",
            "Jobs processed by family and outcome",
            &["family", "outcome"]
        )?,
        job_duration: register_histogram_vec!(
            "castwave_job_duration_seconds",
            "Job handler duration in seconds",
            &["family"],
            vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]
        )?,
    };
    let _ = QUEUE_METRICS.set(queue);

    let pipeline = PipelineMetrics {
        gateway_calls: register_counter_vec!(
            "castwave_gateway_calls_total",
            "AI gateway calls by provider, operation and outcome",
            &["provider", "operation", "outcome"]
        )?,
        gateway_fallbacks: register_counter_vec!(
            "castwave_gateway_fallbacks_total",
            "Fallback hops taken by the AI gateway",
            &["from", "to"]
        )?,
        curation_items: register_counter_vec!(
            "castwave_curation_items_total",
            "Curation items handled per step and outcome",
            &["step", "outcome"]
        )?,
        trigger_runs: register_counter_vec!(
            "castwave_trigger_runs_total",
            "Scheduler trigger firings by outcome",
            &["trigger", "outcome"]
        )?,
    };
    let _ = PIPELINE_METRICS.set(pipeline);

    Ok(())
}

/// Check if metrics are initialized
pub fn metrics_initialized() -> bool {
    QUEUE_METRICS.get().is_some() && PIPELINE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Render all registered metrics in Prometheus text format
pub fn gather() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn record_job(family: &str, outcome: &str) {
    if let Some(m) = QUEUE_METRICS.get() {
        m.jobs.with_label_values(&[family, outcome]).inc();
    }
}

pub fn observe_job_duration(family: &str, elapsed: Duration) {
    if let Some(m) = QUEUE_METRICS.get() {
        m.job_duration
            .with_label_values(&[family])
            .observe(elapsed.as_secs_f64());
    }
}

pub fn record_gateway_call(provider: &str, operation: &str, outcome: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.gateway_calls
            .with_label_values(&[provider, operation, outcome])
            .inc();
    }
}

pub fn record_gateway_fallback(from: &str, to: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.gateway_fallbacks.with_label_values(&[from, to]).inc();
    }
}

/// Record one curation item (`step` is recurate, show or nudge)
pub fn record_curation_item(step: &str, outcome: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.curation_items.with_label_values(&[step, outcome]).inc();
    }
}

pub fn record_trigger_run(trigger: &str, outcome: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.trigger_runs.with_label_values(&[trigger, outcome]).inc();
    }
}

// ============================================================================
// Tests
// ============================================================================

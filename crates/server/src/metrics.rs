// crates/server/src/metrics.rs
//! Application metrics for Prometheus monitoring (§1.1 ambient stack).
//!
//! Mirrors the teacher's `metrics.rs`: a global Prometheus recorder
//! installed once at startup, a handful of describe_* calls so scrapes are
//! self-documenting, and small `record_*` helpers called from the scheduler
//! and orchestrator rather than threading a handle through every function.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static ACTIVE_UPLOADS: AtomicI64 = AtomicI64::new(0);

/// Installs the global Prometheus recorder. Call once at startup, before any
/// metric is recorded. Returns `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("failed to set global metrics recorder (already set)");
        return false;
    }
    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("failed to store Prometheus handle (already set)");
    }

    describe_metrics();
    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!("powerpulse_uploads_total", "Total number of uploads accepted");
    describe_gauge!("powerpulse_active_uploads", "Number of uploads currently being processed");
    describe_counter!("powerpulse_jobs_total", "Total number of scoring jobs run, by outcome");
    describe_histogram!("powerpulse_job_duration_seconds", "Duration of one scoring job's LLM call");
    describe_counter!("powerpulse_ai_calls_total", "Total LLM calls made, by provider");
    describe_counter!("powerpulse_ai_failures_total", "Total LLM calls that exhausted retries, by provider");
}

/// Renders the current metrics in Prometheus text format, or `None` if
/// metrics were never initialized (e.g. in a unit test that skips it).
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_upload_accepted() {
    counter!("powerpulse_uploads_total").increment(1);
}

/// Marks one upload as started, bumping the active-uploads gauge.
pub fn upload_started() {
    let count = ACTIVE_UPLOADS.fetch_add(1, Ordering::Relaxed) + 1;
    gauge!("powerpulse_active_uploads").set(count as f64);
}

/// Marks one upload as finished (terminal status reached), decrementing
/// the active-uploads gauge.
pub fn upload_finished() {
    let count = ACTIVE_UPLOADS.fetch_sub(1, Ordering::Relaxed) - 1;
    gauge!("powerpulse_active_uploads").set(count as f64);
}

pub fn record_job_completed(outcome: &str, duration: Duration) {
    counter!("powerpulse_jobs_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("powerpulse_job_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_ai_call(provider: &str) {
    counter!("powerpulse_ai_calls_total", "provider" => provider.to_string()).increment(1);
}

pub fn record_ai_failure(provider: &str) {
    counter!("powerpulse_ai_failures_total", "provider" => provider.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_render_reports_recorded_metrics() {
        init_metrics();
        record_upload_accepted();
        upload_started();
        record_job_completed("completed", Duration::from_millis(5));
        record_ai_call("gemini");
        upload_finished();

        let rendered = render_metrics().expect("metrics should be initialized by now");
        assert!(rendered.contains("powerpulse_uploads_total"));
        assert!(rendered.contains("powerpulse_active_uploads"));
    }
}

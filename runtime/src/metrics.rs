//! Prometheus metrics for effect runs and store dispatches.
//!
//! Recording is always on and costs nothing until a recorder is installed.
//!
//! # Example
//!
//! ```rust,no_run
//! use fxpipe_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//! // ... run effects ...
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

impl MetricsRecorder {
    /// Describe every metric and install the Prometheus recorder globally
    ///
    /// Installing twice in one process is tolerated; the second recorder has
    /// no handle and renders nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    pub fn install() -> Result<Self, MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                tracing::info!("Metrics recorder installed");
                Ok(Self { handle: Some(handle) })
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(Self { handle: None })
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Handle of the installed recorder, if this call installed it
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Current metrics in the Prometheus text format
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!("fxpipe_effects_started_total", "Total number of effect invocations started");
    describe_counter!(
        "fxpipe_effects_completed_total",
        "Total number of effect invocations whose chain finished"
    );
    describe_counter!(
        "fxpipe_effects_failed_total",
        "Total number of effect invocations whose chain returned an error"
    );
    describe_counter!(
        "fxpipe_effects_aborted_total",
        "Total number of effect invocations cancelled through their signal"
    );
    describe_histogram!(
        "fxpipe_effect_duration_seconds",
        "Time from effect start until the chain settled"
    );
    describe_counter!(
        "fxpipe_store_actions_total",
        "Total number of dispatches reduced by the host store"
    );
}

/// Effect metrics recorder.
pub struct EffectMetrics;

impl EffectMetrics {
    /// Record an effect start.
    pub fn record_started() {
        counter!("fxpipe_effects_started_total").increment(1);
    }

    /// Record a finished effect.
    pub fn record_completed(duration: Duration) {
        counter!("fxpipe_effects_completed_total").increment(1);
        histogram!("fxpipe_effect_duration_seconds", "outcome" => "completed").record(duration.as_secs_f64());
    }

    /// Record a failed effect.
    pub fn record_failed(duration: Duration) {
        counter!("fxpipe_effects_failed_total").increment(1);
        histogram!("fxpipe_effect_duration_seconds", "outcome" => "failed").record(duration.as_secs_f64());
    }

    /// Record a cancelled effect.
    pub fn record_aborted(duration: Duration) {
        counter!("fxpipe_effects_aborted_total").increment(1);
        histogram!("fxpipe_effect_duration_seconds", "outcome" => "aborted").record(duration.as_secs_f64());
    }
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record a reduced dispatch.
    pub fn record_action() {
        counter!("fxpipe_store_actions_total").increment(1);
    }
}

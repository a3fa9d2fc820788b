//! Metrics Collector

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tracing::error;

use crate::relay::ConnectionStats;

/// Collects and exports gateway metrics
pub struct Metrics {
    registry: Registry,
    sessions_total: IntCounter,
    active_sessions: IntGauge,
    rejected_requests_total: IntCounterVec,
    bytes_relayed_total: IntCounterVec,
    session_duration: Histogram,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let sessions_total = IntCounter::new(
            "wsrelay_sessions_total",
            "Total number of relay sessions started",
        )?;
        let active_sessions = IntGauge::new(
            "wsrelay_active_sessions",
            "Number of relay sessions currently running",
        )?;
        let rejected_requests_total = IntCounterVec::new(
            Opts::new(
                "wsrelay_rejected_requests_total",
                "Tunnel requests rejected before a session started",
            ),
            &["reason"],
        )?;
        let bytes_relayed_total = IntCounterVec::new(
            Opts::new("wsrelay_bytes_relayed_total", "Bytes delivered to either endpoint"),
            &["direction"],
        )?;
        let session_duration = Histogram::with_opts(
            HistogramOpts::new(
                "wsrelay_session_duration_seconds",
                "Duration of relay sessions in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 3600.0]),
        )?;

        registry.register(Box::new(sessions_total.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;
        registry.register(Box::new(rejected_requests_total.clone()))?;
        registry.register(Box::new(bytes_relayed_total.clone()))?;
        registry.register(Box::new(session_duration.clone()))?;

        Ok(Self {
            registry,
            sessions_total,
            active_sessions,
            rejected_requests_total,
            bytes_relayed_total,
            session_duration,
        })
    }

    pub fn session_started(&self) {
        self.sessions_total.inc();
        self.active_sessions.inc();
    }

    pub fn session_finished(&self, stats: &ConnectionStats) {
        self.active_sessions.dec();
        self.bytes_relayed_total
            .with_label_values(&["client_to_backend"])
            .inc_by(stats.bytes_up);
        self.bytes_relayed_total
            .with_label_values(&["backend_to_client"])
            .inc_by(stats.bytes_down);
        self.session_duration
            .observe(stats.duration_ms as f64 / 1000.0);
    }

    pub fn request_rejected(&self, reason: &str) {
        self.rejected_requests_total.with_label_values(&[reason]).inc();
    }

    pub fn active_sessions(&self) -> i64 {
        self.active_sessions.get()
    }

    pub fn sessions_total(&self) -> u64 {
        self.sessions_total.get()
    }

    pub fn rejected_requests(&self, reason: &str) -> u64 {
        self.rejected_requests_total.with_label_values(&[reason]).get()
    }

    /// Render all metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }
}

//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `registrations_total` - Registrations created
//! - `registrations_duplicate_total` - Registrations rejected as duplicates
//! - `verifications_total` - Credentials verified
//! - `verifications_rejected_total` - Verifications rejected, by reason
//! - `credential_render_duration_seconds` - Histogram of QR render latencies

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
///
/// Each collector owns its registry, so several ledgers (tests) can coexist
/// in one process.
#[derive(Clone)]
pub struct Metrics {
    /// Registrations created
    pub registrations_total: IntCounter,

    /// Duplicate registrations rejected
    pub duplicates_total: IntCounter,

    /// Credentials verified
    pub verifications_total: IntCounter,

    /// Verifications rejected (label `reason`: `not_found` | `already_verified`)
    pub verifications_rejected: IntCounterVec,

    /// Render duration histogram
    pub render_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("registrations_total", &self.registrations_total.get())
            .field("verifications_total", &self.verifications_total.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let registrations_total =
            IntCounter::new("registrations_total", "Registrations created")?;
        registry.register(Box::new(registrations_total.clone()))?;

        let duplicates_total = IntCounter::new(
            "registrations_duplicate_total",
            "Registrations rejected as duplicates",
        )?;
        registry.register(Box::new(duplicates_total.clone()))?;

        let verifications_total =
            IntCounter::new("verifications_total", "Credentials verified")?;
        registry.register(Box::new(verifications_total.clone()))?;

        let verifications_rejected = IntCounterVec::new(
            Opts::new(
                "verifications_rejected_total",
                "Verifications rejected, by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(verifications_rejected.clone()))?;

        let render_duration = Histogram::with_opts(
            HistogramOpts::new(
                "credential_render_duration_seconds",
                "Histogram of QR render latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.010, 0.025, 0.050, 0.100]),
        )?;
        registry.register(Box::new(render_duration.clone()))?;

        Ok(Self {
            registrations_total,
            duplicates_total,
            verifications_total,
            verifications_rejected,
            render_duration,
            registry,
        })
    }

    /// Record registration created
    pub fn record_registration(&self) {
        self.registrations_total.inc();
    }

    /// Record duplicate rejection
    pub fn record_duplicate(&self) {
        self.duplicates_total.inc();
    }

    /// Record successful verification
    pub fn record_verification(&self) {
        self.verifications_total.inc();
    }

    /// Record rejected verification
    pub fn record_verification_rejected(&self, reason: &str) {
        self.verifications_rejected.with_label_values(&[reason]).inc();
    }

    /// Record render duration
    pub fn record_render_duration(&self, duration_seconds: f64) {
        self.render_duration.observe(duration_seconds);
    }

    /// Text exposition format
    pub fn export(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

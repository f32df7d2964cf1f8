//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes a minimal set of counters/gauges relevant to the engine.

use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across the engine.
#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    polls_total: IntCounter,
    files_admitted_total: IntCounter,
    exchanges_total: IntCounterVec,
    read_lock_timeouts_total: IntCounter,
    files_stored_total: IntCounter,
    store_failures_total: IntCounter,
    in_progress_size: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Total polls executed.
    pub polls_total: u64,
    /// Total files admitted into the in-progress set.
    pub files_admitted_total: u64,
    /// Total read-lock acquisition timeouts observed.
    pub read_lock_timeouts_total: u64,
    /// Total files stored by producers.
    pub files_stored_total: u64,
    /// Total store failures observed.
    pub store_failures_total: u64,
    /// Files currently tracked as in progress.
    pub in_progress_size: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let polls_total =
            IntCounter::with_opts(Opts::new("sluice_polls_total", "Polls executed"))?;
        let files_admitted_total = IntCounter::with_opts(Opts::new(
            "sluice_files_admitted_total",
            "Files admitted into the in-progress set",
        ))?;
        let exchanges_total = IntCounterVec::new(
            Opts::new("sluice_exchanges_total", "Dispatched exchanges by outcome"),
            &["outcome"],
        )?;
        let read_lock_timeouts_total = IntCounter::with_opts(Opts::new(
            "sluice_read_lock_timeouts_total",
            "Read-lock acquisitions abandoned after the configured timeout",
        ))?;
        let files_stored_total = IntCounter::with_opts(Opts::new(
            "sluice_files_stored_total",
            "Files stored by producers",
        ))?;
        let store_failures_total = IntCounter::with_opts(Opts::new(
            "sluice_store_failures_total",
            "Producer store failures",
        ))?;
        let in_progress_size = IntGauge::with_opts(Opts::new(
            "sluice_in_progress_size",
            "Files currently tracked as in progress",
        ))?;

        registry.register(Box::new(polls_total.clone()))?;
        registry.register(Box::new(files_admitted_total.clone()))?;
        registry.register(Box::new(exchanges_total.clone()))?;
        registry.register(Box::new(read_lock_timeouts_total.clone()))?;
        registry.register(Box::new(files_stored_total.clone()))?;
        registry.register(Box::new(store_failures_total.clone()))?;
        registry.register(Box::new(in_progress_size.clone()))?;

        Ok(Self {
            inner: std::sync::Arc::new(MetricsInner {
                registry,
                polls_total,
                files_admitted_total,
                exchanges_total,
                read_lock_timeouts_total,
                files_stored_total,
                store_failures_total,
                in_progress_size,
            }),
        })
    }

    /// Record one executed poll.
    pub fn record_poll(&self) {
        self.inner.polls_total.inc();
    }

    /// Record one admitted file.
    pub fn record_admission(&self) {
        self.inner.files_admitted_total.inc();
    }

    /// Record one dispatched exchange with its outcome label
    /// (`completed`, `failed`, or `aborted`).
    pub fn record_exchange(&self, outcome: &str) {
        self.inner
            .exchanges_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record one read-lock acquisition timeout.
    pub fn record_lock_timeout(&self) {
        self.inner.read_lock_timeouts_total.inc();
    }

    /// Record one stored file.
    pub fn record_store(&self) {
        self.inner.files_stored_total.inc();
    }

    /// Record one store failure.
    pub fn record_store_failure(&self) {
        self.inner.store_failures_total.inc();
    }

    /// Update the in-progress gauge.
    #[allow(clippy::cast_possible_wrap)]
    pub fn set_in_progress(&self, size: usize) {
        self.inner.in_progress_size.set(size as i64);
    }

    /// Capture a snapshot of the headline series.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            polls_total: self.inner.polls_total.get(),
            files_admitted_total: self.inner.files_admitted_total.get(),
            read_lock_timeouts_total: self.inner.read_lock_timeouts_total.get(),
            files_stored_total: self.inner.files_stored_total.get(),
            store_failures_total: self.inner.store_failures_total.get(),
            in_progress_size: self.inner.in_progress_size.get(),
        }
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding the metric families fails.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.inner.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

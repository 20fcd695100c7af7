//! Discovery metrics
//!
//! Label values are drawn from closed sets (fetcher kinds, reconcile actions,
//! install results), which keeps cardinality bounded.

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;
use thiserror::Error;

use crate::FETCH_LATENCY_BUCKETS;

/// Metrics recorded by one discovery engine.
#[derive(Debug, Clone)]
pub struct DiscoveryMetrics {
    registry: Registry,
    fetch_total: CounterVec,                 // kind, result
    fetch_duration_seconds: HistogramVec,    // kind
    reconcile_total: CounterVec,             // kind, action
    install_total: CounterVec,               // result
    cycles_total: IntCounter,
    dynamic_fetchers: Gauge,
}

impl DiscoveryMetrics {
    /// Creates metrics registered into a fresh registry.
    pub fn new(namespace: &str) -> Result<Self, MetricsError> {
        Self::with_registry(namespace, Registry::new())
    }

    /// Creates metrics registered into `registry`.
    pub fn with_registry(namespace: &str, registry: Registry) -> Result<Self, MetricsError> {
        let fetch_total = CounterVec::new(
            Opts::new(
                format!("{namespace}_fetch_total"),
                "Fetcher runs by fetcher kind and result",
            ),
            &["kind", "result"],
        )?;
        let fetch_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                format!("{namespace}_fetch_duration_seconds"),
                "Fetcher run duration in seconds by fetcher kind",
            )
            .buckets(FETCH_LATENCY_BUCKETS.to_vec()),
            &["kind"],
        )?;
        let reconcile_total = CounterVec::new(
            Opts::new(
                format!("{namespace}_reconcile_total"),
                "Reconciled resources by resource kind and action",
            ),
            &["kind", "action"],
        )?;
        let install_total = CounterVec::new(
            Opts::new(
                format!("{namespace}_install_total"),
                "Agent install attempts by result",
            ),
            &["result"],
        )?;
        let cycles_total = IntCounter::new(
            format!("{namespace}_cycles_total"),
            "Completed discovery cycles",
        )?;
        let dynamic_fetchers = Gauge::new(
            format!("{namespace}_dynamic_fetchers"),
            "Fetchers currently loaded from DiscoveryConfigs",
        )?;

        registry.register(Box::new(fetch_total.clone()))?;
        registry.register(Box::new(fetch_duration_seconds.clone()))?;
        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(install_total.clone()))?;
        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(dynamic_fetchers.clone()))?;

        Ok(Self {
            registry,
            fetch_total,
            fetch_duration_seconds,
            reconcile_total,
            install_total,
            cycles_total,
            dynamic_fetchers,
        })
    }

    pub fn record_fetch(&self, kind: &str, ok: bool, elapsed: Duration) {
        let result = if ok { "success" } else { "error" };
        self.fetch_total.with_label_values(&[kind, result]).inc();
        self.fetch_duration_seconds
            .with_label_values(&[kind])
            .observe(elapsed.as_secs_f64());
    }

    /// `action` is one of `create`, `update`, `unchanged`, `delete`, `error`.
    pub fn record_reconcile(&self, kind: &str, action: &str, count: u64) {
        if count > 0 {
            self.reconcile_total
                .with_label_values(&[kind, action])
                .inc_by(count as f64);
        }
    }

    pub fn record_install(&self, ok: bool) {
        let result = if ok { "success" } else { "failure" };
        self.install_total.with_label_values(&[result]).inc();
    }

    pub fn record_cycle(&self) {
        self.cycles_total.inc();
    }

    pub fn set_dynamic_fetchers(&self, count: usize) {
        self.dynamic_fetchers.set(count as f64);
    }

    pub fn cycles(&self) -> u64 {
        self.cycles_total.get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders every metric in the Prometheus text format.
    pub fn gather_text(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

/// Metrics errors
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_sample(text: &str, name: &str, labels: &[&str], value: &str) -> bool {
        text.lines().any(|line| {
            line.starts_with(name)
                && !line.starts_with(&format!("{name}_"))
                && labels.iter().all(|l| line.contains(l))
                && line.ends_with(&format!(" {value}"))
        })
    }

    #[test]
    fn test_records_are_rendered() {
        let metrics = DiscoveryMetrics::new("skyscout").unwrap();
        metrics.record_fetch("aws/ec2", true, Duration::from_millis(120));
        metrics.record_fetch("aws/ec2", false, Duration::from_millis(5));
        metrics.record_reconcile("node", "create", 3);
        metrics.record_reconcile("node", "delete", 0);
        metrics.record_install(false);
        metrics.record_cycle();
        metrics.set_dynamic_fetchers(2);

        let text = metrics.gather_text().unwrap();
        assert!(has_sample(
            &text,
            "skyscout_fetch_total",
            &[r#"kind="aws/ec2""#, r#"result="error""#],
            "1"
        ));
        assert!(has_sample(
            &text,
            "skyscout_reconcile_total",
            &[r#"action="create""#, r#"kind="node""#],
            "3"
        ));
        assert!(!text.contains(r#"action="delete""#));
        assert!(has_sample(&text, "skyscout_install_total", &[r#"result="failure""#], "1"));
        assert!(has_sample(&text, "skyscout_dynamic_fetchers", &[], "2"));
        assert_eq!(metrics.cycles(), 1);
    }

    #[test]
    fn test_separate_instances_do_not_collide() {
        let a = DiscoveryMetrics::new("skyscout").unwrap();
        let b = DiscoveryMetrics::new("skyscout").unwrap();
        a.record_cycle();
        assert_eq!(a.cycles(), 1);
        assert_eq!(b.cycles(), 0);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        DiscoveryMetrics::with_registry("skyscout", registry.clone()).unwrap();
        assert!(matches!(
            DiscoveryMetrics::with_registry("skyscout", registry),
            Err(MetricsError::Prometheus(_))
        ));
    }
}

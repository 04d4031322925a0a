//! Metrics collection and export for connection pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Point-in-time metrics for a pool
///
/// # Examples
///
/// ```
/// use conn_pool::{ConnectionPool, FnFactory, PoolConfig};
///
/// let config = PoolConfig::new(FnFactory::new(|| Ok(0u32)))
///     .with_max_idle_count(2)
///     .with_max_open(4);
/// let pool = ConnectionPool::new(config).unwrap();
///
/// let _conn = pool.acquire().unwrap();
/// let metrics = pool.metrics();
/// assert_eq!(metrics.total_created, 2);
/// assert_eq!(metrics.total_acquired, 1);
/// assert_eq!(metrics.in_use_connections, 1);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PoolMetrics {
    /// Connections created and not yet disposed
    pub live_connections: usize,

    /// Connections waiting in the idle store
    pub idle_connections: usize,

    /// Connections currently checked out
    pub in_use_connections: usize,

    pub max_open: usize,
    pub max_idle_count: usize,

    /// Live connections relative to `max_open` (0.0 to 1.0)
    pub utilization: f64,

    pub total_created: usize,
    pub total_disposed: usize,
    pub total_acquired: usize,
    pub total_released: usize,

    /// Connections that failed validation
    pub validation_failures: usize,

    /// Dispose calls that returned an error
    pub dispose_failures: usize,

    /// Acquire calls rejected because the pool was at `max_open`
    pub over_limit_events: usize,

    /// Idle connections dropped for exceeding their lifetime or idle time
    pub evicted: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("live_connections".to_string(), self.live_connections.to_string());
        metrics.insert("idle_connections".to_string(), self.idle_connections.to_string());
        metrics.insert("in_use_connections".to_string(), self.in_use_connections.to_string());
        metrics.insert("max_open".to_string(), self.max_open.to_string());
        metrics.insert("max_idle_count".to_string(), self.max_idle_count.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_disposed".to_string(), self.total_disposed.to_string());
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("validation_failures".to_string(), self.validation_failures.to_string());
        metrics.insert("dispose_failures".to_string(), self.dispose_failures.to_string());
        metrics.insert("over_limit_events".to_string(), self.over_limit_events.to_string());
        metrics.insert("evicted".to_string(), self.evicted.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "prometheus")]
pub struct MetricsExporter;

#[cfg(feature = "prometheus")]
impl MetricsExporter {
    /// Render `metrics` in the Prometheus text exposition format.
    ///
    /// Every series carries a `pool` label plus any extra `tags`.
    ///
    /// # Examples
    ///
    /// ```
    /// use conn_pool::{ConnectionPool, FnFactory, PoolConfig};
    /// use std::collections::HashMap;
    ///
    /// let pool = ConnectionPool::new(PoolConfig::new(FnFactory::new(|| Ok(0u32)))).unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("orders_db", Some(&tags)).unwrap();
    /// assert!(output.contains("connpool_connections_live"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }
        let registry = Registry::new_custom(None, Some(labels))?;

        let gauges = [
            ("connpool_connections_live", "Connections created and not yet disposed", metrics.live_connections),
            ("connpool_connections_idle", "Connections waiting in the idle store", metrics.idle_connections),
            ("connpool_connections_in_use", "Connections currently checked out", metrics.in_use_connections),
            ("connpool_connections_max_open", "Configured ceiling on live connections", metrics.max_open),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(Opts::new(name, help))?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge))?;
        }

        let utilization = Gauge::with_opts(Opts::new("connpool_utilization", "Live connections relative to max_open"))?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization))?;

        let counters = [
            ("connpool_created_total", "Connections created by the factory", metrics.total_created),
            ("connpool_disposed_total", "Connections disposed by the pool", metrics.total_disposed),
            ("connpool_acquired_total", "Successful acquire calls", metrics.total_acquired),
            ("connpool_released_total", "Connections returned to the idle store", metrics.total_released),
            ("connpool_validation_failures_total", "Connections that failed validation", metrics.validation_failures),
            ("connpool_dispose_failures_total", "Dispose calls that returned an error", metrics.dispose_failures),
            ("connpool_over_limit_total", "Acquire calls rejected at max_open", metrics.over_limit_events),
            ("connpool_evicted_total", "Idle connections evicted for age or idle time", metrics.evicted),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(Opts::new(name, help))?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Internal metrics tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub created: AtomicUsize,
    pub disposed: AtomicUsize,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub validation_failures: AtomicUsize,
    pub dispose_failures: AtomicUsize,
    pub over_limit_events: AtomicUsize,
    pub evicted: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        live: usize,
        idle: usize,
        in_use: usize,
        max_open: usize,
        max_idle_count: usize,
    ) -> PoolMetrics {
        let utilization = if max_open > 0 {
            live as f64 / max_open as f64
        } else {
            0.0
        };

        PoolMetrics {
            live_connections: live,
            idle_connections: idle,
            in_use_connections: in_use,
            max_open,
            max_idle_count,
            utilization,
            total_created: self.created.load(Ordering::Relaxed),
            total_disposed: self.disposed.load(Ordering::Relaxed),
            total_acquired: self.acquired.load(Ordering::Relaxed),
            total_released: self.released.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            dispose_failures: self.dispose_failures.load(Ordering::Relaxed),
            over_limit_events: self.over_limit_events.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

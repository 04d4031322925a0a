//! Health reporting for connection pools

/// Health status of a connection pool
///
/// # Examples
///
/// ```
/// use conn_pool::{ConnectionPool, FnFactory, PoolConfig};
///
/// let config = PoolConfig::new(FnFactory::new(|| Ok(0u32)))
///     .with_max_idle_count(2)
///     .with_max_open(8);
/// let pool = ConnectionPool::new(config).unwrap();
///
/// let health = pool.health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_connections, 2);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Live connections relative to `max_open` (0.0 to 1.0)
    pub utilization: f64,

    pub live_connections: usize,
    pub idle_connections: usize,
    pub in_use_connections: usize,
    pub max_open: usize,

    /// Checked-out connections held longer than the configured lifetime
    pub long_held_connections: usize,

    pub closed: bool,

    /// Warning messages
    pub warnings: Vec<String>,
}

/// Inputs to a health evaluation
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HealthSample {
    pub live: usize,
    pub idle: usize,
    pub in_use: usize,
    pub max_open: usize,
    pub long_held: usize,
    pub closed: bool,
}

impl HealthStatus {
    pub(crate) fn evaluate(sample: HealthSample) -> Self {
        let utilization = if sample.max_open > 0 {
            sample.live as f64 / sample.max_open as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if sample.closed {
            warnings.push("Pool is closed".to_string());
            is_healthy = false;
        }

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if !sample.closed && sample.idle == 0 {
            warnings.push("No idle connections".to_string());
        }

        if sample.long_held > 0 {
            warnings.push(format!(
                "{} connection(s) checked out longer than max_lifetime",
                sample.long_held
            ));
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            live_connections: sample.live,
            idle_connections: sample.idle,
            in_use_connections: sample.in_use,
            max_open: sample.max_open,
            long_held_connections: sample.long_held,
            closed: sample.closed,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

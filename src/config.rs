//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use crate::factory::ConnectionFactory;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a connection pool
///
/// # Examples
///
/// ```
/// use conn_pool::{FnFactory, PoolConfig};
/// use std::time::Duration;
///
/// let config = PoolConfig::new(FnFactory::new(|| Ok(0u32)))
///     .with_max_idle_count(4)
///     .with_max_open(16)
///     .with_max_lifetime(Duration::from_secs(1800))
///     .with_max_idle_time(Duration::from_secs(300));
///
/// assert_eq!(config.max_idle_count, 4);
/// assert_eq!(config.max_open, 16);
/// assert!(config.validate().is_ok());
/// ```
pub struct PoolConfig<C> {
    /// Number of connections kept idle, and created up front
    pub max_idle_count: usize,

    /// Maximum number of live connections, idle and checked out together
    pub max_open: usize,

    /// Maximum age of a connection before it is evicted from the idle store
    pub max_lifetime: Duration,

    /// Maximum time a connection may sit idle before it is evicted
    pub max_idle_time: Duration,

    /// Source of new connections
    pub factory: Option<Arc<dyn ConnectionFactory<C>>>,
}

impl<C> Default for PoolConfig<C> {
    fn default() -> Self {
        Self {
            max_idle_count: 4,
            max_open: 16,
            max_lifetime: Duration::from_secs(30 * 60),
            max_idle_time: Duration::from_secs(10 * 60),
            factory: None,
        }
    }
}

impl<C> Clone for PoolConfig<C> {
    fn clone(&self) -> Self {
        Self {
            max_idle_count: self.max_idle_count,
            max_open: self.max_open,
            max_lifetime: self.max_lifetime,
            max_idle_time: self.max_idle_time,
            factory: self.factory.clone(),
        }
    }
}

impl<C> fmt::Debug for PoolConfig<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("max_idle_count", &self.max_idle_count)
            .field("max_open", &self.max_open)
            .field("max_lifetime", &self.max_lifetime)
            .field("max_idle_time", &self.max_idle_time)
            .field("factory", &self.factory.as_ref().map(|_| "<factory>"))
            .finish()
    }
}

impl<C> PoolConfig<C> {
    /// Create a configuration with default limits around `factory`
    pub fn new<F>(factory: F) -> Self
    where
        F: ConnectionFactory<C> + 'static,
    {
        Self::default().with_factory(factory)
    }

    pub fn with_factory<F>(self, factory: F) -> Self
    where
        F: ConnectionFactory<C> + 'static,
    {
        self.with_shared_factory(Arc::new(factory))
    }

    /// Use a factory that is already behind an `Arc`
    pub fn with_shared_factory(mut self, factory: Arc<dyn ConnectionFactory<C>>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_max_idle_count(mut self, count: usize) -> Self {
        self.max_idle_count = count;
        self
    }

    pub fn with_max_open(mut self, count: usize) -> Self {
        self.max_open = count;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    pub fn with_max_idle_time(mut self, idle_time: Duration) -> Self {
        self.max_idle_time = idle_time;
        self
    }

    /// Check the limits against each other.
    ///
    /// A `max_open` of zero is rejected like any other value below
    /// `max_idle_count`; there is no unlimited mode.
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_idle_count == 0 {
            return Err(PoolError::Config("max_idle_count must be positive".into()));
        }
        if self.max_idle_count > self.max_open {
            return Err(PoolError::Config(format!(
                "max_idle_count ({}) exceeds max_open ({})",
                self.max_idle_count, self.max_open
            )));
        }
        if self.max_lifetime.is_zero() {
            return Err(PoolError::Config("max_lifetime must be positive".into()));
        }
        if self.max_idle_time.is_zero() {
            return Err(PoolError::Config("max_idle_time must be positive".into()));
        }
        if self.factory.is_none() {
            return Err(PoolError::Config("no connection factory supplied".into()));
        }
        Ok(())
    }
}

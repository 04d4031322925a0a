//! # conn_pool
//!
//! Bounded, thread-safe pool of reusable connections obtained from a
//! pluggable [`ConnectionFactory`].
//!
//! ## Features
//!
//! - Non-blocking acquire: served from the idle store, by creating a new
//!   connection, or refused immediately with [`PoolError::OverLimit`]
//! - Separate limits on idle (`max_idle_count`) and live (`max_open`) connections
//! - Pool pre-warming with `max_idle_count` connections
//! - Validation of every connection before it is handed out
//! - Lifetime and idle-time eviction, lazily on acquire or via a reaper task
//! - Automatic return of connections via RAII (Drop trait)
//! - Metrics, Prometheus export and health status
//!
//! ## Quick Start
//!
//! ```rust
//! use conn_pool::{ConnectionPool, FnFactory, PoolConfig};
//!
//! let factory = FnFactory::new(|| Ok(vec![0u8; 16]));
//! let pool = ConnectionPool::new(PoolConfig::new(factory)).unwrap();
//! {
//!     let conn = pool.acquire().unwrap();
//!     println!("Got a buffer of {} bytes", conn.len());
//!     // Connection automatically returned when `conn` goes out of scope
//! }
//! ```

mod pool;
mod config;
mod factory;
mod metrics;
mod health;
mod eviction;
mod errors;

pub use pool::{ConnectionPool, Pooled};
pub use config::PoolConfig;
pub use factory::{ConnectionFactory, FnFactory};
pub use metrics::PoolMetrics;
#[cfg(feature = "prometheus")]
pub use metrics::MetricsExporter;
pub use health::HealthStatus;
pub use eviction::EvictionPolicy;
pub use errors::{BoxError, PoolError, PoolResult};

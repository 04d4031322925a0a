//! Core connection pool implementation

use crate::config::PoolConfig;
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{ConnectionMetadata, EvictionPolicy, IdleEntry};
use crate::factory::ConnectionFactory;
use crate::health::{HealthSample, HealthStatus};
#[cfg(feature = "prometheus")]
use crate::metrics::MetricsExporter;
use crate::metrics::{MetricsTracker, PoolMetrics};

use crossbeam::queue::ArrayQueue;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

/// A checked-out connection.
///
/// Dropping it returns the connection to its pool, exactly as
/// [`ConnectionPool::release`] would, but without reporting the outcome.
pub struct Pooled<C: Send + 'static> {
    conn: Option<C>,
    meta: ConnectionMetadata,
    pool: ConnectionPool<C>,
}

impl<C: Send + 'static> Pooled<C> {
    /// Pool-local identifier of this connection
    pub fn id(&self) -> u64 {
        self.meta.id
    }

    /// Time since the factory created this connection
    pub fn age(&self) -> Duration {
        self.meta.created_at.elapsed()
    }

    /// Take the connection out of the pool for good.
    ///
    /// The pool stops counting it toward [`ConnectionPool::len`] and will never
    /// dispose it; that becomes the caller's job.
    pub fn detach(mut self) -> C {
        let conn = self.conn.take().expect("connection already taken");
        self.pool.inner.checked_out.remove(&self.meta.id);
        self.pool.inner.release_slot();
        debug!(id = self.meta.id, "Detached connection from pool");
        conn
    }
}

impl<C: Send + 'static> Deref for Pooled<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection already taken")
    }
}

impl<C: Send + 'static> DerefMut for Pooled<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection already taken")
    }
}

impl<C: Send + fmt::Debug + 'static> fmt::Debug for Pooled<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("id", &self.meta.id)
            .field("conn", &self.conn)
            .finish()
    }
}

impl<C: Send + 'static> Drop for Pooled<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take()
            && let Err(e) = self.pool.inner.return_connection(conn, self.meta)
        {
            trace!(id = self.meta.id, error = %e, "Connection dropped after pool shutdown");
        }
    }
}

/// Counter state guarded by the pool lock
struct PoolState {
    live: usize,
    closed: bool,
}

struct PoolInner<C> {
    idle: ArrayQueue<IdleEntry<C>>,
    state: Mutex<PoolState>,
    checked_out: DashMap<u64, Instant>,
    factory: Arc<dyn ConnectionFactory<C>>,
    policy: EvictionPolicy,
    max_open: usize,
    max_idle_count: usize,
    metrics: MetricsTracker,
    next_id: AtomicU64,
}

impl<C> PoolInner<C> {
    fn next_metadata(&self) -> ConnectionMetadata {
        ConnectionMetadata::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Give back one unit of `live`. After close the counter was already reset.
    fn release_slot(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.live = state.live.saturating_sub(1);
        }
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn dispose(&self, conn: C, id: u64) {
        MetricsTracker::incr(&self.metrics.disposed);
        if let Err(e) = self.factory.dispose(conn) {
            MetricsTracker::incr(&self.metrics.dispose_failures);
            warn!(id, error = %e, "Failed to dispose connection");
        } else {
            debug!(id, "Disposed connection");
        }
    }

    /// Dispose a connection that still counts toward `live`
    fn discard(&self, conn: C, id: u64) {
        self.release_slot();
        self.dispose(conn, id);
    }

    fn return_connection(&self, conn: C, mut meta: ConnectionMetadata) -> PoolResult<()> {
        self.checked_out.remove(&meta.id);

        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            debug!(id = meta.id, "Pool is closed, disposing returned connection");
            self.dispose(conn, meta.id);
            return Err(PoolError::Closed);
        }

        meta.touch();
        match self.idle.push(IdleEntry { conn, meta }) {
            Ok(()) => {
                drop(state);
                MetricsTracker::incr(&self.metrics.released);
                trace!(id = meta.id, idle = self.idle.len(), "Returned connection to pool");
                Ok(())
            }
            Err(entry) => {
                // The idle store holds max_idle_count entries.
                state.live = state.live.saturating_sub(1);
                drop(state);
                debug!(
                    id = meta.id,
                    max_idle_count = self.max_idle_count,
                    "Idle store full, disposing returned connection"
                );
                self.dispose(entry.conn, entry.meta.id);
                Ok(())
            }
        }
    }
}

/// Thread-safe pool of connections produced by a [`ConnectionFactory`].
///
/// Cloning is cheap and every clone refers to the same pool.
///
/// # Examples
///
/// ```
/// use conn_pool::{ConnectionPool, FnFactory, PoolConfig, PoolError};
///
/// let config = PoolConfig::new(FnFactory::new(|| Ok(String::from("conn"))))
///     .with_max_idle_count(2)
///     .with_max_open(3);
/// let pool = ConnectionPool::new(config).unwrap();
/// assert_eq!(pool.len(), 2);
///
/// let a = pool.acquire().unwrap();
/// let b = pool.acquire().unwrap();
/// let c = pool.acquire().unwrap();
/// assert_eq!(pool.len(), 3);
/// assert!(matches!(pool.acquire(), Err(PoolError::OverLimit { .. })));
///
/// pool.release(a).unwrap();
/// assert_eq!(pool.idle_count(), 1);
/// # drop((b, c));
/// ```
pub struct ConnectionPool<C> {
    inner: Arc<PoolInner<C>>,
}

impl<C> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectionPool")
            .field("live", &state.live)
            .field("idle", &self.inner.idle.len())
            .field("max_idle_count", &self.inner.max_idle_count)
            .field("max_open", &self.inner.max_open)
            .field("closed", &state.closed)
            .finish()
    }
}

impl<C: Send + 'static> ConnectionPool<C> {
    /// Validate `config` and fill the idle store with `max_idle_count`
    /// freshly created connections.
    ///
    /// # Errors
    ///
    /// [`PoolError::Config`] before any factory call if the configuration is
    /// invalid; [`PoolError::Initialization`] if the factory fails while
    /// filling the pool, after everything created so far has been disposed.
    pub fn new(config: PoolConfig<C>) -> PoolResult<Self> {
        config.validate()?;
        let factory = config
            .factory
            .ok_or_else(|| PoolError::Config("no connection factory supplied".into()))?;

        let inner = PoolInner {
            idle: ArrayQueue::new(config.max_idle_count),
            state: Mutex::new(PoolState {
                live: 0,
                closed: false,
            }),
            checked_out: DashMap::new(),
            factory,
            policy: EvictionPolicy::new(config.max_lifetime, config.max_idle_time),
            max_open: config.max_open,
            max_idle_count: config.max_idle_count,
            metrics: MetricsTracker::new(),
            next_id: AtomicU64::new(0),
        };

        for _ in 0..inner.max_idle_count {
            match inner.factory.create() {
                Ok(conn) => {
                    MetricsTracker::incr(&inner.metrics.created);
                    let meta = inner.next_metadata();
                    if let Err(entry) = inner.idle.push(IdleEntry { conn, meta }) {
                        inner.dispose(entry.conn, entry.meta.id);
                        continue;
                    }
                    inner.state.lock().live += 1;
                }
                Err(e) => {
                    warn!(
                        created = inner.idle.len(),
                        error = %e,
                        "Factory failed while filling the pool"
                    );
                    while let Some(entry) = inner.idle.pop() {
                        inner.dispose(entry.conn, entry.meta.id);
                    }
                    return Err(PoolError::Initialization(e));
                }
            }
        }

        debug!(
            max_idle_count = inner.max_idle_count,
            max_open = inner.max_open,
            "Connection pool initialized"
        );

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Get a validated connection without ever waiting for another caller.
    ///
    /// Idle connections are tried first; expired or invalid ones are disposed
    /// and skipped. With the idle store empty, a new connection is created if
    /// fewer than `max_open` are live.
    ///
    /// # Errors
    ///
    /// [`PoolError::Closed`], [`PoolError::OverLimit`], or the factory's own
    /// failure as [`PoolError::Factory`] / [`PoolError::Validation`] when a new
    /// connection could not be made.
    pub fn acquire(&self) -> PoolResult<Pooled<C>> {
        let inner = &self.inner;
        loop {
            let entry = {
                let mut state = inner.state.lock();
                if state.closed {
                    return Err(PoolError::Closed);
                }
                match inner.idle.pop() {
                    Some(entry) => entry,
                    None => {
                        if state.live >= inner.max_open {
                            MetricsTracker::incr(&inner.metrics.over_limit_events);
                            debug!(live = state.live, max_open = inner.max_open, "Pool over limit");
                            return Err(PoolError::OverLimit {
                                live: state.live,
                                max_open: inner.max_open,
                            });
                        }
                        // Reserve the slot before calling out to the factory.
                        state.live += 1;
                        drop(state);
                        return self.create_connection();
                    }
                }
            };

            let IdleEntry { conn, meta } = entry;
            if inner.policy.is_expired(&meta) {
                MetricsTracker::incr(&inner.metrics.evicted);
                trace!(id = meta.id, "Evicting expired idle connection");
                inner.discard(conn, meta.id);
                continue;
            }
            if inner.is_closed() {
                inner.dispose(conn, meta.id);
                return Err(PoolError::Closed);
            }
            if let Err(e) = inner.factory.validate(&conn) {
                MetricsTracker::incr(&inner.metrics.validation_failures);
                debug!(id = meta.id, error = %e, "Idle connection failed validation");
                inner.discard(conn, meta.id);
                continue;
            }

            return self.check_out(conn, meta);
        }
    }

    /// [`acquire`](Self::acquire) on tokio's blocking thread pool, for callers
    /// whose factory may block.
    pub async fn acquire_async(&self) -> PoolResult<Pooled<C>> {
        let pool = self.clone();
        match tokio::task::spawn_blocking(move || pool.acquire()).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(PoolError::Cancelled),
        }
    }

    /// Hand a connection back.
    ///
    /// The connection goes back to the idle store, or is disposed when the
    /// idle store already holds `max_idle_count` connections.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] for a connection from another pool (it
    /// goes back to its own pool instead). [`PoolError::Closed`] once the pool
    /// is closed, in which case the connection has been disposed.
    pub fn release(&self, mut conn: Pooled<C>) -> PoolResult<()> {
        if !Arc::ptr_eq(&self.inner, &conn.pool.inner) {
            return Err(PoolError::InvalidArgument(format!(
                "connection {} does not belong to this pool",
                conn.meta.id
            )));
        }
        let Some(value) = conn.conn.take() else {
            return Err(PoolError::InvalidArgument(
                "connection has already been taken".into(),
            ));
        };
        self.inner.return_connection(value, conn.meta)
    }

    /// Dispose every idle connection and refuse further use.
    ///
    /// Checked-out connections stay with their holders and are disposed when
    /// they come back. Calling this again has no effect.
    pub fn close(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.live = 0;
        let mut drained = Vec::with_capacity(inner.idle.len());
        while let Some(entry) = inner.idle.pop() {
            drained.push(entry);
        }
        // Dispose hooks may call back into the pool.
        drop(state);

        let count = drained.len();
        for entry in drained {
            inner.dispose(entry.conn, entry.meta.id);
        }
        debug!(
            drained = count,
            outstanding = inner.checked_out.len(),
            "Connection pool closed"
        );
    }

    /// Number of live connections, idle and checked out.
    ///
    /// May overstate what is actually usable, since idle connections are only
    /// validated when acquired.
    pub fn len(&self) -> usize {
        self.inner.state.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.inner.checked_out.len()
    }

    pub fn max_open(&self) -> usize {
        self.inner.max_open
    }

    pub fn max_idle_count(&self) -> usize {
        self.inner.max_idle_count
    }

    /// Lifetime and idle-time limits applied to idle connections
    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.inner.policy
    }

    /// Dispose every idle connection past its lifetime or idle time.
    ///
    /// Returns the number of connections evicted.
    pub fn reap(&self) -> usize {
        let inner = &self.inner;
        let mut expired = Vec::new();
        {
            let mut state = inner.state.lock();
            if state.closed {
                return 0;
            }

            let now = Instant::now();
            let mut fresh = Vec::with_capacity(inner.idle.len());
            while let Some(entry) = inner.idle.pop() {
                if inner.policy.is_expired_at(&entry.meta, now) {
                    expired.push(entry);
                } else {
                    fresh.push(entry);
                }
            }
            for entry in fresh {
                if let Err(entry) = inner.idle.push(entry) {
                    expired.push(entry);
                }
            }
            state.live = state.live.saturating_sub(expired.len());
        }

        let evicted = expired.len();
        for entry in expired {
            MetricsTracker::incr(&inner.metrics.evicted);
            inner.dispose(entry.conn, entry.meta.id);
        }
        if evicted > 0 {
            debug!(evicted, "Reaped expired idle connections");
        }
        evicted
    }

    /// Run [`reap`](Self::reap) every `period` until the pool is closed.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] for a zero `period` or when called
    /// outside a tokio runtime.
    pub fn spawn_reaper(&self, period: Duration) -> PoolResult<tokio::task::JoinHandle<()>> {
        if period.is_zero() {
            return Err(PoolError::InvalidArgument(
                "reaper period must be positive".into(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PoolError::InvalidArgument(e.to_string()))?;

        let pool = self.clone();
        Ok(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if pool.is_closed() {
                    break;
                }
                let reaping = pool.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || reaping.reap()).await {
                    warn!(error = %e, "Reaper task failed");
                    break;
                }
            }
            trace!("Reaper stopped");
        }))
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetrics {
        let inner = &self.inner;
        inner.metrics.snapshot(
            self.len(),
            inner.idle.len(),
            inner.checked_out.len(),
            inner.max_open,
            inner.max_idle_count,
        )
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "prometheus")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }

    /// Get health status
    pub fn health_status(&self) -> HealthStatus {
        let inner = &self.inner;
        let (live, closed) = {
            let state = inner.state.lock();
            (state.live, state.closed)
        };
        let long_held = inner
            .checked_out
            .iter()
            .filter(|entry| entry.value().elapsed() > inner.policy.max_lifetime)
            .count();

        HealthStatus::evaluate(HealthSample {
            live,
            idle: inner.idle.len(),
            in_use: inner.checked_out.len(),
            max_open: inner.max_open,
            long_held,
            closed,
        })
    }

    fn create_connection(&self) -> PoolResult<Pooled<C>> {
        let inner = &self.inner;
        let conn = match inner.factory.create() {
            Ok(conn) => conn,
            Err(e) => {
                inner.release_slot();
                debug!(error = %e, "Factory failed to create a connection");
                return Err(PoolError::Factory(e));
            }
        };
        MetricsTracker::incr(&inner.metrics.created);

        let meta = inner.next_metadata();
        if inner.is_closed() {
            debug!(id = meta.id, "Pool closed during create, disposing new connection");
            inner.dispose(conn, meta.id);
            return Err(PoolError::Closed);
        }
        if let Err(e) = inner.factory.validate(&conn) {
            MetricsTracker::incr(&inner.metrics.validation_failures);
            debug!(id = meta.id, error = %e, "New connection failed validation");
            inner.discard(conn, meta.id);
            return Err(PoolError::Validation(e));
        }

        debug!(id = meta.id, "Created new connection");
        self.check_out(conn, meta)
    }

    /// Register the connection as checked out, unless the pool closed while
    /// it was being validated or created.
    fn check_out(&self, conn: C, meta: ConnectionMetadata) -> PoolResult<Pooled<C>> {
        {
            let state = self.inner.state.lock();
            if state.closed {
                drop(state);
                self.inner.dispose(conn, meta.id);
                return Err(PoolError::Closed);
            }
            self.inner.checked_out.insert(meta.id, Instant::now());
        }
        MetricsTracker::incr(&self.inner.metrics.acquired);
        trace!(id = meta.id, idle = self.inner.idle.len(), "Acquired connection");
        Ok(Pooled {
            conn: Some(conn),
            meta,
            pool: self.clone(),
        })
    }
}

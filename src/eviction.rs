//! Age and idle-time limits for pooled connections

use std::time::{Duration, Instant};

/// Limits applied to connections waiting in the idle store.
///
/// A connection is expired once it is older than `max_lifetime` or has been
/// idle longer than `max_idle_time`, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub max_lifetime: Duration,
    pub max_idle_time: Duration,
}

impl EvictionPolicy {
    pub fn new(max_lifetime: Duration, max_idle_time: Duration) -> Self {
        Self {
            max_lifetime,
            max_idle_time,
        }
    }

    pub(crate) fn is_expired(&self, meta: &ConnectionMetadata) -> bool {
        self.is_expired_at(meta, Instant::now())
    }

    pub(crate) fn is_expired_at(&self, meta: &ConnectionMetadata, now: Instant) -> bool {
        now.saturating_duration_since(meta.created_at) > self.max_lifetime
            || now.saturating_duration_since(meta.idle_since) > self.max_idle_time
    }
}

/// Bookkeeping carried alongside every connection the pool owns
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionMetadata {
    pub id: u64,
    pub created_at: Instant,
    pub idle_since: Instant,
}

impl ConnectionMetadata {
    pub fn new(id: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            idle_since: now,
        }
    }

    /// Mark the connection as having just been returned
    pub fn touch(&mut self) {
        self.idle_since = Instant::now();
    }
}

/// A connection sitting in the idle store
pub(crate) struct IdleEntry<C> {
    pub conn: C,
    pub meta: ConnectionMetadata,
}

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use conn_pool::{BoxError, ConnectionFactory, ConnectionPool, PoolConfig, PoolResult};
use parking_lot::Mutex;

/// Factory handing out sequential `u32` ids and recording every call.
#[derive(Default)]
pub struct MockFactory {
    create_calls: AtomicUsize,
    validate_calls: AtomicUsize,
    disposed: Mutex<Vec<u32>>,
    invalid: Mutex<HashSet<u32>>,
    fail_create_from: Mutex<Option<usize>>,
    fail_dispose: AtomicBool,
    gate: Mutex<Option<(Arc<Barrier>, Arc<Barrier>)>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every create call numbered `n` or later fails
    pub fn failing_from(n: usize) -> Arc<Self> {
        let factory = Self::default();
        *factory.fail_create_from.lock() = Some(n);
        Arc::new(factory)
    }

    pub fn fail_creates(&self) {
        *self.fail_create_from.lock() = Some(0);
    }

    pub fn fail_disposes(&self) {
        self.fail_dispose.store(true, Ordering::SeqCst);
    }

    /// The next create call blocks between two rendezvous: the first tells the
    /// caller it has entered, the second lets it finish.
    pub fn gate_next_create(&self) -> (Arc<Barrier>, Arc<Barrier>) {
        let entered = Arc::new(Barrier::new(2));
        let resume = Arc::new(Barrier::new(2));
        *self.gate.lock() = Some((entered.clone(), resume.clone()));
        (entered, resume)
    }

    pub fn invalidate(&self, id: u32) {
        self.invalid.lock().insert(id);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> Vec<u32> {
        let mut ids = self.disposed.lock().clone();
        ids.sort_unstable();
        ids
    }

    pub fn dispose_count(&self) -> usize {
        self.disposed.lock().len()
    }
}

impl ConnectionFactory<u32> for MockFactory {
    fn create(&self) -> Result<u32, BoxError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().take();
        if let Some((entered, resume)) = gate {
            entered.wait();
            resume.wait();
        }
        if let Some(from) = *self.fail_create_from.lock()
            && n >= from
        {
            return Err("connection refused".into());
        }
        Ok(n as u32)
    }

    fn validate(&self, conn: &u32) -> Result<(), BoxError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        if self.invalid.lock().contains(conn) {
            return Err(format!("connection {} is broken", conn).into());
        }
        Ok(())
    }

    fn dispose(&self, conn: u32) -> Result<(), BoxError> {
        self.disposed.lock().push(conn);
        if self.fail_dispose.load(Ordering::SeqCst) {
            return Err("socket already closed".into());
        }
        Ok(())
    }
}

pub fn config(factory: &Arc<MockFactory>, max_idle: usize, max_open: usize) -> PoolConfig<u32> {
    PoolConfig::default()
        .with_shared_factory(factory.clone())
        .with_max_idle_count(max_idle)
        .with_max_open(max_open)
        .with_max_lifetime(Duration::from_secs(3600))
        .with_max_idle_time(Duration::from_secs(600))
}

pub fn pool(factory: &Arc<MockFactory>, max_idle: usize, max_open: usize) -> PoolResult<ConnectionPool<u32>> {
    ConnectionPool::new(config(factory, max_idle, max_open))
}

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use common::{MockFactory, pool};
use conn_pool::PoolError;

const THREADS: usize = 8;
const ITERATIONS: usize = 200;

// Slot reservation happens under the same lock as the idle pop, so the
// open limit holds even while many threads race for the last slot.
#[test]
fn live_count_never_exceeds_max_open() {
    let factory = MockFactory::new();
    let pool = pool(&factory, 2, 4).unwrap();
    let peak = AtomicUsize::new(0);
    let over_limit = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..ITERATIONS {
                    match pool.acquire() {
                        Ok(conn) => {
                            peak.fetch_max(pool.len(), Ordering::SeqCst);
                            thread::yield_now();
                            pool.release(conn).unwrap();
                        }
                        Err(PoolError::OverLimit { .. }) => {
                            over_limit.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            });
        }
    });

    assert!(peak.load(Ordering::SeqCst) <= 4);
    assert!(pool.len() <= 4);
    assert!(pool.idle_count() <= 2);
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(factory.create_calls() - factory.dispose_count(), pool.len());
    assert_eq!(pool.metrics().over_limit_events, over_limit.load(Ordering::SeqCst));
}

#[test]
fn close_while_busy_disposes_everything() {
    let factory = MockFactory::new();
    let pool = pool(&factory, 2, 6).unwrap();

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..ITERATIONS {
                    match pool.acquire() {
                        Ok(conn) => {
                            thread::yield_now();
                            let _ = pool.release(conn);
                        }
                        Err(PoolError::Closed) => break,
                        Err(PoolError::OverLimit { .. }) => continue,
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            });
        }
        s.spawn(|| {
            thread::yield_now();
            pool.close();
        });
    });

    assert!(pool.is_closed());
    assert_eq!(pool.len(), 0);
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(factory.create_calls(), factory.dispose_count());

    let mut disposed = factory.disposed();
    disposed.dedup();
    assert_eq!(disposed.len(), factory.dispose_count());
}

#[test]
fn pool_handles_are_shared_across_threads() {
    let factory = MockFactory::new();
    let pool = pool(&factory, 3, 3).unwrap();

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().map(|conn| conn.detach()))
        })
        .collect();

    let mut ids: Vec<u32> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();
    ids.sort_unstable();

    assert_eq!(ids, vec![0, 1, 2]);
    assert_eq!(pool.len(), 0);
    assert_eq!(factory.create_calls(), 3);
}

// A creation that was already under way when the pool closed must not hand
// out a connection from the closed pool.
#[test]
fn close_during_create_disposes_new_connection() {
    let factory = MockFactory::new();
    let pool = pool(&factory, 1, 2).unwrap();
    let held = pool.acquire().unwrap();
    assert_eq!(factory.validate_calls(), 1);

    let (entered, resume) = factory.gate_next_create();
    let worker = {
        let pool = pool.clone();
        thread::spawn(move || pool.acquire().map(|conn| *conn))
    };

    entered.wait();
    pool.close();
    resume.wait();

    let result = worker.join().unwrap();
    assert!(matches!(result, Err(PoolError::Closed)), "unexpected result: {result:?}");
    assert_eq!(factory.create_calls(), 2);
    assert_eq!(factory.validate_calls(), 1);
    assert_eq!(factory.disposed(), vec![1]);
    assert_eq!(pool.len(), 0);
    assert_eq!(pool.in_use_count(), 1);

    assert!(matches!(pool.release(held), Err(PoolError::Closed)));
    assert_eq!(factory.disposed(), vec![0, 1]);
}

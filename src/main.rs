// Small demonstration of the connection pool; the library lives in lib.rs.

use conn_pool::{ConnectionPool, FnFactory, PoolConfig, PoolError};
use std::sync::atomic::{AtomicU32, Ordering};

fn main() -> Result<(), PoolError> {
    println!("=== conn_pool demo ===");

    let next_id = AtomicU32::new(1);
    let factory = FnFactory::new(move || Ok(format!("conn-{}", next_id.fetch_add(1, Ordering::Relaxed))))
        .with_dispose(|conn| {
            println!("  Disposing {}", conn);
            Ok(())
        });

    let config = PoolConfig::new(factory)
        .with_max_idle_count(2)
        .with_max_open(3);
    let pool = ConnectionPool::new(config)?;
    println!("  Pre-warmed pool, live connections: {}", pool.len());

    let first = pool.acquire()?;
    let second = pool.acquire()?;
    let third = pool.acquire()?;
    println!("  Holding {}, {}, {}", *first, *second, *third);

    match pool.acquire() {
        Err(e) => println!("  Fourth acquire refused: {}", e),
        Ok(conn) => println!("  Unexpectedly got {}", *conn),
    }

    pool.release(first)?;
    println!("  Idle after release: {}, live: {}", pool.idle_count(), pool.len());

    pool.close();
    drop((second, third));
    println!("  Closed, live connections: {}", pool.len());
    Ok(())
}

//! The connection factory capability consumed by the pool

use crate::errors::BoxError;

/// Creates, checks and destroys connections of type `C`.
///
/// The pool only ever talks to a factory through `Arc<dyn ConnectionFactory<C>>`,
/// so one pool implementation serves database connections, sockets, or anything
/// else a factory can produce. Every method is synchronous; the pool applies no
/// timeout of its own and assumes each call returns in bounded time.
pub trait ConnectionFactory<C>: Send + Sync {
    /// Open a new connection.
    fn create(&self) -> Result<C, BoxError>;

    /// Cheap liveness check, run every time a connection leaves the idle store
    /// and once on every freshly created connection.
    fn validate(&self, conn: &C) -> Result<(), BoxError>;

    /// Close the connection. Failures are logged and otherwise ignored by the pool.
    fn dispose(&self, conn: C) -> Result<(), BoxError>;
}

type CreateFn<C> = Box<dyn Fn() -> Result<C, BoxError> + Send + Sync>;
type ValidateFn<C> = Box<dyn Fn(&C) -> Result<(), BoxError> + Send + Sync>;
type DisposeFn<C> = Box<dyn Fn(C) -> Result<(), BoxError> + Send + Sync>;

/// A factory assembled from closures.
///
/// Without explicit hooks, every connection validates successfully and disposal
/// simply drops the value.
///
/// # Examples
///
/// ```
/// use conn_pool::{ConnectionFactory, FnFactory};
///
/// let factory = FnFactory::new(|| Ok(String::from("conn")))
///     .with_validate(|c: &String| if c.is_empty() { Err("empty".into()) } else { Ok(()) });
///
/// let conn = factory.create().unwrap();
/// assert!(factory.validate(&conn).is_ok());
/// ```
pub struct FnFactory<C> {
    create: CreateFn<C>,
    validate: ValidateFn<C>,
    dispose: DisposeFn<C>,
}

impl<C: 'static> FnFactory<C> {
    pub fn new<F>(create: F) -> Self
    where
        F: Fn() -> Result<C, BoxError> + Send + Sync + 'static,
    {
        Self {
            create: Box::new(create),
            validate: Box::new(|_| Ok(())),
            dispose: Box::new(|conn| {
                drop(conn);
                Ok(())
            }),
        }
    }

    /// Set the liveness check
    pub fn with_validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.validate = Box::new(validate);
        self
    }

    /// Set the disposal hook
    pub fn with_dispose<F>(mut self, dispose: F) -> Self
    where
        F: Fn(C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.dispose = Box::new(dispose);
        self
    }
}

impl<C> ConnectionFactory<C> for FnFactory<C> {
    fn create(&self) -> Result<C, BoxError> {
        (self.create)()
    }

    fn validate(&self, conn: &C) -> Result<(), BoxError> {
        (self.validate)(conn)
    }

    fn dispose(&self, conn: C) -> Result<(), BoxError> {
        (self.dispose)(conn)
    }
}

//! Error types for the connection pool

use thiserror::Error;

/// Error type produced by connection factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Pool is closed")]
    Closed,

    #[error("Pool is over its open limit ({live} of {max_open} connections live)")]
    OverLimit { live: usize, max_open: usize },

    #[error("Invalid pool configuration: {0}")]
    Config(String),

    #[error("Factory is not able to fill the pool: {0}")]
    Initialization(#[source] BoxError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Factory failed to create a connection: {0}")]
    Factory(#[source] BoxError),

    #[error("Connection validation failed: {0}")]
    Validation(#[source] BoxError),

    #[error("Operation was cancelled")]
    Cancelled,
}

impl PoolError {
    /// Whether the caller may reasonably retry the same operation later.
    ///
    /// The pool itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::OverLimit { .. } | PoolError::Factory(_) | PoolError::Validation(_)
        )
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

//! Error types for store operations.

use crate::store::ListenerId;
use thiserror::Error;

/// Boxed error carried by failing listeners and rejected async updates.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for store operations.
///
/// A middleware veto is not an error: the update is dropped and the caller
/// gets `Ok(())`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The future handed to `set_state_async` resolved to an error.
    /// Nothing was committed.
    #[error("async update rejected: {0}")]
    Rejected(#[source] BoxError),

    /// A listener failed during notification. The commit stands, but
    /// listeners after this one were not notified in that pass.
    #[error("listener {id} failed: {source}")]
    Listener {
        id: ListenerId,
        #[source]
        source: BoxError,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

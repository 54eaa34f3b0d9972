//! The state container.
//!
//! A [`Store`] owns the current snapshot, the middleware chain that vets
//! every update, and the listeners notified after each commit.

pub mod middleware;
mod store;
mod subscription;

pub use middleware::{trace_candidates, Middleware, Step};
pub use store::Store;
pub use subscription::{Listener, ListenerId, Unsubscribe};

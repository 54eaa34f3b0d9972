//! # Statebox
//!
//! A single-instance reactive state container for Rust.
//!
//! A [`Store`] holds one immutable snapshot of application state:
//! - Updates are partials merged field by field onto the current snapshot
//! - Middleware can transform or veto each update before it commits
//! - Listeners see every commit; selector listeners only see changes to the
//!   value they derive
//! - Async updates resolve a future partial, then take the same path
//!
//! ```
//! use statebox::{create, snapshot, Step};
//!
//! snapshot! {
//!     #[derive(Clone, Debug, PartialEq)]
//!     pub struct Counter => CounterPatch {
//!         pub count: i32,
//!     }
//! }
//!
//! let store = create(Counter { count: 1 });
//! store.use_middleware(|mut candidate: Counter| {
//!     candidate.count *= 2;
//!     Step::Continue(candidate)
//! });
//!
//! store
//!     .set_state_with(|state| CounterPatch::default().count(state.count + 1))
//!     .unwrap();
//! assert_eq!(store.get_state().count, 4);
//! ```

pub mod config;
pub mod error;
pub mod merge;
pub mod store;

pub use config::{CommitPolicy, StoreConfig};
pub use error::{BoxError, Result, StoreError};
pub use merge::Merge;
pub use store::{middleware, Listener, ListenerId, Middleware, Step, Store, Unsubscribe};

/// Create a store seeded with `initial`.
pub fn create<T>(initial: T) -> Store<T>
where
    T: Merge + Send + Sync + 'static,
{
    Store::new(initial)
}

/// Create a store seeded with `initial` using the given configuration.
pub fn create_with_config<T>(initial: T, config: StoreConfig) -> Store<T>
where
    T: Merge + Send + Sync + 'static,
{
    Store::with_config(initial, config)
}

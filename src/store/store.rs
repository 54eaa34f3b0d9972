use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::middleware::{Middleware, Pipeline, Step};
use super::subscription::{selector_listener, Listener, Registry, Unsubscribe};
use crate::config::{CommitPolicy, StoreConfig};
use crate::error::{BoxError, Result, StoreError};
use crate::merge::Merge;

/// The snapshot currently visible, with the number of commits behind it.
struct Current<T> {
    snapshot: Arc<T>,
    version: u64,
}

/// A reactive container for one snapshot of application state.
///
/// Updates are merged onto the current snapshot, vetted by middleware in
/// registration order, committed, and then announced to listeners. Handles
/// are cheap to clone and all clones share the same state.
///
/// No lock is held while user code runs, so updaters, middleware and
/// listeners may call back into the store.
pub struct Store<T: Merge> {
    state: Arc<RwLock<Current<T>>>,
    middleware: Arc<RwLock<Pipeline<T>>>,
    listeners: Arc<Registry<T>>,
    config: Arc<StoreConfig>,
}

impl<T> Store<T>
where
    T: Merge + Send + Sync + 'static,
{
    /// Create a new store with the given initial state.
    pub fn new(initial: T) -> Self {
        Self::with_config(initial, StoreConfig::default())
    }

    /// Create a new store with the given initial state and configuration.
    pub fn with_config(initial: T, config: StoreConfig) -> Self {
        debug!(store = %config.name, policy = ?config.commit_policy, "store created");
        Self {
            state: Arc::new(RwLock::new(Current {
                snapshot: Arc::new(initial),
                version: 0,
            })),
            middleware: Arc::new(RwLock::new(Pipeline::new())),
            listeners: Arc::new(Registry::new()),
            config: Arc::new(config),
        }
    }

    /// The current snapshot. Do not try to mutate it; send an update.
    pub fn get_state(&self) -> Arc<T> {
        Arc::clone(&self.state.read().snapshot)
    }

    /// Read the current snapshot through a closure. The snapshot is
    /// pinned for the call, so no lock is held while `f` runs.
    pub fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let snapshot = self.get_state();
        f(&snapshot)
    }

    /// Number of commits since the store was created.
    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// The configuration this store was created with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Merge `partial` onto the current snapshot and commit it, subject to
    /// middleware.
    ///
    /// Returns `Ok(())` when the update was vetoed. Errors only when a
    /// listener fails, and by then the commit has already happened.
    pub fn set_state(&self, partial: T::Partial) -> Result<()> {
        let (base, version) = self.current();
        self.dispatch(base, version, partial)
    }

    /// Like [`set_state`](Self::set_state), with the partial computed from
    /// the current snapshot.
    pub fn set_state_with<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&T) -> T::Partial,
    {
        let (base, version) = self.current();
        let partial = updater(&base);
        self.dispatch(base, version, partial)
    }

    /// Resolve a future partial, then apply it with
    /// [`set_state`](Self::set_state).
    ///
    /// The updater runs immediately, against the snapshot current when this
    /// method is called. The resolved partial is merged onto whatever is
    /// current once it arrives. A failed future is returned as
    /// [`StoreError::Rejected`] and changes nothing. There is no timeout.
    pub fn set_state_async<'a, F, Fut, E>(&'a self, updater: F) -> impl Future<Output = Result<()>> + 'a
    where
        F: FnOnce(Arc<T>) -> Fut,
        Fut: Future<Output = std::result::Result<T::Partial, E>> + 'a,
        E: Into<BoxError> + 'a,
    {
        let pending = updater(self.get_state());
        self.set_state_async_partial(pending)
    }

    /// Await a partial that does not depend on the current snapshot, then
    /// apply it with [`set_state`](Self::set_state).
    ///
    /// Failure handling matches [`set_state_async`](Self::set_state_async).
    pub async fn set_state_async_partial<Fut, E>(&self, pending: Fut) -> Result<()>
    where
        Fut: Future<Output = std::result::Result<T::Partial, E>>,
        E: Into<BoxError>,
    {
        match pending.await {
            Ok(partial) => self.set_state(partial),
            Err(error) => {
                let error: BoxError = error.into();
                debug!(store = %self.config.name, %error, "async update rejected");
                Err(StoreError::Rejected(error))
            }
        }
    }

    /// Subscribe to every committed snapshot.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_listener(&Listener::new(callback))
    }

    /// Subscribe with a callback that can fail. A failure stops the rest of
    /// that notification pass and surfaces from the update call.
    pub fn try_subscribe<F, E>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&T) -> std::result::Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.subscribe_listener(&Listener::fallible(callback))
    }

    /// Subscribe a shared listener. Subscribing the same listener again
    /// returns a handle to the existing registration.
    pub fn subscribe_listener(&self, listener: &Listener<T>) -> Unsubscribe {
        let id = self.listeners.insert(listener.clone());
        debug!(store = %self.config.name, listener = %id, "listener subscribed");
        Unsubscribe::new(id, &self.listeners)
    }

    /// Subscribe to a derived value. `callback` runs only when the selected
    /// value differs from the last one it saw.
    ///
    /// A selector that builds a fresh value on every call is compared by
    /// `PartialEq`; use [`subscribe_selector_by`](Self::subscribe_selector_by)
    /// for identity comparison such as `Arc::ptr_eq`.
    pub fn subscribe_selector<D, S, F>(&self, selector: S, callback: F) -> Unsubscribe
    where
        D: PartialEq + Clone + Send + 'static,
        S: Fn(&T) -> D + Send + Sync + 'static,
        F: Fn(&D) + Send + Sync + 'static,
    {
        self.subscribe_selector_by(selector, |previous: &D, next: &D| previous == next, callback)
    }

    /// Subscribe to a derived value with a custom "unchanged" test.
    pub fn subscribe_selector_by<D, S, E, F>(&self, selector: S, eq: E, callback: F) -> Unsubscribe
    where
        D: Clone + Send + 'static,
        S: Fn(&T) -> D + Send + Sync + 'static,
        E: Fn(&D, &D) -> bool + Send + Sync + 'static,
        F: Fn(&D) + Send + Sync + 'static,
    {
        let seed = self.get_state();
        let listener = selector_listener(&*seed, selector, eq, callback);
        self.subscribe_listener(&listener)
    }

    /// Append a middleware closure to the chain.
    pub fn use_middleware<F>(&self, middleware: F)
    where
        F: Fn(T) -> Step<T> + Send + Sync + 'static,
    {
        self.register_middleware(middleware);
    }

    /// Append any [`Middleware`] implementation to the chain.
    pub fn register_middleware<M>(&self, middleware: M)
    where
        M: Middleware<T> + 'static,
    {
        let mut pipeline = self.middleware.write();
        pipeline.push(Arc::new(middleware));
        debug!(store = %self.config.name, position = pipeline.len() - 1, "middleware registered");
    }

    /// Number of registered listeners, selector listeners included.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of middleware in the chain.
    pub fn middleware_count(&self) -> usize {
        self.middleware.read().len()
    }

    fn current(&self) -> (Arc<T>, u64) {
        let current = self.state.read();
        (Arc::clone(&current.snapshot), current.version)
    }

    /// Build the candidate, run it through middleware, commit, notify.
    fn dispatch(&self, mut base: Arc<T>, mut base_version: u64, partial: T::Partial) -> Result<()> {
        let name = &*self.config.name;
        let mut attempts = 0u32;

        loop {
            let candidate = base.merge(partial.clone());
            let pipeline = self.middleware.read().clone();
            let output = match pipeline.run(candidate) {
                Step::Continue(output) => output,
                Step::Halt => {
                    debug!(store = name, "update vetoed by middleware");
                    return Ok(());
                }
            };

            let (committed, version) = {
                let mut current = self.state.write();
                if current.version != base_version {
                    match self.config.commit_policy {
                        CommitPolicy::Rebase { max_attempts } if attempts < max_attempts => {
                            attempts += 1;
                            base = Arc::clone(&current.snapshot);
                            base_version = current.version;
                            debug!(store = name, attempts, base_version, "base moved during update, rebasing");
                            continue;
                        }
                        CommitPolicy::Rebase { max_attempts } => {
                            warn!(
                                store = name,
                                max_attempts,
                                base_version,
                                latest = current.version,
                                "rebase attempts exhausted, merging onto latest"
                            );
                        }
                        CommitPolicy::Latest => {
                            debug!(
                                store = name,
                                base_version,
                                latest = current.version,
                                "base moved during update, merging onto latest"
                            );
                        }
                    }
                }

                let next = Arc::new(current.snapshot.merge(output.into_partial()));
                current.snapshot = Arc::clone(&next);
                current.version += 1;
                (next, current.version)
            };

            debug!(store = name, version, "committed");
            return self.listeners.notify(&committed, name);
        }
    }
}

impl<T: Merge> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            middleware: Arc::clone(&self.middleware),
            listeners: Arc::clone(&self.listeners),
            config: Arc::clone(&self.config),
        }
    }
}

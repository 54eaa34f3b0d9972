use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::error::{BoxError, Result, StoreError};

type Callback<T> = dyn Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync;

/// Identifies one registration in a store's listener set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A snapshot listener with identity.
///
/// Clones share identity: subscribing the same `Listener` twice registers
/// it once.
pub struct Listener<T> {
    callback: Arc<Callback<T>>,
}

impl<T: 'static> Listener<T> {
    /// Wrap an infallible callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(move |state: &T| -> std::result::Result<(), BoxError> {
                callback(state);
                Ok(())
            }),
        }
    }

    /// Wrap a callback whose error aborts the notification pass it runs in.
    pub fn fallible<F, E>(callback: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self {
            callback: Arc::new(move |state: &T| -> std::result::Result<(), BoxError> {
                callback(state).map_err(Into::into)
            }),
        }
    }
}

impl<T> Listener<T> {
    /// Whether both handles refer to the same listener.
    pub fn same_as(&self, other: &Listener<T>) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.callback) as *const (),
            Arc::as_ptr(&other.callback) as *const (),
        )
    }

    fn call(&self, state: &T) -> std::result::Result<(), BoxError> {
        (self.callback)(state)
    }
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("callback", &Arc::as_ptr(&self.callback))
            .finish()
    }
}

/// Build a listener that fires `callback` only when the selected value
/// changes according to `eq`.
///
/// The cache is seeded from `initial` and replaced right before each call
/// to `callback`, never otherwise.
pub(crate) fn selector_listener<T, D, S, E, F>(
    initial: &T,
    selector: S,
    eq: E,
    callback: F,
) -> Listener<T>
where
    T: 'static,
    D: Clone + Send + 'static,
    S: Fn(&T) -> D + Send + Sync + 'static,
    E: Fn(&D, &D) -> bool + Send + Sync + 'static,
    F: Fn(&D) + Send + Sync + 'static,
{
    let previous = Mutex::new(selector(initial));

    Listener::new(move |state: &T| {
        let next = selector(state);
        let changed = {
            let mut previous = previous.lock();
            if eq(&previous, &next) {
                false
            } else {
                *previous = next.clone();
                true
            }
        };
        // Lock released: the callback may re-enter the store.
        if changed {
            callback(&next);
        }
    })
}

struct Entry<T> {
    id: ListenerId,
    listener: Listener<T>,
    active: AtomicBool,
}

/// Listener set in registration order.
pub(crate) struct Registry<T> {
    entries: Mutex<Vec<Arc<Entry<T>>>>,
    next_id: AtomicU64,
}

impl<T> Registry<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `listener`, or return the id it already holds.
    pub(crate) fn insert(&self, listener: Listener<T>) -> ListenerId {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.iter().find(|entry| entry.listener.same_as(&listener)) {
            return existing.id;
        }

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        entries.push(Arc::new(Entry {
            id,
            listener,
            active: AtomicBool::new(true),
        }));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|entry| entry.id == id) {
            Some(index) => {
                let entry = entries.remove(index);
                entry.active.store(false, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, id: ListenerId) -> bool {
        self.entries.lock().iter().any(|entry| entry.id == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Deliver `state` to every listener registered when the pass starts.
    ///
    /// Listeners added during the pass wait for the next one. Listeners
    /// removed during the pass are skipped if not yet reached. The first
    /// failing listener ends the pass.
    pub(crate) fn notify(&self, state: &T, store: &str) -> Result<()> {
        let pass: Vec<Arc<Entry<T>>> = self.entries.lock().clone();

        for entry in pass {
            if !entry.active.load(Ordering::SeqCst) {
                continue;
            }
            trace!(store, listener = %entry.id, "notifying listener");
            if let Err(source) = entry.listener.call(state) {
                warn!(store, listener = %entry.id, error = %source, "listener failed, aborting notification");
                return Err(StoreError::Listener {
                    id: entry.id,
                    source,
                });
            }
        }
        Ok(())
    }
}

trait Detach: Send + Sync {
    fn detach(&self, id: ListenerId) -> bool;
    fn is_attached(&self, id: ListenerId) -> bool;
}

impl<T: 'static> Detach for Registry<T> {
    fn detach(&self, id: ListenerId) -> bool {
        self.remove(id)
    }

    fn is_attached(&self, id: ListenerId) -> bool {
        self.contains(id)
    }
}

/// Removes the registration it was returned for.
///
/// Dropping the handle leaves the listener registered.
#[derive(Clone)]
pub struct Unsubscribe {
    id: ListenerId,
    registry: Weak<dyn Detach>,
}

impl Unsubscribe {
    pub(crate) fn new<T: 'static>(id: ListenerId, registry: &Arc<Registry<T>>) -> Self {
        let registry: Weak<Registry<T>> = Arc::downgrade(registry);
        Self { id, registry }
    }

    /// The registration this handle removes.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener. Repeated calls, and calls after the store is
    /// gone, do nothing.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.detach(self.id) {
                trace!(listener = %self.id, "listener removed");
            }
        }
    }

    /// Whether the registration is still in the store's listener set.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.is_attached(self.id))
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

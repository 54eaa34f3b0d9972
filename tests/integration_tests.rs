//! Integration tests for Statebox

use std::io;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use statebox::{create, snapshot, Listener, Step, Store, StoreError};
use tokio::sync::oneshot;

snapshot! {
    #[derive(Clone, Debug, PartialEq)]
    pub struct Counter => CounterPatch {
        pub count: i32,
    }
}

snapshot! {
    #[derive(Clone, Debug, PartialEq)]
    pub struct Session => SessionPatch {
        pub user: String,
        pub x: i32,
        pub y: i32,
        pub items: Arc<Vec<String>>,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

fn session() -> Store<Session> {
    create(Session {
        user: "ada".to_string(),
        x: 0,
        y: 0,
        items: Arc::new(Vec::new()),
    })
}

fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static)
where
    T: Sync,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |value: &T| sink.lock().push(value.clone()))
}

#[test]
fn commit_is_synchronous_and_notifies() {
    init_tracing();
    let store = create(Counter { count: 0 });
    let (seen, record) = recorder::<Counter>();
    store.subscribe(record);

    store.set_state(CounterPatch::default().count(1)).unwrap();

    assert_eq!(*store.get_state(), Counter { count: 1 });
    assert_eq!(*seen.lock(), vec![Counter { count: 1 }]);
}

#[test]
fn middleware_doubles_the_candidate() {
    init_tracing();
    let store = create(Counter { count: 1 });
    store.use_middleware(|mut candidate: Counter| {
        candidate.count *= 2;
        Step::Continue(candidate)
    });

    store
        .set_state_with(|state| CounterPatch::default().count(state.count + 1))
        .unwrap();

    assert_eq!(store.get_state().count, 4);
}

#[test]
fn vetoing_middleware_blocks_commit_and_notification() {
    let store = session();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    store.subscribe(move |_| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });
    store.use_middleware(|candidate: Session| {
        if candidate.x < 0 {
            Step::Halt
        } else {
            Step::Continue(candidate)
        }
    });

    store.set_state(SessionPatch::default().x(-1)).unwrap();
    assert_eq!(store.get_state().x, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    store.set_state(SessionPatch::default().x(3)).unwrap();
    assert_eq!(store.get_state().x, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn selector_fires_once_per_change() {
    let store = session();
    let (seen, record) = recorder::<i32>();
    store.subscribe_selector(|state: &Session| state.x, record);

    store.set_state(SessionPatch::default().y(1)).unwrap();
    store.set_state(SessionPatch::default().x(1)).unwrap();
    store.set_state(SessionPatch::default().x(1)).unwrap();
    store.set_state(SessionPatch::default().x(2)).unwrap();

    assert_eq!(*seen.lock(), vec![1, 2]);
}

#[test]
fn identity_selector_ignores_equal_but_new_values() {
    let store = session();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    store.subscribe_selector_by(
        |state: &Session| state.items.clone(),
        |previous: &Arc<Vec<String>>, next: &Arc<Vec<String>>| Arc::ptr_eq(previous, next),
        move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        },
    );

    // Untouched field keeps its allocation.
    store.set_state(SessionPatch::default().x(1)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Same contents, new allocation.
    store
        .set_state(SessionPatch::default().items(Arc::new(Vec::new())))
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn shared_listener_is_deduplicated() {
    let store = create(Counter { count: 0 });
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let listener = Listener::new(move |_: &Counter| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });

    let first = store.subscribe_listener(&listener);
    let second = store.subscribe_listener(&listener);
    assert_eq!(first.id(), second.id());
    assert_eq!(store.listener_count(), 1);

    store.set_state(CounterPatch::default().count(1)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    second.unsubscribe();
    assert!(!first.is_active());
    store.set_state(CounterPatch::default().count(2)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn unsubscribe_during_notification_skips_pending_listener() {
    let store = create(Counter { count: 0 });
    let order = Arc::new(Mutex::new(Vec::new()));
    let later: Arc<Mutex<Option<statebox::Unsubscribe>>> = Arc::new(Mutex::new(None));

    let order_a = order.clone();
    let later_a = later.clone();
    store.subscribe(move |_| {
        order_a.lock().push("a");
        if let Some(handle) = later_a.lock().as_ref() {
            handle.unsubscribe();
        }
    });
    let order_b = order.clone();
    let handle_b = store.subscribe(move |_| order_b.lock().push("b"));
    let order_c = order.clone();
    store.subscribe(move |_| order_c.lock().push("c"));
    *later.lock() = Some(handle_b);

    store.set_state(CounterPatch::default().count(1)).unwrap();
    assert_eq!(*order.lock(), vec!["a", "c"]);
    assert_eq!(store.listener_count(), 2);
}

#[test]
fn listener_added_during_notification_waits_for_next_pass() {
    let store = create(Counter { count: 0 });
    let late_calls = Arc::new(AtomicUsize::new(0));
    let added = Arc::new(AtomicUsize::new(0));

    let inner = store.clone();
    let late_calls_clone = late_calls.clone();
    store.subscribe(move |_| {
        if added.fetch_add(1, Ordering::SeqCst) == 0 {
            let late_calls = late_calls_clone.clone();
            inner.subscribe(move |_| {
                late_calls.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    store.set_state(CounterPatch::default().count(1)).unwrap();
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);

    store.set_state(CounterPatch::default().count(2)).unwrap();
    assert_eq!(late_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn failing_listener_aborts_the_pass_but_keeps_the_commit() {
    let store = create(Counter { count: 0 });
    let after = Arc::new(AtomicUsize::new(0));

    store.try_subscribe(|state: &Counter| {
        if state.count > 1 {
            Err(io::Error::other("too big"))
        } else {
            Ok(())
        }
    });
    let after_clone = after.clone();
    store.subscribe(move |_| {
        after_clone.fetch_add(1, Ordering::SeqCst);
    });

    store.set_state(CounterPatch::default().count(1)).unwrap();
    assert_eq!(after.load(Ordering::SeqCst), 1);

    let err = store.set_state(CounterPatch::default().count(2)).unwrap_err();
    assert!(matches!(err, StoreError::Listener { .. }));
    assert_eq!(store.get_state().count, 2);
    assert_eq!(after.load(Ordering::SeqCst), 1);
}

#[test]
fn listener_can_update_the_store() {
    let store = create(Counter { count: 0 });
    let inner = store.clone();
    store.subscribe(move |state: &Counter| {
        if state.count < 3 {
            inner
                .set_state(CounterPatch::default().count(state.count + 1))
                .unwrap();
        }
    });

    store.set_state(CounterPatch::default().count(1)).unwrap();
    assert_eq!(store.get_state().count, 3);
    assert_eq!(store.version(), 3);
}

#[tokio::test]
async fn async_update_merges_onto_state_current_at_commit() {
    init_tracing();
    let store = session();
    let (tx, rx) = oneshot::channel::<SessionPatch>();

    let pending = store.set_state_async(|captured: Arc<Session>| async move {
        assert_eq!(captured.y, 0);
        rx.await
    });
    let interleaved = async {
        store.set_state(SessionPatch::default().y(7)).unwrap();
        tx.send(SessionPatch::default().x(5)).ok();
    };

    let (result, ()) = tokio::join!(pending, interleaved);
    result.unwrap();

    let state = store.get_state();
    assert_eq!(state.x, 5);
    assert_eq!(state.y, 7);
    assert_eq!(store.version(), 2);
}

#[tokio::test]
async fn async_updater_sees_snapshot_at_call_time() {
    let store = session();
    let seen_y = Arc::new(Mutex::new(None));

    let seen_clone = seen_y.clone();
    let pending = store.set_state_async(move |captured: Arc<Session>| {
        *seen_clone.lock() = Some(captured.y);
        futures::future::ready(Ok::<_, io::Error>(
            SessionPatch::default().x(captured.y + 1),
        ))
    });
    store.set_state(SessionPatch::default().y(7)).unwrap();
    pending.await.unwrap();

    assert_eq!(*seen_y.lock(), Some(0));
    let state = store.get_state();
    assert_eq!(state.x, 1);
    assert_eq!(state.y, 7);
}

#[tokio::test]
async fn async_literal_partial_merges_onto_latest() {
    let store = session();
    let (tx, rx) = oneshot::channel::<SessionPatch>();

    let pending = store.set_state_async_partial(rx);
    let interleaved = async {
        store.set_state(SessionPatch::default().y(3)).unwrap();
        tx.send(SessionPatch::default().x(9)).ok();
    };

    let (result, ()) = tokio::join!(pending, interleaved);
    result.unwrap();

    let state = store.get_state();
    assert_eq!(state.x, 9);
    assert_eq!(state.y, 3);
}

#[tokio::test]
async fn rejected_async_literal_partial_changes_nothing() {
    let store = create(Counter { count: 0 });
    let (tx, rx) = oneshot::channel::<CounterPatch>();
    drop(tx);

    let err = store.set_state_async_partial(rx).await.unwrap_err();
    assert!(matches!(err, StoreError::Rejected(_)));
    assert_eq!(store.version(), 0);
}

#[tokio::test]
async fn rejected_async_update_changes_nothing() {
    let store = create(Counter { count: 0 });
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    store.subscribe(move |_| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });

    let err = store
        .set_state_async(|_| async { Err::<CounterPatch, _>(io::Error::other("offline")) })
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Rejected(_)));
    assert_eq!(err.to_string(), "async update rejected: offline");
    assert_eq!(store.get_state().count, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn async_update_goes_through_middleware() {
    let store = create(Counter { count: 1 });
    store.use_middleware(|mut candidate: Counter| {
        candidate.count *= 10;
        Step::Continue(candidate)
    });

    store
        .set_state_async(|state: Arc<Counter>| {
            futures::future::ready(Ok::<_, io::Error>(CounterPatch::default().count(state.count + 1)))
        })
        .await
        .unwrap();

    assert_eq!(store.get_state().count, 20);
}

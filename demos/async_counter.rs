//! Async updates interleaving with synchronous ones

use std::io;
use std::sync::Arc;
use std::time::Duration;

use statebox::{create_with_config, snapshot, CommitPolicy, StoreConfig};

snapshot! {
    #[derive(Clone, Debug)]
    struct Counter => CounterPatch {
        count: i32,
        step: i32,
        remote: Option<i32>,
    }
}

async fn fetch_remote(delay_ms: u64, value: i32) -> Result<i32, io::Error> {
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    if value < 0 {
        return Err(io::Error::other("remote refused"));
    }
    Ok(value)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> statebox::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let store = create_with_config(
        Counter {
            count: 0,
            step: 1,
            remote: None,
        },
        StoreConfig::new()
            .name("counter")
            .commit_policy(CommitPolicy::Latest),
    );

    store.subscribe(|state: &Counter| {
        println!("[State] count={} step={} remote={:?}", state.count, state.step, state.remote);
    });
    store.subscribe_selector(
        |state: &Counter| state.remote,
        |remote: &Option<i32>| println!("[Remote] {remote:?}"),
    );

    let slow = store.set_state_async(|captured: Arc<Counter>| async move {
        println!("slow fetch started at count={}", captured.count);
        fetch_remote(20, 42)
            .await
            .map(|value| CounterPatch::default().remote(Some(value)))
    });
    let local = async {
        for _ in 0..3 {
            store.set_state_with(|s| CounterPatch::default().count(s.count + s.step))?;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok::<_, statebox::StoreError>(())
    };

    let (slow, local) = tokio::join!(slow, local);
    slow?;
    local?;

    let refused = store
        .set_state_async(|_| async {
            fetch_remote(1, -1)
                .await
                .map(|value| CounterPatch::default().remote(Some(value)))
        })
        .await;
    if let Err(err) = refused {
        println!("refused update left state alone: {err}");
    }

    println!("final: {:?} after {} commits", store.get_state(), store.version());
    Ok(())
}

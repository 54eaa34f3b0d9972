//! Store configuration.

use std::borrow::Cow;

/// How a commit treats a snapshot that moved while the update was in flight.
///
/// The candidate is built on the snapshot current when the update started.
/// If another update commits before this one reaches the commit step (a
/// middleware or listener re-entering the store, or an async update resolving
/// late), the two bases differ.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommitPolicy {
    /// Merge the pipeline output onto whatever is current at commit time.
    /// Last committer wins for every field the output carries.
    #[default]
    Latest,
    /// Compare-and-swap: when the base moved, merge the original partial
    /// onto the newer base and run the pipeline again. After
    /// `max_attempts` retries the commit falls back to [`CommitPolicy::Latest`].
    Rebase { max_attempts: u32 },
}

/// Configuration for a [`Store`](crate::Store).
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Label attached to every log event the store emits.
    pub name: Cow<'static, str>,
    pub commit_policy: CommitPolicy,
}

impl StoreConfig {
    /// Default configuration: named `"store"`, [`CommitPolicy::Latest`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the label attached to log events.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Set how commits treat a snapshot that moved mid-update.
    pub fn commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.commit_policy = policy;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: Cow::Borrowed("store"),
            commit_policy: CommitPolicy::Latest,
        }
    }
}

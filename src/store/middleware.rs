use std::fmt::Debug;
use std::sync::Arc;

use tracing::trace;

/// Outcome of a single middleware step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step<T> {
    /// Hand this (possibly transformed) candidate to the next step.
    Continue(T),
    /// Drop the update. Nothing is committed and no listener runs.
    Halt,
}

/// An interception step between a proposed update and its commit.
///
/// Closures `Fn(T) -> Step<T>` implement this directly.
pub trait Middleware<T>: Send + Sync {
    fn handle(&self, candidate: T) -> Step<T>;
}

impl<T, F> Middleware<T> for F
where
    F: Fn(T) -> Step<T> + Send + Sync,
{
    fn handle(&self, candidate: T) -> Step<T> {
        self(candidate)
    }
}

/// Middleware that logs every candidate at trace level and passes it on.
pub fn trace_candidates<T: Debug>() -> impl Middleware<T> {
    |candidate: T| {
        trace!(?candidate, "candidate");
        Step::Continue(candidate)
    }
}

/// Ordered, append-only chain of middleware.
///
/// Cloning is cheap and yields a frozen view: steps appended to the
/// original afterwards do not show up in the clone.
pub(crate) struct Pipeline<T> {
    steps: Vec<Arc<dyn Middleware<T>>>,
}

impl<T> Pipeline<T> {
    pub(crate) fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub(crate) fn push(&mut self, step: Arc<dyn Middleware<T>>) {
        self.steps.push(step);
    }

    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }

    /// Thread `candidate` through every step in registration order.
    pub(crate) fn run(&self, candidate: T) -> Step<T> {
        let mut current = candidate;
        for (position, step) in self.steps.iter().enumerate() {
            match step.handle(current) {
                Step::Continue(next) => {
                    trace!(position, "middleware continued");
                    current = next;
                }
                Step::Halt => {
                    trace!(position, "middleware halted");
                    return Step::Halt;
                }
            }
        }
        Step::Continue(current)
    }
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
        }
    }
}

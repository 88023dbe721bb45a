use crate::Result;
use std::{
    fmt::{self, Display, Formatter},
    future::Future,
    sync::Arc,
};

/// Callback invoked right after a participant committed its transaction.
pub type CommitObserver = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by `CommitObservers::subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Registry of the commit observers of a participant.
///
/// Participant implementations embed one and call `notify` synchronously after a
/// successful commit, before returning from `Participant::commit`.
#[derive(Default)]
pub struct CommitObservers {
    next: u64,
    observers: Vec<(ObserverId, CommitObserver)>,
}

impl CommitObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: CommitObserver) -> ObserverId {
        let id = ObserverId(self.next);
        self.next += 1;
        self.observers.push((id, observer));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let len = self.observers.len();
        self.observers.retain(|(v, _)| *v != id);
        self.observers.len() != len
    }

    /// Invokes every observer in subscription order.
    pub fn notify(&self) {
        for (_, observer) in &self.observers {
            observer();
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

/// One side of a nested transaction scope, wrapping an externally owned resource
/// (a database connection, a queue client).
///
/// Once `abort` or `rollback` was called the underlying transaction is gone and
/// must not be reused.
pub trait Participant: Send + Sync + 'static {
    /// Begin the transaction, for a database this opens the connection and begins.
    fn prepare(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Commit the transaction. On failure the transaction is considered gone.
    /// Observers must be notified after a successful commit, before returning.
    fn commit(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Roll back the transaction.
    ///
    /// Must report `TransactionError::Disposed` when the transaction was already torn
    /// down or terminated.
    fn rollback(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Discard a prepared transaction because the other participant failed to prepare.
    fn abort(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Release any remaining handle, never fails and can be called more than once.
    fn clean(&mut self) -> impl Future<Output = ()> + Send;

    /// Human readable description of the transaction (identity, isolation level).
    fn trace_transaction(&self) -> String;

    fn commit_observers(&mut self) -> &mut CommitObservers;

    fn subscribe_commit(&mut self, observer: CommitObserver) -> ObserverId {
        self.commit_observers().subscribe(observer)
    }

    fn unsubscribe_commit(&mut self, id: ObserverId) -> bool {
        self.commit_observers().unsubscribe(id)
    }
}

/// The role of a participant in the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Committed last, once it commits the scope is done.
    Outer,
    /// Committed first, its failure is cheap to recover from.
    Inner,
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Outer => "Outer",
            Side::Inner => "Inner",
        })
    }
}

/// The calls a participant receives during a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Prepare,
    Commit,
    Rollback,
    Abort,
    Clean,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Prepare => "Prepare",
            Operation::Commit => "Commit",
            Operation::Rollback => "Rollback",
            Operation::Abort => "Abort",
            Operation::Clean => "Clean",
        })
    }
}

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};
use tandem::{CommitObservers, Error, Participant, Result, Side, TransactionError};
use tokio::time::sleep;

pub use tandem::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub side: Side,
    pub operation: Operation,
}

/// Ordered record of the calls received by a group of `MockParticipant`.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, side: Side, operation: Operation) {
        self.0
            .lock()
            .expect("Journal lock poisoned")
            .push(Call { side, operation });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().expect("Journal lock poisoned").clone()
    }

    pub fn count(&self, side: Side, operation: Operation) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.side == side && c.operation == operation)
            .count()
    }

    /// Index of the first call of `operation` on `side`.
    pub fn position(&self, side: Side, operation: Operation) -> Option<usize> {
        self.calls()
            .iter()
            .position(|c| c.side == side && c.operation == operation)
    }

    /// Calls other than `Clean`, which is expected after every scope.
    pub fn transactional(&self) -> Vec<(Side, Operation)> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation != Operation::Clean)
            .map(|c| (c.side, c.operation))
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().expect("Journal lock poisoned").clear();
    }
}

/// Participant that records every call into a `Journal` and fails on demand.
///
/// It behaves like a real transactional resource: after commit, rollback or abort
/// the transaction is gone and a further rollback reports `TransactionError::Disposed`.
pub struct MockParticipant {
    side: Side,
    journal: Journal,
    failing: HashSet<Operation>,
    panicking: HashSet<Operation>,
    delays: HashMap<Operation, Duration>,
    rollback_disposed: bool,
    open: bool,
    observers: CommitObservers,
}

impl MockParticipant {
    pub fn new(side: Side, journal: &Journal) -> Self {
        Self {
            side,
            journal: journal.clone(),
            failing: Default::default(),
            panicking: Default::default(),
            delays: Default::default(),
            rollback_disposed: false,
            open: false,
            observers: CommitObservers::new(),
        }
    }

    /// Creates an Outer and an Inner participant writing to the same journal.
    pub fn pair(journal: &Journal) -> (Self, Self) {
        (
            Self::new(Side::Outer, journal),
            Self::new(Side::Inner, journal),
        )
    }

    /// Every call of `operation` fails with `TransactionError::Failed`.
    pub fn fail_on(mut self, operation: Operation) -> Self {
        self.failing.insert(operation);
        self
    }

    /// Every call of `operation` panics.
    pub fn panic_on(mut self, operation: Operation) -> Self {
        self.panicking.insert(operation);
        self
    }

    /// Every call of `operation` suspends for `delay` before doing anything.
    pub fn delay_on(mut self, operation: Operation, delay: Duration) -> Self {
        self.delays.insert(operation, delay);
        self
    }

    /// Rollback reports `TransactionError::Disposed` even if the transaction is open.
    pub fn rollback_disposed(mut self) -> Self {
        self.rollback_disposed = true;
        self
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    async fn call(&mut self, operation: Operation) -> Result<()> {
        if let Some(delay) = self.delays.get(&operation) {
            sleep(*delay).await;
        }
        self.journal.push(self.side, operation);
        if self.panicking.contains(&operation) {
            panic!("{} {} panicked", self.side, operation);
        }
        if self.failing.contains(&operation) {
            return Err(Error::msg(format!("Injected {} failure", operation)).context(
                TransactionError::Failed(format!("Failed to {}", operation).into()),
            ));
        }
        Ok(())
    }
}

impl Participant for MockParticipant {
    async fn prepare(&mut self) -> Result<()> {
        self.call(Operation::Prepare).await?;
        self.open = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let was_open = std::mem::replace(&mut self.open, false);
        self.call(Operation::Commit).await?;
        if !was_open {
            return Err(Error::new(TransactionError::Failed(
                "No transaction to commit".into(),
            )));
        }
        self.observers.notify();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let was_open = std::mem::replace(&mut self.open, false);
        self.call(Operation::Rollback).await?;
        if !was_open || self.rollback_disposed {
            return Err(Error::new(TransactionError::Disposed(
                format!("{} transaction", self.side).into(),
            )));
        }
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        self.open = false;
        self.call(Operation::Abort).await
    }

    async fn clean(&mut self) {
        self.open = false;
        let _ = self.call(Operation::Clean).await;
    }

    fn trace_transaction(&self) -> String {
        format!("Transaction mock-{} open={}", self.side, self.open)
    }

    fn commit_observers(&mut self) -> &mut CommitObservers {
        &mut self.observers
    }
}

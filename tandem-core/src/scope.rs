use crate::{ObserverId, Participant, Side, TransactionError};
use futures::FutureExt;
use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::Mutex;

/// Completion flags of a scope, shared with the commit observers and the deadline timer.
#[derive(Debug, Default)]
pub(crate) struct Completion {
    complete: AtomicBool,
    inner: AtomicBool,
    outer: AtomicBool,
    timed_out: AtomicBool,
}

impl Completion {
    pub(crate) fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    pub(crate) fn is_side_complete(&self, side: Side) -> bool {
        self.side(side).load(Ordering::SeqCst)
    }

    pub(crate) fn is_timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    /// Records that `side` reached a terminal state and recomputes the joint flag.
    pub(crate) fn mark(&self, side: Side) {
        self.side(side).store(true, Ordering::SeqCst);
        self.recompute();
    }

    pub(crate) fn set_complete(&self) {
        self.complete.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_timed_out(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
    }

    // Monotonic, a terminal scope never reopens.
    fn recompute(&self) {
        if self.is_side_complete(Side::Inner) && self.is_side_complete(Side::Outer) {
            self.set_complete();
        }
    }

    fn side(&self, side: Side) -> &AtomicBool {
        match side {
            Side::Outer => &self.outer,
            Side::Inner => &self.inner,
        }
    }
}

/// State shared between the manager, its deadline timer and the drop fallback.
pub(crate) struct Scope<P: Participant> {
    pub(crate) outer: Mutex<P>,
    pub(crate) inner: Mutex<P>,
    pub(crate) state: Arc<Completion>,
    subscriptions: [(Side, ObserverId); 2],
    rollback_lock: Mutex<()>,
}

impl<P: Participant> Scope<P> {
    pub(crate) fn new(
        outer: P,
        inner: P,
        state: Arc<Completion>,
        subscriptions: [(Side, ObserverId); 2],
    ) -> Self {
        Self {
            outer: Mutex::new(outer),
            inner: Mutex::new(inner),
            state,
            subscriptions,
            rollback_lock: Mutex::new(()),
        }
    }

    pub(crate) fn participant(&self, side: Side) -> &Mutex<P> {
        match side {
            Side::Outer => &self.outer,
            Side::Inner => &self.inner,
        }
    }

    /// Rolls back every side that did not complete on its own, then ends the scope.
    ///
    /// This is the only critical section of the manager: it can be entered at the
    /// same time by the caller, by a failed commit and by the deadline timer.
    pub(crate) async fn rollback(&self) {
        let _lock = self.rollback_lock.lock().await;
        // Another path might have completed the scope while waiting for the lock
        if self.state.is_complete() {
            return;
        }
        for side in [Side::Inner, Side::Outer] {
            if !self.state.is_side_complete(side) {
                self.rollback_participant(side).await;
            }
        }
        self.state.set_complete();
        log::trace!("Scope rolled back");
    }

    /// Rolls back only `side`, the scope completes once the other side completes as well.
    pub(crate) async fn rollback_side(&self, side: Side) {
        let _lock = self.rollback_lock.lock().await;
        if self.state.is_complete() || self.state.is_side_complete(side) {
            return;
        }
        self.rollback_participant(side).await;
        self.state.mark(side);
    }

    async fn rollback_participant(&self, side: Side) {
        let mut participant = self.participant(side).lock().await;
        // A commit holding the participant might have completed it meanwhile
        if self.state.is_side_complete(side) {
            return;
        }
        if let Err(e) = participant.rollback().await {
            if TransactionError::is_disposed(&e) {
                log::debug!("{} transaction already disposed: {:#}", side, e);
            } else {
                log::debug!("{} rollback failed: {:#}", side, e);
                log::trace!("{}", participant.trace_transaction());
            }
        }
    }

    /// Invoked by the deadline timer.
    pub(crate) async fn on_timeout(&self) {
        self.state.set_timed_out();
        if self.state.is_complete() {
            return;
        }
        let inner = self.inner.lock().await.trace_transaction();
        let outer = self.outer.lock().await.trace_transaction();
        log::warn!("TransactionManager scope timed out!");
        log::warn!("{}", inner);
        log::warn!("{}", outer);
        self.rollback().await;
    }

    /// Rolls back an uncompleted scope, detaches the observers and cleans both participants.
    pub(crate) async fn dispose(&self) {
        if !self.state.is_complete() {
            self.rollback().await;
        }
        for (side, id) in self.subscriptions {
            let mut participant = self.participant(side).lock().await;
            participant.unsubscribe_commit(id);
            if let Err(panic) = AssertUnwindSafe(participant.clean()).catch_unwind().await {
                log::warn!("Clean {} transaction failed: {}", side, panic_message(&*panic));
            }
        }
        self.state.set_complete();
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

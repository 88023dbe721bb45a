use crate::{
    Completion, Error, Participant, Result, Scope, Side, TransactionError, panic_message,
    transaction_failed,
};
use futures::FutureExt;
use std::{
    borrow::Cow,
    panic::{AssertUnwindSafe, resume_unwind},
    sync::Arc,
    time::Duration,
};
use tokio::{
    runtime::Handle,
    sync::MutexGuard,
    task::JoinHandle,
    time::sleep,
};

/// Coordinates two nested transactions over independent resources (two databases,
/// or a database and a message queue).
///
/// The Inner transaction commits first, the Outer one last. If Inner fails to commit
/// Outer is not committed. This is a best effort ordering, not a two phase commit:
/// if the process dies after Inner committed and before Outer did, Inner data will be
/// duplicated on retry, so Inner must be able to recognize duplicates.
///
/// If the scope is not completed it is rolled back on `dispose`, or when the scope
/// timeout expires.
///
/// ```rust,ignore
/// let mut manager = TransactionManager::new(outer, inner).await?;
/// manager.outer().await.put("order:1", "created");
/// manager.inner().await.put("outbox:1", "order created");
/// manager.complete().await?;
/// manager.dispose().await;
/// ```
pub struct TransactionManager<P: Participant> {
    scope: Arc<Scope<P>>,
    scope_timeout: Duration,
    timer: Option<JoinHandle<()>>,
    disposed: bool,
}

impl<P: Participant> TransactionManager<P> {
    /// Prepares `outer` and then `inner`, without a scope timeout.
    pub async fn new(outer: P, inner: P) -> Result<Self> {
        Self::with_timeout(outer, inner, Duration::ZERO).await
    }

    /// Prepares `outer` and then `inner`. If the scope does not complete within
    /// `scope_timeout` both transactions are rolled back. `Duration::ZERO` disables the timer.
    pub async fn with_timeout(mut outer: P, mut inner: P, scope_timeout: Duration) -> Result<Self> {
        // Learn when a participant commits outside of the manager
        let state = Arc::new(Completion::default());
        let subscriptions = [
            (Side::Inner, inner.subscribe_commit(commit_handler(&state, Side::Inner))),
            (Side::Outer, outer.subscribe_commit(commit_handler(&state, Side::Outer))),
        ];
        prepare(&mut outer, &mut inner).await?;
        let scope = Arc::new(Scope::new(outer, inner, state, subscriptions));
        let timer = if !scope_timeout.is_zero() {
            let scope = Arc::downgrade(&scope);
            Some(tokio::spawn(async move {
                sleep(scope_timeout).await;
                if let Some(scope) = scope.upgrade() {
                    scope.on_timeout().await;
                }
            }))
        } else {
            None
        };
        log::trace!("TransactionManager prepared");
        Ok(Self {
            scope,
            scope_timeout,
            timer,
            disposed: false,
        })
    }

    pub fn builder() -> ManagerBuilder<P> {
        ManagerBuilder::default()
    }

    /// Participant committed last.
    pub async fn outer(&self) -> MutexGuard<'_, P> {
        self.scope.outer.lock().await
    }

    /// Participant committed first.
    pub async fn inner(&self) -> MutexGuard<'_, P> {
        self.scope.inner.lock().await
    }

    /// Time after which an uncompleted scope is rolled back, zero when disabled.
    pub fn scope_timeout(&self) -> Duration {
        self.scope_timeout
    }

    pub fn is_complete(&self) -> bool {
        self.scope.state.is_complete()
    }

    pub fn is_inner_complete(&self) -> bool {
        self.scope.state.is_side_complete(Side::Inner)
    }

    pub fn is_outer_complete(&self) -> bool {
        self.scope.state.is_side_complete(Side::Outer)
    }

    pub fn is_timed_out(&self) -> bool {
        self.scope.state.is_timed_out()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Commits Inner and then Outer, completing the scope.
    ///
    /// If one side already committed independently only the other one is committed.
    /// On failure both sides were already rolled back when the error is returned.
    pub async fn complete(&mut self) -> Result<()> {
        self.ensure_not_disposed()?;
        let state = self.scope.state.clone();
        if state.is_complete() {
            return Err(invalid_operation("Transaction already completed"));
        }
        if state.is_timed_out() {
            return Err(invalid_operation("Transaction timed out"));
        }
        if state.is_side_complete(Side::Inner) {
            return self.commit_outer().await;
        }
        if state.is_side_complete(Side::Outer) {
            return self.commit_inner().await;
        }
        if let Err(e) = self.commit().await {
            log::debug!("Complete transaction failed");
            self.scope.rollback().await;
            return Err(transaction_failed(e, "Complete transaction failed"));
        }
        Ok(())
    }

    /// Commits only the Inner transaction.
    pub async fn commit_inner(&mut self) -> Result<()> {
        self.commit_side(Side::Inner).await
    }

    /// Commits only the Outer transaction.
    pub async fn commit_outer(&mut self) -> Result<()> {
        self.commit_side(Side::Outer).await
    }

    /// Rolls back only the Inner transaction. The scope completes once Outer completes too.
    pub async fn rollback_inner(&mut self) {
        self.scope.rollback_side(Side::Inner).await
    }

    /// Rolls back only the Outer transaction. The scope completes once Inner completes too.
    pub async fn rollback_outer(&mut self) {
        self.scope.rollback_side(Side::Outer).await
    }

    /// Rolls back the scope if it is not complete, then cleans both participants.
    ///
    /// Never fails and can be called more than once.
    pub async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let Err(panic) = AssertUnwindSafe(self.scope.dispose()).catch_unwind().await {
            log::warn!("Dispose failed: {}", panic_message(&*panic));
        }
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.disposed = true;
        self.scope.state.set_complete();
        log::trace!("TransactionManager disposed");
    }

    /// Runs `f` over the manager and disposes it afterwards, also when `f` fails or panics.
    pub async fn run<T, F>(mut self, f: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut Self) -> Result<T>,
    {
        let result = AssertUnwindSafe(f(&mut self)).catch_unwind().await;
        self.dispose().await;
        match result {
            Ok(result) => result,
            Err(panic) => resume_unwind(panic),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        for side in [Side::Inner, Side::Outer] {
            let mut participant = self.scope.participant(side).lock().await;
            if let Err(e) = participant.commit().await {
                log::debug!("Commit transaction failed");
                log::trace!("{}", participant.trace_transaction());
                return Err(e.context(TransactionError::Failed(
                    format!("Commit {} transaction failed", side).into(),
                )));
            }
            self.scope.state.mark(side);
        }
        self.scope.state.set_complete();
        Ok(())
    }

    async fn commit_side(&mut self, side: Side) -> Result<()> {
        self.ensure_not_disposed()?;
        let state = self.scope.state.clone();
        if state.is_complete() || state.is_side_complete(side) {
            return Err(invalid_operation(format!(
                "{} transaction already completed",
                side
            )));
        }
        if state.is_timed_out() {
            return Err(invalid_operation("Transaction timed out"));
        }
        let result = {
            let mut participant = self.scope.participant(side).lock().await;
            let result = participant.commit().await;
            if result.is_err() {
                log::trace!("{}", participant.trace_transaction());
            }
            result
        };
        match result {
            Ok(()) => {
                state.mark(side);
                Ok(())
            }
            Err(e) => {
                log::debug!("{} commit transaction failed", side);
                self.scope.rollback().await;
                Err(transaction_failed(
                    e,
                    format!("{} commit transaction failed", side),
                ))
            }
        }
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.disposed {
            let error = Error::new(TransactionError::Disposed("TransactionManager".into()));
            log::error!("{:#}", error);
            return Err(error);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn fire_timeout(&self) {
        self.scope.on_timeout().await
    }
}

impl<P: Participant> Drop for TransactionManager<P> {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let scope = self.scope.clone();
        match Handle::try_current() {
            Ok(handle) => {
                log::debug!("TransactionManager dropped without dispose, disposing in background");
                handle.spawn(async move { scope.dispose().await });
            }
            Err(..) => {
                log::warn!(
                    "TransactionManager dropped without dispose outside of a tokio runtime, \
                    the transactions are left to the participants"
                );
            }
        }
    }
}

/// Builds a `TransactionManager`, reporting missing participants as errors.
pub struct ManagerBuilder<P: Participant> {
    outer: Option<P>,
    inner: Option<P>,
    scope_timeout: Duration,
}

impl<P: Participant> Default for ManagerBuilder<P> {
    fn default() -> Self {
        Self {
            outer: None,
            inner: None,
            scope_timeout: Duration::ZERO,
        }
    }
}

impl<P: Participant> ManagerBuilder<P> {
    pub fn outer(mut self, outer: P) -> Self {
        self.outer = Some(outer);
        self
    }

    pub fn inner(mut self, inner: P) -> Self {
        self.inner = Some(inner);
        self
    }

    pub fn scope_timeout(mut self, scope_timeout: Duration) -> Self {
        self.scope_timeout = scope_timeout;
        self
    }

    pub async fn prepare(self) -> Result<TransactionManager<P>> {
        let (Some(outer), Some(inner)) = (self.outer, self.inner) else {
            let error = Error::new(TransactionError::InvalidArgument(
                "Both the Outer and the Inner participant are required".into(),
            ));
            log::error!("{:#}", error);
            return Err(error);
        };
        TransactionManager::with_timeout(outer, inner, self.scope_timeout).await
    }
}

/// Prepares Outer and then Inner. If either fails both are aborted.
async fn prepare<P: Participant>(outer: &mut P, inner: &mut P) -> Result<()> {
    let failure = match outer.prepare().await {
        Err(e) => Some((Side::Outer, e)),
        Ok(()) => inner.prepare().await.err().map(|e| (Side::Inner, e)),
    };
    let Some((side, e)) = failure else {
        return Ok(());
    };
    log::debug!("Prepare transaction failed");
    log::trace!(
        "{}",
        match side {
            Side::Outer => outer.trace_transaction(),
            Side::Inner => inner.trace_transaction(),
        }
    );
    for (aborting, participant) in [(Side::Inner, inner), (Side::Outer, outer)] {
        if let Err(e) = participant.abort().await {
            log::debug!("Abort {} transaction failed: {:#}", aborting, e);
        }
    }
    Err(transaction_failed(
        e,
        format!("Prepare {} transaction failed", side),
    ))
}

fn commit_handler(state: &Arc<Completion>, side: Side) -> crate::CommitObserver {
    let state = Arc::downgrade(state);
    Arc::new(move || {
        if let Some(state) = state.upgrade() {
            state.mark(side);
        }
    })
}

fn invalid_operation(message: impl Into<Cow<'static, str>>) -> Error {
    let error = Error::new(TransactionError::InvalidOperation(message.into()));
    log::error!("{:#}", error);
    error
}

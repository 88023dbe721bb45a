use crate::Error;
use std::borrow::Cow;
use thiserror::Error;

/// Classification of the failures produced by participants and by the manager.
///
/// The manager attaches one of these as context on top of the participant's own
/// error, the original cause stays reachable through `Error::chain()`:
/// ```rust,ignore
/// if let Err(e) = manager.complete().await {
///     match TransactionError::of(&e) {
///         Some(TransactionError::Failed(..)) => { /* both sides already rolled back */ }
///         Some(TransactionError::InvalidOperation(..)) => { /* misuse */ }
///         _ => {}
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// A participant failed to prepare, commit, roll back or abort.
    #[error("{0}")]
    Failed(Cow<'static, str>),
    /// The resource was already torn down. Tolerated by the manager during rollback.
    #[error("{0} is already disposed")]
    Disposed(Cow<'static, str>),
    /// The operation is not permitted in the current state of the scope.
    #[error("{0}")]
    InvalidOperation(Cow<'static, str>),
    /// A required argument was not supplied.
    #[error("{0}")]
    InvalidArgument(Cow<'static, str>),
}

impl TransactionError {
    /// Finds the outermost `TransactionError` carried by `error`, if any.
    pub fn of(error: &Error) -> Option<&TransactionError> {
        error.downcast_ref::<TransactionError>()
    }

    pub fn is_failed(error: &Error) -> bool {
        matches!(Self::of(error), Some(TransactionError::Failed(..)))
    }

    pub fn is_disposed(error: &Error) -> bool {
        matches!(Self::of(error), Some(TransactionError::Disposed(..)))
    }

    pub fn is_invalid_operation(error: &Error) -> bool {
        matches!(Self::of(error), Some(TransactionError::InvalidOperation(..)))
    }

    pub fn is_invalid_argument(error: &Error) -> bool {
        matches!(Self::of(error), Some(TransactionError::InvalidArgument(..)))
    }
}

/// Wraps `cause` into a `TransactionError::Failed` with the given message and logs it.
pub fn transaction_failed(cause: Error, message: impl Into<Cow<'static, str>>) -> Error {
    let error = cause.context(TransactionError::Failed(message.into()));
    log::error!("{:#}", error);
    error
}

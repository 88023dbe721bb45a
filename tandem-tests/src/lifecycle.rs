use std::time::Duration;
use tandem::{Participant, TransactionError, TransactionManager};
use tokio::time::sleep;

/// Runs the lifecycle scenarios against the participants returned by `participants`.
///
/// Every call must return a fresh, not yet prepared, `(outer, inner)` pair.
pub async fn execute_tests<P, F>(mut participants: F)
where
    P: Participant,
    F: AsyncFnMut() -> (P, P),
{
    let (outer, inner) = participants().await;
    joint_commit(outer, inner).await;
    let (outer, inner) = participants().await;
    split_commit(outer, inner).await;
    let (outer, inner) = participants().await;
    external_commit(outer, inner).await;
    let (outer, inner) = participants().await;
    split_rollback(outer, inner).await;
    let (outer, inner) = participants().await;
    rollback_on_dispose(outer, inner).await;
    let (outer, inner) = participants().await;
    scoped_run(outer, inner).await;
    let (outer, inner) = participants().await;
    scope_deadline(outer, inner).await;
}

pub async fn joint_commit<P: Participant>(outer: P, inner: P) {
    let mut manager = TransactionManager::new(outer, inner)
        .await
        .expect("Could not prepare the transactions");
    assert_eq!(manager.scope_timeout(), Duration::ZERO);
    assert!(!manager.is_complete());
    manager
        .complete()
        .await
        .expect("Could not complete the scope");
    assert!(manager.is_complete());
    assert!(manager.is_inner_complete());
    assert!(manager.is_outer_complete());
    let error = manager
        .complete()
        .await
        .expect_err("Completing twice must fail");
    assert!(TransactionError::is_invalid_operation(&error));
    manager.dispose().await;
    assert!(manager.is_disposed());
}

pub async fn split_commit<P: Participant>(outer: P, inner: P) {
    let mut manager = TransactionManager::new(outer, inner)
        .await
        .expect("Could not prepare the transactions");
    manager
        .commit_inner()
        .await
        .expect("Could not commit the inner transaction");
    assert!(manager.is_inner_complete());
    assert!(!manager.is_complete());
    let error = manager
        .commit_inner()
        .await
        .expect_err("Committing inner twice must fail");
    assert!(TransactionError::is_invalid_operation(&error));
    manager
        .complete()
        .await
        .expect("Could not complete the scope");
    assert!(manager.is_outer_complete());
    assert!(manager.is_complete());
    manager.dispose().await;
}

pub async fn external_commit<P: Participant>(outer: P, inner: P) {
    let mut manager = TransactionManager::new(outer, inner)
        .await
        .expect("Could not prepare the transactions");
    manager
        .outer()
        .await
        .commit()
        .await
        .expect("Could not commit the outer participant directly");
    assert!(manager.is_outer_complete());
    assert!(!manager.is_inner_complete());
    manager
        .complete()
        .await
        .expect("Could not complete the scope");
    assert!(manager.is_complete());
    manager.dispose().await;
}

pub async fn split_rollback<P: Participant>(outer: P, inner: P) {
    let mut manager = TransactionManager::new(outer, inner)
        .await
        .expect("Could not prepare the transactions");
    manager.rollback_outer().await;
    assert!(manager.is_outer_complete());
    assert!(!manager.is_complete());
    manager.rollback_inner().await;
    assert!(manager.is_complete());
    let error = manager
        .complete()
        .await
        .expect_err("A rolled back scope cannot complete");
    assert!(TransactionError::is_invalid_operation(&error));
    manager.dispose().await;
}

pub async fn rollback_on_dispose<P: Participant>(outer: P, inner: P) {
    let mut manager = TransactionManager::new(outer, inner)
        .await
        .expect("Could not prepare the transactions");
    manager.dispose().await;
    assert!(manager.is_complete());
    manager.dispose().await;
    let error = manager
        .complete()
        .await
        .expect_err("A disposed scope cannot complete");
    assert!(TransactionError::is_disposed(&error));
    let error = manager
        .commit_outer()
        .await
        .expect_err("A disposed scope cannot commit");
    assert!(TransactionError::is_disposed(&error));
}

pub async fn scoped_run<P: Participant>(outer: P, inner: P) {
    let manager = TransactionManager::builder()
        .outer(outer)
        .inner(inner)
        .prepare()
        .await
        .expect("Could not prepare the transactions");
    let completed = manager
        .run(async |manager| {
            manager.complete().await?;
            Ok(manager.is_complete())
        })
        .await
        .expect("The scoped run failed");
    assert!(completed);
}

pub async fn scope_deadline<P: Participant>(outer: P, inner: P) {
    let mut manager = TransactionManager::with_timeout(outer, inner, Duration::from_millis(20))
        .await
        .expect("Could not prepare the transactions");
    assert_eq!(manager.scope_timeout(), Duration::from_millis(20));
    for _ in 0..50 {
        if manager.is_complete() {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert!(manager.is_timed_out());
    assert!(manager.is_complete());
    let error = manager
        .complete()
        .await
        .expect_err("A timed out scope cannot complete");
    assert!(TransactionError::is_invalid_operation(&error));
    manager.dispose().await;
}

#[cfg(test)]
mod tests {
    use tandem::{Participant, Side, TransactionError, TransactionManager};
    use tandem_tests::{Journal, MockParticipant, Operation, init_logs, silent_logs};

    async fn prepared(
        outer: MockParticipant,
        inner: MockParticipant,
    ) -> TransactionManager<MockParticipant> {
        TransactionManager::new(outer, inner)
            .await
            .expect("Could not prepare the transactions")
    }

    #[tokio::test]
    async fn complete_commits_inner_before_outer() {
        init_logs();
        let journal = Journal::new();
        let (outer, inner) = MockParticipant::pair(&journal);
        let mut manager = prepared(outer, inner).await;
        journal.clear();
        manager.complete().await.expect("Could not complete");
        assert_eq!(
            journal.transactional(),
            [
                (Side::Inner, Operation::Commit),
                (Side::Outer, Operation::Commit),
            ]
        );
        assert!(manager.is_complete());
        manager.dispose().await;
        assert_eq!(journal.count(Side::Inner, Operation::Rollback), 0);
        assert_eq!(journal.count(Side::Outer, Operation::Rollback), 0);
        assert_eq!(journal.count(Side::Inner, Operation::Clean), 1);
        assert_eq!(journal.count(Side::Outer, Operation::Clean), 1);
    }

    #[tokio::test]
    async fn inner_commit_failure_never_commits_outer() {
        init_logs();
        let journal = Journal::new();
        let outer = MockParticipant::new(Side::Outer, &journal);
        let inner = MockParticipant::new(Side::Inner, &journal).fail_on(Operation::Commit);
        let mut manager = prepared(outer, inner).await;
        silent_logs! {
            let error = manager
                .complete()
                .await
                .expect_err("The inner commit must fail");
            assert!(TransactionError::is_failed(&error));
            let message = format!("{:#}", error);
            assert!(
                message.starts_with("Complete transaction failed: Commit Inner transaction failed")
            );
            assert!(message.ends_with("Injected Commit failure"));
        }
        assert_eq!(journal.count(Side::Outer, Operation::Commit), 0);
        assert_eq!(journal.count(Side::Inner, Operation::Rollback), 1);
        assert_eq!(journal.count(Side::Outer, Operation::Rollback), 1);
        assert!(
            journal.position(Side::Inner, Operation::Rollback)
                < journal.position(Side::Outer, Operation::Rollback)
        );
        assert!(manager.is_complete());
        manager.dispose().await;
        assert_eq!(journal.count(Side::Inner, Operation::Rollback), 1);
        assert_eq!(journal.count(Side::Outer, Operation::Rollback), 1);
    }

    #[tokio::test]
    async fn outer_commit_failure_rolls_back_outer() {
        init_logs();
        let journal = Journal::new();
        let outer = MockParticipant::new(Side::Outer, &journal).fail_on(Operation::Commit);
        let inner = MockParticipant::new(Side::Inner, &journal);
        let mut manager = prepared(outer, inner).await;
        silent_logs! {
            let error = manager
                .complete()
                .await
                .expect_err("The outer commit must fail");
            assert!(TransactionError::is_failed(&error));
            assert!(format!("{:#}", error).contains("Commit Outer transaction failed"));
        }
        // Inner already committed, this is the window of the best effort ordering
        assert!(manager.is_inner_complete());
        assert!(!manager.is_outer_complete());
        assert!(manager.is_complete());
        assert_eq!(journal.count(Side::Inner, Operation::Commit), 1);
        assert_eq!(journal.count(Side::Inner, Operation::Rollback), 0);
        assert_eq!(journal.count(Side::Outer, Operation::Rollback), 1);
        manager.dispose().await;
    }

    #[tokio::test]
    async fn complete_twice_touches_nothing() {
        init_logs();
        let journal = Journal::new();
        let (outer, inner) = MockParticipant::pair(&journal);
        let mut manager = prepared(outer, inner).await;
        manager.complete().await.expect("Could not complete");
        let calls = journal.calls().len();
        silent_logs! {
            let error = manager
                .complete()
                .await
                .expect_err("The second complete must fail");
            assert!(TransactionError::is_invalid_operation(&error));
            assert_eq!(error.to_string(), "Transaction already completed");
        }
        assert_eq!(journal.calls().len(), calls);
        manager.dispose().await;
    }

    #[tokio::test]
    async fn complete_after_commit_inner_commits_only_outer() {
        init_logs();
        let journal = Journal::new();
        let (outer, inner) = MockParticipant::pair(&journal);
        let mut manager = prepared(outer, inner).await;
        manager
            .commit_inner()
            .await
            .expect("Could not commit inner");
        assert!(manager.is_inner_complete());
        assert!(!manager.is_complete());
        manager.complete().await.expect("Could not complete");
        assert_eq!(journal.count(Side::Inner, Operation::Commit), 1);
        assert_eq!(journal.count(Side::Outer, Operation::Commit), 1);
        assert!(manager.is_complete());
        manager.dispose().await;
    }

    #[tokio::test]
    async fn complete_after_commit_outer_commits_only_inner() {
        init_logs();
        let journal = Journal::new();
        let (outer, inner) = MockParticipant::pair(&journal);
        let mut manager = prepared(outer, inner).await;
        manager
            .commit_outer()
            .await
            .expect("Could not commit outer");
        journal.clear();
        manager.complete().await.expect("Could not complete");
        assert_eq!(journal.transactional(), [(Side::Inner, Operation::Commit)]);
        manager.dispose().await;
    }

    #[tokio::test]
    async fn commit_observed_outside_of_the_manager() {
        init_logs();
        let journal = Journal::new();
        let (outer, inner) = MockParticipant::pair(&journal);
        let mut manager = prepared(outer, inner).await;
        manager
            .inner()
            .await
            .commit()
            .await
            .expect("Could not commit the inner participant");
        assert!(manager.is_inner_complete());
        manager.complete().await.expect("Could not complete");
        assert_eq!(journal.count(Side::Inner, Operation::Commit), 1);
        assert_eq!(journal.count(Side::Outer, Operation::Commit), 1);
        manager.dispose().await;
    }

    #[tokio::test]
    async fn both_sides_committed_independently() {
        init_logs();
        let journal = Journal::new();
        let (outer, inner) = MockParticipant::pair(&journal);
        let mut manager = prepared(outer, inner).await;
        manager.commit_inner().await.unwrap();
        manager.commit_outer().await.unwrap();
        assert!(manager.is_complete());
        silent_logs! {
            let error = manager
                .complete()
                .await
                .expect_err("The scope is already complete");
            assert!(TransactionError::is_invalid_operation(&error));
        }
        assert_eq!(journal.count(Side::Inner, Operation::Commit), 1);
        assert_eq!(journal.count(Side::Outer, Operation::Commit), 1);
        manager.dispose().await;
    }

    #[tokio::test]
    async fn partial_commit_failure_rolls_back_everything() {
        init_logs();
        let journal = Journal::new();
        let outer = MockParticipant::new(Side::Outer, &journal).fail_on(Operation::Commit);
        let inner = MockParticipant::new(Side::Inner, &journal);
        let mut manager = prepared(outer, inner).await;
        silent_logs! {
            let error = manager
                .commit_outer()
                .await
                .expect_err("The outer commit must fail");
            assert!(TransactionError::is_failed(&error));
            assert!(format!("{:#}", error).starts_with("Outer commit transaction failed"));
        }
        assert_eq!(journal.count(Side::Inner, Operation::Rollback), 1);
        assert_eq!(journal.count(Side::Outer, Operation::Rollback), 1);
        assert_eq!(journal.count(Side::Inner, Operation::Commit), 0);
        assert!(manager.is_complete());
        silent_logs! {
            let error = manager
                .commit_inner()
                .await
                .expect_err("A rolled back scope cannot commit");
            assert!(TransactionError::is_invalid_operation(&error));
        }
        manager.dispose().await;
    }
}

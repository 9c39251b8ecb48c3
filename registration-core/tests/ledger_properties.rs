//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Uniqueness: one registration per (user, event), however often requested
//! - Token uniqueness: every issued credential is distinct
//! - One-time verification: the first timestamp survives every replay
//! - Flag/timestamp coupling: verified iff a verification date is present

use proptest::prelude::*;
use registration_core::{Config, Error, EventId, Ledger, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Create test ledger with temp directory
async fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    config.credential.module_size = 2; // Small images keep the cases fast

    (Ledger::open(config).await.unwrap(), temp_dir)
}

/// Strategy for (user, event) request sequences with plenty of repeats
fn request_strategy() -> impl Strategy<Value = Vec<(u64, u64)>> {
    prop::collection::vec((1u64..6, 1u64..4), 1..30)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: each distinct pair is registered exactly once
    #[test]
    fn prop_one_registration_per_pair(requests in request_strategy()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger().await;

            let mut seen = HashSet::new();
            for (user, event) in &requests {
                let result = ledger.register(UserId::new(*user), EventId::new(*event)).await;
                if seen.insert((*user, *event)) {
                    prop_assert!(result.is_ok());
                } else {
                    let is_duplicate = matches!(result, Err(Error::DuplicateRegistration { .. }));
                    prop_assert!(is_duplicate);
                }
            }

            let all = ledger.list_all().unwrap();
            prop_assert_eq!(all.len(), seen.len());

            let pairs: HashSet<_> = all
                .iter()
                .map(|r| (r.user_id.get(), r.event_id.get()))
                .collect();
            prop_assert_eq!(pairs, seen);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: all issued tokens are pairwise distinct
    #[test]
    fn prop_tokens_unique(users in 1usize..20) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger().await;

            for user in 0..users {
                ledger.register(UserId::new(user as u64), EventId::new(1)).await.unwrap();
                ledger.register(UserId::new(user as u64), EventId::new(2)).await.unwrap();
            }

            let tokens: HashSet<_> = ledger
                .list_all()
                .unwrap()
                .into_iter()
                .map(|r| r.token)
                .collect();
            prop_assert_eq!(tokens.len(), users * 2);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: verified iff verification date present, after any mix of verifications
    #[test]
    fn prop_flag_timestamp_coupling(
        verify_mask in prop::collection::vec(0u8..3, 1..12)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger().await;

            let mut first_verification = HashMap::new();
            for (i, times) in verify_mask.iter().enumerate() {
                let registration = ledger
                    .register(UserId::new(i as u64), EventId::new(9))
                    .await
                    .unwrap();

                for attempt in 0..*times {
                    let result = ledger.verify(registration.token.as_str()).await;
                    if attempt == 0 {
                        let verified = result.unwrap();
                        first_verification.insert(verified.id, verified.verification_date());
                    } else {
                        let is_replay = matches!(result, Err(Error::AlreadyVerified { .. }));
                        prop_assert!(is_replay);
                    }
                }
            }

            for registration in ledger.list_all().unwrap() {
                prop_assert_eq!(
                    registration.is_verified(),
                    registration.verification_date().is_some()
                );
                if let Some(first) = first_verification.get(&registration.id) {
                    prop_assert_eq!(registration.verification_date(), *first);
                } else {
                    prop_assert!(!registration.is_verified());
                }
            }

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_single_winner() {
        let (ledger, _temp) = create_test_ledger().await;
        let ledger = Arc::new(ledger);

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                ledger.register(UserId::new(1), EventId::new(7)).await
            }));
        }

        let mut successes = 0;
        let mut duplicates = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => successes += 1,
                Err(Error::DuplicateRegistration { .. }) => duplicates += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(duplicates, 15);
        assert_eq!(ledger.list_by_user(UserId::new(1)).unwrap().len(), 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_verification_single_winner() {
        let (ledger, _temp) = create_test_ledger().await;
        let ledger = Arc::new(ledger);

        let registration = ledger
            .register(UserId::new(1), EventId::new(7))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            let token = registration.token.clone();
            tasks.push(tokio::spawn(async move {
                ledger.verify(token.as_str()).await
            }));
        }

        let mut winners = Vec::new();
        let mut replays = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(verified) => winners.push(verified),
                Err(Error::AlreadyVerified { .. }) => replays += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(replays, 15);

        let stored = ledger.get(registration.id).unwrap().unwrap();
        assert_eq!(stored.verification_date(), winners[0].verification_date());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_registrations_survive_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let token = {
            let ledger = Ledger::open(config.clone()).await.unwrap();
            let registration = ledger
                .register(UserId::new(5), EventId::new(5))
                .await
                .unwrap();
            ledger.shutdown().await.unwrap();
            registration.token
        };

        let ledger = Ledger::open(config).await.unwrap();

        let err = ledger
            .register(UserId::new(5), EventId::new(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRegistration { .. }));

        let verified = ledger.verify(token.as_str()).await.unwrap();
        assert!(verified.is_verified());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_by_user_insertion_order() {
        let (ledger, _temp) = create_test_ledger().await;

        for event in [3u64, 1, 2] {
            ledger
                .register(UserId::new(1), EventId::new(event))
                .await
                .unwrap();
        }
        ledger.register(UserId::new(2), EventId::new(1)).await.unwrap();

        let events: Vec<u64> = ledger
            .list_by_user(UserId::new(1))
            .unwrap()
            .iter()
            .map(|r| r.event_id.get())
            .collect();
        assert_eq!(events, vec![3, 1, 2]);
        assert_eq!(ledger.list_all().unwrap().len(), 4);

        ledger.shutdown().await.unwrap();
    }
}

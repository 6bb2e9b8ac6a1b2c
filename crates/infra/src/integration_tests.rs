//! Integration tests for the ledger pipeline.
//!
//! Tests: FamilyRegistry → LedgerEngine → EntityStore → Balance / History
//!
//! Verifies:
//! - Concurrent redemptions can never overdraw a child
//! - Lost optimistic races are retried, then surfaced as `Conflict`
//! - History replays to the balance at every prefix

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use proptest::prelude::*;

    use deedbank_core::{ChildId, DeedId, DeedTypeId, ExpectedVersion, ParentId};
    use deedbank_ledger::{
        Balance, Child, Deed, DeedType, EntryKind, LedgerEntry, Parent, Redemption, StoredEntry,
    };

    use crate::config::LedgerConfig;
    use crate::engine::{LedgerEngine, LedgerError, NewDeed, NewRedemption};
    use crate::family::FamilyRegistry;
    use crate::store::{FamilyStore, InMemoryStore, LedgerSnapshot, LedgerStore, StoreError};

    struct Family<S> {
        engine: Arc<LedgerEngine<S>>,
        parent: Parent,
        child: Child,
        deed_type: DeedType,
    }

    async fn family<S>(store: S, config: LedgerConfig) -> Family<S>
    where
        S: crate::store::EntityStore + Clone,
    {
        let registry = FamilyRegistry::new(store.clone());
        let parent = registry.create_parent("parent@example.com").await.unwrap();
        let child = registry.create_child(parent.id, "Sam", None).await.unwrap();
        let deed_type = registry
            .create_deed_type(parent.id, "Tidy room", 1)
            .await
            .unwrap();
        Family {
            engine: Arc::new(LedgerEngine::with_config(store, config)),
            parent,
            child,
            deed_type,
        }
    }

    impl<S: crate::store::EntityStore> Family<S> {
        async fn deposit(&self, points: i64) {
            self.engine
                .append_deed(NewDeed {
                    child_id: self.child.id,
                    deed_type_id: self.deed_type.id,
                    explicit_points: points,
                    note: None,
                    created_by: self.parent.id,
                })
                .await
                .unwrap();
        }

        fn redemption(&self, points: i64) -> NewRedemption {
            NewRedemption {
                child_id: self.child.id,
                points,
                description: None,
                created_by: self.parent.id,
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn two_concurrent_full_redemptions_only_one_wins() {
        let f = family(Arc::new(InMemoryStore::new()), LedgerConfig::default()).await;
        f.deposit(10).await;

        let a = tokio::spawn({
            let engine = f.engine.clone();
            let req = f.redemption(10);
            async move { engine.append_redemption(req).await }
        });
        let b = tokio::spawn({
            let engine = f.engine.clone();
            let req = f.redemption(10);
            async move { engine.append_redemption(req).await }
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        for result in &results {
            if let Err(e) = result {
                assert!(matches!(
                    e,
                    LedgerError::InsufficientBalance { .. } | LedgerError::Conflict(_)
                ));
            }
        }
        assert_eq!(f.engine.balance(f.child.id).await.unwrap().points, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn many_concurrent_redemptions_never_overdraw() {
        let config = LedgerConfig {
            max_redemption_attempts: 64,
            ..LedgerConfig::default()
        };
        let f = family(Arc::new(InMemoryStore::new()), config).await;
        f.deposit(100).await;

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let engine = f.engine.clone();
                let req = f.redemption(3);
                tokio::spawn(async move { engine.append_redemption(req).await })
            })
            .collect();

        let mut wins = 0i64;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }

        assert!(wins <= 33);
        let balance = f.engine.balance(f.child.id).await.unwrap();
        assert_eq!(balance.points, 100 - 3 * wins);
        assert!(balance.points >= 0);
        assert_eq!(
            f.engine.redemptions(f.child.id).await.unwrap().len() as i64,
            wins
        );
    }

    /// Store that slips a +1 deed in ahead of the caller's versioned appends,
    /// `races` times, so the caller's expected version is always stale. With
    /// `load_deposits` set, it instead commits a deed just before serving a
    /// ledger read, after the caller has already taken its timestamp.
    #[derive(Clone)]
    struct RacingStore {
        inner: Arc<InMemoryStore>,
        races: Arc<AtomicU32>,
        load_deposits: Arc<AtomicU32>,
    }

    impl RacingStore {
        fn new(races: u32) -> Self {
            Self {
                inner: Arc::new(InMemoryStore::new()),
                races: Arc::new(AtomicU32::new(races)),
                load_deposits: Arc::new(AtomicU32::new(0)),
            }
        }

        fn depositing_on_load(loads: u32) -> Self {
            Self {
                load_deposits: Arc::new(AtomicU32::new(loads)),
                ..Self::new(0)
            }
        }

        fn take(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }

        async fn interlope(&self, child_id: ChildId, points: i64) -> Result<(), StoreError> {
            let child = self
                .inner
                .child(child_id)
                .await?
                .ok_or_else(|| StoreError::NotFound("child".to_string()))?;
            let deed_type = self
                .inner
                .deed_types_for_parent(child.parent_id)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| StoreError::NotFound("deed type".to_string()))?;
            let deed = Deed {
                id: DeedId::new(),
                child_id,
                deed_type_id: deed_type.id,
                points,
                note: Some("interloper".to_string()),
                occurred_at: Utc::now(),
                created_by: child.parent_id,
            };
            self.inner
                .append(child_id, LedgerEntry::Deed(deed), ExpectedVersion::Any)
                .await
                .map(|_| ())
        }
    }

    #[async_trait]
    impl FamilyStore for RacingStore {
        async fn insert_parent(&self, parent: Parent) -> Result<Parent, StoreError> {
            self.inner.insert_parent(parent).await
        }
        async fn parent(&self, id: ParentId) -> Result<Option<Parent>, StoreError> {
            self.inner.parent(id).await
        }
        async fn parent_by_email(&self, email: &str) -> Result<Option<Parent>, StoreError> {
            self.inner.parent_by_email(email).await
        }
        async fn insert_child(&self, child: Child) -> Result<Child, StoreError> {
            self.inner.insert_child(child).await
        }
        async fn child(&self, id: ChildId) -> Result<Option<Child>, StoreError> {
            self.inner.child(id).await
        }
        async fn children_for_parent(&self, parent_id: ParentId) -> Result<Vec<Child>, StoreError> {
            self.inner.children_for_parent(parent_id).await
        }
        async fn update_child(&self, child: &Child) -> Result<Option<Child>, StoreError> {
            self.inner.update_child(child).await
        }
        async fn delete_child(&self, id: ChildId) -> Result<bool, StoreError> {
            self.inner.delete_child(id).await
        }
        async fn insert_deed_type(&self, deed_type: DeedType) -> Result<DeedType, StoreError> {
            self.inner.insert_deed_type(deed_type).await
        }
        async fn deed_type(&self, id: DeedTypeId) -> Result<Option<DeedType>, StoreError> {
            self.inner.deed_type(id).await
        }
        async fn deed_type_by_name(
            &self,
            parent_id: ParentId,
            name: &str,
        ) -> Result<Option<DeedType>, StoreError> {
            self.inner.deed_type_by_name(parent_id, name).await
        }
        async fn deed_types_for_parent(
            &self,
            parent_id: ParentId,
        ) -> Result<Vec<DeedType>, StoreError> {
            self.inner.deed_types_for_parent(parent_id).await
        }
        async fn update_deed_type(&self, deed_type: &DeedType) -> Result<Option<DeedType>, StoreError> {
            self.inner.update_deed_type(deed_type).await
        }
        async fn delete_deed_type(&self, id: DeedTypeId) -> Result<bool, StoreError> {
            self.inner.delete_deed_type(id).await
        }
    }

    #[async_trait]
    impl LedgerStore for RacingStore {
        async fn load_ledger(&self, child_id: ChildId) -> Result<Option<LedgerSnapshot>, StoreError> {
            if Self::take(&self.load_deposits) {
                self.interlope(child_id, 5).await?;
            }
            self.inner.load_ledger(child_id).await
        }
        async fn balance(&self, child_id: ChildId) -> Result<Option<Balance>, StoreError> {
            self.inner.balance(child_id).await
        }
        async fn append(
            &self,
            child_id: ChildId,
            entry: LedgerEntry,
            expected_version: ExpectedVersion,
        ) -> Result<StoredEntry, StoreError> {
            if let (ExpectedVersion::Exact(_), LedgerEntry::Redemption(_)) = (&expected_version, &entry) {
                if Self::take(&self.races) {
                    self.interlope(child_id, 1).await?;
                }
            }
            self.inner.append(child_id, entry, expected_version).await
        }
        async fn deeds_for_child(&self, child_id: ChildId) -> Result<Vec<Deed>, StoreError> {
            self.inner.deeds_for_child(child_id).await
        }
        async fn redemptions_for_child(
            &self,
            child_id: ChildId,
        ) -> Result<Vec<Redemption>, StoreError> {
            self.inner.redemptions_for_child(child_id).await
        }
        async fn deed(&self, id: DeedId) -> Result<Option<Deed>, StoreError> {
            self.inner.deed(id).await
        }
        async fn delete_deed(&self, id: DeedId) -> Result<bool, StoreError> {
            self.inner.delete_deed(id).await
        }
    }

    #[tokio::test]
    async fn lost_race_is_retried_against_fresh_ledger() {
        let f = family(RacingStore::new(2), LedgerConfig::default()).await;
        f.deposit(5).await;

        let redemption = f.engine.append_redemption(f.redemption(5)).await.unwrap();
        assert_eq!(redemption.points, 5);

        // Two interloper deeds of +1 landed before the redemption committed.
        let balance = f.engine.balance(f.child.id).await.unwrap();
        assert_eq!(balance.points, 2);

        let snapshot = f.engine.store().load_ledger(f.child.id).await.unwrap().unwrap();
        assert_eq!(snapshot.version, 4);
        assert_eq!(snapshot.entries.last().unwrap().sequence, 4);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_conflict_without_writing() {
        let config = LedgerConfig {
            max_redemption_attempts: 3,
            store_timeout: Duration::from_secs(5),
        };
        let f = family(RacingStore::new(u32::MAX), config).await;
        f.deposit(5).await;

        let err = f.engine.append_redemption(f.redemption(5)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        assert!(f.engine.redemptions(f.child.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deed_committed_during_redemption_read_precedes_it_in_history() {
        let f = family(RacingStore::depositing_on_load(1), LedgerConfig::default()).await;

        // Balance is 0 until the deed lands inside the redemption's ledger read.
        f.engine.append_redemption(f.redemption(5)).await.unwrap();

        let history = f.engine.history(f.child.id).await.unwrap();
        let kinds: Vec<_> = history.iter().map(|row| row.entry_type).collect();
        assert_eq!(kinds, vec![EntryKind::Deed, EntryKind::Redemption]);
        assert_eq!(history.running_points().collect::<Vec<_>>(), vec![5, 0]);
    }

    fn ops() -> impl Strategy<Value = Vec<(bool, i64)>> {
        prop::collection::vec((any::<bool>(), 1i64..50), 1..25)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Property: successful redemptions never leave the balance negative, and
        /// the running sum over history equals the balance replayed step by step.
        #[test]
        fn history_replays_balance_and_never_goes_negative(ops in ops()) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let f = family(Arc::new(InMemoryStore::new()), LedgerConfig::default()).await;
                let mut expected = Vec::new();
                let mut running = 0i64;

                for (is_deed, points) in ops {
                    if is_deed {
                        f.deposit(points).await;
                        running += points;
                        expected.push(running);
                    } else {
                        match f.engine.append_redemption(f.redemption(points)).await {
                            Ok(_) => {
                                running -= points;
                                expected.push(running);
                            }
                            Err(LedgerError::InsufficientBalance { available, .. }) => {
                                assert_eq!(available, running);
                            }
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                    assert!(f.engine.balance(f.child.id).await.unwrap().points >= 0);
                }

                let history = f.engine.history(f.child.id).await.unwrap();
                assert_eq!(history.running_points().collect::<Vec<_>>(), expected);
                assert_eq!(
                    f.engine.balance(f.child.id).await.unwrap().points,
                    expected.last().copied().unwrap_or(0)
                );
            });
        }
    }
}

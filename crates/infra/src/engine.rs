//! Ledger engine: appends deeds and redemptions, derives balances and history.
//!
//! ## Redemption pipeline
//!
//! ```text
//! AppendRedemption
//!   ↓
//! 1. Load the child's ledger (entries + ledger version V)
//!   ↓
//! 2. Rehydrate ChildLedger and decide (balance gate, pure)
//!   ↓
//! 3. Append with ExpectedVersion::Exact(V)   (atomic check-and-write in the store)
//!   ↓
//! 4. Lost race (store Concurrency)? → back to 1, up to max_redemption_attempts
//! ```
//!
//! Deeds skip the version check: they are never balance-gated.
//!
//! Every store call is bounded by `LedgerConfig::store_timeout`. Appends are a
//! single atomic store unit, so a timed-out or dropped future leaves no partial
//! write behind.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use deedbank_core::{
    Aggregate, AggregateRoot, ChildId, DeedId, DeedTypeId, DomainError, ExpectedVersion, ParentId,
    RedemptionId,
};
use deedbank_ledger::{
    history_to_csv, Balance, ChildLedger, Deed, ExportError, History, LedgerCommand, LedgerEntry,
    RecordDeed, RedeemPoints, Redemption,
};

use crate::config::LedgerConfig;
use crate::store::{EntityStore, LedgerSnapshot, StoreError};

/// Errors surfaced to callers of the ledger engine and family registry.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid points: {0}")]
    InvalidPoints(String),

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store operation timed out: {0}")]
    Timeout(String),

    #[error("store failure: {0}")]
    Store(StoreError),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => LedgerError::Validation(msg),
            DomainError::InvalidPoints(msg) => LedgerError::InvalidPoints(msg),
            DomainError::InsufficientBalance {
                requested,
                available,
            } => LedgerError::InsufficientBalance {
                requested,
                available,
            },
            DomainError::InvalidId(msg) => LedgerError::Validation(msg),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => LedgerError::NotFound(what),
            StoreError::Concurrency(msg) => LedgerError::Conflict(msg),
            StoreError::Constraint(msg) => LedgerError::Conflict(msg),
            StoreError::Timeout(msg) => LedgerError::Timeout(msg),
            other @ StoreError::Backend(_) => LedgerError::Store(other),
        }
    }
}

/// Bound a store call by `limit`. Expiry drops the call and reports `Timeout`.
pub(crate) async fn timed<T, F>(limit: Duration, operation: &'static str, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(format!(
            "{operation} exceeded {}ms",
            limit.as_millis()
        ))),
    }
}

/// Ledger timestamps carry microsecond precision, matching what the store keeps.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Input for [`LedgerEngine::append_deed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeed {
    pub child_id: ChildId,
    pub deed_type_id: DeedTypeId,
    /// Overrides the deed type's points when non-zero.
    pub explicit_points: i64,
    pub note: Option<String>,
    pub created_by: ParentId,
}

/// Input for [`LedgerEngine::append_redemption`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRedemption {
    pub child_id: ChildId,
    pub points: i64,
    pub description: Option<String>,
    pub created_by: ParentId,
}

#[derive(Debug, Clone)]
pub struct LedgerEngine<S> {
    store: S,
    config: LedgerConfig,
}

impl<S> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> LedgerConfig {
        self.config
    }
}

impl<S> LedgerEngine<S>
where
    S: EntityStore,
{
    /// Record a deed. Never balance-gated; negative deeds are accepted as-is.
    #[instrument(
        skip(self, deed),
        fields(child_id = %deed.child_id, deed_type_id = %deed.deed_type_id),
        err
    )]
    pub async fn append_deed(&self, deed: NewDeed) -> Result<Deed, LedgerError> {
        let deed_type = self
            .timed("deed_type", self.store.deed_type(deed.deed_type_id))
            .await?
            .ok_or_else(|| LedgerError::NotFound("deed type".to_string()))?;
        let snapshot = self.load(deed.child_id).await?;
        let ledger = ChildLedger::rehydrate(deed.child_id, snapshot.version, &snapshot.entries);

        let command = LedgerCommand::RecordDeed(RecordDeed {
            deed_id: DeedId::new(),
            child_id: deed.child_id,
            deed_type_id: deed.deed_type_id,
            deed_type_points: deed_type.points,
            explicit_points: deed.explicit_points,
            note: deed.note,
            created_by: deed.created_by,
            occurred_at: now(),
        });
        let entry = single_entry(ledger.handle(&command)?)?;

        let stored = self
            .timed(
                "append",
                self.store.append(deed.child_id, entry, ExpectedVersion::Any),
            )
            .await?;

        match stored.entry {
            LedgerEntry::Deed(recorded) => {
                debug!(
                    deed_id = %recorded.id,
                    points = recorded.points,
                    sequence = stored.sequence,
                    "deed recorded"
                );
                Ok(recorded)
            }
            LedgerEntry::Redemption(_) => Err(unexpected_entry("deed")),
        }
    }

    /// Redeem points, serialized per child through the ledger version.
    ///
    /// Fails with `InsufficientBalance` (no write) when the balance is short,
    /// and with `Conflict` when every attempt lost a race to another writer.
    #[instrument(skip(self, redemption), fields(child_id = %redemption.child_id, points = redemption.points), err)]
    pub async fn append_redemption(
        &self,
        redemption: NewRedemption,
    ) -> Result<Redemption, LedgerError> {
        if redemption.points <= 0 {
            return Err(LedgerError::InvalidPoints(
                "points must be greater than zero".to_string(),
            ));
        }

        let redemption_id = RedemptionId::new();
        let attempts = self.config.max_redemption_attempts.max(1);

        for attempt in 1..=attempts {
            let command = LedgerCommand::RedeemPoints(RedeemPoints {
                redemption_id,
                child_id: redemption.child_id,
                points: redemption.points,
                description: redemption.description.clone(),
                created_by: redemption.created_by,
                created_at: now(),
            });
            let snapshot = self.load(redemption.child_id).await?;
            let ledger =
                ChildLedger::rehydrate(redemption.child_id, snapshot.version, &snapshot.entries);

            let entry = match ledger.handle(&command) {
                Ok(entries) => single_entry(entries)?,
                Err(DomainError::InsufficientBalance {
                    requested,
                    available,
                }) => {
                    info!(requested, available, "redemption rejected: insufficient balance");
                    return Err(LedgerError::InsufficientBalance {
                        requested,
                        available,
                    });
                }
                Err(e) => return Err(e.into()),
            };

            let expected = ExpectedVersion::Exact(ledger.version());
            match self
                .timed("append", self.store.append(redemption.child_id, entry, expected))
                .await
            {
                Ok(stored) => {
                    return match stored.entry {
                        LedgerEntry::Redemption(recorded) => {
                            debug!(
                                redemption_id = %recorded.id,
                                sequence = stored.sequence,
                                attempt,
                                "redemption recorded"
                            );
                            Ok(recorded)
                        }
                        LedgerEntry::Deed(_) => Err(unexpected_entry("redemption")),
                    };
                }
                Err(StoreError::Concurrency(msg)) => {
                    warn!(attempt, attempts, error = %msg, "redemption lost a ledger race; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(attempts, "redemption retries exhausted");
        Err(LedgerError::Conflict(format!(
            "ledger for child {} kept changing after {attempts} attempts",
            redemption.child_id
        )))
    }

    /// Derived balance at the child's current rate. Unknown child → `NotFound`.
    #[instrument(skip(self), fields(child_id = %child_id), err)]
    pub async fn balance(&self, child_id: ChildId) -> Result<Balance, LedgerError> {
        self.timed("balance", self.store.balance(child_id))
            .await?
            .ok_or_else(|| LedgerError::NotFound("child".to_string()))
    }

    /// Deeds and redemptions merged in `(occurred_at, sequence)` order.
    #[instrument(skip(self), fields(child_id = %child_id), err)]
    pub async fn history(&self, child_id: ChildId) -> Result<History, LedgerError> {
        let snapshot = self.load(child_id).await?;
        Ok(History::new(
            snapshot.child.id,
            snapshot.child.dollar_per_point,
            snapshot.entries,
        ))
    }

    pub async fn export_history_csv(&self, child_id: ChildId) -> Result<String, LedgerError> {
        let history = self.history(child_id).await?;
        Ok(history_to_csv(&history)?)
    }

    /// Newest first.
    pub async fn deeds(&self, child_id: ChildId) -> Result<Vec<Deed>, LedgerError> {
        self.ensure_child(child_id).await?;
        Ok(self
            .timed("deeds_for_child", self.store.deeds_for_child(child_id))
            .await?)
    }

    /// Newest first.
    pub async fn redemptions(&self, child_id: ChildId) -> Result<Vec<Redemption>, LedgerError> {
        self.ensure_child(child_id).await?;
        Ok(self
            .timed(
                "redemptions_for_child",
                self.store.redemptions_for_child(child_id),
            )
            .await?)
    }

    /// Remove a deed as an administrative correction.
    ///
    /// The deed must belong to one of `parent_id`'s children. The balance
    /// invariant is not re-checked; the ledger version is bumped so in-flight
    /// redemptions re-read.
    #[instrument(skip(self), fields(parent_id = %parent_id, deed_id = %deed_id), err)]
    pub async fn delete_deed(&self, parent_id: ParentId, deed_id: DeedId) -> Result<(), LedgerError> {
        let deed = self
            .timed("deed", self.store.deed(deed_id))
            .await?
            .ok_or_else(|| LedgerError::NotFound("deed".to_string()))?;
        let child = self
            .timed("child", self.store.child(deed.child_id))
            .await?
            .ok_or_else(|| LedgerError::NotFound("child".to_string()))?;
        if !child.is_owned_by(parent_id) {
            return Err(LedgerError::Forbidden(
                "deed belongs to another parent's child".to_string(),
            ));
        }

        if !self.timed("delete_deed", self.store.delete_deed(deed_id)).await? {
            return Err(LedgerError::NotFound("deed".to_string()));
        }
        debug!(child_id = %child.id, points = deed.points, "deed deleted");
        Ok(())
    }

    async fn load(&self, child_id: ChildId) -> Result<LedgerSnapshot, LedgerError> {
        self.timed("load_ledger", self.store.load_ledger(child_id))
            .await?
            .ok_or_else(|| LedgerError::NotFound("child".to_string()))
    }

    async fn ensure_child(&self, child_id: ChildId) -> Result<(), LedgerError> {
        match self.timed("child", self.store.child(child_id)).await? {
            Some(_) => Ok(()),
            None => Err(LedgerError::NotFound("child".to_string())),
        }
    }

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        timed(self.config.store_timeout, operation, fut).await
    }
}

fn single_entry(entries: Vec<LedgerEntry>) -> Result<LedgerEntry, LedgerError> {
    let mut entries = entries.into_iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(LedgerError::Store(StoreError::Backend(
            "ledger decision must produce exactly one entry".to_string(),
        ))),
    }
}

fn unexpected_entry(expected: &str) -> LedgerError {
    LedgerError::Store(StoreError::Backend(format!(
        "store returned a different entry kind than the appended {expected}"
    )))
}

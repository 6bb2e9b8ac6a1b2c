use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use deedbank_core::{
    Aggregate, AggregateRoot, ChildId, DeedId, DeedTypeId, DomainError, ParentId, RedemptionId,
};

use crate::entry::{Deed, LedgerEntry, Redemption, StoredEntry};
use crate::family::normalize_text;

/// Aggregate root: one child's points ledger.
///
/// Holds no entries, only the running points total and the ledger version it
/// was rehydrated at. Balances are always re-derived from the stored entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildLedger {
    child_id: ChildId,
    version: u64,
    points: i64,
}

impl ChildLedger {
    /// Empty aggregate for rehydration.
    pub fn empty(child_id: ChildId) -> Self {
        Self {
            child_id,
            version: 0,
            points: 0,
        }
    }

    /// Rebuild state from stored entries at the given store version.
    ///
    /// The store version can run ahead of the entry count (deletions bump it too).
    pub fn rehydrate(child_id: ChildId, version: u64, entries: &[StoredEntry]) -> Self {
        let mut ledger = Self::empty(child_id);
        for stored in entries {
            ledger.apply(&stored.entry);
        }
        ledger.version = version;
        ledger
    }

    pub fn child_id(&self) -> ChildId {
        self.child_id
    }

    /// Current points balance.
    pub fn points(&self) -> i64 {
        self.points
    }
}

impl AggregateRoot for ChildLedger {
    type Id = ChildId;

    fn id(&self) -> &Self::Id {
        &self.child_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: record a deed. Points resolve to `explicit_points` unless it is zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDeed {
    pub deed_id: DeedId,
    pub child_id: ChildId,
    pub deed_type_id: DeedTypeId,
    pub deed_type_points: i64,
    pub explicit_points: i64,
    pub note: Option<String>,
    pub created_by: ParentId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: redeem points against the current balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemPoints {
    pub redemption_id: RedemptionId,
    pub child_id: ChildId,
    pub points: i64,
    pub description: Option<String>,
    pub created_by: ParentId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    RecordDeed(RecordDeed),
    RedeemPoints(RedeemPoints),
}

/// Resolve a deed's effective points: the override when non-zero, else the type's value.
pub fn resolve_points(explicit_points: i64, deed_type_points: i64) -> Result<i64, DomainError> {
    let points = if explicit_points != 0 {
        explicit_points
    } else {
        deed_type_points
    };
    if points == 0 {
        return Err(DomainError::invalid_points(
            "points must resolve to a non-zero value",
        ));
    }
    Ok(points)
}

impl Aggregate for ChildLedger {
    type Command = LedgerCommand;
    type Event = LedgerEntry;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        self.points = self.points.saturating_add(event.signed_points());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::RecordDeed(cmd) => self.handle_deed(cmd),
            LedgerCommand::RedeemPoints(cmd) => self.handle_redeem(cmd),
        }
    }
}

impl ChildLedger {
    fn ensure_child(&self, child_id: ChildId) -> Result<(), DomainError> {
        if child_id != self.child_id {
            return Err(DomainError::validation("command targets a different child"));
        }
        Ok(())
    }

    fn handle_deed(&self, cmd: &RecordDeed) -> Result<Vec<LedgerEntry>, DomainError> {
        self.ensure_child(cmd.child_id)?;
        let points = resolve_points(cmd.explicit_points, cmd.deed_type_points)?;
        if self.points.checked_add(points).is_none() {
            return Err(DomainError::invalid_points("points total out of range"));
        }

        // Deeds are never balance-gated, including negative ones.
        Ok(vec![LedgerEntry::Deed(Deed {
            id: cmd.deed_id,
            child_id: cmd.child_id,
            deed_type_id: cmd.deed_type_id,
            points,
            note: normalize_text(cmd.note.as_deref()),
            occurred_at: cmd.occurred_at,
            created_by: cmd.created_by,
        })])
    }

    fn handle_redeem(&self, cmd: &RedeemPoints) -> Result<Vec<LedgerEntry>, DomainError> {
        self.ensure_child(cmd.child_id)?;
        if cmd.points <= 0 {
            return Err(DomainError::invalid_points(
                "points must be greater than zero",
            ));
        }
        if self.points < cmd.points {
            return Err(DomainError::insufficient_balance(cmd.points, self.points));
        }

        Ok(vec![LedgerEntry::Redemption(Redemption {
            id: cmd.redemption_id,
            child_id: cmd.child_id,
            points: cmd.points,
            description: normalize_text(cmd.description.as_deref()),
            created_at: cmd.created_at,
            created_by: cmd.created_by,
        })])
    }
}

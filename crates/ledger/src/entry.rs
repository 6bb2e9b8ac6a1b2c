//! Ledger entries: the append-only credit/debit facts a balance is derived from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use deedbank_core::{ChildId, DeedId, DeedTypeId, ParentId, RedemptionId};

/// A logged occurrence of a deed type for a child. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deed {
    pub id: DeedId,
    pub child_id: ChildId,
    pub deed_type_id: DeedTypeId,
    /// Signed, never zero. Negative for "bad deeds".
    pub points: i64,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub created_by: ParentId,
}

/// Points exchanged by a child. Always a debit; `points` is strictly positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub id: RedemptionId,
    pub child_id: ChildId,
    pub points: i64,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: ParentId,
}

/// Discriminant of a [`LedgerEntry`], rendered as `deed` / `redemption`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Deed,
    Redemption,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deed => "deed",
            EntryKind::Redemption => "redemption",
        }
    }
}

impl core::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One credit or debit on a child's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entry_type", rename_all = "lowercase")]
pub enum LedgerEntry {
    Deed(Deed),
    Redemption(Redemption),
}

impl LedgerEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            LedgerEntry::Deed(_) => EntryKind::Deed,
            LedgerEntry::Redemption(_) => EntryKind::Redemption,
        }
    }

    pub fn child_id(&self) -> ChildId {
        match self {
            LedgerEntry::Deed(d) => d.child_id,
            LedgerEntry::Redemption(r) => r.child_id,
        }
    }

    /// Contribution of this entry to the balance: deeds as-is, redemptions negated.
    pub fn signed_points(&self) -> i64 {
        match self {
            LedgerEntry::Deed(d) => d.points,
            LedgerEntry::Redemption(r) => -r.points,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEntry::Deed(d) => d.occurred_at,
            LedgerEntry::Redemption(r) => r.created_at,
        }
    }

    /// Move the timestamp forward to `floor` if it is earlier.
    ///
    /// Stores call this while holding the child's ledger lock, with the latest
    /// timestamp already on the ledger, so timestamp order matches commit order.
    pub fn not_before(&mut self, floor: DateTime<Utc>) {
        let at = match self {
            LedgerEntry::Deed(d) => &mut d.occurred_at,
            LedgerEntry::Redemption(r) => &mut r.created_at,
        };
        if *at < floor {
            *at = floor;
        }
    }

    /// Deed note or redemption description.
    pub fn note(&self) -> Option<&str> {
        match self {
            LedgerEntry::Deed(d) => d.note.as_deref(),
            LedgerEntry::Redemption(r) => r.description.as_deref(),
        }
    }

    pub fn recorded_by(&self) -> ParentId {
        match self {
            LedgerEntry::Deed(d) => d.created_by,
            LedgerEntry::Redemption(r) => r.created_by,
        }
    }
}

impl From<Deed> for LedgerEntry {
    fn from(value: Deed) -> Self {
        LedgerEntry::Deed(value)
    }
}

impl From<Redemption> for LedgerEntry {
    fn from(value: Redemption) -> Self {
        LedgerEntry::Redemption(value)
    }
}

/// A ledger entry as persisted, with its store-assigned position.
///
/// `sequence` is strictly increasing per child and breaks ties between entries
/// that share a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub sequence: u64,
    pub entry: LedgerEntry,
}

impl StoredEntry {
    pub fn new(sequence: u64, entry: impl Into<LedgerEntry>) -> Self {
        Self {
            sequence,
            entry: entry.into(),
        }
    }

    /// Chronological ordering key used by history reconstruction.
    pub fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.entry.occurred_at(), self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redemption(points: i64) -> Redemption {
        Redemption {
            id: RedemptionId::new(),
            child_id: ChildId::new(),
            points,
            description: Some("ice cream".to_string()),
            created_at: Utc::now(),
            created_by: ParentId::new(),
        }
    }

    #[test]
    fn redemption_contributes_negated_points() {
        let entry = LedgerEntry::from(redemption(7));
        assert_eq!(entry.kind(), EntryKind::Redemption);
        assert_eq!(entry.signed_points(), -7);
        assert_eq!(entry.note(), Some("ice cream"));
    }

    #[test]
    fn not_before_only_moves_timestamps_forward() {
        let original = redemption(1);
        let earlier = original.created_at - chrono::Duration::seconds(5);
        let later = original.created_at + chrono::Duration::seconds(5);

        let mut entry = LedgerEntry::from(original.clone());
        entry.not_before(earlier);
        assert_eq!(entry.occurred_at(), original.created_at);

        entry.not_before(later);
        assert_eq!(entry.occurred_at(), later);
    }

    #[test]
    fn kind_renders_lowercase() {
        assert_eq!(EntryKind::Deed.to_string(), "deed");
        assert_eq!(EntryKind::Redemption.as_str(), "redemption");
    }
}

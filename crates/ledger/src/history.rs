//! Chronological reconstruction of a child's ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use deedbank_core::{ChildId, ParentId};

use crate::entry::{EntryKind, StoredEntry};
use crate::family::DollarRate;

/// One row of a child's history.
///
/// `points` and `dollar_value` are signed contributions, so a running sum over
/// the rows reproduces the balance at every prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub entry_type: EntryKind,
    pub points: i64,
    pub dollar_value: Decimal,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub recorded_by: ParentId,
}

impl HistoryEntry {
    fn project(stored: &StoredEntry, rate: DollarRate) -> Self {
        let points = stored.entry.signed_points();
        Self {
            entry_type: stored.entry.kind(),
            points,
            dollar_value: rate.dollars_for(points),
            note: stored.entry.note().map(str::to_string),
            occurred_at: stored.entry.occurred_at(),
            recorded_by: stored.entry.recorded_by(),
        }
    }
}

/// Deeds and redemptions of one child merged into a single ordered sequence.
///
/// Ordered by `(occurred_at, sequence)`. Rows are projected lazily on each
/// iteration, so the same `History` can be walked any number of times.
#[derive(Debug, Clone)]
pub struct History {
    child_id: ChildId,
    rate: DollarRate,
    entries: Vec<StoredEntry>,
}

impl History {
    pub fn new(child_id: ChildId, rate: DollarRate, mut entries: Vec<StoredEntry>) -> Self {
        entries.sort_by_key(StoredEntry::order_key);
        Self {
            child_id,
            rate,
            entries,
        }
    }

    pub fn child_id(&self) -> ChildId {
        self.child_id
    }

    pub fn rate(&self) -> DollarRate {
        self.rate
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> HistoryIter<'_> {
        HistoryIter {
            inner: self.entries.iter(),
            rate: self.rate,
        }
    }

    /// Cumulative points after each row.
    pub fn running_points(&self) -> impl Iterator<Item = i64> + '_ {
        self.iter().scan(0i64, |acc, row| {
            *acc = acc.saturating_add(row.points);
            Some(*acc)
        })
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = HistoryEntry;
    type IntoIter = HistoryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over [`HistoryEntry`] rows of a [`History`].
#[derive(Debug, Clone)]
pub struct HistoryIter<'a> {
    inner: core::slice::Iter<'a, StoredEntry>,
    rate: DollarRate,
}

impl Iterator for HistoryIter<'_> {
    type Item = HistoryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|stored| HistoryEntry::project(stored, self.rate))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for HistoryIter<'_> {}

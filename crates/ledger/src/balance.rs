use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use deedbank_core::{ChildId, DomainError, DomainResult};

use crate::entry::LedgerEntry;
use crate::family::DollarRate;

/// A child's derived balance, valued at the child's current rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub child_id: ChildId,
    pub points: i64,
    pub dollars: Decimal,
}

impl Balance {
    pub fn at_rate(child_id: ChildId, points: i64, rate: DollarRate) -> Self {
        Self {
            child_id,
            points,
            dollars: rate.dollars_for(points),
        }
    }

    /// Explicit zero for a child that has no entries yet.
    pub fn zero(child_id: ChildId) -> Self {
        Self {
            child_id,
            points: 0,
            dollars: Decimal::ZERO,
        }
    }

    /// Σ deed points − Σ redemption points, valued at `rate`.
    pub fn from_entries<'a>(
        child_id: ChildId,
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
        rate: DollarRate,
    ) -> DomainResult<Self> {
        let total: i128 = entries
            .into_iter()
            .map(|e| i128::from(e.signed_points()))
            .sum();
        let points = i64::try_from(total)
            .map_err(|_| DomainError::invalid_points("balance out of range"))?;
        Ok(Self::at_rate(child_id, points, rate))
    }
}

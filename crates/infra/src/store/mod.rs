//! Entity Store boundary.
//!
//! Durable records for parents, children, deed types and the append-only
//! deed/redemption ledger. Two traits split the surface the way callers use it:
//!
//! - [`FamilyStore`]: mutable CRUD records (parents, children, deed types)
//! - [`LedgerStore`]: per-child ledger reads and versioned appends
//!
//! ## Ledger versions
//!
//! Every child carries a ledger version. Each append and each deed deletion
//! bumps it by one, and the new version becomes the appended entry's
//! `sequence`. `append` with `ExpectedVersion::Exact(v)` is a single atomic
//! conditional write: it fails with [`StoreError::Concurrency`] when the
//! ledger moved past `v`, and writes nothing in that case.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use deedbank_core::{ChildId, DeedId, DeedTypeId, ExpectedVersion, ParentId};
use deedbank_ledger::{Balance, Child, Deed, DeedType, LedgerEntry, Parent, Redemption, StoredEntry};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Entity store operation error.
///
/// These are **infrastructure errors** (missing rows, lost races, constraint
/// violations, backend failures) as opposed to domain errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("concurrent ledger update: {0}")]
    Concurrency(String),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("store operation timed out: {0}")]
    Timeout(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Point-in-time view of one child's ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub child: Child,
    /// Ledger version the entries were read at.
    pub version: u64,
    /// All entries, in sequence order.
    pub entries: Vec<StoredEntry>,
}

/// CRUD surface for parents, children and deed types.
///
/// Updates return `None` when the record is gone; deletes return whether a
/// row was removed.
#[async_trait]
pub trait FamilyStore: Send + Sync {
    /// Fails with `Constraint` when the email is already registered.
    async fn insert_parent(&self, parent: Parent) -> Result<Parent, StoreError>;
    async fn parent(&self, id: ParentId) -> Result<Option<Parent>, StoreError>;
    async fn parent_by_email(&self, email: &str) -> Result<Option<Parent>, StoreError>;

    /// Fails with `NotFound` when the parent does not exist.
    async fn insert_child(&self, child: Child) -> Result<Child, StoreError>;
    async fn child(&self, id: ChildId) -> Result<Option<Child>, StoreError>;
    /// Ordered by creation time.
    async fn children_for_parent(&self, parent_id: ParentId) -> Result<Vec<Child>, StoreError>;
    /// Persists `name` and `dollar_per_point`.
    async fn update_child(&self, child: &Child) -> Result<Option<Child>, StoreError>;
    /// Removes the child together with its deeds and redemptions.
    async fn delete_child(&self, id: ChildId) -> Result<bool, StoreError>;

    /// Fails with `Constraint` on a case-insensitive name clash within the parent.
    async fn insert_deed_type(&self, deed_type: DeedType) -> Result<DeedType, StoreError>;
    async fn deed_type(&self, id: DeedTypeId) -> Result<Option<DeedType>, StoreError>;
    async fn deed_type_by_name(
        &self,
        parent_id: ParentId,
        name: &str,
    ) -> Result<Option<DeedType>, StoreError>;
    /// Ordered by creation time.
    async fn deed_types_for_parent(&self, parent_id: ParentId)
    -> Result<Vec<DeedType>, StoreError>;
    /// Persists `name`, `points` and `active`.
    async fn update_deed_type(&self, deed_type: &DeedType) -> Result<Option<DeedType>, StoreError>;
    /// Fails with `Constraint` while deeds still reference the type.
    async fn delete_deed_type(&self, id: DeedTypeId) -> Result<bool, StoreError>;
}

/// Per-child ledger surface.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Child, ledger version and every entry, read consistently. `None` if the child is absent.
    async fn load_ledger(&self, child_id: ChildId) -> Result<Option<LedgerSnapshot>, StoreError>;

    /// Aggregated balance at the child's current rate. `None` if the child is absent.
    async fn balance(&self, child_id: ChildId) -> Result<Option<Balance>, StoreError>;

    /// Append one entry, bumping the ledger version (see module docs).
    ///
    /// An entry timestamped earlier than the newest entry already on the ledger
    /// is moved forward to that time, so `(occurred_at, sequence)` order is
    /// commit order.
    async fn append(
        &self,
        child_id: ChildId,
        entry: LedgerEntry,
        expected_version: ExpectedVersion,
    ) -> Result<StoredEntry, StoreError>;

    /// Newest first.
    async fn deeds_for_child(&self, child_id: ChildId) -> Result<Vec<Deed>, StoreError>;
    /// Newest first.
    async fn redemptions_for_child(&self, child_id: ChildId)
    -> Result<Vec<Redemption>, StoreError>;

    async fn deed(&self, id: DeedId) -> Result<Option<Deed>, StoreError>;
    /// Administrative correction; bumps the owning child's ledger version.
    async fn delete_deed(&self, id: DeedId) -> Result<bool, StoreError>;
}

/// Both halves of the entity store, usable as one trait object.
pub trait EntityStore: FamilyStore + LedgerStore {}

impl<T> EntityStore for T where T: FamilyStore + LedgerStore + ?Sized {}

#[async_trait]
impl<S> FamilyStore for Arc<S>
where
    S: FamilyStore + ?Sized,
{
    async fn insert_parent(&self, parent: Parent) -> Result<Parent, StoreError> {
        (**self).insert_parent(parent).await
    }

    async fn parent(&self, id: ParentId) -> Result<Option<Parent>, StoreError> {
        (**self).parent(id).await
    }

    async fn parent_by_email(&self, email: &str) -> Result<Option<Parent>, StoreError> {
        (**self).parent_by_email(email).await
    }

    async fn insert_child(&self, child: Child) -> Result<Child, StoreError> {
        (**self).insert_child(child).await
    }

    async fn child(&self, id: ChildId) -> Result<Option<Child>, StoreError> {
        (**self).child(id).await
    }

    async fn children_for_parent(&self, parent_id: ParentId) -> Result<Vec<Child>, StoreError> {
        (**self).children_for_parent(parent_id).await
    }

    async fn update_child(&self, child: &Child) -> Result<Option<Child>, StoreError> {
        (**self).update_child(child).await
    }

    async fn delete_child(&self, id: ChildId) -> Result<bool, StoreError> {
        (**self).delete_child(id).await
    }

    async fn insert_deed_type(&self, deed_type: DeedType) -> Result<DeedType, StoreError> {
        (**self).insert_deed_type(deed_type).await
    }

    async fn deed_type(&self, id: DeedTypeId) -> Result<Option<DeedType>, StoreError> {
        (**self).deed_type(id).await
    }

    async fn deed_type_by_name(
        &self,
        parent_id: ParentId,
        name: &str,
    ) -> Result<Option<DeedType>, StoreError> {
        (**self).deed_type_by_name(parent_id, name).await
    }

    async fn deed_types_for_parent(
        &self,
        parent_id: ParentId,
    ) -> Result<Vec<DeedType>, StoreError> {
        (**self).deed_types_for_parent(parent_id).await
    }

    async fn update_deed_type(&self, deed_type: &DeedType) -> Result<Option<DeedType>, StoreError> {
        (**self).update_deed_type(deed_type).await
    }

    async fn delete_deed_type(&self, id: DeedTypeId) -> Result<bool, StoreError> {
        (**self).delete_deed_type(id).await
    }
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn load_ledger(&self, child_id: ChildId) -> Result<Option<LedgerSnapshot>, StoreError> {
        (**self).load_ledger(child_id).await
    }

    async fn balance(&self, child_id: ChildId) -> Result<Option<Balance>, StoreError> {
        (**self).balance(child_id).await
    }

    async fn append(
        &self,
        child_id: ChildId,
        entry: LedgerEntry,
        expected_version: ExpectedVersion,
    ) -> Result<StoredEntry, StoreError> {
        (**self).append(child_id, entry, expected_version).await
    }

    async fn deeds_for_child(&self, child_id: ChildId) -> Result<Vec<Deed>, StoreError> {
        (**self).deeds_for_child(child_id).await
    }

    async fn redemptions_for_child(
        &self,
        child_id: ChildId,
    ) -> Result<Vec<Redemption>, StoreError> {
        (**self).redemptions_for_child(child_id).await
    }

    async fn deed(&self, id: DeedId) -> Result<Option<Deed>, StoreError> {
        (**self).deed(id).await
    }

    async fn delete_deed(&self, id: DeedId) -> Result<bool, StoreError> {
        (**self).delete_deed(id).await
    }
}

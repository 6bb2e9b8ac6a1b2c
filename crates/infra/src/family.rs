//! Family registry: parents, children and deed types, plus the ownership
//! checks the request layer runs before touching a ledger.

use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, instrument};

use deedbank_core::{ChildId, DeedTypeId, ParentId};
use deedbank_ledger::family::{ensure_non_zero, normalize_email, normalize_name};
use deedbank_ledger::{Child, DeedType, DollarRate, Parent};

use crate::config::DEFAULT_STORE_TIMEOUT;
use crate::engine::{now, timed, LedgerError};
use crate::store::EntityStore;

/// Replacement values for [`FamilyRegistry::update_child`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildUpdate {
    /// When set, must match the child's parent.
    pub expected_parent_id: Option<ParentId>,
    pub name: String,
    /// `None` keeps the current rate.
    pub dollar_per_point: Option<Decimal>,
}

/// Replacement values for [`FamilyRegistry::update_deed_type`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeedTypeUpdate {
    pub expected_parent_id: Option<ParentId>,
    pub name: String,
    pub points: i64,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct FamilyRegistry<S> {
    store: S,
    default_rate: DollarRate,
    store_timeout: Duration,
}

impl<S> FamilyRegistry<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            default_rate: DollarRate::one(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Rate given to children created without one.
    pub fn with_default_rate(mut self, rate: DollarRate) -> Self {
        self.default_rate = rate;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn default_rate(&self) -> DollarRate {
        self.default_rate
    }
}

impl<S> FamilyRegistry<S>
where
    S: EntityStore,
{
    #[instrument(skip(self, email), err)]
    pub async fn create_parent(&self, email: &str) -> Result<Parent, LedgerError> {
        let parent = Parent::register(email, now())?;
        if self
            .timed(self.store.parent_by_email(&parent.email))
            .await?
            .is_some()
        {
            return Err(LedgerError::Conflict(
                "a parent with this email already exists".to_string(),
            ));
        }
        let parent = self.timed(self.store.insert_parent(parent)).await?;
        debug!(parent_id = %parent.id, "parent registered");
        Ok(parent)
    }

    pub async fn parent(&self, id: ParentId) -> Result<Parent, LedgerError> {
        self.timed(self.store.parent(id))
            .await?
            .ok_or_else(|| LedgerError::NotFound("parent".to_string()))
    }

    pub async fn find_parent_by_email(&self, email: &str) -> Result<Parent, LedgerError> {
        let email = normalize_email(email)?;
        self.timed(self.store.parent_by_email(&email))
            .await?
            .ok_or_else(|| LedgerError::NotFound("parent".to_string()))
    }

    #[instrument(skip(self, name), fields(parent_id = %parent_id), err)]
    pub async fn create_child(
        &self,
        parent_id: ParentId,
        name: &str,
        dollar_per_point: Option<Decimal>,
    ) -> Result<Child, LedgerError> {
        self.parent(parent_id).await?;
        let rate = match dollar_per_point {
            Some(value) => DollarRate::new(value)?,
            None => self.default_rate,
        };
        let child = Child::new(parent_id, name, rate, now())?;
        let child = self.timed(self.store.insert_child(child)).await?;
        debug!(child_id = %child.id, "child created");
        Ok(child)
    }

    pub async fn children(&self, parent_id: ParentId) -> Result<Vec<Child>, LedgerError> {
        self.parent(parent_id).await?;
        Ok(self.timed(self.store.children_for_parent(parent_id)).await?)
    }

    pub async fn child(&self, id: ChildId) -> Result<Child, LedgerError> {
        self.timed(self.store.child(id))
            .await?
            .ok_or_else(|| LedgerError::NotFound("child".to_string()))
    }

    #[instrument(skip(self, update), fields(child_id = %child_id), err)]
    pub async fn update_child(
        &self,
        child_id: ChildId,
        update: ChildUpdate,
    ) -> Result<Child, LedgerError> {
        let mut child = self.child(child_id).await?;
        if let Some(expected) = update.expected_parent_id {
            if !child.is_owned_by(expected) {
                return Err(LedgerError::Conflict(
                    "child belongs to a different parent".to_string(),
                ));
            }
        }

        child.name = normalize_name(&update.name, "child name")?;
        if let Some(value) = update.dollar_per_point {
            child.dollar_per_point = DollarRate::new(value)?;
        }

        self.timed(self.store.update_child(&child))
            .await?
            .ok_or_else(|| LedgerError::NotFound("child".to_string()))
    }

    /// Removes the child together with its whole ledger.
    #[instrument(skip(self), fields(parent_id = %parent_id, child_id = %child_id), err)]
    pub async fn delete_child(&self, parent_id: ParentId, child_id: ChildId) -> Result<(), LedgerError> {
        let child = self.child(child_id).await?;
        if !child.is_owned_by(parent_id) {
            return Err(LedgerError::Forbidden(
                "child belongs to another parent".to_string(),
            ));
        }
        if !self.timed(self.store.delete_child(child_id)).await? {
            return Err(LedgerError::NotFound("child".to_string()));
        }
        debug!("child deleted");
        Ok(())
    }

    #[instrument(skip(self, name), fields(parent_id = %parent_id), err)]
    pub async fn create_deed_type(
        &self,
        parent_id: ParentId,
        name: &str,
        points: i64,
    ) -> Result<DeedType, LedgerError> {
        self.parent(parent_id).await?;
        let deed_type = DeedType::new(parent_id, name, points, now())?;
        self.ensure_name_free(parent_id, &deed_type.name, None).await?;
        Ok(self.timed(self.store.insert_deed_type(deed_type)).await?)
    }

    pub async fn deed_types(&self, parent_id: ParentId) -> Result<Vec<DeedType>, LedgerError> {
        self.parent(parent_id).await?;
        Ok(self.timed(self.store.deed_types_for_parent(parent_id)).await?)
    }

    pub async fn deed_type(&self, id: DeedTypeId) -> Result<DeedType, LedgerError> {
        self.timed(self.store.deed_type(id))
            .await?
            .ok_or_else(|| LedgerError::NotFound("deed type".to_string()))
    }

    #[instrument(skip(self, update), fields(deed_type_id = %id), err)]
    pub async fn update_deed_type(
        &self,
        id: DeedTypeId,
        update: DeedTypeUpdate,
    ) -> Result<DeedType, LedgerError> {
        let mut deed_type = self.deed_type(id).await?;
        if let Some(expected) = update.expected_parent_id {
            if deed_type.parent_id != expected {
                return Err(LedgerError::Conflict(
                    "deed type belongs to a different parent".to_string(),
                ));
            }
        }

        let name = normalize_name(&update.name, "deed type name")?;
        ensure_non_zero(update.points)?;
        self.ensure_name_free(deed_type.parent_id, &name, Some(id)).await?;

        deed_type.name = name;
        deed_type.points = update.points;
        deed_type.active = update.active;

        self.timed(self.store.update_deed_type(&deed_type))
            .await?
            .ok_or_else(|| LedgerError::NotFound("deed type".to_string()))
    }

    /// Refused with `Conflict` while any deed still references the type.
    #[instrument(skip(self), fields(parent_id = %parent_id, deed_type_id = %id), err)]
    pub async fn delete_deed_type(&self, parent_id: ParentId, id: DeedTypeId) -> Result<(), LedgerError> {
        let deed_type = self.deed_type(id).await?;
        if deed_type.parent_id != parent_id {
            return Err(LedgerError::Forbidden(
                "deed type belongs to another parent".to_string(),
            ));
        }
        if !self.timed(self.store.delete_deed_type(id)).await? {
            return Err(LedgerError::NotFound("deed type".to_string()));
        }
        Ok(())
    }

    /// Checks run before a deed is recorded: the child exists, `created_by`
    /// is its parent, and the deed type is that parent's and still active.
    pub async fn authorize_deed(
        &self,
        child_id: ChildId,
        deed_type_id: DeedTypeId,
        created_by: ParentId,
    ) -> Result<(Child, DeedType), LedgerError> {
        let child = self.authorize_redemption(child_id, created_by).await?;
        let deed_type = self
            .timed(self.store.deed_type(deed_type_id))
            .await?
            .filter(|t| t.parent_id == child.parent_id)
            .ok_or_else(|| LedgerError::Validation("invalid deed type".to_string()))?;
        if !deed_type.active {
            return Err(LedgerError::Conflict("deed type is inactive".to_string()));
        }
        Ok((child, deed_type))
    }

    pub async fn authorize_redemption(
        &self,
        child_id: ChildId,
        created_by: ParentId,
    ) -> Result<Child, LedgerError> {
        let child = self.child(child_id).await?;
        if !child.is_owned_by(created_by) {
            return Err(LedgerError::Forbidden(
                "only the child's parent may record entries".to_string(),
            ));
        }
        Ok(child)
    }

    async fn ensure_name_free(
        &self,
        parent_id: ParentId,
        name: &str,
        except: Option<DeedTypeId>,
    ) -> Result<(), LedgerError> {
        let existing = self
            .timed(self.store.deed_type_by_name(parent_id, name))
            .await?;
        match existing {
            Some(t) if Some(t.id) != except => Err(LedgerError::Conflict(format!(
                "deed type '{name}' already exists"
            ))),
            _ => Ok(()),
        }
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, crate::store::StoreError>
    where
        F: std::future::Future<Output = Result<T, crate::store::StoreError>>,
    {
        timed(self.store_timeout, "family_store", fut).await
    }
}

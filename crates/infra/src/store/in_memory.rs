use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use deedbank_core::{ChildId, DeedId, DeedTypeId, ExpectedVersion, ParentId};
use deedbank_ledger::{
    Balance, Child, Deed, DeedType, LedgerEntry, Parent, Redemption, StoredEntry,
};

use super::{FamilyStore, LedgerSnapshot, LedgerStore, StoreError};

#[derive(Debug, Default)]
struct LedgerStream {
    version: u64,
    entries: Vec<StoredEntry>,
}

#[derive(Debug, Default)]
struct State {
    parents: HashMap<ParentId, Parent>,
    children: HashMap<ChildId, Child>,
    deed_types: HashMap<DeedTypeId, DeedType>,
    ledgers: HashMap<ChildId, LedgerStream>,
}

/// In-memory entity store.
///
/// Intended for tests/dev. One lock guards every table, so each operation
/// (including a versioned append) is atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

fn newest_first(entries: &[StoredEntry]) -> impl Iterator<Item = &StoredEntry> {
    let mut sorted: Vec<&StoredEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| std::cmp::Reverse(e.order_key()));
    sorted.into_iter()
}

#[async_trait]
impl FamilyStore for InMemoryStore {
    async fn insert_parent(&self, parent: Parent) -> Result<Parent, StoreError> {
        let mut state = self.write()?;
        if state.parents.values().any(|p| p.email == parent.email) {
            return Err(StoreError::Constraint(format!(
                "parent email '{}' already registered",
                parent.email
            )));
        }
        state.parents.insert(parent.id, parent.clone());
        Ok(parent)
    }

    async fn parent(&self, id: ParentId) -> Result<Option<Parent>, StoreError> {
        Ok(self.read()?.parents.get(&id).cloned())
    }

    async fn parent_by_email(&self, email: &str) -> Result<Option<Parent>, StoreError> {
        Ok(self
            .read()?
            .parents
            .values()
            .find(|p| p.email == email)
            .cloned())
    }

    async fn insert_child(&self, child: Child) -> Result<Child, StoreError> {
        let mut state = self.write()?;
        if !state.parents.contains_key(&child.parent_id) {
            return Err(StoreError::NotFound("parent".to_string()));
        }
        state.ledgers.insert(child.id, LedgerStream::default());
        state.children.insert(child.id, child.clone());
        Ok(child)
    }

    async fn child(&self, id: ChildId) -> Result<Option<Child>, StoreError> {
        Ok(self.read()?.children.get(&id).cloned())
    }

    async fn children_for_parent(&self, parent_id: ParentId) -> Result<Vec<Child>, StoreError> {
        let state = self.read()?;
        let mut children: Vec<Child> = state
            .children
            .values()
            .filter(|c| c.parent_id == parent_id)
            .cloned()
            .collect();
        children.sort_by_key(|c| (c.created_at, c.id));
        Ok(children)
    }

    async fn update_child(&self, child: &Child) -> Result<Option<Child>, StoreError> {
        let mut state = self.write()?;
        Ok(state.children.get_mut(&child.id).map(|existing| {
            existing.name = child.name.clone();
            existing.dollar_per_point = child.dollar_per_point;
            existing.clone()
        }))
    }

    async fn delete_child(&self, id: ChildId) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        state.ledgers.remove(&id);
        Ok(state.children.remove(&id).is_some())
    }

    async fn insert_deed_type(&self, deed_type: DeedType) -> Result<DeedType, StoreError> {
        let mut state = self.write()?;
        if !state.parents.contains_key(&deed_type.parent_id) {
            return Err(StoreError::NotFound("parent".to_string()));
        }
        let clash = state
            .deed_types
            .values()
            .any(|t| t.parent_id == deed_type.parent_id && t.same_name(&deed_type.name));
        if clash {
            return Err(StoreError::Constraint(format!(
                "deed type '{}' already exists",
                deed_type.name
            )));
        }
        state.deed_types.insert(deed_type.id, deed_type.clone());
        Ok(deed_type)
    }

    async fn deed_type(&self, id: DeedTypeId) -> Result<Option<DeedType>, StoreError> {
        Ok(self.read()?.deed_types.get(&id).cloned())
    }

    async fn deed_type_by_name(
        &self,
        parent_id: ParentId,
        name: &str,
    ) -> Result<Option<DeedType>, StoreError> {
        Ok(self
            .read()?
            .deed_types
            .values()
            .find(|t| t.parent_id == parent_id && t.same_name(name))
            .cloned())
    }

    async fn deed_types_for_parent(
        &self,
        parent_id: ParentId,
    ) -> Result<Vec<DeedType>, StoreError> {
        let state = self.read()?;
        let mut types: Vec<DeedType> = state
            .deed_types
            .values()
            .filter(|t| t.parent_id == parent_id)
            .cloned()
            .collect();
        types.sort_by_key(|t| (t.created_at, t.id));
        Ok(types)
    }

    async fn update_deed_type(&self, deed_type: &DeedType) -> Result<Option<DeedType>, StoreError> {
        let mut state = self.write()?;
        let clash = state.deed_types.values().any(|t| {
            t.id != deed_type.id
                && t.parent_id == deed_type.parent_id
                && t.same_name(&deed_type.name)
        });
        if clash {
            return Err(StoreError::Constraint(format!(
                "deed type '{}' already exists",
                deed_type.name
            )));
        }
        Ok(state.deed_types.get_mut(&deed_type.id).map(|existing| {
            existing.name = deed_type.name.clone();
            existing.points = deed_type.points;
            existing.active = deed_type.active;
            existing.clone()
        }))
    }

    async fn delete_deed_type(&self, id: DeedTypeId) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let referenced = state.ledgers.values().any(|stream| {
            stream.entries.iter().any(|e| {
                matches!(&e.entry, LedgerEntry::Deed(d) if d.deed_type_id == id)
            })
        });
        if referenced {
            return Err(StoreError::Constraint(
                "deed type is referenced by recorded deeds".to_string(),
            ));
        }
        Ok(state.deed_types.remove(&id).is_some())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn load_ledger(&self, child_id: ChildId) -> Result<Option<LedgerSnapshot>, StoreError> {
        let state = self.read()?;
        let Some(child) = state.children.get(&child_id) else {
            return Ok(None);
        };
        let (version, entries) = state
            .ledgers
            .get(&child_id)
            .map(|s| (s.version, s.entries.clone()))
            .unwrap_or_default();

        Ok(Some(LedgerSnapshot {
            child: child.clone(),
            version,
            entries,
        }))
    }

    async fn balance(&self, child_id: ChildId) -> Result<Option<Balance>, StoreError> {
        let state = self.read()?;
        let Some(child) = state.children.get(&child_id) else {
            return Ok(None);
        };
        let entries = state
            .ledgers
            .get(&child_id)
            .map(|s| s.entries.as_slice())
            .unwrap_or_default();

        Balance::from_entries(
            child_id,
            entries.iter().map(|e| &e.entry),
            child.dollar_per_point,
        )
        .map(Some)
        .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn append(
        &self,
        child_id: ChildId,
        mut entry: LedgerEntry,
        expected_version: ExpectedVersion,
    ) -> Result<StoredEntry, StoreError> {
        let mut guard = self.write()?;
        let state = &mut *guard;

        if !state.children.contains_key(&child_id) {
            return Err(StoreError::NotFound("child".to_string()));
        }
        if entry.child_id() != child_id {
            return Err(StoreError::Constraint(
                "entry belongs to a different child".to_string(),
            ));
        }
        if !state.parents.contains_key(&entry.recorded_by()) {
            return Err(StoreError::NotFound("parent".to_string()));
        }
        match &entry {
            LedgerEntry::Deed(d) => {
                if d.points == 0 {
                    return Err(StoreError::Constraint("deed points must be non-zero".to_string()));
                }
                if !state.deed_types.contains_key(&d.deed_type_id) {
                    return Err(StoreError::NotFound("deed type".to_string()));
                }
            }
            LedgerEntry::Redemption(r) => {
                if r.points <= 0 {
                    return Err(StoreError::Constraint(
                        "redemption points must be positive".to_string(),
                    ));
                }
            }
        }

        let stream = state.ledgers.entry(child_id).or_default();
        if !expected_version.matches(stream.version) {
            return Err(StoreError::Concurrency(format!(
                "expected {expected_version:?}, found {}",
                stream.version
            )));
        }

        if let Some(latest) = stream.entries.iter().map(|e| e.entry.occurred_at()).max() {
            entry.not_before(latest);
        }
        stream.version += 1;
        let stored = StoredEntry {
            sequence: stream.version,
            entry,
        };
        stream.entries.push(stored.clone());
        Ok(stored)
    }

    async fn deeds_for_child(&self, child_id: ChildId) -> Result<Vec<Deed>, StoreError> {
        let state = self.read()?;
        let Some(stream) = state.ledgers.get(&child_id) else {
            return Ok(vec![]);
        };
        Ok(newest_first(&stream.entries)
            .filter_map(|e| match &e.entry {
                LedgerEntry::Deed(d) => Some(d.clone()),
                LedgerEntry::Redemption(_) => None,
            })
            .collect())
    }

    async fn redemptions_for_child(
        &self,
        child_id: ChildId,
    ) -> Result<Vec<Redemption>, StoreError> {
        let state = self.read()?;
        let Some(stream) = state.ledgers.get(&child_id) else {
            return Ok(vec![]);
        };
        Ok(newest_first(&stream.entries)
            .filter_map(|e| match &e.entry {
                LedgerEntry::Redemption(r) => Some(r.clone()),
                LedgerEntry::Deed(_) => None,
            })
            .collect())
    }

    async fn deed(&self, id: DeedId) -> Result<Option<Deed>, StoreError> {
        let state = self.read()?;
        Ok(state
            .ledgers
            .values()
            .flat_map(|s| s.entries.iter())
            .find_map(|e| match &e.entry {
                LedgerEntry::Deed(d) if d.id == id => Some(d.clone()),
                _ => None,
            }))
    }

    async fn delete_deed(&self, id: DeedId) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        for stream in state.ledgers.values_mut() {
            let before = stream.entries.len();
            stream
                .entries
                .retain(|e| !matches!(&e.entry, LedgerEntry::Deed(d) if d.id == id));
            if stream.entries.len() != before {
                stream.version += 1;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

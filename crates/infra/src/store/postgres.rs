//! Postgres-backed entity store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | StoreError | Scenario |
//! |------------|-----------------|------------|----------|
//! | Database (unique violation) | `23505` | `Constraint` | Duplicate email / deed type name, sequence clash |
//! | Database (foreign key violation) | `23503` | `NotFound` | Referenced parent, child or deed type is gone |
//! | Database (check violation) | `23514` | `Constraint` | Zero points, non-positive rate |
//! | Database (other) | Any other | `Backend` | |
//! | PoolTimedOut | N/A | `Timeout` | No connection became available |
//! | Other | N/A | `Backend` | Network errors, decode failures, etc. |
//!
//! ## Ledger versions
//!
//! `children.ledger_version` is the per-child version. An append bumps it with a
//! conditional `UPDATE ... WHERE ledger_version = $expected` inside the insert
//! transaction. The row lock taken by that update serializes concurrent writers
//! for the same child; the loser sees zero updated rows and gets `Concurrency`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use deedbank_core::{ChildId, DeedId, DeedTypeId, ExpectedVersion, ParentId, RedemptionId};
use deedbank_ledger::{
    Balance, Child, Deed, DeedType, DollarRate, LedgerEntry, Parent, Redemption, StoredEntry,
};

use super::{FamilyStore, LedgerSnapshot, LedgerStore, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS parents (
        id          uuid PRIMARY KEY,
        email       text NOT NULL UNIQUE,
        created_at  timestamptz NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS children (
        id                uuid PRIMARY KEY,
        parent_id         uuid NOT NULL REFERENCES parents(id) ON DELETE CASCADE,
        name              text NOT NULL,
        dollar_per_point  numeric NOT NULL CHECK (dollar_per_point > 0 AND dollar_per_point <= 1000000),
        ledger_version    bigint NOT NULL DEFAULT 0,
        created_at        timestamptz NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS deed_types (
        id          uuid PRIMARY KEY,
        parent_id   uuid NOT NULL REFERENCES parents(id) ON DELETE CASCADE,
        name        text NOT NULL,
        points      bigint NOT NULL CHECK (points <> 0),
        active      boolean NOT NULL DEFAULT true,
        created_at  timestamptz NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS deed_types_parent_name_key
        ON deed_types (parent_id, lower(name))
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS deeds (
        id            uuid PRIMARY KEY,
        child_id      uuid NOT NULL REFERENCES children(id) ON DELETE CASCADE,
        deed_type_id  uuid NOT NULL REFERENCES deed_types(id),
        points        bigint NOT NULL CHECK (points <> 0),
        note          text,
        occurred_at   timestamptz NOT NULL,
        created_by    uuid NOT NULL REFERENCES parents(id),
        sequence      bigint NOT NULL,
        UNIQUE (child_id, sequence)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS redemptions (
        id           uuid PRIMARY KEY,
        child_id     uuid NOT NULL REFERENCES children(id) ON DELETE CASCADE,
        points       bigint NOT NULL CHECK (points > 0),
        description  text,
        created_at   timestamptz NOT NULL,
        created_by   uuid NOT NULL REFERENCES parents(id),
        sequence     bigint NOT NULL,
        UNIQUE (child_id, sequence)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS deeds_child_idx ON deeds (child_id, occurred_at)",
    "CREATE INDEX IF NOT EXISTS redemptions_child_idx ON redemptions (child_id, created_at)",
];

/// Postgres-backed entity store.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create tables and indexes if they do not exist yet. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl FamilyStore for PostgresStore {
    #[instrument(skip(self, parent), fields(parent_id = %parent.id), err)]
    async fn insert_parent(&self, parent: Parent) -> Result<Parent, StoreError> {
        sqlx::query("INSERT INTO parents (id, email, created_at) VALUES ($1, $2, $3)")
            .bind(*parent.id.as_uuid())
            .bind(&parent.email)
            .bind(parent.created_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_parent", e))?;
        Ok(parent)
    }

    async fn parent(&self, id: ParentId) -> Result<Option<Parent>, StoreError> {
        let row = sqlx::query("SELECT id, email, created_at FROM parents WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("parent", e))?;
        row.as_ref().map(parent_from_row).transpose()
    }

    async fn parent_by_email(&self, email: &str) -> Result<Option<Parent>, StoreError> {
        let row = sqlx::query("SELECT id, email, created_at FROM parents WHERE email = $1")
            .bind(email)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("parent_by_email", e))?;
        row.as_ref().map(parent_from_row).transpose()
    }

    #[instrument(skip(self, child), fields(child_id = %child.id, parent_id = %child.parent_id), err)]
    async fn insert_child(&self, child: Child) -> Result<Child, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO children (id, parent_id, name, dollar_per_point, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*child.id.as_uuid())
        .bind(*child.parent_id.as_uuid())
        .bind(&child.name)
        .bind(child.dollar_per_point.value())
        .bind(child.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_child", e))?;
        Ok(child)
    }

    async fn child(&self, id: ChildId) -> Result<Option<Child>, StoreError> {
        let row = sqlx::query(
            "SELECT id, parent_id, name, dollar_per_point, created_at FROM children WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("child", e))?;
        row.as_ref().map(child_from_row).transpose()
    }

    async fn children_for_parent(&self, parent_id: ParentId) -> Result<Vec<Child>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, parent_id, name, dollar_per_point, created_at
            FROM children
            WHERE parent_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(*parent_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("children_for_parent", e))?;
        rows.iter().map(child_from_row).collect()
    }

    #[instrument(skip(self, child), fields(child_id = %child.id), err)]
    async fn update_child(&self, child: &Child) -> Result<Option<Child>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE children SET name = $2, dollar_per_point = $3
            WHERE id = $1
            RETURNING id, parent_id, name, dollar_per_point, created_at
            "#,
        )
        .bind(*child.id.as_uuid())
        .bind(&child.name)
        .bind(child.dollar_per_point.value())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_child", e))?;
        row.as_ref().map(child_from_row).transpose()
    }

    #[instrument(skip(self), fields(child_id = %id), err)]
    async fn delete_child(&self, id: ChildId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM children WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_child", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, deed_type), fields(deed_type_id = %deed_type.id), err)]
    async fn insert_deed_type(&self, deed_type: DeedType) -> Result<DeedType, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO deed_types (id, parent_id, name, points, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*deed_type.id.as_uuid())
        .bind(*deed_type.parent_id.as_uuid())
        .bind(&deed_type.name)
        .bind(deed_type.points)
        .bind(deed_type.active)
        .bind(deed_type.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_deed_type", e))?;
        Ok(deed_type)
    }

    async fn deed_type(&self, id: DeedTypeId) -> Result<Option<DeedType>, StoreError> {
        let row = sqlx::query(
            "SELECT id, parent_id, name, points, active, created_at FROM deed_types WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("deed_type", e))?;
        row.as_ref().map(deed_type_from_row).transpose()
    }

    async fn deed_type_by_name(
        &self,
        parent_id: ParentId,
        name: &str,
    ) -> Result<Option<DeedType>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, parent_id, name, points, active, created_at
            FROM deed_types
            WHERE parent_id = $1 AND lower(name) = lower($2)
            "#,
        )
        .bind(*parent_id.as_uuid())
        .bind(name.trim())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("deed_type_by_name", e))?;
        row.as_ref().map(deed_type_from_row).transpose()
    }

    async fn deed_types_for_parent(
        &self,
        parent_id: ParentId,
    ) -> Result<Vec<DeedType>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, parent_id, name, points, active, created_at
            FROM deed_types
            WHERE parent_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(*parent_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("deed_types_for_parent", e))?;
        rows.iter().map(deed_type_from_row).collect()
    }

    #[instrument(skip(self, deed_type), fields(deed_type_id = %deed_type.id), err)]
    async fn update_deed_type(&self, deed_type: &DeedType) -> Result<Option<DeedType>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE deed_types SET name = $2, points = $3, active = $4
            WHERE id = $1
            RETURNING id, parent_id, name, points, active, created_at
            "#,
        )
        .bind(*deed_type.id.as_uuid())
        .bind(&deed_type.name)
        .bind(deed_type.points)
        .bind(deed_type.active)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_deed_type", e))?;
        row.as_ref().map(deed_type_from_row).transpose()
    }

    #[instrument(skip(self), fields(deed_type_id = %id), err)]
    async fn delete_deed_type(&self, id: DeedTypeId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM deed_types WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StoreError::Constraint("deed type is referenced by recorded deeds".to_string())
                } else {
                    map_sqlx_error("delete_deed_type", e)
                }
            })?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    #[instrument(skip(self), fields(child_id = %child_id), err)]
    async fn load_ledger(&self, child_id: ChildId) -> Result<Option<LedgerSnapshot>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // One snapshot for the version and every entry row.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let row = sqlx::query(
            r#"
            SELECT id, parent_id, name, dollar_per_point, created_at, ledger_version
            FROM children
            WHERE id = $1
            "#,
        )
        .bind(*child_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_ledger", e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(None);
        };
        let child = child_from_row(&row)?;
        let version = decode_version(get(&row, "ledger_version")?)?;

        let deed_rows = sqlx::query(
            r#"
            SELECT id, child_id, deed_type_id, points, note, occurred_at, created_by, sequence
            FROM deeds
            WHERE child_id = $1
            "#,
        )
        .bind(*child_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_deeds", e))?;

        let redemption_rows = sqlx::query(
            r#"
            SELECT id, child_id, points, description, created_at, created_by, sequence
            FROM redemptions
            WHERE child_id = $1
            "#,
        )
        .bind(*child_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_redemptions", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let mut entries = Vec::with_capacity(deed_rows.len() + redemption_rows.len());
        for row in &deed_rows {
            entries.push(StoredEntry::new(decode_version(get(row, "sequence")?)?, deed_from_row(row)?));
        }
        for row in &redemption_rows {
            entries.push(StoredEntry::new(
                decode_version(get(row, "sequence")?)?,
                redemption_from_row(row)?,
            ));
        }
        entries.sort_by_key(|e| e.sequence);

        Ok(Some(LedgerSnapshot {
            child,
            version,
            entries,
        }))
    }

    async fn balance(&self, child_id: ChildId) -> Result<Option<Balance>, StoreError> {
        // Subqueries, not joins: a join of deeds x redemptions would multiply the sums.
        let row = sqlx::query(
            r#"
            SELECT
                c.dollar_per_point,
                COALESCE((SELECT SUM(d.points) FROM deeds d WHERE d.child_id = c.id), 0)
                  - COALESCE((SELECT SUM(r.points) FROM redemptions r WHERE r.child_id = c.id), 0)
                  AS points
            FROM children c
            WHERE c.id = $1
            "#,
        )
        .bind(*child_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("balance", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let rate = decode_rate(get(&row, "dollar_per_point")?)?;
        let points: Decimal = get(&row, "points")?;
        let points = points
            .to_i64()
            .ok_or_else(|| StoreError::Backend(format!("balance {points} out of range")))?;

        Ok(Some(Balance::at_rate(child_id, points, rate)))
    }

    #[instrument(
        skip(self, entry),
        fields(child_id = %child_id, entry_type = %entry.kind(), expected_version = ?expected_version),
        err
    )]
    async fn append(
        &self,
        child_id: ChildId,
        mut entry: LedgerEntry,
        expected_version: ExpectedVersion,
    ) -> Result<StoredEntry, StoreError> {
        if entry.child_id() != child_id {
            return Err(StoreError::Constraint(
                "entry belongs to a different child".to_string(),
            ));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let bumped = match expected_version {
            ExpectedVersion::Exact(v) => {
                let expected = i64::try_from(v)
                    .map_err(|_| StoreError::Concurrency(format!("expected version {v} out of range")))?;
                sqlx::query(
                    r#"
                    UPDATE children SET ledger_version = ledger_version + 1
                    WHERE id = $1 AND ledger_version = $2
                    RETURNING ledger_version
                    "#,
                )
                .bind(*child_id.as_uuid())
                .bind(expected)
                .fetch_optional(&mut *tx)
                .await
            }
            ExpectedVersion::Any => {
                sqlx::query(
                    r#"
                    UPDATE children SET ledger_version = ledger_version + 1
                    WHERE id = $1
                    RETURNING ledger_version
                    "#,
                )
                .bind(*child_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("bump_ledger_version", e))?;

        let Some(row) = bumped else {
            let exists = sqlx::query("SELECT 1 FROM children WHERE id = $1")
                .bind(*child_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("child_exists", e))?
                .is_some();
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(if exists {
                StoreError::Concurrency(format!(
                    "optimistic concurrency check failed: expected {expected_version:?}"
                ))
            } else {
                StoreError::NotFound("child".to_string())
            });
        };
        let sequence = decode_version(get(&row, "ledger_version")?)?;
        let sequence_i64 = get::<i64>(&row, "ledger_version")?;

        // The version bump holds the child's row lock until commit.
        let latest = sqlx::query(
            r#"
            SELECT GREATEST(
                (SELECT max(occurred_at) FROM deeds WHERE child_id = $1),
                (SELECT max(created_at) FROM redemptions WHERE child_id = $1)
            ) AS latest
            "#,
        )
        .bind(*child_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("latest_entry_time", e))?;
        if let Some(latest) = get::<Option<DateTime<Utc>>>(&latest, "latest")? {
            entry.not_before(latest);
        }

        match &entry {
            LedgerEntry::Deed(d) => {
                sqlx::query(
                    r#"
                    INSERT INTO deeds (id, child_id, deed_type_id, points, note, occurred_at, created_by, sequence)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(*d.id.as_uuid())
                .bind(*d.child_id.as_uuid())
                .bind(*d.deed_type_id.as_uuid())
                .bind(d.points)
                .bind(d.note.as_deref())
                .bind(d.occurred_at)
                .bind(*d.created_by.as_uuid())
                .bind(sequence_i64)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_deed", e))?;
            }
            LedgerEntry::Redemption(r) => {
                sqlx::query(
                    r#"
                    INSERT INTO redemptions (id, child_id, points, description, created_at, created_by, sequence)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(*r.id.as_uuid())
                .bind(*r.child_id.as_uuid())
                .bind(r.points)
                .bind(r.description.as_deref())
                .bind(r.created_at)
                .bind(*r.created_by.as_uuid())
                .bind(sequence_i64)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_redemption", e))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(StoredEntry { sequence, entry })
    }

    async fn deeds_for_child(&self, child_id: ChildId) -> Result<Vec<Deed>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, child_id, deed_type_id, points, note, occurred_at, created_by
            FROM deeds
            WHERE child_id = $1
            ORDER BY occurred_at DESC, sequence DESC
            "#,
        )
        .bind(*child_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("deeds_for_child", e))?;
        rows.iter().map(deed_from_row).collect()
    }

    async fn redemptions_for_child(
        &self,
        child_id: ChildId,
    ) -> Result<Vec<Redemption>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, child_id, points, description, created_at, created_by
            FROM redemptions
            WHERE child_id = $1
            ORDER BY created_at DESC, sequence DESC
            "#,
        )
        .bind(*child_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("redemptions_for_child", e))?;
        rows.iter().map(redemption_from_row).collect()
    }

    async fn deed(&self, id: DeedId) -> Result<Option<Deed>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, child_id, deed_type_id, points, note, occurred_at, created_by
            FROM deeds
            WHERE id = $1
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("deed", e))?;
        row.as_ref().map(deed_from_row).transpose()
    }

    #[instrument(skip(self), fields(deed_id = %id), err)]
    async fn delete_deed(&self, id: DeedId) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let deleted = sqlx::query("DELETE FROM deeds WHERE id = $1 RETURNING child_id")
            .bind(*id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_deed", e))?;

        let Some(row) = deleted else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(false);
        };
        let child_id: Uuid = get(&row, "child_id")?;

        sqlx::query("UPDATE children SET ledger_version = ledger_version + 1 WHERE id = $1")
            .bind(child_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("bump_ledger_version", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(true)
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to decode column {column}: {e}")))
}

fn decode_version(raw: i64) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| StoreError::Backend(format!("negative ledger version {raw}")))
}

fn decode_rate(raw: Decimal) -> Result<DollarRate, StoreError> {
    DollarRate::new(raw).map_err(|e| StoreError::Backend(format!("stored rate invalid: {e}")))
}

fn parent_from_row(row: &PgRow) -> Result<Parent, StoreError> {
    Ok(Parent {
        id: ParentId::from_uuid(get(row, "id")?),
        email: get(row, "email")?,
        created_at: get::<DateTime<Utc>>(row, "created_at")?,
    })
}

fn child_from_row(row: &PgRow) -> Result<Child, StoreError> {
    Ok(Child {
        id: ChildId::from_uuid(get(row, "id")?),
        parent_id: ParentId::from_uuid(get(row, "parent_id")?),
        name: get(row, "name")?,
        dollar_per_point: decode_rate(get(row, "dollar_per_point")?)?,
        created_at: get(row, "created_at")?,
    })
}

fn deed_type_from_row(row: &PgRow) -> Result<DeedType, StoreError> {
    Ok(DeedType {
        id: DeedTypeId::from_uuid(get(row, "id")?),
        parent_id: ParentId::from_uuid(get(row, "parent_id")?),
        name: get(row, "name")?,
        points: get(row, "points")?,
        active: get(row, "active")?,
        created_at: get(row, "created_at")?,
    })
}

fn deed_from_row(row: &PgRow) -> Result<Deed, StoreError> {
    Ok(Deed {
        id: DeedId::from_uuid(get(row, "id")?),
        child_id: ChildId::from_uuid(get(row, "child_id")?),
        deed_type_id: DeedTypeId::from_uuid(get(row, "deed_type_id")?),
        points: get(row, "points")?,
        note: get(row, "note")?,
        occurred_at: get(row, "occurred_at")?,
        created_by: ParentId::from_uuid(get(row, "created_by")?),
    })
}

fn redemption_from_row(row: &PgRow) -> Result<Redemption, StoreError> {
    Ok(Redemption {
        id: RedemptionId::from_uuid(get(row, "id")?),
        child_id: ChildId::from_uuid(get(row, "child_id")?),
        points: get(row, "points")?,
        description: get(row, "description")?,
        created_at: get(row, "created_at")?,
        created_by: ParentId::from_uuid(get(row, "created_by")?),
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23514") => StoreError::Constraint(msg),
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23503");
    }
    false
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use deedbank_core::ChildId;
use deedbank_ledger::HistoryEntry;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateParentRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ParentQuery {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChildRequest {
    pub name: String,
    pub dollar_per_point: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChildRequest {
    /// When present, must match the child's parent.
    pub parent_id: Option<String>,
    pub name: String,
    pub dollar_per_point: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDeedTypeRequest {
    pub name: String,
    pub points: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDeedTypeRequest {
    pub parent_id: Option<String>,
    pub name: String,
    pub points: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateDeedRequest {
    pub child_id: String,
    pub deed_type_id: String,
    /// Zero or absent means "use the deed type's points".
    #[serde(default)]
    pub points: i64,
    pub note: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRedemptionRequest {
    pub child_id: String,
    pub points: i64,
    pub description: Option<String>,
    pub created_by: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub child_id: ChildId,
    pub dollar_per_point: Decimal,
    pub items: Vec<HistoryEntry>,
}

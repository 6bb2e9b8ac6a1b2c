//! Deed and redemption recording.
//!
//! Handlers run the registry's ownership checks first, then hand the entry to
//! the ledger engine.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use deedbank_core::{ChildId, DeedTypeId, ParentId};
use deedbank_infra::{NewDeed, NewRedemption};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/deeds", post(create_deed))
        .route("/redemptions", post(create_redemption))
}

pub async fn create_deed(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateDeedRequest>,
) -> ApiResult {
    let child_id: ChildId = errors::parse_id(&body.child_id)?;
    let deed_type_id: DeedTypeId = errors::parse_id(&body.deed_type_id)?;
    let created_by: ParentId = errors::parse_id(&body.created_by)?;

    services
        .registry
        .authorize_deed(child_id, deed_type_id, created_by)
        .await
        .map_err(errors::ledger_error_to_response)?;

    let deed = services
        .engine
        .append_deed(NewDeed {
            child_id,
            deed_type_id,
            explicit_points: body.points,
            note: body.note,
            created_by,
        })
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok((StatusCode::CREATED, Json(deed)).into_response())
}

pub async fn create_redemption(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateRedemptionRequest>,
) -> ApiResult {
    let child_id: ChildId = errors::parse_id(&body.child_id)?;
    let created_by: ParentId = errors::parse_id(&body.created_by)?;
    if body.points <= 0 {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_points",
            "points must be greater than zero",
        ));
    }

    services
        .registry
        .authorize_redemption(child_id, created_by)
        .await
        .map_err(errors::ledger_error_to_response)?;

    let redemption = services
        .engine
        .append_redemption(NewRedemption {
            child_id,
            points: body.points,
            description: body.description,
            created_by,
        })
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok((StatusCode::CREATED, Json(redemption)).into_response())
}

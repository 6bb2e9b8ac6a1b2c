use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::put,
    Json, Router,
};

use deedbank_core::{DeedTypeId, ParentId};
use deedbank_infra::DeedTypeUpdate;

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route(
        "/deed-types/:deed_type_id",
        put(update_deed_type).patch(update_deed_type),
    )
}

pub async fn update_deed_type(
    Extension(services): Extension<Arc<AppServices>>,
    Path(deed_type_id): Path<String>,
    Json(body): Json<dto::UpdateDeedTypeRequest>,
) -> ApiResult {
    let deed_type_id: DeedTypeId = errors::parse_id(&deed_type_id)?;
    let expected_parent_id = body
        .parent_id
        .as_deref()
        .map(errors::parse_id::<ParentId>)
        .transpose()?;

    let deed_type = services
        .registry
        .update_deed_type(
            deed_type_id,
            DeedTypeUpdate {
                expected_parent_id,
                name: body.name,
                points: body.points,
                active: body.active,
            },
        )
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok(Json(deed_type).into_response())
}

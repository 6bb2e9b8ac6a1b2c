use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use deedbank_core::{ChildId, ParentId};
use deedbank_infra::ChildUpdate;

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route(
            "/children/:child_id",
            get(get_child).put(update_child).patch(update_child),
        )
        .route("/children/:child_id/deeds", get(list_deeds))
        .route("/children/:child_id/redemptions", get(list_redemptions))
        .route("/children/:child_id/balance", get(get_balance))
        .route("/children/:child_id/history", get(get_history))
        .route("/children/:child_id/export/csv", get(export_csv))
}

pub async fn get_child(
    Extension(services): Extension<Arc<AppServices>>,
    Path(child_id): Path<String>,
) -> ApiResult {
    let child_id: ChildId = errors::parse_id(&child_id)?;
    let child = services
        .registry
        .child(child_id)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok(Json(child).into_response())
}

pub async fn update_child(
    Extension(services): Extension<Arc<AppServices>>,
    Path(child_id): Path<String>,
    Json(body): Json<dto::UpdateChildRequest>,
) -> ApiResult {
    let child_id: ChildId = errors::parse_id(&child_id)?;
    let expected_parent_id = body
        .parent_id
        .as_deref()
        .map(errors::parse_id::<ParentId>)
        .transpose()?;

    let child = services
        .registry
        .update_child(
            child_id,
            ChildUpdate {
                expected_parent_id,
                name: body.name,
                dollar_per_point: body.dollar_per_point,
            },
        )
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok(Json(child).into_response())
}

pub async fn list_deeds(
    Extension(services): Extension<Arc<AppServices>>,
    Path(child_id): Path<String>,
) -> ApiResult {
    let child_id: ChildId = errors::parse_id(&child_id)?;
    let deeds = services
        .engine
        .deeds(child_id)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok(Json(dto::ListResponse::from(deeds)).into_response())
}

pub async fn list_redemptions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(child_id): Path<String>,
) -> ApiResult {
    let child_id: ChildId = errors::parse_id(&child_id)?;
    let redemptions = services
        .engine
        .redemptions(child_id)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok(Json(dto::ListResponse::from(redemptions)).into_response())
}

pub async fn get_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(child_id): Path<String>,
) -> ApiResult {
    let child_id: ChildId = errors::parse_id(&child_id)?;
    let balance = services
        .engine
        .balance(child_id)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok(Json(balance).into_response())
}

pub async fn get_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(child_id): Path<String>,
) -> ApiResult {
    let child_id: ChildId = errors::parse_id(&child_id)?;
    let history = services
        .engine
        .history(child_id)
        .await
        .map_err(errors::ledger_error_to_response)?;

    Ok(Json(dto::HistoryResponse {
        child_id: history.child_id(),
        dollar_per_point: history.rate().value(),
        items: history.iter().collect(),
    })
    .into_response())
}

pub async fn export_csv(
    Extension(services): Extension<Arc<AppServices>>,
    Path(child_id): Path<String>,
) -> ApiResult {
    let child_id: ChildId = errors::parse_id(&child_id)?;
    let csv = services
        .engine
        .export_history_csv(child_id)
        .await
        .map_err(errors::ledger_error_to_response)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=child-{child_id}-history.csv"),
            ),
        ],
        csv,
    )
        .into_response())
}

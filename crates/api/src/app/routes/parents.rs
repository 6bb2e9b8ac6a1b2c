use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};

use deedbank_core::{ChildId, DeedId, DeedTypeId, ParentId};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/parents", post(create_parent).get(find_parent))
        .route("/parents/:parent_id", get(get_parent))
        .route(
            "/parents/:parent_id/children",
            post(create_child).get(list_children),
        )
        .route("/parents/:parent_id/children/:child_id", delete(delete_child))
        .route(
            "/parents/:parent_id/deed-types",
            post(create_deed_type).get(list_deed_types),
        )
        .route(
            "/parents/:parent_id/deed-types/:deed_type_id",
            delete(delete_deed_type),
        )
        .route("/parents/:parent_id/deeds/:deed_id", delete(delete_deed))
}

pub async fn create_parent(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateParentRequest>,
) -> ApiResult {
    let parent = services
        .registry
        .create_parent(&body.email)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok((StatusCode::CREATED, Json(parent)).into_response())
}

/// `GET /parents?email=...`
pub async fn find_parent(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ParentQuery>,
) -> ApiResult {
    let Some(email) = query.email else {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "email query parameter is required",
        ));
    };
    let parent = services
        .registry
        .find_parent_by_email(&email)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok(Json(parent).into_response())
}

pub async fn get_parent(
    Extension(services): Extension<Arc<AppServices>>,
    Path(parent_id): Path<String>,
) -> ApiResult {
    let parent_id: ParentId = errors::parse_id(&parent_id)?;
    let parent = services
        .registry
        .parent(parent_id)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok(Json(parent).into_response())
}

pub async fn create_child(
    Extension(services): Extension<Arc<AppServices>>,
    Path(parent_id): Path<String>,
    Json(body): Json<dto::CreateChildRequest>,
) -> ApiResult {
    let parent_id: ParentId = errors::parse_id(&parent_id)?;
    let child = services
        .registry
        .create_child(parent_id, &body.name, body.dollar_per_point)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok((StatusCode::CREATED, Json(child)).into_response())
}

pub async fn list_children(
    Extension(services): Extension<Arc<AppServices>>,
    Path(parent_id): Path<String>,
) -> ApiResult {
    let parent_id: ParentId = errors::parse_id(&parent_id)?;
    let children = services
        .registry
        .children(parent_id)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok(Json(dto::ListResponse::from(children)).into_response())
}

pub async fn delete_child(
    Extension(services): Extension<Arc<AppServices>>,
    Path((parent_id, child_id)): Path<(String, String)>,
) -> ApiResult {
    let parent_id: ParentId = errors::parse_id(&parent_id)?;
    let child_id: ChildId = errors::parse_id(&child_id)?;
    services
        .registry
        .delete_child(parent_id, child_id)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn create_deed_type(
    Extension(services): Extension<Arc<AppServices>>,
    Path(parent_id): Path<String>,
    Json(body): Json<dto::CreateDeedTypeRequest>,
) -> ApiResult {
    let parent_id: ParentId = errors::parse_id(&parent_id)?;
    let deed_type = services
        .registry
        .create_deed_type(parent_id, &body.name, body.points)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok((StatusCode::CREATED, Json(deed_type)).into_response())
}

pub async fn list_deed_types(
    Extension(services): Extension<Arc<AppServices>>,
    Path(parent_id): Path<String>,
) -> ApiResult {
    let parent_id: ParentId = errors::parse_id(&parent_id)?;
    let deed_types = services
        .registry
        .deed_types(parent_id)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok(Json(dto::ListResponse::from(deed_types)).into_response())
}

pub async fn delete_deed_type(
    Extension(services): Extension<Arc<AppServices>>,
    Path((parent_id, deed_type_id)): Path<(String, String)>,
) -> ApiResult {
    let parent_id: ParentId = errors::parse_id(&parent_id)?;
    let deed_type_id: DeedTypeId = errors::parse_id(&deed_type_id)?;
    services
        .registry
        .delete_deed_type(parent_id, deed_type_id)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn delete_deed(
    Extension(services): Extension<Arc<AppServices>>,
    Path((parent_id, deed_id)): Path<(String, String)>,
) -> ApiResult {
    let parent_id: ParentId = errors::parse_id(&parent_id)?;
    let deed_id: DeedId = errors::parse_id(&deed_id)?;
    services
        .engine
        .delete_deed(parent_id, deed_id)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

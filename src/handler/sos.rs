use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        bookingdtos::{AcceptRequestDto, CreateSosDto, LocationUpdateDto},
        ApiResponse, ListResponse, RequestQueryDto,
    },
    error::HttpError,
    handler::OptionalJson,
    middleware::AuthSession,
    AppState,
};

pub fn sos_handler() -> Router {
    Router::new()
        .route("/", post(create_request).get(list_my_requests))
        .route("/open", get(list_open))
        .route("/:id", get(get_request))
        .route("/:id/accept", put(accept_request))
        .route("/:id/cancel", put(cancel_request))
        .route("/:id/start", put(start_request))
        .route("/:id/resolve", put(resolve_request))
        .route("/:id/location", put(update_location))
}

pub async fn create_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<CreateSosDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let sos = app_state.sos_service.create_request(&session, body).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(sos))))
}

pub async fn list_my_requests(
    Query(query_params): Query<RequestQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    query_params.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (limit, offset) = query_params.limit_offset();
    let requests = app_state.sos_service.list_my_requests(&session, limit, offset).await?;

    Ok(Json(ListResponse::success(requests)))
}

/// Pending emergencies, most urgent first.
pub async fn list_open(
    Query(query_params): Query<RequestQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    query_params.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (limit, offset) = query_params.limit_offset();
    let requests = app_state.sos_service.list_open(&session, limit, offset).await?;

    Ok(Json(ListResponse::success(requests)))
}

pub async fn get_request(
    Path(sos_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let sos = app_state.sos_service.get_request(&session, sos_id).await?;
    Ok(Json(ApiResponse::success(sos)))
}

pub async fn accept_request(
    Path(sos_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    OptionalJson(body): OptionalJson<AcceptRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.unwrap_or_default();
    let location = body.coordinates().map_err(HttpError::bad_request)?;

    let sos = app_state.sos_service.accept_request(&session, sos_id, location).await?;
    Ok(Json(ApiResponse::success(sos)))
}

pub async fn cancel_request(
    Path(sos_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let sos = app_state.sos_service.cancel_request(&session, sos_id).await?;
    Ok(Json(ApiResponse::success(sos)))
}

pub async fn start_request(
    Path(sos_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let sos = app_state.sos_service.start_request(&session, sos_id).await?;
    Ok(Json(ApiResponse::success(sos)))
}

pub async fn resolve_request(
    Path(sos_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let sos = app_state.sos_service.resolve_request(&session, sos_id).await?;
    Ok(Json(ApiResponse::success(sos)))
}

pub async fn update_location(
    Path(sos_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<LocationUpdateDto>,
) -> Result<impl IntoResponse, HttpError> {
    let sos = app_state.sos_service
        .update_mechanic_location(&session, sos_id, body.into())
        .await?;

    Ok(Json(ApiResponse::success(sos)))
}

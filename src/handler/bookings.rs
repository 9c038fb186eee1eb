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
        bookingdtos::{AcceptRequestDto, CompleteBookingDto, CreateBookingDto, LocationUpdateDto, ReviewBookingDto},
        ApiResponse, ListResponse, RequestQueryDto,
    },
    error::HttpError,
    handler::OptionalJson,
    middleware::AuthSession,
    AppState,
};

pub fn bookings_handler() -> Router {
    Router::new()
        .route("/", post(create_booking).get(list_my_bookings))
        .route("/pending", get(list_pending))
        .route("/:id", get(get_booking))
        .route("/:id/accept", put(accept_booking))
        .route("/:id/reject", put(reject_booking))
        .route("/:id/cancel", put(cancel_booking))
        .route("/:id/start", put(start_booking))
        .route("/:id/complete", put(complete_booking))
        .route("/:id/review", post(review_booking))
        .route("/:id/location", put(update_location))
        .route("/:id/route", get(get_route))
}

pub async fn create_booking(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<CreateBookingDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let booking = app_state.booking_service.create_booking(&session, body).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(booking))))
}

pub async fn list_my_bookings(
    Query(query_params): Query<RequestQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    query_params.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (limit, offset) = query_params.limit_offset();
    let bookings = app_state.booking_service
        .list_my_bookings(&session, limit, offset)
        .await?;

    Ok(Json(ListResponse::success(bookings)))
}

/// The open pool, for mechanics.
pub async fn list_pending(
    Query(query_params): Query<RequestQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    query_params.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (limit, offset) = query_params.limit_offset();
    let bookings = app_state.booking_service
        .list_pending(&session, limit, offset)
        .await?;

    Ok(Json(ListResponse::success(bookings)))
}

pub async fn get_booking(
    Path(booking_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let details = app_state.booking_service
        .get_booking_details(&session, booking_id)
        .await?;

    Ok(Json(ApiResponse::success(details)))
}

pub async fn accept_booking(
    Path(booking_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    OptionalJson(body): OptionalJson<AcceptRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.unwrap_or_default();
    let location = body.coordinates().map_err(HttpError::bad_request)?;

    let booking = app_state.booking_service
        .accept_booking(&session, booking_id, location)
        .await?;

    Ok(Json(ApiResponse::success(booking)))
}

pub async fn reject_booking(
    Path(booking_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let booking = app_state.booking_service.reject_booking(&session, booking_id).await?;
    Ok(Json(ApiResponse::success(booking)))
}

pub async fn cancel_booking(
    Path(booking_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let booking = app_state.booking_service.cancel_booking(&session, booking_id).await?;
    Ok(Json(ApiResponse::success(booking)))
}

pub async fn start_booking(
    Path(booking_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let booking = app_state.booking_service.start_booking(&session, booking_id).await?;
    Ok(Json(ApiResponse::success(booking)))
}

pub async fn complete_booking(
    Path(booking_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    OptionalJson(body): OptionalJson<CompleteBookingDto>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.unwrap_or_default();
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let booking = app_state.booking_service
        .complete_booking(&session, booking_id, body.final_cost)
        .await?;

    Ok(Json(ApiResponse::success(booking)))
}

pub async fn review_booking(
    Path(booking_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<ReviewBookingDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let booking = app_state.booking_service
        .review_booking(&session, booking_id, body.rating)
        .await?;

    Ok(Json(ApiResponse::success(booking)))
}

/// Periodic position push from the assigned mechanic's device.
pub async fn update_location(
    Path(booking_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<LocationUpdateDto>,
) -> Result<impl IntoResponse, HttpError> {
    let booking = app_state.booking_service
        .update_mechanic_location(&session, booking_id, body.into())
        .await?;

    Ok(Json(ApiResponse::success(booking)))
}

/// Route and ETA between mechanic and customer. A failing directions service
/// is reported inside the view, not as an error status.
pub async fn get_route(
    Path(booking_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let view = app_state.tracking_service
        .tracking_view(&session, booking_id)
        .await?;

    Ok(Json(ApiResponse::success(view)))
}

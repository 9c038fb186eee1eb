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
        chatdtos::{SendMessageDto, UnreadCountDto},
        ApiResponse, ListResponse, RequestQueryDto,
    },
    error::HttpError,
    middleware::AuthSession,
    AppState,
};

pub fn chat_handler() -> Router {
    Router::new()
        .route("/rooms", get(list_rooms))
        .route("/unread", get(unread_count))
        .route("/bookings/:booking_id", get(open_booking_room))
        .route("/rooms/:room_id/messages", get(get_messages).post(send_message))
        .route("/rooms/:room_id/read", put(mark_read))
}

pub async fn list_rooms(
    Query(query_params): Query<RequestQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    query_params.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (limit, offset) = query_params.limit_offset();
    let rooms = app_state.chat_service.list_rooms(&session, limit, offset).await?;

    Ok(Json(ListResponse::success(rooms)))
}

pub async fn unread_count(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let unread = app_state.chat_service.unread_count(&session).await?;
    Ok(Json(ApiResponse::success(UnreadCountDto { unread })))
}

/// Opens the booking's room: creates it if missing, marks the other party's
/// messages read, returns the history oldest first.
pub async fn open_booking_room(
    Path(booking_id): Path<Uuid>,
    Query(query_params): Query<RequestQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    query_params.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (limit, offset) = query_params.limit_offset();
    let history = app_state.chat_service
        .open_room(&session, booking_id, limit, offset)
        .await?;

    Ok(Json(ApiResponse::success(history)))
}

pub async fn get_messages(
    Path(room_id): Path<Uuid>,
    Query(query_params): Query<RequestQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    query_params.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (limit, offset) = query_params.limit_offset();
    let messages = app_state.chat_service
        .get_messages(&session, room_id, limit, offset)
        .await?;

    Ok(Json(ListResponse::success(messages)))
}

pub async fn send_message(
    Path(room_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<SendMessageDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let message = app_state.chat_service
        .send_message(&session, room_id, &body.message_text)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(message))))
}

pub async fn mark_read(
    Path(room_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let marked = app_state.chat_service.mark_read(&session, room_id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({ "marked_read": marked }))))
}

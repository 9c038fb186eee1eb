use std::{sync::Arc, time::Duration};

use axum::{
    extract::Path,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Extension, Router,
};
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::{
    error::HttpError,
    middleware::AuthSession,
    service::realtime::{ChangeEvent, ChangeFilter, ChangeKind, ChangeTable, Subscription, Viewer},
    AppState,
};

pub fn realtime_handler() -> Router {
    Router::new()
        .route("/me", get(stream_mine))
        .route("/bookings/:id", get(stream_booking))
        .route("/sos/:id", get(stream_sos))
        .route("/rooms/:id", get(stream_room))
}

/// Own rows, plus the open request pool for mechanics.
pub async fn stream_mine(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> impl IntoResponse {
    let subscription = app_state.realtime.subscribe(ChangeFilter::VisibleTo {
        user_id: session.user_id,
        is_mechanic: session.is_mechanic(),
    });
    sse(subscription)
}

pub async fn stream_booking(
    Path(booking_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    app_state.booking_service.get_booking_details(&session, booking_id).await?;

    let subscription = app_state.realtime.subscribe(ChangeFilter::Row {
        table: ChangeTable::Bookings,
        row_id: booking_id,
        viewer: Viewer::of(&session),
    });
    Ok(sse(subscription))
}

pub async fn stream_sos(
    Path(sos_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    app_state.sos_service.get_request(&session, sos_id).await?;

    let subscription = app_state.realtime.subscribe(ChangeFilter::Row {
        table: ChangeTable::SosRequests,
        row_id: sos_id,
        viewer: Viewer::of(&session),
    });
    Ok(sse(subscription))
}

/// New messages in one chat room.
pub async fn stream_room(
    Path(room_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let subscription = app_state.chat_service.subscribe_room(&session, room_id).await?;
    Ok(sse(subscription))
}

fn sse(subscription: Subscription) -> impl IntoResponse {
    let stream = subscription.into_stream().map(|change| to_event(&change));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn to_event(change: &ChangeEvent) -> Result<Event, axum::Error> {
    let name = match change.kind {
        ChangeKind::Insert => "insert",
        ChangeKind::Update => "update",
    };
    Event::default()
        .event(name)
        .id(change.row_id.to_string())
        .json_data(change)
}

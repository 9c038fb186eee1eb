use std::sync::Arc;

use axum::{extract::Query, response::IntoResponse, routing::get, Extension, Json, Router};
use serde::Serialize;

use crate::{
    dtos::{bookingdtos::ReverseGeocodeQueryDto, ApiResponse},
    error::HttpError,
    models::bookingmodel::Coordinates,
    AppState,
};

pub fn maps_handler() -> Router {
    Router::new().route("/reverse", get(reverse_geocode))
}

#[derive(Debug, Serialize)]
pub struct AddressDto {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

pub async fn reverse_geocode(
    Query(query_params): Query<ReverseGeocodeQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let at = Coordinates::new(query_params.lat, query_params.lng);
    if !at.is_valid() {
        return Err(HttpError::bad_request("Coordinates are out of range"));
    }

    let address = app_state.geocoder.reverse(at).await?;

    Ok(Json(ApiResponse::success(AddressDto {
        latitude: at.latitude,
        longitude: at.longitude,
        address,
    })))
}

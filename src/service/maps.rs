// service/maps.rs
//! Routing and reverse geocoding over HTTP (OSRM and Nominatim compatible).
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::ServiceError;
use crate::models::bookingmodel::Coordinates;

const USER_AGENT: &str = concat!("mechnest/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEstimate {
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub path: Vec<Coordinates>,
}

impl RouteEstimate {
    pub fn eta_minutes(&self) -> i64 {
        (self.duration_seconds / 60.0).ceil() as i64
    }
}

#[async_trait]
pub trait DirectionsProvider: Send + Sync + std::fmt::Debug {
    async fn route(&self, from: Coordinates, to: Coordinates) -> Result<RouteEstimate, ServiceError>;
}

#[async_trait]
pub trait Geocoder: Send + Sync + std::fmt::Debug {
    async fn reverse(&self, at: Coordinates) -> Result<String, ServiceError>;
}

fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).user_agent(USER_AGENT).build()
}

#[derive(Debug, Clone)]
pub struct OsrmDirections {
    client: Client,
    base_url: String,
}

impl OsrmDirections {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// GeoJSON order: `[longitude, latitude]`.
    coordinates: Vec<[f64; 2]>,
}

fn parse_osrm(body: OsrmResponse) -> Result<RouteEstimate, ServiceError> {
    if body.code != "Ok" {
        return Err(ServiceError::Upstream(format!(
            "directions service returned {}: {}",
            body.code,
            body.message.unwrap_or_default()
        )));
    }
    let route = body
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::Upstream("directions service returned no route".to_string()))?;

    Ok(RouteEstimate {
        distance_meters: route.distance,
        duration_seconds: route.duration,
        path: route
            .geometry
            .coordinates
            .into_iter()
            .map(|[lng, lat]| Coordinates::new(lat, lng))
            .collect(),
    })
}

#[async_trait]
impl DirectionsProvider for OsrmDirections {
    async fn route(&self, from: Coordinates, to: Coordinates) -> Result<RouteEstimate, ServiceError> {
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url, from.longitude, from.latitude, to.longitude, to.latitude
        );

        let response = self.client.get(&url).send().await?;
        if response.status().is_server_error() {
            return Err(ServiceError::Upstream(format!(
                "directions service responded {}",
                response.status()
            )));
        }
        parse_osrm(response.json::<OsrmResponse>().await?)
    }
}

#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    display_name: Option<String>,
    error: Option<String>,
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, at: Coordinates) -> Result<String, ServiceError> {
        let url = format!("{}/reverse", self.base_url);
        let body: NominatimResponse = self
            .client
            .get(&url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", at.latitude.to_string()),
                ("lon", at.longitude.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match (body.display_name, body.error) {
            (Some(name), _) => Ok(name),
            (None, Some(err)) => Err(ServiceError::Upstream(err)),
            (None, None) => Err(ServiceError::Upstream("no address for this location".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_osrm_swaps_coordinate_order() {
        let body: OsrmResponse = serde_json::from_value(serde_json::json!({
            "code": "Ok",
            "routes": [{
                "distance": 1200.5,
                "duration": 301.0,
                "geometry": {"type": "LineString", "coordinates": [[77.2, 28.6], [77.21, 28.61]]}
            }]
        }))
        .unwrap();

        let route = parse_osrm(body).unwrap();
        assert_eq!(route.path[0], Coordinates::new(28.6, 77.2));
        assert_eq!(route.eta_minutes(), 6);
    }

    #[test]
    fn test_parse_osrm_error_code() {
        let body: OsrmResponse =
            serde_json::from_value(serde_json::json!({"code": "NoRoute", "message": "Impossible route"})).unwrap();
        assert!(matches!(parse_osrm(body), Err(ServiceError::Upstream(_))));
    }
}

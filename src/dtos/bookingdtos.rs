use serde::{Deserialize, Serialize};
use validator::Validate;

use super::pair_coordinates;
use crate::models::bookingmodel::{Coordinates, NewBooking, NewSosRequest, UrgencyLevel, VehicleType};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBookingDto {
    #[validate(length(min = 1, max = 100, message = "Service type is required"))]
    pub service_type: String,

    pub vehicle_type: VehicleType,

    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 255, message = "Location is required"))]
    pub location: String,

    pub latitude: Option<f64>,

    pub longitude: Option<f64>,

    /// Minor currency units.
    #[validate(range(min = 0, message = "Estimated cost cannot be negative"))]
    pub estimated_cost: Option<i64>,
}

impl CreateBookingDto {
    pub fn into_new_booking(self) -> Result<NewBooking, String> {
        Ok(NewBooking {
            coordinates: pair_coordinates(self.latitude, self.longitude)?,
            service_type: self.service_type.trim().to_string(),
            vehicle_type: self.vehicle_type,
            description: self.description,
            location: self.location.trim().to_string(),
            estimated_cost: self.estimated_cost,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSosDto {
    #[validate(length(min = 1, max = 100, message = "Service type is required"))]
    pub service_type: String,

    pub vehicle_type: VehicleType,

    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 255, message = "Location is required"))]
    pub location: String,

    pub latitude: Option<f64>,

    pub longitude: Option<f64>,

    #[serde(default = "default_urgency")]
    pub urgency_level: UrgencyLevel,
}

fn default_urgency() -> UrgencyLevel {
    UrgencyLevel::High
}

impl CreateSosDto {
    pub fn into_new_request(self) -> Result<NewSosRequest, String> {
        Ok(NewSosRequest {
            coordinates: pair_coordinates(self.latitude, self.longitude)?,
            service_type: self.service_type.trim().to_string(),
            vehicle_type: self.vehicle_type,
            description: self.description,
            location: self.location.trim().to_string(),
            urgency_level: self.urgency_level,
        })
    }
}

/// Optional current position of the accepting mechanic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AcceptRequestDto {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl AcceptRequestDto {
    pub fn coordinates(&self) -> Result<Option<Coordinates>, String> {
        pair_coordinates(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CompleteBookingDto {
    #[validate(range(min = 0, message = "Final cost cannot be negative"))]
    pub final_cost: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReviewBookingDto {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct LocationUpdateDto {
    pub latitude: f64,

    pub longitude: f64,
}

impl From<LocationUpdateDto> for Coordinates {
    fn from(dto: LocationUpdateDto) -> Self {
        Coordinates::new(dto.latitude, dto.longitude)
    }
}

impl From<Coordinates> for LocationUpdateDto {
    fn from(coordinates: Coordinates) -> Self {
        Self {
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReverseGeocodeQueryDto {
    pub lat: f64,
    pub lng: f64,
}

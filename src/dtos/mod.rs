pub mod bookingdtos;
pub mod chatdtos;
pub mod storedtos;
pub mod userdtos;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::bookingmodel::Coordinates;

/// `{"status": "success", "data": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub status: String,
    pub data: Vec<T>,
    pub results: usize,
}

impl<T> ListResponse<T> {
    pub fn success(data: Vec<T>) -> Self {
        Self {
            status: "success".to_string(),
            results: data.len(),
            data,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct Response {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct RequestQueryDto {
    #[validate(range(min = 1, max = 100_000))]
    pub page: Option<usize>,
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
}

impl RequestQueryDto {
    pub const DEFAULT_LIMIT: usize = 20;

    pub fn limit_offset(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(Self::DEFAULT_LIMIT);
        let page = self.page.unwrap_or(1).max(1);
        let offset = (page - 1).saturating_mul(limit);
        (
            i64::try_from(limit).unwrap_or(i64::MAX),
            i64::try_from(offset).unwrap_or(i64::MAX),
        )
    }
}

/// Latitude and longitude travel together: both or neither.
pub fn pair_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<Option<Coordinates>, String> {
    match (latitude, longitude) {
        (None, None) => Ok(None),
        (Some(latitude), Some(longitude)) => {
            let coordinates = Coordinates::new(latitude, longitude);
            if coordinates.is_valid() {
                Ok(Some(coordinates))
            } else {
                Err("Coordinates are out of range".to_string())
            }
        }
        _ => Err("Latitude and longitude must be provided together".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_offset_defaults() {
        assert_eq!(RequestQueryDto::default().limit_offset(), (20, 0));
        let query = RequestQueryDto { page: Some(3), limit: Some(10) };
        assert_eq!(query.limit_offset(), (10, 20));
    }

    #[test]
    fn test_huge_page_never_overflows() {
        let query = RequestQueryDto { page: Some(usize::MAX), limit: Some(50) };
        let (limit, offset) = query.limit_offset();
        assert_eq!(limit, 50);
        assert!(offset >= 0);
        assert!(query.validate().is_err());
        assert!(RequestQueryDto { page: Some(100_000), limit: Some(50) }.validate().is_ok());
    }

    #[test]
    fn test_pair_coordinates() {
        assert_eq!(pair_coordinates(None, None), Ok(None));
        assert!(pair_coordinates(Some(1.0), None).is_err());
        assert!(pair_coordinates(Some(100.0), Some(0.0)).is_err());
        assert_eq!(pair_coordinates(Some(1.0), Some(2.0)), Ok(Some(Coordinates::new(1.0, 2.0))));
    }
}

use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::{db::query_timeout::QueryTimeout, error::HttpError, models::bookingmodel::BookingStatus};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Authentication required")]
    AuthRequired,

    #[error("You are not allowed to {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Request {0} is {1:?} and cannot be moved to {2:?}")]
    InvalidStatus(Uuid, BookingStatus, BookingStatus),

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        if QueryTimeout::is_timeout(&err) {
            ServiceError::Timeout(err.to_string())
        } else {
            ServiceError::Database(err)
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(err.to_string())
        } else {
            ServiceError::Upstream(err.to_string())
        }
    }
}

impl From<String> for ServiceError {
    fn from(err: String) -> Self {
        ServiceError::Other(err)
    }
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ServiceError::NotFound(what.into())
    }

    pub fn forbidden(action: impl Into<String>) -> Self {
        ServiceError::Forbidden(action.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::AuthRequired => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) | ServiceError::InvalidStatus(..) => StatusCode::CONFLICT,
            ServiceError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Database(_) | ServiceError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        HttpError::new(error.to_string(), error.status_code())
    }
}

impl From<sqlx::Error> for HttpError {
    fn from(error: sqlx::Error) -> Self {
        ServiceError::from(error).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_timeout_maps_to_gateway_timeout() {
        let err = sqlx::Error::Io(IoError::new(ErrorKind::TimedOut, "slow"));
        let http: HttpError = err.into();
        assert_eq!(http.status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_other_database_errors_are_internal() {
        let http: HttpError = sqlx::Error::RowNotFound.into();
        assert_eq!(http.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_invalid_status_is_conflict() {
        let err = ServiceError::InvalidStatus(Uuid::nil(), BookingStatus::Cancelled, BookingStatus::Confirmed);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.to_string().contains("Cancelled"));
    }
}

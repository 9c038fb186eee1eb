use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bookingmodel::Coordinates;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Mechanic,
    Admin,
}

impl UserRole {
    pub fn to_str(&self) -> &str {
        match self {
            UserRole::User => "user",
            UserRole::Mechanic => "mechanic",
            UserRole::Admin => "admin",
        }
    }
}

/// Auth identity. The marketplace role lives on [`Profile`], not here.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Profile {
    pub user_id: Uuid,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub is_available: bool,
    pub is_verified: bool,
    pub rating: f64,
    pub total_reviews: i32,
    pub services_offered: Vec<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub verification_photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_mechanic(&self) -> bool {
        self.role == UserRole::Mechanic
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.latitude, self.longitude)
    }

    pub fn offers(&self, service: &str) -> bool {
        let wanted = service.trim().to_lowercase();
        self.services_offered.iter().any(|s| *s == wanted)
    }

    /// Running average after one more review.
    pub fn with_review(&self, rating: i16) -> (f64, i32) {
        let total = self.total_reviews + 1;
        let sum = self.rating * self.total_reviews as f64 + rating as f64;
        ((sum / total as f64 * 100.0).round() / 100.0, total)
    }
}

/// Partial profile edit; `None` leaves the column untouched.
#[derive(Debug, Default, Clone)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub is_available: Option<bool>,
    pub services_offered: Option<Vec<String>>,
    pub location: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub verification_photo_url: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct MechanicFilter {
    pub service: Option<String>,
    pub verified_only: bool,
    pub limit: i64,
    pub offset: i64,
}

impl MechanicFilter {
    pub fn matches(&self, profile: &Profile) -> bool {
        profile.is_mechanic()
            && profile.is_available
            && (!self.verified_only || profile.is_verified)
            && self.service.as_deref().map_or(true, |s| profile.offers(s))
    }
}

/// Services are stored lowercase, trimmed, sorted and unique.
pub fn normalize_services(services: &[String]) -> Vec<String> {
    let set: std::collections::BTreeSet<String> = services
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    set.into_iter().collect()
}

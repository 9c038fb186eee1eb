use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::usermodel::{Profile, UserRole};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Self { latitude, longitude }),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "vehicle_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Bicycle,
    Bike,
    Car,
    Truck,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, PartialOrd, Ord)]
#[sqlx(type_name = "urgency_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Lifecycle shared by bookings and SOS requests.
///
/// ```text
/// pending -> confirmed -> in_progress -> completed
/// pending -> rejected
/// pending | confirmed | in_progress -> cancelled
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    pub const CANCELLABLE: [BookingStatus; 3] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
    ];

    pub const ACTIVE: [BookingStatus; 2] = [BookingStatus::Confirmed, BookingStatus::InProgress];

    pub fn to_str(&self) -> &str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Rejected | BookingStatus::Cancelled
        )
    }

    /// Statuses during which the mechanic's position is tracked.
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Confirmed, InProgress)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }

    /// Source states from which `next` is reachable.
    pub fn sources_of(next: BookingStatus) -> Vec<BookingStatus> {
        use BookingStatus::*;
        [Pending, Confirmed, InProgress, Completed, Rejected, Cancelled]
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mechanic_id: Option<Uuid>,
    pub service_type: String,
    pub vehicle_type: VehicleType,
    pub description: Option<String>,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub mechanic_latitude: Option<f64>,
    pub mechanic_longitude: Option<f64>,
    pub mechanic_location_updated_at: Option<DateTime<Utc>>,
    pub status: BookingStatus,
    pub estimated_cost: Option<i64>,
    pub final_cost: Option<i64>,
    pub customer_rating: Option<i16>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.user_id == user_id || self.mechanic_id == Some(user_id)
    }

    pub fn customer_location(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.latitude, self.longitude)
    }

    pub fn mechanic_location(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.mechanic_latitude, self.mechanic_longitude)
    }

    /// Who is allowed to see change events for this row.
    pub fn audience(&self) -> Vec<Uuid> {
        let mut audience = vec![self.user_id];
        audience.extend(self.mechanic_id);
        audience
    }
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub service_type: String,
    pub vehicle_type: VehicleType,
    pub description: Option<String>,
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub estimated_cost: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SosRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub assigned_mechanic_id: Option<Uuid>,
    pub service_type: String,
    pub vehicle_type: VehicleType,
    pub description: Option<String>,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub mechanic_latitude: Option<f64>,
    pub mechanic_longitude: Option<f64>,
    pub mechanic_location_updated_at: Option<DateTime<Utc>>,
    pub status: BookingStatus,
    pub urgency_level: UrgencyLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SosRequest {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.user_id == user_id || self.assigned_mechanic_id == Some(user_id)
    }

    pub fn audience(&self) -> Vec<Uuid> {
        let mut audience = vec![self.user_id];
        audience.extend(self.assigned_mechanic_id);
        audience
    }
}

#[derive(Debug, Clone)]
pub struct NewSosRequest {
    pub service_type: String,
    pub vehicle_type: VehicleType,
    pub description: Option<String>,
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub urgency_level: UrgencyLevel,
}

/// The public face of a profile when embedded next to a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub user_id: Uuid,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub rating: f64,
    pub total_reviews: i32,
    pub is_verified: bool,
}

impl From<&Profile> for ProfileSummary {
    fn from(profile: &Profile) -> Self {
        Self {
            user_id: profile.user_id,
            full_name: profile.full_name.clone(),
            phone: profile.phone.clone(),
            role: profile.role,
            rating: profile.rating,
            total_reviews: profile.total_reviews,
            is_verified: profile.is_verified,
        }
    }
}

/// A booking with its related profiles resolved to exactly one or none each.
#[derive(Debug, Clone, Serialize)]
pub struct BookingDetails {
    pub booking: Booking,
    pub customer: Option<ProfileSummary>,
    pub mechanic: Option<ProfileSummary>,
}

impl BookingDetails {
    pub fn assemble(booking: Booking, profiles: &[Profile]) -> Self {
        let find = |id: Uuid| {
            profiles
                .iter()
                .find(|p| p.user_id == id)
                .map(ProfileSummary::from)
        };
        let customer = find(booking.user_id);
        let mechanic = booking.mechanic_id.and_then(find);
        Self { booking, customer, mechanic }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Completed));
    }

    #[test]
    fn test_reject_only_from_pending() {
        assert_eq!(BookingStatus::sources_of(Rejected), vec![Pending]);
    }

    #[test]
    fn test_cancel_sources() {
        assert_eq!(BookingStatus::sources_of(Cancelled), BookingStatus::CANCELLABLE.to_vec());
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [Completed, Rejected, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Confirmed, InProgress, Completed, Rejected, Cancelled] {
                assert!(!terminal.can_transition_to(next), "{:?} -> {:?}", terminal, next);
            }
        }
    }

    #[test]
    fn test_accept_requires_pending() {
        for status in [Confirmed, InProgress, Completed, Rejected, Cancelled] {
            assert!(!status.can_transition_to(Confirmed));
        }
    }

    #[test]
    fn test_coordinates_validation() {
        assert!(Coordinates::new(12.97, 77.59).is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, f64::NAN).is_valid());
        assert_eq!(Coordinates::from_parts(Some(1.0), None), None);
    }

    #[test]
    fn test_urgency_ordering() {
        assert!(UrgencyLevel::Critical > UrgencyLevel::High);
        assert!(UrgencyLevel::Low < UrgencyLevel::Medium);
    }
}

// service/tracking.rs
//! Live mechanic tracking. The mechanic's device runs a [`LocationTracker`]
//! that samples its position on an interval and pushes it to the backend;
//! the customer's side renders a [`TrackingView`] built from both coordinates.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    db::DataStore,
    dtos::bookingdtos::LocationUpdateDto,
    middleware::AuthSession,
    models::bookingmodel::{Booking, Coordinates},
    service::{
        error::ServiceError,
        maps::{DirectionsProvider, RouteEstimate},
        realtime::{ChangeEvent, ChangeTable},
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MapState {
    /// At least one coordinate is missing, so there is nothing to route.
    AwaitingLocation,
    Ready,
    /// The directions service failed. Distinct from an empty route.
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingView {
    pub booking_id: Uuid,
    pub customer: Option<Coordinates>,
    pub mechanic: Option<Coordinates>,
    pub route: Option<RouteEstimate>,
    pub eta_minutes: Option<i64>,
    pub map_state: MapState,
}

impl TrackingView {
    pub fn new(booking_id: Uuid, customer: Option<Coordinates>, mechanic: Option<Coordinates>) -> Self {
        Self {
            booking_id,
            customer,
            mechanic,
            route: None,
            eta_minutes: None,
            map_state: MapState::AwaitingLocation,
        }
    }

    pub fn from_booking(booking: &Booking) -> Self {
        Self::new(booking.id, booking.customer_location(), booking.mechanic_location())
    }

    pub fn set_mechanic(&mut self, mechanic: Option<Coordinates>) {
        self.mechanic = mechanic;
    }

    /// Recomputes the route when both ends are known; otherwise clears it.
    pub async fn refresh(&mut self, directions: &dyn DirectionsProvider) {
        let (Some(from), Some(to)) = (self.mechanic, self.customer) else {
            self.route = None;
            self.eta_minutes = None;
            self.map_state = MapState::AwaitingLocation;
            return;
        };

        match directions.route(from, to).await {
            Ok(route) => {
                self.eta_minutes = Some(route.eta_minutes());
                self.route = Some(route);
                self.map_state = MapState::Ready;
            }
            Err(e) => {
                warn!("Directions unavailable for booking {}: {}", self.booking_id, e);
                self.route = None;
                self.eta_minutes = None;
                self.map_state = MapState::Unavailable { reason: e.to_string() };
            }
        }
    }

    /// Applies a booking row update from the realtime feed. Returns whether
    /// either coordinate changed, i.e. whether a refresh is due.
    pub fn apply_event(&mut self, event: &ChangeEvent) -> bool {
        if event.table != ChangeTable::Bookings || event.row_id != self.booking_id {
            return false;
        }
        let Ok(booking) = serde_json::from_value::<Booking>(event.payload.clone()) else {
            return false;
        };
        let (customer, mechanic) = (booking.customer_location(), booking.mechanic_location());
        let changed = customer != self.customer || mechanic != self.mechanic;
        self.customer = customer;
        self.mechanic = mechanic;
        changed
    }
}

#[derive(Debug, Clone)]
pub struct TrackingService {
    db_client: Arc<dyn DataStore>,
    directions: Arc<dyn DirectionsProvider>,
}

impl TrackingService {
    pub fn new(db_client: Arc<dyn DataStore>, directions: Arc<dyn DirectionsProvider>) -> Self {
        Self { db_client, directions }
    }

    /// Route and ETA between the assigned mechanic and the customer.
    pub async fn tracking_view(&self, session: &AuthSession, booking_id: Uuid) -> Result<TrackingView, ServiceError> {
        let booking = self
            .db_client
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Booking {}", booking_id)))?;
        if !booking.is_participant(session.user_id) {
            return Err(ServiceError::forbidden("track this booking"));
        }

        let mut view = TrackingView::from_booking(&booking);
        view.refresh(self.directions.as_ref()).await;
        Ok(view)
    }
}

/// One-shot device position, best effort.
#[async_trait]
pub trait GeolocationSource: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, String>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PushError {
    /// The booking no longer takes positions from this device, e.g. it was
    /// completed, cancelled or handed to someone else.
    #[error("booking is no longer tracked: {0}")]
    Stop(String),
    #[error("location push failed: {0}")]
    Failed(String),
}

/// Where sampled positions go.
#[async_trait]
pub trait LocationSink: Send + Sync {
    async fn push(&self, booking_id: Uuid, position: Coordinates) -> Result<(), PushError>;
}

/// A source that always reports the same position, or always fails when empty.
#[derive(Debug, Clone, Copy)]
pub struct FixedGeolocation(pub Option<Coordinates>);

#[async_trait]
impl GeolocationSource for FixedGeolocation {
    async fn current_position(&self) -> Result<Coordinates, String> {
        self.0.ok_or_else(|| "position unavailable".to_string())
    }
}

/// Pushes positions to `PUT /api/bookings/:id/location`.
#[derive(Debug, Clone)]
pub struct ApiLocationSink {
    client: Client,
    base_url: String,
    token: String,
}

impl ApiLocationSink {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl LocationSink for ApiLocationSink {
    async fn push(&self, booking_id: Uuid, position: Coordinates) -> Result<(), PushError> {
        let url = format!("{}/api/bookings/{}/location", self.base_url, booking_id);
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(&LocationUpdateDto::from(position))
            .send()
            .await
            .map_err(|e| PushError::Failed(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            status @ (StatusCode::CONFLICT | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND) => {
                Err(PushError::Stop(status.to_string()))
            }
            status => Err(PushError::Failed(status.to_string())),
        }
    }
}

pub struct LocationTracker {
    source: Arc<dyn GeolocationSource>,
    sink: Arc<dyn LocationSink>,
    interval: Duration,
    fallback: Coordinates,
}

impl LocationTracker {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

    pub fn new(
        source: Arc<dyn GeolocationSource>,
        sink: Arc<dyn LocationSink>,
        interval: Duration,
        fallback: Coordinates,
    ) -> Self {
        Self { source, sink, interval, fallback }
    }

    /// Interval and fallback position from `TRACKING_INTERVAL_SECS` and
    /// `DEFAULT_LATITUDE`/`DEFAULT_LONGITUDE`.
    pub fn from_config(
        config: &Config,
        source: Arc<dyn GeolocationSource>,
        sink: Arc<dyn LocationSink>,
    ) -> Self {
        Self::new(
            source,
            sink,
            Duration::from_secs(config.tracking_interval_secs.max(1)),
            config.default_location,
        )
    }

    /// Current position, or the fallback when the device cannot tell.
    pub async fn sample(&self) -> Coordinates {
        match self.source.current_position().await {
            Ok(position) if position.is_valid() => position,
            Ok(_) | Err(_) => self.fallback,
        }
    }

    /// Samples immediately and then every interval until the handle is stopped
    /// or dropped, or the sink reports the booking is no longer active.
    pub fn start(self, booking_id: Uuid) -> TrackerHandle {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let position = self.sample().await;
                match self.sink.push(booking_id, position).await {
                    Ok(()) => debug!("Pushed location for booking {}", booking_id),
                    Err(PushError::Stop(reason)) => {
                        info!("Stopped tracking booking {}: {}", booking_id, reason);
                        break;
                    }
                    Err(e) => warn!("Location push for booking {} failed: {}", booking_id, e),
                }
            }
        });
        TrackerHandle { task }
    }
}

/// Owns the tracker task. Stopping or dropping it cancels the timer.
#[derive(Debug)]
pub struct TrackerHandle {
    task: JoinHandle<()>,
}

impl TrackerHandle {
    pub fn stop(self) {
        // Drop does the work.
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        db::bookingdb::BookingExt,
        models::{bookingmodel::*, usermodel::UserRole},
        service::{
            realtime::ChangeKind,
            test_support::{session, store},
        },
    };

    #[derive(Debug)]
    struct FakeDirections {
        fail: bool,
    }

    #[async_trait]
    impl DirectionsProvider for FakeDirections {
        async fn route(&self, from: Coordinates, to: Coordinates) -> Result<RouteEstimate, ServiceError> {
            if self.fail {
                return Err(ServiceError::Upstream("map tiles down".to_string()));
            }
            Ok(RouteEstimate {
                distance_meters: 2_000.0,
                duration_seconds: 390.0,
                path: vec![from, to],
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        pushed: Mutex<Vec<Coordinates>>,
        /// Answer `Stop` once this many positions were accepted.
        active_for: Option<usize>,
    }

    #[async_trait]
    impl LocationSink for RecordingSink {
        async fn push(&self, _booking_id: Uuid, position: Coordinates) -> Result<(), PushError> {
            let mut pushed = self.pushed.lock().unwrap();
            if self.active_for.is_some_and(|n| pushed.len() >= n) {
                return Err(PushError::Stop("409 Conflict".to_string()));
            }
            pushed.push(position);
            Ok(())
        }
    }

    const CUSTOMER: Coordinates = Coordinates { latitude: 12.97, longitude: 77.59 };
    const MECHANIC: Coordinates = Coordinates { latitude: 12.93, longitude: 77.62 };

    #[tokio::test]
    async fn test_missing_coordinate_clears_route_and_eta() {
        let directions = FakeDirections { fail: false };
        let mut view = TrackingView::new(Uuid::new_v4(), Some(CUSTOMER), Some(MECHANIC));
        view.refresh(&directions).await;
        assert_eq!(view.eta_minutes, Some(7));
        assert_eq!(view.map_state, MapState::Ready);

        view.set_mechanic(None);
        view.refresh(&directions).await;
        assert!(view.route.is_none());
        assert!(view.eta_minutes.is_none());
        assert_eq!(view.map_state, MapState::AwaitingLocation);
    }

    #[tokio::test]
    async fn test_directions_failure_is_distinct_state() {
        let mut view = TrackingView::new(Uuid::new_v4(), Some(CUSTOMER), Some(MECHANIC));
        view.refresh(&FakeDirections { fail: true }).await;

        assert!(view.route.is_none());
        assert!(matches!(view.map_state, MapState::Unavailable { .. }));
    }

    #[test]
    fn test_apply_event_tracks_mechanic_position() {
        let booking_id = Uuid::new_v4();
        let mut view = TrackingView::new(booking_id, Some(CUSTOMER), None);
        let now = chrono::Utc::now();
        let booking = Booking {
            id: booking_id,
            user_id: Uuid::new_v4(),
            mechanic_id: Some(Uuid::new_v4()),
            service_type: "tyre".to_string(),
            vehicle_type: VehicleType::Car,
            description: None,
            location: "x".to_string(),
            latitude: Some(CUSTOMER.latitude),
            longitude: Some(CUSTOMER.longitude),
            mechanic_latitude: Some(MECHANIC.latitude),
            mechanic_longitude: Some(MECHANIC.longitude),
            mechanic_location_updated_at: Some(now),
            status: BookingStatus::InProgress,
            estimated_cost: None,
            final_cost: None,
            customer_rating: None,
            created_at: now,
            updated_at: now,
            accepted_at: Some(now),
            completed_at: None,
        };
        let event = ChangeEvent::new(ChangeTable::Bookings, ChangeKind::Update, booking_id, &booking);

        assert!(view.apply_event(&event));
        assert_eq!(view.mechanic, Some(MECHANIC));
        assert!(!view.apply_event(&event));
    }

    #[tokio::test]
    async fn test_tracking_view_for_participants_only() {
        let store = store();
        let customer = session(&store, UserRole::User).await;
        let mechanic = session(&store, UserRole::Mechanic).await;
        let booking = store
            .create_booking(
                customer.user_id,
                NewBooking {
                    service_type: "tyre".to_string(),
                    vehicle_type: VehicleType::Bike,
                    description: None,
                    location: "Koramangala".to_string(),
                    coordinates: Some(CUSTOMER),
                    estimated_cost: None,
                },
            )
            .await
            .unwrap();
        let service = TrackingService::new(store.clone(), Arc::new(FakeDirections { fail: false }));

        let view = service.tracking_view(&customer, booking.id).await.unwrap();
        assert_eq!(view.map_state, MapState::AwaitingLocation);

        store.accept_booking(booking.id, mechanic.user_id, Some(MECHANIC)).await.unwrap();
        let view = service.tracking_view(&customer, booking.id).await.unwrap();
        assert_eq!(view.eta_minutes, Some(7));

        let stranger = session(&store, UserRole::User).await;
        assert!(service.tracking_view(&stranger, booking.id).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_falls_back_and_stops() {
        let sink = Arc::new(RecordingSink::default());
        let fallback = Coordinates::new(28.6139, 77.2090);
        let tracker = LocationTracker::from_config(
            &crate::config::test_config(),
            Arc::new(FixedGeolocation(None)),
            sink.clone(),
        );

        let handle = tracker.start(Uuid::new_v4());
        tokio::time::sleep(Duration::from_secs(25)).await;

        let pushed = sink.pushed.lock().unwrap().clone();
        assert_eq!(pushed.len(), 3);
        assert!(pushed.iter().all(|p| *p == fallback));
        assert!(handle.is_running());

        handle.stop();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sink.pushed.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_ends_when_booking_leaves_active_state() {
        let sink = Arc::new(RecordingSink { active_for: Some(2), ..Default::default() });
        let tracker = LocationTracker::new(
            Arc::new(FixedGeolocation(Some(MECHANIC))),
            sink.clone(),
            LocationTracker::DEFAULT_INTERVAL,
            CUSTOMER,
        );

        let handle = tracker.start(Uuid::new_v4());
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(sink.pushed.lock().unwrap().len(), 2);
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_sample_prefers_device_position() {
        let tracker = LocationTracker::new(
            Arc::new(FixedGeolocation(Some(MECHANIC))),
            Arc::new(RecordingSink::default()),
            LocationTracker::DEFAULT_INTERVAL,
            CUSTOMER,
        );
        assert_eq!(tracker.sample().await, MECHANIC);
    }
}

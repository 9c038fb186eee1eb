// service/booking_service.rs
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    db::DataStore,
    dtos::bookingdtos::CreateBookingDto,
    middleware::AuthSession,
    models::bookingmodel::*,
    service::{
        error::ServiceError,
        realtime::{ChangeEvent, ChangeKind, ChangeTable, RealtimeHub},
    },
};

#[derive(Debug, Clone)]
pub struct BookingService {
    db_client: Arc<dyn DataStore>,
    realtime: Arc<RealtimeHub>,
}

impl BookingService {
    pub fn new(db_client: Arc<dyn DataStore>, realtime: Arc<RealtimeHub>) -> Self {
        Self { db_client, realtime }
    }

    /// New bookings start `pending` with no mechanic. The chat room is opened
    /// right away so both sides can talk before acceptance.
    pub async fn create_booking(
        &self,
        session: &AuthSession,
        dto: CreateBookingDto,
    ) -> Result<Booking, ServiceError> {
        let new_booking = dto.into_new_booking().map_err(ServiceError::Validation)?;
        let booking = self.db_client.create_booking(session.user_id, new_booking).await?;

        if let Err(e) = self.db_client.create_or_get_room(booking.id).await {
            // The room is created lazily on first open if this fails.
            warn!("Failed to open chat room for booking {}: {}", booking.id, e);
        }

        info!("Booking {} created by {}", booking.id, session.user_id);
        self.publish(ChangeKind::Insert, &booking, true);
        Ok(booking)
    }

    /// First writer wins: the guarded update only matches an unassigned pending
    /// booking, and a losing accept is reported as a conflict.
    pub async fn accept_booking(
        &self,
        session: &AuthSession,
        booking_id: Uuid,
        location: Option<Coordinates>,
    ) -> Result<Booking, ServiceError> {
        session.require_mechanic("accept bookings")?;

        match self
            .db_client
            .accept_booking(booking_id, session.user_id, location)
            .await?
        {
            Some(booking) => {
                info!("Booking {} accepted by mechanic {}", booking.id, session.user_id);
                self.publish(ChangeKind::Update, &booking, true);
                Ok(booking)
            }
            None => {
                let current = self.load(booking_id).await?;
                Err(ServiceError::Conflict(format!(
                    "Booking {} can no longer be accepted, it is {}",
                    booking_id,
                    current.status.to_str()
                )))
            }
        }
    }

    pub async fn reject_booking(&self, session: &AuthSession, booking_id: Uuid) -> Result<Booking, ServiceError> {
        session.require_mechanic("reject bookings")?;
        self.transition(booking_id, BookingStatus::Rejected, true).await
    }

    /// The customer or the assigned mechanic may cancel a booking that has not finished.
    pub async fn cancel_booking(&self, session: &AuthSession, booking_id: Uuid) -> Result<Booking, ServiceError> {
        let booking = self.load(booking_id).await?;
        if !booking.is_participant(session.user_id) {
            return Err(ServiceError::forbidden("cancel this booking"));
        }
        let was_open = booking.status == BookingStatus::Pending;
        self.transition(booking_id, BookingStatus::Cancelled, was_open).await
    }

    pub async fn start_booking(&self, session: &AuthSession, booking_id: Uuid) -> Result<Booking, ServiceError> {
        self.load_assigned(session, booking_id, "start this booking").await?;
        self.transition(booking_id, BookingStatus::InProgress, false).await
    }

    /// Snapshots the final cost, falling back to the estimate.
    pub async fn complete_booking(
        &self,
        session: &AuthSession,
        booking_id: Uuid,
        final_cost: Option<i64>,
    ) -> Result<Booking, ServiceError> {
        self.load_assigned(session, booking_id, "complete this booking").await?;

        match self
            .db_client
            .complete_booking(booking_id, session.user_id, final_cost)
            .await?
        {
            Some(booking) => {
                info!("Booking {} completed, final cost {:?}", booking.id, booking.final_cost);
                self.publish(ChangeKind::Update, &booking, false);
                Ok(booking)
            }
            None => Err(self.transition_error(booking_id, BookingStatus::Completed).await),
        }
    }

    /// One review per completed booking; feeds the mechanic's running average.
    pub async fn review_booking(
        &self,
        session: &AuthSession,
        booking_id: Uuid,
        rating: i16,
    ) -> Result<Booking, ServiceError> {
        if !(1..=5).contains(&rating) {
            return Err(ServiceError::validation("Rating must be between 1 and 5"));
        }

        let booking = self.load(booking_id).await?;
        if booking.user_id != session.user_id {
            return Err(ServiceError::forbidden("review this booking"));
        }
        if booking.customer_rating.is_some() {
            return Err(ServiceError::Conflict("This booking has already been reviewed".to_string()));
        }
        if booking.status != BookingStatus::Completed {
            return Err(ServiceError::Conflict("Only completed bookings can be reviewed".to_string()));
        }

        let rated = self
            .db_client
            .review_booking(booking_id, session.user_id, rating)
            .await?
            .ok_or_else(|| ServiceError::Conflict("This booking has already been reviewed".to_string()))?;

        self.publish(ChangeKind::Update, &rated, false);
        Ok(rated)
    }

    /// Customers see their own bookings, mechanics the ones assigned to them.
    pub async fn list_my_bookings(
        &self,
        session: &AuthSession,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Booking>, ServiceError> {
        let bookings = if session.is_mechanic() {
            self.db_client.get_mechanic_bookings(session.user_id, limit, offset).await?
        } else {
            self.db_client.get_customer_bookings(session.user_id, limit, offset).await?
        };
        Ok(bookings)
    }

    pub async fn list_pending(
        &self,
        session: &AuthSession,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Booking>, ServiceError> {
        session.require_mechanic("browse open bookings")?;
        Ok(self.db_client.get_pending_bookings(limit, offset).await?)
    }

    pub async fn get_booking_details(
        &self,
        session: &AuthSession,
        booking_id: Uuid,
    ) -> Result<BookingDetails, ServiceError> {
        let booking = self.load(booking_id).await?;
        let open_to_viewer = session.is_mechanic() && booking.status == BookingStatus::Pending;
        if !booking.is_participant(session.user_id) && !session.is_admin() && !open_to_viewer {
            return Err(ServiceError::forbidden("view this booking"));
        }

        let profiles = self.db_client.get_profiles(&booking.audience()).await?;
        Ok(BookingDetails::assemble(booking, &profiles))
    }

    /// Records the assigned mechanic's position while the job is active.
    pub async fn update_mechanic_location(
        &self,
        session: &AuthSession,
        booking_id: Uuid,
        location: Coordinates,
    ) -> Result<Booking, ServiceError> {
        if !location.is_valid() {
            return Err(ServiceError::validation("Coordinates are out of range"));
        }
        let booking = self.load_assigned(session, booking_id, "report location for this booking").await?;

        let updated = self
            .db_client
            .update_mechanic_location(booking_id, session.user_id, location)
            .await?
            .ok_or_else(|| {
                ServiceError::Conflict(format!(
                    "Booking {} is {} and not being tracked",
                    booking_id,
                    booking.status.to_str()
                ))
            })?;

        self.publish(ChangeKind::Update, &updated, false);
        Ok(updated)
    }

    async fn load(&self, booking_id: Uuid) -> Result<Booking, ServiceError> {
        self.db_client
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Booking {}", booking_id)))
    }

    async fn load_assigned(
        &self,
        session: &AuthSession,
        booking_id: Uuid,
        action: &str,
    ) -> Result<Booking, ServiceError> {
        let booking = self.load(booking_id).await?;
        if booking.mechanic_id != Some(session.user_id) {
            return Err(ServiceError::forbidden(action));
        }
        Ok(booking)
    }

    async fn transition(
        &self,
        booking_id: Uuid,
        to: BookingStatus,
        touches_pool: bool,
    ) -> Result<Booking, ServiceError> {
        let sources = BookingStatus::sources_of(to);
        match self.db_client.update_booking_status(booking_id, &sources, to).await? {
            Some(booking) => {
                info!("Booking {} moved to {}", booking.id, to.to_str());
                self.publish(ChangeKind::Update, &booking, touches_pool);
                Ok(booking)
            }
            None => Err(self.transition_error(booking_id, to).await),
        }
    }

    async fn transition_error(&self, booking_id: Uuid, to: BookingStatus) -> ServiceError {
        match self.load(booking_id).await {
            Ok(current) => ServiceError::InvalidStatus(booking_id, current.status, to),
            Err(e) => e,
        }
    }

    /// Full rows go to participants, and to every mechanic only while pending.
    fn publish(&self, kind: ChangeKind, booking: &Booking, touches_pool: bool) {
        let pending = booking.status == BookingStatus::Pending;
        let event = ChangeEvent::new(ChangeTable::Bookings, kind, booking.id, booking)
            .for_users(booking.audience())
            .open_to_mechanics(touches_pool && pending);
        self.realtime.publish(event);
        if touches_pool && !pending {
            self.realtime.publish(ChangeEvent::pool_exit(
                ChangeTable::Bookings,
                booking.id,
                booking.status,
                booking.audience(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{bookingdb::BookingExt, chatdb::ChatExt, userdb::UserExt, MemoryStore},
        models::usermodel::UserRole,
        service::{
            realtime::{ChangeFilter, Viewer},
            test_support::{session, store},
        },
    };

    fn dto() -> CreateBookingDto {
        CreateBookingDto {
            service_type: "Flat tyre".to_string(),
            vehicle_type: VehicleType::Car,
            description: Some("Rear left".to_string()),
            location: "MG Road".to_string(),
            latitude: Some(12.97),
            longitude: Some(77.59),
            estimated_cost: Some(50_000),
        }
    }

    async fn setup() -> (Arc<MemoryStore>, BookingService, AuthSession, AuthSession) {
        let store = store();
        let service = BookingService::new(store.clone(), Arc::new(RealtimeHub::default()));
        let customer = session(&store, UserRole::User).await;
        let mechanic = session(&store, UserRole::Mechanic).await;
        (store, service, customer, mechanic)
    }

    #[tokio::test]
    async fn test_new_booking_is_pending_and_unassigned() {
        let (store, service, customer, _) = setup().await;
        let booking = service.create_booking(&customer, dto()).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.mechanic_id, None);
        assert!(store.get_room_by_booking(booking.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_accept_sets_mechanic_and_confirms() {
        let (_, service, customer, mechanic) = setup().await;
        let booking = service.create_booking(&customer, dto()).await.unwrap();

        let here = Coordinates::new(12.9, 77.5);
        let accepted = service.accept_booking(&mechanic, booking.id, Some(here)).await.unwrap();

        assert_eq!(accepted.status, BookingStatus::Confirmed);
        assert_eq!(accepted.mechanic_id, Some(mechanic.user_id));
        assert_eq!(accepted.mechanic_location(), Some(here));
        assert!(accepted.accepted_at.is_some());
    }

    #[tokio::test]
    async fn test_second_accept_conflicts_and_keeps_first_mechanic() {
        let (store, service, customer, first) = setup().await;
        let second = session(&store, UserRole::Mechanic).await;
        let booking = service.create_booking(&customer, dto()).await.unwrap();

        service.accept_booking(&first, booking.id, None).await.unwrap();
        let err = service.accept_booking(&second, booking.id, None).await.unwrap_err();

        assert!(matches!(err, ServiceError::Conflict(_)));
        let current = store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(current.mechanic_id, Some(first.user_id));
    }

    #[tokio::test]
    async fn test_cannot_accept_closed_bookings() {
        let (_, service, customer, mechanic) = setup().await;

        let cancelled = service.create_booking(&customer, dto()).await.unwrap();
        service.cancel_booking(&customer, cancelled.id).await.unwrap();

        let rejected = service.create_booking(&customer, dto()).await.unwrap();
        service.reject_booking(&mechanic, rejected.id).await.unwrap();

        let completed = service.create_booking(&customer, dto()).await.unwrap();
        service.accept_booking(&mechanic, completed.id, None).await.unwrap();
        service.complete_booking(&mechanic, completed.id, None).await.unwrap();

        for id in [cancelled.id, rejected.id, completed.id] {
            let err = service.accept_booking(&mechanic, id, None).await.unwrap_err();
            assert!(matches!(err, ServiceError::Conflict(_)), "{:?}", err);
        }
    }

    #[tokio::test]
    async fn test_customers_cannot_accept() {
        let (_, service, customer, _) = setup().await;
        let booking = service.create_booking(&customer, dto()).await.unwrap();
        let err = service.accept_booking(&customer, booking.id, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_accept_missing_booking_is_not_found() {
        let (_, service, _, mechanic) = setup().await;
        let err = service.accept_booking(&mechanic, Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reject_only_from_pending() {
        let (_, service, customer, mechanic) = setup().await;
        let booking = service.create_booking(&customer, dto()).await.unwrap();

        let rejected = service.reject_booking(&mechanic, booking.id).await.unwrap();
        assert_eq!(rejected.status, BookingStatus::Rejected);

        let confirmed = service.create_booking(&customer, dto()).await.unwrap();
        service.accept_booking(&mechanic, confirmed.id, None).await.unwrap();
        let err = service.reject_booking(&mechanic, confirmed.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidStatus(_, BookingStatus::Confirmed, BookingStatus::Rejected)
        ));
    }

    #[tokio::test]
    async fn test_cancel_keeps_mechanic_for_history() {
        let (_, service, customer, mechanic) = setup().await;
        let booking = service.create_booking(&customer, dto()).await.unwrap();
        service.accept_booking(&mechanic, booking.id, None).await.unwrap();

        let cancelled = service.cancel_booking(&mechanic, booking.id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.mechanic_id, Some(mechanic.user_id));

        let err = service.cancel_booking(&customer, booking.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidStatus(..)));
    }

    #[tokio::test]
    async fn test_strangers_cannot_cancel() {
        let (store, service, customer, _) = setup().await;
        let stranger = session(&store, UserRole::User).await;
        let booking = service.create_booking(&customer, dto()).await.unwrap();
        let err = service.cancel_booking(&stranger, booking.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_full_lifecycle_with_review() {
        let (store, service, customer, mechanic) = setup().await;
        let booking = service.create_booking(&customer, dto()).await.unwrap();
        service.accept_booking(&mechanic, booking.id, None).await.unwrap();

        let started = service.start_booking(&mechanic, booking.id).await.unwrap();
        assert_eq!(started.status, BookingStatus::InProgress);

        let done = service.complete_booking(&mechanic, booking.id, None).await.unwrap();
        assert_eq!(done.status, BookingStatus::Completed);
        assert_eq!(done.final_cost, Some(50_000));
        assert!(done.completed_at.is_some());

        let reviewed = service.review_booking(&customer, booking.id, 4).await.unwrap();
        assert_eq!(reviewed.customer_rating, Some(4));

        let profile = store.get_profile(mechanic.user_id).await.unwrap().unwrap();
        assert_eq!(profile.total_reviews, 1);
        assert_eq!(profile.rating, 4.0);

        let again = service.review_booking(&customer, booking.id, 5).await.unwrap_err();
        assert!(matches!(again, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_review_requires_completion() {
        let (_, service, customer, _) = setup().await;
        let booking = service.create_booking(&customer, dto()).await.unwrap();
        let err = service.review_booking(&customer, booking.id, 5).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_location_updates_only_while_active() {
        let (_, service, customer, mechanic) = setup().await;
        let booking = service.create_booking(&customer, dto()).await.unwrap();
        let here = Coordinates::new(12.95, 77.55);

        let err = service.update_mechanic_location(&mechanic, booking.id, here).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        service.accept_booking(&mechanic, booking.id, None).await.unwrap();
        let tracked = service.update_mechanic_location(&mechanic, booking.id, here).await.unwrap();
        assert_eq!(tracked.mechanic_location(), Some(here));
        assert!(tracked.mechanic_location_updated_at.is_some());

        service.complete_booking(&mechanic, booking.id, Some(60_000)).await.unwrap();
        let err = service.update_mechanic_location(&mechanic, booking.id, here).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_details_resolve_one_profile_each() {
        let (store, service, customer, mechanic) = setup().await;
        let booking = service.create_booking(&customer, dto()).await.unwrap();

        let details = service.get_booking_details(&customer, booking.id).await.unwrap();
        assert_eq!(details.customer.unwrap().user_id, customer.user_id);
        assert!(details.mechanic.is_none());

        service.accept_booking(&mechanic, booking.id, None).await.unwrap();
        let details = service.get_booking_details(&mechanic, booking.id).await.unwrap();
        assert_eq!(details.mechanic.unwrap().user_id, mechanic.user_id);

        let stranger = session(&store, UserRole::User).await;
        assert!(service.get_booking_details(&stranger, booking.id).await.is_err());
    }

    #[tokio::test]
    async fn test_listing_by_role() {
        let (_, service, customer, mechanic) = setup().await;
        let first = service.create_booking(&customer, dto()).await.unwrap();
        service.create_booking(&customer, dto()).await.unwrap();
        service.accept_booking(&mechanic, first.id, None).await.unwrap();

        assert_eq!(service.list_my_bookings(&customer, 10, 0).await.unwrap().len(), 2);
        assert_eq!(service.list_my_bookings(&mechanic, 10, 0).await.unwrap().len(), 1);
        assert_eq!(service.list_pending(&mechanic, 10, 0).await.unwrap().len(), 1);
        assert!(service.list_pending(&customer, 10, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_accept_publishes_row_update() {
        let (_, service, customer, mechanic) = setup().await;
        let booking = service.create_booking(&customer, dto()).await.unwrap();
        let mut sub = service.realtime.subscribe(ChangeFilter::Row {
            table: ChangeTable::Bookings,
            row_id: booking.id,
            viewer: Viewer::of(&customer),
        });

        service.accept_booking(&mechanic, booking.id, None).await.unwrap();

        let event = sub.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.payload["status"], "confirmed");
        assert!(event.audience.contains(&mechanic.user_id));
    }

    #[tokio::test]
    async fn test_row_stream_stops_for_mechanics_who_lost_the_booking() {
        let (store, service, customer, winner) = setup().await;
        let outsider = session(&store, UserRole::Mechanic).await;
        let booking = service.create_booking(&customer, dto()).await.unwrap();

        service.get_booking_details(&outsider, booking.id).await.unwrap();
        let mut sub = service.realtime.subscribe(ChangeFilter::Row {
            table: ChangeTable::Bookings,
            row_id: booking.id,
            viewer: Viewer::of(&outsider),
        });

        service
            .accept_booking(&winner, booking.id, Some(Coordinates::new(12.95, 77.6)))
            .await
            .unwrap();
        service
            .update_mechanic_location(&winner, booking.id, Coordinates::new(12.96, 77.61))
            .await
            .unwrap();

        let notice = sub.next().await.unwrap();
        assert_eq!(notice.payload, serde_json::json!({ "id": booking.id, "status": "confirmed" }));

        let next = tokio::time::timeout(std::time::Duration::from_millis(50), sub.next()).await;
        assert!(next.is_err());
        assert!(matches!(
            service.get_booking_details(&outsider, booking.id).await,
            Err(ServiceError::Forbidden(_))
        ));
    }
}

// service/sos_service.rs
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    db::DataStore,
    dtos::bookingdtos::CreateSosDto,
    middleware::AuthSession,
    models::bookingmodel::*,
    service::{
        error::ServiceError,
        realtime::{ChangeEvent, ChangeKind, ChangeTable, RealtimeHub},
    },
};

/// Emergency requests. Same lifecycle as bookings, but the open pool is
/// ordered by urgency and there is no cost or review.
#[derive(Debug, Clone)]
pub struct SosService {
    db_client: Arc<dyn DataStore>,
    realtime: Arc<RealtimeHub>,
}

impl SosService {
    pub fn new(db_client: Arc<dyn DataStore>, realtime: Arc<RealtimeHub>) -> Self {
        Self { db_client, realtime }
    }

    pub async fn create_request(&self, session: &AuthSession, dto: CreateSosDto) -> Result<SosRequest, ServiceError> {
        let request = dto.into_new_request().map_err(ServiceError::Validation)?;
        let sos = self.db_client.create_sos(session.user_id, request).await?;

        info!("SOS {} raised by {} ({:?})", sos.id, session.user_id, sos.urgency_level);
        self.publish(ChangeKind::Insert, &sos, true);
        Ok(sos)
    }

    pub async fn list_my_requests(
        &self,
        session: &AuthSession,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SosRequest>, ServiceError> {
        let requests = if session.is_mechanic() {
            self.db_client.get_mechanic_sos(session.user_id, limit, offset).await?
        } else {
            self.db_client.get_user_sos(session.user_id, limit, offset).await?
        };
        Ok(requests)
    }

    pub async fn list_open(&self, session: &AuthSession, limit: i64, offset: i64) -> Result<Vec<SosRequest>, ServiceError> {
        session.require_mechanic("browse open SOS requests")?;
        Ok(self.db_client.get_open_sos(limit, offset).await?)
    }

    pub async fn get_request(&self, session: &AuthSession, sos_id: Uuid) -> Result<SosRequest, ServiceError> {
        let sos = self.load(sos_id).await?;
        let open_to_viewer = session.is_mechanic() && sos.status == BookingStatus::Pending;
        if !sos.is_participant(session.user_id) && !session.is_admin() && !open_to_viewer {
            return Err(ServiceError::forbidden("view this SOS request"));
        }
        Ok(sos)
    }

    pub async fn accept_request(
        &self,
        session: &AuthSession,
        sos_id: Uuid,
        location: Option<Coordinates>,
    ) -> Result<SosRequest, ServiceError> {
        session.require_mechanic("respond to SOS requests")?;

        match self.db_client.accept_sos(sos_id, session.user_id, location).await? {
            Some(sos) => {
                info!("SOS {} accepted by mechanic {}", sos.id, session.user_id);
                self.publish(ChangeKind::Update, &sos, true);
                Ok(sos)
            }
            None => {
                let current = self.load(sos_id).await?;
                Err(ServiceError::Conflict(format!(
                    "SOS request {} can no longer be accepted, it is {}",
                    sos_id,
                    current.status.to_str()
                )))
            }
        }
    }

    pub async fn cancel_request(&self, session: &AuthSession, sos_id: Uuid) -> Result<SosRequest, ServiceError> {
        let sos = self.load(sos_id).await?;
        if !sos.is_participant(session.user_id) {
            return Err(ServiceError::forbidden("cancel this SOS request"));
        }
        let was_open = sos.status == BookingStatus::Pending;
        self.transition(sos_id, BookingStatus::Cancelled, was_open).await
    }

    pub async fn start_request(&self, session: &AuthSession, sos_id: Uuid) -> Result<SosRequest, ServiceError> {
        self.load_assigned(session, sos_id, "start this SOS request").await?;
        self.transition(sos_id, BookingStatus::InProgress, false).await
    }

    pub async fn resolve_request(&self, session: &AuthSession, sos_id: Uuid) -> Result<SosRequest, ServiceError> {
        self.load_assigned(session, sos_id, "resolve this SOS request").await?;
        self.transition(sos_id, BookingStatus::Completed, false).await
    }

    pub async fn update_mechanic_location(
        &self,
        session: &AuthSession,
        sos_id: Uuid,
        location: Coordinates,
    ) -> Result<SosRequest, ServiceError> {
        if !location.is_valid() {
            return Err(ServiceError::validation("Coordinates are out of range"));
        }
        let sos = self.load_assigned(session, sos_id, "report location for this SOS request").await?;

        let updated = self
            .db_client
            .update_sos_location(sos_id, session.user_id, location)
            .await?
            .ok_or_else(|| {
                ServiceError::Conflict(format!(
                    "SOS request {} is {} and not being tracked",
                    sos_id,
                    sos.status.to_str()
                ))
            })?;

        self.publish(ChangeKind::Update, &updated, false);
        Ok(updated)
    }

    async fn load(&self, sos_id: Uuid) -> Result<SosRequest, ServiceError> {
        self.db_client
            .get_sos(sos_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("SOS request {}", sos_id)))
    }

    async fn load_assigned(&self, session: &AuthSession, sos_id: Uuid, action: &str) -> Result<SosRequest, ServiceError> {
        let sos = self.load(sos_id).await?;
        if sos.assigned_mechanic_id != Some(session.user_id) {
            return Err(ServiceError::forbidden(action));
        }
        Ok(sos)
    }

    async fn transition(&self, sos_id: Uuid, to: BookingStatus, touches_pool: bool) -> Result<SosRequest, ServiceError> {
        let sources = BookingStatus::sources_of(to);
        match self.db_client.update_sos_status(sos_id, &sources, to).await? {
            Some(sos) => {
                info!("SOS {} moved to {}", sos.id, to.to_str());
                self.publish(ChangeKind::Update, &sos, touches_pool);
                Ok(sos)
            }
            None => {
                let current = self.load(sos_id).await?;
                Err(ServiceError::InvalidStatus(sos_id, current.status, to))
            }
        }
    }

    /// Full rows go to participants, and to every mechanic only while pending.
    fn publish(&self, kind: ChangeKind, sos: &SosRequest, touches_pool: bool) {
        let pending = sos.status == BookingStatus::Pending;
        let event = ChangeEvent::new(ChangeTable::SosRequests, kind, sos.id, sos)
            .for_users(sos.audience())
            .open_to_mechanics(touches_pool && pending);
        self.realtime.publish(event);
        if touches_pool && !pending {
            self.realtime.publish(ChangeEvent::pool_exit(
                ChangeTable::SosRequests,
                sos.id,
                sos.status,
                sos.audience(),
            ));
        }
    }
}

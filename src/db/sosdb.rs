use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::bookingmodel::*;

const SOS_COLUMNS: &str = r#"
    id, user_id, assigned_mechanic_id, service_type, vehicle_type, description,
    location, latitude, longitude, mechanic_latitude, mechanic_longitude,
    mechanic_location_updated_at, status, urgency_level, created_at, updated_at,
    accepted_at, completed_at
"#;

#[async_trait]
pub trait SosExt {
    async fn create_sos(&self, user_id: Uuid, request: NewSosRequest) -> Result<SosRequest, Error>;

    async fn get_sos(&self, sos_id: Uuid) -> Result<Option<SosRequest>, Error>;

    async fn get_user_sos(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<SosRequest>, Error>;

    async fn get_mechanic_sos(
        &self,
        mechanic_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SosRequest>, Error>;

    /// Unassigned pending requests, most urgent first, oldest first within a level.
    async fn get_open_sos(&self, limit: i64, offset: i64) -> Result<Vec<SosRequest>, Error>;

    async fn accept_sos(
        &self,
        sos_id: Uuid,
        mechanic_id: Uuid,
        location: Option<Coordinates>,
    ) -> Result<Option<SosRequest>, Error>;

    async fn update_sos_status(
        &self,
        sos_id: Uuid,
        from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<Option<SosRequest>, Error>;

    async fn update_sos_location(
        &self,
        sos_id: Uuid,
        mechanic_id: Uuid,
        location: Coordinates,
    ) -> Result<Option<SosRequest>, Error>;
}

#[async_trait]
impl SosExt for DBClient {
    async fn create_sos(&self, user_id: Uuid, request: NewSosRequest) -> Result<SosRequest, Error> {
        let sql = format!(
            r#"
            INSERT INTO sos_requests
                (user_id, service_type, vehicle_type, description, location,
                 latitude, longitude, urgency_level, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending'::booking_status)
            RETURNING {}
            "#,
            SOS_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, SosRequest>(&sql)
                .bind(user_id)
                .bind(request.service_type)
                .bind(request.vehicle_type)
                .bind(request.description)
                .bind(request.location)
                .bind(request.coordinates.map(|c| c.latitude))
                .bind(request.coordinates.map(|c| c.longitude))
                .bind(request.urgency_level)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn get_sos(&self, sos_id: Uuid) -> Result<Option<SosRequest>, Error> {
        let sql = format!("SELECT {} FROM sos_requests WHERE id = $1", SOS_COLUMNS);
        self.timed(
            sqlx::query_as::<_, SosRequest>(&sql)
                .bind(sos_id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn get_user_sos(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<SosRequest>, Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM sos_requests
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            SOS_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, SosRequest>(&sql)
                .bind(user_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn get_mechanic_sos(
        &self,
        mechanic_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SosRequest>, Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM sos_requests
            WHERE assigned_mechanic_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            SOS_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, SosRequest>(&sql)
                .bind(mechanic_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn get_open_sos(&self, limit: i64, offset: i64) -> Result<Vec<SosRequest>, Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM sos_requests
            WHERE status = 'pending'::booking_status AND assigned_mechanic_id IS NULL
            ORDER BY urgency_level DESC, created_at ASC
            LIMIT $1 OFFSET $2
            "#,
            SOS_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, SosRequest>(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn accept_sos(
        &self,
        sos_id: Uuid,
        mechanic_id: Uuid,
        location: Option<Coordinates>,
    ) -> Result<Option<SosRequest>, Error> {
        let sql = format!(
            r#"
            UPDATE sos_requests
            SET assigned_mechanic_id = $2,
                status = 'confirmed'::booking_status,
                mechanic_latitude = $3,
                mechanic_longitude = $4,
                mechanic_location_updated_at = CASE WHEN $3::float8 IS NULL THEN NULL ELSE NOW() END,
                accepted_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND status = 'pending'::booking_status
              AND assigned_mechanic_id IS NULL
            RETURNING {}
            "#,
            SOS_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, SosRequest>(&sql)
                .bind(sos_id)
                .bind(mechanic_id)
                .bind(location.map(|c| c.latitude))
                .bind(location.map(|c| c.longitude))
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn update_sos_status(
        &self,
        sos_id: Uuid,
        from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<Option<SosRequest>, Error> {
        let sql = format!(
            r#"
            UPDATE sos_requests
            SET status = $3,
                completed_at = CASE WHEN $3 = 'completed'::booking_status THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($2)
            RETURNING {}
            "#,
            SOS_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, SosRequest>(&sql)
                .bind(sos_id)
                .bind(from.to_vec())
                .bind(to)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn update_sos_location(
        &self,
        sos_id: Uuid,
        mechanic_id: Uuid,
        location: Coordinates,
    ) -> Result<Option<SosRequest>, Error> {
        let sql = format!(
            r#"
            UPDATE sos_requests
            SET mechanic_latitude = $3,
                mechanic_longitude = $4,
                mechanic_location_updated_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND assigned_mechanic_id = $2
              AND status IN ('confirmed'::booking_status, 'in_progress'::booking_status)
            RETURNING {}
            "#,
            SOS_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, SosRequest>(&sql)
                .bind(sos_id)
                .bind(mechanic_id)
                .bind(location.latitude)
                .bind(location.longitude)
                .fetch_optional(&self.pool),
        )
        .await
    }
}

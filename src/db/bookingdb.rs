// db/bookingdb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::bookingmodel::*;

const BOOKING_COLUMNS: &str = r#"
    id, user_id, mechanic_id, service_type, vehicle_type, description, location,
    latitude, longitude, mechanic_latitude, mechanic_longitude,
    mechanic_location_updated_at, status, estimated_cost, final_cost,
    customer_rating, created_at, updated_at, accepted_at, completed_at
"#;

#[async_trait]
pub trait BookingExt {
    async fn create_booking(&self, user_id: Uuid, booking: NewBooking) -> Result<Booking, Error>;

    async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, Error>;

    async fn get_customer_bookings(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Booking>, Error>;

    async fn get_mechanic_bookings(
        &self,
        mechanic_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Booking>, Error>;

    async fn get_pending_bookings(&self, limit: i64, offset: i64) -> Result<Vec<Booking>, Error>;

    /// Claims a pending, unassigned booking. Returns `None` when another write
    /// got there first or the booking left `pending`.
    async fn accept_booking(
        &self,
        booking_id: Uuid,
        mechanic_id: Uuid,
        location: Option<Coordinates>,
    ) -> Result<Option<Booking>, Error>;

    /// Moves the booking to `to` only if its current status is one of `from`.
    async fn update_booking_status(
        &self,
        booking_id: Uuid,
        from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<Option<Booking>, Error>;

    async fn complete_booking(
        &self,
        booking_id: Uuid,
        mechanic_id: Uuid,
        final_cost: Option<i64>,
    ) -> Result<Option<Booking>, Error>;

    async fn update_mechanic_location(
        &self,
        booking_id: Uuid,
        mechanic_id: Uuid,
        location: Coordinates,
    ) -> Result<Option<Booking>, Error>;

    /// Rates a completed booking and folds the rating into the assigned
    /// mechanic's average, both or neither.
    async fn review_booking(
        &self,
        booking_id: Uuid,
        user_id: Uuid,
        rating: i16,
    ) -> Result<Option<Booking>, Error>;
}

#[async_trait]
impl BookingExt for DBClient {
    async fn create_booking(&self, user_id: Uuid, booking: NewBooking) -> Result<Booking, Error> {
        let sql = format!(
            r#"
            INSERT INTO bookings
                (user_id, service_type, vehicle_type, description, location,
                 latitude, longitude, estimated_cost, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending'::booking_status)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );

        self.timed(
            sqlx::query_as::<_, Booking>(&sql)
                .bind(user_id)
                .bind(booking.service_type)
                .bind(booking.vehicle_type)
                .bind(booking.description)
                .bind(booking.location)
                .bind(booking.coordinates.map(|c| c.latitude))
                .bind(booking.coordinates.map(|c| c.longitude))
                .bind(booking.estimated_cost)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, Error> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        self.timed(
            sqlx::query_as::<_, Booking>(&sql)
                .bind(booking_id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn get_customer_bookings(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Booking>, Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM bookings
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            BOOKING_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, Booking>(&sql)
                .bind(user_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn get_mechanic_bookings(
        &self,
        mechanic_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Booking>, Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM bookings
            WHERE mechanic_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            BOOKING_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, Booking>(&sql)
                .bind(mechanic_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn get_pending_bookings(&self, limit: i64, offset: i64) -> Result<Vec<Booking>, Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM bookings
            WHERE status = 'pending'::booking_status AND mechanic_id IS NULL
            ORDER BY created_at ASC
            LIMIT $1 OFFSET $2
            "#,
            BOOKING_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, Booking>(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn accept_booking(
        &self,
        booking_id: Uuid,
        mechanic_id: Uuid,
        location: Option<Coordinates>,
    ) -> Result<Option<Booking>, Error> {
        let sql = format!(
            r#"
            UPDATE bookings
            SET mechanic_id = $2,
                status = 'confirmed'::booking_status,
                mechanic_latitude = $3,
                mechanic_longitude = $4,
                mechanic_location_updated_at = CASE WHEN $3::float8 IS NULL THEN NULL ELSE NOW() END,
                accepted_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND status = 'pending'::booking_status
              AND mechanic_id IS NULL
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, Booking>(&sql)
                .bind(booking_id)
                .bind(mechanic_id)
                .bind(location.map(|c| c.latitude))
                .bind(location.map(|c| c.longitude))
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn update_booking_status(
        &self,
        booking_id: Uuid,
        from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<Option<Booking>, Error> {
        let sql = format!(
            r#"
            UPDATE bookings
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = ANY($2)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, Booking>(&sql)
                .bind(booking_id)
                .bind(from.to_vec())
                .bind(to)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn complete_booking(
        &self,
        booking_id: Uuid,
        mechanic_id: Uuid,
        final_cost: Option<i64>,
    ) -> Result<Option<Booking>, Error> {
        let sql = format!(
            r#"
            UPDATE bookings
            SET status = 'completed'::booking_status,
                final_cost = COALESCE($3, estimated_cost),
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND mechanic_id = $2
              AND status IN ('confirmed'::booking_status, 'in_progress'::booking_status)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, Booking>(&sql)
                .bind(booking_id)
                .bind(mechanic_id)
                .bind(final_cost)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn update_mechanic_location(
        &self,
        booking_id: Uuid,
        mechanic_id: Uuid,
        location: Coordinates,
    ) -> Result<Option<Booking>, Error> {
        let sql = format!(
            r#"
            UPDATE bookings
            SET mechanic_latitude = $3,
                mechanic_longitude = $4,
                mechanic_location_updated_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND mechanic_id = $2
              AND status IN ('confirmed'::booking_status, 'in_progress'::booking_status)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, Booking>(&sql)
                .bind(booking_id)
                .bind(mechanic_id)
                .bind(location.latitude)
                .bind(location.longitude)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn review_booking(
        &self,
        booking_id: Uuid,
        user_id: Uuid,
        rating: i16,
    ) -> Result<Option<Booking>, Error> {
        let sql = format!(
            r#"
            UPDATE bookings
            SET customer_rating = $3, updated_at = NOW()
            WHERE id = $1
              AND user_id = $2
              AND status = 'completed'::booking_status
              AND customer_rating IS NULL
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        self.timed(async {
            let mut tx = self.pool.begin().await?;

            let rated = sqlx::query_as::<_, Booking>(&sql)
                .bind(booking_id)
                .bind(user_id)
                .bind(rating)
                .fetch_optional(&mut *tx)
                .await?;

            if let Some(mechanic_id) = rated.as_ref().and_then(|b| b.mechanic_id) {
                sqlx::query(
                    r#"
                    UPDATE profiles
                    SET rating = ROUND(((rating * total_reviews + $2) / (total_reviews + 1))::numeric, 2)::float8,
                        total_reviews = total_reviews + 1,
                        updated_at = NOW()
                    WHERE user_id = $1 AND role = 'mechanic'::user_role
                    "#,
                )
                .bind(mechanic_id)
                .bind(rating as f64)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok::<_, Error>(rated)
        })
        .await
    }
}

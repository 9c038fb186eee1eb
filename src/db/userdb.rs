use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::usermodel::{
    normalize_services, MechanicFilter, Profile, ProfileUpdate, User, UserRole,
};

const PROFILE_COLUMNS: &str = r#"
    user_id, full_name, phone, role, is_available, is_verified, rating,
    total_reviews, services_offered, location, latitude, longitude,
    verification_photo_url, created_at, updated_at
"#;

#[async_trait]
pub trait UserExt {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        email: Option<&str>,
    ) -> Result<Option<User>, Error>;

    /// Creates the auth identity and its profile together.
    async fn create_user_with_profile(
        &self,
        email: &str,
        password_hash: &str,
        full_name: &str,
        phone: Option<&str>,
        role: UserRole,
    ) -> Result<(User, Profile), Error>;

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, Error>;

    async fn get_profiles(&self, user_ids: &[Uuid]) -> Result<Vec<Profile>, Error>;

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Option<Profile>, Error>;

    async fn set_profile_verified(
        &self,
        user_id: Uuid,
        verified: bool,
    ) -> Result<Option<Profile>, Error>;

    async fn find_mechanics(&self, filter: &MechanicFilter) -> Result<Vec<Profile>, Error>;

}

#[async_trait]
impl UserExt for DBClient {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        email: Option<&str>,
    ) -> Result<Option<User>, Error> {
        let query = if let Some(user_id) = user_id {
            sqlx::query_as::<_, User>(
                "SELECT id, email, password, created_at FROM users WHERE id = $1",
            )
            .bind(user_id)
        } else if let Some(email) = email {
            sqlx::query_as::<_, User>(
                "SELECT id, email, password, created_at FROM users WHERE lower(email) = lower($1)",
            )
            .bind(email.to_string())
        } else {
            return Ok(None);
        };

        self.timed(query.fetch_optional(&self.pool)).await
    }

    async fn create_user_with_profile(
        &self,
        email: &str,
        password_hash: &str,
        full_name: &str,
        phone: Option<&str>,
        role: UserRole,
    ) -> Result<(User, Profile), Error> {
        let sql = format!(
            r#"
            INSERT INTO profiles (user_id, full_name, phone, role, is_available)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );

        self.timed(async {
            let mut tx = self.pool.begin().await?;

            let user = sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users (email, password)
                VALUES ($1, $2)
                RETURNING id, email, password, created_at
                "#,
            )
            .bind(email)
            .bind(password_hash)
            .fetch_one(&mut *tx)
            .await?;

            let profile = sqlx::query_as::<_, Profile>(&sql)
                .bind(user.id)
                .bind(full_name)
                .bind(phone)
                .bind(role)
                .bind(role == UserRole::Mechanic)
                .fetch_one(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok::<_, Error>((user, profile))
        })
        .await
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, Error> {
        let sql = format!("SELECT {} FROM profiles WHERE user_id = $1", PROFILE_COLUMNS);
        self.timed(
            sqlx::query_as::<_, Profile>(&sql)
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn get_profiles(&self, user_ids: &[Uuid]) -> Result<Vec<Profile>, Error> {
        let sql = format!("SELECT {} FROM profiles WHERE user_id = ANY($1)", PROFILE_COLUMNS);
        self.timed(
            sqlx::query_as::<_, Profile>(&sql)
                .bind(user_ids.to_vec())
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Option<Profile>, Error> {
        let sql = format!(
            r#"
            UPDATE profiles
            SET full_name = COALESCE($2, full_name),
                phone = COALESCE($3, phone),
                is_available = COALESCE($4, is_available),
                services_offered = COALESCE($5, services_offered),
                location = COALESCE($6, location),
                latitude = COALESCE($7, latitude),
                longitude = COALESCE($8, longitude),
                verification_photo_url = COALESCE($9, verification_photo_url),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );

        let services = update.services_offered.as_deref().map(normalize_services);
        self.timed(
            sqlx::query_as::<_, Profile>(&sql)
                .bind(user_id)
                .bind(update.full_name)
                .bind(update.phone)
                .bind(update.is_available)
                .bind(services)
                .bind(update.location)
                .bind(update.coordinates.map(|c| c.latitude))
                .bind(update.coordinates.map(|c| c.longitude))
                .bind(update.verification_photo_url)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn set_profile_verified(
        &self,
        user_id: Uuid,
        verified: bool,
    ) -> Result<Option<Profile>, Error> {
        let sql = format!(
            r#"
            UPDATE profiles
            SET is_verified = $2, updated_at = NOW()
            WHERE user_id = $1 AND role = 'mechanic'::user_role
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, Profile>(&sql)
                .bind(user_id)
                .bind(verified)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_mechanics(&self, filter: &MechanicFilter) -> Result<Vec<Profile>, Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM profiles
            WHERE role = 'mechanic'::user_role
              AND is_available = true
              AND ($1 = false OR is_verified = true)
              AND ($2::text IS NULL OR $2 = ANY(services_offered))
            ORDER BY is_verified DESC, rating DESC, total_reviews DESC
            LIMIT $3 OFFSET $4
            "#,
            PROFILE_COLUMNS
        );
        let service = filter.service.as_ref().map(|s| s.trim().to_lowercase());
        self.timed(
            sqlx::query_as::<_, Profile>(&sql)
                .bind(filter.verified_only)
                .bind(service)
                .bind(filter.limit)
                .bind(filter.offset)
                .fetch_all(&self.pool),
        )
        .await
    }
}

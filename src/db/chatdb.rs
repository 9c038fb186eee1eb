// db/chatdb.rs
use async_trait::async_trait;
use uuid::Uuid;
use sqlx::Error;
use super::db::DBClient;
use crate::models::chatmodels::*;

#[async_trait]
pub trait ChatExt {
    // Room management
    async fn create_or_get_room(&self, booking_id: Uuid) -> Result<ChatRoom, Error>;

    async fn get_room_by_id(&self, room_id: Uuid) -> Result<Option<ChatRoom>, Error>;

    async fn get_room_by_booking(&self, booking_id: Uuid) -> Result<Option<ChatRoom>, Error>;

    async fn get_user_rooms(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ChatRoom>, Error>;

    // Message management
    async fn send_message(
        &self,
        room_id: Uuid,
        sender_id: Uuid,
        message_text: &str,
    ) -> Result<Message, Error>;

    async fn get_room_messages(
        &self,
        room_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, Error>;

    /// Marks every unread message in the room not sent by `viewer_id` as read.
    async fn mark_messages_as_read(&self, room_id: Uuid, viewer_id: Uuid) -> Result<u64, Error>;

    async fn get_unread_count(&self, user_id: Uuid) -> Result<i64, Error>;
}

#[async_trait]
impl ChatExt for DBClient {
    async fn create_or_get_room(&self, booking_id: Uuid) -> Result<ChatRoom, Error> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        self.timed(
            sqlx::query_as::<_, ChatRoom>(
                r#"
                INSERT INTO chat_rooms (booking_id)
                VALUES ($1)
                ON CONFLICT (booking_id) DO UPDATE SET booking_id = EXCLUDED.booking_id
                RETURNING id, booking_id, last_message_at, created_at
                "#,
            )
            .bind(booking_id)
            .fetch_one(&self.pool),
        )
        .await
    }

    async fn get_room_by_id(&self, room_id: Uuid) -> Result<Option<ChatRoom>, Error> {
        self.timed(
            sqlx::query_as::<_, ChatRoom>(
                r#"
                SELECT id, booking_id, last_message_at, created_at
                FROM chat_rooms
                WHERE id = $1
                "#,
            )
            .bind(room_id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn get_room_by_booking(&self, booking_id: Uuid) -> Result<Option<ChatRoom>, Error> {
        self.timed(
            sqlx::query_as::<_, ChatRoom>(
                r#"
                SELECT id, booking_id, last_message_at, created_at
                FROM chat_rooms
                WHERE booking_id = $1
                "#,
            )
            .bind(booking_id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn get_user_rooms(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ChatRoom>, Error> {
        self.timed(
            sqlx::query_as::<_, ChatRoom>(
                r#"
                SELECT r.id, r.booking_id, r.last_message_at, r.created_at
                FROM chat_rooms r
                INNER JOIN bookings b ON b.id = r.booking_id
                WHERE b.user_id = $1 OR b.mechanic_id = $1
                ORDER BY r.last_message_at DESC NULLS LAST, r.created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn send_message(
        &self,
        room_id: Uuid,
        sender_id: Uuid,
        message_text: &str,
    ) -> Result<Message, Error> {
        self.timed(async {
            let mut tx = self.pool.begin().await?;

            let message = sqlx::query_as::<_, Message>(
                r#"
                INSERT INTO messages (room_id, sender_id, message_text)
                VALUES ($1, $2, $3)
                RETURNING id, room_id, sender_id, message_text, is_read, created_at
                "#,
            )
            .bind(room_id)
            .bind(sender_id)
            .bind(message_text)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                UPDATE chat_rooms
                SET last_message_at = $2
                WHERE id = $1
                "#,
            )
            .bind(room_id)
            .bind(message.created_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<_, Error>(message)
        })
        .await
    }

    async fn get_room_messages(
        &self,
        room_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, Error> {
        self.timed(
            sqlx::query_as::<_, Message>(
                r#"
                SELECT id, room_id, sender_id, message_text, is_read, created_at
                FROM messages
                WHERE room_id = $1
                ORDER BY created_at ASC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(room_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn mark_messages_as_read(&self, room_id: Uuid, viewer_id: Uuid) -> Result<u64, Error> {
        let result = self
            .timed(
                sqlx::query(
                    r#"
                    UPDATE messages
                    SET is_read = true
                    WHERE room_id = $1
                      AND sender_id != $2
                      AND is_read = false
                    "#,
                )
                .bind(room_id)
                .bind(viewer_id)
                .execute(&self.pool),
            )
            .await?;

        Ok(result.rows_affected())
    }

    async fn get_unread_count(&self, user_id: Uuid) -> Result<i64, Error> {
        self.timed(
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*)
                FROM messages m
                INNER JOIN chat_rooms r ON m.room_id = r.id
                INNER JOIN bookings b ON r.booking_id = b.id
                WHERE (b.user_id = $1 OR b.mechanic_id = $1)
                  AND m.sender_id != $1
                  AND m.is_read = false
                "#,
            )
            .bind(user_id)
            .fetch_one(&self.pool),
        )
        .await
    }
}

// models/chatmodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Clone, Deserialize, sqlx::FromRow)]
pub struct ChatRoom {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub message_text: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A viewer only ever marks messages from the other party as read.
    pub fn readable_by(&self, viewer_id: Uuid) -> bool {
        self.sender_id != viewer_id && !self.is_read
    }
}

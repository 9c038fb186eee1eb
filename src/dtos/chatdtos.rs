use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::chatmodels::{ChatRoom, Message};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SendMessageDto {
    #[validate(length(min = 1, max = 2000, message = "Message must be between 1 and 2000 characters"))]
    pub message_text: String,
}

/// A room as returned on open: history plus how many messages were just marked read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomHistoryDto {
    pub room: ChatRoom,
    pub messages: Vec<Message>,
    pub marked_read: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadCountDto {
    pub unread: i64,
}

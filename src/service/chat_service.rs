// service/chat_service.rs
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    db::DataStore,
    dtos::chatdtos::RoomHistoryDto,
    middleware::AuthSession,
    models::{bookingmodel::Booking, chatmodels::*},
    service::{
        error::ServiceError,
        realtime::{ChangeEvent, ChangeFilter, ChangeKind, ChangeTable, RealtimeHub, Subscription},
    },
};

pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Reduces user input to plain text: markup is stripped, surrounding whitespace trimmed.
/// Characters such as `&` and `<` survive as themselves.
pub fn sanitize_message(text: &str) -> String {
    let stripped = ammonia::Builder::empty().clean(text).to_string();
    decode_entities(&stripped).trim().to_string()
}

/// The entities the sanitizer's serializer emits for text content.
const ENTITIES: [(&str, char); 5] = [
    ("&amp;", '&'),
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&quot;", '"'),
    ("&nbsp;", '\u{a0}'),
];

fn decode_entities(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];
        let (ch, len) = ENTITIES
            .iter()
            .find(|(entity, _)| rest.starts_with(entity))
            .map_or(('&', 1), |(entity, ch)| (*ch, entity.len()));
        out.push(ch);
        rest = &rest[len..];
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone)]
pub struct ChatService {
    db_client: Arc<dyn DataStore>,
    realtime: Arc<RealtimeHub>,
}

impl ChatService {
    pub fn new(db_client: Arc<dyn DataStore>, realtime: Arc<RealtimeHub>) -> Self {
        Self { db_client, realtime }
    }

    /// Opens (creating if needed) the booking's room, marks the other party's
    /// messages read and returns the history.
    pub async fn open_room(
        &self,
        session: &AuthSession,
        booking_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<RoomHistoryDto, ServiceError> {
        let booking = self.load_booking(booking_id).await?;
        ensure_participant(session, &booking)?;

        let room = self.db_client.create_or_get_room(booking_id).await?;
        let marked_read = self.mark_read_in(session, &room).await?;
        let messages = self.db_client.get_room_messages(room.id, limit, offset).await?;

        Ok(RoomHistoryDto { room, messages, marked_read })
    }

    pub async fn get_room(&self, session: &AuthSession, room_id: Uuid) -> Result<ChatRoom, ServiceError> {
        let room = self
            .db_client
            .get_room_by_id(room_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Chat room {}", room_id)))?;

        let booking = self.load_booking(room.booking_id).await?;
        ensure_participant(session, &booking)?;
        Ok(room)
    }

    pub async fn get_messages(
        &self,
        session: &AuthSession,
        room_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, ServiceError> {
        let room = self.get_room(session, room_id).await?;
        Ok(self.db_client.get_room_messages(room.id, limit, offset).await?)
    }

    pub async fn mark_read(&self, session: &AuthSession, room_id: Uuid) -> Result<u64, ServiceError> {
        let room = self.get_room(session, room_id).await?;
        self.mark_read_in(session, &room).await
    }

    /// Plain insert. No delivery acknowledgement; a failure is returned for the caller to retry.
    pub async fn send_message(
        &self,
        session: &AuthSession,
        room_id: Uuid,
        text: &str,
    ) -> Result<Message, ServiceError> {
        let clean = sanitize_message(text);
        if clean.is_empty() {
            return Err(ServiceError::validation("Message cannot be empty"));
        }
        if clean.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(ServiceError::validation(format!(
                "Message must be at most {} characters",
                MAX_MESSAGE_LENGTH
            )));
        }

        let room = self.get_room(session, room_id).await?;
        let booking = self.load_booking(room.booking_id).await?;
        let message = self.db_client.send_message(room.id, session.user_id, &clean).await?;

        info!("Message {} sent in room {}", message.id, room.id);
        self.realtime.publish(
            ChangeEvent::new(ChangeTable::Messages, ChangeKind::Insert, message.id, &message)
                .scoped(room.id)
                .for_users(booking.audience()),
        );
        Ok(message)
    }

    pub async fn list_rooms(&self, session: &AuthSession, limit: i64, offset: i64) -> Result<Vec<ChatRoom>, ServiceError> {
        Ok(self.db_client.get_user_rooms(session.user_id, limit, offset).await?)
    }

    pub async fn unread_count(&self, session: &AuthSession) -> Result<i64, ServiceError> {
        Ok(self.db_client.get_unread_count(session.user_id).await?)
    }

    /// Live message inserts for one room, after checking the caller belongs to it.
    pub async fn subscribe_room(&self, session: &AuthSession, room_id: Uuid) -> Result<Subscription, ServiceError> {
        let room = self.get_room(session, room_id).await?;
        Ok(self.realtime.subscribe(ChangeFilter::Scope {
            table: ChangeTable::Messages,
            scope_id: room.id,
        }))
    }

    async fn mark_read_in(&self, session: &AuthSession, room: &ChatRoom) -> Result<u64, ServiceError> {
        let marked = self.db_client.mark_messages_as_read(room.id, session.user_id).await?;
        if marked > 0 {
            self.realtime.publish(
                ChangeEvent::new(ChangeTable::ChatRooms, ChangeKind::Update, room.id, room)
                    .scoped(room.id)
                    .for_users(vec![session.user_id]),
            );
        }
        Ok(marked)
    }

    async fn load_booking(&self, booking_id: Uuid) -> Result<Booking, ServiceError> {
        self.db_client
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Booking {}", booking_id)))
    }
}

fn ensure_participant(session: &AuthSession, booking: &Booking) -> Result<(), ServiceError> {
    if booking.is_participant(session.user_id) {
        Ok(())
    } else {
        Err(ServiceError::forbidden("access this chat"))
    }
}

/// An open chat view. Opening marks the other party's messages read, and so
/// does every new message from them that arrives while the view is open.
/// Dropping the session ends the live subscription.
#[derive(Debug)]
pub struct ChatRoomSession {
    service: Arc<ChatService>,
    session: AuthSession,
    room: ChatRoom,
    messages: Vec<Message>,
    subscription: Subscription,
}

impl ChatRoomSession {
    pub const HISTORY_LIMIT: i64 = 100;

    pub async fn open(
        service: Arc<ChatService>,
        session: AuthSession,
        booking_id: Uuid,
    ) -> Result<Self, ServiceError> {
        let history = service.open_room(&session, booking_id, Self::HISTORY_LIMIT, 0).await?;
        let subscription = service.subscribe_room(&session, history.room.id).await?;
        Ok(Self {
            service,
            session,
            room: history.room,
            messages: history.messages,
            subscription,
        })
    }

    pub fn room(&self) -> &ChatRoom {
        &self.room
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub async fn send(&mut self, text: &str) -> Result<Message, ServiceError> {
        self.service.send_message(&self.session, self.room.id, text).await
    }

    /// Waits for the next message in the room and appends it. `None` once the
    /// realtime hub has shut down.
    pub async fn next_message(&mut self) -> Option<Message> {
        loop {
            let event = self.subscription.next().await?;
            let message: Message = match serde_json::from_value(event.payload.clone()) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Skipping malformed message event {}: {}", event.row_id, e);
                    continue;
                }
            };
            if self.messages.iter().any(|m| m.id == message.id) {
                continue;
            }

            if message.sender_id != self.session.user_id {
                if let Err(e) = self.service.mark_read(&self.session, self.room.id).await {
                    warn!("Failed to mark room {} read: {}", self.room.id, e);
                }
            }
            self.messages.push(message.clone());
            return Some(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{bookingdb::BookingExt, chatdb::ChatExt, MemoryStore},
        models::{bookingmodel::*, usermodel::UserRole},
        service::test_support::{session, store},
    };

    async fn setup() -> (Arc<MemoryStore>, Arc<ChatService>, AuthSession, AuthSession, Booking) {
        let store = store();
        let service = Arc::new(ChatService::new(store.clone(), Arc::new(RealtimeHub::default())));
        let customer = session(&store, UserRole::User).await;
        let mechanic = session(&store, UserRole::Mechanic).await;
        let booking = store
            .create_booking(
                customer.user_id,
                NewBooking {
                    service_type: "battery".to_string(),
                    vehicle_type: VehicleType::Car,
                    description: None,
                    location: "Indiranagar".to_string(),
                    coordinates: None,
                    estimated_cost: None,
                },
            )
            .await
            .unwrap();
        let booking = store.accept_booking(booking.id, mechanic.user_id, None).await.unwrap().unwrap();
        (store, service, customer, mechanic, booking)
    }

    #[test]
    fn test_sanitize_strips_markup() {
        assert_eq!(sanitize_message("  <b>on my</b> way <img src=x onerror=alert(1)> "), "on my way");
        assert_eq!(sanitize_message("<i></i>   "), "");
    }

    #[test]
    fn test_sanitize_keeps_plain_text_characters() {
        assert_eq!(sanitize_message("Tom & Jerry: 5 < 6 \"ok\""), "Tom & Jerry: 5 < 6 \"ok\"");
        assert_eq!(sanitize_message("a > b && c"), "a > b && c");
        assert_eq!(sanitize_message("literally &amp;lt;"), "literally &lt;");
    }

    #[tokio::test]
    async fn test_open_marks_only_other_party_messages_read() {
        let (store, service, customer, mechanic, booking) = setup().await;
        let room = service.open_room(&customer, booking.id, 50, 0).await.unwrap().room;

        service.send_message(&customer, room.id, "hello").await.unwrap();
        service.send_message(&mechanic, room.id, "on my way").await.unwrap();

        let history = service.open_room(&customer, booking.id, 50, 0).await.unwrap();
        assert_eq!(history.marked_read, 1);

        let messages = store.get_room_messages(room.id, 50, 0).await.unwrap();
        let own = messages.iter().find(|m| m.sender_id == customer.user_id).unwrap();
        let theirs = messages.iter().find(|m| m.sender_id == mechanic.user_id).unwrap();
        assert!(!own.is_read);
        assert!(theirs.is_read);
    }

    #[tokio::test]
    async fn test_send_rejects_empty_after_sanitizing() {
        let (_, service, customer, _, booking) = setup().await;
        let room = service.open_room(&customer, booking.id, 50, 0).await.unwrap().room;
        let err = service.send_message(&customer, room.id, "<p>  </p>").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_outsiders_cannot_read_or_write() {
        let (store, service, customer, _, booking) = setup().await;
        let room = service.open_room(&customer, booking.id, 50, 0).await.unwrap().room;
        let outsider = session(&store, UserRole::Mechanic).await;

        assert!(matches!(
            service.open_room(&outsider, booking.id, 50, 0).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(service.send_message(&outsider, room.id, "hi").await.is_err());
    }

    #[tokio::test]
    async fn test_unread_count_and_room_listing() {
        let (_, service, customer, mechanic, booking) = setup().await;
        let room = service.open_room(&customer, booking.id, 50, 0).await.unwrap().room;

        service.send_message(&mechanic, room.id, "one").await.unwrap();
        service.send_message(&mechanic, room.id, "two").await.unwrap();

        assert_eq!(service.unread_count(&customer).await.unwrap(), 2);
        assert_eq!(service.unread_count(&mechanic).await.unwrap(), 0);

        let rooms = service.list_rooms(&mechanic, 10, 0).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert!(rooms[0].last_message_at.is_some());
    }

    #[tokio::test]
    async fn test_room_session_marks_incoming_messages_read() {
        let (store, service, customer, mechanic, booking) = setup().await;
        let mut view = ChatRoomSession::open(service.clone(), customer.clone(), booking.id)
            .await
            .unwrap();
        let room_id = view.room().id;

        service.send_message(&mechanic, room_id, "arriving in 5").await.unwrap();
        let incoming = view.next_message().await.unwrap();

        assert_eq!(incoming.message_text, "arriving in 5");
        assert_eq!(view.messages().len(), 1);
        assert_eq!(store.get_unread_count(customer.user_id).await.unwrap(), 0);

        let own = view.send("see you").await.unwrap();
        assert_eq!(view.next_message().await.unwrap().id, own.id);
    }
}

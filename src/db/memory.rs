// db/memory.rs
//! In-process implementation of every store trait. Backs `DATABASE_URL=memory://`
//! for demos and the service tests. Same guards as the SQL, minus durability.
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{types::Json, Error};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    bookingdb::BookingExt,
    chatdb::ChatExt,
    sosdb::SosExt,
    storedb::{OrderExt, ProductExt},
    userdb::UserExt,
    DataStore,
};
use crate::models::{
    bookingmodel::*,
    chatmodels::*,
    storemodels::*,
    usermodel::{normalize_services, MechanicFilter, Profile, ProfileUpdate, User, UserRole},
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    profiles: HashMap<Uuid, Profile>,
    bookings: HashMap<Uuid, Booking>,
    sos: HashMap<Uuid, SosRequest>,
    rooms: HashMap<Uuid, ChatRoom>,
    messages: Vec<Message>,
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, Order>,
}

impl Tables {
    fn room_participants(&self, room: &ChatRoom) -> Option<&Booking> {
        self.bookings.get(&room.booking_id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

fn page<T>(mut rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = offset.max(0) as usize;
    let limit = limit.max(0) as usize;
    if offset >= rows.len() {
        return Vec::new();
    }
    rows.drain(..offset);
    rows.truncate(limit);
    rows
}

#[async_trait]
impl UserExt for MemoryStore {
    async fn get_user(&self, user_id: Option<Uuid>, email: Option<&str>) -> Result<Option<User>, Error> {
        let tables = self.tables.read().await;
        if let Some(user_id) = user_id {
            return Ok(tables.users.get(&user_id).cloned());
        }
        Ok(email.and_then(|email| {
            tables
                .users
                .values()
                .find(|u| u.email.eq_ignore_ascii_case(email))
                .cloned()
        }))
    }

    async fn create_user_with_profile(
        &self,
        email: &str,
        password_hash: &str,
        full_name: &str,
        phone: Option<&str>,
        role: UserRole,
    ) -> Result<(User, Profile), Error> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(Error::Protocol(
                "duplicate key value violates unique constraint \"users_email_key\"".to_string(),
            ));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password: password_hash.to_string(),
            created_at: now,
        };
        let profile = Profile {
            user_id: user.id,
            full_name: full_name.to_string(),
            phone: phone.map(str::to_string),
            role,
            is_available: role == UserRole::Mechanic,
            is_verified: false,
            rating: 0.0,
            total_reviews: 0,
            services_offered: Vec::new(),
            location: None,
            latitude: None,
            longitude: None,
            verification_photo_url: None,
            created_at: now,
            updated_at: now,
        };

        tables.users.insert(user.id, user.clone());
        tables.profiles.insert(user.id, profile.clone());
        Ok((user, profile))
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, Error> {
        Ok(self.tables.read().await.profiles.get(&user_id).cloned())
    }

    async fn get_profiles(&self, user_ids: &[Uuid]) -> Result<Vec<Profile>, Error> {
        let tables = self.tables.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.profiles.get(id).cloned())
            .collect())
    }

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<Option<Profile>, Error> {
        let mut tables = self.tables.write().await;
        let Some(profile) = tables.profiles.get_mut(&user_id) else {
            return Ok(None);
        };

        if let Some(full_name) = update.full_name {
            profile.full_name = full_name;
        }
        if let Some(phone) = update.phone {
            profile.phone = Some(phone);
        }
        if let Some(is_available) = update.is_available {
            profile.is_available = is_available;
        }
        if let Some(services) = update.services_offered {
            profile.services_offered = normalize_services(&services);
        }
        if let Some(location) = update.location {
            profile.location = Some(location);
        }
        if let Some(coordinates) = update.coordinates {
            profile.latitude = Some(coordinates.latitude);
            profile.longitude = Some(coordinates.longitude);
        }
        if let Some(url) = update.verification_photo_url {
            profile.verification_photo_url = Some(url);
        }
        profile.updated_at = Utc::now();
        Ok(Some(profile.clone()))
    }

    async fn set_profile_verified(&self, user_id: Uuid, verified: bool) -> Result<Option<Profile>, Error> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .profiles
            .get_mut(&user_id)
            .filter(|p| p.is_mechanic())
            .map(|profile| {
                profile.is_verified = verified;
                profile.updated_at = Utc::now();
                profile.clone()
            }))
    }

    async fn find_mechanics(&self, filter: &MechanicFilter) -> Result<Vec<Profile>, Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Profile> = tables
            .profiles
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.is_verified
                .cmp(&a.is_verified)
                .then(b.rating.total_cmp(&a.rating))
                .then(b.total_reviews.cmp(&a.total_reviews))
        });
        Ok(page(rows, filter.limit, filter.offset))
    }
}

#[async_trait]
impl BookingExt for MemoryStore {
    async fn create_booking(&self, user_id: Uuid, booking: NewBooking) -> Result<Booking, Error> {
        let now = Utc::now();
        let row = Booking {
            id: Uuid::new_v4(),
            user_id,
            mechanic_id: None,
            service_type: booking.service_type,
            vehicle_type: booking.vehicle_type,
            description: booking.description,
            location: booking.location,
            latitude: booking.coordinates.map(|c| c.latitude),
            longitude: booking.coordinates.map(|c| c.longitude),
            mechanic_latitude: None,
            mechanic_longitude: None,
            mechanic_location_updated_at: None,
            status: BookingStatus::Pending,
            estimated_cost: booking.estimated_cost,
            final_cost: None,
            customer_rating: None,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            completed_at: None,
        };
        self.tables.write().await.bookings.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, Error> {
        Ok(self.tables.read().await.bookings.get(&booking_id).cloned())
    }

    async fn get_customer_bookings(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Booking>, Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Booking> = tables.bookings.values().filter(|b| b.user_id == user_id).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, limit, offset))
    }

    async fn get_mechanic_bookings(&self, mechanic_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Booking>, Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.mechanic_id == Some(mechanic_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, limit, offset))
    }

    async fn get_pending_bookings(&self, limit: i64, offset: i64) -> Result<Vec<Booking>, Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.mechanic_id.is_none())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(page(rows, limit, offset))
    }

    async fn accept_booking(
        &self,
        booking_id: Uuid,
        mechanic_id: Uuid,
        location: Option<Coordinates>,
    ) -> Result<Option<Booking>, Error> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .bookings
            .get_mut(&booking_id)
            .filter(|b| b.status == BookingStatus::Pending && b.mechanic_id.is_none())
            .map(|booking| {
                let now = Utc::now();
                booking.mechanic_id = Some(mechanic_id);
                booking.status = BookingStatus::Confirmed;
                booking.mechanic_latitude = location.map(|c| c.latitude);
                booking.mechanic_longitude = location.map(|c| c.longitude);
                booking.mechanic_location_updated_at = location.map(|_| now);
                booking.accepted_at = Some(now);
                booking.updated_at = now;
                booking.clone()
            }))
    }

    async fn update_booking_status(
        &self,
        booking_id: Uuid,
        from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<Option<Booking>, Error> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .bookings
            .get_mut(&booking_id)
            .filter(|b| from.contains(&b.status))
            .map(|booking| {
                booking.status = to;
                booking.updated_at = Utc::now();
                booking.clone()
            }))
    }

    async fn complete_booking(
        &self,
        booking_id: Uuid,
        mechanic_id: Uuid,
        final_cost: Option<i64>,
    ) -> Result<Option<Booking>, Error> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .bookings
            .get_mut(&booking_id)
            .filter(|b| b.mechanic_id == Some(mechanic_id) && b.status.is_active())
            .map(|booking| {
                let now = Utc::now();
                booking.status = BookingStatus::Completed;
                booking.final_cost = final_cost.or(booking.estimated_cost);
                booking.completed_at = Some(now);
                booking.updated_at = now;
                booking.clone()
            }))
    }

    async fn update_mechanic_location(
        &self,
        booking_id: Uuid,
        mechanic_id: Uuid,
        location: Coordinates,
    ) -> Result<Option<Booking>, Error> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .bookings
            .get_mut(&booking_id)
            .filter(|b| b.mechanic_id == Some(mechanic_id) && b.status.is_active())
            .map(|booking| {
                let now = Utc::now();
                booking.mechanic_latitude = Some(location.latitude);
                booking.mechanic_longitude = Some(location.longitude);
                booking.mechanic_location_updated_at = Some(now);
                booking.updated_at = now;
                booking.clone()
            }))
    }

    async fn review_booking(&self, booking_id: Uuid, user_id: Uuid, rating: i16) -> Result<Option<Booking>, Error> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let Some(rated) = tables
            .bookings
            .get_mut(&booking_id)
            .filter(|b| {
                b.user_id == user_id
                    && b.status == BookingStatus::Completed
                    && b.customer_rating.is_none()
            })
            .map(|booking| {
                booking.customer_rating = Some(rating);
                booking.updated_at = now;
                booking.clone()
            })
        else {
            return Ok(None);
        };

        if let Some(profile) = rated
            .mechanic_id
            .and_then(|id| tables.profiles.get_mut(&id))
            .filter(|p| p.is_mechanic())
        {
            let (average, total) = profile.with_review(rating);
            profile.rating = average;
            profile.total_reviews = total;
            profile.updated_at = now;
        }
        Ok(Some(rated))
    }
}

#[async_trait]
impl SosExt for MemoryStore {
    async fn create_sos(&self, user_id: Uuid, request: NewSosRequest) -> Result<SosRequest, Error> {
        let now = Utc::now();
        let row = SosRequest {
            id: Uuid::new_v4(),
            user_id,
            assigned_mechanic_id: None,
            service_type: request.service_type,
            vehicle_type: request.vehicle_type,
            description: request.description,
            location: request.location,
            latitude: request.coordinates.map(|c| c.latitude),
            longitude: request.coordinates.map(|c| c.longitude),
            mechanic_latitude: None,
            mechanic_longitude: None,
            mechanic_location_updated_at: None,
            status: BookingStatus::Pending,
            urgency_level: request.urgency_level,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            completed_at: None,
        };
        self.tables.write().await.sos.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_sos(&self, sos_id: Uuid) -> Result<Option<SosRequest>, Error> {
        Ok(self.tables.read().await.sos.get(&sos_id).cloned())
    }

    async fn get_user_sos(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<SosRequest>, Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<SosRequest> = tables.sos.values().filter(|s| s.user_id == user_id).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, limit, offset))
    }

    async fn get_mechanic_sos(&self, mechanic_id: Uuid, limit: i64, offset: i64) -> Result<Vec<SosRequest>, Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<SosRequest> = tables
            .sos
            .values()
            .filter(|s| s.assigned_mechanic_id == Some(mechanic_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, limit, offset))
    }

    async fn get_open_sos(&self, limit: i64, offset: i64) -> Result<Vec<SosRequest>, Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<SosRequest> = tables
            .sos
            .values()
            .filter(|s| s.status == BookingStatus::Pending && s.assigned_mechanic_id.is_none())
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.urgency_level
                .cmp(&a.urgency_level)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(page(rows, limit, offset))
    }

    async fn accept_sos(
        &self,
        sos_id: Uuid,
        mechanic_id: Uuid,
        location: Option<Coordinates>,
    ) -> Result<Option<SosRequest>, Error> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .sos
            .get_mut(&sos_id)
            .filter(|s| s.status == BookingStatus::Pending && s.assigned_mechanic_id.is_none())
            .map(|sos| {
                let now = Utc::now();
                sos.assigned_mechanic_id = Some(mechanic_id);
                sos.status = BookingStatus::Confirmed;
                sos.mechanic_latitude = location.map(|c| c.latitude);
                sos.mechanic_longitude = location.map(|c| c.longitude);
                sos.mechanic_location_updated_at = location.map(|_| now);
                sos.accepted_at = Some(now);
                sos.updated_at = now;
                sos.clone()
            }))
    }

    async fn update_sos_status(
        &self,
        sos_id: Uuid,
        from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<Option<SosRequest>, Error> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .sos
            .get_mut(&sos_id)
            .filter(|s| from.contains(&s.status))
            .map(|sos| {
                let now = Utc::now();
                sos.status = to;
                if to == BookingStatus::Completed {
                    sos.completed_at = Some(now);
                }
                sos.updated_at = now;
                sos.clone()
            }))
    }

    async fn update_sos_location(
        &self,
        sos_id: Uuid,
        mechanic_id: Uuid,
        location: Coordinates,
    ) -> Result<Option<SosRequest>, Error> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .sos
            .get_mut(&sos_id)
            .filter(|s| s.assigned_mechanic_id == Some(mechanic_id) && s.status.is_active())
            .map(|sos| {
                let now = Utc::now();
                sos.mechanic_latitude = Some(location.latitude);
                sos.mechanic_longitude = Some(location.longitude);
                sos.mechanic_location_updated_at = Some(now);
                sos.updated_at = now;
                sos.clone()
            }))
    }
}

#[async_trait]
impl ChatExt for MemoryStore {
    async fn create_or_get_room(&self, booking_id: Uuid) -> Result<ChatRoom, Error> {
        let mut tables = self.tables.write().await;
        if let Some(room) = tables.rooms.values().find(|r| r.booking_id == booking_id) {
            return Ok(room.clone());
        }
        let room = ChatRoom {
            id: Uuid::new_v4(),
            booking_id,
            last_message_at: None,
            created_at: Utc::now(),
        };
        tables.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn get_room_by_id(&self, room_id: Uuid) -> Result<Option<ChatRoom>, Error> {
        Ok(self.tables.read().await.rooms.get(&room_id).cloned())
    }

    async fn get_room_by_booking(&self, booking_id: Uuid) -> Result<Option<ChatRoom>, Error> {
        Ok(self
            .tables
            .read()
            .await
            .rooms
            .values()
            .find(|r| r.booking_id == booking_id)
            .cloned())
    }

    async fn get_user_rooms(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<ChatRoom>, Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<ChatRoom> = tables
            .rooms
            .values()
            .filter(|room| {
                tables
                    .room_participants(room)
                    .map_or(false, |b| b.is_participant(user_id))
            })
            .cloned()
            .collect();
        // NULLS LAST, then newest room first.
        rows.sort_by(|a, b| match (a.last_message_at, b.last_message_at) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.created_at.cmp(&a.created_at),
        });
        Ok(page(rows, limit, offset))
    }

    async fn send_message(&self, room_id: Uuid, sender_id: Uuid, message_text: &str) -> Result<Message, Error> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let Some(room) = tables.rooms.get_mut(&room_id) else {
            return Err(Error::RowNotFound);
        };
        room.last_message_at = Some(now);

        let message = Message {
            id: Uuid::new_v4(),
            room_id,
            sender_id,
            message_text: message_text.to_string(),
            is_read: false,
            created_at: now,
        };
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn get_room_messages(&self, room_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Message>, Error> {
        let tables = self.tables.read().await;
        let rows: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();
        Ok(page(rows, limit, offset))
    }

    async fn mark_messages_as_read(&self, room_id: Uuid, viewer_id: Uuid) -> Result<u64, Error> {
        let mut tables = self.tables.write().await;
        let mut updated = 0;
        for message in tables
            .messages
            .iter_mut()
            .filter(|m| m.room_id == room_id && m.readable_by(viewer_id))
        {
            message.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn get_unread_count(&self, user_id: Uuid) -> Result<i64, Error> {
        let tables = self.tables.read().await;
        let count = tables
            .messages
            .iter()
            .filter(|m| m.readable_by(user_id))
            .filter(|m| {
                tables
                    .rooms
                    .get(&m.room_id)
                    .and_then(|room| tables.room_participants(room))
                    .map_or(false, |b| b.is_participant(user_id))
            })
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl ProductExt for MemoryStore {
    async fn create_product(&self, mechanic_id: Uuid, product: NewProduct) -> Result<Product, Error> {
        let now = Utc::now();
        let row = Product {
            id: Uuid::new_v4(),
            mechanic_id,
            title: product.title,
            description: product.description,
            price: product.price,
            stock: product.stock,
            image_url: product.image_url,
            active: product.active,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.products.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, Error> {
        Ok(self.tables.read().await.products.get(&product_id).cloned())
    }

    async fn get_products_by_ids(&self, product_ids: &[Uuid]) -> Result<Vec<Product>, Error> {
        let tables = self.tables.read().await;
        Ok(product_ids
            .iter()
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }

    async fn get_active_products(
        &self,
        mechanic_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Product>, Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Product> = tables
            .products
            .values()
            .filter(|p| p.active && mechanic_id.map_or(true, |m| p.mechanic_id == m))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, limit, offset))
    }

    async fn get_mechanic_products(&self, mechanic_id: Uuid) -> Result<Vec<Product>, Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Product> = tables
            .products
            .values()
            .filter(|p| p.mechanic_id == mechanic_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn update_product(
        &self,
        product_id: Uuid,
        mechanic_id: Uuid,
        update: ProductUpdate,
    ) -> Result<Option<Product>, Error> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .products
            .get_mut(&product_id)
            .filter(|p| p.mechanic_id == mechanic_id)
            .map(|product| {
                if let Some(title) = update.title {
                    product.title = title;
                }
                if let Some(description) = update.description {
                    product.description = Some(description);
                }
                if let Some(price) = update.price {
                    product.price = price;
                }
                if let Some(stock) = update.stock {
                    product.stock = stock;
                }
                if let Some(image_url) = update.image_url {
                    product.image_url = Some(image_url);
                }
                if let Some(active) = update.active {
                    product.active = active;
                }
                product.updated_at = Utc::now();
                product.clone()
            }))
    }
}

#[async_trait]
impl OrderExt for MemoryStore {
    async fn create_order(&self, user_id: Uuid, order: NewOrder) -> Result<Order, Error> {
        let row = Order {
            id: Uuid::new_v4(),
            user_id,
            items: Json(order.items),
            subtotal: order.subtotal,
            tax: order.tax,
            shipping: order.shipping,
            total_amount: order.total_amount,
            payment_reference: order.payment_reference,
            status: OrderStatus::Paid,
            created_at: Utc::now(),
        };
        self.tables.write().await.orders.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, Error> {
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn get_user_orders(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Order>, Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Order> = tables.orders.values().filter(|o| o.user_id == user_id).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, limit, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_booking() -> NewBooking {
        NewBooking {
            service_type: "flat tyre".to_string(),
            vehicle_type: VehicleType::Car,
            description: None,
            location: "MG Road".to_string(),
            coordinates: Some(Coordinates::new(12.97, 77.59)),
            estimated_cost: Some(50_000),
        }
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(page(vec![1, 2, 3, 4], 2, 1), vec![2, 3]);
        assert!(page(vec![1, 2], 5, 9).is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        store
            .create_user_with_profile("a@x.com", "hash", "A", None, UserRole::User)
            .await
            .unwrap();
        let err = store
            .create_user_with_profile("A@X.com", "hash", "A", None, UserRole::User)
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_accept_guard_matches_sql_semantics() {
        let store = MemoryStore::new();
        let booking = store.create_booking(Uuid::new_v4(), new_booking()).await.unwrap();

        let first = store.accept_booking(booking.id, Uuid::new_v4(), None).await.unwrap();
        assert!(first.is_some());

        let second = store.accept_booking(booking.id, Uuid::new_v4(), None).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_review_updates_booking_and_mechanic_together() {
        let store = MemoryStore::new();
        let customer = Uuid::new_v4();
        let (mechanic, _) = store
            .create_user_with_profile("m@x.com", "hash", "M", None, UserRole::Mechanic)
            .await
            .unwrap();
        let booking = store.create_booking(customer, new_booking()).await.unwrap();
        store.accept_booking(booking.id, mechanic.id, None).await.unwrap();
        store
            .update_booking_status(booking.id, &[BookingStatus::Confirmed], BookingStatus::Completed)
            .await
            .unwrap();

        let rated = store.review_booking(booking.id, customer, 4).await.unwrap().unwrap();
        assert_eq!(rated.customer_rating, Some(4));
        let profile = store.get_profile(mechanic.id).await.unwrap().unwrap();
        assert_eq!((profile.rating, profile.total_reviews), (4.0, 1));

        assert!(store.review_booking(booking.id, customer, 1).await.unwrap().is_none());
        let profile = store.get_profile(mechanic.id).await.unwrap().unwrap();
        assert_eq!(profile.total_reviews, 1);
    }

    #[tokio::test]
    async fn test_rooms_sorted_by_last_message() {
        let store = MemoryStore::new();
        let customer = Uuid::new_v4();
        let first = store.create_booking(customer, new_booking()).await.unwrap();
        let second = store.create_booking(customer, new_booking()).await.unwrap();
        let quiet = store.create_or_get_room(first.id).await.unwrap();
        let busy = store.create_or_get_room(second.id).await.unwrap();

        store.send_message(busy.id, customer, "hello").await.unwrap();

        let rooms = store.get_user_rooms(customer, 10, 0).await.unwrap();
        assert_eq!(rooms.iter().map(|r| r.id).collect::<Vec<_>>(), vec![busy.id, quiet.id]);
        assert!(store.get_user_rooms(Uuid::new_v4(), 10, 0).await.unwrap().is_empty());
    }
}

// service/realtime.rs
//! Row-change fan-out. Every successful write publishes a [`ChangeEvent`];
//! subscribers hold a [`Subscription`] that yields only the events their
//! [`ChangeFilter`] admits. Dropping the subscription unsubscribes.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use uuid::Uuid;

use crate::middleware::AuthSession;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Bookings,
    SosRequests,
    ChatRooms,
    Messages,
    Profiles,
    Products,
    Orders,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub kind: ChangeKind,
    pub row_id: Uuid,
    /// Parent row the change belongs to, e.g. the chat room of a message.
    pub scope_id: Option<Uuid>,
    #[serde(skip)]
    pub audience: Vec<Uuid>,
    #[serde(skip)]
    pub open_to_mechanics: bool,
    /// Users the pool flag does not reach, because they get the full row elsewhere.
    #[serde(skip)]
    pub except: Vec<Uuid>,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new<T: Serialize>(table: ChangeTable, kind: ChangeKind, row_id: Uuid, row: &T) -> Self {
        Self {
            table,
            kind,
            row_id,
            scope_id: None,
            audience: Vec::new(),
            open_to_mechanics: false,
            except: Vec::new(),
            payload: serde_json::to_value(row).unwrap_or(serde_json::Value::Null),
            at: Utc::now(),
        }
    }

    pub fn scoped(mut self, scope_id: Uuid) -> Self {
        self.scope_id = Some(scope_id);
        self
    }

    pub fn for_users(mut self, audience: Vec<Uuid>) -> Self {
        self.audience = audience;
        self
    }

    /// Mark the change as relevant to every mechanic (the open request pool).
    pub fn open_to_mechanics(mut self, open: bool) -> Self {
        self.open_to_mechanics = open;
        self
    }

    /// Tells pool watchers a row has left the open pool. Carries only the id and
    /// the new status; the participants already receive the full row.
    pub fn pool_exit<S: Serialize>(table: ChangeTable, row_id: Uuid, status: S, participants: Vec<Uuid>) -> Self {
        let mut event = Self::new(
            table,
            ChangeKind::Update,
            row_id,
            &serde_json::json!({ "id": row_id, "status": status }),
        )
        .open_to_mechanics(true);
        event.except = participants;
        event
    }
}

/// Who a subscription delivers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: Uuid,
    pub is_mechanic: bool,
    pub is_admin: bool,
}

impl Viewer {
    pub fn of(session: &AuthSession) -> Self {
        Self {
            user_id: session.user_id,
            is_mechanic: session.is_mechanic(),
            is_admin: session.is_admin(),
        }
    }

    pub fn admits(&self, event: &ChangeEvent) -> bool {
        self.is_admin
            || event.audience.contains(&self.user_id)
            || (self.is_mechanic && event.open_to_mechanics && !event.except.contains(&self.user_id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeFilter {
    /// Updates to one row, e.g. a booking being tracked, that the viewer may still see.
    Row { table: ChangeTable, row_id: Uuid, viewer: Viewer },
    /// Changes scoped to a parent row, e.g. messages of one chat room.
    Scope { table: ChangeTable, scope_id: Uuid },
    /// Everything the user may see: their own rows, plus the open pool for mechanics.
    VisibleTo { user_id: Uuid, is_mechanic: bool },
}

impl ChangeFilter {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            ChangeFilter::Row { table, row_id, viewer } => {
                event.table == *table && event.row_id == *row_id && viewer.admits(event)
            }
            ChangeFilter::Scope { table, scope_id } => {
                event.table == *table && event.scope_id == Some(*scope_id)
            }
            ChangeFilter::VisibleTo { user_id, is_mechanic } => Viewer {
                user_id: *user_id,
                is_mechanic: *is_mechanic,
                is_admin: false,
            }
            .admits(event),
        }
    }
}

#[derive(Debug)]
pub struct RealtimeHub {
    sender: broadcast::Sender<Arc<ChangeEvent>>,
}

impl RealtimeHub {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many subscribers were listening. Nobody listening is not an error.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        tracing::debug!(table = ?event.table, kind = ?event.kind, row_id = %event.row_id, "publishing change");
        self.sender.send(Arc::new(event)).unwrap_or(0)
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// A live subscription. Dropping it releases the underlying receiver.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<Arc<ChangeEvent>>,
    filter: ChangeFilter,
}

impl Subscription {
    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }

    /// Waits for the next matching event. `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<Arc<ChangeEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagged, dropping missed changes");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Arc<ChangeEvent>> + Send + 'static {
        let filter = self.filter;
        BroadcastStream::new(self.receiver).filter_map(move |result| match result {
            Ok(event) if filter.matches(&event) => Some(event),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn booking_event(row_id: Uuid, audience: Vec<Uuid>) -> ChangeEvent {
        ChangeEvent::new(ChangeTable::Bookings, ChangeKind::Update, row_id, &json!({"id": row_id}))
            .for_users(audience)
    }

    fn viewer(user_id: Uuid, is_mechanic: bool) -> Viewer {
        Viewer { user_id, is_mechanic, is_admin: false }
    }

    #[tokio::test]
    async fn test_row_filter_skips_other_rows() {
        let hub = RealtimeHub::default();
        let customer = Uuid::new_v4();
        let watched = Uuid::new_v4();
        let mut sub = hub.subscribe(ChangeFilter::Row {
            table: ChangeTable::Bookings,
            row_id: watched,
            viewer: viewer(customer, false),
        });

        hub.publish(booking_event(Uuid::new_v4(), vec![customer]));
        hub.publish(booking_event(watched, vec![customer]));

        let event = sub.next().await.unwrap();
        assert_eq!(event.row_id, watched);
    }

    #[test]
    fn test_row_filter_requires_audience_or_open_pool() {
        let row = Uuid::new_v4();
        let customer = Uuid::new_v4();
        let assigned = Uuid::new_v4();
        let outsider = viewer(Uuid::new_v4(), true);
        let filter = ChangeFilter::Row { table: ChangeTable::Bookings, row_id: row, viewer: outsider };

        assert!(filter.matches(&booking_event(row, vec![customer]).open_to_mechanics(true)));
        assert!(!filter.matches(&booking_event(row, vec![customer, assigned])));

        let exit = ChangeEvent::pool_exit(ChangeTable::Bookings, row, "confirmed", vec![customer, assigned]);
        assert!(filter.matches(&exit));
        assert_eq!(exit.payload, json!({ "id": row, "status": "confirmed" }));

        let winner = ChangeFilter::Row { table: ChangeTable::Bookings, row_id: row, viewer: viewer(assigned, true) };
        assert!(!winner.matches(&exit));

        let admin = Viewer { user_id: Uuid::new_v4(), is_mechanic: false, is_admin: true };
        let filter = ChangeFilter::Row { table: ChangeTable::Bookings, row_id: row, viewer: admin };
        assert!(filter.matches(&booking_event(row, vec![customer])));
    }

    #[tokio::test]
    async fn test_scope_filter_for_chat_room() {
        let hub = RealtimeHub::default();
        let room = Uuid::new_v4();
        let mut sub = hub.subscribe(ChangeFilter::Scope { table: ChangeTable::Messages, scope_id: room });

        let msg = Uuid::new_v4();
        hub.publish(ChangeEvent::new(ChangeTable::Messages, ChangeKind::Insert, msg, &json!({})).scoped(room));

        assert_eq!(sub.next().await.unwrap().row_id, msg);
    }

    #[test]
    fn test_visible_to_includes_open_pool_for_mechanics_only() {
        let customer = Uuid::new_v4();
        let event = booking_event(Uuid::new_v4(), vec![customer]).open_to_mechanics(true);

        assert!(ChangeFilter::VisibleTo { user_id: customer, is_mechanic: false }.matches(&event));
        assert!(ChangeFilter::VisibleTo { user_id: Uuid::new_v4(), is_mechanic: true }.matches(&event));
        assert!(!ChangeFilter::VisibleTo { user_id: Uuid::new_v4(), is_mechanic: false }.matches(&event));
    }

    #[test]
    fn test_drop_releases_subscription() {
        let hub = RealtimeHub::default();
        let sub = hub.subscribe(ChangeFilter::VisibleTo { user_id: Uuid::new_v4(), is_mechanic: false });
        assert_eq!(hub.subscriber_count(), 1);
        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(booking_event(Uuid::new_v4(), vec![])), 0);
    }

    #[tokio::test]
    async fn test_stream_yields_matching_events() {
        let hub = RealtimeHub::default();
        let row = Uuid::new_v4();
        let customer = Uuid::new_v4();
        let stream = hub
            .subscribe(ChangeFilter::Row { table: ChangeTable::Bookings, row_id: row, viewer: viewer(customer, false) })
            .into_stream();
        tokio::pin!(stream);

        hub.publish(booking_event(Uuid::new_v4(), vec![customer]));
        hub.publish(booking_event(row, vec![customer]));

        assert_eq!(stream.next().await.unwrap().row_id, row);
    }
}

//! services/api/src/web/events.rs
//!
//! In-process fan-out of order events to WebSocket watchers.

use chrono::{DateTime, NaiveDate, Utc};
use pickup_core::domain::OrderStatus;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    OrderPlaced {
        order_id: Uuid,
        code: String,
        pickup_date: NaiveDate,
        pickup_time_label: String,
    },
    StatusChanged {
        order_id: Uuid,
        code: String,
        status: OrderStatus,
        pickup_time_label: String,
        updated_at: DateTime<Utc>,
    },
}

impl OrderEvent {
    pub fn code(&self) -> &str {
        match self {
            OrderEvent::OrderPlaced { code, .. } | OrderEvent::StatusChanged { code, .. } => code,
        }
    }
}

#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<OrderEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    /// Sends to every current watcher. Having no watchers is not an error.
    pub fn publish(&self, event: OrderEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_published_events() {
        let hub = EventHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.publish(OrderEvent::OrderPlaced {
            order_id: Uuid::new_v4(),
            code: "ABC234".to_string(),
            pickup_date: NaiveDate::from_ymd_opt(2024, 5, 17).unwrap(),
            pickup_time_label: "10:30 - 10:45".to_string(),
        });

        assert_eq!(first.recv().await.unwrap().code(), "ABC234");
        assert_eq!(second.recv().await.unwrap().code(), "ABC234");
    }

    #[test]
    fn publishing_without_watchers_is_fine() {
        EventHub::new().publish(OrderEvent::StatusChanged {
            order_id: Uuid::new_v4(),
            code: "ABC234".to_string(),
            status: OrderStatus::Ready,
            pickup_time_label: "10:30 - 10:45".to_string(),
            updated_at: Utc::now(),
        });
    }
}

//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol for live order watches.

use crate::web::events::OrderEvent;
use chrono::{DateTime, NaiveDate, Utc};
use pickup_core::domain::{OrderStatus, PublicOrderProjection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client TO the Server
//=========================================================================================

/// Watches are push-only; the client may only check that the socket is alive.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client
//=========================================================================================

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The tracking record as it is when the watch starts, or after a lag.
    Snapshot {
        code: String,
        status: OrderStatus,
        pickup_time_label: String,
        pickup_date: NaiveDate,
    },

    /// A new order was admitted. Only sent to staff watchers.
    OrderPlaced {
        order_id: Uuid,
        code: String,
        pickup_date: NaiveDate,
        pickup_time_label: String,
    },

    /// `order_id` is only filled in for staff watchers.
    StatusChanged {
        #[serde(skip_serializing_if = "Option::is_none")]
        order_id: Option<Uuid>,
        code: String,
        status: OrderStatus,
        pickup_time_label: String,
        updated_at: DateTime<Utc>,
    },

    /// The watcher fell behind and `missed` events were dropped.
    Lagged { missed: u64 },

    Pong,

    /// Reports a fatal error; the server closes the socket afterwards.
    Error { message: String },
}

impl From<PublicOrderProjection> for ServerMessage {
    fn from(p: PublicOrderProjection) -> Self {
        ServerMessage::Snapshot {
            code: p.code,
            status: p.status,
            pickup_time_label: p.pickup_time_label,
            pickup_date: p.pickup_date,
        }
    }
}

impl ServerMessage {
    /// What a customer watching `code` receives for `event`, if anything. Only
    /// status changes of that one order pass, without internal ids.
    pub fn for_tracker(event: &OrderEvent, code: &str) -> Option<Self> {
        if event.code() != code {
            return None;
        }
        match event {
            OrderEvent::StatusChanged {
                status,
                pickup_time_label,
                updated_at,
                ..
            } => Some(ServerMessage::StatusChanged {
                order_id: None,
                code: code.to_string(),
                status: *status,
                pickup_time_label: pickup_time_label.clone(),
                updated_at: *updated_at,
            }),
            _ => None,
        }
    }

    /// Staff see every event in full.
    pub fn for_staff(event: OrderEvent) -> Self {
        match event {
            OrderEvent::OrderPlaced {
                order_id,
                code,
                pickup_date,
                pickup_time_label,
            } => ServerMessage::OrderPlaced {
                order_id,
                code,
                pickup_date,
                pickup_time_label,
            },
            OrderEvent::StatusChanged {
                order_id,
                code,
                status,
                pickup_time_label,
                updated_at,
            } => ServerMessage::StatusChanged {
                order_id: Some(order_id),
                code,
                status,
                pickup_time_label,
                updated_at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn status_changed(code: &str) -> OrderEvent {
        OrderEvent::StatusChanged {
            order_id: Uuid::new_v4(),
            code: code.to_string(),
            status: OrderStatus::Ready,
            pickup_time_label: "10:15 - 10:30".to_string(),
            updated_at: Utc::now(),
        }
    }

    fn placed(code: &str) -> OrderEvent {
        OrderEvent::OrderPlaced {
            order_id: Uuid::new_v4(),
            code: code.to_string(),
            pickup_date: NaiveDate::from_ymd_opt(2024, 5, 17).unwrap(),
            pickup_time_label: "10:15 - 10:30".to_string(),
        }
    }

    #[test]
    fn tracker_only_gets_its_own_status_changes() {
        assert!(ServerMessage::for_tracker(&status_changed("BBB234"), "AAA234").is_none());
        assert!(ServerMessage::for_tracker(&placed("AAA234"), "AAA234").is_none());

        let msg = ServerMessage::for_tracker(&status_changed("AAA234"), "AAA234").unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["code"], "AAA234");
        assert_eq!(json["status"], "Ready");
        assert!(json.get("order_id").is_none());
    }

    #[test]
    fn staff_messages_keep_the_order_id() {
        let event = status_changed("AAA234");
        let OrderEvent::StatusChanged { order_id, .. } = &event else {
            unreachable!()
        };
        let order_id = order_id.to_string();

        let json = serde_json::to_value(ServerMessage::for_staff(event)).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["order_id"], Value::String(order_id));

        let json = serde_json::to_value(ServerMessage::for_staff(placed("CCC234"))).unwrap();
        assert_eq!(json["type"], "order_placed");
        assert_eq!(json["code"], "CCC234");
    }
}

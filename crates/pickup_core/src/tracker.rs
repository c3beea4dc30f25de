//! crates/pickup_core/src/tracker.rs
//!
//! Staff-driven order status changes, fanned out to the customer-facing record.
//!
//! The internal order and its public projection are two separate writes. The
//! internal write decides success; a failed projection write is logged for the
//! operator and reported back, and a missing projection is rebuilt from the order.

use crate::code::normalize_code;
use crate::domain::{Caller, Order, OrderStatus, PublicOrderProjection};
use crate::ports::{Clock, OrderFilter, OrderStore, PortError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("staff access required")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Port(PortError),
}

impl TrackerError {
    pub fn code(&self) -> &'static str {
        match self {
            TrackerError::Forbidden => "permission-denied",
            TrackerError::NotFound(_) => "not-found",
            TrackerError::Port(_) => "internal",
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            TrackerError::Forbidden => "staff_only",
            TrackerError::NotFound(_) => "unknown_order",
            TrackerError::Port(_) => "store_failure",
        }
    }
}

impl From<PortError> for TrackerError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(what) => TrackerError::NotFound(what),
            PortError::Unauthorized => TrackerError::Forbidden,
            other => TrackerError::Port(other),
        }
    }
}

/// Outcome of a status change. `projection_synced` is false when customers may
/// still see the previous status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub order_id: Uuid,
    pub code: String,
    pub status: OrderStatus,
    pub pickup_time_label: String,
    pub updated_at: DateTime<Utc>,
    pub projection_synced: bool,
}

#[derive(Clone)]
pub struct StatusTracker {
    store: Arc<dyn OrderStore>,
    clock: Arc<dyn Clock>,
}

impl StatusTracker {
    pub fn new(store: Arc<dyn OrderStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Sets `status` on the order identified by `order_id` and `code`.
    ///
    /// Every transition is allowed. An id/code pair that does not match one order
    /// is treated as unknown.
    pub async fn set_status(
        &self,
        caller: &Caller,
        order_id: Uuid,
        code: &str,
        status: OrderStatus,
    ) -> Result<StatusChange, TrackerError> {
        if !caller.is_staff() {
            return Err(TrackerError::Forbidden);
        }

        let mut order = self.store.get_order(order_id).await?;
        if order.code != normalize_code(code) {
            return Err(TrackerError::NotFound(format!(
                "order {} with code {}",
                order_id, code
            )));
        }

        self.store.set_order_status(order_id, status).await?;
        order.status = status;
        let updated_at = self.clock.utc_now();
        info!(order_id = %order.id, code = %order.code, %status, "Order status changed");

        let projection_synced = self.sync_projection(&order, updated_at).await;

        Ok(StatusChange {
            order_id: order.id,
            code: order.code,
            status,
            pickup_time_label: order.pickup_time_label,
            updated_at,
            projection_synced,
        })
    }

    async fn sync_projection(&self, order: &Order, updated_at: DateTime<Utc>) -> bool {
        let result = match self
            .store
            .set_public_status(&order.code, order.status, updated_at)
            .await
        {
            Err(PortError::NotFound(_)) => {
                warn!(code = %order.code, "Public projection missing, rebuilding it");
                match self.store.publish_projections(order, updated_at).await {
                    // A late admission write may have won the insert.
                    Ok(()) => {
                        self.store
                            .set_public_status(&order.code, order.status, updated_at)
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
            other => other,
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(
                    order_id = %order.id,
                    code = %order.code,
                    status = %order.status,
                    error = %e,
                    "Public projection write failed; customers see a stale status"
                );
                false
            }
        }
    }

    /// The customer-facing record for a tracking code. Open to anyone.
    pub async fn public_status(&self, code: &str) -> Result<PublicOrderProjection, TrackerError> {
        Ok(self.store.get_public_order(&normalize_code(code)).await?)
    }

    /// Orders for the staff board, sorted by pickup time.
    pub async fn list_orders(
        &self,
        caller: &Caller,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, TrackerError> {
        if !caller.is_staff() {
            return Err(TrackerError::Forbidden);
        }
        let mut orders = self.store.list_orders(filter).await?;
        orders.sort_by(|a, b| {
            (a.pickup_date, a.pickup_start_minute, a.created_at)
                .cmp(&(b.pickup_date, b.pickup_start_minute, b.created_at))
        });
        Ok(orders)
    }

    pub async fn get_order(&self, caller: &Caller, order_id: Uuid) -> Result<Order, TrackerError> {
        if !caller.is_staff() {
            return Err(TrackerError::Forbidden);
        }
        Ok(self.store.get_order(order_id).await?)
    }
}

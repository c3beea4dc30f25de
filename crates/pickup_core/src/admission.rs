//! crates/pickup_core/src/admission.rs
//!
//! Order admission: validates a cart and a chosen slot, reserves slot capacity,
//! assigns a tracking code, and records the order with its public projections.
//!
//! Prices are resolved here from the catalog; a client-supplied total is only
//! compared against the resolved one and never stored.

use crate::code::generate_code;
use crate::domain::{Order, OrderItem, OrderStatus, Selection};
use crate::ledger::SlotFull;
use crate::ports::{Catalog, Clock, OrderStore, PortError};
use crate::pricing::{resolve_line, LineIssue, PricingError};
use crate::slots::{SlotSettings, MINUTES_PER_DAY};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Fresh codes tried before a run of collisions is treated as a store fault.
const CODE_ATTEMPTS: u32 = 5;
/// Backoff stops doubling after this many retries.
const MAX_BACKOFF_DOUBLINGS: u32 = 6;

pub const PROJECTION_WARNING: &str = "order tracking is temporarily behind; the order itself is confirmed";

//=========================================================================================
// Requests, Results and Errors
//=========================================================================================

/// The slot as the client sent it. Both fields are checked before anything else.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotChoice {
    pub label: Option<String>,
    pub start_minute: Option<i64>,
}

/// A cart line as submitted: which product, and which customizations.
#[derive(Debug, Clone, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    #[serde(default)]
    pub selections: BTreeMap<String, Selection>,
    #[serde(default)]
    pub salads: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub slot: SlotChoice,
    pub cart: Vec<CartLine>,
    pub client_total: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    pub order_id: Uuid,
    pub code: String,
    pub pickup_date: NaiveDate,
    pub pickup_time_label: String,
    pub total: Decimal,
    pub warnings: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("pickup slot is missing a label or start minute")]
    MalformedSlot,
    #[error("cart is empty")]
    EmptyCart,
    #[error("pickup slot {label} is no longer open for orders")]
    SlotClosed { label: String },
    #[error("pickup slot starting at minute {start_minute} is not offered")]
    SlotNotOffered { start_minute: u32 },
    #[error("product {0} does not exist")]
    UnknownProduct(Uuid),
    #[error("'{0}' is not available")]
    ProductInactive(String),
    #[error("invalid choices for '{product}': {source}")]
    InvalidLine {
        product: String,
        #[source]
        source: PricingError,
    },
    #[error("'{product}' needs more choices before it can be ordered")]
    IncompleteLine {
        product: String,
        issues: Vec<LineIssue>,
    },
    #[error(transparent)]
    SlotFull(#[from] SlotFull),
    #[error("too many concurrent orders, gave up after {attempts} attempts")]
    Contention { attempts: u32 },
    #[error(transparent)]
    Port(PortError),
}

impl AdmissionError {
    /// Stable, machine-checkable category.
    pub fn code(&self) -> &'static str {
        match self {
            AdmissionError::MalformedSlot
            | AdmissionError::EmptyCart
            | AdmissionError::SlotClosed { .. }
            | AdmissionError::SlotNotOffered { .. }
            | AdmissionError::UnknownProduct(_)
            | AdmissionError::ProductInactive(_)
            | AdmissionError::InvalidLine { .. }
            | AdmissionError::IncompleteLine { .. } => "invalid-argument",
            AdmissionError::SlotFull(_) => "resource-exhausted",
            AdmissionError::Contention { .. } => "aborted",
            AdmissionError::Port(_) => "internal",
        }
    }

    /// Stable, machine-checkable reason within the category.
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionError::MalformedSlot => "malformed_slot",
            AdmissionError::EmptyCart => "empty_cart",
            AdmissionError::SlotClosed { .. } => "slot_closed",
            AdmissionError::SlotNotOffered { .. } => "slot_not_offered",
            AdmissionError::UnknownProduct(_) => "unknown_product",
            AdmissionError::ProductInactive(_) => "product_inactive",
            AdmissionError::InvalidLine { .. } => "invalid_line",
            AdmissionError::IncompleteLine { .. } => "incomplete_line",
            AdmissionError::SlotFull(_) => "slot_full",
            AdmissionError::Contention { .. } => "contention",
            AdmissionError::Port(_) => "store_failure",
        }
    }
}

//=========================================================================================
// Service
//=========================================================================================

#[derive(Debug, Clone)]
pub struct AdmissionSettings {
    pub slots: SlotSettings,
    /// Attempts made when the store reports contention, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each later one.
    pub backoff: Duration,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            slots: SlotSettings::default(),
            max_attempts: 3,
            backoff: Duration::from_millis(25),
        }
    }
}

#[derive(Clone)]
pub struct AdmissionService {
    store: Arc<dyn OrderStore>,
    catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
    settings: AdmissionSettings,
}

impl AdmissionService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        catalog: Arc<dyn Catalog>,
        clock: Arc<dyn Clock>,
        settings: AdmissionSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &AdmissionSettings {
        &self.settings
    }

    pub async fn place_order(&self, request: PlaceOrder) -> Result<PlacedOrder, AdmissionError> {
        // 1. Slot shape.
        let start_minute = match (&request.slot.label, request.slot.start_minute) {
            (Some(label), Some(start))
                if !label.trim().is_empty() && (0..MINUTES_PER_DAY as i64).contains(&start) =>
            {
                start as u32
            }
            _ => return Err(AdmissionError::MalformedSlot),
        };

        // 2. Cart.
        if request.cart.is_empty() {
            return Err(AdmissionError::EmptyCart);
        }

        // 3. Time has moved on since the client listed slots.
        let now = self.clock.local_now();
        let slots = &self.settings.slots;
        if slots.is_closed(start_minute, now) {
            let label = request.slot.label.unwrap_or_default();
            warn!(start_minute, %label, "Rejected order for closed slot");
            return Err(AdmissionError::SlotClosed { label });
        }
        let slot = slots
            .find_offered(now, start_minute)
            .ok_or(AdmissionError::SlotNotOffered { start_minute })?;

        let (items, total) = self.resolve_cart(&request.cart).await?;
        if let Some(client_total) = request.client_total {
            if client_total.round_dp(2) != total {
                warn!(%client_total, %total, "Client total differs from resolved total; using resolved total");
            }
        }

        // 4. Reserve capacity and record the order.
        let pickup_date = now.date();
        let mut contention_attempts = 0;
        let mut code_attempts = 0;
        let order = loop {
            let order = Order {
                id: Uuid::new_v4(),
                code: generate_code(),
                pickup_date,
                pickup_start_minute: slot.start_minute,
                pickup_time_label: slot.label.clone(),
                items: items.clone(),
                total,
                status: OrderStatus::New,
                created_at: self.clock.utc_now(),
            };

            match self.store.admit_order(&order, slot.limit).await {
                Ok(reserved) => {
                    info!(
                        order_id = %order.id,
                        code = %order.code,
                        slot = %reserved.key,
                        used = reserved.count,
                        limit = slot.limit,
                        "Order admitted"
                    );
                    break order;
                }
                Err(PortError::SlotFull(full)) => {
                    info!(slot = %full.key, limit = full.limit, "Rejected order for full slot");
                    return Err(AdmissionError::SlotFull(full));
                }
                Err(PortError::Conflict(reason)) => {
                    code_attempts += 1;
                    warn!(code = %order.code, %reason, "Tracking code collision, generating a new one");
                    if code_attempts >= CODE_ATTEMPTS {
                        return Err(AdmissionError::Port(PortError::Conflict(reason)));
                    }
                }
                Err(PortError::Contention(reason)) => {
                    contention_attempts += 1;
                    if contention_attempts >= self.settings.max_attempts {
                        warn!(attempts = contention_attempts, %reason, "Giving up on contended admission");
                        return Err(AdmissionError::Contention {
                            attempts: contention_attempts,
                        });
                    }
                    let delay = backoff_delay(self.settings.backoff, contention_attempts);
                    warn!(attempt = contention_attempts, ?delay, %reason, "Admission contended, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(AdmissionError::Port(e)),
            }
        };

        // 5. Public projections are secondary; the order stands either way.
        let mut warnings = Vec::new();
        if let Err(e) = self.store.publish_projections(&order, order.created_at).await {
            error!(
                order_id = %order.id,
                code = %order.code,
                error = %e,
                "Public projection write failed after order commit; tracking record is stale"
            );
            warnings.push(PROJECTION_WARNING.to_string());
        }

        Ok(PlacedOrder {
            order_id: order.id,
            code: order.code,
            pickup_date: order.pickup_date,
            pickup_time_label: order.pickup_time_label,
            total: order.total,
            warnings,
        })
    }

    async fn resolve_cart(
        &self,
        cart: &[CartLine],
    ) -> Result<(Vec<OrderItem>, Decimal), AdmissionError> {
        let mut items = Vec::with_capacity(cart.len());
        let mut total = Decimal::ZERO;

        for line in cart {
            let product = self
                .catalog
                .get_product(line.product_id)
                .await
                .map_err(|e| match e {
                    PortError::NotFound(_) => AdmissionError::UnknownProduct(line.product_id),
                    other => AdmissionError::Port(other),
                })?;
            if !product.active {
                return Err(AdmissionError::ProductInactive(product.name));
            }

            let resolved = resolve_line(&product, &line.salads, &line.selections).map_err(
                |source| AdmissionError::InvalidLine {
                    product: product.name.clone(),
                    source,
                },
            )?;
            if !resolved.is_valid {
                return Err(AdmissionError::IncompleteLine {
                    product: product.name.clone(),
                    issues: resolved.issues,
                });
            }

            total += resolved.final_price;
            items.push(resolved.into_order_item(&product));
        }

        Ok((items, total.round_dp(2)))
    }
}

/// Delay before retry number `attempt` (1-based): doubles each time, capped.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let doublings = attempt.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
    base.saturating_mul(1 << doublings)
}

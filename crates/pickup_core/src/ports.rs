//! crates/pickup_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core depends on.
//! These traits form the boundary of the hexagonal architecture, so the core
//! never knows which database or clock sits behind them.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{
    Order, OrderStatus, Product, ProductConfig, PublicOrderProjection, Role, StaffCredentials,
    StaffMember,
};
use crate::ledger::{Reserved, SlotCounter, SlotFull};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint was hit (e.g. a tracking code already in use).
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The store gave up on a transaction because of concurrent writers. Safe to retry.
    #[error("Contention: {0}")]
    Contention(String),
    #[error(transparent)]
    SlotFull(#[from] SlotFull),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Query and Patch Types
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub pickup_date: Option<NaiveDate>,
    pub open_only: bool,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.pickup_date.map_or(true, |d| order.pickup_date == d)
            && (!self.open_only || order.status.is_open())
    }
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: Decimal,
    pub category: Option<String>,
    pub config: Option<ProductConfig>,
}

/// Partial product update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub active: Option<bool>,
    pub category: Option<Option<String>>,
    pub config: Option<Option<ProductConfig>>,
}

impl ProductPatch {
    pub fn apply(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(active) = self.active {
            product.active = active;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(config) = self.config {
            product.config = config;
        }
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait OrderStore: Send + Sync {
    // --- Admission ---

    /// Reserves one unit on the order's slot counter and inserts the order, as one
    /// atomic unit. The counter decision must go through [`SlotCounter::reserve`]
    /// while the counter is held exclusively. Fails with `SlotFull` (nothing
    /// written), `Conflict` if the tracking code is taken, or `Contention`.
    async fn admit_order(&self, order: &Order, slot_limit: u32) -> PortResult<Reserved>;

    /// Writes the public order projection and the capacity projection for `order`.
    /// Called after `admit_order` committed; failures must not undo the order.
    /// Both writes are insert-if-absent: an existing public record keeps its
    /// status, which only `set_public_status` changes.
    async fn publish_projections(&self, order: &Order, updated_at: DateTime<Utc>) -> PortResult<()>;

    // --- Orders ---
    async fn get_order(&self, order_id: Uuid) -> PortResult<Order>;

    async fn list_orders(&self, filter: &OrderFilter) -> PortResult<Vec<Order>>;

    /// Orders whose pickup date lies in `[from, to]`, for reporting.
    async fn orders_between(&self, from: NaiveDate, to: NaiveDate) -> PortResult<Vec<Order>>;

    async fn set_order_status(&self, order_id: Uuid, status: OrderStatus) -> PortResult<()>;

    // --- Public projections ---
    async fn set_public_status(
        &self,
        code: &str,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn get_public_order(&self, code: &str) -> PortResult<PublicOrderProjection>;

    /// Number of capacity projection entries per slot start minute on `pickup_date`.
    async fn capacity_usage(&self, pickup_date: NaiveDate) -> PortResult<HashMap<u32, u32>>;

    async fn slot_counter(
        &self,
        pickup_date: NaiveDate,
        start_minute: u32,
    ) -> PortResult<Option<SlotCounter>>;

    // --- Diagnostics ---
    async fn health_check(&self) -> PortResult<()>;

    fn backend_name(&self) -> &'static str;
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_product(&self, product_id: Uuid) -> PortResult<Product>;

    async fn list_products(&self, active_only: bool) -> PortResult<Vec<Product>>;

    async fn create_product(&self, product: NewProduct) -> PortResult<Product>;

    async fn update_product(&self, product_id: Uuid, patch: ProductPatch) -> PortResult<Product>;

    async fn delete_product(&self, product_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait StaffDirectory: Send + Sync {
    async fn create_staff(
        &self,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<StaffMember>;

    async fn get_staff_by_email(&self, email: &str) -> PortResult<StaffCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        staff_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Returns the role of the staff member owning an unexpired session.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Role>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

/// Source of "now". Slot minutes and pickup dates use local wall-clock time.
pub trait Clock: Send + Sync {
    fn local_now(&self) -> NaiveDateTime;

    fn utc_now(&self) -> DateTime<Utc>;
}

//! crates/pickup_core/src/domain.rs
//!
//! Defines the pure, core data structures for the pickup counter.
//! These structs are independent of any database; adapters map them to rows.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Orders
//=========================================================================================

/// Status of an order as seen by staff and customers.
///
/// Staff may move an order to any status from any other; `New` is only special
/// in that it is the status every order is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    New,
    InProgress,
    Ready,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 3] = [OrderStatus::New, OrderStatus::InProgress, OrderStatus::Ready];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "New",
            OrderStatus::InProgress => "InProgress",
            OrderStatus::Ready => "Ready",
        }
    }

    /// Open orders are the ones still shown on the staff "to do" list.
    pub fn is_open(&self) -> bool {
        !matches!(self, OrderStatus::Ready)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(OrderStatus::New),
            "InProgress" => Ok(OrderStatus::InProgress),
            "Ready" => Ok(OrderStatus::Ready),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

/// A value chosen for one configurable option: a single item or a list of items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    One(String),
    Many(Vec<String>),
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        match self {
            Selection::One(value) => value.trim().is_empty(),
            Selection::Many(values) => values.is_empty(),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            Selection::One(value) => vec![value.as_str()],
            Selection::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

/// The customizations a customer made to one cart line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customization {
    #[serde(default)]
    pub selections: BTreeMap<String, Selection>,
    #[serde(default)]
    pub salads: Vec<String>,
}

/// One line of an admitted order, with its fully resolved price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Option<Uuid>,
    pub name: String,
    pub display_name: Option<String>,
    pub price: Decimal,
    pub custom: Option<Customization>,
}

/// The internal, staff-facing order record.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub code: String,
    pub pickup_date: NaiveDate,
    pub pickup_start_minute: u32,
    pub pickup_time_label: String,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn public_projection(&self, updated_at: DateTime<Utc>) -> PublicOrderProjection {
        PublicOrderProjection {
            code: self.code.clone(),
            status: self.status,
            pickup_time_label: self.pickup_time_label.clone(),
            pickup_date: self.pickup_date,
            updated_at,
        }
    }

    pub fn capacity_projection(&self) -> PublicCapacityProjection {
        PublicCapacityProjection {
            order_id: self.id,
            pickup_time_label: self.pickup_time_label.clone(),
            pickup_start_minute: self.pickup_start_minute,
            pickup_date: self.pickup_date,
            created_at: self.created_at,
        }
    }
}

/// Customer-visible order record keyed by tracking code. Never carries items or prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicOrderProjection {
    pub code: String,
    pub status: OrderStatus,
    pub pickup_time_label: String,
    pub pickup_date: NaiveDate,
    pub updated_at: DateTime<Utc>,
}

/// One entry per admitted order, used to count slot usage without reading orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicCapacityProjection {
    pub order_id: Uuid,
    pub pickup_time_label: String,
    pub pickup_start_minute: u32,
    pub pickup_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Slots
//=========================================================================================

/// A pickup window offered for "now". Derived on every request and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickupSlot {
    pub label: String,
    pub start_minute: u32,
    pub limit: u32,
}

//=========================================================================================
// Catalog
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Single,
    Multi,
}

/// A generic add-on choice attached to a product (e.g. "Bread", "Sauces").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDef {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: OptionKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub items: Vec<String>,
}

/// Salad bar configuration: `included` salads are free, each extra costs `extra_price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaladConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub included: u32,
    #[serde(default)]
    pub extra_price: Decimal,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductConfig {
    #[serde(default)]
    pub salads: Option<SaladConfig>,
    #[serde(default)]
    pub options: Vec<OptionDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub active: bool,
    pub category: Option<String>,
    pub config: Option<ProductConfig>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn salads(&self) -> Option<&SaladConfig> {
        self.config
            .as_ref()
            .and_then(|c| c.salads.as_ref())
            .filter(|s| s.enabled)
    }

    pub fn options(&self) -> &[OptionDef] {
        self.config.as_ref().map(|c| c.options.as_slice()).unwrap_or(&[])
    }

    /// A product needs a customization step only if it has enabled salads or any option.
    pub fn is_configurable(&self) -> bool {
        self.salads().is_some() || !self.options().is_empty()
    }
}

//=========================================================================================
// Callers and Staff
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Who is calling a core operation, as established by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Caller {
    #[default]
    Anonymous,
    Staff,
    Admin,
}

impl Caller {
    pub fn is_staff(&self) -> bool {
        matches!(self, Caller::Staff | Caller::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Caller::Admin)
    }
}

impl From<Role> for Caller {
    fn from(role: Role) -> Self {
        match role {
            Role::Staff => Caller::Staff,
            Role::Admin => Caller::Admin,
        }
    }
}

// Represents a staff member - used throughout app
#[derive(Debug, Clone)]
pub struct StaffMember {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct StaffCredentials {
    pub id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub role: Role,
}

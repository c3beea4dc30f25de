pub mod admission;
pub mod catalog;
pub mod code;
pub mod domain;
pub mod ledger;
pub mod ports;
pub mod pricing;
pub mod reports;
pub mod slots;
pub mod tracker;

pub use admission::{AdmissionError, AdmissionService, AdmissionSettings, PlaceOrder, PlacedOrder};
pub use domain::{
    Caller, Customization, Order, OrderItem, OrderStatus, PickupSlot, Product, ProductConfig,
    PublicCapacityProjection, PublicOrderProjection, Role, Selection, StaffCredentials, StaffMember,
};
pub use ledger::{Reserved, SlotCounter, SlotFull, SlotKey};
pub use ports::{Catalog, Clock, OrderStore, PortError, PortResult, StaffDirectory};
pub use tracker::{StatusChange, StatusTracker, TrackerError};

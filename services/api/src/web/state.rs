//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::web::events::EventHub;
use pickup_core::admission::AdmissionService;
use pickup_core::catalog::CatalogAdmin;
use pickup_core::ports::{Catalog, Clock, OrderStore, StaffDirectory};
use pickup_core::reports::ReportService;
use pickup_core::tracker::StatusTracker;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orders: Arc<dyn OrderStore>,
    pub staff: Arc<dyn StaffDirectory>,
    pub clock: Arc<dyn Clock>,
    pub admission: AdmissionService,
    pub tracker: StatusTracker,
    pub catalog: CatalogAdmin,
    pub reports: ReportService,
    pub events: EventHub,
}

impl AppState {
    /// Wires the core services onto the given adapters.
    pub fn new(
        config: Arc<Config>,
        orders: Arc<dyn OrderStore>,
        catalog: Arc<dyn Catalog>,
        staff: Arc<dyn StaffDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            admission: AdmissionService::new(
                orders.clone(),
                catalog.clone(),
                clock.clone(),
                config.admission_settings(),
            ),
            tracker: StatusTracker::new(orders.clone(), clock.clone()),
            catalog: CatalogAdmin::new(catalog),
            reports: ReportService::new(orders.clone()),
            events: EventHub::new(),
            config,
            orders,
            staff,
            clock,
        }
    }
}

pub mod admin;
pub mod api_error;
pub mod auth;
pub mod events;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_auth;
pub use state::AppState;

/// Builds every API route on top of `app_state`. CORS and Swagger UI are layered
/// on by the binary.
///
/// `/orders` is split by method: customers POST without a session, staff GET
/// through `require_auth`.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(rest::health_handler))
        .route("/slots", get(rest::list_slots_handler))
        .route("/products", get(rest::menu_handler))
        .route("/orders", post(rest::place_order_handler))
        .route("/track/{code}", get(rest::track_order_handler))
        .route("/track/{code}/ws", get(ws_handler::track_ws_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/orders", get(rest::list_orders_handler))
        .route("/orders/ws", get(ws_handler::staff_orders_ws_handler))
        .route("/orders/{id}", get(rest::get_order_handler))
        .route("/orders/{id}/status", patch(rest::update_status_handler))
        .route(
            "/admin/products",
            get(admin::list_products_handler).post(admin::create_product_handler),
        )
        .route(
            "/admin/products/{id}",
            patch(admin::update_product_handler).delete(admin::delete_product_handler),
        )
        .route("/admin/reports/sales", get(admin::sales_report_handler))
        .route("/staff", post(auth::create_staff_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}

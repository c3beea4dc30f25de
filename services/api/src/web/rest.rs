//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the customer and staff REST endpoints and the
//! master definition for the OpenAPI specification.

use crate::web::admin;
use crate::web::api_error::{ErrorBody, HttpError};
use crate::web::auth;
use crate::web::events::OrderEvent;
use crate::web::state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, NaiveDate, Utc};
use pickup_core::admission::{CartLine, PlaceOrder, SlotChoice};
use pickup_core::domain::{Caller, Order, OrderItem, OrderStatus, Product, ProductConfig, Selection};
use pickup_core::ports::OrderFilter;
use pickup_core::slots::{minute_of_day, SlotAvailability};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        list_slots_handler,
        menu_handler,
        place_order_handler,
        track_order_handler,
        list_orders_handler,
        get_order_handler,
        update_status_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::create_staff_handler,
        admin::list_products_handler,
        admin::create_product_handler,
        admin::update_product_handler,
        admin::delete_product_handler,
        admin::sales_report_handler,
    ),
    components(
        schemas(
            ErrorBody,
            HealthResponse,
            SlotResponse,
            SlotsResponse,
            ProductResponse,
            SlotRequest,
            CartLineRequest,
            PlaceOrderRequest,
            PlaceOrderResponse,
            TrackingResponse,
            OrderResponse,
            UpdateStatusRequest,
            StatusChangeResponse,
            auth::LoginRequest,
            auth::CreateStaffRequest,
            auth::StaffResponse,
            admin::CreateProductRequest,
            admin::UpdateProductRequest,
            admin::SalesReportResponse,
        )
    ),
    tags(
        (name = "Pickup Orders API", description = "Pickup slots, order admission and order tracking.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
}

#[derive(Serialize, ToSchema)]
pub struct SlotResponse {
    pub label: String,
    pub start_minute: u32,
    pub limit: u32,
    pub used: u32,
    pub closed: bool,
    pub full: bool,
}

impl From<SlotAvailability> for SlotResponse {
    fn from(a: SlotAvailability) -> Self {
        Self {
            label: a.slot.label,
            start_minute: a.slot.start_minute,
            limit: a.slot.limit,
            used: a.used,
            closed: a.closed,
            full: a.full,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SlotsResponse {
    pub pickup_date: NaiveDate,
    /// Minutes since local midnight at the time of the request.
    pub now_minute: u32,
    pub slots: Vec<SlotResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    #[schema(value_type = f64)]
    pub price: Decimal,
    pub active: bool,
    pub category: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub config: Option<ProductConfig>,
    pub configurable: bool,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            configurable: p.is_configurable(),
            id: p.id,
            name: p.name,
            price: p.price,
            active: p.active,
            category: p.category,
            config: p.config,
        }
    }
}

#[derive(Deserialize, Default, ToSchema)]
pub struct SlotRequest {
    pub label: Option<String>,
    pub start_minute: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct CartLineRequest {
    pub product_id: Uuid,
    /// Option key to a single choice or a list of choices.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub selections: BTreeMap<String, Selection>,
    #[serde(default)]
    pub salads: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub slot: SlotRequest,
    #[serde(default)]
    pub cart: Vec<CartLineRequest>,
    /// The total the client displayed. Compared against, never trusted.
    #[schema(value_type = Option<f64>)]
    pub total: Option<Decimal>,
}

impl From<PlaceOrderRequest> for PlaceOrder {
    fn from(req: PlaceOrderRequest) -> Self {
        PlaceOrder {
            slot: SlotChoice {
                label: req.slot.label,
                start_minute: req.slot.start_minute,
            },
            cart: req
                .cart
                .into_iter()
                .map(|line| CartLine {
                    product_id: line.product_id,
                    selections: line.selections,
                    salads: line.salads,
                })
                .collect(),
            client_total: req.total,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PlaceOrderResponse {
    pub order_id: Uuid,
    pub code: String,
    pub pickup_date: NaiveDate,
    pub pickup_time_label: String,
    #[schema(value_type = f64)]
    pub total: Decimal,
    pub warnings: Vec<String>,
}

/// What a customer may see about an order.
#[derive(Serialize, ToSchema)]
pub struct TrackingResponse {
    pub code: String,
    #[schema(value_type = String)]
    pub status: OrderStatus,
    pub pickup_time_label: String,
    pub pickup_date: NaiveDate,
}

#[derive(Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub code: String,
    pub pickup_date: NaiveDate,
    pub pickup_start_minute: u32,
    pub pickup_time_label: String,
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<OrderItem>,
    #[schema(value_type = f64)]
    pub total: Decimal,
    #[schema(value_type = String)]
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        Self {
            id: o.id,
            code: o.code,
            pickup_date: o.pickup_date,
            pickup_start_minute: o.pickup_start_minute,
            pickup_time_label: o.pickup_time_label,
            items: o.items,
            total: o.total,
            status: o.status,
            created_at: o.created_at,
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListOrdersQuery {
    /// Hide orders that are already `Ready`.
    #[serde(default)]
    pub open_only: bool,
    /// Only orders for this pickup date (`YYYY-MM-DD`).
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub code: String,
    /// `New`, `InProgress` or `Ready`.
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct StatusChangeResponse {
    pub order_id: Uuid,
    pub code: String,
    #[schema(value_type = String)]
    pub status: OrderStatus,
    pub updated_at: DateTime<Utc>,
    pub warnings: Vec<String>,
}

const STALE_TRACKING_WARNING: &str =
    "status saved, but the customer tracking page may still show the previous status";

//=========================================================================================
// Public Handlers
//=========================================================================================

/// Liveness and storage check.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 500, description = "Storage is unreachable", body = ErrorBody)
    )
)]
pub async fn health_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, HttpError> {
    state.orders.health_check().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        backend: state.orders.backend_name().to_string(),
    }))
}

/// Pickup slots offered right now, with live usage.
#[utoipa::path(
    get,
    path = "/slots",
    responses(
        (status = 200, description = "Current pickup slots", body = SlotsResponse),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn list_slots_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SlotsResponse>, HttpError> {
    let now = state.clock.local_now();
    let pickup_date = now.date();
    let usage = state.orders.capacity_usage(pickup_date).await?;
    let slots = state
        .admission
        .settings()
        .slots
        .availability(now, &usage)
        .into_iter()
        .map(SlotResponse::from)
        .collect();

    Ok(Json(SlotsResponse {
        pickup_date,
        now_minute: minute_of_day(now),
        slots,
    }))
}

/// The customer menu: active products only.
#[utoipa::path(
    get,
    path = "/products",
    responses(
        (status = 200, description = "Active products", body = [ProductResponse])
    )
)]
pub async fn menu_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProductResponse>>, HttpError> {
    let products = state.catalog.menu().await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

/// Place an order for a pickup slot.
///
/// Prices are recomputed from the catalog. `warnings` is non-empty when the order
/// was accepted but its tracking record could not be written yet.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order accepted", body = PlaceOrderResponse),
        (status = 400, description = "Invalid cart or slot", body = ErrorBody),
        (status = 409, description = "Slot is full", body = ErrorBody),
        (status = 503, description = "Too much contention, retry", body = ErrorBody)
    )
)]
pub async fn place_order_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let Json(req) = body?;
    let placed = state.admission.place_order(req.into()).await?;

    state.events.publish(OrderEvent::OrderPlaced {
        order_id: placed.order_id,
        code: placed.code.clone(),
        pickup_date: placed.pickup_date,
        pickup_time_label: placed.pickup_time_label.clone(),
    });

    Ok((
        StatusCode::CREATED,
        Json(PlaceOrderResponse {
            order_id: placed.order_id,
            code: placed.code,
            pickup_date: placed.pickup_date,
            pickup_time_label: placed.pickup_time_label,
            total: placed.total,
            warnings: placed.warnings,
        }),
    ))
}

/// Look up an order by its tracking code.
#[utoipa::path(
    get,
    path = "/track/{code}",
    params(("code" = String, Path, description = "The six-character tracking code.")),
    responses(
        (status = 200, description = "Current status", body = TrackingResponse),
        (status = 404, description = "Unknown code", body = ErrorBody)
    )
)]
pub async fn track_order_handler(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<TrackingResponse>, HttpError> {
    let public = state.tracker.public_status(&code).await?;
    Ok(Json(TrackingResponse {
        code: public.code,
        status: public.status,
        pickup_time_label: public.pickup_time_label,
        pickup_date: public.pickup_date,
    }))
}

//=========================================================================================
// Staff Handlers
//=========================================================================================

/// Orders for the staff board, sorted by pickup time.
#[utoipa::path(
    get,
    path = "/orders",
    params(ListOrdersQuery),
    responses(
        (status = 200, description = "Orders", body = [OrderResponse]),
        (status = 401, description = "Not signed in", body = ErrorBody)
    )
)]
pub async fn list_orders_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<Vec<OrderResponse>>, HttpError> {
    let Query(query) = query?;
    let filter = OrderFilter {
        pickup_date: query.date,
        open_only: query.open_only,
    };
    let orders = state.tracker.list_orders(&caller, &filter).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id.")),
    responses(
        (status = 200, description = "The order", body = OrderResponse),
        (status = 404, description = "Unknown order", body = ErrorBody)
    )
)]
pub async fn get_order_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    order_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<OrderResponse>, HttpError> {
    let Path(order_id) = order_id?;
    let order = state.tracker.get_order(&caller, order_id).await?;
    Ok(Json(order.into()))
}

/// Move an order to any status.
#[utoipa::path(
    patch,
    path = "/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id.")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = StatusChangeResponse),
        (status = 400, description = "Unknown status", body = ErrorBody),
        (status = 404, description = "Unknown order or code mismatch", body = ErrorBody)
    )
)]
pub async fn update_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    order_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<StatusChangeResponse>, HttpError> {
    let Path(order_id) = order_id?;
    let Json(req) = body?;
    let status: OrderStatus = req
        .status
        .parse()
        .map_err(|e: String| HttpError::invalid("unknown_status", e))?;

    let change = state
        .tracker
        .set_status(&caller, order_id, &req.code, status)
        .await?;

    let mut warnings = Vec::new();
    if !change.projection_synced {
        warn!(order_id = %change.order_id, "Status change left the tracking record stale");
        warnings.push(STALE_TRACKING_WARNING.to_string());
    }

    state.events.publish(OrderEvent::StatusChanged {
        order_id: change.order_id,
        code: change.code.clone(),
        status: change.status,
        pickup_time_label: change.pickup_time_label.clone(),
        updated_at: change.updated_at,
    });

    Ok(Json(StatusChangeResponse {
        order_id: change.order_id,
        code: change.code,
        status: change.status,
        updated_at: change.updated_at,
        warnings,
    }))
}

//! services/api/src/web/admin.rs
//!
//! Product management and sales reports for staff and admins.

use crate::web::api_error::{ErrorBody, HttpError};
use crate::web::rest::ProductResponse;
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
use chrono::NaiveDate;
use pickup_core::domain::{Caller, ProductConfig};
use pickup_core::ports::{NewProduct, ProductPatch};
use pickup_core::reports::SalesReport;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    #[schema(value_type = f64)]
    pub price: Decimal,
    pub category: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub config: Option<ProductConfig>,
}

/// Distinguishes an absent field from an explicit `null`.
fn explicit<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Fields left out stay unchanged; `null` clears `category` or `config`.
#[derive(Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    #[schema(value_type = Option<f64>)]
    pub price: Option<Decimal>,
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "explicit")]
    #[schema(value_type = Option<String>)]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit")]
    #[schema(value_type = Option<Object>)]
    pub config: Option<Option<ProductConfig>>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SalesQuery {
    /// First pickup date, inclusive.
    pub from: NaiveDate,
    /// Last pickup date, inclusive.
    pub to: NaiveDate,
}

#[derive(Serialize, ToSchema)]
pub struct DaySalesResponse {
    pub date: NaiveDate,
    pub orders: u32,
    #[schema(value_type = f64)]
    pub revenue: Decimal,
}

#[derive(Serialize, ToSchema)]
pub struct SalesReportResponse {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_orders: u32,
    #[schema(value_type = f64)]
    pub total_revenue: Decimal,
    pub days: Vec<DaySalesResponse>,
    pub by_status: BTreeMap<String, u32>,
}

impl From<SalesReport> for SalesReportResponse {
    fn from(r: SalesReport) -> Self {
        Self {
            from: r.from,
            to: r.to,
            total_orders: r.total_orders,
            total_revenue: r.total_revenue,
            days: r
                .days
                .into_iter()
                .map(|d| DaySalesResponse {
                    date: d.date,
                    orders: d.orders,
                    revenue: d.revenue,
                })
                .collect(),
            by_status: r.by_status,
        }
    }
}

/// Every product, including inactive ones.
#[utoipa::path(
    get,
    path = "/admin/products",
    responses(
        (status = 200, description = "All products", body = [ProductResponse]),
        (status = 403, description = "Staff access required", body = ErrorBody)
    )
)]
pub async fn list_products_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<ProductResponse>>, HttpError> {
    let products = state.catalog.all_products(&caller).await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/admin/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductResponse),
        (status = 400, description = "Invalid name or price", body = ErrorBody),
        (status = 403, description = "Admin access required", body = ErrorBody)
    )
)]
pub async fn create_product_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let Json(req) = body?;
    let product = state
        .catalog
        .create(
            &caller,
            NewProduct {
                name: req.name,
                price: req.price,
                category: req.category,
                config: req.config,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ProductResponse::from(product))))
}

#[utoipa::path(
    patch,
    path = "/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product id.")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = ProductResponse),
        (status = 404, description = "Unknown product", body = ErrorBody)
    )
)]
pub async fn update_product_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    product_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> Result<Json<ProductResponse>, HttpError> {
    let Path(product_id) = product_id?;
    let Json(req) = body?;
    let patch = ProductPatch {
        name: req.name,
        price: req.price,
        active: req.active,
        category: req.category,
        config: req.config,
    };
    let product = state.catalog.update(&caller, product_id, patch).await?;
    Ok(Json(product.into()))
}

#[utoipa::path(
    delete,
    path = "/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product id.")),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 404, description = "Unknown product", body = ErrorBody)
    )
)]
pub async fn delete_product_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    product_id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, HttpError> {
    let Path(product_id) = product_id?;
    state.catalog.delete(&caller, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Order count and revenue by pickup date.
#[utoipa::path(
    get,
    path = "/admin/reports/sales",
    params(SalesQuery),
    responses(
        (status = 200, description = "Sales summary", body = SalesReportResponse),
        (status = 400, description = "Bad date range", body = ErrorBody),
        (status = 403, description = "Admin access required", body = ErrorBody)
    )
)]
pub async fn sales_report_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<SalesQuery>, QueryRejection>,
) -> Result<Json<SalesReportResponse>, HttpError> {
    let Query(query) = query?;
    let report = state.reports.sales(&caller, query.from, query.to).await?;
    Ok(Json(report.into()))
}

#![allow(dead_code)]

use api_lib::adapters::{InMemoryStore, ManualClock};
use api_lib::config::Config;
use api_lib::web::{self, auth::hash_password, AppState};
use axum::body::Body;
use axum::http::{header, Request};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use pickup_core::domain::{
    OptionDef, OptionKind, Product, ProductConfig, Role, SaladConfig,
};
use pickup_core::ports::StaffDirectory;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const STAFF_PASSWORD: &str = "counter-password";

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 17).expect("date")
}

pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
    today().and_hms_opt(hour, minute, 0).expect("time")
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn router(&self) -> axum::Router {
        web::router(self.state.clone())
    }
}

pub fn test_config(slot_limit: u32) -> Config {
    let mut config = Config::default();
    config.slots.slot_limit = slot_limit;
    config.admission_backoff = Duration::from_millis(1);
    config
}

pub fn test_app_with(config: Config, now: NaiveDateTime) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(now));
    let state = Arc::new(AppState::new(
        Arc::new(config),
        store.clone(),
        store.clone(),
        store.clone(),
        clock.clone(),
    ));
    TestApp {
        state,
        store,
        clock,
    }
}

pub fn test_app(slot_limit: u32) -> TestApp {
    test_app_with(test_config(slot_limit), at(10, 0))
}

pub fn coffee() -> Product {
    Product {
        id: Uuid::new_v4(),
        name: "Coffee".to_string(),
        price: Decimal::new(250, 2),
        active: true,
        category: Some("Drinks".to_string()),
        config: None,
        created_at: Utc::now(),
    }
}

/// 8.50 base; bread is required; two salads included, 1.20 per extra one.
pub fn plate() -> Product {
    Product {
        id: Uuid::new_v4(),
        name: "Schnitzel Plate".to_string(),
        price: Decimal::new(850, 2),
        active: true,
        category: Some("Mains".to_string()),
        config: Some(ProductConfig {
            salads: Some(SaladConfig {
                enabled: true,
                included: 2,
                extra_price: Decimal::new(120, 2),
                items: vec![
                    "Potato".to_string(),
                    "Cucumber".to_string(),
                    "Coleslaw".to_string(),
                ],
            }),
            options: vec![OptionDef {
                key: "bread".to_string(),
                label: "Bread".to_string(),
                kind: OptionKind::Single,
                required: true,
                items: vec!["White".to_string(), "Rye".to_string()],
            }],
        }),
        created_at: Utc::now(),
    }
}

pub fn seed(app: &TestApp, product: &Product) {
    app.store.seed_product(product.clone()).expect("seed product");
}

pub async fn add_staff(app: &TestApp, email: &str, role: Role) {
    let hashed = hash_password(STAFF_PASSWORD).expect("hash");
    app.store
        .create_staff(email, &hashed, role)
        .await
        .expect("staff");
}

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn authed(mut request: Request<Body>, cookie: &str) -> Request<Body> {
    request.headers_mut().insert(
        header::COOKIE,
        cookie.parse().expect("cookie header"),
    );
    request
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

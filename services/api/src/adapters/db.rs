//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `OrderStore`, `Catalog` and `StaffDirectory` ports from the core crate. It
//! handles all interactions with PostgreSQL using `sqlx`.
//!
//! Admission runs in one transaction: the slot counter row is locked with
//! `SELECT ... FOR UPDATE`, the core ledger decides, and the counter update and
//! the order insert commit together.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pickup_core::domain::{
    Order, OrderItem, OrderStatus, Product, ProductConfig, PublicOrderProjection, Role,
    StaffCredentials, StaffMember,
};
use pickup_core::ledger::{Reserved, SlotCounter, SlotKey};
use pickup_core::ports::{
    Catalog, NewProduct, OrderFilter, OrderStore, PortError, PortResult, ProductPatch,
    StaffDirectory,
};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the store ports on PostgreSQL.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps driver errors onto port errors. Serialization failures and deadlocks are
/// contention (retryable); unique violations are conflicts.
fn map_db_error(e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::RowNotFound => PortError::NotFound(e.to_string()),
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("40001") | Some("40P01") | Some("55P03") => PortError::Contention(e.to_string()),
            Some("23505") => PortError::Conflict(e.to_string()),
            _ => PortError::Unexpected(e.to_string()),
        },
        sqlx::Error::PoolTimedOut => PortError::Contention(e.to_string()),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn not_found(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        other => map_db_error(other),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SlotCounterRecord {
    pickup_date: NaiveDate,
    pickup_start_minute: i32,
    label: String,
    count: i32,
    updated_at: DateTime<Utc>,
}
impl SlotCounterRecord {
    fn to_domain(self) -> SlotCounter {
        SlotCounter {
            pickup_date: self.pickup_date,
            pickup_start_minute: self.pickup_start_minute as u32,
            label: self.label,
            count: self.count.max(0) as u32,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct OrderRecord {
    id: Uuid,
    code: String,
    pickup_date: NaiveDate,
    pickup_start_minute: i32,
    pickup_time_label: String,
    items: Json<Vec<OrderItem>>,
    total: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}
impl OrderRecord {
    fn to_domain(self) -> PortResult<Order> {
        Ok(Order {
            id: self.id,
            code: self.code,
            pickup_date: self.pickup_date,
            pickup_start_minute: self.pickup_start_minute as u32,
            pickup_time_label: self.pickup_time_label,
            items: self.items.0,
            total: self.total,
            status: self.status.parse().map_err(PortError::Unexpected)?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct PublicOrderRecord {
    code: String,
    status: String,
    pickup_time_label: String,
    pickup_date: NaiveDate,
    updated_at: DateTime<Utc>,
}
impl PublicOrderRecord {
    fn to_domain(self) -> PortResult<PublicOrderProjection> {
        Ok(PublicOrderProjection {
            code: self.code,
            status: self.status.parse().map_err(PortError::Unexpected)?,
            pickup_time_label: self.pickup_time_label,
            pickup_date: self.pickup_date,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ProductRecord {
    id: Uuid,
    name: String,
    price: Decimal,
    active: bool,
    category: Option<String>,
    config: Option<Json<ProductConfig>>,
    created_at: DateTime<Utc>,
}
impl ProductRecord {
    fn to_domain(self) -> Product {
        Product {
            id: self.id,
            name: self.name,
            price: self.price,
            active: self.active,
            category: self.category,
            config: self.config.map(|c| c.0),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct StaffRecord {
    id: Uuid,
    email: String,
    hashed_password: String,
    role: String,
}
impl StaffRecord {
    fn to_domain(self) -> PortResult<StaffCredentials> {
        Ok(StaffCredentials {
            id: self.id,
            email: self.email,
            hashed_password: self.hashed_password,
            role: self.role.parse().map_err(PortError::Unexpected)?,
        })
    }
}

const ORDER_COLUMNS: &str = "id, code, pickup_date, pickup_start_minute, pickup_time_label, items, total, status, created_at";
const PRODUCT_COLUMNS: &str = "id, name, price, active, category, config, created_at";

//=========================================================================================
// `OrderStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl OrderStore for DbAdapter {
    async fn admit_order(&self, order: &Order, slot_limit: u32) -> PortResult<Reserved> {
        let key = SlotKey::new(order.pickup_date, order.pickup_start_minute);
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // Make sure the counter row exists so there is something to lock.
        sqlx::query(
            "INSERT INTO slot_counters (pickup_date, pickup_start_minute, label, count, updated_at)
             VALUES ($1, $2, $3, 0, $4)
             ON CONFLICT (pickup_date, pickup_start_minute) DO NOTHING",
        )
        .bind(key.pickup_date)
        .bind(key.start_minute as i32)
        .bind(&order.pickup_time_label)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let record = sqlx::query_as::<_, SlotCounterRecord>(
            "SELECT pickup_date, pickup_start_minute, label, count, updated_at
             FROM slot_counters
             WHERE pickup_date = $1 AND pickup_start_minute = $2
             FOR UPDATE",
        )
        .bind(key.pickup_date)
        .bind(key.start_minute as i32)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;

        // On `SlotFull` the transaction is dropped and rolled back untouched.
        let mut counter = record.to_domain();
        let reserved = counter.reserve(slot_limit, order.created_at)?;

        sqlx::query(
            "UPDATE slot_counters SET count = $3, updated_at = $4
             WHERE pickup_date = $1 AND pickup_start_minute = $2",
        )
        .bind(key.pickup_date)
        .bind(key.start_minute as i32)
        .bind(counter.count as i32)
        .bind(counter.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        sqlx::query(
            "INSERT INTO orders (id, code, pickup_date, pickup_start_minute, pickup_time_label, items, total, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(order.id)
        .bind(&order.code)
        .bind(order.pickup_date)
        .bind(order.pickup_start_minute as i32)
        .bind(&order.pickup_time_label)
        .bind(Json(&order.items))
        .bind(order.total)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(reserved)
    }

    async fn publish_projections(&self, order: &Order, updated_at: DateTime<Utc>) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        sqlx::query(
            "INSERT INTO order_public (code, status, pickup_time_label, pickup_date, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (code) DO NOTHING",
        )
        .bind(&order.code)
        .bind(order.status.as_str())
        .bind(&order.pickup_time_label)
        .bind(order.pickup_date)
        .bind(updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        sqlx::query(
            "INSERT INTO orders_public (order_id, pickup_time_label, pickup_start_minute, pickup_date, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (order_id) DO NOTHING",
        )
        .bind(order.id)
        .bind(&order.pickup_time_label)
        .bind(order.pickup_start_minute as i32)
        .bind(order.pickup_date)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> PortResult<Order> {
        let record = sqlx::query_as::<_, OrderRecord>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Order {} not found", order_id)))?;
        record.to_domain()
    }

    async fn list_orders(&self, filter: &OrderFilter) -> PortResult<Vec<Order>> {
        let records = sqlx::query_as::<_, OrderRecord>(&format!(
            "SELECT {} FROM orders
             WHERE ($1::date IS NULL OR pickup_date = $1)
               AND (NOT $2 OR status <> 'Ready')
             ORDER BY pickup_date, pickup_start_minute, created_at",
            ORDER_COLUMNS
        ))
        .bind(filter.pickup_date)
        .bind(filter.open_only)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn orders_between(&self, from: NaiveDate, to: NaiveDate) -> PortResult<Vec<Order>> {
        let records = sqlx::query_as::<_, OrderRecord>(&format!(
            "SELECT {} FROM orders WHERE pickup_date BETWEEN $1 AND $2 ORDER BY pickup_date, created_at",
            ORDER_COLUMNS
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn set_order_status(&self, order_id: Uuid, status: OrderStatus) -> PortResult<()> {
        let result = sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(order_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Order {} not found", order_id)));
        }
        Ok(())
    }

    async fn set_public_status(
        &self,
        code: &str,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let result = sqlx::query("UPDATE order_public SET status = $1, updated_at = $2 WHERE code = $3")
            .bind(status.as_str())
            .bind(updated_at)
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Tracking record {} not found", code)));
        }
        Ok(())
    }

    async fn get_public_order(&self, code: &str) -> PortResult<PublicOrderProjection> {
        let record = sqlx::query_as::<_, PublicOrderRecord>(
            "SELECT code, status, pickup_time_label, pickup_date, updated_at FROM order_public WHERE code = $1",
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Tracking record {} not found", code)))?;
        record.to_domain()
    }

    async fn capacity_usage(&self, pickup_date: NaiveDate) -> PortResult<HashMap<u32, u32>> {
        let rows = sqlx::query_as::<_, (i32, i64)>(
            "SELECT pickup_start_minute, COUNT(*) FROM orders_public
             WHERE pickup_date = $1
             GROUP BY pickup_start_minute",
        )
        .bind(pickup_date)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows
            .into_iter()
            .map(|(minute, used)| (minute as u32, used as u32))
            .collect())
    }

    async fn slot_counter(
        &self,
        pickup_date: NaiveDate,
        start_minute: u32,
    ) -> PortResult<Option<SlotCounter>> {
        let record = sqlx::query_as::<_, SlotCounterRecord>(
            "SELECT pickup_date, pickup_start_minute, label, count, updated_at
             FROM slot_counters WHERE pickup_date = $1 AND pickup_start_minute = $2",
        )
        .bind(pickup_date)
        .bind(start_minute as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.map(SlotCounterRecord::to_domain))
    }

    async fn health_check(&self) -> PortResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

//=========================================================================================
// `Catalog` Trait Implementation
//=========================================================================================

#[async_trait]
impl Catalog for DbAdapter {
    async fn get_product(&self, product_id: Uuid) -> PortResult<Product> {
        let record = sqlx::query_as::<_, ProductRecord>(&format!(
            "SELECT {} FROM products WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Product {} not found", product_id)))?;
        Ok(record.to_domain())
    }

    async fn list_products(&self, active_only: bool) -> PortResult<Vec<Product>> {
        let records = sqlx::query_as::<_, ProductRecord>(&format!(
            "SELECT {} FROM products WHERE (NOT $1 OR active) ORDER BY category NULLS LAST, name",
            PRODUCT_COLUMNS
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(records.into_iter().map(ProductRecord::to_domain).collect())
    }

    async fn create_product(&self, product: NewProduct) -> PortResult<Product> {
        let record = sqlx::query_as::<_, ProductRecord>(&format!(
            "INSERT INTO products (id, name, price, active, category, config)
             VALUES ($1, $2, $3, TRUE, $4, $5)
             RETURNING {}",
            PRODUCT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&product.name)
        .bind(product.price)
        .bind(&product.category)
        .bind(product.config.as_ref().map(Json))
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.to_domain())
    }

    async fn update_product(&self, product_id: Uuid, patch: ProductPatch) -> PortResult<Product> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        let current = sqlx::query_as::<_, ProductRecord>(&format!(
            "SELECT {} FROM products WHERE id = $1 FOR UPDATE",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(not_found(format!("Product {} not found", product_id)))?;

        let mut product = current.to_domain();
        patch.apply(&mut product);

        sqlx::query(
            "UPDATE products SET name = $1, price = $2, active = $3, category = $4, config = $5 WHERE id = $6",
        )
        .bind(&product.name)
        .bind(product.price)
        .bind(product.active)
        .bind(&product.category)
        .bind(product.config.as_ref().map(Json))
        .bind(product_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(product)
    }

    async fn delete_product(&self, product_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Product {} not found", product_id)));
        }
        Ok(())
    }
}

//=========================================================================================
// `StaffDirectory` Trait Implementation
//=========================================================================================

#[async_trait]
impl StaffDirectory for DbAdapter {
    async fn create_staff(
        &self,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<StaffMember> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO staff (id, email, hashed_password, role) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(email)
            .bind(hashed_password)
            .bind(role.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(StaffMember {
            id,
            email: email.to_string(),
            role,
        })
    }

    async fn get_staff_by_email(&self, email: &str) -> PortResult<StaffCredentials> {
        let record = sqlx::query_as::<_, StaffRecord>(
            "SELECT id, email, hashed_password, role FROM staff WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Staff member {} not found", email)))?;
        record.to_domain()
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        staff_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, staff_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(staff_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Role> {
        let role = sqlx::query_scalar::<_, String>(
            "SELECT s.role FROM auth_sessions a
             JOIN staff s ON s.id = a.staff_id
             WHERE a.id = $1 AND a.expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?
        .ok_or(PortError::Unauthorized)?;
        role.parse().map_err(PortError::Unexpected)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }
}

//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the store ports. Used when no `DATABASE_URL` is
//! configured and by the integration tests.
//!
//! Slot counters, orders and the code index share one mutex, so the
//! reserve-and-insert step of admission is atomic exactly like the database
//! transaction. Projections, products and staff live behind separate locks.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pickup_core::domain::{
    Order, OrderStatus, Product, PublicCapacityProjection, PublicOrderProjection, Role,
    StaffCredentials, StaffMember,
};
use pickup_core::ledger::{Reserved, SlotCounter, SlotKey};
use pickup_core::ports::{
    Catalog, NewProduct, OrderFilter, OrderStore, PortError, PortResult, ProductPatch,
    StaffDirectory,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

#[derive(Default)]
struct OrderTables {
    counters: HashMap<SlotKey, SlotCounter>,
    orders: HashMap<Uuid, Order>,
    codes: HashMap<String, Uuid>,
}

struct Session {
    staff_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<OrderTables>,
    public_orders: RwLock<HashMap<String, PublicOrderProjection>>,
    capacity: RwLock<HashMap<Uuid, PublicCapacityProjection>>,
    products: RwLock<HashMap<Uuid, Product>>,
    staff: RwLock<HashMap<String, StaffCredentials>>,
    sessions: RwLock<HashMap<String, Session>>,

    // Fault injection.
    fail_projections: AtomicBool,
    pending_contention: AtomicU32,
    pending_conflicts: AtomicU32,
}

fn poisoned<T>(_: T) -> PortError {
    PortError::Unexpected("in-memory store lock poisoned".to_string())
}

/// Takes one unit from an injected-fault budget, if any is left.
fn take_one(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `publish_projections` call fail until switched off.
    pub fn fail_projection_writes(&self, fail: bool) {
        self.fail_projections.store(fail, Ordering::SeqCst);
    }

    /// The next `n` admissions fail with `Contention` before touching anything.
    pub fn inject_contention(&self, n: u32) {
        self.pending_contention.store(n, Ordering::SeqCst);
    }

    /// The next `n` admissions fail with `Conflict`, as if the code were taken.
    pub fn inject_code_conflicts(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    /// Drops the tracking record for `code`, as a lost projection write would.
    pub fn forget_public_order(&self, code: &str) -> PortResult<()> {
        self.public_orders.write().map_err(poisoned)?.remove(code);
        Ok(())
    }

    /// Inserts a product as is, bypassing catalog validation. For seeding.
    pub fn seed_product(&self, product: Product) -> PortResult<()> {
        self.products
            .write()
            .map_err(poisoned)?
            .insert(product.id, product);
        Ok(())
    }

    fn tables(&self) -> PortResult<MutexGuard<'_, OrderTables>> {
        self.tables.lock().map_err(poisoned)
    }
}

//=========================================================================================
// `OrderStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn admit_order(&self, order: &Order, slot_limit: u32) -> PortResult<Reserved> {
        if take_one(&self.pending_contention) {
            return Err(PortError::Contention("injected contention".to_string()));
        }

        let mut tables = self.tables()?;
        if take_one(&self.pending_conflicts) || tables.codes.contains_key(&order.code) {
            return Err(PortError::Conflict(format!("code {} already in use", order.code)));
        }

        let key = SlotKey::new(order.pickup_date, order.pickup_start_minute);
        let mut counter = tables
            .counters
            .get(&key)
            .cloned()
            .unwrap_or_else(|| SlotCounter::empty(key, &order.pickup_time_label, order.created_at));
        let reserved = counter.reserve(slot_limit, order.created_at)?;

        tables.counters.insert(key, counter);
        tables.codes.insert(order.code.clone(), order.id);
        tables.orders.insert(order.id, order.clone());
        Ok(reserved)
    }

    async fn publish_projections(&self, order: &Order, updated_at: DateTime<Utc>) -> PortResult<()> {
        if self.fail_projections.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("projection write failed".to_string()));
        }
        self.public_orders
            .write()
            .map_err(poisoned)?
            .entry(order.code.clone())
            .or_insert_with(|| order.public_projection(updated_at));
        self.capacity
            .write()
            .map_err(poisoned)?
            .entry(order.id)
            .or_insert_with(|| order.capacity_projection());
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> PortResult<Order> {
        self.tables()?
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> PortResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .tables()?
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.pickup_date, o.pickup_start_minute, o.created_at));
        Ok(orders)
    }

    async fn orders_between(&self, from: NaiveDate, to: NaiveDate) -> PortResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .tables()?
            .orders
            .values()
            .filter(|o| o.pickup_date >= from && o.pickup_date <= to)
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.pickup_date, o.created_at));
        Ok(orders)
    }

    async fn set_order_status(&self, order_id: Uuid, status: OrderStatus) -> PortResult<()> {
        let mut tables = self.tables()?;
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| PortError::NotFound(format!("Order {} not found", order_id)))?;
        order.status = status;
        Ok(())
    }

    async fn set_public_status(
        &self,
        code: &str,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()> {
        if self.fail_projections.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("projection write failed".to_string()));
        }
        let mut public = self.public_orders.write().map_err(poisoned)?;
        let record = public
            .get_mut(code)
            .ok_or_else(|| PortError::NotFound(format!("Tracking record {} not found", code)))?;
        record.status = status;
        record.updated_at = updated_at;
        Ok(())
    }

    async fn get_public_order(&self, code: &str) -> PortResult<PublicOrderProjection> {
        self.public_orders
            .read()
            .map_err(poisoned)?
            .get(code)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Tracking record {} not found", code)))
    }

    async fn capacity_usage(&self, pickup_date: NaiveDate) -> PortResult<HashMap<u32, u32>> {
        let mut usage = HashMap::new();
        for entry in self.capacity.read().map_err(poisoned)?.values() {
            if entry.pickup_date == pickup_date {
                *usage.entry(entry.pickup_start_minute).or_insert(0) += 1;
            }
        }
        Ok(usage)
    }

    async fn slot_counter(
        &self,
        pickup_date: NaiveDate,
        start_minute: u32,
    ) -> PortResult<Option<SlotCounter>> {
        Ok(self
            .tables()?
            .counters
            .get(&SlotKey::new(pickup_date, start_minute))
            .cloned())
    }

    async fn health_check(&self) -> PortResult<()> {
        self.tables().map(|_| ())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

//=========================================================================================
// `Catalog` Trait Implementation
//=========================================================================================

#[async_trait]
impl Catalog for InMemoryStore {
    async fn get_product(&self, product_id: Uuid) -> PortResult<Product> {
        self.products
            .read()
            .map_err(poisoned)?
            .get(&product_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Product {} not found", product_id)))
    }

    async fn list_products(&self, active_only: bool) -> PortResult<Vec<Product>> {
        let mut products: Vec<Product> = self
            .products
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|p| !active_only || p.active)
            .cloned()
            .collect();
        products.sort_by(|a, b| {
            (a.category.is_none(), &a.category, &a.name).cmp(&(b.category.is_none(), &b.category, &b.name))
        });
        Ok(products)
    }

    async fn create_product(&self, product: NewProduct) -> PortResult<Product> {
        let created = Product {
            id: Uuid::new_v4(),
            name: product.name,
            price: product.price,
            active: true,
            category: product.category,
            config: product.config,
            created_at: Utc::now(),
        };
        self.products
            .write()
            .map_err(poisoned)?
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_product(&self, product_id: Uuid, patch: ProductPatch) -> PortResult<Product> {
        let mut products = self.products.write().map_err(poisoned)?;
        let product = products
            .get_mut(&product_id)
            .ok_or_else(|| PortError::NotFound(format!("Product {} not found", product_id)))?;
        patch.apply(product);
        Ok(product.clone())
    }

    async fn delete_product(&self, product_id: Uuid) -> PortResult<()> {
        self.products
            .write()
            .map_err(poisoned)?
            .remove(&product_id)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("Product {} not found", product_id)))
    }
}

//=========================================================================================
// `StaffDirectory` Trait Implementation
//=========================================================================================

#[async_trait]
impl StaffDirectory for InMemoryStore {
    async fn create_staff(
        &self,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<StaffMember> {
        let mut staff = self.staff.write().map_err(poisoned)?;
        if staff.contains_key(email) {
            return Err(PortError::Conflict(format!("Staff member {} already exists", email)));
        }
        let id = Uuid::new_v4();
        staff.insert(
            email.to_string(),
            StaffCredentials {
                id,
                email: email.to_string(),
                hashed_password: hashed_password.to_string(),
                role,
            },
        );
        Ok(StaffMember {
            id,
            email: email.to_string(),
            role,
        })
    }

    async fn get_staff_by_email(&self, email: &str) -> PortResult<StaffCredentials> {
        self.staff
            .read()
            .map_err(poisoned)?
            .get(email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Staff member {} not found", email)))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        staff_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.sessions.write().map_err(poisoned)?.insert(
            session_id.to_string(),
            Session {
                staff_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Role> {
        let staff_id = {
            let sessions = self.sessions.read().map_err(poisoned)?;
            match sessions.get(session_id) {
                Some(session) if session.expires_at > Utc::now() => session.staff_id,
                _ => return Err(PortError::Unauthorized),
            }
        };
        self.staff
            .read()
            .map_err(poisoned)?
            .values()
            .find(|s| s.id == staff_id)
            .map(|s| s.role)
            .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.sessions.write().map_err(poisoned)?.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn order(code: &str) -> Order {
        Order {
            id: Uuid::new_v4(),
            code: code.to_string(),
            pickup_date: NaiveDate::from_ymd_opt(2024, 5, 17).unwrap(),
            pickup_start_minute: 630,
            pickup_time_label: "10:30 - 10:45".to_string(),
            items: Vec::new(),
            total: Decimal::new(850, 2),
            status: OrderStatus::New,
            created_at: Utc.with_ymd_and_hms(2024, 5, 17, 8, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn full_slot_writes_nothing() {
        let store = InMemoryStore::new();
        store.admit_order(&order("AAAAAA"), 1).await.unwrap();

        let rejected = order("BBBBBB");
        let err = store.admit_order(&rejected, 1).await.unwrap_err();
        assert!(matches!(err, PortError::SlotFull(_)));
        assert!(store.get_order(rejected.id).await.is_err());

        let counter = store
            .slot_counter(rejected.pickup_date, 630)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(counter.count, 1);
    }

    #[tokio::test]
    async fn duplicate_code_is_a_conflict() {
        let store = InMemoryStore::new();
        store.admit_order(&order("AAAAAA"), 5).await.unwrap();
        let err = store.admit_order(&order("AAAAAA"), 5).await.unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
    }

    #[tokio::test]
    async fn injected_contention_is_consumed() {
        let store = InMemoryStore::new();
        store.inject_contention(1);
        assert!(matches!(
            store.admit_order(&order("AAAAAA"), 5).await,
            Err(PortError::Contention(_))
        ));
        assert!(store.admit_order(&order("AAAAAA"), 5).await.is_ok());
    }

    #[tokio::test]
    async fn capacity_usage_counts_projections() {
        let store = InMemoryStore::new();
        let first = order("AAAAAA");
        store.admit_order(&first, 5).await.unwrap();
        store.publish_projections(&first, first.created_at).await.unwrap();
        // Publishing twice must not double count.
        store.publish_projections(&first, first.created_at).await.unwrap();

        let usage = store.capacity_usage(first.pickup_date).await.unwrap();
        assert_eq!(usage.get(&630), Some(&1));
    }

    #[tokio::test]
    async fn late_publish_keeps_the_tracked_status() {
        let store = InMemoryStore::new();
        let first = order("AAAAAA");
        store.admit_order(&first, 5).await.unwrap();
        store.publish_projections(&first, first.created_at).await.unwrap();
        let later = first.created_at + chrono::Duration::minutes(3);
        store
            .set_public_status("AAAAAA", OrderStatus::Ready, later)
            .await
            .unwrap();

        store.publish_projections(&first, first.created_at).await.unwrap();

        let public = store.get_public_order("AAAAAA").await.unwrap();
        assert_eq!(public.status, OrderStatus::Ready);
        assert_eq!(public.updated_at, later);
    }
}

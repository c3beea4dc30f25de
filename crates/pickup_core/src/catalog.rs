//! crates/pickup_core/src/catalog.rs
//!
//! Admin-side product management on top of the `Catalog` port. Customers only
//! ever see active products.

use crate::domain::{Caller, Product};
use crate::ports::{Catalog, NewProduct, PortError, ProductPatch};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("staff access required")]
    StaffOnly,
    #[error("admin access required")]
    AdminOnly,
    #[error("product name must not be empty")]
    EmptyName,
    #[error("price must be greater than zero")]
    InvalidPrice,
    #[error(transparent)]
    Port(#[from] PortError),
}

fn check_name(name: &str) -> Result<String, CatalogError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::EmptyName);
    }
    Ok(name.to_string())
}

fn check_price(price: Decimal) -> Result<Decimal, CatalogError> {
    if price <= Decimal::ZERO {
        return Err(CatalogError::InvalidPrice);
    }
    Ok(price.round_dp(2))
}

#[derive(Clone)]
pub struct CatalogAdmin {
    catalog: Arc<dyn Catalog>,
}

impl CatalogAdmin {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// The customer menu.
    pub async fn menu(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self.catalog.list_products(true).await?)
    }

    pub async fn all_products(&self, caller: &Caller) -> Result<Vec<Product>, CatalogError> {
        if !caller.is_staff() {
            return Err(CatalogError::StaffOnly);
        }
        Ok(self.catalog.list_products(false).await?)
    }

    pub async fn create(
        &self,
        caller: &Caller,
        mut product: NewProduct,
    ) -> Result<Product, CatalogError> {
        if !caller.is_admin() {
            return Err(CatalogError::AdminOnly);
        }
        product.name = check_name(&product.name)?;
        product.price = check_price(product.price)?;
        let created = self.catalog.create_product(product).await?;
        info!(product_id = %created.id, name = %created.name, "Product created");
        Ok(created)
    }

    pub async fn update(
        &self,
        caller: &Caller,
        product_id: Uuid,
        mut patch: ProductPatch,
    ) -> Result<Product, CatalogError> {
        if !caller.is_admin() {
            return Err(CatalogError::AdminOnly);
        }
        if let Some(name) = patch.name.take() {
            patch.name = Some(check_name(&name)?);
        }
        if let Some(price) = patch.price {
            patch.price = Some(check_price(price)?);
        }
        let updated = self.catalog.update_product(product_id, patch).await?;
        info!(product_id = %updated.id, active = updated.active, "Product updated");
        Ok(updated)
    }

    pub async fn delete(&self, caller: &Caller, product_id: Uuid) -> Result<(), CatalogError> {
        if !caller.is_admin() {
            return Err(CatalogError::AdminOnly);
        }
        self.catalog.delete_product(product_id).await?;
        info!(%product_id, "Product deleted");
        Ok(())
    }
}

use tracing::{info, instrument};

use stockroom_auth::{IdentityProvider, require_identity};
use stockroom_core::ProductId;
use stockroom_inventory::{NewProduct, Product, ProductPatch, StockTransaction};

use crate::store::{ProductQuery, RecordStore, TransactionQuery};

use super::error::ServiceError;

/// Product catalogue operations for the signed-in user.
///
/// Stock levels are read here but only ever changed through
/// [`super::StockService`] and order fulfillment.
#[derive(Debug)]
pub struct ProductService<S> {
    store: S,
}

impl<S> ProductService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S> ProductService<S>
where
    S: RecordStore,
{
    /// Create a product. The initial stock is taken as-is; no ledger row is written.
    #[instrument(skip(self, identity, input), err)]
    pub async fn create(
        &self,
        identity: &dyn IdentityProvider,
        input: NewProduct,
    ) -> Result<Product, ServiceError> {
        let owner = require_identity(identity)?.user_id();
        let input = input.validate()?;
        let product = self.store.create_product(owner, input).await?;
        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[instrument(skip(self, identity), fields(product_id = %id), err)]
    pub async fn get(
        &self,
        identity: &dyn IdentityProvider,
        id: ProductId,
    ) -> Result<Product, ServiceError> {
        let owner = require_identity(identity)?.user_id();
        Ok(self.store.get_product(owner, id).await?)
    }

    /// All products, by name.
    #[instrument(skip(self, identity), err)]
    pub async fn list(&self, identity: &dyn IdentityProvider) -> Result<Vec<Product>, ServiceError> {
        let owner = require_identity(identity)?.user_id();
        Ok(self.store.list_products(owner, ProductQuery::all()).await?)
    }

    /// Products at or below their alert threshold, by name.
    #[instrument(skip(self, identity), err)]
    pub async fn low_stock(
        &self,
        identity: &dyn IdentityProvider,
    ) -> Result<Vec<Product>, ServiceError> {
        let owner = require_identity(identity)?.user_id();
        Ok(self.store.list_products(owner, ProductQuery::low_stock()).await?)
    }

    #[instrument(skip(self, identity, patch), fields(product_id = %id), err)]
    pub async fn update(
        &self,
        identity: &dyn IdentityProvider,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, ServiceError> {
        let owner = require_identity(identity)?.user_id();
        if patch.is_empty() {
            return Err(ServiceError::Validation("nothing to update".to_string()));
        }
        Ok(self.store.update_product(owner, id, patch).await?)
    }

    /// Delete a product that has never been ordered or adjusted.
    #[instrument(skip(self, identity), fields(product_id = %id), err)]
    pub async fn delete(
        &self,
        identity: &dyn IdentityProvider,
        id: ProductId,
    ) -> Result<(), ServiceError> {
        let owner = require_identity(identity)?.user_id();
        self.store.delete_product(owner, id).await?;
        info!(product_id = %id, "product deleted");
        Ok(())
    }

    /// Ledger rows for one product, newest first.
    #[instrument(skip(self, identity), fields(product_id = %id), err)]
    pub async fn history(
        &self,
        identity: &dyn IdentityProvider,
        id: ProductId,
        limit: Option<u32>,
    ) -> Result<Vec<StockTransaction>, ServiceError> {
        let owner = require_identity(identity)?.user_id();
        // Existence check so unknown ids are NotFound rather than an empty list.
        self.store.get_product(owner, id).await?;

        let mut query = TransactionQuery::for_product(id);
        if let Some(limit) = limit {
            query = query.with_limit(limit);
        }
        Ok(self.store.list_transactions(owner, query).await?)
    }
}

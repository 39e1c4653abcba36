use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use stockroom_core::{DomainError, OrderId, OrderItemId, ProductId, UserId};
use stockroom_inventory::{NewProduct, NewStockTransaction, Product, ProductPatch, StockTransaction};
use stockroom_purchasing::{NewOrder, Order, OrderPatch, OrderStatus, OrderWithItems};

use super::query::{OrderQuery, ProductQuery, TransactionQuery};

/// Record store operation error.
///
/// These are **infrastructure errors** (visibility, concurrency, storage) as
/// opposed to the domain errors raised while validating input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The record does not exist or belongs to another owner.
    #[error("record not found")]
    NotFound,

    /// A compare-and-set precondition no longer holds.
    #[error("compare-and-set conflict: {0}")]
    Conflict(String),

    /// A unique key (e.g. a ledger row's order item) already exists.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// The record is still referenced and cannot be removed.
    #[error("record in use: {0}")]
    InUse(String),

    /// A domain rule rejected the write inside the store.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("operation not supported by this store: {0}")]
    Unsupported(&'static str),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Everything that must become durable together when an order completes.
///
/// A store applying a batch moves the order from `expected_status` to
/// `completed` (or checks it is already `completed` when resuming), applies
/// every credit with the same compare-and-set rules as
/// [`RecordStore::apply_stock_change`], and either keeps all of it or none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentBatch {
    pub order_id: OrderId,
    pub expected_status: OrderStatus,
    pub credits: Vec<NewStockTransaction>,
}

/// Owner-scoped persistence for products, orders and the stock ledger.
///
/// Every method takes the owning identity; rows that belong to anyone else
/// are reported as [`StoreError::NotFound`].
///
/// Stock only moves through [`RecordStore::apply_stock_change`] (or a
/// fulfillment batch): the stored `current_stock` must equal the entry's
/// `previous_stock` (compare-and-set), and the new stock plus the ledger row
/// are written as one unit.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_product(&self, owner: UserId, product: NewProduct)
    -> Result<Product, StoreError>;

    async fn get_product(&self, owner: UserId, id: ProductId) -> Result<Product, StoreError>;

    async fn list_products(
        &self,
        owner: UserId,
        query: ProductQuery,
    ) -> Result<Vec<Product>, StoreError>;

    async fn update_product(
        &self,
        owner: UserId,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, StoreError>;

    /// Refused with [`StoreError::InUse`] while order items or ledger rows reference it.
    async fn delete_product(&self, owner: UserId, id: ProductId) -> Result<(), StoreError>;

    /// Compare-and-set the product's stock and append the ledger row.
    ///
    /// - `Conflict` when the stored stock differs from `entry.change.previous_stock()`
    /// - `Duplicate` when `entry.order_item_id` has already been credited
    async fn apply_stock_change(
        &self,
        owner: UserId,
        entry: NewStockTransaction,
    ) -> Result<StockTransaction, StoreError>;

    async fn list_transactions(
        &self,
        owner: UserId,
        query: TransactionQuery,
    ) -> Result<Vec<StockTransaction>, StoreError>;

    /// Every order line of `order_id` that already has a ledger row.
    ///
    /// Unlike [`RecordStore::list_transactions`] this is never truncated.
    async fn credited_items(
        &self,
        owner: UserId,
        order_id: OrderId,
    ) -> Result<HashSet<OrderItemId>, StoreError>;

    /// Insert the order and all its items as one unit.
    ///
    /// Every referenced product must be visible to `owner`.
    async fn create_order(&self, owner: UserId, order: NewOrder)
    -> Result<OrderWithItems, StoreError>;

    async fn get_order(&self, owner: UserId, id: OrderId) -> Result<OrderWithItems, StoreError>;

    async fn list_orders(
        &self,
        owner: UserId,
        query: OrderQuery,
    ) -> Result<Vec<OrderWithItems>, StoreError>;

    /// Apply `patch` only if the stored status still equals `expected_status`.
    async fn update_order(
        &self,
        owner: UserId,
        id: OrderId,
        expected_status: OrderStatus,
        patch: OrderPatch,
    ) -> Result<Order, StoreError>;

    /// Whether [`RecordStore::commit_fulfillment`] is available.
    fn supports_atomic_fulfillment(&self) -> bool {
        false
    }

    /// Apply a whole fulfillment atomically.
    async fn commit_fulfillment(
        &self,
        _owner: UserId,
        _batch: FulfillmentBatch,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        Err(StoreError::Unsupported("commit_fulfillment"))
    }
}

#[async_trait]
impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    async fn create_product(
        &self,
        owner: UserId,
        product: NewProduct,
    ) -> Result<Product, StoreError> {
        (**self).create_product(owner, product).await
    }

    async fn get_product(&self, owner: UserId, id: ProductId) -> Result<Product, StoreError> {
        (**self).get_product(owner, id).await
    }

    async fn list_products(
        &self,
        owner: UserId,
        query: ProductQuery,
    ) -> Result<Vec<Product>, StoreError> {
        (**self).list_products(owner, query).await
    }

    async fn update_product(
        &self,
        owner: UserId,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, StoreError> {
        (**self).update_product(owner, id, patch).await
    }

    async fn delete_product(&self, owner: UserId, id: ProductId) -> Result<(), StoreError> {
        (**self).delete_product(owner, id).await
    }

    async fn apply_stock_change(
        &self,
        owner: UserId,
        entry: NewStockTransaction,
    ) -> Result<StockTransaction, StoreError> {
        (**self).apply_stock_change(owner, entry).await
    }

    async fn list_transactions(
        &self,
        owner: UserId,
        query: TransactionQuery,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        (**self).list_transactions(owner, query).await
    }

    async fn credited_items(
        &self,
        owner: UserId,
        order_id: OrderId,
    ) -> Result<HashSet<OrderItemId>, StoreError> {
        (**self).credited_items(owner, order_id).await
    }

    async fn create_order(
        &self,
        owner: UserId,
        order: NewOrder,
    ) -> Result<OrderWithItems, StoreError> {
        (**self).create_order(owner, order).await
    }

    async fn get_order(&self, owner: UserId, id: OrderId) -> Result<OrderWithItems, StoreError> {
        (**self).get_order(owner, id).await
    }

    async fn list_orders(
        &self,
        owner: UserId,
        query: OrderQuery,
    ) -> Result<Vec<OrderWithItems>, StoreError> {
        (**self).list_orders(owner, query).await
    }

    async fn update_order(
        &self,
        owner: UserId,
        id: OrderId,
        expected_status: OrderStatus,
        patch: OrderPatch,
    ) -> Result<Order, StoreError> {
        (**self).update_order(owner, id, expected_status, patch).await
    }

    fn supports_atomic_fulfillment(&self) -> bool {
        (**self).supports_atomic_fulfillment()
    }

    async fn commit_fulfillment(
        &self,
        owner: UserId,
        batch: FulfillmentBatch,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        (**self).commit_fulfillment(owner, batch).await
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockroom_core::{OrderId, OrderItemId, ProductId, Quantity, TransactionId, UserId};
use stockroom_inventory::{
    NewProduct, NewStockTransaction, Product, ProductPatch, StockChange, StockTransaction,
};
use stockroom_purchasing::{NewOrder, Order, OrderPatch, OrderStatus, OrderWithItems};

use super::query::{OrderQuery, ProductQuery, TransactionQuery};
use super::r#trait::{FulfillmentBatch, RecordStore, StoreError};

#[derive(Debug, Clone, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    /// Insertion order doubles as creation order.
    orders: Vec<OrderWithItems>,
    /// Append-only.
    ledger: Vec<StockTransaction>,
    credited_items: HashSet<OrderItemId>,
}

impl Tables {
    fn product(&self, owner: UserId, id: ProductId) -> Result<&Product, StoreError> {
        self.products
            .get(&id)
            .filter(|p| p.owner_id == owner)
            .ok_or(StoreError::NotFound)
    }

    fn product_mut(&mut self, owner: UserId, id: ProductId) -> Result<&mut Product, StoreError> {
        self.products
            .get_mut(&id)
            .filter(|p| p.owner_id == owner)
            .ok_or(StoreError::NotFound)
    }

    fn order(&self, owner: UserId, id: OrderId) -> Result<&OrderWithItems, StoreError> {
        self.orders
            .iter()
            .find(|o| o.order.id == id && o.order.owner_id == owner)
            .ok_or(StoreError::NotFound)
    }

    fn order_mut(&mut self, owner: UserId, id: OrderId) -> Result<&mut OrderWithItems, StoreError> {
        self.orders
            .iter_mut()
            .find(|o| o.order.id == id && o.order.owner_id == owner)
            .ok_or(StoreError::NotFound)
    }

    /// Compare-and-set one product's stock and append its ledger row.
    fn apply_entry(
        &mut self,
        owner: UserId,
        entry: NewStockTransaction,
        now: DateTime<Utc>,
    ) -> Result<StockTransaction, StoreError> {
        if let Some(item_id) = entry.order_item_id {
            if self.credited_items.contains(&item_id) {
                return Err(StoreError::Duplicate(format!(
                    "order item {item_id} has already been credited"
                )));
            }
        }

        let product = self.product_mut(owner, entry.product_id)?;
        let expected = entry.change.previous_stock();
        if product.current_stock != expected {
            return Err(StoreError::Conflict(format!(
                "product {} stock is {}, expected {}",
                product.id, product.current_stock, expected
            )));
        }
        product.current_stock = entry.change.new_stock();
        product.updated_at = now;

        let record = entry.into_record(TransactionId::new(), owner, now);
        if let Some(item_id) = record.order_item_id {
            self.credited_items.insert(item_id);
        }
        self.ledger.push(record.clone());
        Ok(record)
    }
}

/// Test hooks that make the store misbehave on purpose.
#[derive(Debug, Default)]
struct Faults {
    /// Remaining forced failures of stock writes, per product.
    failing_writes: HashMap<ProductId, u32>,
    /// Remaining foreign `add` writes slipped in just before a stock write.
    interleaved_writes: HashMap<ProductId, (u32, Quantity)>,
}

/// In-memory record store.
///
/// Intended for tests/dev. Not optimized for performance.
///
/// Supports [`RecordStore::commit_fulfillment`] unless built with
/// [`InMemoryRecordStore::without_atomic_fulfillment`], which forces the
/// resumable completion path.
#[derive(Debug)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
    faults: Mutex<Faults>,
    atomic_fulfillment: bool,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            faults: Mutex::new(Faults::default()),
            atomic_fulfillment: true,
        }
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that only offers per-product stock writes.
    pub fn without_atomic_fulfillment() -> Self {
        Self {
            atomic_fulfillment: false,
            ..Self::default()
        }
    }

    /// Make the next `times` stock writes touching `product_id` fail with a backend error.
    pub fn fail_stock_writes(&self, product_id: ProductId, times: u32) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.failing_writes.insert(product_id, times);
        }
    }

    /// Before each of the next `times` stock writes touching `product_id`,
    /// add `amount` to its stock as if another session had written first.
    pub fn interleave_foreign_writes(&self, product_id: ProductId, times: u32, amount: Quantity) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.interleaved_writes.insert(product_id, (times, amount));
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn take_failure(&self, product_id: ProductId) -> Result<(), StoreError> {
        let mut faults = self
            .faults
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        match faults.failing_writes.get_mut(&product_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Backend(format!(
                    "injected stock write failure for product {product_id}"
                )))
            }
            _ => Ok(()),
        }
    }

    fn run_interleaved_writes(
        &self,
        tables: &mut Tables,
        product_ids: impl IntoIterator<Item = ProductId>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut faults = self
            .faults
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        for product_id in product_ids {
            let Some((remaining, amount)) = faults.interleaved_writes.get_mut(&product_id) else {
                continue;
            };
            if *remaining == 0 {
                continue;
            }
            *remaining -= 1;

            let Some(product) = tables.products.get(&product_id) else {
                continue;
            };
            let owner = product.owner_id;
            let change = StockChange::credit(product.current_stock, *amount)?;
            let entry =
                NewStockTransaction::manual(product_id, change, Some("interleaved write".into()));
            tables.apply_entry(owner, entry, now)?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create_product(
        &self,
        owner: UserId,
        product: NewProduct,
    ) -> Result<Product, StoreError> {
        let product = product.into_product(ProductId::new(), owner, Utc::now());
        let mut tables = self.write()?;
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, owner: UserId, id: ProductId) -> Result<Product, StoreError> {
        self.read()?.product(owner, id).cloned()
    }

    async fn list_products(
        &self,
        owner: UserId,
        query: ProductQuery,
    ) -> Result<Vec<Product>, StoreError> {
        let tables = self.read()?;
        let mut products: Vec<Product> = tables
            .products
            .values()
            .filter(|p| p.owner_id == owner)
            .filter(|p| !query.low_stock_only || p.is_low_stock())
            .cloned()
            .collect();
        products.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then(a.id.cmp(&b.id))
        });
        Ok(products)
    }

    async fn update_product(
        &self,
        owner: UserId,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, StoreError> {
        let mut tables = self.write()?;
        let product = tables.product_mut(owner, id)?;
        let mut updated = product.clone();
        patch.apply_to(&mut updated, Utc::now())?;
        *product = updated.clone();
        Ok(updated)
    }

    async fn delete_product(&self, owner: UserId, id: ProductId) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        tables.product(owner, id)?;

        let on_order = tables
            .orders
            .iter()
            .any(|o| o.items.iter().any(|i| i.product_id == id));
        if on_order {
            return Err(StoreError::InUse(format!("product {id} is referenced by orders")));
        }
        if tables.ledger.iter().any(|t| t.product_id == id) {
            return Err(StoreError::InUse(format!("product {id} has stock history")));
        }

        tables.products.remove(&id);
        Ok(())
    }

    async fn apply_stock_change(
        &self,
        owner: UserId,
        entry: NewStockTransaction,
    ) -> Result<StockTransaction, StoreError> {
        let now = Utc::now();
        let mut tables = self.write()?;
        self.run_interleaved_writes(&mut tables, [entry.product_id], now)?;
        tables.product(owner, entry.product_id)?;
        self.take_failure(entry.product_id)?;
        tables.apply_entry(owner, entry, now)
    }

    async fn list_transactions(
        &self,
        owner: UserId,
        query: TransactionQuery,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .ledger
            .iter()
            .rev()
            .filter(|t| t.owner_id == owner)
            .filter(|t| query.product_id.is_none_or(|id| t.product_id == id))
            .filter(|t| query.order_id.is_none_or(|id| t.order_id == Some(id)))
            .take(query.effective_limit())
            .cloned()
            .collect())
    }

    async fn credited_items(
        &self,
        owner: UserId,
        order_id: OrderId,
    ) -> Result<HashSet<OrderItemId>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .ledger
            .iter()
            .filter(|t| t.owner_id == owner && t.order_id == Some(order_id))
            .filter_map(|t| t.order_item_id)
            .collect())
    }

    async fn create_order(
        &self,
        owner: UserId,
        order: NewOrder,
    ) -> Result<OrderWithItems, StoreError> {
        let mut tables = self.write()?;
        for item in &order.items {
            tables.product(owner, item.product_id)?;
        }
        let record = order.into_records(OrderId::new(), owner, Utc::now());
        tables.orders.push(record.clone());
        Ok(record)
    }

    async fn get_order(&self, owner: UserId, id: OrderId) -> Result<OrderWithItems, StoreError> {
        self.read()?.order(owner, id).cloned()
    }

    async fn list_orders(
        &self,
        owner: UserId,
        query: OrderQuery,
    ) -> Result<Vec<OrderWithItems>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .orders
            .iter()
            .rev()
            .filter(|o| o.order.owner_id == owner)
            .filter(|o| query.status.is_none_or(|s| o.order.status == s))
            .cloned()
            .collect())
    }

    async fn update_order(
        &self,
        owner: UserId,
        id: OrderId,
        expected_status: OrderStatus,
        patch: OrderPatch,
    ) -> Result<Order, StoreError> {
        let mut tables = self.write()?;
        let record = tables.order_mut(owner, id)?;
        if record.order.status != expected_status {
            return Err(StoreError::Conflict(format!(
                "order {id} is {}, expected {expected_status}",
                record.order.status
            )));
        }
        let mut updated = record.order.clone();
        patch.apply_to(&mut updated, Utc::now())?;
        record.order = updated.clone();
        Ok(updated)
    }

    fn supports_atomic_fulfillment(&self) -> bool {
        self.atomic_fulfillment
    }

    async fn commit_fulfillment(
        &self,
        owner: UserId,
        batch: FulfillmentBatch,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        if !self.atomic_fulfillment {
            return Err(StoreError::Unsupported("commit_fulfillment"));
        }

        let now = Utc::now();
        let mut tables = self.write()?;
        self.run_interleaved_writes(
            &mut tables,
            batch.credits.iter().map(|c| c.product_id),
            now,
        )?;

        // Work on a copy; it replaces the live tables only if every step succeeds.
        let mut staged = tables.clone();
        {
            let record = staged.order_mut(owner, batch.order_id)?;
            if record.order.status != batch.expected_status {
                return Err(StoreError::Conflict(format!(
                    "order {} is {}, expected {}",
                    batch.order_id, record.order.status, batch.expected_status
                )));
            }
            if record.order.status != OrderStatus::Completed {
                OrderPatch::status(OrderStatus::Completed).apply_to(&mut record.order, now)?;
            }
        }

        let mut committed = Vec::with_capacity(batch.credits.len());
        for credit in batch.credits {
            self.take_failure(credit.product_id)?;
            committed.push(staged.apply_entry(owner, credit, now)?);
        }

        *tables = staged;
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_inventory::{TransactionType, Unit};
    use stockroom_purchasing::NewOrderItem;

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    fn test_owner() -> UserId {
        UserId::new()
    }

    async fn seeded(store: &InMemoryRecordStore, owner: UserId, stock: &str) -> Product {
        store
            .create_product(owner, NewProduct::new("Flour", Unit::Kg).with_stock(q(stock)))
            .await
            .unwrap()
    }

    fn add(product: &Product, amount: &str) -> NewStockTransaction {
        let change =
            StockChange::compute(product.current_stock, TransactionType::Add, q(amount)).unwrap();
        NewStockTransaction::manual(product.id, change, None)
    }

    #[tokio::test]
    async fn products_are_invisible_to_other_owners() {
        let store = InMemoryRecordStore::new();
        let owner = test_owner();
        let product = seeded(&store, owner, "1").await;

        assert_eq!(
            store.get_product(test_owner(), product.id).await,
            Err(StoreError::NotFound)
        );
        assert!(store
            .list_products(test_owner(), ProductQuery::all())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn stock_write_is_compare_and_set() {
        let store = InMemoryRecordStore::new();
        let owner = test_owner();
        let product = seeded(&store, owner, "10").await;

        let first = store.apply_stock_change(owner, add(&product, "5")).await.unwrap();
        assert_eq!(first.new_stock, q("15"));

        // Same baseline again: stale.
        let stale = store.apply_stock_change(owner, add(&product, "5")).await;
        assert!(matches!(stale, Err(StoreError::Conflict(_))));

        let stored = store.get_product(owner, product.id).await.unwrap();
        assert_eq!(stored.current_stock, q("15"));
        let ledger = store
            .list_transactions(owner, TransactionQuery::for_product(product.id))
            .await
            .unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn order_item_can_only_be_credited_once() {
        let store = InMemoryRecordStore::new();
        let owner = test_owner();
        let product = seeded(&store, owner, "0").await;
        let order_id = OrderId::new();
        let item_id = OrderItemId::new();

        let change = StockChange::credit(q("0"), q("2")).unwrap();
        store
            .apply_stock_change(
                owner,
                NewStockTransaction::order_credit(product.id, change, order_id, item_id),
            )
            .await
            .unwrap();

        let again = StockChange::credit(q("2"), q("2")).unwrap();
        let res = store
            .apply_stock_change(
                owner,
                NewStockTransaction::order_credit(product.id, again, order_id, item_id),
            )
            .await;
        assert!(matches!(res, Err(StoreError::Duplicate(_))));
        assert_eq!(
            store.get_product(owner, product.id).await.unwrap().current_stock,
            q("2")
        );
    }

    #[tokio::test]
    async fn order_creation_requires_visible_products() {
        let store = InMemoryRecordStore::new();
        let owner = test_owner();
        let foreign = seeded(&store, test_owner(), "1").await;

        let order = NewOrder::new("Acme", vec![NewOrderItem::new(foreign.id, q("1"))]);
        assert_eq!(store.create_order(owner, order).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn update_order_checks_expected_status() {
        let store = InMemoryRecordStore::new();
        let owner = test_owner();
        let product = seeded(&store, owner, "1").await;
        let order = store
            .create_order(
                owner,
                NewOrder::new("Acme", vec![NewOrderItem::new(product.id, q("1"))]),
            )
            .await
            .unwrap();

        let res = store
            .update_order(
                owner,
                order.id(),
                OrderStatus::Shipped,
                OrderPatch::status(OrderStatus::Delivered),
            )
            .await;
        assert!(matches!(res, Err(StoreError::Conflict(_))));

        let shipped = store
            .update_order(
                owner,
                order.id(),
                OrderStatus::Pending,
                OrderPatch::status(OrderStatus::Shipped),
            )
            .await
            .unwrap();
        assert_eq!(shipped.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn failed_batch_leaves_nothing_behind() {
        let store = InMemoryRecordStore::new();
        let owner = test_owner();
        let a = seeded(&store, owner, "1").await;
        let b = seeded(&store, owner, "1").await;
        let order = store
            .create_order(
                owner,
                NewOrder::new(
                    "Acme",
                    vec![NewOrderItem::new(a.id, q("1")), NewOrderItem::new(b.id, q("1"))],
                ),
            )
            .await
            .unwrap();

        let credits = order
            .items
            .iter()
            .map(|item| {
                let change = StockChange::credit(q("1"), item.quantity).unwrap();
                NewStockTransaction::order_credit(item.product_id, change, order.id(), item.id)
            })
            .collect();
        store.fail_stock_writes(b.id, 1);

        let res = store
            .commit_fulfillment(
                owner,
                FulfillmentBatch {
                    order_id: order.id(),
                    expected_status: OrderStatus::Pending,
                    credits,
                },
            )
            .await;
        assert!(matches!(res, Err(StoreError::Backend(_))));

        assert_eq!(store.get_product(owner, a.id).await.unwrap().current_stock, q("1"));
        assert_eq!(
            store.get_order(owner, order.id()).await.unwrap().status(),
            OrderStatus::Pending
        );
        assert!(store
            .list_transactions(owner, TransactionQuery::for_order(order.id()))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn delete_is_refused_while_product_has_history() {
        let store = InMemoryRecordStore::new();
        let owner = test_owner();
        let used = seeded(&store, owner, "1").await;
        let unused = seeded(&store, owner, "1").await;
        store.apply_stock_change(owner, add(&used, "1")).await.unwrap();

        assert!(matches!(
            store.delete_product(owner, used.id).await,
            Err(StoreError::InUse(_))
        ));
        store.delete_product(owner, unused.id).await.unwrap();
        assert_eq!(
            store.get_product(owner, unused.id).await,
            Err(StoreError::NotFound)
        );
    }
}

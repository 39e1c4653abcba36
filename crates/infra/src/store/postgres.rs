//! Postgres-backed record store.
//!
//! Ownership, compare-and-set stock writes and ledger uniqueness are enforced
//! at the database level:
//!
//! - every query filters on `owner_id`
//! - stock moves with `UPDATE products ... WHERE current_stock = $expected`,
//!   in the same SQL transaction as the ledger insert
//! - a partial unique index on `stock_transactions.order_item_id` stops an
//!   order line from being credited twice
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (foreign key violation) | `23503` | `InUse` |
//! | Database (other) | Any other | `Backend` |
//! | RowNotFound | N/A | `NotFound` |
//! | Other | N/A | `Backend` |

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockroom_core::{OrderId, OrderItemId, ProductId, Quantity, TransactionId, UserId};
use stockroom_inventory::{NewProduct, NewStockTransaction, Product, ProductPatch, StockTransaction};
use stockroom_purchasing::{NewOrder, Order, OrderItem, OrderPatch, OrderStatus, OrderWithItems};

use super::query::{OrderQuery, ProductQuery, TransactionQuery};
use super::r#trait::{FulfillmentBatch, RecordStore, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_stockroom.sql");

const PRODUCT_COLUMNS: &str = "id, owner_id, name, description, current_stock, unit, \
     min_stock_alert, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, owner_id, supplier_name, order_date, expected_arrival_date, \
     tracking_number, status, notes, total_amount, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, unit_price, notes, line_no";

const TRANSACTION_COLUMNS: &str = "id, product_id, owner_id, transaction_type, amount, \
     previous_stock, new_stock, notes, order_id, order_item_id, created_at";

/// Postgres-backed record store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`; every multi-row
/// write runs inside one SQL transaction.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: Arc<PgPool>,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn load_items(&self, order_ids: &[Uuid]) -> Result<Vec<OrderItem>, StoreError> {
        if order_ids.is_empty() {
            return Ok(vec![]);
        }
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, line_no"
        ))
        .bind(order_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_items", e))?;

        rows.iter()
            .map(|r| decode::<OrderItemRow>(r).and_then(OrderItem::try_from))
            .collect()
    }
}

/// Compare-and-set one product's stock and append its ledger row inside `tx`.
async fn write_stock_entry(
    tx: &mut Transaction<'_, Postgres>,
    owner: UserId,
    entry: NewStockTransaction,
    now: DateTime<Utc>,
) -> Result<StockTransaction, StoreError> {
    if let Some(item_id) = entry.order_item_id {
        let credited = sqlx::query("SELECT 1 FROM stock_transactions WHERE order_item_id = $1")
            .bind(item_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("check_order_item_credit", e))?;
        if credited.is_some() {
            return Err(StoreError::Duplicate(format!(
                "order item {item_id} has already been credited"
            )));
        }
    }

    let expected = entry.change.previous_stock();
    let updated = sqlx::query(
        r#"
        UPDATE products
        SET current_stock = $1, updated_at = $2
        WHERE id = $3 AND owner_id = $4 AND current_stock = $5
        "#,
    )
    .bind(entry.change.new_stock().value())
    .bind(now)
    .bind(entry.product_id.as_uuid())
    .bind(owner.as_uuid())
    .bind(expected.value())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_stock", e))?;

    if updated.rows_affected() == 0 {
        let row = sqlx::query("SELECT current_stock FROM products WHERE id = $1 AND owner_id = $2")
            .bind(entry.product_id.as_uuid())
            .bind(owner.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("read_stock", e))?;
        return Err(match row {
            None => StoreError::NotFound,
            Some(row) => {
                let current: Decimal = row
                    .try_get("current_stock")
                    .map_err(|e| map_sqlx_error("read_stock", e))?;
                StoreError::Conflict(format!(
                    "product {} stock is {}, expected {}",
                    entry.product_id,
                    current.normalize(),
                    expected
                ))
            }
        });
    }

    let record = entry.into_record(TransactionId::new(), owner, now);
    sqlx::query(&format!(
        "INSERT INTO stock_transactions ({TRANSACTION_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
    ))
    .bind(record.id.as_uuid())
    .bind(record.product_id.as_uuid())
    .bind(record.owner_id.as_uuid())
    .bind(record.transaction_type.as_str())
    .bind(record.amount.value())
    .bind(record.previous_stock.value())
    .bind(record.new_stock.value())
    .bind(&record.notes)
    .bind(record.order_id.map(|id| *id.as_uuid()))
    .bind(record.order_item_id.map(|id| *id.as_uuid()))
    .bind(record.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_stock_transaction", e))?;

    Ok(record)
}

/// Lock the order row for the rest of `tx`.
async fn lock_order(
    tx: &mut Transaction<'_, Postgres>,
    owner: UserId,
    id: OrderId,
) -> Result<Order, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND owner_id = $2 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .bind(owner.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_order", e))?
    .ok_or(StoreError::NotFound)?;

    decode::<OrderRow>(&row)?.try_into()
}

async fn save_order_header(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE orders
        SET status = $1, tracking_number = $2, updated_at = $3
        WHERE id = $4 AND owner_id = $5
        "#,
    )
    .bind(order.status.as_str())
    .bind(&order.tracking_number)
    .bind(order.updated_at)
    .bind(order.id.as_uuid())
    .bind(order.owner_id.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_order", e))?;
    Ok(())
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    #[instrument(skip(self, product), fields(owner_id = %owner), err)]
    async fn create_product(
        &self,
        owner: UserId,
        product: NewProduct,
    ) -> Result<Product, StoreError> {
        let product = product.into_product(ProductId::new(), owner, Utc::now());
        sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(product.id.as_uuid())
        .bind(product.owner_id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.current_stock.value())
        .bind(product.unit.as_str())
        .bind(product.min_stock_alert.value())
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_product", e))?;
        Ok(product)
    }

    #[instrument(skip(self), fields(owner_id = %owner, product_id = %id), err)]
    async fn get_product(&self, owner: UserId, id: ProductId) -> Result<Product, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND owner_id = $2"
        ))
        .bind(id.as_uuid())
        .bind(owner.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?
        .ok_or(StoreError::NotFound)?;

        decode::<ProductRow>(&row)?.try_into()
    }

    #[instrument(skip(self), fields(owner_id = %owner), err)]
    async fn list_products(
        &self,
        owner: UserId,
        query: ProductQuery,
    ) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE owner_id = $1 AND ($2 = FALSE OR current_stock <= min_stock_alert) \
             ORDER BY lower(name), id"
        ))
        .bind(owner.as_uuid())
        .bind(query.low_stock_only)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;

        rows.iter()
            .map(|r| decode::<ProductRow>(r).and_then(Product::try_from))
            .collect()
    }

    #[instrument(skip(self, patch), fields(owner_id = %owner, product_id = %id), err)]
    async fn update_product(
        &self,
        owner: UserId,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND owner_id = $2 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .bind(owner.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_product", e))?
        .ok_or(StoreError::NotFound)?;
        let mut product: Product = decode::<ProductRow>(&row)?.try_into()?;

        patch.apply_to(&mut product, Utc::now())?;

        sqlx::query(
            r#"
            UPDATE products
            SET name = $1, description = $2, unit = $3, min_stock_alert = $4, updated_at = $5
            WHERE id = $6 AND owner_id = $7
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.unit.as_str())
        .bind(product.min_stock_alert.value())
        .bind(product.updated_at)
        .bind(id.as_uuid())
        .bind(owner.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(product)
    }

    #[instrument(skip(self), fields(owner_id = %owner, product_id = %id), err)]
    async fn delete_product(&self, owner: UserId, id: ProductId) -> Result<(), StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                EXISTS (SELECT 1 FROM order_items WHERE product_id = p.id) AS on_order,
                EXISTS (SELECT 1 FROM stock_transactions WHERE product_id = p.id) AS has_history
            FROM products p
            WHERE p.id = $1 AND p.owner_id = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(owner.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("check_product_references", e))?
        .ok_or(StoreError::NotFound)?;

        let on_order: bool = row
            .try_get("on_order")
            .map_err(|e| map_sqlx_error("check_product_references", e))?;
        let has_history: bool = row
            .try_get("has_history")
            .map_err(|e| map_sqlx_error("check_product_references", e))?;
        if on_order {
            return Err(StoreError::InUse(format!("product {id} is referenced by orders")));
        }
        if has_history {
            return Err(StoreError::InUse(format!("product {id} has stock history")));
        }

        // A reference added since the check fails the FK and maps to InUse.
        let deleted = sqlx::query("DELETE FROM products WHERE id = $1 AND owner_id = $2")
            .bind(id.as_uuid())
            .bind(owner.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(
        skip(self, entry),
        fields(
            owner_id = %owner,
            product_id = %entry.product_id,
            transaction_type = %entry.change.transaction_type(),
        ),
        err
    )]
    async fn apply_stock_change(
        &self,
        owner: UserId,
        entry: NewStockTransaction,
    ) -> Result<StockTransaction, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let record = write_stock_entry(&mut tx, owner, entry, Utc::now()).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(record)
    }

    #[instrument(skip(self), fields(owner_id = %owner), err)]
    async fn list_transactions(
        &self,
        owner: UserId,
        query: TransactionQuery,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM stock_transactions \
             WHERE owner_id = $1 \
               AND ($2::uuid IS NULL OR product_id = $2) \
               AND ($3::uuid IS NULL OR order_id = $3) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $4"
        ))
        .bind(owner.as_uuid())
        .bind(query.product_id.map(|id| *id.as_uuid()))
        .bind(query.order_id.map(|id| *id.as_uuid()))
        .bind(query.effective_limit() as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_transactions", e))?;

        rows.iter()
            .map(|r| decode::<TransactionRow>(r).and_then(StockTransaction::try_from))
            .collect()
    }

    async fn credited_items(
        &self,
        owner: UserId,
        order_id: OrderId,
    ) -> Result<HashSet<OrderItemId>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT order_item_id FROM stock_transactions \
             WHERE owner_id = $1 AND order_id = $2 AND order_item_id IS NOT NULL",
        )
        .bind(owner.as_uuid())
        .bind(order_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("credited_items", e))?;

        Ok(ids.into_iter().map(OrderItemId::from_uuid).collect())
    }

    #[instrument(skip(self, order), fields(owner_id = %owner, item_count = order.items.len()), err)]
    async fn create_order(
        &self,
        owner: UserId,
        order: NewOrder,
    ) -> Result<OrderWithItems, StoreError> {
        let mut product_ids: Vec<Uuid> = order.items.iter().map(|i| *i.product_id.as_uuid()).collect();
        product_ids.sort();
        product_ids.dedup();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let visible: i64 = sqlx::query(
            "SELECT COUNT(*) AS visible FROM products WHERE owner_id = $1 AND id = ANY($2)",
        )
        .bind(owner.as_uuid())
        .bind(&product_ids)
        .fetch_one(&mut *tx)
        .await
        .and_then(|row| row.try_get("visible"))
        .map_err(|e| map_sqlx_error("check_order_products", e))?;
        if visible as usize != product_ids.len() {
            return Err(StoreError::NotFound);
        }

        let record = order.into_records(OrderId::new(), owner, Utc::now());
        let header = &record.order;
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(header.id.as_uuid())
        .bind(header.owner_id.as_uuid())
        .bind(&header.supplier_name)
        .bind(header.order_date)
        .bind(header.expected_arrival_date)
        .bind(&header.tracking_number)
        .bind(header.status.as_str())
        .bind(&header.notes)
        .bind(header.total_amount.map(|t| t.value()))
        .bind(header.created_at)
        .bind(header.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for item in &record.items {
            sqlx::query(&format!(
                "INSERT INTO order_items ({ITEM_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
            ))
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(item.quantity.value())
            .bind(item.unit_price.map(|p| p.value()))
            .bind(&item.notes)
            .bind(item.line_no as i32)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_item", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(record)
    }

    #[instrument(skip(self), fields(owner_id = %owner, order_id = %id), err)]
    async fn get_order(&self, owner: UserId, id: OrderId) -> Result<OrderWithItems, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND owner_id = $2"
        ))
        .bind(id.as_uuid())
        .bind(owner.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_order", e))?
        .ok_or(StoreError::NotFound)?;

        let order: Order = decode::<OrderRow>(&row)?.try_into()?;
        let items = self.load_items(&[*id.as_uuid()]).await?;
        Ok(OrderWithItems { order, items })
    }

    #[instrument(skip(self), fields(owner_id = %owner), err)]
    async fn list_orders(
        &self,
        owner: UserId,
        query: OrderQuery,
    ) -> Result<Vec<OrderWithItems>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE owner_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner.as_uuid())
        .bind(query.status.map(|s| s.as_str()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        let orders = rows
            .iter()
            .map(|r| decode::<OrderRow>(r).and_then(Order::try_from))
            .collect::<Result<Vec<_>, _>>()?;

        let ids: Vec<Uuid> = orders.iter().map(|o| *o.id.as_uuid()).collect();
        let mut items_by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for item in self.load_items(&ids).await? {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = items_by_order.remove(&order.id).unwrap_or_default();
                OrderWithItems { order, items }
            })
            .collect())
    }

    #[instrument(
        skip(self, patch),
        fields(owner_id = %owner, order_id = %id, expected_status = %expected_status),
        err
    )]
    async fn update_order(
        &self,
        owner: UserId,
        id: OrderId,
        expected_status: OrderStatus,
        patch: OrderPatch,
    ) -> Result<Order, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut order = lock_order(&mut tx, owner, id).await?;
        if order.status != expected_status {
            return Err(StoreError::Conflict(format!(
                "order {id} is {}, expected {expected_status}",
                order.status
            )));
        }
        patch.apply_to(&mut order, Utc::now())?;
        save_order_header(&mut tx, &order).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(order)
    }

    fn supports_atomic_fulfillment(&self) -> bool {
        true
    }

    #[instrument(
        skip(self, batch),
        fields(owner_id = %owner, order_id = %batch.order_id, credits = batch.credits.len()),
        err
    )]
    async fn commit_fulfillment(
        &self,
        owner: UserId,
        batch: FulfillmentBatch,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Dropping `tx` on any early return rolls everything back.
        let mut order = lock_order(&mut tx, owner, batch.order_id).await?;
        if order.status != batch.expected_status {
            return Err(StoreError::Conflict(format!(
                "order {} is {}, expected {}",
                batch.order_id, order.status, batch.expected_status
            )));
        }
        if order.status != OrderStatus::Completed {
            OrderPatch::status(OrderStatus::Completed).apply_to(&mut order, now)?;
            save_order_header(&mut tx, &order).await?;
        }

        let mut committed = Vec::with_capacity(batch.credits.len());
        for credit in batch.credits {
            committed.push(write_stock_entry(&mut tx, owner, credit, now).await?);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(committed)
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                Some("23503") => StoreError::InUse(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode<'r, T>(row: &'r PgRow) -> Result<T, StoreError>
where
    T: FromRow<'r, PgRow>,
{
    T::from_row(row).map_err(|e| StoreError::Backend(format!("failed to decode row: {e}")))
}

fn quantity(value: Decimal, column: &str) -> Result<Quantity, StoreError> {
    Quantity::new(value)
        .map_err(|e| StoreError::Backend(format!("corrupt {column} column: {e}")))
}

fn parse_column<T>(value: &str, column: &str) -> Result<T, StoreError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    value
        .parse()
        .map_err(|e| StoreError::Backend(format!("corrupt {column} column: {e}")))
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    description: Option<String>,
    current_stock: Decimal,
    unit: String,
    min_stock_alert: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            current_stock: row.try_get("current_stock")?,
            unit: row.try_get("unit")?,
            min_stock_alert: row.try_get("min_stock_alert")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: ProductId::from_uuid(row.id),
            owner_id: UserId::from_uuid(row.owner_id),
            name: row.name,
            description: row.description,
            current_stock: quantity(row.current_stock, "current_stock")?,
            unit: parse_column(&row.unit, "unit")?,
            min_stock_alert: quantity(row.min_stock_alert, "min_stock_alert")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct OrderRow {
    id: Uuid,
    owner_id: Uuid,
    supplier_name: String,
    order_date: NaiveDate,
    expected_arrival_date: Option<NaiveDate>,
    tracking_number: Option<String>,
    status: String,
    notes: Option<String>,
    total_amount: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            supplier_name: row.try_get("supplier_name")?,
            order_date: row.try_get("order_date")?,
            expected_arrival_date: row.try_get("expected_arrival_date")?,
            tracking_number: row.try_get("tracking_number")?,
            status: row.try_get("status")?,
            notes: row.try_get("notes")?,
            total_amount: row.try_get("total_amount")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: OrderId::from_uuid(row.id),
            owner_id: UserId::from_uuid(row.owner_id),
            supplier_name: row.supplier_name,
            order_date: row.order_date,
            expected_arrival_date: row.expected_arrival_date,
            tracking_number: row.tracking_number,
            status: parse_column(&row.status, "status")?,
            notes: row.notes,
            total_amount: row
                .total_amount
                .map(|t| quantity(t, "total_amount"))
                .transpose()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: Decimal,
    unit_price: Option<Decimal>,
    notes: Option<String>,
    line_no: i32,
}

impl<'r> FromRow<'r, PgRow> for OrderItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderItemRow {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            notes: row.try_get("notes")?,
            line_no: row.try_get("line_no")?,
        })
    }
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StoreError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(OrderItem {
            id: OrderItemId::from_uuid(row.id),
            order_id: OrderId::from_uuid(row.order_id),
            product_id: ProductId::from_uuid(row.product_id),
            quantity: quantity(row.quantity, "quantity")?,
            unit_price: row
                .unit_price
                .map(|p| quantity(p, "unit_price"))
                .transpose()?,
            notes: row.notes,
            line_no: row.line_no as u32,
        })
    }
}

#[derive(Debug)]
struct TransactionRow {
    id: Uuid,
    product_id: Uuid,
    owner_id: Uuid,
    transaction_type: String,
    amount: Decimal,
    previous_stock: Decimal,
    new_stock: Decimal,
    notes: Option<String>,
    order_id: Option<Uuid>,
    order_item_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for TransactionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TransactionRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            owner_id: row.try_get("owner_id")?,
            transaction_type: row.try_get("transaction_type")?,
            amount: row.try_get("amount")?,
            previous_stock: row.try_get("previous_stock")?,
            new_stock: row.try_get("new_stock")?,
            notes: row.try_get("notes")?,
            order_id: row.try_get("order_id")?,
            order_item_id: row.try_get("order_item_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<TransactionRow> for StockTransaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(StockTransaction {
            id: TransactionId::from_uuid(row.id),
            product_id: ProductId::from_uuid(row.product_id),
            owner_id: UserId::from_uuid(row.owner_id),
            transaction_type: parse_column(&row.transaction_type, "transaction_type")?,
            amount: quantity(row.amount, "amount")?,
            previous_stock: quantity(row.previous_stock, "previous_stock")?,
            new_stock: quantity(row.new_stock, "new_stock")?,
            notes: row.notes,
            order_id: row.order_id.map(OrderId::from_uuid),
            order_item_id: row.order_item_id.map(OrderItemId::from_uuid),
            created_at: row.created_at,
        })
    }
}

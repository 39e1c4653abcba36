//! Order fulfillment: complete a purchase order and credit its lines to stock.
//!
//! ```text
//! complete_order(order)
//!   ↓
//! 1. Load order + lines, and the ledger rows already written for it
//!   ↓
//! 2. Check status (open, or completed with uncredited lines = resume)
//!   ↓
//! 3. Plan one `add` per uncredited line, in line order, against a
//!    running per-product baseline (duplicate products accumulate)
//!   ↓
//! 4a. Store offers an atomic batch: status + stock + ledger in one unit;
//!     on conflict reload and re-plan
//! 4b. Otherwise: CAS status to completed, then credit line by line with
//!     per-line CAS retries; report what could not be credited
//! ```
//!
//! Every ledger row written here carries its `order_item_id`, and the store
//! refuses a second row for the same line, so retries never double-credit.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use stockroom_auth::{IdentityProvider, require_identity};
use stockroom_core::{OrderId, OrderItemId, ProductId, Quantity, UserId};
use stockroom_inventory::{NewStockTransaction, StockChange, StockTransaction};
use stockroom_purchasing::{OrderItem, OrderPatch, OrderStatus, OrderWithItems};

use crate::config::RetryPolicy;
use crate::store::{FulfillmentBatch, RecordStore, StoreError};

use super::error::FulfillmentError;

/// Outcome of a successful completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FulfillmentReceipt {
    pub order_id: OrderId,
    /// `true` when the order was already `completed` and only missing credits were written.
    pub resumed: bool,
    /// Ledger rows written by this call, in line order.
    pub transactions: Vec<StockTransaction>,
}

/// One planned credit.
#[derive(Debug, Clone)]
struct PlannedCredit {
    item_id: OrderItemId,
    product_id: ProductId,
    quantity: Quantity,
    change: StockChange,
}

impl PlannedCredit {
    fn entry(&self, order_id: OrderId) -> NewStockTransaction {
        NewStockTransaction::order_credit(self.product_id, self.change, order_id, self.item_id)
    }
}

enum Attempt {
    Done(FulfillmentReceipt),
    Retry(String),
}

#[derive(Debug)]
pub struct FulfillmentEngine<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S> FulfillmentEngine<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> FulfillmentEngine<S>
where
    S: RecordStore,
{
    /// Mark the order `completed` and add every line's quantity to its product's stock.
    ///
    /// Errors:
    /// - `NotAuthenticated` when nobody is signed in (nothing is read)
    /// - `NotFound` when the order (or a referenced product) is not visible
    /// - `InvalidStateTransition` for cancelled orders, fully credited
    ///   completed orders, and orders without lines
    /// - `PartialFulfillment` when some lines could not be credited (retryable)
    /// - `ConflictRetryExhausted` when concurrent writers kept winning
    #[instrument(skip(self, identity), fields(order_id = %order_id), err)]
    pub async fn complete_order(
        &self,
        identity: &dyn IdentityProvider,
        order_id: OrderId,
    ) -> Result<FulfillmentReceipt, FulfillmentError> {
        let owner = require_identity(identity)?.user_id();

        let mut attempt = 0;
        loop {
            attempt += 1;

            let order = self.store.get_order(owner, order_id).await?;
            let credited = self.store.credited_items(owner, order_id).await?;
            let pending = pending_items(&order, &credited)?;
            let plan = self.plan_credits(owner, &pending).await?;

            let outcome = if self.store.supports_atomic_fulfillment() {
                self.commit_atomically(owner, &order, plan).await?
            } else {
                self.commit_resumable(owner, &order, &credited, plan).await?
            };

            match outcome {
                Attempt::Done(receipt) => {
                    info!(
                        order_id = %order_id,
                        credited = receipt.transactions.len(),
                        resumed = receipt.resumed,
                        "order completed"
                    );
                    return Ok(receipt);
                }
                Attempt::Retry(reason) if self.retry.should_retry(attempt) => {
                    warn!(order_id = %order_id, attempt, %reason, "fulfillment conflicted; retrying");
                    tokio::task::yield_now().await;
                }
                Attempt::Retry(reason) => {
                    warn!(order_id = %order_id, attempt, %reason, "fulfillment retry budget exhausted");
                    return Err(FulfillmentError::ConflictRetryExhausted { attempts: attempt });
                }
            }
        }
    }

    /// Compute each line's credit against a running per-product baseline.
    async fn plan_credits(
        &self,
        owner: UserId,
        pending: &[&OrderItem],
    ) -> Result<Vec<PlannedCredit>, FulfillmentError> {
        let mut baseline: HashMap<ProductId, Quantity> = HashMap::new();
        let mut plan = Vec::with_capacity(pending.len());

        for item in pending {
            let previous = match baseline.get(&item.product_id) {
                Some(stock) => *stock,
                None => self.store.get_product(owner, item.product_id).await?.current_stock,
            };
            let change = StockChange::credit(previous, item.quantity)?;
            baseline.insert(item.product_id, change.new_stock());
            plan.push(PlannedCredit {
                item_id: item.id,
                product_id: item.product_id,
                quantity: item.quantity,
                change,
            });
        }
        Ok(plan)
    }

    async fn commit_atomically(
        &self,
        owner: UserId,
        order: &OrderWithItems,
        plan: Vec<PlannedCredit>,
    ) -> Result<Attempt, FulfillmentError> {
        let batch = FulfillmentBatch {
            order_id: order.id(),
            expected_status: order.status(),
            credits: plan.iter().map(|p| p.entry(order.id())).collect(),
        };

        match self.store.commit_fulfillment(owner, batch).await {
            Ok(transactions) => Ok(Attempt::Done(FulfillmentReceipt {
                order_id: order.id(),
                resumed: order.status() == OrderStatus::Completed,
                transactions,
            })),
            // Someone else moved stock, the status, or credited a line first.
            Err(StoreError::Conflict(reason)) | Err(StoreError::Duplicate(reason)) => {
                Ok(Attempt::Retry(reason))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn commit_resumable(
        &self,
        owner: UserId,
        order: &OrderWithItems,
        already_credited: &HashSet<OrderItemId>,
        plan: Vec<PlannedCredit>,
    ) -> Result<Attempt, FulfillmentError> {
        let order_id = order.id();
        let resumed = order.status() == OrderStatus::Completed;

        if !resumed {
            match self
                .store
                .update_order(
                    owner,
                    order_id,
                    order.status(),
                    OrderPatch::status(OrderStatus::Completed),
                )
                .await
            {
                Ok(_) => {}
                Err(StoreError::Conflict(reason)) => return Ok(Attempt::Retry(reason)),
                Err(e) => return Err(e.into()),
            }
        }

        let mut credited: HashSet<OrderItemId> = already_credited.clone();
        let mut transactions = Vec::with_capacity(plan.len());
        let mut first_failure: Option<String> = None;

        for credit in plan {
            match self.credit_line(owner, order_id, credit).await {
                Ok(CreditOutcome::Written(tx)) => {
                    if let Some(item_id) = tx.order_item_id {
                        credited.insert(item_id);
                    }
                    transactions.push(tx);
                }
                Ok(CreditOutcome::AlreadyCredited(item_id)) => {
                    credited.insert(item_id);
                }
                Err(e) => {
                    warn!(order_id = %order_id, error = %e, "order line not credited");
                    first_failure.get_or_insert_with(|| e.to_string());
                }
            }
        }

        if let Some(reason) = first_failure {
            let (credited_products, uncredited_products) = split_products(order, &credited);
            error!(
                order_id = %order_id,
                credited = credited_products.len(),
                uncredited = uncredited_products.len(),
                %reason,
                "order completed but stock only partially credited"
            );
            return Err(FulfillmentError::PartialFulfillment {
                order_id,
                credited: credited_products,
                uncredited: uncredited_products,
                reason,
            });
        }

        Ok(Attempt::Done(FulfillmentReceipt {
            order_id,
            resumed,
            transactions,
        }))
    }

    /// Credit one line, re-reading the product's stock after each CAS conflict.
    async fn credit_line(
        &self,
        owner: UserId,
        order_id: OrderId,
        mut credit: PlannedCredit,
    ) -> Result<CreditOutcome, FulfillmentError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.apply_stock_change(owner, credit.entry(order_id)).await {
                Ok(tx) => return Ok(CreditOutcome::Written(tx)),
                Err(StoreError::Duplicate(_)) => {
                    return Ok(CreditOutcome::AlreadyCredited(credit.item_id));
                }
                Err(StoreError::Conflict(_)) if self.retry.should_retry(attempt) => {
                    tokio::task::yield_now().await;
                    let current = self.store.get_product(owner, credit.product_id).await?;
                    credit.change = StockChange::credit(current.current_stock, credit.quantity)?;
                }
                Err(StoreError::Conflict(_)) => {
                    return Err(FulfillmentError::ConflictRetryExhausted { attempts: attempt });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

enum CreditOutcome {
    Written(StockTransaction),
    /// Another completion credited this line first.
    AlreadyCredited(OrderItemId),
}

/// Lines still to credit, after checking the order may be (re)completed.
fn pending_items<'a>(
    order: &'a OrderWithItems,
    credited: &HashSet<OrderItemId>,
) -> Result<Vec<&'a OrderItem>, FulfillmentError> {
    let mut items: Vec<&OrderItem> = order
        .items
        .iter()
        .filter(|i| !credited.contains(&i.id))
        .collect();
    items.sort_by_key(|i| i.line_no);

    match order.status() {
        OrderStatus::Cancelled => Err(FulfillmentError::InvalidStateTransition(
            "order is cancelled; it cannot be completed".to_string(),
        )),
        OrderStatus::Completed if items.is_empty() => Err(FulfillmentError::InvalidStateTransition(
            "order is already completed".to_string(),
        )),
        _ if order.items.is_empty() => Err(FulfillmentError::InvalidStateTransition(
            "order has no items to receive".to_string(),
        )),
        _ => Ok(items),
    }
}

/// Partition the order's products: fully credited vs. at least one line missing.
fn split_products(
    order: &OrderWithItems,
    credited: &HashSet<OrderItemId>,
) -> (Vec<ProductId>, Vec<ProductId>) {
    order.product_ids().into_iter().partition(|product_id| {
        order
            .items
            .iter()
            .filter(|i| i.product_id == *product_id)
            .all(|i| credited.contains(&i.id))
    })
}

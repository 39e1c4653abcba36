//! Manual stock adjustments.

use serde::Serialize;
use tracing::{info, instrument, warn};

use stockroom_auth::{IdentityProvider, require_identity};
use stockroom_core::{ProductId, Quantity};
use stockroom_inventory::{NewStockTransaction, StockChange, StockTransaction, TransactionType};

use crate::config::RetryPolicy;
use crate::store::{RecordStore, StoreError};

use super::error::StockError;

/// Result of a successful adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockAdjustment {
    pub new_stock: Quantity,
    pub transaction: StockTransaction,
}

#[derive(Debug)]
pub struct StockService<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S> StockService<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }
}

impl<S> StockService<S>
where
    S: RecordStore,
{
    /// Add to or take from a product's stock, recording one ledger row.
    ///
    /// The write is a compare-and-set on the stock just read; on conflict the
    /// product is re-read and the change recomputed, so concurrent callers
    /// never lose updates and `use` never drives stock below zero.
    #[instrument(
        skip(self, identity, notes),
        fields(product_id = %product_id, direction = %direction, amount = %amount),
        err
    )]
    pub async fn adjust_stock(
        &self,
        identity: &dyn IdentityProvider,
        product_id: ProductId,
        direction: TransactionType,
        amount: Quantity,
        notes: Option<String>,
    ) -> Result<StockAdjustment, StockError> {
        let owner = require_identity(identity)?.user_id();
        if amount.is_zero() {
            return Err(StockError::Validation("amount must be greater than zero".to_string()));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            let product = self.store.get_product(owner, product_id).await?;
            let change = StockChange::compute(product.current_stock, direction, amount)?;
            let entry = NewStockTransaction::manual(product_id, change, notes.clone());

            match self.store.apply_stock_change(owner, entry).await {
                Ok(transaction) => {
                    info!(
                        product_id = %product_id,
                        previous_stock = %transaction.previous_stock,
                        new_stock = %transaction.new_stock,
                        "stock adjusted"
                    );
                    return Ok(StockAdjustment {
                        new_stock: transaction.new_stock,
                        transaction,
                    });
                }
                Err(StoreError::Conflict(reason)) if self.retry.should_retry(attempt) => {
                    warn!(product_id = %product_id, attempt, %reason, "stock write conflicted; retrying");
                    tokio::task::yield_now().await;
                }
                Err(StoreError::Conflict(reason)) => {
                    warn!(product_id = %product_id, attempt, %reason, "stock write retry budget exhausted");
                    return Err(StockError::ConflictRetryExhausted { attempts: attempt });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

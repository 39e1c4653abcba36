//! Read-side filters for listing records.
//!
//! All queries are owner-scoped by the store method that takes them.

use serde::{Deserialize, Serialize};

use stockroom_core::{OrderId, ProductId};
use stockroom_purchasing::OrderStatus;

/// Filter for `RecordStore::list_products`. Results are ordered by name (ascending).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductQuery {
    /// Only products with `current_stock <= min_stock_alert`.
    #[serde(default)]
    pub low_stock_only: bool,
}

impl ProductQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn low_stock() -> Self {
        Self {
            low_stock_only: true,
        }
    }
}

/// Filter for `RecordStore::list_orders`. Results are newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQuery {
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

impl OrderQuery {
    pub fn with_status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
        }
    }
}

/// Filter for `RecordStore::list_transactions`. Results are newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionQuery {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 1000;

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            product_id: None,
            order_id: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl TransactionQuery {
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    /// Ledger rows produced for an order, up to the 1000-row cap.
    ///
    /// Use `RecordStore::credited_items` when every credited line is needed.
    pub fn for_order(order_id: OrderId) -> Self {
        Self {
            order_id: Some(order_id),
            limit: MAX_LIMIT,
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Limit clamped to `1..=1000`.
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_LIMIT) as usize
    }
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use stockroom_core::{ProductId, Quantity};
use stockroom_inventory::{Product, TransactionType, Unit};
use stockroom_purchasing::{OrderStatus, OrderWithItems};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Quantity,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTrackingRequest {
    #[serde(default)]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

/// `?status=` is kept raw so an unknown value is a 400 with a message.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

/// A product plus its derived low-stock flag.
#[derive(Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub is_low_stock: bool,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self {
            is_low_stock: product.is_low_stock(),
            product,
        }
    }
}

pub fn product_views(products: Vec<Product>) -> Vec<ProductView> {
    products.into_iter().map(ProductView::from).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub unit: Unit,
}

/// An order listing row: the order, its lines, and the products they reference.
#[derive(Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: OrderWithItems,
    pub products: Vec<ProductSummary>,
}

pub fn order_views(orders: Vec<OrderWithItems>, catalogue: &[Product]) -> Vec<OrderView> {
    let by_id: HashMap<ProductId, &Product> = catalogue.iter().map(|p| (p.id, p)).collect();
    orders
        .into_iter()
        .map(|order| {
            let products = order
                .product_ids()
                .into_iter()
                .filter_map(|id| by_id.get(&id))
                .map(|p| ProductSummary {
                    id: p.id,
                    name: p.name.clone(),
                    unit: p.unit,
                })
                .collect();
            OrderView { order, products }
        })
        .collect()
}

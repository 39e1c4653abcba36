use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{
    DomainError, DomainResult, Entity, OrderId, OrderItemId, ProductId, Quantity, UserId,
};

/// Purchase order status lifecycle.
///
/// `Completed` and `Cancelled` are absorbing: no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Allowed forward moves. Any open status may jump straight to
    /// `Completed` or `Cancelled`; nothing moves backwards.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Completed | Cancelled, _) => false,
            (_, Completed | Cancelled) => true,
            (Pending, Shipped | Delivered) => true,
            (Shipped, Delivered) => true,
            _ => false,
        }
    }

    pub fn ensure_transition(&self, next: OrderStatus) -> DomainResult<()> {
        if self.can_transition_to(next) {
            return Ok(());
        }
        if self.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "order is already {self}; no further changes are allowed"
            )));
        }
        Err(DomainError::invalid_transition(format!(
            "cannot move order from {self} to {next}"
        )))
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{s}'")))
    }
}

/// Supplier purchase order header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner_id: UserId,
    pub supplier_name: String,
    pub order_date: NaiveDate,
    pub expected_arrival_date: Option<NaiveDate>,
    pub tracking_number: Option<String>,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub total_amount: Option<Quantity>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Tracking number and notes may only change while the order is open.
    pub fn ensure_mutable(&self) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "order is {}; it can no longer be modified",
                self.status
            )));
        }
        Ok(())
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> OrderId {
        self.id
    }

    fn owner_id(&self) -> UserId {
        self.owner_id
    }
}

/// One product/quantity line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub unit_price: Option<Quantity>,
    pub notes: Option<String>,
    /// 1-based insertion position; fulfillment processes lines in this order.
    pub line_no: u32,
}


/// An order loaded together with its lines (sorted by `line_no`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderWithItems {
    pub fn id(&self) -> OrderId {
        self.order.id
    }

    pub fn status(&self) -> OrderStatus {
        self.order.status
    }

    /// Distinct products referenced by the order, in first-appearance order.
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids = Vec::new();
        for item in &self.items {
            if !ids.contains(&item.product_id) {
                ids.push(item.product_id);
            }
        }
        ids
    }
}

/// Input for one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: Quantity,
    #[serde(default)]
    pub unit_price: Option<Quantity>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewOrderItem {
    pub fn new(product_id: ProductId, quantity: Quantity) -> Self {
        Self {
            product_id,
            quantity,
            unit_price: None,
            notes: None,
        }
    }

    pub fn with_unit_price(mut self, price: Quantity) -> Self {
        self.unit_price = Some(price);
        self
    }

    /// `quantity * unit_price`; a missing price counts as zero.
    pub fn line_total(&self) -> DomainResult<Quantity> {
        match self.unit_price {
            Some(price) => self
                .quantity
                .checked_mul(price)
                .ok_or_else(|| DomainError::validation("line total is out of range")),
            None => Ok(Quantity::ZERO),
        }
    }
}

/// Input for creating an order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub supplier_name: String,
    /// Defaults to the creation date.
    #[serde(default)]
    pub order_date: Option<NaiveDate>,
    #[serde(default)]
    pub expected_arrival_date: Option<NaiveDate>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    pub fn new(supplier_name: impl Into<String>, items: Vec<NewOrderItem>) -> Self {
        Self {
            supplier_name: supplier_name.into(),
            order_date: None,
            expected_arrival_date: None,
            tracking_number: None,
            notes: None,
            items,
        }
    }

    /// Normalize and validate form input.
    pub fn validate(mut self) -> DomainResult<Self> {
        self.supplier_name = self.supplier_name.trim().to_string();
        if self.supplier_name.is_empty() {
            return Err(DomainError::validation("supplier name is required"));
        }
        if self.items.is_empty() {
            return Err(DomainError::validation("at least one item is required"));
        }
        for (idx, item) in self.items.iter_mut().enumerate() {
            if item.quantity.is_zero() {
                return Err(DomainError::validation(format!(
                    "quantity must be greater than 0 for item {}",
                    idx + 1
                )));
            }
            item.notes = normalize_optional(item.notes.take());
        }
        self.total_amount()?;
        self.tracking_number = normalize_optional(self.tracking_number);
        self.notes = normalize_optional(self.notes);
        Ok(self)
    }

    /// Sum of line totals; lines without a price contribute zero.
    ///
    /// Fails when a line total or the sum leaves the decimal range.
    pub fn total_amount(&self) -> DomainResult<Quantity> {
        self.items.iter().try_fold(Quantity::ZERO, |acc, item| {
            acc.checked_add(item.line_total()?)
                .ok_or_else(|| DomainError::validation("order total is out of range"))
        })
    }

    /// Build the stored header and lines. Status always starts `Pending`.
    ///
    /// `total_amount` is left empty for input [`NewOrder::validate`] would reject.
    pub fn into_records(self, id: OrderId, owner_id: UserId, now: DateTime<Utc>) -> OrderWithItems {
        let total = self.total_amount().ok();
        let order = Order {
            id,
            owner_id,
            supplier_name: self.supplier_name,
            order_date: self.order_date.unwrap_or_else(|| now.date_naive()),
            expected_arrival_date: self.expected_arrival_date,
            tracking_number: self.tracking_number,
            status: OrderStatus::Pending,
            notes: self.notes,
            total_amount: total,
            created_at: now,
            updated_at: now,
        };

        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| OrderItem {
                id: OrderItemId::new(),
                order_id: id,
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                notes: item.notes,
                line_no: idx as u32 + 1,
            })
            .collect();

        OrderWithItems { order, items }
    }
}

/// Partial update of an order header.
///
/// Setting `Completed` is reserved for the fulfillment workflow, which credits
/// stock in the same step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            tracking_number: None,
        }
    }

    pub fn tracking_number(tracking: impl Into<String>) -> Self {
        Self {
            status: None,
            tracking_number: Some(tracking.into()),
        }
    }

    pub fn apply_to(&self, order: &mut Order, now: DateTime<Utc>) -> DomainResult<()> {
        order.ensure_mutable()?;
        if let Some(next) = self.status {
            order.status.ensure_transition(next)?;
            order.status = next;
        }
        if let Some(tracking) = &self.tracking_number {
            order.tracking_number = normalize_optional(Some(tracking.clone()));
        }
        order.updated_at = now;
        Ok(())
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

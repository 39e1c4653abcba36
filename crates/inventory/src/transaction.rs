use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{
    DomainError, DomainResult, Entity, OrderId, OrderItemId, ProductId, Quantity, TransactionId,
    UserId,
};

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Add,
    Use,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Add => "add",
            TransactionType::Use => "use",
        }
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "add" => Ok(TransactionType::Add),
            "use" => Ok(TransactionType::Use),
            other => Err(DomainError::validation(format!(
                "transaction type must be 'add' or 'use' (got '{other}')"
            ))),
        }
    }
}

/// A validated stock movement: the before/after pair for one product.
///
/// Invariants (enforced by construction):
/// - `amount > 0`
/// - `Add`: `new_stock = previous_stock + amount`
/// - `Use`: `new_stock = previous_stock - amount`, and never below zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockChange {
    transaction_type: TransactionType,
    amount: Quantity,
    previous_stock: Quantity,
    new_stock: Quantity,
}

impl StockChange {
    pub fn compute(
        previous_stock: Quantity,
        transaction_type: TransactionType,
        amount: Quantity,
    ) -> DomainResult<Self> {
        if amount.is_zero() {
            return Err(DomainError::validation("amount must be greater than zero"));
        }

        let new_stock = match transaction_type {
            TransactionType::Add => previous_stock
                .checked_add(amount)
                .ok_or_else(|| DomainError::invariant("stock overflow"))?,
            TransactionType::Use => previous_stock.checked_sub(amount).ok_or_else(|| {
                DomainError::InsufficientStock {
                    available: previous_stock.to_string(),
                    requested: amount.to_string(),
                }
            })?,
        };

        Ok(Self {
            transaction_type,
            amount,
            previous_stock,
            new_stock,
        })
    }

    /// Incoming goods: always an `Add`.
    pub fn credit(previous_stock: Quantity, amount: Quantity) -> DomainResult<Self> {
        Self::compute(previous_stock, TransactionType::Add, amount)
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn amount(&self) -> Quantity {
        self.amount
    }

    pub fn previous_stock(&self) -> Quantity {
        self.previous_stock
    }

    pub fn new_stock(&self) -> Quantity {
        self.new_stock
    }
}

/// Append-only ledger entry describing one stock change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: TransactionId,
    pub product_id: ProductId,
    pub owner_id: UserId,
    pub transaction_type: TransactionType,
    pub amount: Quantity,
    pub previous_stock: Quantity,
    pub new_stock: Quantity,
    pub notes: Option<String>,
    /// Order whose completion produced this entry, if any.
    pub order_id: Option<OrderId>,
    /// Order line credited by this entry; unique across the ledger.
    pub order_item_id: Option<OrderItemId>,
    pub created_at: DateTime<Utc>,
}

impl StockTransaction {
    /// Re-check the arithmetic invariant of a stored entry.
    pub fn is_consistent(&self) -> bool {
        StockChange::compute(self.previous_stock, self.transaction_type, self.amount)
            .map(|c| c.new_stock() == self.new_stock)
            .unwrap_or(false)
    }
}

impl Entity for StockTransaction {
    type Id = TransactionId;

    fn id(&self) -> TransactionId {
        self.id
    }

    fn owner_id(&self) -> UserId {
        self.owner_id
    }
}

/// A ledger entry ready to be appended (id and timestamp assigned by the store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStockTransaction {
    pub product_id: ProductId,
    pub change: StockChange,
    pub notes: Option<String>,
    pub order_id: Option<OrderId>,
    pub order_item_id: Option<OrderItemId>,
}

impl NewStockTransaction {
    /// Manual adjustment entry.
    pub fn manual(product_id: ProductId, change: StockChange, notes: Option<String>) -> Self {
        Self {
            product_id,
            change,
            notes: notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            order_id: None,
            order_item_id: None,
        }
    }

    /// Entry crediting one line of a completed order.
    pub fn order_credit(
        product_id: ProductId,
        change: StockChange,
        order_id: OrderId,
        order_item_id: OrderItemId,
    ) -> Self {
        Self {
            product_id,
            change,
            notes: Some(format!("Order completion - Order ID: {order_id}")),
            order_id: Some(order_id),
            order_item_id: Some(order_item_id),
        }
    }

    pub fn into_record(
        self,
        id: TransactionId,
        owner_id: UserId,
        now: DateTime<Utc>,
    ) -> StockTransaction {
        StockTransaction {
            id,
            product_id: self.product_id,
            owner_id,
            transaction_type: self.change.transaction_type(),
            amount: self.change.amount(),
            previous_stock: self.change.previous_stock(),
            new_stock: self.change.new_stock(),
            notes: self.notes,
            order_id: self.order_id,
            order_item_id: self.order_item_id,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    #[test]
    fn add_increases_stock() {
        let c = StockChange::compute(q("10"), TransactionType::Add, q("5")).unwrap();
        assert_eq!(c.previous_stock(), q("10"));
        assert_eq!(c.new_stock(), q("15"));
        assert_eq!(c.amount(), q("5"));
    }

    #[test]
    fn use_decreases_stock_down_to_zero() {
        let c = StockChange::compute(q("2.5"), TransactionType::Use, q("2.5")).unwrap();
        assert_eq!(c.new_stock(), Quantity::ZERO);
    }

    #[test]
    fn use_beyond_stock_is_insufficient() {
        let err = StockChange::compute(q("1"), TransactionType::Use, q("1.001")).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                available: "1".into(),
                requested: "1.001".into(),
            }
        );
    }

    #[test]
    fn zero_amount_is_rejected() {
        assert!(StockChange::compute(q("1"), TransactionType::Add, Quantity::ZERO).is_err());
    }

    #[test]
    fn order_credit_note_references_order() {
        let order_id = OrderId::new();
        let change = StockChange::credit(q("10"), q("5")).unwrap();
        let tx = NewStockTransaction::order_credit(ProductId::new(), change, order_id, OrderItemId::new());
        assert_eq!(
            tx.notes.as_deref(),
            Some(format!("Order completion - Order ID: {order_id}").as_str())
        );
    }

    #[test]
    fn manual_entry_drops_blank_notes() {
        let change = StockChange::credit(q("0"), q("1")).unwrap();
        let tx = NewStockTransaction::manual(ProductId::new(), change, Some("  ".into()));
        assert_eq!(tx.notes, None);
    }

    #[test]
    fn record_keeps_change_fields() {
        let change = StockChange::compute(q("8"), TransactionType::Use, q("3")).unwrap();
        let owner = UserId::new();
        let record = NewStockTransaction::manual(ProductId::new(), change, Some("bake day".into()))
            .into_record(TransactionId::new(), owner, Utc::now());
        assert_eq!(record.transaction_type, TransactionType::Use);
        assert_eq!(record.previous_stock, q("8"));
        assert_eq!(record.new_stock, q("5"));
        assert_eq!(record.owner_id, owner);
        assert!(record.is_consistent());
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use rust_decimal::Decimal;

        fn qty(milli: i64) -> Quantity {
            Quantity::new(Decimal::new(milli, 3)).unwrap()
        }

        proptest! {
            /// Property: a successful change always satisfies the ledger arithmetic.
            #[test]
            fn change_matches_ledger_arithmetic(
                prev in 0i64..5_000_000,
                amount in 1i64..5_000_000,
                add in any::<bool>(),
            ) {
                let kind = if add { TransactionType::Add } else { TransactionType::Use };
                match StockChange::compute(qty(prev), kind, qty(amount)) {
                    Ok(c) => {
                        let delta = c.new_stock().value() - c.previous_stock().value();
                        match kind {
                            TransactionType::Add => prop_assert_eq!(delta, c.amount().value()),
                            TransactionType::Use => prop_assert_eq!(-delta, c.amount().value()),
                        }
                        prop_assert!(c.new_stock().value() >= Decimal::ZERO);
                    }
                    Err(DomainError::InsufficientStock { .. }) => {
                        prop_assert!(kind == TransactionType::Use && amount > prev);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {other:?}"),
                }
            }
        }
    }
}

//! Inventory domain module: products, units, and the stock ledger.
//!
//! This crate contains business rules for inventory, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod product;
pub mod transaction;

pub use product::{NewProduct, Product, ProductPatch, Unit};
pub use transaction::{NewStockTransaction, StockChange, StockTransaction, TransactionType};

//! Record store boundary.
//!
//! Owner-scoped persistence for products, purchase orders and the append-only
//! stock ledger, with compare-and-set stock writes.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub use query::{OrderQuery, ProductQuery, TransactionQuery};
pub use r#trait::{FulfillmentBatch, RecordStore, StoreError};

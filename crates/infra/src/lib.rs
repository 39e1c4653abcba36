//! Infrastructure layer: record stores, application services, config.

pub mod config;
pub mod services;
pub mod store;

mod integration_tests;

pub use config::{ConfigError, RetryPolicy, StockroomConfig, StoreBackend};
pub use services::{
    FulfillmentEngine, FulfillmentError, FulfillmentReceipt, OrderService, ProductService,
    ServiceError, StockAdjustment, StockError, StockService,
};
pub use store::{
    FulfillmentBatch, InMemoryRecordStore, OrderQuery, PostgresRecordStore, ProductQuery,
    RecordStore, StoreError, TransactionQuery,
};

//! Application services: the operations exposed to request handlers.
//!
//! Each service resolves the acting identity first (failing closed when nobody
//! is signed in) and passes it as the owner on every store call.

pub mod error;
pub mod fulfillment;
pub mod orders;
pub mod products;
pub mod stock;

pub use error::{FulfillmentError, ServiceError, StockError};
pub use fulfillment::{FulfillmentEngine, FulfillmentReceipt};
pub use orders::OrderService;
pub use products::ProductService;
pub use stock::{StockAdjustment, StockService};

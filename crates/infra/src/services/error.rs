use thiserror::Error;

use stockroom_auth::AuthError;
use stockroom_core::{DomainError, OrderId, ProductId};

use crate::store::StoreError;

/// Why an order could not be (fully) completed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FulfillmentError {
    #[error("not authenticated")]
    NotAuthenticated,

    /// The order, or a product it references, is missing or not visible.
    #[error("not found")]
    NotFound,

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// The order is `completed` but some lines were not credited. Calling
    /// `complete_order` again credits only the missing lines.
    #[error(
        "order {order_id} partially fulfilled ({} product(s) credited, {} not yet credited): {reason}",
        .credited.len(),
        .uncredited.len()
    )]
    PartialFulfillment {
        order_id: OrderId,
        credited: Vec<ProductId>,
        uncredited: Vec<ProductId>,
        reason: String,
    },

    #[error("stock changed concurrently {attempts} times; giving up")]
    ConflictRetryExhausted { attempts: u32 },

    #[error("domain rule violated: {0}")]
    Domain(DomainError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<AuthError> for FulfillmentError {
    fn from(_: AuthError) -> Self {
        FulfillmentError::NotAuthenticated
    }
}

impl From<DomainError> for FulfillmentError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidStateTransition(msg) => FulfillmentError::InvalidStateTransition(msg),
            DomainError::NotFound => FulfillmentError::NotFound,
            other => FulfillmentError::Domain(other),
        }
    }
}

impl From<StoreError> for FulfillmentError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => FulfillmentError::NotFound,
            StoreError::Domain(e) => e.into(),
            other => FulfillmentError::Store(other),
        }
    }
}

/// Why a manual stock adjustment was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("product not found")]
    NotFound,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: String, requested: String },

    #[error("stock changed concurrently {attempts} times; giving up")]
    ConflictRetryExhausted { attempts: u32 },

    #[error(transparent)]
    Store(StoreError),
}

impl From<AuthError> for StockError {
    fn from(_: AuthError) -> Self {
        StockError::NotAuthenticated
    }
}

impl From<DomainError> for StockError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InsufficientStock {
                available,
                requested,
            } => StockError::InsufficientStock {
                available,
                requested,
            },
            DomainError::NotFound => StockError::NotFound,
            DomainError::Validation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidStateTransition(msg) => StockError::Validation(msg),
        }
    }
}

impl From<StoreError> for StockError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => StockError::NotFound,
            StoreError::Domain(e) => e.into(),
            other => StockError::Store(other),
        }
    }
}

/// Error from the product and order services.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("not found")]
    NotFound,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Concurrent modification, or a record still referenced elsewhere.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<AuthError> for ServiceError {
    fn from(_: AuthError) -> Self {
        ServiceError::NotAuthenticated
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidStateTransition(msg) => ServiceError::InvalidStateTransition(msg),
            DomainError::NotFound => ServiceError::NotFound,
            DomainError::InsufficientStock { .. } => ServiceError::Validation(value.to_string()),
            DomainError::Validation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::InvariantViolation(msg) => ServiceError::Validation(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::Conflict(msg) | StoreError::InUse(msg) | StoreError::Duplicate(msg) => {
                ServiceError::Conflict(msg)
            }
            StoreError::Domain(e) => e.into(),
            other => ServiceError::Store(other),
        }
    }
}

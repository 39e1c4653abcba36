use std::sync::Arc;

use stockroom_infra::{OrderService, ProductService, RecordStore, RetryPolicy, StockService};

/// Store handle shared by every service.
pub type SharedStore = Arc<dyn RecordStore>;

/// Application services available to handlers.
pub struct AppServices {
    pub products: ProductService<SharedStore>,
    pub stock: StockService<SharedStore>,
    pub orders: OrderService<SharedStore>,
}

impl AppServices {
    pub fn new(store: SharedStore, retry: RetryPolicy) -> Self {
        Self {
            products: ProductService::new(store.clone()),
            stock: StockService::new(store.clone(), retry),
            orders: OrderService::new(store, retry),
        }
    }
}

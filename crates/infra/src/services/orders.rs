use tracing::{info, instrument};

use stockroom_auth::{IdentityProvider, require_identity};
use stockroom_core::OrderId;
use stockroom_purchasing::{NewOrder, OrderPatch, OrderStatus, OrderWithItems};

use crate::config::RetryPolicy;
use crate::store::{OrderQuery, RecordStore};

use super::error::ServiceError;
use super::fulfillment::{FulfillmentEngine, FulfillmentReceipt};

/// Purchase order operations for the signed-in user.
///
/// Moving an order to `completed` always goes through the
/// [`FulfillmentEngine`], so stock is credited with it.
#[derive(Debug)]
pub struct OrderService<S> {
    engine: FulfillmentEngine<S>,
}

impl<S> OrderService<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self {
            engine: FulfillmentEngine::new(store, retry),
        }
    }

    fn store(&self) -> &S {
        self.engine.store()
    }
}

impl<S> OrderService<S>
where
    S: RecordStore,
{
    /// Create an order with its lines. Status starts `pending`.
    #[instrument(skip(self, identity, input), fields(item_count = input.items.len()), err)]
    pub async fn create(
        &self,
        identity: &dyn IdentityProvider,
        input: NewOrder,
    ) -> Result<OrderWithItems, ServiceError> {
        let owner = require_identity(identity)?.user_id();
        let input = input.validate()?;
        let order = self.store().create_order(owner, input).await?;
        info!(order_id = %order.id(), items = order.items.len(), "order created");
        Ok(order)
    }

    #[instrument(skip(self, identity), fields(order_id = %id), err)]
    pub async fn get(
        &self,
        identity: &dyn IdentityProvider,
        id: OrderId,
    ) -> Result<OrderWithItems, ServiceError> {
        let owner = require_identity(identity)?.user_id();
        Ok(self.store().get_order(owner, id).await?)
    }

    /// Orders newest first, optionally only those in `status`.
    #[instrument(skip(self, identity), err)]
    pub async fn list(
        &self,
        identity: &dyn IdentityProvider,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderWithItems>, ServiceError> {
        let owner = require_identity(identity)?.user_id();
        Ok(self.store().list_orders(owner, OrderQuery { status }).await?)
    }

    /// Move an order to `status`.
    ///
    /// `completed` is handed to the fulfillment engine; every other target
    /// is a compare-and-set on the status just read.
    #[instrument(skip(self, identity), fields(order_id = %id, status = %status), err)]
    pub async fn update_status(
        &self,
        identity: &dyn IdentityProvider,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderWithItems, ServiceError> {
        let owner = require_identity(identity)?.user_id();

        if status == OrderStatus::Completed {
            self.engine.complete_order(identity, id).await?;
            return Ok(self.store().get_order(owner, id).await?);
        }

        let current = self.store().get_order(owner, id).await?;
        current.status().ensure_transition(status)?;
        let order = self
            .store()
            .update_order(owner, id, current.status(), OrderPatch::status(status))
            .await?;
        info!(order_id = %id, from = %current.status(), to = %status, "order status changed");

        Ok(OrderWithItems {
            order,
            items: current.items,
        })
    }

    /// Set or clear (blank input) the tracking number of an open order.
    #[instrument(skip(self, identity, tracking_number), fields(order_id = %id), err)]
    pub async fn update_tracking_number(
        &self,
        identity: &dyn IdentityProvider,
        id: OrderId,
        tracking_number: Option<String>,
    ) -> Result<OrderWithItems, ServiceError> {
        let owner = require_identity(identity)?.user_id();

        let current = self.store().get_order(owner, id).await?;
        current.order.ensure_mutable()?;
        let patch = OrderPatch::tracking_number(tracking_number.unwrap_or_default());
        let order = self
            .store()
            .update_order(owner, id, current.status(), patch)
            .await?;

        Ok(OrderWithItems {
            order,
            items: current.items,
        })
    }

    /// Complete the order and credit its lines to stock.
    pub async fn complete(
        &self,
        identity: &dyn IdentityProvider,
        id: OrderId,
    ) -> Result<FulfillmentReceipt, ServiceError> {
        Ok(self.engine.complete_order(identity, id).await?)
    }
}

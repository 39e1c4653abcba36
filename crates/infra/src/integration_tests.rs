//! Integration tests for the fulfillment and stock workflows.
//!
//! Tests: service → RecordStore (in-memory) → ledger
//!
//! Verifies:
//! - Completing an order credits every line exactly once, in line order
//! - Completed/cancelled/empty orders are rejected without writes
//! - Failed completions can be resumed without double-crediting
//! - Concurrent stock writes never lose updates or go negative
//! - Stock always equals the ledger's running total

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stockroom_auth::{Anonymous, Identity};
    use stockroom_core::{ProductId, Quantity, UserId};
    use stockroom_inventory::{NewProduct, Product, StockTransaction, TransactionType, Unit};
    use stockroom_purchasing::{NewOrder, NewOrderItem, OrderStatus, OrderWithItems};

    use crate::config::RetryPolicy;
    use crate::services::{
        FulfillmentEngine, FulfillmentError, OrderService, ServiceError, StockError, StockService,
    };
    use crate::store::{InMemoryRecordStore, RecordStore, StoreError, TransactionQuery};

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    fn test_identity() -> Identity {
        Identity::new(UserId::new())
    }

    struct Fixture {
        store: Arc<InMemoryRecordStore>,
        engine: FulfillmentEngine<Arc<InMemoryRecordStore>>,
        orders: OrderService<Arc<InMemoryRecordStore>>,
        identity: Identity,
    }

    impl Fixture {
        fn new(store: InMemoryRecordStore) -> Self {
            let store = Arc::new(store);
            Self {
                engine: FulfillmentEngine::new(store.clone(), RetryPolicy::default()),
                orders: OrderService::new(store.clone(), RetryPolicy::default()),
                store,
                identity: test_identity(),
            }
        }

        fn owner(&self) -> UserId {
            self.identity.user_id()
        }

        async fn product(&self, name: &str, stock: &str) -> Product {
            self.store
                .create_product(
                    self.owner(),
                    NewProduct::new(name, Unit::Kg).with_stock(q(stock)),
                )
                .await
                .unwrap()
        }

        async fn order(&self, lines: &[(ProductId, &str)]) -> OrderWithItems {
            let items = lines
                .iter()
                .map(|(id, qty)| NewOrderItem::new(*id, q(qty)))
                .collect();
            self.orders
                .create(&self.identity, NewOrder::new("Mill & Co", items))
                .await
                .unwrap()
        }

        async fn stock(&self, id: ProductId) -> Quantity {
            self.store.get_product(self.owner(), id).await.unwrap().current_stock
        }

        async fn status(&self, order: &OrderWithItems) -> OrderStatus {
            self.store
                .get_order(self.owner(), order.id())
                .await
                .unwrap()
                .status()
        }

        /// Ledger rows for the order, oldest first.
        async fn order_ledger(&self, order: &OrderWithItems) -> Vec<StockTransaction> {
            let mut rows = self
                .store
                .list_transactions(self.owner(), TransactionQuery::for_order(order.id()))
                .await
                .unwrap();
            rows.reverse();
            rows
        }

        async fn product_ledger(&self, id: ProductId) -> Vec<StockTransaction> {
            let mut rows = self
                .store
                .list_transactions(self.owner(), TransactionQuery::for_product(id).with_limit(1000))
                .await
                .unwrap();
            rows.reverse();
            rows
        }
    }

    #[tokio::test]
    async fn completing_order_credits_each_distinct_product() {
        let fx = Fixture::new(InMemoryRecordStore::new());
        let flour = fx.product("Flour", "1").await;
        let sugar = fx.product("Sugar", "0").await;
        let salt = fx.product("Salt", "2.5").await;
        let order = fx
            .order(&[(flour.id, "4"), (sugar.id, "0.75"), (salt.id, "10")])
            .await;

        let receipt = fx.engine.complete_order(&fx.identity, order.id()).await.unwrap();
        assert!(!receipt.resumed);
        assert_eq!(receipt.transactions.len(), 3);

        assert_eq!(fx.stock(flour.id).await, q("5"));
        assert_eq!(fx.stock(sugar.id).await, q("0.75"));
        assert_eq!(fx.stock(salt.id).await, q("12.5"));
        assert_eq!(fx.status(&order).await, OrderStatus::Completed);

        let ledger = fx.order_ledger(&order).await;
        assert_eq!(ledger.len(), 3);
        for (tx, item) in ledger.iter().zip(&order.items) {
            assert_eq!(tx.transaction_type, TransactionType::Add);
            assert_eq!(tx.product_id, item.product_id);
            assert_eq!(tx.amount, item.quantity);
            assert_eq!(tx.order_item_id, Some(item.id));
            assert!(tx.is_consistent());
        }
    }

    #[tokio::test]
    async fn ten_kilos_plus_five_becomes_fifteen() {
        let fx = Fixture::new(InMemoryRecordStore::new());
        let beans = fx.product("Coffee beans", "10").await;
        let order = fx.order(&[(beans.id, "5")]).await;

        fx.engine.complete_order(&fx.identity, order.id()).await.unwrap();

        assert_eq!(fx.stock(beans.id).await, q("15"));
        let ledger = fx.order_ledger(&order).await;
        assert_eq!(ledger.len(), 1);
        let tx = &ledger[0];
        assert_eq!(tx.transaction_type, TransactionType::Add);
        assert_eq!(tx.amount, q("5"));
        assert_eq!(tx.previous_stock, q("10"));
        assert_eq!(tx.new_stock, q("15"));
        assert_eq!(
            tx.notes.as_deref(),
            Some(format!("Order completion - Order ID: {}", order.id()).as_str())
        );
    }

    #[tokio::test]
    async fn duplicate_product_lines_accumulate() {
        let fx = Fixture::new(InMemoryRecordStore::new());
        let butter = fx.product("Butter", "10").await;
        let order = fx.order(&[(butter.id, "3"), (butter.id, "4")]).await;

        fx.engine.complete_order(&fx.identity, order.id()).await.unwrap();

        assert_eq!(fx.stock(butter.id).await, q("17"));
        let ledger = fx.order_ledger(&order).await;
        assert_eq!(ledger.len(), 2);
        assert_eq!((ledger[0].previous_stock, ledger[0].new_stock), (q("10"), q("13")));
        assert_eq!((ledger[1].previous_stock, ledger[1].new_stock), (q("13"), q("17")));
    }

    #[tokio::test]
    async fn second_completion_is_rejected_without_writes() {
        let fx = Fixture::new(InMemoryRecordStore::new());
        let milk = fx.product("Milk powder", "1").await;
        let order = fx.order(&[(milk.id, "2")]).await;

        fx.engine.complete_order(&fx.identity, order.id()).await.unwrap();
        let err = fx
            .engine
            .complete_order(&fx.identity, order.id())
            .await
            .unwrap_err();

        assert!(matches!(err, FulfillmentError::InvalidStateTransition(_)));
        assert_eq!(fx.stock(milk.id).await, q("3"));
        assert_eq!(fx.order_ledger(&order).await.len(), 1);
    }

    async fn complete_large_order_twice(fx: &Fixture) {
        let rice = fx.product("Rice", "0").await;
        let lines: Vec<(ProductId, &str)> = vec![(rice.id, "1"); 1001];
        let order = fx.order(&lines).await;

        let receipt = fx.engine.complete_order(&fx.identity, order.id()).await.unwrap();
        assert_eq!(receipt.transactions.len(), 1001);
        assert_eq!(fx.stock(rice.id).await, q("1001"));

        let err = fx
            .engine
            .complete_order(&fx.identity, order.id())
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::InvalidStateTransition(_)));
        assert_eq!(fx.stock(rice.id).await, q("1001"));
        assert_eq!(
            fx.store
                .credited_items(fx.owner(), order.id())
                .await
                .unwrap()
                .len(),
            1001
        );
    }

    #[tokio::test]
    async fn orders_past_the_listing_cap_complete_only_once() {
        complete_large_order_twice(&Fixture::new(InMemoryRecordStore::new())).await;
        complete_large_order_twice(&Fixture::new(
            InMemoryRecordStore::without_atomic_fulfillment(),
        ))
        .await;
    }

    #[tokio::test]
    async fn orders_with_out_of_range_totals_are_refused() {
        let fx = Fixture::new(InMemoryRecordStore::new());
        let cream = fx.product("Cream", "0").await;
        let big = q("250000000000000");
        let items = vec![
            NewOrderItem::new(cream.id, big).with_unit_price(big),
            NewOrderItem::new(cream.id, big).with_unit_price(big),
        ];

        let err = fx
            .orders
            .create(&fx.identity, NewOrder::new("Dairy", items))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(fx.orders.list(&fx.identity, None).await.unwrap().is_empty());

        // Largest single-line total that still fits.
        let max = Quantity::new(rust_decimal::Decimal::MAX).unwrap();
        let order = fx
            .orders
            .create(
                &fx.identity,
                NewOrder::new(
                    "Dairy",
                    vec![NewOrderItem::new(cream.id, q("1")).with_unit_price(max)],
                ),
            )
            .await
            .unwrap();
        assert_eq!(order.order.total_amount, Some(max));
    }

    #[tokio::test]
    async fn cancelled_orders_cannot_be_completed() {
        let fx = Fixture::new(InMemoryRecordStore::new());
        let oil = fx.product("Oil", "1").await;
        let order = fx.order(&[(oil.id, "2")]).await;
        fx.orders
            .update_status(&fx.identity, order.id(), OrderStatus::Cancelled)
            .await
            .unwrap();

        let err = fx
            .engine
            .complete_order(&fx.identity, order.id())
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::InvalidStateTransition(_)));
        assert_eq!(fx.stock(oil.id).await, q("1"));
    }

    #[tokio::test]
    async fn orders_without_items_cannot_be_created() {
        let fx = Fixture::new(InMemoryRecordStore::new());
        let err = fx
            .orders
            .create(&fx.identity, NewOrder::new("Nobody Ltd", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(fx.orders.list(&fx.identity, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn anonymous_and_foreign_callers_write_nothing() {
        let fx = Fixture::new(InMemoryRecordStore::new());
        let rye = fx.product("Rye", "1").await;
        let order = fx.order(&[(rye.id, "1")]).await;

        assert_eq!(
            fx.engine.complete_order(&Anonymous, order.id()).await,
            Err(FulfillmentError::NotAuthenticated)
        );
        assert_eq!(
            fx.engine.complete_order(&test_identity(), order.id()).await,
            Err(FulfillmentError::NotFound)
        );
        assert_eq!(fx.status(&order).await, OrderStatus::Pending);
        assert_eq!(fx.stock(rye.id).await, q("1"));
    }

    #[tokio::test]
    async fn shipped_and_delivered_orders_complete() {
        let fx = Fixture::new(InMemoryRecordStore::new());
        let nuts = fx.product("Nuts", "0").await;
        let shipped = fx.order(&[(nuts.id, "1")]).await;
        let delivered = fx.order(&[(nuts.id, "2")]).await;
        fx.orders
            .update_status(&fx.identity, shipped.id(), OrderStatus::Shipped)
            .await
            .unwrap();
        fx.orders
            .update_status(&fx.identity, delivered.id(), OrderStatus::Delivered)
            .await
            .unwrap();

        fx.engine.complete_order(&fx.identity, shipped.id()).await.unwrap();
        fx.engine.complete_order(&fx.identity, delivered.id()).await.unwrap();
        assert_eq!(fx.stock(nuts.id).await, q("3"));
    }

    #[tokio::test]
    async fn atomic_failure_leaves_order_untouched_and_retry_succeeds() {
        let fx = Fixture::new(InMemoryRecordStore::new());
        let a = fx.product("A", "1").await;
        let b = fx.product("B", "1").await;
        let order = fx.order(&[(a.id, "1"), (b.id, "1")]).await;
        fx.store.fail_stock_writes(b.id, 1);

        let err = fx
            .engine
            .complete_order(&fx.identity, order.id())
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Store(StoreError::Backend(_))));
        assert_eq!(fx.status(&order).await, OrderStatus::Pending);
        assert_eq!(fx.stock(a.id).await, q("1"));
        assert!(fx.order_ledger(&order).await.is_empty());

        fx.engine.complete_order(&fx.identity, order.id()).await.unwrap();
        assert_eq!(fx.stock(a.id).await, q("2"));
        assert_eq!(fx.stock(b.id).await, q("2"));
    }

    #[tokio::test]
    async fn atomic_completion_replans_after_concurrent_writes() {
        let fx = Fixture::new(InMemoryRecordStore::new());
        let rice = fx.product("Rice", "10").await;
        let order = fx.order(&[(rice.id, "5")]).await;
        fx.store.interleave_foreign_writes(rice.id, 2, q("1"));

        fx.engine.complete_order(&fx.identity, order.id()).await.unwrap();

        // 10 + 1 + 1 (foreign) + 5 (order)
        assert_eq!(fx.stock(rice.id).await, q("17"));
        let ledger = fx.order_ledger(&order).await;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].previous_stock, q("12"));
    }

    #[tokio::test]
    async fn atomic_completion_gives_up_after_budget() {
        let fx = Fixture::new(InMemoryRecordStore::new());
        let rice = fx.product("Rice", "10").await;
        let order = fx.order(&[(rice.id, "5")]).await;
        fx.store.interleave_foreign_writes(rice.id, 100, q("1"));

        let err = fx
            .engine
            .complete_order(&fx.identity, order.id())
            .await
            .unwrap_err();
        assert_eq!(err, FulfillmentError::ConflictRetryExhausted { attempts: 5 });
        assert_eq!(fx.status(&order).await, OrderStatus::Pending);
        assert!(fx.order_ledger(&order).await.is_empty());
    }

    #[tokio::test]
    async fn partial_fulfillment_reports_and_resumes() {
        let fx = Fixture::new(InMemoryRecordStore::without_atomic_fulfillment());
        let a = fx.product("A", "1").await;
        let b = fx.product("B", "1").await;
        let order = fx.order(&[(a.id, "2"), (b.id, "3")]).await;
        fx.store.fail_stock_writes(b.id, 1);

        let err = fx
            .engine
            .complete_order(&fx.identity, order.id())
            .await
            .unwrap_err();
        match err {
            FulfillmentError::PartialFulfillment {
                order_id,
                credited,
                uncredited,
                ..
            } => {
                assert_eq!(order_id, order.id());
                assert_eq!(credited, vec![a.id]);
                assert_eq!(uncredited, vec![b.id]);
            }
            other => panic!("expected partial fulfillment, got {other:?}"),
        }
        assert_eq!(fx.status(&order).await, OrderStatus::Completed);
        assert_eq!(fx.stock(a.id).await, q("3"));
        assert_eq!(fx.stock(b.id).await, q("1"));

        // Retry credits only the missing line.
        let receipt = fx.engine.complete_order(&fx.identity, order.id()).await.unwrap();
        assert!(receipt.resumed);
        assert_eq!(receipt.transactions.len(), 1);
        assert_eq!(receipt.transactions[0].product_id, b.id);
        assert_eq!(fx.stock(a.id).await, q("3"));
        assert_eq!(fx.stock(b.id).await, q("4"));

        // Now fully credited: a further call is a state error with no writes.
        assert!(matches!(
            fx.engine.complete_order(&fx.identity, order.id()).await,
            Err(FulfillmentError::InvalidStateTransition(_))
        ));
        assert_eq!(fx.order_ledger(&order).await.len(), 2);
    }

    #[tokio::test]
    async fn resumable_path_credits_duplicate_lines_cumulatively() {
        let fx = Fixture::new(InMemoryRecordStore::without_atomic_fulfillment());
        let yeast = fx.product("Yeast", "10").await;
        let order = fx.order(&[(yeast.id, "3"), (yeast.id, "4")]).await;

        fx.engine.complete_order(&fx.identity, order.id()).await.unwrap();

        assert_eq!(fx.stock(yeast.id).await, q("17"));
        let ledger = fx.order_ledger(&order).await;
        assert_eq!((ledger[0].previous_stock, ledger[0].new_stock), (q("10"), q("13")));
        assert_eq!((ledger[1].previous_stock, ledger[1].new_stock), (q("13"), q("17")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_use_never_drives_stock_negative() {
        let store = Arc::new(InMemoryRecordStore::new());
        let identity = test_identity();
        let product = store
            .create_product(
                identity.user_id(),
                NewProduct::new("Vanilla", Unit::G).with_stock(q("10")),
            )
            .await
            .unwrap();
        let product_id = product.id;
        let service = Arc::new(StockService::new(store.clone(), RetryPolicy::new(50)));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let service = service.clone();
            let identity = identity.clone();
            handles.push(tokio::spawn(async move {
                service
                    .adjust_stock(&identity, product_id, TransactionType::Use, q("3"), None)
                    .await
            }));
        }

        let mut succeeded = 0u32;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(StockError::InsufficientStock { .. })
                | Err(StockError::ConflictRetryExhausted { .. }) => {}
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }

        let stock = store
            .get_product(identity.user_id(), product_id)
            .await
            .unwrap()
            .current_stock;
        assert!(succeeded <= 3);
        let used = q("3").value() * rust_decimal::Decimal::from(succeeded);
        assert_eq!(stock.value(), q("10").value() - used);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_are_never_lost() {
        let store = Arc::new(InMemoryRecordStore::new());
        let identity = test_identity();
        let product = store
            .create_product(identity.user_id(), NewProduct::new("Honey", Unit::Lb))
            .await
            .unwrap();
        let product_id = product.id;
        let service = Arc::new(StockService::new(store.clone(), RetryPolicy::new(1000)));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let service = service.clone();
                let identity = identity.clone();
                tokio::spawn(async move {
                    service
                        .adjust_stock(&identity, product_id, TransactionType::Add, q("0.5"), None)
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stock = store
            .get_product(identity.user_id(), product_id)
            .await
            .unwrap()
            .current_stock;
        assert_eq!(stock, q("10"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_completions_credit_once() {
        let fx = Arc::new(Fixture::new(InMemoryRecordStore::new()));
        let malt = fx.product("Malt", "1").await;
        let order = fx.order(&[(malt.id, "2"), (malt.id, "3")]).await;

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let fx = fx.clone();
                let order_id = order.id();
                tokio::spawn(async move { fx.engine.complete_order(&fx.identity, order_id).await })
            })
            .collect();

        let mut completed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => completed += 1,
                Err(FulfillmentError::InvalidStateTransition(_)) => {}
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }

        assert_eq!(completed, 1);
        assert_eq!(fx.stock(malt.id).await, q("6"));
        assert_eq!(fx.order_ledger(&order).await.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resumable_completions_never_double_credit() {
        let fx = Arc::new(Fixture::new(InMemoryRecordStore::without_atomic_fulfillment()));
        let malt = fx.product("Malt", "1").await;
        let hops = fx.product("Hops", "0").await;
        let order = fx.order(&[(malt.id, "2"), (hops.id, "3"), (malt.id, "1")]).await;

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let fx = fx.clone();
                let order_id = order.id();
                tokio::spawn(async move { fx.engine.complete_order(&fx.identity, order_id).await })
            })
            .collect();
        for handle in handles {
            let _ = handle.await.unwrap();
        }

        assert_eq!(fx.status(&order).await, OrderStatus::Completed);
        assert_eq!(fx.stock(malt.id).await, q("4"));
        assert_eq!(fx.stock(hops.id).await, q("3"));
        assert_eq!(fx.order_ledger(&order).await.len(), 3);
    }

    #[tokio::test]
    async fn stock_matches_ledger_running_total() {
        let fx = Fixture::new(InMemoryRecordStore::new());
        let stock = StockService::new(fx.store.clone(), RetryPolicy::default());
        let cocoa = fx.product("Cocoa", "4").await;

        stock
            .adjust_stock(&fx.identity, cocoa.id, TransactionType::Add, q("1.5"), None)
            .await
            .unwrap();
        stock
            .adjust_stock(&fx.identity, cocoa.id, TransactionType::Use, q("2"), None)
            .await
            .unwrap();
        let order = fx.order(&[(cocoa.id, "0.25")]).await;
        fx.engine.complete_order(&fx.identity, order.id()).await.unwrap();

        let ledger = fx.product_ledger(cocoa.id).await;
        assert_eq!(ledger.len(), 3);
        let mut running = q("4");
        for tx in &ledger {
            assert_eq!(tx.previous_stock, running);
            assert!(tx.is_consistent());
            running = tx.new_stock;
        }
        assert_eq!(fx.stock(cocoa.id).await, running);
        assert_eq!(running, q("3.75"));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use rust_decimal::Decimal;

        fn qty(milli: i64) -> Quantity {
            Quantity::new(Decimal::new(milli, 3)).unwrap()
        }

        proptest! {
            /// Property: after any sequence of adjustments, stock equals the
            /// initial value plus the ledger's adds minus its uses, and never
            /// goes negative.
            #[test]
            fn ledger_accounts_for_every_adjustment(
                initial in 0i64..20_000,
                ops in prop::collection::vec((any::<bool>(), 1i64..10_000), 1..25),
            ) {
                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                rt.block_on(async {
                    let store = Arc::new(InMemoryRecordStore::new());
                    let identity = test_identity();
                    let product = store
                        .create_product(
                            identity.user_id(),
                            NewProduct::new("Flour", Unit::Kg).with_stock(qty(initial)),
                        )
                        .await
                        .unwrap();
                    let service = StockService::new(store.clone(), RetryPolicy::default());

                    for (add, amount) in &ops {
                        let direction = if *add { TransactionType::Add } else { TransactionType::Use };
                        let _ = service
                            .adjust_stock(&identity, product.id, direction, qty(*amount), None)
                            .await;
                    }

                    let ledger = store
                        .list_transactions(
                            identity.user_id(),
                            TransactionQuery::for_product(product.id).with_limit(1000),
                        )
                        .await
                        .unwrap();
                    let net = ledger.iter().fold(Decimal::ZERO, |acc, tx| match tx.transaction_type {
                        TransactionType::Add => acc + tx.amount.value(),
                        TransactionType::Use => acc - tx.amount.value(),
                    });
                    let current = store
                        .get_product(identity.user_id(), product.id)
                        .await
                        .unwrap()
                        .current_stock;

                    assert_eq!(current.value(), qty(initial).value() + net);
                    assert!(current.value() >= Decimal::ZERO);
                    assert!(ledger.iter().all(StockTransaction::is_consistent));
                });
            }
        }
    }
}

//! Integration tests: InventoryService over the in-memory ledger store.

use std::time::Duration;

use change_feed::{MovementsView, ProductsView, ReadModel};
use inventory::{
    InventoryError, InventoryService, MovementKind, MovementRequest, NewProduct, ProductId,
    RetryPolicy,
};
use ledger_store::{InMemoryLedgerStore, LedgerStoreExt};

fn service() -> InventoryService<InMemoryLedgerStore> {
    InventoryService::with_policy(InMemoryLedgerStore::new(), RetryPolicy::immediate(5))
}

async fn bulb_a(service: &InventoryService<InMemoryLedgerStore>) -> ProductId {
    service
        .create_product(
            NewProduct::new("Bulb A")
                .quantity(20)
                .price(3.5)
                .min_stock(5),
        )
        .await
        .unwrap()
        .id
}

async fn quantity_of(service: &InventoryService<InMemoryLedgerStore>, id: ProductId) -> i64 {
    service.store().require_product(id).await.unwrap().quantity
}

#[tokio::test]
async fn test_oversell_is_rejected_without_side_effects() {
    let service = service();
    let id = bulb_a(&service).await;

    let result = service
        .register_movement(MovementRequest::stock_out(id, 25).by("u1"))
        .await;

    assert!(matches!(result, Err(InventoryError::InsufficientStock { .. })));
    assert_eq!(quantity_of(&service, id).await, 20);
    assert!(service.store().movements_for_product(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sale_records_exactly_one_movement() {
    let service = service();
    let id = bulb_a(&service).await;

    service
        .register_movement(MovementRequest::stock_out(id, 5).by("u1"))
        .await
        .unwrap();

    assert_eq!(quantity_of(&service, id).await, 15);
    let movements = service.store().movements_for_product(id).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].kind, MovementKind::Out);
    assert_eq!(movements[0].quantity, 5);
}

#[tokio::test]
async fn test_movement_on_deleted_product_is_not_found() {
    let service = service();
    let id = bulb_a(&service).await;
    service
        .register_movement(MovementRequest::stock_out(id, 1))
        .await
        .unwrap();

    service.delete_product(id).await.unwrap();

    let result = service
        .register_movement(MovementRequest::stock_in(id, 1).by("u1"))
        .await;
    assert!(matches!(result, Err(InventoryError::NotFound(_))));

    // History outlives the product.
    assert_eq!(service.store().movements_for_product(id).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sales_cannot_oversell() {
    let service = service();
    let id = service
        .create_product(NewProduct::new("Drill").quantity(10))
        .await
        .unwrap()
        .id;

    let first = service.clone();
    let second = service.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move {
            first
                .register_movement(MovementRequest::stock_out(id, 7))
                .await
        }),
        tokio::spawn(async move {
            second
                .register_movement(MovementRequest::stock_out(id, 7))
                .await
        }),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(
        loser,
        InventoryError::InsufficientStock { .. } | InventoryError::Conflict { .. }
    ));

    assert_eq!(quantity_of(&service, id).await, 3);
    assert_eq!(service.store().movements_for_product(id).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_writers_keep_stock_consistent() {
    let service = InventoryService::with_policy(
        InMemoryLedgerStore::new(),
        RetryPolicy::new(50, Duration::from_millis(1)),
    );
    let id = service
        .create_product(NewProduct::new("Fuse").quantity(50))
        .await
        .unwrap()
        .id;

    let mut tasks = Vec::new();
    for i in 0..20 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            let request = if i % 2 == 0 {
                MovementRequest::stock_out(id, 4)
            } else {
                MovementRequest::stock_in(id, 1)
            };
            service.register_movement(request).await
        }));
    }

    let mut expected = 50;
    for task in tasks {
        if let Ok(movement) = task.await.unwrap() {
            expected += movement.signed_quantity();
        }
    }

    let final_quantity = quantity_of(&service, id).await;
    assert!(final_quantity >= 0);
    assert_eq!(final_quantity, expected);

    let ledger_total: i64 = service
        .store()
        .movements_for_product(id)
        .await
        .unwrap()
        .iter()
        .map(|m| m.signed_quantity())
        .sum();
    assert_eq!(50 + ledger_total, final_quantity);
}

#[tokio::test]
async fn test_repeated_request_is_applied_twice() {
    let service = service();
    let id = bulb_a(&service).await;

    let request = MovementRequest::stock_in(id, 5).by("u1");
    let first = service.register_movement(request.clone()).await.unwrap();
    let second = service.register_movement(request).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(quantity_of(&service, id).await, 30);
    assert_eq!(service.store().movements_for_product(id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_attempts_leave_ledger_untouched() {
    let service = service();
    let id = bulb_a(&service).await;

    let failures = [
        MovementRequest::stock_out(id, 0),
        MovementRequest::stock_out(id, 21),
        MovementRequest::stock_in(ProductId::new(), 1),
    ];
    for request in failures {
        assert!(service.register_movement(request).await.is_err());
    }

    service.store().inject_conflicts(5).await;
    let exhausted = service
        .register_movement(MovementRequest::stock_out(id, 1))
        .await;
    assert!(matches!(exhausted, Err(InventoryError::Conflict { attempts: 5, .. })));

    assert_eq!(quantity_of(&service, id).await, 20);
    assert_eq!(service.store().movement_count().await, 0);
}

#[tokio::test]
async fn test_observers_see_movements_in_commit_order() {
    let service = service();
    let id = bulb_a(&service).await;

    let movements = MovementsView::new();
    let products = ProductsView::new();
    let _movements_sub = service.subscribe_movements(movements.clone()).await.unwrap();
    let _products_sub = service.subscribe_products(products.clone()).await.unwrap();

    let m1 = service
        .register_movement(MovementRequest::stock_out(id, 2).with_note("M1"))
        .await
        .unwrap();
    let m2 = service
        .register_movement(MovementRequest::stock_out(id, 3).with_note("M2"))
        .await
        .unwrap();

    for _ in 0..200 {
        if movements.count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let history = movements.for_product(id).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, m2.id);
    assert_eq!(history[1].id, m1.id);
    assert!(history[0].sequence > history[1].sequence);
    assert!(history[0].timestamp >= history[1].timestamp);

    for _ in 0..200 {
        if products.get(id).await.is_some_and(|p| p.quantity == 15) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("products view never caught up");
}

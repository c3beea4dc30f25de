mod common;

use common::{at, coffee, plate, seed, test_app, test_app_with, test_config, today};
use pickup_core::admission::{AdmissionError, CartLine, PlaceOrder, SlotChoice, PROJECTION_WARNING};
use pickup_core::code::is_valid_code;
use pickup_core::domain::{Caller, OrderStatus, Selection};
use pickup_core::ports::{Clock, OrderFilter, OrderStore};
use pickup_core::slots::BusinessHours;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

const FIRST_SLOT: u32 = 615;

fn slot(start_minute: u32) -> SlotChoice {
    SlotChoice {
        label: Some("client label".to_string()),
        start_minute: Some(start_minute as i64),
    }
}

fn line(product_id: Uuid) -> CartLine {
    CartLine {
        product_id,
        selections: BTreeMap::new(),
        salads: Vec::new(),
    }
}

fn order_for(product_id: Uuid, start_minute: u32) -> PlaceOrder {
    PlaceOrder {
        slot: slot(start_minute),
        cart: vec![line(product_id)],
        client_total: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admissions_never_exceed_slot_limit() {
    let app = test_app(3);
    let product = coffee();
    seed(&app, &product);

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let admission = app.state.admission.clone();
            let request = order_for(product.id, FIRST_SLOT);
            tokio::spawn(async move { admission.place_order(request).await })
        })
        .collect();

    let mut admitted = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.expect("task") {
            Ok(_) => admitted += 1,
            Err(AdmissionError::SlotFull(_)) => full += 1,
            Err(other) => panic!("unexpected admission error: {other}"),
        }
    }
    assert_eq!(admitted, 3);
    assert_eq!(full, 9);

    let counter = app
        .store
        .slot_counter(today(), FIRST_SLOT)
        .await
        .unwrap()
        .expect("counter");
    assert_eq!(counter.count, 3);

    let usage = app.store.capacity_usage(today()).await.unwrap();
    assert_eq!(usage.get(&FIRST_SLOT), Some(&3));
}

#[tokio::test]
async fn admitted_order_gets_code_label_and_projections() {
    let app = test_app(5);
    let product = coffee();
    seed(&app, &product);

    let placed = app
        .state
        .admission
        .place_order(order_for(product.id, FIRST_SLOT))
        .await
        .expect("admitted");

    assert!(is_valid_code(&placed.code), "bad code {}", placed.code);
    // The label comes from the generator, not from the client.
    assert_eq!(placed.pickup_time_label, "10:15 - 10:30");
    assert_eq!(placed.pickup_date, today());
    assert_eq!(placed.total, Decimal::new(250, 2));
    assert!(placed.warnings.is_empty());

    let public = app.store.get_public_order(&placed.code).await.unwrap();
    assert_eq!(public.status, OrderStatus::New);
    assert_eq!(public.pickup_time_label, "10:15 - 10:30");
}

#[tokio::test]
async fn codes_are_unique_across_orders() {
    let app = test_app(50);
    let product = coffee();
    seed(&app, &product);

    let mut codes = HashSet::new();
    for _ in 0..40 {
        let placed = app
            .state
            .admission
            .place_order(order_for(product.id, FIRST_SLOT))
            .await
            .unwrap();
        assert!(codes.insert(placed.code));
    }
}

#[tokio::test]
async fn slot_that_aged_out_is_reported_closed() {
    let app = test_app(5);
    let product = coffee();
    seed(&app, &product);

    // Listed at 10:00, submitted at 10:06: 10:15 is now inside the prep buffer.
    app.clock.set(at(10, 6));
    let err = app
        .state
        .admission
        .place_order(order_for(product.id, FIRST_SLOT))
        .await
        .unwrap_err();
    assert!(matches!(err, AdmissionError::SlotClosed { .. }), "{err:?}");
    assert_eq!(err.code(), "invalid-argument");
    assert_eq!(err.reason(), "slot_closed");

    assert!(app.store.slot_counter(today(), FIRST_SLOT).await.unwrap().is_none());
    assert!(app.store.list_orders(&OrderFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn unaligned_or_distant_slots_are_not_offered() {
    let app = test_app(5);
    let product = coffee();
    seed(&app, &product);

    for start in [620, 14 * 60] {
        let err = app
            .state
            .admission
            .place_order(order_for(product.id, start))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "slot_not_offered");
    }
}

#[tokio::test]
async fn slots_outside_business_hours_are_not_offered() {
    let mut config = test_config(5);
    config.slots.business_hours = Some(BusinessHours {
        open_minute: 11 * 60,
        close_minute: 14 * 60,
    });
    let app = test_app_with(config, at(10, 0));
    let product = coffee();
    seed(&app, &product);

    let err = app
        .state
        .admission
        .place_order(order_for(product.id, FIRST_SLOT))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "slot_not_offered");

    assert!(app
        .state
        .admission
        .place_order(order_for(product.id, 11 * 60))
        .await
        .is_ok());
}

#[tokio::test]
async fn malformed_requests_are_rejected_before_anything_else() {
    let app = test_app(5);
    let product = coffee();
    seed(&app, &product);

    let missing_label = PlaceOrder {
        slot: SlotChoice {
            label: None,
            start_minute: Some(FIRST_SLOT as i64),
        },
        cart: vec![line(product.id)],
        client_total: None,
    };
    let err = app.state.admission.place_order(missing_label).await.unwrap_err();
    assert_eq!(err.reason(), "malformed_slot");

    let empty_cart = PlaceOrder {
        slot: slot(FIRST_SLOT),
        cart: Vec::new(),
        client_total: None,
    };
    let err = app.state.admission.place_order(empty_cart).await.unwrap_err();
    assert_eq!(err.reason(), "empty_cart");

    let unknown = order_for(Uuid::new_v4(), FIRST_SLOT);
    let err = app.state.admission.place_order(unknown).await.unwrap_err();
    assert_eq!(err.reason(), "unknown_product");
}

#[tokio::test]
async fn inactive_products_cannot_be_ordered() {
    let app = test_app(5);
    let mut product = coffee();
    product.active = false;
    seed(&app, &product);

    let err = app
        .state
        .admission
        .place_order(order_for(product.id, FIRST_SLOT))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "product_inactive");
}

#[tokio::test]
async fn configured_lines_are_priced_server_side() {
    let app = test_app(5);
    let product = plate();
    seed(&app, &product);

    let mut selections = BTreeMap::new();
    selections.insert("bread".to_string(), Selection::One("Rye".to_string()));
    let request = PlaceOrder {
        slot: slot(FIRST_SLOT),
        cart: vec![CartLine {
            product_id: product.id,
            selections,
            salads: vec![
                "Potato".to_string(),
                "Cucumber".to_string(),
                "Coleslaw".to_string(),
            ],
        }],
        // Deliberately wrong; the resolved total wins.
        client_total: Some(Decimal::new(100, 2)),
    };

    let placed = app.state.admission.place_order(request).await.unwrap();
    assert_eq!(placed.total, Decimal::new(970, 2));

    let order = app.store.get_order(placed.order_id).await.unwrap();
    assert_eq!(order.items.len(), 1);
    assert_eq!(
        order.items[0].display_name.as_deref(),
        Some("Schnitzel Plate (Bread: Rye • Salads: Potato, Cucumber, Coleslaw)")
    );
}

#[tokio::test]
async fn incomplete_lines_are_rejected_with_issues() {
    let app = test_app(5);
    let product = plate();
    seed(&app, &product);

    let request = PlaceOrder {
        slot: slot(FIRST_SLOT),
        cart: vec![CartLine {
            product_id: product.id,
            selections: BTreeMap::new(),
            salads: vec!["Potato".to_string()],
        }],
        client_total: None,
    };
    match app.state.admission.place_order(request).await.unwrap_err() {
        AdmissionError::IncompleteLine { issues, .. } => assert_eq!(issues.len(), 2),
        other => panic!("expected an incomplete line, got {other:?}"),
    }
    assert!(app.store.slot_counter(today(), FIRST_SLOT).await.unwrap().is_none());
}

#[tokio::test]
async fn projection_failure_keeps_the_order_and_warns() {
    let app = test_app(5);
    let product = coffee();
    seed(&app, &product);
    app.store.fail_projection_writes(true);

    let placed = app
        .state
        .admission
        .place_order(order_for(product.id, FIRST_SLOT))
        .await
        .expect("order stands without projections");
    assert_eq!(placed.warnings, vec![PROJECTION_WARNING.to_string()]);

    assert!(app.store.get_order(placed.order_id).await.is_ok());
    assert!(app.store.get_public_order(&placed.code).await.is_err());
    let counter = app
        .store
        .slot_counter(today(), FIRST_SLOT)
        .await
        .unwrap()
        .expect("counter");
    assert_eq!(counter.count, 1);
}

#[tokio::test]
async fn contention_is_retried_then_reported() {
    let app = test_app(5);
    let product = coffee();
    seed(&app, &product);

    // Two contended attempts, then success on the third.
    app.store.inject_contention(2);
    assert!(app
        .state
        .admission
        .place_order(order_for(product.id, FIRST_SLOT))
        .await
        .is_ok());

    app.store.inject_contention(10);
    let err = app
        .state
        .admission
        .place_order(order_for(product.id, FIRST_SLOT))
        .await
        .unwrap_err();
    assert!(matches!(err, AdmissionError::Contention { attempts: 3 }));
    assert_eq!(err.code(), "aborted");
}

#[tokio::test]
async fn code_collisions_regenerate_the_code() {
    let app = test_app(5);
    let product = coffee();
    seed(&app, &product);

    app.store.inject_code_conflicts(2);
    let placed = app
        .state
        .admission
        .place_order(order_for(product.id, FIRST_SLOT))
        .await
        .expect("admitted after collisions");
    assert!(is_valid_code(&placed.code));

    let counter = app
        .store
        .slot_counter(today(), FIRST_SLOT)
        .await
        .unwrap()
        .expect("counter");
    assert_eq!(counter.count, 1);
}

#[tokio::test]
async fn status_changes_fan_out_to_the_tracking_record() {
    let app = test_app(5);
    let product = coffee();
    seed(&app, &product);
    let placed = app
        .state
        .admission
        .place_order(order_for(product.id, FIRST_SLOT))
        .await
        .unwrap();

    // Anonymous callers may not change statuses.
    let err = app
        .state
        .tracker
        .set_status(&Caller::Anonymous, placed.order_id, &placed.code, OrderStatus::Ready)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "permission-denied");

    // Any transition is allowed, including backwards.
    for status in [OrderStatus::Ready, OrderStatus::InProgress] {
        let change = app
            .state
            .tracker
            .set_status(&Caller::Staff, placed.order_id, &placed.code.to_lowercase(), status)
            .await
            .unwrap();
        assert!(change.projection_synced);
        let public = app.state.tracker.public_status(&placed.code).await.unwrap();
        assert_eq!(public.status, status);
    }

    let err = app
        .state
        .tracker
        .set_status(&Caller::Staff, placed.order_id, "ZZZZZZ", OrderStatus::Ready)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not-found");
}

#[tokio::test]
async fn missing_tracking_record_is_rebuilt_on_status_change() {
    let app = test_app(5);
    let product = coffee();
    seed(&app, &product);
    app.store.fail_projection_writes(true);
    let placed = app
        .state
        .admission
        .place_order(order_for(product.id, FIRST_SLOT))
        .await
        .unwrap();
    app.store.fail_projection_writes(false);
    app.clock.advance(chrono::Duration::minutes(5));

    let change = app
        .state
        .tracker
        .set_status(&Caller::Staff, placed.order_id, &placed.code, OrderStatus::InProgress)
        .await
        .unwrap();
    assert!(change.projection_synced);

    let public = app.state.tracker.public_status(&placed.code).await.unwrap();
    assert_eq!(public.status, OrderStatus::InProgress);
    assert_eq!(public.updated_at, change.updated_at);
    assert_eq!(public.updated_at, app.clock.utc_now());
    let usage = app.store.capacity_usage(today()).await.unwrap();
    assert_eq!(usage.get(&FIRST_SLOT), Some(&1));
}

#[tokio::test]
async fn late_admission_publish_does_not_reset_status() {
    let app = test_app(5);
    let product = coffee();
    seed(&app, &product);
    app.store.fail_projection_writes(true);
    let placed = app
        .state
        .admission
        .place_order(order_for(product.id, FIRST_SLOT))
        .await
        .unwrap();
    app.store.fail_projection_writes(false);

    app.state
        .tracker
        .set_status(&Caller::Staff, placed.order_id, &placed.code, OrderStatus::Ready)
        .await
        .unwrap();

    // The admission-time write arrives after staff already moved the order on.
    let mut snapshot = app.store.get_order(placed.order_id).await.unwrap();
    snapshot.status = OrderStatus::New;
    app.store
        .publish_projections(&snapshot, snapshot.created_at)
        .await
        .unwrap();

    let internal = app.store.get_order(placed.order_id).await.unwrap();
    let public = app.state.tracker.public_status(&placed.code).await.unwrap();
    assert_eq!(internal.status, OrderStatus::Ready);
    assert_eq!(public.status, OrderStatus::Ready);
    let usage = app.store.capacity_usage(today()).await.unwrap();
    assert_eq!(usage.get(&FIRST_SLOT), Some(&1));
}

#[tokio::test]
async fn open_only_hides_ready_orders() {
    let app = test_app(5);
    let product = coffee();
    seed(&app, &product);
    let first = app
        .state
        .admission
        .place_order(order_for(product.id, 630))
        .await
        .unwrap();
    let second = app
        .state
        .admission
        .place_order(order_for(product.id, FIRST_SLOT))
        .await
        .unwrap();

    let all = app
        .state
        .tracker
        .list_orders(&Caller::Staff, &OrderFilter::default())
        .await
        .unwrap();
    let ids: Vec<_> = all.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![second.order_id, first.order_id]);

    app.state
        .tracker
        .set_status(&Caller::Staff, second.order_id, &second.code, OrderStatus::Ready)
        .await
        .unwrap();
    let open = app
        .state
        .tracker
        .list_orders(
            &Caller::Staff,
            &OrderFilter {
                pickup_date: Some(today()),
                open_only: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, first.order_id);
}

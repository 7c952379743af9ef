//! Order planning, transition and escrow rules exercised through the public API

use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use agrilink_server::catalog::{Product, ProductCategory, ProductStatus};
use agrilink_server::error::ApiError;
use agrilink_server::orders::{plan_orders, Actor, OrderItemInput, OrderStatus, TransitionError};
use agrilink_server::payments::{EscrowStatus, Payment, PaymentStatus, WebhookError, WebhookVerifier};

fn product(farmer_id: Uuid, title: &str, price: i64, quantity: i32, min_order: i32) -> Product {
    let now = Utc::now();
    Product {
        id: Uuid::new_v4(),
        farmer_id,
        title: title.to_string(),
        description: None,
        category: ProductCategory::Cereals,
        unit: "kg".to_string(),
        price,
        quantity,
        min_order,
        status: ProductStatus::Active,
        location: "Debre Zeit".to_string(),
        latitude: None,
        longitude: None,
        images: vec![],
        is_organic: false,
        harvest_date: NaiveDate::from_ymd_opt(2024, 11, 20),
        sold_quantity: 0,
        views: 0,
        rating: 0.0,
        review_count: 0,
        created_at: now,
        updated_at: now,
    }
}

fn item(product: &Product, quantity: i32) -> OrderItemInput {
    OrderItemInput {
        product_id: product.id,
        quantity,
        negotiated_price: None,
    }
}

fn payment(status: PaymentStatus, escrow_status: EscrowStatus, release_in_days: i64) -> Payment {
    let now = Utc::now();
    Payment {
        id: Uuid::new_v4(),
        order_id: Uuid::new_v4(),
        buyer_id: Uuid::new_v4(),
        farmer_id: Uuid::new_v4(),
        amount: 4500,
        method: None,
        status,
        escrow_status,
        transaction_id: None,
        checkout_url: None,
        gateway_data: None,
        paid_at: None,
        escrow_release_at: now + Duration::days(release_in_days),
        released_at: None,
        refunded_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn test_cart_split_across_two_farmers() {
    let buyer = Uuid::new_v4();
    let abebe = Uuid::new_v4();
    let almaz = Uuid::new_v4();

    let teff = product(abebe, "White Teff", 150, 300, 25);
    let coffee = product(almaz, "Yirgacheffe Coffee", 900, 50, 5);
    let sorghum = product(abebe, "Red Sorghum", 60, 400, 10);

    let cart = vec![item(&teff, 30), item(&coffee, 5), item(&sorghum, 10)];
    let plans = plan_orders(buyer, &cart, &[teff, coffee, sorghum]).unwrap();

    assert_eq!(plans.len(), 2);
    assert_eq!(plans[0].farmer_id, abebe);
    assert_eq!(plans[0].items.len(), 2);
    assert_eq!(plans[0].total_amount, 30 * 150 + 10 * 60);
    assert_eq!(plans[1].farmer_id, almaz);
    assert_eq!(plans[1].total_amount, 4500);
}

#[test]
fn test_negotiated_price_is_snapshotted() {
    let teff = product(Uuid::new_v4(), "White Teff", 150, 300, 25);
    let cart = vec![OrderItemInput {
        product_id: teff.id,
        quantity: 40,
        negotiated_price: Some(140),
    }];

    let plans = plan_orders(Uuid::new_v4(), &cart, &[teff]).unwrap();
    assert_eq!(plans[0].items[0].unit_price, 140);
    assert_eq!(plans[0].total_amount, 5600);
}

#[test]
fn test_below_minimum_order_is_rejected() {
    let teff = product(Uuid::new_v4(), "White Teff", 150, 300, 25);
    let cart = vec![item(&teff, 20)];

    match plan_orders(Uuid::new_v4(), &cart, &[teff]) {
        Err(ApiError::ValidationError(msg)) => {
            assert_eq!(msg, "Minimum order quantity for White Teff is 25")
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_unknown_product_is_not_found() {
    let teff = product(Uuid::new_v4(), "White Teff", 150, 300, 25);
    let cart = vec![OrderItemInput {
        product_id: Uuid::new_v4(),
        quantity: 30,
        negotiated_price: None,
    }];

    assert!(matches!(
        plan_orders(Uuid::new_v4(), &cart, &[teff]),
        Err(ApiError::NotFound(_))
    ));
}

#[test]
fn test_status_cannot_jump_to_delivered() {
    assert_eq!(
        OrderStatus::Pending.check_transition(OrderStatus::Delivered, Actor::Admin),
        Err(TransitionError::Illegal {
            from: OrderStatus::Pending,
            to: OrderStatus::Delivered,
        })
    );
}

#[test]
fn test_only_farmer_or_admin_confirms() {
    assert!(OrderStatus::Pending
        .check_transition(OrderStatus::Confirmed, Actor::Farmer)
        .is_ok());
    assert!(matches!(
        OrderStatus::Pending.check_transition(OrderStatus::Confirmed, Actor::Buyer),
        Err(TransitionError::NotPermitted { .. })
    ));
}

#[test]
fn test_happy_path_is_walkable() {
    let path = [
        (OrderStatus::Pending, OrderStatus::Confirmed, Actor::Farmer),
        (OrderStatus::Confirmed, OrderStatus::PaymentPending, Actor::System),
        (OrderStatus::PaymentPending, OrderStatus::Paid, Actor::System),
        (OrderStatus::Paid, OrderStatus::Processing, Actor::Farmer),
        (OrderStatus::Processing, OrderStatus::Shipped, Actor::Farmer),
        (OrderStatus::Shipped, OrderStatus::InTransit, Actor::Farmer),
        (OrderStatus::InTransit, OrderStatus::Delivered, Actor::Buyer),
    ];
    for (from, to, actor) in path {
        assert!(from.check_transition(to, actor).is_ok(), "{:?} -> {:?}", from, to);
    }
}

#[test]
fn test_terminal_states_have_no_exits() {
    for terminal in [OrderStatus::Cancelled, OrderStatus::Refunded] {
        assert!(terminal.is_terminal());
        assert!(!terminal.can_transition_to(OrderStatus::Pending));
        assert!(!terminal.can_transition_to(OrderStatus::Delivered));
    }
}

#[test]
fn test_escrow_release_requires_completed_and_held() {
    let now = Utc::now();

    assert!(payment(PaymentStatus::Completed, EscrowStatus::Held, -1).is_due_for_release(now));
    assert!(!payment(PaymentStatus::Completed, EscrowStatus::Held, 3).is_due_for_release(now));
    assert!(!payment(PaymentStatus::Processing, EscrowStatus::Held, -1).is_due_for_release(now));
    assert!(!payment(PaymentStatus::Completed, EscrowStatus::Released, -1).is_due_for_release(now));
    assert!(!payment(PaymentStatus::Refunded, EscrowStatus::Refunded, -1).is_releasable());
}

#[test]
fn test_webhook_signature_round_trip_and_tamper() {
    let verifier = WebhookVerifier::new("whsec_test", 300);
    let body = br#"{"transactionId":"AGL-TX-1","status":"success"}"#;
    let now = Utc::now().timestamp();

    let header = verifier.sign(body, now).unwrap();
    assert!(verifier.verify_at(body, Some(&header), now).is_ok());

    let tampered = br#"{"transactionId":"AGL-TX-2","status":"success"}"#;
    assert!(matches!(
        verifier.verify_at(tampered, Some(&header), now),
        Err(WebhookError::InvalidSignature)
    ));
    assert!(matches!(
        verifier.verify_at(body, None, now),
        Err(WebhookError::MissingSignature)
    ));
    assert!(matches!(
        verifier.verify_at(body, Some(&header), now + 3600),
        Err(WebhookError::StaleTimestamp)
    ));
}

#![allow(dead_code)]
//! Shared scaffolding for the integration tests: a throwaway database per test, a seeded menu
//! catalog, and shortcuts for walking orders into the states a test needs.

use chrono::{Duration, Utc};
use platter_order_engine::{
    db_types::{Coupon, DeliveryAddress, DiscountType, MenuItem, Order, OrderStatusType, Payment},
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    CartApi,
    CheckoutRequest,
    NewLineItem,
    OrderFlowApi,
    SqliteDatabase,
};
use poe_common::Cents;

pub const THAI_RESTAURANT: &str = "thai-garden";
pub const SUSHI_RESTAURANT: &str = "tokyo-diner";

pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub async fn seed_menu(db: &SqliteDatabase) {
    let items = [
        MenuItem {
            id: "pad-thai".into(),
            restaurant_id: THAI_RESTAURANT.into(),
            name: "Pad Thai".into(),
            base_price: Cents::from(1_200),
            is_available: true,
        },
        MenuItem {
            id: "green-curry".into(),
            restaurant_id: THAI_RESTAURANT.into(),
            name: "Green Curry".into(),
            base_price: Cents::from(1_450),
            is_available: true,
        },
        MenuItem {
            id: "mango-sticky-rice".into(),
            restaurant_id: THAI_RESTAURANT.into(),
            name: "Mango Sticky Rice".into(),
            base_price: Cents::from(650),
            is_available: false,
        },
        MenuItem {
            id: "sushi-set".into(),
            restaurant_id: SUSHI_RESTAURANT.into(),
            name: "Sushi Set".into(),
            base_price: Cents::from(2_100),
            is_available: true,
        },
    ];
    for item in &items {
        db.upsert_menu_item(item).await.expect("Error seeding menu item");
    }
}

pub async fn seed_coupon(db: &SqliteDatabase, code: &str, discount_type: DiscountType, value: i64, hours_left: i64) {
    let coupon = Coupon {
        code: code.into(),
        discount_type,
        discount_value: value,
        expires_at: Utc::now() + Duration::hours(hours_left),
    };
    db.upsert_coupon(&coupon).await.expect("Error seeding coupon");
}

pub fn test_address() -> DeliveryAddress {
    DeliveryAddress {
        line1: "12 Elm Street".into(),
        line2: Some("Apt 4".into()),
        city: "Springfield".into(),
        postcode: "49007".into(),
        instructions: Some("Ring twice".into()),
    }
}

pub fn checkout_request() -> CheckoutRequest {
    CheckoutRequest {
        delivery_address: test_address(),
        delivery_fee: Cents::from(399),
        packaging_fee: Cents::from(100),
        taxes: Cents::from(250),
        tip: Cents::from(500),
    }
}

pub fn order_flow(db: &SqliteDatabase) -> OrderFlowApi<SqliteDatabase> {
    OrderFlowApi::new(db.clone(), EventProducers::default())
}

/// Two portions of pad thai, checked out with the standard fees.
pub async fn place_order(db: &SqliteDatabase, customer_id: &str) -> (Order, Payment) {
    let carts = CartApi::new(db.clone());
    carts.add_item(customer_id, NewLineItem::new("pad-thai", 2)).await.expect("Error adding item");
    carts.checkout(customer_id, checkout_request()).await.expect("Error checking out")
}

/// Places an order and walks it to the given point in the happy path.
pub async fn place_order_at(db: &SqliteDatabase, customer_id: &str, target: OrderStatusType) -> Order {
    use OrderStatusType::*;
    let (mut order, _payment) = place_order(db, customer_id).await;
    let api = order_flow(db);
    for status in [Confirmed, Preparing, Ready, PickedUp, OnTheWay, Arrived, Delivered] {
        if order.status == target {
            break;
        }
        order = api.advance(&order.order_id, status, None).await.expect("Error advancing order");
    }
    assert_eq!(order.status, target);
    order
}

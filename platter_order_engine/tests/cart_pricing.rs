mod support;

use platter_order_engine::{
    db_types::{Addon, Customization, DiscountType},
    CartApi,
    CartError,
    ErrorKind,
    NewLineItem,
    PaymentApi,
};
use poe_common::Cents;
use support::*;

#[tokio::test]
async fn totals_track_every_cart_mutation() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    let api = CartApi::new(db.clone());

    let contents = api.add_item("cust-totals", NewLineItem::new("pad-thai", 2)).await.unwrap();
    assert_eq!(contents.cart.total, Cents::from(2_400));
    assert_eq!(contents.cart.grand_total, Cents::from(2_400));

    let curry = NewLineItem::new("green-curry", 1)
        .with_customization(Customization { name: "Spice".into(), choice: "Thai hot".into(), price: Cents::from(50) })
        .with_addon(Addon { name: "Extra prawns".into(), price: Cents::from(250) });
    let contents = api.add_item("cust-totals", curry).await.unwrap();
    assert_eq!(contents.items.len(), 2);
    // 2 × 1200 + (1450 + 50 + 250)
    assert_eq!(contents.cart.total, Cents::from(4_150));
    assert_eq!(contents.items[1].item_total, Cents::from(1_750));

    let pad_thai_line = contents.items[0].id;
    let contents = api.update_quantity("cust-totals", pad_thai_line, 1).await.unwrap();
    assert_eq!(contents.cart.total, Cents::from(2_950));

    let contents = api.remove_item("cust-totals", pad_thai_line).await.unwrap();
    assert_eq!(contents.items.len(), 1);
    assert_eq!(contents.cart.total, Cents::from(1_750));
    assert_eq!(contents.cart.grand_total, Cents::from(1_750));
}

#[tokio::test]
async fn cart_rejects_bad_lines() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    let api = CartApi::new(db.clone());

    let err = api.add_item("cust-bad", NewLineItem::new("pad-thai", 0)).await.unwrap_err();
    assert!(matches!(err, CartError::InvalidQuantity(0)));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = api.add_item("cust-bad", NewLineItem::new("moon-cheese", 1)).await.unwrap_err();
    assert!(matches!(err, CartError::MenuItemNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = api.add_item("cust-bad", NewLineItem::new("mango-sticky-rice", 1)).await.unwrap_err();
    assert!(matches!(err, CartError::MenuItemUnavailable(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // One cart, one restaurant
    api.add_item("cust-bad", NewLineItem::new("pad-thai", 1)).await.unwrap();
    let err = api.add_item("cust-bad", NewLineItem::new("sushi-set", 1)).await.unwrap_err();
    assert!(matches!(err, CartError::RestaurantMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = api.update_quantity("cust-bad", 9_999, 2).await.unwrap_err();
    assert!(matches!(err, CartError::LineItemNotFound(9_999)));
}

#[tokio::test]
async fn percentage_coupons_discount_the_total() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    seed_coupon(&db, "SAVE10", DiscountType::Percentage, 10, 24).await;
    let api = CartApi::new(db.clone());

    api.add_item("cust-coupon", NewLineItem::new("pad-thai", 2)).await.unwrap();
    let contents = api.apply_coupon("cust-coupon", "SAVE10").await.unwrap();
    assert_eq!(contents.cart.total, Cents::from(2_400));
    assert_eq!(contents.cart.discount, Cents::from(240));
    assert_eq!(contents.cart.grand_total, Cents::from(2_160));

    // The discount follows later mutations
    let contents = api.add_item("cust-coupon", NewLineItem::new("green-curry", 1)).await.unwrap();
    assert_eq!(contents.cart.total, Cents::from(3_850));
    assert_eq!(contents.cart.discount, Cents::from(385));

    let contents = api.remove_coupon("cust-coupon").await.unwrap();
    assert_eq!(contents.cart.discount, Cents::from(0));
    assert_eq!(contents.cart.grand_total, contents.cart.total);
}

#[tokio::test]
async fn oversized_fixed_coupons_clamp_to_the_total() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    seed_coupon(&db, "FEAST50", DiscountType::Fixed, 5_000, 24).await;
    let api = CartApi::new(db.clone());

    api.add_item("cust-clamp", NewLineItem::new("pad-thai", 1)).await.unwrap();
    let contents = api.apply_coupon("cust-clamp", "FEAST50").await.unwrap();
    assert_eq!(contents.cart.total, Cents::from(1_200));
    assert_eq!(contents.cart.discount, Cents::from(1_200));
    assert_eq!(contents.cart.grand_total, Cents::from(0));
}

#[tokio::test]
async fn expired_coupons_are_cleared_not_applied() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    seed_coupon(&db, "LASTWEEK", DiscountType::Percentage, 25, -1).await;
    let api = CartApi::new(db.clone());

    api.add_item("cust-expired", NewLineItem::new("pad-thai", 1)).await.unwrap();
    let err = api.apply_coupon("cust-expired", "LASTWEEK").await.unwrap_err();
    assert!(matches!(err, CartError::CouponExpired(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let contents = api.cart("cust-expired").await.unwrap().unwrap();
    assert_eq!(contents.cart.coupon_code, None);
    assert_eq!(contents.cart.discount, Cents::from(0));

    let err = api.apply_coupon("cust-expired", "NOSUCHCODE").await.unwrap_err();
    assert!(matches!(err, CartError::CouponNotFound(_)));
}

#[tokio::test]
async fn checkout_snapshots_the_cart_and_destroys_it() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    seed_coupon(&db, "SAVE10", DiscountType::Percentage, 10, 24).await;
    let api = CartApi::new(db.clone());

    api.add_item("cust-checkout", NewLineItem::new("pad-thai", 2)).await.unwrap();
    api.apply_coupon("cust-checkout", "SAVE10").await.unwrap();
    let (order, payment) = api.checkout("cust-checkout", checkout_request()).await.unwrap();

    assert_eq!(order.items_total, Cents::from(2_400));
    assert_eq!(order.discount, Cents::from(240));
    // items - discount + delivery 399 + packaging 100 + taxes 250 + tip 500
    assert_eq!(order.grand_total, Cents::from(3_409));
    assert_eq!(payment.amount, order.grand_total);
    assert_eq!(order.restaurant_id, THAI_RESTAURANT);
    assert_eq!(order.delivery_address.line1, "12 Elm Street");

    // The cart is gone
    assert!(api.cart("cust-checkout").await.unwrap().is_none());

    // The payment is attached to the order
    let ledger = PaymentApi::new(db.clone());
    let fetched = ledger.payment_for_order(&order.order_id).await.unwrap();
    assert_eq!(fetched.id, payment.id);
}

#[tokio::test]
async fn menu_price_changes_never_touch_placed_orders() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    let api = CartApi::new(db.clone());

    api.add_item("cust-snapshot", NewLineItem::new("pad-thai", 2)).await.unwrap();
    let (order, _) = api.checkout("cust-snapshot", checkout_request()).await.unwrap();

    db.set_menu_item_price("pad-thai", Cents::from(9_900)).await.unwrap();

    let flow = order_flow(&db);
    let fetched = flow.fetch_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(fetched.items_total, Cents::from(2_400));
    let items = flow.order_items(&order.order_id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].unit_price, Cents::from(1_200));
    assert_eq!(items[0].item_total, Cents::from(2_400));

    // An open cart is snapshotted the same way: the line keeps its add-time price
    api.add_item("cust-snapshot-2", NewLineItem::new("green-curry", 1)).await.unwrap();
    db.set_menu_item_price("green-curry", Cents::from(8_800)).await.unwrap();
    let contents = api.add_item("cust-snapshot-2", NewLineItem::new("pad-thai", 1)).await.unwrap();
    assert_eq!(contents.items[0].unit_price, Cents::from(1_450));
}

#[tokio::test]
async fn empty_carts_cannot_check_out() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    let api = CartApi::new(db.clone());

    let err = api.checkout("cust-empty", checkout_request()).await.unwrap_err();
    assert!(matches!(err, CartError::CartNotFound(_)));

    let contents = api.add_item("cust-empty", NewLineItem::new("pad-thai", 1)).await.unwrap();
    api.remove_item("cust-empty", contents.items[0].id).await.unwrap();
    let err = api.checkout("cust-empty", checkout_request()).await.unwrap_err();
    assert!(matches!(err, CartError::EmptyCart(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

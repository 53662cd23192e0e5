use std::time::Duration;

use log::*;
use platter_order_engine::{
    db_types::{DeliveryAddress, MenuItem},
    test_utils::prepare_env::prepare_test_env,
    CartApi,
    CheckoutRequest,
    NewLineItem,
    SqliteDatabase,
};
use poe_common::Cents;
use tokio::runtime::Runtime;

const NUM_ORDERS: u64 = 20;
const RATE: u64 = 100; // checkouts per second

#[test]
fn burst_checkouts() {
    info!("🚀️ Starting checkout injection test");

    let sys = Runtime::new().unwrap();

    let delay = Duration::from_millis(1000 / RATE);

    sys.block_on(async move {
        let url = "sqlite://../data/test_burst_checkouts.db";
        prepare_test_env(url).await;
        let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating database");
        db.upsert_menu_item(&MenuItem {
            id: "burst-bowl".into(),
            restaurant_id: "burst-kitchen".into(),
            name: "Burst Bowl".into(),
            base_price: Cents::from(999),
            is_available: true,
        })
        .await
        .expect("Error seeding menu item");
        let api = CartApi::new(db);

        let mut timer = tokio::time::interval(delay);
        info!("🚀️ Injecting {NUM_ORDERS} checkouts");
        for i in 0..NUM_ORDERS {
            timer.tick().await;
            let customer = format!("burst-cust-{}", (i + 1) % 5);
            #[allow(clippy::cast_possible_wrap)]
            let quantity = (i % 3 + 1) as i64;
            if let Err(e) = api.add_item(&customer, NewLineItem::new("burst-bowl", quantity)).await {
                panic!("Error building cart {i}: {e}");
            }
            let request = CheckoutRequest {
                delivery_address: DeliveryAddress {
                    line1: format!("{i} Burst Road"),
                    line2: None,
                    city: "Loadtown".into(),
                    postcode: "00000".into(),
                    instructions: None,
                },
                delivery_fee: Cents::from(300),
                packaging_fee: Cents::from(50),
                taxes: Cents::from(120),
                tip: Cents::from(0),
            };
            if let Err(e) = api.checkout(&customer, request).await {
                panic!("Error processing checkout {i}: {e}");
            }
        }
    });
    info!("🚀️ test complete");
}

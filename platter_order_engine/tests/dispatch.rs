mod support;

use platter_order_engine::{db_types::OrderStatusType, DispatchApi, DispatchError, ErrorKind};
use support::*;

#[tokio::test]
async fn agents_carry_one_order_from_claim_to_completion() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    let dispatch = DispatchApi::new(db.clone());

    let agent = dispatch.register_agent("Dara").await.unwrap();
    assert!(!agent.is_available);
    let agent = dispatch.set_availability(agent.id, true).await.unwrap();
    assert!(agent.is_available);

    let order = place_order_at(&db, "cust-dispatch", OrderStatusType::Ready).await;
    let agent = dispatch.assign(agent.id, &order.order_id).await.unwrap();
    assert!(!agent.is_available);
    assert_eq!(agent.current_order_id, Some(order.id));

    // Carrying an order pins the agent off-shift
    let err = dispatch.set_availability(agent.id, true).await.unwrap_err();
    assert!(matches!(err, DispatchError::AgentOccupied(_)));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let agent = dispatch.complete(agent.id, Some(5.0)).await.unwrap();
    assert!(agent.is_available);
    assert_eq!(agent.current_order_id, None);
    assert_eq!(agent.completed_deliveries, 1);
    assert_eq!(agent.rating, 5.0);

    let history = dispatch.delivery_history(agent.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].order_id, order.id);
    assert_eq!(history[0].rating, Some(5.0));
}

#[tokio::test]
async fn only_dispatch_ready_orders_can_be_assigned() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    let dispatch = DispatchApi::new(db.clone());

    let agent = dispatch.register_agent("Femi").await.unwrap();
    dispatch.set_availability(agent.id, true).await.unwrap();

    let (order, _) = place_order(&db, "cust-not-ready").await;
    let err = dispatch.assign(agent.id, &order.order_id).await.unwrap_err();
    assert!(matches!(err, DispatchError::NotDispatchReady { status: OrderStatusType::Placed, .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = dispatch.assign(9_999, &order.order_id).await.unwrap_err();
    assert!(matches!(err, DispatchError::AgentNotFound(9_999)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = dispatch.assign(agent.id, &"PO-NOSUCHORD".parse().unwrap()).await.unwrap_err();
    assert!(matches!(err, DispatchError::OrderNotFound(_)));
}

#[tokio::test]
async fn rating_average_is_weighted_by_prior_deliveries() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    let dispatch = DispatchApi::new(db.clone());

    let agent = dispatch.register_agent("Priya").await.unwrap();
    dispatch.set_availability(agent.id, true).await.unwrap();

    // Three deliveries rated 4.0 leave the average at 4.0 with a weight of 3
    for n in 0..3 {
        let order = place_order_at(&db, &format!("cust-rating-{n}"), OrderStatusType::Ready).await;
        dispatch.assign(agent.id, &order.order_id).await.unwrap();
        dispatch.complete(agent.id, Some(4.0)).await.unwrap();
    }
    let agent = dispatch.agent(agent.id).await.unwrap().unwrap();
    assert_eq!(agent.completed_deliveries, 3);
    assert_eq!(agent.rating, 4.0);

    // (4.0 × 3 + 5) / 4
    let order = place_order_at(&db, "cust-rating-final", OrderStatusType::Ready).await;
    dispatch.assign(agent.id, &order.order_id).await.unwrap();
    let agent = dispatch.complete(agent.id, Some(5.0)).await.unwrap();
    assert_eq!(agent.completed_deliveries, 4);
    assert_eq!(agent.rating, 4.25);
}

#[tokio::test]
async fn unrated_completions_count_without_moving_the_average() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    let dispatch = DispatchApi::new(db.clone());

    let agent = dispatch.register_agent("Jonas").await.unwrap();
    dispatch.set_availability(agent.id, true).await.unwrap();

    let order = place_order_at(&db, "cust-rated", OrderStatusType::Ready).await;
    dispatch.assign(agent.id, &order.order_id).await.unwrap();
    dispatch.complete(agent.id, Some(3.0)).await.unwrap();

    let order = place_order_at(&db, "cust-unrated", OrderStatusType::Ready).await;
    dispatch.assign(agent.id, &order.order_id).await.unwrap();
    let agent = dispatch.complete(agent.id, None).await.unwrap();
    assert_eq!(agent.completed_deliveries, 2);
    assert_eq!(agent.rating, 3.0);
}

#[tokio::test]
async fn ratings_outside_the_scale_are_rejected() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    let dispatch = DispatchApi::new(db.clone());

    let agent = dispatch.register_agent("Sol").await.unwrap();
    dispatch.set_availability(agent.id, true).await.unwrap();
    let order = place_order_at(&db, "cust-bad-rating", OrderStatusType::Ready).await;
    dispatch.assign(agent.id, &order.order_id).await.unwrap();

    for bad in [0.0, 0.99, 5.01, -3.0] {
        let err = dispatch.complete(agent.id, Some(bad)).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRating(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    // The delivery is still in hand after the rejected ratings
    let agent = dispatch.agent(agent.id).await.unwrap().unwrap();
    assert_eq!(agent.current_order_id, Some(order.id));
    assert_eq!(agent.completed_deliveries, 0);
}

#[tokio::test]
async fn completion_requires_a_delivery_in_hand() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    let dispatch = DispatchApi::new(db.clone());

    let agent = dispatch.register_agent("Noor").await.unwrap();
    let err = dispatch.complete(agent.id, None).await.unwrap_err();
    assert!(matches!(err, DispatchError::NoActiveDelivery(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_on_one_agent_produce_one_winner() {
    let db = new_test_db().await;
    seed_menu(&db).await;
    let dispatch = DispatchApi::new(db.clone());

    let agent = dispatch.register_agent("Max").await.unwrap();
    dispatch.set_availability(agent.id, true).await.unwrap();
    let order_a = place_order_at(&db, "cust-race-a", OrderStatusType::Ready).await;
    let order_b = place_order_at(&db, "cust-race-b", OrderStatusType::Ready).await;

    let db_a = db.clone();
    let db_b = db.clone();
    let agent_id = agent.id;
    let a = tokio::spawn(async move { DispatchApi::new(db_a).assign(agent_id, &order_a.order_id).await });
    let b = tokio::spawn(async move { DispatchApi::new(db_b).assign(agent_id, &order_b.order_id).await });
    let (res_a, res_b) = (a.await.unwrap(), b.await.unwrap());

    let successes = [&res_a, &res_b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent claim must win: {res_a:?} / {res_b:?}");
    let loser = if res_a.is_err() { res_a.unwrap_err() } else { res_b.unwrap_err() };
    assert!(matches!(loser, DispatchError::AgentOccupied(_)));
    assert_eq!(loser.kind(), ErrorKind::Conflict);
}

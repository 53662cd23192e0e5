use chrono::{DateTime, Utc};
use log::{debug, trace};
use poe_common::Cents;
use sqlx::{sqlite::SqliteRow, types::Json, FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{
        CartLineItem,
        DeliveryAddress,
        Order,
        OrderId,
        OrderLineItem,
        OrderStatusEntry,
        OrderStatusType,
    },
    helpers::rounded_minutes_between,
    poe_api::order_objects::OrderQueryFilter,
    traits::{CartError, OrderFlowError},
};

/// Everything checkout snapshots into the order row itself. Line items ride along separately.
pub(crate) struct OrderSnapshotParams {
    pub order_id: OrderId,
    pub customer_id: String,
    pub restaurant_id: String,
    pub delivery_address: Json<DeliveryAddress>,
    pub items_total: Cents,
    pub discount: Cents,
    pub delivery_fee: Cents,
    pub packaging_fee: Cents,
    pub taxes: Cents,
    pub tip: Cents,
    pub grand_total: Cents,
    pub placed_at: DateTime<Utc>,
}

/// Inserts the order, its immutable line-item snapshot and the first status history entry. This
/// is not atomic on its own; checkout embeds it in a transaction and passes `&mut *tx`.
pub(crate) async fn insert_order(
    params: OrderSnapshotParams,
    items: &[CartLineItem],
    conn: &mut SqliteConnection,
) -> Result<Order, CartError> {
    let number = params.order_id.clone();
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                customer_id,
                restaurant_id,
                delivery_address,
                items_total,
                discount,
                delivery_fee,
                packaging_fee,
                taxes,
                tip,
                grand_total,
                status,
                placed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'Placed', $12)
            RETURNING *;
        "#,
    )
    .bind(params.order_id)
    .bind(params.customer_id)
    .bind(params.restaurant_id)
    .bind(params.delivery_address)
    .bind(params.items_total)
    .bind(params.discount)
    .bind(params.delivery_fee)
    .bind(params.packaging_fee)
    .bind(params.taxes)
    .bind(params.tip)
    .bind(params.grand_total)
    .bind(params.placed_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => CartError::OrderAlreadyExists(number),
        _ => CartError::from(e),
    })?;
    for item in items {
        sqlx::query(
            r#"
                INSERT INTO order_items (order_id, menu_item_id, name, unit_price, quantity, customizations, addons, item_total)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8);
            "#,
        )
        .bind(order.id)
        .bind(&item.menu_item_id)
        .bind(&item.name)
        .bind(item.unit_price)
        .bind(item.quantity)
        .bind(Json(item.customizations.0.clone()))
        .bind(Json(item.addons.0.clone()))
        .bind(item.item_total)
        .execute(&mut *conn)
        .await?;
    }
    append_status_entry(order.id, OrderStatusType::Placed, Some("Order placed"), params.placed_at, conn)
        .await
        .map_err(CartError::from)?;
    debug!("📝️ Order {} inserted with id {}", order.order_id, order.id);
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order: Option<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_items(
    order_internal_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderLineItem>, sqlx::Error> {
    let items: Vec<OrderLineItem> = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_internal_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// The append-only status history, oldest entry first.
pub async fn fetch_status_history(
    order_internal_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderStatusEntry>, sqlx::Error> {
    let entries: Vec<OrderStatusEntry> =
        sqlx::query_as("SELECT * FROM order_status_log WHERE order_id = $1 ORDER BY id ASC")
            .bind(order_internal_id)
            .fetch_all(conn)
            .await?;
    Ok(entries)
}

pub async fn append_status_entry(
    order_internal_id: i64,
    status: OrderStatusType,
    notes: Option<&str>,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO order_status_log (order_id, status, notes, created_at) VALUES ($1, $2, $3, $4)")
        .bind(order_internal_id)
        .bind(status.to_string())
        .bind(notes)
        .bind(at)
        .execute(conn)
        .await?;
    Ok(())
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `placed_at` in ascending order.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM orders
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_id) = query.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.0);
    }
    if let Some(cid) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(cid);
    }
    if let Some(rid) = query.restaurant_id {
        where_clause.push("restaurant_id = ");
        where_clause.push_bind_unseparated(rid);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let statuses =
            query.status.as_ref().unwrap().iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    if let Some(since) = query.since {
        where_clause.push("placed_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("placed_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY placed_at ASC");

    trace!("📝️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Order>();
    let orders = query.fetch_all(conn).await?;
    trace!("📝️ Result of search_orders: {:?}", orders.len());
    Ok(orders)
}

/// The milestone timestamps and derived durations to stamp alongside a status transition.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimingPatch {
    pub confirmed_at: Option<DateTime<Utc>>,
    pub preparation_started_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub preparation_minutes: Option<i64>,
    pub delivery_minutes: Option<i64>,
    pub total_minutes: Option<i64>,
}

/// Computes the timing patch for an order reaching `new_status` at `now`.
///
/// Derived durations require their predecessor milestone: reaching `Ready` without a
/// preparation start, or `Delivered` without a pickup, is an invalid state, and an out-of-order
/// clock never produces a negative duration.
pub(crate) fn milestone_patch(
    order: &Order,
    new_status: OrderStatusType,
    now: DateTime<Utc>,
) -> Result<TimingPatch, OrderFlowError> {
    let mut patch = TimingPatch::default();
    let missing = |milestone: &'static str| OrderFlowError::MissingMilestone {
        order_id: order.order_id.clone(),
        milestone,
    };
    let negative = |milestone: &'static str| OrderFlowError::NegativeDuration {
        order_id: order.order_id.clone(),
        milestone,
    };
    match new_status {
        OrderStatusType::Confirmed => patch.confirmed_at = Some(now),
        OrderStatusType::Preparing => patch.preparation_started_at = Some(now),
        OrderStatusType::Ready => {
            let started = order.preparation_started_at.ok_or_else(|| missing("preparation_started_at"))?;
            patch.ready_at = Some(now);
            patch.preparation_minutes =
                Some(rounded_minutes_between(started, now).ok_or_else(|| negative("preparation_started_at"))?);
        },
        OrderStatusType::PickedUp => patch.picked_up_at = Some(now),
        OrderStatusType::Delivered => {
            let picked_up = order.picked_up_at.ok_or_else(|| missing("picked_up_at"))?;
            patch.delivered_at = Some(now);
            patch.delivery_minutes =
                Some(rounded_minutes_between(picked_up, now).ok_or_else(|| negative("picked_up_at"))?);
            patch.total_minutes =
                Some(rounded_minutes_between(order.placed_at, now).ok_or_else(|| negative("placed_at"))?);
        },
        _ => {},
    }
    Ok(patch)
}

/// Applies a validated status transition. The update is conditional on the status the caller
/// read, so a concurrent transition leaves this one matching zero rows; `None` is returned and
/// the caller reports a conflict.
pub(crate) async fn transition_status(
    id: i64,
    from: OrderStatusType,
    to: OrderStatusType,
    patch: TimingPatch,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("UPDATE orders SET updated_at = CURRENT_TIMESTAMP, ");
    let mut set_clause = builder.separated(", ");
    set_clause.push("status = ");
    set_clause.push_bind_unseparated(to.to_string());
    if let Some(ts) = patch.confirmed_at {
        set_clause.push("confirmed_at = ");
        set_clause.push_bind_unseparated(ts);
    }
    if let Some(ts) = patch.preparation_started_at {
        set_clause.push("preparation_started_at = ");
        set_clause.push_bind_unseparated(ts);
    }
    if let Some(ts) = patch.ready_at {
        set_clause.push("ready_at = ");
        set_clause.push_bind_unseparated(ts);
    }
    if let Some(ts) = patch.picked_up_at {
        set_clause.push("picked_up_at = ");
        set_clause.push_bind_unseparated(ts);
    }
    if let Some(ts) = patch.delivered_at {
        set_clause.push("delivered_at = ");
        set_clause.push_bind_unseparated(ts);
    }
    if let Some(minutes) = patch.preparation_minutes {
        set_clause.push("preparation_minutes = ");
        set_clause.push_bind_unseparated(minutes);
    }
    if let Some(minutes) = patch.delivery_minutes {
        set_clause.push("delivery_minutes = ");
        set_clause.push_bind_unseparated(minutes);
    }
    if let Some(minutes) = patch.total_minutes {
        set_clause.push("total_minutes = ");
        set_clause.push_bind_unseparated(minutes);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" AND status = ");
    builder.push_bind(from.to_string());
    builder.push(" RETURNING *");
    trace!("📝️ Executing query: {}", builder.sql());
    let res = builder.build().fetch_optional(conn).await?.map(|row: SqliteRow| Order::from_row(&row)).transpose()?;
    Ok(res)
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;

    fn order_at(status: OrderStatusType) -> Order {
        let now = Utc::now();
        Order {
            id: 1,
            order_id: OrderId("PO-TEST000001".into()),
            customer_id: "cust-1".into(),
            restaurant_id: "resto-1".into(),
            delivery_address: Json(DeliveryAddress {
                line1: "1 Test Lane".into(),
                line2: None,
                city: "Testville".into(),
                postcode: "0001".into(),
                instructions: None,
            }),
            items_total: Cents::from(2_000),
            discount: Cents::from(0),
            delivery_fee: Cents::from(300),
            packaging_fee: Cents::from(50),
            taxes: Cents::from(150),
            tip: Cents::from(200),
            grand_total: Cents::from(2_700),
            currency: "USD".into(),
            status,
            placed_at: now - Duration::minutes(40),
            confirmed_at: None,
            preparation_started_at: None,
            ready_at: None,
            picked_up_at: None,
            delivered_at: None,
            preparation_minutes: None,
            delivery_minutes: None,
            total_minutes: None,
            created_at: now - Duration::minutes(40),
            updated_at: now - Duration::minutes(40),
        }
    }

    #[test]
    fn ready_requires_a_preparation_start() {
        let order = order_at(OrderStatusType::Preparing);
        let err = milestone_patch(&order, OrderStatusType::Ready, Utc::now()).unwrap_err();
        assert!(matches!(err, OrderFlowError::MissingMilestone { milestone: "preparation_started_at", .. }));
    }

    #[test]
    fn delivered_requires_a_pickup() {
        let order = order_at(OrderStatusType::Arrived);
        let err = milestone_patch(&order, OrderStatusType::Delivered, Utc::now()).unwrap_err();
        assert!(matches!(err, OrderFlowError::MissingMilestone { milestone: "picked_up_at", .. }));
    }

    #[test]
    fn out_of_order_clocks_never_store_negative_durations() {
        let mut order = order_at(OrderStatusType::Arrived);
        order.picked_up_at = Some(Utc::now() + Duration::minutes(10));
        let err = milestone_patch(&order, OrderStatusType::Delivered, Utc::now()).unwrap_err();
        assert!(matches!(err, OrderFlowError::NegativeDuration { milestone: "picked_up_at", .. }));
    }

    #[test]
    fn delivered_stamps_all_remaining_milestones() {
        let now = Utc::now();
        let mut order = order_at(OrderStatusType::Arrived);
        order.picked_up_at = Some(now - Duration::minutes(12));
        let patch = milestone_patch(&order, OrderStatusType::Delivered, now).unwrap();
        assert_eq!(patch.delivered_at, Some(now));
        assert_eq!(patch.delivery_minutes, Some(12));
        assert_eq!(patch.total_minutes, Some(40));
    }

    #[test]
    fn transit_stamps_are_plain_timestamps() {
        let now = Utc::now();
        let order = order_at(OrderStatusType::Placed);
        let patch = milestone_patch(&order, OrderStatusType::Confirmed, now).unwrap();
        assert_eq!(patch, TimingPatch { confirmed_at: Some(now), ..TimingPatch::default() });
    }
}

//! `SqliteDatabase` is a concrete implementation of an order fulfillment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the
//! [`crate::traits`] module.
//!
//! Per-entity serialization works in two steps everywhere: entities are read on a plain pool
//! connection, validated in Rust, and then mutated inside a transaction whose *first* statement
//! is a conditional write (a version bump for carts, a status or order-in-hand check-and-set for
//! everything else). A concurrent mutation makes the conditional write match zero rows, the
//! transaction rolls back, and the caller gets a conflict to retry with fresh state.
use std::fmt::Debug;

use chrono::Utc;
use log::*;
use poe_common::Cents;
use sqlx::SqlitePool;

use super::db::{agents, carts, catalog, db_url, new_pool, orders, payments};
use crate::{
    db_types::{
        Coupon,
        DeliveryAgent,
        DeliveryRecord,
        MenuItem,
        Order,
        OrderId,
        OrderLineItem,
        OrderStatusEntry,
        OrderStatusType,
        Payment,
        PaymentStatus,
        PaymentStatusEntry,
        Refund,
        RefundStatus,
    },
    helpers::new_order_number,
    poe_api::order_objects::OrderQueryFilter,
    pricing,
    traits::{
        CartContents,
        CartError,
        CartManagement,
        CheckoutRequest,
        DispatchError,
        DispatchManagement,
        NewLineItem,
        NewRefund,
        OrderFlowError,
        OrderManagement,
        PaymentLedger,
        PaymentLedgerError,
        StatusChange,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl CartManagement for SqliteDatabase {
    async fn fetch_cart(&self, customer_id: &str) -> Result<Option<CartContents>, CartError> {
        let mut conn = self.pool.acquire().await?;
        let cart = match carts::fetch_cart_for_customer(customer_id, &mut conn).await? {
            Some(cart) => cart,
            None => return Ok(None),
        };
        let items = carts::fetch_cart_items(cart.id, &mut conn).await?;
        Ok(Some(CartContents { cart, items }))
    }

    async fn add_item_to_cart(&self, customer_id: &str, item: NewLineItem) -> Result<CartContents, CartError> {
        let mut conn = self.pool.acquire().await?;
        let menu_item = catalog::fetch_menu_item(&item.menu_item_id, &mut conn)
            .await?
            .ok_or_else(|| CartError::MenuItemNotFound(item.menu_item_id.clone()))?;
        if !menu_item.is_available {
            return Err(CartError::MenuItemUnavailable(menu_item.id));
        }
        let cart = carts::fetch_or_create_cart(customer_id, &menu_item.restaurant_id, &mut conn).await?;
        if cart.restaurant_id != menu_item.restaurant_id {
            return Err(CartError::RestaurantMismatch {
                cart_restaurant: cart.restaurant_id,
                item_restaurant: menu_item.restaurant_id,
                menu_item_id: menu_item.id,
            });
        }
        drop(conn);
        let mut tx = self.pool.begin().await?;
        if !carts::claim_cart_version(cart.id, cart.version, &mut tx).await? {
            return Err(CartError::ConcurrentUpdate);
        }
        carts::insert_line_item(cart.id, &menu_item, &item, &mut tx).await?;
        let contents = carts::reprice(cart.id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Added {} × {} to cart {} for {customer_id}", item.quantity, menu_item.id, cart.id);
        Ok(contents)
    }

    async fn update_line_quantity(
        &self,
        customer_id: &str,
        line_id: i64,
        quantity: i64,
    ) -> Result<CartContents, CartError> {
        let mut conn = self.pool.acquire().await?;
        let cart = carts::fetch_cart_for_customer(customer_id, &mut conn)
            .await?
            .ok_or_else(|| CartError::CartNotFound(customer_id.to_string()))?;
        drop(conn);
        let mut tx = self.pool.begin().await?;
        if !carts::claim_cart_version(cart.id, cart.version, &mut tx).await? {
            return Err(CartError::ConcurrentUpdate);
        }
        carts::update_line_quantity(cart.id, line_id, quantity, &mut tx).await?;
        let contents = carts::reprice(cart.id, &mut tx).await?;
        tx.commit().await?;
        Ok(contents)
    }

    async fn remove_line_item(&self, customer_id: &str, line_id: i64) -> Result<CartContents, CartError> {
        let mut conn = self.pool.acquire().await?;
        let cart = carts::fetch_cart_for_customer(customer_id, &mut conn)
            .await?
            .ok_or_else(|| CartError::CartNotFound(customer_id.to_string()))?;
        drop(conn);
        let mut tx = self.pool.begin().await?;
        if !carts::claim_cart_version(cart.id, cart.version, &mut tx).await? {
            return Err(CartError::ConcurrentUpdate);
        }
        carts::delete_line_item(cart.id, line_id, &mut tx).await?;
        let contents = carts::reprice(cart.id, &mut tx).await?;
        tx.commit().await?;
        Ok(contents)
    }

    async fn apply_coupon_to_cart(&self, customer_id: &str, code: &str) -> Result<CartContents, CartError> {
        let mut conn = self.pool.acquire().await?;
        let cart = carts::fetch_cart_for_customer(customer_id, &mut conn)
            .await?
            .ok_or_else(|| CartError::CartNotFound(customer_id.to_string()))?;
        let coupon =
            catalog::fetch_coupon(code, &mut conn).await?.ok_or_else(|| CartError::CouponNotFound(code.to_string()))?;
        drop(conn);
        let mut tx = self.pool.begin().await?;
        if !carts::claim_cart_version(cart.id, cart.version, &mut tx).await? {
            return Err(CartError::ConcurrentUpdate);
        }
        if coupon.is_expired(Utc::now()) {
            // Cleared rather than applied.
            warn!("🗃️ Coupon {code} has expired; clearing it from cart {}", cart.id);
            carts::set_coupon(cart.id, None, &mut tx).await?;
            carts::reprice(cart.id, &mut tx).await?;
            tx.commit().await?;
            return Err(CartError::CouponExpired(code.to_string()));
        }
        carts::set_coupon(cart.id, Some(code), &mut tx).await?;
        let contents = carts::reprice(cart.id, &mut tx).await?;
        tx.commit().await?;
        Ok(contents)
    }

    async fn remove_coupon_from_cart(&self, customer_id: &str) -> Result<CartContents, CartError> {
        let mut conn = self.pool.acquire().await?;
        let cart = carts::fetch_cart_for_customer(customer_id, &mut conn)
            .await?
            .ok_or_else(|| CartError::CartNotFound(customer_id.to_string()))?;
        drop(conn);
        let mut tx = self.pool.begin().await?;
        if !carts::claim_cart_version(cart.id, cart.version, &mut tx).await? {
            return Err(CartError::ConcurrentUpdate);
        }
        carts::set_coupon(cart.id, None, &mut tx).await?;
        let contents = carts::reprice(cart.id, &mut tx).await?;
        tx.commit().await?;
        Ok(contents)
    }

    async fn clear_cart(&self, customer_id: &str) -> Result<(), CartError> {
        let mut conn = self.pool.acquire().await?;
        let cart = carts::fetch_cart_for_customer(customer_id, &mut conn)
            .await?
            .ok_or_else(|| CartError::CartNotFound(customer_id.to_string()))?;
        if !carts::delete_cart_checked(cart.id, cart.version, &mut conn).await? {
            return Err(CartError::ConcurrentUpdate);
        }
        debug!("🗃️ Cleared cart {} for {customer_id}", cart.id);
        Ok(())
    }

    async fn checkout_cart(
        &self,
        customer_id: &str,
        request: CheckoutRequest,
    ) -> Result<(Order, Payment), CartError> {
        let mut conn = self.pool.acquire().await?;
        let cart = carts::fetch_cart_for_customer(customer_id, &mut conn)
            .await?
            .ok_or_else(|| CartError::CartNotFound(customer_id.to_string()))?;
        let mut items = carts::fetch_cart_items(cart.id, &mut conn).await?;
        if items.is_empty() {
            return Err(CartError::EmptyCart(customer_id.to_string()));
        }
        let now = Utc::now();
        let coupon = match &cart.coupon_code {
            Some(code) => catalog::fetch_coupon(code, &mut conn).await?,
            None => None,
        };
        let coupon = coupon.filter(|c| {
            if c.is_expired(now) {
                warn!("🗃️ Coupon {} expired before checkout; pricing the order without it", c.code);
                false
            } else {
                true
            }
        });
        drop(conn);
        // Totals come from a fresh recompute over the snapshot being checked out, never from the
        // stored columns, so an order can never freeze stale totals.
        let breakdown = pricing::recompute(&mut items, coupon.as_ref(), now);
        let order_number = new_order_number();
        let grand_total =
            breakdown.grand_total + request.delivery_fee + request.packaging_fee + request.taxes + request.tip;
        let mut tx = self.pool.begin().await?;
        if !carts::delete_cart_checked(cart.id, cart.version, &mut tx).await? {
            return Err(CartError::ConcurrentUpdate);
        }
        let order = orders::insert_order(
            orders::OrderSnapshotParams {
                order_id: order_number,
                customer_id: customer_id.to_string(),
                restaurant_id: cart.restaurant_id.clone(),
                delivery_address: sqlx::types::Json(request.delivery_address),
                items_total: breakdown.total,
                discount: breakdown.discount,
                delivery_fee: request.delivery_fee,
                packaging_fee: request.packaging_fee,
                taxes: request.taxes,
                tip: request.tip,
                grand_total,
                placed_at: now,
            },
            &items,
            &mut tx,
        )
        .await?;
        let payment = payments::insert_payment(order.id, order.grand_total, &order.currency, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Cart {} checked out as order {} with payment {}", cart.id, order.order_id, payment.id);
        Ok((order, payment))
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderLineItem>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        let items = orders::fetch_order_items(order.id, &mut conn).await?;
        Ok(items)
    }

    async fn fetch_status_history(&self, order_id: &OrderId) -> Result<Vec<OrderStatusEntry>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        let entries = orders::fetch_status_history(order.id, &mut conn).await?;
        Ok(entries)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn advance_order_status(
        &self,
        order_id: &OrderId,
        new_status: OrderStatusType,
        notes: Option<String>,
    ) -> Result<StatusChange, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        if order.status.is_terminal() {
            return Err(OrderFlowError::TerminalOrder { order_id: order_id.clone(), status: order.status });
        }
        if !order.status.can_advance_to(new_status) {
            return Err(OrderFlowError::InvalidTransition {
                order_id: order_id.clone(),
                from: order.status,
                to: new_status,
            });
        }
        let now = Utc::now();
        let patch = orders::milestone_patch(&order, new_status, now)?;
        drop(conn);
        let mut tx = self.pool.begin().await?;
        let updated = orders::transition_status(order.id, order.status, new_status, patch, &mut tx)
            .await?
            .ok_or_else(|| OrderFlowError::ConcurrentUpdate(order_id.clone()))?;
        orders::append_status_entry(order.id, new_status, notes.as_deref(), now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} is now {new_status}");
        Ok(StatusChange { previous: order.status, order: updated })
    }
}

impl DispatchManagement for SqliteDatabase {
    async fn register_agent(&self, name: &str) -> Result<DeliveryAgent, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let agent = agents::insert_agent(name, &mut conn).await?;
        Ok(agent)
    }

    async fn fetch_agent(&self, agent_id: i64) -> Result<Option<DeliveryAgent>, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let agent = agents::fetch_agent(agent_id, &mut conn).await?;
        Ok(agent)
    }

    async fn set_agent_availability(&self, agent_id: i64, available: bool) -> Result<DeliveryAgent, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        agents::fetch_agent(agent_id, &mut conn).await?.ok_or(DispatchError::AgentNotFound(agent_id))?;
        let updated = if available {
            agents::mark_available(agent_id, &mut conn).await?
        } else {
            agents::mark_unavailable(agent_id, &mut conn).await?
        };
        updated.ok_or(DispatchError::AgentOccupied(agent_id))
    }

    async fn claim_order_for_agent(&self, agent_id: i64, order_id: &OrderId) -> Result<DeliveryAgent, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        agents::fetch_agent(agent_id, &mut conn).await?.ok_or(DispatchError::AgentNotFound(agent_id))?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn)
            .await?
            .ok_or_else(|| DispatchError::OrderNotFound(order_id.clone()))?;
        if !order.status.is_dispatch_ready() {
            return Err(DispatchError::NotDispatchReady { order_id: order_id.clone(), status: order.status });
        }
        let claimed = agents::claim_order(agent_id, order.id, &mut conn).await?;
        claimed.ok_or(DispatchError::AgentOccupied(agent_id))
    }

    async fn complete_delivery_for_agent(
        &self,
        agent_id: i64,
        rating: Option<f64>,
    ) -> Result<DeliveryAgent, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let agent = agents::fetch_agent(agent_id, &mut conn).await?.ok_or(DispatchError::AgentNotFound(agent_id))?;
        let order_internal_id = agent.current_order_id.ok_or(DispatchError::NoActiveDelivery(agent_id))?;
        // The running average is weighted by the delivery count *before* this completion.
        let new_rating = match rating {
            Some(r) => {
                (agent.rating * agent.completed_deliveries as f64 + r) / (agent.completed_deliveries + 1) as f64
            },
            None => agent.rating,
        };
        drop(conn);
        let mut tx = self.pool.begin().await?;
        let updated = agents::finish_delivery(agent_id, order_internal_id, new_rating, &mut tx)
            .await?
            .ok_or(DispatchError::NoActiveDelivery(agent_id))?;
        agents::record_delivery(agent_id, order_internal_id, rating, &mut tx).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delivery_history(&self, agent_id: i64) -> Result<Vec<DeliveryRecord>, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        agents::fetch_agent(agent_id, &mut conn).await?.ok_or(DispatchError::AgentNotFound(agent_id))?;
        let records = agents::delivery_history(agent_id, &mut conn).await?;
        Ok(records)
    }
}

impl PaymentLedger for SqliteDatabase {
    async fn fetch_payment(&self, payment_id: i64) -> Result<Option<Payment>, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment(payment_id, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_payment_for_order(&self, order_id: &OrderId) -> Result<Option<Payment>, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment_for_order(order_id, &mut conn).await?;
        Ok(payment)
    }

    async fn payment_status_history(&self, payment_id: i64) -> Result<Vec<PaymentStatusEntry>, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(payment_id, &mut conn).await?.ok_or(PaymentLedgerError::PaymentNotFound(payment_id))?;
        let entries = payments::status_history(payment_id, &mut conn).await?;
        Ok(entries)
    }

    async fn update_payment_status(
        &self,
        payment_id: i64,
        new_status: PaymentStatus,
    ) -> Result<Payment, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment(payment_id, &mut conn)
            .await?
            .ok_or(PaymentLedgerError::PaymentNotFound(payment_id))?;
        if !payment.status.can_transition_to(new_status) {
            return Err(PaymentLedgerError::InvalidStatusTransition { from: payment.status, to: new_status });
        }
        drop(conn);
        let mut tx = self.pool.begin().await?;
        let updated = payments::transition_status(payment_id, payment.status, new_status, &mut tx)
            .await?
            .ok_or(PaymentLedgerError::ConcurrentUpdate(payment_id))?;
        payments::append_status_entry(payment_id, new_status, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Payment {payment_id} moved from {} to {new_status}", payment.status);
        Ok(updated)
    }

    async fn insert_refund_request(&self, payment_id: i64, refund: NewRefund) -> Result<Refund, PaymentLedgerError> {
        if !refund.amount.is_positive() {
            return Err(PaymentLedgerError::InvalidRefundAmount(refund.amount));
        }
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment(payment_id, &mut conn)
            .await?
            .ok_or(PaymentLedgerError::PaymentNotFound(payment_id))?;
        if !payment.is_refundable() {
            return Err(PaymentLedgerError::NotRefundable { payment_id, status: payment.status });
        }
        drop(conn);
        let mut tx = self.pool.begin().await?;
        // Insert first: the write serializes concurrent refund requests against this payment,
        // and the balance check below reads the ledger as it stands with the lock held. The
        // inserted row is still `Requested`, so it does not count towards the completed total.
        let inserted = payments::insert_refund(payment_id, &refund, &mut tx).await?;
        let completed = payments::completed_refund_total(payment_id, &mut tx).await?;
        let remaining = payment.amount - completed;
        if refund.amount > remaining {
            return Err(PaymentLedgerError::ExceedsRemainingBalance { requested: refund.amount, remaining });
        }
        let new_status =
            if refund.amount == remaining { PaymentStatus::Refunded } else { PaymentStatus::PartiallyRefunded };
        payments::transition_status(payment_id, payment.status, new_status, &mut tx)
            .await?
            .ok_or(PaymentLedgerError::ConcurrentUpdate(payment_id))?;
        payments::append_status_entry(payment_id, new_status, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Refund {} of {} recorded against payment {payment_id}", inserted.id, inserted.amount);
        Ok(inserted)
    }

    async fn update_refund_status(
        &self,
        refund_id: i64,
        new_status: RefundStatus,
    ) -> Result<Refund, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let refund =
            payments::fetch_refund(refund_id, &mut conn).await?.ok_or(PaymentLedgerError::RefundNotFound(refund_id))?;
        if !refund.status.can_transition_to(new_status) {
            return Err(PaymentLedgerError::InvalidRefundTransition { from: refund.status, to: new_status });
        }
        let updated = payments::transition_refund_status(refund_id, refund.status, new_status, &mut conn)
            .await?
            .ok_or(PaymentLedgerError::ConcurrentUpdate(refund.payment_id))?;
        Ok(updated)
    }

    async fn refunded_amount(&self, payment_id: i64) -> Result<Cents, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(payment_id, &mut conn).await?.ok_or(PaymentLedgerError::PaymentNotFound(payment_id))?;
        let total = payments::completed_refund_total(payment_id, &mut conn).await?;
        Ok(total)
    }

    async fn refunds_for_payment(&self, payment_id: i64) -> Result<Vec<Refund>, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(payment_id, &mut conn).await?.ok_or(PaymentLedgerError::PaymentNotFound(payment_id))?;
        let refunds = payments::refunds_for_payment(payment_id, &mut conn).await?;
        Ok(refunds)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from `POE_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&mut self) {
        self.pool.close().await;
    }

    /// Seeds or updates a menu item. Catalog data belongs to the restaurant collaborator; this
    /// is the doorway it (and the test suite) uses.
    pub async fn upsert_menu_item(&self, item: &MenuItem) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        catalog::upsert_menu_item(item, &mut conn).await
    }

    pub async fn set_menu_item_price(&self, id: &str, price: Cents) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        catalog::set_menu_item_price(id, price, &mut conn).await
    }

    /// Seeds or updates a coupon. Coupon data belongs to the marketplace collaborator.
    pub async fn upsert_coupon(&self, coupon: &Coupon) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        catalog::upsert_coupon(coupon, &mut conn).await
    }
}

use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Order, OrderId, OrderLineItem, OrderStatusEntry, OrderStatusType},
    events::{EventProducers, OrderDeliveredEvent, OrderStatusChangedEvent},
    poe_api::order_objects::OrderQueryFilter,
    traits::{OrderFlowError, OrderManagement, StatusChange},
};

/// `OrderFlowApi` is the primary API for driving placed orders through the fulfillment
/// lifecycle in response to restaurant, dispatch and delivery events.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: OrderManagement
{
    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        self.db.fetch_order(order_id).await
    }

    pub async fn order_items(&self, order_id: &OrderId) -> Result<Vec<OrderLineItem>, OrderFlowError> {
        self.db.fetch_order_items(order_id).await
    }

    pub async fn status_history(&self, order_id: &OrderId) -> Result<Vec<OrderStatusEntry>, OrderFlowError> {
        self.db.fetch_status_history(order_id).await
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        self.db.search_orders(query).await
    }

    /// Moves an order one step through the lifecycle.
    ///
    /// The transition is validated and applied atomically by the backend; the relevant
    /// milestone timestamp and any derived durations are stamped in the same unit of work.
    /// Subscribers are notified *after* the transition has committed, so a slow or failing
    /// subscriber can never roll back an order.
    pub async fn advance(
        &self,
        order_id: &OrderId,
        new_status: OrderStatusType,
        notes: Option<String>,
    ) -> Result<Order, OrderFlowError> {
        let change = self.db.advance_order_status(order_id, new_status, notes).await?;
        debug!("🔄️📦️ Order {order_id} moved from {} to {}", change.previous, change.order.status);
        self.call_status_changed_hook(&change).await;
        if change.order.status == OrderStatusType::Delivered {
            self.call_delivered_hook(&change).await;
        }
        Ok(change.order)
    }

    /// Cancels the order. Valid from any non-terminal status.
    pub async fn cancel(&self, order_id: &OrderId, notes: Option<String>) -> Result<Order, OrderFlowError> {
        self.advance(order_id, OrderStatusType::Cancelled, notes).await
    }

    /// Rejects the order on the restaurant's behalf. Valid from any non-terminal status.
    pub async fn reject(&self, order_id: &OrderId, notes: Option<String>) -> Result<Order, OrderFlowError> {
        self.advance(order_id, OrderStatusType::Rejected, notes).await
    }

    async fn call_status_changed_hook(&self, change: &StatusChange) {
        for emitter in &self.producers.status_changed_producer {
            trace!("🔄️📦️ Notifying status-changed hook subscribers");
            let event = OrderStatusChangedEvent::new(change.previous, change.order.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_delivered_hook(&self, change: &StatusChange) {
        for emitter in &self.producers.order_delivered_producer {
            trace!("🔄️📦️ Notifying order-delivered hook subscribers");
            let event = OrderDeliveredEvent::new(change.order.clone());
            emitter.publish_event(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

use crate::db_types::{Order, OrderStatusType};

/// Emitted after every committed order status transition.
#[derive(Debug, Clone)]
pub struct OrderStatusChangedEvent {
    pub previous: OrderStatusType,
    pub order: Order,
}

impl OrderStatusChangedEvent {
    pub fn new(previous: OrderStatusType, order: Order) -> Self {
        Self { previous, order }
    }
}

/// Emitted once when an order reaches `Delivered`.
#[derive(Debug, Clone)]
pub struct OrderDeliveredEvent {
    pub order: Order,
}

impl OrderDeliveredEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

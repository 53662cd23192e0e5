use thiserror::Error;

use crate::{
    db_types::{ConversionError, Order, OrderId, OrderLineItem, OrderStatusEntry, OrderStatusType},
    poe_api::order_objects::OrderQueryFilter,
    traits::{ErrorKind, StatusChange},
};

/// Storage behaviour for placed orders: reads, searches, and the status state machine.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError>;

    /// The immutable line-item snapshot taken at checkout.
    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderLineItem>, OrderFlowError>;

    /// The append-only status history, oldest first.
    async fn fetch_status_history(&self, order_id: &OrderId) -> Result<Vec<OrderStatusEntry>, OrderFlowError>;

    /// Fetches orders according to the criteria in the filter, ordered by placement time.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError>;

    /// Moves an order to `new_status`, appending a history entry and stamping the milestone
    /// timestamps and derived durations for the status reached, all in one atomic unit of work.
    ///
    /// The transition must be legal per [`OrderStatusType::can_advance_to`]; a transition
    /// requested on a terminal order is a conflict, an illegal successor is an invalid-state
    /// error. The status write is conditional on the status the order was read at, so a
    /// concurrent transition surfaces as a conflict rather than a lost update.
    async fn advance_order_status(
        &self,
        order_id: &OrderId,
        new_status: OrderStatusType,
        notes: Option<String>,
    ) -> Result<StatusChange, OrderFlowError>;
}

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("We have an internal database engine error: {0}")]
    DatabaseError(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {order_id} is {status}, which is terminal; no further transitions are possible")]
    TerminalOrder { order_id: OrderId, status: OrderStatusType },
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition { order_id: OrderId, from: OrderStatusType, to: OrderStatusType },
    #[error("{0}")]
    UnknownStatus(String),
    #[error("Order {order_id} has no {milestone} timestamp; cannot derive a duration from it")]
    MissingMilestone { order_id: OrderId, milestone: &'static str },
    #[error("Order {order_id}'s {milestone} timestamp is later than now; refusing to store a negative duration")]
    NegativeDuration { order_id: OrderId, milestone: &'static str },
    #[error("Order {0} was modified concurrently; retry with fresh state")]
    ConcurrentUpdate(OrderId),
}

impl OrderFlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderFlowError::DatabaseError(_) => ErrorKind::Internal,
            OrderFlowError::OrderNotFound(_) => ErrorKind::NotFound,
            OrderFlowError::TerminalOrder { .. } | OrderFlowError::ConcurrentUpdate(_) => ErrorKind::Conflict,
            OrderFlowError::InvalidTransition { .. } | OrderFlowError::MissingMilestone { .. } |
            OrderFlowError::NegativeDuration { .. } => ErrorKind::InvalidState,
            OrderFlowError::UnknownStatus(_) => ErrorKind::InvalidArgument,
        }
    }
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        OrderFlowError::DatabaseError(e.to_string())
    }
}

impl From<ConversionError> for OrderFlowError {
    fn from(e: ConversionError) -> Self {
        OrderFlowError::UnknownStatus(e.0)
    }
}

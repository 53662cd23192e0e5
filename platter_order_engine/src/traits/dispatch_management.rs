use thiserror::Error;

use crate::{
    db_types::{DeliveryAgent, DeliveryRecord, OrderId, OrderStatusType},
    traits::ErrorKind,
};

/// Storage behaviour for delivery agents: availability, order handoff and the rating aggregate.
///
/// The availability invariant (`is_available` is false whenever an order is in hand) is enforced
/// at claim and completion time, by writing the pair together in single conditional statements.
#[allow(async_fn_in_trait)]
pub trait DispatchManagement: Clone {
    async fn register_agent(&self, name: &str) -> Result<DeliveryAgent, DispatchError>;

    async fn fetch_agent(&self, agent_id: i64) -> Result<Option<DeliveryAgent>, DispatchError>;

    /// Flips the agent's availability flag. An agent carrying an order cannot be made available.
    async fn set_agent_availability(&self, agent_id: i64, available: bool) -> Result<DeliveryAgent, DispatchError>;

    /// Hands a dispatch-ready order to the agent.
    ///
    /// The claim is a single conditional update (`is_available` and no order in hand), so of two
    /// concurrent claims on the same idle agent exactly one succeeds; the other observes a
    /// conflict.
    async fn claim_order_for_agent(&self, agent_id: i64, order_id: &OrderId) -> Result<DeliveryAgent, DispatchError>;

    /// Completes the agent's current delivery: appends it to the delivery history, bumps
    /// `completed_deliveries`, folds `rating` into the running average (weighted by the
    /// pre-increment delivery count), clears the order in hand and restores availability, all in
    /// one atomic unit of work.
    async fn complete_delivery_for_agent(
        &self,
        agent_id: i64,
        rating: Option<f64>,
    ) -> Result<DeliveryAgent, DispatchError>;

    /// The agent's append-only delivery history, oldest first.
    async fn delivery_history(&self, agent_id: i64) -> Result<Vec<DeliveryRecord>, DispatchError>;
}

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("We have an internal database engine error: {0}")]
    DatabaseError(String),
    #[error("Delivery agent {0} does not exist")]
    AgentNotFound(i64),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {order_id} is {status}; only dispatch-ready orders can be assigned")]
    NotDispatchReady { order_id: OrderId, status: OrderStatusType },
    #[error("Delivery agent {0} is unavailable or already carrying an order")]
    AgentOccupied(i64),
    #[error("Delivery agent {0} has no delivery in progress")]
    NoActiveDelivery(i64),
    #[error("Rating {0} is out of range; ratings run from 1 to 5")]
    InvalidRating(f64),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::DatabaseError(_) => ErrorKind::Internal,
            DispatchError::AgentNotFound(_) | DispatchError::OrderNotFound(_) => ErrorKind::NotFound,
            DispatchError::NotDispatchReady { .. } | DispatchError::NoActiveDelivery(_) => ErrorKind::InvalidState,
            DispatchError::AgentOccupied(_) => ErrorKind::Conflict,
            DispatchError::InvalidRating(_) => ErrorKind::InvalidArgument,
        }
    }
}

impl From<sqlx::Error> for DispatchError {
    fn from(e: sqlx::Error) -> Self {
        DispatchError::DatabaseError(e.to_string())
    }
}

use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{DeliveryAgent, DeliveryRecord, OrderId},
    traits::{DispatchError, DispatchManagement},
};

const MIN_RATING: f64 = 1.0;
const MAX_RATING: f64 = 5.0;

/// `DispatchApi` hands dispatch-ready orders to delivery agents and keeps the per-agent rating
/// aggregate.
pub struct DispatchApi<B> {
    db: B,
}

impl<B> Debug for DispatchApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DispatchApi")
    }
}

impl<B> DispatchApi<B>
where B: DispatchManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn register_agent(&self, name: &str) -> Result<DeliveryAgent, DispatchError> {
        let agent = self.db.register_agent(name).await?;
        info!("🛵️ Registered delivery agent {} ({})", agent.name, agent.id);
        Ok(agent)
    }

    pub async fn agent(&self, agent_id: i64) -> Result<Option<DeliveryAgent>, DispatchError> {
        self.db.fetch_agent(agent_id).await
    }

    /// Takes an agent on or off shift. Going available while carrying an order is a conflict.
    pub async fn set_availability(&self, agent_id: i64, available: bool) -> Result<DeliveryAgent, DispatchError> {
        self.db.set_agent_availability(agent_id, available).await
    }

    /// Assigns a dispatch-ready order to an idle agent.
    ///
    /// Exactly one of any number of concurrent assignments for the same agent wins; the rest
    /// fail with a conflict and can pick another agent.
    pub async fn assign(&self, agent_id: i64, order_id: &OrderId) -> Result<DeliveryAgent, DispatchError> {
        let agent = self.db.claim_order_for_agent(agent_id, order_id).await?;
        info!("🛵️ Order {order_id} assigned to agent {}", agent.id);
        Ok(agent)
    }

    /// Completes the agent's current delivery, optionally folding a customer rating into the
    /// agent's running average.
    pub async fn complete(&self, agent_id: i64, rating: Option<f64>) -> Result<DeliveryAgent, DispatchError> {
        if let Some(r) = rating {
            if !(MIN_RATING..=MAX_RATING).contains(&r) {
                return Err(DispatchError::InvalidRating(r));
            }
        }
        let agent = self.db.complete_delivery_for_agent(agent_id, rating).await?;
        debug!(
            "🛵️ Agent {} completed delivery #{}; rating now {:.2}",
            agent.id, agent.completed_deliveries, agent.rating
        );
        Ok(agent)
    }

    pub async fn delivery_history(&self, agent_id: i64) -> Result<Vec<DeliveryRecord>, DispatchError> {
        self.db.delivery_history(agent_id).await
    }
}

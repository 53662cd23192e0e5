use sqlx::SqliteConnection;

use crate::db_types::{DeliveryAgent, DeliveryRecord};

pub async fn insert_agent(name: &str, conn: &mut SqliteConnection) -> Result<DeliveryAgent, sqlx::Error> {
    let agent: DeliveryAgent =
        sqlx::query_as("INSERT INTO delivery_agents (name) VALUES ($1) RETURNING *").bind(name).fetch_one(conn).await?;
    Ok(agent)
}

pub async fn fetch_agent(agent_id: i64, conn: &mut SqliteConnection) -> Result<Option<DeliveryAgent>, sqlx::Error> {
    let agent: Option<DeliveryAgent> =
        sqlx::query_as("SELECT * FROM delivery_agents WHERE id = $1").bind(agent_id).fetch_optional(conn).await?;
    Ok(agent)
}

/// Puts the agent on shift. Refuses (matches zero rows) while an order is in hand, since an
/// agent carrying an order is by definition not available.
pub async fn mark_available(agent_id: i64, conn: &mut SqliteConnection) -> Result<Option<DeliveryAgent>, sqlx::Error> {
    let agent: Option<DeliveryAgent> = sqlx::query_as(
        r#"
            UPDATE delivery_agents SET is_available = 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND current_order_id IS NULL
            RETURNING *;
        "#,
    )
    .bind(agent_id)
    .fetch_optional(conn)
    .await?;
    Ok(agent)
}

/// Takes the agent off shift. Always permitted; an in-flight delivery still has to be completed.
pub async fn mark_unavailable(
    agent_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<DeliveryAgent>, sqlx::Error> {
    let agent: Option<DeliveryAgent> = sqlx::query_as(
        "UPDATE delivery_agents SET is_available = 0, updated_at = CURRENT_TIMESTAMP WHERE id = $1 RETURNING *",
    )
    .bind(agent_id)
    .fetch_optional(conn)
    .await?;
    Ok(agent)
}

/// The assignment claim. A single conditional update: the agent gets the order if and only if
/// they are available with no order in hand, so two concurrent claims cannot both succeed.
pub async fn claim_order(
    agent_id: i64,
    order_internal_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<DeliveryAgent>, sqlx::Error> {
    let agent: Option<DeliveryAgent> = sqlx::query_as(
        r#"
            UPDATE delivery_agents SET current_order_id = $1, is_available = 0, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND is_available = 1 AND current_order_id IS NULL
            RETURNING *;
        "#,
    )
    .bind(order_internal_id)
    .bind(agent_id)
    .fetch_optional(conn)
    .await?;
    Ok(agent)
}

/// Clears the order in hand, restores availability, bumps the delivery counter and stores the
/// recomputed rating, conditional on the agent still carrying the order the caller read.
pub async fn finish_delivery(
    agent_id: i64,
    order_internal_id: i64,
    new_rating: f64,
    conn: &mut SqliteConnection,
) -> Result<Option<DeliveryAgent>, sqlx::Error> {
    let agent: Option<DeliveryAgent> = sqlx::query_as(
        r#"
            UPDATE delivery_agents SET
                current_order_id = NULL,
                is_available = 1,
                completed_deliveries = completed_deliveries + 1,
                rating = $1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND current_order_id = $3
            RETURNING *;
        "#,
    )
    .bind(new_rating)
    .bind(agent_id)
    .bind(order_internal_id)
    .fetch_optional(conn)
    .await?;
    Ok(agent)
}

pub async fn record_delivery(
    agent_id: i64,
    order_internal_id: i64,
    rating: Option<f64>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO agent_deliveries (agent_id, order_id, rating) VALUES ($1, $2, $3)")
        .bind(agent_id)
        .bind(order_internal_id)
        .bind(rating)
        .execute(conn)
        .await?;
    Ok(())
}

/// The agent's append-only delivery history, oldest first.
pub async fn delivery_history(
    agent_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<DeliveryRecord>, sqlx::Error> {
    let records: Vec<DeliveryRecord> =
        sqlx::query_as("SELECT * FROM agent_deliveries WHERE agent_id = $1 ORDER BY id ASC")
            .bind(agent_id)
            .fetch_all(conn)
            .await?;
    Ok(records)
}

use poe_common::Cents;
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderId, Payment, PaymentStatus, PaymentStatusEntry, Refund, RefundStatus},
    traits::{CartError, NewRefund},
};

/// Creates the `Initiated` payment for a freshly placed order, along with its first status
/// history entry. Checkout embeds this in its transaction.
pub(crate) async fn insert_payment(
    order_internal_id: i64,
    amount: Cents,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<Payment, CartError> {
    let payment: Payment =
        sqlx::query_as("INSERT INTO payments (order_id, amount, currency) VALUES ($1, $2, $3) RETURNING *")
            .bind(order_internal_id)
            .bind(amount)
            .bind(currency)
            .fetch_one(&mut *conn)
            .await?;
    append_status_entry(payment.id, PaymentStatus::Initiated, conn).await.map_err(CartError::from)?;
    Ok(payment)
}

pub async fn fetch_payment(payment_id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    let payment: Option<Payment> =
        sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(payment_id).fetch_optional(conn).await?;
    Ok(payment)
}

pub async fn fetch_payment_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment: Option<Payment> = sqlx::query_as(
        r#"
            SELECT payments.* FROM payments JOIN orders ON payments.order_id = orders.id
            WHERE orders.order_id = $1;
        "#,
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// The payment's append-only status history, oldest first.
pub async fn status_history(
    payment_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentStatusEntry>, sqlx::Error> {
    let entries: Vec<PaymentStatusEntry> =
        sqlx::query_as("SELECT * FROM payment_status_log WHERE payment_id = $1 ORDER BY id ASC")
            .bind(payment_id)
            .fetch_all(conn)
            .await?;
    Ok(entries)
}

pub async fn append_status_entry(
    payment_id: i64,
    status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO payment_status_log (payment_id, status) VALUES ($1, $2)")
        .bind(payment_id)
        .bind(status.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

/// Applies a validated payment status change, conditional on the status the caller read.
/// Returns `None` when a concurrent transition got there first.
pub(crate) async fn transition_status(
    payment_id: i64,
    from: PaymentStatus,
    to: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment: Option<Payment> = sqlx::query_as(
        r#"
            UPDATE payments SET status = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = $3
            RETURNING *;
        "#,
    )
    .bind(to.to_string())
    .bind(payment_id)
    .bind(from.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// The sum of this payment's completed refunds. Requested, processing and failed refunds do not
/// count towards the refunded total.
pub async fn completed_refund_total(payment_id: i64, conn: &mut SqliteConnection) -> Result<Cents, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM refunds WHERE payment_id = $1 AND status = 'Completed'",
    )
    .bind(payment_id)
    .fetch_one(conn)
    .await?;
    Ok(Cents::from(total))
}

pub(crate) async fn insert_refund(
    payment_id: i64,
    refund: &NewRefund,
    conn: &mut SqliteConnection,
) -> Result<Refund, sqlx::Error> {
    let refund: Refund = sqlx::query_as(
        "INSERT INTO refunds (payment_id, amount, reason, initiated_by) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(payment_id)
    .bind(refund.amount)
    .bind(&refund.reason)
    .bind(&refund.initiated_by)
    .fetch_one(conn)
    .await?;
    Ok(refund)
}

pub async fn fetch_refund(refund_id: i64, conn: &mut SqliteConnection) -> Result<Option<Refund>, sqlx::Error> {
    let refund: Option<Refund> =
        sqlx::query_as("SELECT * FROM refunds WHERE id = $1").bind(refund_id).fetch_optional(conn).await?;
    Ok(refund)
}

/// Applies a validated refund status change, conditional on the status the caller read.
pub(crate) async fn transition_refund_status(
    refund_id: i64,
    from: RefundStatus,
    to: RefundStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Refund>, sqlx::Error> {
    let refund: Option<Refund> = sqlx::query_as(
        r#"
            UPDATE refunds SET status = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = $3
            RETURNING *;
        "#,
    )
    .bind(to.to_string())
    .bind(refund_id)
    .bind(from.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(refund)
}

/// All refund records for a payment, oldest first.
pub async fn refunds_for_payment(payment_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Refund>, sqlx::Error> {
    let refunds: Vec<Refund> = sqlx::query_as("SELECT * FROM refunds WHERE payment_id = $1 ORDER BY id ASC")
        .bind(payment_id)
        .fetch_all(conn)
        .await?;
    Ok(refunds)
}

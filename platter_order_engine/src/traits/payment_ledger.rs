use poe_common::Cents;
use thiserror::Error;

use crate::{
    db_types::{OrderId, Payment, PaymentStatus, PaymentStatusEntry, Refund, RefundStatus},
    traits::{ErrorKind, NewRefund},
};

/// Storage behaviour for payments and their refund sub-ledger.
#[allow(async_fn_in_trait)]
pub trait PaymentLedger: Clone {
    async fn fetch_payment(&self, payment_id: i64) -> Result<Option<Payment>, PaymentLedgerError>;

    async fn fetch_payment_for_order(&self, order_id: &OrderId) -> Result<Option<Payment>, PaymentLedgerError>;

    /// The payment's append-only status history, oldest first.
    async fn payment_status_history(&self, payment_id: i64) -> Result<Vec<PaymentStatusEntry>, PaymentLedgerError>;

    /// Moves a payment to `new_status` and appends a history entry, in one atomic unit of work.
    ///
    /// The transition must be legal per [`PaymentStatus::can_transition_to`]. The write is
    /// conditional on the status the payment was read at, so a concurrent transition surfaces as
    /// a conflict.
    async fn update_payment_status(
        &self,
        payment_id: i64,
        new_status: PaymentStatus,
    ) -> Result<Payment, PaymentLedgerError>;

    /// Raises a refund request against a refundable payment.
    ///
    /// The request amount must not exceed the payment amount less all *completed* refunds. On
    /// success the refund is recorded as `Requested` and the payment moves to `Refunded` when
    /// the request consumes the remaining balance exactly, `PartiallyRefunded` otherwise.
    async fn insert_refund_request(&self, payment_id: i64, refund: NewRefund) -> Result<Refund, PaymentLedgerError>;

    /// Moves a refund record through its own lifecycle
    /// (`Requested → Processing → Completed | Failed`).
    async fn update_refund_status(&self, refund_id: i64, new_status: RefundStatus)
        -> Result<Refund, PaymentLedgerError>;

    /// The sum of this payment's `Completed` refunds. Requested, processing and failed refunds
    /// do not count.
    async fn refunded_amount(&self, payment_id: i64) -> Result<Cents, PaymentLedgerError>;

    /// All refund records for the payment, oldest first.
    async fn refunds_for_payment(&self, payment_id: i64) -> Result<Vec<Refund>, PaymentLedgerError>;
}

#[derive(Debug, Clone, Error)]
pub enum PaymentLedgerError {
    #[error("We have an internal database engine error: {0}")]
    DatabaseError(String),
    #[error("Payment {0} does not exist")]
    PaymentNotFound(i64),
    #[error("No payment exists for order {0}")]
    PaymentNotFoundForOrder(OrderId),
    #[error("Refund {0} does not exist")]
    RefundNotFound(i64),
    #[error("Payment {payment_id} is {status} and cannot be refunded")]
    NotRefundable { payment_id: i64, status: PaymentStatus },
    #[error("Refund amount must be positive, got {0}")]
    InvalidRefundAmount(Cents),
    #[error("Refund of {requested} exceeds the remaining balance of {remaining}")]
    ExceedsRemainingBalance { requested: Cents, remaining: Cents },
    #[error("Payment cannot move from {from} to {to}")]
    InvalidStatusTransition { from: PaymentStatus, to: PaymentStatus },
    #[error("Refund cannot move from {from} to {to}")]
    InvalidRefundTransition { from: RefundStatus, to: RefundStatus },
    #[error("Payment {0} was modified concurrently; retry with fresh state")]
    ConcurrentUpdate(i64),
}

impl PaymentLedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentLedgerError::DatabaseError(_) => ErrorKind::Internal,
            PaymentLedgerError::PaymentNotFound(_) | PaymentLedgerError::PaymentNotFoundForOrder(_) |
            PaymentLedgerError::RefundNotFound(_) => ErrorKind::NotFound,
            PaymentLedgerError::NotRefundable { .. } | PaymentLedgerError::InvalidStatusTransition { .. } |
            PaymentLedgerError::InvalidRefundTransition { .. } => ErrorKind::InvalidState,
            PaymentLedgerError::InvalidRefundAmount(_) | PaymentLedgerError::ExceedsRemainingBalance { .. } => {
                ErrorKind::InvalidArgument
            },
            PaymentLedgerError::ConcurrentUpdate(_) => ErrorKind::Conflict,
        }
    }
}

impl From<sqlx::Error> for PaymentLedgerError {
    fn from(e: sqlx::Error) -> Self {
        PaymentLedgerError::DatabaseError(e.to_string())
    }
}

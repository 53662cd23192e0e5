use std::fmt::Debug;

use log::*;
use poe_common::Cents;

use crate::{
    db_types::{OrderId, Payment, PaymentStatus, PaymentStatusEntry, Refund, RefundStatus},
    traits::{NewRefund, PaymentLedger, PaymentLedgerError},
};

/// `PaymentApi` tracks a payment's processor lifecycle and its refund sub-ledger.
pub struct PaymentApi<B> {
    db: B,
}

impl<B> Debug for PaymentApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentApi")
    }
}

impl<B> PaymentApi<B>
where B: PaymentLedger
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn payment(&self, payment_id: i64) -> Result<Option<Payment>, PaymentLedgerError> {
        self.db.fetch_payment(payment_id).await
    }

    pub async fn payment_for_order(&self, order_id: &OrderId) -> Result<Payment, PaymentLedgerError> {
        self.db
            .fetch_payment_for_order(order_id)
            .await?
            .ok_or_else(|| PaymentLedgerError::PaymentNotFoundForOrder(order_id.clone()))
    }

    pub async fn status_history(&self, payment_id: i64) -> Result<Vec<PaymentStatusEntry>, PaymentLedgerError> {
        self.db.payment_status_history(payment_id).await
    }

    /// Records a processor-driven status change (e.g. from a payment gateway webhook).
    pub async fn update_status(
        &self,
        payment_id: i64,
        new_status: PaymentStatus,
    ) -> Result<Payment, PaymentLedgerError> {
        let payment = self.db.update_payment_status(payment_id, new_status).await?;
        debug!("💳️ Payment {payment_id} is now {}", payment.status);
        Ok(payment)
    }

    /// Raises a refund against a completed (or partially refunded) payment.
    ///
    /// The refund amount is checked against the remaining balance — the payment amount less all
    /// completed refunds — and the payment's status moves to `Refunded` when the request takes
    /// the remaining balance to zero, `PartiallyRefunded` otherwise.
    pub async fn initiate_refund(&self, payment_id: i64, refund: NewRefund) -> Result<Refund, PaymentLedgerError> {
        if !refund.amount.is_positive() {
            return Err(PaymentLedgerError::InvalidRefundAmount(refund.amount));
        }
        let refund = self.db.insert_refund_request(payment_id, refund).await?;
        info!("💳️ Refund of {} requested against payment {payment_id} by {}", refund.amount, refund.initiated_by);
        Ok(refund)
    }

    /// Moves a refund through its own lifecycle as the processor reports progress.
    pub async fn update_refund_status(
        &self,
        refund_id: i64,
        new_status: RefundStatus,
    ) -> Result<Refund, PaymentLedgerError> {
        let refund = self.db.update_refund_status(refund_id, new_status).await?;
        debug!("💳️ Refund {refund_id} is now {}", refund.status);
        Ok(refund)
    }

    /// The total already refunded against the payment. Only completed refunds count.
    pub async fn refunded_amount(&self, payment_id: i64) -> Result<Cents, PaymentLedgerError> {
        self.db.refunded_amount(payment_id).await
    }

    pub async fn refunds(&self, payment_id: i64) -> Result<Vec<Refund>, PaymentLedgerError> {
        self.db.refunds_for_payment(payment_id).await
    }
}

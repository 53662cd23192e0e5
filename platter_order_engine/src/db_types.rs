use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use poe_common::Cents;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

//--------------------------------------      OrderId       ---------------------------------------------------------
/// The human-readable order number handed out at checkout, e.g. `PO-7K2F9QX4`.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created from a cart and is waiting for the restaurant to look at it.
    Placed,
    /// The restaurant has accepted the order.
    Confirmed,
    /// The kitchen has started preparing the order.
    Preparing,
    /// The order is packed and ready for a delivery agent to collect.
    Ready,
    /// A delivery agent has collected the order from the restaurant.
    PickedUp,
    /// The agent is en route to the customer.
    OnTheWay,
    /// The agent has arrived at the delivery address.
    Arrived,
    /// The order has been handed to the customer. Terminal.
    Delivered,
    /// The order was cancelled by the customer or an admin. Terminal.
    Cancelled,
    /// The order was rejected by the restaurant. Terminal.
    Rejected,
}

impl OrderStatusType {
    /// Statuses from which no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::Delivered | OrderStatusType::Cancelled | OrderStatusType::Rejected)
    }

    /// The next status in the happy-path fulfillment flow, if any.
    pub fn next_in_flow(&self) -> Option<OrderStatusType> {
        use OrderStatusType::*;
        match self {
            Placed => Some(Confirmed),
            Confirmed => Some(Preparing),
            Preparing => Some(Ready),
            Ready => Some(PickedUp),
            PickedUp => Some(OnTheWay),
            OnTheWay => Some(Arrived),
            Arrived => Some(Delivered),
            Delivered | Cancelled | Rejected => None,
        }
    }

    /// The legal-successor table for order status transitions.
    ///
    /// | From \ To   | next in flow | Cancelled | Rejected | anything else |
    /// |-------------|--------------|-----------|----------|---------------|
    /// | non-terminal| yes          | yes       | yes      | no            |
    /// | terminal    | no           | no        | no       | no            |
    ///
    /// The happy path advances one step at a time (`Placed → Confirmed → Preparing → Ready →
    /// PickedUp → OnTheWay → Arrived → Delivered`); skipping a preparation or transit state is
    /// not a legal transition. `Cancelled` and `Rejected` are reachable from any non-terminal
    /// state.
    pub fn can_advance_to(&self, new_status: OrderStatusType) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(new_status, OrderStatusType::Cancelled | OrderStatusType::Rejected) {
            return true;
        }
        self.next_in_flow() == Some(new_status)
    }

    /// An order must be in a dispatch-ready status before a delivery agent can claim it.
    pub fn is_dispatch_ready(&self) -> bool {
        matches!(self, OrderStatusType::Ready)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Must match the stored representation exactly, since raw status strings are bound into
        // SQL conditions.
        let s = match self {
            OrderStatusType::Placed => "Placed",
            OrderStatusType::Confirmed => "Confirmed",
            OrderStatusType::Preparing => "Preparing",
            OrderStatusType::Ready => "Ready",
            OrderStatusType::PickedUp => "PickedUp",
            OrderStatusType::OnTheWay => "OnTheWay",
            OrderStatusType::Arrived => "Arrived",
            OrderStatusType::Delivered => "Delivered",
            OrderStatusType::Cancelled => "Cancelled",
            OrderStatusType::Rejected => "Rejected",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid status value: {0}")]
pub struct ConversionError(pub String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Placed" => Ok(Self::Placed),
            "Confirmed" => Ok(Self::Confirmed),
            "Preparing" => Ok(Self::Preparing),
            "Ready" => Ok(Self::Ready),
            "PickedUp" => Ok(Self::PickedUp),
            "OnTheWay" => Ok(Self::OnTheWay),
            "Arrived" => Ok(Self::Arrived),
            "Delivered" => Ok(Self::Delivered),
            "Cancelled" => Ok(Self::Cancelled),
            "Rejected" => Ok(Self::Rejected),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------  DeliveryAddress    ---------------------------------------------------------
/// The address snapshot stored against an order at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postcode: String,
    pub instructions: Option<String>,
}

//-------------------------------------- Customization/Addon ---------------------------------------------------------
/// A chosen menu-item customization, with the price snapshotted at the time it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customization {
    pub name: String,
    pub choice: String,
    pub price: Cents,
}

/// A chosen menu-item addon, with the price snapshotted at the time it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addon {
    pub name: String,
    pub price: Cents,
}

//--------------------------------------      MenuItem       ---------------------------------------------------------
/// Read-side collaborator data. The engine snapshots prices out of menu items and never writes
/// them back.
#[derive(Debug, Clone, FromRow)]
pub struct MenuItem {
    pub id: String,
    pub restaurant_id: String,
    pub name: String,
    pub base_price: Cents,
    pub is_available: bool,
}

//--------------------------------------       Coupon        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl Display for DiscountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscountType::Percentage => write!(f, "Percentage"),
            DiscountType::Fixed => write!(f, "Fixed"),
        }
    }
}

/// Read-side collaborator data describing a discount rule.
///
/// For `Percentage` coupons, `discount_value` is a whole-number percentage of the cart total.
/// For `Fixed` coupons it is an amount in cents.
#[derive(Debug, Clone, FromRow)]
pub struct Coupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub expires_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

//--------------------------------------        Cart         ---------------------------------------------------------
/// The mutable pre-checkout aggregate. One cart per customer, enforced by a unique index.
///
/// `version` is bumped on every mutation and used as an optimistic concurrency check, so two
/// interleaved mutations of the same cart cannot silently lose an update.
#[derive(Debug, Clone, FromRow)]
pub struct Cart {
    pub id: i64,
    pub customer_id: String,
    pub restaurant_id: String,
    pub coupon_code: Option<String>,
    pub total: Cents,
    pub discount: Cents,
    pub grand_total: Cents,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CartLineItem {
    pub id: i64,
    pub cart_id: i64,
    pub menu_item_id: String,
    pub name: String,
    /// Unit price snapshotted from the menu at add time. Never re-read from the menu afterwards.
    pub unit_price: Cents,
    pub quantity: i64,
    pub customizations: Json<Vec<Customization>>,
    pub addons: Json<Vec<Addon>>,
    pub item_total: Cents,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------        Order        ---------------------------------------------------------
/// The immutable checkout snapshot, tracked through the delivery lifecycle.
///
/// The status column always equals the status of the most recent `order_status_log` entry; the
/// two are written together in a single transaction.
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: String,
    pub restaurant_id: String,
    pub delivery_address: Json<DeliveryAddress>,
    pub items_total: Cents,
    pub discount: Cents,
    pub delivery_fee: Cents,
    pub packaging_fee: Cents,
    pub taxes: Cents,
    pub tip: Cents,
    pub grand_total: Cents,
    pub currency: String,
    pub status: OrderStatusType,
    pub placed_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub preparation_started_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub preparation_minutes: Option<i64>,
    pub delivery_minutes: Option<i64>,
    pub total_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct OrderLineItem {
    pub id: i64,
    pub order_id: i64,
    pub menu_item_id: String,
    pub name: String,
    pub unit_price: Cents,
    pub quantity: i64,
    pub customizations: Json<Vec<Customization>>,
    pub addons: Json<Vec<Addon>>,
    pub item_total: Cents,
    pub created_at: DateTime<Utc>,
}

/// One append-only status history entry for an order.
#[derive(Debug, Clone, FromRow)]
pub struct OrderStatusEntry {
    pub id: i64,
    pub order_id: i64,
    pub status: OrderStatusType,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      Payment        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Created at checkout, before the processor has been contacted.
    Initiated,
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    PartiallyRefunded,
    Disputed,
    OnHold,
}

impl PaymentStatus {
    /// The legal processor-driven status transitions.
    ///
    /// `Failed` payments may be retried. Refund statuses are only entered through the refund
    /// ledger, which requires the payment to be refundable first.
    pub fn can_transition_to(&self, new_status: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, new_status),
            (Initiated, Pending | Processing | Completed | Failed)
                | (Pending, Processing | Completed | Failed)
                | (Processing, Completed | Failed)
                | (Failed, Pending | Processing)
                | (Completed, Refunded | PartiallyRefunded | Disputed | OnHold)
                | (PartiallyRefunded, Refunded | PartiallyRefunded | Disputed)
                | (Disputed, Completed | Refunded)
                | (OnHold, Completed | Failed)
        )
    }

    /// A refund may only be raised against a payment in one of these statuses.
    pub fn is_refundable(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::PartiallyRefunded)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Initiated => "Initiated",
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Processing => "Processing",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
            PaymentStatus::PartiallyRefunded => "PartiallyRefunded",
            PaymentStatus::Disputed => "Disputed",
            PaymentStatus::OnHold => "OnHold",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Initiated" => Ok(Self::Initiated),
            "Pending" => Ok(Self::Pending),
            "Processing" => Ok(Self::Processing),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Refunded" => Ok(Self::Refunded),
            "PartiallyRefunded" => Ok(Self::PartiallyRefunded),
            "Disputed" => Ok(Self::Disputed),
            "OnHold" => Ok(Self::OnHold),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

/// One payment per order, created alongside the order at checkout.
#[derive(Debug, Clone, FromRow)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub amount: Cents,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_refundable(&self) -> bool {
        self.status.is_refundable()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentStatusEntry {
    pub id: i64,
    pub payment_id: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------       Refund        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum RefundStatus {
    Requested,
    Processing,
    Completed,
    Failed,
}

impl RefundStatus {
    pub fn can_transition_to(&self, new_status: RefundStatus) -> bool {
        use RefundStatus::*;
        matches!((self, new_status), (Requested, Processing | Completed | Failed) | (Processing, Completed | Failed))
    }
}

impl Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RefundStatus::Requested => "Requested",
            RefundStatus::Processing => "Processing",
            RefundStatus::Completed => "Completed",
            RefundStatus::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

/// One entry in a payment's append-only refund sub-ledger.
///
/// Only `Completed` refunds count towards the refunded total; the invariant that completed
/// refunds never exceed the payment amount is enforced when the request is raised.
#[derive(Debug, Clone, FromRow)]
pub struct Refund {
    pub id: i64,
    pub payment_id: i64,
    pub amount: Cents,
    pub reason: String,
    pub initiated_by: String,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   DeliveryAgent     ---------------------------------------------------------
/// An agent fulfils at most one order at a time. `is_available` is false whenever
/// `current_order_id` is set; the pair is only ever written together.
#[derive(Debug, Clone, FromRow)]
pub struct DeliveryAgent {
    pub id: i64,
    pub name: String,
    pub is_available: bool,
    pub current_order_id: Option<i64>,
    /// Running average over rated deliveries, weighted by `completed_deliveries`.
    pub rating: f64,
    pub completed_deliveries: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One append-only entry in an agent's delivery history.
#[derive(Debug, Clone, FromRow)]
pub struct DeliveryRecord {
    pub id: i64,
    pub agent_id: i64,
    pub order_id: i64,
    pub rating: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn happy_path_advances_one_step_at_a_time() {
        use OrderStatusType::*;
        let flow = [Placed, Confirmed, Preparing, Ready, PickedUp, OnTheWay, Arrived, Delivered];
        for pair in flow.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {} should be legal", pair[0], pair[1]);
        }
        // No skipping preparation or transit states
        assert!(!Placed.can_advance_to(Preparing));
        assert!(!Placed.can_advance_to(Delivered));
        assert!(!Preparing.can_advance_to(PickedUp));
        assert!(!Ready.can_advance_to(Delivered));
    }

    #[test]
    fn cancel_and_reject_reachable_from_any_non_terminal_state() {
        use OrderStatusType::*;
        for status in [Placed, Confirmed, Preparing, Ready, PickedUp, OnTheWay, Arrived] {
            assert!(status.can_advance_to(Cancelled));
            assert!(status.can_advance_to(Rejected));
        }
        for status in [Delivered, Cancelled, Rejected] {
            assert!(status.is_terminal());
            assert!(!status.can_advance_to(Cancelled));
            assert!(!status.can_advance_to(Placed));
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        use OrderStatusType::*;
        for status in [Placed, Confirmed, Preparing, Ready, PickedUp, OnTheWay, Arrived, Delivered, Cancelled, Rejected]
        {
            assert_eq!(status.to_string().parse::<OrderStatusType>().unwrap(), status);
        }
        assert!("Teleported".parse::<OrderStatusType>().is_err());
    }

    #[test]
    fn payment_transitions() {
        use PaymentStatus::*;
        assert!(Initiated.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Refunded.can_transition_to(Completed));
        assert!(Completed.is_refundable());
        assert!(PartiallyRefunded.is_refundable());
        assert!(!Initiated.is_refundable());
    }

    #[test]
    fn refund_transitions() {
        use RefundStatus::*;
        assert!(Requested.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Requested));
        assert!(!Failed.can_transition_to(Completed));
    }
}

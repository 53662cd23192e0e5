//! Platter Order Engine
//!
//! The order lifecycle and pricing core of the Platter food-delivery marketplace: customers
//! build a cart against a restaurant's menu, check out into an order, the order moves through a
//! fixed fulfillment lifecycle, a delivery agent carries it and is rated, and the payment and
//! its refunds are tracked alongside. This library contains that core and nothing else — HTTP
//! routing, authentication, file storage and notification delivery are the business of the
//! services around it.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@traits`] and the SQLite backend). You should never
//!    need to access the database directly; use the public API instead. The exception is the
//!    data types shared with the database, which are defined in [`mod@db_types`] and are public.
//! 2. The engine public API ([`CartApi`], [`OrderFlowApi`], [`DispatchApi`], [`PaymentApi`]).
//!    Each API struct is generic over a backend implementing the matching trait, so alternative
//!    backends only need to implement the traits.
//!
//! The engine also provides a set of events that can be subscribed to ([`mod@events`]). Events
//! are published after the triggering transaction commits, so subscribers observe committed
//! state and can never roll it back.
mod poe_api;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod pricing;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use poe_api::{
    cart_api::CartApi,
    dispatch_api::DispatchApi,
    order_flow_api::OrderFlowApi,
    order_objects,
    payment_api::PaymentApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    CartContents,
    CartError,
    CartManagement,
    CheckoutRequest,
    DispatchError,
    DispatchManagement,
    ErrorKind,
    NewLineItem,
    NewRefund,
    OrderFlowError,
    OrderManagement,
    PaymentLedger,
    PaymentLedgerError,
    StatusChange,
};

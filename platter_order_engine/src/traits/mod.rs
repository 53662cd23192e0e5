//! Storage-backend behaviour for the order fulfillment engine.
//!
//! Each trait covers one aggregate's read-modify-write surface. Backends must make every
//! mutation atomic per entity: either by running the read-modify-write inside a transaction
//! whose first statement is a conditional check-and-set, or by an optimistic version check that
//! fails with a conflict when the entity changed since it was read. The SQLite backend
//! ([`crate::SqliteDatabase`]) does both, depending on the aggregate.

mod cart_management;
mod data_objects;
mod dispatch_management;
mod order_management;
mod payment_ledger;

pub use cart_management::{CartError, CartManagement};
pub use data_objects::{CartContents, CheckoutRequest, NewLineItem, NewRefund, StatusChange};
pub use dispatch_management::{DispatchError, DispatchManagement};
pub use order_management::{OrderFlowError, OrderManagement};
pub use payment_ledger::{PaymentLedger, PaymentLedgerError};

/// The coarse classification of an engine error.
///
/// The engine returns typed errors; the boundary layer (HTTP or otherwise, not part of this
/// crate) maps kinds to transport codes. Only `Conflict` is worth retrying, with fresh state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced entity does not exist.
    NotFound,
    /// The input itself is malformed: out-of-range rating, non-positive quantity, unknown enum
    /// value.
    InvalidArgument,
    /// The operation is not legal for the entity's current state.
    InvalidState,
    /// A concurrent mutation got there first.
    Conflict,
    /// The storage layer failed.
    Internal,
}

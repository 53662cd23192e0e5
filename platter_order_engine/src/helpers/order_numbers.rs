use rand::{distributions::Alphanumeric, Rng};

use crate::db_types::OrderId;

const ORDER_NUMBER_PREFIX: &str = "PO-";
const ORDER_NUMBER_LENGTH: usize = 10;

/// Generates a fresh human-readable order number, e.g. `PO-7K2F9QX4ZD`.
///
/// Collisions are guarded by the unique index on `orders.order_id`; at 36^10 the chance of ever
/// hitting one is negligible, and the insert surfaces it as a conflict if it happens.
pub fn new_order_number() -> OrderId {
    let suffix: String =
        rand::thread_rng().sample_iter(&Alphanumeric).take(ORDER_NUMBER_LENGTH).map(char::from).collect();
    OrderId(format!("{ORDER_NUMBER_PREFIX}{}", suffix.to_ascii_uppercase()))
}

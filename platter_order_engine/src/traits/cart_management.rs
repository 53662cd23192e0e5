use thiserror::Error;

use crate::{
    db_types::{Order, OrderId, Payment},
    traits::{CartContents, CheckoutRequest, ErrorKind, NewLineItem},
};

/// Storage behaviour for the pre-checkout cart aggregate.
///
/// Every mutator recomputes the cart's totals through the pricing routine before persisting, in
/// the same unit of work as the mutation itself. Totals stored by one method are therefore
/// always consistent with the lines stored by the same method.
#[allow(async_fn_in_trait)]
pub trait CartManagement: Clone {
    /// Fetches the customer's cart with its line items, or `None` if the customer has no open
    /// cart.
    async fn fetch_cart(&self, customer_id: &str) -> Result<Option<CartContents>, CartError>;

    /// Adds a line to the customer's cart, creating the cart on first use.
    ///
    /// The menu item's unit price is snapshotted into the line at this point and never re-read.
    /// Adding an item from a different restaurant than the open cart is an error; the caller
    /// must clear the cart first.
    async fn add_item_to_cart(&self, customer_id: &str, item: NewLineItem) -> Result<CartContents, CartError>;

    /// Replaces the quantity on an existing line.
    async fn update_line_quantity(
        &self,
        customer_id: &str,
        line_id: i64,
        quantity: i64,
    ) -> Result<CartContents, CartError>;

    /// Removes a line from the cart.
    async fn remove_line_item(&self, customer_id: &str, line_id: i64) -> Result<CartContents, CartError>;

    /// Attaches a coupon to the cart.
    ///
    /// An expired coupon is never attached: the cart's coupon reference is cleared instead and
    /// the call fails.
    async fn apply_coupon_to_cart(&self, customer_id: &str, code: &str) -> Result<CartContents, CartError>;

    /// Detaches the cart's coupon, if any.
    async fn remove_coupon_from_cart(&self, customer_id: &str) -> Result<CartContents, CartError>;

    /// Deletes the customer's cart and all its lines.
    async fn clear_cart(&self, customer_id: &str) -> Result<(), CartError>;

    /// Converts the cart into an order with an `Initiated` payment, and deletes the cart, all in
    /// one atomic unit of work. Line items, prices and the discount are snapshotted as they
    /// stand; the order is immutable from here on.
    async fn checkout_cart(
        &self,
        customer_id: &str,
        request: CheckoutRequest,
    ) -> Result<(Order, Payment), CartError>;
}

#[derive(Debug, Clone, Error)]
pub enum CartError {
    #[error("We have an internal database engine error: {0}")]
    DatabaseError(String),
    #[error("Menu item {0} does not exist")]
    MenuItemNotFound(String),
    #[error("Menu item {0} is not available right now")]
    MenuItemUnavailable(String),
    #[error("Cart belongs to restaurant {cart_restaurant}, but item {menu_item_id} belongs to {item_restaurant}")]
    RestaurantMismatch { cart_restaurant: String, item_restaurant: String, menu_item_id: String },
    #[error("Customer {0} has no open cart")]
    CartNotFound(String),
    #[error("Cart line {0} does not exist")]
    LineItemNotFound(i64),
    #[error("Quantity must be at least 1, got {0}")]
    InvalidQuantity(i64),
    #[error("Coupon {0} does not exist")]
    CouponNotFound(String),
    #[error("Coupon {0} has expired")]
    CouponExpired(String),
    #[error("Cart for customer {0} is empty; there is nothing to check out")]
    EmptyCart(String),
    #[error("The cart changed while this request was in flight; retry with fresh state")]
    ConcurrentUpdate,
    #[error("Order {0} already exists")]
    OrderAlreadyExists(OrderId),
}

impl CartError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CartError::DatabaseError(_) => ErrorKind::Internal,
            CartError::MenuItemNotFound(_) | CartError::CartNotFound(_) | CartError::LineItemNotFound(_) |
            CartError::CouponNotFound(_) => ErrorKind::NotFound,
            CartError::InvalidQuantity(_) => ErrorKind::InvalidArgument,
            CartError::MenuItemUnavailable(_) | CartError::RestaurantMismatch { .. } | CartError::CouponExpired(_) |
            CartError::EmptyCart(_) => ErrorKind::InvalidState,
            CartError::ConcurrentUpdate | CartError::OrderAlreadyExists(_) => ErrorKind::Conflict,
        }
    }
}

impl From<sqlx::Error> for CartError {
    fn from(e: sqlx::Error) -> Self {
        CartError::DatabaseError(e.to_string())
    }
}

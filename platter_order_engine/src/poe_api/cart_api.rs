//! Unified API for cart building, pricing and checkout.

use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Order, Payment},
    traits::{CartContents, CartError, CartManagement, CheckoutRequest, NewLineItem},
};

/// `CartApi` is the single entry point for everything that happens to a cart before checkout.
///
/// Every mutation reprices the cart before it is persisted; there is no way to leave a cart with
/// stale totals through this API.
pub struct CartApi<B> {
    db: B,
}

impl<B> Debug for CartApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CartApi")
    }
}

impl<B> CartApi<B>
where B: CartManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Fetches the customer's cart, or `None` if they have no open cart.
    pub async fn cart(&self, customer_id: &str) -> Result<Option<CartContents>, CartError> {
        self.db.fetch_cart(customer_id).await
    }

    /// Adds an item to the customer's cart, creating the cart if this is their first item.
    ///
    /// The same menu item may be added more than once; lines with different customizations stay
    /// distinct lines.
    pub async fn add_item(&self, customer_id: &str, item: NewLineItem) -> Result<CartContents, CartError> {
        if item.quantity < 1 {
            return Err(CartError::InvalidQuantity(item.quantity));
        }
        let contents = self.db.add_item_to_cart(customer_id, item).await?;
        debug!(
            "🛒️ Cart for {customer_id} now has {} lines, grand total {}",
            contents.items.len(),
            contents.cart.grand_total
        );
        Ok(contents)
    }

    /// Changes the quantity on an existing cart line.
    pub async fn update_quantity(
        &self,
        customer_id: &str,
        line_id: i64,
        quantity: i64,
    ) -> Result<CartContents, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        self.db.update_line_quantity(customer_id, line_id, quantity).await
    }

    /// Removes a line from the cart.
    pub async fn remove_item(&self, customer_id: &str, line_id: i64) -> Result<CartContents, CartError> {
        self.db.remove_line_item(customer_id, line_id).await
    }

    /// Applies a coupon to the cart. An expired coupon is cleared from the cart rather than
    /// applied, and the call fails.
    pub async fn apply_coupon(&self, customer_id: &str, code: &str) -> Result<CartContents, CartError> {
        let contents = self.db.apply_coupon_to_cart(customer_id, code).await?;
        debug!("🛒️ Coupon {code} applied for {customer_id}; discount is now {}", contents.cart.discount);
        Ok(contents)
    }

    /// Removes the cart's coupon, if any.
    pub async fn remove_coupon(&self, customer_id: &str) -> Result<CartContents, CartError> {
        self.db.remove_coupon_from_cart(customer_id).await
    }

    /// Throws the whole cart away.
    pub async fn clear(&self, customer_id: &str) -> Result<(), CartError> {
        self.db.clear_cart(customer_id).await
    }

    /// Converts the customer's cart into a placed order and its `Initiated` payment, atomically,
    /// and destroys the cart.
    pub async fn checkout(&self, customer_id: &str, request: CheckoutRequest) -> Result<(Order, Payment), CartError> {
        let (order, payment) = self.db.checkout_cart(customer_id, request).await?;
        info!("🛒️ Customer {customer_id} placed order {} for {}", order.order_id, order.grand_total);
        Ok((order, payment))
    }
}

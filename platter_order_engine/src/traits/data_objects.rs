use poe_common::Cents;
use serde::{Deserialize, Serialize};

use crate::db_types::{Addon, Cart, CartLineItem, Customization, DeliveryAddress, Order, OrderStatusType};

/// A cart together with its line items, fully materialized.
#[derive(Debug, Clone)]
pub struct CartContents {
    pub cart: Cart,
    pub items: Vec<CartLineItem>,
}

/// A new line for a customer's cart. Customization and addon prices are the caller's snapshot of
/// the menu catalog at selection time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLineItem {
    pub menu_item_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub customizations: Vec<Customization>,
    #[serde(default)]
    pub addons: Vec<Addon>,
}

impl NewLineItem {
    pub fn new(menu_item_id: impl Into<String>, quantity: i64) -> Self {
        Self { menu_item_id: menu_item_id.into(), quantity, customizations: Vec::new(), addons: Vec::new() }
    }

    pub fn with_customization(mut self, customization: Customization) -> Self {
        self.customizations.push(customization);
        self
    }

    pub fn with_addon(mut self, addon: Addon) -> Self {
        self.addons.push(addon);
        self
    }
}

/// Everything checkout needs beyond the cart itself. Fees and taxes are quoted by the caller;
/// the fee schedule is a marketplace concern, not a cart concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub delivery_address: DeliveryAddress,
    pub delivery_fee: Cents,
    pub packaging_fee: Cents,
    pub taxes: Cents,
    pub tip: Cents,
}

/// The outcome of an order status transition: the status it moved from, and the order as it
/// stands after the move.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub previous: OrderStatusType,
    pub order: Order,
}

/// A refund request against a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRefund {
    pub amount: Cents,
    pub reason: String,
    pub initiated_by: String,
}

impl NewRefund {
    pub fn new(amount: Cents, reason: impl Into<String>, initiated_by: impl Into<String>) -> Self {
        Self { amount, reason: reason.into(), initiated_by: initiated_by.into() }
    }
}

//! The cart pricing routine.
//!
//! Pricing is a pure function over a materialized cart. Every cart mutator calls [`recompute`]
//! before persisting, inside the same transaction as the mutation itself, so stored totals can
//! never go stale. Prices are taken from the snapshots on the line items, never re-read from the
//! menu, so a later menu price change cannot silently reprice an open cart.

use chrono::{DateTime, Utc};
use log::debug;
use poe_common::Cents;

use crate::db_types::{Addon, CartLineItem, Coupon, Customization, DiscountType};

/// The recomputed cart totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PricingBreakdown {
    pub total: Cents,
    pub discount: Cents,
    pub grand_total: Cents,
}

/// `(unit price + Σ customizations + Σ addons) × quantity` for a single line.
pub fn line_item_total(
    unit_price: Cents,
    customizations: &[Customization],
    addons: &[Addon],
    quantity: i64,
) -> Cents {
    let per_unit = unit_price
        + customizations.iter().map(|c| c.price).sum::<Cents>()
        + addons.iter().map(|a| a.price).sum::<Cents>();
    per_unit * quantity
}

/// The discount a coupon yields against the given total, clamped to `[0, total]`.
///
/// An expired coupon yields no discount; rejecting (and clearing) an expired coupon at
/// apply-time is the caller's business.
pub fn coupon_discount(total: Cents, coupon: &Coupon, now: DateTime<Utc>) -> Cents {
    if coupon.is_expired(now) {
        return Cents::default();
    }
    let raw = match coupon.discount_type {
        DiscountType::Percentage => total.percentage(coupon.discount_value),
        DiscountType::Fixed => Cents::from(coupon.discount_value),
    };
    let ceiling = total.max(Cents::default());
    raw.clamp(Cents::default(), ceiling)
}

/// Recomputes every line item total in place, then the cart totals.
///
/// Calling this twice in a row without mutating the cart yields identical results.
pub fn recompute(items: &mut [CartLineItem], coupon: Option<&Coupon>, now: DateTime<Utc>) -> PricingBreakdown {
    for item in items.iter_mut() {
        item.item_total = line_item_total(item.unit_price, &item.customizations, &item.addons, item.quantity);
    }
    let total = items.iter().map(|i| i.item_total).sum::<Cents>();
    let discount = coupon.map(|c| coupon_discount(total, c, now)).unwrap_or_default();
    let grand_total = total - discount;
    debug!("🧮️ Repriced {} cart lines: total {total}, discount {discount}, grand total {grand_total}", items.len());
    PricingBreakdown { total, discount, grand_total }
}

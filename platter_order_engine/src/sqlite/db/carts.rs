use chrono::Utc;
use log::{trace, warn};
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{Cart, CartLineItem, MenuItem},
    pricing,
    sqlite::db::catalog,
    traits::{CartContents, CartError, NewLineItem},
};

pub async fn fetch_cart_for_customer(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Cart>, CartError> {
    let cart: Option<Cart> =
        sqlx::query_as("SELECT * FROM carts WHERE customer_id = $1").bind(customer_id).fetch_optional(conn).await?;
    Ok(cart)
}

pub async fn fetch_cart_by_id(cart_id: i64, conn: &mut SqliteConnection) -> Result<Option<Cart>, CartError> {
    let cart: Option<Cart> =
        sqlx::query_as("SELECT * FROM carts WHERE id = $1").bind(cart_id).fetch_optional(conn).await?;
    Ok(cart)
}

/// Line items in the order they were added.
pub async fn fetch_cart_items(cart_id: i64, conn: &mut SqliteConnection) -> Result<Vec<CartLineItem>, CartError> {
    let items: Vec<CartLineItem> = sqlx::query_as("SELECT * FROM cart_items WHERE cart_id = $1 ORDER BY id ASC")
        .bind(cart_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Returns the customer's cart, creating an empty one against the given restaurant if they have
/// none. The unique index on `customer_id` keeps this race-free: of two concurrent creators, one
/// inserts and the other reads the inserted row.
pub async fn fetch_or_create_cart(
    customer_id: &str,
    restaurant_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Cart, CartError> {
    if let Some(cart) = fetch_cart_for_customer(customer_id, &mut *conn).await? {
        return Ok(cart);
    }
    let inserted: Option<Cart> = sqlx::query_as(
        r#"
            INSERT INTO carts (customer_id, restaurant_id) VALUES ($1, $2)
            ON CONFLICT (customer_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(customer_id)
    .bind(restaurant_id)
    .fetch_optional(&mut *conn)
    .await?;
    match inserted {
        Some(cart) => {
            trace!("🛒️ Created cart {} for customer {customer_id}", cart.id);
            Ok(cart)
        },
        // Lost the insert race; the winner's cart is the cart.
        None => fetch_cart_for_customer(customer_id, conn)
            .await?
            .ok_or_else(|| CartError::DatabaseError(format!("Cart for {customer_id} vanished mid-creation"))),
    }
}

/// The optimistic concurrency gate for cart mutations. Bumps the cart's version if and only if
/// it still has the version the caller read; returns false when a concurrent mutation got there
/// first. Callers run this as the first write of their transaction.
pub async fn claim_cart_version(cart_id: i64, version: i64, conn: &mut SqliteConnection) -> Result<bool, CartError> {
    let result = sqlx::query(
        "UPDATE carts SET version = version + 1, updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND version = $2",
    )
    .bind(cart_id)
    .bind(version)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Inserts a line with prices snapshotted from the menu item as it stands right now.
pub async fn insert_line_item(
    cart_id: i64,
    menu_item: &MenuItem,
    line: &NewLineItem,
    conn: &mut SqliteConnection,
) -> Result<CartLineItem, CartError> {
    let item_total = pricing::line_item_total(menu_item.base_price, &line.customizations, &line.addons, line.quantity);
    let item: CartLineItem = sqlx::query_as(
        r#"
            INSERT INTO cart_items (cart_id, menu_item_id, name, unit_price, quantity, customizations, addons, item_total)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(cart_id)
    .bind(&menu_item.id)
    .bind(&menu_item.name)
    .bind(menu_item.base_price)
    .bind(line.quantity)
    .bind(Json(line.customizations.clone()))
    .bind(Json(line.addons.clone()))
    .bind(item_total)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn update_line_quantity(
    cart_id: i64,
    line_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), CartError> {
    let result = sqlx::query("UPDATE cart_items SET quantity = $1 WHERE id = $2 AND cart_id = $3")
        .bind(quantity)
        .bind(line_id)
        .bind(cart_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CartError::LineItemNotFound(line_id));
    }
    Ok(())
}

pub async fn delete_line_item(cart_id: i64, line_id: i64, conn: &mut SqliteConnection) -> Result<(), CartError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
        .bind(line_id)
        .bind(cart_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CartError::LineItemNotFound(line_id));
    }
    Ok(())
}

pub async fn set_coupon(cart_id: i64, code: Option<&str>, conn: &mut SqliteConnection) -> Result<(), CartError> {
    sqlx::query("UPDATE carts SET coupon_code = $1 WHERE id = $2").bind(code).bind(cart_id).execute(conn).await?;
    Ok(())
}

/// Deletes the cart if it still has the version the caller read. Line items go with it via the
/// foreign key cascade. Returns false when a concurrent mutation got there first.
pub async fn delete_cart_checked(cart_id: i64, version: i64, conn: &mut SqliteConnection) -> Result<bool, CartError> {
    let result = sqlx::query("DELETE FROM carts WHERE id = $1 AND version = $2")
        .bind(cart_id)
        .bind(version)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Re-runs the pricing routine over the cart and persists the result.
///
/// Every cart mutator calls this inside its own transaction, after the mutation, so the stored
/// totals are always consistent with the stored lines. A coupon that has expired (or vanished
/// from the catalog) since it was applied is cleared here rather than silently priced at zero
/// forever.
pub async fn reprice(cart_id: i64, conn: &mut SqliteConnection) -> Result<CartContents, CartError> {
    let cart = fetch_cart_by_id(cart_id, &mut *conn)
        .await?
        .ok_or_else(|| CartError::DatabaseError(format!("Cart {cart_id} vanished mid-transaction")))?;
    let mut items = fetch_cart_items(cart_id, &mut *conn).await?;
    let now = Utc::now();
    let coupon = match &cart.coupon_code {
        Some(code) => {
            let coupon = catalog::fetch_coupon(code, &mut *conn).await?;
            match coupon {
                Some(c) if c.is_expired(now) => {
                    warn!("🛒️ Coupon {code} on cart {cart_id} has expired; clearing it");
                    set_coupon(cart_id, None, &mut *conn).await?;
                    None
                },
                None => {
                    warn!("🛒️ Coupon {code} on cart {cart_id} no longer exists; clearing it");
                    set_coupon(cart_id, None, &mut *conn).await?;
                    None
                },
                coupon => coupon,
            }
        },
        None => None,
    };
    let breakdown = pricing::recompute(&mut items, coupon.as_ref(), now);
    for item in &items {
        sqlx::query("UPDATE cart_items SET item_total = $1 WHERE id = $2")
            .bind(item.item_total)
            .bind(item.id)
            .execute(&mut *conn)
            .await?;
    }
    let cart: Cart = sqlx::query_as(
        r#"
            UPDATE carts SET total = $1, discount = $2, grand_total = $3, updated_at = CURRENT_TIMESTAMP
            WHERE id = $4
            RETURNING *;
        "#,
    )
    .bind(breakdown.total)
    .bind(breakdown.discount)
    .bind(breakdown.grand_total)
    .bind(cart_id)
    .fetch_one(conn)
    .await?;
    Ok(CartContents { cart, items })
}

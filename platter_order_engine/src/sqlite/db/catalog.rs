//! Read-side access to the menu and coupon catalogs.
//!
//! The catalogs belong to the restaurant/marketplace collaborators; the engine only reads them,
//! snapshotting prices into cart lines at add time. The upsert functions exist so that
//! collaborators (and tests) can seed the catalog through the same pool.
use poe_common::Cents;
use sqlx::SqliteConnection;

use crate::db_types::{Coupon, MenuItem};

pub async fn fetch_menu_item(id: &str, conn: &mut SqliteConnection) -> Result<Option<MenuItem>, sqlx::Error> {
    let item: Option<MenuItem> =
        sqlx::query_as("SELECT * FROM menu_items WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(item)
}

pub async fn upsert_menu_item(item: &MenuItem, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO menu_items (id, restaurant_id, name, base_price, is_available)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                restaurant_id = excluded.restaurant_id,
                name = excluded.name,
                base_price = excluded.base_price,
                is_available = excluded.is_available;
        "#,
    )
    .bind(&item.id)
    .bind(&item.restaurant_id)
    .bind(&item.name)
    .bind(item.base_price)
    .bind(item.is_available)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_menu_item_price(id: &str, price: Cents, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE menu_items SET base_price = $1 WHERE id = $2").bind(price).bind(id).execute(conn).await?;
    Ok(())
}

pub async fn fetch_coupon(code: &str, conn: &mut SqliteConnection) -> Result<Option<Coupon>, sqlx::Error> {
    let coupon: Option<Coupon> =
        sqlx::query_as("SELECT * FROM coupons WHERE code = $1").bind(code).fetch_optional(conn).await?;
    Ok(coupon)
}

pub async fn upsert_coupon(coupon: &Coupon, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO coupons (code, discount_type, discount_value, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (code) DO UPDATE SET
                discount_type = excluded.discount_type,
                discount_value = excluded.discount_value,
                expires_at = excluded.expires_at;
        "#,
    )
    .bind(&coupon.code)
    .bind(coupon.discount_type.to_string())
    .bind(coupon.discount_value)
    .bind(coupon.expires_at)
    .execute(conn)
    .await?;
    Ok(())
}

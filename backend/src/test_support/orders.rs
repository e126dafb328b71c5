//! Upstream order builders.

use chrono::{DateTime, TimeZone, Utc};

use crate::domain::{Buyer, LineItem, OrderCode, OrderState, UpstreamOrder};

/// Creation time used by [`order`].
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// A `NEW` order worth 1000 with a reachable buyer and no items.
pub fn order(code: &str) -> UpstreamOrder {
    UpstreamOrder {
        id: format!("id-{code}"),
        code: OrderCode::new(code).expect("valid order code"),
        total_price: 1000.0,
        state: OrderState::new("NEW").expect("valid state"),
        created_at: base_time(),
        updated_at: None,
        buyer: Buyer {
            first_name: Some("Aigerim".to_owned()),
            last_name: Some("Nurlanova".to_owned()),
            phone: Some("87012345678".to_owned()),
            ..Buyer::default()
        },
        items: Vec::new(),
        delivery: None,
        pickup: None,
    }
}

/// A line item with the given sku, quantity, and unit price.
pub fn item(sku: &str, quantity: u32, price: f64) -> LineItem {
    LineItem {
        sku: sku.to_owned(),
        name: format!("Product {sku}"),
        quantity,
        price,
    }
}

/// [`order`] with items and an upstream modification time.
pub fn order_with_items(
    code: &str,
    items: Vec<LineItem>,
    updated_at: DateTime<Utc>,
) -> UpstreamOrder {
    let mut order = order(code);
    order.total_price = items
        .iter()
        .map(|item| item.price * f64::from(item.quantity))
        .sum();
    order.items = items;
    order.updated_at = Some(updated_at);
    order
}

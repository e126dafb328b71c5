//! Change-detection fingerprints over the mutable part of an order.
//!
//! The projection covers total price, state, and `(sku, quantity, price)` for
//! every line item. Items are sorted before hashing and the projection is
//! serialised as key-sorted compact JSON, so neither item order nor field order
//! affects the digest.

use std::fmt;

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use super::order::{LineItem, UpstreamOrder};

const FINGERPRINT_BYTES: usize = 16;

/// Hex-encoded 128-bit digest of an order's mutable fields.
///
/// ```
/// use kaspi_amo_sync::domain::OrderFingerprint;
///
/// let stored = OrderFingerprint::from_stored("0011");
/// assert_eq!(stored.as_str(), "0011");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderFingerprint(String);

impl OrderFingerprint {
    /// Compute the fingerprint of an upstream order.
    pub fn of(order: &UpstreamOrder) -> Self {
        let canonical = canonical_projection(order).to_string();
        let digest = Sha256::digest(canonical.as_bytes());
        Self(hex::encode(&digest[..FINGERPRINT_BYTES]))
    }

    /// Wrap a fingerprint previously persisted by the store.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonical_projection(order: &UpstreamOrder) -> Value {
    let mut items: Vec<&LineItem> = order.items.iter().collect();
    items.sort_by(|left, right| {
        left.sku
            .cmp(&right.sku)
            .then(left.quantity.cmp(&right.quantity))
            .then(left.price.total_cmp(&right.price))
    });

    // `serde_json::Map` is key-ordered, which makes the rendering canonical.
    json!({
        "totalPrice": order.total_price,
        "state": order.state.as_str(),
        "items": items
            .into_iter()
            .map(|item| json!({
                "sku": item.sku,
                "quantity": item.quantity,
                "price": item.price,
            }))
            .collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Buyer, OrderCode, OrderState};
    use chrono::{TimeZone, Utc};
    use rstest::{fixture, rstest};

    fn item(sku: &str, quantity: u32, price: f64) -> LineItem {
        LineItem {
            sku: sku.to_owned(),
            name: format!("Item {sku}"),
            quantity,
            price,
        }
    }

    #[fixture]
    fn order() -> UpstreamOrder {
        UpstreamOrder {
            id: "id-1".to_owned(),
            code: OrderCode::new("ORDER-1").expect("code"),
            total_price: 1000.0,
            state: OrderState::new("NEW").expect("state"),
            created_at: Utc
                .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
                .single()
                .expect("timestamp"),
            updated_at: None,
            buyer: Buyer::default(),
            items: vec![item("A-1", 1, 400.0), item("B-2", 2, 300.0)],
            delivery: None,
            pickup: None,
        }
    }

    #[rstest]
    fn fingerprint_is_128_bit_hex(order: UpstreamOrder) {
        let fingerprint = OrderFingerprint::of(&order);
        assert_eq!(fingerprint.as_str().len(), 32);
        assert!(fingerprint.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[rstest]
    fn item_order_does_not_change_fingerprint(order: UpstreamOrder) {
        let mut reordered = order.clone();
        reordered.items.reverse();
        assert_eq!(OrderFingerprint::of(&order), OrderFingerprint::of(&reordered));
    }

    #[rstest]
    fn non_hashed_fields_do_not_change_fingerprint(order: UpstreamOrder) {
        let mut renamed = order.clone();
        renamed.items[0].name = "Renamed".to_owned();
        renamed.buyer.first_name = Some("Dana".to_owned());
        assert_eq!(OrderFingerprint::of(&order), OrderFingerprint::of(&renamed));
    }

    #[rstest]
    #[case::price(|o: &mut UpstreamOrder| o.total_price = 1001.0)]
    #[case::state(|o: &mut UpstreamOrder| o.state = OrderState::new("CANCELLED").expect("state"))]
    #[case::sku(|o: &mut UpstreamOrder| o.items[0].sku = "A-9".to_owned())]
    #[case::quantity(|o: &mut UpstreamOrder| o.items[1].quantity = 3)]
    #[case::item_price(|o: &mut UpstreamOrder| o.items[1].price = 299.0)]
    #[case::removed_item(|o: &mut UpstreamOrder| { o.items.pop(); })]
    fn any_hashed_field_change_alters_fingerprint(
        order: UpstreamOrder,
        #[case] mutate: fn(&mut UpstreamOrder),
    ) {
        let mut changed = order.clone();
        mutate(&mut changed);
        assert_ne!(OrderFingerprint::of(&order), OrderFingerprint::of(&changed));
    }
}

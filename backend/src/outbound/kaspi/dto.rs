//! DTOs for decoding marketplace order listings.
//!
//! Each order is decoded on its own so that one malformed entry does not hide
//! the rest of the page from the pipelines.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::ports::{OrderPage, PageMeta};
use crate::domain::{Buyer, Delivery, LineItem, OrderCode, OrderState, Pickup, UpstreamOrder};

#[derive(Debug, Deserialize)]
pub(super) struct OrdersResponseDto {
    #[serde(default)]
    pub(super) data: Vec<Value>,
    pub(super) meta: Option<PageMetaDto>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PageMetaDto {
    page: Option<u32>,
    page_size: Option<u32>,
    total_count: Option<u32>,
    total_pages: Option<u32>,
}

/// Timestamps arrive either as epoch milliseconds or RFC 3339 text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimestampDto {
    Millis(i64),
    Text(String),
}

impl TimestampDto {
    fn into_utc(self) -> Result<DateTime<Utc>, String> {
        match self {
            Self::Millis(millis) => DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| format!("timestamp {millis} out of range")),
            Self::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|error| format!("invalid timestamp {text:?}: {error}")),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderDto {
    #[serde(default)]
    id: Option<Value>,
    code: String,
    total_price: f64,
    state: String,
    created_at: TimestampDto,
    updated_at: Option<TimestampDto>,
    #[serde(default)]
    buyer: Option<BuyerDto>,
    #[serde(default)]
    items: Vec<ItemDto>,
    delivery: Option<DeliveryDto>,
    pickup: Option<PickupDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuyerDto {
    first_name: Option<String>,
    last_name: Option<String>,
    middle_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    mobile_phone: Option<String>,
    cell_phone: Option<String>,
    phone_number: Option<String>,
    contact_phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemDto {
    sku: String,
    name: Option<String>,
    quantity: Option<f64>,
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DeliveryDto {
    address: Option<String>,
    city: Option<String>,
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PickupDto {
    address: Option<String>,
    point_name: Option<String>,
}

/// Decoded page plus the reasons any entries were dropped.
pub(super) struct DecodedPage {
    pub(super) page: OrderPage,
    pub(super) rejected: Vec<String>,
}

impl OrdersResponseDto {
    pub(super) fn into_domain(self) -> DecodedPage {
        let mut orders = Vec::with_capacity(self.data.len());
        let mut rejected = Vec::new();
        for (index, raw) in self.data.into_iter().enumerate() {
            match serde_json::from_value::<OrderDto>(raw)
                .map_err(|error| error.to_string())
                .and_then(OrderDto::into_domain)
            {
                Ok(order) => orders.push(order),
                Err(reason) => rejected.push(format!("entry {index}: {reason}")),
            }
        }
        DecodedPage {
            page: OrderPage {
                orders,
                meta: self.meta.map(PageMetaDto::into_domain),
            },
            rejected,
        }
    }
}

impl PageMetaDto {
    fn into_domain(self) -> PageMeta {
        PageMeta {
            page: self.page,
            page_size: self.page_size,
            total_count: self.total_count,
            total_pages: self.total_pages,
        }
    }
}

impl OrderDto {
    fn into_domain(self) -> Result<UpstreamOrder, String> {
        let code = OrderCode::new(&self.code).map_err(|error| error.to_string())?;
        let state = OrderState::new(&self.state).map_err(|error| error.to_string())?;
        if !self.total_price.is_finite() {
            return Err(format!("order {code} has a non-finite total"));
        }
        let id = match self.id {
            Some(Value::String(id)) => id,
            Some(Value::Number(id)) => id.to_string(),
            _ => code.as_str().to_owned(),
        };
        Ok(UpstreamOrder {
            id,
            code,
            total_price: self.total_price,
            state,
            created_at: self.created_at.into_utc()?,
            updated_at: self.updated_at.map(TimestampDto::into_utc).transpose()?,
            buyer: self.buyer.unwrap_or_default().into_domain(),
            items: self.items.into_iter().map(ItemDto::into_domain).collect(),
            delivery: self.delivery.map(|delivery| Delivery {
                address: delivery.address,
                city: delivery.city,
                region: delivery.region,
            }),
            pickup: self.pickup.map(|pickup| Pickup {
                address: pickup.address,
                point_name: pickup.point_name,
            }),
        })
    }
}

impl BuyerDto {
    fn into_domain(self) -> Buyer {
        Buyer {
            first_name: self.first_name,
            last_name: self.last_name,
            middle_name: self.middle_name,
            email: self.email,
            phone: self.phone,
            mobile_phone: self.mobile_phone,
            cell_phone: self.cell_phone,
            phone_number: self.phone_number,
            contact_phone: self.contact_phone,
        }
    }
}

impl ItemDto {
    fn into_domain(self) -> LineItem {
        let name = self
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.sku.clone());
        LineItem {
            sku: self.sku,
            name,
            quantity: quantity_or_one(self.quantity),
            price: self.price.filter(|price| price.is_finite()).unwrap_or(0.0),
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "quantity is clamped to the u32 range before the cast"
)]
fn quantity_or_one(quantity: Option<f64>) -> u32 {
    match quantity {
        Some(value) if value.is_finite() && value >= 1.0 => {
            value.round().min(f64::from(u32::MAX)) as u32
        }
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn decode(body: Value) -> DecodedPage {
        serde_json::from_value::<OrdersResponseDto>(body)
            .expect("response shape")
            .into_domain()
    }

    #[test]
    fn decodes_full_order() {
        let decoded = decode(json!({
            "data": [{
                "id": "abc",
                "code": "ORDER-1",
                "totalPrice": 1500.5,
                "state": "NEW",
                "createdAt": "2026-03-01T09:00:00Z",
                "updatedAt": 1_772_359_200_000_i64,
                "buyer": {"firstName": "Aigerim", "mobilePhone": "87012345678"},
                "items": [
                    {"sku": "SKU-1", "name": "Kettle", "quantity": 2, "price": 500.0},
                    {"sku": "SKU-2"}
                ],
                "pickup": {"pointName": "Mega", "address": "Rozybakiev 247"}
            }],
            "meta": {"page": 1, "pageSize": 100, "totalCount": 1, "totalPages": 1}
        }));

        assert!(decoded.rejected.is_empty());
        let order = &decoded.page.orders[0];
        assert_eq!(order.code.as_str(), "ORDER-1");
        assert_eq!(
            order.created_at,
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("time")
        );
        assert_eq!(
            order.updated_at,
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).single()
        );
        assert_eq!(order.buyer.mobile_phone.as_deref(), Some("87012345678"));
        assert_eq!(order.items[1].name, "SKU-2");
        assert_eq!(order.items[1].quantity, 1);
        assert_eq!(order.items[1].price, 0.0);
        assert_eq!(
            decoded.page.meta.and_then(|meta| meta.total_pages),
            Some(1)
        );
    }

    #[test]
    fn malformed_entries_are_rejected_individually() {
        let decoded = decode(json!({
            "data": [
                {"code": "ORDER-1", "totalPrice": 10, "state": "NEW", "createdAt": "2026-03-01T09:00:00Z"},
                {"code": "", "totalPrice": 10, "state": "NEW", "createdAt": "2026-03-01T09:00:00Z"},
                {"code": "ORDER-3", "state": "NEW"}
            ]
        }));

        assert_eq!(decoded.page.orders.len(), 1);
        assert_eq!(decoded.page.orders[0].id, "ORDER-1");
        assert_eq!(decoded.rejected.len(), 2);
        assert!(decoded.page.meta.is_none());
    }

    #[test]
    fn numeric_ids_are_kept_as_text() {
        let decoded = decode(json!({
            "data": [{"id": 42, "code": "C", "totalPrice": 1, "state": "NEW", "createdAt": 0}]
        }));
        assert_eq!(decoded.page.orders[0].id, "42");
    }

    #[test]
    fn fractional_quantities_round() {
        assert_eq!(quantity_or_one(Some(2.6)), 3);
        assert_eq!(quantity_or_one(Some(0.0)), 1);
        assert_eq!(quantity_or_one(None), 1);
    }
}

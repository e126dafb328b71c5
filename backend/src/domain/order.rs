//! Upstream marketplace order model.
//!
//! Orders arrive from the marketplace source already decoded; this module owns
//! the validated shape the pipelines work with and a few presentation helpers
//! used when composing CRM deals.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Validation errors raised when building domain order values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderValidationError {
    #[error("order code must not be blank")]
    BlankCode,
    #[error("order state must not be blank")]
    BlankState,
}

/// Natural key of an upstream order.
///
/// ```
/// use kaspi_amo_sync::domain::OrderCode;
///
/// let code = OrderCode::new(" 120045 ").expect("valid code");
/// assert_eq!(code.as_str(), "120045");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderCode(String);

impl OrderCode {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, OrderValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(OrderValidationError::BlankCode);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Redacted form used in health output: `***` plus the last four chars.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("***{tail}")
    }
}

impl TryFrom<String> for OrderCode {
    type Error = OrderValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OrderCode> for String {
    fn from(value: OrderCode) -> Self {
        value.0
    }
}

impl fmt::Display for OrderCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upstream order state, mirrored verbatim from the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderState(String);

impl OrderState {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, OrderValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(OrderValidationError::BlankState);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase rendering used as a CRM tag.
    pub fn as_tag(&self) -> String {
        self.0.to_lowercase()
    }
}

impl TryFrom<String> for OrderState {
    type Error = OrderValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OrderState> for String {
    fn from(value: OrderState) -> Self {
        value.0
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Buyer contact fields as reported upstream.
///
/// The marketplace exposes the phone number under several field names; the
/// first populated one wins (see [`crate::domain::PhoneNumber::from_buyer`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buyer {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub middle_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile_phone: Option<String>,
    pub cell_phone: Option<String>,
    pub phone_number: Option<String>,
    pub contact_phone: Option<String>,
}

impl Buyer {
    /// Phone candidates in lookup priority order.
    pub fn phone_candidates(&self) -> [Option<&str>; 5] {
        [
            self.phone.as_deref(),
            self.mobile_phone.as_deref(),
            self.cell_phone.as_deref(),
            self.phone_number.as_deref(),
            self.contact_phone.as_deref(),
        ]
    }

    /// "last first middle" with blank parts dropped, if any part exists.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.last_name, &self.first_name, &self.middle_name]
            .into_iter()
            .filter_map(|part| part.as_deref().map(str::trim))
            .filter(|part| !part.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    /// Local part of the buyer e-mail address, if present.
    pub fn email_local_part(&self) -> Option<&str> {
        let email = self.email.as_deref()?.trim();
        let (local, _) = email.split_once('@')?;
        (!local.is_empty()).then_some(local)
    }
}

/// One order line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub price: f64,
}

impl LineItem {
    /// Human-readable line used inside deal notes.
    pub fn describe(&self) -> String {
        format!(
            "{} x {} — {}",
            self.name,
            self.quantity,
            format_amount(self.price)
        )
    }
}

/// Delivery details, when the order ships to an address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
}

/// Pickup details, when the buyer collects the order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pickup {
    pub address: Option<String>,
    pub point_name: Option<String>,
}

/// An order fetched from the marketplace.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamOrder {
    pub id: String,
    pub code: OrderCode,
    pub total_price: f64,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub buyer: Buyer,
    pub items: Vec<LineItem>,
    pub delivery: Option<Delivery>,
    pub pickup: Option<Pickup>,
}

impl UpstreamOrder {
    /// Most recent upstream modification time, falling back to creation.
    pub fn last_modified_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }

    /// Total price rounded to whole currency units, as the CRM stores it.
    pub fn rounded_price(&self) -> i64 {
        round_amount(self.total_price)
    }

    /// Delivery or pickup location rendered on one line.
    pub fn destination(&self) -> Option<String> {
        if let Some(delivery) = &self.delivery {
            let parts: Vec<&str> = [&delivery.region, &delivery.city, &delivery.address]
                .into_iter()
                .filter_map(|part| part.as_deref())
                .filter(|part| !part.trim().is_empty())
                .collect();
            if !parts.is_empty() {
                return Some(parts.join(", "));
            }
        }
        let pickup = self.pickup.as_ref()?;
        match (&pickup.point_name, &pickup.address) {
            (Some(point), Some(address)) => Some(format!("{point} ({address})")),
            (Some(point), None) => Some(point.clone()),
            (None, Some(address)) => Some(address.clone()),
            (None, None) => None,
        }
    }
}

/// Round an upstream amount to the nearest whole unit.
#[expect(
    clippy::cast_possible_truncation,
    reason = "order totals are far below i64 range; NaN maps to zero"
)]
pub fn round_amount(amount: f64) -> i64 {
    if amount.is_finite() {
        amount.round() as i64
    } else {
        0
    }
}

/// Render an amount without a trailing `.0` for whole values.
pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 && amount.is_finite() {
        format!("{}", round_amount(amount))
    } else {
        format!("{amount:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", false)]
    #[case("   ", false)]
    #[case("ORDER-1", true)]
    fn order_code_rejects_blank_values(#[case] raw: &str, #[case] ok: bool) {
        assert_eq!(OrderCode::new(raw).is_ok(), ok);
    }

    #[rstest]
    #[case("123456789", "***6789")]
    #[case("12", "***12")]
    fn order_code_masks_all_but_tail(#[case] raw: &str, #[case] expected: &str) {
        let code = OrderCode::new(raw).expect("valid code");
        assert_eq!(code.masked(), expected);
    }

    #[test]
    fn full_name_skips_blank_parts() {
        let buyer = Buyer {
            first_name: Some("Aigerim".to_owned()),
            last_name: Some("Nurlanova".to_owned()),
            middle_name: Some("  ".to_owned()),
            ..Buyer::default()
        };
        assert_eq!(buyer.full_name().as_deref(), Some("Nurlanova Aigerim"));
        assert_eq!(Buyer::default().full_name(), None);
    }

    #[test]
    fn email_local_part_requires_at_sign() {
        let mut buyer = Buyer {
            email: Some("buyer@example.kz".to_owned()),
            ..Buyer::default()
        };
        assert_eq!(buyer.email_local_part(), Some("buyer"));
        buyer.email = Some("not-an-email".to_owned());
        assert_eq!(buyer.email_local_part(), None);
    }

    #[rstest]
    #[case(1000.0, "1000")]
    #[case(999.5, "999.50")]
    fn formats_amounts(#[case] amount: f64, #[case] expected: &str) {
        assert_eq!(format_amount(amount), expected);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_amount(1499.5), 1500);
        assert_eq!(round_amount(f64::NAN), 0);
    }
}

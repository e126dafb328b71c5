//! Contact names, deal names, notes, and tags derived from an order.

use super::order::{Buyer, UpstreamOrder, format_amount};
use super::phone::PhoneNumber;
use crate::domain::CrmContactId;
use crate::domain::ports::NewDeal;

/// Note template used when none is configured.
pub const DEFAULT_NOTE_TEMPLATE: &str = "Kaspi items: {{items}}. Total: {{total}} KZT.";

const NO_ITEMS_PLACEHOLDER: &str = "no items listed";
const FALLBACK_CONTACT_NAME: &str = "Kaspi buyer";

/// Where a deal was created from; reconciliation-created deals carry an
/// extra audit tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealOrigin {
    Poll,
    Reconcile,
}

/// Display name for the buyer's CRM contact.
pub fn contact_name(buyer: &Buyer, phone: Option<&PhoneNumber>) -> String {
    if let Some(name) = buyer.full_name() {
        return name;
    }
    if let Some(local) = buyer.email_local_part() {
        return local.to_owned();
    }
    match phone {
        Some(phone) => format!("Client {}", phone.masked()),
        None => FALLBACK_CONTACT_NAME.to_owned(),
    }
}

/// Deal title shown in the CRM pipeline.
pub fn deal_name(order: &UpstreamOrder, contact_name: &str) -> String {
    format!("Kaspi #{} — {contact_name}", order.code)
}

/// `kaspi`, the lowercase upstream state, and `reconciled` when applicable.
pub fn deal_tags(order: &UpstreamOrder, origin: DealOrigin) -> Vec<String> {
    let mut tags = vec!["kaspi".to_owned(), order.state.as_tag()];
    if origin == DealOrigin::Reconcile {
        tags.push("reconciled".to_owned());
    }
    tags
}

/// Line items rendered as `name x qty — price`, joined by `; `.
pub fn describe_items(order: &UpstreamOrder) -> String {
    if order.items.is_empty() {
        return NO_ITEMS_PLACEHOLDER.to_owned();
    }
    order
        .items
        .iter()
        .map(|item| item.describe())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Deal note template with `{{items}}`, `{{total}}`, `{{code}}`, `{{state}}`
/// and `{{delivery}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteTemplate(String);

impl NoteTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute every placeholder occurrence for `order`.
    ///
    /// ```
    /// use kaspi_amo_sync::domain::NoteTemplate;
    ///
    /// let template = NoteTemplate::new("Order {{code}}: {{total}}");
    /// assert_eq!(template.as_str(), "Order {{code}}: {{total}}");
    /// ```
    pub fn render(&self, order: &UpstreamOrder) -> String {
        self.0
            .replace("{{items}}", &describe_items(order))
            .replace("{{total}}", &format_amount(order.total_price))
            .replace("{{code}}", order.code.as_str())
            .replace("{{state}}", order.state.as_str())
            .replace("{{delivery}}", order.destination().as_deref().unwrap_or("-"))
    }
}

impl Default for NoteTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_NOTE_TEMPLATE)
    }
}

/// Audit note appended when reconciliation replaces a deal's contents.
pub fn repair_note(order: &UpstreamOrder) -> String {
    format!(
        "Kaspi order {} changed upstream (state {}). Total: {} KZT. Items: {}.",
        order.code,
        order.state,
        format_amount(order.total_price),
        describe_items(order)
    )
}

/// Assemble the complex-create payload for `order`.
pub fn new_deal(
    order: &UpstreamOrder,
    contact_id: CrmContactId,
    contact_name: &str,
    template: &NoteTemplate,
    origin: DealOrigin,
) -> NewDeal {
    NewDeal {
        name: deal_name(order, contact_name),
        price: order.rounded_price(),
        contact_id,
        items: order.items.clone(),
        note: template.render(order),
        tags: deal_tags(order, origin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Delivery, LineItem, OrderState};
    use crate::test_support::orders::order;
    use rstest::rstest;

    fn buyer(first: Option<&str>, last: Option<&str>, email: Option<&str>) -> Buyer {
        Buyer {
            first_name: first.map(str::to_owned),
            last_name: last.map(str::to_owned),
            email: email.map(str::to_owned),
            ..Buyer::default()
        }
    }

    #[rstest]
    #[case(buyer(Some("Aigerim"), Some("Nurlanova"), None), "Nurlanova Aigerim")]
    #[case(buyer(None, None, Some("buyer.one@mail.kz")), "buyer.one")]
    #[case(buyer(Some("  "), None, None), "Client +770******78")]
    fn contact_name_falls_back_in_order(#[case] buyer: Buyer, #[case] expected: &str) {
        let phone = PhoneNumber::parse("+77012345678").expect("phone");
        assert_eq!(contact_name(&buyer, Some(&phone)), expected);
    }

    #[test]
    fn contact_name_without_anything_is_generic() {
        assert_eq!(contact_name(&Buyer::default(), None), "Kaspi buyer");
    }

    #[test]
    fn new_deal_carries_rounded_price_tags_and_note() {
        let mut order = order("ORDER-1");
        order.total_price = 1_999.6;
        order.state = OrderState::new("KASPI_DELIVERY").expect("state");
        order.items = vec![LineItem {
            sku: "SKU-1".to_owned(),
            name: "Kettle".to_owned(),
            quantity: 2,
            price: 999.8,
        }];

        let deal = new_deal(
            &order,
            CrmContactId::new(4),
            "Buyer",
            &NoteTemplate::default(),
            DealOrigin::Reconcile,
        );

        assert_eq!(deal.name, "Kaspi #ORDER-1 — Buyer");
        assert_eq!(deal.price, 2_000);
        assert_eq!(deal.tags, vec!["kaspi", "kaspi_delivery", "reconciled"]);
        assert_eq!(
            deal.note,
            "Kaspi items: Kettle x 2 — 999.80. Total: 1999.60 KZT."
        );
    }

    #[test]
    fn template_renders_every_placeholder() {
        let mut order = order("ORDER-2");
        order.total_price = 500.0;
        order.delivery = Some(Delivery {
            city: Some("Almaty".to_owned()),
            address: Some("Abay 1".to_owned()),
            region: None,
        });
        let template = NoteTemplate::new("{{code}}|{{state}}|{{total}}|{{items}}|{{delivery}}");

        assert_eq!(
            template.render(&order),
            "ORDER-2|NEW|500|no items listed|Almaty, Abay 1"
        );
    }

    #[test]
    fn poll_deals_are_not_tagged_reconciled() {
        let order = order("ORDER-3");
        assert_eq!(deal_tags(&order, DealOrigin::Poll), vec!["kaspi", "new"]);
    }
}

//! Driven port for the CRM.
//!
//! Token refresh, rate pacing, and payload shapes are adapter concerns. The
//! core only sees contacts, deals, line-item links, and notes.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::{CrmContactId, CrmDealId, LineItem, PhoneNumber};

/// A CRM contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmContact {
    pub id: CrmContactId,
    pub name: String,
}

/// Contact creation payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub name: String,
    pub phone: PhoneNumber,
}

/// Deal creation payload: deal, contact link, line items, tags, and note.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeal {
    pub name: String,
    pub price: i64,
    pub contact_id: CrmContactId,
    pub items: Vec<LineItem>,
    pub note: String,
    pub tags: Vec<String>,
}

/// A created deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrmDeal {
    pub id: CrmDealId,
}

/// Mutable deal fields the core updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DealUpdate {
    pub price: i64,
}

/// A line item currently linked to a deal.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedLineItem {
    pub element_id: u64,
    pub catalog_id: Option<u64>,
    pub quantity: Option<f64>,
}

/// A deal with its linked line items.
#[derive(Debug, Clone, PartialEq)]
pub struct DealSnapshot {
    pub id: CrmDealId,
    pub price: Option<i64>,
    pub linked_items: Vec<LinkedLineItem>,
}

/// A fully-resolved link to remove from a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlinkTarget {
    pub element_id: u64,
    pub catalog_id: u64,
}

define_port_error! {
    /// Errors surfaced while calling the CRM.
    pub enum CrmGatewayError {
        /// Network transport failed, the server answered with a 5xx, or a
        /// token refresh failed.
        Transport => "crm transport failed",
        /// The call exceeded its timeout.
        Timeout => "crm timeout",
        /// The CRM throttled the request.
        RateLimited => "crm rate limited request",
        /// Credentials were rejected even after a refresh.
        Unauthorized => "crm rejected credentials",
        /// The CRM refused the request as invalid.
        Rejected => "crm rejected request",
        /// The response could not be decoded.
        Decode => "crm response decode failed",
    }
}

impl CrmGatewayError {
    /// Return whether retrying this error is expected to help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::RateLimited { .. }
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Port for CRM mutations and reads used by the sync pipelines.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrmGateway: Send + Sync {
    /// Find a contact whose phone exactly matches `phone`.
    async fn find_contact_by_phone(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<CrmContact>, CrmGatewayError>;

    async fn create_contact(&self, contact: &NewContact) -> Result<CrmContact, CrmGatewayError>;

    /// Create a deal linked to a contact, with tags, line items, and a note.
    ///
    /// Once the deal itself exists the call succeeds, even if attaching the
    /// note afterwards fails; the deal id is the durable anchor.
    async fn create_deal_complex(&self, deal: &NewDeal) -> Result<CrmDeal, CrmGatewayError>;

    async fn update_deal(&self, id: CrmDealId, update: &DealUpdate)
    -> Result<(), CrmGatewayError>;

    /// Read a deal together with its linked line items.
    async fn get_deal(&self, id: CrmDealId) -> Result<DealSnapshot, CrmGatewayError>;

    async fn unlink_line_items(
        &self,
        id: CrmDealId,
        items: &[UnlinkTarget],
    ) -> Result<(), CrmGatewayError>;

    async fn link_line_items(&self, id: CrmDealId, items: &[LineItem])
    -> Result<(), CrmGatewayError>;

    async fn add_note(&self, id: CrmDealId, text: &str) -> Result<(), CrmGatewayError>;
}

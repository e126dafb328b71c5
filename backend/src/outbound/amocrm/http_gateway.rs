//! Reqwest-backed CRM gateway.
//!
//! Every request passes the shared [`RateGate`] and carries a bearer token
//! from the [`TokenManager`]; a rejected token is refreshed once.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::dto::{
    ComplexLeadDto, ComplexLeadResponseDto, ContactListDto, DealPlacement, LeadDto, LeadPatchDto,
    LinkRequestDto, NewContactDto, NoteDto, UnlinkRequestDto,
};
use super::oauth::TokenManager;
use crate::domain::ports::{
    CrmContact, CrmDeal, CrmGateway, CrmGatewayError, DealSnapshot, DealUpdate, NewContact,
    NewDeal, UnlinkTarget,
};
use crate::domain::{CrmDealId, LineItem, PhoneNumber};
use crate::outbound::http_support::{StatusClass, join_path, status_message};
use crate::outbound::rate_gate::RateGate;

pub struct AmoHttpGateway {
    client: Client,
    api_url: Url,
    tokens: TokenManager,
    gate: Arc<RateGate>,
    placement: DealPlacement,
}

impl AmoHttpGateway {
    /// `api_url` is the versioned API root, e.g. `https://acme.amocrm.ru/api/v4`.
    pub fn new(
        client: Client,
        api_url: Url,
        tokens: TokenManager,
        gate: Arc<RateGate>,
        placement: DealPlacement,
    ) -> Self {
        Self {
            client,
            api_url,
            tokens,
            gate,
            placement,
        }
    }

    async fn call<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Vec<u8>, CrmGatewayError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = join_path(&self.api_url, path)
            .map_err(|error| CrmGatewayError::rejected(format!("invalid path {path}: {error}")))?;
        self.tokens
            .with_token(|token| self.send(method.clone(), url.clone(), query, body, token))
            .await
    }

    async fn send<B>(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<&B>,
        token: String,
    ) -> Result<Vec<u8>, CrmGatewayError>
    where
        B: Serialize + ?Sized + Sync,
    {
        self.gate.wait().await;
        debug!(method = %method, path = url.path(), "crm request");
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        if status.is_success() {
            Ok(bytes.to_vec())
        } else {
            Err(map_status_error(status, bytes.as_ref()))
        }
    }
}

fn decode<T: DeserializeOwned>(what: &str, body: &[u8]) -> Result<T, CrmGatewayError> {
    serde_json::from_slice(body)
        .map_err(|error| CrmGatewayError::decode(format!("invalid {what} payload: {error}")))
}

#[async_trait]
impl CrmGateway for AmoHttpGateway {
    async fn find_contact_by_phone(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<CrmContact>, CrmGatewayError> {
        let body = self
            .call::<()>(Method::GET, "contacts", &[("query", phone.as_str())], None)
            .await?;
        // An empty search answers 204 with no body.
        if body.is_empty() {
            return Ok(None);
        }
        let list: ContactListDto = decode("contact search", body.as_ref())?;
        Ok(list.exact_phone_match(phone))
    }

    async fn create_contact(&self, contact: &NewContact) -> Result<CrmContact, CrmGatewayError> {
        let payload = [NewContactDto::from(contact)];
        let body = self
            .call(Method::POST, "contacts", &[], Some(&payload))
            .await?;
        let list: ContactListDto = decode("contact creation", body.as_ref())?;
        let created = list
            .into_first()
            .ok_or_else(|| CrmGatewayError::decode("contact creation returned no contact"))?;
        info!(contact_id = %created.id, phone = %contact.phone.masked(), "crm contact created");
        Ok(created)
    }

    async fn create_deal_complex(&self, deal: &NewDeal) -> Result<CrmDeal, CrmGatewayError> {
        let payload = [ComplexLeadDto::new(deal, &self.placement)];
        let body = self
            .call(Method::POST, "leads/complex", &[], Some(&payload))
            .await?;
        let response: ComplexLeadResponseDto = decode("deal creation", body.as_ref())?;
        let id = response
            .deal_id()
            .ok_or_else(|| CrmGatewayError::decode("deal creation returned no deal"))?;
        info!(deal_id = %id, price = deal.price, items = deal.items.len(), "crm deal created");

        if !deal.note.is_empty() {
            if let Err(error) = self.add_note(id, &deal.note).await {
                warn!(deal_id = %id, error = %error, "deal created but note was not attached");
            }
        }
        Ok(CrmDeal { id })
    }

    async fn update_deal(
        &self,
        id: CrmDealId,
        update: &DealUpdate,
    ) -> Result<(), CrmGatewayError> {
        let payload = LeadPatchDto::new(id, update.price);
        self.call(Method::PATCH, &format!("leads/{id}"), &[], Some(&payload))
            .await?;
        info!(deal_id = %id, price = update.price, "crm deal updated");
        Ok(())
    }

    async fn get_deal(&self, id: CrmDealId) -> Result<DealSnapshot, CrmGatewayError> {
        let body = self
            .call::<()>(
                Method::GET,
                &format!("leads/{id}"),
                &[("with", "catalog_elements")],
                None,
            )
            .await?;
        let lead: LeadDto = decode("deal", body.as_ref())?;
        Ok(lead.into_domain())
    }

    async fn unlink_line_items(
        &self,
        id: CrmDealId,
        items: &[UnlinkTarget],
    ) -> Result<(), CrmGatewayError> {
        if items.is_empty() {
            return Ok(());
        }
        let payload = UnlinkRequestDto::new(items);
        self.call(Method::POST, &format!("leads/{id}/unlink"), &[], Some(&payload))
            .await?;
        debug!(deal_id = %id, items = items.len(), "crm line items unlinked");
        Ok(())
    }

    async fn link_line_items(
        &self,
        id: CrmDealId,
        items: &[LineItem],
    ) -> Result<(), CrmGatewayError> {
        if items.is_empty() {
            return Ok(());
        }
        let payload = LinkRequestDto::new(items, &self.placement);
        self.call(Method::POST, &format!("leads/{id}/link"), &[], Some(&payload))
            .await?;
        debug!(deal_id = %id, items = items.len(), "crm line items linked");
        Ok(())
    }

    async fn add_note(&self, id: CrmDealId, text: &str) -> Result<(), CrmGatewayError> {
        let payload = [NoteDto::common(id, text)];
        self.call(Method::POST, "leads/notes", &[], Some(&payload))
            .await?;
        debug!(deal_id = %id, chars = text.chars().count(), "crm note added");
        Ok(())
    }
}

fn map_transport_error(error: reqwest::Error) -> CrmGatewayError {
    if error.is_timeout() {
        CrmGatewayError::timeout(error.to_string())
    } else {
        CrmGatewayError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> CrmGatewayError {
    let message = status_message(status, body);
    match StatusClass::of(status) {
        StatusClass::RateLimited => CrmGatewayError::rate_limited(message),
        StatusClass::Timeout => CrmGatewayError::timeout(message),
        StatusClass::Unauthorized => CrmGatewayError::unauthorized(message),
        StatusClass::Rejected => CrmGatewayError::rejected(message),
        StatusClass::Transport => CrmGatewayError::transport(message),
    }
}

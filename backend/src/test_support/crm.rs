//! Recording CRM double with scripted failures.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::ports::{
    CrmContact, CrmDeal, CrmGateway, CrmGatewayError, DealSnapshot, DealUpdate, LinkedLineItem,
    NewContact, NewDeal, UnlinkTarget,
};
use crate::domain::{CrmContactId, CrmDealId, LineItem, PhoneNumber};

/// Catalog id assigned to items linked through this double.
pub const TEST_CATALOG_ID: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrmOp {
    FindContact,
    CreateContact,
    CreateDeal,
    UpdateDeal,
    GetDeal,
    Unlink,
    Link,
    AddNote,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrmCall {
    FindContact(String),
    CreateContact(NewContact),
    CreateDeal(NewDeal),
    UpdateDeal(CrmDealId, DealUpdate),
    GetDeal(CrmDealId),
    Unlink(CrmDealId, Vec<UnlinkTarget>),
    Link(CrmDealId, Vec<LineItem>),
    AddNote(CrmDealId, String),
}

impl CrmCall {
    pub fn op(&self) -> CrmOp {
        match self {
            Self::FindContact(_) => CrmOp::FindContact,
            Self::CreateContact(_) => CrmOp::CreateContact,
            Self::CreateDeal(_) => CrmOp::CreateDeal,
            Self::UpdateDeal(..) => CrmOp::UpdateDeal,
            Self::GetDeal(_) => CrmOp::GetDeal,
            Self::Unlink(..) => CrmOp::Unlink,
            Self::Link(..) => CrmOp::Link,
            Self::AddNote(..) => CrmOp::AddNote,
        }
    }
}

#[derive(Default)]
struct CrmState {
    calls: Vec<CrmCall>,
    contacts: HashMap<String, CrmContact>,
    linked: HashMap<CrmDealId, Vec<LinkedLineItem>>,
    failures: HashMap<CrmOp, VecDeque<CrmGatewayError>>,
    next_id: u64,
}

impl CrmState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn link(&mut self, deal: CrmDealId, items: &[LineItem]) {
        let linked: Vec<LinkedLineItem> = items
            .iter()
            .map(|item| LinkedLineItem {
                element_id: self.next_id(),
                catalog_id: Some(TEST_CATALOG_ID),
                quantity: Some(f64::from(item.quantity)),
            })
            .collect();
        self.linked.entry(deal).or_default().extend(linked);
    }
}

/// CRM double that stores contacts, deals, and linked items in memory.
#[derive(Default)]
pub struct RecordingCrm {
    state: Mutex<CrmState>,
}

impl RecordingCrm {
    fn state(&self) -> std::sync::MutexGuard<'_, CrmState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("crm mutex"),
        }
    }

    /// Record `call` and pop the next scripted failure for its operation.
    fn enter(&self, call: CrmCall) -> Result<std::sync::MutexGuard<'_, CrmState>, CrmGatewayError> {
        let mut state = self.state();
        let op = call.op();
        state.calls.push(call);
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }

    /// Fail the next call of `op` with `error`. Queued failures apply in order.
    pub fn fail_next(&self, op: CrmOp, error: CrmGatewayError) {
        self.state().failures.entry(op).or_default().push_back(error);
    }

    pub fn add_contact(&self, phone: &str, id: u64) {
        self.state().contacts.insert(
            phone.to_owned(),
            CrmContact {
                id: CrmContactId::new(id),
                name: "Existing contact".to_owned(),
            },
        );
    }

    pub fn set_linked_items(&self, deal: CrmDealId, items: Vec<LinkedLineItem>) {
        self.state().linked.insert(deal, items);
    }

    pub fn linked_items(&self, deal: CrmDealId) -> Vec<LinkedLineItem> {
        self.state().linked.get(&deal).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<CrmCall> {
        self.state().calls.clone()
    }

    pub fn count(&self, op: CrmOp) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.op() == op)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

#[async_trait]
impl CrmGateway for RecordingCrm {
    async fn find_contact_by_phone(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<CrmContact>, CrmGatewayError> {
        let state = self.enter(CrmCall::FindContact(phone.as_str().to_owned()))?;
        Ok(state.contacts.get(phone.as_str()).cloned())
    }

    async fn create_contact(&self, contact: &NewContact) -> Result<CrmContact, CrmGatewayError> {
        let mut state = self.enter(CrmCall::CreateContact(contact.clone()))?;
        let created = CrmContact {
            id: CrmContactId::new(state.next_id()),
            name: contact.name.clone(),
        };
        state
            .contacts
            .insert(contact.phone.as_str().to_owned(), created.clone());
        Ok(created)
    }

    async fn create_deal_complex(&self, deal: &NewDeal) -> Result<CrmDeal, CrmGatewayError> {
        let mut state = self.enter(CrmCall::CreateDeal(deal.clone()))?;
        let id = CrmDealId::new(state.next_id());
        state.link(id, &deal.items);
        Ok(CrmDeal { id })
    }

    async fn update_deal(&self, id: CrmDealId, update: &DealUpdate) -> Result<(), CrmGatewayError> {
        self.enter(CrmCall::UpdateDeal(id, *update))?;
        Ok(())
    }

    async fn get_deal(&self, id: CrmDealId) -> Result<DealSnapshot, CrmGatewayError> {
        let state = self.enter(CrmCall::GetDeal(id))?;
        Ok(DealSnapshot {
            id,
            price: None,
            linked_items: state.linked.get(&id).cloned().unwrap_or_default(),
        })
    }

    async fn unlink_line_items(
        &self,
        id: CrmDealId,
        items: &[UnlinkTarget],
    ) -> Result<(), CrmGatewayError> {
        let mut state = self.enter(CrmCall::Unlink(id, items.to_vec()))?;
        if let Some(linked) = state.linked.get_mut(&id) {
            linked.retain(|item| !items.iter().any(|target| target.element_id == item.element_id));
        }
        Ok(())
    }

    async fn link_line_items(&self, id: CrmDealId, items: &[LineItem]) -> Result<(), CrmGatewayError> {
        let mut state = self.enter(CrmCall::Link(id, items.to_vec()))?;
        state.link(id, items);
        Ok(())
    }

    async fn add_note(&self, id: CrmDealId, text: &str) -> Result<(), CrmGatewayError> {
        self.enter(CrmCall::AddNote(id, text.to_owned()))?;
        Ok(())
    }
}

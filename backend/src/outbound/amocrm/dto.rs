//! Request and response shapes for the CRM REST API (v4).

use serde::{Deserialize, Serialize};

use crate::domain::ports::{
    CrmContact, DealSnapshot, LinkedLineItem, NewContact, NewDeal, UnlinkTarget,
};
use crate::domain::{CrmContactId, CrmDealId, LineItem, PhoneNumber, round_amount};

const PHONE_FIELD_CODE: &str = "PHONE";
const PHONE_ENUM_CODE: &str = "WORK";
/// Catalog id the CRM uses for free-form positions when none is configured.
pub(super) const FREE_POSITION_CATALOG_FALLBACK: i64 = -1;

// Contacts

#[derive(Debug, Default, Deserialize)]
pub(super) struct ContactListDto {
    #[serde(rename = "_embedded", default)]
    embedded: ContactsEmbeddedDto,
}

#[derive(Debug, Default, Deserialize)]
struct ContactsEmbeddedDto {
    #[serde(default)]
    contacts: Vec<ContactDto>,
}

#[derive(Debug, Deserialize)]
struct ContactDto {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    custom_fields_values: Option<Vec<CustomFieldDto>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CustomFieldDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    field_code: Option<String>,
    #[serde(default)]
    values: Vec<CustomFieldValueDto>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CustomFieldValueDto {
    value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enum_code: Option<String>,
}

impl ContactListDto {
    /// First contact with a phone that normalises to exactly `phone`.
    pub(super) fn exact_phone_match(self, phone: &PhoneNumber) -> Option<CrmContact> {
        self.embedded
            .contacts
            .into_iter()
            .find(|contact| contact.has_phone(phone))
            .map(ContactDto::into_domain)
    }

    pub(super) fn into_first(self) -> Option<CrmContact> {
        self.embedded
            .contacts
            .into_iter()
            .next()
            .map(ContactDto::into_domain)
    }
}

impl ContactDto {
    fn has_phone(&self, phone: &PhoneNumber) -> bool {
        self.custom_fields_values
            .iter()
            .flatten()
            .filter(|field| field.field_code.as_deref() == Some(PHONE_FIELD_CODE))
            .flat_map(|field| field.values.iter())
            .filter_map(|value| value.value.as_str())
            .any(|raw| PhoneNumber::parse(raw).is_ok_and(|parsed| parsed == *phone))
    }

    fn into_domain(self) -> CrmContact {
        CrmContact {
            id: CrmContactId::new(self.id),
            name: self.name.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct NewContactDto {
    name: String,
    custom_fields_values: Vec<CustomFieldDto>,
}

impl From<&NewContact> for NewContactDto {
    fn from(contact: &NewContact) -> Self {
        Self {
            name: contact.name.clone(),
            custom_fields_values: vec![CustomFieldDto {
                field_code: Some(PHONE_FIELD_CODE.to_owned()),
                values: vec![CustomFieldValueDto {
                    value: serde_json::Value::String(contact.phone.as_str().to_owned()),
                    enum_code: Some(PHONE_ENUM_CODE.to_owned()),
                }],
            }],
        }
    }
}

// Deals

/// Pipeline placement and catalog options for created deals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DealPlacement {
    pub pipeline_id: u64,
    pub status_id: u64,
    /// Attach order items as free-form catalog positions.
    pub use_free_positions: bool,
    pub free_position_catalog_id: Option<u64>,
}

impl DealPlacement {
    fn catalog_id(&self) -> i64 {
        self.free_position_catalog_id
            .and_then(|id| i64::try_from(id).ok())
            .unwrap_or(FREE_POSITION_CATALOG_FALLBACK)
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ComplexLeadDto {
    name: String,
    price: i64,
    pipeline_id: u64,
    status_id: u64,
    #[serde(rename = "_embedded")]
    embedded: ComplexLeadEmbeddedDto,
}

#[derive(Debug, Serialize)]
struct ComplexLeadEmbeddedDto {
    contacts: Vec<IdDto>,
    tags: Vec<TagDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog_elements: Option<Vec<CatalogPositionDto>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct IdDto {
    id: u64,
}

#[derive(Debug, Serialize)]
struct TagDto {
    name: String,
}

/// A free-form line item as sent on create and link.
#[derive(Debug, PartialEq, Serialize)]
pub(super) struct CatalogPositionDto {
    name: String,
    quantity: u32,
    price: i64,
    catalog_id: i64,
}

impl CatalogPositionDto {
    fn new(item: &LineItem, catalog_id: i64) -> Self {
        Self {
            name: item.name.clone(),
            quantity: item.quantity,
            price: round_amount(item.price),
            catalog_id,
        }
    }
}

impl ComplexLeadDto {
    pub(super) fn new(deal: &NewDeal, placement: &DealPlacement) -> Self {
        let catalog_elements = placement.use_free_positions.then(|| {
            deal.items
                .iter()
                .map(|item| CatalogPositionDto::new(item, placement.catalog_id()))
                .collect()
        });
        Self {
            name: deal.name.clone(),
            price: deal.price,
            pipeline_id: placement.pipeline_id,
            status_id: placement.status_id,
            embedded: ComplexLeadEmbeddedDto {
                contacts: vec![IdDto {
                    id: deal.contact_id.get(),
                }],
                tags: deal
                    .tags
                    .iter()
                    .map(|tag| TagDto { name: tag.clone() })
                    .collect(),
                catalog_elements,
            },
        }
    }
}

/// The complex endpoint answers with a bare list; older accounts wrap it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum ComplexLeadResponseDto {
    List(Vec<IdDto>),
    Embedded {
        #[serde(rename = "_embedded")]
        embedded: LeadsEmbeddedDto,
    },
}

#[derive(Debug, Deserialize)]
pub(super) struct LeadsEmbeddedDto {
    leads: Vec<IdDto>,
}

impl ComplexLeadResponseDto {
    pub(super) fn deal_id(self) -> Option<CrmDealId> {
        let leads = match self {
            Self::List(leads) => leads,
            Self::Embedded { embedded } => embedded.leads,
        };
        leads.first().map(|lead| CrmDealId::new(lead.id))
    }
}

#[derive(Debug, Serialize)]
pub(super) struct LeadPatchDto {
    id: u64,
    price: i64,
}

impl LeadPatchDto {
    pub(super) fn new(id: CrmDealId, price: i64) -> Self {
        Self { id: id.get(), price }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct LeadDto {
    id: u64,
    price: Option<i64>,
    #[serde(rename = "_embedded", default)]
    embedded: LeadEmbeddedDto,
}

#[derive(Debug, Default, Deserialize)]
struct LeadEmbeddedDto {
    #[serde(default)]
    catalog_elements: Vec<LinkedElementDto>,
}

#[derive(Debug, Deserialize)]
struct LinkedElementDto {
    id: u64,
    catalog_id: Option<i64>,
    quantity: Option<f64>,
    #[serde(default)]
    metadata: Option<LinkMetadataDto>,
}

#[derive(Debug, Deserialize)]
struct LinkMetadataDto {
    catalog_id: Option<i64>,
    quantity: Option<f64>,
}

impl LeadDto {
    pub(super) fn into_domain(self) -> DealSnapshot {
        DealSnapshot {
            id: CrmDealId::new(self.id),
            price: self.price,
            linked_items: self
                .embedded
                .catalog_elements
                .into_iter()
                .map(LinkedElementDto::into_domain)
                .collect(),
        }
    }
}

impl LinkedElementDto {
    fn into_domain(self) -> LinkedLineItem {
        let metadata = self.metadata.as_ref();
        let catalog_id = self
            .catalog_id
            .or_else(|| metadata.and_then(|meta| meta.catalog_id))
            .and_then(|id| u64::try_from(id).ok());
        LinkedLineItem {
            element_id: self.id,
            catalog_id,
            quantity: self.quantity.or_else(|| metadata.and_then(|meta| meta.quantity)),
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct UnlinkRequestDto {
    catalog_elements: Vec<UnlinkElementDto>,
}

#[derive(Debug, Serialize)]
struct UnlinkElementDto {
    id: u64,
    catalog_id: u64,
}

impl UnlinkRequestDto {
    pub(super) fn new(targets: &[UnlinkTarget]) -> Self {
        Self {
            catalog_elements: targets
                .iter()
                .map(|target| UnlinkElementDto {
                    id: target.element_id,
                    catalog_id: target.catalog_id,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct LinkRequestDto {
    catalog_elements: Vec<CatalogPositionDto>,
}

impl LinkRequestDto {
    pub(super) fn new(items: &[LineItem], placement: &DealPlacement) -> Self {
        Self {
            catalog_elements: items
                .iter()
                .map(|item| CatalogPositionDto::new(item, placement.catalog_id()))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct NoteDto<'a> {
    entity_id: u64,
    note_type: &'static str,
    params: NoteParamsDto<'a>,
}

#[derive(Debug, Serialize)]
struct NoteParamsDto<'a> {
    text: &'a str,
}

impl<'a> NoteDto<'a> {
    pub(super) fn common(id: CrmDealId, text: &'a str) -> Self {
        Self {
            entity_id: id.get(),
            note_type: "common",
            params: NoteParamsDto { text },
        }
    }
}

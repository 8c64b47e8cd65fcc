//! Companies. Every company is backed by a partner carrying its address.

use serde::{Deserialize, Serialize};

use basis_core::{DomainError, DomainResult, Model, RecordId};

use crate::partner::Partner;

fn default_sequence() -> i32 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    #[serde(default)]
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<RecordId>,
    /// Set when the company is created.
    #[serde(default)]
    pub partner_id: Option<RecordId>,
    #[serde(default)]
    pub currency_id: Option<RecordId>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub vat: Option<String>,
    #[serde(default)]
    pub company_registry: Option<String>,
    #[serde(default = "default_sequence")]
    pub sequence: i32,
}

impl Company {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RecordId::default(),
            name: name.into(),
            parent_id: None,
            partner_id: None,
            currency_id: None,
            email: None,
            phone: None,
            vat: None,
            company_registry: None,
            sequence: default_sequence(),
        }
    }

    pub fn with_currency(mut self, currency: RecordId) -> Self {
        self.currency_id = Some(currency);
        self
    }

    /// Partner to create alongside a new company.
    pub fn partner_template(&self) -> Partner {
        let mut partner = Partner::company(self.name.clone());
        partner.email = self.email.clone();
        partner.phone = self.phone.clone();
        partner.vat = self.vat.clone();
        partner
    }
}

impl Model for Company {
    const NAME: &'static str = "Company";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn parent_id(&self) -> Option<RecordId> {
        self.parent_id
    }

    /// The company name must be unique.
    fn unique_key(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("company name is required"));
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

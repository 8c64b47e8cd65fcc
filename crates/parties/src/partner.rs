//! Partner records (companies and their contacts / addresses).

use serde::{Deserialize, Serialize};

use basis_core::{DomainError, DomainResult, Model, RecordId};

/// Role of a partner address within its commercial entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerType {
    #[default]
    Contact,
    Invoice,
    Delivery,
    Other,
    Private,
}

impl PartnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartnerType::Contact => "contact",
            PartnerType::Invoice => "invoice",
            PartnerType::Delivery => "delivery",
            PartnerType::Other => "other",
            PartnerType::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "contact" => Some(PartnerType::Contact),
            "invoice" => Some(PartnerType::Invoice),
            "delivery" => Some(PartnerType::Delivery),
            "other" => Some(PartnerType::Other),
            "private" => Some(PartnerType::Private),
            _ => None,
        }
    }

    /// Label used in place of a missing name.
    pub fn label(&self) -> &'static str {
        match self {
            PartnerType::Contact => "Contact",
            PartnerType::Invoice => "Invoice Address",
            PartnerType::Delivery => "Delivery Address",
            PartnerType::Other => "Other Address",
            PartnerType::Private => "Private Address",
        }
    }
}

/// Postal address fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub street2: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        [
            &self.street,
            &self.street2,
            &self.zip,
            &self.city,
            &self.state,
            &self.country,
        ]
        .iter()
        .all(|f| f.as_deref().is_none_or(str::is_empty))
    }

    /// Multi-line rendering, skipping empty parts.
    pub fn display(&self) -> String {
        let zip_city = [self.zip.as_deref(), self.city.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        [
            self.street.clone(),
            self.street2.clone(),
            Some(zip_city),
            self.state.clone(),
            self.country.clone(),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    #[serde(default)]
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<RecordId>,
    #[serde(default)]
    pub is_company: bool,
    #[serde(default, rename = "type")]
    pub kind: PartnerType,
    #[serde(flatten)]
    pub address: Address,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub vat: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub company_id: Option<RecordId>,
    #[serde(default)]
    pub category_ids: Vec<RecordId>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Partner {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RecordId::default(),
            name: name.into(),
            parent_id: None,
            is_company: false,
            kind: PartnerType::Contact,
            address: Address::default(),
            email: None,
            phone: None,
            vat: None,
            lang: None,
            company_id: None,
            category_ids: Vec::new(),
            active: true,
        }
    }

    pub fn company(name: impl Into<String>) -> Self {
        Self {
            is_company: true,
            ..Self::new(name)
        }
    }

    pub fn child_of(mut self, parent: RecordId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    pub fn with_type(mut self, kind: PartnerType) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// `"Name" <email>`, or an empty string without an email.
    pub fn email_formatted(&self) -> String {
        match self.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => {
                let name = self.name.replace('"', "");
                if name.is_empty() {
                    email.to_string()
                } else {
                    format!("\"{name}\" <{email}>")
                }
            }
            _ => String::new(),
        }
    }
}

impl Model for Partner {
    const NAME: &'static str = "Partner";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn parent_id(&self) -> Option<RecordId> {
        self.parent_id
    }

    fn validate(&self) -> DomainResult<()> {
        if self.kind == PartnerType::Contact && self.name.trim().is_empty() {
            return Err(DomainError::validation("contacts require a name"));
        }
        if let Some(email) = self.email.as_deref().map(str::trim) {
            if !email.is_empty() && !email.contains('@') {
                return Err(DomainError::validation(format!("invalid email address '{email}'")));
            }
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.kind.label().to_string()
        } else {
            self.name.clone()
        }
    }
}

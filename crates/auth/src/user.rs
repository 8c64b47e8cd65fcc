//! User records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use basis_core::{DomainError, DomainResult, Model, RecordId};

use crate::group::GroupRef;

fn default_true() -> bool {
    true
}

fn default_lang() -> String {
    "en_US".to_string()
}

/// A user account. Passwords are held by the credential store, never here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: RecordId,
    pub login: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub partner_id: Option<RecordId>,
    #[serde(default)]
    pub company_id: Option<RecordId>,
    #[serde(default)]
    pub company_ids: Vec<RecordId>,
    #[serde(default)]
    pub groups: Vec<GroupRef>,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default)]
    pub tz: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Home action opened after login.
    #[serde(default)]
    pub action_id: Option<String>,
}

impl User {
    pub fn new(login: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: RecordId::default(),
            login: login.into(),
            name: name.into(),
            partner_id: None,
            company_id: None,
            company_ids: Vec::new(),
            groups: Vec::new(),
            lang: default_lang(),
            tz: None,
            active: true,
            action_id: None,
        }
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = GroupRef>) -> Self {
        self.groups = groups.into_iter().collect();
        self
    }

    pub fn with_company(mut self, company: RecordId) -> Self {
        self.company_id = Some(company);
        if !self.company_ids.contains(&company) {
            self.company_ids.push(company);
        }
        self
    }

    /// Context handed to the web client and to method calls.
    pub fn context(&self) -> Map<String, Value> {
        let mut ctx = Map::new();
        ctx.insert("lang".into(), json!(self.lang));
        ctx.insert("tz".into(), json!(self.tz.clone().unwrap_or_default()));
        ctx.insert("uid".into(), json!(self.id));
        ctx
    }
}

impl Model for User {
    const NAME: &'static str = "User";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.login.clone())
    }

    fn validate(&self) -> DomainResult<()> {
        if self.login.trim().is_empty() {
            return Err(DomainError::validation("user login is required"));
        }
        if self.login.trim() != self.login {
            return Err(DomainError::validation("user login cannot start or end with spaces"));
        }
        if let Some(company) = self.company_id {
            if !self.company_ids.is_empty() && !self.company_ids.contains(&company) {
                return Err(DomainError::validation(
                    "the chosen company is not in the allowed companies for this user",
                ));
            }
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.login.clone()
        } else {
            self.name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_is_required_and_trimmed() {
        assert!(User::new("", "Nobody").validate().is_err());
        assert!(User::new(" admin", "Admin").validate().is_err());
        assert!(User::new("admin", "Admin").validate().is_ok());
    }

    #[test]
    fn company_must_be_allowed() {
        let mut user = User::new("demo", "Demo").with_company(RecordId::new(1));
        assert!(user.validate().is_ok());
        user.company_id = Some(RecordId::new(2));
        assert!(user.validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let user: User = serde_json::from_value(json!({"login": "bob"})).unwrap();
        assert!(user.active);
        assert_eq!(user.lang, "en_US");
        assert!(user.id.is_new());
        assert_eq!(user.display_name(), "bob");
    }
}

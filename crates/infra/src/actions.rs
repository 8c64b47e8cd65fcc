//! Window actions opened by the web client.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use basis_auth::AccessKind;
use basis_core::{DomainError, DomainResult, Model, RecordId};
use basis_domains::{parse_domain_str, parse_literal};

use crate::methods::{MethodRegistry, Params, to_json};
use crate::table::Table;

fn default_view_mode() -> String {
    "list,form".to_string()
}

fn empty_list() -> String {
    "[]".to_string()
}

fn empty_dict() -> String {
    "{}".to_string()
}

fn default_target() -> String {
    "current".to_string()
}

fn default_limit() -> usize {
    80
}

fn act_window() -> String {
    "act_window".to_string()
}

/// Opens `res_model` in the given views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowAction {
    #[serde(default)]
    pub id: RecordId,
    /// External identifier, e.g. `base.action_partner_form`.
    #[serde(default)]
    pub xml_id: Option<String>,
    pub name: String,
    #[serde(default = "act_window", rename = "type")]
    pub kind: String,
    pub res_model: String,
    #[serde(default = "default_view_mode")]
    pub view_mode: String,
    #[serde(default = "empty_list")]
    pub domain: String,
    #[serde(default = "empty_dict")]
    pub context: String,
    #[serde(default)]
    pub res_id: Option<RecordId>,
    #[serde(default = "default_target")]
    pub target: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub help: Option<String>,
}

impl WindowAction {
    pub fn new(name: impl Into<String>, res_model: impl Into<String>) -> Self {
        Self {
            id: RecordId::default(),
            xml_id: None,
            name: name.into(),
            kind: act_window(),
            res_model: res_model.into(),
            view_mode: default_view_mode(),
            domain: empty_list(),
            context: empty_dict(),
            res_id: None,
            target: default_target(),
            limit: default_limit(),
            help: None,
        }
    }

    pub fn with_xml_id(mut self, xml_id: impl Into<String>) -> Self {
        self.xml_id = Some(xml_id.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

impl Model for WindowAction {
    const NAME: &'static str = "Action";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn unique_key(&self) -> Option<String> {
        self.xml_id.clone()
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() || self.res_model.trim().is_empty() {
            return Err(DomainError::validation("actions need a name and a model"));
        }
        if !matches!(self.target.as_str(), "current" | "new" | "inline" | "fullscreen" | "main") {
            return Err(DomainError::validation(format!("invalid action target '{}'", self.target)));
        }
        parse_domain_str(&self.domain)
            .map_err(|e| DomainError::validation(format!("action '{}': {e}", self.name)))?;
        match parse_literal(&self.context) {
            Ok(Value::Object(_)) => Ok(()),
            _ => Err(DomainError::validation(format!(
                "context of action '{}' must be a dict",
                self.name
            ))),
        }
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

/// Resolve an action reference: a numeric id (number or digit string) or an
/// external identifier.
pub fn load(table: &Table<WindowAction>, action: &Value) -> DomainResult<WindowAction> {
    let not_found = || DomainError::not_found(format!("action {action}"));
    match action {
        Value::Number(n) => {
            let id = n.as_i64().filter(|i| *i > 0).ok_or_else(not_found)?;
            table.get(RecordId::new(id)).map_err(|_| not_found())
        }
        Value::String(s) => match s.parse::<RecordId>() {
            Ok(id) => table.get(id).map_err(|_| not_found()),
            Err(_) => table
                .find(|a| a.xml_id.as_deref() == Some(s.as_str()))
                .ok_or_else(not_found),
        },
        _ => Err(not_found()),
    }
}

/// Register action methods on `registry`.
pub fn register(table: Arc<Table<WindowAction>>, registry: &mut MethodRegistry) {
    registry.register_table(table.clone());
    registry.register(WindowAction::NAME, "load", AccessKind::Read, move |_ctx, params| {
        let action: Value = Params::from_value(params).required(0, "action_id")?;
        to_json(&load(&table, &action)?)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn actions() -> Table<WindowAction> {
        let table = Table::new();
        table
            .create(WindowAction::new("Contacts", "Partner").with_xml_id("base.action_partner_form"))
            .unwrap();
        table
            .create(
                WindowAction::new("Companies", "Company")
                    .with_domain("[('parent_id', '=', False)]")
                    .with_context("{'default_is_company': True}"),
            )
            .unwrap();
        table
    }

    #[test]
    fn loads_by_id_or_xml_id() {
        let table = actions();
        assert_eq!(load(&table, &json!(2)).unwrap().name, "Companies");
        assert_eq!(load(&table, &json!("2")).unwrap().name, "Companies");
        assert_eq!(
            load(&table, &json!("base.action_partner_form")).unwrap().res_model,
            "Partner"
        );
        assert!(matches!(load(&table, &json!(9)), Err(DomainError::NotFound(_))));
        assert!(matches!(load(&table, &json!("base.nope")), Err(DomainError::NotFound(_))));
        assert!(load(&table, &json!(null)).is_err());
    }

    #[test]
    fn validation() {
        let mut bad = WindowAction::new("X", "Partner");
        bad.target = "elsewhere".into();
        assert!(bad.validate().is_err());
        assert!(WindowAction::new("X", "Partner").with_context("[]").validate().is_err());
        let table = actions();
        assert!(table
            .create(WindowAction::new("Dup", "Partner").with_xml_id("base.action_partner_form"))
            .is_err());
    }

    #[test]
    fn serializes_with_client_field_names() {
        let action = load(&actions(), &json!(1)).unwrap();
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], json!("act_window"));
        assert_eq!(value["view_mode"], json!("list,form"));
        assert_eq!(value["limit"], json!(80));
    }
}

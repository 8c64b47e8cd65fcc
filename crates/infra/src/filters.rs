//! Saved search filters of the web client.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use basis_auth::AccessKind;
use basis_core::{DomainError, DomainResult, Model, RecordId};
use basis_domains::{Condition, parse_domain_str, parse_literal};

use crate::methods::{MethodRegistry, Params, to_json};
use crate::table::Table;

fn empty_list() -> String {
    "[]".to_string()
}

fn empty_dict() -> String {
    "{}".to_string()
}

fn default_true() -> bool {
    true
}

/// A named domain/context/sort over one model, private to a user or shared
/// when `user_id` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub id: RecordId,
    pub name: String,
    pub model_id: String,
    #[serde(default)]
    pub user_id: Option<RecordId>,
    #[serde(default = "empty_list")]
    pub domain: String,
    #[serde(default = "empty_dict")]
    pub context: String,
    #[serde(default = "empty_list")]
    pub sort: String,
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Filter {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: RecordId::default(),
            name: name.into(),
            model_id: model.into(),
            user_id: None,
            domain: empty_list(),
            context: empty_dict(),
            sort: empty_list(),
            action_id: None,
            is_default: false,
            active: true,
        }
    }

    pub fn for_user(mut self, uid: RecordId) -> Self {
        self.user_id = Some(uid);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action_id = Some(action.into());
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn condition(&self) -> DomainResult<Condition> {
        parse_domain_str(&self.domain)
            .map_err(|e| DomainError::validation(format!("invalid domain for filter '{}': {e}", self.name)))
    }

    fn same_slot(&self, other: &Filter) -> bool {
        self.model_id == other.model_id && self.action_id == other.action_id
    }
}

impl Model for Filter {
    const NAME: &'static str = "Filter";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    /// Filter names are unique per model, user and action, ignoring case.
    fn unique_key(&self) -> Option<String> {
        Some(format!(
            "{}|{}|{}|{}",
            self.name.to_lowercase(),
            self.model_id,
            self.user_id.map(|u| u.get()).unwrap_or(0),
            self.action_id.as_deref().unwrap_or("")
        ))
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("filter name is required"));
        }
        if self.model_id.trim().is_empty() {
            return Err(DomainError::validation("filter model is required"));
        }
        self.condition()?;
        match parse_literal(&self.context) {
            Ok(Value::Object(_)) => {}
            _ => {
                return Err(DomainError::validation(format!(
                    "context of filter '{}' must be a dict",
                    self.name
                )));
            }
        }
        match parse_literal(&self.sort) {
            Ok(Value::Array(_)) => Ok(()),
            _ => Err(DomainError::validation(format!(
                "sort of filter '{}' must be a list",
                self.name
            ))),
        }
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

/// Filters of `model` visible to `uid`: their own and the shared ones, for
/// the given action (or those bound to no action).
pub fn get_filters(
    table: &Table<Filter>,
    model: &str,
    action_id: Option<&str>,
    uid: RecordId,
) -> Vec<Filter> {
    let mut filters = table.filter(|f| {
        f.active
            && f.model_id == model
            && f.user_id.is_none_or(|u| u == uid)
            && (f.action_id.is_none() || f.action_id.as_deref() == action_id)
    });
    filters.sort_by(|a, b| a.name.cmp(&b.name).then(b.id.cmp(&a.id)));
    filters
}

/// Save `filter`, overwriting the same-named filter of the same owner.
///
/// A personal default clears the owner's other defaults for the model; a
/// second shared default is refused.
pub fn create_or_replace(table: &Table<Filter>, filter: Filter) -> DomainResult<Filter> {
    let existing = table.find(|f| {
        f.same_slot(&filter)
            && f.user_id == filter.user_id
            && f.name.to_lowercase() == filter.name.to_lowercase()
    });

    if filter.is_default {
        match filter.user_id {
            Some(uid) => {
                let others = table.filter(|f| {
                    f.same_slot(&filter)
                        && f.user_id == Some(uid)
                        && f.is_default
                        && existing.as_ref().is_none_or(|e| e.id != f.id)
                });
                for other in others {
                    table.update(other.id, |f| f.is_default = false)?;
                }
            }
            None => {
                let clash = table.find(|f| {
                    f.same_slot(&filter)
                        && f.user_id.is_none()
                        && f.is_default
                        && existing.as_ref().is_none_or(|e| e.id != f.id)
                });
                if clash.is_some() {
                    return Err(DomainError::validation(format!(
                        "there is already a shared filter set as default for {}, delete or change it before setting a new default",
                        filter.model_id
                    )));
                }
            }
        }
    }

    match existing {
        Some(current) => table.update(current.id, |f| {
            *f = Filter {
                id: current.id,
                ..filter
            }
        }),
        None => table.create(filter),
    }
}

/// Register filter methods on `registry`.
pub fn register(table: Arc<Table<Filter>>, registry: &mut MethodRegistry) {
    registry.register_table(table.clone());

    let t = table.clone();
    registry.register(Filter::NAME, "get_filters", AccessKind::Read, move |ctx, params| {
        let params = Params::from_value(params);
        let model: String = params.required(0, "model")?;
        let action: Option<Value> = params.optional(1, "action_id")?;
        let action = match action {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        to_json(&get_filters(&t, &model, action.as_deref(), ctx.uid))
    });

    let t = table;
    registry.register(Filter::NAME, "create_or_replace", AccessKind::Create, move |ctx, params| {
        let mut values: Map<String, Value> = Params::from_value(params).required(0, "filter")?;
        values.remove("id");
        // Personal filters always belong to the caller.
        if values.get("user_id").is_some_and(|u| !u.is_null() && *u != json!(false)) {
            values.insert("user_id".to_string(), json!(ctx.uid));
        } else {
            values.insert("user_id".to_string(), Value::Null);
        }
        let filter: Filter = serde_json::from_value(Value::Object(values))
            .map_err(|e| DomainError::validation(format!("Filter: {e}")))?;
        Ok(json!(create_or_replace(&t, filter)?.id))
    });
}

//! Method registry: `(model, method)` → handler.
//!
//! Every callable model method is registered here at startup, with the
//! access kind a caller needs. The web layer and the worker pool both
//! dispatch through the registry; nothing looks methods up by reflection.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use thiserror::Error;

use basis_auth::{AccessKind, AuthzError, SUPERUSER_ID, SecurityRegistry};
use basis_core::{DomainError, Model, RecordId};
use basis_domains::{Condition, DomainParseError, parse_domain};

use crate::table::{SearchOptions, Table};

/// Caller of a method: who, and with which client context.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecContext {
    pub uid: RecordId,
    pub context: Map<String, Value>,
}

impl ExecContext {
    pub fn new(uid: RecordId, context: Map<String, Value>) -> Self {
        Self { uid, context }
    }

    /// Fresh super-user context, as used by background jobs.
    pub fn superuser() -> Self {
        Self::new(SUPERUSER_ID, Map::new())
    }

    pub fn is_superuser(&self) -> bool {
        self.uid == SUPERUSER_ID
    }

    pub fn lang(&self) -> &str {
        self.context
            .get("lang")
            .and_then(Value::as_str)
            .unwrap_or("en_US")
    }
}

#[derive(Debug, Error)]
pub enum MethodError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("model '{model}' has no method '{method}'")]
    UnknownMethod { model: String, method: String },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("invalid domain: {0}")]
    Parse(#[from] DomainParseError),

    #[error(transparent)]
    Access(#[from] AuthzError),
}

impl MethodError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    /// Error name reported to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            MethodError::UnknownModel(_) | MethodError::UnknownMethod { .. } => "not_found",
            MethodError::InvalidParams(_) | MethodError::Parse(_) => "validation_error",
            MethodError::Domain(e) => e.kind(),
            MethodError::Access(_) => "access_error",
        }
    }
}

pub type MethodResult = Result<Value, MethodError>;

type Handler = dyn Fn(&ExecContext, Value) -> MethodResult + Send + Sync;

/// A registered method.
#[derive(Clone)]
pub struct MethodEntry {
    pub access: AccessKind,
    handler: Arc<Handler>,
}

impl MethodEntry {
    pub fn invoke(&self, ctx: &ExecContext, params: Value) -> MethodResult {
        (self.handler)(ctx, params)
    }
}

impl std::fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodEntry").field("access", &self.access).finish()
    }
}

#[derive(Debug)]
pub struct MethodRegistry {
    models: HashMap<String, BTreeMap<String, MethodEntry>>,
    security: Arc<SecurityRegistry>,
}

impl MethodRegistry {
    pub fn new(security: Arc<SecurityRegistry>) -> Self {
        Self {
            models: HashMap::new(),
            security,
        }
    }

    pub fn security(&self) -> &Arc<SecurityRegistry> {
        &self.security
    }

    /// Register (or replace) `model.method`.
    pub fn register<F>(&mut self, model: &str, method: &str, access: AccessKind, handler: F)
    where
        F: Fn(&ExecContext, Value) -> MethodResult + Send + Sync + 'static,
    {
        self.models.entry(model.to_string()).or_default().insert(
            method.to_string(),
            MethodEntry {
                access,
                handler: Arc::new(handler),
            },
        );
    }

    pub fn has_model(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn models(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn methods(&self, model: &str) -> Vec<&str> {
        self.models
            .get(model)
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn resolve(&self, model: &str, method: &str) -> Result<MethodEntry, MethodError> {
        let methods = self
            .models
            .get(model)
            .ok_or_else(|| MethodError::UnknownModel(model.to_string()))?;
        methods
            .get(method)
            .cloned()
            .ok_or_else(|| MethodError::UnknownMethod {
                model: model.to_string(),
                method: method.to_string(),
            })
    }

    /// Resolve, check the caller's access and run.
    pub fn call(&self, ctx: &ExecContext, model: &str, method: &str, params: Value) -> MethodResult {
        let entry = self.resolve(model, method)?;
        if !ctx.is_superuser() {
            self.security.check_access(ctx.uid, model, entry.access)?;
        }
        entry.invoke(ctx, params)
    }

    /// Register the generic record methods of a table.
    pub fn register_table<T: Model>(&mut self, table: Arc<Table<T>>) {
        let model = T::NAME;

        let t = table.clone();
        self.register(model, "create", AccessKind::Create, move |_ctx, params| {
            let params = Params::from_value(params);
            let values: Map<String, Value> = params.required(0, "vals")?;
            Ok(json!(t.create_values(values)?.id()))
        });

        let t = table.clone();
        self.register(model, "write", AccessKind::Write, move |_ctx, params| {
            let params = Params::from_value(params);
            let ids = params.ids(0, "ids")?;
            let values: Map<String, Value> = params.required(1, "vals")?;
            for id in ids {
                t.write_values(id, &values)?;
            }
            Ok(json!(true))
        });

        let t = table.clone();
        self.register(model, "unlink", AccessKind::Unlink, move |_ctx, params| {
            for id in Params::from_value(params).ids(0, "ids")? {
                t.unlink(id)?;
            }
            Ok(json!(true))
        });

        let t = table.clone();
        self.register(model, "read", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let ids = params.ids(0, "ids")?;
            let fields: Vec<String> = params.optional(1, "fields")?.unwrap_or_default();
            Ok(json!(t.read(&ids, &fields)?))
        });

        let t = table.clone();
        self.register(model, "search", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let domain = params.domain(0, "domain")?;
            let options = params.search_options(1)?;
            Ok(json!(t.search(&domain, &options)?))
        });

        let t = table.clone();
        self.register(model, "search_read", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let domain = params.domain(0, "domain")?;
            let fields: Vec<String> = params.optional(1, "fields")?.unwrap_or_default();
            let options = params.search_options(2)?;
            Ok(json!(t.search_read(&domain, &fields, &options)?))
        });

        let t = table.clone();
        self.register(model, "search_count", AccessKind::Read, move |_ctx, params| {
            let domain = Params::from_value(params).domain(0, "domain")?;
            Ok(json!(t.search_count(&domain)?))
        });

        let t = table.clone();
        self.register(model, "read_group", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let domain = params.domain(0, "domain")?;
            let fields: Vec<String> = params.optional(1, "fields")?.unwrap_or_default();
            let groupby = params.group_by(2)?;
            let groups = t.read_group(&domain, &groupby, &fields)?;
            Ok(Value::Array(groups.iter().map(|g| g.to_json()).collect()))
        });

        let t = table.clone();
        self.register(model, "name_get", AccessKind::Read, move |_ctx, params| {
            let ids = Params::from_value(params).ids(0, "ids")?;
            Ok(name_pairs(t.name_get(&ids)))
        });

        self.register(model, "default_get", AccessKind::Read, move |ctx, params| {
            let fields: Vec<String> = Params::from_value(params).required(0, "fields_list")?;
            Ok(Value::Object(context_defaults(ctx, &fields)))
        });
    }
}

/// `[[id, "name"], ...]`, the `name_get` wire shape.
pub fn name_pairs(pairs: Vec<(RecordId, String)>) -> Value {
    Value::Array(pairs.into_iter().map(|(id, name)| json!([id, name])).collect())
}

/// Defaults supplied through `default_<field>` context keys.
pub fn context_defaults(ctx: &ExecContext, fields: &[String]) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|f| {
            ctx.context
                .get(&format!("default_{f}"))
                .map(|v| (f.clone(), v.clone()))
        })
        .collect()
}

/// Positional and keyword arguments of a call.
///
/// Accepts `{"args": [...], "kwargs": {...}}`, a bare list (positional) or a
/// bare object (keywords).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl Params {
    pub fn new(args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self { args, kwargs }
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(args) => Self::new(args, Map::new()),
            Value::Object(mut map)
                if map.keys().all(|k| k == "args" || k == "kwargs") && !map.is_empty() =>
            {
                let args = match map.remove("args") {
                    Some(Value::Array(args)) => args,
                    Some(Value::Null) | None => Vec::new(),
                    Some(other) => vec![other],
                };
                let kwargs = match map.remove("kwargs") {
                    Some(Value::Object(kwargs)) => kwargs,
                    _ => Map::new(),
                };
                Self::new(args, kwargs)
            }
            Value::Object(map) => Self::new(Vec::new(), map),
            Value::Null => Self::default(),
            other => Self::new(vec![other], Map::new()),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ "args": self.args, "kwargs": self.kwargs })
    }

    /// Keyword `name`, else positional `index`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.kwargs
            .get(name)
            .or_else(|| self.args.get(index))
            .filter(|v| !v.is_null())
    }

    pub fn optional<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<Option<T>, MethodError> {
        self.get(index, name)
            .map(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| MethodError::invalid(format!("'{name}': {e}")))
            })
            .transpose()
    }

    pub fn required<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, MethodError> {
        self.optional(index, name)?
            .ok_or_else(|| MethodError::invalid(format!("missing argument '{name}'")))
    }

    /// A single id or a list of ids.
    pub fn ids(&self, index: usize, name: &str) -> Result<Vec<RecordId>, MethodError> {
        match self.get(index, name) {
            Some(Value::Array(items)) => items.iter().map(|v| as_record_id(v, name)).collect(),
            Some(single) => Ok(vec![as_record_id(single, name)?]),
            None => Err(MethodError::invalid(format!("missing argument '{name}'"))),
        }
    }

    /// Parsed domain; absent means every record.
    pub fn domain(&self, index: usize, name: &str) -> Result<Condition, MethodError> {
        match self.get(index, name) {
            Some(domain) => Ok(parse_domain(domain)?),
            None => Ok(Condition::True),
        }
    }

    /// `offset`, `limit`, `order` keywords (positional from `first`).
    pub fn search_options(&self, first: usize) -> Result<SearchOptions, MethodError> {
        Ok(SearchOptions {
            offset: self.optional(first, "offset")?.unwrap_or(0),
            limit: self.optional::<usize>(first + 1, "limit")?.filter(|l| *l > 0),
            order: self.optional(first + 2, "order")?,
        })
    }

    /// First field of `groupby` (a string or a list).
    pub fn group_by(&self, index: usize) -> Result<String, MethodError> {
        let field = match self.get(index, "groupby") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Array(items)) => items.first().and_then(Value::as_str).map(str::to_string),
            _ => None,
        };
        field.ok_or_else(|| MethodError::invalid("missing argument 'groupby'"))
    }
}

fn as_record_id(value: &Value, name: &str) -> Result<RecordId, MethodError> {
    value
        .as_i64()
        .filter(|id| *id > 0)
        .map(RecordId::new)
        .ok_or_else(|| MethodError::invalid(format!("'{name}' must hold record ids, got {value}")))
}

/// Serialize a handler result.
pub fn to_json<T: Serialize>(value: &T) -> MethodResult {
    serde_json::to_value(value).map_err(|e| MethodError::Domain(DomainError::invariant(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use basis_auth::AccessRule;
    use basis_parties::Partner;

    fn registry() -> (MethodRegistry, Arc<SecurityRegistry>) {
        let security = Arc::new(SecurityRegistry::new());
        let mut registry = MethodRegistry::new(security.clone());
        let partners = Arc::new(Table::<Partner>::new());
        registry.register_table(partners);
        (registry, security)
    }

    fn user(uid: i64) -> ExecContext {
        ExecContext::new(RecordId::new(uid), Map::new())
    }

    #[test]
    fn params_accept_every_call_shape() {
        let p = Params::from_value(json!({"args": [[1, 2]], "kwargs": {"fields": ["name"]}}));
        assert_eq!(p.ids(0, "ids").unwrap(), vec![RecordId::new(1), RecordId::new(2)]);
        let fields: Vec<String> = p.required(1, "fields").unwrap();
        assert_eq!(fields, vec!["name"]);

        let p = Params::from_value(json!([7]));
        assert_eq!(p.ids(0, "ids").unwrap(), vec![RecordId::new(7)]);

        let p = Params::from_value(json!({"ids": 3}));
        assert_eq!(p.ids(0, "ids").unwrap(), vec![RecordId::new(3)]);
        assert!(p.ids(1, "other").is_err());
        assert!(Params::from_value(json!(["x"])).ids(0, "ids").is_err());
    }

    #[test]
    fn generic_crud_round_trip() {
        let (registry, _) = registry();
        let root = ExecContext::superuser();
        let id = registry
            .call(&root, "Partner", "create", json!([{"name": "Acme", "is_company": true}]))
            .unwrap();
        assert_eq!(id, json!(1));
        registry
            .call(&root, "Partner", "write", json!([[1], {"phone": "+32 2 000"}]))
            .unwrap();
        let rows = registry
            .call(
                &root,
                "Partner",
                "search_read",
                json!({"domain": [["is_company", "=", true]], "fields": ["name", "phone"]}),
            )
            .unwrap();
        assert_eq!(rows, json!([{"id": 1, "name": "Acme", "phone": "+32 2 000"}]));
        assert_eq!(
            registry.call(&root, "Partner", "name_get", json!([[1]])).unwrap(),
            json!([[1, "Acme"]])
        );
        assert_eq!(
            registry.call(&root, "Partner", "search_count", json!([])).unwrap(),
            json!(1)
        );
        registry.call(&root, "Partner", "unlink", json!([1])).unwrap();
        assert_eq!(
            registry.call(&root, "Partner", "search", json!([[]])).unwrap(),
            json!([])
        );
    }

    #[test]
    fn unknown_model_and_method_are_reported() {
        let (registry, _) = registry();
        let root = ExecContext::superuser();
        assert!(matches!(
            registry.call(&root, "Nope", "read", Value::Null),
            Err(MethodError::UnknownModel(_))
        ));
        let err = registry.call(&root, "Partner", "explode", Value::Null).unwrap_err();
        assert!(matches!(err, MethodError::UnknownMethod { .. }));
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn access_rules_gate_non_superusers() {
        let (registry, security) = registry();
        let err = registry.call(&user(5), "Partner", "search", json!([])).unwrap_err();
        assert!(matches!(err, MethodError::Access(_)));

        security.add_rule(AccessRule::new("Partner", None).allow(AccessKind::Read));
        assert!(registry.call(&user(5), "Partner", "search", json!([])).is_ok());
        assert!(matches!(
            registry.call(&user(5), "Partner", "create", json!([{"name": "X"}])),
            Err(MethodError::Access(_))
        ));
    }

    #[test]
    fn invalid_domains_surface_as_parse_errors() {
        let (registry, _) = registry();
        let err = registry
            .call(&ExecContext::superuser(), "Partner", "search", json!([[["name", "~", 1]]]))
            .unwrap_err();
        assert!(matches!(err, MethodError::Parse(_)));
    }

    #[test]
    fn default_get_reads_context_defaults() {
        let (registry, _) = registry();
        let mut context = Map::new();
        context.insert("default_is_company".into(), json!(true));
        let ctx = ExecContext::new(SUPERUSER_ID, context);
        let defaults = registry
            .call(&ctx, "Partner", "default_get", json!([["is_company", "name"]]))
            .unwrap();
        assert_eq!(defaults, json!({"is_company": true}));
    }

    #[test]
    fn read_group_buckets() {
        let (registry, _) = registry();
        let root = ExecContext::superuser();
        for (name, company) in [("A", true), ("B", false), ("C", false)] {
            registry
                .call(&root, "Partner", "create", json!([{"name": name, "is_company": company}]))
                .unwrap();
        }
        let groups = registry
            .call(&root, "Partner", "read_group", json!({"groupby": ["is_company"]}))
            .unwrap();
        assert_eq!(groups[0]["is_company_count"], json!(2));
        assert_eq!(groups[1]["is_company_count"], json!(1));
    }
}

use serde::Deserialize;
use serde_json::{Map, Value};

// -------------------------
// JSON-RPC envelope
// -------------------------

/// `{"jsonrpc": "2.0", "method": "call", "params": {...}, "id": ...}`.
#[derive(Debug, Deserialize)]
pub struct RpcRequest<P> {
    #[serde(default)]
    pub id: Value,
    pub params: P,
}

// -------------------------
// Request params
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CallKwParams {
    pub model: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl CallKwParams {
    /// Client context carried in `kwargs.context`.
    pub fn client_context(&mut self) -> Option<Map<String, Value>> {
        match self.kwargs.remove("context") {
            Some(Value::Object(ctx)) => Some(ctx),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchReadParams {
    pub model: String,
    #[serde(default)]
    pub domain: Value,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct ActionLoadParams {
    pub action_id: Value,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

/// Params of endpoints that take none (`{}` or `null`).
#[derive(Debug, Default, Deserialize)]
pub struct NoParams {}

// -------------------------
// Forms and queries
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub redirect: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RedirectQuery {
    #[serde(default)]
    pub redirect: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContentQuery {
    #[serde(default)]
    pub download: Option<bool>,
}

/// Local redirect target, or `/web`. Absolute URLs are refused.
pub fn safe_redirect(target: Option<&str>) -> String {
    match target.map(str::trim) {
        Some(t) if t.starts_with('/') && !t.starts_with("//") => t.to_string(),
        _ => "/web".to_string(),
    }
}

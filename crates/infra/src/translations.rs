//! Translated terms.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use basis_auth::AccessKind;
use basis_core::{DomainError, DomainResult, Model, RecordId};

use crate::methods::{MethodRegistry, Params};
use crate::table::Table;

/// What a translated term belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationKind {
    /// Field value of one record (`name` is `"Model,field"`).
    #[default]
    Model,
    /// String literal from code.
    Code,
    /// Selection option label.
    Selection,
    /// Field label or help.
    Field,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    #[serde(default)]
    pub id: RecordId,
    pub lang: String,
    #[serde(default, rename = "type")]
    pub kind: TranslationKind,
    /// `"Model,field"` for record terms, a code location otherwise.
    pub name: String,
    #[serde(default)]
    pub res_id: Option<RecordId>,
    pub src: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub module: Option<String>,
}

impl Translation {
    pub fn new(
        lang: impl Into<String>,
        kind: TranslationKind,
        name: impl Into<String>,
        src: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id: RecordId::default(),
            lang: lang.into(),
            kind,
            name: name.into(),
            res_id: None,
            src: src.into(),
            value: value.into(),
            module: None,
        }
    }

    pub fn for_record(mut self, res_id: RecordId) -> Self {
        self.res_id = Some(res_id);
        self
    }
}

impl Model for Translation {
    const NAME: &'static str = "Translation";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    /// One term per language, kind, name, record and source.
    fn unique_key(&self) -> Option<String> {
        Some(format!(
            "{}|{:?}|{}|{}|{}",
            self.lang,
            self.kind,
            self.name,
            self.res_id.map(|r| r.get()).unwrap_or(0),
            self.src
        ))
    }

    fn validate(&self) -> DomainResult<()> {
        if self.lang.trim().is_empty() || self.name.trim().is_empty() {
            return Err(DomainError::validation("translations need a language and a name"));
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        format!("{} ({})", self.src, self.lang)
    }
}

/// Translation of `src` into `lang`, or `src` itself when no non-empty
/// translation exists.
pub fn translate(
    table: &Table<Translation>,
    lang: &str,
    kind: TranslationKind,
    name: &str,
    src: &str,
    res_id: Option<RecordId>,
) -> String {
    table
        .find(|t| {
            t.lang == lang
                && t.kind == kind
                && t.name == name
                && t.src == src
                && t.res_id == res_id
                && !t.value.is_empty()
        })
        .map(|t| t.value)
        .unwrap_or_else(|| src.to_string())
}

/// Register translation methods on `registry`.
pub fn register(table: Arc<Table<Translation>>, registry: &mut MethodRegistry) {
    registry.register_table(table.clone());
    registry.register(Translation::NAME, "translate", AccessKind::Read, move |ctx, params| {
        let params = Params::from_value(params);
        let src: String = params.required(0, "src")?;
        let lang: Option<String> = params.optional(1, "lang")?;
        let kind: Option<TranslationKind> = params.optional(2, "type")?;
        let name: String = params.optional(3, "name")?.unwrap_or_default();
        let res_id: Option<RecordId> = params.optional(4, "res_id")?;
        let lang = lang.unwrap_or_else(|| ctx.lang().to_string());
        Ok(json!(translate(
            &table,
            &lang,
            kind.unwrap_or(TranslationKind::Code),
            &name,
            &src,
            res_id
        )))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::ExecContext;
    use basis_auth::{SUPERUSER_ID, SecurityRegistry};
    use serde_json::Map;

    fn table() -> Table<Translation> {
        let table = Table::new();
        table
            .create(Translation::new("fr_FR", TranslationKind::Code, "web", "Save", "Enregistrer"))
            .unwrap();
        table
            .create(
                Translation::new("fr_FR", TranslationKind::Model, "Partner,name", "Acme", "Acmé")
                    .for_record(RecordId::new(7)),
            )
            .unwrap();
        table
            .create(Translation::new("de_DE", TranslationKind::Code, "web", "Save", ""))
            .unwrap();
        table
    }

    #[test]
    fn translate_falls_back_to_source() {
        let t = table();
        assert_eq!(translate(&t, "fr_FR", TranslationKind::Code, "web", "Save", None), "Enregistrer");
        assert_eq!(translate(&t, "de_DE", TranslationKind::Code, "web", "Save", None), "Save");
        assert_eq!(translate(&t, "nl_NL", TranslationKind::Code, "web", "Save", None), "Save");
        assert_eq!(
            translate(&t, "fr_FR", TranslationKind::Model, "Partner,name", "Acme", Some(RecordId::new(7))),
            "Acmé"
        );
        assert_eq!(
            translate(&t, "fr_FR", TranslationKind::Model, "Partner,name", "Acme", Some(RecordId::new(8))),
            "Acme"
        );
    }

    #[test]
    fn duplicate_terms_are_rejected() {
        let t = table();
        assert!(t
            .create(Translation::new("fr_FR", TranslationKind::Code, "web", "Save", "Sauver"))
            .is_err());
    }

    #[test]
    fn rpc_uses_context_language() {
        let table = Arc::new(table());
        let mut registry = MethodRegistry::new(Arc::new(SecurityRegistry::new()));
        register(table, &mut registry);
        let mut context = Map::new();
        context.insert("lang".into(), json!("fr_FR"));
        let ctx = ExecContext::new(SUPERUSER_ID, context);
        let out = registry
            .call(&ctx, "Translation", "translate", json!({"src": "Save", "name": "web"}))
            .unwrap();
        assert_eq!(out, json!("Enregistrer"));
    }
}

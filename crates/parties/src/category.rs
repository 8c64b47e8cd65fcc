//! Partner tags, organised as a tree.

use serde::{Deserialize, Serialize};

use basis_core::{DomainError, DomainResult, Hierarchy, Model, RecordId};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerCategory {
    #[serde(default)]
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<RecordId>,
    #[serde(default)]
    pub color: u8,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl PartnerCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RecordId::default(),
            name: name.into(),
            parent_id: None,
            color: 0,
            active: true,
        }
    }

    pub fn child_of(mut self, parent: RecordId) -> Self {
        self.parent_id = Some(parent);
        self
    }
}

impl Model for PartnerCategory {
    const NAME: &'static str = "PartnerCategory";

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
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("tag name is required"));
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

/// `"Parent / Child"` path of a category, root first.
pub fn full_name(categories: &[PartnerCategory], id: RecordId) -> DomainResult<String> {
    let tree = Hierarchy::from_pairs(categories.iter().map(|c| (c.id, c.parent_id)));
    let name_of = |id: RecordId| {
        categories
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.clone())
            .ok_or_else(|| DomainError::not_found(format!("partner category {id}")))
    };
    let mut parts = vec![name_of(id)?];
    for ancestor in tree.ancestors(id)? {
        parts.push(name_of(ancestor)?);
    }
    parts.reverse();
    Ok(parts.join(" / "))
}

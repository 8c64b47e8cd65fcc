//! Model trait: a persisted business object with an integer identity.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::DomainResult;
use crate::id::RecordId;

/// A business object stored in a table.
///
/// Records are (de)serialized to JSON objects for the generic RPC surface
/// (`search_read`, `write`, ...), so every model must round-trip through serde
/// and should mark optional fields with `#[serde(default)]`.
pub trait Model: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Model name as exposed to clients (e.g. `"Partner"`).
    const NAME: &'static str;

    /// Record identifier (zero until the record has been created).
    fn id(&self) -> RecordId;

    fn set_id(&mut self, id: RecordId);

    /// Parent pointer for hierarchical models. Tables reject writes that
    /// would turn the parent chain into a cycle.
    fn parent_id(&self) -> Option<RecordId> {
        None
    }

    /// Value that must be unique across the table, if any.
    fn unique_key(&self) -> Option<String> {
        None
    }

    /// Recompute derived fields. Tables call this before `validate`.
    fn normalize(&mut self) {}

    /// Record-level validation, run on create and write.
    fn validate(&self) -> DomainResult<()> {
        Ok(())
    }

    /// Human readable label (`name_get`).
    fn display_name(&self) -> String {
        format!("{},{}", Self::NAME, self.id())
    }
}

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use basis_core::{Model, RecordId};

/// External identifier of a security group (e.g. `"base_group_user"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupRef(Cow<'static, str>);

impl GroupRef {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for GroupRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupRef {
    fn from(value: &str) -> Self {
        Self(Cow::Owned(value.to_string()))
    }
}

/// Members of every internal user.
pub const GROUP_USER: GroupRef = GroupRef::from_static("base_group_user");
/// Administration / settings.
pub const GROUP_SYSTEM: GroupRef = GroupRef::from_static("base_group_system");
pub const GROUP_PORTAL: GroupRef = GroupRef::from_static("base_group_portal");
/// Access to technical features (workers, sequences, ...).
pub const GROUP_NO_ONE: GroupRef = GroupRef::from_static("base_group_no_one");

/// Group as declared in the security registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub group: GroupRef,
    pub name: String,
    /// Membership in this group implies membership in these.
    #[serde(default)]
    pub implied: Vec<GroupRef>,
}

impl GroupDefinition {
    pub fn new(group: GroupRef, name: impl Into<String>) -> Self {
        Self {
            group,
            name: name.into(),
            implied: Vec::new(),
        }
    }

    pub fn implying(mut self, group: GroupRef) -> Self {
        self.implied.push(group);
        self
    }
}

/// Persisted group row, mirrored from the registry by `reload_groups`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default)]
    pub id: RecordId,
    pub group_id: GroupRef,
    pub name: String,
}

impl Model for Group {
    const NAME: &'static str = "Group";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.group_id.to_string())
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

use serde::{Deserialize, Serialize};

/// Kind of access a method needs on its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
    Create,
    Unlink,
}

impl AccessKind {
    pub const ALL: [AccessKind; 4] = [
        AccessKind::Read,
        AccessKind::Write,
        AccessKind::Create,
        AccessKind::Unlink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::Read => "read",
            AccessKind::Write => "write",
            AccessKind::Create => "create",
            AccessKind::Unlink => "unlink",
        }
    }
}

impl core::fmt::Display for AccessKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model access rule.
///
/// A rule without a group applies to every user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub model: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub unlink: bool,
}

impl AccessRule {
    /// Rule granting nothing yet; chain `allow` calls.
    pub fn new(model: impl Into<String>, group: Option<&str>) -> Self {
        Self {
            model: model.into(),
            group: group.map(str::to_string),
            read: false,
            write: false,
            create: false,
            unlink: false,
        }
    }

    /// Rule granting every kind of access.
    pub fn full(model: impl Into<String>, group: Option<&str>) -> Self {
        AccessKind::ALL
            .into_iter()
            .fold(Self::new(model, group), Self::allow)
    }

    pub fn allow(mut self, kind: AccessKind) -> Self {
        match kind {
            AccessKind::Read => self.read = true,
            AccessKind::Write => self.write = true,
            AccessKind::Create => self.create = true,
            AccessKind::Unlink => self.unlink = true,
        }
        self
    }

    pub fn grants(&self, kind: AccessKind) -> bool {
        match kind {
            AccessKind::Read => self.read,
            AccessKind::Write => self.write,
            AccessKind::Create => self.create,
            AccessKind::Unlink => self.unlink,
        }
    }
}

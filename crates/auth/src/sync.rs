//! Persisted group table and its one-way sync from the security registry.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::Serialize;

use basis_core::{DomainError, DomainResult, RecordId};

use crate::authorize::SecurityRegistry;
use crate::group::{Group, GroupRef};

#[derive(Debug, Default)]
struct Rows {
    last_id: i64,
    rows: BTreeMap<RecordId, Group>,
}

/// Group rows as seen by clients.
///
/// Only [`reload_groups`] may change the table; the public mutators always
/// fail with `SecurityViolation`.
#[derive(Debug, Default)]
pub struct GroupTable {
    inner: RwLock<Rows>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Vec<Group> {
        match self.inner.read() {
            Ok(inner) => inner.rows.values().cloned().collect(),
            Err(_) => vec![],
        }
    }

    pub fn get(&self, id: RecordId) -> Option<Group> {
        self.inner.read().ok()?.rows.get(&id).cloned()
    }

    pub fn find(&self, group: &GroupRef) -> Option<Group> {
        self.inner
            .read()
            .ok()?
            .rows
            .values()
            .find(|g| &g.group_id == group)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.inner.read().map(|i| i.rows.len()).unwrap_or(0)
    }

    pub fn create(&self, _group: Group) -> DomainResult<Group> {
        Err(protected())
    }

    pub fn write(&self, _id: RecordId, _group: Group) -> DomainResult<Group> {
        Err(protected())
    }

    pub fn unlink(&self, _id: RecordId) -> DomainResult<()> {
        Err(protected())
    }
}

fn protected() -> DomainError {
    DomainError::security("groups can only be modified through the security registry")
}

/// Counts of rows touched by a reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub members: usize,
}

/// Mirror the registry's groups into `table` and rebuild registry
/// memberships from the persisted users' group lists.
///
/// Group refs a user carries that the registry no longer knows are ignored.
pub fn reload_groups<I>(registry: &SecurityRegistry, table: &GroupTable, users: I) -> ReloadSummary
where
    I: IntoIterator<Item = (RecordId, Vec<GroupRef>)>,
{
    let mut summary = ReloadSummary::default();
    let definitions = registry.groups();
    {
        let mut inner = table.inner.write().unwrap_or_else(|p| p.into_inner());

        let before = inner.rows.len();
        inner
            .rows
            .retain(|_, row| definitions.iter().any(|d| d.group == row.group_id));
        summary.removed = before - inner.rows.len();

        for def in &definitions {
            let existing = inner
                .rows
                .values_mut()
                .find(|row| row.group_id == def.group);
            match existing {
                Some(row) if row.name == def.name => {}
                Some(row) => {
                    row.name = def.name.clone();
                    summary.updated += 1;
                }
                None => {
                    inner.last_id += 1;
                    let id = RecordId::new(inner.last_id);
                    inner.rows.insert(
                        id,
                        Group {
                            id,
                            group_id: def.group.clone(),
                            name: def.name.clone(),
                        },
                    );
                    summary.created += 1;
                }
            }
        }
    }

    registry.clear_memberships();
    for (uid, groups) in users {
        let known: Vec<GroupRef> = groups
            .into_iter()
            .filter(|g| definitions.iter().any(|d| &d.group == g))
            .collect();
        summary.members += known.len();
        // Every ref was checked against the same registry snapshot above.
        let _ = registry.set_memberships(uid, known);
    }

    tracing::info!(
        created = summary.created,
        updated = summary.updated,
        removed = summary.removed,
        members = summary.members,
        "security groups reloaded"
    );
    summary
}

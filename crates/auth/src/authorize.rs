//! In-process security registry: groups, memberships and model access rules.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use serde::Serialize;
use thiserror::Error;

use basis_core::RecordId;

use crate::group::{GroupDefinition, GroupRef};
use crate::permissions::{AccessKind, AccessRule};

/// The super user bypasses every access rule.
pub const SUPERUSER_ID: RecordId = RecordId::new(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("access denied: {kind} on {model}")]
    Forbidden { model: String, kind: AccessKind },

    #[error("unknown group '{0}'")]
    UnknownGroup(String),
}

#[derive(Debug, Default)]
struct Inner {
    groups: BTreeMap<GroupRef, GroupDefinition>,
    memberships: HashMap<RecordId, BTreeSet<GroupRef>>,
    rules: Vec<AccessRule>,
}

/// Outcome of an access check, for logging and the session payload.
#[derive(Debug, Clone, Serialize)]
pub struct AccessDecision {
    pub model: String,
    pub kind: AccessKind,
    pub granted: bool,
    /// Group through which access was granted; `None` for global rules and
    /// the super user.
    pub via: Option<GroupRef>,
}

#[derive(Debug, Default)]
pub struct SecurityRegistry {
    inner: RwLock<Inner>,
}

impl SecurityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_group(&self, group: GroupDefinition) {
        if let Ok(mut inner) = self.inner.write() {
            inner.groups.insert(group.group.clone(), group);
        }
    }

    pub fn remove_group(&self, group: &GroupRef) {
        if let Ok(mut inner) = self.inner.write() {
            inner.groups.remove(group);
            for members in inner.memberships.values_mut() {
                members.remove(group);
            }
        }
    }

    pub fn groups(&self) -> Vec<GroupDefinition> {
        match self.inner.read() {
            Ok(inner) => inner.groups.values().cloned().collect(),
            Err(_) => vec![],
        }
    }

    pub fn add_rule(&self, rule: AccessRule) {
        if let Ok(mut inner) = self.inner.write() {
            inner.rules.push(rule);
        }
    }

    /// Replace the direct memberships of `uid`. Unknown groups are rejected.
    pub fn set_memberships(
        &self,
        uid: RecordId,
        groups: impl IntoIterator<Item = GroupRef>,
    ) -> Result<(), AuthzError> {
        let groups: BTreeSet<GroupRef> = groups.into_iter().collect();
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|p| p.into_inner());
        if let Some(unknown) = groups.iter().find(|g| !inner.groups.contains_key(*g)) {
            return Err(AuthzError::UnknownGroup(unknown.to_string()));
        }
        inner.memberships.insert(uid, groups);
        Ok(())
    }

    pub fn clear_memberships(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.memberships.clear();
        }
    }

    /// Direct memberships of `uid` (without implied groups).
    pub fn direct_groups(&self, uid: RecordId) -> BTreeSet<GroupRef> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.memberships.get(&uid).cloned())
            .unwrap_or_default()
    }

    /// Memberships of `uid` including implied groups.
    pub fn groups_of(&self, uid: RecordId) -> BTreeSet<GroupRef> {
        match self.inner.read() {
            Ok(inner) => closure(&inner, uid),
            Err(_) => BTreeSet::new(),
        }
    }

    pub fn has_group(&self, uid: RecordId, group: &GroupRef) -> bool {
        uid == SUPERUSER_ID || self.groups_of(uid).contains(group)
    }

    /// Users directly or implicitly in `group`.
    pub fn members(&self, group: &GroupRef) -> BTreeSet<RecordId> {
        let Ok(inner) = self.inner.read() else {
            return BTreeSet::new();
        };
        inner
            .memberships
            .keys()
            .filter(|uid| closure(&inner, **uid).contains(group))
            .copied()
            .collect()
    }

    pub fn explain(&self, uid: RecordId, model: &str, kind: AccessKind) -> AccessDecision {
        let mut decision = AccessDecision {
            model: model.to_string(),
            kind,
            granted: false,
            via: None,
        };
        if uid == SUPERUSER_ID {
            decision.granted = true;
            return decision;
        }
        let Ok(inner) = self.inner.read() else {
            return decision;
        };
        let groups = closure(&inner, uid);
        for rule in inner
            .rules
            .iter()
            .filter(|r| r.model == model && r.grants(kind))
        {
            match &rule.group {
                None => {
                    decision.granted = true;
                    decision.via = None;
                    return decision;
                }
                Some(g) => {
                    let g = GroupRef::from(g.as_str());
                    if groups.contains(&g) {
                        decision.granted = true;
                        decision.via = Some(g);
                    }
                }
            }
        }
        decision
    }

    pub fn check_access(&self, uid: RecordId, model: &str, kind: AccessKind) -> Result<(), AuthzError> {
        let decision = self.explain(uid, model, kind);
        if decision.granted {
            Ok(())
        } else {
            tracing::debug!(%uid, model, kind = %kind, "access denied");
            Err(AuthzError::Forbidden {
                model: model.to_string(),
                kind,
            })
        }
    }
}

fn closure(inner: &Inner, uid: RecordId) -> BTreeSet<GroupRef> {
    let mut out = BTreeSet::new();
    let mut stack: Vec<GroupRef> = inner
        .memberships
        .get(&uid)
        .map(|g| g.iter().cloned().collect())
        .unwrap_or_default();
    while let Some(group) = stack.pop() {
        if !out.insert(group.clone()) {
            continue;
        }
        if let Some(def) = inner.groups.get(&group) {
            stack.extend(def.implied.iter().cloned());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{GROUP_SYSTEM, GROUP_USER};

    fn registry() -> SecurityRegistry {
        let reg = SecurityRegistry::new();
        reg.define_group(GroupDefinition::new(GROUP_USER, "Internal User"));
        reg.define_group(GroupDefinition::new(GROUP_SYSTEM, "Settings").implying(GROUP_USER));
        reg.add_rule(AccessRule::new("Partner", Some(GROUP_USER.as_str())).allow(AccessKind::Read));
        reg.add_rule(AccessRule::full("Partner", Some(GROUP_SYSTEM.as_str())));
        reg.add_rule(AccessRule::new("Currency", None).allow(AccessKind::Read));
        reg
    }

    #[test]
    fn implied_groups_are_included() {
        let reg = registry();
        let uid = RecordId::new(7);
        reg.set_memberships(uid, [GROUP_SYSTEM]).unwrap();
        assert!(reg.has_group(uid, &GROUP_USER));
        assert_eq!(reg.direct_groups(uid).len(), 1);
        assert_eq!(reg.members(&GROUP_USER), BTreeSet::from([uid]));
    }

    #[test]
    fn access_rules_follow_groups() {
        let reg = registry();
        let user = RecordId::new(2);
        let admin = RecordId::new(3);
        reg.set_memberships(user, [GROUP_USER]).unwrap();
        reg.set_memberships(admin, [GROUP_SYSTEM]).unwrap();

        assert!(reg.check_access(user, "Partner", AccessKind::Read).is_ok());
        assert_eq!(
            reg.check_access(user, "Partner", AccessKind::Write),
            Err(AuthzError::Forbidden {
                model: "Partner".into(),
                kind: AccessKind::Write
            })
        );
        assert!(reg.check_access(admin, "Partner", AccessKind::Unlink).is_ok());
        assert!(reg.check_access(RecordId::new(99), "Currency", AccessKind::Read).is_ok());
        assert!(reg.check_access(RecordId::new(99), "Sequence", AccessKind::Read).is_err());
    }

    #[test]
    fn superuser_bypasses_rules() {
        let reg = registry();
        assert!(reg.check_access(SUPERUSER_ID, "Anything", AccessKind::Unlink).is_ok());
        assert!(reg.has_group(SUPERUSER_ID, &GROUP_SYSTEM));
    }

    #[test]
    fn unknown_group_membership_is_rejected() {
        let reg = registry();
        assert_eq!(
            reg.set_memberships(RecordId::new(5), [GroupRef::from("nope")]),
            Err(AuthzError::UnknownGroup("nope".into()))
        );
    }

    #[test]
    fn implied_cycles_terminate() {
        let reg = SecurityRegistry::new();
        let a = GroupRef::from("a");
        let b = GroupRef::from("b");
        reg.define_group(GroupDefinition::new(a.clone(), "A").implying(b.clone()));
        reg.define_group(GroupDefinition::new(b.clone(), "B").implying(a.clone()));
        reg.set_memberships(RecordId::new(4), [a.clone()]).unwrap();
        assert_eq!(reg.groups_of(RecordId::new(4)), BTreeSet::from([a, b]));
    }
}

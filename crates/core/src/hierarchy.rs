//! Parent/child hierarchies as a flat arena keyed by record id.
//!
//! Partners, partner categories and companies are trees. Instead of walking a
//! mutable object graph, callers build a `Hierarchy` from `(id, parent)` pairs
//! and query it. Every walk upwards is bounded and reports a cycle as
//! `DomainError::RecursionDetected` instead of looping forever.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::{DomainError, DomainResult};
use crate::id::RecordId;

#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    parents: BTreeMap<RecordId, Option<RecordId>>,
    children: BTreeMap<RecordId, Vec<RecordId>>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the arena from `(id, parent)` pairs.
    ///
    /// Children keep the insertion order of the input, which callers use as
    /// the scan order (e.g. address resolution).
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (RecordId, Option<RecordId>)>,
    {
        let mut h = Self::new();
        for (id, parent) in pairs {
            h.insert(id, parent);
        }
        h
    }

    pub fn insert(&mut self, id: RecordId, parent: Option<RecordId>) {
        if let Some(Some(old)) = self.parents.insert(id, parent) {
            if let Some(siblings) = self.children.get_mut(&old) {
                siblings.retain(|c| *c != id);
            }
        }
        if let Some(p) = parent {
            self.children.entry(p).or_default().push(id);
        }
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.parents.contains_key(&id)
    }

    pub fn parent(&self, id: RecordId) -> Option<RecordId> {
        self.parents.get(&id).copied().flatten()
    }

    pub fn children(&self, id: RecordId) -> &[RecordId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: RecordId) -> DomainResult<Vec<RecordId>> {
        let mut seen = HashSet::from([id]);
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            if !seen.insert(p) {
                return Err(DomainError::recursion(format!(
                    "record {id} is its own ancestor"
                )));
            }
            out.push(p);
            current = self.parent(p);
        }
        Ok(out)
    }

    /// Topmost ancestor of `id` (or `id` itself for roots).
    pub fn root(&self, id: RecordId) -> DomainResult<RecordId> {
        Ok(self.ancestors(id)?.last().copied().unwrap_or(id))
    }

    /// All descendants of `id`, breadth first.
    pub fn descendants(&self, id: RecordId) -> Vec<RecordId> {
        let mut seen = BTreeSet::from([id]);
        let mut out = Vec::new();
        let mut queue = std::collections::VecDeque::from([id]);
        while let Some(next) = queue.pop_front() {
            for child in self.children(next) {
                if seen.insert(*child) {
                    out.push(*child);
                    queue.push_back(*child);
                }
            }
        }
        out
    }

    /// Verify that no parent chain in the arena loops back on itself.
    pub fn check_recursion(&self) -> DomainResult<()> {
        let mut clean: HashSet<RecordId> = HashSet::new();
        for id in self.parents.keys() {
            if clean.contains(id) {
                continue;
            }
            let chain = self.ancestors(*id)?;
            clean.insert(*id);
            clean.extend(chain);
        }
        Ok(())
    }

    /// Whether re-parenting `id` under `new_parent` would create a cycle.
    pub fn would_cycle(&self, id: RecordId, new_parent: Option<RecordId>) -> bool {
        let Some(mut current) = new_parent else {
            return false;
        };
        let mut seen = HashSet::new();
        loop {
            if current == id || !seen.insert(current) {
                return true;
            }
            match self.parent(current) {
                Some(p) => current = p,
                None => return false,
            }
        }
    }
}

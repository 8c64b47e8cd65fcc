//! Queries over a partner tree: commercial entity, display names, address
//! resolution.

use std::collections::{BTreeMap, HashSet, VecDeque};

use basis_core::{DomainError, DomainResult, Hierarchy, RecordId};

use crate::partner::{Partner, PartnerType};

/// Read-only arena of partners with their parent links.
#[derive(Debug, Clone, Default)]
pub struct PartnerGraph {
    partners: BTreeMap<RecordId, Partner>,
    tree: Hierarchy,
}

impl PartnerGraph {
    /// Build from a partner snapshot. Children are scanned in id order.
    pub fn new(partners: impl IntoIterator<Item = Partner>) -> Self {
        let partners: BTreeMap<RecordId, Partner> =
            partners.into_iter().map(|p| (p.id, p)).collect();
        let tree = Hierarchy::from_pairs(partners.values().map(|p| (p.id, p.parent_id)));
        Self { partners, tree }
    }

    pub fn get(&self, id: RecordId) -> DomainResult<&Partner> {
        self.partners
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("partner {id}")))
    }

    pub fn check_recursion(&self) -> DomainResult<()> {
        self.tree.check_recursion()
    }

    /// Whether moving `id` under `new_parent` would loop the tree.
    pub fn would_cycle(&self, id: RecordId, new_parent: Option<RecordId>) -> bool {
        self.tree.would_cycle(id, new_parent)
    }

    /// The company a contact belongs to: the nearest ancestor that is a
    /// company, or the topmost ancestor, or the partner itself.
    pub fn commercial_partner(&self, id: RecordId) -> DomainResult<RecordId> {
        let partner = self.get(id)?;
        if partner.is_company || partner.parent_id.is_none() {
            return Ok(id);
        }
        let ancestors = self.tree.ancestors(id)?;
        for ancestor in &ancestors {
            if self.partners.get(ancestor).is_some_and(|p| p.is_company) {
                return Ok(*ancestor);
            }
        }
        Ok(ancestors.last().copied().unwrap_or(id))
    }

    /// `"Company, Contact"` for contacts of a commercial entity; unnamed
    /// addresses use their type label.
    pub fn display_name(&self, id: RecordId) -> DomainResult<String> {
        let partner = self.get(id)?;
        let mut name = partner.name.clone();
        if partner.parent_id.is_some() && !partner.is_company {
            if name.is_empty() {
                name = partner.kind.label().to_string();
            }
            let commercial = self.commercial_partner(id)?;
            let company = if commercial == id {
                partner.parent_id.and_then(|p| self.partners.get(&p))
            } else {
                self.partners.get(&commercial)
            };
            if let Some(company) = company.filter(|c| !c.name.is_empty()) {
                name = format!("{}, {name}", company.name);
            }
        } else if name.is_empty() {
            name = partner.kind.label().to_string();
        }
        Ok(name)
    }

    /// Resolve one partner id per requested address type.
    ///
    /// Starting at `id`, scan its subtree depth first (not descending into
    /// other companies) for the first partner of each type; climb to the
    /// parent and rescan until a company or the root has been scanned.
    /// `contact` is always resolved. Types without a match fall back to the
    /// contact found, or to `id` itself.
    pub fn address_get(
        &self,
        id: RecordId,
        types: &[PartnerType],
    ) -> DomainResult<BTreeMap<PartnerType, RecordId>> {
        let mut wanted: Vec<PartnerType> = types.to_vec();
        if !wanted.contains(&PartnerType::Contact) {
            wanted.push(PartnerType::Contact);
        }
        wanted.sort();
        wanted.dedup();

        let mut found: BTreeMap<PartnerType, RecordId> = BTreeMap::new();
        let mut visited: HashSet<RecordId> = HashSet::new();
        let mut current = Some(self.get(id)?);
        let mut climbed: HashSet<RecordId> = HashSet::new();

        'climb: while let Some(partner) = current {
            if !climbed.insert(partner.id) {
                return Err(DomainError::recursion(format!("partner {id} is its own ancestor")));
            }
            let mut to_scan: VecDeque<RecordId> = VecDeque::from([partner.id]);
            while let Some(next) = to_scan.pop_front() {
                visited.insert(next);
                let Some(record) = self.partners.get(&next) else {
                    continue;
                };
                if wanted.contains(&record.kind) {
                    found.entry(record.kind).or_insert(record.id);
                }
                if wanted.iter().all(|t| found.contains_key(t)) {
                    break 'climb;
                }
                let children = self
                    .tree
                    .children(next)
                    .iter()
                    .filter(|c| !visited.contains(*c))
                    .filter(|c| self.partners.get(*c).is_some_and(|p| !p.is_company));
                for child in children.rev() {
                    to_scan.push_front(*child);
                }
            }
            if partner.is_company {
                break;
            }
            current = match partner.parent_id {
                Some(parent) => Some(self.get(parent)?),
                None => None,
            };
        }

        let fallback = found.get(&PartnerType::Contact).copied().unwrap_or(id);
        Ok(wanted
            .into_iter()
            .map(|t| (t, found.get(&t).copied().unwrap_or(fallback)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn with_id(mut p: Partner, id: i64) -> Partner {
        p.id = RecordId::new(id);
        p
    }

    fn id(n: i64) -> RecordId {
        RecordId::new(n)
    }

    /// 1 Acme (company)
    /// ├─ 2 Jane (contact)
    /// │  └─ 5 Jane's delivery
    /// ├─ 3 Billing (invoice)
    /// └─ 4 Subsidiary (company)
    ///    └─ 6 Sub delivery
    fn acme() -> PartnerGraph {
        PartnerGraph::new([
            with_id(Partner::company("Acme"), 1),
            with_id(Partner::new("Jane").child_of(id(1)), 2),
            with_id(
                Partner::new("Billing")
                    .child_of(id(1))
                    .with_type(PartnerType::Invoice),
                3,
            ),
            with_id(Partner::company("Subsidiary").child_of(id(1)), 4),
            with_id(
                Partner::new("").child_of(id(2)).with_type(PartnerType::Delivery),
                5,
            ),
            with_id(
                Partner::new("Sub delivery")
                    .child_of(id(4))
                    .with_type(PartnerType::Delivery),
                6,
            ),
        ])
    }

    #[test]
    fn commercial_partner_is_nearest_company() {
        let g = acme();
        assert_eq!(g.commercial_partner(id(5)).unwrap(), id(1));
        assert_eq!(g.commercial_partner(id(6)).unwrap(), id(4));
        assert_eq!(g.commercial_partner(id(4)).unwrap(), id(4));
    }

    #[test]
    fn display_names() {
        let g = acme();
        assert_eq!(g.display_name(id(2)).unwrap(), "Acme, Jane");
        assert_eq!(g.display_name(id(5)).unwrap(), "Acme, Delivery Address");
        assert_eq!(g.display_name(id(4)).unwrap(), "Subsidiary");
        assert_eq!(g.display_name(id(1)).unwrap(), "Acme");
    }

    #[test]
    fn address_get_defaults_to_contact() {
        let g = acme();
        let res = g.address_get(id(1), &[]).unwrap();
        assert_eq!(res.len(), 1);
        // The company itself is a contact-type partner.
        assert_eq!(res[&PartnerType::Contact], id(1));
    }

    #[test]
    fn address_get_scans_down_and_climbs_up() {
        let g = acme();
        let res = g
            .address_get(id(2), &[PartnerType::Delivery, PartnerType::Invoice])
            .unwrap();
        assert_eq!(res[&PartnerType::Contact], id(2));
        assert_eq!(res[&PartnerType::Delivery], id(5));
        // Found by climbing to Acme and scanning its other children.
        assert_eq!(res[&PartnerType::Invoice], id(3));
    }

    #[test]
    fn address_get_does_not_enter_other_companies() {
        let g = acme();
        let res = g.address_get(id(3), &[PartnerType::Delivery]).unwrap();
        // Jane's delivery (5) is reached through Jane; the subsidiary's is not.
        assert_eq!(res[&PartnerType::Delivery], id(5));
        let res = g.address_get(id(4), &[PartnerType::Invoice]).unwrap();
        assert_eq!(res[&PartnerType::Invoice], id(4));
    }

    #[test]
    fn address_get_falls_back_to_partner_itself() {
        let g = PartnerGraph::new([with_id(
            Partner::new("").with_type(PartnerType::Other),
            9,
        )]);
        let res = g.address_get(id(9), &[PartnerType::Invoice]).unwrap();
        assert_eq!(res[&PartnerType::Invoice], id(9));
        assert_eq!(res[&PartnerType::Contact], id(9));
    }

    #[test]
    fn cycles_are_reported() {
        let g = PartnerGraph::new([
            with_id(Partner::new("A").child_of(id(2)), 1),
            with_id(Partner::new("B").child_of(id(1)), 2),
        ]);
        assert!(matches!(g.check_recursion(), Err(DomainError::RecursionDetected(_))));
        assert!(g.commercial_partner(id(1)).is_err());
        assert!(matches!(
            g.address_get(id(1), &[PartnerType::Invoice]),
            Err(DomainError::RecursionDetected(_))
        ));
    }

    #[test]
    fn unknown_partner_is_not_found() {
        assert!(matches!(acme().display_name(id(99)), Err(DomainError::NotFound(_))));
    }

    fn arb_forest() -> impl Strategy<Value = Vec<Partner>> {
        // Parent of partner `i` is always a lower id, so the result is a forest.
        proptest::collection::vec((any::<bool>(), 0usize..4, any::<prop::sample::Index>()), 1..25)
            .prop_map(|specs| {
                specs
                    .into_iter()
                    .enumerate()
                    .map(|(i, (is_company, kind, parent))| {
                        let kinds = [
                            PartnerType::Contact,
                            PartnerType::Invoice,
                            PartnerType::Delivery,
                            PartnerType::Other,
                        ];
                        let mut p = Partner::new(format!("P{i}")).with_type(kinds[kind]);
                        p.is_company = is_company;
                        p.id = RecordId::new(i as i64 + 1);
                        if i > 0 && parent.index(3) != 0 {
                            p.parent_id = Some(RecordId::new(parent.index(i) as i64 + 1));
                        }
                        p
                    })
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn resolved_addresses_stay_within_the_commercial_entity(partners in arb_forest()) {
            let g = PartnerGraph::new(partners.clone());
            for p in &partners {
                let commercial = g.commercial_partner(p.id).unwrap();
                let res = g.address_get(p.id, &[PartnerType::Invoice, PartnerType::Delivery]).unwrap();
                prop_assert!(res.contains_key(&PartnerType::Contact));
                for (kind, found) in res {
                    let found_partner = g.get(found).unwrap();
                    prop_assert!(found == p.id || found_partner.kind == kind
                        || found == g.address_get(p.id, &[]).unwrap()[&PartnerType::Contact]);
                    let in_entity = found == commercial
                        || g.tree.ancestors(found).unwrap().contains(&commercial);
                    prop_assert!(in_entity || found == p.id);
                }
            }
        }
    }
}

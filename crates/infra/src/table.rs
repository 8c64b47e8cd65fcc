//! Typed in-memory tables.
//!
//! A [`Table`] owns every record of one model and enforces the table-level
//! rules on each mutation: derived fields are refreshed (`normalize`),
//! records validated, unique keys checked and parent chains kept acyclic.
//! Generic queries go through the record's JSON form so that client domains
//! can be evaluated without per-model code.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};

use basis_core::{DomainError, DomainResult, Hierarchy, Model, RecordId};
use basis_domains::{Condition, Operator};

/// Paging and ordering of a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub offset: usize,
    pub limit: Option<usize>,
    /// `"name asc, id desc"`; defaults to ascending id.
    pub order: Option<String>,
}

impl SearchOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }
}

/// One bucket of a `read_group`.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub field: String,
    pub value: Value,
    pub count: usize,
    /// Sums of the requested numeric fields.
    pub sums: Map<String, Value>,
    /// Domain selecting the records of this bucket.
    pub domain: Condition,
}

impl Group {
    /// Row shape returned to clients.
    pub fn to_json(&self) -> Value {
        let mut row = self.sums.clone();
        row.insert(self.field.clone(), self.value.clone());
        row.insert(format!("{}_count", self.field), Value::from(self.count));
        row.insert("__domain".to_string(), self.domain.to_domain());
        Value::Object(row)
    }
}

#[derive(Debug)]
struct Rows<T> {
    last_id: i64,
    rows: BTreeMap<RecordId, T>,
}

/// All records of model `T`.
#[derive(Debug)]
pub struct Table<T: Model> {
    inner: RwLock<Rows<T>>,
}

impl<T: Model> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Model> Table<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Rows {
                last_id: 0,
                rows: BTreeMap::new(),
            }),
        }
    }

    /// Model name, as seen by clients.
    pub fn model(&self) -> &'static str {
        T::NAME
    }

    fn read_rows(&self) -> RwLockReadGuard<'_, Rows<T>> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_rows(&self) -> RwLockWriteGuard<'_, Rows<T>> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn create(&self, mut record: T) -> DomainResult<T> {
        record.normalize();
        record.validate()?;
        let mut rows = self.write_rows();
        check_unique(&rows.rows, RecordId::default(), &record)?;
        if let Some(parent) = record.parent_id() {
            if !rows.rows.contains_key(&parent) {
                return Err(DomainError::not_found(format!("{} {parent}", T::NAME)));
            }
        }
        rows.last_id += 1;
        let id = RecordId::new(rows.last_id);
        record.set_id(id);
        rows.rows.insert(id, record.clone());
        Ok(record)
    }

    /// Create from client values; unknown keys are ignored.
    pub fn create_values(&self, values: Map<String, Value>) -> DomainResult<T> {
        let mut values = values;
        values.remove("id");
        let record: T = serde_json::from_value(Value::Object(values))
            .map_err(|e| DomainError::validation(format!("{}: {e}", T::NAME)))?;
        self.create(record)
    }

    pub fn get(&self, id: RecordId) -> DomainResult<T> {
        self.read_rows()
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("{} {id}", T::NAME)))
    }

    pub fn exists(&self, id: RecordId) -> bool {
        self.read_rows().rows.contains_key(&id)
    }

    /// Existing records among `ids`, in the given order.
    pub fn browse(&self, ids: &[RecordId]) -> Vec<T> {
        let rows = self.read_rows();
        ids.iter().filter_map(|id| rows.rows.get(id).cloned()).collect()
    }

    pub fn all(&self) -> Vec<T> {
        self.read_rows().rows.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read_rows().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.read_rows().rows.values().find(|r| predicate(r)).cloned()
    }

    pub fn filter(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.read_rows()
            .rows
            .values()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    /// Apply `change` to a copy of the record and store it if it still
    /// satisfies the table rules.
    pub fn update(&self, id: RecordId, change: impl FnOnce(&mut T)) -> DomainResult<T> {
        let mut rows = self.write_rows();
        let mut record = rows
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("{} {id}", T::NAME)))?;
        change(&mut record);
        record.set_id(id);
        record.normalize();
        record.validate()?;
        check_unique(&rows.rows, id, &record)?;
        check_parent(&rows.rows, id, record.parent_id())?;
        rows.rows.insert(id, record.clone());
        Ok(record)
    }

    /// Merge client values into the stored record.
    pub fn write_values(&self, id: RecordId, values: &Map<String, Value>) -> DomainResult<T> {
        let current = serde_json::to_value(self.get(id)?)
            .map_err(|e| DomainError::invariant(format!("{}: {e}", T::NAME)))?;
        let Value::Object(mut merged) = current else {
            return Err(DomainError::invariant(format!("{} is not an object", T::NAME)));
        };
        for (key, value) in values {
            if key != "id" {
                merged.insert(key.clone(), value.clone());
            }
        }
        let patched: T = serde_json::from_value(Value::Object(merged))
            .map_err(|e| DomainError::validation(format!("{}: {e}", T::NAME)))?;
        self.update(id, |record| *record = patched)
    }

    /// Delete a record. Records that still have children are kept.
    pub fn unlink(&self, id: RecordId) -> DomainResult<T> {
        let mut rows = self.write_rows();
        if !rows.rows.contains_key(&id) {
            return Err(DomainError::not_found(format!("{} {id}", T::NAME)));
        }
        if rows.rows.values().any(|r| r.parent_id() == Some(id)) {
            return Err(DomainError::conflict(format!(
                "{} {id} still has child records",
                T::NAME
            )));
        }
        rows.rows
            .remove(&id)
            .ok_or_else(|| DomainError::not_found(format!("{} {id}", T::NAME)))
    }

    /// Parent arena of the whole table.
    pub fn hierarchy(&self) -> Hierarchy {
        Hierarchy::from_pairs(self.read_rows().rows.values().map(|r| (r.id(), r.parent_id())))
    }

    pub fn check_recursion(&self) -> DomainResult<()> {
        self.hierarchy().check_recursion()
    }

    /// Ids of the records matching `domain`.
    pub fn search(&self, domain: &Condition, options: &SearchOptions) -> DomainResult<Vec<RecordId>> {
        Ok(self
            .search_values(domain, options)?
            .into_iter()
            .filter_map(|row| row.get("id").and_then(Value::as_i64).map(RecordId::new))
            .collect())
    }

    pub fn search_count(&self, domain: &Condition) -> DomainResult<usize> {
        Ok(self.matching(domain)?.len())
    }

    /// `search` followed by `read` of `fields` (all fields when empty).
    pub fn search_read(
        &self,
        domain: &Condition,
        fields: &[String],
        options: &SearchOptions,
    ) -> DomainResult<Vec<Map<String, Value>>> {
        Ok(self
            .search_values(domain, options)?
            .into_iter()
            .map(|row| project(row, fields))
            .collect())
    }

    pub fn read(&self, ids: &[RecordId], fields: &[String]) -> DomainResult<Vec<Map<String, Value>>> {
        self.browse(ids)
            .iter()
            .map(|record| to_row(record).map(|row| project(row, fields)))
            .collect()
    }

    /// `(id, display name)` pairs.
    pub fn name_get(&self, ids: &[RecordId]) -> Vec<(RecordId, String)> {
        self.browse(ids)
            .iter()
            .map(|r| (r.id(), r.display_name()))
            .collect()
    }

    /// Group matching records by the value of `field`.
    pub fn read_group(
        &self,
        domain: &Condition,
        field: &str,
        aggregates: &[String],
    ) -> DomainResult<Vec<Group>> {
        let mut buckets: Vec<(Value, Vec<Map<String, Value>>)> = Vec::new();
        for row in self.matching(domain)? {
            let key = row.get(field).cloned().unwrap_or(Value::Null);
            match buckets.iter_mut().find(|(v, _)| *v == key) {
                Some((_, members)) => members.push(row),
                None => buckets.push((key, vec![row])),
            }
        }
        buckets.sort_by(|(a, _), (b, _)| compare_values(a, b));
        Ok(buckets
            .into_iter()
            .map(|(value, members)| {
                let mut sums = Map::new();
                for name in aggregates.iter().filter(|f| f.as_str() != field) {
                    let numbers: Vec<f64> =
                        members.iter().filter_map(|r| r.get(name).and_then(Value::as_f64)).collect();
                    if !numbers.is_empty() {
                        sums.insert(name.clone(), Value::from(numbers.iter().sum::<f64>()));
                    }
                }
                let bucket_domain =
                    domain.clone().and(Condition::leaf(field, Operator::Equals, value.clone()));
                Group {
                    field: field.to_string(),
                    value,
                    count: members.len(),
                    sums,
                    domain: bucket_domain,
                }
            })
            .collect())
    }

    fn matching(&self, domain: &Condition) -> DomainResult<Vec<Map<String, Value>>> {
        let rows = self.read_rows();
        let mut out = Vec::new();
        for record in rows.rows.values() {
            let row = to_row(record)?;
            if domain.matches(&row) {
                out.push(row);
            }
        }
        Ok(out)
    }

    fn search_values(
        &self,
        domain: &Condition,
        options: &SearchOptions,
    ) -> DomainResult<Vec<Map<String, Value>>> {
        select_rows(self.matching(domain)?, &Condition::True, options)
    }
}

/// Filter, order and page rows that do not live in a [`Table`] (sequences,
/// job histories, ...).
pub fn select_rows(
    rows: Vec<Map<String, Value>>,
    domain: &Condition,
    options: &SearchOptions,
) -> DomainResult<Vec<Map<String, Value>>> {
    let mut rows: Vec<Map<String, Value>> = rows.into_iter().filter(|r| domain.matches(r)).collect();
    if let Some(order) = options.order.as_deref() {
        let keys = parse_order(order)?;
        rows.sort_by(|a, b| {
            for (field, descending) in &keys {
                let ord = compare_values(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                let ord = if *descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
    let limit = options.limit.unwrap_or(usize::MAX);
    Ok(rows.into_iter().skip(options.offset).take(limit).collect())
}

fn to_row<T: Model>(record: &T) -> DomainResult<Map<String, Value>> {
    match serde_json::to_value(record) {
        Ok(Value::Object(mut row)) => {
            row.insert("display_name".to_string(), Value::from(record.display_name()));
            Ok(row)
        }
        Ok(_) => Err(DomainError::invariant(format!("{} is not an object", T::NAME))),
        Err(e) => Err(DomainError::invariant(format!("{}: {e}", T::NAME))),
    }
}

/// Keep `fields` (plus `id`); empty means every field.
pub fn project(row: Map<String, Value>, fields: &[String]) -> Map<String, Value> {
    if fields.is_empty() {
        return row;
    }
    row.into_iter()
        .filter(|(k, _)| k == "id" || fields.iter().any(|f| f == k))
        .collect()
}

fn check_unique<T: Model>(
    rows: &BTreeMap<RecordId, T>,
    id: RecordId,
    record: &T,
) -> DomainResult<()> {
    let Some(key) = record.unique_key() else {
        return Ok(());
    };
    if rows
        .values()
        .any(|other| other.id() != id && other.unique_key().as_deref() == Some(key.as_str()))
    {
        return Err(DomainError::validation(format!(
            "{} '{key}' already exists",
            T::NAME
        )));
    }
    Ok(())
}

fn check_parent<T: Model>(
    rows: &BTreeMap<RecordId, T>,
    id: RecordId,
    parent: Option<RecordId>,
) -> DomainResult<()> {
    let Some(parent) = parent else {
        return Ok(());
    };
    if !rows.contains_key(&parent) {
        return Err(DomainError::not_found(format!("{} {parent}", T::NAME)));
    }
    let tree = Hierarchy::from_pairs(rows.values().map(|r| (r.id(), r.parent_id())));
    if tree.would_cycle(id, Some(parent)) {
        return Err(DomainError::recursion(format!(
            "you cannot create recursive {} hierarchies",
            T::NAME
        )));
    }
    Ok(())
}

/// `"name desc, id"` → `[("name", true), ("id", false)]`.
pub fn parse_order(order: &str) -> DomainResult<Vec<(String, bool)>> {
    let mut keys = Vec::new();
    for part in order.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let mut words = part.split_whitespace();
        let field = words.next().unwrap_or_default();
        let descending = match words.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => false,
            Some("desc") => true,
            Some(other) => {
                return Err(DomainError::validation(format!("invalid order direction '{other}'")));
            }
        };
        if words.next().is_some() || !field.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(DomainError::validation(format!("invalid order '{part}'")));
        }
        keys.push((field.to_string(), descending));
    }
    Ok(keys)
}

/// Total order over JSON scalars: null, booleans, numbers, strings, others.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basis_domains::parse_domain;
    use basis_parties::{Partner, PartnerCategory};
    use serde_json::json;

    fn partners() -> Table<Partner> {
        let table = Table::new();
        let acme = table.create(Partner::company("Acme")).unwrap();
        table.create(Partner::new("Zoe").child_of(acme.id)).unwrap();
        table.create(Partner::new("Adam").child_of(acme.id)).unwrap();
        table.create(Partner::company("Globex")).unwrap();
        table
    }

    #[test]
    fn create_allocates_increasing_ids() {
        let table = partners();
        let ids: Vec<i64> = table.all().iter().map(|p| p.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(table.model(), "Partner");
    }

    #[test]
    fn create_rejects_invalid_and_missing_parent() {
        let table = partners();
        assert!(matches!(
            table.create(Partner::new(" ")),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            table.create(Partner::new("Orphan").child_of(RecordId::new(99))),
            Err(DomainError::NotFound(_))
        ));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn search_with_domain_order_and_paging() {
        let table = partners();
        let domain = parse_domain(&json!([["is_company", "=", false]])).unwrap();
        let ids = table
            .search(&domain, &SearchOptions::default().with_order("name asc"))
            .unwrap();
        assert_eq!(ids, vec![RecordId::new(3), RecordId::new(2)]);

        let page = table
            .search(
                &Condition::True,
                &SearchOptions::default().with_order("id desc").with_offset(1).with_limit(2),
            )
            .unwrap();
        assert_eq!(page, vec![RecordId::new(3), RecordId::new(2)]);
        assert_eq!(table.search_count(&domain).unwrap(), 2);
    }

    #[test]
    fn invalid_order_is_rejected() {
        let table = partners();
        let options = SearchOptions::default().with_order("name; drop");
        assert!(table.search(&Condition::True, &options).is_err());
        assert!(parse_order("name sideways").is_err());
    }

    #[test]
    fn read_projects_fields_and_keeps_id() {
        let table = partners();
        let rows = table.read(&[RecordId::new(2)], &["name".to_string()]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[0]["name"], json!("Zoe"));
        assert_eq!(rows[0]["id"], json!(2));
    }

    #[test]
    fn write_values_merges_and_revalidates() {
        let table = partners();
        let mut patch = Map::new();
        patch.insert("email".into(), json!("zoe@acme.example"));
        let zoe = table.write_values(RecordId::new(2), &patch).unwrap();
        assert_eq!(zoe.email.as_deref(), Some("zoe@acme.example"));
        assert_eq!(zoe.name, "Zoe");

        patch.insert("email".into(), json!("not-an-address"));
        assert!(table.write_values(RecordId::new(2), &patch).is_err());
        assert_eq!(
            table.get(RecordId::new(2)).unwrap().email.as_deref(),
            Some("zoe@acme.example")
        );
    }

    #[test]
    fn reparenting_into_a_cycle_is_refused() {
        let table: Table<PartnerCategory> = Table::new();
        let a = table.create(PartnerCategory::new("A")).unwrap();
        let b = table.create(PartnerCategory::new("B").child_of(a.id)).unwrap();
        let c = table.create(PartnerCategory::new("C").child_of(b.id)).unwrap();
        let err = table.update(a.id, |cat| cat.parent_id = Some(c.id)).unwrap_err();
        assert!(matches!(err, DomainError::RecursionDetected(_)));
        assert!(table.check_recursion().is_ok());
        assert_eq!(table.get(a.id).unwrap().parent_id, None);
    }

    #[test]
    fn unlink_keeps_parents_with_children() {
        let table = partners();
        assert!(matches!(
            table.unlink(RecordId::new(1)),
            Err(DomainError::Conflict(_))
        ));
        table.unlink(RecordId::new(2)).unwrap();
        table.unlink(RecordId::new(3)).unwrap();
        table.unlink(RecordId::new(1)).unwrap();
        assert!(matches!(table.get(RecordId::new(1)), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn read_group_counts_per_value() {
        let table = partners();
        let groups = table
            .read_group(&Condition::True, "is_company", &["id".to_string()])
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].value, json!(false));
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].sums["id"], json!(5.0));
        let row = groups[1].to_json();
        assert_eq!(row["is_company_count"], json!(2));
        assert_eq!(row["__domain"], json!([["is_company", "=", true]]));
    }

    #[test]
    fn values_order_by_kind_then_value() {
        let mut values = vec![json!("b"), json!(2), Value::Null, json!(true), json!("a"), json!(1.5)];
        values.sort_by(compare_values);
        assert_eq!(values, vec![Value::Null, json!(true), json!(1.5), json!(2), json!("a"), json!("b")]);
    }
}

//! Composable boolean condition tree.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde_json::{Map, Value, json};

use crate::operator::Operator;

/// A single `[field, operator, value]` comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Field name; dotted paths reach into nested objects.
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

/// Boolean condition over a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Matches every record (the empty domain).
    True,
    Leaf(Predicate),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Default for Condition {
    fn default() -> Self {
        Self::True
    }
}

impl Condition {
    pub fn leaf(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self::Leaf(Predicate {
            field: field.into(),
            operator,
            value,
        })
    }

    /// Condition that never matches.
    pub fn none() -> Self {
        Self::Not(Box::new(Self::True))
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Self::True)
    }

    /// Conjunction; `True` is the identity and nested ANDs are flattened.
    pub fn and(self, other: Condition) -> Condition {
        match (self, other) {
            (Self::True, c) | (c, Self::True) => c,
            (Self::And(mut a), Self::And(b)) => {
                a.extend(b);
                Self::And(a)
            }
            (Self::And(mut a), c) => {
                a.push(c);
                Self::And(a)
            }
            (c, Self::And(mut b)) => {
                b.insert(0, c);
                Self::And(b)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }

    /// Disjunction; `True` absorbs and nested ORs are flattened.
    pub fn or(self, other: Condition) -> Condition {
        match (self, other) {
            (Self::True, _) | (_, Self::True) => Self::True,
            (Self::Or(mut a), Self::Or(b)) => {
                a.extend(b);
                Self::Or(a)
            }
            (Self::Or(mut a), c) => {
                a.push(c);
                Self::Or(a)
            }
            (c, Self::Or(mut b)) => {
                b.insert(0, c);
                Self::Or(b)
            }
            (a, b) => Self::Or(vec![a, b]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Condition {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Field names referenced by the condition (top-level segment only).
    pub fn fields(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::True => {}
            Self::Leaf(p) => {
                let head = p.field.split('.').next().unwrap_or(&p.field);
                out.insert(head.to_string());
            }
            Self::And(items) | Self::Or(items) => items.iter().for_each(|c| c.collect_fields(out)),
            Self::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Evaluate the condition against a JSON record.
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        match self {
            Self::True => true,
            Self::Leaf(p) => p.matches(record),
            Self::And(items) => items.iter().all(|c| c.matches(record)),
            Self::Or(items) => items.iter().any(|c| c.matches(record)),
            Self::Not(inner) => !inner.matches(record),
        }
    }

    /// Render back to a prefix-notation domain.
    pub fn to_domain(&self) -> Value {
        let mut terms = Vec::new();
        self.write_terms(&mut terms, true);
        Value::Array(terms)
    }

    fn write_terms(&self, out: &mut Vec<Value>, top: bool) {
        match self {
            Self::True if top => {}
            Self::True => out.push(json!([1, "=", 1])),
            Self::Leaf(p) => out.push(json!([p.field, p.operator.as_str(), p.value])),
            Self::And(items) => {
                if !top {
                    for _ in 1..items.len() {
                        out.push(json!("&"));
                    }
                }
                items.iter().for_each(|c| c.write_terms(out, top));
            }
            Self::Or(items) => {
                for _ in 1..items.len() {
                    out.push(json!("|"));
                }
                items.iter().for_each(|c| c.write_terms(out, false));
            }
            Self::Not(inner) => {
                out.push(json!("!"));
                inner.write_terms(out, false);
            }
        }
    }
}

impl Predicate {
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        let actual = lookup(record, &self.field);
        if self.operator.is_negative() {
            let positive = Predicate {
                field: self.field.clone(),
                operator: self.operator.positive(),
                value: self.value.clone(),
            };
            return !positive.matches_value(actual);
        }
        self.matches_value(actual)
    }

    fn matches_value(&self, actual: &Value) -> bool {
        // x2many fields hold id lists: match when any element matches.
        if let Value::Array(items) = actual {
            if items.is_empty() {
                return is_empty(&self.value) && self.operator == Operator::Equals;
            }
            return items.iter().any(|v| compare_scalar(self.operator, v, &self.value));
        }
        compare_scalar(self.operator, actual, &self.value)
    }
}

static NULL: Value = Value::Null;

fn lookup<'a>(record: &'a Map<String, Value>, path: &str) -> &'a Value {
    let mut parts = path.split('.');
    let Some(head) = parts.next() else {
        return &NULL;
    };
    let mut current = record.get(head).unwrap_or(&NULL);
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part).unwrap_or(&NULL),
            _ => return &NULL,
        };
    }
    current
}

fn is_empty(v: &Value) -> bool {
    matches!(v, Value::Null | Value::Bool(false))
}

fn compare_scalar(op: Operator, actual: &Value, expected: &Value) -> bool {
    match op {
        Operator::Equals => {
            if is_empty(expected) {
                is_empty(actual)
            } else {
                json_eq(actual, expected)
            }
        }
        Operator::Greater => json_cmp(actual, expected) == Some(Ordering::Greater),
        Operator::GreaterOrEqual => matches!(
            json_cmp(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Lower => json_cmp(actual, expected) == Some(Ordering::Less),
        Operator::LowerOrEqual => matches!(
            json_cmp(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Like => text_pair(actual, expected).is_some_and(|(a, e)| a.contains(&e)),
        Operator::ILike => text_pair(actual, expected)
            .is_some_and(|(a, e)| a.to_lowercase().contains(&e.to_lowercase())),
        Operator::EqLike => {
            text_pair(actual, expected).is_some_and(|(a, e)| sql_like(&a, &e))
        }
        Operator::EqILike => text_pair(actual, expected)
            .is_some_and(|(a, e)| sql_like(&a.to_lowercase(), &e.to_lowercase())),
        Operator::In => match expected {
            Value::Array(options) => options
                .iter()
                .any(|o| if is_empty(o) { is_empty(actual) } else { json_eq(actual, o) }),
            other => json_eq(actual, other),
        },
        // Negative operators are resolved through their positive form.
        Operator::NotEquals | Operator::NotLike | Operator::NotILike | Operator::NotIn => false,
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn json_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn text_pair(actual: &Value, expected: &Value) -> Option<(String, String)> {
    let a = match actual {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let e = match expected {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some((a, e))
}

/// SQL `LIKE` with `%` (any run) and `_` (any single char).
fn sql_like(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut ti, mut pi) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            ti += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn true_is_identity_for_and_and_absorbing_for_or() {
        let leaf = Condition::leaf("name", Operator::Equals, json!("x"));
        assert_eq!(Condition::True.and(leaf.clone()), leaf);
        assert!(Condition::True.or(leaf).is_true());
    }

    #[test]
    fn equals_false_matches_missing_and_null() {
        let cond = Condition::leaf("parent_id", Operator::Equals, json!(false));
        assert!(cond.matches(&record(json!({"parent_id": null}))));
        assert!(cond.matches(&record(json!({}))));
        assert!(!cond.matches(&record(json!({"parent_id": 4}))));
    }

    #[test]
    fn negative_operators_match_empty_fields() {
        let cond = Condition::leaf("email", Operator::NotILike, json!("example"));
        assert!(cond.matches(&record(json!({"email": null}))));
        assert!(!cond.matches(&record(json!({"email": "a@EXAMPLE.com"}))));
    }

    #[test]
    fn in_matches_any_element_of_id_lists() {
        let cond = Condition::leaf("category_ids", Operator::In, json!([3, 9]));
        assert!(cond.matches(&record(json!({"category_ids": [1, 9]}))));
        assert!(!cond.matches(&record(json!({"category_ids": [1, 2]}))));
        let not_in = Condition::leaf("category_ids", Operator::NotIn, json!([3]));
        assert!(not_in.matches(&record(json!({"category_ids": []}))));
    }

    #[test]
    fn numeric_comparison_ignores_int_float_distinction() {
        let cond = Condition::leaf("age", Operator::GreaterOrEqual, json!(24));
        assert!(cond.matches(&record(json!({"age": 24.0}))));
        assert!(!cond.matches(&record(json!({"age": 23}))));
        assert!(!cond.matches(&record(json!({"age": "old"}))));
    }

    #[test]
    fn dotted_paths_reach_nested_objects() {
        let cond = Condition::leaf("company.name", Operator::Like, json!("Acme"));
        assert!(cond.matches(&record(json!({"company": {"name": "Acme Corp"}}))));
        assert!(!cond.matches(&record(json!({"company": 3}))));
    }

    #[test]
    fn sql_like_wildcards() {
        assert!(sql_like("INV/2024/0001", "INV/%/0001"));
        assert!(sql_like("abc", "a_c"));
        assert!(!sql_like("abcd", "a_c"));
        assert!(sql_like("", "%"));
    }

    #[test]
    fn to_domain_uses_prefix_operators() {
        let a = Condition::leaf("a", Operator::Equals, json!(1));
        let b = Condition::leaf("b", Operator::Equals, json!(2));
        let c = Condition::leaf("c", Operator::Equals, json!(3));
        let cond = a.or(b).and(c.not());
        assert_eq!(
            cond.to_domain(),
            json!(["|", ["a", "=", 1], ["b", "=", 2], "!", ["c", "=", 3]])
        );
        assert_eq!(Condition::True.to_domain(), json!([]));
    }

    #[test]
    fn fields_lists_referenced_heads() {
        let cond = Condition::leaf("company.name", Operator::Equals, json!("x"))
            .or(Condition::leaf("email", Operator::Equals, json!("y")));
        let fields: Vec<_> = cond.fields().into_iter().collect();
        assert_eq!(fields, vec!["company".to_string(), "email".to_string()]);
    }
}

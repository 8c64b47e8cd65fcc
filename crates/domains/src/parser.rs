//! Prefix-notation domain parser.
//!
//! A domain is an ordered list whose elements are either an operator token
//! (`"&"`, `"|"`, `"!"`) or a leaf `[field, operator, value]`. Binary tokens
//! combine the next two parsed sub-terms, `"!"` negates the next one, and
//! whatever remains at the top level is AND-ed left to right.
//!
//! Terms are read right to left against an operand stack, so arbitrarily
//! long domains never recurse.

use std::collections::VecDeque;

use serde_json::Value;

use crate::condition::Condition;
use crate::literal::parse_literal;
use crate::operator::Operator;
use crate::DomainParseError;

/// Deepest operator nesting a parsed domain may have, after flattening.
pub const MAX_DEPTH: usize = 64;

/// Parse a JSON domain into a condition tree.
///
/// `[]` (and `null`) yields `Condition::True`.
pub fn parse_domain(domain: &Value) -> Result<Condition, DomainParseError> {
    let terms = match domain {
        Value::Null => return Ok(Condition::True),
        Value::Array(terms) => terms,
        Value::String(text) => return parse_domain_str(text),
        _ => return Err(DomainParseError::NotAList),
    };

    let mut stack: Vec<Operand> = Vec::with_capacity(terms.len());
    for (index, term) in terms.iter().enumerate().rev() {
        let operand = match term {
            Value::String(token) => {
                let missing = || DomainParseError::MissingOperand(terms.len());
                match token.as_str() {
                    "&" | "|" => {
                        let left = stack.pop().ok_or_else(missing)?;
                        let right = stack.pop().ok_or_else(missing)?;
                        if token == "&" { left.and(right) } else { left.or(right) }
                    }
                    "!" => stack.pop().ok_or_else(missing)?.not(),
                    other => {
                        return Err(DomainParseError::InvalidTerm {
                            index,
                            reason: format!("unknown logical operator '{other}'"),
                        });
                    }
                }
            }
            Value::Array(leaf) => Operand::leaf(parse_leaf(leaf, index)?),
            _ => {
                return Err(DomainParseError::InvalidTerm {
                    index,
                    reason: "expected an operator or a [field, operator, value] leaf".to_string(),
                });
            }
        };
        stack.push(operand.checked()?);
    }

    // The top of the stack is the leftmost remaining term.
    let mut remaining = stack.into_iter().rev();
    let Some(mut cond) = remaining.next() else {
        return Ok(Condition::True);
    };
    for operand in remaining {
        cond = cond.and(operand).checked()?;
    }
    Ok(cond.node.into_condition())
}

/// Parse a domain stored as literal text (`"[('a', '=', 1)]"`).
pub fn parse_domain_str(text: &str) -> Result<Condition, DomainParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Condition::True);
    }
    match parse_literal(text)? {
        Value::String(_) => Err(DomainParseError::NotAList),
        value => parse_domain(&value),
    }
}

/// Sub-term under construction. Flattened groups keep their members in a
/// deque so both sides can grow without shifting.
enum Node {
    Cond(Condition),
    And(VecDeque<Condition>),
    Or(VecDeque<Condition>),
}

impl Node {
    fn into_condition(self) -> Condition {
        match self {
            Node::Cond(cond) => cond,
            Node::And(members) => Condition::And(members.into()),
            Node::Or(members) => Condition::Or(members.into()),
        }
    }
}

struct Operand {
    node: Node,
    depth: usize,
}

impl Operand {
    fn leaf(cond: Condition) -> Self {
        let depth = usize::from(matches!(cond, Condition::Not(_)));
        Operand {
            node: Node::Cond(cond),
            depth,
        }
    }

    fn checked(self) -> Result<Self, DomainParseError> {
        if self.depth > MAX_DEPTH {
            return Err(DomainParseError::TooDeep(MAX_DEPTH));
        }
        Ok(self)
    }

    fn is_true(&self) -> bool {
        matches!(self.node, Node::Cond(Condition::True))
    }

    fn is_group(&self, and: bool) -> bool {
        match &self.node {
            Node::And(_) | Node::Cond(Condition::And(_)) => and,
            Node::Or(_) | Node::Cond(Condition::Or(_)) => !and,
            Node::Cond(_) => false,
        }
    }

    /// Depth of the members this operand adds to a group of the given kind.
    fn member_depth(&self, and: bool) -> usize {
        if self.is_group(and) {
            self.depth.saturating_sub(1)
        } else {
            self.depth
        }
    }

    fn into_members(self, and: bool) -> VecDeque<Condition> {
        match (self.node, and) {
            (Node::And(members), true) | (Node::Or(members), false) => members,
            (Node::Cond(Condition::And(members)), true) | (Node::Cond(Condition::Or(members)), false) => {
                members.into()
            }
            (node, _) => VecDeque::from([node.into_condition()]),
        }
    }

    fn group(self, other: Operand, and: bool) -> Operand {
        let depth = 1 + self.member_depth(and).max(other.member_depth(and));
        let members = merge(self.into_members(and), other.into_members(and));
        Operand {
            node: if and { Node::And(members) } else { Node::Or(members) },
            depth,
        }
    }

    fn and(self, other: Operand) -> Operand {
        if self.is_true() {
            return other;
        }
        if other.is_true() {
            return self;
        }
        self.group(other, true)
    }

    fn or(self, other: Operand) -> Operand {
        if self.is_true() || other.is_true() {
            return Operand::leaf(Condition::True);
        }
        self.group(other, false)
    }

    fn not(self) -> Operand {
        let cond = self.node.into_condition();
        let depth = if matches!(cond, Condition::Not(_)) {
            self.depth.saturating_sub(1)
        } else {
            self.depth + 1
        };
        Operand {
            node: Node::Cond(cond.not()),
            depth,
        }
    }
}

/// Concatenate `left` then `right`, moving the shorter side.
fn merge(mut left: VecDeque<Condition>, mut right: VecDeque<Condition>) -> VecDeque<Condition> {
    if left.len() >= right.len() {
        left.extend(right);
        left
    } else {
        while let Some(cond) = left.pop_back() {
            right.push_front(cond);
        }
        right
    }
}

fn parse_leaf(leaf: &[Value], index: usize) -> Result<Condition, DomainParseError> {
    let [field, operator, value] = leaf else {
        return Err(DomainParseError::InvalidTerm {
            index,
            reason: format!("leaf must have 3 elements, got {}", leaf.len()),
        });
    };

    let Value::String(op_text) = operator else {
        return Err(DomainParseError::InvalidTerm {
            index,
            reason: "leaf operator must be a string".to_string(),
        });
    };
    let op = Operator::parse(op_text)
        .ok_or_else(|| DomainParseError::UnknownOperator(op_text.clone()))?;

    let name = match field {
        Value::String(name) if !name.is_empty() => name.clone(),
        // Constant leaves: [1, "=", 1] is always true, [0, "=", 1] never.
        Value::Number(n) if op == Operator::Equals => {
            let same = n.as_f64().is_some() && n.as_f64() == value.as_f64();
            return Ok(if same { Condition::True } else { Condition::none() });
        }
        _ => {
            return Err(DomainParseError::InvalidTerm {
                index,
                reason: "leaf field must be a non-empty string".to_string(),
            });
        }
    };

    let value = match value {
        Value::Array(_) | Value::Bool(false) | Value::Null => value.clone(),
        scalar if matches!(op, Operator::In | Operator::NotIn) => Value::Array(vec![scalar.clone()]),
        other => other.clone(),
    };
    Ok(Condition::leaf(name, op, value))
}

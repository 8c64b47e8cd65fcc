//! Leaf comparison operators.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Equals,
    NotEquals,
    Greater,
    GreaterOrEqual,
    Lower,
    LowerOrEqual,
    Like,
    NotLike,
    ILike,
    NotILike,
    /// SQL pattern match (`%` / `_` wildcards), case sensitive.
    EqLike,
    /// SQL pattern match, case insensitive.
    EqILike,
    In,
    NotIn,
}

impl Operator {
    /// Parse the textual operator used in domains.
    ///
    /// `<>` is accepted as an alias of `!=`.
    pub fn parse(token: &str) -> Option<Self> {
        let op = match token.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Self::Equals,
            "!=" | "<>" => Self::NotEquals,
            ">" => Self::Greater,
            ">=" => Self::GreaterOrEqual,
            "<" => Self::Lower,
            "<=" => Self::LowerOrEqual,
            "like" => Self::Like,
            "not like" => Self::NotLike,
            "ilike" => Self::ILike,
            "not ilike" => Self::NotILike,
            "=like" => Self::EqLike,
            "=ilike" => Self::EqILike,
            "in" => Self::In,
            "not in" => Self::NotIn,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Lower => "<",
            Self::LowerOrEqual => "<=",
            Self::Like => "like",
            Self::NotLike => "not like",
            Self::ILike => "ilike",
            Self::NotILike => "not ilike",
            Self::EqLike => "=like",
            Self::EqILike => "=ilike",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }

    /// Negative operators match a record when *no* value satisfies the
    /// positive form, including when the field is empty.
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            Self::NotEquals | Self::NotLike | Self::NotILike | Self::NotIn
        )
    }

    /// Positive counterpart of a negative operator.
    pub fn positive(&self) -> Self {
        match self {
            Self::NotEquals => Self::Equals,
            Self::NotLike => Self::Like,
            Self::NotILike => Self::ILike,
            Self::NotIn => Self::In,
            other => *other,
        }
    }
}

impl core::fmt::Display for Operator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases_and_case() {
        assert_eq!(Operator::parse("<>"), Some(Operator::NotEquals));
        assert_eq!(Operator::parse("NOT ILIKE"), Some(Operator::NotILike));
        assert_eq!(Operator::parse("child_of"), None);
    }

    #[test]
    fn textual_form_round_trips() {
        for op in [
            Operator::Equals,
            Operator::NotEquals,
            Operator::GreaterOrEqual,
            Operator::EqILike,
            Operator::NotIn,
        ] {
            assert_eq!(Operator::parse(op.as_str()), Some(op));
        }
    }
}

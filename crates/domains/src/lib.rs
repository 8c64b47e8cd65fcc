//! `basis-domains`: filter expressions sent by the web client.
//!
//! A domain such as `["|", ["name", "ilike", "acme"], ["is_company", "=", true]]`
//! is parsed into a [`Condition`] tree that the query layer evaluates against
//! records.

pub mod condition;
pub mod literal;
pub mod operator;
pub mod parser;

pub use condition::{Condition, Predicate};
pub use literal::parse_literal;
pub use operator::Operator;
pub use parser::{MAX_DEPTH, parse_domain, parse_domain_str};

/// Errors raised while parsing a domain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainParseError {
    #[error("domain must be a list of terms")]
    NotAList,

    #[error("invalid domain term at index {index}: {reason}")]
    InvalidTerm { index: usize, reason: String },

    #[error("unknown domain operator '{0}'")]
    UnknownOperator(String),

    #[error("missing operand at index {0}")]
    MissingOperand(usize),

    #[error("domain nests operators deeper than {0} levels")]
    TooDeep(usize),

    #[error("invalid domain literal: {0}")]
    InvalidLiteral(String),
}

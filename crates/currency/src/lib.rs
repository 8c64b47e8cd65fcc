//! Currencies, exchange rates and amount arithmetic at currency precision.

pub mod currency;
pub mod rate;

pub use currency::{Currency, SymbolPosition, round_to};
pub use rate::{CurrencyRate, compute, rate_at};

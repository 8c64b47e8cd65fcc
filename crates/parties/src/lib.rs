//! Partners and the records hanging off them: tags, banks, bank accounts and
//! companies.
//!
//! Pure domain logic (no IO, no HTTP, no storage); tree queries work on
//! snapshots handed in by the caller.

pub mod bank;
pub mod category;
pub mod company;
pub mod graph;
pub mod partner;

pub use bank::{Bank, BankAccount, sanitize_account_number};
pub use category::{PartnerCategory, full_name};
pub use company::Company;
pub use graph::PartnerGraph;
pub use partner::{Address, Partner, PartnerType};

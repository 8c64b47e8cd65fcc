//! Banks and partner bank accounts.

use serde::{Deserialize, Serialize};

use basis_core::{DomainError, DomainResult, Model, RecordId};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    #[serde(default)]
    pub id: RecordId,
    pub name: String,
    /// Bank identifier code (SWIFT).
    #[serde(default)]
    pub bic: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Bank {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RecordId::default(),
            name: name.into(),
            bic: None,
            country: None,
            active: true,
        }
    }
}

impl Model for Bank {
    const NAME: &'static str = "Bank";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("bank name is required"));
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        match &self.bic {
            Some(bic) if !bic.is_empty() => format!("{} - {bic}", self.name),
            _ => self.name.clone(),
        }
    }
}

/// Account number with separators removed, upper-cased.
pub fn sanitize_account_number(number: &str) -> String {
    number
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    #[serde(default)]
    pub id: RecordId,
    pub acc_number: String,
    /// Derived from `acc_number` by `normalize`.
    #[serde(default)]
    pub sanitized_acc_number: String,
    pub partner_id: RecordId,
    #[serde(default)]
    pub bank_id: Option<RecordId>,
    #[serde(default)]
    pub acc_holder_name: Option<String>,
    #[serde(default)]
    pub currency_id: Option<RecordId>,
    #[serde(default)]
    pub company_id: Option<RecordId>,
}

impl BankAccount {
    pub fn new(acc_number: impl Into<String>, partner_id: RecordId) -> Self {
        let acc_number = acc_number.into();
        Self {
            id: RecordId::default(),
            sanitized_acc_number: sanitize_account_number(&acc_number),
            acc_number,
            partner_id,
            bank_id: None,
            acc_holder_name: None,
            currency_id: None,
            company_id: None,
        }
    }

    /// Account type; only plain bank accounts are known here.
    pub fn acc_type(&self) -> &'static str {
        "bank"
    }
}

impl Model for BankAccount {
    const NAME: &'static str = "BankAccount";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn normalize(&mut self) {
        self.sanitized_acc_number = sanitize_account_number(&self.acc_number);
    }

    /// The same account can only be registered once per partner.
    fn unique_key(&self) -> Option<String> {
        Some(format!(
            "{}|{}",
            sanitize_account_number(&self.acc_number),
            self.partner_id
        ))
    }

    fn validate(&self) -> DomainResult<()> {
        if sanitize_account_number(&self.acc_number).is_empty() {
            return Err(DomainError::validation("account number is required"));
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        self.acc_number.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_account_numbers() {
        assert_eq!(sanitize_account_number("be68 5390-0754 7034"), "BE68539007547034");
        let acc = BankAccount::new("BE68 5390 0754 7034", RecordId::new(3));
        assert_eq!(acc.sanitized_acc_number, "BE68539007547034");
        assert_eq!(acc.unique_key().unwrap(), "BE68539007547034|3");
    }

    #[test]
    fn same_number_differently_formatted_collides() {
        let a = BankAccount::new("BE68 5390 0754 7034", RecordId::new(3));
        let b = BankAccount::new("be68539007547034", RecordId::new(3));
        let c = BankAccount::new("be68539007547034", RecordId::new(4));
        assert_eq!(a.unique_key(), b.unique_key());
        assert_ne!(b.unique_key(), c.unique_key());
    }

    #[test]
    fn normalize_refreshes_sanitized_number() {
        let mut acc = BankAccount::new("123", RecordId::new(1));
        acc.acc_number = "45-6".into();
        acc.normalize();
        assert_eq!(acc.sanitized_acc_number, "456");
        assert!(BankAccount::new(" - ", RecordId::new(1)).validate().is_err());
    }
}

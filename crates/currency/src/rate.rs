//! Dated exchange rates and conversion.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use basis_core::{DomainError, DomainResult, Model, RecordId};

use crate::currency::Currency;

/// Units of the currency per unit of the company currency, from `name` on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRate {
    #[serde(default)]
    pub id: RecordId,
    pub currency_id: RecordId,
    /// Date the rate applies from.
    pub name: NaiveDate,
    pub rate: f64,
    #[serde(default)]
    pub company_id: Option<RecordId>,
}

impl CurrencyRate {
    pub fn new(currency_id: RecordId, name: NaiveDate, rate: f64) -> Self {
        Self {
            id: RecordId::default(),
            currency_id,
            name,
            rate,
            company_id: None,
        }
    }
}

impl Model for CurrencyRate {
    const NAME: &'static str = "CurrencyRate";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    /// One rate per currency, day and company.
    fn unique_key(&self) -> Option<String> {
        Some(format!(
            "{}|{}|{}",
            self.currency_id,
            self.name,
            self.company_id.map(|c| c.get()).unwrap_or(0)
        ))
    }

    fn validate(&self) -> DomainResult<()> {
        if !(self.rate > 0.0) {
            return Err(DomainError::validation("the currency rate must be strictly positive"));
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        self.name.to_string()
    }
}

/// Rate of `currency` on `date`: the latest rate dated on or before `date`.
///
/// Company-specific rates win over shared ones of the same date. Without
/// any rate the currency counts as the reference currency (1.0).
pub fn rate_at(
    rates: &[CurrencyRate],
    currency: RecordId,
    date: NaiveDate,
    company: Option<RecordId>,
) -> f64 {
    rates
        .iter()
        .filter(|r| r.currency_id == currency && r.name <= date)
        .filter(|r| r.company_id.is_none() || r.company_id == company)
        .max_by_key(|r| (r.name, r.company_id.is_some()))
        .map(|r| r.rate)
        .unwrap_or(1.0)
}

/// Convert `amount` from one currency to another at `date`'s rates,
/// optionally rounding to the target currency.
pub fn compute(
    amount: f64,
    from: &Currency,
    to: &Currency,
    rates: &[CurrencyRate],
    date: NaiveDate,
    company: Option<RecordId>,
    round: bool,
) -> f64 {
    let converted = if from.id == to.id {
        amount
    } else {
        let from_rate = rate_at(rates, from.id, date, company);
        let to_rate = rate_at(rates, to.id, date, company);
        amount * to_rate / from_rate
    };
    if round { to.round(converted) } else { converted }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn currency(id: i64, name: &str) -> Currency {
        let mut c = Currency::new(name, name);
        c.id = RecordId::new(id);
        c
    }

    fn rates() -> Vec<CurrencyRate> {
        let usd = RecordId::new(2);
        vec![
            CurrencyRate::new(usd, day(2024, 1, 1), 1.10),
            CurrencyRate::new(usd, day(2024, 6, 1), 1.25),
            CurrencyRate {
                company_id: Some(RecordId::new(7)),
                ..CurrencyRate::new(usd, day(2024, 6, 1), 1.30)
            },
        ]
    }

    #[test]
    fn latest_rate_on_or_before_date() {
        let r = rates();
        let usd = RecordId::new(2);
        assert_eq!(rate_at(&r, usd, day(2023, 12, 31), None), 1.0);
        assert_eq!(rate_at(&r, usd, day(2024, 3, 1), None), 1.10);
        assert_eq!(rate_at(&r, usd, day(2024, 6, 1), None), 1.25);
        assert_eq!(rate_at(&r, usd, day(2024, 6, 1), Some(RecordId::new(7))), 1.30);
        assert_eq!(rate_at(&r, usd, day(2024, 6, 1), Some(RecordId::new(8))), 1.25);
    }

    #[test]
    fn converts_between_currencies() {
        let eur = currency(1, "EUR");
        let usd = currency(2, "USD");
        let r = rates();
        assert_eq!(compute(100.0, &eur, &usd, &r, day(2024, 7, 1), None, true), 125.0);
        assert_eq!(compute(125.0, &usd, &eur, &r, day(2024, 7, 1), None, true), 100.0);
        assert_eq!(compute(10.0 / 3.0, &eur, &eur, &r, day(2024, 7, 1), None, true), 3.33);
        let raw = compute(1.0, &usd, &eur, &r, day(2024, 3, 1), None, false);
        assert!((raw - 1.0 / 1.10).abs() < 1e-12);
    }

    #[test]
    fn rate_must_be_positive() {
        assert!(CurrencyRate::new(RecordId::new(1), day(2024, 1, 1), 0.0).validate().is_err());
    }
}

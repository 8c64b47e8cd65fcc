//! Currencies and amount rounding.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use basis_core::{DomainError, DomainResult, Model, RecordId};

/// Where the symbol goes when formatting an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolPosition {
    Before,
    #[default]
    After,
}

fn default_rounding() -> f64 {
    0.01
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    #[serde(default)]
    pub id: RecordId,
    /// ISO 4217 code.
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default = "default_rounding")]
    pub rounding: f64,
    #[serde(default)]
    pub position: SymbolPosition,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub currency_unit_label: Option<String>,
    #[serde(default)]
    pub currency_subunit_label: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Currency {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            id: RecordId::default(),
            name: name.into(),
            symbol: symbol.into(),
            rounding: default_rounding(),
            position: SymbolPosition::After,
            full_name: None,
            currency_unit_label: None,
            currency_subunit_label: None,
            active: true,
        }
    }

    pub fn with_rounding(mut self, rounding: f64) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn with_position(mut self, position: SymbolPosition) -> Self {
        self.position = position;
        self
    }

    /// Digits shown after the decimal point, derived from `rounding`.
    pub fn decimal_places(&self) -> usize {
        precision_digits(self.rounding)
    }

    /// Round half away from zero to a multiple of `rounding`.
    pub fn round(&self, amount: f64) -> f64 {
        round_to(amount, self.rounding)
    }

    pub fn is_zero(&self, amount: f64) -> bool {
        self.round(amount).abs() < self.rounding
    }

    /// Compare two amounts at this currency's precision.
    pub fn compare_amounts(&self, a: f64, b: f64) -> Ordering {
        let diff = self.round(a - b);
        if self.is_zero(diff) {
            Ordering::Equal
        } else if diff < 0.0 {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }

    /// `1,234.50 €` / `$ 1,234.50`, with a non-breaking space.
    pub fn format_amount(&self, amount: f64) -> String {
        let digits = self.format_digits(amount);
        if self.symbol.is_empty() {
            return digits;
        }
        match self.position {
            SymbolPosition::Before => format!("{}\u{a0}{digits}", self.symbol),
            SymbolPosition::After => format!("{digits}\u{a0}{}", self.symbol),
        }
    }

    fn format_digits(&self, amount: f64) -> String {
        let places = self.decimal_places();
        let text = format!("{:.places$}", self.round(amount).abs());
        let (int_part, frac_part) = match text.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (text.as_str(), None),
        };
        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        for (i, c) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        let sign = if self.round(amount) < 0.0 { "-" } else { "" };
        match frac_part {
            Some(f) => format!("{sign}{grouped}.{f}"),
            None => format!("{sign}{grouped}"),
        }
    }
}

/// Round `value` to a multiple of `precision`, half away from zero.
///
/// A relative epsilon is added first so that values like `2.675` (stored as
/// `2.67499999...`) round the way they read.
pub fn round_to(value: f64, precision: f64) -> f64 {
    if precision <= 0.0 || value == 0.0 || !value.is_finite() {
        return value;
    }
    let normalized = value / precision;
    let epsilon = 2f64.powf(normalized.abs().log2() - 52.0);
    let rounded = (normalized + normalized.signum() * epsilon).round();
    // Re-round to the precision's digits to drop representation noise.
    let factor = 10f64.powi(precision_digits(precision) as i32);
    (rounded * precision * factor).round() / factor
}

fn precision_digits(precision: f64) -> usize {
    if precision > 0.0 && precision < 1.0 {
        (-precision.log10() - 1e-9).ceil().max(0.0) as usize
    } else {
        0
    }
}

impl Model for Currency {
    const NAME: &'static str = "Currency";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn normalize(&mut self) {
        self.name = self.name.trim().to_ascii_uppercase();
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.len() != 3 || !self.name.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DomainError::validation(format!(
                "currency code '{}' must be three letters",
                self.name
            )));
        }
        if !(self.rounding > 0.0) {
            return Err(DomainError::validation("the rounding factor must be greater than 0"));
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

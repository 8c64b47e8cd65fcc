//! Sequence and date-range records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use basis_core::{DomainError, DomainResult, Model, RecordId};

/// Counter implementation backing a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Implementation {
    /// Increment released before the caller runs; numbers drawn by failed
    /// callers are lost.
    #[default]
    Standard,
    /// Serialized increment; a number is only consumed when the caller
    /// succeeds, so the series has no gaps.
    NoGap,
}

impl Implementation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Implementation::Standard => "standard",
            Implementation::NoGap => "no_gap",
        }
    }
}

fn default_one() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

/// A persisted number generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    #[serde(default)]
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub implementation: Implementation,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    /// Next number to be drawn. Stores refresh this from the live counter
    /// when returning records.
    #[serde(default = "default_one")]
    pub number_next: i64,
    #[serde(default = "default_one")]
    pub number_increment: i64,
    #[serde(default)]
    pub padding: usize,
    #[serde(default)]
    pub use_date_range: bool,
    #[serde(default)]
    pub company_id: Option<RecordId>,
}

impl Sequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(0),
            name: name.into(),
            code: None,
            implementation: Implementation::Standard,
            active: true,
            prefix: None,
            suffix: None,
            number_next: 1,
            number_increment: 1,
            padding: 0,
            use_date_range: false,
            company_id: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_implementation(mut self, implementation: Implementation) -> Self {
        self.implementation = implementation;
        self
    }

    pub fn with_increment(mut self, increment: i64) -> Self {
        self.number_increment = increment;
        self
    }

    pub fn with_date_range(mut self) -> Self {
        self.use_date_range = true;
        self
    }
}

impl Model for Sequence {
    const NAME: &'static str = "Sequence";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("sequence name is required"));
        }
        if self.number_increment <= 0 {
            return Err(DomainError::validation("sequence increment must be positive"));
        }
        if self.padding > 32 {
            return Err(DomainError::validation("sequence padding cannot exceed 32"));
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

/// A child counter scoped to the half-open window `[date_from, date_to)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub id: RecordId,
    pub sequence_id: RecordId,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub number_next: i64,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.date_from <= date && date < self.date_to
    }
}

/// Partial update of a sequence. `None` leaves a field unchanged; an empty
/// prefix, suffix or code clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SequenceUpdate {
    pub name: Option<String>,
    pub code: Option<String>,
    pub implementation: Option<Implementation>,
    pub active: Option<bool>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub number_next: Option<i64>,
    pub number_increment: Option<i64>,
    pub padding: Option<usize>,
    pub use_date_range: Option<bool>,
}

impl SequenceUpdate {
    pub(crate) fn apply(&self, seq: &mut Sequence) {
        fn clearable(v: &Option<String>, target: &mut Option<String>) {
            if let Some(v) = v {
                *target = if v.is_empty() { None } else { Some(v.clone()) };
            }
        }
        if let Some(name) = &self.name {
            seq.name = name.clone();
        }
        clearable(&self.code, &mut seq.code);
        clearable(&self.prefix, &mut seq.prefix);
        clearable(&self.suffix, &mut seq.suffix);
        if let Some(v) = self.implementation {
            seq.implementation = v;
        }
        if let Some(v) = self.active {
            seq.active = v;
        }
        if let Some(v) = self.number_next {
            seq.number_next = v;
        }
        if let Some(v) = self.number_increment {
            seq.number_increment = v;
        }
        if let Some(v) = self.padding {
            seq.padding = v;
        }
        if let Some(v) = self.use_date_range {
            seq.use_date_range = v;
        }
    }
}

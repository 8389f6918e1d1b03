use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// An inclusive `[date_from, date_to]` range. Never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    date_from: NaiveDate,
    date_to: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    date_from: NaiveDate,
    date_to: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = ValidationError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.date_from, raw.date_to)
    }
}

impl DateRange {
    /// # Errors
    ///
    /// Returns a [`ValidationError`] on `date_to` when `date_from > date_to`.
    pub fn new(date_from: NaiveDate, date_to: NaiveDate) -> Result<Self, ValidationError> {
        if date_from > date_to {
            return Err(ValidationError::new(
                "date_to",
                format!("date_to ({date_to}) must not be before date_from ({date_from})"),
            ));
        }
        Ok(Self { date_from, date_to })
    }

    #[must_use]
    pub fn date_from(&self) -> NaiveDate {
        self.date_from
    }

    #[must_use]
    pub fn date_to(&self) -> NaiveDate {
        self.date_to
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.date_from <= date && date <= self.date_to
    }

    /// Number of calendar days covered, counting both ends.
    #[must_use]
    pub fn days_inclusive(&self) -> i64 {
        (self.date_to - self.date_from).num_days() + 1
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.date_from, self.date_to)
    }
}

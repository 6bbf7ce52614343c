//! `"<n> <unit>"` time increments used by shifting, buffering and registration.

use super::extent::TimeUnit;
use crate::error::{AlgebraError, Result};
use chrono::{Duration, Months, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A signed count of time units. A bare number has no unit and only
/// applies to relative time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeIncrement {
    pub count: i64,
    pub unit: Option<TimeUnit>,
}

impl TimeIncrement {
    pub fn new(count: i64, unit: TimeUnit) -> Self {
        Self {
            count,
            unit: Some(unit),
        }
    }

    /// Parse `"1 day"`, `"-2 months"`, `"3"`.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || AlgebraError::InvalidExtent(format!("invalid time increment `{value}`"));
        let mut parts = value.split_whitespace();
        let count = parts
            .next()
            .and_then(|c| c.parse::<i64>().ok())
            .ok_or_else(invalid)?;
        let unit = match parts.next() {
            Some(name) => Some(TimeUnit::parse(name).ok_or_else(invalid)?),
            None => None,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self { count, unit })
    }

    pub fn negated(&self) -> Self {
        Self {
            count: -self.count,
            unit: self.unit,
        }
    }

    pub fn scaled(&self, factor: i64) -> Self {
        Self {
            count: self.count * factor,
            unit: self.unit,
        }
    }

    /// Calendar-aware addition; months and years keep the day of month
    /// where possible and clamp to the month end otherwise.
    pub fn add_to(&self, at: NaiveDateTime) -> Result<NaiveDateTime> {
        let unit = self.unit.ok_or_else(|| {
            AlgebraError::InvalidExtent(format!(
                "increment `{}` needs a unit for absolute time",
                self.count
            ))
        })?;
        let overflow = || AlgebraError::InvalidExtent(format!("`{self}` overflows {at}"));
        let months = match unit {
            TimeUnit::Month => Some(self.count),
            TimeUnit::Year => Some(self.count * 12),
            _ => None,
        };
        if let Some(months) = months {
            let magnitude = Months::new(u32::try_from(months.unsigned_abs()).map_err(|_| overflow())?);
            let shifted = if months >= 0 {
                at.checked_add_months(magnitude)
            } else {
                at.checked_sub_months(magnitude)
            };
            return shifted.ok_or_else(overflow);
        }
        let seconds = unit.seconds().unwrap_or(1) * self.count;
        at.checked_add_signed(Duration::seconds(seconds))
            .ok_or_else(overflow)
    }

    pub fn add_to_relative(&self, value: i64, unit: TimeUnit) -> Result<i64> {
        if let Some(own) = self.unit
            && own != unit
        {
            return Err(AlgebraError::InvalidExtent(format!(
                "increment `{self}` does not match relative unit `{unit}`"
            )));
        }
        value
            .checked_add(self.count)
            .ok_or_else(|| AlgebraError::InvalidExtent(format!("`{self}` overflows {value}")))
    }
}

impl fmt::Display for TimeIncrement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            Some(unit) => f.write_str(&unit.format_count(self.count)),
            None => write!(f, "{}", self.count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temporal::parse_datetime;

    #[test]
    fn test_parse_increment() {
        assert_eq!(
            TimeIncrement::parse("2 days").unwrap(),
            TimeIncrement::new(2, TimeUnit::Day)
        );
        assert_eq!(TimeIncrement::parse("-1 year").unwrap().count, -1);
        assert_eq!(TimeIncrement::parse("5").unwrap().unit, None);
        assert!(TimeIncrement::parse("two days").is_err());
        assert!(TimeIncrement::parse("1 fortnight").is_err());
        assert!(TimeIncrement::parse("1 day extra").is_err());
    }

    #[test]
    fn test_calendar_arithmetic() {
        let start = parse_datetime("2001-01-31").unwrap();
        let month = TimeIncrement::new(1, TimeUnit::Month);
        assert_eq!(month.add_to(start).unwrap(), parse_datetime("2001-02-28").unwrap());
        let back = TimeIncrement::new(-1, TimeUnit::Year);
        assert_eq!(back.add_to(start).unwrap(), parse_datetime("2000-01-31").unwrap());
        let hours = TimeIncrement::new(36, TimeUnit::Hour);
        assert_eq!(
            hours.add_to(start).unwrap(),
            parse_datetime("2001-02-01 12:00:00").unwrap()
        );
    }

    #[test]
    fn test_relative_unit_mismatch() {
        let inc = TimeIncrement::new(1, TimeUnit::Year);
        assert_eq!(inc.add_to_relative(3, TimeUnit::Year).unwrap(), 4);
        assert!(inc.add_to_relative(3, TimeUnit::Day).is_err());
        assert!(TimeIncrement::parse("3").unwrap().add_to(start_of_2001()).is_err());
    }

    fn start_of_2001() -> NaiveDateTime {
        parse_datetime("2001-01-01").unwrap()
    }
}

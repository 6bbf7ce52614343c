//! Absolute and relative validity intervals.

use super::increment::TimeIncrement;
use super::relation::Relation;
use crate::error::{AlgebraError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Units for relative time and for time increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    pub fn parse(name: &str) -> Option<Self> {
        let unit = match name.trim().to_ascii_lowercase().as_str() {
            "second" | "seconds" | "sec" | "s" => TimeUnit::Second,
            "minute" | "minutes" | "min" => TimeUnit::Minute,
            "hour" | "hours" | "h" => TimeUnit::Hour,
            "day" | "days" | "d" => TimeUnit::Day,
            "week" | "weeks" => TimeUnit::Week,
            "month" | "months" => TimeUnit::Month,
            "year" | "years" => TimeUnit::Year,
            _ => return None,
        };
        Some(unit)
    }

    pub fn name(self) -> &'static str {
        match self {
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
            TimeUnit::Year => "year",
        }
    }

    /// Length in seconds for fixed-length units.
    pub fn seconds(self) -> Option<i64> {
        match self {
            TimeUnit::Second => Some(1),
            TimeUnit::Minute => Some(60),
            TimeUnit::Hour => Some(3_600),
            TimeUnit::Day => Some(86_400),
            TimeUnit::Week => Some(604_800),
            TimeUnit::Month | TimeUnit::Year => None,
        }
    }

    /// `"1 day"`, `"3 days"`
    pub fn format_count(self, count: i64) -> String {
        if count == 1 {
            format!("{count} {}", self.name())
        } else {
            format!("{count} {}s", self.name())
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a dataset is stamped with calendar or relative time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalType {
    Absolute,
    Relative,
}

impl TemporalType {
    pub fn as_str(self) -> &'static str {
        match self {
            TemporalType::Absolute => "absolute",
            TemporalType::Relative => "relative",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "absolute" => Some(TemporalType::Absolute),
            "relative" => Some(TemporalType::Relative),
            _ => None,
        }
    }
}

impl fmt::Display for TemporalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or the `T`-separated form.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for format in [DATETIME_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

pub(crate) fn from_timestamp(seconds: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(seconds, 0).map(|dt| dt.naive_utc())
}

/// A half-open validity interval `[start, end)`.
///
/// Both variants uphold `start < end`; constructors reject anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemporalExtent {
    Absolute {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    Relative {
        start: i64,
        end: i64,
        unit: TimeUnit,
    },
}

impl TemporalExtent {
    pub fn absolute(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if start >= end {
            return Err(AlgebraError::InvalidExtent(format!(
                "start {} is not before end {}",
                start.format(DATETIME_FORMAT),
                end.format(DATETIME_FORMAT)
            )));
        }
        Ok(TemporalExtent::Absolute { start, end })
    }

    pub fn relative(start: i64, end: i64, unit: TimeUnit) -> Result<Self> {
        if start >= end {
            return Err(AlgebraError::InvalidExtent(format!(
                "start {start} is not before end {end}"
            )));
        }
        Ok(TemporalExtent::Relative { start, end, unit })
    }

    /// Parse both ends with [`parse_datetime`].
    pub fn parse_absolute(start: &str, end: &str) -> Result<Self> {
        let parse = |value: &str| {
            parse_datetime(value)
                .ok_or_else(|| AlgebraError::InvalidExtent(format!("invalid date `{value}`")))
        };
        Self::absolute(parse(start)?, parse(end)?)
    }

    pub fn temporal_type(&self) -> TemporalType {
        match self {
            TemporalExtent::Absolute { .. } => TemporalType::Absolute,
            TemporalExtent::Relative { .. } => TemporalType::Relative,
        }
    }

    pub fn unit(&self) -> Option<TimeUnit> {
        match self {
            TemporalExtent::Absolute { .. } => None,
            TemporalExtent::Relative { unit, .. } => Some(*unit),
        }
    }

    pub fn start_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            TemporalExtent::Absolute { start, .. } => Some(*start),
            TemporalExtent::Relative { .. } => None,
        }
    }

    pub fn end_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            TemporalExtent::Absolute { end, .. } => Some(*end),
            TemporalExtent::Relative { .. } => None,
        }
    }

    /// Interval bounds on a common integer axis: unix seconds for absolute
    /// time, the raw offsets for relative time.
    pub fn bounds(&self) -> (i64, i64) {
        match self {
            TemporalExtent::Absolute { start, end } => {
                (start.and_utc().timestamp(), end.and_utc().timestamp())
            }
            TemporalExtent::Relative { start, end, .. } => (*start, *end),
        }
    }

    /// Length on the [`bounds`](Self::bounds) axis.
    pub fn length(&self) -> i64 {
        let (start, end) = self.bounds();
        end - start
    }

    /// Extents only relate when they share a kind (and unit, for relative time).
    pub fn comparable(&self, other: &Self) -> bool {
        match (self, other) {
            (TemporalExtent::Absolute { .. }, TemporalExtent::Absolute { .. }) => true,
            (
                TemporalExtent::Relative { unit: a, .. },
                TemporalExtent::Relative { unit: b, .. },
            ) => a == b,
            _ => false,
        }
    }

    /// Build an extent of the same kind from axis bounds.
    pub(crate) fn with_bounds(&self, start: i64, end: i64) -> Option<Self> {
        if start >= end {
            return None;
        }
        match self {
            TemporalExtent::Absolute { .. } => Some(TemporalExtent::Absolute {
                start: from_timestamp(start)?,
                end: from_timestamp(end)?,
            }),
            TemporalExtent::Relative { unit, .. } => Some(TemporalExtent::Relative {
                start,
                end,
                unit: *unit,
            }),
        }
    }

    /// The unique Allen relation between `self` and `other`.
    pub fn relation(&self, other: &Self) -> Option<Relation> {
        if !self.comparable(other) {
            return None;
        }
        let (s1, e1) = self.bounds();
        let (s2, e2) = other.bounds();
        Some(Relation::classify(s1, e1, s2, e2))
    }

    fn is(&self, other: &Self, relation: Relation) -> bool {
        self.relation(other) == Some(relation)
    }

    pub fn equal(&self, other: &Self) -> bool {
        self.is(other, Relation::Equal)
    }

    /// Strictly inside `other`: `s1 > s2 && e1 < e2`.
    pub fn during(&self, other: &Self) -> bool {
        self.is(other, Relation::During)
    }

    pub fn contains(&self, other: &Self) -> bool {
        self.is(other, Relation::Contains)
    }

    pub fn starts(&self, other: &Self) -> bool {
        self.is(other, Relation::Starts)
    }

    pub fn started_by(&self, other: &Self) -> bool {
        self.is(other, Relation::StartedBy)
    }

    pub fn finishes(&self, other: &Self) -> bool {
        self.is(other, Relation::Finishes)
    }

    pub fn finished_by(&self, other: &Self) -> bool {
        self.is(other, Relation::FinishedBy)
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.is(other, Relation::Overlaps)
    }

    pub fn overlapped_by(&self, other: &Self) -> bool {
        self.is(other, Relation::OverlappedBy)
    }

    pub fn meets(&self, other: &Self) -> bool {
        self.is(other, Relation::Meets)
    }

    pub fn met_by(&self, other: &Self) -> bool {
        self.is(other, Relation::MetBy)
    }

    pub fn before(&self, other: &Self) -> bool {
        self.is(other, Relation::Before)
    }

    pub fn after(&self, other: &Self) -> bool {
        self.is(other, Relation::After)
    }

    /// Any relation except before/after.
    pub fn intersects(&self, other: &Self) -> bool {
        self.relation(other)
            .is_some_and(|r| !matches!(r, Relation::Before | Relation::After))
    }

    /// `(max start, min end)`, `None` when empty.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        if !self.comparable(other) {
            return None;
        }
        let (s1, e1) = self.bounds();
        let (s2, e2) = other.bounds();
        self.with_bounds(s1.max(s2), e1.min(e2))
    }

    /// `(min start, max end)` for extents that touch or overlap.
    pub fn union(&self, other: &Self) -> Option<Self> {
        if !self.intersects(other) {
            return None;
        }
        self.disjoint_union(other)
    }

    /// `(min start, max end)` whether or not the extents touch.
    pub fn disjoint_union(&self, other: &Self) -> Option<Self> {
        if !self.comparable(other) {
            return None;
        }
        let (s1, e1) = self.bounds();
        let (s2, e2) = other.bounds();
        self.with_bounds(s1.min(s2), e1.max(e2))
    }

    /// Move both ends by `increment`.
    pub fn shifted(&self, increment: &TimeIncrement) -> Result<Self> {
        match self {
            TemporalExtent::Absolute { start, end } => {
                Self::absolute(increment.add_to(*start)?, increment.add_to(*end)?)
            }
            TemporalExtent::Relative { start, end, unit } => Self::relative(
                increment.add_to_relative(*start, *unit)?,
                increment.add_to_relative(*end, *unit)?,
                *unit,
            ),
        }
    }

    /// Pad both ends outwards by `increment`.
    pub fn buffered(&self, increment: &TimeIncrement) -> Result<Self> {
        let back = increment.negated();
        match self {
            TemporalExtent::Absolute { start, end } => {
                Self::absolute(back.add_to(*start)?, increment.add_to(*end)?)
            }
            TemporalExtent::Relative { start, end, unit } => Self::relative(
                back.add_to_relative(*start, *unit)?,
                increment.add_to_relative(*end, *unit)?,
                *unit,
            ),
        }
    }

    /// Same start, new end taken from the start of `next`.
    pub(crate) fn snapped_to(&self, next: &Self) -> Option<Self> {
        if !self.comparable(next) {
            return None;
        }
        let (start, _) = self.bounds();
        let (next_start, _) = next.bounds();
        self.with_bounds(start, next_start)
    }

    pub fn start_string(&self) -> String {
        match self {
            TemporalExtent::Absolute { start, .. } => start.format(DATETIME_FORMAT).to_string(),
            TemporalExtent::Relative { start, .. } => start.to_string(),
        }
    }

    pub fn end_string(&self) -> String {
        match self {
            TemporalExtent::Absolute { end, .. } => end.format(DATETIME_FORMAT).to_string(),
            TemporalExtent::Relative { end, .. } => end.to_string(),
        }
    }
}

/// Span from the earliest start to the latest end.
pub fn overall_extent(extents: &[TemporalExtent]) -> Option<TemporalExtent> {
    let mut overall = extents.first().copied();
    for extent in extents.iter().skip(1) {
        overall = overall.and_then(|acc| acc.disjoint_union(extent));
    }
    overall
}

impl fmt::Display for TemporalExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalExtent::Absolute { .. } => {
                write!(f, "{} / {}", self.start_string(), self.end_string())
            }
            TemporalExtent::Relative { start, end, unit } => {
                write!(f, "{start} / {end} {unit}s")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2001, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn ext(s: u32, e: u32) -> TemporalExtent {
        TemporalExtent::absolute(day(s), day(e)).unwrap()
    }

    #[test]
    fn test_extent_rejects_empty_interval() {
        assert!(TemporalExtent::absolute(day(2), day(2)).is_err());
        assert!(TemporalExtent::relative(5, 3, TimeUnit::Day).is_err());
    }

    #[test]
    fn test_relation_predicates() {
        assert!(ext(1, 2).equal(&ext(1, 2)));
        assert!(ext(2, 3).during(&ext(1, 4)));
        assert!(ext(1, 4).contains(&ext(2, 3)));
        assert!(ext(1, 2).starts(&ext(1, 3)));
        assert!(ext(2, 3).finishes(&ext(1, 3)));
        assert!(ext(1, 3).overlaps(&ext(2, 4)));
        assert!(ext(1, 2).meets(&ext(2, 3)));
        assert!(ext(1, 2).before(&ext(3, 4)));
        assert!(ext(3, 4).after(&ext(1, 2)));
        // bare during is strict
        assert!(!ext(1, 2).during(&ext(1, 3)));
    }

    #[test]
    fn test_interval_arithmetic() {
        assert_eq!(ext(1, 3).intersection(&ext(2, 4)), Some(ext(2, 3)));
        assert_eq!(ext(1, 2).intersection(&ext(2, 3)), None);
        assert_eq!(ext(1, 3).union(&ext(2, 4)), Some(ext(1, 4)));
        assert_eq!(ext(1, 2).union(&ext(2, 3)), Some(ext(1, 3)));
        assert_eq!(ext(1, 2).union(&ext(3, 4)), None);
        assert_eq!(ext(1, 2).disjoint_union(&ext(3, 4)), Some(ext(1, 4)));
    }

    #[test]
    fn test_mixed_kinds_never_relate() {
        let rel = TemporalExtent::relative(1, 2, TimeUnit::Day).unwrap();
        assert_eq!(rel.relation(&ext(1, 2)), None);
        assert!(rel.intersection(&ext(1, 2)).is_none());
        let other_unit = TemporalExtent::relative(1, 2, TimeUnit::Year).unwrap();
        assert!(!rel.comparable(&other_unit));
    }

    #[test]
    fn test_shift_and_buffer() {
        let one_day = TimeIncrement::parse("1 day").unwrap();
        assert_eq!(ext(2, 4).shifted(&one_day).unwrap(), ext(3, 5));
        assert_eq!(ext(2, 4).buffered(&one_day).unwrap(), ext(1, 5));

        let month = TimeIncrement::parse("1 month").unwrap();
        let jan = TemporalExtent::parse_absolute("2001-01-31", "2001-02-01").unwrap();
        let feb = jan.shifted(&month).unwrap();
        assert_eq!(feb.start_string(), "2001-02-28 00:00:00");

        let rel = TemporalExtent::relative(3, 5, TimeUnit::Day).unwrap();
        let two = TimeIncrement::parse("2").unwrap();
        assert_eq!(
            rel.buffered(&two).unwrap(),
            TemporalExtent::relative(1, 7, TimeUnit::Day).unwrap()
        );
    }

    #[test]
    fn test_parse_datetime_forms() {
        assert_eq!(parse_datetime("2001-01-03"), Some(day(3)));
        assert_eq!(parse_datetime("2001-01-03 00:00:00"), Some(day(3)));
        assert_eq!(parse_datetime("2001-01-03T00:00:00"), Some(day(3)));
        assert_eq!(parse_datetime("January"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(ext(1, 2).to_string(), "2001-01-01 00:00:00 / 2001-01-02 00:00:00");
        let rel = TemporalExtent::relative(1, 4, TimeUnit::Year).unwrap();
        assert_eq!(rel.to_string(), "1 / 4 years");
        assert_eq!(TimeUnit::Day.format_count(2), "2 days");
    }
}

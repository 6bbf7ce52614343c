//! Granularity and topology of a collection of extents.

use super::extent::{TemporalExtent, TimeUnit};
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The largest common step into which every extent length divides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Granularity {
    pub count: i64,
    pub unit: TimeUnit,
}

impl Granularity {
    pub fn new(count: i64, unit: TimeUnit) -> Self {
        Self { count, unit }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split_whitespace();
        let count = parts.next()?.parse().ok()?;
        let unit = TimeUnit::parse(parts.next()?)?;
        Some(Self { count, unit })
    }

    /// Whether `extent` is a whole multiple of this granularity.
    pub fn divides(&self, extent: &TemporalExtent) -> bool {
        if self.count <= 0 {
            return false;
        }
        match extent {
            TemporalExtent::Relative { start, end, .. } => (end - start) % self.count == 0,
            TemporalExtent::Absolute { start, end } => match self.unit {
                TimeUnit::Month | TimeUnit::Year => {
                    let step = if self.unit == TimeUnit::Year {
                        self.count * 12
                    } else {
                        self.count
                    };
                    month_aligned(start)
                        && month_aligned(end)
                        && (month_index(end) - month_index(start)) % step == 0
                }
                unit => {
                    let step = unit.seconds().unwrap_or(1) * self.count;
                    extent.length() % step == 0
                }
            },
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unit.format_count(self.count))
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn month_aligned(at: &NaiveDateTime) -> bool {
    at.day() == 1 && at.num_seconds_from_midnight() == 0
}

fn month_index(at: &NaiveDateTime) -> i64 {
    i64::from(at.year()) * 12 + i64::from(at.month0())
}

/// gcd over the lengths and the non-zero gaps between consecutive starts.
fn common_step(extents: &[TemporalExtent], axis: impl Fn(&NaiveDateTime) -> i64) -> i64 {
    let mut starts = Vec::with_capacity(extents.len());
    let mut step = 0;
    for extent in extents {
        let (start, end) = match extent {
            TemporalExtent::Absolute { start, end } => (axis(start), axis(end)),
            TemporalExtent::Relative { start, end, .. } => (*start, *end),
        };
        step = gcd(step, end - start);
        starts.push(start);
    }
    starts.sort_unstable();
    for pair in starts.windows(2) {
        let gap = pair[1] - pair[0];
        if gap != 0 {
            step = gcd(step, gap);
        }
    }
    step
}

/// Compute the granularity of a series; `None` for an empty series or
/// mixed temporal kinds.
pub fn compute_granularity(extents: &[TemporalExtent]) -> Option<Granularity> {
    let first = extents.first()?;
    if extents.iter().any(|e| !first.comparable(e)) {
        return None;
    }
    match first {
        TemporalExtent::Relative { unit, .. } => {
            let step = common_step(extents, |_| 0);
            (step > 0).then(|| Granularity::new(step, *unit))
        }
        TemporalExtent::Absolute { .. } => {
            let monthly = extents.iter().all(|e| match e {
                TemporalExtent::Absolute { start, end } => {
                    month_aligned(start) && month_aligned(end)
                }
                TemporalExtent::Relative { .. } => false,
            });
            if monthly {
                let months = common_step(extents, month_index);
                if months <= 0 {
                    return None;
                }
                return Some(if months % 12 == 0 {
                    Granularity::new(months / 12, TimeUnit::Year)
                } else {
                    Granularity::new(months, TimeUnit::Month)
                });
            }
            let seconds = common_step(extents, |at| at.and_utc().timestamp());
            if seconds <= 0 {
                return None;
            }
            let unit = [TimeUnit::Day, TimeUnit::Hour, TimeUnit::Minute]
                .into_iter()
                .find(|unit| seconds % unit.seconds().unwrap_or(1) == 0)
                .unwrap_or(TimeUnit::Second);
            Some(Granularity::new(
                seconds / unit.seconds().unwrap_or(1),
                unit,
            ))
        }
    }
}

/// True iff, sorted by start, every extent ends exactly where the next begins.
pub fn is_contiguous(extents: &[TemporalExtent]) -> bool {
    let mut sorted: Vec<(i64, i64)> = extents.iter().map(TemporalExtent::bounds).collect();
    sorted.sort_unstable();
    sorted.windows(2).all(|pair| pair[0].1 == pair[1].0)
        && extents.windows(2).all(|pair| pair[0].comparable(&pair[1]))
}

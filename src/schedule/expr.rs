// src/schedule/expr.rs

//! The 5-field periodic-time-expression engine.
//!
//! A [`PeriodicExpr`] is the canonical recurrence representation (minute,
//! hour, day-of-month, month, day-of-week) derived from a frequency plus
//! shift. Only the shapes the supported frequencies generate are accepted:
//! fixed or wildcard fields, plus stepped minutes (`*/15`, `7-59/15`).
//!
//! All arithmetic is over whole minutes in UTC. Occurrence enumeration is
//! half-open: the upper interval bound is dropped when it coincides with an
//! occurrence, because that instant belongs to the next interval.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc};
use regex::Regex;

use crate::errors::{DagforgeError, Result};

/// Minute field: a single minute of the hour, or a stepped range starting
/// at `start` past each hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinuteField {
    Fixed(u32),
    Step { start: u32, step: u32 },
}

/// Hour / day-of-month / month / day-of-week field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Any,
    Fixed(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicExpr {
    minute: MinuteField,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

fn minute_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:\*/(?P<bare_step>\d+)|(?P<start>\d+)-59/(?P<step>\d+)|(?P<fixed>\d+))$")
            .unwrap_or_else(|e| panic!("invalid built-in minute field regex: {e}"))
    })
}

impl PeriodicExpr {
    pub fn new(
        minute: MinuteField,
        hour: Field,
        day_of_month: Field,
        month: Field,
        day_of_week: Field,
    ) -> Result<Self> {
        let expr = Self {
            minute,
            hour,
            day_of_month,
            month,
            day_of_week,
        };
        expr.validate()?;
        Ok(expr)
    }

    fn validate(&self) -> Result<()> {
        let bad = |what: &str| Err(DagforgeError::Schedule(format!("invalid expression: {what}")));

        match self.minute {
            MinuteField::Fixed(m) if m > 59 => return bad("minute must be 0..=59"),
            MinuteField::Step { start, step } => {
                if start > 59 {
                    return bad("minute step start must be 0..=59");
                }
                if step == 0 || step > 59 {
                    return bad("minute step must be 1..=59");
                }
            }
            _ => {}
        }
        if let Field::Fixed(h) = self.hour {
            if h > 23 {
                return bad("hour must be 0..=23");
            }
        }
        if let Field::Fixed(d) = self.day_of_month {
            if !(1..=31).contains(&d) {
                return bad("day-of-month must be 1..=31");
            }
        }
        if let Field::Fixed(m) = self.month {
            if !(1..=12).contains(&m) {
                return bad("month must be 1..=12");
            }
        }
        if let Field::Fixed(w) = self.day_of_week {
            if w > 6 {
                return bad("day-of-week must be 0..=6");
            }
        }
        // Fixed day-of-month plus fixed day-of-week would need cron's union
        // semantics; no supported frequency produces that combination.
        if matches!(self.day_of_month, Field::Fixed(_)) && matches!(self.day_of_week, Field::Fixed(_))
        {
            return bad("day-of-month and day-of-week cannot both be fixed");
        }
        Ok(())
    }

    /// Numeric minute component: the fixed minute, or the step start.
    pub fn minute_component(&self) -> u32 {
        match self.minute {
            MinuteField::Fixed(m) => m,
            MinuteField::Step { start, .. } => start,
        }
    }

    /// Numeric hour component; wildcard reads as 0.
    pub fn hour_component(&self) -> u32 {
        match self.hour {
            Field::Any => 0,
            Field::Fixed(h) => h,
        }
    }

    /// Numeric day-of-month component; wildcard reads as 1.
    pub fn day_of_month_component(&self) -> u32 {
        match self.day_of_month {
            Field::Any => 1,
            Field::Fixed(d) => d,
        }
    }

    /// Numeric day-of-week component; wildcard reads as 0 (Sunday).
    pub fn day_of_week_component(&self) -> u32 {
        match self.day_of_week {
            Field::Any => 0,
            Field::Fixed(w) => w,
        }
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        if let Field::Fixed(m) = self.month {
            if date.month() != m {
                return false;
            }
        }
        if let Field::Fixed(d) = self.day_of_month {
            if date.day() != d {
                return false;
            }
        }
        if let Field::Fixed(w) = self.day_of_week {
            if date.weekday().num_days_from_sunday() != w {
                return false;
            }
        }
        true
    }

    fn minute_matches(&self, minute: u32) -> bool {
        match self.minute {
            MinuteField::Fixed(m) => minute == m,
            MinuteField::Step { start, step } => minute >= start && (minute - start) % step == 0,
        }
    }

    fn next_minute_at_or_after(&self, minute: u32) -> Option<u32> {
        match self.minute {
            MinuteField::Fixed(m) => (minute <= m).then_some(m),
            MinuteField::Step { start, step } => {
                let mut candidate = start;
                while candidate <= 59 {
                    if candidate >= minute {
                        return Some(candidate);
                    }
                    candidate += step;
                }
                None
            }
        }
    }

    fn prev_minute_at_or_before(&self, minute: u32) -> Option<u32> {
        match self.minute {
            MinuteField::Fixed(m) => (m <= minute).then_some(m),
            MinuteField::Step { start, step } => {
                let mut best = None;
                let mut candidate = start;
                while candidate <= 59 {
                    if candidate <= minute {
                        best = Some(candidate);
                    }
                    candidate += step;
                }
                best
            }
        }
    }

    /// Whether `t` (truncated to the minute) is an occurrence.
    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        let t = floor_minute(t);
        self.day_matches(t.date_naive())
            && match self.hour {
                Field::Any => true,
                Field::Fixed(h) => t.hour() == h,
            }
            && self.minute_matches(t.minute())
    }

    /// Earliest occurrence at or after `from`.
    pub fn next_at_or_after(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let mut t = ceil_minute(from);
        loop {
            if !self.day_matches(t.date_naive()) {
                t = day_start(t.date_naive() + Days::new(1));
                continue;
            }
            match self.hour {
                Field::Fixed(h) if t.hour() != h => {
                    if t.hour() < h {
                        t = day_start(t.date_naive()) + TimeDelta::hours(i64::from(h));
                    } else {
                        t = day_start(t.date_naive() + Days::new(1));
                    }
                }
                _ => match self.next_minute_at_or_after(t.minute()) {
                    Some(m) => return with_minute(t, m),
                    None => match self.hour {
                        // No matching minute left in the fixed hour: tomorrow.
                        Field::Fixed(_) => t = day_start(t.date_naive() + Days::new(1)),
                        Field::Any => t += TimeDelta::minutes(i64::from(60 - t.minute())),
                    },
                },
            }
        }
    }

    /// Earliest occurrence strictly after `t`.
    pub fn next_after(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        self.next_at_or_after(floor_minute(t) + TimeDelta::minutes(1))
    }

    /// Latest occurrence at or before `until`.
    pub fn prev_at_or_before(&self, until: DateTime<Utc>) -> DateTime<Utc> {
        let mut t = floor_minute(until);
        loop {
            if !self.day_matches(t.date_naive()) {
                t = day_start(t.date_naive()) - TimeDelta::minutes(1);
                continue;
            }
            match self.hour {
                Field::Fixed(h) if t.hour() != h => {
                    if t.hour() > h {
                        t = day_start(t.date_naive())
                            + TimeDelta::hours(i64::from(h))
                            + TimeDelta::minutes(59);
                    } else {
                        t = day_start(t.date_naive()) - TimeDelta::minutes(1);
                    }
                }
                _ => match self.prev_minute_at_or_before(t.minute()) {
                    Some(m) => return with_minute(t, m),
                    None => match self.hour {
                        Field::Fixed(_) => t = day_start(t.date_naive()) - TimeDelta::minutes(1),
                        Field::Any => t -= TimeDelta::minutes(i64::from(t.minute() + 1)),
                    },
                },
            }
        }
    }

    /// Latest occurrence strictly before `t`.
    pub fn prev_before(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let floored = floor_minute(t);
        if floored < t {
            self.prev_at_or_before(floored)
        } else {
            self.prev_at_or_before(floored - TimeDelta::minutes(1))
        }
    }

    /// All occurrences in `[start, end)`.
    ///
    /// The start is included when it is itself an occurrence; an occurrence
    /// exactly at `end` is dropped, since that boundary instant belongs to
    /// the next interval.
    pub fn occurrences_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let mut out = Vec::new();
        let mut t = self.next_at_or_after(start);
        while t < end {
            out.push(t);
            t = self.next_after(t);
        }
        out
    }

    /// Distance between two consecutive occurrences, measured after `anchor`.
    pub fn period_at(&self, anchor: DateTime<Utc>) -> TimeDelta {
        let first = self.next_after(anchor);
        self.next_after(first) - first
    }

    /// How many occurrences of `inner` fit into one of this expression's
    /// intervals, measured from the fixed [`reference_instant`] so the answer
    /// is deterministic.
    pub fn embeddings_number(&self, inner: &PeriodicExpr) -> usize {
        let start = self.next_after(reference_instant());
        let end = self.next_after(start);
        inner.occurrences_between(start, end).len()
    }
}

impl FromStr for PeriodicExpr {
    type Err = DagforgeError;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(DagforgeError::Schedule(format!(
                "expected 5 fields in expression, got {} in '{s}'",
                fields.len()
            )));
        }

        let minute = parse_minute_field(fields[0])?;
        let hour = parse_field(fields[1])?;
        let day_of_month = parse_field(fields[2])?;
        let month = parse_field(fields[3])?;
        let day_of_week = parse_field(fields[4])?;

        PeriodicExpr::new(minute, hour, day_of_month, month, day_of_week)
    }
}

impl fmt::Display for PeriodicExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minute {
            MinuteField::Fixed(m) => write!(f, "{m}")?,
            MinuteField::Step { start: 0, step } => write!(f, "*/{step}")?,
            MinuteField::Step { start, step } => write!(f, "{start}-59/{step}")?,
        }
        for field in [self.hour, self.day_of_month, self.month, self.day_of_week] {
            match field {
                Field::Any => write!(f, " *")?,
                Field::Fixed(v) => write!(f, " {v}")?,
            }
        }
        Ok(())
    }
}

fn parse_minute_field(s: &str) -> Result<MinuteField> {
    let caps = minute_field_re()
        .captures(s)
        .ok_or_else(|| DagforgeError::Schedule(format!("unsupported minute field '{s}'")))?;

    if let Some(step) = caps.name("bare_step") {
        return Ok(MinuteField::Step {
            start: 0,
            step: parse_u32(step.as_str())?,
        });
    }
    if let (Some(start), Some(step)) = (caps.name("start"), caps.name("step")) {
        return Ok(MinuteField::Step {
            start: parse_u32(start.as_str())?,
            step: parse_u32(step.as_str())?,
        });
    }
    if let Some(fixed) = caps.name("fixed") {
        return Ok(MinuteField::Fixed(parse_u32(fixed.as_str())?));
    }
    Err(DagforgeError::Schedule(format!(
        "unsupported minute field '{s}'"
    )))
}

fn parse_field(s: &str) -> Result<Field> {
    if s == "*" {
        return Ok(Field::Any);
    }
    Ok(Field::Fixed(parse_u32(s)?))
}

fn parse_u32(s: &str) -> Result<u32> {
    s.parse::<u32>()
        .map_err(|_| DagforgeError::Schedule(format!("expected a number, got '{s}'")))
}

/// Fixed anchor for deterministic period and embedding computations.
///
/// Mid-December: the next monthly interval is a 31-day January, so
/// day-granular embedding counts match the widest month.
pub fn reference_instant() -> DateTime<Utc> {
    // 2023-12-15T00:00:00Z
    DateTime::from_timestamp(1_702_598_400, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn floor_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

fn ceil_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    let floored = floor_minute(t);
    if floored < t {
        floored + TimeDelta::minutes(1)
    } else {
        floored
    }
}

fn with_minute(t: DateTime<Utc>, minute: u32) -> DateTime<Utc> {
    t - TimeDelta::minutes(i64::from(t.minute())) + TimeDelta::minutes(i64::from(minute))
}

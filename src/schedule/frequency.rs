// src/schedule/frequency.rs

//! Named schedule frequencies and intra-period shifts.
//!
//! A [`Frequency`] is one of a closed set of periodic levels; a
//! [`Schedule`] pairs a frequency with a [`Shift`], the fixed offset inside
//! one period. Out-of-range shifts are rejected, never clamped: a shift
//! equal to a full period is indistinguishable from no shift plus one
//! period, so it is an error rather than a silent wrap.

use std::fmt;
use std::str::FromStr;

use chrono::TimeDelta;
use serde::Serialize;

use crate::errors::{DagforgeError, Result};
use crate::schedule::expr::{reference_instant, Field, MinuteField, PeriodicExpr};

/// Closed set of schedule levels, declared in ascending period order so the
/// derived ordering matches the level ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Manual,
    Every15Minutes,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub const ALL: [Frequency; 6] = [
        Frequency::Manual,
        Frequency::Every15Minutes,
        Frequency::Hourly,
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Monthly,
    ];

    /// Ordering level; unique per frequency, manual is the sentinel bottom.
    pub fn level(&self) -> u8 {
        match self {
            Frequency::Manual => 0,
            Frequency::Every15Minutes => 1,
            Frequency::Hourly => 2,
            Frequency::Daily => 3,
            Frequency::Weekly => 4,
            Frequency::Monthly => 5,
        }
    }

    pub fn base_name(&self) -> &'static str {
        match self {
            Frequency::Manual => "@manual",
            Frequency::Every15Minutes => "@every15minutes",
            Frequency::Hourly => "@hourly",
            Frequency::Daily => "@daily",
            Frequency::Weekly => "@weekly",
            Frequency::Monthly => "@monthly",
        }
    }

    /// The unshifted periodic expression; `None` for manual.
    pub fn base_expression(&self) -> Option<PeriodicExpr> {
        let (minute, hour, day_of_month, day_of_week) = match self {
            Frequency::Manual => return None,
            Frequency::Every15Minutes => {
                (MinuteField::Step { start: 0, step: 15 }, Field::Any, Field::Any, Field::Any)
            }
            Frequency::Hourly => (MinuteField::Fixed(0), Field::Any, Field::Any, Field::Any),
            Frequency::Daily => (MinuteField::Fixed(0), Field::Fixed(0), Field::Any, Field::Any),
            Frequency::Weekly => (MinuteField::Fixed(0), Field::Fixed(0), Field::Any, Field::Fixed(0)),
            Frequency::Monthly => (MinuteField::Fixed(0), Field::Fixed(0), Field::Fixed(1), Field::Any),
        };
        PeriodicExpr::new(minute, hour, day_of_month, Field::Any, day_of_week).ok()
    }

    /// Time between two consecutive occurrences of the unshifted schedule,
    /// measured from the fixed reference instant; `None` for manual.
    pub fn period(&self) -> Option<TimeDelta> {
        self.base_expression()
            .map(|expr| expr.period_at(reference_instant()))
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Frequency::Manual)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_name())
    }
}

impl FromStr for Frequency {
    type Err = DagforgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches('@') {
            "manual" => Ok(Frequency::Manual),
            "every15minutes" => Ok(Frequency::Every15Minutes),
            "hourly" => Ok(Frequency::Hourly),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(DagforgeError::Config(format!(
                "unknown schedule frequency '{other}'"
            ))),
        }
    }
}

/// A time offset inside one period, normalized so minutes stay below 60 and
/// hours below 24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
pub struct Shift {
    days: u32,
    hours: u32,
    minutes: u32,
}

impl Shift {
    pub const ZERO: Shift = Shift { days: 0, hours: 0, minutes: 0 };

    pub fn new(days: u32, hours: u32, minutes: u32) -> Self {
        let hours = hours + minutes / 60;
        Shift {
            days: days + hours / 24,
            hours: hours % 24,
            minutes: minutes % 60,
        }
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn hours(&self) -> u32 {
        self.hours
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn total_minutes(&self) -> u32 {
        (self.days * 24 + self.hours) * 60 + self.minutes
    }

    pub fn is_zero(&self) -> bool {
        *self == Shift::ZERO
    }
}

/// A frequency plus its shift: the full description of one periodic
/// schedule. Ordering compares the frequency level first, then the shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Schedule {
    frequency: Frequency,
    shift: Shift,
}

impl Schedule {
    pub fn new(frequency: Frequency, shift: Shift) -> Result<Self> {
        let reject = |limit: &str| {
            Err(DagforgeError::Schedule(format!(
                "{} supports only shifts {limit}, got {}d {}h {}m",
                frequency.base_name(),
                shift.days,
                shift.hours,
                shift.minutes
            )))
        };

        match frequency {
            Frequency::Manual if !shift.is_zero() => {
                return Err(DagforgeError::Schedule(
                    "@manual accepts no shift".to_string(),
                ));
            }
            Frequency::Every15Minutes if shift.total_minutes() >= 15 => {
                return reject("under 15 minutes");
            }
            Frequency::Hourly if shift.total_minutes() >= 60 => {
                return reject("under 1 hour");
            }
            Frequency::Daily if shift.days > 0 => {
                return reject("under 24 hours");
            }
            Frequency::Weekly if shift.days > 6 => {
                return reject("under 7 days");
            }
            // The shifted day-of-month must exist in every month.
            Frequency::Monthly if shift.days > 27 => {
                return reject("of at most 27 days");
            }
            _ => {}
        }

        Ok(Schedule { frequency, shift })
    }

    /// The zero-shift schedule; always valid.
    pub fn unshifted(frequency: Frequency) -> Self {
        Schedule { frequency, shift: Shift::ZERO }
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn shift(&self) -> Shift {
        self.shift
    }

    pub fn is_manual(&self) -> bool {
        self.frequency.is_manual()
    }

    /// The shifted periodic expression; `None` for manual.
    pub fn expression(&self) -> Option<PeriodicExpr> {
        let Shift { days, hours, minutes } = self.shift;
        let expr = match self.frequency {
            Frequency::Manual => return None,
            Frequency::Every15Minutes => PeriodicExpr::new(
                MinuteField::Step { start: minutes, step: 15 },
                Field::Any,
                Field::Any,
                Field::Any,
                Field::Any,
            ),
            Frequency::Hourly => PeriodicExpr::new(
                MinuteField::Fixed(minutes),
                Field::Any,
                Field::Any,
                Field::Any,
                Field::Any,
            ),
            Frequency::Daily => PeriodicExpr::new(
                MinuteField::Fixed(minutes),
                Field::Fixed(hours),
                Field::Any,
                Field::Any,
                Field::Any,
            ),
            Frequency::Weekly => PeriodicExpr::new(
                MinuteField::Fixed(minutes),
                Field::Fixed(hours),
                Field::Any,
                Field::Any,
                Field::Fixed(days),
            ),
            Frequency::Monthly => PeriodicExpr::new(
                MinuteField::Fixed(minutes),
                Field::Fixed(hours),
                Field::Fixed(days + 1),
                Field::Any,
                Field::Any,
            ),
        };
        // Construction already bounded every component.
        expr.ok()
    }

    /// Human-readable name: the base name, suffixed with the non-zero shift
    /// components in descending unit order.
    pub fn name(&self) -> String {
        if self.shift.is_zero() {
            return self.frequency.base_name().to_string();
        }

        let parts: Vec<String> = [
            ("day", self.shift.days),
            ("hour", self.shift.hours),
            ("minute", self.shift.minutes),
        ]
        .iter()
        .filter(|(_, value)| *value > 0)
        .map(|(unit, value)| format!("{value}_{unit}s"))
        .collect();

        if parts.is_empty() {
            return self.frequency.base_name().to_string();
        }
        format!("{}_shift_{}", self.frequency.base_name(), parts.join("_"))
    }

    /// Tag-safe variant of [`Schedule::name`]: the `@` sigil becomes a
    /// `sched_` prefix.
    pub fn safe_name(&self) -> String {
        self.name().replacen('@', "sched_", 1)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequencies_are_totally_ordered_by_level() {
        assert!(
            Frequency::Manual < Frequency::Every15Minutes
                && Frequency::Every15Minutes < Frequency::Hourly
                && Frequency::Hourly < Frequency::Daily
                && Frequency::Daily < Frequency::Weekly
                && Frequency::Weekly < Frequency::Monthly
        );
        let mut levels: Vec<u8> = Frequency::ALL.iter().map(|f| f.level()).collect();
        levels.dedup();
        assert_eq!(levels.len(), Frequency::ALL.len());
    }

    #[test]
    fn periods_follow_levels() {
        assert_eq!(Frequency::Manual.period(), None);
        assert_eq!(Frequency::Every15Minutes.period(), Some(TimeDelta::minutes(15)));
        assert_eq!(Frequency::Hourly.period(), Some(TimeDelta::hours(1)));
        assert_eq!(Frequency::Daily.period(), Some(TimeDelta::days(1)));
        assert_eq!(Frequency::Weekly.period(), Some(TimeDelta::days(7)));
        assert_eq!(Frequency::Monthly.period(), Some(TimeDelta::days(31)));
    }

    #[test]
    fn manual_accepts_no_shift() {
        assert!(Schedule::new(Frequency::Manual, Shift::ZERO).is_ok());
        assert!(Schedule::new(Frequency::Manual, Shift::new(0, 0, 1)).is_err());
        assert_eq!(Schedule::unshifted(Frequency::Manual).expression(), None);
    }

    #[test]
    fn full_period_shifts_are_rejected() {
        assert!(Schedule::new(Frequency::Every15Minutes, Shift::new(0, 0, 15)).is_err());
        assert!(Schedule::new(Frequency::Hourly, Shift::new(0, 1, 0)).is_err());
        assert!(Schedule::new(Frequency::Hourly, Shift::new(0, 0, 60)).is_err());
        assert!(Schedule::new(Frequency::Daily, Shift::new(1, 0, 0)).is_err());
        assert!(Schedule::new(Frequency::Daily, Shift::new(0, 24, 0)).is_err());
        assert!(Schedule::new(Frequency::Weekly, Shift::new(7, 0, 0)).is_err());
        assert!(Schedule::new(Frequency::Monthly, Shift::new(28, 0, 0)).is_err());
    }

    #[test]
    fn in_range_shifts_build_expressions() {
        let cases = [
            (Frequency::Every15Minutes, Shift::new(0, 0, 14), "14-59/15 * * * *"),
            (Frequency::Hourly, Shift::new(0, 0, 30), "30 * * * *"),
            (Frequency::Hourly, Shift::new(0, 0, 59), "59 * * * *"),
            (Frequency::Daily, Shift::new(0, 1, 0), "0 1 * * *"),
            (Frequency::Daily, Shift::new(0, 23, 0), "0 23 * * *"),
            (Frequency::Weekly, Shift::new(3, 5, 22), "22 5 * * 3"),
            (Frequency::Monthly, Shift::new(3, 5, 22), "22 5 4 * *"),
        ];
        for (freq, shift, expected) in cases {
            let schedule = Schedule::new(freq, shift).unwrap();
            assert_eq!(schedule.expression().unwrap().to_string(), expected);
        }
    }

    #[test]
    fn base_expressions_match_the_canonical_strings() {
        let cases = [
            (Frequency::Every15Minutes, "*/15 * * * *"),
            (Frequency::Hourly, "0 * * * *"),
            (Frequency::Daily, "0 0 * * *"),
            (Frequency::Weekly, "0 0 * * 0"),
            (Frequency::Monthly, "0 0 1 * *"),
        ];
        for (freq, expected) in cases {
            assert_eq!(freq.base_expression().unwrap().to_string(), expected);
        }
    }

    #[test]
    fn shift_normalizes_carries() {
        let shift = Shift::new(0, 23, 61);
        assert_eq!((shift.days(), shift.hours(), shift.minutes()), (1, 0, 1));
        assert!(Schedule::new(Frequency::Daily, shift).is_err());
    }

    #[test]
    fn names_include_non_zero_components_only() {
        let named = |freq, shift| Schedule::new(freq, shift).unwrap().name();
        assert_eq!(named(Frequency::Hourly, Shift::ZERO), "@hourly");
        assert_eq!(named(Frequency::Hourly, Shift::new(0, 0, 22)), "@hourly_shift_22_minutes");
        assert_eq!(named(Frequency::Daily, Shift::new(0, 5, 0)), "@daily_shift_5_hours");
        assert_eq!(
            named(Frequency::Daily, Shift::new(0, 5, 22)),
            "@daily_shift_5_hours_22_minutes"
        );
        assert_eq!(
            named(Frequency::Weekly, Shift::new(3, 5, 22)),
            "@weekly_shift_3_days_5_hours_22_minutes"
        );
        assert_eq!(
            Schedule::unshifted(Frequency::Daily).safe_name(),
            "sched_daily"
        );
        assert_eq!(
            Schedule::new(Frequency::Hourly, Shift::new(0, 0, 5)).unwrap().safe_name(),
            "sched_hourly_shift_5_minutes"
        );
    }

    #[test]
    fn ordering_breaks_ties_on_shift() {
        let plain = Schedule::unshifted(Frequency::Hourly);
        let shifted = Schedule::new(Frequency::Hourly, Shift::new(0, 0, 30)).unwrap();
        assert!(plain < shifted);
        assert!(shifted < Schedule::unshifted(Frequency::Daily));
        assert!(Schedule::unshifted(Frequency::Manual) < plain);
    }

    #[test]
    fn shift_components_round_trip_through_expressions() {
        let cases = [
            (Frequency::Every15Minutes, Shift::new(0, 0, 7)),
            (Frequency::Hourly, Shift::new(0, 0, 45)),
            (Frequency::Daily, Shift::new(0, 16, 30)),
            (Frequency::Weekly, Shift::new(6, 23, 59)),
            (Frequency::Monthly, Shift::new(27, 23, 59)),
        ];
        for (freq, shift) in cases {
            let expr = Schedule::new(freq, shift).unwrap().expression().unwrap();
            let days = match freq {
                Frequency::Weekly => expr.day_of_week_component(),
                Frequency::Monthly => expr.day_of_month_component() - 1,
                _ => 0,
            };
            let recovered = Shift::new(days, expr.hour_component(), expr.minute_component());
            assert_eq!(recovered, shift, "{freq:?}");
        }
    }
}

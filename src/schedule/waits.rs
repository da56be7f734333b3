// src/schedule/waits.rs

//! Cross-frequency wait computation.
//!
//! Given a downstream execution instant and the two schedules on either
//! side of a cross-container dependency, compute which upstream execution
//! instants the downstream run must wait for. Two policies:
//!
//! - `last`: the single upstream instance whose data interval completes at
//!   or before the downstream run starts.
//! - `all`: every upstream instance inside the downstream's own data
//!   interval `[execution, interval_end)`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{DagforgeError, Result};
use crate::schedule::frequency::Schedule;

/// Per-dependency wait policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WaitPolicy {
    #[default]
    Last,
    All,
}

/// The instant-mapping parameter carried by one wait node: which upstream
/// execution instant to check, as a function of the downstream execution
/// instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaitFn {
    pub downstream: Schedule,
    pub upstream: Schedule,
    /// Index into the upstream occurrences of one downstream interval;
    /// `None` means the last qualifying occurrence.
    pub iteration: Option<usize>,
}

impl WaitFn {
    pub fn target_instant(&self, execution: DateTime<Utc>) -> Result<DateTime<Utc>> {
        wait_execution_instant(execution, self.downstream, self.upstream, self.iteration)
    }
}

/// Compute the upstream execution instant a downstream run at `execution`
/// must wait for.
///
/// Manual schedules carry no periodic expression and never participate in
/// cross-frequency waits; passing one is an error.
pub fn wait_execution_instant(
    execution: DateTime<Utc>,
    downstream: Schedule,
    upstream: Schedule,
    iteration: Option<usize>,
) -> Result<DateTime<Utc>> {
    let no_expr = |side: &str, schedule: Schedule| {
        DagforgeError::Schedule(format!(
            "{side} schedule {schedule} has no periodic expression; manual jobs cannot join waits"
        ))
    };
    let down_expr = downstream
        .expression()
        .ok_or_else(|| no_expr("downstream", downstream))?;
    let up_expr = upstream
        .expression()
        .ok_or_else(|| no_expr("upstream", upstream))?;

    let interval_end = down_expr.next_after(execution);

    if downstream.frequency().level() < upstream.frequency().level() {
        // Downstream ticks more often. Step back two occurrences strictly
        // before the interval end: the nearest upstream run's interval is
        // still open, so the one before it is the last complete instance.
        return Ok(up_expr.prev_before(up_expr.prev_before(interval_end)));
    }

    if downstream.frequency() == upstream.frequency() {
        if downstream.shift() == upstream.shift() {
            return Ok(execution);
        }
        return Ok(up_expr.prev_at_or_before(execution));
    }

    // Downstream ticks less often: enumerate the upstream occurrences in
    // this downstream interval.
    let instants = up_expr.occurrences_between(execution, interval_end);
    match iteration {
        None => instants.last().copied().ok_or_else(|| {
            DagforgeError::Schedule(format!(
                "no {upstream} occurrence inside the {downstream} interval starting {execution}"
            ))
        }),
        Some(i) => instants.get(i).copied().ok_or_else(|| {
            DagforgeError::Schedule(format!(
                "iteration {i} out of range: {} {upstream} occurrences inside the {downstream} \
                 interval starting {execution}",
                instants.len()
            ))
        }),
    }
}

/// Lookup table mapping a (downstream, upstream, policy) triple to the set
/// of wait functions an edge needs.
///
/// Constructed once per compilation and handed to the graph builder; the
/// embedded per-frequency-pair occurrence counts are a pure cache and can
/// be rebuilt at any time.
#[derive(Debug, Default)]
pub struct WaitIndex {
    embeddings: HashMap<(&'static str, &'static str), usize>,
}

impl WaitIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`WaitFn`] per wait node the edge requires.
    ///
    /// `last` always yields exactly one. `all` yields one per upstream
    /// occurrence inside a downstream interval when the upstream is
    /// faster, pre-sized from the unshifted frequency pair; otherwise it
    /// degenerates to the single last-qualifying instance.
    pub fn wait_fns(
        &mut self,
        downstream: Schedule,
        upstream: Schedule,
        policy: WaitPolicy,
    ) -> Result<Vec<WaitFn>> {
        if downstream.is_manual() || upstream.is_manual() {
            return Err(DagforgeError::Schedule(format!(
                "cannot build waits between {downstream} and {upstream}: manual schedules have no \
                 periodic expression"
            )));
        }

        let single = |iteration| {
            vec![WaitFn {
                downstream,
                upstream,
                iteration,
            }]
        };

        match policy {
            WaitPolicy::Last => Ok(single(None)),
            WaitPolicy::All => {
                if upstream.frequency().level() >= downstream.frequency().level() {
                    return Ok(single(None));
                }
                let count = self.embeddings(downstream, upstream)?;
                if count <= 1 {
                    return Ok(single(None));
                }
                Ok((0..count)
                    .map(|iteration| WaitFn {
                        downstream,
                        upstream,
                        iteration: Some(iteration),
                    })
                    .collect())
            }
        }
    }

    fn embeddings(&mut self, downstream: Schedule, upstream: Schedule) -> Result<usize> {
        let key = (
            downstream.frequency().base_name(),
            upstream.frequency().base_name(),
        );
        if let Some(count) = self.embeddings.get(&key) {
            return Ok(*count);
        }

        let outer = downstream.frequency().base_expression().ok_or_else(|| {
            DagforgeError::Schedule(format!("{downstream} has no periodic expression"))
        })?;
        let inner = upstream.frequency().base_expression().ok_or_else(|| {
            DagforgeError::Schedule(format!("{upstream} has no periodic expression"))
        })?;

        let count = outer.embeddings_number(&inner);
        self.embeddings.insert(key, count);
        Ok(count)
    }
}

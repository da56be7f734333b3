// src/schedule/mod.rs

//! Calendar model: frequencies, shifts, periodic expressions, and the
//! cross-frequency wait calculator.
//!
//! - [`frequency`] defines the closed set of schedule levels and the
//!   shifted [`Schedule`] pairs built from them.
//! - [`expr`] is the 5-field recurrence engine (next/previous occurrence,
//!   interval enumeration, period derivation).
//! - [`waits`] maps a downstream execution instant to the upstream
//!   instants it must wait for, per frequency pair and policy.

pub mod expr;
pub mod frequency;
pub mod waits;

pub use expr::PeriodicExpr;
pub use frequency::{Frequency, Schedule, Shift};
pub use waits::{wait_execution_instant, WaitFn, WaitIndex, WaitPolicy};

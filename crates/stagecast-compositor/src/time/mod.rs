//! Time subsystem.
//!
//! The render scheduler never reads the wall clock itself; callers pass `now` into
//! `Scheduler::tick`. A [`Clock`] is the usual source of that value:
//! - [`SystemClock`] for the display-refresh driven loop
//! - [`ManualClock`] for tests that step time by hand

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

//! Directors
//!
//! A director owns the scheduler, the fixed-point engine and the clock, and
//! drives a [`Network`](crate::network::Network) through its iterations.

mod composite;
mod continuous;
mod engine;
mod fixed_point;
mod realtime;

pub use composite::CompositeActor;
pub use continuous::ContinuousDirector;
pub use engine::{FixedPoint, FixedPointEngine, StopHandle};
pub use fixed_point::FixedPointDirector;
pub use realtime::RealTimeSync;

use serde::Serialize;

use crate::time::SuperdenseTime;

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    /// Committed iterations
    pub iterations: usize,
    /// `fire` invocations
    pub firings: usize,
    /// Fixed-point passes over the schedule
    pub passes: usize,
    /// Continuous steps rejected as inaccurate
    pub rejected_steps: usize,
    /// Model time after the last iteration
    pub final_time: SuperdenseTime,
}

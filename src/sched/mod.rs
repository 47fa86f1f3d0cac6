//! Static scheduling

mod schedule;
mod scheduler;

pub use schedule::{Firing, FiringCursor, NodeId, Schedule};
pub use scheduler::{CausalityGraph, Scheduler};

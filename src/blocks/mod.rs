//! Library actors

mod delay;
pub mod integrator;
mod math;
mod scope;
mod sources;

pub use delay::Pre;
pub use integrator::Integrator;
pub use math::{Add, Function, Scale};
pub use scope::Recorder;
pub use sources::{Const, CurrentTime, DiscreteClock};

//! FixSim - deterministic fixed-point and continuous-time execution kernel
//!
//! Actors are connected into a [`Network`](network::Network) through
//! single-source receivers whose values move monotonically from unknown to
//! known (absent or present). A director drives the network through
//! iterations:
//!
//! - [`FixedPointDirector`](director::FixedPointDirector) gives
//!   synchronous-reactive semantics: every tick fires the actors until the
//!   known receivers stop changing, then commits.
//! - [`ContinuousDirector`](director::ContinuousDirector) adds superdense
//!   time and a round-based ODE solver. Each solver round is a full fixed
//!   point; steps are checked for accuracy, refined and rolled back, and
//!   discrete phases are inserted at breakpoints requested through
//!   `fire_at`.
//!
//! # Example
//!
//! ```rust,ignore
//! use fixsim::prelude::*;
//!
//! let mut net = Network::new();
//! let one = net.add_actor("one", Const::new(1.0));
//! let x = net.add_actor("x", Integrator::new(0.0));
//! net.connect(one, 0, x, integrator::DERIVATIVE)?;
//!
//! let settings = ContinuousSettings {
//!     solver: SolverType::ForwardEuler,
//!     stop_time: Some(1.0),
//!     ..Default::default()
//! };
//! let mut director = ContinuousDirector::new(settings)?;
//! director.run(&mut net)?;
//! ```

pub mod actor;
pub mod blocks;
pub mod director;
pub mod error;
pub mod hybrid;
pub mod network;
pub mod receiver;
pub mod sched;
pub mod solvers;
pub mod time;
pub mod token;
pub mod utils;

pub use fixsim_types as types;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::actor::{
        Actor, ActorContext, ContinuousStatefulComponent, ContinuousStepSizeController, StepInfo,
    };
    pub use crate::blocks::*;
    pub use crate::director::{
        CompositeActor, ContinuousDirector, FixedPointDirector, RunStats, StopHandle,
    };
    pub use crate::error::{KernelError, ReceiverError};
    pub use crate::hybrid::{ModalModel, Mode, Relation, RelationKind, Transition};
    pub use crate::network::{ActorId, Network};
    pub use crate::receiver::SignalStatus;
    pub use crate::time::SuperdenseTime;
    pub use crate::token::Token;
    pub use fixsim_types::{
        ContinuousSettings, CyclePolicy, FixedPointSettings, KernelSettings, SolverType,
    };
}

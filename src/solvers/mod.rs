//! ODE solvers
//!
//! Solvers are round-based: the continuous director evaluates the model once
//! per round and each integrator hands its derivative sample to the solver.
//!
//! # Explicit
//! - `ForwardEuler` (1st order, fixed step)
//! - `ExplicitRK23` (Bogacki-Shampine 3(2), adaptive)
//! - `ExplicitRK45` (Cash-Karp 5(4), adaptive)
//!
//! # Implicit
//! - `BackwardEuler` (1st order, fixed-point corrector iteration)

mod backward_euler;
mod base;
mod explicit;

pub use backward_euler::BackwardEuler;
pub use base::{step_scale, IntegratorState, RoundSolver, Rounds, Solver};
pub use explicit::{ExplicitRungeKutta, Tableau};

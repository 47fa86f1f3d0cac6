//! Round-based solver abstraction
//!
//! A continuous step is executed as a sequence of rounds. In every round the
//! director runs the fixed-point engine at a local time `t + fraction * h`,
//! and each integrator feeds the derivative it observed to the solver, which
//! updates the integrator's tentative state. The solver itself is stateless;
//! all per-integrator data lives in [`IntegratorState`].

use std::fmt;

use fixsim_types::SolverType;

use super::backward_euler::BackwardEuler;
use super::explicit::ExplicitRungeKutta;
use crate::utils::constants::{SOL_BETA, SOL_SCALE_MAX, SOL_SCALE_MIN, TOLERANCE};

/// Committed and speculative state of one integrator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegratorState {
    /// Last accuracy-confirmed value
    pub committed: f64,
    /// Value of the step being attempted
    pub tentative: f64,
    /// Derivative samples of the current step, one per stage
    pub aux: Vec<f64>,
    /// Size of the last implicit correction
    pub correction: f64,
}

impl IntegratorState {
    pub fn new(initial: f64) -> Self {
        Self {
            committed: initial,
            tentative: initial,
            aux: Vec::new(),
            correction: 0.0,
        }
    }

    /// Accept the tentative value
    pub fn commit(&mut self) {
        self.committed = self.tentative;
        self.correction = 0.0;
    }

    /// Discard the tentative value
    pub fn roll_back(&mut self) {
        self.tentative = self.committed;
        self.correction = 0.0;
    }

    /// Overwrite both values, used by resets and impulses
    pub fn set(&mut self, value: f64) {
        self.committed = value;
        self.tentative = value;
    }

    pub(crate) fn ensure_aux(&mut self, count: usize) {
        if self.aux.len() < count {
            self.aux.resize(count, 0.0);
        }
    }
}

/// How many rounds a step takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounds {
    /// Explicit methods: a fixed number of rounds
    Fixed(usize),
    /// Implicit methods: iterate until the corrections settle, bounded by
    /// the director's maximum iterations
    UntilConverged,
}

/// Capability interface of a round-based ODE solver
pub trait RoundSolver: fmt::Debug + Send + Sync {
    fn solver_type(&self) -> SolverType;

    /// Order of the propagated solution
    fn order(&self) -> usize;

    fn rounds(&self) -> Rounds;

    /// Fraction of the step size at which `round` is evaluated
    fn time_fraction(&self, round: usize) -> f64;

    /// Number of derivative samples kept per integrator
    fn aux_variable_count(&self) -> usize;

    /// Solvers without an error estimate run at the initial step size
    fn is_fixed_step(&self) -> bool;

    /// Combine the derivative observed in `round` into the tentative state
    fn integrate(&self, round: usize, step: f64, derivative: f64, state: &mut IntegratorState);

    /// Absolute local truncation error of the attempted step, if estimated
    fn local_error(&self, step: f64, state: &IntegratorState) -> Option<f64>;

    /// Order of the embedded error estimate
    fn error_order(&self) -> usize {
        self.order()
    }

    /// Whether implicit iterations on this state have settled
    fn is_converged(&self, _state: &IntegratorState, _value_resolution: f64) -> bool {
        true
    }
}

/// Step size scale from the error controller
///
/// `0.9 / (err/tol)^(1/(q+1))`, clamped to `[0.1, 10]`.
pub fn step_scale(error: f64, tolerance: f64, error_order: usize) -> f64 {
    let error_norm = (error / tolerance.max(TOLERANCE)).max(TOLERANCE);
    let scale = SOL_BETA / error_norm.powf(1.0 / (error_order as f64 + 1.0));
    scale.clamp(SOL_SCALE_MIN, SOL_SCALE_MAX)
}

/// The built-in solvers
#[derive(Debug, Clone)]
pub enum Solver {
    Explicit(ExplicitRungeKutta),
    Implicit(BackwardEuler),
}

impl Solver {
    pub fn new(solver_type: SolverType) -> Self {
        match solver_type {
            SolverType::ForwardEuler => Solver::Explicit(ExplicitRungeKutta::forward_euler()),
            SolverType::ExplicitRK23 => Solver::Explicit(ExplicitRungeKutta::rk23()),
            SolverType::ExplicitRK45 => Solver::Explicit(ExplicitRungeKutta::rk45()),
            SolverType::BackwardEuler => Solver::Implicit(BackwardEuler),
        }
    }

    fn inner(&self) -> &dyn RoundSolver {
        match self {
            Solver::Explicit(s) => s,
            Solver::Implicit(s) => s,
        }
    }

    pub fn solver_type(&self) -> SolverType {
        self.inner().solver_type()
    }

    pub fn rounds(&self) -> Rounds {
        self.inner().rounds()
    }

    pub fn time_fraction(&self, round: usize) -> f64 {
        self.inner().time_fraction(round)
    }

    pub fn is_fixed_step(&self) -> bool {
        self.inner().is_fixed_step()
    }

    pub fn integrate(&self, round: usize, step: f64, derivative: f64, state: &mut IntegratorState) {
        self.inner().integrate(round, step, derivative, state)
    }

    pub fn is_converged(&self, state: &IntegratorState, value_resolution: f64) -> bool {
        self.inner().is_converged(state, value_resolution)
    }

    /// Whether the attempted step stays within `tolerance`
    pub fn is_accurate(&self, step: f64, tolerance: f64, state: &IntegratorState) -> bool {
        self.inner()
            .local_error(step, state)
            .map_or(true, |error| error <= tolerance)
    }

    /// Next step size this integrator can afford; unbounded for fixed-step solvers
    pub fn suggested_step_size(&self, step: f64, tolerance: f64, state: &IntegratorState) -> f64 {
        let solver = self.inner();
        match solver.local_error(step, state) {
            Some(error) if step > 0.0 => step * step_scale(error, tolerance, solver.error_order()),
            _ => f64::INFINITY,
        }
    }
}

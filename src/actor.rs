//! Actor contract
//!
//! An actor is fired by a director through `prefire`, `fire` and `postfire`.
//! Under the fixed-point semantics `fire` may run several times per
//! iteration, so it must only refine what it has already produced: outputs
//! go from unknown to known and never change afterwards. State updates belong
//! in `postfire`, which runs once per iteration after the fixed point has
//! been reached.

use std::any::Any;

use crate::error::{KernelError, ReceiverError};
use crate::network::ActorPorts;
use crate::receiver::ReceiverTable;
use crate::solvers::Solver;
use crate::time::{SuperdenseClock, SuperdenseTime};
use crate::token::Token;

/// Upcast helper for downcasting actors back to their concrete type
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Core actor trait
///
/// Ports are indexed from zero. Unconnected inputs read as absent.
pub trait Actor: AsAny + Send + Sync {
    /// Number of input ports
    fn num_inputs(&self) -> usize;

    /// Number of output ports
    fn num_outputs(&self) -> usize;

    fn input_name(&self, port: usize) -> String {
        format!("input{port}")
    }

    fn output_name(&self, port: usize) -> String {
        format!("output{port}")
    }

    /// Called once before the first iteration of a run
    fn initialize(&mut self, _ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        Ok(())
    }

    /// Whether the actor is ready to fire; false declines this iteration
    fn prefire(&mut self, _ctx: &mut ActorContext<'_>) -> Result<bool, KernelError> {
        Ok(true)
    }

    /// Produce outputs from the inputs known so far
    fn fire(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError>;

    /// Commit state; returning false finishes the actor for the rest of the run
    fn postfire(&mut self, _ctx: &mut ActorContext<'_>) -> Result<bool, KernelError> {
        Ok(true)
    }

    /// Called once at the end of a run
    fn wrapup(&mut self) {}

    /// Strict actors fire only once all their inputs are known
    fn is_strict(&self) -> bool {
        true
    }

    /// Whether `fire` is a pure function of the inputs
    fn is_fire_functional(&self) -> bool {
        true
    }

    /// Whether `output` depends on `input` within the same instant
    fn output_depends_on_input(&self, _input: usize, _output: usize) -> bool {
        true
    }

    fn as_stateful(&mut self) -> Option<&mut dyn ContinuousStatefulComponent> {
        None
    }

    fn as_step_size_controller(&mut self) -> Option<&mut dyn ContinuousStepSizeController> {
        None
    }
}

/// Parameters of the continuous step being executed
#[derive(Debug, Clone, Copy)]
pub struct StepInfo<'a> {
    /// Size of the attempted step, zero for a discrete phase
    pub step_size: f64,
    /// Solver round within the step
    pub round: usize,
    pub solver: &'a Solver,
    pub error_tolerance: f64,
    pub value_resolution: f64,
}

impl StepInfo<'_> {
    /// True in a discrete phase, where time does not advance
    pub fn is_discrete(&self) -> bool {
        self.step_size == 0.0
    }
}

/// An actor with tentative state that can be discarded
pub trait ContinuousStatefulComponent {
    /// Restore the tentative state from the committed one
    fn roll_back_to_committed_state(&mut self);

    /// Whether the implicit iteration on this component has settled
    fn is_state_resolved(&mut self, _solver: &Solver, _value_resolution: f64) -> bool {
        true
    }
}

/// An actor that takes part in step size control
///
/// Rollback after an inaccurate step goes through
/// [`ContinuousStatefulComponent`].
pub trait ContinuousStepSizeController {
    /// Whether the step just attempted was accurate enough
    fn is_step_size_accurate(&mut self, step: &StepInfo<'_>) -> bool;

    /// Step size to retry with after an inaccurate step
    fn refined_step_size(&mut self, step: &StepInfo<'_>) -> f64;

    /// Step size this actor can afford next, infinite for no constraint
    fn suggested_step_size(&mut self, step: &StepInfo<'_>) -> f64;
}

/// Everything an actor can see and do while it is being invoked
pub struct ActorContext<'a> {
    pub(crate) name: &'a str,
    pub(crate) ports: &'a ActorPorts,
    pub(crate) receivers: &'a mut ReceiverTable,
    pub(crate) clock: &'a mut SuperdenseClock,
    pub(crate) step: Option<StepInfo<'a>>,
}

impl<'a> ActorContext<'a> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn num_inputs(&self) -> usize {
        self.ports.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.ports.outputs.len()
    }

    /// Whether input `port` is known; unconnected ports always are
    pub fn is_known(&self, port: usize) -> bool {
        self.ports
            .inputs
            .get(port)
            .map_or(true, |&id| self.receivers.get(id).is_known())
    }

    pub fn all_inputs_known(&self) -> bool {
        (0..self.num_inputs()).all(|port| self.is_known(port))
    }

    /// The token on input `port`, `None` when absent; fails while unknown
    pub fn get(&self, port: usize) -> Result<Option<Token>, KernelError> {
        let id = *self
            .ports
            .inputs
            .get(port)
            .ok_or_else(|| self.out_of_range("input", port))?;
        self.receivers
            .get(id)
            .get()
            .map(|token| token.cloned())
            .map_err(|source| KernelError::UnreadableInput {
                actor: self.name.to_string(),
                port: self.ports.input_names[port].clone(),
                source,
            })
    }

    /// Numeric view of input `port`
    pub fn get_f64(&self, port: usize) -> Result<Option<f64>, KernelError> {
        match self.get(port)? {
            Some(token) => token
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.error(format!("non-numeric token {token} on input {port}"))),
            None => Ok(None),
        }
    }

    pub fn has_token(&self, port: usize) -> Result<bool, KernelError> {
        Ok(self.get(port)?.is_some())
    }

    /// Whether every destination of output `port` is known
    pub fn is_output_known(&self, port: usize) -> bool {
        match self.ports.outputs.get(port) {
            Some(targets) => targets.iter().all(|&id| self.receivers.get(id).is_known()),
            None => true,
        }
    }

    /// Send `token` to every destination of output `port`
    pub fn put(&mut self, port: usize, token: impl Into<Token>) -> Result<(), KernelError> {
        let token = token.into();
        let ports = self.ports;
        let targets = ports
            .outputs
            .get(port)
            .ok_or_else(|| self.out_of_range("output", port))?;
        for &id in targets {
            if let Err(e) = self.receivers.put(id, token.clone()) {
                return Err(self.violation(port, e));
            }
        }
        Ok(())
    }

    /// Assert that output `port` is absent
    pub fn clear(&mut self, port: usize) -> Result<(), KernelError> {
        let ports = self.ports;
        let targets = ports
            .outputs
            .get(port)
            .ok_or_else(|| self.out_of_range("output", port))?;
        for &id in targets {
            if let Err(e) = self.receivers.clear(id) {
                return Err(self.violation(port, e));
            }
        }
        Ok(())
    }

    /// Put `token` if present, clear otherwise
    pub fn send(&mut self, port: usize, token: Option<Token>) -> Result<(), KernelError> {
        match token {
            Some(token) => self.put(port, token),
            None => self.clear(port),
        }
    }

    pub fn model_time(&self) -> SuperdenseTime {
        self.clock.current()
    }

    /// Request a firing at `(time, index)`; returns the point scheduled
    pub fn fire_at(&mut self, time: f64, index: u64) -> Result<SuperdenseTime, KernelError> {
        self.clock.fire_at(self.name, time, index)
    }

    /// The continuous step being executed, `None` under a discrete director
    pub fn step(&self) -> Option<StepInfo<'a>> {
        self.step
    }

    /// Actor-level failure tagged with this actor's name
    pub fn error(&self, message: impl Into<String>) -> KernelError {
        KernelError::actor(self.name, message)
    }

    fn out_of_range(&self, direction: &'static str, port: usize) -> KernelError {
        KernelError::PortOutOfRange {
            actor: self.name.to_string(),
            direction,
            port,
        }
    }

    fn violation(&self, port: usize, error: ReceiverError) -> KernelError {
        KernelError::Monotonicity {
            actor: self.name.to_string(),
            detail: format!("output '{}': {error}", self.ports.output_names[port]),
        }
    }
}

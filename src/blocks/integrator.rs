//! Integrator block: dx/dt = u

use crate::actor::{
    Actor, ActorContext, ContinuousStatefulComponent, ContinuousStepSizeController, StepInfo,
};
use crate::error::KernelError;
use crate::solvers::{IntegratorState, Solver};
use crate::utils::constants::STEP_REFINE_FACTOR;

/// Input port carrying the derivative
pub const DERIVATIVE: usize = 0;
/// Input port adding a jump to the state
pub const IMPULSE: usize = 1;
/// Input port overwriting the state
pub const INITIAL_STATE: usize = 2;

/// Integrator: dx/dt = u
///
/// The output is the state at the local time of the current solver round,
/// so it can be emitted before the derivative is known. That makes the
/// integrator non-strict and lets it close algebraic feedback loops. The
/// derivative sample of each round is handed to the solver exactly once.
///
/// `impulse` and `initialState` may only be present in a discrete phase; a
/// reset is applied before the impulse.
///
/// # Example
///
/// ```ignore
/// let one = net.add_actor("one", Const::new(1.0));
/// let x = net.add_actor("x", Integrator::new(0.0));
/// net.connect(one, 0, x, DERIVATIVE)?;
/// ```
#[derive(Debug, Clone)]
pub struct Integrator {
    initial: f64,
    state: IntegratorState,
    // round whose output has been emitted / whose derivative was consumed
    emitted: Option<usize>,
    integrated: Option<usize>,
    accurate: bool,
}

impl Integrator {
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            state: IntegratorState::new(initial),
            emitted: None,
            integrated: None,
            accurate: true,
        }
    }

    /// Last committed value
    pub fn value(&self) -> f64 {
        self.state.committed
    }

    /// Value of the step being attempted
    pub fn tentative(&self) -> f64 {
        self.state.tentative
    }

    pub fn state(&self) -> &IntegratorState {
        &self.state
    }

    fn clear_markers(&mut self) {
        self.emitted = None;
        self.integrated = None;
    }

    fn emit(&mut self, ctx: &mut ActorContext<'_>, round: usize, discrete: bool) -> Result<(), KernelError> {
        let reset = ctx.get_f64(INITIAL_STATE)?;
        let impulse = ctx.get_f64(IMPULSE)?;
        if !discrete && (reset.is_some() || impulse.is_some()) {
            return Err(ctx.error(format!(
                "impulse or reset at {} during a continuous step",
                ctx.model_time()
            )));
        }
        if let Some(value) = reset {
            self.state.tentative = value;
        }
        if let Some(jump) = impulse {
            self.state.tentative += jump;
        }
        self.emitted = Some(round);
        ctx.put(0, self.state.tentative)
    }
}

impl Actor for Integrator {
    fn num_inputs(&self) -> usize {
        3
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn input_name(&self, port: usize) -> String {
        match port {
            DERIVATIVE => "derivative".into(),
            IMPULSE => "impulse".into(),
            INITIAL_STATE => "initialState".into(),
            _ => format!("input{port}"),
        }
    }

    fn output_name(&self, _port: usize) -> String {
        "state".into()
    }

    fn initialize(&mut self, _ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        self.state = IntegratorState::new(self.initial);
        self.clear_markers();
        self.accurate = true;
        Ok(())
    }

    /// Ready once impulse and reset are known
    fn prefire(&mut self, ctx: &mut ActorContext<'_>) -> Result<bool, KernelError> {
        Ok(ctx.is_known(IMPULSE) && ctx.is_known(INITIAL_STATE))
    }

    fn fire(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        let step = ctx.step();
        let round = step.map_or(0, |s| s.round);
        let discrete = step.map_or(true, |s| s.is_discrete());

        if self.emitted != Some(round) {
            self.emit(ctx, round, discrete)?;
        }

        let Some(step) = step.filter(|s| !s.is_discrete()) else {
            return Ok(());
        };
        if self.integrated == Some(round) || !ctx.is_known(DERIVATIVE) {
            return Ok(());
        }
        let derivative = ctx
            .get_f64(DERIVATIVE)?
            .ok_or_else(|| ctx.error("derivative is absent during a continuous step"))?;
        if !derivative.is_finite() {
            return Err(ctx.error(format!(
                "non-finite derivative {derivative} at {}",
                ctx.model_time()
            )));
        }
        step.solver
            .integrate(round, step.step_size, derivative, &mut self.state);
        self.integrated = Some(round);
        Ok(())
    }

    fn postfire(&mut self, _ctx: &mut ActorContext<'_>) -> Result<bool, KernelError> {
        self.state.commit();
        self.clear_markers();
        Ok(true)
    }

    fn is_strict(&self) -> bool {
        false
    }

    fn output_depends_on_input(&self, input: usize, _output: usize) -> bool {
        input != DERIVATIVE
    }

    fn as_stateful(&mut self) -> Option<&mut dyn ContinuousStatefulComponent> {
        Some(self)
    }

    fn as_step_size_controller(&mut self) -> Option<&mut dyn ContinuousStepSizeController> {
        Some(self)
    }
}

impl ContinuousStatefulComponent for Integrator {
    fn roll_back_to_committed_state(&mut self) {
        self.state.roll_back();
        self.clear_markers();
    }

    fn is_state_resolved(&mut self, solver: &Solver, value_resolution: f64) -> bool {
        solver.is_converged(&self.state, value_resolution)
    }
}

impl ContinuousStepSizeController for Integrator {
    fn is_step_size_accurate(&mut self, step: &StepInfo<'_>) -> bool {
        self.accurate = step.is_discrete()
            || step
                .solver
                .is_accurate(step.step_size, step.error_tolerance, &self.state);
        self.accurate
    }

    fn refined_step_size(&mut self, step: &StepInfo<'_>) -> f64 {
        if self.accurate {
            return step.step_size;
        }
        let suggested =
            step.solver
                .suggested_step_size(step.step_size, step.error_tolerance, &self.state);
        suggested.min(STEP_REFINE_FACTOR * step.step_size)
    }

    fn suggested_step_size(&mut self, step: &StepInfo<'_>) -> f64 {
        if step.is_discrete() {
            return f64::INFINITY;
        }
        step.solver
            .suggested_step_size(step.step_size, step.error_tolerance, &self.state)
    }
}

//! Hierarchical composition
//!
//! A [`CompositeActor`] wraps an inner network with its own fixed-point
//! engine. It is non-strict: every time the outer engine fires it, the
//! newly known outer inputs are pushed inward, the inner fixed point is
//! re-run, and whatever the inner network has resolved is pushed outward.
//! Each solver round of the outer director starts a fresh inner fixed point.
//! Breakpoints requested inside are forwarded to the outer director.

use fixsim_types::CyclePolicy;

use super::engine::{FixedPointEngine, StopHandle};
use crate::actor::{
    Actor, ActorContext, ContinuousStatefulComponent, ContinuousStepSizeController, StepInfo,
};
use crate::error::KernelError;
use crate::network::{ActorId, Network};
use crate::sched::Scheduler;
use crate::solvers::Solver;
use crate::time::SuperdenseClock;
use crate::utils::constants::DEFAULT_TIME_RESOLUTION;

/// Actor backed by a nested network
#[derive(Debug)]
pub struct CompositeActor {
    inner: Network,
    scheduler: Scheduler,
    engine: FixedPointEngine,
    clock: SuperdenseClock,
    // outer solver round the inner receivers belong to
    round: Option<usize>,
}

impl CompositeActor {
    /// Wrap `inner`; its exposed ports become the composite's ports
    pub fn new(inner: Network) -> Self {
        Self::with_policy(inner, CyclePolicy::default())
    }

    pub fn with_policy(inner: Network, policy: CyclePolicy) -> Self {
        Self {
            inner,
            scheduler: Scheduler::new(policy),
            engine: FixedPointEngine::new(StopHandle::new()),
            clock: SuperdenseClock::new(DEFAULT_TIME_RESOLUTION),
            round: None,
        }
    }

    pub fn inner(&self) -> &Network {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut Network {
        &mut self.inner
    }

    fn inner_ids(&self) -> Vec<ActorId> {
        self.inner.actor_ids().to_vec()
    }

    fn forward_breakpoints(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        let requested: Vec<_> = self.clock.breakpoints().iter().copied().collect();
        self.clock.breakpoints_mut().clear();
        for point in requested {
            ctx.fire_at(point.time, point.index)?;
        }
        Ok(())
    }

    fn sync_clock(&mut self, ctx: &ActorContext<'_>) {
        self.clock.set_current_point(ctx.model_time());
    }
}

impl Actor for CompositeActor {
    fn num_inputs(&self) -> usize {
        self.inner.num_exposed_inputs()
    }

    fn num_outputs(&self) -> usize {
        self.inner.num_exposed_outputs()
    }

    fn initialize(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        self.engine.initialize(&mut self.inner);
        self.round = None;
        self.clock.reset(ctx.model_time().time);
        self.sync_clock(ctx);

        let order = self.scheduler.schedule(&self.inner)?.actors();
        self.clock.set_initializing(true);
        let result = order.into_iter().try_for_each(|id| {
            self.inner
                .invoke(id, &mut self.clock, None, |actor, inner| actor.initialize(inner))
        });
        self.clock.set_initializing(false);
        result?;
        self.forward_breakpoints(ctx)
    }

    fn prefire(&mut self, ctx: &mut ActorContext<'_>) -> Result<bool, KernelError> {
        let round = ctx.step().map_or(0, |s| s.round);
        if self.round != Some(round) {
            // also returns the driven external inputs to unknown
            self.engine.begin_iteration(&mut self.inner);
            self.round = Some(round);
        }
        self.sync_clock(ctx);
        Ok(true)
    }

    fn fire(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        self.sync_clock(ctx);
        for port in 0..self.num_inputs() {
            if ctx.is_known(port) && !self.inner.is_external_known(port) {
                let token = ctx.get(port)?;
                self.inner
                    .drive_external(port, token.as_ref())
                    .map_err(|e| ctx.error(format!("inner input {port}: {e}")))?;
            }
        }

        let schedule = self.scheduler.schedule(&self.inner)?;
        let fixed_point = self
            .engine
            .fire(&mut self.inner, schedule, &mut self.clock, ctx.step())?;
        if fixed_point.stopped {
            return Ok(());
        }

        for port in 0..self.num_outputs() {
            if ctx.is_output_known(port) {
                continue;
            }
            let Some(tap) = self.inner.tap(port) else {
                continue;
            };
            if tap.is_known() {
                let token = tap
                    .get()
                    .map_err(|e| ctx.error(format!("inner output {port}: {e}")))?
                    .cloned();
                ctx.send(port, token)?;
            }
        }
        Ok(())
    }

    fn postfire(&mut self, ctx: &mut ActorContext<'_>) -> Result<bool, KernelError> {
        self.sync_clock(ctx);
        let schedule = self.scheduler.schedule(&self.inner)?;
        let continuing = self
            .engine
            .commit(&mut self.inner, schedule, &mut self.clock, ctx.step())?;
        self.round = None;
        self.forward_breakpoints(ctx)?;
        Ok(continuing)
    }

    fn wrapup(&mut self) {
        self.inner.wrapup();
    }

    fn is_strict(&self) -> bool {
        false
    }

    fn is_fire_functional(&self) -> bool {
        self.inner.all_fire_functional()
    }

    fn as_stateful(&mut self) -> Option<&mut dyn ContinuousStatefulComponent> {
        Some(self)
    }

    fn as_step_size_controller(&mut self) -> Option<&mut dyn ContinuousStepSizeController> {
        Some(self)
    }
}

impl ContinuousStatefulComponent for CompositeActor {
    fn roll_back_to_committed_state(&mut self) {
        self.round = None;
        for id in self.inner_ids() {
            if let Some(stateful) = self.inner.actor_mut(id).and_then(|a| a.as_stateful()) {
                stateful.roll_back_to_committed_state();
            }
        }
    }

    fn is_state_resolved(&mut self, solver: &Solver, value_resolution: f64) -> bool {
        self.inner_ids().into_iter().all(|id| {
            self.inner
                .actor_mut(id)
                .and_then(|a| a.as_stateful())
                .map_or(true, |s| s.is_state_resolved(solver, value_resolution))
        })
    }
}

impl ContinuousStepSizeController for CompositeActor {
    fn is_step_size_accurate(&mut self, step: &StepInfo<'_>) -> bool {
        let mut accurate = true;
        for id in self.inner_ids() {
            if let Some(c) = self.inner.actor_mut(id).and_then(|a| a.as_step_size_controller()) {
                accurate &= c.is_step_size_accurate(step);
            }
        }
        accurate
    }

    fn refined_step_size(&mut self, step: &StepInfo<'_>) -> f64 {
        let mut refined = step.step_size;
        for id in self.inner_ids() {
            if let Some(c) = self.inner.actor_mut(id).and_then(|a| a.as_step_size_controller()) {
                refined = refined.min(c.refined_step_size(step));
            }
        }
        refined
    }

    fn suggested_step_size(&mut self, step: &StepInfo<'_>) -> f64 {
        let mut suggested = f64::INFINITY;
        for id in self.inner_ids() {
            if let Some(c) = self.inner.actor_mut(id).and_then(|a| a.as_step_size_controller()) {
                suggested = suggested.min(c.suggested_step_size(step));
            }
        }
        suggested
    }
}

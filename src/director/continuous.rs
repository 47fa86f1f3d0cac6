//! Continuous-time director
//!
//! Each iteration either takes a continuous step of size `h > 0` or, when a
//! breakpoint is due, a discrete phase of size zero that only advances the
//! microstep. A continuous step runs the solver's rounds, each one a full
//! fixed point at the round's local time, then asks every step size
//! controller whether the step was accurate. Inaccurate steps are rolled
//! back and retried with a smaller size.

use fixsim_types::{ContinuousSettings, KernelSettings};
use tracing::{debug, info, trace};

use super::engine::{FixedPointEngine, StopHandle};
use super::realtime::RealTimeSync;
use super::RunStats;
use crate::actor::StepInfo;
use crate::error::KernelError;
use crate::network::{ActorId, Network};
use crate::sched::Scheduler;
use crate::solvers::{Rounds, Solver};
use crate::time::{SuperdenseClock, SuperdenseTime};
use crate::utils::constants::{STEP_GROWTH_LIMIT, STEP_REFINE_FACTOR};

const DIRECTOR: &str = "director";

fn step_info<'s>(
    solver: &'s Solver,
    settings: &ContinuousSettings,
    step_size: f64,
    round: usize,
) -> StepInfo<'s> {
    StepInfo {
        step_size,
        round,
        solver,
        error_tolerance: settings.error_tolerance,
        value_resolution: settings.value_resolution,
    }
}

fn states_resolved(
    network: &mut Network,
    actors: &[ActorId],
    solver: &Solver,
    value_resolution: f64,
) -> bool {
    actors.iter().all(|&id| {
        network
            .actor_mut(id)
            .and_then(|a| a.as_stateful())
            .map_or(true, |s| s.is_state_resolved(solver, value_resolution))
    })
}

/// Director for continuous-time and hybrid models
#[derive(Debug)]
pub struct ContinuousDirector {
    settings: ContinuousSettings,
    iteration_limit: usize,
    scheduler: Scheduler,
    engine: FixedPointEngine,
    clock: SuperdenseClock,
    solver: Solver,
    current_step: f64,
    suggested_step: f64,
    last_round: usize,
    iteration_begin: SuperdenseTime,
    tried_minimum_step: bool,
    realtime: Option<RealTimeSync>,
    stats: RunStats,
}

impl ContinuousDirector {
    pub fn new(settings: ContinuousSettings) -> Result<Self, KernelError> {
        settings.validate()?;
        Ok(Self {
            iteration_limit: 0,
            scheduler: Scheduler::default(),
            engine: FixedPointEngine::new(StopHandle::new()),
            clock: SuperdenseClock::new(settings.time_resolution),
            solver: Solver::new(settings.solver),
            current_step: 0.0,
            suggested_step: settings.init_step_size,
            last_round: 0,
            iteration_begin: SuperdenseTime::new(settings.start_time, 0),
            tried_minimum_step: false,
            realtime: None,
            stats: RunStats::default(),
            settings,
        })
    }

    /// Build from the full configuration, taking the iteration limit and
    /// cycle policy from the fixed-point section
    pub fn from_kernel_settings(settings: &KernelSettings) -> Result<Self, KernelError> {
        settings.validate()?;
        let mut director = Self::new(settings.continuous.clone())?;
        director.iteration_limit = settings.fixed_point.iterations;
        director.scheduler = Scheduler::new(settings.fixed_point.cycle_policy);
        Ok(director)
    }

    pub fn settings(&self) -> &ContinuousSettings {
        &self.settings
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.engine.stop_handle().clone()
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn model_time(&self) -> SuperdenseTime {
        self.clock.current()
    }

    /// Stop time, infinite when unbounded
    pub fn model_stop_time(&self) -> f64 {
        self.settings.stop_time.unwrap_or(f64::INFINITY)
    }

    /// Size of the last step taken
    pub fn current_step_size(&self) -> f64 {
        self.current_step
    }

    /// Request an iteration at `(time, index)` on behalf of the environment
    pub fn fire_at(&mut self, time: f64, index: u64) -> Result<SuperdenseTime, KernelError> {
        self.clock.fire_at(DIRECTOR, time, index)
    }

    /// Step size the next iteration would attempt: the prediction clamped by
    /// the maximum step, the next breakpoint and the stop time. Zero when a
    /// breakpoint is due at the current time.
    pub fn proposed_step_size(&self) -> f64 {
        let now = self.clock.current();
        let mut step = self.suggested_step.min(self.settings.max_step_size);
        if let Some(breakpoint) = self.clock.breakpoints().first() {
            if breakpoint.time <= now.time {
                return 0.0;
            }
            step = step.min(breakpoint.time - now.time);
        }
        if let Some(stop) = self.settings.stop_time {
            step = step.min((stop - now.time).max(0.0));
        }
        step
    }

    /// Reset the clock and solver state and initialize every actor
    pub fn initialize(&mut self, network: &mut Network) -> Result<(), KernelError> {
        self.engine.initialize(network);
        self.engine.stop_handle().clear();
        self.clock.reset(self.settings.start_time);
        self.stats = RunStats::default();

        let order = self.scheduler.schedule(network)?.actors();
        self.clock.set_initializing(true);
        for id in order {
            network.invoke(id, &mut self.clock, None, |actor, ctx| actor.initialize(ctx))?;
        }
        // the run starts with a discrete phase
        self.clock.fire_at(DIRECTOR, self.settings.start_time, 0)?;
        if let Some(stop) = self.settings.stop_time {
            self.clock.fire_at(DIRECTOR, stop, 0)?;
        }
        self.clock.set_initializing(false);

        self.current_step = 0.0;
        self.suggested_step = self.settings.init_step_size;
        self.last_round = 0;
        self.iteration_begin = self.clock.current();
        self.tried_minimum_step = false;
        self.realtime = self
            .settings
            .synchronize_to_real_time
            .then(|| RealTimeSync::new(self.settings.start_time));

        debug!(
            solver = %self.solver.solver_type(),
            start = self.settings.start_time,
            stop = self.model_stop_time(),
            "continuous director initialized"
        );
        Ok(())
    }

    /// Run one iteration: a continuous step or a discrete phase.
    ///
    /// Returns false once the stop time has been fully processed, the
    /// iteration limit is reached, every actor has finished, or a stop was
    /// requested.
    pub fn iterate(&mut self, network: &mut Network) -> Result<bool, KernelError> {
        let lock = network.structure_lock();
        let mut guard = lock.read();

        self.iteration_begin = self.clock.current();
        let mut step = self.proposed_step_size();
        if step == 0.0 {
            let now = self.clock.current();
            if self.clock.breakpoints().first().is_some_and(|b| b <= now) {
                self.clock.breakpoints_mut().pop_first();
            }
        }

        loop {
            self.current_step = step;
            let Some(resolved) = self.run_rounds(network, step)? else {
                info!(time = %self.clock.current(), "stop requested");
                return Ok(false);
            };
            if step == 0.0 || (resolved && self.is_step_size_accurate(network, step)?) {
                break;
            }
            self.stats.rejected_steps += 1;
            let refined = self.refined_step_size(network, step, resolved)?;
            debug!(
                time = self.iteration_begin.time,
                step, refined, resolved, "step rejected, rolling back"
            );
            self.roll_back(network)?;
            step = refined;
        }
        if step > 0.0 {
            self.tried_minimum_step = false;
        }

        if let Some(sync) = &self.realtime {
            guard = sync.wait(&lock, guard, self.clock.current().time);
        }

        let schedule = self.scheduler.schedule(network)?;
        let info = step_info(&self.solver, &self.settings, step, self.last_round);
        let continuing = self
            .engine
            .commit(network, schedule, &mut self.clock, Some(info))?;
        drop(guard);

        self.stats.iterations += 1;
        self.stats.firings = self.engine.firings();
        self.advance_time(step)?;

        let now = self.clock.current();
        self.stats.final_time = now;
        if let Some(stop) = self.settings.stop_time {
            if now.time > stop {
                return Err(KernelError::StopTimeExceeded {
                    time: now.time,
                    stop,
                });
            }
            if now.time == stop && !self.clock.breakpoints().contains_time(stop) {
                return Ok(false);
            }
        }

        self.suggested_step = self.predict_next_step(network, step)?;
        trace!(time = %now, step, next = self.suggested_step, "iteration committed");

        if self.iteration_limit > 0 && self.stats.iterations >= self.iteration_limit {
            return Ok(false);
        }
        Ok(continuing && !self.engine.stop_handle().is_stop_requested())
    }

    /// Execute the solver rounds of one attempted step. Returns whether an
    /// implicit solver resolved the state, `None` if stopped.
    fn run_rounds(&mut self, network: &mut Network, step: f64) -> Result<Option<bool>, KernelError> {
        let begin = self.iteration_begin;
        let schedule = self.scheduler.schedule(network)?;
        let actors = schedule.actors();
        let mut round = 0;

        loop {
            let fraction = if step == 0.0 {
                0.0
            } else {
                self.solver.time_fraction(round)
            };
            let local = self.clock.quantize(begin.time + fraction * step);
            if local == begin.time {
                self.clock.set_current_point(begin);
            } else {
                self.clock.set_current(local, 0);
            }

            let info = step_info(&self.solver, &self.settings, step, round);
            self.engine.begin_iteration(network);
            let fixed_point = self
                .engine
                .fire(network, schedule, &mut self.clock, Some(info))?;
            self.stats.passes += fixed_point.passes;
            self.last_round = round;
            if fixed_point.stopped {
                return Ok(None);
            }
            round += 1;

            if step == 0.0 {
                return Ok(Some(true));
            }
            match self.solver.rounds() {
                Rounds::Fixed(count) => {
                    if round >= count {
                        return Ok(Some(true));
                    }
                }
                Rounds::UntilConverged => {
                    if round >= 2
                        && states_resolved(
                            network,
                            &actors,
                            &self.solver,
                            self.settings.value_resolution,
                        )
                    {
                        return Ok(Some(true));
                    }
                    if round >= self.settings.max_iterations {
                        return Ok(Some(false));
                    }
                }
            }
        }
    }

    /// Every step size controller must accept the step
    fn is_step_size_accurate(&mut self, network: &mut Network, step: f64) -> Result<bool, KernelError> {
        let actors = self.scheduler.schedule(network)?.actors();
        let info = step_info(&self.solver, &self.settings, step, self.last_round);
        let mut accurate = true;
        for id in actors {
            if let Some(controller) = network.actor_mut(id).and_then(|a| a.as_step_size_controller()) {
                accurate &= controller.is_step_size_accurate(&info);
            }
        }
        Ok(accurate)
    }

    /// Half the step or the smallest refinement proposed by the controllers,
    /// whichever is smaller. Falling below the time resolution is allowed
    /// once, at the resolution itself.
    fn refined_step_size(
        &mut self,
        network: &mut Network,
        step: f64,
        resolved: bool,
    ) -> Result<f64, KernelError> {
        let mut refined = step;
        if resolved {
            let actors = self.scheduler.schedule(network)?.actors();
            let info = step_info(&self.solver, &self.settings, step, self.last_round);
            for id in actors {
                if let Some(controller) =
                    network.actor_mut(id).and_then(|a| a.as_step_size_controller())
                {
                    refined = refined.min(controller.refined_step_size(&info));
                }
            }
        }
        refined = refined.min(step * STEP_REFINE_FACTOR);

        let resolution = self.clock.resolution();
        if refined < resolution {
            if self.tried_minimum_step {
                return Err(KernelError::StepSizeBelowResolution {
                    time: self.iteration_begin.time,
                });
            }
            self.tried_minimum_step = true;
            refined = resolution;
        } else {
            self.tried_minimum_step = false;
        }
        Ok(refined)
    }

    /// Restore committed state everywhere and the clock to the iteration start
    fn roll_back(&mut self, network: &mut Network) -> Result<(), KernelError> {
        let actors = self.scheduler.schedule(network)?.actors();
        for id in actors {
            if let Some(stateful) = network.actor_mut(id).and_then(|a| a.as_stateful()) {
                stateful.roll_back_to_committed_state();
            }
        }
        self.clock.set_current_point(self.iteration_begin);
        Ok(())
    }

    fn advance_time(&mut self, step: f64) -> Result<(), KernelError> {
        let begin = self.iteration_begin;
        if step > 0.0 {
            self.clock.set_current(begin.time + step, 0);
        } else {
            self.clock.set_current(begin.time, begin.index + 1);
        }

        let now = self.clock.current();
        if let Some(breakpoint) = self.clock.breakpoints().first() {
            if breakpoint.time < now.time {
                return Err(KernelError::MissedBreakpoint {
                    time: now.time,
                    breakpoint: breakpoint.time,
                });
            }
        }
        Ok(())
    }

    /// Next step size: growth-limited prediction capped by the controllers
    /// and the maximum step. Fixed-step solvers and discrete phases restart
    /// from the initial step size.
    fn predict_next_step(&mut self, network: &mut Network, step: f64) -> Result<f64, KernelError> {
        if step == 0.0 || self.solver.is_fixed_step() {
            return Ok(self.settings.init_step_size);
        }
        let mut predicted = STEP_GROWTH_LIMIT * step;
        let actors = self.scheduler.schedule(network)?.actors();
        let info = step_info(&self.solver, &self.settings, step, self.last_round);
        for id in actors {
            if let Some(controller) = network.actor_mut(id).and_then(|a| a.as_step_size_controller()) {
                predicted = predicted.min(controller.suggested_step_size(&info));
            }
        }
        Ok(predicted.min(self.settings.max_step_size))
    }

    /// Initialize, iterate until done, then wrap up
    pub fn run(&mut self, network: &mut Network) -> Result<RunStats, KernelError> {
        self.initialize(network)?;
        let result = self.run_loop(network);
        network.wrapup();
        result?;
        info!(
            iterations = self.stats.iterations,
            rejected = self.stats.rejected_steps,
            time = %self.stats.final_time,
            "continuous run finished"
        );
        Ok(self.stats.clone())
    }

    fn run_loop(&mut self, network: &mut Network) -> Result<(), KernelError> {
        while self.iterate(network)? {}
        Ok(())
    }
}

//! Fixed-point iteration engine
//!
//! One iteration runs passes over the schedule until the number of known
//! receivers stops growing, then commits every actor that fired. Both the
//! synchronous-reactive and the continuous director drive this engine; the
//! continuous director runs one fixed point per solver round and commits
//! once per step.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::actor::StepInfo;
use crate::error::KernelError;
use crate::network::{ActorId, Network};
use crate::sched::Schedule;
use crate::time::SuperdenseClock;

/// Cooperative cancellation flag shared with other threads
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running director to stop between firings
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-iteration bookkeeping
#[derive(Debug, Default, Clone)]
struct IterationBaseline {
    allowed_to_fire: HashSet<ActorId>,
    finished_firing: HashSet<ActorId>,
    inputs_known: HashSet<ActorId>,
}

impl IterationBaseline {
    fn clear(&mut self) {
        self.allowed_to_fire.clear();
        self.finished_firing.clear();
        self.inputs_known.clear();
    }
}

/// Result of driving one iteration to its fixed point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPoint {
    pub passes: usize,
    pub stopped: bool,
}

/// Firing protocol and convergence detection
#[derive(Debug, Default)]
pub struct FixedPointEngine {
    baseline: IterationBaseline,
    finished: HashSet<ActorId>,
    stop: StopHandle,
    firings: usize,
}

impl FixedPointEngine {
    pub fn new(stop: StopHandle) -> Self {
        Self {
            stop,
            ..Self::default()
        }
    }

    pub fn stop_handle(&self) -> &StopHandle {
        &self.stop
    }

    /// Forget finished actors and iteration state before a run
    pub fn initialize(&mut self, network: &mut Network) {
        network.prepare();
        network.reset_receivers();
        self.baseline.clear();
        self.finished.clear();
        self.firings = 0;
    }

    /// Reset phase: every receiver back to unknown, baseline cleared
    pub fn begin_iteration(&mut self, network: &mut Network) {
        network.reset_receivers();
        self.baseline.clear();
    }

    /// Whether `actor` returned false from postfire earlier in the run
    pub fn is_finished(&self, actor: ActorId) -> bool {
        self.finished.contains(&actor)
    }

    /// Total `fire` invocations since initialization
    pub fn firings(&self) -> usize {
        self.firings
    }

    /// Pass phase repeated until convergence or stop
    pub fn fire(
        &mut self,
        network: &mut Network,
        schedule: &Schedule,
        clock: &mut SuperdenseClock,
        step: Option<StepInfo<'_>>,
    ) -> Result<FixedPoint, KernelError> {
        let actors = schedule.actors();
        let mut previous_known = None;
        let mut passes = 0;

        loop {
            let mut cursor = schedule.cursor();
            while let Some(firing) = schedule.next_firing(&mut cursor)? {
                for _ in 0..firing.iterations {
                    if self.stop.is_stop_requested() {
                        return Ok(FixedPoint {
                            passes,
                            stopped: true,
                        });
                    }
                    if self.finished.contains(&firing.actor) {
                        network.clear_unknown_outputs(firing.actor)?;
                    } else {
                        self.fire_actor(network, firing.actor, clock, step)?;
                    }
                }
            }
            passes += 1;

            let known = network.receivers().known_count();
            let settled = network.receivers().all_known()
                && actors.iter().all(|id| {
                    self.baseline.finished_firing.contains(id) || self.finished.contains(id)
                });
            if settled || previous_known == Some(known) {
                trace!(passes, known, "fixed point reached");
                return Ok(FixedPoint {
                    passes,
                    stopped: self.stop.is_stop_requested(),
                });
            }
            if self.stop.is_stop_requested() {
                return Ok(FixedPoint {
                    passes,
                    stopped: true,
                });
            }
            previous_known = Some(known);
        }
    }

    fn fire_actor(
        &mut self,
        network: &mut Network,
        actor: ActorId,
        clock: &mut SuperdenseClock,
        step: Option<StepInfo<'_>>,
    ) -> Result<(), KernelError> {
        if self.baseline.finished_firing.contains(&actor) {
            return Ok(());
        }
        let strict = network.actor(actor).map_or(true, |a| a.is_strict());
        let all_known = self.inputs_known(network, actor)?;
        if strict && !all_known {
            return Ok(());
        }

        let ready = network.invoke(actor, clock, step, |a, ctx| a.prefire(ctx))?;
        if !ready {
            if self.baseline.allowed_to_fire.contains(&actor) {
                return Err(KernelError::Monotonicity {
                    actor: network.name(actor).unwrap_or_default().to_string(),
                    detail: "prefire returned false after returning true in the same iteration"
                        .to_string(),
                });
            }
            if strict || all_known {
                self.baseline.finished_firing.insert(actor);
                network.clear_unknown_outputs(actor)?;
            }
            return Ok(());
        }

        self.baseline.allowed_to_fire.insert(actor);
        let known_before = self.inputs_known(network, actor)?;
        network.invoke(actor, clock, step, |a, ctx| a.fire(ctx))?;
        self.firings += 1;

        if known_before {
            self.baseline.finished_firing.insert(actor);
            network.clear_unknown_outputs(actor)?;
        }
        Ok(())
    }

    fn inputs_known(&mut self, network: &Network, actor: ActorId) -> Result<bool, KernelError> {
        if self.baseline.inputs_known.contains(&actor) {
            return Ok(true);
        }
        let known = network.all_inputs_known(actor)?;
        if known {
            self.baseline.inputs_known.insert(actor);
        }
        Ok(known)
    }

    /// Fail with a causality loop if any scheduled actor has unknown inputs
    pub fn check_causality(&self, network: &Network, schedule: &Schedule) -> Result<(), KernelError> {
        let mut first = None;
        let mut unresolved = Vec::new();
        for actor in schedule.actors() {
            if self.finished.contains(&actor) {
                continue;
            }
            if let Some(port) = network.first_unknown_input(actor)? {
                let name = network.name(actor).unwrap_or_default().to_string();
                if first.is_none() {
                    first = Some((name.clone(), network.input_name(actor, port).unwrap_or_default()));
                }
                unresolved.push(name);
            }
        }
        match first {
            Some((actor, port)) => Err(KernelError::CausalityLoop {
                actor,
                port,
                unresolved,
            }),
            None => Ok(()),
        }
    }

    /// Commit phase: postfire every actor allowed to fire, in schedule order.
    ///
    /// Returns false once every actor has finished for the run.
    pub fn commit(
        &mut self,
        network: &mut Network,
        schedule: &Schedule,
        clock: &mut SuperdenseClock,
        step: Option<StepInfo<'_>>,
    ) -> Result<bool, KernelError> {
        self.check_causality(network, schedule)?;

        let mut continuing = false;
        for actor in schedule.actors() {
            if self.finished.contains(&actor) {
                continue;
            }
            if !self.baseline.allowed_to_fire.contains(&actor) {
                continuing = true;
                continue;
            }
            if network.invoke(actor, clock, step, |a, ctx| a.postfire(ctx))? {
                continuing = true;
            } else {
                debug!(actor = network.name(actor), "actor finished for the run");
                self.finished.insert(actor);
            }
        }
        Ok(continuing)
    }
}

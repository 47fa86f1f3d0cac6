//! Modal models
//!
//! A [`ModalModel`] is a finite automaton whose modes each map the inputs to
//! the outputs. Transitions are guarded by conjunctions of [`Relation`]s and
//! are only taken in discrete phases. During continuous steps the model acts
//! as a step size controller: when a guard relation changes truth value
//! within a step, the step is shortened until the crossing lies within the
//! error tolerance, and a discrete phase is requested at the crossing.

use std::fmt;

use tracing::debug;

use super::relation::{Relation, RelationSample};
use crate::actor::{
    Actor, ActorContext, ContinuousStatefulComponent, ContinuousStepSizeController, StepInfo,
};
use crate::error::KernelError;
use crate::time::SuperdenseTime;
use crate::token::Token;

pub type ModeId = usize;

type OutputMap = Box<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// A mode and its output refinement
pub struct Mode {
    name: String,
    outputs: Vec<OutputMap>,
}

impl Mode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outputs: Vec::new(),
        }
    }

    /// Append the map for the next output port
    pub fn output<F>(mut self, map: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        self.outputs.push(Box::new(map));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mode")
            .field("name", &self.name)
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

/// Guarded edge between two modes
pub struct Transition {
    source: ModeId,
    target: ModeId,
    guard: Vec<Relation>,
    actions: Vec<(usize, OutputMap)>,
}

impl Transition {
    pub fn new(source: ModeId, target: ModeId) -> Self {
        Self {
            source,
            target,
            guard: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Add a relation to the guard conjunction
    pub fn when(mut self, relation: Relation) -> Self {
        self.guard.push(relation);
        self
    }

    /// Output action: overrides `port` in the phase the transition is taken
    pub fn emit<F>(mut self, port: usize, map: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        self.actions.push((port, Box::new(map)));
        self
    }

    pub fn source(&self) -> ModeId {
        self.source
    }

    pub fn target(&self) -> ModeId {
        self.target
    }

    /// An empty guard is always enabled
    pub fn is_enabled(&self, inputs: &[f64]) -> bool {
        self.guard.iter().all(|r| r.evaluate(inputs))
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("guard", &self.guard)
            .field("actions", &self.actions.len())
            .finish()
    }
}

/// Hybrid automaton actor
#[derive(Debug)]
pub struct ModalModel {
    num_inputs: usize,
    num_outputs: usize,
    modes: Vec<Mode>,
    transitions: Vec<Transition>,
    initial: ModeId,
    current: ModeId,
    inputs: Vec<f64>,
    inputs_present: bool,
    pending: Option<usize>,
    // relation samples of the current mode's guards at the last commit
    baseline: Vec<RelationSample>,
    crossing: Option<f64>,
    event: bool,
    switches: Vec<(SuperdenseTime, ModeId, ModeId)>,
}

impl ModalModel {
    pub fn new(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            num_inputs,
            num_outputs,
            modes: Vec::new(),
            transitions: Vec::new(),
            initial: 0,
            current: 0,
            inputs: Vec::with_capacity(num_inputs),
            inputs_present: false,
            pending: None,
            baseline: Vec::new(),
            crossing: None,
            event: false,
            switches: Vec::new(),
        }
    }

    /// Add a mode; the first one added is the initial mode
    pub fn add_mode(&mut self, mode: Mode) -> ModeId {
        self.modes.push(mode);
        self.modes.len() - 1
    }

    /// Transitions out of a mode are tried in insertion order
    pub fn add_transition(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub fn set_initial_mode(&mut self, mode: ModeId) {
        self.initial = mode;
    }

    pub fn current_mode(&self) -> ModeId {
        self.current
    }

    pub fn current_mode_name(&self) -> &str {
        self.mode_name(self.current).unwrap_or_default()
    }

    pub fn mode_name(&self, mode: ModeId) -> Option<&str> {
        self.modes.get(mode).map(Mode::name)
    }

    /// Transitions taken so far: time, source and target
    pub fn switches(&self) -> &[(SuperdenseTime, ModeId, ModeId)] {
        &self.switches
    }

    fn validate(&self, ctx: &ActorContext<'_>) -> Result<(), KernelError> {
        if self.initial >= self.modes.len() {
            return Err(ctx.error(format!(
                "initial mode {} out of {} modes",
                self.initial,
                self.modes.len()
            )));
        }
        for mode in &self.modes {
            if mode.outputs.len() > self.num_outputs {
                return Err(ctx.error(format!(
                    "mode '{}' maps {} outputs, the model has {}",
                    mode.name,
                    mode.outputs.len(),
                    self.num_outputs
                )));
            }
        }
        for t in &self.transitions {
            if t.source >= self.modes.len() || t.target >= self.modes.len() {
                return Err(ctx.error(format!(
                    "transition {} -> {} refers to a missing mode",
                    t.source, t.target
                )));
            }
            if let Some((port, _)) = t.actions.iter().find(|(p, _)| *p >= self.num_outputs) {
                return Err(ctx.error(format!("transition action on missing output {port}")));
            }
        }
        Ok(())
    }

    fn outgoing(&self) -> impl Iterator<Item = &Transition> {
        let current = self.current;
        self.transitions.iter().filter(move |t| t.source == current)
    }

    fn guard_relations(&self) -> impl Iterator<Item = &Relation> {
        self.outgoing().flat_map(|t| t.guard.iter())
    }

    fn enabled_transition(&self) -> Option<usize> {
        self.transitions
            .iter()
            .position(|t| t.source == self.current && t.is_enabled(&self.inputs))
    }

    fn read_inputs(&mut self, ctx: &ActorContext<'_>) -> Result<(), KernelError> {
        self.inputs.clear();
        self.inputs_present = true;
        for port in 0..self.num_inputs {
            match ctx.get_f64(port)? {
                Some(u) => self.inputs.push(u),
                None => {
                    self.inputs_present = false;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn output_value(&self, port: usize) -> Option<f64> {
        let action = self
            .pending
            .and_then(|t| self.transitions[t].actions.iter().find(|(p, _)| *p == port));
        match action {
            Some((_, map)) => Some(map(&self.inputs)),
            None => self.modes[self.current]
                .outputs
                .get(port)
                .map(|map| map(&self.inputs)),
        }
    }
}

impl Actor for ModalModel {
    fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    fn initialize(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        self.validate(ctx)?;
        self.current = self.initial;
        self.pending = None;
        self.baseline.clear();
        self.crossing = None;
        self.event = false;
        self.switches.clear();
        Ok(())
    }

    fn fire(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        self.read_inputs(ctx)?;
        if !self.inputs_present {
            self.pending = None;
            for port in 0..self.num_outputs {
                ctx.clear(port)?;
            }
            return Ok(());
        }

        let discrete = ctx.step().map_or(true, |s| s.is_discrete());
        self.pending = if discrete {
            self.enabled_transition()
        } else {
            None
        };
        for port in 0..self.num_outputs {
            let value = self.output_value(port).map(Token::from);
            ctx.send(port, value)?;
        }
        Ok(())
    }

    fn postfire(&mut self, ctx: &mut ActorContext<'_>) -> Result<bool, KernelError> {
        let now = ctx.model_time();
        if let Some(index) = self.pending.take() {
            let (source, target) = (self.transitions[index].source, self.transitions[index].target);
            debug!(
                actor = ctx.name(),
                time = %now,
                from = self.mode_name(source),
                to = self.mode_name(target),
                "mode transition"
            );
            self.current = target;
            self.switches.push((now, source, target));
            // let the new mode's outputs settle in the next microstep
            ctx.fire_at(now.time, 0)?;
        } else if self.event {
            ctx.fire_at(now.time, 0)?;
        }
        self.event = false;
        self.crossing = None;

        self.baseline = if self.inputs_present {
            self.guard_relations().map(|r| r.sample(&self.inputs)).collect()
        } else {
            Vec::new()
        };
        Ok(true)
    }

    fn is_fire_functional(&self) -> bool {
        false
    }

    fn as_stateful(&mut self) -> Option<&mut dyn ContinuousStatefulComponent> {
        Some(self)
    }

    fn as_step_size_controller(&mut self) -> Option<&mut dyn ContinuousStepSizeController> {
        Some(self)
    }
}

impl ContinuousStatefulComponent for ModalModel {
    fn roll_back_to_committed_state(&mut self) {
        self.pending = None;
        self.crossing = None;
        self.event = false;
    }
}

impl ContinuousStepSizeController for ModalModel {
    fn is_step_size_accurate(&mut self, step: &StepInfo<'_>) -> bool {
        self.event = false;
        self.crossing = None;
        if step.is_discrete() || !self.inputs_present {
            return true;
        }

        let tolerance = step.error_tolerance;
        let mut changed = false;
        let mut overshoot = 0.0_f64;
        let mut fraction = 1.0_f64;
        for (before, relation) in self.baseline.iter().zip(self.guard_relations()) {
            let after = relation.sample(&self.inputs);
            if after.holds == before.holds {
                continue;
            }
            changed = true;
            let (d0, d1) = (before.difference.abs(), after.difference.abs());
            overshoot = overshoot.max(d1);
            if d1 >= tolerance {
                // interpolate to just past the level
                fraction = fraction.min((d0 + tolerance / 2.0) / (d0 + d1));
            }
        }
        if !changed {
            return true;
        }
        if overshoot < tolerance {
            self.event = true;
            return true;
        }
        self.crossing = Some(fraction);
        false
    }

    fn refined_step_size(&mut self, step: &StepInfo<'_>) -> f64 {
        self.crossing
            .map_or(step.step_size, |fraction| fraction * step.step_size)
    }

    fn suggested_step_size(&mut self, _step: &StepInfo<'_>) -> f64 {
        f64::INFINITY
    }
}

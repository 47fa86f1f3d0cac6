//! Source blocks: constants, model time and periodic events

use crate::actor::{Actor, ActorContext};
use crate::error::KernelError;
use crate::token::Token;

/// Constant: emits the same token in every firing
///
/// # Example
///
/// ```ignore
/// let one = network.add_actor("one", Const::new(1.0));
/// ```
#[derive(Debug, Clone)]
pub struct Const {
    value: Token,
}

impl Const {
    pub fn new(value: impl Into<Token>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn value(&self) -> &Token {
        &self.value
    }
}

impl Actor for Const {
    fn num_inputs(&self) -> usize {
        0
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn output_name(&self, _port: usize) -> String {
        "output".into()
    }

    fn fire(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        ctx.put(0, self.value.clone())
    }
}

/// Emits the current model time
///
/// Inside a continuous step this is the local time of the solver round.
#[derive(Debug, Clone, Default)]
pub struct CurrentTime;

impl Actor for CurrentTime {
    fn num_inputs(&self) -> usize {
        0
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn output_name(&self, _port: usize) -> String {
        "time".into()
    }

    fn fire(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        let now = ctx.model_time().time;
        ctx.put(0, now)
    }
}

/// Periodic event source
///
/// Requests a firing at `start + offset + k * period` through `fire_at` and
/// emits `value` only at those instants, in a discrete phase. Everywhere else
/// the output is absent.
#[derive(Debug, Clone)]
pub struct DiscreteClock {
    period: f64,
    offset: f64,
    value: Token,
    next: f64,
    emitting: bool,
    ticks: usize,
}

impl DiscreteClock {
    pub fn new(period: f64, value: impl Into<Token>) -> Self {
        Self {
            period,
            offset: 0.0,
            value: value.into(),
            next: 0.0,
            emitting: false,
            ticks: 0,
        }
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Time of the next event
    pub fn next_time(&self) -> f64 {
        self.next
    }

    /// Events emitted so far
    pub fn ticks(&self) -> usize {
        self.ticks
    }

    fn is_due(&self, ctx: &ActorContext<'_>) -> bool {
        let discrete = ctx.step().map_or(true, |s| s.is_discrete());
        discrete && ctx.model_time().time == self.next
    }
}

impl Actor for DiscreteClock {
    fn num_inputs(&self) -> usize {
        0
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn output_name(&self, _port: usize) -> String {
        "output".into()
    }

    fn initialize(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        if !(self.period > 0.0) {
            return Err(ctx.error(format!("period must be positive, got {}", self.period)));
        }
        self.ticks = 0;
        self.emitting = false;
        let start = ctx.model_time().time;
        self.next = ctx.fire_at(start + self.offset, 0)?.time;
        Ok(())
    }

    fn fire(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        self.emitting = self.is_due(ctx);
        if self.emitting {
            ctx.put(0, self.value.clone())
        } else {
            ctx.clear(0)
        }
    }

    fn postfire(&mut self, ctx: &mut ActorContext<'_>) -> Result<bool, KernelError> {
        if self.emitting {
            self.emitting = false;
            self.ticks += 1;
            self.next = ctx.fire_at(self.next + self.period, 0)?.time;
        }
        Ok(true)
    }

    fn is_fire_functional(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::Recorder;
    use crate::director::FixedPointDirector;
    use crate::network::Network;
    use fixsim_types::FixedPointSettings;

    #[test]
    fn test_const_emits_every_tick() {
        let mut net = Network::new();
        let c = net.add_actor("c", Const::new(2.5));
        let rec = net.add_actor("rec", Recorder::new());
        net.connect(c, 0, rec, 0).unwrap();

        let mut director = FixedPointDirector::new(FixedPointSettings::default()).unwrap();
        director.run_iterations(&mut net, 3).unwrap();

        let rec = net.actor_as::<Recorder>(rec).unwrap();
        assert_eq!(rec.values(), vec![2.5, 2.5, 2.5]);
    }

    #[test]
    fn test_current_time_follows_period() {
        let mut net = Network::new();
        let t = net.add_actor("t", CurrentTime);
        let rec = net.add_actor("rec", Recorder::new());
        net.connect(t, 0, rec, 0).unwrap();

        let settings = FixedPointSettings {
            period: 0.5,
            ..Default::default()
        };
        let mut director = FixedPointDirector::new(settings).unwrap();
        director.run_iterations(&mut net, 3).unwrap();

        let rec = net.actor_as::<Recorder>(rec).unwrap();
        assert_eq!(rec.values(), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_discrete_clock_under_periodic_ticks() {
        let mut net = Network::new();
        let clock = net.add_actor("clock", DiscreteClock::new(1.0, 1.0));
        let rec = net.add_actor("rec", Recorder::new());
        net.connect(clock, 0, rec, 0).unwrap();

        let settings = FixedPointSettings {
            period: 0.5,
            ..Default::default()
        };
        let mut director = FixedPointDirector::new(settings).unwrap();
        director.run_iterations(&mut net, 5).unwrap();

        let rec = net.actor_as::<Recorder>(rec).unwrap();
        let present: Vec<f64> = rec
            .samples()
            .iter()
            .filter(|(_, v)| v.is_some())
            .map(|(t, _)| t.time)
            .collect();
        assert_eq!(present, vec![0.0, 1.0, 2.0]);
        assert_eq!(net.actor_as::<DiscreteClock>(clock).unwrap().ticks(), 3);
    }

    #[test]
    fn test_discrete_clock_rejects_bad_period() {
        let mut net = Network::new();
        net.add_actor("clock", DiscreteClock::new(0.0, 1.0));
        let mut director = FixedPointDirector::new(FixedPointSettings::default()).unwrap();
        assert!(director.run_iterations(&mut net, 1).is_err());
    }
}

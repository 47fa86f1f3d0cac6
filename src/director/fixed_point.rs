//! Synchronous-reactive director
//!
//! Each iteration is one tick: the engine computes the fixed point of the
//! network and commits it. With a zero period model time stays put and only
//! the microstep advances; otherwise each tick advances time by the period.

use fixsim_types::FixedPointSettings;
use tracing::{debug, info};

use super::engine::{FixedPointEngine, StopHandle};
use super::realtime::RealTimeSync;
use super::RunStats;
use crate::error::KernelError;
use crate::network::Network;
use crate::sched::Scheduler;
use crate::time::{SuperdenseClock, SuperdenseTime};
use crate::utils::constants::DEFAULT_TIME_RESOLUTION;

/// Director with fixed-point (synchronous-reactive) semantics
#[derive(Debug)]
pub struct FixedPointDirector {
    settings: FixedPointSettings,
    scheduler: Scheduler,
    engine: FixedPointEngine,
    clock: SuperdenseClock,
    realtime: Option<RealTimeSync>,
    functional: Option<(u64, bool)>,
    stats: RunStats,
}

impl FixedPointDirector {
    pub fn new(settings: FixedPointSettings) -> Result<Self, KernelError> {
        settings.validate()?;
        Ok(Self {
            scheduler: Scheduler::new(settings.cycle_policy),
            engine: FixedPointEngine::new(StopHandle::new()),
            clock: SuperdenseClock::new(DEFAULT_TIME_RESOLUTION),
            realtime: None,
            functional: None,
            stats: RunStats::default(),
            settings,
        })
    }

    pub fn settings(&self) -> &FixedPointSettings {
        &self.settings
    }

    /// Handle that stops the run from another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.engine.stop_handle().clone()
    }

    pub fn model_time(&self) -> SuperdenseTime {
        self.clock.current()
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// A network under this director may fire with some inputs unknown
    pub fn is_strict(&self) -> bool {
        false
    }

    /// Whether every actor fires functionally, cached per structural version
    pub fn is_fire_functional(&mut self, network: &Network) -> bool {
        match self.functional {
            Some((version, functional)) if version == network.version() => functional,
            _ => {
                let functional = network.all_fire_functional();
                self.functional = Some((network.version(), functional));
                functional
            }
        }
    }

    /// Prepare receivers, compute the schedule and initialize every actor
    pub fn initialize(&mut self, network: &mut Network) -> Result<(), KernelError> {
        self.engine.initialize(network);
        self.engine.stop_handle().clear();
        self.clock.reset(0.0);
        self.stats = RunStats::default();

        let order = self.scheduler.schedule(network)?.actors();
        self.clock.set_initializing(true);
        for id in order {
            network.invoke(id, &mut self.clock, None, |actor, ctx| actor.initialize(ctx))?;
        }
        self.clock.set_initializing(false);

        self.realtime = self
            .settings
            .synchronize_to_real_time
            .then(|| RealTimeSync::new(self.clock.current().time));
        debug!(actors = network.len(), "fixed-point director initialized");
        Ok(())
    }

    /// Run one tick; returns false when the run should end
    pub fn iterate(&mut self, network: &mut Network) -> Result<bool, KernelError> {
        let lock = network.structure_lock();
        let mut guard = lock.read();

        let schedule = self.scheduler.schedule(network)?;
        self.engine.begin_iteration(network);
        let fixed_point = self.engine.fire(network, schedule, &mut self.clock, None)?;
        self.stats.passes += fixed_point.passes;
        if fixed_point.stopped {
            info!(time = %self.clock.current(), "stop requested");
            return Ok(false);
        }

        if let Some(sync) = &self.realtime {
            guard = sync.wait(&lock, guard, self.clock.current().time);
        }
        let continuing = self.engine.commit(network, schedule, &mut self.clock, None)?;
        drop(guard);

        self.stats.iterations += 1;
        self.stats.firings = self.engine.firings();
        self.advance();

        if self.settings.iterations > 0 && self.stats.iterations >= self.settings.iterations {
            return Ok(false);
        }
        Ok(continuing && !self.engine.stop_handle().is_stop_requested())
    }

    fn advance(&mut self) {
        let now = self.clock.current();
        if self.settings.period > 0.0 {
            self.clock.set_current(now.time + self.settings.period, 0);
        } else {
            self.clock.set_current(now.time, now.index + 1);
        }
        let now = self.clock.current();
        while self.clock.breakpoints().has_earlier_than(&now) {
            self.clock.breakpoints_mut().pop_first();
        }
        self.stats.final_time = now;
    }

    /// Initialize, iterate until done, then wrap up
    pub fn run(&mut self, network: &mut Network) -> Result<RunStats, KernelError> {
        self.initialize(network)?;
        let result = self.run_loop(network);
        network.wrapup();
        result?;
        info!(iterations = self.stats.iterations, "fixed-point run finished");
        Ok(self.stats.clone())
    }

    fn run_loop(&mut self, network: &mut Network) -> Result<(), KernelError> {
        while self.iterate(network)? {}
        Ok(())
    }

    /// Initialize and run at most `count` ticks
    pub fn run_iterations(
        &mut self,
        network: &mut Network,
        count: usize,
    ) -> Result<RunStats, KernelError> {
        self.initialize(network)?;
        for _ in 0..count {
            if !self.iterate(network)? {
                break;
            }
        }
        network.wrapup();
        Ok(self.stats.clone())
    }
}

//! Real-time synchronization
//!
//! Directors may hold the network's structure lock for reading while they
//! iterate. Waiting for wall-clock time must not block inspectors that want
//! the lock, so the wait releases the guard, sleeps, then reacquires it.

use std::sync::RwLockReadGuard;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::network::StructureLock;

/// Keeps model time from running ahead of wall-clock time
#[derive(Debug, Clone)]
pub struct RealTimeSync {
    origin: Instant,
    model_origin: f64,
}

impl RealTimeSync {
    /// Start measuring wall-clock time now, paired with `model_origin`
    pub fn new(model_origin: f64) -> Self {
        Self {
            origin: Instant::now(),
            model_origin,
        }
    }

    /// How far `model_time` is ahead of the elapsed wall-clock time
    pub fn ahead_by(&self, model_time: f64) -> Option<Duration> {
        let model_elapsed = model_time - self.model_origin;
        if !model_elapsed.is_finite() || model_elapsed <= 0.0 {
            return None;
        }
        let target = Duration::try_from_secs_f64(model_elapsed).ok()?;
        target.checked_sub(self.origin.elapsed())
    }

    /// Sleep until wall-clock time catches up with `model_time`.
    ///
    /// The read guard is released for the duration of the sleep and a fresh
    /// one is returned.
    pub fn wait<'a>(
        &self,
        lock: &'a StructureLock,
        guard: RwLockReadGuard<'a, u64>,
        model_time: f64,
    ) -> RwLockReadGuard<'a, u64> {
        match self.ahead_by(model_time) {
            Some(delay) if !delay.is_zero() => {
                trace!(?delay, model_time, "waiting for real time");
                drop(guard);
                thread::sleep(delay);
                lock.read()
            }
            _ => {
                if model_time > self.model_origin {
                    let lag = self.origin.elapsed().as_secs_f64() - (model_time - self.model_origin);
                    if lag > 0.0 {
                        warn!(lag, "model is running behind real time");
                    }
                }
                guard
            }
        }
    }
}

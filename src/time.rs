//! Superdense time and the breakpoint table
//!
//! Model time is a pair `(time, index)`: a real time stamp plus a microstep
//! index that orders several logical instants at the same real time. Points
//! are ordered lexicographically, first by time, then by index.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Bound::{Excluded, Unbounded};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::KernelError;

/// A point in superdense time
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SuperdenseTime {
    pub time: f64,
    pub index: u64,
}

impl SuperdenseTime {
    pub fn new(time: f64, index: u64) -> Self {
        // normalizes -0.0 so that total ordering agrees with ==
        Self {
            time: time + 0.0,
            index,
        }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0)
    }
}

impl Default for SuperdenseTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl PartialEq for SuperdenseTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SuperdenseTime {}

impl PartialOrd for SuperdenseTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SuperdenseTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.index.cmp(&other.index))
    }
}

impl fmt::Display for SuperdenseTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.time, self.index)
    }
}

/// Ordered set of pending wake-up points; equal points merge
#[derive(Debug, Clone, Default)]
pub struct BreakpointTable {
    points: BTreeSet<SuperdenseTime>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a point, returns false if it was already pending
    pub fn insert(&mut self, point: SuperdenseTime) -> bool {
        self.points.insert(point)
    }

    pub fn first(&self) -> Option<SuperdenseTime> {
        self.points.first().copied()
    }

    pub fn pop_first(&mut self) -> Option<SuperdenseTime> {
        self.points.pop_first()
    }

    pub fn remove(&mut self, point: &SuperdenseTime) -> bool {
        self.points.remove(point)
    }

    /// Whether any pending point is strictly earlier than `point`
    pub fn has_earlier_than(&self, point: &SuperdenseTime) -> bool {
        self.first().is_some_and(|first| first < *point)
    }

    /// Whether any pending point has real time `time`, whatever its index
    pub fn contains_time(&self, time: f64) -> bool {
        self.points
            .range(SuperdenseTime::new(time, 0)..)
            .next()
            .is_some_and(|p| p.time == time)
    }

    /// Drop every point at or before `point`, returning how many were removed
    pub fn remove_through(&mut self, point: &SuperdenseTime) -> usize {
        let later = match self.points.range((Excluded(*point), Unbounded)).next() {
            Some(&first_later) => self.points.split_off(&first_later),
            None => BTreeSet::new(),
        };
        let removed = self.points.len();
        self.points = later;
        removed
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SuperdenseTime> {
        self.points.iter()
    }
}

/// The director's clock: current superdense time, resolution and breakpoints
#[derive(Debug, Clone)]
pub struct SuperdenseClock {
    current: SuperdenseTime,
    resolution: f64,
    initializing: bool,
    breakpoints: BreakpointTable,
}

impl SuperdenseClock {
    pub fn new(resolution: f64) -> Self {
        Self {
            current: SuperdenseTime::zero(),
            resolution,
            initializing: false,
            breakpoints: BreakpointTable::new(),
        }
    }

    /// Round a time stamp to a multiple of the time resolution
    pub fn quantize(&self, time: f64) -> f64 {
        if self.resolution <= 0.0 || !time.is_finite() {
            return time;
        }
        (time / self.resolution).round() * self.resolution + 0.0
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Restart at `start` with an empty breakpoint table
    pub fn reset(&mut self, start: f64) {
        self.current = SuperdenseTime::new(self.quantize(start), 0);
        self.breakpoints.clear();
        self.initializing = false;
    }

    pub fn current(&self) -> SuperdenseTime {
        self.current
    }

    pub fn set_current(&mut self, time: f64, index: u64) {
        self.current = SuperdenseTime::new(self.quantize(time), index);
    }

    pub fn set_current_point(&mut self, point: SuperdenseTime) {
        self.set_current(point.time, point.index);
    }

    pub fn set_initializing(&mut self, initializing: bool) {
        self.initializing = initializing;
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing
    }

    pub fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    pub fn breakpoints_mut(&mut self) -> &mut BreakpointTable {
        &mut self.breakpoints
    }

    /// Register a wake-up request and return the point actually scheduled.
    ///
    /// A request at the current time is pushed to the next microstep, except
    /// during initialization where the current index is still available.
    pub fn fire_at(
        &mut self,
        requester: &str,
        time: f64,
        index: u64,
    ) -> Result<SuperdenseTime, KernelError> {
        let time = self.quantize(time);
        if time < self.current.time || time.is_nan() {
            return Err(KernelError::InvalidFireAt {
                actor: requester.to_string(),
                requested: time,
                current: self.current.time,
            });
        }

        let index = if time == self.current.time {
            if self.initializing {
                index.max(self.current.index)
            } else {
                index.max(self.current.index + 1)
            }
        } else {
            index
        };

        let point = SuperdenseTime::new(time, index);
        if self.breakpoints.insert(point) {
            trace!(requester, %point, "breakpoint inserted");
        }
        Ok(point)
    }

    /// Real-time distance from now to the earliest pending breakpoint
    pub fn distance_to_next_breakpoint(&self) -> Option<f64> {
        self.breakpoints
            .first()
            .map(|p| (p.time - self.current.time).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexicographic_order() {
        let a = SuperdenseTime::new(1.0, 5);
        let b = SuperdenseTime::new(2.0, 0);
        let c = SuperdenseTime::new(2.0, 1);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(SuperdenseTime::new(-0.0, 3), SuperdenseTime::new(0.0, 3));
    }

    #[test]
    fn test_table_merges_duplicates() {
        let mut table = BreakpointTable::new();
        assert!(table.insert(SuperdenseTime::new(1.0, 0)));
        assert!(!table.insert(SuperdenseTime::new(1.0, 0)));
        table.insert(SuperdenseTime::new(0.5, 2));
        assert_eq!(table.len(), 2);
        assert_eq!(table.first(), Some(SuperdenseTime::new(0.5, 2)));
        assert!(table.has_earlier_than(&SuperdenseTime::new(0.5, 3)));
        assert!(!table.has_earlier_than(&SuperdenseTime::new(0.5, 2)));
        assert!(table.contains_time(1.0));
        assert!(!table.contains_time(0.7));
    }

    #[test]
    fn test_remove_through() {
        let mut table = BreakpointTable::new();
        for (t, i) in [(0.0, 0), (0.0, 1), (1.0, 0), (2.0, 0)] {
            table.insert(SuperdenseTime::new(t, i));
        }
        assert_eq!(table.remove_through(&SuperdenseTime::new(1.0, 0)), 3);
        assert_eq!(table.first(), Some(SuperdenseTime::new(2.0, 0)));
    }

    #[test]
    fn test_remove_through_largest_index() {
        let mut table = BreakpointTable::new();
        table.insert(SuperdenseTime::new(1.0, 3));
        table.insert(SuperdenseTime::new(1.0, u64::MAX));
        table.insert(SuperdenseTime::new(1.5, 0));
        assert_eq!(table.remove_through(&SuperdenseTime::new(1.0, u64::MAX)), 2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.first(), Some(SuperdenseTime::new(1.5, 0)));

        assert_eq!(table.remove_through(&SuperdenseTime::new(2.0, u64::MAX)), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_fire_at_bumps_index_at_current_time() {
        let mut clock = SuperdenseClock::new(1e-10);
        clock.set_current(2.0, 3);

        let p = clock.fire_at("a", 2.0, 0).unwrap();
        assert_eq!(p, SuperdenseTime::new(2.0, 4));

        let p = clock.fire_at("a", 2.0, 7).unwrap();
        assert_eq!(p, SuperdenseTime::new(2.0, 7));

        let p = clock.fire_at("a", 5.0, 0).unwrap();
        assert_eq!(p, SuperdenseTime::new(5.0, 0));
        assert_eq!(clock.distance_to_next_breakpoint(), Some(0.0));
    }

    #[test]
    fn test_fire_at_during_initialization_keeps_index() {
        let mut clock = SuperdenseClock::new(1e-10);
        clock.reset(0.0);
        clock.set_initializing(true);
        assert_eq!(
            clock.fire_at("clock", 0.0, 0).unwrap(),
            SuperdenseTime::new(0.0, 0)
        );
    }

    #[test]
    fn test_fire_at_in_the_past_fails() {
        let mut clock = SuperdenseClock::new(1e-10);
        clock.set_current(3.0, 0);
        assert!(matches!(
            clock.fire_at("late", 1.0, 0),
            Err(KernelError::InvalidFireAt { .. })
        ));
    }

    #[test]
    fn test_quantize() {
        let clock = SuperdenseClock::new(0.25);
        assert_eq!(clock.quantize(0.3), 0.25);
        assert_eq!(clock.quantize(0.4), 0.5);
        assert_eq!(clock.quantize(f64::INFINITY), f64::INFINITY);
    }
}

//! Data recorder (scope) block

use std::collections::VecDeque;

use crate::actor::{Actor, ActorContext};
use crate::error::KernelError;
use crate::time::SuperdenseTime;

/// Recorder: logs its input at every committed iteration
///
/// Each sample carries the superdense time stamp of the iteration and the
/// input value, `None` when the input was absent. Recording happens in
/// `postfire`, so rejected continuous steps leave no trace.
///
/// # Example
///
/// ```ignore
/// let rec = net.add_actor("rec", Recorder::new());
/// net.connect(x, 0, rec, 0)?;
/// director.run(&mut net)?;
/// for (t, v) in net.actor_as::<Recorder>(rec).unwrap().samples() {
///     println!("{t}: {v:?}");
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    samples: VecDeque<(SuperdenseTime, Option<f64>)>,
    capacity: Option<usize>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the most recent `capacity` samples
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: Some(capacity),
        }
    }

    /// Samples in recording order, oldest first
    pub fn samples(&self) -> &VecDeque<(SuperdenseTime, Option<f64>)> {
        &self.samples
    }

    /// Present values in recording order
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().filter_map(|(_, v)| *v).collect()
    }

    /// Most recent present sample
    pub fn last(&self) -> Option<(SuperdenseTime, f64)> {
        self.samples
            .iter()
            .rev()
            .find_map(|(t, v)| v.map(|v| (*t, v)))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Actor for Recorder {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        0
    }

    fn initialize(&mut self, _ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        self.samples.clear();
        Ok(())
    }

    fn fire(&mut self, _ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        Ok(())
    }

    fn postfire(&mut self, ctx: &mut ActorContext<'_>) -> Result<bool, KernelError> {
        let value = ctx.get_f64(0)?;
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                return Ok(true);
            }
            if self.samples.len() == capacity {
                self.samples.pop_front();
            }
        }
        self.samples.push_back((ctx.model_time(), value));
        Ok(true)
    }

    fn is_fire_functional(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::CurrentTime;
    use crate::director::FixedPointDirector;
    use crate::network::Network;
    use fixsim_types::FixedPointSettings;

    #[test]
    fn test_recorder_capacity() {
        let mut net = Network::new();
        let t = net.add_actor("t", CurrentTime);
        let rec = net.add_actor("rec", Recorder::with_capacity(2));
        net.connect(t, 0, rec, 0).unwrap();

        let settings = FixedPointSettings {
            period: 1.0,
            ..Default::default()
        };
        let mut director = FixedPointDirector::new(settings).unwrap();
        director.run_iterations(&mut net, 5).unwrap();

        let rec = net.actor_as::<Recorder>(rec).unwrap();
        assert_eq!(rec.values(), vec![3.0, 4.0]);
        assert_eq!(rec.last().map(|(_, v)| v), Some(4.0));
    }

    #[test]
    fn test_recorder_capacity_keeps_newest_window() {
        let mut net = Network::new();
        let t = net.add_actor("t", CurrentTime);
        let rec = net.add_actor("rec", Recorder::with_capacity(3));
        net.connect(t, 0, rec, 0).unwrap();

        let settings = FixedPointSettings {
            period: 1.0,
            ..Default::default()
        };
        let mut director = FixedPointDirector::new(settings).unwrap();
        director.run_iterations(&mut net, 200).unwrap();

        let rec = net.actor_as::<Recorder>(rec).unwrap();
        assert_eq!(rec.len(), 3);
        let times: Vec<f64> = rec.samples().iter().map(|(t, _)| t.time).collect();
        assert_eq!(times, vec![197.0, 198.0, 199.0]);
        assert_eq!(rec.values(), vec![197.0, 198.0, 199.0]);
    }

    #[test]
    fn test_recorder_time_stamps_microsteps() {
        let mut net = Network::new();
        let t = net.add_actor("t", CurrentTime);
        let rec = net.add_actor("rec", Recorder::new());
        net.connect(t, 0, rec, 0).unwrap();

        let mut director = FixedPointDirector::new(FixedPointSettings::default()).unwrap();
        director.run_iterations(&mut net, 3).unwrap();

        let rec = net.actor_as::<Recorder>(rec).unwrap();
        let stamps: Vec<SuperdenseTime> = rec.samples().iter().map(|(t, _)| *t).collect();
        assert_eq!(
            stamps,
            vec![
                SuperdenseTime::new(0.0, 0),
                SuperdenseTime::new(0.0, 1),
                SuperdenseTime::new(0.0, 2),
            ]
        );
    }
}

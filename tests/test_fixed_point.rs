//! Synchronous-reactive execution tests
//!
//! Feedback through a delay, causality loops, the monotonicity contract,
//! convergence bounds, stopping, and hierarchical composition.

use std::time::Instant;

use fixsim::prelude::*;

fn director() -> FixedPointDirector {
    FixedPointDirector::new(FixedPointSettings::default()).unwrap()
}

/// Pre(0) -> +1 -> back into Pre
fn counter_loop() -> (Network, ActorId) {
    let mut net = Network::new();
    let pre = net.add_actor("pre", Pre::new(0.0));
    let inc = net.add_actor("inc", Function::new(1, |u| u[0] + 1.0));
    let rec = net.add_actor("rec", Recorder::new());
    net.connect(pre, 0, inc, 0).unwrap();
    net.connect(inc, 0, pre, 0).unwrap();
    net.connect(inc, 0, rec, 0).unwrap();
    (net, rec)
}

#[test]
fn test_feedback_through_delay_counts() {
    let (mut net, rec) = counter_loop();
    let stats = director().run_iterations(&mut net, 3).unwrap();

    let rec = net.actor_as::<Recorder>(rec).unwrap();
    assert_eq!(rec.values(), vec![1.0, 2.0, 3.0]);
    assert_eq!(stats.iterations, 3);
    assert_eq!(stats.final_time, SuperdenseTime::new(0.0, 3));
}

#[test]
fn test_strict_cycle_reports_causality_loop() {
    let mut net = Network::new();
    let a = net.add_actor("a", Scale::new(1.0));
    let b = net.add_actor("b", Scale::new(1.0));
    net.connect(a, 0, b, 0).unwrap();
    net.connect(b, 0, a, 0).unwrap();

    match director().run(&mut net) {
        Err(KernelError::CausalityLoop {
            actor,
            port,
            unresolved,
        }) => {
            assert_eq!(actor, "a");
            assert_eq!(port, "input0");
            assert!(unresolved.contains(&"a".to_string()));
            assert!(unresolved.contains(&"b".to_string()));
        }
        other => panic!("expected a causality loop, got {other:?}"),
    }
}

#[test]
fn test_reject_policy_fails_at_schedule_time() {
    let mut net = Network::new();
    let a = net.add_actor("a", Scale::new(1.0));
    let b = net.add_actor("b", Scale::new(1.0));
    net.connect(a, 0, b, 0).unwrap();
    net.connect(b, 0, a, 0).unwrap();

    let settings = FixedPointSettings {
        cycle_policy: CyclePolicy::Reject,
        ..Default::default()
    };
    let mut director = FixedPointDirector::new(settings).unwrap();
    assert!(matches!(
        director.run(&mut net),
        Err(KernelError::NotSchedulable { .. })
    ));
}

/// Non-strict actor whose prefire flips to false on its second call
struct Fickle {
    calls: usize,
}

impl Actor for Fickle {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn prefire(&mut self, _ctx: &mut ActorContext<'_>) -> Result<bool, KernelError> {
        self.calls += 1;
        Ok(self.calls == 1)
    }

    fn fire(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        if !ctx.is_output_known(0) {
            ctx.put(0, 1.0)?;
        }
        Ok(())
    }

    fn is_strict(&self) -> bool {
        false
    }

    fn output_depends_on_input(&self, _input: usize, _output: usize) -> bool {
        false
    }
}

/// Non-strict actor that emits a different value every firing
struct Drifting {
    value: f64,
}

impl Actor for Drifting {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn fire(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        self.value += 1.0;
        ctx.put(0, self.value)
    }

    fn is_strict(&self) -> bool {
        false
    }

    fn output_depends_on_input(&self, _input: usize, _output: usize) -> bool {
        false
    }
}

fn self_loop(actor: impl Actor) -> Network {
    let mut net = Network::new();
    let x = net.add_actor("x", actor);
    let gain = net.add_actor("gain", Scale::new(1.0));
    net.connect(x, 0, gain, 0).unwrap();
    net.connect(gain, 0, x, 0).unwrap();
    net
}

#[test]
fn test_prefire_retraction_is_a_monotonicity_error() {
    let mut net = self_loop(Fickle { calls: 0 });
    match director().run(&mut net) {
        Err(KernelError::Monotonicity { actor, .. }) => assert_eq!(actor, "x"),
        other => panic!("expected a monotonicity error, got {other:?}"),
    }
}

#[test]
fn test_changing_output_is_a_monotonicity_error() {
    let mut net = self_loop(Drifting { value: 0.0 });
    let err = director().run(&mut net).unwrap_err();
    assert!(matches!(err, KernelError::Monotonicity { .. }));
}

#[test]
fn test_chain_converges_within_actor_count_passes() {
    let mut net = Network::new();
    // inserted sink-first so that insertion order is the worst case
    let rec = net.add_actor("rec", Recorder::new());
    let mut prev = rec;
    for i in 0..8 {
        let gain = net.add_actor(format!("g{i}"), Scale::new(2.0));
        net.connect(gain, 0, prev, 0).unwrap();
        prev = gain;
    }
    let src = net.add_actor("src", Const::new(1.0));
    net.connect(src, 0, prev, 0).unwrap();

    let stats = director().run_iterations(&mut net, 1).unwrap();
    assert!(stats.passes <= net.len());
    assert_eq!(
        net.actor_as::<Recorder>(rec).unwrap().values(),
        vec![256.0]
    );
}

#[test]
fn test_iteration_limit_ends_run() {
    let (mut net, rec) = counter_loop();
    let settings = FixedPointSettings {
        iterations: 5,
        ..Default::default()
    };
    let stats = FixedPointDirector::new(settings)
        .unwrap()
        .run(&mut net)
        .unwrap();
    assert_eq!(stats.iterations, 5);
    assert_eq!(net.actor_as::<Recorder>(rec).unwrap().len(), 5);
}

#[test]
fn test_stop_request_skips_commit() {
    let mut director = director();
    let handle = director.stop_handle();

    let mut net = Network::new();
    let pre = net.add_actor("pre", Pre::new(0.0));
    let inc = net.add_actor(
        "inc",
        Function::new(1, move |u| {
            let next = u[0] + 1.0;
            if next >= 5.0 {
                handle.request_stop();
            }
            next
        }),
    );
    let rec = net.add_actor("rec", Recorder::new());
    net.connect(pre, 0, inc, 0).unwrap();
    net.connect(inc, 0, pre, 0).unwrap();
    net.connect(inc, 0, rec, 0).unwrap();

    let stats = director.run(&mut net).unwrap();
    assert_eq!(stats.iterations, 4);
    assert_eq!(
        net.actor_as::<Recorder>(rec).unwrap().values(),
        vec![1.0, 2.0, 3.0, 4.0]
    );
}

#[test]
fn test_period_advances_model_time() {
    let mut net = Network::new();
    let t = net.add_actor("t", CurrentTime);
    let rec = net.add_actor("rec", Recorder::new());
    net.connect(t, 0, rec, 0).unwrap();

    let settings = FixedPointSettings {
        period: 0.01,
        synchronize_to_real_time: true,
        ..Default::default()
    };
    let started = Instant::now();
    let stats = FixedPointDirector::new(settings)
        .unwrap()
        .run_iterations(&mut net, 4)
        .unwrap();

    assert!(started.elapsed().as_secs_f64() >= 0.03);
    assert!((stats.final_time.time - 0.04).abs() < 1e-9);
    assert_eq!(stats.final_time.index, 0);
}

#[test]
fn test_fire_functional_is_cached_per_version() {
    let mut net = Network::new();
    let src = net.add_actor("src", Const::new(1.0));
    let gain = net.add_actor("gain", Scale::new(2.0));
    net.connect(src, 0, gain, 0).unwrap();

    let mut director = director();
    assert!(!director.is_strict());
    assert!(director.is_fire_functional(&net));

    let rec = net.add_actor("rec", Recorder::new());
    net.connect(gain, 0, rec, 0).unwrap();
    assert!(!director.is_fire_functional(&net));
}

fn doubler() -> CompositeActor {
    let mut inner = Network::new();
    let gain = inner.add_actor("gain", Scale::new(2.0));
    inner.expose_input(&[(gain, 0)]).unwrap();
    inner.expose_output(gain, 0).unwrap();
    CompositeActor::new(inner)
}

#[test]
fn test_composite_transfers_values() {
    let mut net = Network::new();
    let src = net.add_actor("src", Const::new(3.0));
    let comp = net.add_actor("doubler", doubler());
    let rec = net.add_actor("rec", Recorder::new());
    net.connect(src, 0, comp, 0).unwrap();
    net.connect(comp, 0, rec, 0).unwrap();

    director().run_iterations(&mut net, 2).unwrap();
    assert_eq!(
        net.actor_as::<Recorder>(rec).unwrap().values(),
        vec![6.0, 6.0]
    );
}

#[test]
fn test_composite_inside_feedback_loop() {
    let mut net = Network::new();
    let pre = net.add_actor("pre", Pre::new(1.0));
    let comp = net.add_actor("doubler", doubler());
    let rec = net.add_actor("rec", Recorder::new());
    net.connect(pre, 0, comp, 0).unwrap();
    net.connect(comp, 0, pre, 0).unwrap();
    net.connect(comp, 0, rec, 0).unwrap();

    director().run_iterations(&mut net, 3).unwrap();
    assert_eq!(
        net.actor_as::<Recorder>(rec).unwrap().values(),
        vec![2.0, 4.0, 8.0]
    );
}

#[test]
fn test_composite_with_inner_delay() {
    // the delay lives inside the composite, so the outer loop is closed
    // through a non-strict actor whose output does not wait for its input
    let mut inner = Network::new();
    let pre = inner.add_actor("pre", Pre::new(0.0));
    inner.expose_input(&[(pre, 0)]).unwrap();
    inner.expose_output(pre, 0).unwrap();

    let mut net = Network::new();
    let comp = net.add_actor("delay", CompositeActor::new(inner));
    let inc = net.add_actor("inc", Function::new(1, |u| u[0] + 1.0));
    let rec = net.add_actor("rec", Recorder::new());
    net.connect(comp, 0, inc, 0).unwrap();
    net.connect(inc, 0, comp, 0).unwrap();
    net.connect(inc, 0, rec, 0).unwrap();

    director().run_iterations(&mut net, 3).unwrap();
    assert_eq!(
        net.actor_as::<Recorder>(rec).unwrap().values(),
        vec![1.0, 2.0, 3.0]
    );
}

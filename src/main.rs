use std::process::ExitCode;

use fixsim::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Thermostat: x' = +1 while heating, -1 while cooling
fn thermostat() -> Result<(Network, ActorId, ActorId, ActorId), KernelError> {
    let mut net = Network::new();

    let mut modal = ModalModel::new(1, 1);
    let heating = modal.add_mode(Mode::new("heating").output(|_| 1.0));
    let cooling = modal.add_mode(Mode::new("cooling").output(|_| -1.0));
    modal.add_transition(Transition::new(heating, cooling).when(Relation::at_least(0, 1.0)));
    modal.add_transition(Transition::new(cooling, heating).when(Relation::at_most(0, 0.0)));

    let x = net.add_actor("x", Integrator::new(0.0));
    let controller = net.add_actor("controller", modal);
    let rec = net.add_actor("rec", Recorder::new());
    net.connect(x, 0, controller, 0)?;
    net.connect(controller, 0, x, integrator::DERIVATIVE)?;
    net.connect(x, 0, rec, 0)?;
    Ok((net, x, controller, rec))
}

fn load_settings() -> Result<KernelSettings, KernelError> {
    match std::env::args().nth(1) {
        Some(path) => Ok(KernelSettings::from_file(path)?),
        None => Ok(KernelSettings {
            continuous: ContinuousSettings {
                stop_time: Some(3.0),
                max_step_size: 0.5,
                ..Default::default()
            },
            ..Default::default()
        }),
    }
}

fn run() -> Result<(), KernelError> {
    let settings = load_settings()?;
    info!(solver = %settings.continuous.solver, "running thermostat model");

    let (mut net, x, controller, rec) = thermostat()?;
    let mut director = ContinuousDirector::from_kernel_settings(&settings)?;
    let stats = director.run(&mut net)?;

    if let Some(modal) = net.actor_as::<ModalModel>(controller) {
        for (time, from, to) in modal.switches() {
            println!(
                "{time}: {} -> {}",
                modal.mode_name(*from).unwrap_or("?"),
                modal.mode_name(*to).unwrap_or("?")
            );
        }
    }
    if let Some(rec) = net.actor_as::<Recorder>(rec) {
        println!("{} samples recorded", rec.len());
    }
    if let Some(x) = net.actor_as::<Integrator>(x) {
        println!("x = {:.6}", x.value());
    }
    match serde_json::to_string_pretty(&stats) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("cannot serialize run statistics: {e}"),
    }
    Ok(())
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

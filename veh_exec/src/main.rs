//! Main vehicle executable entry point.
//!
//! # Architecture
//!
//! The executable wires the core tasks of the vehicle software together:
//!
//!     - Initialise the session and logging
//!     - Load parameter files for each task
//!     - Build the message bus and entity registry
//!     - Spawn the vehicle supervisor and the path controller
//!     - Run until interrupted or the configured duration elapses
//!
//! Sensor drivers, navigation, maneuver executors and the plan engine are
//! separate producers on the bus and are not part of this executable.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::info;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use msg_if::bus::Bus;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};
use veh_lib::{
    path_ctrl::{
        params::PathCtrlParams,
        vector_field::{VectorFieldLaw, VectorFieldParams},
        PathCtrl,
    },
    task::{EntityRegistry, TaskRunner},
    veh_sup::{params::VehSupParams, VehSup},
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Period at which the main thread polls for shutdown.
const SHUTDOWN_POLL_PERIOD_S: f64 = 0.1;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Command line options.
#[derive(Debug, StructOpt)]
#[structopt(name = "veh_exec", about = "Triton vehicle executable")]
struct Opt {
    /// Directory containing the parameter files.
    #[structopt(long, default_value = "params")]
    params_dir: PathBuf,

    /// Directory sessions are created under.
    #[structopt(long, default_value = "sessions")]
    sessions_dir: PathBuf,

    /// Id of this system on the bus.
    #[structopt(long, default_value = "1")]
    system_id: u16,

    /// Stop after this many seconds, for bench runs.
    #[structopt(long)]
    duration: Option<f64>,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session =
        Session::new("veh_exec", &opt.sessions_dir).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution
    info!("Triton Vehicle Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let sup_params: VehSupParams = util::params::load(&opt.params_dir.join("veh_sup.toml"))
        .wrap_err("Could not load vehicle supervisor params")?;

    let path_ctrl_params: PathCtrlParams =
        util::params::load(&opt.params_dir.join("path_ctrl.toml"))
            .wrap_err("Could not load path controller params")?;

    let vector_field_params: VectorFieldParams =
        util::params::load(&opt.params_dir.join("vector_field.toml"))
            .wrap_err("Could not load vector field params")?;

    info!("Exec parameters loaded");

    // ---- BUILD AND SPAWN TASKS ----

    let bus = Bus::new();
    let entities = EntityRegistry::new();

    let mut runner = TaskRunner::new(bus.clone(), opt.system_id, entities);

    runner.spawn(Box::new(VehSup::new(sup_params)));
    runner.spawn(Box::new(PathCtrl::new(
        path_ctrl_params,
        Box::new(VectorFieldLaw::new(vector_field_params)),
    )));

    // ---- RUN ----

    let stop = runner.stop_flag();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::Relaxed);
    })
    .wrap_err("Failed to set the interrupt handler")?;

    let stop = runner.stop_flag();
    let start = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        if let Some(duration) = opt.duration {
            if start.elapsed().as_secs_f64() >= duration {
                info!("Run duration elapsed");
                break;
            }
        }

        thread::sleep(Duration::from_secs_f64(SHUTDOWN_POLL_PERIOD_S));
    }

    // ---- SHUTDOWN ----

    info!("Shutting down");
    runner.join();

    Ok(())
}

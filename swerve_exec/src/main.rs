//! Main swerve executable entry point.
//!
//! # Architecture
//!
//! The executable runs the four swerve modules of the vehicle against
//! simulated hardware:
//!
//!     - Initialise the session, logging and all modules
//!     - Main loop, once every 20 ms:
//!         - Reload the tuning file if the tune flag is raised
//!         - Swerve module processing and archive writing
//!     - Save the final module states to the session
//!
//! # Usage
//!
//! ```text
//! swerve_exec <speed_ms> <angle_deg> <duration_s>
//! ```
//!
//! `SWERVE_SW_ROOT` must point to the root of the repository so that the
//! parameter files and sessions directory can be found.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::{eyre, WrapErr}, Report};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::env;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use swerve_lib::{
    module_ctrl::{InputData, ModulePosition, Params, SwerveModule},
    optimizer::ModuleState,
    telemetry::RecordingTelemetry,
    tuning::TomlTuning,
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    module::{CyclicModule, State},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.02;

/// Number of cycles between module state reports and tuning file reloads.
const REPORT_PERIOD_CYCLES: u64 = 50;

const MODULE_PARAMS_FILE: &str = "swerve_module.toml";

const TUNING_PARAMS_FILE: &str = "swerve_tuning.toml";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// State of a module saved at the end of the run.
#[derive(Serialize)]
struct FinalState {
    position: ModulePosition,
    state: ModuleState,
    drive_position_m: f64,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "swerve_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Swerve Module Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- ARGUMENTS ----

    let args: Vec<String> = env::args().collect();
    debug!("CLI arguments: {:?}", args);

    if args.len() != 4 {
        return Err(eyre!(
            "Expected 3 arguments (speed_ms angle_deg duration_s), found {}",
            args.len() - 1
        ));
    }

    let speed_ms: f64 = args[1].parse().wrap_err("Invalid speed")?;
    let angle_deg: f64 = args[2].parse().wrap_err("Invalid angle")?;
    let duration_s: f64 = args[3].parse().wrap_err("Invalid duration")?;

    if !duration_s.is_finite() || duration_s < 0.0 {
        return Err(eyre!("Duration must be a positive number of seconds"));
    }

    let desired = ModuleState::new(speed_ms, angle_deg);
    info!("Demand: {:?} for {} s", desired, duration_s);

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let telemetry = RecordingTelemetry::new();
    let mut modules = Vec::new();

    for position in ModulePosition::ALL.iter() {
        let mut module = SwerveModule::simulated(
            *position,
            Params::default(),
            Box::new(telemetry.clone())
        );
        if let Err(e) = module.init(MODULE_PARAMS_FILE, &session) {
            error!("Swerve module {} initialisation failed: {}", position, e);
            return Err(e)
                .wrap_err_with(|| format!("Failed to initialise swerve module {}", position));
        }

        modules.push(module);
    }

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    let num_cycles = (duration_s / CYCLE_PERIOD_S).round() as u64;
    let input = InputData {
        desired: Some(desired),
        open_loop: false,
    };

    info!("Begining main loop, {} cycles\n", num_cycles);

    for cycle in 0..num_cycles {

        let cycle_start_instant = Instant::now();

        // ---- TUNING ----

        if cycle % REPORT_PERIOD_CYCLES == 0 {
            match TomlTuning::load(TUNING_PARAMS_FILE) {
                Ok(tuning) => for m in modules.iter_mut() {
                    m.poll_tuning(&tuning);
                },
                Err(e) => debug!("No tuning loaded: {}", e)
            }
        }

        // ---- MODULE PROCESSING ----

        for m in modules.iter_mut() {
            let (cmd, report) = m.cycle(&input)
                .wrap_err("Swerve module processing failed")?;

            if cycle % REPORT_PERIOD_CYCLES == 0 {
                info!(
                    "{}: {:?}, mode {:?}, cmd {:?}",
                    m.position(), m.get_state(), report.turn_mode, cmd
                );
            }
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(CYCLE_PERIOD_S)
            .checked_sub(cycle_dur)
        {
            Some(d) => thread::sleep(d),
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - CYCLE_PERIOD_S
                );
            }
        }
    }

    // ---- SHUTDOWN ----

    let final_states: Vec<FinalState> = modules
        .iter()
        .map(|m| FinalState {
            position: m.position(),
            state: m.get_state(),
            drive_position_m: m.drive_position_m(),
        })
        .collect();

    for s in final_states.iter() {
        info!("Final {}: {:?}", s.position, s.state);
    }

    session.save("final_states.json", final_states);
    session.save("telemetry.json", telemetry.snapshot());

    info!("End of execution");

    session.exit();

    Ok(())
}

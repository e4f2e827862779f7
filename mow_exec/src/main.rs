//! Main mower executable entry point.
//!
//! # Architecture
//!
//! The executable runs the mower core against the simulated platform:
//!
//!     - Load the parameters, preferring the stored settings over
//!       `mower.toml`, and restore the persisted fault counters and lifetime
//!       statistics
//!     - Main loop:
//!         - Bridge command processing (from a script)
//!         - One iteration of the core, which runs every due task
//!         - Telemetry archiving
//!         - Advance the simulated time
//!     - Persist the fault counters and statistics
//!
//! The simulated robot starts on its charging dock. Without a script it is
//! left in Off for `IDLE_RUN_S`, which exercises the idle battery switch off.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::{eyre, WrapErr}, Report};
use log::{debug, info, warn};
use std::env;

// Internal
use mow_lib::{
    fault::FaultKind,
    hal::{sim::SimHal, Hal},
    params::MowerParams,
    persist::{self, FilePersistence, ParamsSource, Persistence, PersistError},
    robot::Robot,
};
use util::{
    archive::Archiver,
    host,
    logger::logger_init,
    script_interpreter::{PendingCmds, ScriptInterpreter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Simulated duration of one main loop iteration.
const LOOP_PERIOD_MS: u64 = 10;

/// Interval between telemetry archive rows.
const ARCHIVE_PERIOD_MS: u64 = 1000;

/// Interval between status snapshots saved to the session.
const STATUS_SAVE_PERIOD_MS: u64 = 10_000;

/// How long to keep running after the last scripted command.
const SETTLE_S: f64 = 5.0;

/// How long to run without a script.
const IDLE_RUN_S: f64 = 90.0;

/// Distance from the start position to the perimeter wire.
///
/// Units: meters
const BOUNDARY_M: f64 = 3.0;

/// The charging contacts touch within this distance of the start position.
///
/// Units: meters
const DOCK_M: f64 = 0.1;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new("mow_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    let store = FilePersistence::new(
        host::get_mower_sw_root()
            .wrap_err("The software root is not set")?
            .join("store")
    );

    let (params, source) = persist::load_params(
        &store,
        || util::params::load::<MowerParams>("mower.toml")
    );

    logger_init(&params.log, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Mower Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // Unreadable parameters are a configuration fault, not a reason to stop
    match source {
        ParamsSource::Store => info!("Parameters loaded from the settings store"),
        ParamsSource::File { ref store_err } => {
            if let Some(e) = store_err {
                warn!("Stored settings unreadable ({})", e);
            }
            info!("Parameters loaded from mower.toml");
        },
        ParamsSource::Defaults { ref store_err, ref file_err } => {
            if let Some(e) = store_err {
                warn!("Stored settings unreadable ({})", e);
            }
            warn!("Could not load the mower parameters ({}), using the defaults", file_err);
        }
    }

    // ---- SCRIPT ----

    let args: Vec<String> = env::args().collect();
    debug!("CLI arguments: {:?}", args);

    let mut script = match args.len() {
        1 => {
            info!("No script provided, running idle for {} s", IDLE_RUN_S);
            None
        },
        2 => {
            info!("Loading script from \"{}\"", &args[1]);
            let si = ScriptInterpreter::new(&args[1])
                .wrap_err("Failed to load script")?;
            info!(
                "Loaded script lasts {:.02} s and contains {} commands\n",
                si.get_duration(),
                si.get_num_cmds()
            );
            Some(si)
        },
        n => return Err(eyre!("Expected either zero or one argument, found {}", n - 1))
    };

    // ---- INITIALISE THE ROBOT ----

    let seed_store = source.should_seed_store() && params.are_valid().is_ok();

    let mut robot = Robot::new(SimHal::with_physics(BOUNDARY_M), params)
        .wrap_err("Failed to initialise the robot")?;

    if source.is_fault() {
        robot.report_fault(FaultKind::EepromData);
    }

    // From now on the store takes precedence over mower.toml
    if seed_store {
        match store.save_settings(robot.params()) {
            Ok(()) => info!("Settings store initialised from mower.toml"),
            Err(e) => warn!("Could not initialise the settings store: {}", e)
        }
    }

    if let Some(p) = robot.hal_mut().physics_mut() {
        p.dock_m = Some(DOCK_M);
    }

    match store.load_fault_counters() {
        Ok(records) => robot.restore_fault_records(&records),
        Err(PersistError::NotFound(_)) => info!("No stored fault counters"),
        Err(e) => warn!("Fault counters not restored: {}", e)
    }
    match store.load_totals() {
        Ok(totals) => robot.restore_totals(&totals),
        Err(PersistError::NotFound(_)) => info!("No stored statistics"),
        Err(e) => warn!("Statistics not restored: {}", e)
    }

    let mut archiver = Archiver::from_path(&session, "telemetry.csv")
        .wrap_err("Failed to create the telemetry archive")?;

    // ---- MAIN LOOP ----

    info!("Beginning main loop\n");

    let mut end_s = if script.is_none() { Some(IDLE_RUN_S) } else { None };

    loop {
        let now_ms = robot.hal().millis();
        let now_s = now_ms as f64 / 1000.0;

        // ---- BRIDGE COMMANDS ----

        if let Some(ref mut si) = script {
            match si.get_pending_cmds(now_s) {
                PendingCmds::None => (),
                PendingCmds::Some(cmds) => {
                    for cmd in cmds.iter() {
                        let response = robot.handle_bridge_cmd(cmd);
                        info!("Bridge command {} ({:?}): {:?}", cmd.seq, cmd.body, response);
                    }
                },
                PendingCmds::EndOfScript => {
                    if end_s.is_none() {
                        info!("End of script reached, stopping in {} s", SETTLE_S);
                        end_s = Some(now_s + SETTLE_S);
                    }
                }
            }
        }

        // ---- CORE ----

        robot.loop_once().wrap_err("Main loop iteration failed")?;

        // ---- TELEMETRY ----

        if now_ms % ARCHIVE_PERIOD_MS == 0 {
            if let Err(e) = archiver.serialise(robot.status().row()) {
                warn!("Could not archive telemetry: {}", e);
            }
        }
        if now_ms % STATUS_SAVE_PERIOD_MS == 0 {
            session.save("status.json", robot.status());
        }

        // ---- CYCLE MANAGEMENT ----

        if end_s.map_or(false, |t| now_s >= t) {
            break;
        }

        robot.hal_mut().advance(LOOP_PERIOD_MS);
    }

    // ---- SHUTDOWN ----

    let status = robot.status();
    info!(
        "Finished in {:?} after {:.1} s, {:.2} min mowed",
        status.state,
        status.time_ms as f64 / 1000.0,
        status.stats.mow_time_trip_min
    );
    session.save("status.json", status);

    store.save_fault_counters(&robot.fault_records())
        .wrap_err("Could not save the fault counters")?;
    store.save_totals(&robot.totals())
        .wrap_err("Could not save the statistics")?;

    info!("End of execution");
    session.exit();

    Ok(())
}


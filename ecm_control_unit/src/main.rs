//! # ECM Control Unit
//!
//! Bench bring-up for the ECM drill rig: loads `rig.toml`, starts the rig on
//! the configured HAL driver, runs the E-STOP monitor and the bring-up
//! sequence, then shuts down (axis disabled, pump 0, relay off).
//!
//! Ctrl-C cancels the sequence at the next pulse; shutdown still runs.

use clap::Parser;
use ecm_common::config::{ConfigLoader, LogLevel};
use ecm_common::consts;
use ecm_common::hal::clock::{Clock, SystemClock};
use ecm_common::hal::sensor::PowerSensor;
use ecm_common::rig::config::RigConfig;
use ecm_control_unit::instrument::Instrumentation;
use ecm_control_unit::journal::{JournalSink, JsonlJournal, MemoryJournal};
use ecm_control_unit::rt::{rt_enabled, rt_setup};
use ecm_control_unit::sequence::{BringUp, BringUpPlan};
use ecm_control_unit::Rig;
use ecm_hal::drivers::builtin_registry;
use ecm_hal::drivers::simulation::{SimClock, SimPowerSensor};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// ECM Control Unit: Z-axis motion, pump and safety bring-up
#[derive(Parser, Debug)]
#[command(name = "ecm_control_unit")]
#[command(version)]
#[command(about = "Bring-up sequence for the ECM drill rig")]
struct Args {
    /// Path to the rig configuration TOML.
    #[arg(long, default_value = consts::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// HAL driver name (overrides `[driver] name`).
    #[arg(long)]
    driver: Option<String>,

    /// Append journal records to this JSON-lines file.
    #[arg(long, value_name = "FILE")]
    journal: Option<PathBuf>,

    /// Use the virtual clock (simulation driver only).
    #[arg(long)]
    virtual_time: bool,

    /// CPU core to pin the control thread to (rt feature).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (rt feature).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level, overrides `log_level`).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = RigConfig::load(&args.config);
    setup_tracing(&args, config.as_ref().ok().map(|c| c.shared.log_level));

    info!("ECM Control Unit v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = match config {
        Ok(config) => run(&args, config),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("ECM Control Unit shutdown complete");
}

fn run(args: &Args, mut config: RigConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(name) = &args.driver {
        config.driver.name = name.clone();
    }
    config.validate()?;
    info!(
        "Config OK: driver={}, {} steps/mm, feed {}..{} mm/s",
        config.driver.name,
        config.motion.steps_per_mm(),
        config.motion.min_feed_mm_s,
        config.motion.max_feed_mm_s,
    );

    let registry = builtin_registry();
    let driver = registry.create_for(&config)?;
    let simulated = driver.name() == consts::DEFAULT_DRIVER;

    let clock: Arc<dyn Clock> = match (args.virtual_time, simulated) {
        (true, true) => Arc::new(SimClock::new()),
        (true, false) => {
            warn!("--virtual-time ignored for driver '{}'", driver.name());
            Arc::new(SystemClock::new())
        }
        _ => Arc::new(SystemClock::new()),
    };

    let instruments = if simulated {
        let ecm: Arc<dyn PowerSensor> = Arc::new(SimPowerSensor::powered("ecm", 12.0));
        let pump: Arc<dyn PowerSensor> = Arc::new(SimPowerSensor::powered("pump", 12.0));
        Instrumentation::new(ecm, Some(pump))
    } else {
        warn!("No instrumentation fitted; journal readings will be zero");
        Instrumentation::absent()
    };

    let mut journal: Box<dyn JournalSink> = match &args.journal {
        Some(path) => {
            info!("Journal: {}", path.display());
            Box::new(JsonlJournal::open(path)?)
        }
        None => Box::new(MemoryJournal::new()),
    };

    rt_setup(args.cpu_core, args.rt_priority)?;
    if rt_enabled() {
        info!(
            "RT setup complete (cpu_core={}, priority={})",
            args.cpu_core, args.rt_priority
        );
    }

    let mut rig = Rig::start(config, driver, clock, instruments)?;

    let cancel = rig.cancel_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        cancel.store(true, Ordering::Release);
    })?;

    rig.start_monitor()?;

    let outcome = BringUp::new(&mut rig, journal.as_mut(), BringUpPlan::default()).run();

    let report = rig.shutdown();
    info!("Shutdown order: {:?}", report.order());

    let summary = outcome?;
    info!(
        "Bring-up ended {:?}: {} moves, {} journal errors",
        summary.end,
        summary.moves.len(),
        summary.journal_errors
    );
    if !report.is_clean() {
        return Err("shutdown completed with errors".into());
    }
    Ok(())
}

/// Base log level: `--verbose`, else `log_level` from the config, else INFO.
fn log_level(verbose: bool, configured: Option<LogLevel>) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        configured.map_or(Level::INFO, Level::from)
    }
}

/// Setup tracing subscriber based on CLI arguments and the config file.
fn setup_tracing(args: &Args, configured: Option<LogLevel>) {
    let level = log_level(args.verbose, configured);

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}

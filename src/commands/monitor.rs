//! Monitor command handler.
//!
//! Acquires the counter set, starts the sampling thread and prints every
//! tick until Ctrl+C.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;

use crate::core::config::MonitorConfig;
use crate::core::system_monitor::{
    CounterRegistry, IdleSampler, MetricsCollector, MonitorRuntime, SamplingLoop, TickReport,
};
use crate::platform;
use crate::ui::formatters::render_report;

/// Arguments shared by `sysmon` and `sysmon monitor`.
pub fn args() -> Vec<Arg> {
    vec![
        Arg::new("interval")
            .short('i')
            .long("interval")
            .value_name("MS")
            .help("Sampling interval in milliseconds (100-5000)")
            .value_parser(clap::value_parser!(u64)),
        Arg::new("json")
            .long("json")
            .help("Print one JSON object per tick")
            .action(ArgAction::SetTrue),
        Arg::new("once")
            .long("once")
            .help("Print a single report and exit")
            .action(ArgAction::SetTrue),
        Arg::new("no-flash")
            .long("no-flash")
            .help("Never highlight warning groups")
            .action(ArgAction::SetTrue),
        Arg::new("free-mem")
            .long("free-mem")
            .value_name("GIB")
            .help("Warn when free memory drops to this many GiB (0.5-4)")
            .value_parser(clap::value_parser!(f64)),
        Arg::new("pressure")
            .long("pressure")
            .value_name("FRACTION")
            .help("Warn when memory pressure reaches this fraction (0.5-0.99)")
            .value_parser(clap::value_parser!(f64)),
        Arg::new("save")
            .long("save")
            .help("Persist the given settings as the new defaults")
            .action(ArgAction::SetTrue),
    ]
}

pub fn command() -> Command {
    Command::new("monitor")
        .about("Watch system load and bottlenecks")
        .args(args())
}

/// Apply command line overrides on top of the persisted settings.
pub fn apply_overrides(config: &mut MonitorConfig, matches: &ArgMatches) {
    if let Some(ms) = matches.get_one::<u64>("interval") {
        config.set_interval_ms(*ms);
    }
    if let Some(gib) = matches.get_one::<f64>("free-mem") {
        config.set_free_memory_threshold(*gib);
    }
    if let Some(fraction) = matches.get_one::<f64>("pressure") {
        config.set_memory_pressure_threshold(*fraction);
    }
    if matches.get_flag("no-flash") {
        config.flash_warnings = false;
    }
}

/// Execute the monitor command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let mut config = MonitorConfig::load().context("Failed to load configuration")?;
    apply_overrides(&mut config, matches);

    if matches.get_flag("save") {
        config.save().context("Failed to save configuration")?;
        println!("{} Settings saved", "✓".green());
    }

    let json_output = matches.get_flag("json");
    let once = matches.get_flag("once");

    let runtime = start_runtime(&config)?;

    let shutdown = runtime.shutdown_handle();
    ctrlc::set_handler(move || {
        let _ = shutdown.send(());
    })
    .context("Failed to set Ctrl+C handler")?;

    let mut reports = runtime.subscribe();
    let printer = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to build printer runtime")?;

    let result: Result<()> = printer.block_on(async {
        while reports.changed().await.is_ok() {
            let Some(report) = reports.borrow_and_update().clone() else {
                continue;
            };
            print_report(&report, json_output)?;
            if once {
                break;
            }
        }
        Ok(())
    });

    let released = runtime.shutdown();
    log::debug!("Monitor stopped, {} counters released", released);
    result
}

fn start_runtime(config: &MonitorConfig) -> Result<MonitorRuntime> {
    let backend = platform::default_backend().context("No counter backend available")?;
    let registry = CounterRegistry::new(backend);
    let profile = platform::probe_system_profile();

    let hardware = match platform::detect_hardware_monitor() {
        Ok(monitor) => Some(monitor),
        Err(e) => {
            log::info!("GPU monitoring disabled: {}", e);
            None
        }
    };

    let collector = MetricsCollector::open(Arc::clone(&registry), profile, hardware)
        .context("Failed to acquire performance counters")?;

    let times = platform::default_system_times().context("No CPU time source available")?;
    let idle = IdleSampler::new(times, profile.logical_cores);

    let sampling = SamplingLoop::new(
        collector,
        idle,
        config.thresholds(),
        config.interval(),
        config.flash_warnings,
    );

    MonitorRuntime::start(sampling, registry).context("Failed to start sampling")
}

fn print_report(report: &TickReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else {
        println!("{}", render_report(report));
    }
    Ok(())
}

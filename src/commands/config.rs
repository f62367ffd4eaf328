use crate::core::config::{
    MonitorConfig, FREE_MEMORY_RANGE, INTERVAL_RANGE_MS, MEMORY_PRESSURE_RANGE,
};
use anyhow::{Context, Result};
use clap::{ArgMatches, Command};
use colored::Colorize;

pub fn command() -> Command {
    Command::new("config")
        .about("Show or reset the persisted monitor settings")
        .subcommand(Command::new("show").about("Print the current settings"))
        .subcommand(Command::new("reset").about("Restore default settings"))
        .subcommand(Command::new("path").about("Print the settings file location"))
}

pub fn execute(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("reset", _)) => reset(),
        Some(("path", _)) => {
            println!("{}", MonitorConfig::get_config_path()?.display());
            Ok(())
        }
        _ => show(),
    }
}

fn show() -> Result<()> {
    let config = MonitorConfig::load().context("Failed to load configuration")?;

    println!("\n{}", "MONITOR SETTINGS".bold().bright_cyan());
    println!("{}", "=".repeat(50));
    for (name, value, range) in setting_rows(&config) {
        println!("  {:<22} {:<10} {}", name.bold(), value, range.dimmed());
    }
    println!();
    Ok(())
}

fn reset() -> Result<()> {
    MonitorConfig::default()
        .save()
        .context("Failed to save configuration")?;
    println!("{} Settings restored to defaults", "✓".green());
    Ok(())
}

fn setting_rows(config: &MonitorConfig) -> Vec<(&'static str, String, String)> {
    vec![
        (
            "Free memory warning",
            format!("{:.2} GiB", config.free_memory_threshold_gib),
            format!("({} - {})", FREE_MEMORY_RANGE.0, FREE_MEMORY_RANGE.1),
        ),
        (
            "Memory pressure",
            format!("{:.0}%", config.memory_pressure_threshold * 100.0),
            format!(
                "({:.0}% - {:.0}%)",
                MEMORY_PRESSURE_RANGE.0 * 100.0,
                MEMORY_PRESSURE_RANGE.1 * 100.0
            ),
        ),
        (
            "Interval",
            format!("{} ms", config.interval_ms),
            format!("({} - {})", INTERVAL_RANGE_MS.0, INTERVAL_RANGE_MS.1),
        ),
        (
            "Flash warnings",
            if config.flash_warnings { "on" } else { "off" }.to_string(),
            String::new(),
        ),
    ]
}

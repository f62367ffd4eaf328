use anyhow::Result;
use clap::Command;

use sysmon::commands;

fn main() -> Result<()> {
    sysmon::init_logging();

    let matches = Command::new("sysmon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Live system load and bottleneck monitor")
        .args(commands::monitor::args())
        .subcommand(commands::monitor::command())
        .subcommand(commands::config::command())
        .get_matches();

    match matches.subcommand() {
        Some(("monitor", sub_matches)) => commands::monitor(sub_matches),
        Some(("config", sub_matches)) => commands::config::execute(sub_matches),
        _ => commands::monitor(&matches),
    }
}

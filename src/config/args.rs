//! Console-mode argument parsing using clap

use clap::Parser;

/// Directives recognized when the process runs from a console
///
/// A plain launch with no directive leaves the service registry untouched
/// and exits immediately.
#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct ConsoleArgs {
    /// Install the service into the OS registry and start it
    #[arg(long, conflicts_with = "remove")]
    pub install: bool,

    /// Stop the service if needed and remove it from the OS registry
    #[arg(long)]
    pub remove: bool,
}

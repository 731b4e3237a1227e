//! gradesync CLI: the `gradesync` command.

mod cli;
mod commands;
mod support;
mod telemetry;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    telemetry::init(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Init { path, force } => commands::init::run(path, force),

        Commands::Match {
            roster,
            target,
            json,
        } => commands::match_roster::run(roster, target, json),

        Commands::Apply {
            roster,
            target,
            config,
            roster_id,
            total_marks,
            status_column,
            settle_ms,
            report_dir,
            prompt,
            json,
        } => commands::apply::run(commands::apply::Args {
            roster,
            target,
            config,
            roster_id,
            total_marks,
            status_column,
            settle_ms,
            report_dir,
            prompt,
            json,
        }),
    }
}

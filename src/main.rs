//! dirsync CLI - continuous hot-to-backup directory mirroring
//!
//! Usage: dirsync <COMMAND>
//!
//! Commands:
//!   run     Watch the hot directory and mirror changes until interrupted
//!   view    Show recorded sync activity

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    dirsync::logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => commands::run::cmd_run(args.into()),
        Commands::View {
            log_file,
            filter,
            from,
            to,
        } => commands::view::cmd_view(&log_file, filter.as_deref(), from.as_deref(), to.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

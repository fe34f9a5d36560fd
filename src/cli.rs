use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use dirsync::config::{CliOverrides, DEFAULT_LOG_FILE};

/// dirsync - mirror a hot directory into a backup directory as it changes
#[derive(Parser, Debug)]
#[command(name = "dirsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the hot directory and mirror every change until interrupted
    Run(RunArgs),

    /// Show recorded sync activity
    View {
        /// Event log file
        #[arg(long = "log", value_name = "FILE", default_value = DEFAULT_LOG_FILE)]
        log_file: PathBuf,

        /// Only entries whose path contains this text
        #[arg(long)]
        filter: Option<String>,

        /// Only entries at or after this time (RFC 3339)
        #[arg(long, value_name = "TIME")]
        from: Option<String>,

        /// Only entries at or before this time (RFC 3339)
        #[arg(long, value_name = "TIME")]
        to: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory to watch
    #[arg(long = "hotdir", value_name = "DIR")]
    pub hot_dir: Option<PathBuf>,

    /// Directory that receives the mirrored copies
    #[arg(long = "backup", value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,

    /// File holding the pending event queue between runs
    #[arg(long = "state", value_name = "FILE")]
    pub state_file: Option<PathBuf>,

    /// Event log file [default: sync_log.json]
    #[arg(long = "log", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Number of mirror workers [default: available CPUs]
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Config file [default: ~/.config/dirsync/config.toml]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Mirror the whole hot directory once at startup
    #[arg(long)]
    pub initial_sync: bool,
}

impl From<RunArgs> for CliOverrides {
    fn from(args: RunArgs) -> Self {
        CliOverrides {
            hot_dir: args.hot_dir,
            backup_dir: args.backup_dir,
            state_file: args.state_file,
            log_file: args.log_file,
            workers: args.workers,
            config_file: args.config,
            initial_sync: args.initial_sync,
        }
    }
}

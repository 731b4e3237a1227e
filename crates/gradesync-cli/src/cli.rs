use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "gradesync",
    about = "gradesync: reconcile a roster against a rendered target and apply verified grade updates",
    version
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug); GRADESYNC_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StatusColumnArg {
    Auto,
    On,
    Off,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default gradesync.toml into a directory
    Init {
        /// Directory to initialize
        #[arg(default_value = ".")]
        path: String,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Dry run: match roster rows against target rows without writing
    Match {
        /// Path to roster JSONL
        #[arg(long)]
        roster: String,

        /// Path to target JSON document
        #[arg(long)]
        target: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Match, revalidate and write grades/status to the target with read-back verification
    Apply {
        /// Path to roster JSONL
        #[arg(long)]
        roster: String,

        /// Path to target JSON document
        #[arg(long)]
        target: String,

        /// Config file (missing file means defaults)
        #[arg(long, default_value = gradesync_core::DEFAULT_CONFIG_FILE)]
        config: String,

        /// Roster identifier used to key the mismatch log
        #[arg(long)]
        roster_id: Option<String>,

        /// Total-marks value written before the batch
        #[arg(long)]
        total_marks: Option<String>,

        /// Whether status is written alongside grades
        #[arg(long, value_enum)]
        status_column: Option<StatusColumnArg>,

        /// Use one settle delay (milliseconds) for every wait
        #[arg(long)]
        settle_ms: Option<u64>,

        /// Directory for the append-only mismatch log (default: target's directory)
        #[arg(long)]
        report_dir: Option<String>,

        /// Ask for missing configuration on stdin
        #[arg(long)]
        prompt: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

use crate::export::ExportFormat;
use clap::{Parser, Subcommand};

/// Command-line interface definition for rBioSync
/// Biometric attendance ingestion with SQLite
#[derive(Parser)]
#[command(
    name = "rbiosync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Pull biometric punches, stitch daily attendance and heal data gaps",
    long_about = None
)]
pub struct Cli {
    /// Override database path (useful for tests or custom DB)
    #[arg(global = true, long = "db")]
    pub db: Option<String>,

    /// Run in test mode (no config file update)
    #[arg(global = true, long = "test", hide = true)]
    pub test: bool,

    /// Debug-level logging (RUST_LOG still wins when set)
    #[arg(global = true, long, short = 'v')]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and configuration
    Init,

    /// Manage the configuration file (view or edit)
    Config {
        #[arg(long = "print", help = "Print the current configuration")]
        print_config: bool,

        #[arg(
            long = "edit",
            help = "Edit the configuration file (default editor: $EDITOR, or nano/notepad)"
        )]
        edit_config: bool,

        #[arg(
            long = "editor",
            help = "Specify the editor to use (vim, nano, or custom path)"
        )]
        editor: Option<String>,
    },

    /// Run the ingestion daemon (puller, stitcher, gap detector, watchdog, admin API)
    Run,

    /// Run one sync now: incremental, or historical with --from/--to
    Sync {
        #[arg(long, requires = "to", help = "Backfill start (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)")]
        from: Option<String>,

        #[arg(long, requires = "from", help = "Backfill end (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)")]
        to: Option<String>,

        #[arg(long, help = "Page size for this run")]
        limit: Option<u32>,
    },

    /// Show the sync ledger, the cursor and (if the daemon runs) worker health
    Status,

    /// Compare gateway and local counts now and print the recommended window
    Gaps,

    /// List attendance records
    List {
        #[arg(long, short, help = "YYYY, YYYY-MM, YYYY-MM-DD or START:END (default: current month)")]
        period: Option<String>,

        #[arg(long, short, help = "Only this employee code")]
        employee: Option<String>,
    },

    /// Assign a shift to an employee, or list assigned shifts
    Shift {
        #[arg(long, required_unless_present = "list", requires_all = ["start", "end"])]
        employee: Option<String>,

        #[arg(long, help = "Shift start (HH:MM)")]
        start: Option<String>,

        #[arg(long, help = "Shift end (HH:MM)")]
        end: Option<String>,

        #[arg(long, conflicts_with = "employee")]
        list: bool,
    },

    /// Mark shift-assigned employees without a record as absent
    Finalize {
        #[arg(long, help = "Day to finalize (YYYY-MM-DD)")]
        date: String,
    },

    /// Export attendance records
    Export {
        #[arg(long, value_enum, default_value = "csv")]
        format: ExportFormat,

        #[arg(long, value_name = "FILE")]
        file: String,

        #[arg(
            long,
            value_name = "RANGE",
            help = "YYYY, YYYY-MM, YYYY-MM-DD or START:END (default: current month)"
        )]
        range: Option<String>,

        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Print the internal log table
    Log {
        #[arg(long = "print", help = "Print rows from the internal log table")]
        print: bool,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

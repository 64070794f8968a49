//! Script Trace Studio CLI
//!
//! Instruments a script, runs it in a sandbox and prints the reconstructed
//! call tree.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use script_trace_studio::commands::{
    display_schema, display_version, execute_instrument, execute_recover, execute_run,
    validate_args, validate_trace_file, RunArgs,
};
use script_trace_studio::utils::config::{
    DEFAULT_ENTRY_POINT, DEFAULT_RUN_TIMEOUT, DEFAULT_SWEEP_GRACE,
};

/// Script Trace Studio - call-tree tracing for event-loop scripts
#[derive(Parser, Debug)]
#[command(name = "script-trace")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a program and reconstruct its call tree
    Run {
        /// Program source file
        file: PathBuf,

        /// Wall-clock budget in milliseconds
        #[arg(long, default_value_t = DEFAULT_RUN_TIMEOUT.as_millis() as u64)]
        timeout_ms: u64,

        /// Delay between the root's end and the orphan sweep, in milliseconds
        #[arg(long, default_value_t = DEFAULT_SWEEP_GRACE.as_millis() as u64)]
        grace_ms: u64,

        /// Function name preferred as the tree root
        #[arg(long, default_value = DEFAULT_ENTRY_POINT)]
        entry: String,

        /// Output path for the JSON trace (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the instrumented program before running it
        #[arg(long)]
        show_source: bool,

        /// Do not echo program console output
        #[arg(short, long)]
        quiet: bool,

        /// Interleave event-trace annotations with console output
        #[arg(long)]
        annotate: bool,
    },

    /// Print the instrumented form of a program without running it
    Instrument {
        /// Program source file
        file: PathBuf,

        /// Write to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rebuild a call tree from a saved console log
    Recover {
        /// Log file, one line per console message
        file: PathBuf,

        /// Output path for the JSON trace (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a trace JSON file
    Validate {
        /// Path to trace JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display schema information
    Schema {
        /// Show full schema details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Run {
            file,
            timeout_ms,
            grace_ms,
            entry,
            output,
            show_source,
            quiet,
            annotate,
        } => {
            let args = RunArgs {
                file,
                timeout_ms,
                grace_ms,
                entry,
                output,
                show_source,
                quiet,
                annotate,
            };

            validate_args(&args)?;
            execute_run(args)?;
        }

        Commands::Instrument { file, output } => {
            execute_instrument(&file, output)?;
        }

        Commands::Recover { file, output } => {
            execute_recover(&file, output)?;
        }

        Commands::Validate { file } => {
            validate_trace_file(&file)?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}

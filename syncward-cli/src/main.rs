//! syncward: fail-closed git synchronization with audit evidence.
//!
//! # Usage
//!
//! ```text
//! syncward run [--repo <path>] [--apply | --dry-run] [--allow-stash] [--include-untracked]
//!              [--require-clean] [--auto-switch] [--allow-detached]
//!              [--expected-upstream <remote/branch>] [--expected-remote-url <regex>]
//!              [--restore-stash-on-failure] [--lock-timeout-secs <n>]
//!              [--evidence-dir <path>] [--config <file>]
//! syncward show [<run-id>] [--repo <path>] [--evidence-dir <path>] [--json]
//! syncward lock [--repo <path>] [--evidence-dir <path>] [--json]
//! ```
//!
//! Each boolean policy flag has a `--no-` form (`--no-allow-stash`, ...) that
//! forces the policy off over any config file; the last of a pair wins.
//!
//! `run` prints only marker lines on stdout; diagnostics go to stderr. A
//! configuration that cannot be loaded still produces a recorded run that
//! fails with `invalid_config` (exit 1).

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::{lock::LockArgs, run::RunArgs, show::ShowArgs};

/// Exit code for `show`/`lock` errors; clap uses the same code for bad arguments.
const EXIT_USAGE: i32 = 2;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "syncward",
    version,
    about = "Fail-closed, fast-forward-only git synchronization with audit evidence",
    long_about = None,
)]
struct Cli {
    /// Emit diagnostic logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    /// Only log warnings and errors.
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synchronize a repository with its upstream (dry-run unless --apply).
    Run(RunArgs),

    /// Show the summary and phase history of a recorded run.
    Show(ShowArgs),

    /// Report who holds the repository lock and whether it is stale.
    Lock(LockArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.quiet);

    let result = match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Show(args) => args.run().map(|()| 0),
        Commands::Lock(args) => args.run().map(|()| 0),
    };
    let code = match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            EXIT_USAGE
        }
    };
    std::process::exit(code);
}

fn init_tracing(json: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

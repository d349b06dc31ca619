//! Testbed CLI
//!
//! Provisions, starts, and stops a local cluster of peer-to-peer daemons.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use testbed_ops::{Testbed, TestbedConfig};
use tracing_subscriber::{EnvFilter, fmt};

/// Testbed: run a local cluster of peer-to-peer daemons.
#[derive(Parser, Debug)]
#[command(name = "testbed", version, about)]
struct Cli {
    /// Directory holding one subdirectory per node.
    ///
    /// Defaults to `$TESTBED_ROOT`, then `$HOME/testbed`.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Daemon executable to run.
    ///
    /// Defaults to `$TESTBED_DAEMON`, then `ipfs`.
    #[arg(long, global = true)]
    daemon: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create and configure a fresh set of nodes.
    Init(commands::init::InitArgs),
    /// Start every node's daemon.
    Start(commands::lifecycle::StartArgs),
    /// Stop every node's daemon.
    #[command(alias = "kill")]
    Stop,
    /// Stop, then start every node's daemon.
    Restart(commands::lifecycle::StartArgs),
    /// Open a shell configured to talk to one node.
    Shell(commands::shell::ShellArgs),
    /// Print an attribute of one node.
    Get(commands::get::GetArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(usage_exit_code(&e));
        }
    };

    let config = TestbedConfig::from_env_with(cli.root, cli.daemon)?;
    tracing::debug!(
        root = %config.root.display(),
        daemon = %config.daemon.program.display(),
        "resolved testbed"
    );
    let testbed = Testbed::new(config)?;

    match cli.command {
        Command::Init(args) => commands::init::run(&testbed, &args).await,
        Command::Start(args) => commands::lifecycle::start(&testbed, &args).await,
        Command::Stop => commands::lifecycle::stop(&testbed).await,
        Command::Restart(args) => commands::lifecycle::restart(&testbed, &args).await,
        Command::Shell(args) => commands::shell::run(&testbed, args),
        Command::Get(args) => commands::get::run(&testbed, &args),
    }
}

/// `--help` and `--version` succeed; every other parse failure is an error.
fn usage_exit_code(err: &clap::Error) -> i32 {
    if err.exit_code() == 0 { 0 } else { 1 }
}

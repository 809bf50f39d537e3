use std::path::PathBuf;

use clap::{Parser, Subcommand};
use config::Config;
use orchestrator::{JobOutcome, JobReport, Orchestrator};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod bindings;
mod bridge;
mod calls;
mod chain;
mod config;
mod error;
mod orchestrator;
mod retry;
#[cfg(test)]
mod testing;
mod token;
mod wallets;

#[derive(Parser, Debug)]
#[command(version, about = "Bridge lzUSDC out of Fantom for a batch of wallets")]
struct Cli {
    /// CSV export of the wallet sheet
    #[arg(long, default_value = "wallets.csv")]
    sheet: PathBuf,

    /// TOML file overriding the built-in chains, tokens and routes
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Top up gas on Fantom if needed and bridge lzUSDC to each wallet's network
    Run,
    /// Send the bridged stablecoin to each wallet's exchange address
    Forward,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "bridge_batch=debug,info" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(cli.config.as_deref())?;
    let rows = wallets::read_sheet(&cli.sheet, config.top_up_decimals()?)?;
    let orchestrator = Orchestrator::from_config(config)?;
    info!(wallets = rows.len(), command = ?cli.command, "starting batch");

    let mut summary = Summary::default();
    for row in rows {
        let job = match row {
            Ok(job) => job,
            Err(err) => {
                warn!(%err, "skipping row");
                summary.skipped += 1;
                continue;
            }
        };
        let report = match cli.command {
            Command::Run => orchestrator.run(&job).await,
            Command::Forward => orchestrator.forward(&job).await,
        };
        summary.record(&report);
    }

    info!(
        done = summary.done,
        nothing_to_do = summary.nothing_to_do,
        indeterminate = summary.indeterminate,
        failed = summary.failed,
        skipped = summary.skipped,
        "batch finished"
    );
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    done: usize,
    nothing_to_do: usize,
    indeterminate: usize,
    failed: usize,
    skipped: usize,
}

impl Summary {
    fn record(&mut self, report: &JobReport) {
        let wallet = report.wallet;
        let row = report.row;
        match &report.outcome {
            JobOutcome::Done { tx } => {
                info!(row, %wallet, %tx, "done");
                self.done += 1;
            }
            JobOutcome::NothingToDo { reason } => {
                info!(row, %wallet, %reason, "nothing to do");
                self.nothing_to_do += 1;
            }
            JobOutcome::Indeterminate { hash } => {
                warn!(row, %wallet, %hash, "no receipt yet, check before rerunning");
                self.indeterminate += 1;
            }
            JobOutcome::Failed(err) => {
                match report.submitted.last() {
                    Some(last) => error!(row, %wallet, %err, last_tx = %last.hash, "failed"),
                    None => error!(row, %wallet, %err, "failed"),
                }
                self.failed += 1;
            }
        }
    }
}

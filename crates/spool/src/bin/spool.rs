use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use spool::common::setup::setup_logging;
use spool::runner::run_scenario;
use spool::scenario::{Scenario, format_configuration};

#[derive(Parser)]
#[command(author, version, about)]
struct RootOptions {
    /// Turn on a more detailed log output
    #[arg(long, global = true, env = "SPOOL_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand)]
enum SubCommand {
    /// Replay a scenario file against a fresh slot pool and print the outcome
    Run(RunOpts),
    /// Print the effective pool configuration
    Config(ConfigOpts),
}

#[derive(Parser)]
struct RunOpts {
    /// Path to a TOML scenario
    scenario: PathBuf,
}

#[derive(Parser)]
struct ConfigOpts {
    /// Scenario whose `[pool]` table is used; defaults are printed without it
    scenario: Option<PathBuf>,
}

fn load_scenario(path: &PathBuf) -> anyhow::Result<Scenario> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read scenario {}", path.display()))?;
    Scenario::parse(&content).with_context(|| format!("Invalid scenario {}", path.display()))
}

async fn command_run(opts: RunOpts) -> anyhow::Result<()> {
    let scenario = load_scenario(&opts.scenario)?;
    log::info!(
        "Replaying {} events from {}",
        scenario.events.len(),
        opts.scenario.display()
    );
    let report = run_scenario(&scenario).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn command_config(opts: ConfigOpts) -> anyhow::Result<()> {
    let scenario = match opts.scenario {
        Some(path) => load_scenario(&path)?,
        None => Scenario::default(),
    };
    let config = scenario.pool.to_configuration()?;
    print!("{}", format_configuration(&config));
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let opts = RootOptions::parse();
    setup_logging(opts.verbose);

    match opts.subcmd {
        SubCommand::Run(opts) => command_run(opts).await,
        SubCommand::Config(opts) => command_config(opts),
    }
}

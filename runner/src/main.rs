//! CLI entry point for brokerbot.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use brokerbot::{Amount, OrderRequest, Side, Symbol};
use brokerbot_runner::config::Config;
use brokerbot_runner::error::Error;
use brokerbot_runner::execution::{self, Provider, RunOptions};

#[derive(Parser)]
#[command(name = "brokerbot")]
#[command(about = "Place the same equity order in every account of every brokerage login")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Only use these brokerages (default: every enabled one)
    #[arg(long, value_enum, value_delimiter = ',')]
    brokers: Vec<Provider>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and list accounts with balances
    Accounts,

    /// Report holdings in every account
    Holdings,

    /// Buy or sell symbols in every account
    Trade {
        /// buy or sell
        side: Side,

        /// Share count, or "all" to sell the whole position
        amount: Amount,

        /// Ticker symbols
        #[arg(required = true)]
        symbols: Vec<Symbol>,

        /// Quote and preview, but do not submit
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt (for automation/cron)
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    if let Err(e) = dotenvy::dotenv() {
        log::debug!("no .env loaded: {e}");
    }

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config
        .apply_env()
        .with_context(|| format!("applying {}", brokerbot_runner::config::WEBHOOK_ENV))?;

    let notifier = execution::notifier_for(&config).context("setting up notifications")?;

    let code = match cli.command {
        Command::Accounts => {
            execution::show_accounts(&config, &cli.brokers, &notifier)?;
            ExitCode::SUCCESS
        }
        Command::Holdings => {
            execution::show_holdings(&config, &cli.brokers, &notifier)?;
            ExitCode::SUCCESS
        }
        Command::Trade {
            side,
            amount,
            symbols,
            dry_run,
            force,
        } => {
            let request = OrderRequest::new(symbols, side, amount, dry_run)?;
            let opts = RunOptions {
                providers: cli.brokers,
                force,
            };
            match execution::trade(&config, &request, &opts, &notifier) {
                Ok(summary) if summary.has_errors() => ExitCode::from(2),
                Ok(_) => ExitCode::SUCCESS,
                Err(Error::Aborted(msg)) => {
                    println!("Aborted: {msg}");
                    ExitCode::SUCCESS
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    notifier.shutdown();
    Ok(code)
}

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use ratehub::cli::rates::{RateFilter, SortOrder};
use ratehub::core::log::init_logging;
use std::time::Duration;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for ratehub::AppCommand {
    fn from(cmd: Commands) -> ratehub::AppCommand {
        match cmd {
            Commands::UpdateRates { source, force } => {
                ratehub::AppCommand::UpdateRates { source, force }
            }
            Commands::ShowRates {
                currency,
                top,
                base,
                sort,
            } => ratehub::AppCommand::ShowRates(RateFilter {
                currency,
                base,
                sort,
                top,
            }),
            Commands::GetRate { from, to } => ratehub::AppCommand::GetRate { from, to },
            Commands::Status => ratehub::AppCommand::Status,
            Commands::StartParser {
                no_immediate,
                interval,
            } => ratehub::AppCommand::StartParser {
                run_immediately: !no_immediate,
                interval: interval.map(Duration::from_secs),
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch fresh rates and update the cache
    UpdateRates {
        /// Only query this source (coingecko or exchangerate)
        #[arg(short, long)]
        source: Option<String>,
        /// Fetch even if the cached rates are still fresh
        #[arg(short, long)]
        force: bool,
    },
    /// Display cached rates
    ShowRates {
        /// Only show pairs involving this currency
        #[arg(long)]
        currency: Option<String>,
        /// Show at most this many pairs, after sorting
        #[arg(long)]
        top: Option<usize>,
        /// Sort by pair name or by rate, highest first
        #[arg(long, value_enum, default_value_t = SortOrder::Name)]
        sort: SortOrder,
        /// Express every cached currency against this one
        #[arg(long)]
        base: Option<String>,
    },
    /// Look up a single rate from the cache
    GetRate {
        /// Currency to convert from
        from: String,
        /// Currency to convert to
        to: String,
    },
    /// Display cache health and tracked pairs
    Status,
    /// Keep rates updated in the background until interrupted
    StartParser {
        /// Wait a full interval before the first update
        #[arg(long)]
        no_immediate: bool,
        /// Seconds between updates, overriding the config file
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => ratehub::cli::setup::setup_at_path(path),
            None => ratehub::cli::setup::setup(),
        },
        Some(cmd) => ratehub::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

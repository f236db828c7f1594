pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::scheduler::RatesScheduler;
use crate::core::updater::RatesUpdater;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub enum AppCommand {
    UpdateRates {
        source: Option<String>,
        force: bool,
    },
    ShowRates(cli::rates::RateFilter),
    GetRate {
        from: String,
        to: String,
    },
    Status,
    StartParser {
        run_immediately: bool,
        /// Overrides `update_interval_secs`.
        interval: Option<Duration>,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("ratehub starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!(
        base = %config.base_currency,
        fiat = config.fiat_currencies.len(),
        crypto = config.crypto_currencies.len(),
        data_dir = %config.data_dir()?.display(),
        "Loaded config"
    );

    let updater = Arc::new(RatesUpdater::from_config(&config)?);
    match command {
        AppCommand::UpdateRates { source, force } => {
            cli::update::run(&updater, source.as_deref(), force).await?;
        }
        AppCommand::ShowRates(filter) => {
            cli::rates::show_rates(updater.cache(), &filter, &config.base_currency)?;
        }
        AppCommand::GetRate { from, to } => {
            cli::rates::get_rate(updater.cache(), &from, &to)?;
        }
        AppCommand::Status => cli::status::status(&config, &updater)?,
        AppCommand::StartParser {
            run_immediately,
            interval,
        } => {
            let interval = parser_interval(&config, interval);
            let scheduler = RatesScheduler::new(updater, interval);
            cli::status::start_parser(&scheduler, run_immediately).await?;
        }
    }
    Ok(())
}

/// Interval for `start-parser`: the command-line override, else the config.
fn parser_interval(config: &AppConfig, interval: Option<Duration>) -> Duration {
    interval.unwrap_or_else(|| config.update_interval())
}

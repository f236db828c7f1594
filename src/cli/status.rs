use super::ui;
use crate::core::config::AppConfig;
use crate::core::scheduler::{RatesScheduler, SchedulerStats};
use crate::core::updater::RatesUpdater;
use anyhow::{Context, Result};
use comfy_table::Cell;

/// Prints cache health followed by every tracked pair and its cached rate.
pub fn status(config: &AppConfig, updater: &RatesUpdater) -> Result<()> {
    let rates = updater.check_rates_available();
    let cache = updater.cache();

    println!("\n{}", ui::style_text("Rate cache", ui::StyleType::Title));
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Property"), ui::header_cell("Value")]);
    table.add_row(vec![
        Cell::new("Status"),
        ui::status_cell(&rates.message, rates.available),
    ]);
    table.add_row(vec![
        Cell::new("Last refresh"),
        Cell::new(rates.last_refresh.map_or_else(
            || "never".to_string(),
            |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        )),
    ]);
    table.add_row(vec![Cell::new("Cached pairs"), Cell::new(rates.rates_count)]);
    table.add_row(vec![
        Cell::new("Cache TTL"),
        Cell::new(format!("{}s", cache.ttl().as_secs())),
    ]);
    table.add_row(vec![
        Cell::new("Update interval"),
        Cell::new(format!("{}s", config.update_interval().as_secs())),
    ]);
    table.add_row(vec![
        Cell::new("Sources"),
        Cell::new(updater.source_names().join(", ")),
    ]);
    table.add_row(vec![
        Cell::new("Snapshot file"),
        Cell::new(cache.snapshot_path().display()),
    ]);
    println!("{table}");

    println!("\n{}", ui::style_text("Tracked pairs", ui::StyleType::Title));
    let mut pairs = ui::new_styled_table();
    pairs.set_header(vec![
        ui::header_cell("Pair"),
        ui::header_cell("Description"),
        ui::header_cell("Cached rate"),
    ]);
    let snapshot = cache.load_snapshot();
    for (pair, description) in config.tracked_pairs() {
        let rate = snapshot.as_ref().and_then(|s| s.rate(&pair));
        pairs.add_row(vec![
            Cell::new(pair.to_string()),
            Cell::new(description),
            ui::rate_cell(rate),
        ]);
    }
    println!("{pairs}");
    Ok(())
}

/// Runs the background scheduler until Ctrl-C, then stops it and prints its
/// statistics.
pub async fn start_parser(scheduler: &RatesScheduler, run_immediately: bool) -> Result<()> {
    scheduler.start(run_immediately);
    println!(
        "{} every {}s. Press Ctrl-C to stop.",
        ui::style_text("Rates parser started", ui::StyleType::Success),
        scheduler.get_stats().interval.as_secs()
    );

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;

    println!("\nStopping...");
    scheduler.stop().await;
    print_stats(&scheduler.get_stats());
    Ok(())
}

fn print_stats(stats: &SchedulerStats) {
    ui::print_separator();
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Scheduler"), ui::header_cell("Value")]);
    table.add_row(vec![Cell::new("Updates"), Cell::new(stats.update_count)]);
    table.add_row(vec![
        Cell::new("Errors"),
        ui::status_cell(&stats.error_count.to_string(), stats.error_count == 0),
    ]);
    table.add_row(vec![
        Cell::new("Success rate"),
        Cell::new(format!("{:.1}%", stats.success_rate * 100.0)),
    ]);
    table.add_row(vec![
        Cell::new("Last update"),
        Cell::new(stats.last_update.map_or_else(
            || "never".to_string(),
            |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        )),
    ]);
    println!("{table}");
}

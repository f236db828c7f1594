use super::ui;
use crate::core::updater::{RatesStatus, RatesUpdater, RunStatus, UpdateResult};
use anyhow::Result;

/// Runs one update with a spinner and prints the run summary.
///
/// Without `force` a fresh cache is reported and left alone; `None` is
/// returned in that case.
pub async fn run(
    updater: &RatesUpdater,
    source: Option<&str>,
    force: bool,
) -> Result<Option<UpdateResult>> {
    updater.select_sources(source)?;
    if !force && updater.cache().is_valid() {
        print_fresh(&updater.check_rates_available());
        return Ok(None);
    }

    let label = match source {
        Some(name) => format!("Updating rates from {name}..."),
        None => "Updating rates from all sources...".to_string(),
    };
    let pb = ui::new_spinner(&label);
    let result = updater.update_rates(source).await;
    pb.finish_and_clear();
    let result = result?;

    print_summary(&result);
    if result.status == RunStatus::Error {
        anyhow::bail!("Rates update finished with {} error(s)", result.errors.len());
    }
    Ok(Some(result))
}

fn print_fresh(status: &RatesStatus) {
    println!(
        "{}",
        ui::style_text(
            "Rate cache is up to date. Use --force to refresh anyway.",
            ui::StyleType::Success
        )
    );
    if let Some(last_refresh) = status.last_refresh {
        println!("Last refresh: {}", last_refresh.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("Cached rates: {}", status.rates_count);
}

fn print_summary(result: &UpdateResult) {
    let summary = RatesUpdater::get_update_summary(result);
    let mut lines = summary.lines();
    if let Some(headline) = lines.next() {
        let style = if result.is_success() {
            ui::StyleType::Success
        } else {
            ui::StyleType::Error
        };
        println!("{}", ui::style_text(headline, style));
    }
    for line in lines {
        if line.starts_with("  - ") {
            println!("{}", ui::style_text(line, ui::StyleType::Error));
        } else {
            println!("{line}");
        }
    }
}

use super::ui;
use crate::core::rates::{RatePair, Snapshot};
use crate::store::RateCache;
use crate::store::snapshot::lookup;
use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::Cell;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
struct RateRow {
    pair: RatePair,
    rate: f64,
    updated_at: DateTime<Utc>,
    source: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SortOrder {
    /// Alphabetical by pair
    #[default]
    Name,
    /// Highest rate first
    Value,
}

/// Filters for `show-rates`.
#[derive(Debug, Default, Clone)]
pub struct RateFilter {
    /// Only pairs that involve this code.
    pub currency: Option<String>,
    /// Express every cached currency against this code instead of listing
    /// the stored pairs.
    pub base: Option<String>,
    pub sort: SortOrder,
    /// Applied after sorting.
    pub top: Option<usize>,
}

/// Prints the cached rates. `pivot` is the configured base currency, used to
/// bridge pairs that have no direct quote when `filter.base` is set.
pub fn show_rates(cache: &RateCache, filter: &RateFilter, pivot: &str) -> Result<()> {
    let Some(snapshot) = cache.load_snapshot() else {
        println!("No cached rates. Run `ratehub update-rates` first.");
        return Ok(());
    };

    let rows = build_rows(&snapshot, filter, pivot);
    let freshness = if cache.is_valid() {
        ui::style_text("fresh", ui::StyleType::Success)
    } else {
        ui::style_text("stale", ui::StyleType::Error)
    };
    println!(
        "\n{} {}",
        ui::style_text("Exchange rates", ui::StyleType::Title),
        ui::style_text(
            &format!(
                "(updated {}, {freshness})",
                snapshot.last_refresh.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            ui::StyleType::Subtle
        )
    );

    if rows.is_empty() {
        println!("No rates match the given filters.");
        return Ok(());
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Pair"),
        ui::header_cell("Rate"),
        ui::header_cell("Updated"),
        ui::header_cell("Source"),
    ]);
    for row in &rows {
        table.add_row(vec![
            Cell::new(row.pair.to_string()),
            ui::rate_cell(Some(row.rate)),
            Cell::new(row.updated_at.format("%H:%M:%S").to_string()),
            Cell::new(&row.source),
        ]);
    }
    println!("{table}");
    println!(
        "{}",
        ui::style_text(
            &format!("{} of {} pairs", rows.len(), snapshot.pairs.len()),
            ui::StyleType::Subtle
        )
    );
    Ok(())
}

pub fn get_rate(cache: &RateCache, from: &str, to: &str) -> Result<f64> {
    let pair = RatePair::new(from, to);
    let Some(rate) = cache.get_rate(pair.from_currency(), pair.to_currency()) else {
        anyhow::bail!("No cached rate for {pair}. Run `ratehub update-rates` first.");
    };

    println!(
        "1 {} = {} {}",
        ui::style_text(pair.from_currency(), ui::StyleType::Label),
        ui::style_text(&ui::format_rate(rate), ui::StyleType::Success),
        ui::style_text(pair.to_currency(), ui::StyleType::Label),
    );
    if !cache.is_valid() {
        println!(
            "{}",
            ui::style_text(
                "Warning: cached rates are stale. Run `ratehub update-rates` to refresh.",
                ui::StyleType::Error
            )
        );
    }
    Ok(rate)
}

/// Direct or inverse quote, else the product of the two legs through `pivot`.
fn cross_rate(snapshot: &Snapshot, from: &str, to: &str, pivot: &str) -> Option<f64> {
    lookup(snapshot, &RatePair::new(from, to)).or_else(|| {
        if from == pivot || to == pivot {
            return None;
        }
        let first = lookup(snapshot, &RatePair::new(from, pivot))?;
        let second = lookup(snapshot, &RatePair::new(pivot, to))?;
        Some(first * second)
    })
}

fn build_rows(snapshot: &Snapshot, filter: &RateFilter, pivot: &str) -> Vec<RateRow> {
    let mut rows: Vec<RateRow> = match &filter.base {
        None => snapshot
            .pairs
            .iter()
            .map(|(pair, record)| RateRow {
                pair: pair.clone(),
                rate: record.rate,
                updated_at: record.updated_at,
                source: record.source.clone(),
            })
            .collect(),
        Some(base) => {
            let base = base.trim().to_uppercase();
            let pivot = pivot.trim().to_uppercase();
            let codes: BTreeSet<&str> = snapshot
                .pairs
                .keys()
                .flat_map(|pair| [pair.from_currency(), pair.to_currency()])
                .filter(|code| *code != base)
                .collect();
            codes
                .into_iter()
                .filter_map(|code| {
                    let rate = cross_rate(snapshot, code, &base, &pivot)?;
                    Some(RateRow {
                        pair: RatePair::new(code, &base),
                        rate,
                        updated_at: snapshot.last_refresh,
                        source: snapshot.source.clone(),
                    })
                })
                .collect()
        }
    };

    if let Some(currency) = &filter.currency {
        let currency = currency.trim().to_uppercase();
        rows.retain(|row| {
            row.pair.from_currency() == currency || row.pair.to_currency() == currency
        });
    }
    match filter.sort {
        SortOrder::Name => rows.sort_by(|a, b| a.pair.cmp(&b.pair)),
        SortOrder::Value => rows.sort_by(|a, b| b.rate.total_cmp(&a.rate)),
    }
    if let Some(top) = filter.top {
        rows.truncate(top);
    }
    rows
}

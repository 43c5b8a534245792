use anyhow::Result;
use serde_json::json;
use std::sync::Arc;

use crate::commands::utils::{self, CommonArgs};
use locprobe::{OutputFormat, PerfRegistry};

pub async fn handle_stats(
    unstable: Option<f64>,
    item: Option<String>,
    history: usize,
    clear: bool,
    common: &CommonArgs,
) -> Result<()> {
    let settings = utils::load_settings(common)?;
    let stats = utils::open_statistics(common, &settings, Arc::new(PerfRegistry::default()))?;

    if clear {
        match &item {
            Some(name) => stats.clear_item(name),
            None => stats.clear(),
        }
        stats.save()?;
        println!("Statistics cleared");
        return Ok(());
    }

    let summary = stats.summary();
    let unstable_items = unstable.map(|threshold| stats.unstable_items(threshold));
    let item_stats = item.as_deref().map(|name| stats.item_stats(name));
    let records = match item.as_deref() {
        Some(name) => stats.item_history(name, history),
        None => stats.recent_history(history),
    };

    match common.format {
        OutputFormat::Json => utils::print_json(&json!({
            "summary": summary,
            "item": item_stats,
            "unstable": unstable_items,
            "history": records,
        }))?,
        OutputFormat::Simple => {
            println!(
                "{} item(s), {} test(s): {} passed, {} failed ({:.1}%)",
                summary.total_items,
                summary.total_tests,
                summary.total_success,
                summary.total_failure,
                summary.average_success_rate
            );

            if let Some(Some(stat)) = &item_stats {
                println!(
                    "\n{}: {}/{} ({:.1}%), last tested {}",
                    stat.name,
                    stat.successful_tests,
                    stat.total_tests,
                    stat.success_rate(),
                    stat.last_test_time
                );
            }

            if let Some(unstable_items) = &unstable_items {
                println!("\nUnstable items:");
                for stat in unstable_items {
                    println!(
                        "  {:>5.1}%  {} ({} test(s))",
                        stat.success_rate(),
                        stat.name,
                        stat.total_tests
                    );
                }
            }

            if !records.is_empty() {
                println!("\nRecent tests:");
                for record in &records {
                    let mark = if record.success { "✓" } else { "✗" };
                    println!(
                        "  {} {} {} {}",
                        mark, record.timestamp, record.item_name, record.error_msg
                    );
                }
            }
        }
    }
    Ok(())
}

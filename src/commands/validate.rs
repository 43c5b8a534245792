use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::commands::utils::{self, CommonArgs};
use locprobe::{
    BatchEvent, BatchItem, BatchValidator, HistoryAction, LocprobeError, OutputFormat,
    PerfRegistry, SnapshotStore, record_validation_outcome,
};

pub async fn handle_validate(
    config_path: PathBuf,
    url: Option<String>,
    category: Option<String>,
    item: Option<String>,
    no_save: bool,
    common: &CommonArgs,
) -> Result<()> {
    let settings = utils::load_settings(common)?;
    let mut site = utils::load_site(&config_path)?;
    let url = utils::target_url(url, &site)?;

    let items: Vec<BatchItem> = site
        .sorted_items()
        .into_iter()
        .filter(|i| category.as_deref().is_none_or(|c| i.category == c))
        .filter(|i| item.as_deref().is_none_or(|n| i.name == n))
        .filter(|i| !i.selector().is_empty())
        .map(BatchItem::from)
        .collect();

    if items.is_empty() {
        anyhow::bail!("No items to validate in {}", config_path.display());
    }

    let perf = Arc::new(PerfRegistry::new(settings.perf_slow()));
    let stats = utils::start_statistics(common, &settings, perf.clone())?;
    let browser = utils::open_browser(common, &settings, perf).await?;
    let history = utils::open_history(&config_path, &site, &settings);

    let outcome = async {
        browser.session.navigate(&url).await?;

        let mut batch = BatchValidator::new(browser.session.clone()).spawn(items);
        let mut outcome = None;
        loop {
            tokio::select! {
                event = batch.next_event() => match event {
                    Some(BatchEvent::Progress { current, total, item_name }) => {
                        info!("[{}/{}] {}", current, total, item_name);
                    }
                    Some(BatchEvent::ItemValidated(validated)) => {
                        let mark = if validated.result.found { "✓" } else { "✗" };
                        info!("{} {} {}", mark, validated.name, validated.result.error_message());
                    }
                    Some(BatchEvent::Completed(done)) => outcome = Some(done),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted, finishing the current item");
                    batch.cancel();
                }
            }
        }

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => batch.wait().await?,
        };

        history.push_state(&site.items, HistoryAction::BatchUpdate, "*", "validation run");

        let mut snapshots = SnapshotStore::new(settings.max_snapshots);
        let mut session = browser.session.begin().await;
        for validated in &outcome.results {
            let Some(target) = site.get_item_mut(&validated.name) else {
                continue;
            };
            if let Err(e) = record_validation_outcome(
                target,
                &validated.result,
                &stats,
                &mut snapshots,
                &browser.session,
                Some(&mut session),
            )
            .await
            {
                warn!("Could not capture element of {}: {}", validated.name, e);
            }
        }
        browser.session.end(session).await;

        Ok::<_, anyhow::Error>(outcome)
    }
    .await;

    browser.close().await;
    stats.shutdown(settings.writer_shutdown_timeout()).await;
    let outcome = outcome?;

    if !no_save {
        utils::save_site(&config_path, &mut site, &history)?;
        info!("Saved {}", config_path.display());
    }

    match common.format {
        OutputFormat::Json => utils::print_json(&json!({
            "url": url,
            "passed": outcome.passed(),
            "failed": outcome.failed(),
            "cancelled": outcome.cancelled,
            "aborted": outcome.aborted,
            "results": outcome.results,
        }))?,
        OutputFormat::Simple => {
            for validated in &outcome.results {
                let result = &validated.result;
                if result.found {
                    println!(
                        "✓ {} ({} match(es) in {}, {:.0} ms)",
                        validated.name, result.match_count, result.frame_path, result.elapsed_ms
                    );
                } else {
                    println!("✗ {}: {}", validated.name, result.error_message());
                }
            }
            println!(
                "\n{} passed, {} failed{}",
                outcome.passed(),
                outcome.failed(),
                if outcome.cancelled { " (cancelled)" } else { "" }
            );
        }
    }

    if let Some(reason) = outcome.aborted {
        return Err(LocprobeError::Driver(reason).into());
    }
    Ok(())
}

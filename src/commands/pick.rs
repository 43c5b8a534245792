use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::commands::utils::{self, CommonArgs};
use locprobe::{HistoryAction, Optimizer, OutputFormat, PerfRegistry, PickedElement, PickerOutcome};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[allow(clippy::too_many_arguments)]
pub async fn handle_pick(
    config_path: PathBuf,
    name: String,
    script: PathBuf,
    url: Option<String>,
    category: Option<String>,
    timeout_secs: u64,
    common: &CommonArgs,
) -> Result<()> {
    let settings = utils::load_settings(common)?;
    let mut site = utils::load_site(&config_path)?;
    let url = utils::target_url(url, &site)?;
    let picker_script = std::fs::read_to_string(&script)
        .with_context(|| format!("Failed to read picker script {}", script.display()))?;

    let perf = Arc::new(PerfRegistry::new(settings.perf_slow()));
    let browser = utils::open_browser(common, &settings, perf).await?;

    let picked = async {
        browser.session.navigate(&url).await?;
        browser.session.start_picker(&picker_script).await?;
        info!("Select an element in the browser window");

        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        let outcome = loop {
            if let Some(outcome) = browser.session.picker_result().await? {
                break Some(outcome);
            }
            if Instant::now() >= deadline {
                warn!("No element picked within {}s", timeout_secs);
                break None;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        };

        browser.session.cleanup_picker().await;
        Ok::<_, anyhow::Error>(outcome)
    }
    .await;
    browser.close().await;

    let picked: PickedElement = match picked? {
        Some(PickerOutcome::Picked(picked)) => picked,
        Some(PickerOutcome::Cancelled) => anyhow::bail!("Picking was cancelled"),
        None => anyhow::bail!("Timed out waiting for a picked element"),
    };

    let optimizer = Optimizer::new(settings.strategy_weights.clone());
    let alternatives = optimizer.generate(&picked.to_element_info());

    let mut item = picked.into_item(&name);
    if let Some(category) = category {
        item.category = category;
    }
    item.alternatives = alternatives;

    let history = utils::open_history(&config_path, &site, &settings);
    let action = if site.get_item(&name).is_some() {
        HistoryAction::Update
    } else {
        HistoryAction::Add
    };
    history.push_state(&site.items, action, &name, "picked element");
    site.add_or_update(item);
    utils::save_site(&config_path, &mut site, &history)?;

    match common.format {
        OutputFormat::Json => utils::print_json(&site.get_item(&name))?,
        OutputFormat::Simple => {
            if let Some(item) = site.get_item(&name) {
                println!("{}: {} (frame {})", item.name, item.xpath, item.found_frame_path);
                for alt in &item.alternatives {
                    println!("  {:>3}  {:<11} {}", alt.score, alt.strategy, alt.selector);
                }
            }
        }
    }
    Ok(())
}

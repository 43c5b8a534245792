use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::commands::utils::{self, CommonArgs};
use locprobe::diff::{compare_all, render_report};
use locprobe::{OutputFormat, PerfRegistry, SnapshotStore};

pub async fn handle_diff(
    config_path: PathBuf,
    url: Option<String>,
    category: Option<String>,
    common: &CommonArgs,
) -> Result<()> {
    let settings = utils::load_settings(common)?;
    let site = utils::load_site(&config_path)?;
    let url = utils::target_url(url, &site)?;

    let items: Vec<_> = site
        .items
        .iter()
        .filter(|i| category.as_deref().is_none_or(|c| i.category == c))
        .cloned()
        .collect();
    info!("Comparing {} item(s) on {}", items.len(), url);

    let perf = Arc::new(PerfRegistry::new(settings.perf_slow()));
    let browser = utils::open_browser(common, &settings, perf.clone()).await?;

    let report = async {
        browser.session.navigate(&url).await?;
        let store = SnapshotStore::new(settings.max_snapshots);
        let mut session = browser.session.begin().await;
        let report = compare_all(&items, &store, &browser.session, &mut session).await;
        browser.session.end(session).await;
        Ok::<_, anyhow::Error>(report)
    }
    .await;
    browser.close().await;
    let report = report?;
    perf.log_summary();

    match common.format {
        OutputFormat::Json => utils::print_json(&report)?,
        OutputFormat::Simple => println!("{}", render_report(&report)),
    }
    Ok(())
}

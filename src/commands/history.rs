use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use crate::commands::utils::{self, CommonArgs};
use locprobe::history::restore_items;
use locprobe::{HistoryManager, OutputFormat, SelectorItem, SiteConfig};

/// Which way to move through the history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Undo,
    Redo,
}

impl Step {
    fn label(self) -> &'static str {
        match self {
            Step::Undo => "undo",
            Step::Redo => "redo",
        }
    }

    fn apply(self, history: &HistoryManager, site: &SiteConfig) -> Option<Vec<SelectorItem>> {
        match self {
            Step::Undo => history.undo(&site.items),
            Step::Redo => history.redo(&site.items),
        }
    }
}

/// Undo or redo the last recorded change to a site configuration
pub async fn handle_step(config_path: PathBuf, step: Step, common: &CommonArgs) -> Result<()> {
    let settings = utils::load_settings(common)?;
    let mut site = utils::load_site(&config_path)?;
    let history = utils::open_history(&config_path, &site, &settings);

    let description = match step {
        Step::Undo => history.undo_description(),
        Step::Redo => history.redo_description(),
    };
    let Some(restored) = step.apply(&history, &site) else {
        anyhow::bail!("Nothing to {} in {}", step.label(), config_path.display());
    };

    let items = restore_items(restored, &site.items);
    site.replace_items(items);
    utils::save_site(&config_path, &mut site, &history)?;
    info!("Applied {} on {}", step.label(), config_path.display());

    match common.format {
        OutputFormat::Json => utils::print_json(&json!({
            "action": step.label(),
            "change": description,
            "items": site.items.len(),
            "can_undo": history.can_undo(),
            "can_redo": history.can_redo(),
        }))?,
        OutputFormat::Simple => {
            println!(
                "{}: {} ({} item(s))",
                step.label(),
                description.unwrap_or_default(),
                site.items.len()
            );
        }
    }
    Ok(())
}

use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use crate::commands::utils::{self, CommonArgs};
use locprobe::optimizer::simplify;
use locprobe::{HistoryAction, LocprobeError, Optimizer, OutputFormat};

pub async fn handle_alternatives(
    config_path: PathBuf,
    item_name: String,
    limit: usize,
    store: bool,
    common: &CommonArgs,
) -> Result<()> {
    let settings = utils::load_settings(common)?;
    let mut site = utils::load_site(&config_path)?;

    let item = site
        .get_item(&item_name)
        .ok_or_else(|| LocprobeError::NotFound(format!("item {}", item_name)))?;
    if !item.has_snapshot() {
        anyhow::bail!(
            "Item {} has no captured element yet; run validate first",
            item_name
        );
    }

    let mut info = item.element_attributes.to_element_info();
    info.original_xpath = item.xpath.clone();

    let optimizer = Optimizer::new(settings.strategy_weights.clone());
    let mut alternatives = optimizer.generate(&info);
    alternatives.truncate(limit);
    let current_score = optimizer.score(item.selector());
    let simplest = simplify(&info);

    match common.format {
        OutputFormat::Json => utils::print_json(&json!({
            "item": item_name,
            "current": item.selector(),
            "current_score": current_score,
            "simplest": simplest,
            "alternatives": alternatives,
        }))?,
        OutputFormat::Simple => {
            println!("{} ({}): {}", item_name, current_score, item.selector());
            for alt in &alternatives {
                println!("  {:>3}  {:<11} {}", alt.score, alt.strategy, alt.selector);
            }
        }
    }

    if store {
        let history = utils::open_history(&config_path, &site, &settings);
        history.push_state(
            &site.items,
            HistoryAction::Update,
            &item_name,
            "store alternatives",
        );
        if let Some(target) = site.get_item_mut(&item_name) {
            target.alternatives = alternatives;
        }
        utils::save_site(&config_path, &mut site, &history)?;
        info!("Stored alternatives for {} in {}", item_name, config_path.display());
    }
    Ok(())
}

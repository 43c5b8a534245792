use anyhow::Result;
use serde::Serialize;

use crate::commands::utils::{self, CommonArgs};
use locprobe::optimizer::optimize_xpath;
use locprobe::{Optimizer, OutputFormat, Strategy};

#[derive(Debug, Serialize)]
struct SelectorScore {
    selector: String,
    strategy: Strategy,
    score: u32,
    optimized: String,
}

pub async fn handle_score(selectors: Vec<String>, common: &CommonArgs) -> Result<()> {
    let settings = utils::load_settings(common)?;
    let optimizer = Optimizer::new(settings.strategy_weights);

    let scores: Vec<SelectorScore> = selectors
        .into_iter()
        .map(|selector| SelectorScore {
            strategy: optimizer.classify(&selector),
            score: optimizer.score(&selector),
            optimized: optimize_xpath(&selector),
            selector,
        })
        .collect();

    match common.format {
        OutputFormat::Json => {
            if scores.len() == 1 {
                utils::print_json(&scores[0])?;
            } else {
                utils::print_json(&scores)?;
            }
        }
        OutputFormat::Simple => {
            for score in &scores {
                println!("{:>3}  {:<11} {}", score.score, score.strategy, score.selector);
            }
        }
    }
    Ok(())
}

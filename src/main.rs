#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::history::Step;
use commands::utils::CommonArgs;
use locprobe::LocprobeError;

const EXIT_SUCCESS: i32 = 0;

#[derive(Parser)]
#[command(name = "locprobe")]
#[command(about = "Validate and maintain element selectors across frames and windows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// List the frames and windows of a page
    Frames {
        /// URL to open
        url: String,
    },

    /// Validate the items of a site configuration against the live page
    Validate {
        /// Site configuration file
        config: PathBuf,

        /// URL to open instead of the configuration's own
        #[arg(long)]
        url: Option<String>,

        /// Only items of this category
        #[arg(long)]
        category: Option<String>,

        /// Only this item
        #[arg(long)]
        item: Option<String>,

        /// Do not write counters and snapshots back to the configuration
        #[arg(long)]
        no_save: bool,
    },

    /// Compare items against their captured snapshots
    Diff {
        /// Site configuration file
        config: PathBuf,

        /// URL to open instead of the configuration's own
        #[arg(long)]
        url: Option<String>,

        /// Only items of this category
        #[arg(long)]
        category: Option<String>,
    },

    /// Rank alternative selectors for an item from its captured snapshot
    Alternatives {
        /// Site configuration file
        config: PathBuf,

        /// Item name
        item: String,

        /// Maximum number of alternatives
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Save the alternatives into the configuration
        #[arg(long)]
        store: bool,
    },

    /// Robustness score of one or more selectors
    Score {
        /// Selectors to score
        #[arg(required = true)]
        selectors: Vec<String>,
    },

    /// Show recorded test statistics
    Stats {
        /// List items whose success rate is below this percentage
        #[arg(long)]
        unstable: Option<f64>,

        /// Restrict history (and --clear) to one item
        #[arg(long)]
        item: Option<String>,

        /// Number of recent test records to show
        #[arg(long, default_value = "20")]
        history: usize,

        /// Delete recorded statistics
        #[arg(long)]
        clear: bool,
    },

    /// Revert the last recorded change to a site configuration
    Undo {
        /// Site configuration file
        config: PathBuf,
    },

    /// Re-apply the last undone change to a site configuration
    Redo {
        /// Site configuration file
        config: PathBuf,
    },

    /// Let the operator pick an element in a visible browser and store it as an item
    Pick {
        /// Site configuration file
        config: PathBuf,

        /// Name of the new item
        name: String,

        /// Picker script to inject
        #[arg(long)]
        script: PathBuf,

        /// URL to open instead of the configuration's own
        #[arg(long)]
        url: Option<String>,

        /// Category of the new item
        #[arg(long)]
        category: Option<String>,

        /// Seconds to wait for a pick
        #[arg(long, default_value = "120")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() {
    let result = run().await;

    match result {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(err) => {
            // Keep the typed error when there is one; classify text otherwise
            let locprobe_err = match err.downcast::<LocprobeError>() {
                Ok(typed) => typed,
                Err(other) => LocprobeError::from(other),
            };

            // Output JSON error to stdout for programmatic consumption
            let error_json = json!({
                "error": true,
                "message": locprobe_err.to_string(),
                "exit_code": locprobe_err.exit_code()
            });
            println!(
                "{}",
                serde_json::to_string(&error_json).unwrap_or_else(|_| "{}".to_string())
            );

            eprintln!("Error: {}", locprobe_err);
            std::process::exit(locprobe_err.exit_code());
        }
    }
}

async fn run() -> Result<()> {
    // Logs go to stderr so JSON output on stdout stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "locprobe=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();
    let common = &cli.common;

    match cli.command {
        Commands::Frames { url } => commands::frames::handle_frames(url, common).await?,

        Commands::Validate {
            config,
            url,
            category,
            item,
            no_save,
        } => {
            commands::validate::handle_validate(config, url, category, item, no_save, common)
                .await?
        }

        Commands::Diff {
            config,
            url,
            category,
        } => commands::diff::handle_diff(config, url, category, common).await?,

        Commands::Alternatives {
            config,
            item,
            limit,
            store,
        } => {
            commands::alternatives::handle_alternatives(config, item, limit, store, common).await?
        }

        Commands::Score { selectors } => commands::score::handle_score(selectors, common).await?,

        Commands::Stats {
            unstable,
            item,
            history,
            clear,
        } => commands::stats::handle_stats(unstable, item, history, clear, common).await?,

        Commands::Undo { config } => {
            commands::history::handle_step(config, Step::Undo, common).await?
        }

        Commands::Redo { config } => {
            commands::history::handle_step(config, Step::Redo, common).await?
        }

        Commands::Pick {
            config,
            name,
            script,
            url,
            category,
            timeout,
        } => {
            commands::pick::handle_pick(config, name, script, url, category, timeout, common)
                .await?
        }
    }

    Ok(())
}

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::commands::utils::{self, CommonArgs};
use locprobe::{OutputFormat, PerfRegistry};

pub async fn handle_frames(url: String, common: &CommonArgs) -> Result<()> {
    info!("Discovering frames on {}", url);
    let settings = utils::load_settings(common)?;
    let perf = Arc::new(PerfRegistry::new(settings.perf_slow()));
    let browser = utils::open_browser(common, &settings, perf).await?;

    let outcome = async {
        browser.session.navigate(&url).await?;
        let frames = browser.session.discover_frames().await?;
        let windows = browser.session.windows().await?;
        Ok::<_, anyhow::Error>((frames, windows))
    }
    .await;
    browser.close().await;
    let (frames, windows) = outcome?;

    match common.format {
        OutputFormat::Json => utils::print_json(&json!({
            "url": url,
            "frames": frames,
            "windows": windows,
        }))?,
        OutputFormat::Simple => {
            println!("main");
            for frame in &frames {
                let marker = if frame.is_seat_related { " [seat]" } else { "" };
                println!(
                    "{}{}{}",
                    "  ".repeat(frame.depth),
                    frame.frame_path,
                    marker
                );
            }
            println!("\n{} window(s):", windows.len());
            for window in &windows {
                let current = if window.current { "*" } else { " " };
                println!(" {} {} {}", current, window.handle, window.title);
            }
        }
    }
    Ok(())
}

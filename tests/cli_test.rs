// CLI tests for the commands that work without a browser

use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

use locprobe::history::history_path;
use locprobe::{ElementSnapshot, HistoryAction, HistoryManager, SelectorItem, SiteConfig};

fn run_locprobe(dir: &Path, args: &[&str]) -> Output {
    let binary_path = env!("CARGO_BIN_EXE_locprobe");
    let settings = dir.join("settings.json");
    let stats = dir.join("statistics.json");
    Command::new(binary_path)
        .args(args)
        .arg("--settings")
        .arg(&settings)
        .arg("--stats-file")
        .arg(&stats)
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute locprobe command")
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout should be JSON")
}

fn write_site(dir: &Path) -> std::path::PathBuf {
    let mut item = SelectorItem::new("login_btn", "/html/body/div[2]/button");
    item.element_attributes = ElementSnapshot {
        tag: "button".to_string(),
        id: "login".to_string(),
        class: "btn primary".to_string(),
        text: "Log in".to_string(),
        ..Default::default()
    };

    let mut site = SiteConfig::new("tickets", "https://tickets.example.com");
    site.add_or_update(item);
    site.add_or_update(SelectorItem::new("fresh", "//h1"));

    let path = dir.join("site.json");
    site.save(&path).unwrap();
    path
}

#[test]
fn test_score_single_selector() {
    let dir = TempDir::new().unwrap();
    let output = run_locprobe(dir.path(), &["score", r#"//*[@id="login"]"#]);
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["selector"], r#"//*[@id="login"]"#);
    assert!(json["score"].as_u64().unwrap() > 0);
}

#[test]
fn test_score_ranks_id_above_absolute_path() {
    let dir = TempDir::new().unwrap();
    let output = run_locprobe(
        dir.path(),
        &["score", r#"//*[@id="login"]"#, "/html/body/div[2]/button"],
    );
    assert!(output.status.success());

    let json = stdout_json(&output);
    let scores: Vec<u64> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["score"].as_u64().unwrap())
        .collect();
    assert_eq!(scores.len(), 2);
    assert!(scores[0] > scores[1]);
}

#[test]
fn test_stats_on_empty_store() {
    let dir = TempDir::new().unwrap();
    let output = run_locprobe(dir.path(), &["stats", "--unstable", "80"]);
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["summary"]["total_items"], 0);
    assert_eq!(json["unstable"], Value::Array(vec![]));
    assert_eq!(json["history"], Value::Array(vec![]));
}

#[test]
fn test_missing_config_reports_json_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.json");
    let output = run_locprobe(
        dir.path(),
        &["alternatives", missing.to_str().unwrap(), "login_btn"],
    );

    assert_eq!(output.status.code(), Some(1));
    let json = stdout_json(&output);
    assert_eq!(json["error"], true);
    assert_eq!(json["exit_code"], 1);
}

#[test]
fn test_alternatives_unknown_item() {
    let dir = TempDir::new().unwrap();
    let site = write_site(dir.path());
    let output = run_locprobe(
        dir.path(),
        &["alternatives", site.to_str().unwrap(), "nobody"],
    );
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_alternatives_require_snapshot() {
    let dir = TempDir::new().unwrap();
    let site = write_site(dir.path());
    let output = run_locprobe(dir.path(), &["alternatives", site.to_str().unwrap(), "fresh"]);
    assert!(!output.status.success());
}

#[test]
fn test_alternatives_store() {
    let dir = TempDir::new().unwrap();
    let site = write_site(dir.path());
    let output = run_locprobe(
        dir.path(),
        &[
            "alternatives",
            site.to_str().unwrap(),
            "login_btn",
            "--limit",
            "3",
            "--store",
        ],
    );
    assert!(output.status.success());

    let json = stdout_json(&output);
    let alternatives = json["alternatives"].as_array().unwrap();
    assert!(!alternatives.is_empty());
    assert!(alternatives.len() <= 3);

    let saved = SiteConfig::load(&site).unwrap();
    let item = saved.get_item("login_btn").unwrap();
    assert_eq!(item.alternatives.len(), alternatives.len());
    assert_eq!(item.alternatives[0].selector, alternatives[0]["selector"]);
}

#[test]
fn test_store_records_history_beside_config() {
    let dir = TempDir::new().unwrap();
    let site = write_site(dir.path());
    let output = run_locprobe(
        dir.path(),
        &["alternatives", site.to_str().unwrap(), "login_btn", "--store"],
    );
    assert!(output.status.success());

    let config = SiteConfig::load(&site).unwrap();
    let history = HistoryManager::open(&history_path(&site), &config.items, 50);
    assert_eq!(
        history.undo_description().as_deref(),
        Some("update: login_btn")
    );
}

#[test]
fn test_undo_and_redo_added_item() {
    let dir = TempDir::new().unwrap();
    let site_path = write_site(dir.path());
    let site_arg = site_path.to_str().unwrap();

    // an earlier run added "seat" and recorded the collection before it
    let mut site = SiteConfig::load(&site_path).unwrap();
    let history = HistoryManager::open(&history_path(&site_path), &site.items, 50);
    history.push_state(&site.items, HistoryAction::Add, "seat", "picked element");
    site.add_or_update(SelectorItem::new("seat", r#"//*[@id="seat-12"]"#));
    site.save(&site_path).unwrap();
    history.save(&history_path(&site_path)).unwrap();

    let undo = run_locprobe(dir.path(), &["undo", site_arg]);
    assert!(undo.status.success());
    let json = stdout_json(&undo);
    assert_eq!(json["action"], "undo");
    assert_eq!(json["change"], "add: seat");
    assert_eq!(json["can_undo"], false);
    assert_eq!(json["can_redo"], true);

    let undone = SiteConfig::load(&site_path).unwrap();
    assert!(undone.get_item("seat").is_none());
    // large fields are carried over from the live configuration
    let login = undone.get_item("login_btn").unwrap();
    assert_eq!(login.element_attributes.id, "login");

    let redo = run_locprobe(dir.path(), &["redo", site_arg]);
    assert!(redo.status.success());
    let redone = SiteConfig::load(&site_path).unwrap();
    assert!(redone.get_item("seat").is_some());
    assert_eq!(redone.items.len(), 3);
}

#[test]
fn test_undo_without_history_fails() {
    let dir = TempDir::new().unwrap();
    let site = write_site(dir.path());
    let output = run_locprobe(dir.path(), &["undo", site.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    let json = stdout_json(&output);
    assert_eq!(json["error"], true);
}

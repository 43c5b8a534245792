use super::*;
use crate::optimizer::{Alternative, Strategy};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn items(names: &[&str]) -> Vec<SelectorItem> {
    names
        .iter()
        .map(|name| SelectorItem::new(name, &format!("//*[@id=\"{}\"]", name)))
        .collect()
}

#[test]
fn test_undo_restores_pre_mutation_and_redo_post() {
    let history = HistoryManager::default();
    let mut collection = items(&["a", "b"]);
    collection[0].alternatives.push(Alternative {
        selector: "//a".into(),
        strategy: Strategy::Relative,
        score: 50,
        description: String::new(),
    });
    collection[0].screenshot_path = "/tmp/a.png".into();
    let before = collection.clone();

    history.push_state(&collection, HistoryAction::Add, "c", "add c");
    collection.push(SelectorItem::new("c", "//c"));
    let after = collection.clone();

    let undone = history.undo(&collection).unwrap();
    assert_eq!(undone, reduce_items(&before));
    assert!(history.can_redo());

    let redone = history.redo(&undone).unwrap();
    assert_eq!(redone, reduce_items(&after));
    assert!(!history.can_redo());
    assert!(history.can_undo());

    // large fields come back from the live collection
    let restored = restore_items(undone, &after);
    assert_eq!(restored[0].alternatives.len(), 1);
    assert_eq!(restored[0].screenshot_path, "/tmp/a.png");
}

#[test]
fn test_empty_stacks_return_none() {
    let history = HistoryManager::default();
    assert_eq!(history.undo(&[]), None);
    assert_eq!(history.redo(&[]), None);
    assert_eq!(history.undo_description(), None);
}

#[test]
fn test_capacity_drops_oldest() {
    let history = HistoryManager::new(3);
    for i in 0..5 {
        let names: Vec<String> = (0..i).map(|n| format!("i{}", n)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        history.push_state(&items(&refs), HistoryAction::Add, &format!("i{}", i), "");
        assert!(history.undo_count() <= 3);
    }

    let newest: Vec<String> = history
        .history_list(10)
        .into_iter()
        .map(|e| e.item_name)
        .collect();
    assert_eq!(newest, vec!["i4", "i3", "i2"]);

    // the newest pushes survive: undo walks back through them
    assert_eq!(history.undo(&[]).unwrap().len(), 4);
    assert_eq!(history.undo(&[]).unwrap().len(), 3);
    assert_eq!(history.undo(&[]).unwrap().len(), 2);
    assert_eq!(history.undo(&[]), None);
}

#[test]
fn test_push_clears_redo() {
    let history = HistoryManager::default();
    let collection = items(&["a"]);
    history.push_state(&collection, HistoryAction::Update, "a", "edit a");
    history.undo(&collection);
    assert!(history.can_redo());

    history.push_state(&collection, HistoryAction::Delete, "a", "delete a");
    assert!(!history.can_redo());
    assert_eq!(history.undo_description().as_deref(), Some("delete: a"));
}

#[test]
fn test_reset_baseline_isolates_configurations() {
    let history = HistoryManager::default();
    history.push_state(&items(&["old"]), HistoryAction::Add, "x", "");
    history.reset_baseline(&items(&["new1", "new2"]));

    assert!(!history.can_undo());
    assert!(!history.can_redo());
    assert_eq!(history.baseline().unwrap().len(), 2);
}

#[test]
fn test_reentrant_call_from_same_thread() {
    let history = HistoryManager::default();
    let guard = history.inner.lock();
    // a handler already holding the lock can still use the public API
    history.push_state(&items(&["a"]), HistoryAction::BatchUpdate, "*", "batch");
    assert!(history.can_undo());
    drop(guard);
}

#[test]
fn test_concurrent_pushes_respect_bound() {
    let history = Arc::new(HistoryManager::new(10));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let history = Arc::clone(&history);
            std::thread::spawn(move || {
                for i in 0..25 {
                    history.push_state(&[], HistoryAction::Update, &format!("{}-{}", t, i), "");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(history.undo_count(), 10);
}

#[test]
fn test_history_survives_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = history_path(&dir.path().join("site.json"));
    assert_eq!(path, dir.path().join("site.history.json"));

    let mut collection = items(&["a"]);
    let history = HistoryManager::open(&path, &collection, 5);
    assert!(!history.can_undo());
    assert_eq!(history.baseline().unwrap().len(), 1);

    history.push_state(&collection, HistoryAction::Add, "b", "add b");
    collection.push(SelectorItem::new("b", "//b"));
    history.save(&path).unwrap();

    // a later run picks up where the previous one stopped
    let reopened = HistoryManager::open(&path, &collection, 5);
    assert_eq!(reopened.undo_description().as_deref(), Some("add: b"));
    let undone = reopened.undo(&collection).unwrap();
    assert_eq!(undone.len(), 1);
    reopened.save(&path).unwrap();

    let again = HistoryManager::open(&path, &undone, 5);
    assert!(!again.can_undo());
    assert_eq!(again.redo_count(), 1);
    assert_eq!(again.redo(&undone).unwrap().len(), 2);
}

#[test]
fn test_open_applies_bound_and_tolerates_corruption() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("site.history.json");

    let history = HistoryManager::new(10);
    for i in 0..8 {
        history.push_state(&items(&["a"]), HistoryAction::Update, &i.to_string(), "");
    }
    history.save(&path).unwrap();

    let smaller = HistoryManager::open(&path, &[], 3);
    assert_eq!(smaller.undo_count(), 3);
    assert_eq!(smaller.undo_description().as_deref(), Some("update: 7"));

    std::fs::write(&path, "{ not json").unwrap();
    let fresh = HistoryManager::open(&path, &items(&["x", "y"]), 3);
    assert!(!fresh.can_undo());
    assert_eq!(fresh.baseline().unwrap().len(), 2);
}

// Unit tests for settings and persisted configuration

#[cfg(test)]
mod tests {
    use super::super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_login_button_scenario() {
        let mut item = SelectorItem::new("login_btn", r#"//*[@id="login"]"#);
        item.record_test(true);
        item.record_test(false);

        assert_eq!(item.test_count, 2);
        assert_eq!(item.success_count, 1);
        assert!((item.success_rate() - 50.0).abs() < f64::EPSILON);
        assert!(!item.last_tested_at.is_empty());
    }

    #[test]
    fn test_success_never_exceeds_tests() {
        let mut item = SelectorItem::default();
        assert_eq!(item.success_rate(), 0.0);
        for i in 0..25 {
            item.record_test(i % 3 != 0);
            assert!(item.success_count <= item.test_count);
        }
    }

    #[test]
    fn test_item_defaults_and_unknown_fields() {
        let json = r#"{
            "name": "seat_map",
            "xpath": "//div[@id='seats']",
            "found_frame": "ifrmSeat/ifrmSeatDetail",
            "tags": ["seat", "popup"],
            "layout_hint": {"x": 1}
        }"#;

        let item: SelectorItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.category, "common");
        assert_eq!(item.found_frame_path, "ifrmSeat/ifrmSeatDetail");
        assert_eq!(item.tags.len(), 2);
        assert_eq!(item.test_count, 0);
        assert!(!item.has_snapshot());
        assert!(item.extra.contains_key("layout_hint"));

        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["layout_hint"]["x"], 1);
        assert_eq!(back["found_frame"], "ifrmSeat/ifrmSeatDetail");
        assert!(back.get("element_attributes").is_none());
    }

    #[test]
    fn test_legacy_alternatives_load() {
        let json = r#"{
            "name": "go",
            "alternatives": [
                {"xpath": "//button[@id=\"go\"]", "strategy": "id", "robustness_score": 95.0, "description": "id"},
                {"xpath": "/html/body/button", "strategy": "original", "robustness_score": 50}
            ]
        }"#;

        let item: SelectorItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.alternatives.len(), 2);
        assert_eq!(item.alternatives[0].score, 95);
        assert_eq!(item.alternatives[1].strategy, crate::optimizer::Strategy::Relative);
    }

    #[test]
    fn test_selector_prefers_xpath() {
        let mut item = SelectorItem::new("a", "");
        item.css_selector = " #go ".into();
        assert_eq!(item.selector(), "#go");
        item.xpath = "//a".into();
        assert_eq!(item.selector(), "//a");
    }

    #[test]
    fn test_add_or_update_preserves_history() {
        let mut config = SiteConfig::new("Tickets", "https://tickets.example");

        let mut first = SelectorItem::new("buy", "//button[1]");
        first.record_test(true);
        first.is_favorite = true;
        config.add_or_update(first);
        assert_eq!(config.items[0].sort_order, 1);

        config.add_or_update(SelectorItem::new("buy", r#"//button[@id="buy"]"#));
        assert_eq!(config.items.len(), 1);

        let updated = config.get_item("buy").unwrap();
        assert_eq!(updated.xpath, r#"//button[@id="buy"]"#);
        assert_eq!(updated.test_count, 1);
        assert!(updated.is_favorite);
        assert_eq!(updated.sort_order, 1);
    }

    #[test]
    fn test_categories_tags_and_ordering() {
        let mut config = SiteConfig::new("Tickets", "https://tickets.example");

        let mut a = SelectorItem::new("a", "//a");
        a.category = "seat".into();
        a.tags.insert("popup".into());
        a.sort_order = 5;
        let mut b = SelectorItem::new("b", "//b");
        b.tags.insert("login".into());
        b.sort_order = 2;
        config.items = vec![a, b];

        assert_eq!(config.categories(), vec!["common", "seat"]);
        assert_eq!(config.all_tags().len(), 2);

        let names: Vec<&str> = config.sorted_items().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);

        assert!(config.remove_item("a").is_some());
        assert!(config.remove_item("a").is_none());
    }

    #[test]
    fn test_site_config_round_trip_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("site.json");

        let mut config = SiteConfig::new("Tickets", "https://tickets.example");
        config.extra.insert("theme".into(), serde_json::json!("dark"));
        config.add_or_update(SelectorItem::new("buy", "//button"));
        config.save(&path).unwrap();

        let loaded = SiteConfig::load(&path).unwrap();
        assert_eq!(loaded.name, "Tickets");
        assert_eq!(loaded.items, config.items);
        assert_eq!(loaded.extra["theme"], "dark");
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = SiteConfig::load(&path).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(matches!(err, LocprobeError::Config(_)));
    }

    #[test]
    fn test_duplicate_item_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dupes.json");
        std::fs::write(
            &path,
            r#"{"name": "t", "items": [
                {"name": "a", "xpath": "//a"},
                {"name": "b", "xpath": "//b"},
                {"name": "a", "xpath": "//a[2]"}
            ]}"#,
        )
        .unwrap();

        let err = SiteConfig::load(&path).unwrap_err();
        assert!(matches!(&err, LocprobeError::Config(msg) if msg.contains("duplicate item name 'a'")));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_settings_defaults_and_partial_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.json");
        assert_eq!(Settings::load(Some(missing.as_path())).unwrap(), Settings::default());

        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"max_frame_depth": 3, "strategy_weights": {"id": 99}}"#).unwrap();
        let settings = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(settings.max_frame_depth, 3);
        assert_eq!(settings.strategy_weights.id, 99);
        assert_eq!(settings.strategy_weights.class, 70);
        assert_eq!(settings.history_max_size, 50);
        assert_eq!(settings.frame_cache_ttl(), Duration::from_secs(2));
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::utils::{CommonArgs, target_url};
    use clap::Parser;
    use locprobe::{OutputFormat, SiteConfig};

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        common: CommonArgs,
    }

    #[test]
    fn test_common_args_defaults() {
        let cli = TestCli::parse_from(["locprobe"]);
        assert_eq!(cli.common.browser, "firefox");
        assert!(!cli.common.no_headless);
        assert!(matches!(cli.common.format, OutputFormat::Json));
        assert!(cli.common.settings.is_none());
    }

    #[test]
    fn test_common_args_overrides() {
        let cli = TestCli::parse_from([
            "locprobe",
            "--browser",
            "chrome",
            "--no-headless",
            "--format",
            "simple",
            "--webdriver-url",
            "http://localhost:9999",
            "--stats-file",
            "/tmp/stats.json",
        ]);
        assert_eq!(cli.common.browser, "chrome");
        assert!(cli.common.no_headless);
        assert!(matches!(cli.common.format, OutputFormat::Simple));
        assert_eq!(
            cli.common.webdriver_url.as_deref(),
            Some("http://localhost:9999")
        );
        assert_eq!(
            cli.common.stats_file.as_deref(),
            Some(std::path::Path::new("/tmp/stats.json"))
        );
    }

    #[test]
    fn test_target_url_precedence() {
        let site = SiteConfig::new("shop", "https://shop.example.com");
        assert_eq!(
            target_url(Some("https://other.example.com".into()), &site).unwrap(),
            "https://other.example.com"
        );
        assert_eq!(target_url(None, &site).unwrap(), "https://shop.example.com");

        let bare = SiteConfig::new("bare", "");
        assert!(target_url(None, &bare).is_err());
    }
}

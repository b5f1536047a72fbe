use crate::collectors::{SCRAPER_NAMES, Scraper, all_factories};

/// Names of the scrapers to run, resolved once at startup.
#[derive(Clone, Debug, Default)]
pub struct ScraperConfig {
    pub enabled_scrapers: Vec<String>,
}

impl ScraperConfig {
    /// Create an empty config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every scraper whose `enabled_by_default()` is true.
    #[must_use]
    pub fn defaults() -> Self {
        let enabled = all_factories()
            .into_iter()
            .filter(|(_, factory)| factory().enabled_by_default())
            .map(|(name, _)| name.to_string())
            .collect();

        Self {
            enabled_scrapers: enabled,
        }
    }

    /// Enable scrapers by name. Unknown names and duplicates are dropped;
    /// the result follows registration order.
    #[must_use]
    pub fn with_enabled(mut self, scrapers: &[String]) -> Self {
        self.enabled_scrapers = SCRAPER_NAMES
            .iter()
            .filter(|name| scrapers.iter().any(|s| s == *name))
            .map(|name| (*name).to_string())
            .collect();
        self
    }

    /// Check if a scraper is enabled
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled_scrapers.iter().any(|s| s == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_registration_flags() {
        let config = ScraperConfig::defaults();
        assert_eq!(
            config.enabled_scrapers,
            vec![
                "cluster_state",
                "segment",
                "database_size",
                "locks",
                "connections",
                "max_connections",
                "connections_detail",
            ]
        );
        assert!(!config.is_enabled("users"));
        assert!(!config.is_enabled("diskspace"));
    }

    #[test]
    fn test_with_enabled_keeps_registration_order() {
        let config = ScraperConfig::new().with_enabled(&[
            "diskspace".to_string(),
            "cluster_state".to_string(),
            "nope".to_string(),
            "cluster_state".to_string(),
        ]);

        assert_eq!(config.enabled_scrapers, vec!["cluster_state", "diskspace"]);
    }
}

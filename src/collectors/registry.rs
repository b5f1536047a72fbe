use crate::collectors::config::ScraperConfig;
use crate::collectors::{Scraper, all_factories};
use std::sync::Arc;

pub type DynScraper = Arc<dyn Scraper + Send + Sync>;

/// The enabled scrapers, instantiated in registration order.
#[derive(Clone, Default)]
pub struct ScraperRegistry {
    scrapers: Vec<DynScraper>,
}

impl ScraperRegistry {
    #[must_use]
    pub fn new(config: &ScraperConfig) -> Self {
        let scrapers = all_factories()
            .into_iter()
            .filter(|(name, _)| config.is_enabled(name))
            .map(|(_, factory)| Arc::new(factory()) as DynScraper)
            .collect();

        Self { scrapers }
    }

    /// Build from already constructed scrapers; order is kept as given.
    #[must_use]
    pub fn from_scrapers(scrapers: Vec<DynScraper>) -> Self {
        Self { scrapers }
    }

    #[must_use]
    pub fn scrapers(&self) -> &[DynScraper] {
        &self.scrapers
    }

    #[must_use]
    pub fn scraper_names(&self) -> Vec<&'static str> {
        self.scrapers.iter().map(|s| s.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scrapers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_follows_registration_order() {
        let config = ScraperConfig::new().with_enabled(&[
            "locks".to_string(),
            "segment".to_string(),
            "users".to_string(),
        ]);
        let registry = ScraperRegistry::new(&config);

        assert_eq!(registry.scraper_names(), vec!["segment", "locks", "users"]);
    }

    #[test]
    fn test_factory_keys_match_scraper_names() {
        for (key, factory) in all_factories() {
            assert_eq!(factory().name(), key);
        }
    }

    #[test]
    fn test_defaults_exclude_gpperfmon_scrapers() {
        let registry = ScraperRegistry::new(&ScraperConfig::defaults());
        let names = registry.scraper_names();

        assert_eq!(
            names,
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
    }

    #[test]
    fn test_empty_config_yields_empty_registry() {
        let registry = ScraperRegistry::new(&ScraperConfig::new());
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }
}

macro_rules! register_scrapers {
    (
        $(
            $module:ident => $scraper_type:ident
        ),* $(,)?
    ) => {
        // Import all scraper modules
        $(
            pub mod $module;
            pub use $module::$scraper_type;
        )*

        // Closed set of scraper variants
        #[derive(Clone, Debug)]
        pub enum ScraperType {
            $(
                $scraper_type($scraper_type),
            )*
        }

        impl Scraper for ScraperType {
            fn name(&self) -> &'static str {
                match self {
                    $(
                        ScraperType::$scraper_type(s) => s.name(),
                    )*
                }
            }

            fn enabled_by_default(&self) -> bool {
                match self {
                    $(
                        ScraperType::$scraper_type(s) => s.enabled_by_default(),
                    )*
                }
            }

            fn scrape<'a>(
                &'a self,
                conn: &'a Connection,
                version: EngineVersion,
                sink: &'a mut MetricSink,
            ) -> BoxFuture<'a, Result<()>> {
                match self {
                    $(
                        ScraperType::$scraper_type(s) => s.scrape(conn, version, sink),
                    )*
                }
            }
        }

        /// Factories in registration order.
        #[must_use]
        pub fn all_factories() -> Vec<(&'static str, fn() -> ScraperType)> {
            vec![
                $(
                    (
                        stringify!($module),
                        (|| ScraperType::$scraper_type($scraper_type::new())) as fn() -> ScraperType,
                    ),
                )*
            ]
        }

        /// Scraper names in registration order, used to build the CLI flags.
        pub const SCRAPER_NAMES: &[&'static str] = &[
            $(stringify!($module),)*
        ];
    };
}

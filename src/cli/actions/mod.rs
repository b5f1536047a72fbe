pub mod run;

use crate::collectors::config::ScraperConfig;
use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Run {
        listen: String,
        telemetry_path: String,
        default_metrics: bool,
        dsn: SecretString,
        scrapers: ScraperConfig,
    },
}

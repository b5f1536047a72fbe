use crate::{
    cli::{
        actions::Action,
        commands::{DEFAULT_LISTEN_ADDRESS, DEFAULT_TELEMETRY_PATH},
    },
    collectors::{SCRAPER_NAMES, config::ScraperConfig},
};
use anyhow::{Result, anyhow};
use clap::ArgMatches;
use secrecy::SecretString;
use tracing::info;

/// Turn parsed arguments into the action to run.
///
/// # Errors
///
/// Returns an error if the DSN is missing.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let listen = matches
        .get_one::<String>("listen-address")
        .cloned()
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string());

    let telemetry_path = matches
        .get_one::<String>("telemetry-path")
        .cloned()
        .unwrap_or_else(|| DEFAULT_TELEMETRY_PATH.to_string());

    let default_metrics = matches.get_flag("default-metrics");

    let dsn = SecretString::from(
        matches
            .get_one::<String>("dsn")
            .cloned()
            .ok_or_else(|| anyhow!("DSN is required. Please provide it using the --dsn flag."))?,
    );

    let scrapers = ScraperConfig::new().with_enabled(&get_enabled_scrapers(matches));

    info!(scrapers = ?scrapers.enabled_scrapers, "enabled scrapers");

    Ok(Action::Run {
        listen,
        telemetry_path,
        default_metrics,
        dsn,
        scrapers,
    })
}

/// Scrapers left enabled after applying the enable/disable flags; the
/// enable flags default to each scraper's own default.
#[must_use]
pub fn get_enabled_scrapers(matches: &ArgMatches) -> Vec<String> {
    SCRAPER_NAMES
        .iter()
        .filter(|&name| {
            if matches.get_flag(&format!("no-scraper.{name}")) {
                return false;
            }

            matches.get_flag(&format!("scraper.{name}"))
        })
        .map(|&name| name.to_string())
        .collect()
}

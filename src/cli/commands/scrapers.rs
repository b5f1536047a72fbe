use crate::collectors::{SCRAPER_NAMES, Scraper, all_factories};
use clap::{Arg, ArgAction, Command};

/// `--scraper.<name>` / `--no-scraper.<name>` for every registered scraper.
pub fn add_scrapers_args(mut cmd: Command) -> Command {
    let factories = all_factories();

    for &name in SCRAPER_NAMES {
        let default_enabled = factories
            .iter()
            .find(|(key, _)| *key == name)
            .is_some_and(|(_, factory)| factory().enabled_by_default());

        let enable_flag: &'static str = Box::leak(format!("scraper.{name}").into_boxed_str());
        let disable_flag: &'static str = Box::leak(format!("no-scraper.{name}").into_boxed_str());

        let default_indicator = if default_enabled {
            " [default: enabled]"
        } else {
            " [default: disabled]"
        };
        let enable_help: &'static str =
            Box::leak(format!("Enable the {name} scraper{default_indicator}").into_boxed_str());
        let disable_help: &'static str =
            Box::leak(format!("Disable the {name} scraper").into_boxed_str());

        cmd = cmd
            .arg(
                Arg::new(enable_flag)
                    .long(enable_flag)
                    .help(enable_help)
                    .action(ArgAction::SetTrue)
                    .default_value(if default_enabled { "true" } else { "false" }),
            )
            .arg(
                Arg::new(disable_flag)
                    .long(disable_flag)
                    .help(disable_help)
                    .action(ArgAction::SetTrue)
                    .overrides_with(enable_flag),
            );
    }

    cmd
}

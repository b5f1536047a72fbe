use crate::cli::{actions::Action, commands, dispatch::handler, telemetry};
use anyhow::Result;
use tracing::Level;

/// `-v` count to the default log level; without `-v` only errors are logged
/// unless `RUST_LOG` says otherwise.
const fn verbosity_level(count: u8) -> Option<Level> {
    match count {
        0 => None,
        1 => Some(Level::INFO),
        2 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

/// Parse the command line, install the tracing subscriber and resolve the
/// action to run.
///
/// # Errors
///
/// Returns an error if telemetry initialization or argument handling fails
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    telemetry::init(verbosity_level(matches.get_count("verbose")))?;

    handler(&matches)
}

use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

mod scrapers;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9297";
pub const DEFAULT_TELEMETRY_PATH: &str = "/metrics";
pub const DEFAULT_DSN: &str = "postgresql://gpadmin@localhost:5432/postgres";

fn validate_telemetry_path(path: &str) -> Result<String, String> {
    if path.starts_with('/') {
        Ok(path.to_string())
    } else {
        Err(format!("'{path}' must start with '/'"))
    }
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let cmd = Command::new("gp_exporter")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(built_info::GIT_COMMIT_HASH.unwrap_or(env!("CARGO_PKG_VERSION")))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("listen-address")
                .long("web.listen-address")
                .help("Address to listen on for web interface and telemetry")
                .default_value(DEFAULT_LISTEN_ADDRESS)
                .env("GP_EXPORTER_LISTEN_ADDRESS")
                .value_name("HOST:PORT"),
        )
        .arg(
            Arg::new("telemetry-path")
                .long("web.telemetry-path")
                .help("Path under which to expose metrics")
                .default_value(DEFAULT_TELEMETRY_PATH)
                .env("GP_EXPORTER_TELEMETRY_PATH")
                .value_parser(validate_telemetry_path),
        )
        .arg(
            Arg::new("default-metrics")
                .long("default-metrics")
                .help("Also expose process metrics of the exporter itself")
                .env("GP_EXPORTER_DEFAULT_METRICS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dsn")
                .long("dsn")
                .help("Greenplum connection string")
                .default_value(DEFAULT_DSN)
                .env("GPDB_DATA_SOURCE_URL")
                .value_name("DSN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase verbosity, -vv for debug")
                .action(ArgAction::Count),
        );

    scrapers::add_scrapers_args(cmd)
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Trellis binary.
#[derive(Debug, Parser)]
#[command(name = "trellis", version, about = "Trellis behavior-chain web server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TRELLIS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
    /// Print the finalized behavior chain of every route.
    Routes,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Toggle the output cache.
    #[arg(
        long = "cache-output",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_output: Option<bool>,

    /// Toggle ETag / 304 handling.
    #[arg(
        long = "cache-etags",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_etags: Option<bool>,

    /// Override the asset polling interval.
    #[arg(long = "cache-watch-interval-ms", value_name = "MILLIS")]
    pub cache_watch_interval_ms: Option<u64>,

    /// Override the directory assets are served from.
    #[arg(long = "assets-root", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub assets_root: Option<PathBuf>,
}

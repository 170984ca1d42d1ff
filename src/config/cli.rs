use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the folio-render binary.
#[derive(Debug, Parser)]
#[command(name = "folio-render", version, about = "Portfolio rendering engine")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Generate HTML for one or more target files.
    Generate(GenerateArgs),
    /// Warm the renderer pool, print its stats and shut it down.
    #[command(name = "pool-check")]
    PoolCheck,
}

#[derive(Debug, Args, Clone)]
pub struct GenerateArgs {
    /// JSON files describing generation targets.
    #[arg(value_name = "TARGET", required = true, value_hint = ValueHint::FilePath)]
    pub targets: Vec<PathBuf>,

    /// Directory receiving one `<stem>.html` per target.
    #[arg(long = "output-dir", default_value = ".", value_hint = ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// Maximum number of targets generated concurrently.
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(usize))]
    pub concurrency: usize,

    /// Skip live rendering and use the template fallback directly.
    #[arg(long = "force-fallback", action = clap::ArgAction::SetTrue)]
    pub force_fallback: bool,

    /// Do not wait for images and fonts during live rendering.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub fast: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
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

    /// Override the maximum number of pooled renderers.
    #[arg(long = "pool-max-size", value_name = "COUNT")]
    pub pool_max_size: Option<u32>,

    /// Override the renderer executable.
    #[arg(long = "renderer-program", value_name = "PATH")]
    pub renderer_program: Option<PathBuf>,

    /// Enable or disable live rendering globally.
    #[arg(
        long = "live-rendering",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub live_rendering: Option<bool>,
}

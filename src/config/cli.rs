use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the imprint binary.
#[derive(Debug, Parser)]
#[command(
    name = "imprint",
    version,
    about = "Render static pages from content snapshots"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "IMPRINT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render content to the output directory.
    Render(RenderArgs),
    /// Print the route every content item renders to.
    Routes(RoutesArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: RenderOverrides,

    /// Render only these content ids; everything is rendered when omitted.
    #[arg(long = "id", value_name = "ID")]
    pub ids: Vec<i32>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RoutesArgs {
    #[command(flatten)]
    pub content: ContentOverride,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Resolve routes as preview would, including unpublished content.
    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub preview: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ContentOverride {
    /// Override the site file content is loaded from.
    #[arg(long = "content", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
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
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    #[command(flatten)]
    pub content: ContentOverride,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the template engine (expression|handlebars).
    #[arg(long = "engine", value_name = "ENGINE")]
    pub engine: Option<String>,

    /// Override the directory template files are read from.
    #[arg(long = "templates-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub templates_dir: Option<PathBuf>,

    /// Override the template file extension.
    #[arg(long = "template-extension", value_name = "EXT")]
    pub template_extension: Option<String>,

    /// Override the directory rendered pages are written to.
    #[arg(long = "output-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// Render drafts and unpublished cultures.
    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub preview: Option<bool>,

    /// Override the number of change events rendered concurrently.
    #[arg(long = "concurrency", value_name = "COUNT")]
    pub concurrency: Option<u64>,
}

//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, path::PathBuf, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::{render::EngineKind, snapshot::DEFAULT_URL_NAME_PROPERTY};

mod cli;

pub use cli::{
    CliArgs, Command, ContentOverride, LoggingOverrides, RenderArgs, RenderOverrides, RoutesArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "imprint";
const ENV_PREFIX: &str = "IMPRINT";
const DEFAULT_CONTENT_SOURCE: &str = "content/site.toml";
const DEFAULT_TEMPLATES_DIR: &str = "templates";
const DEFAULT_TEMPLATE_EXTENSION: &str = "cshtml";
const DEFAULT_OUTPUT_DIR: &str = "public";
const DEFAULT_RENDER_CONCURRENCY: u64 = 4;
const DEFAULT_COMPILED_CACHE_CAPACITY: u64 = 256;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub content: ContentSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub source: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub engine: EngineKind,
    pub templates_dir: PathBuf,
    pub template_extension: String,
    pub output_dir: PathBuf,
    pub preview: bool,
    pub concurrency: NonZeroUsize,
    pub compiled_cache_capacity: NonZeroUsize,
    pub url_name_property: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Render(args)) => raw.apply_render_overrides(&args.overrides),
        Some(Command::Routes(args)) => raw.apply_routes_overrides(args),
        None => {}
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    content: RawContentSettings,
    render: RawRenderSettings,
}

impl RawSettings {
    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        self.apply_content_override(&overrides.content);
        self.apply_logging_overrides(&overrides.logging);

        if let Some(engine) = overrides.engine.as_ref() {
            self.render.engine = Some(engine.clone());
        }
        if let Some(dir) = overrides.templates_dir.as_ref() {
            self.render.templates_dir = Some(dir.clone());
        }
        if let Some(extension) = overrides.template_extension.as_ref() {
            self.render.template_extension = Some(extension.clone());
        }
        if let Some(dir) = overrides.output_dir.as_ref() {
            self.render.output_dir = Some(dir.clone());
        }
        if let Some(preview) = overrides.preview {
            self.render.preview = Some(preview);
        }
        if let Some(concurrency) = overrides.concurrency {
            self.render.concurrency = Some(concurrency);
        }
    }

    fn apply_routes_overrides(&mut self, args: &RoutesArgs) {
        self.apply_content_override(&args.content);
        self.apply_logging_overrides(&args.logging);
        if let Some(preview) = args.preview {
            self.render.preview = Some(preview);
        }
    }

    fn apply_content_override(&mut self, overrides: &ContentOverride) {
        if let Some(source) = overrides.source.as_ref() {
            self.content.source = Some(source.clone());
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            content,
            render,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let content = build_content_settings(content)?;
        let render = build_render_settings(render)?;

        Ok(Self {
            logging,
            content,
            render,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let source = content
        .source
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_SOURCE));
    non_empty_path(&source, "content.source")?;
    Ok(ContentSettings { source })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let engine = match render.engine {
        Some(engine) => EngineKind::from_str(&engine)
            .map_err(|reason| LoadError::invalid("render.engine", reason))?,
        None => EngineKind::default(),
    };

    let templates_dir = render
        .templates_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATES_DIR));
    non_empty_path(&templates_dir, "render.templates_dir")?;

    let template_extension = render
        .template_extension
        .map(|extension| extension.trim().trim_start_matches('.').to_string())
        .unwrap_or_else(|| DEFAULT_TEMPLATE_EXTENSION.to_string());
    if template_extension.is_empty() {
        return Err(LoadError::invalid(
            "render.template_extension",
            "extension must not be empty",
        ));
    }

    let output_dir = render
        .output_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    non_empty_path(&output_dir, "render.output_dir")?;

    let url_name_property = render
        .url_name_property
        .map(|alias| alias.trim().to_string())
        .unwrap_or_else(|| DEFAULT_URL_NAME_PROPERTY.to_string());
    if url_name_property.is_empty() {
        return Err(LoadError::invalid(
            "render.url_name_property",
            "property alias must not be empty",
        ));
    }

    Ok(RenderSettings {
        engine,
        templates_dir,
        template_extension,
        output_dir,
        preview: render.preview.unwrap_or(false),
        concurrency: non_zero_usize(
            render.concurrency.unwrap_or(DEFAULT_RENDER_CONCURRENCY),
            "render.concurrency",
        )?,
        compiled_cache_capacity: non_zero_usize(
            render
                .compiled_cache_capacity
                .unwrap_or(DEFAULT_COMPILED_CACHE_CAPACITY),
            "render.compiled_cache_capacity",
        )?,
        url_name_property,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    source: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    engine: Option<String>,
    templates_dir: Option<PathBuf>,
    template_extension: Option<String>,
    output_dir: Option<PathBuf>,
    preview: Option<bool>,
    concurrency: Option<u64>,
    compiled_cache_capacity: Option<u64>,
    url_name_property: Option<String>,
}

fn non_empty_path(path: &std::path::Path, key: &'static str) -> Result<(), LoadError> {
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(())
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

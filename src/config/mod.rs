//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{CliArgs, Command, GenerateArgs, GlobalOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const DEFAULT_POOL_MAX_SIZE: u32 = 3;
const DEFAULT_POOL_IDLE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_POOL_RECYCLE_THRESHOLD: u64 = 100;
const DEFAULT_POOL_ACQUIRE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POOL_ACQUIRE_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_POOL_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_POOL_WARMUP_COUNT: u32 = 2;
const DEFAULT_POOL_HEALTH_CHECK_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_POOL_CLOSE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_PIPELINE_MAX_RETRIES: u32 = 2;
const DEFAULT_PIPELINE_RETRY_DELAY_MS: u64 = 1_000;
const DEFAULT_PIPELINE_ATTEMPT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PIPELINE_MIN_BODY_LENGTH: usize = 200;
const DEFAULT_PIPELINE_READINESS_CEILING_MS: u64 = 3_000;
const DEFAULT_CACHE_CAPACITY: u32 = 256;
pub(crate) const DEFAULT_READINESS_SELECTOR: &str = "[data-portfolio-ready]";
pub(crate) const DEFAULT_RENDERER_PROGRAM: &str = "folio-renderer";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub pool: PoolSettings,
    pub pipeline: PipelineSettings,
    pub renderer: RendererSettings,
    pub cache: CacheSettings,
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
pub struct PoolSettings {
    pub max_size: NonZeroU32,
    pub idle_timeout: Duration,
    pub recycle_threshold: NonZeroU64,
    pub acquire_timeout: Duration,
    pub acquire_poll_interval: Duration,
    pub sweep_interval: Duration,
    pub warmup_count: u32,
    pub health_check_timeout: Duration,
    pub close_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_retries: NonZeroU32,
    pub retry_delay: Duration,
    pub attempt_timeout: Duration,
    pub live_rendering: bool,
    pub allow_placeholder_output: bool,
    pub readiness_selector: String,
    pub min_body_length: usize,
    pub readiness_ceiling: Duration,
}

#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub program: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub capacity: NonZeroU32,
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

    builder = builder.add_source(
        Environment::with_prefix("FOLIO")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("renderer.args")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    pool: RawPoolSettings,
    pipeline: RawPipelineSettings,
    renderer: RawRendererSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.pool_max_size {
            self.pool.max_size = Some(max);
        }
        if let Some(program) = overrides.renderer_program.as_ref() {
            self.renderer.program = Some(program.clone());
        }
        if let Some(enabled) = overrides.live_rendering {
            self.pipeline.live_rendering = Some(enabled);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            pool,
            pipeline,
            renderer,
            cache,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            pool: build_pool_settings(pool)?,
            pipeline: build_pipeline_settings(pipeline)?,
            renderer: build_renderer_settings(renderer)?,
            cache: build_cache_settings(cache)?,
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

fn build_pool_settings(pool: RawPoolSettings) -> Result<PoolSettings, LoadError> {
    let max_size = non_zero_u32(
        pool.max_size.unwrap_or(DEFAULT_POOL_MAX_SIZE).into(),
        "pool.max_size",
    )?;

    let recycle_threshold = NonZeroU64::new(
        pool.recycle_threshold
            .unwrap_or(DEFAULT_POOL_RECYCLE_THRESHOLD),
    )
    .ok_or_else(|| LoadError::invalid("pool.recycle_threshold", "must be greater than zero"))?;

    Ok(PoolSettings {
        max_size,
        idle_timeout: positive_secs(
            pool.idle_timeout_seconds
                .unwrap_or(DEFAULT_POOL_IDLE_TIMEOUT_SECS),
            "pool.idle_timeout_seconds",
        )?,
        recycle_threshold,
        acquire_timeout: positive_secs(
            pool.acquire_timeout_seconds
                .unwrap_or(DEFAULT_POOL_ACQUIRE_TIMEOUT_SECS),
            "pool.acquire_timeout_seconds",
        )?,
        acquire_poll_interval: positive_millis(
            pool.acquire_poll_interval_ms
                .unwrap_or(DEFAULT_POOL_ACQUIRE_POLL_INTERVAL_MS),
            "pool.acquire_poll_interval_ms",
        )?,
        sweep_interval: positive_secs(
            pool.sweep_interval_seconds
                .unwrap_or(DEFAULT_POOL_SWEEP_INTERVAL_SECS),
            "pool.sweep_interval_seconds",
        )?,
        warmup_count: pool.warmup_count.unwrap_or(DEFAULT_POOL_WARMUP_COUNT),
        health_check_timeout: positive_millis(
            pool.health_check_timeout_ms
                .unwrap_or(DEFAULT_POOL_HEALTH_CHECK_TIMEOUT_MS),
            "pool.health_check_timeout_ms",
        )?,
        close_timeout: positive_secs(
            pool.close_timeout_seconds
                .unwrap_or(DEFAULT_POOL_CLOSE_TIMEOUT_SECS),
            "pool.close_timeout_seconds",
        )?,
    })
}

fn build_pipeline_settings(pipeline: RawPipelineSettings) -> Result<PipelineSettings, LoadError> {
    let max_retries = non_zero_u32(
        pipeline
            .max_retries
            .unwrap_or(DEFAULT_PIPELINE_MAX_RETRIES)
            .into(),
        "pipeline.max_retries",
    )?;

    let readiness_selector = pipeline
        .readiness_selector
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_READINESS_SELECTOR.to_string());
    if readiness_selector.is_empty() {
        return Err(LoadError::invalid(
            "pipeline.readiness_selector",
            "selector must not be empty",
        ));
    }

    Ok(PipelineSettings {
        max_retries,
        retry_delay: Duration::from_millis(
            pipeline
                .retry_delay_ms
                .unwrap_or(DEFAULT_PIPELINE_RETRY_DELAY_MS),
        ),
        attempt_timeout: positive_secs(
            pipeline
                .attempt_timeout_seconds
                .unwrap_or(DEFAULT_PIPELINE_ATTEMPT_TIMEOUT_SECS),
            "pipeline.attempt_timeout_seconds",
        )?,
        live_rendering: pipeline.live_rendering.unwrap_or(true),
        allow_placeholder_output: pipeline.allow_placeholder_output.unwrap_or(true),
        readiness_selector,
        min_body_length: pipeline
            .min_body_length
            .unwrap_or(DEFAULT_PIPELINE_MIN_BODY_LENGTH),
        readiness_ceiling: positive_millis(
            pipeline
                .readiness_ceiling_ms
                .unwrap_or(DEFAULT_PIPELINE_READINESS_CEILING_MS),
            "pipeline.readiness_ceiling_ms",
        )?,
    })
}

fn build_renderer_settings(renderer: RawRendererSettings) -> Result<RendererSettings, LoadError> {
    let program = renderer
        .program
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RENDERER_PROGRAM));
    if program.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "renderer.program",
            "path must not be empty",
        ));
    }

    Ok(RendererSettings {
        program,
        args: renderer.args.unwrap_or_default(),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        capacity: non_zero_u32(
            cache.capacity.unwrap_or(DEFAULT_CACHE_CAPACITY).into(),
            "cache.capacity",
        )?,
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
struct RawPoolSettings {
    max_size: Option<u32>,
    idle_timeout_seconds: Option<u64>,
    recycle_threshold: Option<u64>,
    acquire_timeout_seconds: Option<u64>,
    acquire_poll_interval_ms: Option<u64>,
    sweep_interval_seconds: Option<u64>,
    warmup_count: Option<u32>,
    health_check_timeout_ms: Option<u64>,
    close_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPipelineSettings {
    max_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
    attempt_timeout_seconds: Option<u64>,
    live_rendering: Option<bool>,
    allow_placeholder_output: Option<bool>,
    readiness_selector: Option<String>,
    min_body_length: Option<usize>,
    readiness_ceiling_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRendererSettings {
    program: Option<PathBuf>,
    args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    capacity: Option<u32>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn positive_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

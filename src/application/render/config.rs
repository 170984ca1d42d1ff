//! Runtime configuration for the renderer pool and generation pipeline.

use std::time::Duration;

use crate::config::{DEFAULT_READINESS_SELECTOR, PipelineSettings, PoolSettings};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Hard cap on live renderers, including ones still being created.
    pub max_size: usize,
    pub idle_timeout: Duration,
    /// Handles whose use count exceeds this value are retired on release.
    pub recycle_threshold: u64,
    pub acquire_timeout: Duration,
    pub acquire_poll_interval: Duration,
    pub sweep_interval: Duration,
    pub warmup_count: usize,
    pub health_check_timeout: Duration,
    pub close_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 3,
            idle_timeout: Duration::from_secs(300),
            recycle_threshold: 100,
            acquire_timeout: Duration::from_secs(30),
            acquire_poll_interval: Duration::from_millis(100),
            sweep_interval: Duration::from_secs(60),
            warmup_count: 2,
            health_check_timeout: Duration::from_secs(2),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&PoolSettings> for PoolConfig {
    fn from(settings: &PoolSettings) -> Self {
        Self {
            max_size: settings.max_size.get() as usize,
            idle_timeout: settings.idle_timeout,
            recycle_threshold: settings.recycle_threshold.get(),
            acquire_timeout: settings.acquire_timeout,
            acquire_poll_interval: settings.acquire_poll_interval,
            sweep_interval: settings.sweep_interval,
            warmup_count: settings.warmup_count as usize,
            health_check_timeout: settings.health_check_timeout,
            close_timeout: settings.close_timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of live attempts before falling back.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub attempt_timeout: Duration,
    /// Global switch for live rendering.
    pub live_rendering: bool,
    /// When false, output that still contains placeholder markers is rejected.
    pub allow_placeholder_output: bool,
    pub readiness_selector: String,
    pub min_body_length: usize,
    pub readiness_ceiling: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(30),
            live_rendering: true,
            allow_placeholder_output: true,
            readiness_selector: DEFAULT_READINESS_SELECTOR.to_string(),
            min_body_length: 200,
            readiness_ceiling: Duration::from_secs(3),
        }
    }
}

impl From<&PipelineSettings> for PipelineConfig {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            max_retries: settings.max_retries.get(),
            retry_delay: settings.retry_delay,
            attempt_timeout: settings.attempt_timeout,
            live_rendering: settings.live_rendering,
            allow_placeholder_output: settings.allow_placeholder_output,
            readiness_selector: settings.readiness_selector.clone(),
            min_body_length: settings.min_body_length,
            readiness_ceiling: settings.readiness_ceiling,
        }
    }
}

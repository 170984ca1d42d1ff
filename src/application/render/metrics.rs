//! Metric names emitted by the renderer pool and generation pipeline.

pub const POOL_ACQUIRE_TOTAL: &str = "folio_pool_acquire_total";
pub const POOL_ACQUIRE_TIMEOUT_TOTAL: &str = "folio_pool_acquire_timeout_total";
pub const POOL_UNHEALTHY_TOTAL: &str = "folio_pool_unhealthy_total";
pub const POOL_RECYCLED_TOTAL: &str = "folio_pool_recycled_total";
pub const POOL_EVICTED_TOTAL: &str = "folio_pool_evicted_total";
pub const POOL_SIZE: &str = "folio_pool_size";
pub const RENDER_ATTEMPT_MS: &str = "folio_render_attempt_ms";
pub const GENERATION_TOTAL: &str = "folio_generation_total";

//! Renderer pool and generation pipeline.
//!
//! The pool owns a bounded set of live renderer instances created through a
//! pluggable [`RendererFactory`]. The pipeline borrows them for timed live
//! attempts and falls back to pool-independent template output when live
//! rendering is unavailable. Caching and persistence are the caller's concern.

mod backend;
mod check;
mod config;
mod fallback;
mod handle;
pub mod metrics;
mod pipeline;
mod pool;
mod process;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{ReadinessSignal, RenderJob, RenderSource, Renderer, RendererError, RendererFactory};
pub use check::ContentCheck;
pub use config::{PipelineConfig, PoolConfig};
pub use fallback::{TemplateError, TemplateRenderer};
pub use handle::RendererHandle;
pub use pipeline::GenerationPipeline;
pub use pool::{PoolError, RendererLease, RendererPool, SweepReport};
pub use process::{ProcessRenderer, ProcessRendererFactory};
pub use types::{GenerationError, RenderMode, ValidatedTarget, ValidationError};

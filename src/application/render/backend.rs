use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use folio_render_types::Viewport;
use serde::Serialize;
use thiserror::Error;

/// Where the renderer loads its document from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RenderSource {
    Url(String),
    Html(String),
}

/// Content-readiness signal: the renderer waits for whichever condition is met first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadinessSignal {
    pub selector: String,
    pub min_body_length: usize,
    pub ceiling_ms: u64,
}

/// A single unit of work handed to a live renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderJob {
    pub source: RenderSource,
    pub viewport: Viewport,
    pub readiness: ReadinessSignal,
    /// Wait for images and fonts before extracting markup.
    pub wait_for_resources: bool,
    /// Emulate print media (used for PDF-bound output).
    pub print_media: bool,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RendererError {
    #[error("failed to launch renderer `{program}`: {message}")]
    Spawn { program: String, message: String },
    #[error("renderer I/O failed: {0}")]
    Io(String),
    #[error("renderer protocol violation: {0}")]
    Protocol(String),
    #[error("renderer disconnected")]
    Disconnected,
    #[error("render failed: {0}")]
    Render(String),
    #[error("renderer did not respond within {0:?}")]
    Timeout(Duration),
}

/// One live instance of a headless rendering backend.
///
/// Implementations are driven by exactly one caller at a time: the pool only
/// hands an instance out while it is checked out through a lease.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Lightweight liveness probe. Never cached by callers.
    async fn probe(&self) -> bool;

    /// Load the job's source, wait for readiness and return the rendered markup.
    async fn render(&self, job: &RenderJob) -> Result<String, RendererError>;

    /// Close every page except one baseline page so the instance can be reused.
    async fn reset(&self) -> Result<(), RendererError>;

    async fn close(&self) -> Result<(), RendererError>;
}

/// Creates renderer instances for a pool.
///
/// The concrete backend is selected once by the host; the pool never knows
/// which implementation it is driving.
#[async_trait]
pub trait RendererFactory: Send + Sync {
    /// Short backend name used in logs.
    fn backend(&self) -> &'static str;

    async fn create(&self) -> Result<Arc<dyn Renderer>, RendererError>;
}

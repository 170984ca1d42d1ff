//! Shared request and response types for the folio-render generation engine.
//!
//! These types cross process boundaries (job payloads, admin reporting, the
//! `folio-render` CLI) and therefore carry only plain, serializable data.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Portfolio data a template is rendered with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PortfolioDocument {
    pub name: String,
    pub title: String,
    pub description: String,
    pub contact_email: Option<String>,
    pub items: Vec<PortfolioItem>,
    /// Free-form theme token understood by the templating subsystem.
    pub theme: Option<String>,
}

/// A single case study or project entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PortfolioItem {
    pub title: String,
    pub summary: String,
    pub url: Option<String>,
}

/// Identifies what to render.
///
/// `mode` is kept as a string on the wire so that unknown modes reach the
/// engine and are rejected there instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationTarget {
    pub mode: String,
    pub template: String,
    /// Page to navigate to; when absent the template HTML is loaded inline.
    #[serde(default)]
    pub source_url: Option<String>,
    pub document: PortfolioDocument,
}

impl GenerationTarget {
    pub fn new(mode: impl Into<String>, template: impl Into<String>, document: PortfolioDocument) -> Self {
        Self {
            mode: mode.into(),
            template: template.into(),
            source_url: None,
            document,
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            device_scale_factor: 1.0,
        }
    }
}

/// Rendering hints supplied with a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GenerationOptions {
    pub viewport: Viewport,
    /// Overrides the configured readiness selector.
    pub wait_for_selector: Option<String>,
    /// Overrides the configured body-length readiness threshold.
    pub min_body_length: Option<usize>,
    /// Skip waiting for images and fonts.
    pub fast_mode: bool,
    /// Bypass live rendering and go straight to the template fallback.
    pub force_fallback: bool,
}

/// Which strategy produced an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTier {
    /// Rendered by a pooled headless renderer.
    Live,
    /// Rendered by the pool-independent template renderer.
    Template,
    /// Plain last-resort document.
    Minimal,
}

impl OutputTier {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputTier::Live => "live",
            OutputTier::Template => "template",
            OutputTier::Minimal => "minimal",
        }
    }
}

/// Placeholder content found in a generated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentWarning {
    pub marker: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub html: String,
    pub tier: OutputTier,
    /// Number of live attempts made before this output was produced.
    pub attempts: u32,
    pub warnings: Vec<ContentWarning>,
    pub elapsed: Duration,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

impl GenerationOutput {
    pub fn is_fallback(&self) -> bool {
        self.tier != OutputTier::Live
    }
}

/// Point-in-time view of a renderer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PoolStats {
    pub pool_size: usize,
    pub in_use: usize,
    pub available: usize,
    pub max_size: usize,
    pub total_use_count: u64,
}

//! Pool-independent fallback tiers.

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
};

use folio_render_types::PortfolioDocument;
use thiserror::Error;

use super::types::RenderMode;
use crate::presentation::minimal::minimal_document;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown template `{0}`")]
    UnknownTemplate(String),
    #[error("template `{template}` failed to render: {message}")]
    Render { template: String, message: String },
}

/// Pure, synchronous renderer used as fallback tier 1.
///
/// Implementations must not touch the renderer pool or perform I/O.
pub trait TemplateRenderer: Send + Sync {
    fn render(
        &self,
        template: &str,
        mode: RenderMode,
        document: &PortfolioDocument,
    ) -> Result<String, TemplateError>;
}

/// Runs tier 1, turning a panic into an error.
pub(crate) fn render_template_tier(
    templates: &dyn TemplateRenderer,
    template: &str,
    mode: RenderMode,
    document: &PortfolioDocument,
) -> Result<String, String> {
    match catch_unwind(AssertUnwindSafe(|| templates.render(template, mode, document))) {
        Ok(Ok(html)) => Ok(html),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(format!("template renderer panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// Runs tier 2.
pub(crate) fn render_minimal_tier(document: &PortfolioDocument) -> Result<String, String> {
    catch_unwind(AssertUnwindSafe(|| minimal_document(document)))
        .map_err(|payload| format!("minimal renderer panicked: {}", panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

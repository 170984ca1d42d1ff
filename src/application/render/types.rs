use std::{fmt, str::FromStr};

use folio_render_types::{GenerationTarget, PortfolioDocument};
use thiserror::Error;
use url::Url;

/// How the generated document is going to be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// A standalone published site page.
    Site,
    /// An editor preview; same markup, rendered on demand.
    Preview,
    /// Print-bound output feeding PDF generation.
    Print,
}

impl RenderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderMode::Site => "site",
            RenderMode::Preview => "preview",
            RenderMode::Print => "print",
        }
    }

    pub fn is_print(self) -> bool {
        matches!(self, RenderMode::Print)
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderMode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "site" => Ok(RenderMode::Site),
            "preview" => Ok(RenderMode::Preview),
            "print" | "pdf" => Ok(RenderMode::Print),
            _ => Err(ValidationError::UnknownMode(value.to_string())),
        }
    }
}

/// Rejections raised before any rendering work starts. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown rendering mode `{0}`")]
    UnknownMode(String),
    #[error("target does not name a template")]
    MissingTemplate,
    #[error("invalid source url `{url}`: {reason}")]
    InvalidSourceUrl { url: String, reason: String },
}

/// A target whose fields have been checked and parsed.
#[derive(Debug, Clone)]
pub struct ValidatedTarget<'a> {
    pub mode: RenderMode,
    pub template: &'a str,
    pub source_url: Option<Url>,
    pub document: &'a PortfolioDocument,
}

impl<'a> ValidatedTarget<'a> {
    pub fn parse(target: &'a GenerationTarget) -> Result<Self, ValidationError> {
        let mode = target.mode.parse::<RenderMode>()?;

        let template = target.template.trim();
        if template.is_empty() {
            return Err(ValidationError::MissingTemplate);
        }

        let source_url = target
            .source_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(parse_source_url)
            .transpose()?;

        Ok(Self {
            mode,
            template,
            source_url,
            document: &target.document,
        })
    }
}

fn parse_source_url(raw: &str) -> Result<Url, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidSourceUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" | "file" => Ok(url),
        other => Err(invalid(format!("unsupported scheme `{other}`"))),
    }
}

/// Errors `generate` can return. Everything else is absorbed by retries and fallbacks.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("output still contains placeholder content: {}", markers.join(", "))]
    PlaceholderContent { markers: Vec<String> },
    #[error("every fallback tier failed (template: {template}; minimal: {minimal})")]
    FallbackExhausted { template: String, minimal: String },
}

impl GenerationError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Validation(_) => "validation",
            GenerationError::PlaceholderContent { .. } => "placeholder_content",
            GenerationError::FallbackExhausted { .. } => "fallback_exhausted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(mode: &str) -> GenerationTarget {
        GenerationTarget::new(mode, "classic", PortfolioDocument::default())
    }

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!("Site".parse::<RenderMode>(), Ok(RenderMode::Site));
        assert_eq!(" preview ".parse::<RenderMode>(), Ok(RenderMode::Preview));
        assert_eq!("PDF".parse::<RenderMode>(), Ok(RenderMode::Print));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let raw = target("hologram");
        let err = ValidatedTarget::parse(&raw).expect_err("mode is unknown");
        assert_eq!(err, ValidationError::UnknownMode("hologram".to_string()));
    }

    #[test]
    fn blank_template_is_rejected() {
        let raw = GenerationTarget::new("site", "  ", PortfolioDocument::default());
        assert_eq!(
            ValidatedTarget::parse(&raw).expect_err("template missing"),
            ValidationError::MissingTemplate
        );
    }

    #[test]
    fn source_url_must_use_a_supported_scheme() {
        let raw = target("site").with_source_url("ftp://example.com/site");
        assert!(matches!(
            ValidatedTarget::parse(&raw),
            Err(ValidationError::InvalidSourceUrl { .. })
        ));

        let raw = target("site").with_source_url("not a url");
        assert!(matches!(
            ValidatedTarget::parse(&raw),
            Err(ValidationError::InvalidSourceUrl { .. })
        ));
    }

    #[test]
    fn blank_source_url_means_inline_rendering() {
        let raw = target("print").with_source_url("   ");
        let validated = ValidatedTarget::parse(&raw).expect("valid target");
        assert!(validated.source_url.is_none());
        assert!(validated.mode.is_print());
        assert_eq!(validated.template, "classic");
    }
}

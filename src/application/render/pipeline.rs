//! Live rendering with bounded retries and deterministic fallbacks.

use std::{sync::Arc, time::Duration};

use folio_render_types::{GenerationOptions, GenerationOutput, GenerationTarget, OutputTier};
use metrics::{counter, histogram};
use time::OffsetDateTime;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, warn};

use super::{
    backend::{ReadinessSignal, RenderJob, RenderSource, RendererError},
    check::ContentCheck,
    config::PipelineConfig,
    fallback::{TemplateRenderer, render_minimal_tier, render_template_tier},
    metrics as render_metrics,
    pool::RendererPool,
    types::{GenerationError, ValidatedTarget},
};

const SOURCE: &str = "application::render::pipeline";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Success,
    Timeout,
    RenderError,
    Disconnected,
    PoolUnavailable,
}

impl AttemptOutcome {
    fn as_str(self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::RenderError => "render_error",
            AttemptOutcome::Disconnected => "disconnected",
            AttemptOutcome::PoolUnavailable => "pool_unavailable",
        }
    }
}

/// One live attempt. Logged, then discarded.
struct AttemptRecord {
    attempt: u32,
    started_at: Instant,
    outcome: AttemptOutcome,
    error: Option<String>,
}

impl AttemptRecord {
    fn log(&self, max_retries: u32) {
        let elapsed = self.started_at.elapsed();
        histogram!(render_metrics::RENDER_ATTEMPT_MS, "outcome" => self.outcome.as_str())
            .record(elapsed.as_secs_f64() * 1000.0);

        match &self.error {
            None => debug!(
                target = SOURCE,
                op = "pipeline::attempt",
                result = self.outcome.as_str(),
                attempt = self.attempt,
                max_retries,
                elapsed_ms = elapsed.as_millis() as u64,
                "Live render succeeded"
            ),
            Some(error) => warn!(
                target = SOURCE,
                op = "pipeline::attempt",
                result = self.outcome.as_str(),
                attempt = self.attempt,
                max_retries,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %error,
                "Live render attempt failed"
            ),
        }
    }
}

/// Produces a document for every well-formed target, preferring a live render.
#[derive(Clone)]
pub struct GenerationPipeline {
    pool: RendererPool,
    templates: Arc<dyn TemplateRenderer>,
    content_check: ContentCheck,
    config: PipelineConfig,
}

impl GenerationPipeline {
    pub fn new(
        pool: RendererPool,
        templates: Arc<dyn TemplateRenderer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            pool,
            templates,
            content_check: ContentCheck::default(),
            config,
        }
    }

    pub fn with_content_check(mut self, content_check: ContentCheck) -> Self {
        self.content_check = content_check;
        self
    }

    pub fn pool(&self) -> &RendererPool {
        &self.pool
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn generate(
        &self,
        target: &GenerationTarget,
        options: &GenerationOptions,
    ) -> Result<GenerationOutput, GenerationError> {
        let started_at = Instant::now();
        let generated_at = OffsetDateTime::now_utc();

        let validated = ValidatedTarget::parse(target).inspect_err(|err| {
            warn!(
                target = SOURCE,
                op = "pipeline::generate",
                result = "invalid",
                mode = %target.mode,
                template = %target.template,
                error = %err,
                "Rejected malformed generation target"
            );
        })?;

        let mut template_result: Option<Result<String, String>> = None;
        let mut attempts = 0;

        let live_html = if options.force_fallback || !self.config.live_rendering {
            debug!(
                target = SOURCE,
                op = "pipeline::generate",
                force_fallback = options.force_fallback,
                live_rendering = self.config.live_rendering,
                "Skipping live rendering"
            );
            None
        } else {
            let source = match &validated.source_url {
                Some(url) => Some(RenderSource::Url(url.to_string())),
                None => self.inline_source(&validated, &mut template_result),
            };
            match source {
                Some(source) => {
                    let job = self.build_job(&validated, options, source);
                    self.render_live(&job, &mut attempts).await
                }
                None => None,
            }
        };

        let (html, tier) = match live_html {
            Some(html) => (html, OutputTier::Live),
            None => self.render_fallback(&validated, template_result)?,
        };

        let warnings = self.content_check.inspect(&html);
        if !warnings.is_empty() {
            let markers: Vec<String> = warnings.iter().map(|w| w.marker.clone()).collect();
            warn!(
                target = SOURCE,
                op = "pipeline::content_check",
                result = "placeholder",
                template = validated.template,
                tier = tier.as_str(),
                markers = %markers.join(", "),
                strict = !self.config.allow_placeholder_output,
                "Generated output still contains placeholder content"
            );
            if !self.config.allow_placeholder_output {
                counter!(render_metrics::GENERATION_TOTAL, "tier" => "rejected").increment(1);
                return Err(GenerationError::PlaceholderContent { markers });
            }
        }

        counter!(render_metrics::GENERATION_TOTAL, "tier" => tier.as_str()).increment(1);
        let elapsed = started_at.elapsed();
        info!(
            target = SOURCE,
            op = "pipeline::generate",
            result = "ok",
            mode = validated.mode.as_str(),
            template = validated.template,
            tier = tier.as_str(),
            attempts,
            warnings = warnings.len(),
            html_bytes = html.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Generation finished"
        );

        Ok(GenerationOutput {
            html,
            tier,
            attempts,
            warnings,
            elapsed,
            generated_at,
        })
    }

    /// Markup handed to the renderer when the target has no source URL.
    ///
    /// The tier-1 result is kept for the fallback path.
    fn inline_source(
        &self,
        target: &ValidatedTarget<'_>,
        template_result: &mut Option<Result<String, String>>,
    ) -> Option<RenderSource> {
        let rendered = template_result.insert(render_template_tier(
            self.templates.as_ref(),
            target.template,
            target.mode,
            target.document,
        ));
        if let Ok(html) = rendered {
            return Some(RenderSource::Html(html.clone()));
        }

        match render_minimal_tier(target.document) {
            Ok(html) => Some(RenderSource::Html(html)),
            Err(err) => {
                warn!(
                    target = SOURCE,
                    op = "pipeline::inline_source",
                    result = "error",
                    error = %err,
                    "No inline markup for live rendering; skipping live attempts"
                );
                None
            }
        }
    }

    fn build_job(
        &self,
        target: &ValidatedTarget<'_>,
        options: &GenerationOptions,
        source: RenderSource,
    ) -> RenderJob {
        let selector = options
            .wait_for_selector
            .as_deref()
            .map(str::trim)
            .filter(|selector| !selector.is_empty())
            .unwrap_or(&self.config.readiness_selector)
            .to_string();

        RenderJob {
            source,
            viewport: options.viewport,
            readiness: ReadinessSignal {
                selector,
                min_body_length: options
                    .min_body_length
                    .unwrap_or(self.config.min_body_length),
                ceiling_ms: self.config.readiness_ceiling.as_millis() as u64,
            },
            wait_for_resources: !options.fast_mode,
            print_media: target.mode.is_print(),
        }
    }

    async fn render_live(&self, job: &RenderJob, attempts: &mut u32) -> Option<String> {
        let max_retries = self.config.max_retries;
        for attempt in 1..=max_retries {
            *attempts = attempt;
            let started_at = Instant::now();
            let result = self.attempt(job).await;

            let (outcome, error) = match &result {
                Ok(_) => (AttemptOutcome::Success, None),
                Err((outcome, error)) => (*outcome, Some(error.clone())),
            };
            AttemptRecord {
                attempt,
                started_at,
                outcome,
                error,
            }
            .log(max_retries);

            if let Ok(html) = result {
                return Some(html);
            }
            if attempt < max_retries {
                sleep(self.config.retry_delay).await;
            }
        }

        info!(
            target = SOURCE,
            op = "pipeline::render_live",
            result = "exhausted",
            attempts = *attempts,
            "Live rendering exhausted; falling back"
        );
        None
    }

    async fn attempt(&self, job: &RenderJob) -> Result<String, (AttemptOutcome, String)> {
        let lease = self
            .pool
            .acquire(self.pool.config().acquire_timeout)
            .await
            .map_err(|err| (AttemptOutcome::PoolUnavailable, err.to_string()))?;

        let result = timeout(self.config.attempt_timeout, lease.renderer().render(job)).await;
        self.pool.release(lease).await;

        match result {
            Err(_) => Err(timed_out(self.config.attempt_timeout)),
            Ok(Err(RendererError::Timeout(waited))) => Err(timed_out(waited)),
            Ok(Err(RendererError::Disconnected)) => Err((
                AttemptOutcome::Disconnected,
                RendererError::Disconnected.to_string(),
            )),
            Ok(Err(err)) => Err((AttemptOutcome::RenderError, err.to_string())),
            Ok(Ok(html)) if html.trim().is_empty() => Err((
                AttemptOutcome::RenderError,
                "renderer returned empty markup".to_string(),
            )),
            Ok(Ok(html)) => Ok(html),
        }
    }

    fn render_fallback(
        &self,
        target: &ValidatedTarget<'_>,
        template_result: Option<Result<String, String>>,
    ) -> Result<(String, OutputTier), GenerationError> {
        let template_result = template_result.unwrap_or_else(|| {
            render_template_tier(
                self.templates.as_ref(),
                target.template,
                target.mode,
                target.document,
            )
        });

        let template_error = match template_result {
            Ok(html) => return Ok((html, OutputTier::Template)),
            Err(err) => err,
        };
        warn!(
            target = SOURCE,
            op = "pipeline::fallback",
            result = "template_failed",
            template = target.template,
            error = %template_error,
            "Template fallback failed; using minimal document"
        );

        match render_minimal_tier(target.document) {
            Ok(html) => Ok((html, OutputTier::Minimal)),
            Err(minimal_error) => {
                error!(
                    target = SOURCE,
                    op = "pipeline::fallback",
                    result = "exhausted",
                    template = target.template,
                    template_error = %template_error,
                    minimal_error = %minimal_error,
                    "Every fallback tier failed"
                );
                counter!(render_metrics::GENERATION_TOTAL, "tier" => "failed").increment(1);
                Err(GenerationError::FallbackExhausted {
                    template: template_error,
                    minimal: minimal_error,
                })
            }
        }
    }
}

fn timed_out(waited: Duration) -> (AttemptOutcome, String) {
    (
        AttemptOutcome::Timeout,
        RendererError::Timeout(waited).to_string(),
    )
}

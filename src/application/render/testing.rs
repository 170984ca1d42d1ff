//! In-memory renderer and template doubles shared by the render tests.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use folio_render_types::{PortfolioDocument, PortfolioItem, Viewport};

use super::{
    backend::{ReadinessSignal, RenderJob, RenderSource, Renderer, RendererError, RendererFactory},
    fallback::{TemplateError, TemplateRenderer},
    types::RenderMode,
};

/// Knobs and counters shared between a mock factory and every renderer it creates.
#[derive(Default)]
pub(crate) struct MockControls {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub resets: AtomicUsize,
    pub renders: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    /// Number of upcoming `create` calls that fail.
    pub fail_creates: AtomicUsize,
    /// Number of upcoming `render` calls that fail.
    pub fail_renders: AtomicUsize,
    /// Renderers whose sequence number is below this value fail their probe.
    pub unhealthy_below: AtomicUsize,
    pub fail_resets: AtomicBool,
    pub disconnect_on_failure: AtomicBool,
    pub render_delay_ms: AtomicU64,
    pub create_delay_ms: AtomicU64,
    pub jobs: Mutex<Vec<RenderJob>>,
}

impl MockControls {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn set_render_delay(&self, delay: Duration) {
        self.render_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_create_delay(&self, delay: Duration) {
        self.create_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn recorded_jobs(&self) -> Vec<RenderJob> {
        self.jobs.lock().expect("jobs lock").clone()
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

pub(crate) struct MockRenderer {
    seq: usize,
    controls: Arc<MockControls>,
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn probe(&self) -> bool {
        self.seq >= self.controls.unhealthy_below.load(Ordering::SeqCst)
    }

    async fn render(&self, job: &RenderJob) -> Result<String, RendererError> {
        let controls = &self.controls;
        controls.renders.fetch_add(1, Ordering::SeqCst);
        controls.jobs.lock().expect("jobs lock").push(job.clone());

        let active = controls.active.fetch_add(1, Ordering::SeqCst) + 1;
        controls.max_active.fetch_max(active, Ordering::SeqCst);

        let delay = controls.render_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        controls.active.fetch_sub(1, Ordering::SeqCst);

        if take_one(&controls.fail_renders) {
            if controls.disconnect_on_failure.load(Ordering::SeqCst) {
                return Err(RendererError::Disconnected);
            }
            return Err(RendererError::Render("forced failure".to_string()));
        }

        let body = match &job.source {
            RenderSource::Url(url) => format!("<main>navigated to {url}</main>"),
            RenderSource::Html(html) => html.clone(),
        };
        Ok(format!(
            "<!doctype html><html><body data-rendered=\"live\">{body}</body></html>"
        ))
    }

    async fn reset(&self) -> Result<(), RendererError> {
        self.controls.resets.fetch_add(1, Ordering::SeqCst);
        if self.controls.fail_resets.load(Ordering::SeqCst) {
            return Err(RendererError::Io("reset failed".to_string()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), RendererError> {
        self.controls.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MockRendererFactory {
    pub controls: Arc<MockControls>,
}

impl MockRendererFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl RendererFactory for MockRendererFactory {
    fn backend(&self) -> &'static str {
        "mock"
    }

    async fn create(&self) -> Result<Arc<dyn Renderer>, RendererError> {
        if take_one(&self.controls.fail_creates) {
            return Err(RendererError::Spawn {
                program: "mock".to_string(),
                message: "forced create failure".to_string(),
            });
        }
        let delay = self.controls.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let seq = self.controls.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockRenderer {
            seq,
            controls: Arc::clone(&self.controls),
        }))
    }
}

/// Template renderer that always errors.
pub(crate) struct FailingTemplates;

impl TemplateRenderer for FailingTemplates {
    fn render(
        &self,
        template: &str,
        _mode: RenderMode,
        _document: &PortfolioDocument,
    ) -> Result<String, TemplateError> {
        Err(TemplateError::Render {
            template: template.to_string(),
            message: "forced template failure".to_string(),
        })
    }
}

/// Template renderer that panics, standing in for a defect in the templating code.
pub(crate) struct PanickingTemplates;

impl TemplateRenderer for PanickingTemplates {
    fn render(
        &self,
        _template: &str,
        _mode: RenderMode,
        _document: &PortfolioDocument,
    ) -> Result<String, TemplateError> {
        panic!("template exploded");
    }
}

pub(crate) fn sample_document() -> PortfolioDocument {
    PortfolioDocument {
        name: "Ada Lovelace".to_string(),
        title: "Analytical Engineer".to_string(),
        description: "Notes on the engine, annotated programs and assorted letters.".to_string(),
        contact_email: Some("ada@example.com".to_string()),
        items: vec![
            PortfolioItem {
                title: "Note G".to_string(),
                summary: "Bernoulli numbers computed on the engine.".to_string(),
                url: Some("https://example.com/note-g".to_string()),
            },
            PortfolioItem {
                title: "Sketch".to_string(),
                summary: "Translation of Menabrea's memoir.".to_string(),
                url: None,
            },
        ],
        theme: None,
    }
}

pub(crate) fn sample_job() -> RenderJob {
    RenderJob {
        source: RenderSource::Url("https://example.com/ada".to_string()),
        viewport: Viewport::default(),
        readiness: ReadinessSignal {
            selector: "[data-portfolio-ready]".to_string(),
            min_body_length: 200,
            ceiling_ms: 3000,
        },
        wait_for_resources: true,
        print_media: false,
    }
}

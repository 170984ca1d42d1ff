use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use folio_render::application::render::{
    GenerationPipeline, PipelineConfig, PoolConfig, RenderJob, Renderer, RendererError,
    RendererFactory, RendererPool,
};
use folio_render::infra::telemetry;
use folio_render::presentation::portfolio::AskamaTemplateRenderer;
use folio_render_types::{GenerationOptions, GenerationTarget, PortfolioDocument};
use metrics_util::debugging::DebuggingRecorder;

struct StubRenderer {
    healthy: Arc<AtomicBool>,
}

#[async_trait]
impl Renderer for StubRenderer {
    async fn probe(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn render(&self, _job: &RenderJob) -> Result<String, RendererError> {
        Ok("<html><body data-portfolio-ready>stub</body></html>".to_string())
    }

    async fn reset(&self) -> Result<(), RendererError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), RendererError> {
        Ok(())
    }
}

struct StubFactory {
    healthy: Arc<AtomicBool>,
}

#[async_trait]
impl RendererFactory for StubFactory {
    fn backend(&self) -> &'static str {
        "stub"
    }

    async fn create(&self) -> Result<Arc<dyn Renderer>, RendererError> {
        Ok(Arc::new(StubRenderer {
            healthy: Arc::clone(&self.healthy),
        }))
    }
}

#[tokio::test(start_paused = true)]
async fn pool_and_pipeline_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let healthy = Arc::new(AtomicBool::new(true));
    let pool = RendererPool::new(
        PoolConfig {
            max_size: 1,
            recycle_threshold: 1,
            ..PoolConfig::default()
        },
        Arc::new(StubFactory {
            healthy: healthy.clone(),
        }),
    );
    let pipeline = GenerationPipeline::new(
        pool.clone(),
        Arc::new(AskamaTemplateRenderer),
        PipelineConfig::default(),
    );
    let target = GenerationTarget::new(
        "site",
        "classic",
        PortfolioDocument {
            name: "Metrics".to_string(),
            ..PortfolioDocument::default()
        },
    );

    // Acquire, attempt timing and generation counters; the second use recycles.
    for _ in 0..2 {
        pipeline
            .generate(&target, &GenerationOptions::default())
            .await
            .expect("generate");
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Acquire timeout while the only renderer is checked out.
    let lease = pool.acquire(Duration::from_secs(1)).await.expect("acquire");
    assert!(pool.acquire(Duration::from_millis(200)).await.is_err());
    pool.release(lease).await;

    // Unhealthy probe.
    healthy.store(false, Ordering::SeqCst);
    let lease = pool.acquire(Duration::from_secs(1)).await.expect("acquire");
    pool.release(lease).await;
    healthy.store(true, Ordering::SeqCst);

    // Idle eviction.
    tokio::time::advance(Duration::from_secs(301)).await;
    let report = pool.sweep_idle().await;
    assert!(report.evicted >= 1);

    pool.shutdown().await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "folio_pool_acquire_total",
        "folio_pool_acquire_timeout_total",
        "folio_pool_unhealthy_total",
        "folio_pool_recycled_total",
        "folio_pool_evicted_total",
        "folio_pool_size",
        "folio_render_attempt_ms",
        "folio_generation_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}

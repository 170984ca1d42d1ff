use std::sync::Arc;

use folio_render_types::{GenerationOptions, GenerationOutput, GenerationTarget, OutputTier};
use tracing::{debug, warn};

use super::{keys::ArtifactKey, store::ArtifactCache};
use crate::application::render::{GenerationError, GenerationPipeline};

const SOURCE: &str = "cache::generator";

/// Serves repeated targets from an [`ArtifactCache`] and delegates misses to the pipeline.
///
/// Only live-rendered output is stored; fallback output is regenerated so a
/// later request can still get a live render.
#[derive(Clone)]
pub struct CachedGenerator {
    pipeline: GenerationPipeline,
    cache: Option<Arc<dyn ArtifactCache>>,
}

impl CachedGenerator {
    pub fn new(pipeline: GenerationPipeline, cache: Arc<dyn ArtifactCache>) -> Self {
        Self {
            pipeline,
            cache: Some(cache),
        }
    }

    pub fn uncached(pipeline: GenerationPipeline) -> Self {
        Self {
            pipeline,
            cache: None,
        }
    }

    pub fn pipeline(&self) -> &GenerationPipeline {
        &self.pipeline
    }

    pub fn cache(&self) -> Option<&Arc<dyn ArtifactCache>> {
        self.cache.as_ref()
    }

    pub async fn generate(
        &self,
        target: &GenerationTarget,
        options: &GenerationOptions,
    ) -> Result<GenerationOutput, GenerationError> {
        let Some(cache) = self.cache.as_ref() else {
            return self.pipeline.generate(target, options).await;
        };

        let key = match ArtifactKey::fingerprint(target, options) {
            Ok(key) => key,
            Err(err) => {
                warn!(
                    target = SOURCE,
                    op = "cache::fingerprint",
                    result = "error",
                    error = %err,
                    "Failed to fingerprint target; bypassing cache"
                );
                return self.pipeline.generate(target, options).await;
            }
        };

        if let Some(output) = cache.get(&key) {
            debug!(
                target = SOURCE,
                op = "cache::get",
                result = "hit",
                key = %key,
                "Serving generated document from cache"
            );
            return Ok(output);
        }

        let output = self.pipeline.generate(target, options).await?;
        if output.tier == OutputTier::Live {
            cache.put(key, output.clone());
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::application::render::{PipelineConfig, PoolConfig, RendererPool};
    use crate::application::render::testing::{MockRendererFactory, sample_document};
    use crate::cache::{ArtifactCacheConfig, LruArtifactCache};
    use crate::presentation::portfolio::AskamaTemplateRenderer;

    fn generator(factory: Arc<MockRendererFactory>) -> (CachedGenerator, Arc<LruArtifactCache>) {
        let pool = RendererPool::new(PoolConfig::default(), factory);
        let pipeline = GenerationPipeline::new(
            pool,
            Arc::new(AskamaTemplateRenderer),
            PipelineConfig::default(),
        );
        let cache = Arc::new(LruArtifactCache::new(&ArtifactCacheConfig::default()));
        (CachedGenerator::new(pipeline, cache.clone()), cache)
    }

    #[tokio::test(start_paused = true)]
    async fn live_output_is_served_from_cache() {
        let factory = MockRendererFactory::new();
        let (generator, cache) = generator(factory.clone());
        let target = GenerationTarget::new("site", "classic", sample_document());
        let options = GenerationOptions::default();

        let first = generator.generate(&target, &options).await.expect("first");
        let second = generator.generate(&target, &options).await.expect("second");

        assert_eq!(first, second);
        assert_eq!(factory.controls.renders(), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_output_is_not_cached() {
        let factory = MockRendererFactory::new();
        factory.controls.fail_renders.store(2, Ordering::SeqCst);
        let (generator, cache) = generator(factory.clone());
        let target = GenerationTarget::new("site", "classic", sample_document());
        let options = GenerationOptions::default();

        let first = generator.generate(&target, &options).await.expect("first");
        assert_eq!(first.tier, OutputTier::Template);
        assert_eq!(cache.stats().entries, 0);

        let second = generator.generate(&target, &options).await.expect("second");
        assert_eq!(second.tier, OutputTier::Live);
        assert_eq!(cache.stats().entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_errors_pass_through() {
        let factory = MockRendererFactory::new();
        let (generator, cache) = generator(factory);
        let target = GenerationTarget::new("hologram", "classic", sample_document());

        let err = generator
            .generate(&target, &GenerationOptions::default())
            .await
            .expect_err("invalid mode");
        assert!(matches!(err, GenerationError::Validation(_)));
        assert_eq!(cache.stats().entries, 0);
    }
}

use std::{
    path::{Path, PathBuf},
    process,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use folio_render::{
    application::{
        error::AppError,
        render::{
            GenerationPipeline, PipelineConfig, PoolConfig, ProcessRendererFactory, RendererPool,
        },
    },
    cache::{ArtifactCacheConfig, CachedGenerator, LruArtifactCache},
    config,
    infra::{error::InfraError, telemetry},
    presentation::portfolio::AskamaTemplateRenderer,
};
use folio_render_types::{GenerationOptions, GenerationTarget};
use futures::stream::{self, TryStreamExt};
use serde::Deserialize;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

/// On-disk target description: a generation target plus optional rendering hints.
#[derive(Debug, Deserialize)]
struct TargetFile {
    #[serde(flatten)]
    target: GenerationTarget,
    #[serde(default)]
    options: GenerationOptions,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let Some(command) = cli_args.command else {
        return Err(AppError::validation(
            "a subcommand is required: `generate` or `pool-check`",
        ));
    };

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let factory = Arc::new(ProcessRendererFactory::from(&settings.renderer));
    let pool = RendererPool::new(PoolConfig::from(&settings.pool), factory);

    let result = match command {
        config::Command::Generate(args) => run_generate(&settings, pool.clone(), args).await,
        config::Command::PoolCheck => run_pool_check(&pool).await,
    };

    pool.shutdown().await;
    result
}

async fn run_generate(
    settings: &config::Settings,
    pool: RendererPool,
    args: config::GenerateArgs,
) -> Result<(), AppError> {
    if settings.pipeline.live_rendering && !args.force_fallback {
        pool.warm_up().await;
        pool.start_idle_sweep();
    }

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .map_err(InfraError::from)?;

    let pipeline = GenerationPipeline::new(
        pool,
        Arc::new(AskamaTemplateRenderer),
        PipelineConfig::from(&settings.pipeline),
    );
    let cache_config = ArtifactCacheConfig::from(&settings.cache);
    let generator = if cache_config.enabled {
        CachedGenerator::new(pipeline, Arc::new(LruArtifactCache::new(&cache_config)))
    } else {
        CachedGenerator::uncached(pipeline)
    };

    let concurrency = args.concurrency.clamp(1, 32);
    let total = args.targets.len();
    let failed = Arc::new(AtomicUsize::new(0));

    info!(
        target = "folio_render::generate",
        targets = total,
        concurrency,
        force_fallback = args.force_fallback,
        fast = args.fast,
        "Starting generation"
    );

    let failed_handle = failed.clone();
    let args = Arc::new(args);
    stream::iter(args.targets.clone().into_iter().map(Ok::<_, AppError>))
        .try_for_each_concurrent(Some(concurrency), move |path| {
            let generator = generator.clone();
            let args = args.clone();
            let counter = failed_handle.clone();
            async move {
                if let Err(err) = generate_file(&generator, &path, &args).await {
                    warn!(
                        target = "folio_render::generate",
                        path = %path.display(),
                        error = %err,
                        "Target failed"
                    );
                    counter.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            }
        })
        .await?;

    let failed = failed.load(Ordering::Relaxed);
    info!(
        target = "folio_render::generate",
        targets = total,
        succeeded = total - failed,
        failed,
        "Generation finished"
    );

    if failed > 0 {
        return Err(AppError::unexpected(format!(
            "{failed} of {total} targets failed"
        )));
    }
    Ok(())
}

async fn generate_file(
    generator: &CachedGenerator,
    path: &Path,
    args: &config::GenerateArgs,
) -> Result<(), AppError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(InfraError::from)?;
    let TargetFile {
        target,
        mut options,
    } = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("{}: {err}", path.display())))?;
    options.force_fallback |= args.force_fallback;
    options.fast_mode |= args.fast;

    let output = generator.generate(&target, &options).await?;

    let destination = output_path(&args.output_dir, path);
    tokio::fs::write(&destination, output.html.as_bytes())
        .await
        .map_err(InfraError::from)?;

    info!(
        target = "folio_render::generate",
        path = %path.display(),
        output = %destination.display(),
        tier = output.tier.as_str(),
        attempts = output.attempts,
        warnings = output.warnings.len(),
        elapsed_ms = output.elapsed.as_millis() as u64,
        "Target generated"
    );
    Ok(())
}

fn output_path(output_dir: &Path, target_path: &Path) -> PathBuf {
    let stem = target_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("output");
    output_dir.join(format!("{stem}.html"))
}

async fn run_pool_check(pool: &RendererPool) -> Result<(), AppError> {
    let created = pool.warm_up().await;
    let stats = pool.stats();
    info!(
        target = "folio_render::pool_check",
        created,
        pool_size = stats.pool_size,
        max_size = stats.max_size,
        "Pool check finished"
    );

    let json = serde_json::to_string_pretty(&stats)
        .map_err(|err| AppError::unexpected(format!("failed to encode pool stats: {err}")))?;
    println!("{json}");

    if stats.pool_size == 0 {
        return Err(AppError::unexpected(
            "no renderer could be started; check `renderer.program`",
        ));
    }
    Ok(())
}

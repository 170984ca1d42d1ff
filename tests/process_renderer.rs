#![cfg(unix)]

use std::{fs, os::unix::fs::PermissionsExt, path::PathBuf, sync::Arc, time::Duration};

use folio_render::application::render::{
    GenerationPipeline, PipelineConfig, PoolConfig, ProcessRendererFactory, ReadinessSignal,
    RenderJob, RenderSource, RendererError, RendererFactory, RendererPool,
};
use folio_render::presentation::portfolio::AskamaTemplateRenderer;
use folio_render_types::{
    GenerationOptions, GenerationTarget, OutputTier, PortfolioDocument, Viewport,
};
use tempfile::TempDir;

const RENDERING_SCRIPT: &str = r#"#!/bin/sh
echo "$@" > "$(dirname "$0")/args.log"
echo "fake renderer booting" >&2
while IFS= read -r line; do
  case "$line" in
    *'"op":"ping"'*) echo '{"ok":true}' ;;
    *'"op":"render"'*) echo '{"ok":true,"html":"<html><body data-portfolio-ready>rendered by fake</body></html>"}' ;;
    *'"op":"reset"'*) echo '{"ok":true}' ;;
    *'"op":"close"'*) echo '{"ok":true}'; exit 0 ;;
    *) echo '{"ok":false,"error":"unknown op"}' ;;
  esac
done
"#;

fn write_script(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("fake-renderer");
    fs::write(&path, body).expect("write script");
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("set perms");
    path
}

fn job() -> RenderJob {
    RenderJob {
        source: RenderSource::Html("<p>hello</p>".to_string()),
        viewport: Viewport::default(),
        readiness: ReadinessSignal {
            selector: "[data-portfolio-ready]".to_string(),
            min_body_length: 200,
            ceiling_ms: 3000,
        },
        wait_for_resources: false,
        print_media: false,
    }
}

#[tokio::test]
async fn renderer_process_round_trips_every_operation() {
    let dir = TempDir::new().expect("temp dir");
    let script = write_script(&dir, RENDERING_SCRIPT);
    let factory = ProcessRendererFactory::new(&script, vec!["--headless".to_string()]);

    let renderer = factory.create().await.expect("renderer starts");
    assert!(renderer.probe().await);

    let html = renderer.render(&job()).await.expect("render");
    assert!(html.contains("rendered by fake"), "unexpected html: {html}");

    renderer.reset().await.expect("reset");
    renderer.close().await.expect("close");
    assert!(!renderer.probe().await);

    let args = fs::read_to_string(dir.path().join("args.log")).expect("read args");
    assert!(args.contains("--headless"), "args not forwarded: {args}");
}

#[tokio::test]
async fn renderer_failures_surface_their_message() {
    let dir = TempDir::new().expect("temp dir");
    let script = write_script(
        &dir,
        r#"#!/bin/sh
while IFS= read -r line; do
  case "$line" in
    *'"op":"render"'*) echo '{"ok":false,"error":"navigation failed"}' ;;
    *) echo '{"ok":true}' ;;
  esac
done
"#,
    );

    let renderer = ProcessRendererFactory::new(&script, Vec::new())
        .create()
        .await
        .expect("renderer starts");
    let err = renderer.render(&job()).await.expect_err("render fails");
    assert_eq!(err, RendererError::Render("navigation failed".to_string()));

    // A reported failure leaves the stream usable.
    assert!(renderer.probe().await);
}

#[tokio::test]
async fn exited_process_is_reported_as_disconnected() {
    let dir = TempDir::new().expect("temp dir");
    let script = write_script(
        &dir,
        r#"#!/bin/sh
IFS= read -r line
echo '{"ok":true}'
exit 0
"#,
    );

    let renderer = ProcessRendererFactory::new(&script, Vec::new())
        .create()
        .await
        .expect("renderer starts");

    let err = renderer.render(&job()).await.expect_err("process is gone");
    assert!(
        matches!(err, RendererError::Disconnected | RendererError::Io(_)),
        "unexpected error: {err:?}"
    );
    assert!(!renderer.probe().await);
}

#[tokio::test]
async fn silent_process_fails_the_startup_handshake() {
    let dir = TempDir::new().expect("temp dir");
    let script = write_script(
        &dir,
        r#"#!/bin/sh
while IFS= read -r line; do :; done
"#,
    );

    let err = ProcessRendererFactory::new(&script, Vec::new())
        .with_startup_timeout(Duration::from_millis(200))
        .create()
        .await
        .err()
        .expect("handshake times out");
    assert_eq!(err, RendererError::Timeout(Duration::from_millis(200)));
}

#[tokio::test]
async fn pipeline_renders_through_a_pooled_process() {
    let dir = TempDir::new().expect("temp dir");
    let script = write_script(&dir, RENDERING_SCRIPT);
    let pool = RendererPool::new(
        PoolConfig {
            max_size: 1,
            ..PoolConfig::default()
        },
        Arc::new(ProcessRendererFactory::new(&script, Vec::new())),
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
            name: "Ada Lovelace".to_string(),
            ..PortfolioDocument::default()
        },
    );
    let output = pipeline
        .generate(&target, &GenerationOptions::default())
        .await
        .expect("generate");

    assert_eq!(output.tier, OutputTier::Live);
    assert!(output.html.contains("rendered by fake"));
    assert_eq!(pool.stats().pool_size, 1);

    pool.shutdown().await;
    assert_eq!(pool.stats().pool_size, 0);
}

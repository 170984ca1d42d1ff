//! Renderer backend driving a long-lived child process over newline-delimited JSON.
//!
//! Each request is one JSON object on the child's stdin; the child answers
//! with exactly one JSON object on stdout. Anything the child writes to
//! stderr is forwarded to the debug log.

use std::{path::PathBuf, process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout, Command},
    sync::Mutex,
    time::{Instant, timeout},
};
use tracing::{debug, info, warn};

use super::backend::{RenderJob, Renderer, RendererError, RendererFactory};
use crate::config::RendererSettings;

const SOURCE: &str = "application::render::process";
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Ping,
    Render(&'a RenderJob),
    Reset,
    Close,
}

impl Request<'_> {
    fn op(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::Render(_) => "render",
            Request::Reset => "reset",
            Request::Close => "close",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Response {
    ok: bool,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Spawns one child process per renderer.
#[derive(Debug, Clone)]
pub struct ProcessRendererFactory {
    program: PathBuf,
    args: Vec<String>,
    startup_timeout: Duration,
}

impl ProcessRendererFactory {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    /// How long a freshly spawned child may take to answer its first ping.
    pub fn with_startup_timeout(mut self, startup_timeout: Duration) -> Self {
        self.startup_timeout = startup_timeout;
        self
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl From<&RendererSettings> for ProcessRendererFactory {
    fn from(settings: &RendererSettings) -> Self {
        Self::new(settings.program.clone(), settings.args.clone())
    }
}

#[async_trait]
impl RendererFactory for ProcessRendererFactory {
    fn backend(&self) -> &'static str {
        "process"
    }

    async fn create(&self) -> Result<Arc<dyn Renderer>, RendererError> {
        let started_at = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                warn!(
                    target = SOURCE,
                    op = "process::spawn",
                    result = "error",
                    program = %self.program.display(),
                    error = %err,
                    "Failed to spawn renderer process"
                );
                RendererError::Spawn {
                    program: self.program_name(),
                    message: err.to_string(),
                }
            })?;

        let pid = child.id();
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill().await;
            return Err(RendererError::Spawn {
                program: self.program_name(),
                message: "child stdio was not captured".to_string(),
            });
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target = SOURCE, op = "process::stderr", pid, "{line}");
                }
            });
        }

        let renderer = ProcessRenderer {
            pid,
            io: Mutex::new(ProcessIo {
                child,
                stdin: Some(stdin),
                stdout: BufReader::new(stdout).lines(),
                in_flight: false,
                closed: false,
            }),
        };

        let handshake = match timeout(self.startup_timeout, renderer.exchange(&Request::Ping)).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(RendererError::Timeout(self.startup_timeout)),
        };
        if let Err(err) = handshake {
            warn!(
                target = SOURCE,
                op = "process::spawn",
                result = "handshake_failed",
                program = %self.program.display(),
                pid,
                error = %err,
                "Renderer process did not answer its first ping"
            );
            renderer.kill().await;
            return Err(err);
        }

        info!(
            target = SOURCE,
            op = "process::spawn",
            result = "ok",
            program = %self.program.display(),
            pid,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Renderer process started"
        );
        Ok(Arc::new(renderer))
    }
}

struct ProcessIo {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    /// Set while a request awaits its response. Still set at the start of the
    /// next exchange means the previous one was cancelled and the stream is
    /// out of step.
    in_flight: bool,
    closed: bool,
}

pub struct ProcessRenderer {
    pid: Option<u32>,
    io: Mutex<ProcessIo>,
}

impl ProcessRenderer {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn exchange(&self, request: &Request<'_>) -> Result<Response, RendererError> {
        let mut io = self.io.lock().await;
        if io.closed {
            return Err(RendererError::Disconnected);
        }
        if io.in_flight {
            io.closed = true;
            return Err(RendererError::Disconnected);
        }
        if let Ok(Some(status)) = io.child.try_wait() {
            debug!(
                target = SOURCE,
                op = request.op(),
                pid = self.pid,
                status = %status,
                "Renderer process already exited"
            );
            io.closed = true;
            return Err(RendererError::Disconnected);
        }

        let mut line = serde_json::to_string(request)
            .map_err(|err| RendererError::Protocol(format!("failed to encode request: {err}")))?;
        line.push('\n');

        io.in_flight = true;
        let Some(stdin) = io.stdin.as_mut() else {
            io.closed = true;
            return Err(RendererError::Disconnected);
        };
        if let Err(err) = write_line(stdin, &line).await {
            io.closed = true;
            return Err(err);
        }

        let reply = match io.stdout.next_line().await {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                io.closed = true;
                return Err(RendererError::Disconnected);
            }
            Err(err) => {
                io.closed = true;
                return Err(RendererError::Io(err.to_string()));
            }
        };
        io.in_flight = false;

        let response: Response = serde_json::from_str(&reply).map_err(|err| {
            RendererError::Protocol(format!("invalid response to `{}`: {err}", request.op()))
        })?;
        if response.ok {
            Ok(response)
        } else {
            Err(RendererError::Render(
                response
                    .error
                    .unwrap_or_else(|| "renderer reported failure without a message".to_string()),
            ))
        }
    }

    async fn kill(&self) {
        let mut io = self.io.lock().await;
        io.closed = true;
        io.stdin = None;
        if let Err(err) = io.child.kill().await {
            debug!(
                target = SOURCE,
                op = "process::kill",
                pid = self.pid,
                error = %err,
                "Failed to kill renderer process"
            );
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> Result<(), RendererError> {
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|err| match err.kind() {
            std::io::ErrorKind::BrokenPipe => RendererError::Disconnected,
            _ => RendererError::Io(err.to_string()),
        })?;
    stdin
        .flush()
        .await
        .map_err(|err| RendererError::Io(err.to_string()))
}

#[async_trait]
impl Renderer for ProcessRenderer {
    async fn probe(&self) -> bool {
        self.exchange(&Request::Ping).await.is_ok()
    }

    async fn render(&self, job: &RenderJob) -> Result<String, RendererError> {
        let response = self.exchange(&Request::Render(job)).await?;
        response
            .html
            .ok_or_else(|| RendererError::Protocol("render response carried no html".to_string()))
    }

    async fn reset(&self) -> Result<(), RendererError> {
        self.exchange(&Request::Reset).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), RendererError> {
        if let Err(err) = self.exchange(&Request::Close).await {
            debug!(
                target = SOURCE,
                op = "process::close",
                pid = self.pid,
                error = %err,
                "Close request not acknowledged"
            );
        }

        let mut io = self.io.lock().await;
        io.closed = true;
        io.stdin = None;
        match timeout(CLOSE_GRACE, io.child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(RendererError::Io(err.to_string())),
            Err(_) => {
                warn!(
                    target = SOURCE,
                    op = "process::close",
                    pid = self.pid,
                    "Renderer process ignored close; killing"
                );
                io.child
                    .kill()
                    .await
                    .map_err(|err| RendererError::Io(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::testing::sample_job;

    #[test]
    fn render_request_is_flattened_under_its_op() {
        let job = sample_job();
        let value = serde_json::to_value(Request::Render(&job)).expect("encode");
        assert_eq!(value["op"], "render");
        assert_eq!(value["source"]["kind"], "url");
        assert_eq!(value["viewport"]["width"], 1280);
        assert_eq!(value["readiness"]["selector"], "[data-portfolio-ready]");
        assert_eq!(value["wait_for_resources"], true);
    }

    #[test]
    fn simple_requests_carry_only_the_op() {
        let encoded = serde_json::to_string(&Request::Ping).expect("encode");
        assert_eq!(encoded, r#"{"op":"ping"}"#);
    }

    #[test]
    fn responses_tolerate_missing_fields() {
        let response: Response = serde_json::from_str(r#"{"ok":true}"#).expect("decode");
        assert!(response.ok);
        assert!(response.html.is_none());
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let factory = ProcessRendererFactory::new("/nonexistent/folio-renderer", Vec::new());
        let err = factory.create().await.err().expect("spawn fails");
        assert!(matches!(err, RendererError::Spawn { .. }));
    }
}

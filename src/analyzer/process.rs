use super::{Analyzer, types::*};
use crate::config;
use crate::error::AnalyzerError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Analyzer backed by a sandboxed child process (by default
/// `docker run -i --rm axe-runner`).
///
/// The payload goes to stdin, the result is read from stdout. The child is
/// killed when the deadline passes or the run is dropped.
#[derive(Debug, Clone)]
pub struct ProcessAnalyzer {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
    keep_stderr: bool,
}

impl ProcessAnalyzer {
    pub fn new(cfg: &config::Analyzer) -> Self {
        Self {
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            env: cfg.env.clone(),
            timeout: cfg.timeout(),
            keep_stderr: cfg.keep_stderr,
        }
    }

    pub fn command(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: BTreeMap::new(),
            timeout: None,
            keep_stderr: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Checks that the analyzer runtime can be launched at all.
    pub async fn doctor(&self) -> DoctorReport {
        let version = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output();
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, version)
                .await
                .unwrap_or_else(|_| Err(std::io::Error::other("version check timed out"))),
            None => version.await,
        };
        match result {
            Ok(out) if out.status.success() => DoctorReport {
                program: self.program.clone(),
                version: Some(String::from_utf8_lossy(&out.stdout).trim().to_string()),
                ok: true,
                error: None,
            },
            Ok(out) => DoctorReport {
                program: self.program.clone(),
                version: None,
                ok: false,
                error: Some(String::from_utf8_lossy(&out.stderr).trim().to_string()),
            },
            Err(e) => DoctorReport {
                program: self.program.clone(),
                version: None,
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}

#[async_trait]
impl Analyzer for ProcessAnalyzer {
    async fn run(&self, payload: &[u8]) -> Result<AnalyzerOutput, AnalyzerError> {
        debug!(
            program = %self.program,
            args = ?self.args,
            timeout = ?self.timeout,
            payload_bytes = payload.len(),
            "spawning analyzer"
        );
        let started = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(|source| AnalyzerError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Feed stdin while the output is collected so a chatty child can't
        // block on a full pipe before it has read its input.
        let stdin = child.stdin.take();
        let input = payload.to_vec();
        let writer = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        });

        let waiting = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, waiting).await {
                Ok(res) => res?,
                Err(_) => {
                    writer.abort();
                    warn!(program = %self.program, ?limit, "analyzer timed out; killed");
                    return Err(AnalyzerError::TimedOut(limit));
                }
            },
            None => waiting.await?,
        };

        if let Ok(Err(e)) = writer.await {
            debug!(error = %e, "analyzer closed stdin before reading the whole payload");
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(AnalyzerError::Exit {
                code: output.status.code(),
                stderr,
            });
        }

        if self.keep_stderr && !stderr.is_empty() {
            debug!(stderr = %stderr, "analyzer stderr");
        }
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            stdout_bytes = output.stdout.len(),
            "analyzer finished"
        );

        Ok(AnalyzerOutput {
            stdout: output.stdout,
            stderr,
        })
    }
}

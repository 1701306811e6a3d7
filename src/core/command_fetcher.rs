use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use flacdl_core::models::fetch::{FetchProgress, FetchRequest, FetchResponse};
use flacdl_core::sources::traits::ContentFetcher;
use flacdl_core::sources::Source;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::core::process;
use crate::models::settings::SourceCommand;

const STDERR_TAIL_CHARS: usize = 400;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OutputLine {
    Response(FetchResponse),
    Progress(FetchProgress),
}

/// Fetches through an external helper program. The request goes in as a
/// single JSON document on stdin; every stdout line is either a progress
/// record `{"downloaded_bytes":N}` or the final response object.
pub struct CommandFetcher {
    source: Source,
    command: SourceCommand,
    timeout: Duration,
}

impl CommandFetcher {
    pub fn new(source: Source, command: SourceCommand, timeout: Duration) -> Self {
        Self {
            source,
            command,
            timeout,
        }
    }
}

#[async_trait]
impl ContentFetcher for CommandFetcher {
    fn name(&self) -> &str {
        self.source.as_str()
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: mpsc::Sender<FetchProgress>,
    ) -> anyhow::Result<FetchResponse> {
        let expected = request.expected_path();
        if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
            return Ok(FetchResponse::exists(expected.to_string_lossy()));
        }

        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", request.output_dir.display()))?;

        let mut cmd = process::command(&self.command.program);
        cmd.args(&self.command.args)
            .envs(&self.command.env)
            .env("FLACDL_SOURCE", self.source.as_str());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to start {}", self.command.program))?;

        let payload = serde_json::to_vec(request)?;
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&payload).await {
                tracing::debug!("[{}] helper closed stdin early: {}", self.source, e);
            }
        }

        let stdout = child.stdout.take().ok_or_else(|| anyhow!("No stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!("No stderr"))?;

        let source = self.source;
        let mut line_reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut response = None;
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_output_line(&line) {
                    Some(OutputLine::Progress(p)) => {
                        let _ = progress.send(p).await;
                    }
                    Some(OutputLine::Response(r)) => response = Some(r),
                    None => tracing::debug!("[{}] {}", source, line),
                }
            }
            response
        });
        let mut stderr_reader = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut buf).await;
            buf
        });

        // Readers are bounded too: a helper's background child can keep stdout open.
        let finished = tokio::time::timeout(self.timeout, async {
            let status = child.wait().await;
            let response = (&mut line_reader).await.unwrap_or(None);
            let stderr_text = (&mut stderr_reader).await.unwrap_or_default();
            (status, response, stderr_text)
        })
        .await;
        let (status, response, stderr_text) = match finished {
            Ok((status, response, stderr_text)) => (
                status.with_context(|| format!("{} helper failed", self.source))?,
                response,
                stderr_text,
            ),
            Err(_) => {
                let _ = child.kill().await;
                line_reader.abort();
                stderr_reader.abort();
                return Ok(FetchResponse::failed(format!(
                    "{} timed out after {}s",
                    self.source,
                    self.timeout.as_secs()
                )));
            }
        };

        Ok(match response {
            Some(r) => r,
            None if status.success() => {
                FetchResponse::failed(format!("{} exited without a result", self.source))
            }
            None => match stderr_tail(&stderr_text) {
                Some(tail) => FetchResponse::failed(tail),
                None => FetchResponse::failed(format!("{} exited with {}", self.source, status)),
            },
        })
    }
}

fn parse_output_line(line: &str) -> Option<OutputLine> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    serde_json::from_str(line).ok()
}

fn stderr_tail(stderr: &str) -> Option<String> {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return None;
    }
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return Some(trimmed.to_string());
    }
    Some(trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect())
}

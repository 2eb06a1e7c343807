//! External-command filter: lines are batched, fed to a child process on
//! stdin, and whatever the child prints becomes the match set.
//!
//! `$QUERY` in the configured argument vector (and the command word) is
//! replaced with the live query. The child is killed when the scope
//! cancels; worker panics surface as errors instead of vanishing.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use core_model::{IdGen, Line, Matched};
use core_pipeline::Scope;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{Filter, FilterError, Sink};

pub const DEFAULT_BUFFER_THRESHOLD: usize = 100;

pub struct ExternalCmdFilter {
    name: String,
    cmd: String,
    args: Vec<String>,
    threshold: usize,
    idgen: Arc<IdGen>,
    enable_sep: bool,
}

impl ExternalCmdFilter {
    pub fn new(
        name: impl Into<String>,
        cmd: impl Into<String>,
        args: Vec<String>,
        threshold: usize,
        idgen: Arc<IdGen>,
        enable_sep: bool,
    ) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
            args,
            threshold: if threshold == 0 {
                DEFAULT_BUFFER_THRESHOLD
            } else {
                threshold
            },
            idgen,
            enable_sep,
        }
    }

    fn argv(&self, query: &str) -> (String, Vec<String>) {
        let cmd = self.cmd.replace("$QUERY", query);
        let args = if self.args.is_empty() {
            vec![query.to_string()]
        } else {
            self.args
                .iter()
                .map(|a| a.replace("$QUERY", query))
                .collect()
        };
        (cmd, args)
    }

    async fn run_batch(
        &self,
        scope: &Scope,
        batch: &[Matched],
        sink: &mut dyn Sink,
    ) -> Result<(), FilterError> {
        let (cmd, args) = self.argv(scope.query());
        debug!(
            target: "filter.external",
            filter = %self.name,
            %cmd,
            batch = batch.len(),
            "spawning"
        );
        let mut child = Command::new(&cmd)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| FilterError::Internal("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FilterError::Internal("child stdout unavailable".into()))?;

        let mut payload = String::new();
        for item in batch {
            payload.push_str(item.display());
            payload.push('\n');
        }
        // Writer runs detached so a child that stops reading cannot
        // deadlock us; its panic (if any) comes back as a join error.
        let writer = tokio::spawn(async move {
            let _ = stdin.write_all(payload.as_bytes()).await;
            // Dropping stdin closes the pipe: end-of-input for the child.
        });

        // In separator mode, map child output back to the next unmatched
        // input line with the same display so the original output suffix
        // (and duplicate order) survive the round trip.
        let mut by_display: HashMap<&str, VecDeque<&Matched>> = HashMap::new();
        if self.enable_sep {
            for item in batch {
                by_display.entry(item.display()).or_default().push_back(item);
            }
        }

        let mut lines = BufReader::new(stdout).lines();
        let result = loop {
            tokio::select! {
                _ = scope.cancelled() => break Err(FilterError::Cancelled),
                next = lines.next_line() => match next {
                    Ok(Some(text)) => {
                        let matched = match by_display.get_mut(text.as_str()).and_then(VecDeque::pop_front) {
                            Some(original) => Matched::passthrough(original.line().clone()),
                            None => Matched::passthrough(Arc::new(Line::new(
                                self.idgen.next(),
                                text,
                                false,
                                false,
                            ))),
                        };
                        sink.push(matched).await?;
                    }
                    Ok(None) => break Ok(()),
                    Err(err) => break Err(FilterError::Command(err)),
                },
            }
        };

        if result.is_err() {
            let _ = child.kill().await;
        } else {
            let _ = child.wait().await;
        }
        match writer.await {
            Ok(()) => {}
            Err(err) => {
                warn!(target: "filter.external", %err, "stdin writer failed");
                if result.is_ok() {
                    return Err(FilterError::Internal(err.to_string()));
                }
            }
        }
        result
    }
}

#[async_trait]
impl Filter for ExternalCmdFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_parallel(&self) -> bool {
        false
    }

    fn buf_size(&self) -> usize {
        self.threshold
    }

    async fn apply(
        &self,
        scope: &Scope,
        lines: &[Matched],
        sink: &mut dyn Sink,
    ) -> Result<(), FilterError> {
        for batch in lines.chunks(self.threshold) {
            scope.ensure_alive().map_err(FilterError::from)?;
            self.run_batch(scope, batch, sink).await?;
        }
        Ok(())
    }
}

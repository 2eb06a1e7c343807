//! The pipeline acceptor that drives a filter.
//!
//! Parallelisable filters get their input carved into pooled chunks of at
//! most [`CHUNK_SIZE`] lines; chunks run concurrently and their outputs
//! are forwarded strictly in input-chunk order (`FuturesOrdered`), so the
//! observable result equals a sequential apply. Filters that need a global
//! view (fuzzy longest-match sorting, external commands) receive the whole
//! input in a single apply call instead.

use std::sync::Arc;

use async_trait::async_trait;
use core_model::{Matched, Pool};
use core_pipeline::{Acceptor, PipelineError, Scope};
use futures_util::stream::{FuturesOrdered, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::{ChannelSink, Filter, FilterError};

/// Upper bound on lines per pooled chunk buffer.
pub const CHUNK_SIZE: usize = 1_000;
/// Chunk tasks allowed in flight before input reading pauses.
const MAX_IN_FLIGHT: usize = 8;

type ChunkResult = (Result<Vec<Matched>, FilterError>, Vec<Matched>);

pub struct FilterStage {
    filter: Arc<dyn Filter>,
    chunk_pool: Arc<Pool<Vec<Matched>>>,
}

impl FilterStage {
    pub fn new(filter: Arc<dyn Filter>) -> Self {
        Self {
            filter,
            chunk_pool: Arc::new(Pool::new(MAX_IN_FLIGHT * 2)),
        }
    }

    pub fn with_pool(filter: Arc<dyn Filter>, chunk_pool: Arc<Pool<Vec<Matched>>>) -> Self {
        Self { filter, chunk_pool }
    }

    fn spawn_chunk(&self, scope: &Scope, chunk: Vec<Matched>) -> JoinHandle<ChunkResult> {
        let filter = self.filter.clone();
        let scope = scope.clone();
        tokio::spawn(async move {
            let out = filter.apply_collect(&scope, &chunk).await;
            (out, chunk)
        })
    }

    async fn forward(
        &self,
        joined: Result<ChunkResult, tokio::task::JoinError>,
        tx: &mpsc::Sender<Matched>,
    ) -> Result<(), FilterError> {
        // A panicking chunk worker must come back as an error, not vanish.
        let (result, buffer) =
            joined.map_err(|err| FilterError::Internal(format!("chunk worker: {err}")))?;
        self.chunk_pool.release(buffer);
        for item in result? {
            if tx.send(item).await.is_err() {
                return Err(FilterError::Cancelled);
            }
        }
        Ok(())
    }

    async fn pump_sequential(
        &self,
        scope: &Scope,
        mut rx: mpsc::Receiver<Matched>,
        tx: &mpsc::Sender<Matched>,
    ) -> Result<(), FilterError> {
        let mut all: Vec<Matched> = Vec::new();
        loop {
            tokio::select! {
                _ = scope.cancelled() => return Err(FilterError::Cancelled),
                item = rx.recv() => match item {
                    Some(item) => all.push(item),
                    None => break,
                },
            }
        }
        trace!(target: "filter.stage", lines = all.len(), filter = self.filter.name(), "sequential apply");
        let mut sink = ChannelSink::new(tx.clone());
        self.filter.apply(scope, &all, &mut sink).await
    }

    async fn pump_parallel(
        &self,
        scope: &Scope,
        mut rx: mpsc::Receiver<Matched>,
        tx: &mpsc::Sender<Matched>,
    ) -> Result<(), FilterError> {
        let mut pending: FuturesOrdered<JoinHandle<ChunkResult>> = FuturesOrdered::new();
        let mut chunk = self.chunk_pool.acquire();
        let mut open = true;
        while open || !pending.is_empty() {
            tokio::select! {
                _ = scope.cancelled() => return Err(FilterError::Cancelled),
                item = rx.recv(), if open && pending.len() < MAX_IN_FLIGHT => match item {
                    Some(item) => {
                        chunk.push(item);
                        if chunk.len() >= CHUNK_SIZE {
                            let full = std::mem::replace(&mut chunk, self.chunk_pool.acquire());
                            pending.push_back(self.spawn_chunk(scope, full));
                        }
                    }
                    None => {
                        open = false;
                        if chunk.is_empty() {
                            self.chunk_pool.release(std::mem::take(&mut chunk));
                        } else {
                            let rest = std::mem::take(&mut chunk);
                            pending.push_back(self.spawn_chunk(scope, rest));
                        }
                    }
                },
                joined = pending.next(), if !pending.is_empty() => {
                    if let Some(joined) = joined {
                        self.forward(joined, tx).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Acceptor for FilterStage {
    async fn accept(
        &self,
        scope: Scope,
        rx: mpsc::Receiver<Matched>,
        tx: mpsc::Sender<Matched>,
    ) -> Result<(), PipelineError> {
        let result = if self.filter.supports_parallel() {
            self.pump_parallel(&scope, rx, &tx).await
        } else {
            self.pump_sequential(&scope, rx, &tx).await
        };
        // `tx` drops here in every path, closing the outbound channel.
        result.map_err(PipelineError::from)
    }
}

//! core-pipeline: the reconfigurable source → acceptor → destination chain.
//!
//! A pipeline run spawns one task per stage, wired with bounded channels.
//! Channel closure is the end-of-stream signal; nothing ever travels on the
//! wire to mark completion. Every stage is required to close its outbound
//! channel when its inbound channel closes or its [`Scope`] is cancelled;
//! a stage that fails to close leaks every stage downstream of it.

pub mod scope;

use std::sync::Arc;

use async_trait::async_trait;
use core_model::Matched;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};

pub use scope::Scope;

/// Buffer size for each stage boundary. A filter may suggest its own via
/// `buf_size`; zero means "use this default".
pub const STAGE_CHANNEL_CAP: usize = 256;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The enclosing scope was cancelled; propagated promptly up the chain.
    #[error("scope cancelled")]
    Cancelled,
    #[error("pipeline has no source")]
    NoSource,
    #[error("pipeline has no destination")]
    NoDestination,
    /// A worker task failed unexpectedly; converted at the task boundary,
    /// never swallowed.
    #[error("pipeline worker failed: {0}")]
    Internal(String),
}

/// Producer end of a pipeline. Must close `tx` on clean completion or
/// cancellation.
#[async_trait]
pub trait Source: Send + Sync {
    async fn start(&self, scope: Scope, tx: mpsc::Sender<Matched>) -> Result<(), PipelineError>;
    fn reset(&self);
}

/// Intermediate stage. Must close `tx` when `rx` closes or the scope
/// cancels, whichever comes first.
#[async_trait]
pub trait Acceptor: Send + Sync {
    async fn accept(
        &self,
        scope: Scope,
        rx: mpsc::Receiver<Matched>,
        tx: mpsc::Sender<Matched>,
    ) -> Result<(), PipelineError>;
}

/// Terminal stage. Its done latch closes once it has finished consuming.
#[async_trait]
pub trait Destination: Send + Sync {
    async fn consume(&self, scope: Scope, rx: mpsc::Receiver<Matched>) -> Result<(), PipelineError>;
    fn reset(&self);
    fn done(&self) -> DoneSignal;
}

/// One-way completion latch. Closing is sticky; waiters observe closure
/// even if they subscribe afterwards, and replacing a latch wakes everyone
/// still waiting on the old one.
#[derive(Debug)]
pub struct DoneLatch {
    tx: watch::Sender<bool>,
}

impl DoneLatch {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn close(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> DoneSignal {
        DoneSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for DoneLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Awaitable handle onto a [`DoneLatch`].
#[derive(Debug, Clone)]
pub struct DoneSignal {
    rx: watch::Receiver<bool>,
}

impl DoneSignal {
    /// Resolves when the latch closes. A dropped latch counts as closed.
    pub async fn wait(mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[derive(Default)]
struct Stages {
    source: Option<Arc<dyn Source>>,
    acceptors: Vec<Arc<dyn Acceptor>>,
    destination: Option<Arc<dyn Destination>>,
}

/// A linear composition of one source, zero or more acceptors, and one
/// destination. Construction order is arbitrary; the configuration is
/// locked for the whole duration of [`Pipeline::run`].
pub struct Pipeline {
    stages: Mutex<Stages>,
    channel_cap: usize,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_channel_cap(0)
    }

    /// Override the per-boundary buffer size; 0 keeps
    /// [`STAGE_CHANNEL_CAP`].
    pub fn with_channel_cap(channel_cap: usize) -> Self {
        Self {
            stages: Mutex::new(Stages::default()),
            channel_cap: if channel_cap == 0 {
                STAGE_CHANNEL_CAP
            } else {
                channel_cap
            },
        }
    }

    pub async fn set_source(&self, source: Arc<dyn Source>) {
        self.stages.lock().await.source = Some(source);
    }

    pub async fn add_acceptor(&self, acceptor: Arc<dyn Acceptor>) {
        self.stages.lock().await.acceptors.push(acceptor);
    }

    pub async fn set_destination(&self, destination: Arc<dyn Destination>) {
        self.stages.lock().await.destination = Some(destination);
    }

    /// Run the chain under `scope` and wait until the destination has
    /// finished consuming. A stage error cancels the scope so sibling
    /// stages unwind promptly; the first cancellation is reflected in the
    /// return value.
    pub async fn run(&self, scope: &Scope) -> Result<(), PipelineError> {
        let stages = self.stages.lock().await;
        let source = stages.source.clone().ok_or(PipelineError::NoSource)?;
        let destination = stages
            .destination
            .clone()
            .ok_or(PipelineError::NoDestination)?;

        source.reset();
        destination.reset();
        let done = destination.done();

        let boundaries = stages.acceptors.len() + 1;
        let mut txs = Vec::with_capacity(boundaries);
        let mut rxs = Vec::with_capacity(boundaries);
        for _ in 0..boundaries {
            let (tx, rx) = mpsc::channel(self.channel_cap);
            txs.push(Some(tx));
            rxs.push(Some(rx));
        }

        debug!(
            target: "pipeline",
            acceptors = stages.acceptors.len(),
            query_len = scope.query().len(),
            "run"
        );

        // Destination first so it is ready before anything produces.
        {
            let scope = scope.clone();
            let rx = rxs[boundaries - 1].take().ok_or_else(wiring_error)?;
            let destination = destination.clone();
            tokio::spawn(async move {
                report_stage("destination", &scope, destination.consume(scope.clone(), rx).await);
            });
        }
        for (i, acceptor) in stages.acceptors.iter().enumerate().rev() {
            let scope = scope.clone();
            let rx = rxs[i].take().ok_or_else(wiring_error)?;
            let tx = txs[i + 1].take().ok_or_else(wiring_error)?;
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                report_stage("acceptor", &scope, acceptor.accept(scope.clone(), rx, tx).await);
            });
        }
        {
            let scope = scope.clone();
            let tx = txs[0].take().ok_or_else(wiring_error)?;
            let source = source.clone();
            tokio::spawn(async move {
                report_stage("source", &scope, source.start(scope.clone(), tx).await);
            });
        }
        // Configuration stays locked until the run completes.
        done.wait().await;
        drop(stages);
        if scope.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn wiring_error() -> PipelineError {
    PipelineError::Internal("stage channel wired twice".into())
}

/// Stage errors abort the run: cancel the scope so every sibling unwinds.
/// Cancellation itself is the expected unwind path and only traced.
fn report_stage(kind: &'static str, scope: &Scope, result: Result<(), PipelineError>) {
    match result {
        Ok(()) => {}
        Err(PipelineError::Cancelled) => {
            debug!(target: "pipeline", stage = kind, "stage cancelled");
        }
        Err(err) => {
            warn!(target: "pipeline", stage = kind, %err, "stage failed; cancelling run");
            scope.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_model::Line;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct VecSource {
        lines: Vec<Arc<Line>>,
    }

    #[async_trait]
    impl Source for VecSource {
        async fn start(
            &self,
            scope: Scope,
            tx: mpsc::Sender<Matched>,
        ) -> Result<(), PipelineError> {
            for line in &self.lines {
                scope.ensure_alive()?;
                if tx.send(Matched::passthrough(line.clone())).await.is_err() {
                    break;
                }
            }
            Ok(())
        }

        fn reset(&self) {}
    }

    /// Source that produces forever until cancelled.
    struct EndlessSource;

    #[async_trait]
    impl Source for EndlessSource {
        async fn start(
            &self,
            scope: Scope,
            tx: mpsc::Sender<Matched>,
        ) -> Result<(), PipelineError> {
            let line = Arc::new(Line::new(1, "x", false, false));
            loop {
                scope.ensure_alive()?;
                tokio::select! {
                    _ = scope.cancelled() => return Err(PipelineError::Cancelled),
                    sent = tx.send(Matched::passthrough(line.clone())) => {
                        if sent.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }

        fn reset(&self) {}
    }

    struct PassthroughAcceptor;

    #[async_trait]
    impl Acceptor for PassthroughAcceptor {
        async fn accept(
            &self,
            scope: Scope,
            mut rx: mpsc::Receiver<Matched>,
            tx: mpsc::Sender<Matched>,
        ) -> Result<(), PipelineError> {
            loop {
                tokio::select! {
                    _ = scope.cancelled() => return Err(PipelineError::Cancelled),
                    item = rx.recv() => match item {
                        Some(item) => {
                            if tx.send(item).await.is_err() {
                                return Ok(());
                            }
                        }
                        None => return Ok(()),
                    },
                }
            }
        }
    }

    struct CollectDestination {
        latch: StdMutex<Arc<DoneLatch>>,
        seen: StdMutex<Vec<u64>>,
    }

    impl CollectDestination {
        fn new() -> Self {
            Self {
                latch: StdMutex::new(Arc::new(DoneLatch::new())),
                seen: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Destination for CollectDestination {
        async fn consume(
            &self,
            scope: Scope,
            mut rx: mpsc::Receiver<Matched>,
        ) -> Result<(), PipelineError> {
            loop {
                tokio::select! {
                    _ = scope.cancelled() => break,
                    item = rx.recv() => match item {
                        Some(item) => self.seen.lock().unwrap().push(item.id()),
                        None => break,
                    },
                }
            }
            self.latch.lock().unwrap().close();
            Ok(())
        }

        fn reset(&self) {
            let mut latch = self.latch.lock().unwrap();
            latch.close();
            *latch = Arc::new(DoneLatch::new());
            self.seen.lock().unwrap().clear();
        }

        fn done(&self) -> DoneSignal {
            self.latch.lock().unwrap().signal()
        }
    }

    fn lines(n: u64) -> Vec<Arc<Line>> {
        (1..=n)
            .map(|i| Arc::new(Line::new(i, format!("line {i}"), false, false)))
            .collect()
    }

    #[tokio::test]
    async fn run_preserves_input_order_and_closes_done() {
        let pipeline = Pipeline::new();
        let dest = Arc::new(CollectDestination::new());
        pipeline
            .set_source(Arc::new(VecSource { lines: lines(50) }))
            .await;
        pipeline.add_acceptor(Arc::new(PassthroughAcceptor)).await;
        pipeline.set_destination(dest.clone()).await;

        let scope = Scope::root().child("q");
        pipeline.run(&scope).await.unwrap();

        let seen = dest.seen.lock().unwrap().clone();
        assert_eq!(seen, (1..=50).collect::<Vec<_>>());
        // If run returned, the destination's done latch is closed.
        tokio::time::timeout(Duration::from_millis(10), dest.done().wait())
            .await
            .expect("done latch must be closed after run");
    }

    #[tokio::test]
    async fn cancellation_unwinds_within_bounded_delay() {
        let pipeline = Pipeline::new();
        let dest = Arc::new(CollectDestination::new());
        pipeline.set_source(Arc::new(EndlessSource)).await;
        pipeline.add_acceptor(Arc::new(PassthroughAcceptor)).await;
        pipeline.set_destination(dest.clone()).await;

        let scope = Scope::root().child("x");
        let cancel = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            cancel.cancel();
        });

        let result = tokio::time::timeout(Duration::from_millis(50), pipeline.run(&scope)).await;
        match result {
            Ok(Err(PipelineError::Cancelled)) => {}
            other => panic!("expected prompt cancellation, got {:?}", other.map(|r| r.is_ok())),
        }
    }

    #[tokio::test]
    async fn run_without_source_errors() {
        let pipeline = Pipeline::new();
        pipeline
            .set_destination(Arc::new(CollectDestination::new()))
            .await;
        let scope = Scope::root();
        assert!(matches!(
            pipeline.run(&scope).await,
            Err(PipelineError::NoSource)
        ));
    }

    #[tokio::test]
    async fn reset_wakes_stale_waiters() {
        let dest = CollectDestination::new();
        let stale = dest.done();
        dest.reset();
        tokio::time::timeout(Duration::from_millis(10), stale.wait())
            .await
            .expect("old latch waiters must be woken by reset");
    }
}

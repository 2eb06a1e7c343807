//! core-buffer: append-only line storage and the renderer's read view.
//!
//! [`MemoryBuffer`] serves two roles in a pipeline run. The ingestion
//! buffer acts as the source, replaying a snapshot of everything read so
//! far; a fresh result buffer acts as the destination, accumulating what
//! the filter emits. [`FilteredView`] is the immutable snapshot the event
//! loop swaps in for the renderer once a run completes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use core_model::{Line, Matched};
use core_pipeline::{Destination, DoneLatch, DoneSignal, PipelineError, Scope, Source};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Cancellation poll cadence for the replay loop.
const CANCEL_POLL_INTERVAL: usize = 1_000;

/// Thread-safe append-only store of lines.
///
/// Invariants: a line's index equals its arrival position; `size()` is
/// monotonic non-decreasing while ingestion runs and stable afterwards.
/// The done latch closes when the producer signals end-of-stream.
#[derive(Debug)]
pub struct MemoryBuffer {
    lines: RwLock<Vec<Matched>>,
    latch: RwLock<Arc<DoneLatch>>,
    max_width: AtomicUsize,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self {
            lines: RwLock::new(Vec::new()),
            latch: RwLock::new(Arc::new(DoneLatch::new())),
            max_width: AtomicUsize::new(0),
        }
    }

    /// Append an ingested input line.
    pub fn append(&self, line: Arc<Line>) {
        self.push(Matched::passthrough(line));
    }

    /// Append a filtered result.
    pub fn push(&self, item: Matched) {
        let width = item.line().display_width();
        self.max_width.fetch_max(width, Ordering::Relaxed);
        if let Ok(mut lines) = self.lines.write() {
            lines.push(item);
        }
    }

    pub fn size(&self) -> usize {
        self.lines.read().map(|l| l.len()).unwrap_or(0)
    }

    /// Line at `index`, or `None` when out of range.
    pub fn line_at(&self, index: usize) -> Option<Matched> {
        self.lines.read().ok()?.get(index).cloned()
    }

    /// Copy of the current contents; the replay source and view capture
    /// work from this so ingestion can continue concurrently.
    pub fn snapshot(&self) -> Vec<Matched> {
        self.lines.read().map(|l| l.clone()).unwrap_or_default()
    }

    /// Maximum display width across stored lines, for horizontal-scroll
    /// clamping.
    pub fn max_width(&self) -> usize {
        self.max_width.load(Ordering::Relaxed)
    }

    /// Signal end-of-stream to anyone waiting on [`MemoryBuffer::done`].
    pub fn set_end_mark(&self) {
        if let Ok(latch) = self.latch.read() {
            latch.close();
        }
    }

    pub fn done(&self) -> DoneSignal {
        match self.latch.read() {
            Ok(latch) => latch.signal(),
            Err(_) => DoneLatch::new().signal(),
        }
    }

    fn reset_contents(&self) {
        if let Ok(mut latch) = self.latch.write() {
            // Waiters on the old latch are woken, then the latch is
            // replaced so the next run gets a fresh one.
            latch.close();
            *latch = Arc::new(DoneLatch::new());
        }
        if let Ok(mut lines) = self.lines.write() {
            lines.clear();
        }
        self.max_width.store(0, Ordering::Relaxed);
    }
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for MemoryBuffer {
    async fn start(&self, scope: Scope, tx: mpsc::Sender<Matched>) -> Result<(), PipelineError> {
        let snapshot = self.snapshot();
        trace!(target: "buffer.source", lines = snapshot.len(), "replay start");
        for (n, item) in snapshot.into_iter().enumerate() {
            if n % CANCEL_POLL_INTERVAL == 0 {
                scope.ensure_alive()?;
            }
            if tx.send(item).await.is_err() {
                // Downstream hung up; nothing left to do.
                break;
            }
        }
        Ok(())
    }

    fn reset(&self) {
        // The ingestion buffer is shared across runs; replay never clears it.
    }
}

#[async_trait]
impl Destination for MemoryBuffer {
    async fn consume(&self, scope: Scope, mut rx: mpsc::Receiver<Matched>) -> Result<(), PipelineError> {
        let result = loop {
            tokio::select! {
                _ = scope.cancelled() => break Err(PipelineError::Cancelled),
                item = rx.recv() => match item {
                    Some(item) => self.push(item),
                    None => break Ok(()),
                },
            }
        };
        debug!(target: "buffer.dest", collected = self.size(), "consume finished");
        self.set_end_mark();
        result
    }

    fn reset(&self) {
        self.reset_contents();
    }

    fn done(&self) -> DoneSignal {
        MemoryBuffer::done(self)
    }
}

/// Immutable snapshot handed to the renderer. Created at pipeline end and
/// swapped atomically; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct FilteredView {
    lines: Arc<[Matched]>,
    max_width: usize,
}

impl FilteredView {
    pub fn capture(buffer: &MemoryBuffer) -> Self {
        Self {
            lines: buffer.snapshot().into(),
            max_width: buffer.max_width(),
        }
    }

    pub fn empty() -> Self {
        Self {
            lines: Arc::from(Vec::new()),
            max_width: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_at(&self, index: usize) -> Option<&Matched> {
        self.lines.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Matched> {
        self.lines.iter()
    }

    pub fn max_width(&self) -> usize {
        self.max_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_model::IdGen;
    use core_pipeline::Pipeline;
    use std::time::Duration;

    fn fill(buffer: &MemoryBuffer, gen: &IdGen, texts: &[&str]) {
        for text in texts {
            buffer.append(Arc::new(Line::new(gen.next(), *text, false, false)));
        }
    }

    #[test]
    fn ids_strictly_increase_with_index() {
        let buffer = MemoryBuffer::new();
        let gen = IdGen::fixed(0);
        fill(&buffer, &gen, &["a", "b", "c", "d"]);
        let mut prev = 0;
        for i in 0..buffer.size() {
            let id = buffer.line_at(i).unwrap().id();
            assert!(id > prev, "id at {i} must exceed {prev}");
            prev = id;
        }
    }

    #[test]
    fn size_is_monotonic_and_line_at_defensive() {
        let buffer = MemoryBuffer::new();
        let gen = IdGen::fixed(0);
        assert_eq!(buffer.size(), 0);
        assert!(buffer.line_at(0).is_none());
        fill(&buffer, &gen, &["one"]);
        assert_eq!(buffer.size(), 1);
        fill(&buffer, &gen, &["two"]);
        assert_eq!(buffer.size(), 2);
        assert!(buffer.line_at(99).is_none());
    }

    #[test]
    fn max_width_tracks_widest_display() {
        let buffer = MemoryBuffer::new();
        let gen = IdGen::fixed(0);
        fill(&buffer, &gen, &["ab", "字幅広い行", "x"]);
        assert_eq!(buffer.max_width(), 10);
    }

    #[test]
    fn view_is_isolated_from_later_appends() {
        let buffer = MemoryBuffer::new();
        let gen = IdGen::fixed(0);
        fill(&buffer, &gen, &["a", "b"]);
        let view = FilteredView::capture(&buffer);
        fill(&buffer, &gen, &["c"]);
        assert_eq!(view.size(), 2);
        assert_eq!(buffer.size(), 3);
        assert_eq!(view.line_at(1).unwrap().display(), "b");
    }

    #[tokio::test]
    async fn end_mark_closes_done_signal() {
        let buffer = MemoryBuffer::new();
        let done = buffer.done();
        buffer.set_end_mark();
        tokio::time::timeout(Duration::from_millis(10), done.wait())
            .await
            .expect("done must resolve after end mark");
    }

    #[tokio::test]
    async fn buffer_to_buffer_pipeline_accumulates_in_order() {
        let gen = IdGen::fixed(0);
        let input = Arc::new(MemoryBuffer::new());
        fill(&input, &gen, &["alpha", "beta", "gamma"]);
        let result = Arc::new(MemoryBuffer::new());

        let pipeline = Pipeline::new();
        pipeline.set_source(input.clone()).await;
        pipeline.set_destination(result.clone()).await;
        pipeline.run(&Scope::root().child("")).await.unwrap();

        let collected: Vec<String> = FilteredView::capture(&result)
            .iter()
            .map(|m| m.display().to_string())
            .collect();
        assert_eq!(collected, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn destination_reset_wakes_old_waiters_and_clears() {
        let buffer = MemoryBuffer::new();
        let gen = IdGen::fixed(0);
        fill(&buffer, &gen, &["stale"]);
        let stale_done = MemoryBuffer::done(&buffer);
        Destination::reset(&buffer);
        tokio::time::timeout(Duration::from_millis(10), stale_done.wait())
            .await
            .expect("reset must wake waiters on the old latch");
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.max_width(), 0);
    }
}

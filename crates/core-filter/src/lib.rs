//! core-filter: interchangeable matching strategies over line streams.
//!
//! Every strategy implements [`Filter`]: a uniform `apply` contract feeding
//! an emitter, with `apply_collect` as the collector-emitter convenience.
//! The two are required to be semantically identical, and parallelisable
//! filters must produce chunk outputs that concatenate (in input-chunk
//! order) to the unchunked result; [`stage::FilterStage`] relies on both
//! properties.

pub mod external;
pub mod fuzzy;
pub mod regexp;
pub mod stage;
pub mod terms;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use core_model::Matched;
use core_pipeline::{PipelineError, Scope};
use thiserror::Error;
use tokio::sync::mpsc;

pub use external::ExternalCmdFilter;
pub use fuzzy::FuzzyFilter;
pub use regexp::{RegexCache, RegexpFilter};
pub use stage::FilterStage;
pub use terms::QueryTerms;

/// Cancellation poll cadence inside filter loops.
pub const CANCEL_POLL_INTERVAL: usize = 1_000;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("scope cancelled")]
    Cancelled,
    /// Malformed query (regex compile failure). Shown on the status line;
    /// the previous result set stays.
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] regex::Error),
    #[error("no filter named {0:?}")]
    NotFound(String),
    #[error("external command failed: {0}")]
    Command(#[from] std::io::Error),
    /// Worker panic or other unexpected condition, converted to an error
    /// at the task boundary.
    #[error("filter worker failed: {0}")]
    Internal(String),
}

impl From<PipelineError> for FilterError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Cancelled => FilterError::Cancelled,
            other => FilterError::Internal(other.to_string()),
        }
    }
}

impl From<FilterError> for PipelineError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::Internal(other.to_string()),
        }
    }
}

/// Emitter a filter pushes matches into. Two shapes exist: a channel sink
/// feeding the next pipeline stage, and a collector sink appending to a
/// slice for parallel-chunk aggregation.
#[async_trait]
pub trait Sink: Send {
    async fn push(&mut self, item: Matched) -> Result<(), FilterError>;
}

pub struct ChannelSink {
    tx: mpsc::Sender<Matched>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Matched>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Sink for ChannelSink {
    async fn push(&mut self, item: Matched) -> Result<(), FilterError> {
        // A dropped receiver means the run is being torn down.
        self.tx
            .send(item)
            .await
            .map_err(|_| FilterError::Cancelled)
    }
}

pub struct CollectSink<'a> {
    out: &'a mut Vec<Matched>,
}

impl<'a> CollectSink<'a> {
    pub fn new(out: &'a mut Vec<Matched>) -> Self {
        Self { out }
    }
}

#[async_trait]
impl Sink for CollectSink<'_> {
    async fn push(&mut self, item: Matched) -> Result<(), FilterError> {
        self.out.push(item);
        Ok(())
    }
}

/// A matching strategy. The query travels in the [`Scope`].
#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    /// True when independent contiguous chunks may be processed
    /// concurrently and concatenated in input-chunk order without changing
    /// the result.
    fn supports_parallel(&self) -> bool {
        true
    }

    /// Suggested upstream buffering; 0 means the pipeline default.
    fn buf_size(&self) -> usize {
        0
    }

    async fn apply(
        &self,
        scope: &Scope,
        lines: &[Matched],
        sink: &mut dyn Sink,
    ) -> Result<(), FilterError>;

    /// Collector-emitter convenience; semantically identical to [`apply`].
    ///
    /// [`apply`]: Filter::apply
    async fn apply_collect(
        &self,
        scope: &Scope,
        lines: &[Matched],
    ) -> Result<Vec<Matched>, FilterError> {
        let mut out = Vec::new();
        let mut sink = CollectSink::new(&mut out);
        self.apply(scope, lines, &mut sink).await?;
        Ok(out)
    }
}

/// Ordered set of strategies with a rotation cursor.
pub struct FilterSet {
    filters: Vec<Arc<dyn Filter>>,
    current: AtomicUsize,
}

impl FilterSet {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            current: AtomicUsize::new(0),
        }
    }

    /// The built-in strategies, in rotation order.
    pub fn standard(fuzzy_longest_sort: bool) -> Self {
        let mut set = Self::new();
        set.push(Arc::new(RegexpFilter::ignore_case()));
        set.push(Arc::new(RegexpFilter::case_sensitive()));
        set.push(Arc::new(RegexpFilter::smart_case()));
        set.push(Arc::new(RegexpFilter::regexp()));
        set.push(Arc::new(RegexpFilter::iregexp()));
        set.push(Arc::new(FuzzyFilter::new(fuzzy_longest_sort)));
        set
    }

    pub fn push(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn current(&self) -> Option<Arc<dyn Filter>> {
        self.filters
            .get(self.current.load(Ordering::Relaxed))
            .cloned()
    }

    pub fn current_name(&self) -> &str {
        self.filters
            .get(self.current.load(Ordering::Relaxed))
            .map(|f| f.name())
            .unwrap_or("")
    }

    /// Advance the cursor, wrapping around.
    pub fn rotate(&self) {
        if self.filters.is_empty() {
            return;
        }
        let next = (self.current.load(Ordering::Relaxed) + 1) % self.filters.len();
        self.current.store(next, Ordering::Relaxed);
    }

    /// Point the cursor at the named strategy.
    pub fn select(&self, name: &str) -> Result<(), FilterError> {
        match self.filters.iter().position(|f| f.name() == name) {
            Some(idx) => {
                self.current.store(idx, Ordering::Relaxed);
                Ok(())
            }
            None => Err(FilterError::NotFound(name.to_string())),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.name().to_string()).collect()
    }
}

impl Default for FilterSet {
    fn default() -> Self {
        Self::standard(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_set_rotates_and_wraps() {
        let set = FilterSet::standard(false);
        let first = set.current_name().to_string();
        let count = set.names().len();
        for _ in 0..count {
            set.rotate();
        }
        assert_eq!(set.current_name(), first);
    }

    #[test]
    fn select_unknown_filter_is_not_found() {
        let set = FilterSet::standard(false);
        assert!(set.select("SmartCase").is_ok());
        assert_eq!(set.current_name(), "SmartCase");
        let err = set.select("NoSuchFilter").unwrap_err();
        assert!(matches!(err, FilterError::NotFound(name) if name == "NoSuchFilter"));
    }
}

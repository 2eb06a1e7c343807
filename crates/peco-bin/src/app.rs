//! The event loop: wires hub, pipeline, filters, selection and layout
//! together and owns the main control flow.
//!
//! One task runs this loop, selecting over the hub channels, terminal
//! events, pipeline results and timers. Query changes cancel the previous
//! run's scope before a new pipeline is spawned over the current memory
//! snapshot; results arriving for a cancelled scope are dropped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use core_buffer::{FilteredView, MemoryBuffer};
use core_config::Config;
use core_filter::{FilterSet, FilterStage};
use core_hub::{DrawOptions, Hub, HubReceivers, PagingRequest, StatusMsg};
use core_input::TermEvent;
use core_keymap::{Feed, Key, KeyCode, ModMask, SeqState, SeqTrie};
use core_model::Matched;
use core_pipeline::{Pipeline, PipelineError, Scope};
use core_state::{Caret, Location, QueryText, RangeStart, SelectionSet};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::actions::{build_keymap, Action};
use crate::view::{Frame, Renderer, JUMP_KEYS};

const STATUS_CLEAR_DELAY: Duration = Duration::from_secs(2);
const HSCROLL_STEP: usize = 8;

/// Why the loop ended. `Collect` emits the selection and exits 0;
/// `Ignorable` maps to the configured on-cancel exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEnd {
    Collect,
    Ignorable,
}

enum Flow {
    Continue,
    End(LoopEnd),
}

pub struct AppOutput {
    pub lines: Vec<String>,
    pub end: LoopEnd,
}

/// A completed pipeline run, sent back to the loop by the run task.
pub struct QueryResult {
    scope: Scope,
    view: FilteredView,
}

pub struct AppParams {
    pub hub: Hub,
    pub source: Arc<MemoryBuffer>,
    pub filters: Arc<FilterSet>,
    pub config: Config,
    pub root_scope: Scope,
    pub results_tx: mpsc::Sender<QueryResult>,
    pub size: (u16, u16),
    pub initial_query: Option<String>,
    pub initial_index: usize,
    pub select_one: bool,
}

pub struct App {
    hub: Hub,
    source: Arc<MemoryBuffer>,
    view: FilteredView,
    filters: Arc<FilterSet>,
    selection: SelectionSet,
    query: QueryText,
    caret: Caret,
    location: Location,
    range_start: RangeStart,
    keymap: SeqTrie<Action>,
    seq_state: SeqState,
    renderer: Renderer,
    config: Config,
    root_scope: Scope,
    query_scope: Option<Scope>,
    results_tx: mpsc::Sender<QueryResult>,
    size: (u16, u16),
    status: Option<String>,
    status_deadline: Option<Instant>,
    pending_query: Option<String>,
    debounce_deadline: Option<Instant>,
    initial_query: Option<String>,
    initial_index: usize,
    reader_done: bool,
    select_one: bool,
    jump_mode: bool,
    running_query: bool,
}

impl App {
    pub fn new(params: AppParams) -> Result<Self> {
        let keymap = build_keymap(&params.config)?;
        let renderer = Renderer::new(
            params.config.style,
            params.config.prompt.clone(),
            params.config.layout,
            params.config.selection_prefix.clone(),
            params.config.color,
            params.config.suppress_status_msg,
        );
        let view = FilteredView::capture(&params.source);
        let geometry = renderer.geometry(params.size.1);
        let location = Location::new(geometry.list_rows());
        Ok(Self {
            hub: params.hub,
            source: params.source,
            view,
            filters: params.filters,
            selection: SelectionSet::new(),
            query: QueryText::new(),
            caret: Caret::new(),
            location,
            range_start: RangeStart::new(),
            keymap,
            seq_state: SeqState::new(),
            renderer,
            config: params.config,
            root_scope: params.root_scope,
            query_scope: None,
            results_tx: params.results_tx,
            size: params.size,
            status: None,
            status_deadline: None,
            pending_query: None,
            debounce_deadline: None,
            initial_query: params.initial_query,
            initial_index: params.initial_index,
            reader_done: false,
            select_one: params.select_one,
            jump_mode: false,
            running_query: false,
        })
    }

    pub async fn run(
        mut self,
        mut rx: HubReceivers,
        mut term_rx: mpsc::Receiver<TermEvent>,
        mut results_rx: mpsc::Receiver<QueryResult>,
    ) -> Result<AppOutput> {
        if self.initial_index > 0 {
            self.location.set_line_no(self.initial_index);
        }
        if let Some(query) = self.initial_query.take() {
            self.query.set(&query);
            self.caret.set(self.query.len());
            self.hub.send_query(query).await;
        }
        self.render(DrawOptions::default())?;

        let mut ctrl_c = Box::pin(tokio::signal::ctrl_c());
        loop {
            let flow = tokio::select! {
                maybe = term_rx.recv() => match maybe {
                    Some(event) => self.on_term_event(event).await?,
                    None => Flow::Continue,
                },
                maybe = rx.query.recv() => match maybe {
                    Some(payload) => self.on_query_request(payload.done()).await?,
                    None => Flow::Continue,
                },
                maybe = rx.draw.recv() => match maybe {
                    Some(payload) => {
                        let options = payload.done();
                        self.refresh_passthrough_view();
                        self.render(options)?;
                        Flow::Continue
                    }
                    None => Flow::Continue,
                },
                maybe = rx.status.recv() => match maybe {
                    Some(payload) => {
                        self.on_status(payload.done())?;
                        Flow::Continue
                    }
                    None => Flow::Continue,
                },
                maybe = rx.paging.recv() => match maybe {
                    Some(payload) => {
                        self.on_paging(payload.done());
                        self.render(DrawOptions::default())?;
                        Flow::Continue
                    }
                    None => Flow::Continue,
                },
                maybe = results_rx.recv() => match maybe {
                    Some(result) => {
                        self.on_query_result(result)?;
                        Flow::Continue
                    }
                    None => Flow::Continue,
                },
                _ = self.source.done().wait(), if !self.reader_done => {
                    self.on_reader_done()?
                }
                _ = sleep_until_opt(self.debounce_deadline), if self.debounce_deadline.is_some() => {
                    self.debounce_deadline = None;
                    if let Some(query) = self.pending_query.take() {
                        self.start_query(query).await?;
                    }
                    Flow::Continue
                }
                _ = sleep_until_opt(self.status_deadline), if self.status_deadline.is_some() => {
                    self.status = None;
                    self.status_deadline = None;
                    self.render(DrawOptions::default())?;
                    Flow::Continue
                }
                _ = &mut ctrl_c => Flow::End(LoopEnd::Ignorable),
            };
            if let Flow::End(end) = flow {
                self.root_scope.cancel();
                return Ok(self.collect(end));
            }
        }
    }

    async fn on_term_event(&mut self, event: TermEvent) -> Result<Flow> {
        match event {
            TermEvent::Resize(cols, rows) => {
                debug!(target: "loop", cols, rows, "resize");
                self.size = (cols, rows);
                self.render(DrawOptions { purge_cache: true, ..DrawOptions::default() })?;
                Ok(Flow::Continue)
            }
            TermEvent::Key(key) => self.on_key(key).await,
        }
    }

    async fn on_key(&mut self, key: Key) -> Result<Flow> {
        if self.jump_mode {
            self.jump_mode = false;
            if key.code == KeyCode::Char && key.mods.is_empty() {
                if let Some(index) = JUMP_KEYS.iter().position(|&k| k == key.ch) {
                    // Jump is applied directly: the loop ends before any
                    // queued paging message would be consumed.
                    self.on_paging(PagingRequest::JumpToLineInPage(index));
                    return Ok(Flow::End(LoopEnd::Collect));
                }
            }
            // Any other key leaves jump mode and is handled normally.
        }
        // Copy the dispatch outcome out so the trie borrow ends here.
        let dispatch = match self.keymap.feed(&mut self.seq_state, key) {
            Feed::Action(action) => Some(*action),
            Feed::Pending => return Ok(Flow::Continue),
            Feed::NoMatch => None,
        };
        match dispatch {
            Some(action) => self.execute(action).await,
            None => {
                let shift_only = (key.mods & !ModMask::SHIFT).is_empty();
                if key.code == KeyCode::Char && shift_only {
                    let pos = self.caret.pos();
                    self.query.insert_at(key.ch, pos);
                    self.caret.set(pos + 1);
                    self.on_query_edited().await?;
                }
                Ok(Flow::Continue)
            }
        }
    }

    async fn execute(&mut self, action: Action) -> Result<Flow> {
        match action {
            Action::Finish => return Ok(Flow::End(LoopEnd::Collect)),
            Action::Cancel => {
                if self.range_start.is_valid() {
                    self.range_start.reset();
                    self.set_status("range cancelled".to_string(), Some(STATUS_CLEAR_DELAY));
                    self.render(DrawOptions::default())?;
                } else {
                    return Ok(Flow::End(LoopEnd::Ignorable));
                }
            }
            Action::SelectUp => self.hub.send_paging(PagingRequest::LineAbove).await,
            Action::SelectDown => self.hub.send_paging(PagingRequest::LineBelow).await,
            Action::ScrollPageUp => self.hub.send_paging(PagingRequest::PageUp).await,
            Action::ScrollPageDown => self.hub.send_paging(PagingRequest::PageDown).await,
            Action::ScrollLeft => self.hub.send_paging(PagingRequest::ScrollLeft).await,
            Action::ScrollRight => self.hub.send_paging(PagingRequest::ScrollRight).await,
            Action::ScrollFirstItem => self.hub.send_paging(PagingRequest::FirstItem).await,
            Action::ScrollLastItem => self.hub.send_paging(PagingRequest::LastItem).await,
            Action::ToggleSelection => {
                self.toggle_current();
                self.render(DrawOptions::default())?;
            }
            Action::ToggleSelectionAndSelectNext => {
                self.toggle_current();
                self.hub.send_paging(PagingRequest::LineBelow).await;
            }
            Action::ToggleRangeMode => {
                if let Some(start) = self.range_start.get() {
                    self.commit_range(start);
                    self.range_start.reset();
                    self.render(DrawOptions::default())?;
                } else {
                    self.range_start.set(self.location.line_no());
                    self.set_status("range mode".to_string(), None);
                    self.render(DrawOptions::default())?;
                }
            }
            Action::CancelRangeMode => {
                self.range_start.reset();
                self.render(DrawOptions::default())?;
            }
            Action::SelectAll => {
                for item in self.view.iter() {
                    self.selection.add(item.clone());
                }
                self.render(DrawOptions::default())?;
            }
            Action::SelectNone => {
                self.selection.clear();
                self.render(DrawOptions::default())?;
            }
            Action::InvertSelection => {
                for item in self.view.iter() {
                    if self.selection.has(item.id()) {
                        self.selection.remove(item.id());
                    } else {
                        self.selection.add(item.clone());
                    }
                }
                self.render(DrawOptions::default())?;
            }
            Action::RotateFilter => {
                self.filters.rotate();
                let name = self.filters.current_name().to_string();
                self.set_status(format!("filter: {name}"), Some(STATUS_CLEAR_DELAY));
                self.hub.send_query(self.query.as_string()).await;
                self.render(DrawOptions::default())?;
            }
            Action::ToggleQuery => {
                if self.query.is_empty() {
                    self.query.restore();
                } else {
                    self.query.save();
                    self.query.reset();
                }
                self.caret.set(self.query.len());
                self.on_query_edited().await?;
            }
            Action::ToggleSingleKeyJump => {
                self.jump_mode = !self.jump_mode;
                self.render(DrawOptions::default())?;
            }
            Action::BeginningOfLine => {
                self.caret.set(0);
                self.render(DrawOptions::prompt_only())?;
            }
            Action::EndOfLine => {
                self.caret.set(self.query.len());
                self.render(DrawOptions::prompt_only())?;
            }
            Action::ForwardChar => {
                self.caret.move_by(1, self.query.len());
                self.render(DrawOptions::prompt_only())?;
            }
            Action::BackwardChar => {
                self.caret.move_by(-1, self.query.len());
                self.render(DrawOptions::prompt_only())?;
            }
            Action::DeleteForwardChar => {
                let pos = self.caret.pos();
                self.query.delete_range(pos, pos + 1);
                self.on_query_edited().await?;
            }
            Action::DeleteBackwardChar => {
                let pos = self.caret.pos();
                if pos > 0 {
                    self.query.delete_range(pos - 1, pos);
                    self.caret.set(pos - 1);
                    self.on_query_edited().await?;
                }
            }
            Action::KillBeginningOfLine => {
                self.query.delete_range(0, self.caret.pos());
                self.caret.set(0);
                self.on_query_edited().await?;
            }
            Action::KillEndOfLine => {
                self.query.delete_range(self.caret.pos(), self.query.len());
                self.on_query_edited().await?;
            }
            Action::DeleteAll => {
                self.query.reset();
                self.caret.set(0);
                self.on_query_edited().await?;
            }
            Action::RefreshScreen => {
                self.render(DrawOptions { purge_cache: true, force_sync: true, ..DrawOptions::default() })?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn on_query_edited(&mut self) -> Result<()> {
        self.render(DrawOptions::prompt_only())?;
        self.hub.send_query(self.query.as_string()).await;
        Ok(())
    }

    async fn on_query_request(&mut self, query: String) -> Result<Flow> {
        let delay = self.config.query_execution_delay;
        if delay > 0 {
            // Coalesce rapid keystrokes: only the newest query survives.
            self.pending_query = Some(query);
            self.debounce_deadline = Some(Instant::now() + Duration::from_millis(delay));
            Ok(Flow::Continue)
        } else {
            self.start_query(query).await?;
            Ok(Flow::Continue)
        }
    }

    /// Cancel the previous run and launch a pipeline over the current
    /// snapshot. An empty query skips filtering entirely.
    async fn start_query(&mut self, query: String) -> Result<()> {
        if let Some(scope) = self.query_scope.take() {
            scope.cancel();
        }
        if !self.config.sticky_selection {
            self.selection.clear();
        }
        if query.is_empty() {
            self.view = FilteredView::capture(&self.source);
            self.running_query = false;
            self.render(DrawOptions::default())?;
            return Ok(());
        }

        let scope = self.root_scope.child(&query);
        let filter = match self.filters.current() {
            Some(filter) => filter,
            None => return Ok(()),
        };
        // Compile the query up front: a malformed pattern surfaces on the
        // status line and the previous result set stays.
        if let Err(err) = filter.apply_collect(&scope, &[]).await {
            self.set_status(err.to_string(), Some(STATUS_CLEAR_DELAY));
            self.render(DrawOptions::default())?;
            return Ok(());
        }

        debug!(target: "loop", query_len = query.len(), filter = filter.name(), "start query");
        self.query_scope = Some(scope.clone());
        self.running_query = true;
        let source = self.source.clone();
        let results_tx = self.results_tx.clone();
        let hub = self.hub.clone();
        // Config wins over the filter's own buffering suggestion.
        let channel_cap = if self.config.filter_buf_size > 0 {
            self.config.filter_buf_size
        } else {
            filter.buf_size()
        };
        tokio::spawn(async move {
            let result = Arc::new(MemoryBuffer::new());
            let pipeline = Pipeline::with_channel_cap(channel_cap);
            pipeline.set_source(source).await;
            pipeline.add_acceptor(Arc::new(FilterStage::new(filter))).await;
            pipeline.set_destination(result.clone()).await;
            match pipeline.run(&scope).await {
                Ok(()) => {
                    let view = FilteredView::capture(&result);
                    let _ = results_tx.send(QueryResult { scope, view }).await;
                }
                Err(PipelineError::Cancelled) => {}
                Err(err) => {
                    warn!(target: "loop", %err, "query run failed");
                    hub.send_status(format!("filter failed: {err}"), Some(STATUS_CLEAR_DELAY))
                        .await;
                }
            }
        });
        self.render(DrawOptions { running_query: true, ..DrawOptions::default() })?;
        Ok(())
    }

    fn on_query_result(&mut self, result: QueryResult) -> Result<()> {
        if result.scope.is_cancelled() {
            debug!(target: "loop", "dropping result of cancelled run");
            return Ok(());
        }
        self.running_query = false;
        self.query_scope = None;
        self.view = result.view;
        self.render(DrawOptions::default())?;
        Ok(())
    }

    fn on_reader_done(&mut self) -> Result<Flow> {
        self.reader_done = true;
        info!(target: "loop", lines = self.source.size(), "input exhausted");
        self.refresh_passthrough_view();
        if self.select_one && self.view.size() == 1 {
            return Ok(Flow::End(LoopEnd::Collect));
        }
        self.render(DrawOptions::default())?;
        Ok(Flow::Continue)
    }

    fn on_status(&mut self, msg: StatusMsg) -> Result<()> {
        self.set_status(msg.message, msg.clear_after);
        self.render(DrawOptions::default())
    }

    fn on_paging(&mut self, request: PagingRequest) {
        let total = self.view.size();
        let line = self.location.line_no();
        let per_page = self.location.per_page();
        match request {
            PagingRequest::LineAbove => {
                let next = if line == 0 { total.saturating_sub(1) } else { line - 1 };
                self.location.set_line_no(next);
            }
            PagingRequest::LineBelow => {
                let next = if total == 0 || line + 1 >= total { 0 } else { line + 1 };
                self.location.set_line_no(next);
            }
            PagingRequest::PageUp => {
                self.location.set_line_no(line.saturating_sub(per_page));
            }
            PagingRequest::PageDown => {
                let next = (line + per_page).min(total.saturating_sub(1));
                self.location.set_line_no(next);
            }
            PagingRequest::ScrollLeft => {
                self.location
                    .set_column(self.location.column().saturating_sub(HSCROLL_STEP));
            }
            PagingRequest::ScrollRight => {
                let limit = self.view.max_width().saturating_sub(1);
                self.location
                    .set_column((self.location.column() + HSCROLL_STEP).min(limit));
            }
            PagingRequest::JumpToLineInPage(n) => {
                let target = (self.location.offset() + n).min(total.saturating_sub(1));
                self.location.set_line_no(target);
            }
            PagingRequest::FirstItem => self.location.set_line_no(0),
            PagingRequest::LastItem => {
                self.location.set_line_no(total.saturating_sub(1));
            }
        }
    }

    fn toggle_current(&mut self) {
        if let Some(item) = self.current_item() {
            if self.selection.has(item.id()) {
                self.selection.remove(item.id());
            } else {
                self.selection.add(item);
            }
        }
    }

    fn commit_range(&mut self, start: usize) {
        let end = self.location.line_no();
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
        for index in lo..=hi {
            if let Some(item) = self.view.line_at(index) {
                self.selection.add(item.clone());
            }
        }
    }

    fn current_item(&self) -> Option<Matched> {
        self.view.line_at(self.location.line_no()).cloned()
    }

    /// With no query in flight the renderer reads the raw buffer, which
    /// keeps growing while ingestion runs.
    fn refresh_passthrough_view(&mut self) {
        if self.query.is_empty() && self.query_scope.is_none() {
            self.view = FilteredView::capture(&self.source);
        }
    }

    fn set_status(&mut self, message: String, clear_after: Option<Duration>) {
        if self.config.suppress_status_msg {
            return;
        }
        self.status = Some(message);
        self.status_deadline = clear_after.map(|d| Instant::now() + d);
    }

    fn render(&mut self, options: DrawOptions) -> Result<()> {
        let rows = self
            .config
            .height
            .map(|h| h.resolve(self.size.1))
            .unwrap_or(self.size.1);
        let geometry = self.renderer.geometry(rows);
        self.location.set_per_page(geometry.list_rows());
        self.location.set_total(self.view.size());
        let frame = Frame {
            view: &self.view,
            query: self.query.as_string(),
            caret: self.caret.pos(),
            location: &self.location,
            selection: &self.selection,
            status: self.status.as_deref(),
            filter_name: self.filters.current_name(),
            source_total: self.source.size(),
            running_query: self.running_query || options.running_query,
            jump_prefixes: self.jump_mode && self.config.single_key_jump.show_prefix,
            cols: self.size.0,
            rows,
        };
        if options.prompt_only {
            self.renderer.draw_prompt(&frame)
        } else {
            self.renderer.draw(&frame)
        }
    }

    /// Assemble the emitted lines: the ordered selection, or the line
    /// under the cursor when nothing is marked.
    fn collect(&self, end: LoopEnd) -> AppOutput {
        let lines = match end {
            LoopEnd::Ignorable => Vec::new(),
            LoopEnd::Collect => {
                if self.selection.is_empty() {
                    self.current_item()
                        .map(|item| vec![item.output().to_string()])
                        .unwrap_or_default()
                } else {
                    self.selection
                        .to_vec()
                        .iter()
                        .map(|item| item.output().to_string())
                        .collect()
                }
            }
        };
        AppOutput { lines, end }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

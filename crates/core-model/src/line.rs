//! Line records and highlight spans.
//!
//! Invariants:
//! * `id` is unique for the lifetime of the process and never reused.
//! * `display` contains no ANSI escape bytes.
//! * Highlight spans index bytes of `display`, are sorted by start, and are
//!   non-overlapping after [`merge_spans`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use unicode_width::UnicodeWidthStr;

use crate::ansi::{self, AttrSpan};

/// Half-open `[start, end)` byte range into a line's display string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Sort spans by start (shorter first on equal starts), then walk once:
/// spans contained in the previously retained span are dropped, overlapping
/// spans are merged in place, anything else (gaps and exact touches alike)
/// is appended as its own entry.
pub fn merge_spans(mut spans: Vec<Span>) -> Vec<Span> {
    if spans.len() <= 1 {
        return spans;
    }
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
    let mut out: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match out.last_mut() {
            Some(prev) if prev.contains(&span) => {}
            Some(prev) if prev.overlaps(&span) => {
                prev.end = prev.end.max(span.end);
            }
            _ => out.push(span),
        }
    }
    out
}

/// One unit of input.
///
/// `raw` is the bytes as read (minus the line terminator). `display` is what
/// filters match against and the renderer shows: `raw` up to the optional NUL
/// separator, SGR sequences stripped. `output` is what accepting the line
/// emits on stdout: the post-separator suffix when a separator is present,
/// otherwise the raw line itself.
#[derive(Debug)]
pub struct Line {
    id: u64,
    raw: String,
    display: String,
    output: String,
    sep_loc: Option<usize>,
    attrs: Option<Vec<AttrSpan>>,
    dirty: AtomicBool,
}

impl Line {
    /// Build a line from raw input bytes.
    ///
    /// `enable_sep` splits on the first NUL byte; `parse_ansi` retains SGR
    /// styling as per-rune attribute spans. SGR bytes are stripped from
    /// `display` in either mode.
    pub fn new(id: u64, raw: impl Into<String>, enable_sep: bool, parse_ansi: bool) -> Self {
        let raw = raw.into();
        let sep_loc = if enable_sep { raw.find('\0') } else { None };
        let (display_part, output) = match sep_loc {
            Some(loc) => (&raw[..loc], raw[loc + 1..].to_string()),
            None => (raw.as_str(), raw.clone()),
        };
        let (display, attrs) = if parse_ansi {
            let (stripped, attrs) = ansi::parse(display_part);
            (stripped, attrs)
        } else if display_part.contains('\u{1b}') {
            (ansi::strip(display_part), None)
        } else {
            (display_part.to_string(), None)
        };
        Self {
            id,
            raw,
            display,
            output,
            sep_loc,
            attrs,
            dirty: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn sep_loc(&self) -> Option<usize> {
        self.sep_loc
    }

    pub fn attrs(&self) -> Option<&[AttrSpan]> {
        self.attrs.as_deref()
    }

    /// Terminal cell width of the display string.
    pub fn display_width(&self) -> usize {
        self.display.width()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Relaxed);
    }
}

/// A line plus the display spans a filter matched.
///
/// An empty span list means "retained without highlight" (negative-only
/// queries and passthrough stages produce these).
#[derive(Debug, Clone)]
pub struct Matched {
    line: Arc<Line>,
    spans: Vec<Span>,
}

impl Matched {
    /// Wrap a line with no highlight information.
    pub fn passthrough(line: Arc<Line>) -> Self {
        Self {
            line,
            spans: Vec::new(),
        }
    }

    /// Wrap a line with merged highlight spans. Spans outside the display
    /// string are clamped away defensively.
    pub fn with_spans(line: Arc<Line>, spans: Vec<Span>) -> Self {
        let limit = line.display().len();
        let spans = merge_spans(
            spans
                .into_iter()
                .filter(|s| !s.is_empty() && s.start < limit)
                .map(|s| Span::new(s.start, s.end.min(limit)))
                .collect(),
        );
        Self { line, spans }
    }

    pub fn line(&self) -> &Arc<Line> {
        &self.line
    }

    pub fn id(&self) -> u64 {
        self.line.id()
    }

    pub fn display(&self) -> &str {
        self.line.display()
    }

    pub fn output(&self) -> &str {
        self.line.output()
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn into_line(self) -> Arc<Line> {
        self.line
    }
}

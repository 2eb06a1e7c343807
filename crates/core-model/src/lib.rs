//! core-model: the line data model shared by every other crate.
//!
//! A [`Line`] is immutable after construction (the redraw hint is the one
//! sanctioned exception) and is always handed around behind an `Arc`.
//! [`Matched`] pairs a line with the highlight spans a filter discovered.
//! [`IdGen`] mints the monotonic line IDs that selection and ordering key
//! off; it is a value handed to whoever ingests lines, never a process-wide
//! global, so tests can substitute a deterministic generator.

pub mod ansi;
pub mod id;
pub mod line;
pub mod pool;

pub use ansi::{AttrSpan, Color, SgrState, TextAttrs};
pub use id::IdGen;
pub use line::{merge_spans, Line, Matched, Span};
pub use pool::{Pool, Poolable};

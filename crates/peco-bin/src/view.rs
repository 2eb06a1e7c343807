//! The renderer: lays the query prompt, candidate list and status line out
//! on the UI surface (stderr) according to the configured layout.
//!
//! Drawing goes through `queue!` into any `Write`, so tests can render
//! into a byte buffer and inspect the emitted stream without a terminal.

use std::io::Write;

use anyhow::Result;
use core_buffer::FilteredView;
use core_config::{ColorMode, Layout, StyleSet, StyleSpec};
use core_model::{Color as ModelColor, Matched, SgrState, TextAttrs};
use core_state::{Location, SelectionSet};
use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use unicode_width::UnicodeWidthChar;

/// Keys offered by single-key jump, in page order.
pub const JUMP_KEYS: &[char] = &[
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h',
    'i', 'j',
];

/// Everything one redraw needs, captured by the event loop.
pub struct Frame<'a> {
    pub view: &'a FilteredView,
    pub query: String,
    pub caret: usize,
    pub location: &'a Location,
    pub selection: &'a SelectionSet,
    pub status: Option<&'a str>,
    pub filter_name: &'a str,
    pub source_total: usize,
    pub running_query: bool,
    pub jump_prefixes: bool,
    pub cols: u16,
    pub rows: u16,
}

pub struct Renderer {
    styles: StyleSet,
    prompt: String,
    layout: Layout,
    selection_prefix: String,
    color: bool,
    suppress_status: bool,
}

/// Screen geometry shared between the renderer and the event loop's
/// paging math.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub rows: u16,
    layout: Layout,
}

impl Geometry {
    pub fn new(rows: u16, layout: Layout) -> Self {
        Self { rows, layout }
    }

    /// Rows available for candidates (query and status each take one).
    pub fn list_rows(&self) -> usize {
        usize::from(self.rows.saturating_sub(2)).max(1)
    }

    fn query_row(&self) -> u16 {
        match self.layout {
            Layout::TopDown => 0,
            Layout::TopDownQueryBottom | Layout::BottomUp => self.rows.saturating_sub(1),
        }
    }

    fn status_row(&self) -> u16 {
        match self.layout {
            Layout::TopDown => self.rows.saturating_sub(1),
            Layout::TopDownQueryBottom | Layout::BottomUp => self.rows.saturating_sub(2),
        }
    }

    fn list_row(&self, index: usize) -> u16 {
        match self.layout {
            Layout::TopDown => 1 + index as u16,
            Layout::TopDownQueryBottom => index as u16,
            Layout::BottomUp => {
                let last = self.rows.saturating_sub(3);
                last.saturating_sub(index as u16)
            }
        }
    }
}

impl Renderer {
    pub fn new(
        styles: StyleSet,
        prompt: String,
        layout: Layout,
        selection_prefix: String,
        color: ColorMode,
        suppress_status: bool,
    ) -> Self {
        Self {
            styles,
            prompt,
            layout,
            selection_prefix,
            color: matches!(color, ColorMode::Auto),
            suppress_status,
        }
    }

    pub fn geometry(&self, rows: u16) -> Geometry {
        Geometry::new(rows, self.layout)
    }

    /// Redraw the full surface into `out`.
    pub fn draw_into<W: Write>(&self, out: &mut W, frame: &Frame) -> Result<()> {
        let geometry = self.geometry(frame.rows);
        self.draw_query_line(out, frame, geometry.query_row())?;
        self.draw_list(out, frame, &geometry)?;
        if !self.suppress_status {
            self.draw_status_line(out, frame, geometry.status_row())?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn draw(&self, frame: &Frame) -> Result<()> {
        let mut err = std::io::stderr().lock();
        self.draw_into(&mut err, frame)
    }

    /// Redraw only the query line (prompt-only draw requests).
    pub fn draw_prompt(&self, frame: &Frame) -> Result<()> {
        let mut err = std::io::stderr().lock();
        let geometry = self.geometry(frame.rows);
        self.draw_query_line(&mut err, frame, geometry.query_row())?;
        err.flush()?;
        Ok(())
    }

    fn draw_query_line<W: Write>(&self, out: &mut W, frame: &Frame, row: u16) -> Result<()> {
        queue!(out, MoveTo(0, row), Clear(ClearType::UntilNewLine))?;
        self.set_style(out, &self.styles.prompt)?;
        queue!(out, Print(&self.prompt), Print(" "))?;
        self.reset(out)?;

        let runes: Vec<char> = frame.query.chars().collect();
        for (i, ch) in runes.iter().enumerate() {
            let style = if i == frame.caret {
                &self.styles.query_cursor
            } else {
                &self.styles.query
            };
            self.set_style(out, style)?;
            queue!(out, Print(ch))?;
        }
        if frame.caret >= runes.len() {
            self.set_style(out, &self.styles.query_cursor)?;
            queue!(out, Print(" "))?;
        }
        self.reset(out)?;
        Ok(())
    }

    fn draw_status_line<W: Write>(&self, out: &mut W, frame: &Frame, row: u16) -> Result<()> {
        queue!(out, MoveTo(0, row), Clear(ClearType::UntilNewLine))?;
        let left = frame.status.unwrap_or("");
        let mut right = format!(
            "{}/{} [{}]",
            frame.view.size(),
            frame.source_total,
            frame.filter_name
        );
        if frame.running_query {
            right.push_str(" ...");
        }
        let cols = usize::from(frame.cols);
        let pad = cols
            .saturating_sub(display_width(left))
            .saturating_sub(display_width(&right))
            .max(1);
        self.set_style(out, &self.styles.basic)?;
        queue!(out, Print(left), Print(" ".repeat(pad)), Print(&right))?;
        self.reset(out)?;
        Ok(())
    }

    fn draw_list<W: Write>(&self, out: &mut W, frame: &Frame, geometry: &Geometry) -> Result<()> {
        let offset = frame.location.offset();
        for index in 0..geometry.list_rows() {
            let row = geometry.list_row(index);
            queue!(out, MoveTo(0, row), Clear(ClearType::UntilNewLine))?;
            let Some(item) = frame.view.line_at(offset + index) else {
                continue;
            };
            let absolute = offset + index;
            let is_cursor = absolute == frame.location.line_no();
            let is_marked = frame.selection.has(item.id());
            self.draw_prefix(out, frame, index, is_marked)?;
            self.draw_item(out, frame, item, is_cursor, is_marked)?;
        }
        Ok(())
    }

    fn draw_prefix<W: Write>(
        &self,
        out: &mut W,
        frame: &Frame,
        index: usize,
        is_marked: bool,
    ) -> Result<()> {
        if frame.jump_prefixes {
            let hint = JUMP_KEYS.get(index).copied().unwrap_or(' ');
            self.set_style(out, &self.styles.context)?;
            queue!(out, Print(hint), Print(" "))?;
            self.reset(out)?;
        }
        if !self.selection_prefix.is_empty() {
            let width = display_width(&self.selection_prefix);
            if is_marked {
                queue!(out, Print(&self.selection_prefix), Print(" "))?;
            } else {
                queue!(out, Print(" ".repeat(width + 1)))?;
            }
        }
        Ok(())
    }

    fn draw_item<W: Write>(
        &self,
        out: &mut W,
        frame: &Frame,
        item: &Matched,
        is_cursor: bool,
        is_marked: bool,
    ) -> Result<()> {
        let base = if is_cursor {
            self.styles.selected
        } else if is_marked {
            self.styles.saved_selection
        } else {
            self.styles.basic
        };
        let spans = item.spans();
        let attrs = if self.color && !is_cursor && !is_marked {
            item.line().attrs()
        } else {
            None
        };

        let skip_cols = frame.location.column();
        let max_cols = usize::from(frame.cols).saturating_sub(2);
        let mut col = 0usize;
        let mut printed = 0usize;
        let mut rune_idx = 0usize;
        // Styles are emitted only on run boundaries so unstyled stretches
        // stay contiguous bytes on the wire.
        let mut current: Option<Segment> = None;
        for (byte_idx, ch) in item.display().char_indices() {
            let width = ch.width().unwrap_or(0);
            let visible = col >= skip_cols && printed + width <= max_cols;
            col += width;
            if visible {
                let segment = if spans.iter().any(|s| s.start <= byte_idx && byte_idx < s.end) {
                    Segment::Matched
                } else if let Some(span) = attrs.and_then(|a| {
                    a.iter()
                        .find(|s| s.start <= rune_idx && rune_idx < s.start + s.len)
                }) {
                    Segment::Sgr(span.state)
                } else {
                    Segment::Base
                };
                if current != Some(segment) {
                    match segment {
                        Segment::Matched => self.set_style(out, &self.styles.matched)?,
                        Segment::Sgr(state) => self.set_sgr(out, &state)?,
                        Segment::Base => self.set_style(out, &base)?,
                    }
                    current = Some(segment);
                }
                queue!(out, Print(ch))?;
                printed += width;
            }
            rune_idx += 1;
            if printed >= max_cols {
                break;
            }
        }
        self.reset(out)?;
        Ok(())
    }

    fn set_style<W: Write>(&self, out: &mut W, style: &StyleSpec) -> Result<()> {
        queue!(out, SetAttribute(Attribute::Reset), ResetColor)?;
        if !self.color {
            // Attribute-only rendering keeps cursor and marks legible on
            // monochrome terminals.
            if style.attrs.contains(TextAttrs::REVERSE) {
                queue!(out, SetAttribute(Attribute::Reverse))?;
            }
            return Ok(());
        }
        if style.attrs.contains(TextAttrs::BOLD) {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        if style.attrs.contains(TextAttrs::UNDERLINE) {
            queue!(out, SetAttribute(Attribute::Underlined))?;
        }
        if style.attrs.contains(TextAttrs::REVERSE) {
            queue!(out, SetAttribute(Attribute::Reverse))?;
        }
        queue!(
            out,
            SetForegroundColor(term_color(style.fg)),
            SetBackgroundColor(term_color(style.bg))
        )?;
        Ok(())
    }

    fn set_sgr<W: Write>(&self, out: &mut W, state: &SgrState) -> Result<()> {
        self.set_style(
            out,
            &StyleSpec::new(state.fg, state.bg, state.attrs),
        )
    }

    fn reset<W: Write>(&self, out: &mut W) -> Result<()> {
        queue!(out, SetAttribute(Attribute::Reset), ResetColor)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Segment {
    Base,
    Matched,
    Sgr(SgrState),
}

fn term_color(color: ModelColor) -> Color {
    match color {
        ModelColor::Default => Color::Reset,
        ModelColor::Indexed(n) => Color::AnsiValue(n),
        ModelColor::Rgb(r, g, b) => Color::Rgb { r, g, b },
    }
}

fn display_width(s: &str) -> usize {
    s.chars().map(|c| c.width().unwrap_or(0)).sum()
}

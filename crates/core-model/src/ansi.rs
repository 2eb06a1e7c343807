//! ANSI SGR pre-parsing.
//!
//! Input lines may carry CSI `ESC [ … m` styling. Parsing strips every CSI
//! sequence from the display string and retains styling as run-length
//! attribute spans keyed by rune index. Unknown CSI sequences are stripped
//! without touching the attribute state. Rendering emits a semantically
//! equivalent byte stream (`parse(render(parse(x))) == parse(x)`); an exact
//! byte round-trip is not a goal.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TextAttrs: u8 {
        const BOLD = 1;
        const UNDERLINE = 2;
        const REVERSE = 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Default,
    /// Palette color: 0–7 map to the basic SGR 30–37/40–47 range, the rest
    /// to 256-colour `38;5;n` / `48;5;n`.
    Indexed(u8),
    Rgb(u8, u8, u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SgrState {
    pub fg: Color,
    pub bg: Color,
    pub attrs: TextAttrs,
}

impl SgrState {
    pub fn is_default(&self) -> bool {
        *self == SgrState::default()
    }
}

/// Run of consecutive runes sharing one SGR state. `start` is a rune index
/// into the stripped display string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrSpan {
    pub start: usize,
    pub len: usize,
    pub state: SgrState,
}

/// Strip CSI sequences and collect run-length attribute spans.
///
/// Returns the stripped string plus `Some(spans)` when at least one SGR
/// sequence was seen; the spans then cover every rune of the output.
pub fn parse(input: &str) -> (String, Option<Vec<AttrSpan>>) {
    let mut out = String::with_capacity(input.len());
    let mut spans: Option<Vec<AttrSpan>> = None;
    let mut state = SgrState::default();
    let mut rune_idx = 0usize;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            if chars.peek() == Some(&'[') {
                chars.next();
                let mut params = String::new();
                let mut terminator = None;
                for c in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&c) {
                        terminator = Some(c);
                        break;
                    }
                    params.push(c);
                }
                if terminator == Some('m') {
                    // First styled rune: backfill a default run for the
                    // prefix so spans cover the whole display string.
                    let spans = spans.get_or_insert_with(Vec::new);
                    if spans.is_empty() && rune_idx > 0 {
                        spans.push(AttrSpan {
                            start: 0,
                            len: rune_idx,
                            state: SgrState::default(),
                        });
                    }
                    apply_sgr(&mut state, &params);
                }
                // Non-`m` terminators are stripped, attributes unchanged.
            }
            // A bare ESC (or the introducer of a non-CSI sequence) is
            // dropped so the display never carries escape bytes.
            continue;
        }
        out.push(ch);
        if let Some(spans) = spans.as_mut() {
            match spans.last_mut() {
                Some(last) if last.state == state && last.start + last.len == rune_idx => {
                    last.len += 1;
                }
                _ => spans.push(AttrSpan {
                    start: rune_idx,
                    len: 1,
                    state,
                }),
            }
        }
        rune_idx += 1;
    }
    (out, spans)
}

/// Strip CSI sequences, discarding styling entirely.
pub fn strip(input: &str) -> String {
    parse(input).0
}

/// Render a stripped string with its attribute spans back into an SGR byte
/// stream. With no spans the string is returned unchanged.
pub fn render(stripped: &str, spans: Option<&[AttrSpan]>) -> String {
    let Some(spans) = spans else {
        return stripped.to_string();
    };
    let runes: Vec<char> = stripped.chars().collect();
    let mut out = String::with_capacity(stripped.len() + spans.len() * 8);
    let mut ended_styled = false;
    for span in spans {
        if span.state.is_default() {
            if ended_styled {
                out.push_str("\u{1b}[0m");
                ended_styled = false;
            }
        } else {
            push_codes(&mut out, &span.state);
            ended_styled = true;
        }
        for ch in runes.iter().skip(span.start).take(span.len) {
            out.push(*ch);
        }
    }
    if ended_styled {
        out.push_str("\u{1b}[0m");
    }
    out
}

fn apply_sgr(state: &mut SgrState, params: &str) {
    let nums: Vec<u16> = params
        .split(';')
        .map(|p| p.parse::<u16>().unwrap_or(0))
        .collect();
    let mut i = 0;
    while i < nums.len() {
        match nums[i] {
            0 => *state = SgrState::default(),
            1 => state.attrs |= TextAttrs::BOLD,
            4 => state.attrs |= TextAttrs::UNDERLINE,
            7 => state.attrs |= TextAttrs::REVERSE,
            n @ 30..=37 => state.fg = Color::Indexed((n - 30) as u8),
            n @ 40..=47 => state.bg = Color::Indexed((n - 40) as u8),
            39 => state.fg = Color::Default,
            49 => state.bg = Color::Default,
            sel @ (38 | 48) => {
                let color = match nums.get(i + 1) {
                    Some(5) => {
                        let c = nums.get(i + 2).map(|&n| Color::Indexed(n as u8));
                        i += 2;
                        c
                    }
                    Some(2) => {
                        let c = match (nums.get(i + 2), nums.get(i + 3), nums.get(i + 4)) {
                            (Some(&r), Some(&g), Some(&b)) => {
                                Some(Color::Rgb(r as u8, g as u8, b as u8))
                            }
                            _ => None,
                        };
                        i += 4;
                        c
                    }
                    _ => None,
                };
                if let Some(color) = color {
                    if sel == 38 {
                        state.fg = color;
                    } else {
                        state.bg = color;
                    }
                }
            }
            // Unrecognized codes leave the state untouched.
            _ => {}
        }
        i += 1;
    }
}

fn push_codes(out: &mut String, state: &SgrState) {
    out.push_str("\u{1b}[0");
    if state.attrs.contains(TextAttrs::BOLD) {
        out.push_str(";1");
    }
    if state.attrs.contains(TextAttrs::UNDERLINE) {
        out.push_str(";4");
    }
    if state.attrs.contains(TextAttrs::REVERSE) {
        out.push_str(";7");
    }
    push_color(out, state.fg, false);
    push_color(out, state.bg, true);
    out.push('m');
}

fn push_color(out: &mut String, color: Color, background: bool) {
    match color {
        Color::Default => {}
        Color::Indexed(n) if n < 8 => {
            let base = if background { 40 } else { 30 };
            out.push_str(&format!(";{}", base + u16::from(n)));
        }
        Color::Indexed(n) => {
            let sel = if background { 48 } else { 38 };
            out.push_str(&format!(";{};5;{}", sel, n));
        }
        Color::Rgb(r, g, b) => {
            let sel = if background { 48 } else { 38 };
            out.push_str(&format!(";{};2;{};{};{}", sel, r, g, b));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn span(start: usize, len: usize, state: SgrState) -> AttrSpan {
        AttrSpan { start, len, state }
    }

    fn fg(color: Color) -> SgrState {
        SgrState {
            fg: color,
            ..SgrState::default()
        }
    }

    #[test]
    fn plain_text_has_no_spans() {
        let (s, attrs) = parse("no styling here");
        assert_eq!(s, "no styling here");
        assert!(attrs.is_none());
    }

    #[test]
    fn basic_palette_run_lengths() {
        let (s, attrs) = parse("ab\u{1b}[31mcd\u{1b}[0me");
        assert_eq!(s, "abcde");
        assert_eq!(
            attrs.unwrap(),
            vec![
                span(0, 2, SgrState::default()),
                span(2, 2, fg(Color::Indexed(1))),
                span(4, 1, SgrState::default()),
            ]
        );
    }

    #[test]
    fn extended_and_true_color() {
        let (_, attrs) = parse("\u{1b}[38;5;208mx\u{1b}[48;2;1;2;3my");
        let attrs = attrs.unwrap();
        assert_eq!(attrs[0].state.fg, Color::Indexed(208));
        assert_eq!(attrs[1].state.bg, Color::Rgb(1, 2, 3));
        assert_eq!(attrs[1].state.fg, Color::Indexed(208));
    }

    #[test]
    fn default_fg_bg_codes() {
        let (_, attrs) = parse("\u{1b}[31;41ma\u{1b}[39mb\u{1b}[49mc");
        let attrs = attrs.unwrap();
        assert_eq!(attrs[1].state.fg, Color::Default);
        assert_eq!(attrs[1].state.bg, Color::Indexed(1));
        assert!(attrs[2].state.is_default());
    }

    #[test]
    fn unknown_csi_stripped_attributes_unchanged() {
        let (s, attrs) = parse("\u{1b}[31ma\u{1b}[2Kb");
        assert_eq!(s, "ab");
        let attrs = attrs.unwrap();
        assert_eq!(attrs, vec![span(0, 2, fg(Color::Indexed(1)))]);
    }

    #[test]
    fn bold_underline_reverse_accumulate() {
        let (_, attrs) = parse("\u{1b}[1m\u{1b}[4;7mx");
        let state = attrs.unwrap()[0].state;
        assert!(state.attrs.contains(TextAttrs::BOLD));
        assert!(state.attrs.contains(TextAttrs::UNDERLINE));
        assert!(state.attrs.contains(TextAttrs::REVERSE));
    }

    #[test]
    fn render_parse_is_stable() {
        for input in [
            "plain",
            "ab\u{1b}[31mcd\u{1b}[0me",
            "\u{1b}[1;38;5;99mwide\u{1b}[0m tail",
            "\u{1b}[38;2;10;20;30mrgb\u{1b}[49m",
        ] {
            let (stripped, attrs) = parse(input);
            let rendered = render(&stripped, attrs.as_deref());
            let (stripped2, attrs2) = parse(&rendered);
            assert_eq!(stripped, stripped2, "input {:?}", input);
            assert_eq!(attrs, attrs2, "input {:?}", input);
        }
    }

    #[test]
    fn strip_drops_styling() {
        assert_eq!(strip("\u{1b}[31mred\u{1b}[0m"), "red");
    }
}
